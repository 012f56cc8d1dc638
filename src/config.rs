/// Configuration management using figment
///
/// Loads configuration with this precedence (highest wins):
/// 1. Defaults (hardcoded)
/// 2. TOML file: affiliate-search.toml (in working directory)
/// 3. Environment variables: prefixed AFFSEARCH_, nested with `__`
///    (e.g., AFFSEARCH_LOG_LEVEL=debug, AFFSEARCH_CATALOG__APP_SECRET=...)
///
/// The loaded Config is immutable: main() loads it once and hands clones or
/// references to the components that need it.

use std::collections::HashMap;

use figment::{
    Figment,
    providers::{Env, Format, Toml, Serialized},
};
use serde::{Deserialize, Serialize};
use crate::errors::SearchError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Optional file path for log output (in addition to stderr)
    #[serde(default)]
    pub log_file: Option<String>,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub description: DescriptionConfig,
}

/// Upstream catalog API credentials and transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Signed-request gateway endpoint
    #[serde(default = "default_catalog_base_url")]
    pub base_url: String,

    /// Application key. Missing key is reported per request as a configuration error.
    #[serde(default)]
    pub app_key: Option<String>,

    /// Shared signing secret
    #[serde(default)]
    pub app_secret: Option<String>,

    /// Affiliate tracking id attached to generated links
    #[serde(default = "default_tracking_id")]
    pub tracking_id: String,

    /// Per-call HTTP timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Shared defaults applied to every catalog query issued by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_currency")]
    pub currency: String,

    #[serde(default = "default_language")]
    pub language: String,

    /// Default ship-to country (ISO 3166 alpha-2)
    #[serde(default = "default_ship_to")]
    pub ship_to: String,

    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Hard cap on page size, including request overrides
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,

    /// Maximum query variants fanned out per request (never above 3)
    #[serde(default = "default_max_variants")]
    pub max_variants: usize,

    /// Number of ranked results returned
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Deadline for the whole fan-out; in-flight calls are dropped when it elapses
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,

    /// Optional upstream sort key (e.g. "LAST_VOLUME_DESC")
    #[serde(default)]
    pub sort: Option<String>,

    /// Accessory-indicating title terms. Matched as case-insensitive substrings.
    #[serde(default = "default_exclude_terms")]
    pub exclude_terms: Vec<String>,

    /// Prices below this are treated as suspicious listings
    #[serde(default = "default_price_floor")]
    pub price_floor: f64,
}

/// Additive scoring weights. One table per archetype, falling back to `default`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub rating: f64,
    pub popularity: f64,
    pub commission: f64,
    pub price_band_penalty: f64,
    pub price_floor_penalty: f64,
    pub exclude_penalty: f64,
    pub must_have_bonus: f64,
    pub nice_to_have_bonus: f64,
    pub archetype_bonus: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        ScoringWeights {
            rating: 2.0,
            popularity: 12.0,
            commission: 2.0,
            price_band_penalty: 8.0,
            price_floor_penalty: 15.0,
            exclude_penalty: 10.0,
            must_have_bonus: 6.0,
            nice_to_have_bonus: 2.0,
            archetype_bonus: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub default: ScoringWeights,

    /// Per-archetype overrides keyed by archetype tag (e.g. "wireless_earbuds")
    #[serde(default)]
    pub archetypes: HashMap<String, ScoringWeights>,

    /// Upper bound of the near-tie jitter added to each score. 0 disables it.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

/// Text generation collaborator for product descriptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DescriptionConfig {
    /// "openai" or "none"
    #[serde(default = "default_description_provider")]
    pub provider: String,

    #[serde(default = "default_description_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_description_model")]
    pub model: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_catalog_base_url() -> String {
    "https://api-sg.aliexpress.com/sync".to_string()
}

fn default_tracking_id() -> String {
    "default".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_language() -> String {
    "EN".to_string()
}

fn default_ship_to() -> String {
    "US".to_string()
}

fn default_page_size() -> u32 {
    20
}

fn default_max_page_size() -> u32 {
    50
}

fn default_max_variants() -> usize {
    3
}

fn default_top_k() -> usize {
    3
}

fn default_deadline_ms() -> u64 {
    8_000
}

fn default_price_floor() -> f64 {
    3.0
}

fn default_jitter() -> f64 {
    0.25
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_description_provider() -> String {
    "none".to_string()
}

fn default_description_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_description_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Static accessory table. "for " is not listed since it also matches titles
/// like "Earbuds for iPhone"; add it through `search.exclude_terms` if needed.
pub fn default_exclude_terms() -> Vec<String> {
    [
        "case",
        "cover",
        "strap",
        "replacement",
        "ear tips",
        "eartips",
        "ear hook",
        "silicone",
        "sticker",
        "skin",
        "protector",
        "protective film",
        "holder",
        "lanyard",
        "charging dock",
        "spare part",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        CatalogConfig {
            base_url: default_catalog_base_url(),
            app_key: None,
            app_secret: None,
            tracking_id: default_tracking_id(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            currency: default_currency(),
            language: default_language(),
            ship_to: default_ship_to(),
            page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            max_variants: default_max_variants(),
            top_k: default_top_k(),
            deadline_ms: default_deadline_ms(),
            sort: None,
            exclude_terms: default_exclude_terms(),
            price_floor: default_price_floor(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        ScoringConfig {
            default: ScoringWeights::default(),
            archetypes: HashMap::new(),
            jitter: default_jitter(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig { bind: default_bind() }
    }
}

impl Default for DescriptionConfig {
    fn default() -> Self {
        DescriptionConfig {
            provider: default_description_provider(),
            base_url: default_description_base_url(),
            api_key: None,
            model: default_description_model(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: default_log_level(),
            log_file: None,
            catalog: CatalogConfig::default(),
            search: SearchConfig::default(),
            scoring: ScoringConfig::default(),
            server: ServerConfig::default(),
            description: DescriptionConfig::default(),
        }
    }
}

impl ScoringWeights {
    /// Largest jitter that cannot flip a single title-term bonus: half the
    /// smallest positive bonus weight, or 0 when every bonus is disabled.
    pub fn max_jitter(&self) -> f64 {
        [self.must_have_bonus, self.nice_to_have_bonus, self.archetype_bonus]
            .into_iter()
            .filter(|w| *w > 0.0)
            .fold(None, |min: Option<f64>, w| Some(min.map_or(w, |m| m.min(w))))
            .map_or(0.0, |w| w / 2.0)
    }
}

impl ScoringConfig {
    /// Weight table for an archetype, or the default table when none is configured.
    pub fn weights_for(&self, archetype: &str) -> ScoringWeights {
        self.archetypes
            .get(archetype)
            .copied()
            .unwrap_or(self.default)
    }
}

impl Config {
    /// Load configuration from defaults, TOML file, and environment variables
    ///
    /// Environment variables override TOML file values.
    /// Example: AFFSEARCH_SEARCH__SHIP_TO=DE overrides search.ship_to in affiliate-search.toml
    pub fn load() -> Result<Config, SearchError> {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file("affiliate-search.toml"))
            .merge(Env::prefixed("AFFSEARCH_").split("__"))
            .extract::<Config>()
            .map_err(|e| SearchError::Configuration(format!("Failed to load config: {}", e)))
            .and_then(Config::validate)
    }

    /// Reject values that would silently change pipeline semantics.
    pub fn validate(self) -> Result<Config, SearchError> {
        let invalid = |msg: String| Err(SearchError::Configuration(msg));

        if self.search.top_k == 0 {
            return invalid("search.top_k must be at least 1".to_string());
        }
        if self.search.max_variants == 0 {
            return invalid("search.max_variants must be at least 1".to_string());
        }
        if self.search.page_size == 0 || self.search.max_page_size == 0 {
            return invalid("search.page_size and search.max_page_size must be at least 1".to_string());
        }

        let jitter = self.scoring.jitter;
        if !jitter.is_finite() || jitter < 0.0 {
            return invalid(format!("scoring.jitter must be a non-negative number, got {}", jitter));
        }
        let tables = std::iter::once(("default", &self.scoring.default)).chain(
            self.scoring
                .archetypes
                .iter()
                .map(|(name, weights)| (name.as_str(), weights)),
        );
        for (name, weights) in tables {
            let max = weights.max_jitter();
            if jitter > max {
                return invalid(format!(
                    "scoring.jitter {} exceeds {} allowed by the '{}' weight table",
                    jitter, max, name
                ));
            }
        }

        Ok(self)
    }
}
