/// Product description generation
///
/// A pluggable text-generation collaborator used by the storefront admin flow.
/// `Describer` wraps an optional provider and never fails: errors degrade to
/// fixed fallback strings so the admin form can always be filled.

pub mod openai;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::DescriptionConfig;

pub const DESCRIPTION_UNAVAILABLE: &str = "Could not generate description.";
pub const DESCRIPTION_FAILED: &str = "Failed to generate description due to an error.";
pub const DEFAULT_CATEGORY: &str = "General";

/// Errors that can occur during text generation.
#[derive(Debug, Error)]
pub enum DescribeError {
    /// Request or parse failure
    #[error("Description generation error: {0}")]
    Generation(String),

    /// API provider returned an HTTP error
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Provider not configured (e.g., missing API key)
    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

#[async_trait]
pub trait DescriptionProvider: Send + Sync {
    /// Short persuasive description for an affiliate listing.
    async fn describe(&self, product_name: &str, category: &str) -> Result<String, DescribeError>;

    /// Category name of at most two words.
    async fn suggest_category(&self, product_name: &str) -> Result<String, DescribeError>;

    fn model_name(&self) -> &str;
}

pub fn build_description_prompt(product_name: &str, category: &str) -> String {
    format!(
        "Write a persuasive, short, and catchy product description for an affiliate marketing website.\n\
         Product Name: {product_name}\n\
         Category: {category}\n\n\
         Keep it under 60 words. Emphasize value and utility. Use a friendly, exciting tone. \
         Do not use hashtags."
    )
}

pub fn build_category_prompt(product_name: &str) -> String {
    format!(
        "Suggest a single, short category name (max 2 words) for a product named: \"{product_name}\". \
         Example: \"Electronics\", \"Home Decor\", \"Mens Fashion\". Return ONLY the category name."
    )
}

/// Infallible facade over an optional provider.
#[derive(Clone, Default)]
pub struct Describer {
    provider: Option<Arc<dyn DescriptionProvider>>,
}

impl Describer {
    pub fn new(provider: Option<Arc<dyn DescriptionProvider>>) -> Self {
        Describer { provider }
    }

    /// Build from config. An unusable provider config is logged and disables generation.
    pub fn from_config(config: &DescriptionConfig) -> Self {
        match config.provider.as_str() {
            "openai" => match openai::OpenAIDescriptionProvider::new(
                config.base_url.clone(),
                config.api_key.clone().unwrap_or_default(),
                config.model.clone(),
            ) {
                Ok(p) => {
                    tracing::info!(model = %p.model_name(), "Description generation enabled");
                    Describer::new(Some(Arc::new(p)))
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to init description provider, generation disabled");
                    Describer::default()
                }
            },
            _ => Describer::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    pub async fn describe(&self, product_name: &str, category: &str) -> String {
        let Some(provider) = &self.provider else {
            return DESCRIPTION_UNAVAILABLE.to_string();
        };
        match provider.describe(product_name, category).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => DESCRIPTION_UNAVAILABLE.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "Description generation failed");
                DESCRIPTION_FAILED.to_string()
            }
        }
    }

    pub async fn suggest_category(&self, product_name: &str) -> String {
        let Some(provider) = &self.provider else {
            return DEFAULT_CATEGORY.to_string();
        };
        match provider.suggest_category(product_name).await {
            Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
            Ok(_) => DEFAULT_CATEGORY.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "Category suggestion failed");
                DEFAULT_CATEGORY.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl DescriptionProvider for Failing {
        async fn describe(&self, _: &str, _: &str) -> Result<String, DescribeError> {
            Err(DescribeError::Api { status: 500, message: "boom".into() })
        }

        async fn suggest_category(&self, _: &str) -> Result<String, DescribeError> {
            Err(DescribeError::Generation("boom".into()))
        }

        fn model_name(&self) -> &str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_disabled_describer_uses_fallbacks() {
        let d = Describer::default();
        assert!(!d.is_enabled());
        assert_eq!(d.describe("Earbuds", "Audio").await, DESCRIPTION_UNAVAILABLE);
        assert_eq!(d.suggest_category("Earbuds").await, DEFAULT_CATEGORY);
    }

    #[tokio::test]
    async fn test_failing_provider_degrades() {
        let d = Describer::new(Some(Arc::new(Failing)));
        assert_eq!(d.describe("Earbuds", "Audio").await, DESCRIPTION_FAILED);
        assert_eq!(d.suggest_category("Earbuds").await, DEFAULT_CATEGORY);
    }

    #[test]
    fn test_from_config_without_key_is_disabled() {
        let config = DescriptionConfig {
            provider: "openai".to_string(),
            ..DescriptionConfig::default()
        };
        assert!(!Describer::from_config(&config).is_enabled());
    }

    #[test]
    fn test_prompts_mention_inputs() {
        let p = build_description_prompt("TWS Earbuds", "Audio");
        assert!(p.contains("TWS Earbuds") && p.contains("Audio") && p.contains("60 words"));
        assert!(build_category_prompt("Skillet").contains("\"Skillet\""));
    }
}
