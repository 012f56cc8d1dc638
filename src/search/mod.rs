pub mod aggregate;
pub mod pipeline;
pub mod scoring;
pub mod select;

// Re-export key types for convenience
pub use aggregate::{Aggregation, Aggregator, SearchOverrides, VariantOutcome};
pub use pipeline::{RankedResult, SearchPipeline, SearchRequest, SearchResponse};
pub use scoring::{ScoredCandidate, ScoringPolicy};
pub use select::{PrimaryPicker, SeededPicker, Selection, TopPicker, WeightedRandomPicker};

use serde::Serialize;

/// Debug context for one pipeline run.
///
/// Surfaced only when the caller sets the debug flag, on success and failure alike.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchTrace {
    /// Query variants actually dispatched, in plan order
    pub queries: Vec<String>,
    pub product_archetype: String,
    pub variants: Vec<VariantOutcome>,
    /// Candidates before deduplication
    pub merged: usize,
    /// Candidates after deduplication
    pub deduplicated: usize,
    /// True when every candidate looked like an accessory and scoring ran unfiltered
    pub filter_fallback: bool,
    /// True when the fan-out deadline elapsed
    pub cancelled: bool,
    /// Last raw upstream payload received
    pub raw: Option<serde_json::Value>,
    /// Set when the primary result could not be converted into an affiliate link
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_failure: Option<LinkFailure>,
}

/// Why a link conversion failed, with the link call's own response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkFailure {
    pub product_id: String,
    pub reason: String,
    pub raw: Option<serde_json::Value>,
}

impl LinkFailure {
    pub fn new(product_id: &str, error: &crate::catalog::CatalogError) -> Self {
        LinkFailure {
            product_id: product_id.to_string(),
            reason: error.to_string(),
            raw: error.raw().cloned(),
        }
    }
}

impl SearchTrace {
    /// Record a link failure. Its response body becomes the last raw payload.
    pub fn record_link_failure(&mut self, failure: LinkFailure) {
        if let Some(raw) = &failure.raw {
            self.raw = Some(raw.clone());
        }
        self.link_failure = Some(failure);
    }
}
