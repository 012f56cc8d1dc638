/// Domain-specific error types for the search pipeline
///
/// Per-variant upstream failures and the empty-filter fallback are absorbed
/// inside the pipeline. Only the variants below ever reach a caller; the ones
/// carrying a `SearchTrace` expose it behind the debug flag only.

use crate::search::SearchTrace;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Upstream catalog unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("No product found")]
    NoCandidates {
        trace: Box<SearchTrace>
    },

    #[error("Affiliate link failed for product {product_id}: {reason}")]
    LinkGenerationFailed {
        product_id: String,
        reason: String,
        trace: Option<Box<SearchTrace>>
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<crate::catalog::CatalogError> for SearchError {
    fn from(e: crate::catalog::CatalogError) -> Self {
        match e {
            crate::catalog::CatalogError::NotConfigured(msg) => SearchError::Configuration(msg),
            other => SearchError::UpstreamUnavailable(other.to_string()),
        }
    }
}

impl SearchError {
    /// Helper to create validation errors with field names
    ///
    /// Example:
    /// ```
    /// use affiliate_search::errors::SearchError;
    /// let err = SearchError::validation("q", "Missing query");
    /// assert_eq!(err.status_code(), 400);
    /// ```
    pub fn validation(field: &str, message: &str) -> Self {
        SearchError::Validation {
            message: message.to_string(),
            field: Some(field.to_string()),
        }
    }

    /// HTTP status category for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            SearchError::Validation { .. } => 400,
            SearchError::NoCandidates { .. } => 404,
            SearchError::Configuration(_) | SearchError::Internal(_) => 500,
            SearchError::UpstreamUnavailable(_) | SearchError::LinkGenerationFailed { .. } => 502,
        }
    }

    /// Debug context attached to the failure, if any.
    pub fn trace(&self) -> Option<&SearchTrace> {
        match self {
            SearchError::NoCandidates { trace } => Some(trace),
            SearchError::LinkGenerationFailed { trace, .. } => trace.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogError;

    #[test]
    fn test_status_codes() {
        assert_eq!(SearchError::validation("q", "Missing query").status_code(), 400);
        assert_eq!(
            SearchError::NoCandidates { trace: Box::default() }.status_code(),
            404
        );
        assert_eq!(SearchError::Configuration("x".into()).status_code(), 500);
        assert_eq!(
            SearchError::LinkGenerationFailed {
                product_id: "1".into(),
                reason: "no link".into(),
                trace: None,
            }
            .status_code(),
            502
        );
    }

    #[test]
    fn test_catalog_not_configured_maps_to_configuration() {
        let err: SearchError = CatalogError::NotConfigured("Missing API credentials".into()).into();
        assert!(matches!(err, SearchError::Configuration(_)));

        let err: SearchError = CatalogError::Unavailable("timeout".into()).into();
        assert!(matches!(err, SearchError::UpstreamUnavailable(_)));
    }
}
