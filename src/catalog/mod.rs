/// Upstream product catalog: provider trait and the normalized candidate record
///
/// The catalog itself is an opaque upstream dependency. Everything downstream of
/// this module only sees `Candidate`, never the raw response shape.

pub mod aliexpress;
pub mod signer;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur during a single catalog call.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Credentials missing at construction or call time
    #[error("Catalog not configured: {0}")]
    NotConfigured(String),

    /// Transport failure (connect, timeout, body read)
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    /// Gateway returned a non-2xx status
    #[error("Catalog API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Gateway answered 200 with an error envelope (bad signature, bad params, ...)
    #[error("Catalog rejected request ({code}): {message}")]
    Rejected {
        code: String,
        message: String,
        raw: serde_json::Value,
    },

    /// Body was not JSON
    #[error("Catalog response parse error: {0}")]
    Parse(String),

    /// Link conversion returned no usable link
    #[error("No affiliate link returned for {source_value}")]
    NoLink {
        source_value: String,
        /// Link response body, `Null` when no call was made
        raw: serde_json::Value,
    },
}

impl CatalogError {
    /// Upstream body that accompanied the failure, if the gateway answered at all.
    pub fn raw(&self) -> Option<&serde_json::Value> {
        match self {
            CatalogError::Rejected { raw, .. } | CatalogError::NoLink { raw, .. } if !raw.is_null() => {
                Some(raw)
            }
            _ => None,
        }
    }
}

/// A normalized product record returned by the upstream catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    /// Upstream product id; upstream sometimes omits it
    pub id: Option<String>,
    pub title: String,
    pub price: f64,
    pub currency: String,
    pub image_url: String,
    /// Raw product detail link, converted into an affiliate link for results
    pub detail_url: Option<String>,
    /// 0-5
    pub rating: Option<f64>,
    /// e.g. units sold recently
    pub popularity: Option<u64>,
    /// Fraction, 0.07 for 7%
    pub commission_rate: Option<f64>,
}

impl Candidate {
    /// Identity key used for deduplication: the id when present, else title + image.
    pub fn identity_key(&self) -> String {
        match self.id.as_deref() {
            Some(id) if !id.is_empty() => format!("id:{}", id),
            _ => format!("ti:{}\u{1f}{}", self.title, self.image_url),
        }
    }
}

/// Parameters of one keyword search against the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub keywords: String,
    pub ship_to: String,
    pub page_size: u32,
    pub page_no: u32,
    pub currency: String,
    pub language: String,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub delivery_days: Option<u32>,
    pub sort: Option<String>,
}

/// One page of results plus the raw payload (surfaced only in debug output).
#[derive(Debug, Clone, Default)]
pub struct CatalogPage {
    pub candidates: Vec<Candidate>,
    pub raw: serde_json::Value,
}

/// Core trait for the upstream catalog.
///
/// Implementations must be Send + Sync; the aggregator shares one instance
/// across concurrent variant calls through an Arc.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Issue a single keyword search. No retries at this layer.
    async fn search(&self, params: &SearchParams) -> Result<CatalogPage, CatalogError>;

    /// Convert a product detail URL (or product id) into a trackable affiliate link.
    async fn generate_link(&self, source: &str) -> Result<String, CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: Option<&str>, title: &str, image: &str) -> Candidate {
        Candidate {
            id: id.map(str::to_string),
            title: title.to_string(),
            price: 10.0,
            currency: "USD".to_string(),
            image_url: image.to_string(),
            detail_url: None,
            rating: None,
            popularity: None,
            commission_rate: None,
        }
    }

    #[test]
    fn test_identity_key_prefers_id() {
        let a = candidate(Some("100"), "A", "a.jpg");
        let b = candidate(Some("100"), "B", "b.jpg");
        assert_eq!(a.identity_key(), b.identity_key());
    }

    #[test]
    fn test_identity_key_falls_back_to_title_and_image() {
        let a = candidate(None, "Earbuds", "a.jpg");
        let b = candidate(Some(""), "Earbuds", "a.jpg");
        let c = candidate(None, "Earbuds", "c.jpg");
        assert_eq!(a.identity_key(), b.identity_key());
        assert_ne!(a.identity_key(), c.identity_key());
    }
}
