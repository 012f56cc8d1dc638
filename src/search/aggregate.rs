/// Fan-out of planned query variants through the catalog
///
/// Variant calls run concurrently on the current task and are merged only after
/// all of them have settled, in plan order, so completion order never leaks
/// into the merged sequence. A failing variant contributes zero candidates.
/// If the deadline elapses, the in-flight calls are dropped and the
/// aggregation reports no candidates.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;

use crate::catalog::{CatalogProvider, Candidate, SearchParams};
use crate::config::SearchConfig;
use crate::planner::{QueryPlan, MAX_VARIANTS};

/// Per-request overrides of the shared catalog defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchOverrides {
    pub ship_to: Option<String>,
    pub page_size: Option<u32>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub delivery_days: Option<u32>,
}

/// What one variant call produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantOutcome {
    pub query: String,
    pub count: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// Deduplicated, in plan order then upstream order
    pub candidates: Vec<Candidate>,
    pub variants: Vec<VariantOutcome>,
    /// Total before deduplication
    pub merged: usize,
    pub raw: Option<serde_json::Value>,
    pub cancelled: bool,
}

pub struct Aggregator {
    catalog: Arc<dyn CatalogProvider>,
    defaults: SearchConfig,
}

impl Aggregator {
    pub fn new(catalog: Arc<dyn CatalogProvider>, defaults: SearchConfig) -> Self {
        Aggregator { catalog, defaults }
    }

    /// Catalog parameters for one variant: shared defaults, then request overrides.
    pub fn params_for(&self, query: &str, overrides: &SearchOverrides) -> SearchParams {
        let d = &self.defaults;
        SearchParams {
            keywords: query.to_string(),
            ship_to: overrides.ship_to.clone().unwrap_or_else(|| d.ship_to.clone()),
            page_size: overrides
                .page_size
                .unwrap_or(d.page_size)
                .clamp(1, d.max_page_size.max(1)),
            page_no: 1,
            currency: d.currency.clone(),
            language: d.language.clone(),
            price_min: overrides.price_min,
            price_max: overrides.price_max,
            delivery_days: overrides.delivery_days,
            sort: d.sort.clone(),
        }
    }

    pub async fn aggregate(&self, plan: &QueryPlan, overrides: &SearchOverrides) -> Aggregation {
        let cap = self.defaults.max_variants.clamp(1, MAX_VARIANTS);
        let queries: Vec<&String> = plan.queries.iter().take(cap).collect();

        let calls = queries.iter().map(|query| {
            let params = self.params_for(query, overrides);
            async move { self.catalog.search(&params).await }
        });

        let deadline = Duration::from_millis(self.defaults.deadline_ms);
        let results = match tokio::time::timeout(deadline, join_all(calls)).await {
            Ok(results) => results,
            Err(_) => {
                tracing::warn!(
                    deadline_ms = self.defaults.deadline_ms,
                    variants = queries.len(),
                    "Catalog fan-out deadline elapsed, dropping in-flight calls"
                );
                return Aggregation {
                    variants: queries
                        .iter()
                        .map(|q| VariantOutcome {
                            query: q.to_string(),
                            count: 0,
                            error: Some("cancelled".to_string()),
                        })
                        .collect(),
                    cancelled: true,
                    ..Aggregation::default()
                };
            }
        };

        let mut merged: Vec<Candidate> = Vec::new();
        let mut variants = Vec::with_capacity(results.len());
        let mut raw = None;

        for (query, result) in queries.iter().zip(results) {
            match result {
                Ok(page) => {
                    tracing::info!(query = %query, count = page.candidates.len(), "Variant returned");
                    variants.push(VariantOutcome {
                        query: query.to_string(),
                        count: page.candidates.len(),
                        error: None,
                    });
                    merged.extend(page.candidates);
                    raw = Some(page.raw);
                }
                Err(e) => {
                    tracing::warn!(query = %query, error = %e, "Variant failed, continuing without it");
                    variants.push(VariantOutcome {
                        query: query.to_string(),
                        count: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        let merged_count = merged.len();
        let candidates = dedup(merged);

        tracing::info!(
            merged = merged_count,
            deduplicated = candidates.len(),
            "Aggregation complete"
        );

        Aggregation {
            candidates,
            variants,
            merged: merged_count,
            raw,
            cancelled: false,
        }
    }
}

/// Keep the first occurrence of every identity key, preserving order.
pub fn dedup(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert(c.identity_key()))
        .collect()
}
