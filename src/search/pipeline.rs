/// End-to-end search pipeline
///
/// query → plan → concurrent catalog fan-out → dedup → filter & score → select
/// → affiliate links for the ranked results → response.
///
/// The primary result must be purchasable: if its link cannot be generated the
/// request fails with LinkGenerationFailed. Other ranked entries degrade to a
/// null link instead.

use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;
use tracing::Instrument;

use super::aggregate::{Aggregator, SearchOverrides};
use super::scoring::{filter_and_score, ScoredCandidate, ScoringPolicy};
use super::select::{select, PrimaryPicker, WeightedRandomPicker};
use super::{LinkFailure, SearchTrace};
use crate::catalog::aliexpress::product_url;
use crate::catalog::{CatalogError, CatalogProvider, Candidate};
use crate::config::{Config, ScoringConfig, SearchConfig};
use crate::errors::SearchError;
use crate::planner::{QueryPlan, QueryPlanner};

#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub overrides: SearchOverrides,
    pub debug: bool,
}

/// One externally visible ranked entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedResult {
    pub score: f64,
    pub title: String,
    pub price: f64,
    pub currency: String,
    #[serde(rename = "image")]
    pub image_url: String,
    pub affiliate_link: Option<String>,
}

/// Legacy single-result fields (the primary pick) plus the ranked list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    pub title: String,
    pub price: f64,
    pub currency: String,
    pub image: String,
    pub affiliate_link: String,
    pub results: Vec<RankedResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<SearchTrace>,
}

pub struct SearchPipeline {
    planner: QueryPlanner,
    aggregator: Aggregator,
    catalog: Arc<dyn CatalogProvider>,
    search: SearchConfig,
    scoring: ScoringConfig,
    picker: Arc<dyn PrimaryPicker>,
}

impl SearchPipeline {
    pub fn new(catalog: Arc<dyn CatalogProvider>, config: &Config) -> Self {
        SearchPipeline {
            planner: QueryPlanner::new(config.search.exclude_terms.clone()),
            aggregator: Aggregator::new(catalog.clone(), config.search.clone()),
            catalog,
            search: config.search.clone(),
            scoring: config.scoring.clone(),
            picker: Arc::new(WeightedRandomPicker),
        }
    }

    /// Replace the primary-pick strategy (e.g. `TopPicker` for deterministic output).
    pub fn with_picker(mut self, picker: Arc<dyn PrimaryPicker>) -> Self {
        self.picker = picker;
        self
    }

    /// Plan for a query, with request price bounds replacing the archetype band.
    pub fn plan(&self, query: &str, overrides: &SearchOverrides) -> QueryPlan {
        self.planner
            .plan(query)
            .with_price_override(overrides.price_min, overrides.price_max)
    }

    pub async fn run(&self, request: SearchRequest) -> Result<SearchResponse, SearchError> {
        let query = request.query.trim().to_string();
        if query.is_empty() {
            return Err(SearchError::validation("q", "Missing query"));
        }

        let span = tracing::info_span!(
            "search",
            request_id = %uuid::Uuid::new_v4(),
            query = %query
        );
        self.run_inner(&query, &request).instrument(span).await
    }

    async fn run_inner(&self, query: &str, request: &SearchRequest) -> Result<SearchResponse, SearchError> {
        let plan = self.plan(query, &request.overrides);
        tracing::info!(
            archetype = %plan.product_archetype,
            variants = plan.queries.len(),
            "Query planned"
        );

        let aggregation = self.aggregator.aggregate(&plan, &request.overrides).await;
        let mut trace = SearchTrace {
            queries: aggregation.variants.iter().map(|v| v.query.clone()).collect(),
            product_archetype: plan.product_archetype.clone(),
            variants: aggregation.variants.clone(),
            merged: aggregation.merged,
            deduplicated: aggregation.candidates.len(),
            filter_fallback: false,
            cancelled: aggregation.cancelled,
            raw: aggregation.raw.clone(),
            link_failure: None,
        };

        if aggregation.candidates.is_empty() {
            tracing::info!(cancelled = aggregation.cancelled, "No candidates after aggregation");
            return Err(SearchError::NoCandidates { trace: Box::new(trace) });
        }

        let policy = ScoringPolicy::for_archetype(
            &self.scoring,
            self.search.price_floor,
            &plan.product_archetype,
        );
        let scored = {
            let mut rng = rand::thread_rng();
            filter_and_score(aggregation.candidates, &plan, &policy, &mut rng)
        };
        trace.filter_fallback = scored.fell_back;

        let Some(selection) = select(scored.candidates, self.search.top_k, self.picker.as_ref()) else {
            return Err(SearchError::NoCandidates { trace: Box::new(trace) });
        };

        let links = join_all(selection.top.iter().map(|s| self.link_for(&s.candidate))).await;

        let mut results = Vec::with_capacity(selection.top.len());
        let mut primary_link = None;
        for (rank, (entry, link)) in selection.top.iter().zip(links).enumerate() {
            let link = match link {
                Ok(link) => Some(link),
                Err(e) if rank == selection.primary_rank => {
                    let product_id = product_key(&entry.candidate);
                    tracing::error!(
                        product_id = %product_id,
                        error = %e,
                        "Affiliate link failed for primary result"
                    );
                    trace.record_link_failure(LinkFailure::new(&product_id, &e));
                    return Err(SearchError::LinkGenerationFailed {
                        product_id,
                        reason: e.to_string(),
                        trace: Some(Box::new(trace)),
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        product_id = %product_key(&entry.candidate),
                        error = %e,
                        "Affiliate link failed for ranked result"
                    );
                    None
                }
            };
            if rank == selection.primary_rank {
                primary_link = link.clone();
            }
            results.push(ranked_result(entry, link));
        }

        let primary = &selection.primary.candidate;
        Ok(SearchResponse {
            title: primary.title.clone(),
            price: primary.price,
            currency: primary.currency.clone(),
            image: primary.image_url.clone(),
            affiliate_link: primary_link.unwrap_or_default(),
            results,
            debug: request.debug.then_some(trace),
        })
    }

    /// Standalone link conversion for a known product id.
    pub async fn affiliate_link(&self, product_id: &str) -> Result<String, SearchError> {
        let product_id = product_id.trim();
        if product_id.is_empty() {
            return Err(SearchError::validation("product_id", "Missing product_id"));
        }
        self.catalog
            .generate_link(&product_url(product_id))
            .await
            .map_err(|e| {
                let mut trace = SearchTrace::default();
                trace.record_link_failure(LinkFailure::new(product_id, &e));
                SearchError::LinkGenerationFailed {
                    product_id: product_id.to_string(),
                    reason: e.to_string(),
                    trace: Some(Box::new(trace)),
                }
            })
    }

    async fn link_for(&self, candidate: &Candidate) -> Result<String, CatalogError> {
        let source = match (&candidate.detail_url, &candidate.id) {
            (Some(url), _) => url.clone(),
            (None, Some(id)) => product_url(id),
            (None, None) => {
                return Err(CatalogError::NoLink {
                    source_value: format!("'{}' (neither detail url nor id)", candidate.title),
                    raw: serde_json::Value::Null,
                })
            }
        };
        self.catalog.generate_link(&source).await
    }
}

fn product_key(candidate: &Candidate) -> String {
    candidate
        .id
        .clone()
        .unwrap_or_else(|| candidate.title.clone())
}

fn ranked_result(entry: &ScoredCandidate, affiliate_link: Option<String>) -> RankedResult {
    RankedResult {
        score: entry.score,
        title: entry.candidate.title.clone(),
        price: entry.candidate.price,
        currency: entry.candidate.currency.clone(),
        image_url: entry.candidate.image_url.clone(),
        affiliate_link,
    }
}
