/// Deterministic query planner
///
/// Expands one free-text query into up to three catalog queries plus the
/// relevance terms the scorer works from. Pure: no I/O, and identical
/// input always yields an identical plan.

pub mod archetype;

use serde::Serialize;

use crate::config::default_exclude_terms;

/// Hard cap on query variants per plan.
pub const MAX_VARIANTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceBand {
    pub min: f64,
    pub max: f64,
}

/// Ordered query variants and the relevance terms for one request. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPlan {
    pub queries: Vec<String>,
    pub must_have: Vec<String>,
    pub nice_to_have: Vec<String>,
    pub exclude: Vec<String>,
    pub price: Option<PriceBand>,
    pub product_archetype: String,
}

impl QueryPlan {
    /// Replace the price band with request-supplied bounds.
    ///
    /// A single supplied bound keeps the other side of the existing band, or
    /// opens it (0 / infinity) when the plan had none.
    pub fn with_price_override(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        if min.is_none() && max.is_none() {
            return self;
        }
        let (cur_min, cur_max) = self
            .price
            .map(|b| (b.min, b.max))
            .unwrap_or((0.0, f64::INFINITY));
        self.price = Some(PriceBand {
            min: min.unwrap_or(cur_min),
            max: max.unwrap_or(cur_max),
        });
        self
    }
}

/// Builds plans against a fixed, configurable accessory exclude table.
#[derive(Debug, Clone)]
pub struct QueryPlanner {
    exclude_terms: Vec<String>,
}

impl Default for QueryPlanner {
    fn default() -> Self {
        QueryPlanner::new(default_exclude_terms())
    }
}

impl QueryPlanner {
    pub fn new(exclude_terms: Vec<String>) -> Self {
        let exclude_terms = exclude_terms
            .into_iter()
            .map(|t| t.to_lowercase())
            .filter(|t| !t.trim().is_empty())
            .collect();
        QueryPlanner { exclude_terms }
    }

    pub fn plan(&self, raw_query: &str) -> QueryPlan {
        let query = normalize(raw_query);

        let Some(arch) = archetype::detect(&query) else {
            return QueryPlan {
                queries: vec![query],
                must_have: Vec::new(),
                nice_to_have: Vec::new(),
                exclude: self.exclude_terms.clone(),
                price: None,
                product_archetype: archetype::GENERIC.to_string(),
            };
        };

        let candidates = [
            with_qualifier(&query, arch.qualifier),
            with_qualifier(&query, arch.strong_qualifier),
            arch.generic_query.to_string(),
        ];
        let mut queries: Vec<String> = Vec::with_capacity(MAX_VARIANTS);
        for q in candidates {
            if !queries.contains(&q) {
                queries.push(q);
            }
        }
        queries.truncate(MAX_VARIANTS);

        QueryPlan {
            queries,
            must_have: arch.must_have.iter().map(|s| s.to_string()).collect(),
            nice_to_have: arch.nice_to_have.iter().map(|s| s.to_string()).collect(),
            exclude: self.exclude_terms.clone(),
            price: Some(PriceBand {
                min: arch.price_band.0,
                max: arch.price_band.1,
            }),
            product_archetype: arch.tag.to_string(),
        }
    }
}

/// Lowercase and collapse whitespace.
pub fn normalize(raw: &str) -> String {
    raw.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Append the qualifier words the query does not already contain.
fn with_qualifier(query: &str, qualifier: &str) -> String {
    let missing: Vec<&str> = qualifier
        .split_whitespace()
        .filter(|w| !query.split_whitespace().any(|q| q == *w))
        .collect();
    if missing.is_empty() {
        query.to_string()
    } else {
        format!("{} {}", query, missing.join(" "))
    }
}
