use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::json;

use crate::errors::SearchError;
use crate::search::{SearchOverrides, SearchRequest, SearchResponse, SearchTrace};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/search-affiliate", get(search_affiliate))
        .route("/api/generate-link", get(generate_link))
        .route("/api/describe", post(describe))
        .route("/api/suggest-category", post(suggest_category))
        .with_state(state)
}

/// Query string of the search endpoint. Only `q` is required.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub ship_to: Option<String>,
    pub page_size: Option<u32>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub delivery_days: Option<u32>,
    #[serde(default, deserialize_with = "flag")]
    pub debug: bool,
}

/// Boolean query flag: accepts true/false, 1/0, yes/no, on/off. Empty is false.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "expected true/false or 1/0, got '{}'",
            other
        ))),
    }
}

impl From<SearchQuery> for SearchRequest {
    fn from(q: SearchQuery) -> Self {
        SearchRequest {
            query: q.q.unwrap_or_default(),
            overrides: SearchOverrides {
                ship_to: q.ship_to.filter(|s| !s.trim().is_empty()),
                page_size: q.page_size,
                price_min: q.min_price,
                price_max: q.max_price,
                delivery_days: q.delivery_days,
            },
            debug: q.debug,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LinkQuery {
    pub product_id: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    pub debug: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeRequest {
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestCategoryRequest {
    #[serde(default)]
    pub product_name: String,
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "catalog_configured": state.is_configured(),
        "description_enabled": state.describer.is_enabled(),
    }))
}

async fn search_affiliate(
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Query(query) = query.map_err(ApiError::from_query_rejection)?;
    let request = SearchRequest::from(query);
    let debug = request.debug;
    if request.query.trim().is_empty() {
        return Err(ApiError::from_search(SearchError::validation("q", "Missing query"), debug));
    }
    let pipeline = state.pipeline().map_err(|e| ApiError::from_search(e, debug))?;
    let response = pipeline
        .run(request)
        .await
        .map_err(|e| ApiError::from_search(e, debug))?;
    Ok(Json(response))
}

async fn generate_link(
    State(state): State<AppState>,
    query: Result<Query<LinkQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Query(query) = query.map_err(ApiError::from_query_rejection)?;
    let debug = query.debug;
    let product_id = query.product_id.unwrap_or_default();
    if product_id.trim().is_empty() {
        return Err(ApiError::from_search(
            SearchError::validation("product_id", "Missing product_id"),
            debug,
        ));
    }
    let pipeline = state.pipeline().map_err(|e| ApiError::from_search(e, debug))?;
    let link = pipeline
        .affiliate_link(&product_id)
        .await
        .map_err(|e| ApiError::from_search(e, debug))?;
    Ok(Json(json!({ "productId": product_id.trim(), "affiliateLink": link })))
}

async fn describe(
    State(state): State<AppState>,
    payload: Result<Json<DescribeRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(payload) = payload.map_err(ApiError::from_json_rejection)?;
    if payload.product_name.trim().is_empty() {
        return Err(ApiError::from_search(
            SearchError::validation("productName", "Missing productName"),
            false,
        ));
    }
    let description = state
        .describer
        .describe(payload.product_name.trim(), payload.category.trim())
        .await;
    Ok(Json(json!({ "description": description })))
}

async fn suggest_category(
    State(state): State<AppState>,
    payload: Result<Json<SuggestCategoryRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Json(payload) = payload.map_err(ApiError::from_json_rejection)?;
    if payload.product_name.trim().is_empty() {
        return Err(ApiError::from_search(
            SearchError::validation("productName", "Missing productName"),
            false,
        ));
    }
    let category = state.describer.suggest_category(payload.product_name.trim()).await;
    Ok(Json(json!({ "category": category })))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    debug: Option<SearchTrace>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    /// Map a pipeline error to its status and user-facing message. The trace is
    /// only attached when the caller asked for debug output.
    pub fn from_search(err: SearchError, debug: bool) -> Self {
        let status = StatusCode::from_u16(err.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let trace = if debug { err.trace().cloned() } else { None };

        let (error, field) = match err {
            SearchError::Validation { message, field } => (message, field),
            SearchError::Configuration(msg) => (msg, None),
            SearchError::NoCandidates { .. } => ("No product found".to_string(), None),
            SearchError::LinkGenerationFailed { .. } => ("Affiliate link failed".to_string(), None),
            other => (other.to_string(), None),
        };

        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %error, "Request failed");
        }

        ApiError {
            status,
            body: ErrorBody {
                error,
                field,
                debug: trace,
            },
        }
    }

    /// A query string that does not deserialize is a validation error on the
    /// offending parameter, reported in the usual JSON error body.
    pub fn from_query_rejection(rejection: QueryRejection) -> Self {
        let text = rejection.body_text();
        let detail = text
            .strip_prefix("Failed to deserialize query string: ")
            .unwrap_or(&text);
        let field = detail
            .split_once(": ")
            .map(|(field, _)| field)
            .filter(|field| !field.is_empty() && !field.contains(' '))
            .map(str::to_string);

        ApiError::from_search(
            SearchError::Validation {
                message: format!("Invalid query parameter: {}", detail),
                field,
            },
            false,
        )
    }

    pub fn from_json_rejection(rejection: JsonRejection) -> Self {
        ApiError::from_search(
            SearchError::Validation {
                message: format!("Invalid request body: {}", rejection.body_text()),
                field: None,
            },
            false,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
