use rmcp::{
    ServerHandler,
    tool,
    model::{ServerCapabilities, Implementation, ProtocolVersion, CallToolResult},
    handler::server::wrapper::Parameters,
    ErrorData as McpError,
};
use serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use serde_json::json;
use std::time::Instant;

use crate::errors::SearchError;
use crate::search::{SearchOverrides, SearchRequest};
use crate::state::AppState;

/// MCP tool surface over the same search pipeline the HTTP API uses.
pub struct ProductSearchService {
    state: AppState,
    start_time: Instant,
}

impl ProductSearchService {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            start_time: Instant::now(),
        }
    }

    fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

// Parameter structs

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct SearchProductsParams {
    /// Free-text product query (required)
    pub query: String,
    /// Ship-to country, ISO 3166 alpha-2 (optional)
    pub ship_to: Option<String>,
    /// Catalog page size per query variant (optional, capped by server config)
    pub page_size: Option<u32>,
    /// Lower price bound (optional)
    pub min_price: Option<f64>,
    /// Upper price bound (optional)
    pub max_price: Option<f64>,
    /// Maximum delivery days (optional)
    pub delivery_days: Option<u32>,
    /// Include query variants and the raw upstream payload (default: false)
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
pub struct GenerateLinkParams {
    /// Upstream product id (required)
    pub product_id: String,
}

// Helper: convert SearchError to CallToolResult with isError: true
fn search_error_to_result(err: SearchError, debug: bool) -> CallToolResult {
    let status = err.status_code();
    let trace = if debug { err.trace().cloned() } else { None };
    let mut obj = match err {
        SearchError::Validation { message, field } => json!({
            "isError": true,
            "error": message,
            "field": field,
        }),
        SearchError::NoCandidates { .. } => json!({
            "isError": true,
            "error": "No product found",
            "hint": "Try a broader query or remove price bounds"
        }),
        other => json!({
            "isError": true,
            "error": other.to_string(),
        }),
    };
    obj["status"] = json!(status);
    if let Some(trace) = trace {
        obj["debug"] = json!(trace);
    }
    CallToolResult::structured_error(obj)
}

// Tool implementations
#[rmcp::tool_router]
impl ProductSearchService {
    #[tool(description = "Search the affiliate catalog for a product. Returns the best match plus up to 3 ranked results with affiliate links.")]
    async fn search_products(
        &self,
        Parameters(params): Parameters<SearchProductsParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(
            tool = "search_products",
            query = %params.query,
            debug = params.debug,
            "Tool called"
        );

        let debug = params.debug;
        if params.query.trim().is_empty() {
            return Ok(search_error_to_result(
                SearchError::validation("query", "Field 'query' is required and cannot be empty"),
                debug,
            ));
        }

        let pipeline = match self.state.pipeline() {
            Ok(p) => p,
            Err(e) => return Ok(search_error_to_result(e, debug)),
        };

        let request = SearchRequest {
            query: params.query,
            overrides: SearchOverrides {
                ship_to: params.ship_to,
                page_size: params.page_size,
                price_min: params.min_price,
                price_max: params.max_price,
                delivery_days: params.delivery_days,
            },
            debug,
        };

        match pipeline.run(request).await {
            Ok(response) => Ok(CallToolResult::structured(json!(response))),
            Err(e) => Ok(search_error_to_result(e, debug)),
        }
    }

    #[tool(description = "Convert an upstream product id into a trackable affiliate link.")]
    async fn generate_link(
        &self,
        Parameters(params): Parameters<GenerateLinkParams>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(tool = "generate_link", product_id = %params.product_id, "Tool called");

        let pipeline = match self.state.pipeline() {
            Ok(p) => p,
            Err(e) => return Ok(search_error_to_result(e, false)),
        };

        match pipeline.affiliate_link(&params.product_id).await {
            Ok(link) => Ok(CallToolResult::structured(json!({
                "productId": params.product_id.trim(),
                "affiliateLink": link,
            }))),
            Err(e) => Ok(search_error_to_result(e, false)),
        }
    }

    #[tool(description = "Check server health and status")]
    async fn health_check(
        &self,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(tool = "health_check", "Tool called");

        let response = json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "uptime_seconds": self.uptime_seconds(),
            "catalog_configured": self.state.is_configured(),
        });

        Ok(CallToolResult::structured(response))
    }
}

// ServerHandler implementation
#[rmcp::tool_handler(router = Self::tool_router())]
impl ServerHandler for ProductSearchService {
    fn get_info(&self) -> rmcp::model::InitializeResult {
        rmcp::model::InitializeResult {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            server_info: Implementation {
                name: "affiliate-search".to_string(),
                title: None,
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: Some("Affiliate product search and ranking".to_string()),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Affiliate product search. Tools: search_products, generate_link, health_check.".to_string()
            ),
        }
    }
}
