use std::sync::Arc;

use crate::catalog::aliexpress::AliExpressClient;
use crate::catalog::CatalogProvider;
use crate::config::Config;
use crate::describe::Describer;
use crate::errors::SearchError;
use crate::search::SearchPipeline;

/// Shared state behind both the HTTP and the MCP surfaces.
///
/// A missing catalog credential does not stop the process: it is kept as the
/// configuration error every search request reports.
#[derive(Clone)]
pub struct AppState {
    search: Result<Arc<SearchPipeline>, String>,
    pub describer: Describer,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let search = match AliExpressClient::new(&config.catalog) {
            Ok(client) => {
                let catalog: Arc<dyn CatalogProvider> = Arc::new(client);
                Ok(Arc::new(SearchPipeline::new(catalog, config)))
            }
            Err(e) => {
                tracing::error!(error = %e, "Catalog client unavailable, searches will fail");
                Err(e.to_string())
            }
        };

        AppState {
            search,
            describer: Describer::from_config(&config.description),
        }
    }

    /// State around an existing pipeline (tests and embedders).
    pub fn with_pipeline(pipeline: SearchPipeline, describer: Describer) -> Self {
        AppState {
            search: Ok(Arc::new(pipeline)),
            describer,
        }
    }

    pub fn pipeline(&self) -> Result<&SearchPipeline, SearchError> {
        self.search
            .as_deref()
            .map_err(|msg| SearchError::Configuration(msg.to_string()))
    }

    pub fn is_configured(&self) -> bool {
        self.search.is_ok()
    }
}
