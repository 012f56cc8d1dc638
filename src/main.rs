use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use affiliate_search::config::Config;
use affiliate_search::errors::SearchError;
use affiliate_search::logging;
use affiliate_search::search::{SearchOverrides, SearchRequest};
use affiliate_search::server::ProductSearchService;
use affiliate_search::state::AppState;
use rmcp::ServiceExt;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(name = "affiliate-search", version, about = "Affiliate product search and ranking service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API (default)
    Serve {
        /// Bind address, overrides server.bind
        #[arg(long)]
        bind: Option<String>,
    },
    /// Serve MCP tools over stdio
    Mcp,
    /// Run one search and print the response JSON
    Search {
        /// Free-text product query
        query: String,
        /// Ship-to country (ISO 3166 alpha-2)
        #[arg(long)]
        ship_to: Option<String>,
        #[arg(long)]
        min_price: Option<f64>,
        #[arg(long)]
        max_price: Option<f64>,
        #[arg(long)]
        delivery_days: Option<u32>,
        /// Include query variants and raw upstream payload
        #[arg(long)]
        debug: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Parse CLI args
    let cli = Cli::parse();

    // 2. Load configuration once; immutable from here on. Invalid values are fatal.
    let config = Config::load().context("Failed to load configuration")?;

    // 3. Initialize logging FIRST (before any other output)
    logging::init_logging(&config);

    let state = AppState::new(&config);

    match cli.command.unwrap_or(Commands::Serve { bind: None }) {
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let addr: SocketAddr = bind
                .parse()
                .with_context(|| format!("Invalid bind address '{}'", bind))?;

            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                catalog_configured = state.is_configured(),
                "affiliate-search starting"
            );

            let app = affiliate_search::http::router(state);
            let listener = TcpListener::bind(addr).await?;
            tracing::info!(%addr, "HTTP server listening");
            axum::serve(listener, app).await?;
        }

        Commands::Mcp => {
            let service = ProductSearchService::new(state);

            let (stdin, stdout) = rmcp::transport::io::stdio();
            let server = service.serve((stdin, stdout)).await?;

            tracing::info!("affiliate-search MCP server running, awaiting tool calls via stdio");

            server.waiting().await?;

            tracing::info!("affiliate-search MCP server stopped");
        }

        Commands::Search { query, ship_to, min_price, max_price, delivery_days, debug } => {
            let pipeline = state.pipeline()?;
            let request = SearchRequest {
                query,
                overrides: SearchOverrides {
                    ship_to,
                    page_size: None,
                    price_min: min_price,
                    price_max: max_price,
                    delivery_days,
                },
                debug,
            };

            match pipeline.run(request).await {
                Ok(response) => println!("{}", serde_json::to_string_pretty(&response)?),
                Err(e) => {
                    if debug {
                        if let Some(trace) = e.trace() {
                            eprintln!("{}", serde_json::to_string_pretty(trace)?);
                        }
                    }
                    return Err(exit_error(e));
                }
            }
        }
    }

    Ok(())
}

fn exit_error(e: SearchError) -> anyhow::Error {
    anyhow::anyhow!("{} (status {})", e, e.status_code())
}
