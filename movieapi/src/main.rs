//! movieapi - movie, cast and awards API
//!
//! Serves the REST routes over a single DynamoDB-style table. By default the
//! table lives in process and its change feed drives the state-change
//! projector; `--dynamodb-endpoint` points the handlers at a remote table
//! instead.

mod config;
mod router;


use clap::Parser;
use std::net::SocketAddr;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "movieapi")]
#[command(about = "Movie, cast and awards API", long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "MOVIEAPI_PORT")]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "MOVIEAPI_HOST")]
    host: Option<String>,

    /// Table holding movies, cast and awards
    #[arg(long, env = "TABLE_NAME")]
    table_name: Option<String>,

    /// Remote DynamoDB endpoint (in-process table when unset)
    #[arg(long, env = "MOVIEAPI_DYNAMODB_ENDPOINT")]
    dynamodb_endpoint: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MOVIEAPI_LOG_LEVEL")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "movieapi={level},movieapi_catalog={level},movieapi_streams={level},\
                     movieapi_dynamodb={level},tower_http=debug",
                    level = args.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::load()?;
    let port = args.port.unwrap_or(config.server.port);
    let host = args.host.unwrap_or(config.server.host);
    let table_name = args.table_name.unwrap_or(config.table.name);
    let endpoint = args.dynamodb_endpoint.or(config.table.endpoint);

    info!("Starting movieapi...");

    let state = match endpoint {
        Some(endpoint) => {
            info!("  Change feed: consumed by the remote table's stream trigger");
            router::AppState::remote(&endpoint, &table_name)
        }
        None => {
            let (state, feed) = router::AppState::local(&table_name)?;
            match feed {
                Some(feed) => {
                    let batch_size = config.streams.batch_size;
                    info!("  Change feed: projected in process (batch size {})", batch_size);
                    tokio::spawn(movieapi_streams::run_projector(feed, batch_size));
                }
                None => warn!("Change feed already claimed; state changes will not be logged"),
            }
            state
        }
    };

    let app = router::create_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
