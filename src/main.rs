use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::get;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use collector::sems::client::SemsClient;
use collector::store::postgres::PgStore;
use collector::{api, config, jobs, AppState};

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "collector=info,tower_http=info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cfg = config::load()?;
    let args = cli::Cli::parse();

    let result = match args.command {
        Some(cli::Commands::Serve { port }) => run_server(cfg, port).await,
        Some(cli::Commands::SyncOnce) => {
            let state = build_state(cfg).await?;
            jobs::sync::run_sync_cycle(&state).await
        }
        Some(cli::Commands::IngestOnce) => {
            let state = build_state(cfg).await?;
            let report = jobs::ingest::run_ingest_cycle(&state).await?;
            tracing::info!(
                fetched = report.fetched,
                persisted = report.persisted,
                duplicates = report.duplicates,
                skipped = report.skipped,
                failed = report.failed,
                "one-shot ingestion finished"
            );
            Ok(())
        }
        None => run_server(cfg, None).await,
    };

    if let Err(ref e) = result {
        eprintln!("Error: {:?}", e);
    }
    result
}

async fn build_state(cfg: config::Config) -> anyhow::Result<AppState> {
    let db = PgStore::connect(&cfg.database_url).await?;
    let sems = SemsClient::from_config(&cfg);
    Ok(AppState {
        db,
        sems,
        config: cfg,
    })
}

async fn run_server(cfg: config::Config, port_override: Option<u16>) -> anyhow::Result<()> {
    let port = port_override.unwrap_or(cfg.port);

    tracing::info!("Connecting to database...");
    let state = Arc::new(build_state(cfg).await?);

    tracing::info!("Running migrations...");
    state.db.migrate().await?;

    if state.config.role.runs_collector() {
        jobs::sync::spawn(state.clone());
        tracing::info!(
            interval_secs = state.config.sync_interval_secs,
            "collector loop started"
        );
    }
    if state.config.role.runs_ingest() {
        jobs::ingest::spawn(state.clone());
        tracing::info!(
            interval_secs = state.config.ingest_interval_secs,
            "ingestion loop started"
        );
    }

    let app = axum::Router::new()
        // Health endpoints (no auth)
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readiness_check))
        // Admin API — nested under /api/v1
        .nest("/api/v1", api::api_router())
        .with_state(state.clone())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(request_id_middleware));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("pvsync listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Middleware: injects a unique X-Request-Id into every response.
/// This allows operators to correlate errors with service logs.
async fn request_id_middleware(
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> axum::response::Response {
    let req_id = uuid::Uuid::new_v4().to_string();
    let mut resp = next.run(req).await;
    if let Ok(val) = axum::http::HeaderValue::from_str(&req_id) {
        resp.headers_mut().insert("x-request-id", val);
    }
    resp
}

async fn readiness_check() -> &'static str {
    "ok"
}
