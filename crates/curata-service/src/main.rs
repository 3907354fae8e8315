use curata_service::{
    DefaultAppState,
    audit::CsvAuditLedger,
    config::Config,
    evaluator::{GeminiModel, LinkEvaluator, RetryPolicy},
    pipeline::IngestPipeline,
    poller::{FeedPoller, HttpFeedFetcher},
    preview::HttpPreviewFetcher,
    repositories::{SqliteFeedRepository, SqliteLinkRepository, SqliteQueueRepository},
    routes::create_router,
};
use diesel::Connection;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::{services::ServeDir, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

// A submission can sit through preview fetch plus three model attempts,
// so the request timeout stays generous.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("curata_service=debug".parse().unwrap()),
        )
        .init();

    let config = Config::from_env().unwrap_or_else(|err| {
        error!(error = %err, "Invalid configuration");
        std::process::exit(1);
    });

    let mut connection = SqliteConnection::establish(&config.database_url).unwrap_or_else(|err| {
        error!(database_url = %config.database_url, error = %err, "Failed to connect to database");
        std::process::exit(1);
    });

    if let Err(err) = connection.run_pending_migrations(MIGRATIONS) {
        error!(error = %err, "Failed to run migrations");
        std::process::exit(1);
    }

    info!(database_url = %config.database_url, "Connected to database");

    let db = Arc::new(Mutex::new(connection));
    let links = Arc::new(SqliteLinkRepository::new(db.clone()));
    let queue = Arc::new(SqliteQueueRepository::new(db.clone()));
    let feeds = Arc::new(SqliteFeedRepository::new(db));

    let model = Arc::new(GeminiModel::new(
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
    ));
    let evaluator = Arc::new(LinkEvaluator::new(
        model,
        Some(config.prompt_override.clone()),
        RetryPolicy::default(),
    ));
    let preview = Arc::new(HttpPreviewFetcher::new(config.preview_dir()));
    let audit = Arc::new(CsvAuditLedger::new(config.audit_path()));

    let pipeline = Arc::new(IngestPipeline::new(
        links.clone(),
        audit,
        preview,
        evaluator,
    ));
    let poller = Arc::new(FeedPoller::new(
        feeds.clone(),
        Arc::new(HttpFeedFetcher::new()),
        pipeline.clone(),
        config.rss_max_items,
    ));

    let poll_task = tokio::spawn(poller.clone().run(config.poll_interval));

    let app_state = DefaultAppState::new(links, queue, feeds, pipeline, poller);

    let app = create_router()
        .nest_service("/previews", ServeDir::new(config.preview_dir()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .with_state(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .unwrap_or_else(|err| {
            error!(bind_address = %config.bind_addr, error = %err, "Failed to bind to address");
            std::process::exit(1);
        });

    info!(bind_address = %config.bind_addr, "Server running");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    if let Err(err) = server.await {
        error!(error = %err, "Server error");
        std::process::exit(1);
    }

    poll_task.abort();
    info!("Shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
