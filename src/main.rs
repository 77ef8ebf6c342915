use axum::{extract::DefaultBodyLimit, routing::get, Router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use bulk_verify::app_state::AppState;
use bulk_verify::config::AppConfig;
use bulk_verify::db;
use bulk_verify::routes::{self, metrics::MetricsState};
use bulk_verify::services::{oracle::HttpVerificationClient, queue::JobQueue};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing bulk-verify server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!(
        "bulk_jobs_submitted_total",
        "Total bulk verification jobs accepted"
    );
    metrics::describe_counter!(
        "bulk_jobs_rejected_total",
        "Bulk jobs rejected at admission"
    );
    metrics::describe_counter!(
        "bulk_jobs_completed_total",
        "Bulk jobs that completed and were billed"
    );
    metrics::describe_counter!(
        "bulk_jobs_failed_total",
        "Bulk jobs that failed, by reason"
    );
    metrics::describe_counter!(
        "bulk_emails_verified_total",
        "Individual emails verified by bulk jobs"
    );
    metrics::describe_histogram!(
        "bulk_job_duration_seconds",
        "Time to process a bulk verification job"
    );
    metrics::describe_gauge!(
        "bulk_queue_depth",
        "Current number of jobs waiting in the queue"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize Redis job queue
    tracing::info!("Connecting to Redis job queue");
    let queue = JobQueue::new(&config.redis_url).expect("Failed to initialize job queue");

    // Initialize verification service client
    tracing::info!(verifier_url = %config.verifier_url, "Initializing verification client");
    let oracle = HttpVerificationClient::new(
        &config.verifier_url,
        config.verifier_api_key.clone(),
        config.verifier_timeout(),
    )
    .expect("Failed to initialize verification client");

    // Create shared application state
    let state = AppState::new(db_pool, queue, oracle, config.orchestrator_settings());

    let metrics_state = MetricsState {
        handle: prometheus_handle,
        queue: state.queue.clone(),
    };

    // Build API routes
    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .with_state(state.clone())
        .merge(routes::jobs::router(state.verifier.clone()))
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(metrics_state),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes));

    tracing::info!("Starting bulk-verify on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown signal received");
        })
        .await
        .expect("Server error");
}
