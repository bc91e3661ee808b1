use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{routing::get, routing::post, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use backoffice_api::config;
use backoffice_api::database::{schema, ConnectionRegistry};
use backoffice_api::handlers::{invoices, setup, tenants};
use backoffice_api::middleware::{bearer_auth_middleware, resolve_tenant_middleware};
use backoffice_api::outbox::{EmailOutbox, OutboxWorker, PgOutboxStore, SmtpMailer};
use backoffice_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, SMTP_HOST, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = config::config();
    tracing::info!("Starting back-office API in {:?} mode", config.environment);

    let registry = Arc::new(
        ConnectionRegistry::from_config(config).context("DATABASE_URL must be set")?,
    );

    // The central database is a hard dependency: tenant directory and outbox
    // live there, so an unreachable central DB ends the process here.
    let central = registry
        .central()
        .await
        .context("central database unreachable at startup")?;
    schema::apply(&central, schema::CENTRAL_SCHEMA)
        .await
        .context("failed to apply central schema")?;

    let outbox = EmailOutbox::new(Arc::new(PgOutboxStore::new(central.clone())));
    let mailer = SmtpMailer::new(Duration::from_secs(config.smtp.send_timeout_secs));
    let worker = Arc::new(OutboxWorker::new(
        PgOutboxStore::new(central.clone()),
        mailer,
        &config.smtp,
    ));
    let worker_handle = worker.spawn();

    let state = AppState {
        registry: registry.clone(),
        outbox,
    };
    let app = app(state);

    // Allow tests or deployments to override port via env
    let port = std::env::var("BACKOFFICE_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Back-office API listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    worker_handle.abort();
    registry.close_all().await;

    Ok(())
}

fn app(state: AppState) -> Router {
    // Tenant-scoped routes: bearer auth runs first, then tenant resolution
    // attaches the tenant pool and request scope.
    let api = Router::new()
        .route("/setup", post(setup::complete))
        .route(
            "/api/invoices",
            get(invoices::list).post(invoices::create),
        )
        .route(
            "/api/invoices/:id",
            get(invoices::get_one)
                .put(invoices::update)
                .patch(invoices::patch)
                .delete(invoices::remove),
        )
        .route("/api/invoices/:id/audit", get(invoices::audit_trail))
        .route("/api/invoices/:id/send", post(invoices::send))
        .route("/api/tenants", get(tenants::list).post(tenants::create))
        .route(
            "/api/tenants/:id",
            axum::routing::patch(tenants::update).delete(tenants::remove),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            resolve_tenant_middleware,
        ))
        .layer(axum::middleware::from_fn(bearer_auth_middleware));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .merge(api)
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutdown signal received");
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "Back Office API",
            "version": version,
            "description": "Multi-tenant commerce back-office with audit logging and a durable email outbox",
            "endpoints": {
                "home": "/ (public)",
                "health": "/health (public)",
                "setup": "/setup (tenant onboarding)",
                "invoices": "/api/invoices[/:id] (tenant-scoped)",
                "audit": "/api/invoices/:id/audit (tenant-scoped)",
                "tenants": "/api/tenants[/:id] (super-admin origin only)",
            }
        }
    }))
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    match state.registry.health_check().await {
        Ok(_) => (
            axum::http::StatusCode::OK,
            axum::response::Json(json!({
                "success": true,
                "data": {
                    "status": "ok",
                    "timestamp": now,
                    "database": "ok"
                }
            })),
        ),
        Err(e) => (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            axum::response::Json(json!({
                "success": false,
                "error": "database unavailable",
                "data": {
                    "status": "degraded",
                    "timestamp": now,
                    "database_error": e.to_string()
                }
            })),
        ),
    }
}
