use axum::{middleware::from_fn, routing::get, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use shala_api_rust::middleware::identity::{optional_identity, require_identity};
use shala_api_rust::{config, database, handlers};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, WIX_APP_SECRET, etc.
    let _ = dotenvy::dotenv();

    // Initialize configuration (this loads the config singleton)
    let config = config::config();

    tracing_subscriber::fmt::init();
    tracing::info!("Starting Shala API in {:?} mode", config.environment);

    // The widget must keep rendering with defaults while the store is down,
    // so a failed bootstrap degrades instead of aborting; /health reports it
    if let Err(e) = database::ensure_schema().await {
        tracing::warn!("Schema bootstrap skipped: {}", e);
    }

    let app = app();

    // Allow tests or deployments to override port via env
    let port = std::env::var("SHALA_API_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    println!("🧘 Shala API server listening on http://{}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

fn app() -> Router {
    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        // Widget runtime (identity optional)
        .merge(widget_routes())
        // Dashboard settings (authentication required)
        .merge(settings_routes())
        // Tenant-scoped CRUD; writes check authentication in the handler
        .merge(event_routes())
        .merge(plan_routes())
        .merge(registration_routes())
        // Identity extraction runs on every route above
        .layer(from_fn(optional_identity))
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn widget_routes() -> Router {
    use handlers::settings;

    Router::new().route("/api/widget/settings", get(settings::widget_get))
}

fn settings_routes() -> Router {
    use handlers::settings;

    Router::new()
        .route(
            "/api/settings",
            get(settings::get_settings).put(settings::put_settings),
        )
        .route_layer(from_fn(require_identity))
}

fn event_routes() -> Router {
    use handlers::events;

    Router::new()
        .route("/api/events", get(events::list).post(events::create))
        .route(
            "/api/events/:id",
            get(events::get_one)
                .put(events::update)
                .delete(events::delete),
        )
}

fn plan_routes() -> Router {
    use handlers::plans;

    Router::new()
        .route("/api/plans", get(plans::list).post(plans::create))
        .route("/api/plans/:id", axum::routing::delete(plans::delete))
}

fn registration_routes() -> Router {
    use handlers::registrations;

    Router::new().route(
        "/api/registrations",
        get(registrations::list).post(registrations::create),
    )
}

async fn root() -> axum::response::Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    axum::response::Json(json!({
        "success": true,
        "data": {
            "name": "Shala API (Rust)",
            "version": version,
            "description": "Multi-tenant yoga studio widget backend for Wix sites",
            "endpoints": {
                "home": "/ (public)",
                "widget": "/api/widget/settings (public - identity optional)",
                "settings": "/api/settings (authenticated)",
                "events": "/api/events[/:id] (reads public, writes authenticated)",
                "plans": "/api/plans[/:id] (reads public, writes authenticated)",
                "registrations": "/api/registrations (create public, listing authenticated)",
            }
        }
    }))
}

async fn health() -> impl axum::response::IntoResponse {
    let now = chrono::Utc::now();

    match database::health_check().await {
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
