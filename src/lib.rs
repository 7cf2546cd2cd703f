pub mod appresult;
pub mod auth;
pub mod config;
pub mod db;
pub mod groups;
pub mod model;
pub mod rooms;
pub mod session;
pub mod store;

use axum::{extract::FromRef, routing::get, Json, Router};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use appresult::{AppError, AppResult};
pub use rooms::Hub;

#[derive(Clone, FromRef)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub hub: Hub,
}

impl AppState {
    pub fn new(db_pool: SqlitePool, broadcast_capacity: usize) -> Self {
        Self {
            db_pool,
            hub: Hub::new(broadcast_capacity),
        }
    }
}

pub fn router(app_state: AppState) -> Router {
    let api = Router::new()
        .merge(auth::router())
        .nest("/groups", groups::router())
        .nest("/rooms", rooms::router());

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .with_state(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> {
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    Json(json!({ "status": "OK", "timestamp": timestamp }))
}
