use std::sync::Arc;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::routes::{self, knowledge, plc};
use crate::state::AppState;

/// Run the HTTP server
pub async fn run(state: Arc<AppState>, bind_addr: &str) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Create the router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/run", post(plc::run))
        .route("/history", get(plc::history))
        .route("/control", get(plc::control_log).post(plc::publish_control))
        .route("/upload", post(knowledge::upload))
        .route("/search", post(knowledge::search))
        .route("/list", get(knowledge::list))
        .route("/get/{id}", get(knowledge::get))
        .route("/delete", delete(knowledge::delete))
        .route("/clear", delete(knowledge::clear))
        .route("/export", get(knowledge::export))
        .route("/mcp", post(routes::mcp))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
