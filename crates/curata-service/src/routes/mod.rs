use axum::{Router, routing::get};

use crate::AppState;

pub mod api;
pub mod export;

async fn health() -> &'static str {
    "OK"
}

pub fn create_router<S: AppState>() -> Router<S> {
    Router::new()
        .route("/health", get(health))
        .route("/feed.xml", get(export::feed_xml::<S>))
        .nest("/api", api::create_api_router())
}
