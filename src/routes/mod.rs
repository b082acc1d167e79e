use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use crate::state::AppState;

pub mod health;
pub mod sports;

/// Build the application router with its middleware stack.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Root and health
        .route("/", get(|| async { "Sports API - v1.0" }))
        .route("/health", get(health::health_check))

        // Sport endpoints
        .route(
            "/sports/{sport_type}",
            get(sports::get_sport_data).post(sports::update_sport_details),
        )
        .route("/sports/{sport_type}/details", get(sports::get_sport_details))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
