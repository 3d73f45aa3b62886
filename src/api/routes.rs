use axum::{
    routing::get,
    Router,
};

use crate::api::{handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        // System endpoints
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        // Session endpoints
        .route(
            "/v0/sessions",
            get(handlers::list_sessions).post(handlers::create_session),
        )
        .route(
            "/v0/sessions/:id",
            get(handlers::get_session).delete(handlers::stop_session),
        )
        .with_state(state)
}
