pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::credits::handlers as credits;
use crate::reports::handlers as reports;
use crate::screening::handlers as screening;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.config.analysis.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_handler))
        // Screening API
        .route(
            "/api/v1/requirements/extract",
            post(screening::handle_extract_requirements),
        )
        .route(
            "/api/v1/analyses",
            get(reports::handle_list_analyses)
                .post(screening::handle_create_analysis)
                .layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route(
            "/api/v1/analyses/:id",
            get(reports::handle_get_analysis),
        )
        .route(
            "/api/v1/analyses/:id/export",
            get(reports::handle_export_analysis),
        )
        // Credits API
        .route("/api/v1/credits", get(credits::handle_get_credits))
        .route(
            "/api/v1/credits/grant",
            post(credits::handle_grant_credits),
        )
        .with_state(state)
}
