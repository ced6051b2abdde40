//! Router configuration for the HTTP API.
//!
//! This module sets up all routes, middleware (CORS, compression, tracing),
//! and creates the axum router ready for serving.

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::state::AppState;

/// Upload limit; monthly Cognos exports run to tens of megabytes.
const MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

/// Create the main application router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_v1 = Router::new()
        // Fact imports and coverage
        .route("/imports/{source}", post(handlers::import_facts))
        .route("/coverage", get(handlers::list_coverage))
        .route("/coverage/rebuild", post(handlers::rebuild_coverage))
        // Job management
        .route("/jobs/{job_id}", get(handlers::get_job_status))
        .route("/jobs/{job_id}/logs", get(handlers::stream_job_logs))
        // Calculations
        .route(
            "/calculations",
            get(handlers::list_calculations).put(handlers::create_calculation),
        )
        .route(
            "/calculations/{id}",
            get(handlers::get_calculation)
                .patch(handlers::update_calculation)
                .delete(handlers::delete_calculation),
        )
        .route("/calculations/{id}/copy", post(handlers::copy_calculation))
        .route("/calculations/{id}/start", put(handlers::start_calculation))
        .route("/calculations/{id}/reset", put(handlers::reset_calculation))
        .route("/calculations/{id}/report", get(handlers::get_report))
        // Seasonal coefficients
        .route(
            "/seasonal-coefficients",
            get(handlers::list_seasonal_sets).post(handlers::create_seasonal_set),
        )
        .route(
            "/seasonal-coefficients/import",
            post(handlers::import_seasonal_set),
        )
        .route(
            "/seasonal-coefficients/{id}",
            get(handlers::get_seasonal_set)
                .patch(handlers::update_seasonal_set)
                .delete(handlers::delete_seasonal_set),
        )
        .route(
            "/seasonal-coefficients/{id}/export",
            get(handlers::export_seasonal_set),
        )
        // Reference data
        .route(
            "/reference/client-mapping",
            post(handlers::import_client_mapping),
        );

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/v1", api_v1)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::repositories::LocalRepository;
    use crate::db::repository::FullRepository;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn router() -> Router {
        let repo = Arc::new(LocalRepository::new()) as Arc<dyn FullRepository>;
        create_router(AppState::new(repo, AppConfig::default()))
    }

    #[tokio::test]
    async fn test_health_route() {
        let response = router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_calculation_is_not_found() {
        let response = router()
            .oneshot(
                Request::builder()
                    .uri("/v1/calculations/42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_import_source_is_bad_request() {
        let response = router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/imports/oracle")
                    .header("content-type", "multipart/form-data; boundary=X")
                    .body(Body::from("--X--\r\n"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
