// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, assessment},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Candidate routes under `/api/assessment` (authenticated).
/// * Question bank, reports and certificate retry under `/api/admin`
///   (authenticated, admin role).
/// * Global Trace and CORS layers.
pub fn create_router(state: AppState) -> Router {
    let origins = [
        HeaderValue::from_static("http://localhost:3000"),
        HeaderValue::from_static("http://127.0.0.1:3000"),
    ];

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let assessment_routes = Router::new()
        .route("/start", post(assessment::start_assessment))
        .route("/status", get(assessment::get_status))
        .route("/history", get(assessment::get_history))
        .route("/step/{step}/questions", get(assessment::get_step_questions))
        .route("/step/{step}/submit", post(assessment::submit_step))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/questions", post(admin::create_question))
        .route("/questions/stats", get(admin::question_stats))
        .route("/questions/bulk", post(admin::bulk_create_questions))
        .route(
            "/questions/{id}",
            put(admin::update_question).delete(admin::delete_question),
        )
        .route("/reports/assessments", get(admin::list_assessments))
        .route("/certificates/retry", post(admin::retry_certificates))
        // Auth first, then the admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/assessment", assessment_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
