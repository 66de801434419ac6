// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{get, post, put},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, certificate, exam},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Merges all sub-routers (exams, certificates, admin).
/// * Applies global middleware (Trace, CORS).
/// * Injects global state (exam engine and configuration).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let exam_routes = Router::new()
        .route("/start", post(exam::start_exam))
        .route("/sessions", get(exam::list_sessions))
        .route("/sessions/{id}", get(exam::resume_exam))
        .route("/sessions/{id}/answers", put(exam::submit_answer))
        .route("/sessions/{id}/timer", put(exam::update_timer))
        .route("/sessions/{id}/complete", post(exam::complete_exam))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let certificate_routes =
        Router::new().route("/verify/{hash}", get(certificate::verify_certificate));

    let admin_routes = Router::new()
        .route(
            "/certifications/{id}/validation",
            get(admin::validate_bank),
        )
        // Double middleware protection: Auth first, then Admin check
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/exams", exam_routes)
        .nest("/api/certificates", certificate_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
