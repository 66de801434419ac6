// src/handlers/exam.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    exam::ExamEngine,
    models::exam_session::{StartExamRequest, SubmitAnswerRequest, TickRequest},
    utils::jwt::Claims,
};

/// Starts a new attempt at a certification.
///
/// * Validates the question bank (422 with the issue list if not ready).
/// * Draws the randomized question set and stores it with the session.
pub async fn start_exam(
    State(engine): State<ExamEngine>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<StartExamRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.user_id()?;
    let session = engine.start_exam(req.certification_id, user_id).await?;

    Ok((StatusCode::CREATED, Json(session)))
}

/// Lists the caller's attempts, newest first.
pub async fn list_sessions(
    State(engine): State<ExamEngine>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let sessions = engine.history(claims.user_id()?).await?;

    Ok(Json(sessions))
}

/// Returns an unfinished attempt with its ordered questions and saved answers.
pub async fn resume_exam(
    State(engine): State<ExamEngine>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let resumed = engine.resume_exam(session_id, claims.user_id()?).await?;

    Ok(Json(resumed))
}

/// Saves (or replaces) the answer to one question.
pub async fn submit_answer(
    State(engine): State<ExamEngine>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
    Json(req): Json<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let answer = engine
        .submit_answer(
            session_id,
            claims.user_id()?,
            req.question_id,
            req.selected_option_ids,
        )
        .await?;

    Ok(Json(answer))
}

/// Persists the client-side countdown.
pub async fn update_timer(
    State(engine): State<ExamEngine>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
    Json(req): Json<TickRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;

    let session = engine
        .tick(session_id, claims.user_id()?, req.time_remaining)
        .await?;

    Ok(Json(serde_json::json!({
        "session_id": session.id,
        "time_remaining": session.time_remaining,
    })))
}

/// Grades the attempt and issues the certificate on a pass.
/// Safe to call again; the stored result is returned.
pub async fn complete_exam(
    State(engine): State<ExamEngine>,
    Extension(claims): Extension<Claims>,
    Path(session_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let result = engine.complete_exam(session_id, claims.user_id()?).await?;

    Ok(Json(result))
}
