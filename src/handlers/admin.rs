// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{error::AppError, exam::ExamEngine};

/// Reports whether a certification's question bank is exam-ready.
/// Admin only. Never fails because of the bank's content; problems are
/// listed in `issues`.
pub async fn validate_bank(
    State(engine): State<ExamEngine>,
    Path(certification_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let report = engine.validate_bank(certification_id).await;

    tracing::info!(
        "Bank check for certification {}: valid={}, {} valid question(s), {} issue(s)",
        certification_id,
        report.is_valid,
        report.valid_count,
        report.issues.len()
    );

    Ok(Json(report))
}
