// src/handlers/certificate.rs

use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

use crate::{error::AppError, exam::ExamEngine};

/// Public check of a certificate by its verification hash.
pub async fn verify_certificate(
    State(engine): State<ExamEngine>,
    Path(hash): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if hash.len() > 128 {
        return Err(AppError::BadRequest("Malformed verification hash".to_string()));
    }

    let verification = engine.verify_certificate(&hash).await?;

    Ok(Json(verification))
}
