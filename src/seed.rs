// src/seed.rs

use serde::Deserialize;
use validator::Validate;

use crate::{
    error::AppError,
    models::{certification::NewCertification, question::NewQuestion},
    store::ExamStore,
};

/// One certification with its question bank, as found in a seed file.
#[derive(Debug, Deserialize)]
pub struct SeedCertification {
    pub certification: NewCertification,
    #[serde(default)]
    pub questions: Vec<NewQuestion>,
}

pub fn parse_seed(raw: &str) -> Result<Vec<SeedCertification>, AppError> {
    serde_json::from_str(raw)
        .map_err(|e| AppError::InternalServerError(format!("Invalid seed file: {}", e)))
}

/// Writes every certification and question of a seed file into `store`.
/// Questions failing field validation are skipped.
/// Returns the number of certifications written.
pub async fn seed_question_bank(store: &dyn ExamStore, path: &str) -> Result<usize, AppError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| AppError::InternalServerError(format!("Cannot read {}: {}", path, e)))?;

    let entries = parse_seed(&raw)?;
    let count = entries.len();

    for entry in entries {
        let certification = store.insert_certification(entry.certification).await?;
        let mut written = 0;
        for question in entry.questions {
            if let Err(e) = question.validate() {
                tracing::warn!(
                    "Skipping seed question for certification {}: {}",
                    certification.id,
                    e
                );
                continue;
            }
            store.insert_question(certification.id, question).await?;
            written += 1;
        }
        tracing::info!(
            "Seeded certification {} '{}' with {} question(s)",
            certification.id,
            certification.name,
            written
        );
    }

    Ok(count)
}
