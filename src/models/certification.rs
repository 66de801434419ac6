// src/models/certification.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'certifications' table in the database.
/// Owned by the administrative side; the exam engine only reads it.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Certification {
    pub id: i64,
    pub name: String,
    pub provider: String,

    /// Allotted time for one attempt, in minutes.
    pub duration_minutes: i32,

    /// Minimum score (0..=100) needed to pass.
    /// `None` falls back to the configured default threshold.
    pub passing_score: Option<i32>,

    /// Target number of questions drawn for one attempt.
    pub total_questions: i32,

    #[serde(skip_serializing)]
    pub access_code: Option<String>,

    pub is_active: bool,
}

/// DTO for seeding a certification into a store.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCertification {
    pub name: String,
    pub provider: String,
    pub duration_minutes: i32,
    #[serde(default)]
    pub passing_score: Option<i32>,
    pub total_questions: i32,
    #[serde(default)]
    pub access_code: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}
