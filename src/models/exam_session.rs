// src/models/exam_session.rs

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::models::{
    certificate::Certificate,
    question::{PublicQuestion, UnknownVariant},
};

/// Lifecycle status of an exam attempt.
/// `InProgress` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Passed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Passed => "passed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::InProgress)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for SessionStatus {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "in_progress" => Ok(SessionStatus::InProgress),
            "passed" => Ok(SessionStatus::Passed),
            "failed" => Ok(SessionStatus::Failed),
            _ => Err(UnknownVariant(value)),
        }
    }
}

/// Represents the 'exam_sessions' table in the database.
/// One row per user attempt at a certification.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExamSession {
    pub id: i64,
    pub user_id: i64,
    pub certification_id: i64,
    #[sqlx(try_from = "String")]
    pub status: SessionStatus,

    /// Countdown in seconds, frozen at 0 once the session is terminal.
    pub time_remaining: i32,

    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,

    /// Final score (0..=100), set on completion.
    pub score: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewExamSession {
    pub user_id: i64,
    pub certification_id: i64,
    pub time_remaining: i32,
}

/// Terminal transition written by the scoring engine.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub status: SessionStatus,
    pub score: i32,
    pub end_time: DateTime<Utc>,
}

/// A session closed by the store, with the answers it was graded on.
#[derive(Debug, Clone)]
pub struct FinishedSession {
    pub outcome: SessionOutcome,
    pub answers: Vec<ExamAnswer>,
}

/// Represents the 'exam_question_assignments' table.
/// `order_num` is 1-based and fixed at session creation.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExamQuestionAssignment {
    pub session_id: i64,
    pub question_id: i64,
    pub order_num: i32,
}

/// Represents the 'exam_answers' table, keyed by (session_id, question_id).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ExamAnswer {
    pub session_id: i64,
    pub question_id: i64,

    /// Selected option ids, sorted and de-duplicated.
    pub selected_options: Vec<i64>,

    /// Filled in when the session is scored.
    pub is_correct: Option<bool>,

    pub answered_at: DateTime<Utc>,
}

/// State handed back to a user returning to an unfinished attempt.
#[derive(Debug, Serialize, Deserialize)]
pub struct ResumedExam {
    pub session: ExamSession,
    pub questions: Vec<PublicQuestion>,
    pub answers: Vec<ExamAnswer>,
}

/// Outcome of completing an exam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamResult {
    pub session_id: i64,
    pub score: i32,
    pub passed: bool,
    pub certificate: Option<Certificate>,

    /// Set when the exam was passed but the certificate could not be stored.
    /// Completing the session again retries issuance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_error: Option<String>,
}

/// DTO for starting an attempt.
#[derive(Debug, Deserialize)]
pub struct StartExamRequest {
    pub certification_id: i64,
}

/// DTO for recording an answer.
#[derive(Debug, Deserialize, Validate)]
pub struct SubmitAnswerRequest {
    pub question_id: i64,
    #[validate(length(max = 50, message = "Too many selected options."))]
    pub selected_option_ids: Vec<i64>,
}

/// DTO for the client-side countdown.
#[derive(Debug, Deserialize, Validate)]
pub struct TickRequest {
    #[validate(range(min = 0, message = "time_remaining cannot be negative."))]
    pub time_remaining: i32,
}
