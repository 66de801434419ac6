// src/store/mod.rs

//! Record store boundary of the exam engine.
//!
//! The engine never talks to a database directly: every read and write goes
//! through [`ExamStore`]. `PgExamStore` backs production deployments and
//! `MemoryStore` backs tests and local runs without a database.

pub mod memory;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;

use crate::models::{
    certificate::{Certificate, NewCertificate},
    certification::{Certification, NewCertification},
    exam_session::{
        ExamAnswer, ExamQuestionAssignment, ExamSession, FinishedSession, NewExamSession,
        SessionOutcome,
    },
    question::{NewQuestion, Question},
};

pub use memory::{MemoryStore, StoreOp};
pub use postgres::PgExamStore;

/// Failure reported by a record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backend failed (connection, query, decoding).
    Backend(String),

    /// A unique key was violated by an insert.
    Conflict(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Backend(msg) => write!(f, "store failure: {}", msg),
            StoreError::Conflict(msg) => write!(f, "unique key conflict: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err.as_database_error() {
            Some(db_err) if db_err.is_unique_violation() => StoreError::Conflict(db_err.to_string()),
            _ => StoreError::Backend(err.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Create/read/update/delete operations over the exam entities.
///
/// Conditional writes (`update_time_remaining`, `upsert_answer`,
/// `finish_session`) only apply to sessions that are still `in_progress`;
/// they report whether anything was written so the engine can tell a lost
/// race from success.
#[async_trait]
pub trait ExamStore: Send + Sync {
    async fn find_certification(&self, id: i64) -> StoreResult<Option<Certification>>;

    async fn insert_certification(&self, new: NewCertification) -> StoreResult<Certification>;

    async fn insert_question(&self, certification_id: i64, new: NewQuestion) -> StoreResult<Question>;

    /// Active questions of a certification with their options attached.
    async fn active_questions(&self, certification_id: i64) -> StoreResult<Vec<Question>>;

    /// Questions by id with their options attached, regardless of `is_active`.
    async fn questions_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Question>>;

    async fn insert_session(&self, new: NewExamSession) -> StoreResult<ExamSession>;

    async fn delete_session(&self, id: i64) -> StoreResult<()>;

    async fn find_session(&self, id: i64) -> StoreResult<Option<ExamSession>>;

    /// Sessions of a user, newest first.
    async fn sessions_for_user(&self, user_id: i64) -> StoreResult<Vec<ExamSession>>;

    /// Writes the whole assignment at once; `order_num` is the 1-based
    /// position in `question_ids`.
    async fn insert_assignments(&self, session_id: i64, question_ids: &[i64]) -> StoreResult<()>;

    /// Assignment of a session ordered by `order_num`.
    async fn assignments(&self, session_id: i64) -> StoreResult<Vec<ExamQuestionAssignment>>;

    async fn update_time_remaining(&self, session_id: i64, seconds: i32) -> StoreResult<bool>;

    /// Inserts or replaces the answer for (session, question).
    /// Returns `None` when the session is no longer `in_progress`.
    async fn upsert_answer(
        &self,
        session_id: i64,
        question_id: i64,
        selected_options: &[i64],
    ) -> StoreResult<Option<ExamAnswer>>;

    async fn answers(&self, session_id: i64) -> StoreResult<Vec<ExamAnswer>>;

    async fn mark_answer(&self, session_id: i64, question_id: i64, is_correct: bool) -> StoreResult<()>;

    /// Closes an `in_progress` session and moves it to its terminal status.
    ///
    /// `grade` receives the session's answers and decides the outcome. No
    /// answer can be written between that snapshot and the transition, so
    /// every acknowledged answer is part of the graded set.
    /// Returns `None` when the session was already terminal.
    async fn finish_session(
        &self,
        session_id: i64,
        grade: &(dyn for<'a> Fn(&'a [ExamAnswer]) -> SessionOutcome + Send + Sync),
    ) -> StoreResult<Option<FinishedSession>>;

    async fn insert_certificate(&self, new: NewCertificate) -> StoreResult<Certificate>;

    async fn find_certificate_by_session(&self, session_id: i64) -> StoreResult<Option<Certificate>>;

    async fn find_certificate_by_hash(&self, verification_hash: &str) -> StoreResult<Option<Certificate>>;
}
