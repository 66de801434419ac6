// src/exam/mod.rs

//! Exam session engine.
//!
//! * [`validator`] decides whether a question bank is exam-ready.
//! * [`selector`] draws the randomized question subset of a new session.
//! * [`lifecycle`] starts, resumes and ticks sessions.
//! * [`recorder`] upserts answers while a session is running.
//! * [`scoring`] grades a session and moves it to its terminal state.
//! * [`certificate`] issues and verifies certificates for passed sessions.

pub mod certificate;
pub mod lifecycle;
pub mod recorder;
pub mod scoring;
pub mod selector;
pub mod validator;

use std::sync::Arc;

use crate::{
    error::AppError,
    models::exam_session::ExamSession,
    store::ExamStore,
};

pub use certificate::CertificateError;
pub use selector::{EntropySource, OsEntropy, SeededEntropy};
pub use validator::ValidationReport;

/// Passing threshold used when a certification does not define one.
pub const DEFAULT_PASSING_SCORE: i32 = 70;

/// Entry point for every exam operation.
/// Cheap to clone; all state lives in the record store.
#[derive(Clone)]
pub struct ExamEngine {
    store: Arc<dyn ExamStore>,
    entropy: Arc<dyn EntropySource>,
    default_passing_score: i32,
}

impl ExamEngine {
    pub fn new(
        store: Arc<dyn ExamStore>,
        entropy: Arc<dyn EntropySource>,
        default_passing_score: i32,
    ) -> Self {
        Self {
            store,
            entropy,
            default_passing_score,
        }
    }

    pub fn store(&self) -> &dyn ExamStore {
        self.store.as_ref()
    }

    /// Read-only bank check for admin tooling.
    pub async fn validate_bank(&self, certification_id: i64) -> ValidationReport {
        validator::validate_bank(self.store(), certification_id).await
    }

    /// Loads a session owned by `user_id`.
    /// Sessions of other users are reported as missing.
    async fn owned_session(&self, session_id: i64, user_id: i64) -> Result<ExamSession, AppError> {
        match self.store.find_session(session_id).await? {
            Some(session) if session.user_id == user_id => Ok(session),
            _ => Err(AppError::NotFound(format!(
                "Exam session {} not found",
                session_id
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    pub use crate::store::ExamStore;
    use crate::{
        exam::{DEFAULT_PASSING_SCORE, ExamEngine, SeededEntropy},
        models::{
            certification::{Certification, NewCertification},
            question::{NewAnswerOption, NewQuestion, Question, QuestionType},
        },
        store::MemoryStore,
    };

    pub fn engine(store: Arc<MemoryStore>, seed: u64) -> ExamEngine {
        ExamEngine::new(store, Arc::new(SeededEntropy::new(seed)), DEFAULT_PASSING_SCORE)
    }

    pub async fn seed_certification(
        store: &MemoryStore,
        duration_minutes: i32,
        passing_score: Option<i32>,
        total_questions: i32,
    ) -> Certification {
        store
            .insert_certification(NewCertification {
                name: "Cloud Practitioner".to_string(),
                provider: "Acme".to_string(),
                duration_minutes,
                passing_score,
                total_questions,
                access_code: None,
                is_active: true,
            })
            .await
            .unwrap()
    }

    pub async fn seed_inactive_certification(store: &MemoryStore) -> Certification {
        store
            .insert_certification(NewCertification {
                name: "Retired Exam".to_string(),
                provider: "Acme".to_string(),
                duration_minutes: 30,
                passing_score: None,
                total_questions: 5,
                access_code: None,
                is_active: false,
            })
            .await
            .unwrap()
    }

    pub async fn seed_question(
        store: &MemoryStore,
        certification_id: i64,
        text: &str,
        question_type: QuestionType,
        points: i32,
        options: &[(&str, bool)],
    ) -> Question {
        store
            .insert_question(
                certification_id,
                NewQuestion {
                    question_text: text.to_string(),
                    question_type,
                    points,
                    is_active: true,
                    options: options
                        .iter()
                        .map(|(option_text, is_correct)| NewAnswerOption {
                            option_text: option_text.to_string(),
                            is_correct: *is_correct,
                        })
                        .collect(),
                },
            )
            .await
            .unwrap()
    }

    /// Four options, the first one correct.
    pub async fn seed_single_choice(
        store: &MemoryStore,
        certification_id: i64,
        text: &str,
        points: i32,
    ) -> Question {
        seed_question(
            store,
            certification_id,
            text,
            QuestionType::SingleChoice,
            points,
            &[("A", true), ("B", false), ("C", false), ("D", false)],
        )
        .await
    }

    /// Four options, the first two correct.
    pub async fn seed_multi_choice(
        store: &MemoryStore,
        certification_id: i64,
        text: &str,
        points: i32,
    ) -> Question {
        seed_question(
            store,
            certification_id,
            text,
            QuestionType::MultiChoice,
            points,
            &[("A", true), ("B", true), ("C", false), ("D", false)],
        )
        .await
    }

    /// A question with a single option, which never passes validation.
    pub async fn seed_broken(store: &MemoryStore, certification_id: i64, text: &str) -> Question {
        seed_question(
            store,
            certification_id,
            text,
            QuestionType::SingleChoice,
            1,
            &[("Only", true)],
        )
        .await
    }
}
