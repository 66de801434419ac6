// src/exam/lifecycle.rs

use std::collections::HashMap;

use crate::{
    error::AppError,
    exam::{ExamEngine, selector, validator},
    models::{
        exam_session::{ExamSession, NewExamSession, ResumedExam},
        question::{PublicQuestion, Question},
    },
};

/// Issue shown to exam takers when the bank cannot be read.
pub const BANK_UNAVAILABLE: &str = "The question bank could not be loaded, please try again later";

/// Number of questions drawn for a session.
/// A non-positive target means the whole valid pool.
pub fn questions_needed(total_questions: i32, valid: usize) -> usize {
    if total_questions <= 0 {
        return valid;
    }
    (total_questions as usize).min(valid)
}

impl ExamEngine {
    /// Starts a new attempt.
    ///
    /// * The certification must exist and be active.
    /// * The bank must have at least one valid question.
    /// * The selected questions are written together with the session; if
    ///   the assignment cannot be stored, the session row is removed again.
    pub async fn start_exam(&self, certification_id: i64, user_id: i64) -> Result<ExamSession, AppError> {
        let certification = self
            .store
            .find_certification(certification_id)
            .await?
            .filter(|c| c.is_active)
            .ok_or_else(|| {
                AppError::NotFound(format!("Certification {} not found", certification_id))
            })?;

        let report = validator::validate_bank(self.store(), certification_id).await;
        if report.store_failed {
            // Backend detail is already logged by the validator.
            return Err(AppError::NotReady(vec![BANK_UNAVAILABLE.to_string()]));
        }
        if !report.is_valid {
            tracing::info!(
                "Certification {} is not exam-ready: {} issue(s)",
                certification_id,
                report.issues.len()
            );
            return Err(AppError::NotReady(report.issues));
        }

        let needed = questions_needed(certification.total_questions, report.valid_questions.len());
        let question_ids: Vec<i64> = {
            let mut rng = self.entropy.rng();
            selector::select(report.valid_questions, needed, &mut rng)
                .iter()
                .map(|q| q.id)
                .collect()
        };

        let session = self
            .store
            .insert_session(NewExamSession {
                user_id,
                certification_id,
                time_remaining: certification.duration_minutes.saturating_mul(60).max(0),
            })
            .await?;

        if let Err(e) = self.store.insert_assignments(session.id, &question_ids).await {
            tracing::error!(
                "Failed to store question assignment for session {}: {}",
                session.id,
                e
            );
            if let Err(cleanup) = self.store.delete_session(session.id).await {
                tracing::error!(
                    "Failed to roll back session {}, row is orphaned: {}",
                    session.id,
                    cleanup
                );
            }
            return Err(e.into());
        }

        tracing::info!(
            "User {} started session {} for certification {} with {} question(s)",
            user_id,
            session.id,
            certification_id,
            question_ids.len()
        );

        Ok(session)
    }

    /// Reloads an unfinished attempt exactly as the user left it.
    ///
    /// Assigned questions that no longer pass the structural check are
    /// dropped; if none survive the session cannot continue.
    pub async fn resume_exam(&self, session_id: i64, user_id: i64) -> Result<ResumedExam, AppError> {
        let session = self.owned_session(session_id, user_id).await?;
        if session.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "Exam session {} is already {}",
                session_id, session.status
            )));
        }

        let assignments = self.store.assignments(session_id).await?;
        let ids: Vec<i64> = assignments.iter().map(|a| a.question_id).collect();
        let questions: HashMap<i64, Question> = self
            .store
            .questions_by_ids(&ids)
            .await?
            .into_iter()
            .map(|q| (q.id, q))
            .collect();

        let mut ordered = Vec::with_capacity(assignments.len());
        for assignment in &assignments {
            match questions.get(&assignment.question_id) {
                Some(question) if validator::is_valid_question(question) => {
                    ordered.push(PublicQuestion::from_question(question, assignment.order_num));
                }
                Some(_) => tracing::warn!(
                    "Session {}: question {} no longer passes validation, skipping",
                    session_id,
                    assignment.question_id
                ),
                None => tracing::warn!(
                    "Session {}: assigned question {} is missing, skipping",
                    session_id,
                    assignment.question_id
                ),
            }
        }

        if ordered.is_empty() {
            tracing::error!("Session {} has no usable questions left", session_id);
            return Err(AppError::InvalidState(
                "None of the questions in this exam are valid anymore. Please contact support."
                    .to_string(),
            ));
        }

        let answers = self.store.answers(session_id).await?;

        Ok(ResumedExam {
            session,
            questions: ordered,
            answers,
        })
    }

    /// Stores the client-side countdown. Never completes the session.
    pub async fn tick(&self, session_id: i64, user_id: i64, time_remaining: i32) -> Result<ExamSession, AppError> {
        let mut session = self.owned_session(session_id, user_id).await?;
        let seconds = time_remaining.max(0);

        if session.status.is_terminal() || !self.store.update_time_remaining(session_id, seconds).await? {
            return Err(AppError::InvalidState(format!(
                "Exam session {} is no longer in progress",
                session_id
            )));
        }

        session.time_remaining = seconds;
        Ok(session)
    }

    /// All attempts of a user, newest first.
    pub async fn history(&self, user_id: i64) -> Result<Vec<ExamSession>, AppError> {
        Ok(self.store.sessions_for_user(user_id).await?)
    }
}
