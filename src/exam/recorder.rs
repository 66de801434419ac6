// src/exam/recorder.rs

use crate::{error::AppError, exam::ExamEngine, models::exam_session::ExamAnswer};

/// Sorted, de-duplicated option ids; answers are compared as sets.
pub fn normalize_selection(mut selected: Vec<i64>) -> Vec<i64> {
    selected.sort_unstable();
    selected.dedup();
    selected
}

impl ExamEngine {
    /// Records the user's selection for one question (last write wins).
    ///
    /// Correctness is not evaluated here; it is decided when the session
    /// is completed.
    pub async fn submit_answer(
        &self,
        session_id: i64,
        user_id: i64,
        question_id: i64,
        selected_option_ids: Vec<i64>,
    ) -> Result<ExamAnswer, AppError> {
        let session = self.owned_session(session_id, user_id).await?;
        if session.status.is_terminal() {
            return Err(AppError::InvalidState(format!(
                "Exam session {} is already {}, answers are closed",
                session_id, session.status
            )));
        }

        let assigned = self
            .store
            .assignments(session_id)
            .await?
            .iter()
            .any(|a| a.question_id == question_id);
        if !assigned {
            return Err(AppError::NotFound(format!(
                "Question {} is not part of exam session {}",
                question_id, session_id
            )));
        }

        let selected = normalize_selection(selected_option_ids);
        match self.store.upsert_answer(session_id, question_id, &selected).await? {
            Some(answer) => Ok(answer),
            // Completed between the status check and the write.
            None => Err(AppError::InvalidState(format!(
                "Exam session {} is no longer in progress",
                session_id
            ))),
        }
    }
}
