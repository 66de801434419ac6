// src/store/postgres.rs

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::{
    models::{
        certificate::{Certificate, NewCertificate},
        certification::{Certification, NewCertification},
        exam_session::{
            ExamAnswer, ExamQuestionAssignment, ExamSession, FinishedSession, NewExamSession,
            SessionOutcome, SessionStatus,
        },
        question::{AnswerOption, NewQuestion, Question},
    },
    store::{ExamStore, StoreResult},
};

const CERTIFICATION_COLUMNS: &str =
    "id, name, provider, duration_minutes, passing_score, total_questions, access_code, is_active";
const QUESTION_COLUMNS: &str = "id, certification_id, question_text, question_type, points, is_active";
const SESSION_COLUMNS: &str =
    "id, user_id, certification_id, status, time_remaining, start_time, end_time, score";
const ANSWER_COLUMNS: &str = "session_id, question_id, selected_options, is_correct, answered_at";
const CERTIFICATE_COLUMNS: &str = "id, certificate_number, user_id, certification_id, session_id, verification_hash, issued_at, is_revoked";

/// PostgreSQL-backed record store.
#[derive(Clone)]
pub struct PgExamStore {
    pool: PgPool,
}

impl PgExamStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads the options of `questions` in one query and attaches them.
    async fn attach_options(&self, mut questions: Vec<Question>) -> StoreResult<Vec<Question>> {
        if questions.is_empty() {
            return Ok(questions);
        }

        let ids: Vec<i64> = questions.iter().map(|q| q.id).collect();
        let options: Vec<AnswerOption> = sqlx::query_as(
            "SELECT id, question_id, option_text, is_correct
             FROM answer_options
             WHERE question_id = ANY($1)
             ORDER BY question_id, id",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_question: HashMap<i64, Vec<AnswerOption>> = HashMap::new();
        for option in options {
            by_question.entry(option.question_id).or_default().push(option);
        }
        for question in &mut questions {
            question.options = by_question.remove(&question.id).unwrap_or_default();
        }

        Ok(questions)
    }
}

#[async_trait]
impl ExamStore for PgExamStore {
    async fn find_certification(&self, id: i64) -> StoreResult<Option<Certification>> {
        let certification = sqlx::query_as(&format!(
            "SELECT {} FROM certifications WHERE id = $1",
            CERTIFICATION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(certification)
    }

    async fn insert_certification(&self, new: NewCertification) -> StoreResult<Certification> {
        let certification = sqlx::query_as(&format!(
            "INSERT INTO certifications
                (name, provider, duration_minutes, passing_score, total_questions, access_code, is_active)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {}",
            CERTIFICATION_COLUMNS
        ))
        .bind(new.name)
        .bind(new.provider)
        .bind(new.duration_minutes)
        .bind(new.passing_score)
        .bind(new.total_questions)
        .bind(new.access_code)
        .bind(new.is_active)
        .fetch_one(&self.pool)
        .await?;

        Ok(certification)
    }

    async fn insert_question(&self, certification_id: i64, new: NewQuestion) -> StoreResult<Question> {
        let mut tx = self.pool.begin().await?;

        let mut question: Question = sqlx::query_as(&format!(
            "INSERT INTO questions (certification_id, question_text, question_type, points, is_active)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {}",
            QUESTION_COLUMNS
        ))
        .bind(certification_id)
        .bind(&new.question_text)
        .bind(new.question_type.as_str())
        .bind(new.points)
        .bind(new.is_active)
        .fetch_one(&mut *tx)
        .await?;

        if !new.options.is_empty() {
            let mut builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO answer_options (question_id, option_text, is_correct) ",
            );
            builder.push_values(&new.options, |mut row, option| {
                row.push_bind(question.id)
                    .push_bind(&option.option_text)
                    .push_bind(option.is_correct);
            });
            builder.push(" RETURNING id, question_id, option_text, is_correct");

            question.options = builder.build_query_as().fetch_all(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(question)
    }

    async fn active_questions(&self, certification_id: i64) -> StoreResult<Vec<Question>> {
        let questions = sqlx::query_as(&format!(
            "SELECT {} FROM questions
             WHERE certification_id = $1 AND is_active = TRUE
             ORDER BY id",
            QUESTION_COLUMNS
        ))
        .bind(certification_id)
        .fetch_all(&self.pool)
        .await?;

        self.attach_options(questions).await
    }

    async fn questions_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Question>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let questions = sqlx::query_as(&format!(
            "SELECT {} FROM questions WHERE id = ANY($1) ORDER BY id",
            QUESTION_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        self.attach_options(questions).await
    }

    async fn insert_session(&self, new: NewExamSession) -> StoreResult<ExamSession> {
        let session = sqlx::query_as(&format!(
            "INSERT INTO exam_sessions (user_id, certification_id, status, time_remaining, start_time)
             VALUES ($1, $2, $3, $4, NOW())
             RETURNING {}",
            SESSION_COLUMNS
        ))
        .bind(new.user_id)
        .bind(new.certification_id)
        .bind(SessionStatus::InProgress.as_str())
        .bind(new.time_remaining)
        .fetch_one(&self.pool)
        .await?;

        Ok(session)
    }

    async fn delete_session(&self, id: i64) -> StoreResult<()> {
        sqlx::query("DELETE FROM exam_sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn find_session(&self, id: i64) -> StoreResult<Option<ExamSession>> {
        let session = sqlx::query_as(&format!(
            "SELECT {} FROM exam_sessions WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    async fn sessions_for_user(&self, user_id: i64) -> StoreResult<Vec<ExamSession>> {
        let sessions = sqlx::query_as(&format!(
            "SELECT {} FROM exam_sessions
             WHERE user_id = $1
             ORDER BY start_time DESC, id DESC",
            SESSION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    async fn insert_assignments(&self, session_id: i64, question_ids: &[i64]) -> StoreResult<()> {
        if question_ids.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO exam_question_assignments (session_id, question_id, order_num) ",
        );
        builder.push_values(question_ids.iter().enumerate(), |mut row, (idx, question_id)| {
            row.push_bind(session_id)
                .push_bind(*question_id)
                .push_bind(idx as i32 + 1);
        });
        builder.build().execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn assignments(&self, session_id: i64) -> StoreResult<Vec<ExamQuestionAssignment>> {
        let assignments = sqlx::query_as(
            "SELECT session_id, question_id, order_num
             FROM exam_question_assignments
             WHERE session_id = $1
             ORDER BY order_num",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(assignments)
    }

    async fn update_time_remaining(&self, session_id: i64, seconds: i32) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE exam_sessions SET time_remaining = $2
             WHERE id = $1 AND status = 'in_progress'",
        )
        .bind(session_id)
        .bind(seconds)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn upsert_answer(
        &self,
        session_id: i64,
        question_id: i64,
        selected_options: &[i64],
    ) -> StoreResult<Option<ExamAnswer>> {
        let mut tx = self.pool.begin().await?;

        // Share lock holds off a concurrent terminal transition until the upsert commits.
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM exam_sessions WHERE id = $1 FOR SHARE")
                .bind(session_id)
                .fetch_optional(&mut *tx)
                .await?;

        if status.as_deref() != Some(SessionStatus::InProgress.as_str()) {
            tx.rollback().await?;
            return Ok(None);
        }

        let answer = sqlx::query_as(&format!(
            "INSERT INTO exam_answers (session_id, question_id, selected_options, is_correct, answered_at)
             VALUES ($1, $2, $3, NULL, NOW())
             ON CONFLICT (session_id, question_id) DO UPDATE SET
                selected_options = EXCLUDED.selected_options,
                is_correct = NULL,
                answered_at = EXCLUDED.answered_at
             RETURNING {}",
            ANSWER_COLUMNS
        ))
        .bind(session_id)
        .bind(question_id)
        .bind(selected_options)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(answer))
    }

    async fn answers(&self, session_id: i64) -> StoreResult<Vec<ExamAnswer>> {
        let answers = sqlx::query_as(&format!(
            "SELECT {} FROM exam_answers WHERE session_id = $1 ORDER BY question_id",
            ANSWER_COLUMNS
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(answers)
    }

    async fn mark_answer(&self, session_id: i64, question_id: i64, is_correct: bool) -> StoreResult<()> {
        sqlx::query(
            "UPDATE exam_answers SET is_correct = $3
             WHERE session_id = $1 AND question_id = $2",
        )
        .bind(session_id)
        .bind(question_id)
        .bind(is_correct)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn finish_session(
        &self,
        session_id: i64,
        grade: &(dyn for<'a> Fn(&'a [ExamAnswer]) -> SessionOutcome + Send + Sync),
    ) -> StoreResult<Option<FinishedSession>> {
        let mut tx = self.pool.begin().await?;

        // Exclusive lock waits out in-flight answer upserts and blocks new ones until commit.
        let status: Option<String> =
            sqlx::query_scalar("SELECT status FROM exam_sessions WHERE id = $1 FOR UPDATE")
                .bind(session_id)
                .fetch_optional(&mut *tx)
                .await?;

        if status.as_deref() != Some(SessionStatus::InProgress.as_str()) {
            tx.rollback().await?;
            return Ok(None);
        }

        let answers: Vec<ExamAnswer> = sqlx::query_as(&format!(
            "SELECT {} FROM exam_answers WHERE session_id = $1 ORDER BY question_id",
            ANSWER_COLUMNS
        ))
        .bind(session_id)
        .fetch_all(&mut *tx)
        .await?;

        let outcome = grade(answers.as_slice());

        sqlx::query(
            "UPDATE exam_sessions
             SET status = $2, score = $3, end_time = $4, time_remaining = 0
             WHERE id = $1",
        )
        .bind(session_id)
        .bind(outcome.status.as_str())
        .bind(outcome.score)
        .bind(outcome.end_time)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(FinishedSession { outcome, answers }))
    }

    async fn insert_certificate(&self, new: NewCertificate) -> StoreResult<Certificate> {
        let certificate = sqlx::query_as(&format!(
            "INSERT INTO certificates
                (certificate_number, user_id, certification_id, session_id, verification_hash, issued_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {}",
            CERTIFICATE_COLUMNS
        ))
        .bind(new.certificate_number)
        .bind(new.user_id)
        .bind(new.certification_id)
        .bind(new.session_id)
        .bind(new.verification_hash)
        .bind(new.issued_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(certificate)
    }

    async fn find_certificate_by_session(&self, session_id: i64) -> StoreResult<Option<Certificate>> {
        let certificate = sqlx::query_as(&format!(
            "SELECT {} FROM certificates WHERE session_id = $1",
            CERTIFICATE_COLUMNS
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(certificate)
    }

    async fn find_certificate_by_hash(&self, verification_hash: &str) -> StoreResult<Option<Certificate>> {
        let certificate = sqlx::query_as(&format!(
            "SELECT {} FROM certificates WHERE verification_hash = $1",
            CERTIFICATE_COLUMNS
        ))
        .bind(verification_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(certificate)
    }
}
