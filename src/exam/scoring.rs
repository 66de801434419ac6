// src/exam/scoring.rs

use std::collections::{BTreeSet, HashMap};

use chrono::Utc;

use crate::{
    error::AppError,
    exam::ExamEngine,
    models::{
        exam_session::{ExamAnswer, ExamResult, ExamSession, SessionOutcome, SessionStatus},
        question::Question,
    },
};

/// Points tally of a graded session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grade {
    pub earned_points: i64,
    pub total_points: i64,
    pub score: i32,
    /// (question_id, is_correct) for every graded answer.
    pub marks: Vec<(i64, bool)>,
}

/// A selection is correct only if it equals the set of correct options.
/// Missing a correct option or adding a wrong one both fail the question.
pub fn is_answer_correct(selected: &[i64], question: &Question) -> bool {
    let selected: BTreeSet<i64> = selected.iter().copied().collect();
    let correct: BTreeSet<i64> = question.correct_option_ids().into_iter().collect();
    selected == correct
}

/// `earned / total` as a percentage, half rounded up. 0 when nothing counts.
pub fn percentage(earned: i64, total: i64) -> i32 {
    if total <= 0 {
        return 0;
    }
    ((earned * 200 + total) / (total * 2)) as i32
}

/// Grades the recorded answers.
///
/// Only answered questions contribute to `total_points`; an assigned but
/// unanswered question is neither earned nor counted.
pub fn grade(answers: &[ExamAnswer], questions: &HashMap<i64, Question>) -> Grade {
    let mut earned_points = 0i64;
    let mut total_points = 0i64;
    let mut marks = Vec::with_capacity(answers.len());

    for answer in answers {
        let Some(question) = questions.get(&answer.question_id) else {
            tracing::warn!(
                "Session {}: answered question {} no longer exists, not graded",
                answer.session_id,
                answer.question_id
            );
            continue;
        };

        let points = i64::from(question.points);
        total_points += points;

        let correct = is_answer_correct(&answer.selected_options, question);
        if correct {
            earned_points += points;
        }
        marks.push((question.id, correct));
    }

    Grade {
        earned_points,
        total_points,
        score: percentage(earned_points, total_points),
        marks,
    }
}

impl ExamEngine {
    /// Grades the session, moves it to `passed` or `failed`, and issues a
    /// certificate when passed.
    ///
    /// Completing an already finished session returns the stored result;
    /// a passed session that is still missing its certificate gets another
    /// issuance attempt.
    pub async fn complete_exam(&self, session_id: i64, user_id: i64) -> Result<ExamResult, AppError> {
        let session = self.owned_session(session_id, user_id).await?;
        if session.status.is_terminal() {
            tracing::info!("Session {} already {}, returning stored result", session_id, session.status);
            return Ok(self.stored_result(session).await);
        }

        let passing_score = match self.store.find_certification(session.certification_id).await? {
            Some(certification) => certification
                .passing_score
                .unwrap_or(self.default_passing_score),
            None => {
                tracing::warn!(
                    "Certification {} of session {} is gone, using default passing score",
                    session.certification_id,
                    session_id
                );
                self.default_passing_score
            }
        };

        // Answers can only target assigned questions, so the assignment
        // bounds what grading needs to load.
        let assigned: Vec<i64> = self
            .store
            .assignments(session_id)
            .await?
            .iter()
            .map(|a| a.question_id)
            .collect();
        let questions: HashMap<i64, Question> = self
            .store
            .questions_by_ids(&assigned)
            .await?
            .into_iter()
            .map(|q| (q.id, q))
            .collect();

        let decide = |answers: &[ExamAnswer]| {
            let score = grade(answers, &questions).score;
            SessionOutcome {
                status: if score >= passing_score {
                    SessionStatus::Passed
                } else {
                    SessionStatus::Failed
                },
                score,
                end_time: Utc::now(),
            }
        };

        let Some(finished) = self.store.finish_session(session_id, &decide).await? else {
            // A concurrent completion got there first; report its result.
            let current = self
                .store
                .find_session(session_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Exam session {} not found", session_id)))?;
            return Ok(self.stored_result(current).await);
        };
        let outcome = finished.outcome;
        let grade = grade(&finished.answers, &questions);

        for (question_id, correct) in &grade.marks {
            if let Err(e) = self.store.mark_answer(session_id, *question_id, *correct).await {
                tracing::warn!(
                    "Failed to mark answer {}/{} as {}: {}",
                    session_id,
                    question_id,
                    correct,
                    e
                );
            }
        }

        tracing::info!(
            "Session {} completed: {}/{} points, score {} (pass mark {}), {}",
            session_id,
            grade.earned_points,
            grade.total_points,
            grade.score,
            passing_score,
            outcome.status
        );

        let closed = ExamSession {
            status: outcome.status,
            score: Some(outcome.score),
            end_time: Some(outcome.end_time),
            time_remaining: 0,
            ..session
        };
        Ok(self.stored_result(closed).await)
    }

    /// Result of a terminal session, issuing the certificate if a passed
    /// session does not have one yet.
    async fn stored_result(&self, session: ExamSession) -> ExamResult {
        let passed = session.status == SessionStatus::Passed;
        let mut result = ExamResult {
            session_id: session.id,
            score: session.score.unwrap_or(0),
            passed,
            certificate: None,
            certificate_error: None,
        };

        if passed {
            match self.issue_certificate(&session).await {
                Ok(certificate) => result.certificate = Some(certificate),
                Err(e) => {
                    tracing::error!("Certificate issuance failed for session {}: {}", session.id, e);
                    result.certificate_error = Some(e.to_string());
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;
    use crate::{
        exam::{DEFAULT_PASSING_SCORE, SeededEntropy, test_support::*},
        models::{
            certificate::{Certificate, NewCertificate},
            certification::{Certification, NewCertification},
            exam_session::{ExamQuestionAssignment, FinishedSession, NewExamSession},
            question::{AnswerOption, NewQuestion, QuestionType},
        },
        store::{MemoryStore, StoreOp, StoreResult},
    };

    /// Delegates to a `MemoryStore`, recording one extra answer while
    /// completion loads the bank: after the session was read as running and
    /// before it is closed.
    struct AnswerDuringCompletion {
        inner: Arc<MemoryStore>,
        pending: Mutex<Option<(i64, i64, Vec<i64>)>>,
        acknowledged: Mutex<Option<bool>>,
    }

    #[async_trait]
    impl ExamStore for AnswerDuringCompletion {
        async fn find_certification(&self, id: i64) -> StoreResult<Option<Certification>> {
            self.inner.find_certification(id).await
        }

        async fn insert_certification(&self, new: NewCertification) -> StoreResult<Certification> {
            self.inner.insert_certification(new).await
        }

        async fn insert_question(&self, certification_id: i64, new: NewQuestion) -> StoreResult<Question> {
            self.inner.insert_question(certification_id, new).await
        }

        async fn active_questions(&self, certification_id: i64) -> StoreResult<Vec<Question>> {
            self.inner.active_questions(certification_id).await
        }

        async fn questions_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Question>> {
            let pending = self.pending.lock().unwrap().take();
            if let Some((session_id, question_id, selected)) = pending {
                let written = self
                    .inner
                    .upsert_answer(session_id, question_id, &selected)
                    .await?;
                *self.acknowledged.lock().unwrap() = Some(written.is_some());
            }
            self.inner.questions_by_ids(ids).await
        }

        async fn insert_session(&self, new: NewExamSession) -> StoreResult<ExamSession> {
            self.inner.insert_session(new).await
        }

        async fn delete_session(&self, id: i64) -> StoreResult<()> {
            self.inner.delete_session(id).await
        }

        async fn find_session(&self, id: i64) -> StoreResult<Option<ExamSession>> {
            self.inner.find_session(id).await
        }

        async fn sessions_for_user(&self, user_id: i64) -> StoreResult<Vec<ExamSession>> {
            self.inner.sessions_for_user(user_id).await
        }

        async fn insert_assignments(&self, session_id: i64, question_ids: &[i64]) -> StoreResult<()> {
            self.inner.insert_assignments(session_id, question_ids).await
        }

        async fn assignments(&self, session_id: i64) -> StoreResult<Vec<ExamQuestionAssignment>> {
            self.inner.assignments(session_id).await
        }

        async fn update_time_remaining(&self, session_id: i64, seconds: i32) -> StoreResult<bool> {
            self.inner.update_time_remaining(session_id, seconds).await
        }

        async fn upsert_answer(
            &self,
            session_id: i64,
            question_id: i64,
            selected_options: &[i64],
        ) -> StoreResult<Option<ExamAnswer>> {
            self.inner
                .upsert_answer(session_id, question_id, selected_options)
                .await
        }

        async fn answers(&self, session_id: i64) -> StoreResult<Vec<ExamAnswer>> {
            self.inner.answers(session_id).await
        }

        async fn mark_answer(&self, session_id: i64, question_id: i64, is_correct: bool) -> StoreResult<()> {
            self.inner.mark_answer(session_id, question_id, is_correct).await
        }

        async fn finish_session(
            &self,
            session_id: i64,
            grade: &(dyn for<'a> Fn(&'a [ExamAnswer]) -> SessionOutcome + Send + Sync),
        ) -> StoreResult<Option<FinishedSession>> {
            self.inner.finish_session(session_id, grade).await
        }

        async fn insert_certificate(&self, new: NewCertificate) -> StoreResult<Certificate> {
            self.inner.insert_certificate(new).await
        }

        async fn find_certificate_by_session(&self, session_id: i64) -> StoreResult<Option<Certificate>> {
            self.inner.find_certificate_by_session(session_id).await
        }

        async fn find_certificate_by_hash(&self, verification_hash: &str) -> StoreResult<Option<Certificate>> {
            self.inner.find_certificate_by_hash(verification_hash).await
        }
    }

    fn multi_question(id: i64, points: i32) -> Question {
        Question {
            id,
            certification_id: 1,
            question_text: format!("Question {}", id),
            question_type: QuestionType::MultiChoice,
            points,
            is_active: true,
            options: vec![
                AnswerOption { id: id * 10 + 1, question_id: id, option_text: "A".into(), is_correct: true },
                AnswerOption { id: id * 10 + 2, question_id: id, option_text: "B".into(), is_correct: true },
                AnswerOption { id: id * 10 + 3, question_id: id, option_text: "C".into(), is_correct: false },
            ],
        }
    }

    fn answer(question_id: i64, selected: &[i64]) -> ExamAnswer {
        ExamAnswer {
            session_id: 1,
            question_id,
            selected_options: selected.to_vec(),
            is_correct: None,
            answered_at: Utc::now(),
        }
    }

    #[test]
    fn test_exact_set_is_correct() {
        let q = multi_question(1, 1);
        assert!(is_answer_correct(&[12, 11], &q));
    }

    #[test]
    fn test_superset_is_incorrect() {
        let q = multi_question(1, 1);
        assert!(!is_answer_correct(&[11, 12, 13], &q));
    }

    #[test]
    fn test_subset_is_incorrect() {
        let q = multi_question(1, 1);
        assert!(!is_answer_correct(&[11], &q));
        assert!(!is_answer_correct(&[], &q));
    }

    #[test]
    fn test_percentage_rounding() {
        assert_eq!(percentage(3, 4), 75);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(1, 8), 13);
        assert_eq!(percentage(0, 0), 0);
    }

    #[test]
    fn test_weighted_grade() {
        let mut questions = HashMap::new();
        questions.insert(1, multi_question(1, 1));
        questions.insert(2, multi_question(2, 3));

        let answers = vec![answer(1, &[11]), answer(2, &[21, 22])];
        let grade = grade(&answers, &questions);

        assert_eq!(grade.earned_points, 3);
        assert_eq!(grade.total_points, 4);
        assert_eq!(grade.score, 75);
        assert_eq!(grade.marks, vec![(1, false), (2, true)]);
    }

    #[test]
    fn test_grade_skips_missing_questions() {
        let mut questions = HashMap::new();
        questions.insert(1, multi_question(1, 2));

        let grade = grade(&[answer(1, &[11, 12]), answer(9, &[91])], &questions);
        assert_eq!(grade.total_points, 2);
        assert_eq!(grade.score, 100);
    }

    #[tokio::test]
    async fn test_complete_weighted_session() {
        let store = Arc::new(MemoryStore::new());
        let cert = seed_certification(&store, 30, Some(70), 2).await;
        let light = seed_single_choice(&store, cert.id, "Light", 1).await;
        let heavy = seed_single_choice(&store, cert.id, "Heavy", 3).await;
        let engine = engine(store.clone(), 1);
        let session = engine.start_exam(cert.id, 1).await.unwrap();

        engine
            .submit_answer(session.id, 1, light.id, vec![light.options[1].id])
            .await
            .unwrap();
        engine
            .submit_answer(session.id, 1, heavy.id, vec![heavy.options[0].id])
            .await
            .unwrap();

        let result = engine.complete_exam(session.id, 1).await.unwrap();
        assert_eq!(result.score, 75);
        assert!(result.passed);
        assert!(result.certificate.is_some());

        let stored = store.find_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Passed);
        assert_eq!(stored.score, Some(75));
        assert_eq!(stored.time_remaining, 0);
        assert!(stored.end_time.is_some());

        let marks: HashMap<i64, Option<bool>> = store
            .answers(session.id)
            .await
            .unwrap()
            .into_iter()
            .map(|a| (a.question_id, a.is_correct))
            .collect();
        assert_eq!(marks[&light.id], Some(false));
        assert_eq!(marks[&heavy.id], Some(true));
    }

    #[tokio::test]
    async fn test_complete_without_answers_fails() {
        let store = Arc::new(MemoryStore::new());
        let cert = seed_certification(&store, 30, None, 2).await;
        seed_single_choice(&store, cert.id, "Q1", 1).await;
        seed_single_choice(&store, cert.id, "Q2", 1).await;
        let engine = engine(store.clone(), 1);
        let session = engine.start_exam(cert.id, 1).await.unwrap();

        let result = engine.complete_exam(session.id, 1).await.unwrap();
        assert_eq!(result.score, 0);
        assert!(!result.passed);
        assert!(result.certificate.is_none());
        assert_eq!(store.certificate_count().await, 0);
    }

    #[tokio::test]
    async fn test_unanswered_questions_do_not_count() {
        let store = Arc::new(MemoryStore::new());
        let cert = seed_certification(&store, 30, None, 3).await;
        let q1 = seed_single_choice(&store, cert.id, "Q1", 1).await;
        seed_single_choice(&store, cert.id, "Q2", 1).await;
        seed_single_choice(&store, cert.id, "Q3", 1).await;
        let engine = engine(store.clone(), 1);
        let session = engine.start_exam(cert.id, 1).await.unwrap();

        engine
            .submit_answer(session.id, 1, q1.id, vec![q1.options[0].id])
            .await
            .unwrap();

        let result = engine.complete_exam(session.id, 1).await.unwrap();
        assert_eq!(result.score, 100);
        assert!(result.passed);
    }

    #[tokio::test]
    async fn test_complete_twice_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let cert = seed_certification(&store, 30, None, 1).await;
        let q = seed_single_choice(&store, cert.id, "Q1", 1).await;
        let engine = engine(store.clone(), 1);
        let session = engine.start_exam(cert.id, 1).await.unwrap();
        engine
            .submit_answer(session.id, 1, q.id, vec![q.options[0].id])
            .await
            .unwrap();

        let first = engine.complete_exam(session.id, 1).await.unwrap();
        let second = engine.complete_exam(session.id, 1).await.unwrap();

        assert_eq!(first.score, second.score);
        assert_eq!(first.passed, second.passed);
        assert_eq!(first.certificate, second.certificate);
        assert_eq!(store.certificate_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_completion_issues_one_certificate() {
        let store = Arc::new(MemoryStore::new());
        let cert = seed_certification(&store, 30, None, 1).await;
        let q = seed_single_choice(&store, cert.id, "Q1", 1).await;
        let engine = engine(store.clone(), 1);
        let session = engine.start_exam(cert.id, 1).await.unwrap();
        engine
            .submit_answer(session.id, 1, q.id, vec![q.options[0].id])
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            engine.complete_exam(session.id, 1),
            engine.complete_exam(session.id, 1)
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.certificate, b.certificate);
        assert_eq!(store.certificate_count().await, 1);
    }

    #[tokio::test]
    async fn test_mark_failure_does_not_fail_completion() {
        let store = Arc::new(MemoryStore::new());
        let cert = seed_certification(&store, 30, None, 1).await;
        let q = seed_single_choice(&store, cert.id, "Q1", 1).await;
        let engine = engine(store.clone(), 1);
        let session = engine.start_exam(cert.id, 1).await.unwrap();
        engine
            .submit_answer(session.id, 1, q.id, vec![q.options[0].id])
            .await
            .unwrap();
        store.fail_on(StoreOp::MarkAnswer);

        let result = engine.complete_exam(session.id, 1).await.unwrap();
        assert!(result.passed);
        assert_eq!(store.answers(session.id).await.unwrap()[0].is_correct, None);
    }

    #[tokio::test]
    async fn test_failed_issuance_keeps_pass_and_retries() {
        let store = Arc::new(MemoryStore::new());
        let cert = seed_certification(&store, 30, None, 1).await;
        let q = seed_single_choice(&store, cert.id, "Q1", 1).await;
        let engine = engine(store.clone(), 1);
        let session = engine.start_exam(cert.id, 1).await.unwrap();
        engine
            .submit_answer(session.id, 1, q.id, vec![q.options[0].id])
            .await
            .unwrap();

        store.fail_on(StoreOp::InsertCertificate);
        let first = engine.complete_exam(session.id, 1).await.unwrap();
        assert!(first.passed);
        assert!(first.certificate.is_none());
        assert!(first.certificate_error.is_some());
        let stored = store.find_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Passed);

        store.clear_failures();
        let retry = engine.complete_exam(session.id, 1).await.unwrap();
        assert!(retry.passed);
        assert_eq!(retry.score, first.score);
        assert!(retry.certificate.is_some());
        assert!(retry.certificate_error.is_none());
        assert_eq!(store.certificate_count().await, 1);
    }

    #[tokio::test]
    async fn test_certification_passing_score_is_used() {
        let store = Arc::new(MemoryStore::new());
        let cert = seed_certification(&store, 30, Some(80), 4).await;
        let mut questions = Vec::new();
        for i in 0..4 {
            questions.push(seed_single_choice(&store, cert.id, &format!("Q{}", i), 1).await);
        }
        let engine = engine(store.clone(), 1);
        let session = engine.start_exam(cert.id, 1).await.unwrap();

        // 3 of 4 correct: 75, below the 80 pass mark.
        for (i, q) in questions.iter().enumerate() {
            let pick = if i == 0 { q.options[1].id } else { q.options[0].id };
            engine.submit_answer(session.id, 1, q.id, vec![pick]).await.unwrap();
        }

        let result = engine.complete_exam(session.id, 1).await.unwrap();
        assert_eq!(result.score, 75);
        assert!(!result.passed);
    }

    #[tokio::test]
    async fn test_answer_acknowledged_during_completion_is_graded() {
        let inner = Arc::new(MemoryStore::new());
        let cert = seed_certification(&inner, 30, None, 2).await;
        let q1 = seed_single_choice(&inner, cert.id, "Q1", 1).await;
        let q2 = seed_single_choice(&inner, cert.id, "Q2", 1).await;
        let setup = engine(inner.clone(), 1);
        let session = setup.start_exam(cert.id, 1).await.unwrap();
        setup
            .submit_answer(session.id, 1, q1.id, vec![q1.options[1].id])
            .await
            .unwrap();

        let store = Arc::new(AnswerDuringCompletion {
            inner: inner.clone(),
            pending: Mutex::new(Some((session.id, q2.id, vec![q2.options[0].id]))),
            acknowledged: Mutex::new(None),
        });
        let engine = ExamEngine::new(
            store.clone(),
            Arc::new(SeededEntropy::new(1)),
            DEFAULT_PASSING_SCORE,
        );

        let result = engine.complete_exam(session.id, 1).await.unwrap();

        assert_eq!(*store.acknowledged.lock().unwrap(), Some(true));
        assert_eq!(result.score, 50);
        assert!(!result.passed);

        let marks: HashMap<i64, Option<bool>> = inner
            .answers(session.id)
            .await
            .unwrap()
            .into_iter()
            .map(|a| (a.question_id, a.is_correct))
            .collect();
        assert_eq!(marks[&q1.id], Some(false));
        assert_eq!(marks[&q2.id], Some(true));
    }

    #[tokio::test]
    async fn test_racing_answer_is_either_graded_or_rejected() {
        let store = Arc::new(MemoryStore::new());
        let cert = seed_certification(&store, 30, None, 2).await;
        let q1 = seed_single_choice(&store, cert.id, "Q1", 1).await;
        let q2 = seed_single_choice(&store, cert.id, "Q2", 1).await;
        let engine = engine(store.clone(), 1);
        let session = engine.start_exam(cert.id, 1).await.unwrap();
        engine
            .submit_answer(session.id, 1, q1.id, vec![q1.options[1].id])
            .await
            .unwrap();

        let (submitted, completed) = tokio::join!(
            engine.submit_answer(session.id, 1, q2.id, vec![q2.options[0].id]),
            engine.complete_exam(session.id, 1)
        );
        let result = completed.unwrap();

        match submitted {
            Ok(_) => assert_eq!(result.score, 50),
            Err(AppError::InvalidState(_)) => assert_eq!(result.score, 0),
            Err(e) => panic!("unexpected error: {:?}", e),
        }
        let unmarked = store
            .answers(session.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|a| a.is_correct.is_none())
            .count();
        assert_eq!(unmarked, 0);
    }

    #[tokio::test]
    async fn test_finish_failure_leaves_session_open() {
        let store = Arc::new(MemoryStore::new());
        let cert = seed_certification(&store, 30, None, 1).await;
        let q = seed_single_choice(&store, cert.id, "Q1", 1).await;
        let engine = engine(store.clone(), 1);
        let session = engine.start_exam(cert.id, 1).await.unwrap();
        engine
            .submit_answer(session.id, 1, q.id, vec![q.options[0].id])
            .await
            .unwrap();

        store.fail_on(StoreOp::FinishSession);
        let err = engine.complete_exam(session.id, 1).await.unwrap_err();
        assert!(matches!(err, AppError::StoreFailure(_)));

        let stored = store.find_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::InProgress);
        assert_eq!(stored.score, None);
        assert_eq!(store.certificate_count().await, 0);

        store.clear_failures();
        let result = engine.complete_exam(session.id, 1).await.unwrap();
        assert!(result.passed);
    }
}
