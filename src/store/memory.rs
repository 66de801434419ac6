// src/store/memory.rs

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Mutex,
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

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
    store::{ExamStore, StoreError, StoreResult},
};

/// Store operations that can be made to fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ActiveQuestions,
    InsertAssignments,
    DeleteSession,
    UpsertAnswer,
    MarkAnswer,
    FinishSession,
    InsertCertificate,
}

#[derive(Default)]
struct Tables {
    next_id: i64,
    certifications: BTreeMap<i64, Certification>,
    questions: BTreeMap<i64, Question>,
    sessions: BTreeMap<i64, ExamSession>,
    assignments: HashMap<i64, Vec<ExamQuestionAssignment>>,
    answers: BTreeMap<(i64, i64), ExamAnswer>,
    certificates: BTreeMap<i64, Certificate>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// In-process record store with the same keys, column checks and
/// conditional-write semantics as the PostgreSQL store.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    failing: Mutex<HashSet<StoreOp>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call of `op` fail with a backend error.
    pub fn fail_on(&self, op: StoreOp) {
        self.failing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(op);
    }

    pub fn clear_failures(&self) {
        self.failing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Number of certificate rows, for assertions on issuance.
    pub async fn certificate_count(&self) -> usize {
        self.tables.read().await.certificates.len()
    }

    /// Number of answer rows stored for a session.
    pub async fn answer_count(&self, session_id: i64) -> usize {
        self.tables
            .read()
            .await
            .answers
            .keys()
            .filter(|(sid, _)| *sid == session_id)
            .count()
    }

    /// Overwrites an option's text and correct flag, simulating edits made
    /// to the bank after a session was assigned.
    pub async fn edit_option(&self, option_id: i64, option_text: &str, is_correct: bool) -> bool {
        let mut tables = self.tables.write().await;
        for question in tables.questions.values_mut() {
            if let Some(option) = question.options.iter_mut().find(|o| o.id == option_id) {
                option.option_text = option_text.to_string();
                option.is_correct = is_correct;
                return true;
            }
        }
        false
    }

    fn check(&self, op: StoreOp) -> StoreResult<()> {
        let failing = self
            .failing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if failing.contains(&op) {
            return Err(StoreError::Backend(format!("injected failure in {:?}", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl ExamStore for MemoryStore {
    async fn find_certification(&self, id: i64) -> StoreResult<Option<Certification>> {
        Ok(self.tables.read().await.certifications.get(&id).cloned())
    }

    async fn insert_certification(&self, new: NewCertification) -> StoreResult<Certification> {
        if new.duration_minutes <= 0 {
            return Err(StoreError::Backend(format!(
                "duration_minutes must be positive, got {}",
                new.duration_minutes
            )));
        }
        if new.passing_score.is_some_and(|score| !(0..=100).contains(&score)) {
            return Err(StoreError::Backend(format!(
                "passing_score must be within 0..=100, got {:?}",
                new.passing_score
            )));
        }

        let mut tables = self.tables.write().await;
        let certification = Certification {
            id: tables.next_id(),
            name: new.name,
            provider: new.provider,
            duration_minutes: new.duration_minutes,
            passing_score: new.passing_score,
            total_questions: new.total_questions,
            access_code: new.access_code,
            is_active: new.is_active,
        };
        tables
            .certifications
            .insert(certification.id, certification.clone());
        Ok(certification)
    }

    async fn insert_question(&self, certification_id: i64, new: NewQuestion) -> StoreResult<Question> {
        let mut tables = self.tables.write().await;
        if !tables.certifications.contains_key(&certification_id) {
            return Err(StoreError::Backend(format!(
                "certification {} does not exist",
                certification_id
            )));
        }

        if new.points <= 0 {
            return Err(StoreError::Backend(format!(
                "question points must be positive, got {}",
                new.points
            )));
        }

        let question_id = tables.next_id();
        let mut options = Vec::with_capacity(new.options.len());
        for option in new.options {
            options.push(AnswerOption {
                id: tables.next_id(),
                question_id,
                option_text: option.option_text,
                is_correct: option.is_correct,
            });
        }

        let question = Question {
            id: question_id,
            certification_id,
            question_text: new.question_text,
            question_type: new.question_type,
            points: new.points,
            is_active: new.is_active,
            options,
        };
        tables.questions.insert(question_id, question.clone());
        Ok(question)
    }

    async fn active_questions(&self, certification_id: i64) -> StoreResult<Vec<Question>> {
        self.check(StoreOp::ActiveQuestions)?;
        Ok(self
            .tables
            .read()
            .await
            .questions
            .values()
            .filter(|q| q.certification_id == certification_id && q.is_active)
            .cloned()
            .collect())
    }

    async fn questions_by_ids(&self, ids: &[i64]) -> StoreResult<Vec<Question>> {
        let tables = self.tables.read().await;
        let wanted: HashSet<i64> = ids.iter().copied().collect();
        Ok(tables
            .questions
            .values()
            .filter(|q| wanted.contains(&q.id))
            .cloned()
            .collect())
    }

    async fn insert_session(&self, new: NewExamSession) -> StoreResult<ExamSession> {
        let mut tables = self.tables.write().await;
        let session = ExamSession {
            id: tables.next_id(),
            user_id: new.user_id,
            certification_id: new.certification_id,
            status: SessionStatus::InProgress,
            time_remaining: new.time_remaining,
            start_time: Utc::now(),
            end_time: None,
            score: None,
        };
        tables.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn delete_session(&self, id: i64) -> StoreResult<()> {
        self.check(StoreOp::DeleteSession)?;
        let mut tables = self.tables.write().await;
        tables.sessions.remove(&id);
        tables.assignments.remove(&id);
        tables.answers.retain(|(sid, _), _| *sid != id);
        Ok(())
    }

    async fn find_session(&self, id: i64) -> StoreResult<Option<ExamSession>> {
        Ok(self.tables.read().await.sessions.get(&id).cloned())
    }

    async fn sessions_for_user(&self, user_id: i64) -> StoreResult<Vec<ExamSession>> {
        let tables = self.tables.read().await;
        let mut sessions: Vec<ExamSession> = tables
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));
        Ok(sessions)
    }

    async fn insert_assignments(&self, session_id: i64, question_ids: &[i64]) -> StoreResult<()> {
        self.check(StoreOp::InsertAssignments)?;
        let mut tables = self.tables.write().await;
        if !tables.sessions.contains_key(&session_id) {
            return Err(StoreError::Backend(format!("session {} does not exist", session_id)));
        }
        if tables.assignments.contains_key(&session_id) {
            return Err(StoreError::Conflict(format!(
                "session {} already has an assignment",
                session_id
            )));
        }

        let rows = question_ids
            .iter()
            .enumerate()
            .map(|(idx, question_id)| ExamQuestionAssignment {
                session_id,
                question_id: *question_id,
                order_num: idx as i32 + 1,
            })
            .collect();
        tables.assignments.insert(session_id, rows);
        Ok(())
    }

    async fn assignments(&self, session_id: i64) -> StoreResult<Vec<ExamQuestionAssignment>> {
        let tables = self.tables.read().await;
        let mut rows = tables.assignments.get(&session_id).cloned().unwrap_or_default();
        rows.sort_by_key(|a| a.order_num);
        Ok(rows)
    }

    async fn update_time_remaining(&self, session_id: i64, seconds: i32) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        match tables.sessions.get_mut(&session_id) {
            Some(session) if session.status == SessionStatus::InProgress => {
                session.time_remaining = seconds;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn upsert_answer(
        &self,
        session_id: i64,
        question_id: i64,
        selected_options: &[i64],
    ) -> StoreResult<Option<ExamAnswer>> {
        self.check(StoreOp::UpsertAnswer)?;
        let mut tables = self.tables.write().await;
        let in_progress = tables
            .sessions
            .get(&session_id)
            .is_some_and(|s| s.status == SessionStatus::InProgress);
        if !in_progress {
            return Ok(None);
        }

        let answer = ExamAnswer {
            session_id,
            question_id,
            selected_options: selected_options.to_vec(),
            is_correct: None,
            answered_at: Utc::now(),
        };
        tables
            .answers
            .insert((session_id, question_id), answer.clone());
        Ok(Some(answer))
    }

    async fn answers(&self, session_id: i64) -> StoreResult<Vec<ExamAnswer>> {
        let tables = self.tables.read().await;
        Ok(tables
            .answers
            .range((session_id, i64::MIN)..=(session_id, i64::MAX))
            .map(|(_, answer)| answer.clone())
            .collect())
    }

    async fn mark_answer(&self, session_id: i64, question_id: i64, is_correct: bool) -> StoreResult<()> {
        self.check(StoreOp::MarkAnswer)?;
        let mut tables = self.tables.write().await;
        if let Some(answer) = tables.answers.get_mut(&(session_id, question_id)) {
            answer.is_correct = Some(is_correct);
        }
        Ok(())
    }

    async fn finish_session(
        &self,
        session_id: i64,
        grade: &(dyn for<'a> Fn(&'a [ExamAnswer]) -> SessionOutcome + Send + Sync),
    ) -> StoreResult<Option<FinishedSession>> {
        self.check(StoreOp::FinishSession)?;
        let mut tables = self.tables.write().await;
        let in_progress = tables
            .sessions
            .get(&session_id)
            .is_some_and(|s| s.status == SessionStatus::InProgress);
        if !in_progress {
            return Ok(None);
        }

        let answers: Vec<ExamAnswer> = tables
            .answers
            .range((session_id, i64::MIN)..=(session_id, i64::MAX))
            .map(|(_, answer)| answer.clone())
            .collect();
        let outcome = grade(answers.as_slice());

        if let Some(session) = tables.sessions.get_mut(&session_id) {
            session.status = outcome.status;
            session.score = Some(outcome.score);
            session.end_time = Some(outcome.end_time);
            session.time_remaining = 0;
        }
        Ok(Some(FinishedSession { outcome, answers }))
    }

    async fn insert_certificate(&self, new: NewCertificate) -> StoreResult<Certificate> {
        self.check(StoreOp::InsertCertificate)?;
        let mut tables = self.tables.write().await;
        for existing in tables.certificates.values() {
            if existing.session_id == new.session_id {
                return Err(StoreError::Conflict(format!(
                    "session {} already has a certificate",
                    new.session_id
                )));
            }
            if existing.certificate_number == new.certificate_number {
                return Err(StoreError::Conflict("duplicate certificate_number".to_string()));
            }
            if existing.verification_hash == new.verification_hash {
                return Err(StoreError::Conflict("duplicate verification_hash".to_string()));
            }
        }

        let certificate = Certificate {
            id: tables.next_id(),
            certificate_number: new.certificate_number,
            user_id: new.user_id,
            certification_id: new.certification_id,
            session_id: new.session_id,
            verification_hash: new.verification_hash,
            issued_at: new.issued_at,
            is_revoked: false,
        };
        tables.certificates.insert(certificate.id, certificate.clone());
        Ok(certificate)
    }

    async fn find_certificate_by_session(&self, session_id: i64) -> StoreResult<Option<Certificate>> {
        let tables = self.tables.read().await;
        Ok(tables
            .certificates
            .values()
            .find(|c| c.session_id == session_id)
            .cloned())
    }

    async fn find_certificate_by_hash(&self, verification_hash: &str) -> StoreResult<Option<Certificate>> {
        let tables = self.tables.read().await;
        Ok(tables
            .certificates
            .values()
            .find(|c| c.verification_hash == verification_hash)
            .cloned())
    }
}
