// src/exam/validator.rs

use serde::Serialize;

use crate::{
    models::question::{Question, QuestionType},
    store::ExamStore,
};

const EXCERPT_CHARS: usize = 50;

/// Result of checking a certification's question bank.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    #[serde(skip)]
    pub valid_questions: Vec<Question>,
    pub valid_count: usize,
    pub issues: Vec<String>,
    /// The bank could not be read; `issues` holds the store's message.
    #[serde(skip)]
    pub store_failed: bool,
}

impl ValidationReport {
    fn failed(issue: String) -> Self {
        Self {
            is_valid: false,
            valid_questions: Vec::new(),
            valid_count: 0,
            issues: vec![issue],
            store_failed: false,
        }
    }
}

/// Lists every structural problem of a question. Empty means valid.
pub fn question_problems(question: &Question) -> Vec<&'static str> {
    let mut problems = Vec::new();

    if question.options.len() < 2 {
        problems.push("needs at least 2 answer options");
    }
    if question.options.iter().any(|o| o.option_text.trim().is_empty()) {
        problems.push("has an answer option with empty text");
    }

    let correct = question.options.iter().filter(|o| o.is_correct).count();
    if correct == 0 {
        problems.push("has no correct answer option");
    } else if question.question_type == QuestionType::SingleChoice && correct != 1 {
        problems.push("is single choice but has more than one correct option");
    }

    problems
}

pub fn is_valid_question(question: &Question) -> bool {
    question_problems(question).is_empty()
}

/// One diagnostic line per failing question, led by an excerpt of its text.
pub fn describe_issue(question: &Question, problems: &[&str]) -> String {
    format!("\"{}\" {}", excerpt(&question.question_text), problems.join("; "))
}

fn excerpt(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(EXCERPT_CHARS).collect();
    format!("{}...", head)
}

/// Splits a bank into valid questions and issue strings.
pub fn check_questions(questions: Vec<Question>) -> ValidationReport {
    if questions.is_empty() {
        return ValidationReport::failed(
            "No active questions found for this certification".to_string(),
        );
    }

    let mut valid_questions = Vec::with_capacity(questions.len());
    let mut issues = Vec::new();

    for question in questions {
        let problems = question_problems(&question);
        if problems.is_empty() {
            valid_questions.push(question);
        } else {
            issues.push(describe_issue(&question, &problems));
        }
    }

    ValidationReport {
        is_valid: !valid_questions.is_empty(),
        valid_count: valid_questions.len(),
        valid_questions,
        issues,
        store_failed: false,
    }
}

/// Fetches the active bank of a certification and checks it.
/// Store failures are reported as an invalid bank, never as an error.
pub async fn validate_bank(store: &dyn ExamStore, certification_id: i64) -> ValidationReport {
    match store.active_questions(certification_id).await {
        Ok(questions) => {
            let report = check_questions(questions);
            if !report.issues.is_empty() {
                tracing::debug!(
                    certification_id,
                    valid = report.valid_count,
                    issues = report.issues.len(),
                    "Question bank has structural issues"
                );
            }
            report
        }
        Err(e) => {
            tracing::error!("Failed to load question bank {}: {}", certification_id, e);
            ValidationReport {
                store_failed: true,
                ..ValidationReport::failed(e.to_string())
            }
        }
    }
}
