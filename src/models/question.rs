// src/models/question.rs

use std::fmt;

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

/// Question type: single choice (exactly one correct option) or
/// multi choice (one or more correct options).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    SingleChoice,
    MultiChoice,
}

impl QuestionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultiChoice => "multi_choice",
        }
    }
}

/// Raised when a stored enum column holds a value this build does not know.
#[derive(Debug)]
pub struct UnknownVariant(pub String);

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown variant '{}'", self.0)
    }
}

impl std::error::Error for UnknownVariant {}

impl TryFrom<String> for QuestionType {
    type Error = UnknownVariant;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "single_choice" => Ok(QuestionType::SingleChoice),
            "multi_choice" => Ok(QuestionType::MultiChoice),
            _ => Err(UnknownVariant(value)),
        }
    }
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub certification_id: i64,

    /// The text content of the question.
    pub question_text: String,

    #[sqlx(try_from = "String")]
    pub question_type: QuestionType,

    /// Weight of the question in the final score.
    pub points: i32,

    pub is_active: bool,

    /// Options are stored in 'answer_options' and attached after loading.
    #[sqlx(skip)]
    #[serde(default)]
    pub options: Vec<AnswerOption>,
}

impl Question {
    /// Ids of the options marked correct, in ascending order.
    pub fn correct_option_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .options
            .iter()
            .filter(|o| o.is_correct)
            .map(|o| o.id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

/// Represents the 'answer_options' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: i64,
    pub question_id: i64,
    pub option_text: String,
    pub is_correct: bool,
}

/// DTO for sending a question to the exam taker (no correctness flags).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicQuestion {
    pub id: i64,
    pub order_num: i32,
    pub question_text: String,
    pub question_type: QuestionType,
    pub points: i32,
    pub options: Vec<PublicOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicOption {
    pub id: i64,
    pub option_text: String,
}

impl PublicQuestion {
    pub fn from_question(question: &Question, order_num: i32) -> Self {
        Self {
            id: question.id,
            order_num,
            question_text: question.question_text.clone(),
            question_type: question.question_type,
            points: question.points,
            options: question
                .options
                .iter()
                .map(|o| PublicOption {
                    id: o.id,
                    option_text: o.option_text.clone(),
                })
                .collect(),
        }
    }
}

/// DTO for seeding a question with its options.
///
/// Option count and correct flags are not checked here; the bank validator
/// reports those problems.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewQuestion {
    #[validate(length(min = 1, max = 2000))]
    pub question_text: String,
    pub question_type: QuestionType,
    #[serde(default = "default_points")]
    #[validate(range(min = 1))]
    pub points: i32,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[validate(length(max = 20))]
    pub options: Vec<NewAnswerOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAnswerOption {
    pub option_text: String,
    #[serde(default)]
    pub is_correct: bool,
}

fn default_points() -> i32 {
    1
}

fn default_active() -> bool {
    true
}
