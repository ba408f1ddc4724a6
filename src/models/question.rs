// src/models/question.rs

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::engine::{CompetencyLevel, OptionLabel};

/// The four option texts of a question, keyed a-d.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct QuestionOptions {
    #[validate(length(min = 1, max = 500))]
    pub a: String,
    #[validate(length(min = 1, max = 500))]
    pub b: String,
    #[validate(length(min = 1, max = 500))]
    pub c: String,
    #[validate(length(min = 1, max = 500))]
    pub d: String,
}

/// A bank question as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: i64,

    /// Competency area the question belongs to (e.g. "Digital content creation").
    pub competency: String,

    pub level: CompetencyLevel,

    pub question_text: String,

    pub options: QuestionOptions,

    /// Never leaves the server on candidate routes; see `PublicQuestion`.
    pub correct_answer: OptionLabel,

    /// Inactive questions are never selected.
    pub is_active: bool,

    /// How many step attempts this question has been served in. Once
    /// non-zero the question is frozen.
    pub times_served: i64,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Question {
    pub fn is_frozen(&self) -> bool {
        self.times_served > 0
    }
}

/// DTO for sending a question to a candidate (no answer key).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicQuestion {
    pub id: i64,
    pub competency: String,
    pub level: CompetencyLevel,
    pub question_text: String,
    pub options: QuestionOptions,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        Self {
            id: q.id,
            competency: q.competency,
            level: q.level,
            question_text: q.question_text,
            options: q.options,
        }
    }
}

/// DTO for creating a new question.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateQuestionRequest {
    #[validate(length(min = 1, max = 100))]
    pub competency: String,
    pub level: CompetencyLevel,
    #[validate(length(min = 1, max = 1000))]
    pub question_text: String,
    #[validate(nested)]
    pub options: QuestionOptions,
    pub correct_answer: OptionLabel,
}

/// Fields are optional; only present ones are changed.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateQuestionRequest {
    #[validate(length(min = 1, max = 100))]
    pub competency: Option<String>,
    pub level: Option<CompetencyLevel>,
    #[validate(length(min = 1, max = 1000))]
    pub question_text: Option<String>,
    #[validate(nested)]
    pub options: Option<QuestionOptions>,
    pub correct_answer: Option<OptionLabel>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BulkCreateQuestionsRequest {
    #[validate(length(min = 1, max = 500))]
    pub questions: Vec<CreateQuestionRequest>,
}

/// Active question count for one level.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelStats {
    pub level: CompetencyLevel,
    pub active: i64,
    pub total: i64,
}
