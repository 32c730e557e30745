use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use crate::validate::RuleSet;

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Course {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub capstone_title: Option<String>,
    pub survey_form: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct Module {
    pub id: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub slug: String,
    pub position: i32,
    pub content: String,
    pub quiz_form: Option<Json<QuizForm>>,
    pub outro: Option<String>,
    pub section_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct QuizForm {
    pub questions: Vec<Question>,
    /// percentage required to pass
    pub passing_score: u32,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    pub options: Vec<QuizOption>,
    pub correct_option_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct QuizOption {
    pub id: String,
    pub text: String,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct QuizOutcome {
    pub score: f64,
    pub passed: bool,
}

impl QuizForm {
    /// Scores a submission (question id -> chosen option id). Unanswered
    /// questions count as wrong.
    pub fn grade(&self, answers: &HashMap<String, String>) -> QuizOutcome {
        let total = self.questions.len();
        if total == 0 {
            return QuizOutcome {
                score: 0.0,
                passed: false,
            };
        }
        let correct = self
            .questions
            .iter()
            .filter(|q| answers.get(&q.id) == Some(&q.correct_option_id))
            .count();
        let score = correct as f64 * 100.0 / total as f64;
        QuizOutcome {
            score,
            passed: score >= self.passing_score as f64,
        }
    }
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct SchemaVersion {
    pub id: Uuid,
    pub version: i32,
    pub rules: Json<RuleSet>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "progress_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    Lesson,
    QuizAttempt,
}

#[derive(sqlx::FromRow, Serialize, Deserialize, Debug, Clone)]
pub struct ProgressRow {
    pub id: Uuid,
    pub user_id: String,
    pub module_id: Uuid,
    pub kind: ProgressKind,
    pub lesson_idx: Option<i32>,
    pub score: Option<f64>,
    pub passed: Option<bool>,
    pub answers: Option<serde_json::Value>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// --- request payloads ---

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateCourseReq {
    pub title: String,
    pub slug: String,
    #[serde(default)]
    pub description: String,
    pub capstone_title: Option<String>,
    pub survey_form: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ModuleReq {
    pub title: String,
    pub slug: String,
    pub position: i32,
    #[serde(default)]
    pub content: String,
    pub quiz_form: Option<QuizForm>,
    pub outro: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateSchemaVersionReq {
    pub version: i32,
    pub rules: RuleSet,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct QuizSubmission {
    /// question id -> chosen option id
    pub answers: HashMap<String, String>,
}
