// Checks authored module content and quizzes against the active rule set.
// Rule values live in schema_versions.rules; nothing here is hard-coded.

use serde::{Deserialize, Serialize};

use crate::models::QuizForm;
use crate::sections::split_sections;

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct RuleSet {
    pub content: ContentRules,
    pub quiz: QuizRules,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ContentRules {
    pub min_sections: usize,
    pub max_sections: usize,
    /// every section must carry a markdown heading
    pub require_heading: bool,
    pub code_sections: CodeRequirement,
}

impl Default for ContentRules {
    fn default() -> Self {
        Self {
            min_sections: 1,
            max_sections: 50,
            require_heading: false,
            code_sections: CodeRequirement::None,
        }
    }
}

/// Which sections must contain a fenced code block.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CodeRequirement {
    None,
    All,
    /// the opening section is prose, every later one is an exercise
    AllButFirst,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct QuizRules {
    pub min_questions: usize,
    pub max_questions: usize,
    pub min_passing_score: u32,
    pub max_passing_score: u32,
}

impl Default for QuizRules {
    fn default() -> Self {
        Self {
            min_questions: 1,
            max_questions: 20,
            min_passing_score: 0,
            max_passing_score: 100,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub schema_version: i32,
}

/// Validates a module's content document and optional quiz form against a
/// rule set. Accumulates every violation instead of stopping at the first,
/// so authors can fix a document in one pass.
pub fn validate_module(
    content: &str,
    quiz: Option<&QuizForm>,
    rules: &RuleSet,
    schema_version: i32,
) -> ValidationReport {
    let mut errors = Vec::new();

    let sections = split_sections(content);
    let n = sections.len();
    if n < rules.content.min_sections {
        errors.push(format!(
            "document has {} section(s), the minimum is {}",
            n, rules.content.min_sections
        ));
    }
    if n > rules.content.max_sections {
        errors.push(format!(
            "document has {} section(s), the maximum is {}",
            n, rules.content.max_sections
        ));
    }

    for section in &sections {
        if rules.content.require_heading && !section.has_heading() {
            errors.push(format!("section {} is missing a heading", section.idx + 1));
        }
        let code_required = match rules.content.code_sections {
            CodeRequirement::None => false,
            CodeRequirement::All => true,
            CodeRequirement::AllButFirst => section.idx > 0,
        };
        if code_required && section.code.is_none() {
            errors.push(format!("section {} is missing a code block", section.idx + 1));
        }
    }

    if let Some(quiz) = quiz {
        validate_quiz(quiz, &rules.quiz, &mut errors);
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
        schema_version,
    }
}

fn validate_quiz(quiz: &QuizForm, rules: &QuizRules, errors: &mut Vec<String>) {
    let n = quiz.questions.len();
    if n < rules.min_questions {
        errors.push(format!(
            "quiz has {} question(s), the minimum is {}",
            n, rules.min_questions
        ));
    }
    if n > rules.max_questions {
        errors.push(format!(
            "quiz has {} question(s), the maximum is {}",
            n, rules.max_questions
        ));
    }
    if quiz.passing_score < rules.min_passing_score || quiz.passing_score > rules.max_passing_score {
        errors.push(format!(
            "passing score {} is outside the allowed range {}..={}",
            quiz.passing_score, rules.min_passing_score, rules.max_passing_score
        ));
    }

    for question in &quiz.questions {
        if question.options.len() != 4 {
            errors.push(format!(
                "question {} must have exactly 4 options, found {}",
                question.id,
                question.options.len()
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for option in &question.options {
            if !seen.insert(option.id.as_str()) {
                errors.push(format!(
                    "question {} has a duplicate option id {}",
                    question.id, option.id
                ));
            }
        }
        if !question
            .options
            .iter()
            .any(|o| o.id == question.correct_option_id)
        {
            errors.push(format!(
                "question {} marks {} correct, which is not one of its options",
                question.id, question.correct_option_id
            ));
        }
    }
}
