// Per-user completion state over pre-fetched progress rows. Pure: callers
// fetch the rows, this module only counts.

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::models::{ProgressKind, ProgressRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Completion {
    NotStarted,
    Completed,
}

/// What the aggregator needs to know about one module, in course order.
#[derive(Debug, Clone)]
pub struct ModuleSummary {
    pub id: Uuid,
    pub slug: String,
    pub lesson_count: usize,
    pub has_quiz: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressReport {
    /// "{module}:lesson-{n}" and "{module}:quiz" keys
    pub items: BTreeMap<String, Completion>,
    pub completed: usize,
    pub total: usize,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResumeTarget {
    Lesson { module_slug: String, lesson_idx: usize },
    Quiz { module_slug: String },
}

fn lesson_done(rows: &[ProgressRow], module_id: Uuid, idx: usize) -> bool {
    rows.iter().any(|r| {
        r.kind == ProgressKind::Lesson && r.module_id == module_id && r.lesson_idx == Some(idx as i32)
    })
}

fn quiz_done(rows: &[ProgressRow], module_id: Uuid) -> bool {
    rows.iter().any(|r| {
        r.kind == ProgressKind::QuizAttempt
            && r.module_id == module_id
            && r.score.is_some()
            && r.completed_at.is_some()
    })
}

/// Completion state per item plus the overall percentage. Items are every
/// lesson of every supplied module, plus one quiz item per module that has
/// one.
pub fn aggregate(modules: &[ModuleSummary], rows: &[ProgressRow]) -> ProgressReport {
    let mut items = BTreeMap::new();
    let mut completed = 0;
    let mut total = 0;

    for module in modules {
        for idx in 0..module.lesson_count {
            let state = if lesson_done(rows, module.id, idx) {
                completed += 1;
                Completion::Completed
            } else {
                Completion::NotStarted
            };
            items.insert(format!("{}:lesson-{}", module.slug, idx), state);
            total += 1;
        }
        if module.has_quiz {
            let state = if quiz_done(rows, module.id) {
                completed += 1;
                Completion::Completed
            } else {
                Completion::NotStarted
            };
            items.insert(format!("{}:quiz", module.slug), state);
            total += 1;
        }
    }

    let percent = if total == 0 {
        0.0
    } else {
        completed as f64 * 100.0 / total as f64
    };
    ProgressReport {
        items,
        completed,
        total,
        percent,
    }
}

/// Where the learner picks up: the first incomplete lesson in course order;
/// a module's quiz once all its lessons are done; the first lesson again
/// when the whole course is complete.
pub fn resume_target(modules: &[ModuleSummary], rows: &[ProgressRow]) -> Option<ResumeTarget> {
    for module in modules {
        for idx in 0..module.lesson_count {
            if !lesson_done(rows, module.id, idx) {
                return Some(ResumeTarget::Lesson {
                    module_slug: module.slug.clone(),
                    lesson_idx: idx,
                });
            }
        }
        if module.has_quiz && !quiz_done(rows, module.id) {
            return Some(ResumeTarget::Quiz {
                module_slug: module.slug.clone(),
            });
        }
    }

    // fully complete: start over at the first lesson
    modules
        .iter()
        .find(|m| m.lesson_count > 0)
        .map(|m| ResumeTarget::Lesson {
            module_slug: m.slug.clone(),
            lesson_idx: 0,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn module(slug: &str, lesson_count: usize, has_quiz: bool) -> ModuleSummary {
        ModuleSummary {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            lesson_count,
            has_quiz,
        }
    }

    fn lesson_row(module_id: Uuid, idx: i32) -> ProgressRow {
        ProgressRow {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            module_id,
            kind: ProgressKind::Lesson,
            lesson_idx: Some(idx),
            score: None,
            passed: None,
            answers: None,
            completed_at: Some(Utc::now()),
            created_at: Utc::now(),
        }
    }

    fn quiz_row(module_id: Uuid, score: f64) -> ProgressRow {
        ProgressRow {
            id: Uuid::new_v4(),
            user_id: "u1".to_string(),
            module_id,
            kind: ProgressKind::QuizAttempt,
            lesson_idx: None,
            score: Some(score),
            passed: Some(score >= 70.0),
            answers: None,
            completed_at: Some(Utc::now()),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn half_complete_module_is_fifty_percent() {
        let m = module("basics", 3, true);
        let rows = vec![lesson_row(m.id, 0), lesson_row(m.id, 1)];
        let report = aggregate(&[m.clone()], &rows);

        assert_eq!(report.total, 4);
        assert_eq!(report.completed, 2);
        assert_eq!(report.percent, 50.0);
        assert_eq!(report.items["basics:lesson-0"], Completion::Completed);
        assert_eq!(report.items["basics:lesson-2"], Completion::NotStarted);
        assert_eq!(report.items["basics:quiz"], Completion::NotStarted);

        assert_eq!(
            resume_target(&[m], &rows),
            Some(ResumeTarget::Lesson {
                module_slug: "basics".to_string(),
                lesson_idx: 2
            })
        );
    }

    #[test]
    fn quiz_is_resume_target_after_last_lesson() {
        let m = module("basics", 2, true);
        let rows = vec![lesson_row(m.id, 0), lesson_row(m.id, 1)];
        assert_eq!(
            resume_target(&[m], &rows),
            Some(ResumeTarget::Quiz {
                module_slug: "basics".to_string()
            })
        );
    }

    #[test]
    fn complete_course_resumes_at_first_lesson() {
        let m1 = module("basics", 1, true);
        let m2 = module("ownership", 1, false);
        let rows = vec![
            lesson_row(m1.id, 0),
            quiz_row(m1.id, 90.0),
            lesson_row(m2.id, 0),
        ];
        let report = aggregate(&[m1.clone(), m2.clone()], &rows);
        assert_eq!(report.percent, 100.0);
        assert_eq!(
            resume_target(&[m1, m2], &rows),
            Some(ResumeTarget::Lesson {
                module_slug: "basics".to_string(),
                lesson_idx: 0
            })
        );
    }

    #[test]
    fn quiz_needs_score_and_completion_timestamp() {
        let m = module("basics", 0, true);
        let mut row = quiz_row(m.id, 80.0);
        row.completed_at = None;
        let report = aggregate(&[m.clone()], &[row]);
        assert_eq!(report.items["basics:quiz"], Completion::NotStarted);
    }

    #[test]
    fn lesson_rows_do_not_satisfy_quiz_items() {
        let m = module("basics", 1, true);
        let rows = vec![lesson_row(m.id, 0)];
        let report = aggregate(&[m.clone()], &rows);
        assert_eq!(report.items["basics:quiz"], Completion::NotStarted);
        assert_eq!(report.items["basics:lesson-0"], Completion::Completed);
    }

    #[test]
    fn quiz_retake_clears_quiz_without_touching_lessons() {
        let m = module("basics", 2, true);
        let rows = vec![lesson_row(m.id, 0), lesson_row(m.id, 1), quiz_row(m.id, 85.0)];
        let before = aggregate(&[m.clone()], &rows);
        assert_eq!(before.percent, 100.0);

        // a retake deletes rows by kind, lesson rows survive by construction
        let after_retake: Vec<ProgressRow> = rows
            .into_iter()
            .filter(|r| r.kind != ProgressKind::QuizAttempt)
            .collect();
        let after = aggregate(&[m.clone()], &after_retake);
        assert_eq!(after.items["basics:quiz"], Completion::NotStarted);
        assert_eq!(after.items["basics:lesson-0"], Completion::Completed);
        assert_eq!(after.items["basics:lesson-1"], Completion::Completed);
        assert_eq!(after.completed, 2);
    }

    #[test]
    fn rows_from_other_modules_are_ignored() {
        let m = module("basics", 1, false);
        let stranger = Uuid::new_v4();
        let report = aggregate(&[m], &[lesson_row(stranger, 0)]);
        assert_eq!(report.completed, 0);
    }

    #[test]
    fn empty_course_is_zero_percent_with_no_resume() {
        let report = aggregate(&[], &[]);
        assert_eq!(report.total, 0);
        assert_eq!(report.percent, 0.0);
        assert_eq!(resume_target(&[], &[]), None);
    }
}
