// Flattens a course into the ordered step list that drives prev/next
// navigation. Pure and deterministic: same inputs, same list.

use std::collections::HashMap;

use serde::Serialize;

use crate::sections::Section;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    CourseIntro,
    ModuleIntro,
    LessonIntro,
    LessonContent,
    LessonOutro,
    Quiz,
    ModuleOutro,
    Graduation,
    Certificate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    pub path: String,
    pub label: String,
    pub kind: StepKind,
}

/// A lesson as seen by the sequence builder and the progress API: one
/// content section of its module, by stored index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LessonRef {
    pub idx: usize,
    pub title: String,
    pub has_intro: bool,
    pub has_outro: bool,
}

impl LessonRef {
    /// Sections with an exercise code block get intro/outro pages for the
    /// prose around the exercise; prose-only sections are a single page.
    pub fn from_section(section: &Section) -> Self {
        let title = section
            .title()
            .map(str::to_string)
            .unwrap_or_else(|| format!("Part {}", section.idx + 1));
        let (has_intro, has_outro) = match &section.code {
            Some(_) => (!section.before.is_empty(), !section.after.is_empty()),
            None => (false, false),
        };
        LessonRef {
            idx: section.idx,
            title,
            has_intro,
            has_outro,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModuleSeq {
    pub slug: String,
    pub title: String,
    pub position: i32,
    pub has_quiz: bool,
    pub has_outro: bool,
}

#[derive(Debug, Clone)]
pub struct CourseSeq {
    pub slug: String,
    pub title: String,
    pub has_certificate: bool,
}

/// Builds the flat step list for a course. Modules are ordered by stored
/// position and lessons re-sorted by stored index; callers are not trusted
/// to pre-sort either.
pub fn build_sequence(
    course: &CourseSeq,
    modules: &[ModuleSeq],
    lessons: &HashMap<String, Vec<LessonRef>>,
) -> Vec<Step> {
    let mut ordered: Vec<&ModuleSeq> = modules.iter().collect();
    ordered.sort_by_key(|m| m.position);

    let mut steps = Vec::new();
    steps.push(Step {
        path: format!("/courses/{}/intro", course.slug),
        label: course.title.clone(),
        kind: StepKind::CourseIntro,
    });

    for module in ordered {
        let base = format!("/courses/{}/{}", course.slug, module.slug);
        steps.push(Step {
            path: base.clone(),
            label: module.title.clone(),
            kind: StepKind::ModuleIntro,
        });

        let mut module_lessons: Vec<LessonRef> =
            lessons.get(&module.slug).cloned().unwrap_or_default();
        module_lessons.sort_by_key(|l| l.idx);

        for lesson in &module_lessons {
            if lesson.has_intro {
                steps.push(Step {
                    path: format!("{base}/lessons/{}/intro", lesson.idx),
                    label: format!("{} overview", lesson.title),
                    kind: StepKind::LessonIntro,
                });
            }
            steps.push(Step {
                path: format!("{base}/lessons/{}", lesson.idx),
                label: lesson.title.clone(),
                kind: StepKind::LessonContent,
            });
            if lesson.has_outro {
                steps.push(Step {
                    path: format!("{base}/lessons/{}/outro", lesson.idx),
                    label: format!("{} recap", lesson.title),
                    kind: StepKind::LessonOutro,
                });
            }
        }

        if module.has_quiz {
            steps.push(Step {
                path: format!("{base}/quiz"),
                label: format!("{} quiz", module.title),
                kind: StepKind::Quiz,
            });
        }
        if module.has_outro {
            steps.push(Step {
                path: format!("{base}/outro"),
                label: format!("{} wrap-up", module.title),
                kind: StepKind::ModuleOutro,
            });
        }
    }

    steps.push(Step {
        path: format!("/courses/{}/graduation", course.slug),
        label: "Graduation".to_string(),
        kind: StepKind::Graduation,
    });
    if course.has_certificate {
        steps.push(Step {
            path: format!("/courses/{}/certificate", course.slug),
            label: "Certificate".to_string(),
            kind: StepKind::Certificate,
        });
    }

    steps
}

/// Previous and next steps around `current_path`. No wrapping: boundaries
/// and unknown paths yield `None` on the missing side(s).
pub fn neighbors<'a>(steps: &'a [Step], current_path: &str) -> (Option<&'a Step>, Option<&'a Step>) {
    let Some(pos) = steps.iter().position(|s| s.path == current_path) else {
        return (None, None);
    };
    let prev = pos.checked_sub(1).and_then(|i| steps.get(i));
    let next = steps.get(pos + 1);
    (prev, next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn course() -> CourseSeq {
        CourseSeq {
            slug: "rust-101".to_string(),
            title: "Rust 101".to_string(),
            has_certificate: true,
        }
    }

    fn lesson(idx: usize, title: &str) -> LessonRef {
        LessonRef {
            idx,
            title: title.to_string(),
            has_intro: false,
            has_outro: false,
        }
    }

    fn fixture() -> (Vec<ModuleSeq>, HashMap<String, Vec<LessonRef>>) {
        let modules = vec![
            ModuleSeq {
                slug: "basics".to_string(),
                title: "Basics".to_string(),
                position: 1,
                has_quiz: true,
                has_outro: true,
            },
            ModuleSeq {
                slug: "ownership".to_string(),
                title: "Ownership".to_string(),
                position: 2,
                has_quiz: false,
                has_outro: false,
            },
        ];
        let lessons = HashMap::from([
            (
                "basics".to_string(),
                vec![lesson(0, "Variables"), lesson(1, "Types")],
            ),
            ("ownership".to_string(), vec![lesson(0, "Moves")]),
        ]);
        (modules, lessons)
    }

    #[test]
    fn emits_steps_in_course_order() {
        let (modules, lessons) = fixture();
        let steps = build_sequence(&course(), &modules, &lessons);
        let kinds: Vec<StepKind> = steps.iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StepKind::CourseIntro,
                StepKind::ModuleIntro,
                StepKind::LessonContent,
                StepKind::LessonContent,
                StepKind::Quiz,
                StepKind::ModuleOutro,
                StepKind::ModuleIntro,
                StepKind::LessonContent,
                StepKind::Graduation,
                StepKind::Certificate,
            ]
        );
        assert_eq!(steps[2].path, "/courses/rust-101/basics/lessons/0");
        assert_eq!(steps[4].label, "Basics quiz");
    }

    #[test]
    fn deterministic_even_with_unsorted_input() {
        let (mut modules, mut lessons) = fixture();
        let baseline = build_sequence(&course(), &modules, &lessons);

        modules.reverse();
        lessons.get_mut("basics").unwrap().reverse();
        let shuffled = build_sequence(&course(), &modules, &lessons);

        assert_eq!(baseline, shuffled);
    }

    #[test]
    fn lesson_intro_and_outro_steps_follow_flags() {
        let (modules, mut lessons) = fixture();
        let basics = lessons.get_mut("basics").unwrap();
        basics[0].has_intro = true;
        basics[0].has_outro = true;
        let steps = build_sequence(&course(), &modules, &lessons);
        assert_eq!(steps[2].kind, StepKind::LessonIntro);
        assert_eq!(steps[2].path, "/courses/rust-101/basics/lessons/0/intro");
        assert_eq!(steps[3].kind, StepKind::LessonContent);
        assert_eq!(steps[4].kind, StepKind::LessonOutro);
    }

    #[test]
    fn no_quiz_step_without_a_quiz() {
        let (modules, lessons) = fixture();
        let steps = build_sequence(&course(), &modules, &lessons);
        let ownership_quiz = steps
            .iter()
            .any(|s| s.kind == StepKind::Quiz && s.path.contains("ownership"));
        assert!(!ownership_quiz);
    }

    #[test]
    fn certificate_only_when_course_has_one() {
        let (modules, lessons) = fixture();
        let mut c = course();
        c.has_certificate = false;
        let steps = build_sequence(&c, &modules, &lessons);
        assert!(steps.iter().all(|s| s.kind != StepKind::Certificate));
        assert_eq!(steps.last().unwrap().kind, StepKind::Graduation);
    }

    #[test]
    fn neighbors_stop_at_boundaries() {
        let (modules, lessons) = fixture();
        let steps = build_sequence(&course(), &modules, &lessons);

        let (prev, next) = neighbors(&steps, &steps[0].path);
        assert!(prev.is_none());
        assert_eq!(next.unwrap().path, steps[1].path);

        let last = &steps[steps.len() - 1];
        let (prev, next) = neighbors(&steps, &last.path);
        assert_eq!(prev.unwrap().path, steps[steps.len() - 2].path);
        assert!(next.is_none());

        assert_eq!(neighbors(&steps, "/nowhere"), (None, None));
    }

    #[test]
    fn lesson_ref_from_section_derives_flags() {
        use crate::sections::split_sections;
        let doc = "# Closures\nwhy they matter\n```rust\n|| ()\n```\nwrap up\n---\n# Theory\nprose only";
        let sections = split_sections(doc);
        let first = LessonRef::from_section(&sections[0]);
        assert_eq!(first.title, "Closures");
        assert!(first.has_intro);
        assert!(first.has_outro);
        let second = LessonRef::from_section(&sections[1]);
        assert_eq!(second.title, "Theory");
        assert!(!second.has_intro && !second.has_outro);
    }
}
