// Splits a module's content document into sections on "---" lines.
// A "---" inside an open fenced code block is ordinary text.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub body: String,
}

/// One delimiter-separated unit of a content document. `raw` is the trimmed
/// section text as authored; `before`/`code`/`after` split out the first
/// fenced code block. Later fences stay embedded in `after`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub idx: usize,
    pub raw: String,
    pub before: String,
    pub code: Option<CodeBlock>,
    pub after: String,
}

impl Section {
    /// First markdown heading line in the section's prose, without the
    /// leading '#' markers.
    pub fn title(&self) -> Option<&str> {
        self.before
            .lines()
            .chain(self.after.lines())
            .find(|l| l.starts_with('#'))
            .map(|l| l.trim_start_matches('#').trim())
    }

    pub fn has_heading(&self) -> bool {
        self.title().is_some()
    }
}

pub fn split_sections(doc: &str) -> Vec<Section> {
    let mut raw_sections: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_fence = false;

    for line in doc.lines() {
        if line.starts_with("```") {
            in_fence = !in_fence;
            current.push_str(line);
            current.push('\n');
            continue;
        }
        if !in_fence && line == "---" {
            raw_sections.push(std::mem::take(&mut current));
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    raw_sections.push(current);

    raw_sections
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .enumerate()
        .map(|(idx, raw)| parse_section(idx, raw))
        .collect()
}

enum FencePos {
    Before,
    InCode,
    After,
}

fn parse_section(idx: usize, raw: &str) -> Section {
    let mut before = String::new();
    let mut language: Option<String> = None;
    let mut body = String::new();
    let mut after = String::new();
    let mut pos = FencePos::Before;

    for line in raw.lines() {
        match pos {
            FencePos::Before => {
                if line.starts_with("```") {
                    let lang = line.trim_start_matches('`').trim();
                    language = (!lang.is_empty()).then(|| lang.to_string());
                    pos = FencePos::InCode;
                } else {
                    before.push_str(line);
                    before.push('\n');
                }
            }
            // an unterminated fence keeps collecting until the document ends
            FencePos::InCode => {
                if line.starts_with("```") {
                    pos = FencePos::After;
                } else {
                    body.push_str(line);
                    body.push('\n');
                }
            }
            FencePos::After => {
                after.push_str(line);
                after.push('\n');
            }
        }
    }

    let code = match pos {
        FencePos::Before => None,
        FencePos::InCode | FencePos::After => Some(CodeBlock {
            language,
            body: body.trim_end().to_string(),
        }),
    };

    Section {
        idx,
        raw: raw.to_string(),
        before: before.trim().to_string(),
        code,
        after: after.trim().to_string(),
    }
}

/// Inverse of [`split_sections`] for well-formed input: sections joined with
/// the delimiter re-split to the same list.
pub fn join_sections(sections: &[Section]) -> String {
    sections
        .iter()
        .map(|s| s.raw.as_str())
        .collect::<Vec<_>>()
        .join("\n---\n")
}
