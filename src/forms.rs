use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::uploads::StoredFile;

/// An in-progress, unvalidated question assembled from the story form.
#[derive(Debug, Clone, Default)]
pub struct QuestionDraft {
    pub prompt: String,
    pub answers: [String; 4],
    pub correct_index: usize,
    pub audio: Option<StoredFile>,
}

fn prompt_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^questions\[(\d+)\]\[prompt\]$").unwrap())
}

fn correct_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^questions\[(\d+)\]\[correctIndex\]$").unwrap())
}

fn answer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^questions\[(\d+)\]\[answers\]\[(\d+)\]$").unwrap())
}

fn audio_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^questions\[(\d+)\]\[audio\]$").unwrap())
}

fn parse_correct_index(raw: &str) -> Option<usize> {
    raw.trim()
        .parse::<usize>()
        .ok()
        .filter(|idx| *idx <= 3)
}

/// Merge an "answers" JSON value (array or object keyed by index) over a
/// draft's answers. Empty strings never overwrite a previously merged
/// value.
fn merge_answers(draft: &mut QuestionDraft, raw: &Value) {
    let mut normalized: [Option<String>; 4] = Default::default();

    match raw {
        Value::Array(items) => {
            for (idx, item) in items.iter().take(4).enumerate() {
                if let Some(text) = item.as_str() {
                    normalized[idx] = Some(text.trim().to_string());
                }
            }
        }
        Value::Object(map) => {
            for (key, item) in map {
                let Ok(idx) = key.parse::<usize>() else {
                    continue;
                };
                if idx > 3 {
                    continue;
                }
                if let Some(text) = item.as_str() {
                    normalized[idx] = Some(text.trim().to_string());
                }
            }
        }
        _ => {}
    }

    for (slot, merged) in draft.answers.iter_mut().zip(normalized) {
        if let Some(value) = merged {
            if !value.is_empty() {
                *slot = value;
            }
        }
    }
}

fn merge_nested_question(draft: &mut QuestionDraft, data: &Value) {
    // The nested shape wins for the prompt even when it is absent, so a
    // nested entry without one blanks a flat-field prompt.
    draft.prompt = data
        .get("prompt")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();
    if let Some(answers) = data.get("answers") {
        merge_answers(draft, answers);
    }
    let correct = data.get("correctIndex").and_then(|v| match v {
        Value::Number(n) => n.as_u64().map(|n| n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    });
    if let Some(idx) = correct.as_deref().and_then(parse_correct_index) {
        draft.correct_index = idx;
    }
}

/// Reconstruct the ordered question list from a story submission.
///
/// `fields` are the flat text fields (bracket-indexed names like
/// `questions[2][answers][0]`), `nested` is an optional pre-nested
/// JSON-style shape (array, or object keyed by index), and `files` are
/// the uploads whose field names use the same indexing scheme.
///
/// A draft survives the final filter if it has a prompt or any non-empty
/// answer; full validation is the caller's job (`validate_drafts`).
pub fn parse_story_questions(
    fields: &[(String, String)],
    nested: Option<&Value>,
    files: Vec<StoredFile>,
) -> Vec<QuestionDraft> {
    let mut drafts: BTreeMap<usize, QuestionDraft> = BTreeMap::new();

    for (name, value) in fields {
        if let Some(caps) = prompt_re().captures(name) {
            if let Ok(idx) = caps[1].parse::<usize>() {
                drafts.entry(idx).or_default().prompt = value.trim().to_string();
            }
            continue;
        }

        if let Some(caps) = correct_re().captures(name) {
            if let Ok(idx) = caps[1].parse::<usize>() {
                let draft = drafts.entry(idx).or_default();
                if let Some(correct) = parse_correct_index(value) {
                    draft.correct_index = correct;
                }
            }
            continue;
        }

        if let Some(caps) = answer_re().captures(name) {
            let (Ok(idx), Ok(answer_idx)) = (caps[1].parse::<usize>(), caps[2].parse::<usize>())
            else {
                continue;
            };
            if answer_idx < 4 {
                drafts.entry(idx).or_default().answers[answer_idx] = value.trim().to_string();
            }
        }
    }

    match nested {
        Some(Value::Array(items)) => {
            for (idx, data) in items.iter().enumerate() {
                if data.is_null() {
                    continue;
                }
                merge_nested_question(drafts.entry(idx).or_default(), data);
            }
        }
        Some(Value::Object(map)) => {
            for (key, data) in map {
                let Ok(idx) = key.parse::<usize>() else {
                    continue;
                };
                if data.is_null() {
                    continue;
                }
                merge_nested_question(drafts.entry(idx).or_default(), data);
            }
        }
        _ => {}
    }

    for file in files {
        if let Some(caps) = audio_re().captures(&file.field_name) {
            if let Ok(idx) = caps[1].parse::<usize>() {
                drafts.entry(idx).or_default().audio = Some(file);
            }
        }
    }

    // BTreeMap iteration is already index-ascending. A draft with a
    // prompt but blank answers is intentionally kept; it fails
    // validation downstream instead of being silently discarded.
    drafts
        .into_values()
        .filter(|draft| {
            !draft.prompt.is_empty() || draft.answers.iter().any(|a| !a.is_empty())
        })
        .collect()
}

/// The caller-side validation: every retained draft needs a prompt, four
/// answers and an in-range correct index, or the submission is rejected
/// as a whole.
pub fn validate_drafts(drafts: &[QuestionDraft]) -> AppResult<()> {
    for draft in drafts {
        if draft.prompt.is_empty() || draft.answers.iter().any(|a| a.is_empty()) {
            return Err(AppError::Validation(
                "Each question must include a prompt and four answers.".into(),
            ));
        }
        if draft.correct_index > 3 {
            return Err(AppError::Validation(
                "Select which answer is correct for each question.".into(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(name: &str, value: &str) -> (String, String) {
        (name.to_string(), value.to_string())
    }

    fn audio_file(name: &str) -> StoredFile {
        StoredFile {
            field_name: name.to_string(),
            disk_path: std::path::PathBuf::from("/tmp/a.mp3"),
            file_name: "a.mp3".to_string(),
        }
    }

    #[test]
    fn flat_fields_round_trip() {
        let fields = vec![
            field("questions[0][prompt]", "Hi"),
            field("questions[0][answers][0]", "A"),
            field("questions[0][answers][1]", "B"),
            field("questions[0][answers][2]", "C"),
            field("questions[0][answers][3]", "D"),
            field("questions[0][correctIndex]", "2"),
        ];

        let drafts = parse_story_questions(&fields, None, Vec::new());
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].prompt, "Hi");
        assert_eq!(drafts[0].answers, ["A", "B", "C", "D"]);
        assert_eq!(drafts[0].correct_index, 2);
        assert!(drafts[0].audio.is_none());
    }

    #[test]
    fn values_are_trimmed_and_correct_index_clamped_to_range() {
        let fields = vec![
            field("questions[0][prompt]", "  Frage  "),
            field("questions[0][answers][0]", " ja "),
            field("questions[0][correctIndex]", "7"),
        ];

        let drafts = parse_story_questions(&fields, None, Vec::new());
        assert_eq!(drafts[0].prompt, "Frage");
        assert_eq!(drafts[0].answers[0], "ja");
        // 7 is out of range, so the default 0 stays
        assert_eq!(drafts[0].correct_index, 0);
    }

    #[test]
    fn drafts_sort_by_index_ascending() {
        let fields = vec![
            field("questions[5][prompt]", "Later"),
            field("questions[1][prompt]", "Earlier"),
        ];

        let drafts = parse_story_questions(&fields, None, Vec::new());
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].prompt, "Earlier");
        assert_eq!(drafts[1].prompt, "Later");
    }

    #[test]
    fn empty_draft_is_dropped_partial_draft_is_kept() {
        let fields = vec![
            field("questions[0][prompt]", ""),
            field("questions[0][answers][0]", ""),
            field("questions[0][answers][1]", ""),
            field("questions[0][answers][2]", ""),
            field("questions[0][answers][3]", ""),
            field("questions[1][prompt]", "Only a prompt"),
        ];

        let drafts = parse_story_questions(&fields, None, Vec::new());
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].prompt, "Only a prompt");
        // Retained, but the submission as a whole fails validation
        assert!(validate_drafts(&drafts).is_err());
    }

    #[test]
    fn nested_array_shape_merges_over_defaults() {
        let nested = json!([
            {
                "prompt": "Nested?",
                "answers": ["w", "x", "y", "z"],
                "correctIndex": "3"
            }
        ]);

        let drafts = parse_story_questions(&[], Some(&nested), Vec::new());
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].prompt, "Nested?");
        assert_eq!(drafts[0].answers, ["w", "x", "y", "z"]);
        assert_eq!(drafts[0].correct_index, 3);
    }

    #[test]
    fn nested_empty_answers_do_not_clobber_flat_values() {
        let fields = vec![
            field("questions[0][answers][1]", "keep me"),
        ];
        let nested = json!({
            "0": {
                "prompt": "P",
                "answers": ["", "", "new", ""],
                "correctIndex": 1
            }
        });

        let drafts = parse_story_questions(&fields, Some(&nested), Vec::new());
        assert_eq!(drafts[0].answers[1], "keep me");
        assert_eq!(drafts[0].answers[2], "new");
        assert_eq!(drafts[0].correct_index, 1);
    }

    #[test]
    fn nested_entry_without_prompt_blanks_a_flat_prompt() {
        let fields = vec![field("questions[0][prompt]", "From the flat field")];
        let nested = json!([
            { "answers": ["a", "b", "c", "d"] }
        ]);

        let drafts = parse_story_questions(&fields, Some(&nested), Vec::new());
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].prompt, "");
        assert_eq!(drafts[0].answers, ["a", "b", "c", "d"]);
    }

    #[test]
    fn files_attach_by_embedded_index() {
        let fields = vec![
            field("questions[0][prompt]", "Q0"),
            field("questions[2][prompt]", "Q2"),
        ];
        let files = vec![
            audio_file("questions[2][audio]"),
            audio_file("unrelated"),
        ];

        let drafts = parse_story_questions(&fields, None, files);
        assert_eq!(drafts.len(), 2);
        assert!(drafts[0].audio.is_none());
        assert!(drafts[1].audio.is_some());
    }

    #[test]
    fn file_for_an_otherwise_empty_index_creates_a_droppable_draft() {
        // A stray audio file with no prompt and no answers disappears in
        // the final filter.
        let files = vec![audio_file("questions[4][audio]")];
        let drafts = parse_story_questions(&[], None, files);
        assert!(drafts.is_empty());
    }

    #[test]
    fn validation_requires_in_range_correct_index() {
        let draft = QuestionDraft {
            prompt: "P".into(),
            answers: ["a".into(), "b".into(), "c".into(), "d".into()],
            correct_index: 4,
            audio: None,
        };
        assert!(validate_drafts(&[draft]).is_err());
    }
}
