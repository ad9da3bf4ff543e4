use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Every question carries exactly this many options.
pub const OPTION_COUNT: usize = 4;

pub const OPTION_LETTERS: [char; OPTION_COUNT] = ['A', 'B', 'C', 'D'];

/// What the generator turns into questions: one unit, one or more questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnitKind {
    /// `**marked**` terms in paragraph content
    MarkedTerms,
    /// learning objectives attached to paragraphs
    Objectives,
}

impl UnitKind {
    pub fn unit_noun(&self) -> &'static str {
        match self {
            UnitKind::MarkedTerms => "term",
            UnitKind::Objectives => "learning objective",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            UnitKind::MarkedTerms => "terms",
            UnitKind::Objectives => "objectives",
        }
    }
}

impl std::fmt::Display for UnitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

/// A validated multiple-choice question as handed to sessions and callers.
/// Always has exactly [`OPTION_COUNT`] options and an in-range answer index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer_index: usize,
    pub explanation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_type: Option<String>,
}

impl GeneratedQuestion {
    pub fn correct_letter(&self) -> char {
        OPTION_LETTERS[self.correct_answer_index]
    }
}

/// Wire shape the model is asked for in the marked-terms variant. The correct
/// answer is an option letter.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RawTermQuestion {
    /// The question text
    pub question: String,
    /// Exactly four answer options, in display order
    pub options: Vec<String>,
    /// Letter of the correct option: A, B, C or D
    pub correct: String,
    /// Why the correct answer is correct
    pub explanation: String,
}

/// Wire shape the model is asked for in the objectives variant. The correct
/// answer is a zero-based option index.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RawObjectiveQuestion {
    /// The question text
    pub question: String,
    /// Exactly four answer options, in display order
    pub options: Vec<String>,
    /// Index of the correct option, 0 through 3
    pub correct_answer_index: i64,
    /// Why the correct answer is correct
    pub explanation: String,
    /// The learning objective this question tests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    /// Free-form style tag, e.g. "recall" or "application"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_type: Option<String>,
}

/// Map an option letter to its index. Accepts either case, trims whitespace.
pub fn letter_to_index(letter: &str) -> Option<usize> {
    let trimmed = letter.trim();
    let mut chars = trimmed.chars();
    let first = chars.next()?;
    if chars.next().is_some() {
        return None;
    }
    OPTION_LETTERS
        .iter()
        .position(|&l| l == first.to_ascii_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn letters_map_to_indexes() {
        assert_eq!(letter_to_index("A"), Some(0));
        assert_eq!(letter_to_index(" d "), Some(3));
        assert_eq!(letter_to_index("E"), None);
        assert_eq!(letter_to_index("AB"), None);
        assert_eq!(letter_to_index(""), None);
    }

    #[test]
    fn canonical_question_serializes_camel_case() {
        let q = GeneratedQuestion {
            question: "What is osmosis?".to_string(),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_answer_index: 2,
            explanation: "because".to_string(),
            objective: None,
            question_type: None,
        };
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["correctAnswerIndex"], 2);
        assert!(json.get("objective").is_none());
        assert_eq!(q.correct_letter(), 'C');
    }
}
