use crate::json_utils::root_values;
use crate::questions::{
    letter_to_index, GeneratedQuestion, RawObjectiveQuestion, RawTermQuestion, UnitKind, OPTION_COUNT,
};
use serde_json::Value;
use tracing::{debug, warn};

/// What became of one model reply.
#[derive(Debug, Clone)]
pub enum ParseOutcome {
    /// At least one valid question; `dropped` lists the reasons entries were
    /// discarded (count may fall below the requested number).
    Parsed {
        questions: Vec<GeneratedQuestion>,
        dropped: Vec<String>,
    },
    /// No JSON structure could be extracted from the reply at all.
    MalformedJson { raw: String },
    /// JSON was extracted but no entry survived validation.
    SchemaInvalid { reasons: Vec<String> },
}

/// Parse a raw model reply into validated questions.
///
/// The reply is tried as a whole JSON document first, then scanned for
/// embedded structures. Malformed JSON is never repaired or guessed at.
pub fn parse_reply(reply: &str, kind: UnitKind) -> ParseOutcome {
    let mut values: Vec<Value> = Vec::new();
    if let Ok(v) = serde_json::from_str::<Value>(reply.trim()) {
        values.push(v);
    } else {
        values = root_values(reply);
    }

    if values.is_empty() {
        return ParseOutcome::MalformedJson { raw: reply.to_string() };
    }

    let mut candidates: Vec<Value> = Vec::new();
    for value in &values {
        collect_question_values(value, &mut candidates);
    }

    if candidates.is_empty() {
        return ParseOutcome::SchemaInvalid {
            reasons: vec!["reply contained JSON but no question objects".to_string()],
        };
    }

    let total = candidates.len();
    let mut questions = Vec::new();
    let mut dropped = Vec::new();
    for candidate in candidates {
        match validate_question(candidate, kind) {
            Ok(q) => questions.push(q),
            Err(reason) => {
                warn!(target: "studyjoy::parse", %reason, "dropping invalid question");
                dropped.push(reason);
            }
        }
    }

    debug!(target: "studyjoy::parse", candidates = total, valid = questions.len(), dropped = dropped.len(), "reply parsed");

    if questions.is_empty() {
        ParseOutcome::SchemaInvalid { reasons: dropped }
    } else {
        ParseOutcome::Parsed { questions, dropped }
    }
}

/// Question-shaped objects inside `value`: elements of arrays, objects with a
/// `question` field, and anything under a `questions` wrapper field.
fn collect_question_values(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_question_values(item, out);
            }
        }
        Value::Object(map) => {
            if map.contains_key("question") {
                out.push(value.clone());
            } else if let Some(inner) = map.get("questions") {
                collect_question_values(inner, out);
            }
        }
        _ => {}
    }
}

fn validate_question(value: Value, kind: UnitKind) -> Result<GeneratedQuestion, String> {
    match kind {
        UnitKind::MarkedTerms => {
            let raw: RawTermQuestion = serde_json::from_value(value)
                .map_err(|e| format!("missing or mistyped field: {}", e))?;
            let correct_answer_index = letter_to_index(&raw.correct)
                .ok_or_else(|| format!("correct answer letter '{}' outside A-D", raw.correct))?;
            check_common(&raw.question, &raw.options, &raw.explanation)?;
            Ok(GeneratedQuestion {
                question: raw.question,
                options: raw.options,
                correct_answer_index,
                explanation: raw.explanation,
                objective: None,
                question_type: None,
            })
        }
        UnitKind::Objectives => {
            let raw: RawObjectiveQuestion = serde_json::from_value(value)
                .map_err(|e| format!("missing or mistyped field: {}", e))?;
            if raw.correct_answer_index < 0 || raw.correct_answer_index as usize >= OPTION_COUNT {
                return Err(format!("correct answer index {} out of range", raw.correct_answer_index));
            }
            check_common(&raw.question, &raw.options, &raw.explanation)?;
            Ok(GeneratedQuestion {
                question: raw.question,
                options: raw.options,
                correct_answer_index: raw.correct_answer_index as usize,
                explanation: raw.explanation,
                objective: raw.objective,
                question_type: raw.question_type,
            })
        }
    }
}

fn check_common(question: &str, options: &[String], explanation: &str) -> Result<(), String> {
    if question.trim().is_empty() {
        return Err("empty question text".to_string());
    }
    if options.len() != OPTION_COUNT {
        return Err(format!("expected {} options, got {}", OPTION_COUNT, options.len()));
    }
    if options.iter().any(|o| o.trim().is_empty()) {
        return Err("empty option text".to_string());
    }
    if explanation.trim().is_empty() {
        return Err("empty explanation".to_string());
    }
    Ok(())
}
