use studyjoy::parse::{parse_reply, ParseOutcome};
use studyjoy::questions::UnitKind;

fn term_entry(question: &str, correct: &str) -> serde_json::Value {
    serde_json::json!({
        "question": question,
        "options": ["the inner layer", "the outer layer", "a protein", "a sugar"],
        "correct": correct,
        "explanation": "It is defined that way in the chapter."
    })
}

fn objective_entry(question: &str, index: i64, objective: &str) -> serde_json::Value {
    serde_json::json!({
        "question": question,
        "options": ["osmosis", "diffusion", "active transport", "endocytosis"],
        "correctAnswerIndex": index,
        "explanation": "The chapter covers this directly.",
        "objective": objective
    })
}

#[test]
fn clean_array_parses_with_letter_mapping() {
    let reply = serde_json::json!([
        term_entry("What is the membrane?", "A"),
        term_entry("What is the nucleus?", "c"),
    ])
    .to_string();

    match parse_reply(&reply, UnitKind::MarkedTerms) {
        ParseOutcome::Parsed { questions, dropped } => {
            assert_eq!(questions.len(), 2);
            assert!(dropped.is_empty());
            assert_eq!(questions[0].correct_answer_index, 0);
            assert_eq!(questions[1].correct_answer_index, 2);
            assert_eq!(questions[1].correct_letter(), 'C');
        }
        other => panic!("expected Parsed, got {:?}", other),
    }
}

#[test]
fn json_embedded_in_prose_is_found() {
    let reply = format!(
        "Here are your questions!\n\n{}\n\nLet me know if you need more.",
        serde_json::json!([term_entry("What is a ribosome?", "B")])
    );

    match parse_reply(&reply, UnitKind::MarkedTerms) {
        ParseOutcome::Parsed { questions, .. } => {
            assert_eq!(questions.len(), 1);
            assert_eq!(questions[0].correct_answer_index, 1);
        }
        other => panic!("expected Parsed, got {:?}", other),
    }
}

#[test]
fn questions_wrapper_object_is_unwrapped() {
    let reply = serde_json::json!({
        "questions": [term_entry("What is ATP?", "D")]
    })
    .to_string();

    match parse_reply(&reply, UnitKind::MarkedTerms) {
        ParseOutcome::Parsed { questions, .. } => {
            assert_eq!(questions.len(), 1);
            assert_eq!(questions[0].correct_answer_index, 3);
        }
        other => panic!("expected Parsed, got {:?}", other),
    }
}

#[test]
fn invalid_entries_are_dropped_with_reasons() {
    let bad_letter = term_entry("Which organelle?", "E");
    let mut three_options = term_entry("How many layers?", "A");
    three_options["options"] = serde_json::json!(["one", "two", "three"]);
    let missing_explanation = serde_json::json!({
        "question": "What does DNA stand for?",
        "options": ["a", "b", "c", "d"],
        "correct": "A"
    });

    let reply = serde_json::Value::Array(vec![
        term_entry("What is the membrane?", "A"),
        bad_letter,
        three_options,
        missing_explanation,
    ])
    .to_string();

    match parse_reply(&reply, UnitKind::MarkedTerms) {
        ParseOutcome::Parsed { questions, dropped } => {
            assert_eq!(questions.len(), 1);
            assert_eq!(dropped.len(), 3);
            assert!(dropped[0].contains("outside A-D"), "got: {}", dropped[0]);
            assert!(dropped[1].contains("expected 4 options"), "got: {}", dropped[1]);
            assert!(dropped[2].contains("missing or mistyped field"), "got: {}", dropped[2]);
        }
        other => panic!("expected Parsed, got {:?}", other),
    }
}

#[test]
fn all_invalid_entries_is_schema_invalid() {
    let reply = serde_json::json!([
        term_entry("Pick one", "Z"),
        term_entry("Pick another", "9"),
    ])
    .to_string();

    match parse_reply(&reply, UnitKind::MarkedTerms) {
        ParseOutcome::SchemaInvalid { reasons } => assert_eq!(reasons.len(), 2),
        other => panic!("expected SchemaInvalid, got {:?}", other),
    }
}

#[test]
fn json_without_question_objects_is_schema_invalid() {
    let reply = r#"{"status": "ok", "message": "no questions today"}"#;

    match parse_reply(reply, UnitKind::MarkedTerms) {
        ParseOutcome::SchemaInvalid { reasons } => {
            assert_eq!(reasons.len(), 1);
            assert!(reasons[0].contains("no question objects"));
        }
        other => panic!("expected SchemaInvalid, got {:?}", other),
    }
}

#[test]
fn reply_without_json_is_malformed() {
    let reply = "I'm sorry, I can't produce questions for that content.";

    match parse_reply(reply, UnitKind::MarkedTerms) {
        ParseOutcome::MalformedJson { raw } => assert_eq!(raw, reply),
        other => panic!("expected MalformedJson, got {:?}", other),
    }
}

#[test]
fn objective_index_bounds_are_enforced() {
    let reply = serde_json::json!([
        objective_entry("Which process moves water?", 0, "Define osmosis"),
        objective_entry("Which is active?", 4, "Explain transport"),
        objective_entry("Which is passive?", -1, "Explain transport"),
    ])
    .to_string();

    match parse_reply(&reply, UnitKind::Objectives) {
        ParseOutcome::Parsed { questions, dropped } => {
            assert_eq!(questions.len(), 1);
            assert_eq!(questions[0].objective.as_deref(), Some("Define osmosis"));
            assert_eq!(dropped.len(), 2);
            assert!(dropped.iter().all(|r| r.contains("out of range")));
        }
        other => panic!("expected Parsed, got {:?}", other),
    }
}

#[test]
fn empty_option_text_is_rejected() {
    let mut entry = term_entry("What is a cell wall?", "B");
    entry["options"] = serde_json::json!(["rigid layer", "  ", "membrane", "organ"]);
    let reply = serde_json::Value::Array(vec![entry]).to_string();

    match parse_reply(&reply, UnitKind::MarkedTerms) {
        ParseOutcome::SchemaInvalid { reasons } => {
            assert!(reasons[0].contains("empty option text"));
        }
        other => panic!("expected SchemaInvalid, got {:?}", other),
    }
}

#[test]
fn letter_is_trimmed_and_case_insensitive() {
    let reply = serde_json::json!([term_entry("Which layer?", " b ")]).to_string();

    match parse_reply(&reply, UnitKind::MarkedTerms) {
        ParseOutcome::Parsed { questions, .. } => {
            assert_eq!(questions[0].correct_answer_index, 1);
        }
        other => panic!("expected Parsed, got {:?}", other),
    }
}
