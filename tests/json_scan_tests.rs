use serde::Deserialize;
use studyjoy::json_utils::{extract_all, root_values};

#[derive(Debug, Deserialize, PartialEq)]
struct Card {
    term: String,
    answer: usize,
}

#[test]
fn extract_all_from_array() {
    let s = r#"[{"term":"membrane","answer":0},{"term":"nucleus","answer":2},{"term":"ribosome","answer":1}]"#;
    let v: Vec<Card> = extract_all(s);
    assert_eq!(v.len(), 3);
    assert_eq!(v[0].term, "membrane");
    assert_eq!(v[2].answer, 1);
}

#[test]
fn extract_all_mixed_text_and_objects() {
    let s = r#"Sure! {"term":"osmosis","answer":3} and also {"note":"unrelated"} then {"term":"diffusion","answer":1} done."#;
    let v: Vec<Card> = extract_all(s);
    assert_eq!(v.len(), 2);
    assert_eq!(v[0].term, "osmosis");
    assert_eq!(v[1].term, "diffusion");
}

#[test]
fn extract_all_array_followed_by_singleton() {
    let s = r#"preamble [{"term":"atp","answer":0},{"term":"adp","answer":2}] trailing {"term":"nad","answer":3}"#;
    let v: Vec<Card> = extract_all(s);
    assert_eq!(v.len(), 3);
    assert_eq!(v[1].term, "adp");
    assert_eq!(v[2].term, "nad");
}

#[test]
fn extract_all_ignores_brackets_inside_strings() {
    let s = r#"{"term":"mixed {braces} and [brackets]","answer":1}"#;
    let v: Vec<Card> = extract_all(s);
    assert_eq!(v.len(), 1);
    assert_eq!(v[0].term, "mixed {braces} and [brackets]");
}

#[test]
fn root_values_finds_each_top_level_structure() {
    let s = r#"
The model wrote some prose first.

{"questions": [{"question": "q1"}]}

And then a correction:

{"questions": [{"question": "q2"}]}
"#;
    let values = root_values(s);
    assert_eq!(values.len(), 2);
    assert!(values[0]["questions"].is_array());
}

#[test]
fn root_values_skips_unparseable_spans() {
    assert!(root_values("nothing json-like here").is_empty());
    assert!(root_values("dangling { brace").is_empty());

    let values = root_values(r#"ok {"a":1} bad {b:} fine [2,3]"#);
    assert_eq!(values.len(), 2);
    assert_eq!(values[0]["a"], 1);
    assert_eq!(values[1][0], 2);
}
