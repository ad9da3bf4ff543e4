use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, instrument};

// =============== JSON structure discovery ===============

/// Type of a JSON node found by the scanner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NodeType {
    Object,
    Array,
}

/// Coordinates of a JSON structure within a larger text, including nested children.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjCoords {
    pub start: usize,
    pub end: usize, // inclusive index of the closing bracket/brace
    pub kind: NodeType,
    pub children: Vec<ObjCoords>,
}

impl ObjCoords {
    pub fn new(start: usize, end: usize, kind: NodeType, children: Vec<ObjCoords>) -> Self {
        Self { start, end, kind, children }
    }

    /// The slice of `text` this node spans.
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..=self.end]
    }
}

#[derive(Debug)]
struct Frame {
    start: usize,
    kind: NodeType,
    children: Vec<ObjCoords>,
}

/// Find all JSON object/array structures in the given text. Coordinates are byte indices.
///
/// Model replies wrap their JSON in prose, code fences, or both; this scans for
/// balanced braces/brackets outside string literals and never guesses at
/// unbalanced input.
#[instrument(target = "studyjoy::json_scan", skip(text))]
pub fn find_json_structures(text: &str) -> Vec<ObjCoords> {
    let bytes = text.as_bytes();
    let mut results: Vec<ObjCoords> = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    let mut in_string = false;
    let mut escape = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escape {
                escape = false;
                continue;
            }
            match b {
                b'\\' => escape = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => stack.push(Frame { start: i, kind: NodeType::Object, children: Vec::new() }),
            b'[' => stack.push(Frame { start: i, kind: NodeType::Array, children: Vec::new() }),
            b'}' => {
                if let Some(frame) = stack.pop() {
                    if frame.kind == NodeType::Object {
                        let node = ObjCoords::new(frame.start, i, NodeType::Object, frame.children);
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(node);
                        } else {
                            results.push(node);
                        }
                    }
                    // Unbalanced brace: drop the frame
                }
            }
            b']' => {
                if let Some(frame) = stack.pop() {
                    if frame.kind == NodeType::Array {
                        let node = ObjCoords::new(frame.start, i, NodeType::Array, frame.children);
                        if let Some(parent) = stack.last_mut() {
                            parent.children.push(node);
                        } else {
                            results.push(node);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    debug!(target = "studyjoy::json_scan", count = results.len(), "found root structures");
    results
}

/// Extract all occurrences of `T` from a response string.
///
/// Strategy (in order):
/// - If the entire string parses as `Vec<T>`, return it.
/// - Otherwise, scan for JSON structures. For each structure, try to parse as
///   `Vec<T>` (to support top-level arrays), then as a single `T`.
/// - Structures that parse as neither are descended into, so a `T` buried in a
///   wrapper object is still found, in discovery order.
#[instrument(target = "studyjoy::json_scan", skip(text))]
pub fn extract_all<T: DeserializeOwned>(text: &str) -> Vec<T> {
    // Try direct parse as Vec<T>
    if let Ok(v) = serde_json::from_str::<Vec<T>>(text) {
        return v;
    }

    fn collect_from_node<T: DeserializeOwned>(text: &str, node: &ObjCoords, out: &mut Vec<T>) -> bool {
        let s = node.slice(text);
        if let Ok(vs) = serde_json::from_str::<Vec<T>>(s) {
            out.extend(vs);
            return true; // consumed node; skip children
        }
        if let Ok(v) = serde_json::from_str::<T>(s) {
            out.push(v);
            return true; // consumed node; skip children
        }
        // Descend
        for child in &node.children {
            collect_from_node::<T>(text, child, out);
        }
        false
    }

    let mut out: Vec<T> = Vec::new();
    let roots = find_json_structures(text);
    for node in &roots {
        collect_from_node::<T>(text, node, &mut out);
    }
    out
}

/// Parse every root structure to a `serde_json::Value`, in discovery order.
/// Balanced-but-invalid structures (e.g. `{oops}`) are skipped.
pub fn root_values(text: &str) -> Vec<serde_json::Value> {
    find_json_structures(text)
        .iter()
        .filter_map(|node| serde_json::from_str(node.slice(text)).ok())
        .collect()
}
