use crate::error::StoreError;
use serde::{Deserialize, Serialize};

/// One paragraph of ingested book content. Immutable reference data, grouped
/// by `(book_title, chapter_number)` and ordered by `paragraph_number`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentParagraph {
    pub id: i64,
    pub book_title: String,
    pub chapter_number: i64,
    pub chapter_title: String,
    pub paragraph_number: i64,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objectives: Option<String>,
}

/// What a quiz targets: a whole book, one chapter, or one paragraph.
/// Books are addressed by title.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizScope {
    pub book_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paragraph_id: Option<i64>,
}

impl QuizScope {
    pub fn book(book_id: impl Into<String>) -> Self {
        Self { book_id: book_id.into(), chapter_id: None, paragraph_id: None }
    }

    pub fn chapter(book_id: impl Into<String>, chapter_id: i64) -> Self {
        Self { book_id: book_id.into(), chapter_id: Some(chapter_id), paragraph_id: None }
    }

    pub fn paragraph(book_id: impl Into<String>, chapter_id: Option<i64>, paragraph_id: i64) -> Self {
        Self { book_id: book_id.into(), chapter_id, paragraph_id: Some(paragraph_id) }
    }

    fn key(&self, prefix: &str) -> String {
        let chapter = self.chapter_id.map_or_else(|| "none".to_string(), |c| c.to_string());
        let paragraph = self.paragraph_id.map_or_else(|| "none".to_string(), |p| p.to_string());
        format!("{}_{}_{}_{}", prefix, self.book_id, chapter, paragraph)
    }

    /// Storage key of the in-progress session snapshot for this scope.
    pub fn state_key(&self) -> String {
        self.key("quizState")
    }

    /// Storage key of the completed-quiz snapshot for this scope.
    pub fn result_key(&self) -> String {
        self.key("quizResult")
    }
}

impl std::fmt::Display for QuizScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.book_id)?;
        if let Some(c) = self.chapter_id {
            write!(f, " / chapter {}", c)?;
        }
        if let Some(p) = self.paragraph_id {
            write!(f, " / paragraph {}", p)?;
        }
        Ok(())
    }
}

/// Read access to ingested content. Backends: in-memory and SQLite.
pub trait ContentStore: Send + Sync {
    fn paragraph(&self, id: i64) -> Result<Option<ContentParagraph>, StoreError>;

    /// All paragraphs of a chapter, ordered by paragraph number.
    fn chapter(&self, book_id: &str, chapter_number: i64) -> Result<Vec<ContentParagraph>, StoreError>;

    /// All paragraphs of a book, ordered by chapter then paragraph number.
    fn book(&self, book_id: &str) -> Result<Vec<ContentParagraph>, StoreError>;
}

/// In-memory content store for tests and fixtures.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    paragraphs: Vec<ContentParagraph>,
}

impl MemoryContentStore {
    pub fn new(paragraphs: Vec<ContentParagraph>) -> Self {
        Self { paragraphs }
    }

    pub fn insert(&mut self, paragraph: ContentParagraph) {
        self.paragraphs.push(paragraph);
    }
}

impl ContentStore for MemoryContentStore {
    fn paragraph(&self, id: i64) -> Result<Option<ContentParagraph>, StoreError> {
        Ok(self.paragraphs.iter().find(|p| p.id == id).cloned())
    }

    fn chapter(&self, book_id: &str, chapter_number: i64) -> Result<Vec<ContentParagraph>, StoreError> {
        let mut rows: Vec<ContentParagraph> = self
            .paragraphs
            .iter()
            .filter(|p| p.book_title == book_id && p.chapter_number == chapter_number)
            .cloned()
            .collect();
        rows.sort_by_key(|p| p.paragraph_number);
        Ok(rows)
    }

    fn book(&self, book_id: &str) -> Result<Vec<ContentParagraph>, StoreError> {
        let mut rows: Vec<ContentParagraph> = self
            .paragraphs
            .iter()
            .filter(|p| p.book_title == book_id)
            .cloned()
            .collect();
        rows.sort_by_key(|p| (p.chapter_number, p.paragraph_number));
        Ok(rows)
    }
}

/// Extract `**marked**` terms from paragraph content: order-preserving,
/// de-duplicated (first occurrence wins), whitespace-trimmed.
pub fn marked_terms(content: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    let mut rest = content;

    while let Some(open) = rest.find("**") {
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("**") else {
            break; // unclosed marker
        };
        let term = after_open[..close].trim();
        if !term.is_empty() && !terms.iter().any(|t| t == term) {
            terms.push(term.to_string());
        }
        rest = &after_open[close + 2..];
    }

    terms
}

/// Split an objectives blob into individual learning objectives: one per
/// line, bullet markers and numbering stripped, empties dropped.
pub fn objective_lines(objectives: &str) -> Vec<String> {
    objectives
        .lines()
        .map(strip_bullet)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn strip_bullet(line: &str) -> &str {
    let line = line.trim();
    let stripped = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))
        .or_else(|| line.strip_prefix("• "));
    if let Some(s) = stripped {
        return s.trim();
    }
    // numbered lists: "1. objective" / "2) objective"
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits > 0 {
        let after = &line[digits..];
        if let Some(s) = after.strip_prefix('.').or_else(|| after.strip_prefix(')')) {
            return s.trim();
        }
    }
    line
}

/// Deterministic even-stride sample of at most `max` items, always keeping
/// the first element. Whole-book quizzes use this so every generation run
/// over the same content sees the same paragraphs.
pub fn sample_evenly<T: Clone>(items: &[T], max: usize) -> Vec<T> {
    if max == 0 || items.is_empty() {
        return Vec::new();
    }
    if items.len() <= max {
        return items.to_vec();
    }
    let stride = items.len() as f64 / max as f64;
    (0..max)
        .map(|i| items[(i as f64 * stride) as usize].clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marked_terms_dedupes_in_order() {
        let text = "The **mitochondria** is the powerhouse. The **cell** contains **mitochondria**.";
        assert_eq!(marked_terms(text), vec!["mitochondria", "cell"]);
    }

    #[test]
    fn marked_terms_skips_unclosed_and_empty() {
        assert_eq!(marked_terms("no markers here"), Vec::<String>::new());
        assert_eq!(marked_terms("a **dangling marker"), Vec::<String>::new());
        assert_eq!(marked_terms("empty **** marker and **real**"), vec!["real"]);
    }

    #[test]
    fn objectives_strip_bullets_and_numbering() {
        let blob = "- Define osmosis\n* Explain diffusion\n• Compare both\n1. Name the organelles\n2) Label a diagram\n\nplain line";
        assert_eq!(
            objective_lines(blob),
            vec![
                "Define osmosis",
                "Explain diffusion",
                "Compare both",
                "Name the organelles",
                "Label a diagram",
                "plain line",
            ]
        );
    }

    #[test]
    fn sampling_is_deterministic_and_capped() {
        let items: Vec<i32> = (0..10).collect();
        assert_eq!(sample_evenly(&items, 4), vec![0, 2, 5, 7]);
        assert_eq!(sample_evenly(&items, 20), items);
        assert_eq!(sample_evenly(&items, 0), Vec::<i32>::new());
    }

    #[test]
    fn scope_keys_use_none_placeholders() {
        let scope = QuizScope::book("biology-101");
        assert_eq!(scope.state_key(), "quizState_biology-101_none_none");

        let scope = QuizScope::paragraph("biology-101", Some(2), 17);
        assert_eq!(scope.state_key(), "quizState_biology-101_2_17");
        assert_eq!(scope.result_key(), "quizResult_biology-101_2_17");
    }
}
