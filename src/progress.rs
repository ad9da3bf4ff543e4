use crate::content::QuizScope;
use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

/// An attempt passes at this percentage and the paragraph counts as completed.
pub const PASS_THRESHOLD: f64 = 70.0;

/// Whole-number percentage of `score` out of `total`, 0.0 for an empty quiz.
pub fn percentage(score: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    ((score as f64 / total as f64) * 100.0).round()
}

/// One completed quiz session. Inserted exactly once, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizResult {
    pub id: i64,
    pub user_id: String,
    pub book_id: String,
    pub chapter_id: Option<i64>,
    pub paragraph_id: Option<i64>,
    pub score: i64,
    pub total_questions: i64,
    pub percentage: f64,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

/// Rolling per-paragraph learning state, upserted per `(user, paragraph)`.
///
/// `score`/`percentage`/`last_attempted` always track the latest attempt.
/// `completed` only ever moves false to true, and `completed_date` is only
/// overwritten by a passing attempt, so a failing retake never erases an
/// earlier pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParagraphProgress {
    pub user_id: String,
    pub book_id: String,
    pub chapter_id: i64,
    pub paragraph_id: i64,
    pub completed: bool,
    pub score: i64,
    pub total_questions: i64,
    pub percentage: f64,
    pub last_attempted: DateTime<Utc>,
    pub completed_date: Option<DateTime<Utc>>,
}

/// Per-user aggregate over all quiz results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserQuizStats {
    pub user_id: String,
    pub total_quizzes: i64,
    pub total_score: i64,
    pub total_questions: i64,
    pub average_percentage: f64,
}

/// A finished session, ready to persist for a user.
#[derive(Debug, Clone)]
pub struct CompletionRecord {
    pub user_id: String,
    pub scope: QuizScope,
    pub score: usize,
    pub total_questions: usize,
}

impl CompletionRecord {
    pub fn percentage(&self) -> f64 {
        percentage(self.score, self.total_questions)
    }

    pub fn passed(&self) -> bool {
        self.percentage() >= PASS_THRESHOLD
    }
}

/// What `record_completion` wrote.
#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub result: QuizResult,
    pub progress: Option<ParagraphProgress>,
}

/// Persistence of results and progress. `record_completion` writes the
/// result row and, for paragraph scopes, the progress upsert atomically.
pub trait ProgressStore: Send + Sync {
    fn record_completion(&self, record: &CompletionRecord) -> Result<CompletionOutcome, StoreError>;

    /// All results of a user, most recent first.
    fn results_for_user(&self, user_id: &str) -> Result<Vec<QuizResult>, StoreError>;

    fn paragraph_progress(&self, user_id: &str, paragraph_id: i64)
        -> Result<Option<ParagraphProgress>, StoreError>;

    /// Per-paragraph progress of a user within one book, ordered by chapter
    /// then paragraph id.
    fn progress_for_book(&self, user_id: &str, book_id: &str)
        -> Result<Vec<ParagraphProgress>, StoreError>;

    fn user_stats(&self, user_id: &str) -> Result<Option<UserQuizStats>, StoreError>;
}

/// Applies an attempt to an existing progress row, observing the sticky
/// rules.
fn merge_attempt(existing: &mut ParagraphProgress, record: &CompletionRecord, now: DateTime<Utc>) {
    existing.score = record.score as i64;
    existing.total_questions = record.total_questions as i64;
    existing.percentage = record.percentage();
    existing.last_attempted = now;
    if record.passed() {
        existing.completed = true;
        existing.completed_date = Some(now);
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    results: Vec<QuizResult>,
    progress: HashMap<(String, i64), ParagraphProgress>,
    next_id: i64,
}

/// In-memory progress store for tests.
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressStore for MemoryProgressStore {
    fn record_completion(&self, record: &CompletionRecord) -> Result<CompletionOutcome, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();

        inner.next_id += 1;
        let result = QuizResult {
            id: inner.next_id,
            user_id: record.user_id.clone(),
            book_id: record.scope.book_id.clone(),
            chapter_id: record.scope.chapter_id,
            paragraph_id: record.scope.paragraph_id,
            score: record.score as i64,
            total_questions: record.total_questions as i64,
            percentage: record.percentage(),
            completed: true,
            created_at: now,
        };
        inner.results.push(result.clone());

        let progress = match record.scope.paragraph_id {
            Some(paragraph_id) => {
                let key = (record.user_id.clone(), paragraph_id);
                let entry = inner.progress.entry(key).or_insert_with(|| ParagraphProgress {
                    user_id: record.user_id.clone(),
                    book_id: record.scope.book_id.clone(),
                    chapter_id: record.scope.chapter_id.unwrap_or(0),
                    paragraph_id,
                    completed: false,
                    score: 0,
                    total_questions: 0,
                    percentage: 0.0,
                    last_attempted: now,
                    completed_date: None,
                });
                merge_attempt(entry, record, now);
                Some(entry.clone())
            }
            None => None,
        };

        info!(
            target: "studyjoy::progress",
            user = %record.user_id,
            scope = %record.scope,
            percentage = record.percentage(),
            "completion recorded"
        );
        Ok(CompletionOutcome { result, progress })
    }

    fn results_for_user(&self, user_id: &str) -> Result<Vec<QuizResult>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<QuizResult> = inner
            .results
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    fn paragraph_progress(
        &self,
        user_id: &str,
        paragraph_id: i64,
    ) -> Result<Option<ParagraphProgress>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.progress.get(&(user_id.to_string(), paragraph_id)).cloned())
    }

    fn progress_for_book(
        &self,
        user_id: &str,
        book_id: &str,
    ) -> Result<Vec<ParagraphProgress>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut rows: Vec<ParagraphProgress> = inner
            .progress
            .values()
            .filter(|p| p.user_id == user_id && p.book_id == book_id)
            .cloned()
            .collect();
        rows.sort_by_key(|p| (p.chapter_id, p.paragraph_id));
        Ok(rows)
    }

    fn user_stats(&self, user_id: &str) -> Result<Option<UserQuizStats>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let rows: Vec<&QuizResult> = inner.results.iter().filter(|r| r.user_id == user_id).collect();
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(UserQuizStats {
            user_id: user_id.to_string(),
            total_quizzes: rows.len() as i64,
            total_score: rows.iter().map(|r| r.score).sum(),
            total_questions: rows.iter().map(|r| r.total_questions).sum(),
            average_percentage: rows.iter().map(|r| r.percentage).sum::<f64>() / rows.len() as f64,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph_record(user: &str, score: usize, total: usize) -> CompletionRecord {
        CompletionRecord {
            user_id: user.to_string(),
            scope: QuizScope::paragraph("biology", Some(2), 17),
            score,
            total_questions: total,
        }
    }

    #[test]
    fn percentages_are_rounded_whole_numbers() {
        assert_eq!(percentage(2, 3), 67.0);
        assert_eq!(percentage(5, 6), 83.0);
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(3, 3), 100.0);
    }

    #[test]
    fn passing_attempt_completes_paragraph() {
        let store = MemoryProgressStore::new();
        let outcome = store.record_completion(&paragraph_record("u1", 17, 20)).unwrap();

        let progress = outcome.progress.unwrap();
        assert!(progress.completed);
        assert_eq!(progress.percentage, 85.0);
        assert!(progress.completed_date.is_some());
    }

    #[test]
    fn failing_retake_keeps_pass_sticky() {
        let store = MemoryProgressStore::new();
        store.record_completion(&paragraph_record("u1", 17, 20)).unwrap();
        let first = store.paragraph_progress("u1", 17).unwrap().unwrap();

        store.record_completion(&paragraph_record("u1", 8, 20)).unwrap();
        let second = store.paragraph_progress("u1", 17).unwrap().unwrap();

        assert!(second.completed, "completed never regresses");
        assert_eq!(second.completed_date, first.completed_date, "pass date untouched by failing retake");
        assert_eq!(second.percentage, 40.0, "latest attempt overwrites percentage");
        assert_eq!(second.score, 8);
    }

    #[test]
    fn book_scope_records_no_paragraph_progress() {
        let store = MemoryProgressStore::new();
        let record = CompletionRecord {
            user_id: "u1".to_string(),
            scope: QuizScope::book("biology"),
            score: 3,
            total_questions: 4,
        };
        let outcome = store.record_completion(&record).unwrap();
        assert!(outcome.progress.is_none());
        assert_eq!(store.results_for_user("u1").unwrap().len(), 1);
    }

    #[test]
    fn stats_aggregate_all_results() {
        let store = MemoryProgressStore::new();
        store.record_completion(&paragraph_record("u1", 8, 10)).unwrap();
        store.record_completion(&paragraph_record("u1", 6, 10)).unwrap();

        let stats = store.user_stats("u1").unwrap().unwrap();
        assert_eq!(stats.total_quizzes, 2);
        assert_eq!(stats.total_score, 14);
        assert_eq!(stats.total_questions, 20);
        assert_eq!(stats.average_percentage, 70.0);

        assert!(store.user_stats("nobody").unwrap().is_none());
    }
}
