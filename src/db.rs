use crate::content::{ContentParagraph, ContentStore};
use crate::error::StoreError;
use crate::progress::{
    CompletionOutcome, CompletionRecord, ParagraphProgress, ProgressStore, QuizResult, UserQuizStats,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS books (
    id INTEGER PRIMARY KEY,
    book_title TEXT NOT NULL,
    chapter_number INTEGER NOT NULL,
    chapter_title TEXT NOT NULL,
    paragraph_number INTEGER NOT NULL,
    content TEXT NOT NULL,
    objectives TEXT
);
CREATE INDEX IF NOT EXISTS idx_books_scope
    ON books (book_title, chapter_number, paragraph_number);

CREATE TABLE IF NOT EXISTS quiz_results (
    id INTEGER PRIMARY KEY,
    user_id TEXT NOT NULL,
    book_id TEXT NOT NULL,
    chapter_id INTEGER,
    paragraph_id INTEGER,
    score INTEGER NOT NULL,
    total_questions INTEGER NOT NULL,
    percentage REAL NOT NULL,
    completed INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_quiz_results_user
    ON quiz_results (user_id, created_at);

CREATE TABLE IF NOT EXISTS paragraph_progress (
    user_id TEXT NOT NULL,
    book_id TEXT NOT NULL,
    chapter_id INTEGER NOT NULL,
    paragraph_id INTEGER NOT NULL,
    completed INTEGER NOT NULL DEFAULT 0,
    score INTEGER NOT NULL,
    total_questions INTEGER NOT NULL,
    percentage REAL NOT NULL,
    last_attempted TEXT NOT NULL,
    completed_date TEXT,
    UNIQUE (user_id, paragraph_id)
);

CREATE VIEW IF NOT EXISTS user_quiz_stats AS
SELECT user_id,
       COUNT(*) AS total_quizzes,
       SUM(score) AS total_score,
       SUM(total_questions) AS total_questions,
       AVG(percentage) AS average_percentage
FROM quiz_results
GROUP BY user_id;
";

/// `completed` only moves false to true; `completed_date` only moves on a
/// passing attempt; everything else takes the latest attempt's values.
const UPSERT_PROGRESS: &str = "
INSERT INTO paragraph_progress
    (user_id, book_id, chapter_id, paragraph_id, completed, score,
     total_questions, percentage, last_attempted, completed_date)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
ON CONFLICT (user_id, paragraph_id) DO UPDATE SET
    book_id = excluded.book_id,
    chapter_id = excluded.chapter_id,
    score = excluded.score,
    total_questions = excluded.total_questions,
    percentage = excluded.percentage,
    last_attempted = excluded.last_attempted,
    completed = paragraph_progress.completed OR excluded.completed,
    completed_date = CASE WHEN excluded.completed
                          THEN excluded.completed_date
                          ELSE paragraph_progress.completed_date END
";

/// SQLite-backed content and progress storage. Content lives in `books`,
/// results in `quiz_results`, rolling progress in `paragraph_progress`,
/// with the `user_quiz_stats` view aggregating per user.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Ingest paragraphs in one transaction. A paragraph with a positive id
    /// replaces any existing row with that id; ids of 0 are assigned fresh.
    pub fn insert_paragraphs(&self, paragraphs: &[ContentParagraph]) -> Result<usize, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for p in paragraphs {
            let id: Option<i64> = (p.id > 0).then_some(p.id);
            tx.execute(
                "INSERT OR REPLACE INTO books
                     (id, book_title, chapter_number, chapter_title, paragraph_number, content, objectives)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    p.book_title,
                    p.chapter_number,
                    p.chapter_title,
                    p.paragraph_number,
                    p.content,
                    p.objectives,
                ],
            )?;
        }
        tx.commit()?;
        info!(target: "studyjoy::db", count = paragraphs.len(), "paragraphs ingested");
        Ok(paragraphs.len())
    }

    /// Titles of all ingested books, alphabetical.
    pub fn book_titles(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT DISTINCT book_title FROM books ORDER BY book_title")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<Result<Vec<String>, _>>()?)
    }
}

const PARAGRAPH_COLUMNS: &str =
    "id, book_title, chapter_number, chapter_title, paragraph_number, content, objectives";

fn paragraph_from_row(row: &rusqlite::Row) -> rusqlite::Result<ContentParagraph> {
    Ok(ContentParagraph {
        id: row.get(0)?,
        book_title: row.get(1)?,
        chapter_number: row.get(2)?,
        chapter_title: row.get(3)?,
        paragraph_number: row.get(4)?,
        content: row.get(5)?,
        objectives: row.get(6)?,
    })
}

fn parse_ts(idx: usize, s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn result_from_row(row: &rusqlite::Row) -> rusqlite::Result<QuizResult> {
    Ok(QuizResult {
        id: row.get(0)?,
        user_id: row.get(1)?,
        book_id: row.get(2)?,
        chapter_id: row.get(3)?,
        paragraph_id: row.get(4)?,
        score: row.get(5)?,
        total_questions: row.get(6)?,
        percentage: row.get(7)?,
        completed: row.get(8)?,
        created_at: parse_ts(9, row.get(9)?)?,
    })
}

fn progress_from_row(row: &rusqlite::Row) -> rusqlite::Result<ParagraphProgress> {
    Ok(ParagraphProgress {
        user_id: row.get(0)?,
        book_id: row.get(1)?,
        chapter_id: row.get(2)?,
        paragraph_id: row.get(3)?,
        completed: row.get(4)?,
        score: row.get(5)?,
        total_questions: row.get(6)?,
        percentage: row.get(7)?,
        last_attempted: parse_ts(8, row.get(8)?)?,
        completed_date: row.get::<_, Option<String>>(9)?.map(|s| parse_ts(9, s)).transpose()?,
    })
}

fn select_progress(
    conn: &Connection,
    user_id: &str,
    paragraph_id: i64,
) -> Result<Option<ParagraphProgress>, StoreError> {
    let row = conn
        .query_row(
            "SELECT user_id, book_id, chapter_id, paragraph_id, completed, score,
                    total_questions, percentage, last_attempted, completed_date
             FROM paragraph_progress
             WHERE user_id = ?1 AND paragraph_id = ?2",
            params![user_id, paragraph_id],
            progress_from_row,
        )
        .optional()?;
    Ok(row)
}

impl ContentStore for SqliteStore {
    fn paragraph(&self, id: i64) -> Result<Option<ContentParagraph>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                &format!("SELECT {} FROM books WHERE id = ?1", PARAGRAPH_COLUMNS),
                params![id],
                paragraph_from_row,
            )
            .optional()?;
        Ok(row)
    }

    fn chapter(&self, book_id: &str, chapter_number: i64) -> Result<Vec<ContentParagraph>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM books
             WHERE book_title = ?1 AND chapter_number = ?2
             ORDER BY paragraph_number",
            PARAGRAPH_COLUMNS
        ))?;
        let rows = stmt.query_map(params![book_id, chapter_number], paragraph_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn book(&self, book_id: &str) -> Result<Vec<ContentParagraph>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM books
             WHERE book_title = ?1
             ORDER BY chapter_number, paragraph_number",
            PARAGRAPH_COLUMNS
        ))?;
        let rows = stmt.query_map(params![book_id], paragraph_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl ProgressStore for SqliteStore {
    /// The result insert and the progress upsert commit or roll back
    /// together.
    fn record_completion(&self, record: &CompletionRecord) -> Result<CompletionOutcome, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let now = Utc::now();
        let now_s = now.to_rfc3339();

        tx.execute(
            "INSERT INTO quiz_results
                 (user_id, book_id, chapter_id, paragraph_id, score, total_questions,
                  percentage, completed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.user_id,
                record.scope.book_id,
                record.scope.chapter_id,
                record.scope.paragraph_id,
                record.score as i64,
                record.total_questions as i64,
                record.percentage(),
                true,
                now_s,
            ],
        )?;
        let result_id = tx.last_insert_rowid();

        let progress = if let Some(paragraph_id) = record.scope.paragraph_id {
            let chapter_id = match record.scope.chapter_id {
                Some(c) => c,
                None => tx
                    .query_row(
                        "SELECT chapter_number FROM books WHERE id = ?1",
                        params![paragraph_id],
                        |row| row.get(0),
                    )
                    .optional()?
                    .unwrap_or(0),
            };
            let completed_date: Option<String> = record.passed().then(|| now_s.clone());
            tx.execute(
                UPSERT_PROGRESS,
                params![
                    record.user_id,
                    record.scope.book_id,
                    chapter_id,
                    paragraph_id,
                    record.passed(),
                    record.score as i64,
                    record.total_questions as i64,
                    record.percentage(),
                    now_s,
                    completed_date,
                ],
            )?;
            select_progress(&tx, &record.user_id, paragraph_id)?
        } else {
            None
        };

        tx.commit()?;
        info!(
            target: "studyjoy::db",
            user = %record.user_id,
            scope = %record.scope,
            percentage = record.percentage(),
            "completion recorded"
        );

        Ok(CompletionOutcome {
            result: QuizResult {
                id: result_id,
                user_id: record.user_id.clone(),
                book_id: record.scope.book_id.clone(),
                chapter_id: record.scope.chapter_id,
                paragraph_id: record.scope.paragraph_id,
                score: record.score as i64,
                total_questions: record.total_questions as i64,
                percentage: record.percentage(),
                completed: true,
                created_at: now,
            },
            progress,
        })
    }

    fn results_for_user(&self, user_id: &str) -> Result<Vec<QuizResult>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, user_id, book_id, chapter_id, paragraph_id, score, total_questions,
                    percentage, completed, created_at
             FROM quiz_results
             WHERE user_id = ?1
             ORDER BY created_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![user_id], result_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn paragraph_progress(
        &self,
        user_id: &str,
        paragraph_id: i64,
    ) -> Result<Option<ParagraphProgress>, StoreError> {
        let conn = self.conn.lock().unwrap();
        select_progress(&conn, user_id, paragraph_id)
    }

    fn progress_for_book(
        &self,
        user_id: &str,
        book_id: &str,
    ) -> Result<Vec<ParagraphProgress>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT user_id, book_id, chapter_id, paragraph_id, completed, score,
                    total_questions, percentage, last_attempted, completed_date
             FROM paragraph_progress
             WHERE user_id = ?1 AND book_id = ?2
             ORDER BY chapter_id, paragraph_id",
        )?;
        let rows = stmt.query_map(params![user_id, book_id], progress_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn user_stats(&self, user_id: &str) -> Result<Option<UserQuizStats>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT user_id, total_quizzes, total_score, total_questions, average_percentage
                 FROM user_quiz_stats
                 WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(UserQuizStats {
                        user_id: row.get(0)?,
                        total_quizzes: row.get(1)?,
                        total_score: row.get(2)?,
                        total_questions: row.get(3)?,
                        average_percentage: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}
