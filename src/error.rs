use thiserror::Error;

#[derive(Error, Debug)]
pub enum AIError {
    #[error("OpenAI API error: {0}")]
    OpenAI(#[from] OpenAIError),
    #[error("Mock error: {0}")]
    Mock(String),
}

#[derive(Error, Debug)]
pub enum OpenAIError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Rate limit exceeded")]
    RateLimit,
    #[error("Authentication failed")]
    Authentication,
}

/// Failures of a single generation request. `status_code` carries the
/// HTTP-equivalent classification the response envelope reports.
#[derive(Error, Debug)]
pub enum GeneratorError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Content not found for book '{book_id}'")]
    BookNotFound { book_id: String },
    #[error("Paragraph {paragraph_id} not found in book '{book_id}'")]
    ParagraphNotFound { book_id: String, paragraph_id: i64 },
    #[error("Chapter {chapter_id} of book '{book_id}' has no paragraphs")]
    ChapterNotFound { book_id: String, chapter_id: i64 },
    #[error("Batch index {requested} out of range (total batches: {total})")]
    BatchOutOfRange { requested: usize, total: usize },
    #[error("AI error: {0}")]
    Ai(#[from] AIError),
    #[error("Failed to parse model reply: {detail}")]
    MalformedReply { detail: String, raw: String },
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl GeneratorError {
    pub fn status_code(&self) -> u16 {
        match self {
            GeneratorError::MissingField(_)
            | GeneratorError::InvalidRequest(_)
            | GeneratorError::BatchOutOfRange { .. } => 400,
            GeneratorError::BookNotFound { .. }
            | GeneratorError::ParagraphNotFound { .. }
            | GeneratorError::ChapterNotFound { .. } => 404,
            GeneratorError::Ai(_)
            | GeneratorError::MalformedReply { .. }
            | GeneratorError::Store(_) => 500,
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Missing key: {0}")]
    MissingKey(String),
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No questions loaded")]
    NoQuestions,
    #[error("Please select an answer first")]
    NoAnswerSelected,
    #[error("Answer already submitted for this question")]
    AlreadySubmitted,
    #[error("No answer submitted yet")]
    NotSubmitted,
    #[error("Quiz is already complete")]
    QuizComplete,
    #[error("Answer index {index} out of range")]
    InvalidChoice { index: usize },
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}
