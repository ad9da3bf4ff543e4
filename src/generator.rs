use crate::batching::{BatchPlan, DEFAULT_BATCH_SIZE};
use crate::clients::LowLevelClient;
use crate::content::{marked_terms, objective_lines, sample_evenly, ContentParagraph, ContentStore, QuizScope};
use crate::error::GeneratorError;
use crate::interceptors::Interceptor;
use crate::parse::{parse_reply, ParseOutcome};
use crate::questions::{GeneratedQuestion, RawObjectiveQuestion, RawTermQuestion, UnitKind};
use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Paragraphs sampled for a whole-book quiz.
const MAX_BOOK_SAMPLE: usize = 12;

/// Upper bound on content characters quoted into one prompt.
const MAX_EXCERPT_CHARS: usize = 8000;

const DEFAULT_QUESTIONS_PER_UNIT: usize = 2;

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_questions_per_unit() -> usize {
    DEFAULT_QUESTIONS_PER_UNIT
}

/// One batch-generation request. `questionsPerObjective` and
/// `questionsPerTerm` are accepted as legacy spellings of
/// `questionsPerUnit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub book_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paragraph_id: Option<i64>,
    pub batch_index: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(
        default = "default_questions_per_unit",
        alias = "questionsPerObjective",
        alias = "questionsPerTerm"
    )]
    pub questions_per_unit: usize,
}

impl GenerateRequest {
    pub fn for_scope(scope: &QuizScope, batch_index: usize) -> Self {
        Self {
            book_id: scope.book_id.clone(),
            chapter_id: scope.chapter_id,
            paragraph_id: scope.paragraph_id,
            batch_index,
            batch_size: DEFAULT_BATCH_SIZE,
            questions_per_unit: DEFAULT_QUESTIONS_PER_UNIT,
        }
    }

    pub fn scope(&self) -> QuizScope {
        QuizScope {
            book_id: self.book_id.clone(),
            chapter_id: self.chapter_id,
            paragraph_id: self.paragraph_id,
        }
    }

    fn validate(&self) -> Result<(), GeneratorError> {
        if self.book_id.trim().is_empty() {
            return Err(GeneratorError::MissingField("bookId"));
        }
        if self.batch_size == 0 {
            return Err(GeneratorError::InvalidRequest("batchSize must be at least 1".to_string()));
        }
        if self.questions_per_unit == 0 {
            return Err(GeneratorError::InvalidRequest(
                "questionsPerUnit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Batch position data; `is_last_batch` tells callers when to stop
/// requesting further batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchMetadata {
    pub current_batch: usize,
    pub total_batches: usize,
    pub is_last_batch: bool,
    pub processed_units: usize,
    pub total_units: usize,
    pub unit_kind: UnitKind,
}

/// What content this batch was generated from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationContext {
    pub book_title: String,
    pub chapter_numbers: Vec<i64>,
    pub paragraph_count: usize,
    pub units: Vec<String>,
}

impl GenerationContext {
    fn new(paragraphs: &[ContentParagraph], batch_units: &[String]) -> Self {
        let mut chapter_numbers: Vec<i64> = paragraphs.iter().map(|p| p.chapter_number).collect();
        chapter_numbers.sort_unstable();
        chapter_numbers.dedup();
        Self {
            book_title: paragraphs.first().map(|p| p.book_title.clone()).unwrap_or_default(),
            chapter_numbers,
            paragraph_count: paragraphs.len(),
            units: batch_units.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfo {
    pub prompt_chars: usize,
    pub reply_chars: usize,
    pub dropped_questions: usize,
}

/// Success envelope of one batch. `success` is always true here; failures
/// are carried by [`ErrorEnvelope`] instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    pub success: bool,
    pub questions: Vec<GeneratedQuestion>,
    pub metadata: BatchMetadata,
    pub context: GenerationContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
}

impl ErrorEnvelope {
    /// Status code and JSON body a transport layer would send for `err`.
    pub fn from_error(err: &GeneratorError) -> (u16, Self) {
        (err.status_code(), Self { success: false, error: err.to_string() })
    }
}

/// Generates one batch of questions per call: resolve the content scope,
/// extract units, prompt the model once, parse and validate the reply.
/// No retries; a transport or parse failure is terminal for the batch.
pub struct QuestionGenerator<C: LowLevelClient> {
    client: C,
    content: Arc<dyn ContentStore>,
    interceptor: Option<Arc<dyn Interceptor>>,
    debug: bool,
}

impl<C: LowLevelClient> QuestionGenerator<C> {
    pub fn new(client: C, content: Arc<dyn ContentStore>) -> Self {
        Self { client, content, interceptor: None, debug: false }
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn content(&self) -> &Arc<dyn ContentStore> {
        &self.content
    }

    #[instrument(
        target = "studyjoy::generator",
        skip(self, request),
        fields(book = %request.book_id, batch = request.batch_index, kind = %kind)
    )]
    pub async fn generate(
        &self,
        request: &GenerateRequest,
        kind: UnitKind,
    ) -> Result<GenerateResponse, GeneratorError> {
        request.validate()?;

        let paragraphs = self.resolve_scope(request)?;
        let units = extract_units(kind, &paragraphs);
        let plan = BatchPlan::new(units.len(), request.batch_size)?;
        let batch_units = plan.slice(&units, request.batch_index)?;

        let metadata = BatchMetadata {
            current_batch: request.batch_index,
            total_batches: plan.total_batches(),
            is_last_batch: plan.is_last(request.batch_index),
            processed_units: plan.processed_after(request.batch_index),
            total_units: plan.total_units(),
            unit_kind: kind,
        };
        let context = GenerationContext::new(&paragraphs, batch_units);

        if batch_units.is_empty() {
            info!(target: "studyjoy::generator", "batch has no units; skipping model call");
            return Ok(GenerateResponse {
                success: true,
                questions: Vec::new(),
                metadata,
                context,
                debug: None,
            });
        }

        let prompt = build_prompt(kind, &paragraphs, batch_units, request.questions_per_unit);
        info!(
            target: "studyjoy::generator",
            prompt_len = prompt.len(),
            units = batch_units.len(),
            "requesting batch from model"
        );

        let reply = self.client.ask_raw(prompt.clone()).await?;

        if let Some(interceptor) = &self.interceptor {
            let label = format!("{}_batch{}", kind.slug(), request.batch_index);
            if let Err(e) = interceptor.save(&label, &prompt, &reply).await {
                warn!(target: "studyjoy::generator", error = %e, "failed to save transcript");
            }
        }

        match parse_reply(&reply, kind) {
            ParseOutcome::Parsed { questions, dropped } => {
                if !dropped.is_empty() {
                    warn!(
                        target: "studyjoy::generator",
                        dropped = dropped.len(),
                        "reply contained invalid question entries"
                    );
                }
                info!(target: "studyjoy::generator", questions = questions.len(), "batch complete");
                Ok(GenerateResponse {
                    success: true,
                    questions,
                    metadata,
                    context,
                    debug: self.debug_info(&prompt, &reply, dropped.len()),
                })
            }
            ParseOutcome::SchemaInvalid { reasons } => {
                warn!(
                    target: "studyjoy::generator",
                    invalid = reasons.len(),
                    "no valid questions in reply"
                );
                Ok(GenerateResponse {
                    success: true,
                    questions: Vec::new(),
                    metadata,
                    context,
                    debug: self.debug_info(&prompt, &reply, reasons.len()),
                })
            }
            ParseOutcome::MalformedJson { raw } => Err(GeneratorError::MalformedReply {
                detail: "reply is not valid or extractable JSON".to_string(),
                raw,
            }),
        }
    }

    fn debug_info(&self, prompt: &str, reply: &str, dropped: usize) -> Option<DebugInfo> {
        if !self.debug {
            return None;
        }
        Some(DebugInfo {
            prompt_chars: prompt.chars().count(),
            reply_chars: reply.chars().count(),
            dropped_questions: dropped,
        })
    }

    fn resolve_scope(&self, request: &GenerateRequest) -> Result<Vec<ContentParagraph>, GeneratorError> {
        if let Some(paragraph_id) = request.paragraph_id {
            let paragraph = self
                .content
                .paragraph(paragraph_id)?
                .filter(|p| p.book_title == request.book_id)
                .ok_or_else(|| GeneratorError::ParagraphNotFound {
                    book_id: request.book_id.clone(),
                    paragraph_id,
                })?;
            return Ok(vec![paragraph]);
        }

        if let Some(chapter_id) = request.chapter_id {
            let rows = self.content.chapter(&request.book_id, chapter_id)?;
            if rows.is_empty() {
                return Err(GeneratorError::ChapterNotFound {
                    book_id: request.book_id.clone(),
                    chapter_id,
                });
            }
            return Ok(rows);
        }

        let rows = self.content.book(&request.book_id)?;
        if rows.is_empty() {
            return Err(GeneratorError::BookNotFound { book_id: request.book_id.clone() });
        }
        Ok(sample_evenly(&rows, MAX_BOOK_SAMPLE))
    }
}

fn extract_units(kind: UnitKind, paragraphs: &[ContentParagraph]) -> Vec<String> {
    match kind {
        UnitKind::MarkedTerms => {
            let mut terms: Vec<String> = Vec::new();
            for paragraph in paragraphs {
                for term in marked_terms(&paragraph.content) {
                    if !terms.contains(&term) {
                        terms.push(term);
                    }
                }
            }
            terms
        }
        UnitKind::Objectives => paragraphs
            .iter()
            .filter_map(|p| p.objectives.as_deref())
            .flat_map(objective_lines)
            .collect(),
    }
}

fn build_prompt(
    kind: UnitKind,
    paragraphs: &[ContentParagraph],
    batch_units: &[String],
    questions_per_unit: usize,
) -> String {
    let book_title = paragraphs.first().map(|p| p.book_title.as_str()).unwrap_or("");
    let unit_list = batch_units
        .iter()
        .enumerate()
        .map(|(i, unit)| format!("{}. {}", i + 1, unit))
        .collect::<Vec<_>>()
        .join("\n");
    let excerpt = content_excerpt(paragraphs);

    let body = match kind {
        UnitKind::MarkedTerms => format!(
            "You are a quiz generator for the book \"{book_title}\".\n\n\
             Create exactly {questions_per_unit} multiple-choice questions for each of the \
             following terms from the book content:\n{unit_list}\n\n\
             Rules:\n\
             - Each question tests understanding of its term as used in the content below.\n\
             - Each question has exactly 4 answer options.\n\
             - Exactly one option is correct; give its letter (A, B, C or D) in \"correct\".\n\
             - Spread the correct answers evenly across A, B, C and D.\n\
             - Include a short explanation of why the correct answer is right.\n\n\
             Content:\n{excerpt}\n\n\
             Return a JSON array of question objects."
        ),
        UnitKind::Objectives => format!(
            "You are a quiz generator for the book \"{book_title}\".\n\n\
             Create exactly {questions_per_unit} multiple-choice questions for each of the \
             following learning objectives:\n{unit_list}\n\n\
             Rules:\n\
             - Each question tests whether the reader met its objective, based on the content below.\n\
             - Each question has exactly 4 answer options.\n\
             - Exactly one option is correct; give its zero-based index in \"correctAnswerIndex\".\n\
             - Spread the correct answers evenly across the four positions.\n\
             - Include a short explanation of why the correct answer is right.\n\
             - Echo the objective each question tests in \"objective\".\n\n\
             Content:\n{excerpt}\n\n\
             Return a JSON array of question objects."
        ),
    };

    let schema_block = match kind {
        UnitKind::MarkedTerms => schema_guidance::<Vec<RawTermQuestion>>(),
        UnitKind::Objectives => schema_guidance::<Vec<RawObjectiveQuestion>>(),
    };

    format!("{}\n\n{}", body, schema_block)
}

fn schema_guidance<T: JsonSchema>() -> String {
    let schema = schema_for!(T);
    let schema_json = serde_json::to_string_pretty(&schema)
        .unwrap_or_else(|_| "Schema serialization failed".to_string());
    format!(
        "## Response Format\nPlease include valid JSON matching this schema somewhere in your response:\n```json\n{}\n```",
        schema_json
    )
}

fn content_excerpt(paragraphs: &[ContentParagraph]) -> String {
    let mut excerpt = String::new();
    for paragraph in paragraphs {
        if !excerpt.is_empty() {
            excerpt.push_str("\n\n");
        }
        excerpt.push_str(&paragraph.content);
        if excerpt.chars().count() > MAX_EXCERPT_CHARS {
            break;
        }
    }
    if excerpt.chars().count() > MAX_EXCERPT_CHARS {
        let mut truncated: String = excerpt.chars().take(MAX_EXCERPT_CHARS).collect();
        truncated.push_str("\n[content truncated]");
        return truncated;
    }
    excerpt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_accepts_legacy_field_spellings() {
        let json = r#"{"bookId":"b","batchIndex":0,"batchSize":5,"questionsPerObjective":3}"#;
        let req: GenerateRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.questions_per_unit, 3);

        let json = r#"{"bookId":"b","batchIndex":1,"questionsPerTerm":1}"#;
        let req: GenerateRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.questions_per_unit, 1);
        assert_eq!(req.batch_size, DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn prompt_carries_units_and_schema() {
        let paragraphs = vec![ContentParagraph {
            id: 1,
            book_title: "Cell Biology".to_string(),
            chapter_number: 1,
            chapter_title: "Cells".to_string(),
            paragraph_number: 1,
            content: "The **membrane** and the **nucleus**.".to_string(),
            objectives: None,
        }];
        let units = vec!["membrane".to_string(), "nucleus".to_string()];
        let prompt = build_prompt(UnitKind::MarkedTerms, &paragraphs, &units, 2);

        assert!(prompt.contains("Cell Biology"));
        assert!(prompt.contains("1. membrane"));
        assert!(prompt.contains("2. nucleus"));
        assert!(prompt.contains("## Response Format"));
        assert!(prompt.contains("```json"));
    }
}
