use crate::batching::BatchProgress;
use crate::clients::LowLevelClient;
use crate::content::QuizScope;
use crate::generator::{BatchMetadata, GenerateRequest, QuestionGenerator};
use crate::questions::{GeneratedQuestion, UnitKind};
use async_stream::stream;
use chrono::Utc;
use futures_core::Stream;
use futures_util::{pin_mut, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

/// Orchestration state. Exactly one of these holds at any time; there are
/// no independent boolean flags to fall out of sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationState {
    Idle,
    Generating,
    Errored,
}

/// Parameters of one full generation run over a scope.
#[derive(Debug, Clone)]
pub struct GenerationRun {
    pub scope: QuizScope,
    pub unit_kind: UnitKind,
    pub batch_size: usize,
    pub questions_per_unit: usize,
}

impl GenerationRun {
    fn request(&self, batch_index: usize) -> GenerateRequest {
        GenerateRequest {
            book_id: self.scope.book_id.clone(),
            chapter_id: self.scope.chapter_id,
            paragraph_id: self.scope.paragraph_id,
            batch_index,
            batch_size: self.batch_size,
            questions_per_unit: self.questions_per_unit,
        }
    }
}

/// Events yielded by the incremental variant. `Completed` or `Failed` is
/// always the final event of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GenerationEvent {
    /// Progress after each batch resolves, before its questions are surfaced.
    Progress { progress: BatchProgress },
    BatchCompleted { questions: Vec<GeneratedQuestion>, metadata: BatchMetadata },
    Completed { total_questions: usize },
    Failed { error: String },
}

/// Result of a deferred run. A failed run keeps everything accumulated
/// before the failing batch, with the error text alongside.
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub questions: Vec<GeneratedQuestion>,
    pub completed_batches: usize,
    pub error: Option<String>,
}

impl GenerationOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Drives sequential batch calls against a [`QuestionGenerator`] until the
/// last batch or a failure. Batch N+1 is requested only after batch N
/// resolves; re-invoking restarts from batch 0 and discards prior
/// accumulation.
pub struct BatchOrchestrator<C: LowLevelClient> {
    generator: QuestionGenerator<C>,
    state: GenerationState,
    questions: Vec<GeneratedQuestion>,
}

impl<C: LowLevelClient> BatchOrchestrator<C> {
    pub fn new(generator: QuestionGenerator<C>) -> Self {
        Self { generator, state: GenerationState::Idle, questions: Vec::new() }
    }

    pub fn state(&self) -> &GenerationState {
        &self.state
    }

    /// Questions accumulated by the most recent run.
    pub fn questions(&self) -> &[GeneratedQuestion] {
        &self.questions
    }

    pub fn generator(&self) -> &QuestionGenerator<C> {
        &self.generator
    }

    /// Incremental variant: yields an event per batch so questions become
    /// visible as they arrive.
    pub fn stream(&mut self, run: GenerationRun) -> impl Stream<Item = GenerationEvent> + '_ {
        stream! {
            self.state = GenerationState::Generating;
            self.questions.clear();
            let started_at = Utc::now();
            let mut batch_index = 0usize;

            loop {
                let request = run.request(batch_index);
                match self.generator.generate(&request, run.unit_kind).await {
                    Ok(response) => {
                        let progress = BatchProgress {
                            current_batch: response.metadata.current_batch,
                            total_batches: response.metadata.total_batches,
                            processed_units: response.metadata.processed_units,
                            total_units: response.metadata.total_units,
                            started_at,
                        };
                        yield GenerationEvent::Progress { progress };

                        self.questions.extend(response.questions.clone());
                        let is_last = response.metadata.is_last_batch;
                        yield GenerationEvent::BatchCompleted {
                            questions: response.questions,
                            metadata: response.metadata,
                        };

                        if is_last {
                            self.state = GenerationState::Idle;
                            info!(
                                target: "studyjoy::orchestrator",
                                batches = batch_index + 1,
                                questions = self.questions.len(),
                                "generation run complete"
                            );
                            yield GenerationEvent::Completed { total_questions: self.questions.len() };
                            break;
                        }
                        batch_index += 1;
                    }
                    Err(e) => {
                        self.state = GenerationState::Errored;
                        warn!(
                            target: "studyjoy::orchestrator",
                            batch = batch_index,
                            error = %e,
                            "generation run failed; keeping accumulated questions"
                        );
                        yield GenerationEvent::Failed { error: e.to_string() };
                        break;
                    }
                }
            }
        }
    }

    /// Deferred variant: resolves once with everything accumulated.
    #[instrument(target = "studyjoy::orchestrator", skip(self, run), fields(scope = %run.scope, kind = %run.unit_kind))]
    pub async fn run(&mut self, run: GenerationRun) -> GenerationOutcome {
        let mut completed_batches = 0usize;
        let mut error = None;

        {
            let events = self.stream(run);
            pin_mut!(events);
            while let Some(event) = events.next().await {
                match event {
                    GenerationEvent::BatchCompleted { .. } => completed_batches += 1,
                    GenerationEvent::Failed { error: e } => error = Some(e),
                    _ => {}
                }
            }
        }

        GenerationOutcome { questions: self.questions.clone(), completed_batches, error }
    }
}
