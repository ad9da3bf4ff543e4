pub mod batching;
pub mod clients;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod generator;
pub mod interceptors;
pub mod json_utils;
pub mod orchestrator;
pub mod parse;
pub mod progress;
pub mod questions;
pub mod session;
pub mod store;

// Convenient re-exports
pub use generator::{GenerateRequest, GenerateResponse, QuestionGenerator};
pub use json_utils::extract_all;
pub use orchestrator::{BatchOrchestrator, GenerationEvent, GenerationRun};
pub use questions::{GeneratedQuestion, UnitKind};
pub use session::QuizSession;
