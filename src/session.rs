use crate::content::QuizScope;
use crate::error::{SessionError, StoreError};
use crate::progress::{percentage, CompletionRecord};
use crate::questions::{GeneratedQuestion, OPTION_COUNT};
use crate::store::{SessionStore, LAST_ACTIVE_QUIZ, LAST_COMPLETED_QUIZ};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

/// Where a quiz session is. One variant holds at any time; the index in
/// `Answering`/`Submitted` is always within the question list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "camelCase")]
pub enum QuizPhase {
    NoQuestions,
    Answering { index: usize },
    Submitted { index: usize },
    Complete,
}

/// Serialized session state, stored under the scope's `quizState_...` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub book_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paragraph_id: Option<i64>,
    pub questions: Vec<GeneratedQuestion>,
    pub phase: QuizPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_answer: Option<usize>,
    pub score: usize,
    pub saved_at: DateTime<Utc>,
}

/// Completed-quiz summary, stored under the scope's `quizResult_...` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSnapshot {
    pub book_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chapter_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paragraph_id: Option<i64>,
    pub score: usize,
    pub total_questions: usize,
    pub percentage: f64,
    pub completed_at: DateTime<Utc>,
}

/// One quiz run over a scope. Every mutation except pure answer selection is
/// persisted to the session store immediately, so a dropped process resumes
/// exactly where it left off.
#[derive(Debug)]
pub struct QuizSession<S: SessionStore> {
    store: S,
    scope: QuizScope,
    questions: Vec<GeneratedQuestion>,
    phase: QuizPhase,
    selected_answer: Option<usize>,
    score: usize,
}

impl<S: SessionStore> QuizSession<S> {
    pub fn new(store: S, scope: QuizScope) -> Self {
        Self {
            store,
            scope,
            questions: Vec::new(),
            phase: QuizPhase::NoQuestions,
            selected_answer: None,
            score: 0,
        }
    }

    /// Restore the saved session for `scope`, if one exists.
    pub fn resume(store: S, scope: &QuizScope) -> Result<Option<Self>, SessionError> {
        let Some(value) = store.load(&scope.state_key())? else {
            return Ok(None);
        };
        Self::from_saved(store, value)
    }

    /// Restore whatever session the `lastActiveQuiz` pointer names.
    pub fn resume_last(store: S) -> Result<Option<Self>, SessionError> {
        let Some(key) = store.pointer(LAST_ACTIVE_QUIZ)? else {
            return Ok(None);
        };
        let Some(value) = store.load(&key)? else {
            return Ok(None);
        };
        Self::from_saved(store, value)
    }

    fn from_saved(store: S, value: Value) -> Result<Option<Self>, SessionError> {
        let snapshot: SessionSnapshot = serde_json::from_value(value).map_err(StoreError::Serde)?;
        let scope = QuizScope {
            book_id: snapshot.book_id,
            chapter_id: snapshot.chapter_id,
            paragraph_id: snapshot.paragraph_id,
        };
        let session = Self {
            store,
            scope,
            questions: snapshot.questions,
            phase: snapshot.phase,
            selected_answer: snapshot.selected_answer,
            score: snapshot.score,
        };
        if !session.snapshot_consistent() {
            warn!(target: "studyjoy::session", scope = %session.scope, "discarding inconsistent saved session");
            session.store.clear(&session.scope.state_key())?;
            return Ok(None);
        }
        Ok(Some(session))
    }

    fn snapshot_consistent(&self) -> bool {
        if self.score > self.questions.len() {
            return false;
        }
        match self.phase {
            QuizPhase::NoQuestions | QuizPhase::Complete => true,
            QuizPhase::Answering { index } | QuizPhase::Submitted { index } => {
                index < self.questions.len()
            }
        }
    }

    /// Load freshly generated questions and move to the first question.
    pub fn install_questions(&mut self, questions: Vec<GeneratedQuestion>) -> Result<(), SessionError> {
        if questions.is_empty() {
            return Err(SessionError::NoQuestions);
        }
        self.questions = questions;
        self.phase = QuizPhase::Answering { index: 0 };
        self.selected_answer = None;
        self.score = 0;
        self.persist()
    }

    /// Pick an option for the current question. Not persisted; only legal
    /// before the answer is submitted.
    pub fn select_answer(&mut self, choice: usize) -> Result<(), SessionError> {
        match self.phase {
            QuizPhase::Answering { .. } => {
                if choice >= OPTION_COUNT {
                    return Err(SessionError::InvalidChoice { index: choice });
                }
                self.selected_answer = Some(choice);
                Ok(())
            }
            QuizPhase::Submitted { .. } => Err(SessionError::AlreadySubmitted),
            QuizPhase::Complete => Err(SessionError::QuizComplete),
            QuizPhase::NoQuestions => Err(SessionError::NoQuestions),
        }
    }

    /// Submit the selected answer. Returns whether it was correct. With no
    /// selection this is an error and the state is unchanged.
    pub fn submit_answer(&mut self) -> Result<bool, SessionError> {
        let index = match self.phase {
            QuizPhase::Answering { index } => index,
            QuizPhase::Submitted { .. } => return Err(SessionError::AlreadySubmitted),
            QuizPhase::Complete => return Err(SessionError::QuizComplete),
            QuizPhase::NoQuestions => return Err(SessionError::NoQuestions),
        };
        let selected = self.selected_answer.ok_or(SessionError::NoAnswerSelected)?;
        let question = self.questions.get(index).ok_or(SessionError::NoQuestions)?;

        let correct = question.correct_answer_index == selected;
        if correct {
            self.score += 1;
        }
        self.phase = QuizPhase::Submitted { index };
        self.persist()?;
        Ok(correct)
    }

    /// Advance past a submitted question, completing the quiz after the
    /// last one.
    pub fn next_question(&mut self) -> Result<&QuizPhase, SessionError> {
        let index = match self.phase {
            QuizPhase::Submitted { index } => index,
            QuizPhase::Answering { .. } => return Err(SessionError::NotSubmitted),
            QuizPhase::Complete => return Err(SessionError::QuizComplete),
            QuizPhase::NoQuestions => return Err(SessionError::NoQuestions),
        };

        self.selected_answer = None;
        if index + 1 < self.questions.len() {
            self.phase = QuizPhase::Answering { index: index + 1 };
            self.persist()?;
        } else {
            self.phase = QuizPhase::Complete;
            self.persist()?;
            self.persist_result()?;
            info!(
                target: "studyjoy::session",
                scope = %self.scope,
                score = self.score,
                total = self.questions.len(),
                "quiz complete"
            );
        }
        Ok(&self.phase)
    }

    /// Drop this session's saved state and return to `NoQuestions`. The
    /// caller re-triggers generation for the scope.
    pub fn restart(&mut self) -> Result<(), SessionError> {
        let key = self.scope.state_key();
        self.store.clear(&key)?;
        if self.store.pointer(LAST_ACTIVE_QUIZ)?.as_deref() == Some(key.as_str()) {
            self.store.clear(LAST_ACTIVE_QUIZ)?;
        }
        self.questions.clear();
        self.phase = QuizPhase::NoQuestions;
        self.selected_answer = None;
        self.score = 0;
        Ok(())
    }

    pub fn phase(&self) -> &QuizPhase {
        &self.phase
    }

    pub fn scope(&self) -> &QuizScope {
        &self.scope
    }

    pub fn questions(&self) -> &[GeneratedQuestion] {
        &self.questions
    }

    pub fn score(&self) -> usize {
        self.score
    }

    pub fn selected_answer(&self) -> Option<usize> {
        self.selected_answer
    }

    pub fn is_complete(&self) -> bool {
        self.phase == QuizPhase::Complete
    }

    pub fn current_question(&self) -> Option<&GeneratedQuestion> {
        match self.phase {
            QuizPhase::Answering { index } | QuizPhase::Submitted { index } => {
                self.questions.get(index)
            }
            _ => None,
        }
    }

    pub fn percentage(&self) -> f64 {
        percentage(self.score, self.questions.len())
    }

    /// The completion to persist for `user_id` once the quiz is complete.
    pub fn completion_record(&self, user_id: &str) -> Option<CompletionRecord> {
        if self.phase != QuizPhase::Complete {
            return None;
        }
        Some(CompletionRecord {
            user_id: user_id.to_string(),
            scope: self.scope.clone(),
            score: self.score,
            total_questions: self.questions.len(),
        })
    }

    fn persist(&self) -> Result<(), SessionError> {
        let snapshot = SessionSnapshot {
            book_id: self.scope.book_id.clone(),
            chapter_id: self.scope.chapter_id,
            paragraph_id: self.scope.paragraph_id,
            questions: self.questions.clone(),
            phase: self.phase.clone(),
            selected_answer: self.selected_answer,
            score: self.score,
            saved_at: Utc::now(),
        };
        let value = serde_json::to_value(&snapshot).map_err(StoreError::Serde)?;
        let key = self.scope.state_key();
        self.store.save(&key, &value)?;
        self.store.set_pointer(LAST_ACTIVE_QUIZ, &key)?;
        Ok(())
    }

    fn persist_result(&self) -> Result<(), SessionError> {
        let result = ResultSnapshot {
            book_id: self.scope.book_id.clone(),
            chapter_id: self.scope.chapter_id,
            paragraph_id: self.scope.paragraph_id,
            score: self.score,
            total_questions: self.questions.len(),
            percentage: self.percentage(),
            completed_at: Utc::now(),
        };
        let value = serde_json::to_value(&result).map_err(StoreError::Serde)?;
        let key = self.scope.result_key();
        self.store.save(&key, &value)?;
        self.store.set_pointer(LAST_COMPLETED_QUIZ, &key)?;
        Ok(())
    }
}
