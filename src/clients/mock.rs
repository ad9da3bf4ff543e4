use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::{clients::LowLevelClient, error::AIError};

/// One scripted reply for the mock client.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Success(String),
    Error(String),
}

/// Shared handle driving a `MockClient`: queue replies, inspect the prompts
/// the code under test actually sent.
#[derive(Debug, Default)]
pub struct MockHandle {
    responses: Mutex<VecDeque<MockResponse>>,
    prompts: Mutex<Vec<String>>,
}

impl MockHandle {
    pub fn add_response(&self, response: MockResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn add_responses(&self, responses: Vec<MockResponse>) {
        let mut queue = self.responses.lock().unwrap();
        for r in responses {
            queue.push_back(r);
        }
    }

    pub fn pending(&self) -> usize {
        self.responses.lock().unwrap().len()
    }

    /// All prompts seen so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn record_and_pop(&self, prompt: String) -> Option<MockResponse> {
        self.prompts.lock().unwrap().push(prompt);
        self.responses.lock().unwrap().pop_front()
    }
}

/// Scripted mock client. Replies are consumed front-to-back; running out of
/// script is an error so tests fail loudly on unexpected extra calls.
#[derive(Debug, Clone)]
pub struct MockClient {
    handle: Arc<MockHandle>,
}

impl MockClient {
    pub fn new() -> (Self, Arc<MockHandle>) {
        let handle = Arc::new(MockHandle::default());
        (Self { handle: handle.clone() }, handle)
    }

    pub fn with_responses(responses: Vec<MockResponse>) -> (Self, Arc<MockHandle>) {
        let (client, handle) = Self::new();
        handle.add_responses(responses);
        (client, handle)
    }
}

#[async_trait]
impl LowLevelClient for MockClient {
    async fn ask_raw(&self, prompt: String) -> Result<String, AIError> {
        match self.handle.record_and_pop(prompt) {
            Some(MockResponse::Success(text)) => Ok(text),
            Some(MockResponse::Error(message)) => Err(AIError::Mock(message)),
            None => Err(AIError::Mock("no scripted response left".to_string())),
        }
    }

    fn clone_box(&self) -> Box<dyn LowLevelClient> {
        Box::new(self.clone())
    }
}

/// Mock client for testing that returns empty responses
#[derive(Debug, Clone, Default)]
pub struct MockVoid;

#[async_trait]
impl LowLevelClient for MockVoid {
    async fn ask_raw(&self, _prompt: String) -> Result<String, AIError> {
        Ok("{}".to_string())
    }

    fn clone_box(&self) -> Box<dyn LowLevelClient> {
        Box::new(self.clone())
    }
}
