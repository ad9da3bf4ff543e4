use crate::clients::openai::{OpenAIClient, OpenAIConfig};
use crate::clients::LowLevelClient;
use crate::error::AIError;
use async_trait::async_trait;
use std::env;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Client type for lazy initialization
#[derive(Debug, Clone)]
pub enum ClientType {
    OpenAI,
    Mock,
}

impl Into<Box<dyn LowLevelClient>> for ClientType {
    fn into(self) -> Box<dyn LowLevelClient> {
        match self {
            ClientType::OpenAI => Box::new(OpenAIClient::default()),
            ClientType::Mock => {
                // Note: This creates a mock without a controllable handle
                // Use FlexibleClient::mock() if you need to control the mock
                use super::mock::MockClient;
                let (mock_client, _handle) = MockClient::new();
                Box::new(mock_client)
            }
        }
    }
}

impl Default for ClientType {
    /// Get the default client type based on available API keys
    fn default() -> Self {
        if env::var("OPENAI_API_KEY").is_ok()
            || std::fs::read_to_string(".env").map_or(false, |content| content.contains("OPENAI_API_KEY"))
        {
            Self::OpenAI
        } else {
            Self::Mock
        }
    }
}

impl ClientType {
    /// Parse client type from string (case insensitive)
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "mock" => Ok(Self::Mock),
            _ => Err(format!("Unknown client type: '{}'. Supported: openai, mock", s)),
        }
    }
}

impl std::fmt::Display for ClientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientType::OpenAI => write!(f, "OpenAI"),
            ClientType::Mock => write!(f, "Mock"),
        }
    }
}

#[derive(Debug)]
/// Flexible client that wraps any LowLevelClient and provides factory functions
pub struct FlexibleClient {
    inner: Arc<Mutex<Box<dyn LowLevelClient>>>,
}

impl FlexibleClient {
    /// Create a new FlexibleClient with lazy initialization
    pub fn new_lazy(client_type: ClientType) -> Self {
        info!(client_type = %client_type, "Selecting client");
        Self {
            inner: Arc::new(Mutex::new(client_type.into())),
        }
    }

    /// Create a new FlexibleClient wrapping the given client
    pub fn new(client: Box<dyn LowLevelClient>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(client)),
        }
    }

    /// Create a FlexibleClient with an OpenAI client
    pub fn openai(config: OpenAIConfig) -> Self {
        Self::new(Box::new(OpenAIClient::new(config)))
    }

    /// Create a FlexibleClient with a mock and return the handle for configuration
    pub fn mock() -> (Self, Arc<super::mock::MockHandle>) {
        use super::mock::MockClient;
        let (mock_client, handle) = MockClient::new();
        let flexible = Self::new(Box::new(mock_client));
        (flexible, handle)
    }

    /// Create a FlexibleClient mock with predefined responses
    pub fn new_mock_with_responses(responses: Vec<super::mock::MockResponse>) -> (Self, Arc<super::mock::MockHandle>) {
        use super::mock::MockClient;
        let (mock_client, handle) = MockClient::with_responses(responses);
        let flexible = Self::new(Box::new(mock_client));
        (flexible, handle)
    }

    /// Convert into the inner boxed client
    pub fn into_inner(self) -> Result<Box<dyn LowLevelClient>, AIError> {
        let inner = self.inner.lock().unwrap().clone_box();
        Ok(inner)
    }
}

impl Clone for FlexibleClient {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

#[async_trait]
impl LowLevelClient for FlexibleClient {
    async fn ask_raw(&self, prompt: String) -> Result<String, AIError> {
        // Clone the client to avoid holding the mutex across await
        let client = {
            let inner = self.inner.lock().unwrap();
            inner.as_ref().clone_box()
        };

        client.ask_raw(prompt).await
    }

    fn clone_box(&self) -> Box<dyn LowLevelClient> {
        Box::new(self.clone())
    }
}
