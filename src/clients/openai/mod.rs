pub mod models;

pub use models::*;

use crate::clients::LowLevelClient;
use crate::config::KeyFromEnv;
use crate::error::{AIError, OpenAIError};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct OpenAIConfig {
    pub api_key: String,
    pub model: OpenAIModel,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl KeyFromEnv for OpenAIConfig {
    const KEY_NAME: &'static str = "OPENAI_API_KEY";
}

impl Default for OpenAIConfig {
    fn default() -> Self {
        Self {
            api_key: Self::key_from_env().unwrap_or_default(),
            model: OpenAIModel::default(),
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

#[derive(Clone, Debug)]
pub struct OpenAIClient {
    config: OpenAIConfig,
    http: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(config: OpenAIConfig) -> Self {
        Self { config, http: reqwest::Client::new() }
    }

    pub fn with_model(model: OpenAIModel) -> Self {
        Self::new(OpenAIConfig { model, ..OpenAIConfig::default() })
    }

    fn messages_body(&self, prompt: String) -> serde_json::Value {
        serde_json::json!({
            "model": self.config.model.id(),
            "max_tokens": self.config.max_tokens,
            "temperature": self.config.temperature,
            "messages": [
                {"role": "user", "content": prompt}
            ]
        })
    }
}

impl Default for OpenAIClient {
    fn default() -> Self {
        Self::new(OpenAIConfig::default())
    }
}

#[async_trait]
impl LowLevelClient for OpenAIClient {
    #[instrument(skip(self, prompt), fields(model = %self.config.model.id()))]
    async fn ask_raw(&self, prompt: String) -> Result<String, AIError> {
        let body = self.messages_body(prompt);
        let resp = self.http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send().await
            .map_err(|e| AIError::OpenAI(OpenAIError::Http(e.to_string())))?;

        if resp.status() == 401 { return Err(AIError::OpenAI(OpenAIError::Authentication)); }
        if resp.status() == 429 { return Err(AIError::OpenAI(OpenAIError::RateLimit)); }
        if !resp.status().is_success() {
            let txt = resp.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AIError::OpenAI(OpenAIError::Api(txt)));
        }

        #[derive(Deserialize)]
        struct Choices { choices: Vec<Choice> }
        #[derive(Deserialize)]
        struct Choice { message: Msg }
        #[derive(Deserialize)]
        struct Msg { content: String }

        let parsed: Choices = resp.json().await
            .map_err(|e| AIError::OpenAI(OpenAIError::Http(e.to_string())))?;
        let content = parsed.choices.first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| AIError::OpenAI(OpenAIError::Api("No choices".into())))?;
        Ok(content)
    }

    fn clone_box(&self) -> Box<dyn LowLevelClient> { Box::new(self.clone()) }
}
