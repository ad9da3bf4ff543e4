use async_trait::async_trait;
use std::fmt::Debug;

/// Observes every prompt/response exchange with the model. Failures are
/// logged and swallowed by callers; capture never fails a batch.
#[async_trait]
pub trait Interceptor: Send + Sync + Debug {
    async fn save(&self, label: &str, prompt: &str, response: &str) -> Result<(), Box<dyn std::error::Error>>;
}

pub mod file;
pub use file::FileInterceptor;
