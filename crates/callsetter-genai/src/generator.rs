use crate::error::GenAiError;
use crate::message::{ChatMessage, CompletionOptions};
use async_trait::async_trait;
use std::time::Duration;

/// Timeout applied to every provider request.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// A chat-completion backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Short provider label for logs, e.g. `"openai"`.
    fn provider(&self) -> &'static str;

    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, GenAiError>;
}

pub(crate) fn http_client() -> Result<reqwest::Client, GenAiError> {
    Ok(reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

/// Maps a non-2xx response to [`GenAiError::Api`].
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GenAiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(GenAiError::Api {
        status: status.as_u16(),
        body,
    })
}

pub(crate) fn non_empty(text: Option<String>) -> Result<String, GenAiError> {
    text.map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or(GenAiError::EmptyResponse)
}

pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}
