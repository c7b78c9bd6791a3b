use std::time::Duration;

use llm::builder::{LLMBackend, LLMBuilder};
use llm::chat::ChatMessage;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use raci_core::AiSettings;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("AI is not configured")]
    NotConfigured,
    #[error("unknown provider: {0}")]
    UnknownProvider(String),
    #[error("build LLM: {0}")]
    Build(String),
    #[error("chat: {0}")]
    Chat(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("endpoint returned status {0}")]
    Status(u16),
    #[error("empty response")]
    Empty,
    #[error("timed out after {0}s")]
    Timeout(u64),
}

fn map_backend(provider: &str) -> Result<LLMBackend, EngineError> {
    match provider {
        "openai" => Ok(LLMBackend::OpenAI),
        "anthropic" => Ok(LLMBackend::Anthropic),
        "google" => Ok(LLMBackend::Google),
        "ollama" => Ok(LLMBackend::Ollama),
        "groq" => Ok(LLMBackend::Groq),
        "mistral" => Ok(LLMBackend::Mistral),
        "deepseek" => Ok(LLMBackend::DeepSeek),
        other => Err(EngineError::UnknownProvider(other.to_string())),
    }
}

fn non_empty(text: String) -> Result<String, EngineError> {
    if text.trim().is_empty() {
        Err(EngineError::Empty)
    } else {
        Ok(text)
    }
}

/// POST `{"system": ..., "prompt": ...}` and return the response body.
async fn post_endpoint(endpoint: &str, system: &str, prompt: &str) -> Result<String, EngineError> {
    let client = reqwest::Client::new();
    let response = client
        .post(endpoint)
        .json(&json!({ "system": system, "prompt": prompt }))
        .send()
        .await?;
    let status = response.status();
    if !status.is_success() {
        return Err(EngineError::Status(status.as_u16()));
    }
    non_empty(response.text().await?)
}

async fn chat(settings: &AiSettings, system: &str, prompt: &str) -> Result<String, EngineError> {
    let backend = map_backend(&settings.provider)?;

    let mut builder = LLMBuilder::new()
        .backend(backend)
        .model(&settings.model)
        .system(system);

    if !settings.api_key.is_empty() {
        builder = builder.api_key(&settings.api_key);
    }

    let llm = builder.build().map_err(|e| EngineError::Build(e.to_string()))?;

    let messages = vec![ChatMessage::user().content(prompt).build()];

    let response = llm
        .chat(&messages)
        .await
        .map_err(|e| EngineError::Chat(e.to_string()))?;

    non_empty(response.text().unwrap_or_default())
}

/// One round trip to whichever backend the settings point at.
pub async fn generate(settings: &AiSettings, system: &str, prompt: &str) -> Result<String, EngineError> {
    if !raci_core::ai_configured(settings) {
        return Err(EngineError::NotConfigured);
    }
    match settings.endpoint.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
        Some(endpoint) => post_endpoint(endpoint, system, prompt).await,
        None => chat(settings, system, prompt).await,
    }
}

/// [`generate`] with a per-attempt timeout and up to `max_retries` retries.
pub async fn generate_with_retry(
    settings: &AiSettings,
    system: &str,
    prompt: &str,
) -> Result<String, EngineError> {
    if !raci_core::ai_configured(settings) {
        return Err(EngineError::NotConfigured);
    }
    let limit = Duration::from_secs(settings.timeout_secs.max(1));
    let attempts = settings.max_retries + 1;
    let mut last = EngineError::Empty;
    for attempt in 1..=attempts {
        debug!(attempt, attempts, "calling inference backend");
        let result = match tokio::time::timeout(limit, generate(settings, system, prompt)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::Timeout(limit.as_secs())),
        };
        match result {
            Ok(text) => return Ok(text),
            // Configuration problems won't fix themselves on retry.
            Err(e @ (EngineError::UnknownProvider(_) | EngineError::Build(_))) => return Err(e),
            Err(e) => {
                warn!(attempt, error = %e, "inference attempt failed");
                last = e;
            }
        }
    }
    Err(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_providers_map() {
        assert!(map_backend("ollama").is_ok());
        assert!(matches!(
            map_backend("nope"),
            Err(EngineError::UnknownProvider(p)) if p == "nope"
        ));
    }

    #[tokio::test]
    async fn unconfigured_settings_fail_fast() {
        let err = generate_with_retry(&AiSettings::default(), "s", "p")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotConfigured));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_an_error() {
        let settings = AiSettings {
            endpoint: Some("http://127.0.0.1:9/infer".into()),
            timeout_secs: 2,
            max_retries: 0,
            ..Default::default()
        };
        assert!(generate_with_retry(&settings, "s", "p").await.is_err());
    }
}
