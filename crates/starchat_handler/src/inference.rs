//! Text-generation client
//!
//! Generic interface over the remote inference endpoint. The endpoint takes
//! `{ "inputs": <text> }` and answers `[{ "generated_text": <text> }]`,
//! where the generated text echoes the inputs followed by the continuation.
//! One call returns one blob; there is no incremental streaming.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use starchat_common::{AccessToken, InferenceConfig, RetrievalError};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    inputs: &'a str,
}

#[derive(Debug, Deserialize)]
struct Generation {
    generated_text: String,
}

/// One round-trip to a text-generation backend
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Submit `inputs` and return the full generated text
    async fn generate(&self, inputs: &str, token: &AccessToken) -> Result<String, RetrievalError>;
}

// ============================================================================
// HTTP client (Production)
// ============================================================================

/// Hugging Face inference API client
pub struct HuggingFaceClient {
    http_client: reqwest::Client,
    endpoint: String,
    timeout_secs: u64,
}

impl HuggingFaceClient {
    pub fn new(config: &InferenceConfig) -> Result<Self, RetrievalError> {
        let timeout = config.request_timeout();
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RetrievalError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint.clone(),
            timeout_secs: timeout.as_secs(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TextGenerator for HuggingFaceClient {
    async fn generate(&self, inputs: &str, token: &AccessToken) -> Result<String, RetrievalError> {
        debug!("POST {} ({} chars of input)", self.endpoint, inputs.len());

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(token.as_str())
            .json(&GenerateRequest { inputs })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RetrievalError::Timeout(self.timeout_secs)
                } else {
                    RetrievalError::Network(format!("Request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Inference endpoint returned {}: {}", status, body);
            return Err(RetrievalError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| RetrievalError::Network(format!("Failed to read response: {}", e)))?;

        let generations: Vec<Generation> = serde_json::from_str(&body)
            .map_err(|e| RetrievalError::MalformedResponse(format!("{}: {}", e, body)))?;

        generations
            .into_iter()
            .next()
            .map(|g| g.generated_text)
            .ok_or(RetrievalError::EmptyResponse)
    }
}

// ============================================================================
// Fake generator (Testing)
// ============================================================================

enum FakeScript {
    /// Return these generated texts in order, repeating the last one
    Fixed(Vec<Result<String, RetrievalError>>),
    /// Echo the inputs and append the next chunk, repeating the last one
    Continuing(Vec<String>),
}

/// Scripted generator that records every submission
pub struct FakeTextGenerator {
    script: Mutex<FakeScript>,
    inputs: Mutex<Vec<String>>,
}

impl FakeTextGenerator {
    pub fn new(responses: Vec<Result<String, RetrievalError>>) -> Self {
        Self::with_script(FakeScript::Fixed(responses))
    }

    /// Behaves like the real endpoint: every reply is the submitted text
    /// plus the next chunk
    pub fn continuing<S: Into<String>>(chunks: Vec<S>) -> Self {
        Self::with_script(FakeScript::Continuing(
            chunks.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn always_error(error: RetrievalError) -> Self {
        Self::new(vec![Err(error)])
    }

    fn with_script(script: FakeScript) -> Self {
        Self {
            script: Mutex::new(script),
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        lock(&self.inputs).len()
    }

    /// Every `inputs` value submitted so far
    pub fn inputs(&self) -> Vec<String> {
        lock(&self.inputs).clone()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

#[async_trait]
impl TextGenerator for FakeTextGenerator {
    async fn generate(&self, inputs: &str, _token: &AccessToken) -> Result<String, RetrievalError> {
        lock(&self.inputs).push(inputs.to_string());

        let mut script = lock(&self.script);
        match &mut *script {
            FakeScript::Fixed(responses) => match responses.len() {
                0 => Err(RetrievalError::EmptyResponse),
                1 => responses[0].clone(),
                _ => responses.remove(0),
            },
            FakeScript::Continuing(chunks) => {
                let chunk = match chunks.len() {
                    0 => String::new(),
                    1 => chunks[0].clone(),
                    _ => chunks.remove(0),
                };
                Ok(format!("{}{}", inputs, chunk))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> AccessToken {
        AccessToken::new("hf_test")
    }

    #[tokio::test]
    async fn test_fake_fixed_repeats_last() {
        let fake = FakeTextGenerator::new(vec![
            Ok("one".to_string()),
            Ok("two".to_string()),
        ]);

        assert_eq!(fake.generate("a", &token()).await.unwrap(), "one");
        assert_eq!(fake.generate("b", &token()).await.unwrap(), "two");
        assert_eq!(fake.generate("c", &token()).await.unwrap(), "two");
        assert_eq!(fake.call_count(), 3);
        assert_eq!(fake.inputs(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_fake_continuing_echoes_inputs() {
        let fake = FakeTextGenerator::continuing(vec!["Hel", "lo"]);

        assert_eq!(fake.generate("Q:", &token()).await.unwrap(), "Q:Hel");
        assert_eq!(fake.generate("Q:Hel", &token()).await.unwrap(), "Q:Hello");
        assert_eq!(fake.generate("Q:Hello", &token()).await.unwrap(), "Q:Hellolo");
    }

    #[tokio::test]
    async fn test_fake_always_error() {
        let fake = FakeTextGenerator::always_error(RetrievalError::Timeout(30));
        assert_eq!(
            fake.generate("x", &token()).await,
            Err(RetrievalError::Timeout(30))
        );
    }

    #[test]
    fn test_client_uses_configured_endpoint() {
        let config = InferenceConfig {
            endpoint: "http://127.0.0.1:1/generate".to_string(),
            ..InferenceConfig::default()
        };
        let client = HuggingFaceClient::new(&config).unwrap();
        assert_eq!(client.endpoint(), "http://127.0.0.1:1/generate");
        assert_eq!(client.timeout_secs, 30);
    }
}
