//! Answer Retriever
//!
//! Polls a text-generation backend until the generated answer contains the
//! end-of-turn marker or the iteration budget runs out.
//!
//! The backend returns one blob per call, so the retriever resubmits the
//! formatted prompt plus the answer so far and keeps the part of the reply
//! that follows the formatted prompt. The returned text is everything
//! before the first end marker.
//!
//! Hitting the iteration cap without a marker is not an error: the answer
//! comes back marked `Completion::Truncated`.

use crate::inference::TextGenerator;
use starchat_common::{AccessToken, InferenceConfig, RetrievalError};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How the polling loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The end marker was generated
    Terminated,
    /// The iteration cap was reached first
    Truncated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedAnswer {
    pub text: String,
    pub completion: Completion,
    /// Generation calls made, the first one included
    pub remote_calls: usize,
}

impl RetrievedAnswer {
    pub fn is_complete(&self) -> bool {
        self.completion == Completion::Terminated
    }
}

#[derive(Debug, Clone)]
pub struct RetrieverSettings {
    pub end_marker: String,
    pub assistant_marker: String,
    /// Follow-up calls allowed after the first one
    pub max_iterations: u32,
    /// Deadline for the whole loop
    pub deadline: Duration,
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self::from(&InferenceConfig::default())
    }
}

impl From<&InferenceConfig> for RetrieverSettings {
    fn from(config: &InferenceConfig) -> Self {
        Self {
            end_marker: config.effective_end_marker().to_string(),
            assistant_marker: config.assistant_marker.clone(),
            max_iterations: config.effective_max_iterations(),
            deadline: config.retrieval_deadline(),
        }
    }
}

impl RetrieverSettings {
    /// Close the user turn and open the assistant turn
    pub fn format_prompt(&self, prompt: &str) -> String {
        format!("{}{}\n{}\n", prompt, self.end_marker, self.assistant_marker)
    }
}

pub struct AnswerRetriever {
    generator: Arc<dyn TextGenerator>,
    settings: RetrieverSettings,
}

impl AnswerRetriever {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self::with_settings(generator, RetrieverSettings::default())
    }

    pub fn with_settings(generator: Arc<dyn TextGenerator>, settings: RetrieverSettings) -> Self {
        Self { generator, settings }
    }

    pub fn settings(&self) -> &RetrieverSettings {
        &self.settings
    }

    /// Retrieve a complete (or truncated) answer for `prompt`
    #[tracing::instrument(skip(self, prompt, token), fields(prompt_len = prompt.len()))]
    pub async fn retrieve(
        &self,
        prompt: &str,
        token: &AccessToken,
    ) -> Result<RetrievedAnswer, RetrievalError> {
        let deadline = self.settings.deadline;
        match tokio::time::timeout(deadline, self.poll(prompt, token)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Answer retrieval gave up after {:?}", deadline);
                Err(RetrievalError::DeadlineExceeded(deadline))
            }
        }
    }

    async fn poll(&self, prompt: &str, token: &AccessToken) -> Result<RetrievedAnswer, RetrievalError> {
        let marker = self.settings.end_marker.as_str();
        let formatted = self.settings.format_prompt(prompt);

        let generated = self.generator.generate(&formatted, token).await?;
        let mut answer = continuation(&generated, &formatted).to_string();
        let mut iterations = 0u32;

        while !answer.contains(marker) && iterations < self.settings.max_iterations {
            let submitted = format!("{}{}", formatted, answer);
            debug!(
                "Generation call {} ({} chars so far)",
                iterations + 2,
                answer.len()
            );
            let generated = self.generator.generate(&submitted, token).await?;
            answer = continuation(&generated, &formatted).to_string();
            iterations += 1;
        }

        let remote_calls = iterations as usize + 1;
        let (text, completion) = match answer.find(marker) {
            Some(end) => {
                answer.truncate(end);
                (answer, Completion::Terminated)
            }
            None => {
                warn!(
                    "No end marker after {} generation calls, returning partial answer",
                    remote_calls
                );
                (answer, Completion::Truncated)
            }
        };

        info!(
            "Retrieved answer ({} chars) in {} generation calls",
            text.len(),
            remote_calls
        );

        Ok(RetrievedAnswer {
            text,
            completion,
            remote_calls,
        })
    }
}

/// Part of `generated` that follows the first `submitted.len()` characters
fn continuation<'a>(generated: &'a str, submitted: &str) -> &'a str {
    if let Some(rest) = generated.strip_prefix(submitted) {
        return rest;
    }
    let skip = submitted.chars().count();
    generated
        .char_indices()
        .nth(skip)
        .map(|(i, _)| &generated[i..])
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::FakeTextGenerator;
    use starchat_common::{ASSISTANT_MARKER, END_MARKER};

    fn token() -> AccessToken {
        AccessToken::new("hf_test")
    }

    #[test]
    fn test_format_prompt_appends_turn_markers() {
        let settings = RetrieverSettings::default();
        assert_eq!(
            settings.format_prompt("What is rice?"),
            format!("What is rice?{}\n{}\n", END_MARKER, ASSISTANT_MARKER)
        );
    }

    #[test]
    fn test_continuation_strips_echo() {
        assert_eq!(continuation("Q:abc", "Q:"), "abc");
        // Not an exact echo: fall back to skipping by length
        assert_eq!(continuation("q:abc", "Q:"), "abc");
        assert_eq!(continuation("Q", "Q:"), "");
        assert_eq!(continuation("résumé!", "résumé"), "!");
    }

    #[tokio::test]
    async fn test_marker_in_first_reply_single_call() {
        let fake = Arc::new(FakeTextGenerator::continuing(vec!["Rice is a grain.<|end|>\n"]));
        let retriever = AnswerRetriever::new(fake.clone());

        let answer = retriever.retrieve("What is rice?", &token()).await.unwrap();
        assert_eq!(answer.text, "Rice is a grain.");
        assert_eq!(answer.completion, Completion::Terminated);
        assert_eq!(answer.remote_calls, 1);
        assert_eq!(fake.call_count(), 1);
        assert_eq!(
            fake.inputs()[0],
            "What is rice?<|end|>\n<|assistant|>\n"
        );
    }

    #[tokio::test]
    async fn test_resubmits_growing_context() {
        let fake = Arc::new(FakeTextGenerator::continuing(vec![
            "Rice ",
            "is a ",
            "grain.<|end|>",
        ]));
        let retriever = AnswerRetriever::new(fake.clone());

        let answer = retriever.retrieve("What is rice?", &token()).await.unwrap();
        assert_eq!(answer.text, "Rice is a grain.");
        assert_eq!(answer.remote_calls, 3);

        let inputs = fake.inputs();
        let base = "What is rice?<|end|>\n<|assistant|>\n";
        assert_eq!(inputs[1], format!("{}Rice ", base));
        assert_eq!(inputs[2], format!("{}Rice is a ", base));
    }

    #[tokio::test]
    async fn test_iteration_cap_returns_truncated_answer() {
        let fake = Arc::new(FakeTextGenerator::continuing(vec!["x"]));
        let retriever = AnswerRetriever::new(fake.clone());

        let answer = retriever.retrieve("loop", &token()).await.unwrap();
        assert_eq!(answer.completion, Completion::Truncated);
        assert!(!answer.is_complete());
        assert_eq!(answer.remote_calls, 101);
        assert_eq!(fake.call_count(), 101);
        assert_eq!(answer.text, "x".repeat(101));
    }

    #[tokio::test]
    async fn test_blank_end_marker_config_uses_default() {
        let config = InferenceConfig {
            end_marker: String::new(),
            ..InferenceConfig::default()
        };
        let settings = RetrieverSettings::from(&config);
        assert_eq!(settings.end_marker, END_MARKER);

        let fake = Arc::new(FakeTextGenerator::continuing(vec!["Rice ", "is a grain.<|end|>"]));
        let retriever = AnswerRetriever::with_settings(fake.clone(), settings);

        let answer = retriever.retrieve("What is rice?", &token()).await.unwrap();
        assert_eq!(answer.text, "Rice is a grain.");
        assert_eq!(fake.call_count(), 2);
    }

    #[tokio::test]
    async fn test_marker_at_start_yields_empty_answer() {
        let fake = Arc::new(FakeTextGenerator::continuing(vec!["<|end|>trailing"]));
        let retriever = AnswerRetriever::new(fake);

        let answer = retriever.retrieve("?", &token()).await.unwrap();
        assert_eq!(answer.text, "");
        assert!(answer.is_complete());
    }

    #[tokio::test]
    async fn test_remote_error_propagates() {
        let fake = Arc::new(FakeTextGenerator::new(vec![
            Ok("q<|end|>\n<|assistant|>\npartial".to_string()),
            Err(RetrievalError::HttpStatus {
                status: 503,
                body: "loading".to_string(),
            }),
        ]));
        let retriever = AnswerRetriever::new(fake.clone());

        let err = retriever.retrieve("q", &token()).await.unwrap_err();
        assert!(matches!(err, RetrievalError::HttpStatus { status: 503, .. }));
        assert_eq!(fake.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_exceeded() {
        struct Stalled;

        #[async_trait::async_trait]
        impl TextGenerator for Stalled {
            async fn generate(&self, _: &str, _: &AccessToken) -> Result<String, RetrievalError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
        }

        let settings = RetrieverSettings {
            deadline: Duration::from_secs(5),
            ..RetrieverSettings::default()
        };
        let retriever = AnswerRetriever::with_settings(Arc::new(Stalled), settings);

        let err = retriever.retrieve("q", &token()).await.unwrap_err();
        assert_eq!(err, RetrievalError::DeadlineExceeded(Duration::from_secs(5)));
    }
}
