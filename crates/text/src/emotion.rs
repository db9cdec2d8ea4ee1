//! Thin collaborator wrapping an `LLMClient` to classify the emotional tone
//! of a message. Never propagates an error — degrades to `"neutral"`.

use std::time::Duration;

use sa_domain::collaborators::{GenerateOptions, LLMClient};

const VALID_LABELS: &[&str] = &["positive", "negative", "neutral", "mixed"];

const PROMPT_TEMPLATE: &str = "Classify the emotional tone of the following message into exactly ONE word: \
positive, negative, neutral, or mixed.\nRespond with ONLY that single word, nothing else.\n\nMessage: ";

pub struct EmotionClassifier;

impl EmotionClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify emotional tone. Returns `"neutral"` for empty/near-empty
    /// input and on any LLM failure or unrecognized label.
    pub async fn classify(&self, llm: &dyn LLMClient, text: &str) -> String {
        if text.trim().chars().count() < 2 {
            return "neutral".to_string();
        }

        let truncated: String = text.chars().take(500).collect();
        let prompt = format!("{PROMPT_TEMPLATE}{truncated}");
        let opts = GenerateOptions {
            temperature: 0.0,
            max_tokens: 4,
            timeout: Duration::from_secs(20),
        };

        match llm.generate(&prompt, opts).await {
            Ok(response) => {
                let label = response.trim().to_lowercase();
                if VALID_LABELS.contains(&label.as_str()) {
                    label
                } else {
                    tracing::warn!(raw = %label, "emotion classifier returned unrecognized label");
                    "neutral".to_string()
                }
            }
            Err(error) => {
                tracing::warn!(%error, "emotion classification failed");
                "neutral".to_string()
            }
        }
    }
}

impl Default for EmotionClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sa_domain::error::Result;

    struct StubLlm(Result<String>);

    #[async_trait]
    impl LLMClient for StubLlm {
        async fn generate(&self, _prompt: &str, _opts: GenerateOptions) -> Result<String> {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn empty_text_is_neutral_without_calling_llm() {
        let llm = StubLlm(Ok("positive".into()));
        let classifier = EmotionClassifier::new();
        assert_eq!(classifier.classify(&llm, "").await, "neutral");
    }

    #[tokio::test]
    async fn valid_label_passes_through() {
        let llm = StubLlm(Ok("mixed".into()));
        let classifier = EmotionClassifier::new();
        assert_eq!(classifier.classify(&llm, "I feel torn about this").await, "mixed");
    }

    #[tokio::test]
    async fn unrecognized_label_falls_back_to_neutral() {
        let llm = StubLlm(Ok("ecstatic".into()));
        let classifier = EmotionClassifier::new();
        assert_eq!(classifier.classify(&llm, "great news today").await, "neutral");
    }

    #[tokio::test]
    async fn llm_failure_falls_back_to_neutral() {
        use sa_domain::error::{ErrorKind, MemoryError};
        let llm = StubLlm(Err(MemoryError::new(ErrorKind::Timeout, "timed out")));
        let classifier = EmotionClassifier::new();
        assert_eq!(classifier.classify(&llm, "does this work").await, "neutral");
    }
}
