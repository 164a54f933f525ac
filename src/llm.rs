//! Answer generation over retrieved chunks.
//!
//! Builds a single-shot prompt from the retrieved context and the user's
//! question, invokes the configured chat-completion provider once (no
//! retry — failures propagate with the provider's detail so callers can
//! distinguish quota, credential, and rate-limit errors), and reports the
//! wall-clock latency of the call.
//!
//! Providers are a closed set of variants selected at startup:
//! OpenAI, Anthropic, DeepSeek (OpenAI-compatible), and Ollama.

use anyhow::{bail, Result};
use std::time::{Duration, Instant};

use crate::config::LlmConfig;
use crate::models::SearchHit;

const ANSWER_TEMPLATE: &str = "You are an expert assistant that answers questions based on \
technical documentation.

Relevant context:
{context}

Question: {question}

Instructions:
- Answer clearly and concisely
- Base your answer ONLY on the provided context
- If the information is not in the context, state that you do not have enough information
- Cite the sources when relevant

Answer:";

const SUMMARY_INSTRUCTION: &str =
    "Write a concise but informative summary of this document. Highlight the key points.";

/// A chat-completion backend, selected once at startup.
pub enum ChatProvider {
    OpenAi { api_key: String },
    Anthropic { api_key: String },
    DeepSeek { api_key: String },
    Ollama { base_url: String },
}

/// A generated answer with the provider round-trip latency.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub latency_ms: f64,
}

pub struct AnswerGenerator {
    provider: ChatProvider,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout: Duration,
}

impl AnswerGenerator {
    /// Build the configured generator.
    ///
    /// Hosted providers read their API key from the environment:
    /// `OPENAI_API_KEY`, `ANTHROPIC_API_KEY`, or `DEEPSEEK_API_KEY`.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let provider = match config.provider.as_str() {
            "openai" => ChatProvider::OpenAi {
                api_key: require_env("OPENAI_API_KEY")?,
            },
            "anthropic" => ChatProvider::Anthropic {
                api_key: require_env("ANTHROPIC_API_KEY")?,
            },
            "deepseek" => ChatProvider::DeepSeek {
                api_key: require_env("DEEPSEEK_API_KEY")?,
            },
            "ollama" => ChatProvider::Ollama {
                base_url: config.base_url.trim_end_matches('/').to_string(),
            },
            other => bail!("Unknown llm provider: {}", other),
        };

        Ok(Self {
            provider,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    /// Answer `question` from the retrieved chunks. Scores are ignored;
    /// chunk contents are concatenated with blank lines as the context.
    pub async fn generate_answer(&self, question: &str, hits: &[SearchHit]) -> Result<Answer> {
        let context = hits
            .iter()
            .map(|h| h.chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        self.complete_template(question, &context).await
    }

    /// Summarize raw document content (the summary instruction plays the
    /// role of the question, the content is the whole context).
    pub async fn summarize(&self, content: &str) -> Result<Answer> {
        self.complete_template(SUMMARY_INSTRUCTION, content).await
    }

    async fn complete_template(&self, question: &str, context: &str) -> Result<Answer> {
        let prompt = ANSWER_TEMPLATE
            .replace("{context}", context)
            .replace("{question}", question);

        let start = Instant::now();
        let text = self.complete(&prompt).await?;
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        tracing::info!(latency_ms, model = %self.model, "generated completion");
        Ok(Answer { text, latency_ms })
    }

    /// One chat-completion round trip with the configured provider.
    async fn complete(&self, prompt: &str) -> Result<String> {
        match &self.provider {
            ChatProvider::OpenAi { api_key } => {
                self.complete_openai_compatible("https://api.openai.com/v1", api_key, prompt)
                    .await
            }
            ChatProvider::DeepSeek { api_key } => {
                self.complete_openai_compatible("https://api.deepseek.com/v1", api_key, prompt)
                    .await
            }
            ChatProvider::Anthropic { api_key } => self.complete_anthropic(api_key, prompt).await,
            ChatProvider::Ollama { base_url } => self.complete_ollama(base_url, prompt).await,
        }
    }

    async fn complete_openai_compatible(
        &self,
        base_url: &str,
        api_key: &str,
        prompt: &str,
    ) -> Result<String> {
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let response = client
            .post(format!("{}/chat/completions", base_url))
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("chat API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        json.pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing message content"))
    }

    async fn complete_anthropic(&self, api_key: &str, prompt: &str) -> Result<String> {
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("chat API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        json.pointer("/content/0/text")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing content text"))
    }

    async fn complete_ollama(&self, base_url: &str, prompt: &str) -> Result<String> {
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "stream": false,
            "options": { "temperature": self.temperature },
        });

        let response = client
            .post(format!("{}/api/chat", base_url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("chat API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        json.pointer("/message/content")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing message content"))
    }
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| anyhow::anyhow!("{} environment variable not set", name))
}

/// Classify a provider failure message into a user-facing hint, when one
/// of the well-known failure modes is recognizable.
pub fn provider_error_hint(message: &str) -> Option<&'static str> {
    if message.contains("insufficient_quota") {
        Some("The AI provider account is out of quota. Check your billing and usage limits.")
    } else if message.contains("invalid_api_key") || message.contains("authentication_error") {
        Some("The AI provider API key is not valid. Check the service configuration.")
    } else if message.contains("rate_limit") {
        Some("The AI provider rate limit was exceeded. Wait a moment and try again.")
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_fills_context_and_question() {
        let prompt = ANSWER_TEMPLATE
            .replace("{context}", "chunk one\n\nchunk two")
            .replace("{question}", "what is this?");
        assert!(prompt.contains("chunk one\n\nchunk two"));
        assert!(prompt.contains("Question: what is this?"));
        assert!(!prompt.contains("{context}"));
        assert!(!prompt.contains("{question}"));
    }

    #[test]
    fn error_hints_recognize_known_failures() {
        assert!(provider_error_hint("429 insufficient_quota for org").is_some());
        assert!(provider_error_hint("401 invalid_api_key").is_some());
        assert!(provider_error_hint("rate_limit_exceeded").is_some());
        assert!(provider_error_hint("connection reset by peer").is_none());
    }
}
