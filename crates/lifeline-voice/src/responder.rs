//! **Responder** — cloud text-generation behind an OpenAI-compatible chat
//! endpoint, with an explicit bounded retry policy.
//!
//! The credential is injected at construction; `from_env` exists only as a
//! convenience at the process edge. No credential means no `CloudResponder`
//! at all — the coordinator then runs in permanent-fallback mode, which is a
//! supported configuration, not an error.
//!
//! Generation failures are classified into [`GenerationError`] and are never
//! user-visible: the coordinator answers from the fallback table instead.

use crate::error::{ConfigError, GenerationError};
use crate::response::{GuidanceResponse, RequiredAction};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "meta-llama/llama-3.3-70b-instruct";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

const SYSTEM_PROMPT: &str = "You are an emergency first-aid voice assistant. \
    The user describes a medical emergency; answer with one short, calm, \
    actionable paragraph of first-aid guidance suitable for being read aloud. \
    If an emergency call is warranted, begin your reply with a single line \
    'CALL: <number>'. If a specific first-aid procedure page should be opened, \
    begin with a single line 'PROCEDURE: <id>'. No markdown, no lists.";

/// Generates one guidance answer per processing cycle.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GuidanceResponse, GenerationError>;
}

/// API credential for the cloud responder.
#[derive(Debug, Clone)]
pub struct ResponderCredential {
    api_key: String,
}

impl ResponderCredential {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into().trim().to_string(),
        }
    }

    /// Read `LIFELINE_API_KEY` (or `OPENROUTER_API_KEY`). `None` when unset
    /// or blank — a valid, expected configuration.
    pub fn from_env() -> Option<Self> {
        let raw = std::env::var("LIFELINE_API_KEY")
            .or_else(|_| std::env::var("OPENROUTER_API_KEY"))
            .ok()?;
        let key = raw.trim();
        if key.is_empty() {
            return None;
        }
        Some(Self::new(key))
    }

    /// Like [`Self::from_env`], for callers that require the cloud responder
    /// and want the absence reported as a configuration error.
    pub fn require_from_env() -> Result<Self, ConfigError> {
        Self::from_env().ok_or(ConfigError::MissingCredential)
    }
}

/// Bounded retry: `max_attempts` total tries with exponential backoff.
/// Only transient failures (network, timeout) are retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            base_delay: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Delay before retrying after the given 1-based attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(10);
        self.base_delay * 2_u32.pow(exponent)
    }
}

// OpenAI-compatible response shape.
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

/// Cloud responder over an OpenAI-compatible `chat/completions` endpoint.
pub struct CloudResponder {
    api_key: String,
    base_url: String,
    model: String,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl CloudResponder {
    pub fn new(credential: ResponderCredential) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            api_key: credential.api_key,
            base_url: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            retry: RetryPolicy::default(),
            client,
        }
    }

    /// Build from environment; `None` when no credential is configured.
    pub fn from_env() -> Option<Self> {
        ResponderCredential::from_env().map(Self::new)
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn request_once(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "temperature": 0.2,
            "max_tokens": 400,
        });

        let res = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout
                } else {
                    GenerationError::Network(e.to_string())
                }
            })?;

        let status = res.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(GenerationError::InvalidCredential);
        }
        if !status.is_success() {
            return Err(GenerationError::Network(format!(
                "responder API error {status}"
            )));
        }

        let parsed: ChatResponse = res
            .json()
            .await
            .map_err(|e| GenerationError::MalformedResponse(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(GenerationError::MalformedResponse(
                "empty completion".to_string(),
            ));
        }
        Ok(content)
    }
}

#[async_trait]
impl Responder for CloudResponder {
    async fn generate(&self, prompt: &str) -> Result<GuidanceResponse, GenerationError> {
        let mut attempt = 1;
        let content = loop {
            match self.request_once(prompt).await {
                Ok(content) => break content,
                Err(error) => {
                    let transient = matches!(
                        error,
                        GenerationError::Network(_) | GenerationError::Timeout
                    );
                    if !transient || attempt >= self.retry.max_attempts {
                        return Err(error);
                    }
                    warn!(%error, attempt, "responder attempt failed, retrying");
                    tokio::time::sleep(self.retry.delay_for(attempt)).await;
                    attempt += 1;
                }
            }
        };

        let (action, text) = parse_directive(&content);
        debug!(chars = text.len(), has_action = action.is_some(), "responder answered");
        let mut response = GuidanceResponse::new(text)
            .with_attribute("source", "cloud")
            .with_attribute("model", self.model.clone());
        if let Some(action) = action {
            response = response.with_action(action);
        }
        Ok(response)
    }
}

/// Strip a leading `CALL:`/`PROCEDURE:` directive line into a
/// [`RequiredAction`]. A malformed or empty directive is ignored and the full
/// text kept verbatim.
fn parse_directive(content: &str) -> (Option<RequiredAction>, String) {
    let trimmed = content.trim();
    let (first_line, rest) = match trimmed.split_once('\n') {
        Some((head, tail)) => (head.trim(), tail.trim()),
        None => (trimmed, ""),
    };

    let action = if let Some(number) = first_line.strip_prefix("CALL:") {
        let number = number.trim();
        (!number.is_empty()).then(|| RequiredAction::CallEmergencyNumber(number.to_string()))
    } else if let Some(id) = first_line.strip_prefix("PROCEDURE:") {
        let id = id.trim();
        (!id.is_empty()).then(|| RequiredAction::OpenProcedure(id.to_string()))
    } else {
        None
    };

    match action {
        Some(action) if !rest.is_empty() => (Some(action), rest.to_string()),
        // Directive with no body: keep the reply as-is rather than speak nothing.
        Some(_) | None => (None, trimmed.to_string()),
    }
}

/// Test responder: returns a fixed outcome after an optional delay.
#[derive(Debug, Clone)]
pub struct StaticResponder {
    reply: Result<GuidanceResponse, GenerationError>,
    delay: Duration,
}

impl StaticResponder {
    pub fn answering(response: GuidanceResponse) -> Self {
        Self {
            reply: Ok(response),
            delay: Duration::ZERO,
        }
    }

    pub fn failing(error: GenerationError) -> Self {
        Self {
            reply: Err(error),
            delay: Duration::ZERO,
        }
    }

    /// Delay every answer, e.g. to exercise the coordinator's processing
    /// ceiling.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Responder for StaticResponder {
    async fn generate(&self, _prompt: &str) -> Result<GuidanceResponse, GenerationError> {
        if self.delay > Duration::ZERO {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_doubles_per_attempt() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn directive_call_is_extracted() {
        let (action, text) =
            parse_directive("CALL: 911\nStart chest compressions at 100 to 120 per minute.");
        assert_eq!(
            action,
            Some(RequiredAction::CallEmergencyNumber("911".to_string()))
        );
        assert!(text.starts_with("Start chest compressions"));
    }

    #[test]
    fn directive_procedure_is_extracted() {
        let (action, text) = parse_directive("PROCEDURE: burns_basic\nCool the burn under water.");
        assert_eq!(
            action,
            Some(RequiredAction::OpenProcedure("burns_basic".to_string()))
        );
        assert_eq!(text, "Cool the burn under water.");
    }

    #[test]
    fn malformed_directive_is_kept_as_text() {
        let (action, text) = parse_directive("CALL:\nPress on the wound.");
        assert_eq!(action, None);
        assert_eq!(text, "CALL:\nPress on the wound.");

        let (action, text) = parse_directive("CALL: 911");
        assert_eq!(action, None);
        assert_eq!(text, "CALL: 911");
    }

    #[test]
    fn plain_reply_has_no_action() {
        let (action, text) = parse_directive("Keep the person warm and still.");
        assert_eq!(action, None);
        assert_eq!(text, "Keep the person warm and still.");
    }

    #[test]
    fn chat_response_decodes_openai_shape() {
        let raw = r#"{"choices":[{"message":{"role":"assistant","content":"Apply pressure."}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(raw).expect("decode");
        assert_eq!(parsed.choices[0].message.content, "Apply pressure.");
    }

    #[tokio::test]
    async fn static_responder_replays_its_outcome() {
        let ok = StaticResponder::answering(
            GuidanceResponse::new("stay calm").with_attribute("source", "cloud"),
        );
        let answer = ok.generate("anything").await.expect("answer");
        assert_eq!(answer.text, "stay calm");

        let failing = StaticResponder::failing(GenerationError::Timeout);
        assert_eq!(
            failing.generate("anything").await,
            Err(GenerationError::Timeout)
        );
    }

    #[test]
    fn credential_is_trimmed() {
        let credential = ResponderCredential::new("  sk-or-123  ");
        assert_eq!(credential.api_key, "sk-or-123");
    }
}
