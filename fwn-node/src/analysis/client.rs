//! OpenAI-compatible completion client
//!
//! Works against a local Ollama endpoint or a hosted cloud endpoint; the
//! protocol is the same chat-completions shape either way. Every failure is
//! mapped into [`AnalysisError`] so callers can record it instead of
//! propagating it.

use base64::Engine as _;
use fwn_common::config::{AnalysisConfig, AnalysisMode};
use serde::{Deserialize, Serialize};
use std::future::Future;
use thiserror::Error;

const USER_AGENT: &str = concat!("fwn-node/", env!("CARGO_PKG_VERSION"));
const MAX_TOKENS: u32 = 200;

/// Analysis service errors
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("service error {0}: {1}")]
    Api(u16, String),

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("analysis service not configured: {0}")]
    NotConfigured(String),
}

/// External analysis service contract.
///
/// `complete` sends one prompt (optionally with a JPEG frame) and returns
/// the raw response text. Implementations must embed their own hard timeout.
pub trait AnalysisClient: Send + Sync + 'static {
    fn complete(
        &self,
        prompt: &str,
        image_jpeg: Option<Vec<u8>>,
    ) -> impl Future<Output = Result<String, AnalysisError>> + Send;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: MessageContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Chat-completions client for the analysis endpoint.
pub struct LlmClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    mode: AnalysisMode,
}

impl LlmClient {
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout())
            .build()
            .map_err(|e| AnalysisError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.resolved_base_url(),
            model: config.resolved_model(),
            api_key: config.resolved_api_key(),
            mode: config.mode,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_messages(prompt: &str, image_jpeg: Option<Vec<u8>>) -> Vec<ChatMessage> {
        let content = match image_jpeg {
            Some(bytes) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                MessageContent::Parts(vec![
                    ContentPart::Text {
                        text: prompt.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: format!("data:image/jpeg;base64,{encoded}"),
                        },
                    },
                ])
            }
            None => MessageContent::Text(prompt.to_string()),
        };
        vec![ChatMessage {
            role: "user",
            content,
        }]
    }
}

impl AnalysisClient for LlmClient {
    async fn complete(
        &self,
        prompt: &str,
        image_jpeg: Option<Vec<u8>>,
    ) -> Result<String, AnalysisError> {
        if self.mode == AnalysisMode::Cloud && self.api_key.is_empty() {
            return Err(AnalysisError::NotConfigured(
                "cloud mode requires an API key".to_string(),
            ));
        }

        let request = ChatRequest {
            model: &self.model,
            messages: Self::build_messages(prompt, image_jpeg),
            max_tokens: MAX_TOKENS,
        };

        tracing::debug!(model = %self.model, "Requesting external analysis");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalysisError::Timeout
                } else {
                    AnalysisError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::Api(status.as_u16(), body));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| AnalysisError::Parse(e.to_string()))?;

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AnalysisError::Parse("response carried no content".to_string()))
    }
}
