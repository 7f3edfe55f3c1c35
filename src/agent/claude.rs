use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::agent::prompt::PromptContext;
use crate::agent::TextGenerator;
use crate::error::{AppError, Result};

const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

const SYSTEM_PROMPT: &str = "You are an editor who reviews open-source repository READMEs \
and suggests concrete, concise improvements. Answer with the requested text only.";

pub struct ClaudeClient {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
}

impl ClaudeClient {
    pub fn new(api_key: &str, model: &str, max_tokens: u32, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            max_tokens,
            timeout,
        }
    }

    pub async fn send_message(&self, request: &MessagesRequest) -> Result<MessagesResponse> {
        let response = self
            .client
            .post(CLAUDE_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status, &body));
        }

        let body = response
            .json::<MessagesResponse>()
            .await
            .map_err(|e| AppError::MalformedOutput(format!("Unreadable Claude response: {e}")))?;
        Ok(body)
    }
}

#[async_trait]
impl TextGenerator for ClaudeClient {
    async fn generate(&self, context: &PromptContext) -> Result<String> {
        let purpose = context.purpose;
        let request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: SYSTEM_PROMPT.to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: context.render(),
            }],
        };

        let response = self.send_message(&request).await?;

        tracing::info!(
            purpose = %purpose,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            stop_reason = ?response.stop_reason,
            "Claude response"
        );

        let text = extract_text(&response.content);
        if text.trim().is_empty() {
            return Err(AppError::MalformedOutput(format!(
                "Claude returned no text for {purpose}"
            )));
        }
        Ok(text)
    }
}

fn map_transport_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::Timeout(format!("Claude request timed out: {e}"))
    } else if e.is_connect() || e.is_request() {
        AppError::GenerationTransient(format!("Claude request failed: {e}"))
    } else {
        AppError::Http(e)
    }
}

fn map_status_error(status: StatusCode, body: &str) -> AppError {
    let message = format!("API returned {status}: {body}");
    match status.as_u16() {
        401 | 403 => AppError::GenerationAuth(message),
        402 => AppError::GenerationQuota(message),
        429 if body.contains("quota") || body.contains("credit") => {
            AppError::GenerationQuota(message)
        }
        429 => AppError::GenerationRateLimited(message),
        408 => AppError::Timeout(message),
        code if code >= 500 => AppError::GenerationTransient(message),
        _ => AppError::Generation(message),
    }
}

fn extract_text(content: &[ContentBlock]) -> String {
    content
        .iter()
        .filter_map(|block| {
            if let ContentBlock::Text { text } = block {
                Some(text.as_str())
            } else {
                None
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// --- Request types ---

#[derive(Debug, Serialize)]
pub struct MessagesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub system: String,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

// --- Response types ---

#[derive(Debug, Deserialize)]
pub struct MessagesResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}
