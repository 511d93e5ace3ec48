//! Chat-completions agent adapter.
//!
//! Sends the prompt to an OpenAI-compatible `/chat/completions` endpoint and
//! returns the first choice's message content. Transient failures (network
//! errors, 429, 5xx) are retried with exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{AgentAdapter, AgentError, DEFAULT_API_BASE};

/// Maximum number of attempts for transient failures.
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff in milliseconds.
const BASE_RETRY_DELAY_MS: u64 = 1000;

/// Per-request HTTP timeout. The harness timeout still bounds the whole run.
const REQUEST_TIMEOUT_SECS: u64 = 600;

/// Adapter for an OpenAI-compatible chat endpoint.
pub struct ChatAdapter {
    id: String,
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    system_prompt: Option<String>,
}

impl ChatAdapter {
    pub fn new(
        id: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AgentError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            id: id.into(),
            client,
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            model: model.into(),
            temperature: None,
            max_tokens: None,
            system_prompt: None,
        })
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    fn build_request(&self, prompt: &str) -> ApiRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system_prompt {
            messages.push(ApiMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ApiMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        ApiRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    async fn execute_with_retry(&self, request: &ApiRequest) -> Result<String, AgentError> {
        let url = self.endpoint();
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                let delay_ms = BASE_RETRY_DELAY_MS * (1 << (attempt - 1));
                debug!(agent = %self.id, attempt = attempt + 1, delay_ms, "Retrying chat request");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }

            match self.execute_request(&url, request).await {
                Ok(content) => return Ok(content),
                Err(err) if is_transient_error(&err) => {
                    warn!(
                        agent = %self.id,
                        attempt = attempt + 1,
                        max_retries = MAX_RETRIES,
                        error = %err,
                        "Transient error, will retry"
                    );
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error
            .unwrap_or_else(|| AgentError::Http("Max retries exceeded".to_string())))
    }

    async fn execute_request(&self, url: &str, request: &ApiRequest) -> Result<String, AgentError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| AgentError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(api_error(status, &body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AgentError::Http(e.to_string()))?;
        parse_content(&body)
    }
}

#[async_trait]
impl AgentAdapter for ChatAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&self, prompt: &str) -> Result<String, AgentError> {
        info!(agent = %self.id, model = %self.model, "Sending prompt to chat endpoint");
        let request = self.build_request(prompt);
        self.execute_with_retry(&request).await
    }
}

fn api_error(status: StatusCode, body: &str) -> AgentError {
    let message = serde_json::from_str::<ApiErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string());
    AgentError::Api {
        status: status.as_u16(),
        message,
    }
}

/// Extracts `choices[0].message.content` from a completion body.
fn parse_content(body: &str) -> Result<String, AgentError> {
    let response: ApiResponse = serde_json::from_str(body)
        .map_err(|e| AgentError::MalformedResponse(format!("Failed to parse API response: {}", e)))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| AgentError::MalformedResponse("Response contained no message content".to_string()))
}

fn is_transient_error(error: &AgentError) -> bool {
    match error {
        AgentError::Http(_) => true,
        AgentError::Api { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ApiChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}
