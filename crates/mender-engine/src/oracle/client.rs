use super::parse::sanitize_api_response;
use anyhow::{anyhow, Result};
use mender_core::util::truncate;
use mender_core::{Oracle, OracleReply, OracleRequest, TokenUsage};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub(crate) const MAX_RETRIES: u32 = 3;
pub(crate) const INITIAL_BACKOFF_MS: u64 = 2000;
pub(crate) const BACKOFF_MULTIPLIER: u64 = 2;

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Deserialize)]
struct MessageContent {
    #[serde(default)]
    content: Option<String>,
    /// Set when content moderation blocked the reply
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Deserialize, Clone, Debug, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Deserialize)]
struct OpenRouterError {
    error: OpenRouterApiError,
}

#[derive(Deserialize)]
struct OpenRouterApiError {
    message: String,
    #[serde(default)]
    code: Option<i32>,
}

/// Look for "retry after N" style hints in an error body.
fn parse_retry_after(text: &str) -> Option<u64> {
    let lower = text.to_lowercase();
    let pos = lower.find("retry")?;
    lower[pos..]
        .split_whitespace()
        .skip(1)
        .take(5)
        .filter_map(|word| {
            word.trim_matches(|c: char| !c.is_ascii_digit())
                .parse::<u64>()
                .ok()
        })
        .find(|secs| *secs > 0 && *secs < 300)
}

pub(crate) fn backoff_secs(retry_count: u32) -> u64 {
    let factor = BACKOFF_MULTIPLIER.pow(retry_count.saturating_sub(1));
    let secs = INITIAL_BACKOFF_MS.saturating_mul(factor) / 1000;
    secs.max(1)
}

fn is_retryable_network_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn map_timeout_error(err: reqwest::Error) -> anyhow::Error {
    if err.is_timeout() {
        anyhow!("Oracle request timed out")
    } else if err.is_connect() {
        anyhow!("Could not connect to the oracle endpoint")
    } else {
        err.into()
    }
}

fn create_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))
}

/// OpenRouter-compatible chat completions endpoint.
pub struct OpenRouterOracle {
    client: reqwest::Client,
    url: String,
    api_key: String,
    user: Option<String>,
}

impl OpenRouterOracle {
    pub fn new(url: &str, api_key: &str, user: Option<String>, timeout: Duration) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(anyhow!(
                "No oracle API key configured. Set OPENROUTER_API_KEY or add it to the user config."
            ));
        }
        Ok(Self {
            client: create_http_client(timeout)?,
            url: url.to_string(),
            api_key: api_key.trim().to_string(),
            user,
        })
    }

    /// Send with bounded retry on rate limits, server errors, and dropped connections.
    async fn send_with_retry(&self, body: &ChatRequest) -> Result<String> {
        let mut retry_count = 0;
        loop {
            let response = match self
                .client
                .post(&self.url)
                .header("Content-Type", "application/json")
                .header("HTTP-Referer", env!("CARGO_PKG_REPOSITORY"))
                .header("X-Title", "Mender")
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(body)
                .send()
                .await
            {
                Ok(response) => response,
                Err(err) => {
                    if is_retryable_network_error(&err) && retry_count < MAX_RETRIES {
                        retry_count += 1;
                        tracing::debug!(retry_count, error = %err, "oracle network error, retrying");
                        tokio::time::sleep(Duration::from_secs(backoff_secs(retry_count))).await;
                        continue;
                    }
                    return Err(map_timeout_error(err));
                }
            };

            let status = response.status();
            let text = match response.text().await {
                Ok(text) => text,
                Err(err) => {
                    if is_retryable_network_error(&err) && retry_count < MAX_RETRIES {
                        retry_count += 1;
                        tokio::time::sleep(Duration::from_secs(backoff_secs(retry_count))).await;
                        continue;
                    }
                    return Err(map_timeout_error(err));
                }
            };

            if status.is_success() {
                // Upstream provider failures can arrive with a 200 status.
                if let Ok(err_resp) = serde_json::from_str::<OpenRouterError>(&text) {
                    let retryable = err_resp
                        .error
                        .code
                        .map(|c| c >= 500 || c == 429)
                        .unwrap_or(true);
                    if retryable && retry_count < MAX_RETRIES {
                        retry_count += 1;
                        tokio::time::sleep(Duration::from_secs(backoff_secs(retry_count))).await;
                        continue;
                    }
                    return Err(anyhow!(
                        "OpenRouter error: {}",
                        truncate(&err_resp.error.message, 200)
                    ));
                }
                return Ok(text);
            }

            if status.as_u16() == 429 && retry_count < MAX_RETRIES {
                retry_count += 1;
                let wait = parse_retry_after(&text).unwrap_or_else(|| backoff_secs(retry_count));
                tracing::debug!(retry_count, wait, "oracle rate limited");
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
            }

            if status.is_server_error() && retry_count < MAX_RETRIES {
                retry_count += 1;
                tokio::time::sleep(Duration::from_secs(backoff_secs(retry_count))).await;
                continue;
            }

            let message = match status.as_u16() {
                401 => "Invalid oracle API key".to_string(),
                429 => format!("Rate limited by the oracle after {} retries", retry_count),
                500..=599 => format!("Oracle server error ({})", status),
                _ => format!("API error {}: {}", status, sanitize_api_response(&text)),
            };
            return Err(anyhow!("{}", message));
        }
    }

    async fn complete_inner(&self, request: OracleRequest) -> Result<OracleReply> {
        let body = ChatRequest {
            model: request.model,
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: request.system,
                },
                Message {
                    role: "user".to_string(),
                    content: request.user,
                },
            ],
            user: self.user.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            stream: false,
        };

        let text = self.send_with_retry(&body).await?;
        let parsed: ChatResponse = serde_json::from_str(&text).map_err(|e| {
            anyhow!(
                "Failed to parse oracle response: {}\n{}",
                e,
                sanitize_api_response(&text)
            )
        })?;

        let choice = parsed.choices.first();
        if let Some(refusal) = choice.and_then(|c| c.message.refusal.as_deref()) {
            return Err(anyhow!("Request was refused: {}", truncate(refusal, 200)));
        }
        let content = choice
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(anyhow!("Oracle returned an empty response"));
        }

        Ok(OracleReply {
            content,
            usage: parsed.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }
}

impl Oracle for OpenRouterOracle {
    fn complete<'a>(
        &'a self,
        request: OracleRequest,
    ) -> Pin<Box<dyn Future<Output = Result<OracleReply>> + Send + 'a>> {
        Box::pin(self.complete_inner(request))
    }
}
