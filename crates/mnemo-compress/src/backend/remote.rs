//! Remote generative backend using OpenAI-compatible APIs
//!
//! Supports any OpenAI-compatible `/chat/completions` endpoint with
//! configurable URL, model, and API key via environment variable.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::backend::{BackendError, GenerativeBackend};
use crate::config::BackendConfig;

const MAX_RETRIES: u32 = 3;

/// Remote backend speaking the OpenAI chat completion protocol
#[derive(Debug)]
pub struct RemoteBackend {
    client: Client,
    config: BackendConfig,
    api_key: String,
    initial_backoff: Duration,
}

/// OpenAI-compatible chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

/// OpenAI-compatible chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl RemoteBackend {
    /// Create a new remote backend with the given configuration
    ///
    /// Reads the API key from the environment variable named in `config.api_key_env`.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        if config.api_url.trim().is_empty() {
            return Err(BackendError::Config("api_url is empty".to_string()));
        }

        let api_key = env::var(&config.api_key_env).map_err(|_| {
            BackendError::Config(format!("API key env var '{}' not set", config.api_key_env))
        })?;

        let client = Client::builder()
            .build()
            .map_err(|e| BackendError::Api(e.to_string()))?;

        info!(
            "RemoteBackend initialized with model: {}, api_url: {}",
            config.model, config.api_url
        );

        Ok(Self {
            client,
            config: config.clone(),
            api_key,
            initial_backoff: Duration::from_secs(1),
        })
    }

    /// Override the first rate-limit backoff delay (doubles on each retry)
    pub fn with_initial_backoff(mut self, delay: Duration) -> Self {
        self.initial_backoff = delay;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.api_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl GenerativeBackend for RemoteBackend {
    /// Call the remote API, backing off exponentially on 429 responses
    async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, BackendError> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: "You compress agent memory logs into faithful summaries.".to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: 0.2,
            max_tokens: self.config.max_tokens,
        };

        let url = self.endpoint();
        debug!("Calling remote API at: {}", url);

        let mut last_error = None;
        let mut delay = self.initial_backoff;

        for attempt in 0..MAX_RETRIES {
            let sent = self
                .client
                .post(&url)
                .timeout(timeout)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&request)
                .send()
                .await;

            match sent {
                Ok(response) => {
                    let status = response.status();

                    if status == 429 {
                        warn!(
                            "Rate limited on attempt {}/{}, waiting {:?}",
                            attempt + 1,
                            MAX_RETRIES,
                            delay
                        );
                        last_error = Some(BackendError::Api("rate limited".to_string()));
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                        continue;
                    }

                    if !status.is_success() {
                        let error_text = response
                            .text()
                            .await
                            .unwrap_or_else(|_| "Unknown error".to_string());
                        return Err(BackendError::Api(format!(
                            "API returned {status}: {error_text}"
                        )));
                    }

                    let completion: ChatCompletionResponse = response
                        .json()
                        .await
                        .map_err(|e| BackendError::Parse(e.to_string()))?;

                    let content = completion
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.message.content)
                        .ok_or(BackendError::EmptyResponse)?;

                    if content.trim().is_empty() {
                        return Err(BackendError::EmptyResponse);
                    }
                    return Ok(content);
                }
                Err(e) if e.is_timeout() => return Err(BackendError::Timeout),
                Err(e) => {
                    let err_msg = e.to_string();
                    if attempt < MAX_RETRIES - 1 {
                        warn!(
                            "Request failed on attempt {}/{}, retrying: {}",
                            attempt + 1,
                            MAX_RETRIES,
                            err_msg
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                    last_error = Some(BackendError::Api(err_msg));
                }
            }
        }

        Err(BackendError::Api(format!(
            "Failed after {} retries: {}",
            MAX_RETRIES,
            last_error.map_or_else(|| "Unknown error".to_string(), |e| e.to_string())
        )))
    }

    fn name(&self) -> &'static str {
        "remote"
    }
}
