//! Chat-completions client for the model extraction strategy.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{GstxError, ModelError};
use crate::models::config::{AuthScheme, ModelConfig};

/// One chat message.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(content: MessageContent) -> Self {
        Self {
            role: "user".to_string(),
            content,
        }
    }
}

/// Message body: plain text, or text and image parts.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Request body sent to the endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f64,
}

/// Raw HTTP outcome.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
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

/// Sends one request to the model endpoint.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn post(&self, request: &ChatRequest) -> Result<TransportResponse, ModelError>;
}

/// HTTP transport using reqwest.
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    api_key: String,
    auth: AuthScheme,
}

impl HttpTransport {
    pub fn new(config: &ModelConfig) -> Result<Self, GstxError> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| GstxError::Config("model endpoint not set".to_string()))?;
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| GstxError::Config("model API key not set".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ModelError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            auth: config.auth,
        })
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn post(&self, request: &ChatRequest) -> Result<TransportResponse, ModelError> {
        let builder = self.client.post(&self.endpoint).json(request);
        let builder = match self.auth {
            AuthScheme::ApiKey => builder.header("api-key", &self.api_key),
            AuthScheme::Bearer => builder.bearer_auth(&self.api_key),
        };

        let resp = builder
            .send()
            .await
            .map_err(|e| ModelError::Connection(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| ModelError::Connection(e.to_string()))?;

        Ok(TransportResponse { status, body })
    }
}

/// Model client with bounded rate-limit retry.
pub struct ModelClient {
    transport: Box<dyn ChatTransport>,
    model: Option<String>,
    max_tokens: u32,
    temperature: f64,
    max_retries: u32,
    backoff: Duration,
}

impl ModelClient {
    pub fn new(transport: Box<dyn ChatTransport>, config: &ModelConfig) -> Self {
        Self {
            transport,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            max_retries: config.max_retries,
            backoff: Duration::from_secs(config.backoff_secs),
        }
    }

    /// Client talking HTTP to the configured endpoint.
    pub fn from_config(config: &ModelConfig) -> Result<Self, GstxError> {
        Ok(Self::new(Box::new(HttpTransport::new(config)?), config))
    }

    /// Send the messages and return `choices[0].message.content`.
    ///
    /// A 429 waits for the backoff and retries, at most `max_retries` times.
    pub async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, ModelError> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let mut attempts = 0;
        loop {
            attempts += 1;
            let response = self.transport.post(&request).await?;

            match response.status {
                200..=299 => return parse_content(&response.body),
                429 if attempts <= self.max_retries => {
                    warn!(
                        "Rate limit exceeded. Retrying after {} seconds...",
                        self.backoff.as_secs()
                    );
                    tokio::time::sleep(self.backoff).await;
                }
                429 => return Err(ModelError::RateLimited { attempts }),
                status => {
                    error!("API call failed: {} - {}", status, response.body);
                    return Err(ModelError::Status {
                        status,
                        body: response.body,
                    });
                }
            }
        }
    }
}

fn parse_content(body: &str) -> Result<String, ModelError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| ModelError::Malformed(e.to_string()))?;

    let content = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ModelError::Malformed("response has no choices".to_string()))?
        .message
        .content
        .unwrap_or_default();

    if content.trim().is_empty() {
        return Err(ModelError::Malformed("response content is empty".to_string()));
    }

    debug!("Raw model response: {}", content);
    Ok(content)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays canned responses and counts requests.
    pub(crate) struct ScriptedTransport {
        responses: Mutex<VecDeque<TransportResponse>>,
        pub(crate) calls: Arc<AtomicUsize>,
        pub(crate) last_request: Arc<Mutex<Option<serde_json::Value>>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(responses: Vec<(u16, String)>) -> Self {
            Self {
                responses: Mutex::new(
                    responses
                        .into_iter()
                        .map(|(status, body)| TransportResponse { status, body })
                        .collect(),
                ),
                calls: Arc::new(AtomicUsize::new(0)),
                last_request: Arc::new(Mutex::new(None)),
            }
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn post(&self, request: &ChatRequest) -> Result<TransportResponse, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(serde_json::to_value(request).unwrap());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ModelError::Connection("no scripted response".to_string()))
        }
    }

    pub(crate) fn chat_body(content: &str) -> String {
        serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        })
        .to_string()
    }

    fn client(transport: ScriptedTransport) -> ModelClient {
        ModelClient::new(Box::new(transport), &ModelConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retries_once_after_backoff() {
        let transport = ScriptedTransport::new(vec![
            (429, "slow down".to_string()),
            (200, chat_body("{\"Invoice No.\": \"A-1\"}")),
        ]);
        let calls = transport.calls.clone();
        let client = client(transport);

        let start = tokio::time::Instant::now();
        let content = client.complete(vec![ChatMessage::system("hi")]).await.unwrap();

        assert_eq!(content, "{\"Invoice No.\": \"A-1\"}");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(start.elapsed() >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_gives_up_after_one_retry() {
        let transport = ScriptedTransport::new(vec![
            (429, String::new()),
            (429, String::new()),
            (200, chat_body("never reached")),
        ]);
        let calls = transport.calls.clone();
        let client = client(transport);

        let err = client.complete(vec![ChatMessage::system("hi")]).await.unwrap_err();
        assert!(matches!(err, ModelError::RateLimited { attempts: 2 }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_other_status_is_hard_failure() {
        let transport = ScriptedTransport::new(vec![(500, "boom".to_string())]);
        let calls = transport.calls.clone();
        let client = client(transport);

        let err = client.complete(vec![ChatMessage::system("hi")]).await.unwrap_err();
        assert_eq!(err.to_string(), "API call failed: 500 - boom");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_request_body_shape() {
        let transport = ScriptedTransport::new(vec![(200, chat_body("ok"))]);
        let last = transport.last_request.clone();
        let client = client(transport);

        let parts = MessageContent::Parts(vec![
            ContentPart::Text {
                text: "extract".to_string(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: "data:image/png;base64,AAAA".to_string(),
                },
            },
        ]);
        client.complete(vec![ChatMessage::user(parts)]).await.unwrap();

        let body = last.lock().unwrap().clone().unwrap();
        assert_eq!(body["max_tokens"], 1000);
        assert!(body.get("model").is_none());
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"][0]["type"], "text");
        assert_eq!(body["messages"][0]["content"][1]["type"], "image_url");
        assert_eq!(
            body["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/png;base64,AAAA"
        );
    }

    #[test]
    fn test_parse_content_errors() {
        assert!(matches!(parse_content("not json"), Err(ModelError::Malformed(_))));
        assert!(matches!(
            parse_content(r#"{"choices": []}"#),
            Err(ModelError::Malformed(_))
        ));
        assert!(matches!(
            parse_content(r#"{"choices": [{"message": {"content": null}}]}"#),
            Err(ModelError::Malformed(_))
        ));
    }
}
