use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::LlmError;
use crate::config::LlmConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// One chat-completions call: `{messages, temperature, max_tokens}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>, max_tokens: u32) -> Self {
        Self {
            messages,
            temperature: 0.0,
            max_tokens,
        }
    }
}

/// Chat-completions abstraction (allows mocking for tests).
/// Returns the content of the first choice.
pub trait ChatClient: Send + Sync {
    fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;
}

/// Blocking HTTP client for an OpenAI-compatible chat-completions endpoint.
pub struct ChatCompletionsClient {
    url: String,
    api_key: String,
    azure: bool,
    timeout_secs: u64,
    client: reqwest::blocking::Client,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionsClient {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::HttpClient(e.to_string()))?;

        Ok(Self {
            url: completions_url(config),
            api_key: config.api_key.clone(),
            azure: config.deployment.is_some(),
            timeout_secs: config.timeout_secs,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Azure deployments get the `/openai/deployments/...` path; anything else
/// is used verbatim.
fn completions_url(config: &LlmConfig) -> String {
    match &config.deployment {
        Some(deployment) => format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            config.endpoint.trim_end_matches('/'),
            deployment,
            config.api_version
        ),
        None => config.endpoint.clone(),
    }
}

impl ChatClient for ChatCompletionsClient {
    fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        let builder = self.client.post(&self.url).json(request);
        let builder = if self.azure {
            builder.header("api-key", &self.api_key)
        } else {
            builder.bearer_auth(&self.api_key)
        };

        let response = builder.send().map_err(|e| {
            if e.is_connect() {
                LlmError::Connection(self.url.clone())
            } else if e.is_timeout() {
                LlmError::Timeout(self.timeout_secs)
            } else {
                LlmError::HttpClient(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(LlmError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| LlmError::ResponseParsing(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(LlmError::EmptyResponse)
    }
}

/// Scripted chat client for tests. Replies are consumed in order; `None`
/// entries and an exhausted script produce an error.
pub struct MockChatClient {
    replies: Mutex<VecDeque<Option<String>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockChatClient {
    pub fn new(replies: Vec<&str>) -> Self {
        Self::scripted(replies.into_iter().map(|r| Some(r.to_string())).collect())
    }

    pub fn scripted(replies: Vec<Option<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ChatClient for MockChatClient {
    fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }
        let next = self
            .replies
            .lock()
            .map_err(|_| LlmError::HttpClient("mock poisoned".into()))?
            .pop_front()
            .flatten();
        next.ok_or_else(|| LlmError::Connection("mock".into()))
    }
}
