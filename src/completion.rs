use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::ApiConfig;

/// Everything that can go wrong with one turn. The display text is what the
/// user sees in place of the reply.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Network(String),

    #[error("{message}")]
    Provider { status: u16, message: String },

    #[error("Unexpected response from the model: {0}")]
    MalformedResponse(String),

    #[error("No API key found. Set the {0} environment variable and restart.")]
    MissingApiKey(String),
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<RequestMessage<'a>>,
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

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// What gets sent for a turn: the fixed preamble and the latest user text.
/// Earlier turns are not included, so the model has no memory of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system_prompt: Option<String>,
    pub user_text: String,
}

impl CompletionRequest {
    fn messages(&self) -> Vec<RequestMessage<'_>> {
        let mut messages = Vec::with_capacity(2);
        if let Some(prompt) = self.system_prompt.as_deref() {
            messages.push(RequestMessage {
                role: "system",
                content: prompt,
            });
        }
        messages.push(RequestMessage {
            role: "user",
            content: &self.user_text,
        });
        messages
    }
}

#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
    api_key_env: String,
}

impl CompletionClient {
    pub fn from_config(api: &ApiConfig) -> Self {
        let api_key = api.api_key();
        if api_key.is_none() {
            tracing::warn!(var = %api.api_key_env, "no API key in environment, requests will fail");
        }
        CompletionClient {
            client: Client::new(),
            url: api.url.clone(),
            model: api.model.clone(),
            api_key,
            api_key_env: api.api_key_env.clone(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn complete(&self, request: &CompletionRequest) -> Result<String, ApiError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ApiError::MissingApiKey(self.api_key_env.clone()))?;

        let body = ChatRequest {
            model: &self.model,
            messages: request.messages(),
        };

        tracing::info!(model = %self.model, chars = request.user_text.len(), "sending completion request");

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let result = interpret_response(status.as_u16(), &text);
        match &result {
            Ok(reply) => tracing::info!(status = status.as_u16(), chars = reply.len(), "completion received"),
            Err(e) => tracing::warn!(status = status.as_u16(), "completion failed: {e}"),
        }
        result
    }
}

/// Turns a raw status and body into the reply text or a typed error.
pub fn interpret_response(status: u16, body: &str) -> Result<String, ApiError> {
    if !(200..300).contains(&status) {
        let message = serde_json::from_str::<ErrorEnvelope>(body)
            .map(|envelope| envelope.error.message)
            .unwrap_or_else(|_| format!("Request failed with status {status}"));
        return Err(ApiError::Provider { status, message });
    }

    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| ApiError::MalformedResponse(e.to_string()))?;

    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| ApiError::MalformedResponse("missing choices[0].message.content".to_string()))
}
