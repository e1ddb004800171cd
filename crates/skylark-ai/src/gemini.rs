use std::env;
use std::sync::OnceLock;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{AiError, AiErrorCode};
use crate::types::{Context, Message, ModelClient, Segment, ToolDecl, now_millis};

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const API_KEY_ENVS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY"];

/// Non-streaming client for Gemini's `generateContent` endpoint.
pub struct GeminiClient {
    model: String,
    base_url: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(model: impl Into<String>, base_url: Option<String>, api_key: Option<String>) -> Self {
        Self {
            model: model.into(),
            base_url: base_url
                .filter(|url| !url.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        }
    }

    fn resolve_api_key(&self) -> Result<String, AiError> {
        if let Some(api_key) = &self.api_key {
            return Ok(api_key.clone());
        }
        for env_key in API_KEY_ENVS {
            if let Ok(value) = env::var(env_key) {
                if !value.trim().is_empty() {
                    return Ok(value);
                }
            }
        }
        Err(AiError::new(
            AiErrorCode::ProviderAuthMissing,
            format!(
                "Missing Gemini API key. Configure it or set {}.",
                API_KEY_ENVS.join(" / ")
            ),
        ))
    }

    fn endpoint(&self) -> String {
        let model = self.model.trim().trim_start_matches('/');
        let path = if model.starts_with("models/") {
            format!("{model}:generateContent")
        } else {
            format!("models/{model}:generateContent")
        };
        join_url(&self.base_url, &path)
    }
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn converse(&self, context: &Context) -> Result<Message, AiError> {
        let api_key = self.resolve_api_key()?;
        let payload = build_payload(context);
        let endpoint = self.endpoint();
        debug!(model = self.model.as_str(), "sending generateContent request");

        let response = shared_http_client()
            .post(endpoint.as_str())
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                AiError::new(
                    AiErrorCode::ProviderTransport,
                    format!("Gemini transport failed: {error}"),
                )
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_string());
            return Err(AiError::new(
                AiErrorCode::ProviderHttp,
                format!("Gemini HTTP {status}: {body}"),
            ));
        }

        let body = response.text().await.map_err(|error| {
            AiError::new(
                AiErrorCode::ProviderTransport,
                format!("Gemini response read failed: {error}"),
            )
        })?;
        let parsed: Value = serde_json::from_str(&body).map_err(|error| {
            AiError::new(
                AiErrorCode::ProviderProtocol,
                format!("Invalid Gemini response JSON: {error}"),
            )
            .with_details(json!({ "bodyPrefix": truncate_for_details(&body, 800) }))
        })?;

        let content = parse_candidate_segments(&parsed)?;
        Ok(Message::Model {
            content,
            timestamp: now_millis(),
        })
    }
}

fn build_payload(context: &Context) -> Value {
    let mut payload = json!({
        "contents": convert_messages(&context.messages),
    });

    if let Some(system_prompt) = &context.system_prompt {
        payload["systemInstruction"] = json!({
            "parts": [{
                "text": system_prompt,
            }],
        });
    }

    if let Some(tools) = &context.tools {
        if !tools.is_empty() {
            payload["tools"] = convert_tools(tools);
        }
    }

    payload
}

fn convert_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| match message {
            Message::User { text, .. } => json!({
                "role": "user",
                "parts": [{ "text": text }],
            }),
            Message::Model { content, .. } => json!({
                "role": "model",
                "parts": content.iter().map(convert_model_segment).collect::<Vec<_>>(),
            }),
            Message::ToolResult {
                tool_name, payload, ..
            } => json!({
                "role": "user",
                "parts": [{
                    "functionResponse": {
                        "name": tool_name,
                        "response": payload,
                    }
                }],
            }),
        })
        .collect()
}

fn convert_model_segment(segment: &Segment) -> Value {
    match segment {
        Segment::Text { text } => json!({ "text": text }),
        Segment::ToolCall { name, arguments } => json!({
            "functionCall": {
                "name": name,
                "args": arguments,
            }
        }),
        Segment::ToolResult { name, payload } => json!({
            "functionResponse": {
                "name": name,
                "response": payload,
            }
        }),
    }
}

fn convert_tools(tools: &[ToolDecl]) -> Value {
    json!([{
        "functionDeclarations": tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                })
            })
            .collect::<Vec<_>>()
    }])
}

fn parse_candidate_segments(payload: &Value) -> Result<Vec<Segment>, AiError> {
    let parts = payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            AiError::new(
                AiErrorCode::ProviderProtocol,
                "Gemini response did not contain candidate content parts.",
            )
        })?;

    let mut segments = Vec::new();
    for part in parts {
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            segments.push(Segment::Text {
                text: text.to_string(),
            });
        }
        if let Some(function_call) = part.get("functionCall").and_then(Value::as_object) {
            let name = function_call
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let arguments = function_call
                .get("args")
                .cloned()
                .unwrap_or_else(|| json!({}));
            segments.push(Segment::ToolCall { name, arguments });
        }
        if let Some(function_response) = part.get("functionResponse").and_then(Value::as_object) {
            let name = function_response
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let payload = function_response
                .get("response")
                .cloned()
                .unwrap_or_else(|| json!({}));
            segments.push(Segment::ToolResult { name, payload });
        }
    }

    if segments.is_empty() {
        return Err(AiError::new(
            AiErrorCode::ProviderProtocol,
            "Gemini candidate carried no usable parts.",
        ));
    }

    Ok(segments)
}

fn join_url(base_url: &str, path: &str) -> String {
    if base_url.ends_with('/') {
        format!("{base_url}{path}")
    } else {
        format!("{base_url}/{path}")
    }
}

fn shared_http_client() -> &'static Client {
    static CLIENT: OnceLock<Client> = OnceLock::new();
    CLIENT.get_or_init(Client::new)
}

fn truncate_for_details(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let prefix: String = text.chars().take(limit.saturating_sub(3)).collect();
    format!("{prefix}...")
}
