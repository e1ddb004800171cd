use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AiError;

/// One element of a message's content. The kind is decided once at the model
/// boundary so downstream code matches on a closed set of variants instead of
/// probing response objects for fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Segment {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "toolCall")]
    ToolCall { name: String, arguments: Value },
    #[serde(rename = "toolResult")]
    ToolResult { name: String, payload: Value },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role")]
pub enum Message {
    #[serde(rename = "user")]
    User { text: String, timestamp: i64 },
    #[serde(rename = "model")]
    Model {
        content: Vec<Segment>,
        timestamp: i64,
    },
    #[serde(rename = "toolResult")]
    ToolResult {
        #[serde(rename = "toolName")]
        tool_name: String,
        payload: Value,
        timestamp: i64,
    },
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Message::User {
            text: text.into(),
            timestamp: now_millis(),
        }
    }

    pub fn tool_result(tool_name: impl Into<String>, payload: Value) -> Self {
        Message::ToolResult {
            tool_name: tool_name.into(),
            payload,
            timestamp: now_millis(),
        }
    }

    /// First tool-call segment of a model message, if any. When a turn
    /// carries several calls only the first one is honored.
    pub fn first_tool_call(&self) -> Option<(&str, &Value)> {
        let Message::Model { content, .. } = self else {
            return None;
        };
        content.iter().find_map(|segment| match segment {
            Segment::ToolCall { name, arguments } => Some((name.as_str(), arguments)),
            _ => None,
        })
    }
}

/// Advisory schema for one tool, shown to the model for a single turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDecl {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Snapshot of one request to the model: full history plus the tools offered
/// for the upcoming turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    #[serde(rename = "systemPrompt", skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDecl>>,
}

/// One turn against the language model. Implementations do not retry;
/// transport and protocol failures surface as `AiError`.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn converse(&self, context: &Context) -> Result<Message, AiError>;
}

pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Message, Segment};

    #[test]
    fn first_tool_call_picks_the_first_of_several() {
        let message = Message::Model {
            content: vec![
                Segment::Text {
                    text: "searching".to_string(),
                },
                Segment::ToolCall {
                    name: "search_flights".to_string(),
                    arguments: json!({"origin": "NYC"}),
                },
                Segment::ToolCall {
                    name: "search_google_flights".to_string(),
                    arguments: json!({}),
                },
            ],
            timestamp: 1,
        };

        let (name, arguments) = message.first_tool_call().expect("tool call present");
        assert_eq!(name, "search_flights");
        assert_eq!(arguments, &json!({"origin": "NYC"}));
    }

    #[test]
    fn non_model_messages_carry_no_tool_call() {
        assert_eq!(Message::user("find flights").first_tool_call(), None);
        assert_eq!(
            Message::tool_result("search_flights", json!({"flights": []})).first_tool_call(),
            None
        );
    }
}
