use std::sync::Arc;

use skylark_ai::{AiError, Context, Message, ModelClient, Segment, ToolDecl};
use tracing::warn;

/// Ordered message history of one logical dialogue with the model.
///
/// History is append-only and never rewound; callers must serialize access
/// (the agent holds the session behind a mutex).
pub struct Session {
    client: Arc<dyn ModelClient>,
    system_prompt: String,
    messages: Vec<Message>,
}

impl Session {
    pub fn new(client: Arc<dyn ModelClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            client,
            system_prompt: system_prompt.into(),
            messages: Vec::new(),
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.messages
    }

    /// Appends one message without conversing. A tool result that does not
    /// answer a call in the preceding message's last segment is logged but
    /// still appended; the orchestrator decides whether the run fails.
    pub fn push(&mut self, message: Message) {
        if let Message::ToolResult { tool_name, .. } = &message {
            if !answers_preceding_call(self.messages.last(), tool_name) {
                warn!(
                    tool = tool_name.as_str(),
                    "tool result does not answer the preceding message's tool call"
                );
            }
        }
        self.messages.push(message);
    }

    /// Appends the outgoing message, asks the model for the next turn with
    /// exactly the given tools offered, appends the reply, and returns it.
    /// Does not retry; a failed call leaves the outgoing message in history
    /// and surfaces the error to the caller.
    pub async fn send(
        &mut self,
        message: Message,
        offered: Vec<ToolDecl>,
    ) -> Result<Message, AiError> {
        self.push(message);
        let context = Context {
            system_prompt: Some(self.system_prompt.clone()),
            messages: self.messages.clone(),
            tools: if offered.is_empty() {
                None
            } else {
                Some(offered)
            },
        };
        let reply = self.client.converse(&context).await?;
        self.messages.push(reply.clone());
        Ok(reply)
    }

    /// Clears history, starting a new logical dialogue. Idempotent.
    pub fn reset(&mut self) {
        self.messages.clear();
    }
}

fn answers_preceding_call(preceding: Option<&Message>, tool_name: &str) -> bool {
    let Some(Message::Model { content, .. }) = preceding else {
        return false;
    };
    matches!(content.last(), Some(Segment::ToolCall { name, .. }) if name == tool_name)
}
