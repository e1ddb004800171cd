//! Model-boundary types and the Gemini `generateContent` client.

mod error;
mod gemini;
mod types;

pub use error::{AiError, AiErrorCode};
pub use gemini::GeminiClient;
pub use types::{Context, Message, ModelClient, Segment, ToolDecl, now_millis};
