use std::sync::Arc;

use serde_json::json;
use skylark_ai::{AiError, Message, ModelClient, Segment, ToolDecl};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::aggregator::aggregate;
use crate::registry::{RegistryError, ToolRegistry};
use crate::session::Session;

/// Terminal value of one dialogue run. Failure strings are user-facing and
/// never empty; raw errors do not cross this boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogueOutcome {
    Answer(String),
    Failure(String),
}

impl DialogueOutcome {
    pub fn into_text(self) -> String {
        match self {
            DialogueOutcome::Answer(text) | DialogueOutcome::Failure(text) => text,
        }
    }
}

/// The mandated call order: the second provider's query construction depends
/// on the first provider's normalized identifiers, so the sequence is fixed
/// rather than left to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSequence {
    pub first: String,
    pub second: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingFirstResult,
    AwaitingSecondResult,
    Synthesizing,
}

/// Drives one user query through the fixed two-step protocol: offer the
/// first tool, dispatch its call, offer the second tool, dispatch its call,
/// offer nothing, aggregate the final text.
///
/// Tool *offering* is restricted per turn, not just invocation: the model is
/// never shown the second tool before the first result is in history.
pub struct FlightSearchAgent {
    client: Arc<dyn ModelClient>,
    registry: ToolRegistry,
    sequence: ToolSequence,
    system_prompt: String,
    first_offer: Vec<ToolDecl>,
    second_offer: Vec<ToolDecl>,
    session: Mutex<Option<Session>>,
}

impl FlightSearchAgent {
    /// Fails if either tool in the sequence is not registered.
    pub fn new(
        client: Arc<dyn ModelClient>,
        registry: ToolRegistry,
        sequence: ToolSequence,
        system_prompt: impl Into<String>,
    ) -> Result<Self, RegistryError> {
        let first_offer = registry.offer(&[sequence.first.as_str()])?;
        let second_offer = registry.offer(&[sequence.second.as_str()])?;
        Ok(Self {
            client,
            registry,
            sequence,
            system_prompt: system_prompt.into(),
            first_offer,
            second_offer,
            session: Mutex::new(None),
        })
    }

    /// Runs one complete dialogue. Concurrent callers serialize on the
    /// session lock; the history is reused across queries until `reset`.
    pub async fn run_query(&self, query: &str) -> DialogueOutcome {
        let mut guard = self.session.lock().await;
        let session = guard.get_or_insert_with(|| {
            info!("starting chat session");
            Session::new(self.client.clone(), self.system_prompt.clone())
        });
        self.drive(session, query).await
    }

    /// Snapshot of the current session history (empty before the first
    /// query).
    pub async fn history(&self) -> Vec<Message> {
        let guard = self.session.lock().await;
        guard
            .as_ref()
            .map(|session| session.history().to_vec())
            .unwrap_or_default()
    }

    /// Clears the session history. Idempotent.
    pub async fn reset(&self) {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_mut() {
            session.reset();
        }
    }

    async fn drive(&self, session: &mut Session, query: &str) -> DialogueOutcome {
        info!(query, "processing user query");

        let mut reply = match session.send(Message::user(query), self.first_offer.clone()).await {
            Ok(reply) => reply,
            Err(error) => return model_failure(error),
        };
        let mut phase = Phase::AwaitingFirstResult;
        // Tool results folded into history are also kept here so the final
        // answer can list the flights even when the model's closing response
        // is pure text.
        let mut echoes: Vec<Segment> = Vec::new();

        loop {
            match phase {
                Phase::AwaitingFirstResult | Phase::AwaitingSecondResult => {
                    let expected = match phase {
                        Phase::AwaitingFirstResult => self.sequence.first.as_str(),
                        _ => self.sequence.second.as_str(),
                    };

                    let Some((name, arguments)) = reply.first_tool_call() else {
                        warn!(expected, "model skipped the mandated tool step");
                        return protocol_failure();
                    };
                    let name = name.to_string();
                    let arguments = arguments.clone();

                    let Some(spec) = self.registry.lookup(&name) else {
                        warn!(tool = name.as_str(), "model requested an unknown tool");
                        session.push(Message::tool_result(
                            &name,
                            json!({ "error": format!("Unknown tool {name}") }),
                        ));
                        return DialogueOutcome::Failure(format!(
                            "Sorry, the assistant requested an unknown capability ({name}) \
                             and the request could not be completed."
                        ));
                    };

                    debug!(tool = name.as_str(), args = %arguments, "dispatching tool");
                    // Arguments go to the adapter verbatim; the schema shown
                    // to the model is advisory, validation is the adapter's.
                    let outcome = spec.run(arguments).await;
                    let payload = outcome.to_payload();
                    echoes.push(Segment::ToolResult {
                        name: name.clone(),
                        payload: payload.clone(),
                    });
                    let result = Message::tool_result(&name, payload);

                    reply = match session.send(result, self.next_offer(&name)).await {
                        Ok(reply) => reply,
                        Err(error) => return model_failure(error),
                    };

                    if name != expected {
                        warn!(
                            tool = name.as_str(),
                            expected, "tool called out of the mandated order"
                        );
                        return protocol_failure();
                    }

                    phase = match phase {
                        Phase::AwaitingFirstResult => Phase::AwaitingSecondResult,
                        _ => Phase::Synthesizing,
                    };
                }
                Phase::Synthesizing => {
                    if reply.first_tool_call().is_some() {
                        warn!("model requested a tool after the mandated sequence completed");
                        return protocol_failure();
                    }
                    let answer = aggregate(&with_echoes(echoes, reply));
                    info!("dialogue complete");
                    return DialogueOutcome::Answer(answer);
                }
            }
        }
    }

    fn next_offer(&self, just_called: &str) -> Vec<ToolDecl> {
        if just_called == self.sequence.first {
            self.second_offer.clone()
        } else {
            Vec::new()
        }
    }
}

// The reply may echo functionResponse parts for results already accumulated
// here; those are dropped so each listing renders once.
fn with_echoes(echoes: Vec<Segment>, reply: Message) -> Message {
    match reply {
        Message::Model { content, timestamp } => Message::Model {
            content: echoes
                .into_iter()
                .chain(
                    content
                        .into_iter()
                        .filter(|segment| !matches!(segment, Segment::ToolResult { .. })),
                )
                .collect(),
            timestamp,
        },
        other => other,
    }
}

fn model_failure(error: AiError) -> DialogueOutcome {
    warn!(code = ?error.code, error = error.message.as_str(), "model call failed");
    DialogueOutcome::Failure(format!(
        "An error occurred while processing your request: {}",
        error.message
    ))
}

fn protocol_failure() -> DialogueOutcome {
    DialogueOutcome::Failure(
        "Sorry, the assistant did not follow the required flight search steps and the \
         request could not be completed."
            .to_string(),
    )
}
