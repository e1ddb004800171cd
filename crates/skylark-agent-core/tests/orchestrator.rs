use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use skylark_agent_core::{
    DialogueOutcome, FlightRecord, FlightSearchAgent, SearchOutcome, ToolFuture, ToolRegistry,
    ToolSequence, ToolSpec,
};
use skylark_ai::{AiError, AiErrorCode, Context, Message, ModelClient, Segment};

const FIRST_TOOL: &str = "search_flights";
const SECOND_TOOL: &str = "search_google_flights";

struct ScriptedClient {
    replies: Mutex<VecDeque<Result<Message, AiError>>>,
    requests: Mutex<Vec<Context>>,
}

impl ScriptedClient {
    fn new(replies: Vec<Result<Message, AiError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn offered_tool_names(&self) -> Vec<Vec<String>> {
        self.requests
            .lock()
            .expect("requests mutex poisoned")
            .iter()
            .map(|context| {
                context
                    .tools
                    .as_deref()
                    .unwrap_or_default()
                    .iter()
                    .map(|tool| tool.name.clone())
                    .collect()
            })
            .collect()
    }
}

#[async_trait]
impl ModelClient for ScriptedClient {
    async fn converse(&self, context: &Context) -> Result<Message, AiError> {
        self.requests
            .lock()
            .expect("requests mutex poisoned")
            .push(context.clone());
        self.replies
            .lock()
            .expect("replies mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| {
                Err(AiError::new(
                    AiErrorCode::ProviderProtocol,
                    "script exhausted",
                ))
            })
    }
}

fn model_text(text: &str) -> Result<Message, AiError> {
    Ok(Message::Model {
        content: vec![Segment::Text {
            text: text.to_string(),
        }],
        timestamp: 1,
    })
}

fn model_tool_call(name: &str, arguments: Value) -> Result<Message, AiError> {
    Ok(Message::Model {
        content: vec![Segment::ToolCall {
            name: name.to_string(),
            arguments,
        }],
        timestamp: 1,
    })
}

fn flight(airline: &str, notes: &str) -> FlightRecord {
    FlightRecord {
        airline: airline.to_string(),
        origin: "JFK".to_string(),
        destination: "LHR".to_string(),
        departure_time: "2025-06-01T08:00".to_string(),
        arrival_time: "2025-06-01T20:00".to_string(),
        stops: 0,
        price_usd: Some(420.0),
        currency: "USD".to_string(),
        notes: notes.to_string(),
    }
}

fn canned_tool(name: &str, outcome: SearchOutcome, seen_args: Arc<Mutex<Vec<Value>>>) -> ToolSpec {
    let outcome = Arc::new(outcome);
    ToolSpec {
        name: name.to_string(),
        description: "test flight search".to_string(),
        parameters: json!({"type": "object"}),
        execute: Arc::new(move |args: Value| -> ToolFuture {
            let outcome = outcome.as_ref().clone();
            let seen_args = seen_args.clone();
            Box::pin(async move {
                seen_args.lock().expect("args mutex poisoned").push(args);
                Ok(outcome)
            })
        }),
    }
}

struct Harness {
    agent: FlightSearchAgent,
    client: Arc<ScriptedClient>,
    first_args: Arc<Mutex<Vec<Value>>>,
}

fn harness(
    replies: Vec<Result<Message, AiError>>,
    first_outcome: SearchOutcome,
    second_outcome: SearchOutcome,
) -> Harness {
    let client = ScriptedClient::new(replies);
    let first_args = Arc::new(Mutex::new(Vec::new()));
    let second_args = Arc::new(Mutex::new(Vec::new()));

    let mut registry = ToolRegistry::new();
    registry
        .register(canned_tool(FIRST_TOOL, first_outcome, first_args.clone()))
        .expect("register first tool");
    registry
        .register(canned_tool(SECOND_TOOL, second_outcome, second_args))
        .expect("register second tool");

    let agent = FlightSearchAgent::new(
        client.clone(),
        registry,
        ToolSequence {
            first: FIRST_TOOL.to_string(),
            second: SECOND_TOOL.to_string(),
        },
        "Call search_flights first, then search_google_flights, then summarize.",
    )
    .expect("sequence tools are registered");

    Harness {
        agent,
        client,
        first_args,
    }
}

fn two_results_harness() -> Harness {
    harness(
        vec![
            model_tool_call(FIRST_TOOL, json!({"origin": "NYC", "destination": "LON"})),
            model_tool_call(SECOND_TOOL, json!({"origin": "JFK", "destination": "LHR"})),
            model_text("Based on both searches, option 1 is best value."),
        ],
        SearchOutcome::Flights {
            records: vec![flight("Delta", "DL1"), flight("BA", "BA178")],
            summary: Some("Found 2 flights from JFK to LHR on 2025-06-01.".to_string()),
        },
        SearchOutcome::Flights {
            records: vec![flight("Virgin", "VS4")],
            summary: None,
        },
    )
}

#[tokio::test]
async fn each_turn_offers_exactly_the_next_tool_in_the_sequence() {
    let harness = two_results_harness();

    let outcome = harness.agent.run_query("flights NYC to LON").await;
    assert!(matches!(outcome, DialogueOutcome::Answer(_)));

    assert_eq!(
        harness.client.offered_tool_names(),
        vec![
            vec![FIRST_TOOL.to_string()],
            vec![SECOND_TOOL.to_string()],
            vec![],
        ],
        "first turn offers only tool A, second only tool B, final turn none"
    );
}

#[tokio::test]
async fn arguments_reach_the_adapter_verbatim() {
    let harness = two_results_harness();
    let _ = harness.agent.run_query("flights NYC to LON").await;

    let seen = harness.first_args.lock().expect("args mutex poisoned");
    assert_eq!(
        seen.as_slice(),
        &[json!({"origin": "NYC", "destination": "LON"})]
    );
}

#[tokio::test]
async fn history_is_appended_in_order_without_duplication() {
    let harness = two_results_harness();
    let _ = harness.agent.run_query("flights NYC to LON").await;

    let history = harness.agent.history().await;
    assert_eq!(history.len(), 6);
    assert!(matches!(&history[0], Message::User { text, .. } if text == "flights NYC to LON"));
    assert_eq!(
        history[1].first_tool_call().map(|(name, _)| name),
        Some(FIRST_TOOL)
    );
    assert!(
        matches!(&history[2], Message::ToolResult { tool_name, .. } if tool_name == FIRST_TOOL)
    );
    assert_eq!(
        history[3].first_tool_call().map(|(name, _)| name),
        Some(SECOND_TOOL)
    );
    assert!(
        matches!(&history[4], Message::ToolResult { tool_name, .. } if tool_name == SECOND_TOOL)
    );
    assert!(matches!(&history[5], Message::Model { .. }));
}

#[tokio::test]
async fn answer_lists_both_providers_results_then_the_closing_sentence() {
    let harness = two_results_harness();

    let DialogueOutcome::Answer(answer) = harness.agent.run_query("flights NYC to LON").await
    else {
        panic!("expected an answer");
    };

    let delta = answer.find("Airline: Delta").expect("A record 1");
    let ba = answer.find("Airline: BA").expect("A record 2");
    let virgin = answer.find("Airline: Virgin").expect("B record");
    let summary = answer
        .find("Summary: Found 2 flights")
        .expect("A summary line");
    assert!(delta < ba && ba < virgin, "A's records in order, then B's");
    assert!(delta < summary, "A's summary follows A's listing");
    assert!(
        answer.ends_with("Based on both searches, option 1 is best value."),
        "model's closing sentence comes last: {answer}"
    );
}

#[tokio::test]
async fn function_response_echoes_in_the_final_reply_render_each_listing_once() {
    let first_outcome = SearchOutcome::Flights {
        records: vec![flight("Delta", "DL1")],
        summary: None,
    };
    // The final reply repeats the first result as a functionResponse part
    // ahead of the closing text, as Gemini sometimes does.
    let final_reply = Ok(Message::Model {
        content: vec![
            Segment::ToolResult {
                name: FIRST_TOOL.to_string(),
                payload: first_outcome.to_payload(),
            },
            Segment::Text {
                text: "Option 1 is the only direct flight.".to_string(),
            },
        ],
        timestamp: 1,
    });
    let harness = harness(
        vec![
            model_tool_call(FIRST_TOOL, json!({})),
            model_tool_call(SECOND_TOOL, json!({})),
            final_reply,
        ],
        first_outcome,
        SearchOutcome::Flights {
            records: vec![flight("Virgin", "VS4")],
            summary: None,
        },
    );

    let DialogueOutcome::Answer(answer) = harness.agent.run_query("flights NYC to LON").await
    else {
        panic!("expected an answer");
    };

    assert_eq!(answer.matches("Airline: Delta").count(), 1, "{answer}");
    assert_eq!(answer.matches("Airline: Virgin").count(), 1, "{answer}");
    assert!(answer.ends_with("Option 1 is the only direct flight."));
}

#[tokio::test]
async fn adapter_error_is_folded_verbatim_and_the_run_continues() {
    let harness = harness(
        vec![
            model_tool_call(FIRST_TOOL, json!({})),
            model_tool_call(SECOND_TOOL, json!({})),
            model_text("Only the second provider responded."),
        ],
        SearchOutcome::error("rate limited"),
        SearchOutcome::Flights {
            records: vec![flight("Virgin", "VS4")],
            summary: None,
        },
    );

    let DialogueOutcome::Answer(answer) = harness.agent.run_query("flights NYC to LON").await
    else {
        panic!("capability-level errors must not be terminal");
    };

    let history = harness.agent.history().await;
    assert!(matches!(
        &history[2],
        Message::ToolResult { tool_name, payload, .. }
            if tool_name == FIRST_TOOL && payload == &json!({"error": "rate limited"})
    ));
    assert_eq!(
        harness.client.offered_tool_names()[1],
        vec![SECOND_TOOL.to_string()],
        "tool B is still offered after A's error"
    );
    assert!(answer.contains("there was a problem: rate limited"));
    let problem = answer.find("there was a problem").expect("problem line");
    let listing = answer.find("Airline: Virgin").expect("B listing");
    assert!(problem < listing, "A's error precedes B's listing");
}

#[tokio::test]
async fn missing_tool_call_is_a_terminal_protocol_violation() {
    let harness = harness(
        vec![model_text("I would rather chat about the weather.")],
        SearchOutcome::error("unused"),
        SearchOutcome::error("unused"),
    );

    let DialogueOutcome::Failure(reason) = harness.agent.run_query("flights NYC to LON").await
    else {
        panic!("skipping the mandated tool step must fail the run");
    };
    assert!(!reason.is_empty());
}

#[tokio::test]
async fn unknown_tool_name_fails_and_its_error_is_the_last_history_message() {
    let harness = harness(
        vec![model_tool_call("book_hotel", json!({"city": "London"}))],
        SearchOutcome::error("unused"),
        SearchOutcome::error("unused"),
    );

    let DialogueOutcome::Failure(reason) = harness.agent.run_query("flights NYC to LON").await
    else {
        panic!("unknown tool must fail the run");
    };
    assert!(reason.contains("book_hotel"));

    let history = harness.agent.history().await;
    assert!(matches!(
        history.last(),
        Some(Message::ToolResult { tool_name, payload, .. })
            if tool_name == "book_hotel"
                && payload == &json!({"error": "Unknown tool book_hotel"})
    ));
}

#[tokio::test]
async fn registered_tool_called_out_of_order_fails_the_run() {
    let harness = harness(
        vec![
            model_tool_call(SECOND_TOOL, json!({})),
            model_text("unused"),
            model_text("unused"),
        ],
        SearchOutcome::error("unused"),
        SearchOutcome::Flights {
            records: vec![],
            summary: None,
        },
    );

    let outcome = harness.agent.run_query("flights NYC to LON").await;
    assert!(
        matches!(outcome, DialogueOutcome::Failure(ref reason) if !reason.is_empty()),
        "calling tool B before tool A violates the protocol: {outcome:?}"
    );
}

#[tokio::test]
async fn model_transport_failure_is_terminal_with_a_user_facing_reason() {
    let harness = harness(
        vec![Err(AiError::new(
            AiErrorCode::ProviderTransport,
            "connection refused",
        ))],
        SearchOutcome::error("unused"),
        SearchOutcome::error("unused"),
    );

    let DialogueOutcome::Failure(reason) = harness.agent.run_query("flights NYC to LON").await
    else {
        panic!("transport failure must end the run");
    };
    assert!(reason.contains("connection refused"));
}

#[tokio::test]
async fn reset_clears_history_and_is_idempotent() {
    let harness = two_results_harness();
    let _ = harness.agent.run_query("flights NYC to LON").await;
    assert!(!harness.agent.history().await.is_empty());

    harness.agent.reset().await;
    harness.agent.reset().await;
    assert!(harness.agent.history().await.is_empty());
}
