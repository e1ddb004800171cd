use serde_json::{Value, json};
use skylark_agent_core::FlightSearchAgent;
use tracing::warn;

/// Pulls the query text out of an arbitrary JSON payload: a non-empty
/// `query` key wins, otherwise the first non-empty top-level string value.
pub fn extract_query(payload: &Value) -> Option<String> {
    let object = payload.as_object()?;
    if let Some(query) = object.get("query").and_then(Value::as_str) {
        if !query.trim().is_empty() {
            return Some(query.to_string());
        }
    }
    object
        .values()
        .filter_map(Value::as_str)
        .find(|value| !value.trim().is_empty())
        .map(str::to_string)
}

pub async fn handle_payload(agent: &FlightSearchAgent, payload: Value) -> Value {
    let Some(query) = extract_query(&payload) else {
        warn!("payload carried no usable query text");
        return json!({ "error": "Missing 'query' in payload" });
    };
    let outcome = agent.run_query(&query).await;
    json!({ "response": outcome.into_text() })
}
