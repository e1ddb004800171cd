use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// One flight option in the shape both providers normalize to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightRecord {
    pub airline: String,
    pub origin: String,
    pub destination: String,
    pub departure_time: String,
    pub arrival_time: String,
    #[serde(default)]
    pub stops: u32,
    #[serde(default)]
    pub price_usd: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub notes: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

/// What a flight-search tool hands back: flight options or a provider-level
/// error. Carried through the conversation as the `{flights, summary}` /
/// `{error}` JSON payload the model sees.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    Flights {
        records: Vec<FlightRecord>,
        summary: Option<String>,
    },
    Error {
        message: String,
    },
}

impl SearchOutcome {
    pub fn error(message: impl Into<String>) -> Self {
        SearchOutcome::Error {
            message: message.into(),
        }
    }

    pub fn to_payload(&self) -> Value {
        match self {
            SearchOutcome::Flights { records, summary } => {
                let mut payload = json!({
                    "flights": records,
                });
                if let Some(summary) = summary {
                    payload["summary"] = Value::String(summary.clone());
                }
                payload
            }
            SearchOutcome::Error { message } => json!({ "error": message }),
        }
    }

    /// Reads an outcome back out of a tool-result payload. Returns `None`
    /// when the payload is not a flight-search shape at all.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        if let Some(message) = payload.get("error").and_then(Value::as_str) {
            return Some(SearchOutcome::Error {
                message: message.to_string(),
            });
        }

        let has_flights = payload.get("flights").is_some();
        let summary = payload
            .get("summary")
            .and_then(Value::as_str)
            .map(str::to_string);
        if !has_flights && summary.is_none() {
            return None;
        }

        let records = payload
            .get("flights")
            .cloned()
            .map(serde_json::from_value::<Vec<FlightRecord>>)
            .transpose()
            .ok()?
            .unwrap_or_default();

        Some(SearchOutcome::Flights { records, summary })
    }
}
