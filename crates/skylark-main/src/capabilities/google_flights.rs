use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use skylark_agent_core::{FlightRecord, SearchOutcome, ToolExecutor, ToolSpec};
use skylark_ai::{AiError, AiErrorCode};
use tracing::warn;

use super::SEARCH_GOOGLE_FLIGHTS;
use crate::config::AppConfig;

const SEARCH_URL: &str = "https://serpapi.com/search";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn tool_spec(config: &AppConfig) -> ToolSpec {
    ToolSpec {
        name: SEARCH_GOOGLE_FLIGHTS.to_string(),
        description: "Searches Google Flights via SerpApi. Requires IATA codes for origin and \
                      destination."
            .to_string(),
        parameters: parameters_schema(),
        execute: Arc::new(GoogleFlightsSearch::new(config.serpapi_key.clone())),
    }
}

fn parameters_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "origin": {
                "type": "string",
                "description": "The origin airport IATA code (e.g., \"JFK\")."
            },
            "destination": {
                "type": "string",
                "description": "The destination airport IATA code (e.g., \"LHR\")."
            },
            "departure_date": {
                "type": "string",
                "description": "The departure date in YYYY-MM-DD format."
            },
            "return_date": {
                "type": "string",
                "description": "The return date in YYYY-MM-DD format. Empty or null if one-way."
            },
            "adults": {
                "type": "integer",
                "description": "Number of adults.",
                "default": 1
            },
            "currency": {
                "type": "string",
                "description": "Currency code (e.g., \"USD\").",
                "default": "USD"
            }
        },
        "required": ["origin", "destination", "departure_date"]
    })
}

#[derive(Debug, Deserialize)]
struct SearchArgs {
    origin: String,
    destination: String,
    departure_date: String,
    #[serde(default)]
    return_date: Option<String>,
    #[serde(default = "default_adults")]
    adults: u32,
    #[serde(default = "default_currency")]
    currency: String,
}

fn default_adults() -> u32 {
    1
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Capability B: Google Flights search through SerpApi.
pub struct GoogleFlightsSearch {
    api_key: Option<String>,
    client: Client,
}

impl GoogleFlightsSearch {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }
}

#[async_trait]
impl ToolExecutor for GoogleFlightsSearch {
    async fn invoke(&self, args: Value) -> Result<SearchOutcome, AiError> {
        let args: SearchArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(error) => {
                return Ok(SearchOutcome::error(format!(
                    "Invalid arguments for {SEARCH_GOOGLE_FLIGHTS}: {error}"
                )));
            }
        };
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(SearchOutcome::error("SerpApi API key not set"));
        };

        let round_trip = args
            .return_date
            .as_deref()
            .is_some_and(|date| !date.is_empty());
        let mut query = vec![
            ("engine", "google_flights".to_string()),
            ("departure_id", args.origin.trim().to_uppercase()),
            ("arrival_id", args.destination.trim().to_uppercase()),
            ("outbound_date", args.departure_date.clone()),
            ("adults", args.adults.to_string()),
            ("currency", args.currency.clone()),
            ("hl", "en".to_string()),
            ("gl", "us".to_string()),
            ("output", "json".to_string()),
            ("api_key", api_key.to_string()),
        ];
        if round_trip {
            query.push(("type", "1".to_string()));
            if let Some(return_date) = &args.return_date {
                query.push(("return_date", return_date.clone()));
            }
        } else {
            query.push(("type", "2".to_string()));
        }

        let response = self
            .client
            .get(SEARCH_URL)
            .query(&query)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, "SerpApi search failed");
            return Ok(SearchOutcome::error(format!(
                "SerpApi error: HTTP {status}: {body}"
            )));
        }

        let body: Value = response.json().await.map_err(transport_error)?;
        Ok(parse_search_response(
            &body,
            &args.origin,
            &args.destination,
            &args.departure_date,
        ))
    }
}

fn parse_search_response(
    body: &Value,
    origin: &str,
    destination: &str,
    departure_date: &str,
) -> SearchOutcome {
    let status = body
        .pointer("/search_metadata/status")
        .and_then(Value::as_str)
        .unwrap_or("Unknown");
    if status != "Success" {
        let error = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or(status);
        return SearchOutcome::error(format!("SerpApi search did not succeed: {error}"));
    }

    let mut records = Vec::new();
    for key in ["best_flights", "other_flights"] {
        if let Some(groups) = body.get(key).and_then(Value::as_array) {
            records.extend(groups.iter().filter_map(parse_group));
        }
    }

    let summary = format!(
        "Found {} flights from {} to {} on {} (Google Flights).",
        records.len(),
        origin.trim().to_uppercase(),
        destination.trim().to_uppercase(),
        departure_date
    );
    SearchOutcome::Flights {
        records,
        summary: Some(summary),
    }
}

// A group holds one or more legs plus an overall price; the record spans
// from the first leg's departure to the last leg's arrival.
fn parse_group(group: &Value) -> Option<FlightRecord> {
    let legs = group.get("flights").and_then(Value::as_array)?;
    let first = legs.first()?;
    let last = legs.last()?;

    let airline = first
        .get("airline")
        .and_then(Value::as_str)
        .unwrap_or("N/A")
        .to_string();
    let flight_numbers: Vec<&str> = legs
        .iter()
        .filter_map(|leg| leg.get("flight_number").and_then(Value::as_str))
        .collect();

    Some(FlightRecord {
        airline,
        origin: airport_field(first, "departure_airport", "id"),
        destination: airport_field(last, "arrival_airport", "id"),
        departure_time: airport_field(first, "departure_airport", "time"),
        arrival_time: airport_field(last, "arrival_airport", "time"),
        stops: group
            .get("layovers")
            .and_then(Value::as_array)
            .map(|layovers| layovers.len() as u32)
            .unwrap_or(0),
        price_usd: group.get("price").and_then(Value::as_f64),
        currency: "USD".to_string(),
        notes: flight_numbers.join(", "),
    })
}

fn airport_field(leg: &Value, airport: &str, field: &str) -> String {
    leg.get(airport)
        .and_then(|airport| airport.get(field))
        .and_then(Value::as_str)
        .unwrap_or("N/A")
        .to_string()
}

fn transport_error(error: reqwest::Error) -> AiError {
    AiError::new(
        AiErrorCode::ToolExecutionFailed,
        format!("SerpApi transport failed: {error}"),
    )
}
