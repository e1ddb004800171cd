use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use skylark_agent_core::{FlightRecord, SearchOutcome, ToolExecutor, ToolSpec};
use skylark_ai::{AiError, AiErrorCode};
use tracing::{debug, warn};

use super::SEARCH_FLIGHTS;
use crate::config::AppConfig;

const API_HOST: &str = "sky-scrapper.p.rapidapi.com";
const SEARCH_AIRPORT_URL: &str =
    "https://sky-scrapper.p.rapidapi.com/api/v1/flights/searchAirport";
const SEARCH_FLIGHTS_URL: &str =
    "https://sky-scrapper.p.rapidapi.com/api/v2/flights/searchFlights";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn tool_spec(config: &AppConfig) -> ToolSpec {
    ToolSpec {
        name: SEARCH_FLIGHTS.to_string(),
        description: "Searches for flights using the Sky Scrapper API. Accepts IATA code or \
                      city/airport name for origin and destination."
            .to_string(),
        parameters: parameters_schema(),
        execute: Arc::new(SkyScrapperSearch::new(config.sky_scrapper_api_key.clone())),
    }
}

fn parameters_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "origin": {
                "type": "string",
                "description": "The origin airport/city (IATA code or name, e.g., \"FRA\" or \"Frankfurt\")."
            },
            "destination": {
                "type": "string",
                "description": "The destination airport/city (IATA code or name, e.g., \"DAC\" or \"Dhaka\")."
            },
            "departure_date": {
                "type": "string",
                "description": "The departure date in YYYY-MM-DD format."
            },
            "return_date": {
                "type": "string",
                "description": "The return date in YYYY-MM-DD format. Empty or null if one-way."
            },
            "cabinClass": {
                "type": "string",
                "description": "Cabin class (e.g., \"economy\").",
                "default": "economy"
            },
            "adults": {
                "type": "integer",
                "description": "Number of adults.",
                "default": 1
            },
            "sortBy": {
                "type": "string",
                "description": "Sort by (e.g., \"best\").",
                "default": "best"
            },
            "currency": {
                "type": "string",
                "description": "Currency code (e.g., \"USD\").",
                "default": "USD"
            },
            "market": {
                "type": "string",
                "description": "Market (e.g., \"en-US\").",
                "default": "en-US"
            },
            "countryCode": {
                "type": "string",
                "description": "Country code (e.g., \"US\").",
                "default": "US"
            },
            "preferences": {
                "type": "array",
                "items": { "type": "string" },
                "description": "List of user preferences (e.g., \"cheapest\", \"non-stop\")."
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
    #[serde(default = "default_cabin_class", rename = "cabinClass")]
    cabin_class: String,
    #[serde(default = "default_adults")]
    adults: u32,
    #[serde(default = "default_sort_by", rename = "sortBy")]
    sort_by: String,
    #[serde(default = "default_currency")]
    currency: String,
    #[serde(default = "default_market")]
    market: String,
    #[serde(default = "default_country_code", rename = "countryCode")]
    country_code: String,
    #[serde(default)]
    #[allow(dead_code)]
    preferences: Option<Vec<String>>,
}

fn default_cabin_class() -> String {
    "economy".to_string()
}

fn default_adults() -> u32 {
    1
}

fn default_sort_by() -> String {
    "best".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_market() -> String {
    "en-US".to_string()
}

fn default_country_code() -> String {
    "US".to_string()
}

/// Capability A: Sky Scrapper flight search. Resolves origin/destination
/// names to sky/entity ids first, then runs the itinerary search.
pub struct SkyScrapperSearch {
    api_key: Option<String>,
    client: Client,
}

impl SkyScrapperSearch {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key,
            client: Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    async fn lookup_location(&self, api_key: &str, query: &str) -> Result<Option<Location>, AiError> {
        // Try the uppercased IATA code first, then a title-cased name.
        let candidates = [query.trim().to_uppercase(), title_case(query.trim())];
        for candidate in candidates {
            debug!(query = candidate.as_str(), "looking up Sky Scrapper location");
            let response = self
                .client
                .get(SEARCH_AIRPORT_URL)
                .query(&[("query", candidate.as_str()), ("locale", "en-US")])
                .header("x-rapidapi-host", API_HOST)
                .header("x-rapidapi-key", api_key)
                .send()
                .await
                .map_err(transport_error)?;

            if !response.status().is_success() {
                continue;
            }
            let body: Value = match response.json().await {
                Ok(body) => body,
                Err(_) => continue,
            };
            if let Some(location) = first_location(&body) {
                return Ok(Some(location));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ToolExecutor for SkyScrapperSearch {
    async fn invoke(&self, args: Value) -> Result<SearchOutcome, AiError> {
        let args: SearchArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(error) => {
                return Ok(SearchOutcome::error(format!(
                    "Invalid arguments for {SEARCH_FLIGHTS}: {error}"
                )));
            }
        };
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(SearchOutcome::error("Sky Scrapper API key not set"));
        };

        let Some(origin) = self.lookup_location(api_key, &args.origin).await? else {
            return Ok(SearchOutcome::error(format!(
                "Could not find Sky Scrapper location for origin: {}",
                args.origin
            )));
        };
        let Some(destination) = self.lookup_location(api_key, &args.destination).await? else {
            return Ok(SearchOutcome::error(format!(
                "Could not find Sky Scrapper location for destination: {}",
                args.destination
            )));
        };

        let mut query = vec![
            ("originSkyId", origin.sky_id.clone()),
            ("destinationSkyId", destination.sky_id.clone()),
            ("originEntityId", origin.entity_id.clone()),
            ("destinationEntityId", destination.entity_id.clone()),
            ("cabinClass", args.cabin_class.clone()),
            ("adults", args.adults.to_string()),
            ("sortBy", args.sort_by.clone()),
            ("currency", args.currency.clone()),
            ("market", args.market.clone()),
            ("countryCode", args.country_code.clone()),
            ("date", args.departure_date.clone()),
        ];
        if let Some(return_date) = &args.return_date {
            if !return_date.is_empty() {
                query.push(("returnDate", return_date.clone()));
            }
        }

        let response = self
            .client
            .get(SEARCH_FLIGHTS_URL)
            .query(&query)
            .header("x-rapidapi-host", API_HOST)
            .header("x-rapidapi-key", api_key)
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!(status, "Sky Scrapper search failed");
            return Ok(SearchOutcome::error(format!(
                "Sky Scrapper API error: HTTP {status}: {body}"
            )));
        }

        let body: Value = response.json().await.map_err(transport_error)?;
        Ok(parse_search_response(
            &body,
            &origin.sky_id,
            &destination.sky_id,
            &args.departure_date,
        ))
    }
}

#[derive(Debug, Clone)]
struct Location {
    sky_id: String,
    entity_id: String,
}

fn first_location(body: &Value) -> Option<Location> {
    body.get("data")
        .and_then(Value::as_array)
        .and_then(|locations| locations.first())
        .and_then(|location| {
            Some(Location {
                sky_id: location.get("skyId").and_then(Value::as_str)?.to_string(),
                entity_id: location
                    .get("entityId")
                    .and_then(Value::as_str)?
                    .to_string(),
            })
        })
}

fn parse_search_response(
    body: &Value,
    origin: &str,
    destination: &str,
    departure_date: &str,
) -> SearchOutcome {
    let Some(entries) = body.get("data").and_then(Value::as_array) else {
        return SearchOutcome::error(format!(
            "Sky Scrapper API response missing 'data' list: {body}"
        ));
    };

    let records: Vec<FlightRecord> = entries.iter().map(parse_record).collect();
    let summary = format!(
        "Found {} flights from {origin} to {destination} on {departure_date}.",
        records.len()
    );
    SearchOutcome::Flights {
        records,
        summary: Some(summary),
    }
}

fn parse_record(entry: &Value) -> FlightRecord {
    FlightRecord {
        airline: string_or_na(entry.get("airline")),
        origin: string_or_na(entry.get("origin")),
        destination: string_or_na(entry.get("destination")),
        departure_time: string_or_na(entry.get("departureTime")),
        arrival_time: string_or_na(entry.get("arrivalTime")),
        stops: entry
            .get("stops")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u32,
        price_usd: entry.get("price").and_then(Value::as_f64),
        currency: entry
            .get("currency")
            .and_then(Value::as_str)
            .unwrap_or("USD")
            .to_string(),
        notes: entry
            .get("flightNumber")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    }
}

fn string_or_na(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .unwrap_or("N/A")
        .to_string()
}

fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn transport_error(error: reqwest::Error) -> AiError {
    AiError::new(
        AiErrorCode::ToolExecutionFailed,
        format!("Sky Scrapper transport failed: {error}"),
    )
}
