use skylark_ai::{Message, Segment};

use crate::flights::{FlightRecord, SearchOutcome};

pub const NO_RESPONSE_FALLBACK: &str =
    "Sorry, I couldn't generate a response for that query after processing.";

const FLIGHTS_HEADER: &str = "Here are the best flight options I found for you:";

/// Renders the final model response into one user-facing string. Pure and
/// deterministic: text segments verbatim, tool-result echoes formatted as
/// flight listings or problem lines, in segment order.
pub fn aggregate(message: &Message) -> String {
    let Message::Model { content, .. } = message else {
        return NO_RESPONSE_FALLBACK.to_string();
    };

    let mut parts: Vec<String> = Vec::new();
    for segment in content {
        match segment {
            Segment::Text { text } if !text.is_empty() => parts.push(text.clone()),
            Segment::ToolResult { payload, .. } => {
                if let Some(rendered) = SearchOutcome::from_payload(payload)
                    .and_then(|outcome| render_outcome(&outcome))
                {
                    parts.push(rendered);
                }
            }
            _ => {}
        }
    }

    if parts.is_empty() {
        NO_RESPONSE_FALLBACK.to_string()
    } else {
        parts.join("\n\n")
    }
}

fn render_outcome(outcome: &SearchOutcome) -> Option<String> {
    match outcome {
        SearchOutcome::Error { message } => {
            Some(format!("Sorry, there was a problem: {message}"))
        }
        SearchOutcome::Flights { records, summary } => {
            if records.is_empty() {
                return summary.clone();
            }

            let mut lines = vec![FLIGHTS_HEADER.to_string()];
            for (index, record) in records.iter().enumerate() {
                lines.push(render_record(index + 1, record));
            }
            if let Some(summary) = summary {
                lines.push(format!("Summary: {summary}"));
            }
            Some(lines.join("\n"))
        }
    }
}

fn render_record(position: usize, record: &FlightRecord) -> String {
    let price = match record.price_usd {
        Some(price) => format!("${price} {}", record.currency),
        None => "n/a".to_string(),
    };
    format!(
        "{position}. Airline: {}\n   Route: {} → {}\n   Departure: {}\n   Arrival: {}\n   \
         Stops: {}\n   Price: {price}\n   Flight Number: {}",
        record.airline,
        record.origin,
        record.destination,
        record.departure_time,
        record.arrival_time,
        record.stops,
        record.notes,
    )
}
