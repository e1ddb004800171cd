//! Flight-search capabilities offered to the model, one adapter per provider.

use skylark_agent_core::{RegistryError, ToolRegistry, ToolSequence};

use crate::config::AppConfig;

pub mod google_flights;
pub mod sky_scrapper;

pub const SEARCH_FLIGHTS: &str = "search_flights";
pub const SEARCH_GOOGLE_FLIGHTS: &str = "search_google_flights";

pub fn build_registry(config: &AppConfig) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    registry.register(sky_scrapper::tool_spec(config))?;
    registry.register(google_flights::tool_spec(config))?;
    Ok(registry)
}

pub fn tool_sequence() -> ToolSequence {
    ToolSequence {
        first: SEARCH_FLIGHTS.to_string(),
        second: SEARCH_GOOGLE_FLIGHTS.to_string(),
    }
}
