use std::sync::{Arc, OnceLock};

use skylark_agent_core::{FlightSearchAgent, RegistryError};
use skylark_ai::GeminiClient;

use crate::capabilities;
use crate::config::AppConfig;

pub const SYSTEM_INSTRUCTION: &str = "\
You are a helpful flight search assistant. For every flight search request you MUST follow \
this exact procedure:

1. First, call the `search_flights` tool with the origin, destination and dates from the \
user's request.
2. After you receive its result, call the `search_google_flights` tool with the same origin, \
destination and dates.
3. Only after both tool results are available, write a final answer for the user that \
compares and summarizes the options found.

Never skip a step, never call the tools in a different order, and never invent flight data \
that the tools did not return. If a tool reports an error, mention the problem and continue \
with the remaining step.";

static AGENT: OnceLock<Arc<FlightSearchAgent>> = OnceLock::new();

/// Process-wide agent. The first call builds it from `config`; later calls
/// return the same instance and ignore their argument.
pub fn global_agent(config: &AppConfig) -> Result<Arc<FlightSearchAgent>, RegistryError> {
    if let Some(agent) = AGENT.get() {
        return Ok(agent.clone());
    }
    let agent = Arc::new(build_agent(config)?);
    Ok(AGENT.get_or_init(|| agent).clone())
}

fn build_agent(config: &AppConfig) -> Result<FlightSearchAgent, RegistryError> {
    let client = GeminiClient::new(
        config.model.clone(),
        config.base_url.clone(),
        config.gemini_api_key.clone(),
    );

    FlightSearchAgent::new(
        Arc::new(client),
        capabilities::build_registry(config)?,
        capabilities::tool_sequence(),
        SYSTEM_INSTRUCTION.to_string(),
    )
}
