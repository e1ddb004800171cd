//! Fixed two-step tool-calling dialogue built on top of `skylark-ai`.

mod aggregator;
mod flights;
mod orchestrator;
mod registry;
mod session;

pub use aggregator::{NO_RESPONSE_FALLBACK, aggregate};
pub use flights::{FlightRecord, SearchOutcome};
pub use orchestrator::{DialogueOutcome, FlightSearchAgent, ToolSequence};
pub use registry::{RegistryError, ToolExecuteFn, ToolExecutor, ToolFuture, ToolRegistry, ToolSpec};
pub use session::Session;
