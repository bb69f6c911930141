mod abort;
mod models;
mod orchestrator;
mod poller;
mod search;

pub use abort::{AbortHandle, AbortSignal};
pub use models::{
    parse_public_id, RunConfig, RunOutcome, RunState, Summary, TestFile, TestResult,
    TriggerConfig,
};
pub use orchestrator::BatchOrchestrator;
pub use search::search_triggers;
