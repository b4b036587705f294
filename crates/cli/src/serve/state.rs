//! Application state shared across request handlers.

use rcaflow_engine::Engine;
use rcaflow_storage::MemoryStorage;

pub(crate) struct AppState {
    pub(crate) engine: Engine<MemoryStorage>,
    /// Name of the configured analysis provider, reported by /health.
    pub(crate) analysis_provider: &'static str,
}
