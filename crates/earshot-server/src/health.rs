//! `/health` endpoint.

use std::time::Instant;

use earshot_transcription::{ModelDescriptor, TranscriptionEngine};
use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// The loaded recognition model.
    pub engine: EngineHealth,
}

/// Engine section of the health response.
#[derive(Debug, Clone, Serialize)]
pub struct EngineHealth {
    /// Model identity.
    #[serde(flatten)]
    pub model: ModelDescriptor,
    /// Requests waiting for or holding the engine.
    pub queue_depth: usize,
    /// Requests run through the model one at a time.
    pub serialized: bool,
}

/// Build a health response from the engine's live state.
pub fn health_check(start_time: Instant, engine: &TranscriptionEngine) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        uptime_secs: start_time.elapsed().as_secs(),
        engine: EngineHealth {
            model: engine.descriptor().clone(),
            queue_depth: engine.queue_depth(),
            serialized: true,
        },
    }
}
