//! Metric names recorded by the pipeline.

/// Pipeline runs total (counter, labels: outcome).
pub const PIPELINE_REQUESTS_TOTAL: &str = "pipeline_requests_total";
/// Pipeline failures total (counter, labels: kind).
pub const PIPELINE_ERRORS_TOTAL: &str = "pipeline_errors_total";
/// End-to-end pipeline duration seconds (histogram).
pub const PIPELINE_DURATION_SECONDS: &str = "pipeline_duration_seconds";
/// Decoder run duration seconds (histogram).
pub const TRANSCODE_DURATION_SECONDS: &str = "transcode_duration_seconds";
/// Decoded audio length seconds (histogram).
pub const AUDIO_DURATION_SECONDS: &str = "audio_duration_seconds";
/// Recognition duration seconds, excluding queue wait (histogram).
pub const ENGINE_SECONDS: &str = "engine_recognition_seconds";
/// Requests waiting for the model (gauge).
pub const ENGINE_QUEUE_DEPTH: &str = "engine_queue_depth";
