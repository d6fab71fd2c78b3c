//! # earshot-server
//!
//! HTTP boundary for the transcription pipeline.
//!
//! | Route | Method | Body |
//! |-------|--------|------|
//! | `/transcribe` | POST | multipart; first file part → `{"transcript": "..."}` |
//! | `/health` | GET | status, uptime, engine identity and queue depth |
//! | `/metrics` | GET | Prometheus text |
//!
//! Failures are `{"error": {"kind": "...", "message": "..."}}` with a status
//! chosen by [`error::status_for`]. The handler does no audio work itself:
//! it extracts the upload and hands it to the shared [`Pipeline`].
//!
//! [`Pipeline`]: earshot_transcription::Pipeline

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod routes;
pub mod server;
pub mod shutdown;

#[cfg(test)]
mod test_support;

pub use config::ServerConfig;
pub use server::{EarshotServer, ServerError};
pub use shutdown::ShutdownCoordinator;
