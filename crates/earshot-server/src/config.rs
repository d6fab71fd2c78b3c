//! Server configuration.

use std::time::Duration;

use earshot_settings::ServerSettings;

/// Multipart framing (boundaries, part headers) on top of the audio payload.
pub const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Configuration for the HTTP boundary.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Answer CORS preflights for any origin.
    pub cors_permissive: bool,
    /// How long shutdown waits for in-flight requests.
    pub shutdown_grace: Duration,
    /// Largest request body accepted on `/transcribe`.
    pub body_limit: usize,
}

impl ServerConfig {
    /// Derive the server config from loaded settings.
    ///
    /// `max_upload_bytes` is the pipeline's upload cap; the body limit adds
    /// room for multipart framing so a file exactly at the cap still reaches
    /// the pipeline.
    pub fn from_settings(settings: &ServerSettings, max_upload_bytes: usize) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            cors_permissive: settings.cors_permissive,
            shutdown_grace: Duration::from_secs(settings.shutdown_grace_secs),
            body_limit: max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES),
        }
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            cors_permissive: true,
            shutdown_grace: Duration::from_secs(30),
            body_limit: 25 * 1024 * 1024 + MULTIPART_OVERHEAD_BYTES,
        }
    }
}
