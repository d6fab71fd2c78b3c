//! # earshot
//!
//! Transcription service binary: loads settings and the recognition model,
//! then serves `/transcribe` until ctrl-c or SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use earshot_logging::LogFormat;
use earshot_server::{EarshotServer, ServerConfig};
use earshot_settings::{EarshotSettings, EngineSettings};
use earshot_transcription::{
    FfmpegTranscoder, ParakeetModel, Pipeline, RecognitionModel, TranscriptionEngine, model,
};
use tracing::{info, warn};

/// Audio transcription service.
#[derive(Parser, Debug)]
#[command(name = "earshot", about = "Audio transcription service")]
struct Cli {
    /// Settings file (default `~/.earshot/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log filter, e.g. `debug` or `earshot_transcription=trace` (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Log one JSON object per line.
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    /// Flags win over the settings file and environment.
    fn apply(&self, settings: &mut EarshotSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
        if self.json_logs {
            settings.logging.json = true;
        }
    }
}

/// Resolve model files (downloading them if allowed) and load the sessions.
async fn load_model(engine: &EngineSettings) -> Result<ParakeetModel> {
    let dir = model::model_dir(engine);
    if engine.auto_download {
        model::ensure_model(&dir, engine.variant, engine.quantization)
            .await
            .context("failed to download recognition model")?;
    } else if !model::is_model_cached(&dir, engine.quantization) {
        bail!(
            "model files for {} ({}) not found in {}; set engine.autoDownload or EARSHOT_AUTO_DOWNLOAD=true",
            engine.variant.as_str(),
            engine.quantization.as_str(),
            dir.display()
        );
    }

    ParakeetModel::load(dir, engine.variant, engine.quantization, engine.intra_threads)
        .await
        .context("failed to load recognition model")
}

/// Scratch directory for per-request WAVs, created if missing.
fn scratch_dir(engine: &EngineSettings) -> Result<PathBuf> {
    let dir = engine
        .scratch_dir
        .as_ref()
        .map_or_else(std::env::temp_dir, PathBuf::from);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create scratch directory: {}", dir.display()))?;
    Ok(dir)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args
        .config
        .clone()
        .unwrap_or_else(earshot_settings::settings_path);
    let mut settings = earshot_settings::load_settings_from_path(&settings_path)
        .with_context(|| format!("failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);

    earshot_logging::init_subscriber(
        &settings.logging.level,
        LogFormat::from_json_flag(settings.logging.json),
    );
    info!(path = %settings_path.display(), "settings loaded");

    let metrics_handle = earshot_server::metrics::install_recorder()
        .context("failed to install metrics recorder")?;

    let target_rate = settings.pipeline.target_sample_rate;
    let transcoder = FfmpegTranscoder::new(&settings.transcoder, target_rate);
    match transcoder.version().await {
        Ok(version) => info!(program = transcoder.program(), %version, "decoder available"),
        Err(e) => warn!(
            program = transcoder.program(),
            error = %e,
            "decoder not usable, uploads will fail until it is installed"
        ),
    }

    let recognizer = load_model(&settings.engine).await?;
    let descriptor = recognizer.descriptor();
    if descriptor.sample_rate != target_rate {
        bail!(
            "model {} expects {} Hz audio but pipeline.targetSampleRate is {target_rate}",
            descriptor.name,
            descriptor.sample_rate
        );
    }

    let engine = Arc::new(TranscriptionEngine::new(
        Box::new(recognizer),
        scratch_dir(&settings.engine)?,
    ));
    let pipeline = Arc::new(Pipeline::new(
        Arc::new(transcoder),
        engine,
        &settings.pipeline,
    ));

    let config = ServerConfig::from_settings(&settings.server, settings.pipeline.max_upload_bytes);
    let grace = config.shutdown_grace;
    let server = EarshotServer::new(config, pipeline, metrics_handle);
    let (addr, handle) = server.listen().await?;
    info!(%addr, model = %descriptor.name, "earshot ready");

    earshot_server::shutdown::signal().await;
    if !server.shutdown().graceful_shutdown(vec![handle], grace).await {
        warn!("exiting with requests still in flight");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_leave_settings_alone() {
        let cli = Cli::parse_from(["earshot"]);
        let mut settings = EarshotSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8001);
        assert_eq!(settings.logging.level, "info");
        assert!(!settings.logging.json);
    }

    #[test]
    fn cli_overrides_bind_address() {
        let cli = Cli::parse_from(["earshot", "--host", "127.0.0.1", "--port", "9000"]);
        let mut settings = EarshotSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 9000);
    }

    #[test]
    fn cli_overrides_logging() {
        let cli = Cli::parse_from(["earshot", "--log-level", "debug", "--json-logs"]);
        let mut settings = EarshotSettings::default();
        cli.apply(&mut settings);
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
    }

    #[test]
    fn cli_config_path() {
        let cli = Cli::parse_from(["earshot", "--config", "/etc/earshot.json"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/earshot.json")));
    }

    #[test]
    fn cli_rejects_bad_port() {
        assert!(Cli::try_parse_from(["earshot", "--port", "70000"]).is_err());
    }

    #[test]
    fn scratch_dir_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        let engine = EngineSettings {
            scratch_dir: Some(nested.to_string_lossy().into_owned()),
            ..EngineSettings::default()
        };
        assert_eq!(scratch_dir(&engine).unwrap(), nested);
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn missing_model_without_download_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = EngineSettings {
            model_dir: Some(tmp.path().to_string_lossy().into_owned()),
            auto_download: false,
            ..EngineSettings::default()
        };
        let err = load_model(&engine).await.err().unwrap();
        assert!(err.to_string().contains("autoDownload"), "{err}");
    }
}
