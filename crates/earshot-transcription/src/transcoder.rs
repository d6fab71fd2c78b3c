//! External decoder process: any compressed container in, canonical WAV out.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use earshot_settings::{PcmEncoding, TranscoderSettings};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::types::TranscriptionError;

/// Converts compressed audio into a canonical PCM WAV container.
#[async_trait]
pub trait AudioTranscoder: Send + Sync {
    /// Decode `input` to mono WAV at the configured rate.
    ///
    /// `content_type` is the upload's declared MIME type, used as a format
    /// hint when the decoder cannot detect a piped input reliably.
    async fn decode(
        &self,
        input: &[u8],
        content_type: Option<&str>,
    ) -> Result<Vec<u8>, TranscriptionError>;
}

/// Map a declared MIME type to a decoder input format name.
///
/// Unknown types return `None` and the decoder detects the format itself.
pub fn input_format_for(content_type: &str) -> Option<&'static str> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "audio/webm" | "video/webm" => Some("webm"),
        "audio/ogg" | "application/ogg" | "audio/opus" => Some("ogg"),
        "audio/wav" | "audio/wave" | "audio/x-wav" | "audio/vnd.wave" => Some("wav"),
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        "audio/aac" => Some("aac"),
        _ => None,
    }
}

/// Runs `ffmpeg` (or a compatible program) as a child process per request.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: String,
    input_format: Option<String>,
    encoding: PcmEncoding,
    sample_rate: u32,
    timeout: Duration,
}

impl FfmpegTranscoder {
    /// Build from settings; `sample_rate` is the pipeline's target rate.
    pub fn new(settings: &TranscoderSettings, sample_rate: u32) -> Self {
        Self {
            program: settings.program.clone(),
            input_format: settings.input_format.clone(),
            encoding: settings.pcm_encoding,
            sample_rate,
            timeout: Duration::from_millis(settings.timeout_ms),
        }
    }

    /// Program that will be spawned.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Command-line arguments for one decode.
    pub fn args(&self, input_format: Option<&str>) -> Vec<String> {
        let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];
        if let Some(format) = input_format {
            args.push("-f".into());
            args.push(format.into());
        }
        args.extend(
            [
                "-i",
                "pipe:0",
                "-vn",
                "-f",
                "wav",
                "-acodec",
                self.encoding.codec_name(),
                "-ar",
            ]
            .map(String::from),
        );
        args.push(self.sample_rate.to_string());
        args.extend(["-ac", "1", "pipe:1"].map(String::from));
        args
    }

    /// Check that the decoder can be spawned. Returns its first version line.
    pub async fn version(&self) -> Result<String, TranscriptionError> {
        let output = Command::new(&self.program)
            .arg("-version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| self.unavailable(&e))?;
        if !output.status.success() {
            return Err(TranscriptionError::TranscoderUnavailable(format!(
                "{} -version exited with {}",
                self.program, output.status
            )));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
    }

    fn unavailable(&self, err: &std::io::Error) -> TranscriptionError {
        TranscriptionError::TranscoderUnavailable(format!("cannot run {}: {err}", self.program))
    }

    async fn run(
        &self,
        input: &[u8],
        input_format: Option<&str>,
    ) -> Result<Vec<u8>, TranscriptionError> {
        let mut child = Command::new(&self.program)
            .args(self.args(input_format))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.unavailable(&e))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| std::io::Error::other("decoder stdin not captured"))?;

        // Feed stdin while draining stdout/stderr so neither pipe can fill up
        // and stall the other side.
        let feed = async move {
            let result = stdin.write_all(input).await;
            drop(stdin);
            match result {
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    debug!("decoder closed stdin early");
                    Ok(())
                }
                other => other,
            }
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(TranscriptionError::Decode {
                status: output.status.code(),
                stderr: if stderr.is_empty() {
                    "decoder reported no diagnostics".into()
                } else {
                    stderr
                },
            });
        }
        fed?;
        if output.stdout.is_empty() {
            return Err(TranscriptionError::Decode {
                status: output.status.code(),
                stderr: "decoder exited successfully but produced no output".into(),
            });
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl AudioTranscoder for FfmpegTranscoder {
    async fn decode(
        &self,
        input: &[u8],
        content_type: Option<&str>,
    ) -> Result<Vec<u8>, TranscriptionError> {
        let input_format = self
            .input_format
            .as_deref()
            .or_else(|| content_type.and_then(input_format_for));
        debug!(
            bytes = input.len(),
            format = input_format.unwrap_or("auto"),
            "decoding upload"
        );

        match tokio::time::timeout(self.timeout, self.run(input, input_format)).await {
            Ok(result) => result,
            Err(_) => {
                // Dropping the run future dropped the child, which kills it.
                warn!(timeout_ms = self.timeout.as_millis(), "decoder timed out, killed");
                Err(TranscriptionError::Timeout {
                    stage: "decode",
                    after: self.timeout,
                })
            }
        }
    }
}
