//! `POST /transcribe`: multipart upload in, transcript out.

use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use earshot_transcription::{AudioUpload, ErrorKind, PipelineError};
use serde::Serialize;
use tracing::warn;

use crate::error::ApiError;
use crate::metrics::{HTTP_REJECTED_UPLOADS_TOTAL, HTTP_TRANSCRIBE_RESPONSES_TOTAL};
use crate::server::AppState;

/// Field names accepted as the audio part when no file name is sent.
const AUDIO_FIELD_NAMES: [&str; 2] = ["file", "audio"];

/// Successful response body.
#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    /// The joined transcript; empty when nothing was said.
    pub transcript: String,
}

/// POST /transcribe
pub async fn transcribe(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let response = match handle(&state, multipart).await {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(err) => err.into_response(),
    };
    metrics::counter!(
        HTTP_TRANSCRIBE_RESPONSES_TOTAL,
        "status" => response.status().as_u16().to_string()
    )
    .increment(1);
    response
}

async fn handle(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<TranscribeResponse, ApiError> {
    let mut multipart = multipart.map_err(|rejection| {
        reject("not_multipart", ApiError::invalid_request(rejection.body_text()))
    })?;
    let upload = read_upload(&mut multipart).await?;
    let transcript = state.pipeline.run(upload).await?;
    Ok(TranscribeResponse {
        transcript: transcript.text,
    })
}

/// Take the first part that carries a file, or is named like one.
///
/// Other parts are skipped unread.
async fn read_upload(multipart: &mut Multipart) -> Result<AudioUpload, ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let is_audio = field.file_name().is_some()
            || field
                .name()
                .is_some_and(|name| AUDIO_FIELD_NAMES.contains(&name));
        if !is_audio {
            continue;
        }

        let file_name = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(str::to_owned);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        return Ok(AudioUpload {
            bytes: bytes.to_vec(),
            content_type,
            file_name,
        });
    }
    Err(reject(
        "no_audio_part",
        ApiError::invalid_request("no audio file in request"),
    ))
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return reject(
            "body_too_large",
            ApiError(PipelineError::new(ErrorKind::UploadTooLarge, err.body_text())),
        );
    }
    reject("malformed_multipart", ApiError::invalid_request(err.body_text()))
}

/// Boundary rejections never reach the pipeline, so they are logged here.
fn reject(reason: &'static str, err: ApiError) -> ApiError {
    warn!(reason, error = %err.0.message, "rejected upload");
    metrics::counter!(HTTP_REJECTED_UPLOADS_TOTAL, "reason" => reason).increment(1);
    err
}
