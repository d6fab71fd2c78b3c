//! HTTP rendering of pipeline failures.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use earshot_transcription::{ErrorKind, PipelineError};
use serde::Serialize;

/// A failed request: the pipeline's tagged error, rendered as JSON.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub PipelineError);

impl ApiError {
    /// The request never reached the pipeline.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self(PipelineError::new(ErrorKind::InvalidRequest, message))
    }

    /// Response status for this error.
    pub fn status(&self) -> StatusCode {
        status_for(self.0.kind)
    }
}

/// Map an error category to its HTTP status.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::EmptyUpload | ErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorKind::UploadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorKind::Decode
        | ErrorKind::MalformedContainer
        | ErrorKind::UnexpectedSampleRate
        | ErrorKind::UnexpectedChannelCount => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::TranscoderUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Engine | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    kind: ErrorKind,
    message: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.0.kind,
                message: &self.0.message,
            },
        };
        (self.status(), Json(body)).into_response()
    }
}
