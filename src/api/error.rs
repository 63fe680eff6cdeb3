//! HTTP error responses

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::Error;

/// Errors surfaced to HTTP clients
#[derive(Debug)]
pub enum ApiError {
    BadRequest(&'static str),
    NoSpeech,
    NotConfigured(&'static str),
    TranscriptionFailed(String),
    GenerationFailed(String),
    SynthesisFailed(String),
}

impl ApiError {
    /// Map a failure of the recognition stage
    #[must_use]
    pub fn transcription(error: Error) -> Self {
        match error {
            Error::NoSpeech => Self::NoSpeech,
            other => Self::TranscriptionFailed(other.to_string()),
        }
    }

    /// Map a failure of the generation stage (which may include synthesis)
    #[must_use]
    pub fn generation(error: Error) -> Self {
        match error {
            Error::NotConfigured(what) => Self::NotConfigured(what),
            e @ (Error::Tts(_) | Error::Audio(_)) => Self::SynthesisFailed(e.to_string()),
            other => Self::GenerationFailed(other.to_string()),
        }
    }

    /// Stable machine-readable error code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NoSpeech => "no_speech",
            Self::NotConfigured(_) => "not_configured",
            Self::TranscriptionFailed(_) => "transcription_failed",
            Self::GenerationFailed(_) => "generation_failed",
            Self::SynthesisFailed(_) => "synthesis_failed",
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) | Self::NoSpeech => StatusCode::BAD_REQUEST,
            Self::NotConfigured(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::TranscriptionFailed(_)
            | Self::GenerationFailed(_)
            | Self::SynthesisFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: ErrorBody,
        }

        #[derive(Serialize)]
        struct ErrorBody {
            code: &'static str,
            message: String,
        }

        let status = self.status();
        let code = self.code();
        let message = match self {
            Self::BadRequest(msg) => msg.to_string(),
            Self::NoSpeech => "No speech detected".to_string(),
            Self::NotConfigured(what) => format!("{what} is not configured"),
            Self::TranscriptionFailed(msg)
            | Self::GenerationFailed(msg)
            | Self::SynthesisFailed(msg) => msg,
        };

        if status.is_server_error() {
            tracing::error!(code, message = %message, "request failed");
        } else {
            tracing::debug!(code, message = %message, "request rejected");
        }

        (status, Json(ErrorResponse { error: ErrorBody { code, message } })).into_response()
    }
}
