//! Audio upload extraction
//!
//! Clients send the recording either as a multipart form with an `audio`
//! field (browsers, curl `-F`) or as the raw request body (microcontrollers).

use axum::{
    body::Bytes,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
};

use super::ApiError;

/// Non-empty uploaded audio
#[derive(Debug)]
pub struct AudioUpload(pub Bytes);

impl<S> FromRequest<S> for AudioUpload
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|ct| ct.starts_with("multipart/form-data"));

        let audio = if is_multipart {
            let mut multipart = Multipart::from_request(req, state)
                .await
                .map_err(|_| ApiError::BadRequest("Invalid multipart body"))?;

            let mut audio = None;
            while let Some(field) = multipart
                .next_field()
                .await
                .map_err(|_| ApiError::BadRequest("Invalid multipart body"))?
            {
                if field.name() == Some("audio") {
                    audio = Some(
                        field
                            .bytes()
                            .await
                            .map_err(|_| ApiError::BadRequest("Unreadable audio field"))?,
                    );
                    break;
                }
            }
            audio.ok_or(ApiError::BadRequest("Missing 'audio' field"))?
        } else {
            Bytes::from_request(req, state)
                .await
                .map_err(|_| ApiError::BadRequest("Unreadable request body"))?
        };

        if audio.is_empty() {
            return Err(ApiError::BadRequest("Empty audio data"));
        }

        Ok(Self(audio))
    }
}
