//! Length-prefixed chunk protocol
//!
//! Each frame is a 4-byte little-endian length followed by that many bytes
//! of payload (one complete WAV file). A zero length ends the stream; a
//! stream that stops without it was cut short.

use crate::{Error, Result};

/// Size of the length prefix
pub const PREFIX_LEN: usize = 4;

/// Zero-length marker that terminates a stream
pub const END_OF_STREAM: [u8; PREFIX_LEN] = [0; PREFIX_LEN];

/// Prefix `payload` with its length
///
/// # Errors
///
/// Returns error if the payload is empty (reserved for the end marker) or
/// longer than `u32::MAX` bytes
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.is_empty() {
        return Err(Error::Protocol("empty frame payload".to_string()));
    }
    let len = u32::try_from(payload.len())
        .map_err(|_| Error::Protocol(format!("frame too large: {} bytes", payload.len())))?;

    let mut frame = Vec::with_capacity(PREFIX_LEN + payload.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Split a complete chunk stream into its payloads
///
/// # Errors
///
/// Returns error if a frame is truncated or the end marker is missing
pub fn decode_frames(mut stream: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut payloads = Vec::new();

    loop {
        let Some((prefix, rest)) = stream.split_first_chunk::<PREFIX_LEN>() else {
            return Err(Error::Protocol(
                "stream ended without terminator".to_string(),
            ));
        };
        let len = u32::from_le_bytes(*prefix) as usize;
        if len == 0 {
            if !rest.is_empty() {
                tracing::debug!(trailing = rest.len(), "bytes after end-of-stream marker");
            }
            return Ok(payloads);
        }

        if rest.len() < len {
            return Err(Error::Protocol(format!(
                "truncated frame: expected {len} bytes, got {}",
                rest.len()
            )));
        }
        let (payload, tail) = rest.split_at(len);
        payloads.push(payload.to_vec());
        stream = tail;
    }
}
