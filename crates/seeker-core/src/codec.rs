//! Image container decoding for uploaded bytes and stored base64 strings.

use crate::types::PixelGrid;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("no image data")]
    Empty,
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("unrecognized image: {0}")]
    Image(#[from] image::ImageError),
    #[error("image dimensions are zero")]
    ZeroDimensions,
}

/// Decode an uploaded image (JPEG, PNG, ...) into an RGB grid.
pub fn decode_image(bytes: &[u8]) -> Result<PixelGrid, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    let grid = image::load_from_memory(bytes)?.to_rgb8();
    if grid.width() == 0 || grid.height() == 0 {
        return Err(DecodeError::ZeroDimensions);
    }
    Ok(grid)
}

/// Strip an optional `data:<mime>;base64,` prefix (everything up to the first comma).
pub fn strip_data_uri(stored: &str) -> &str {
    match stored.split_once(',') {
        Some((_, payload)) => payload,
        None => stored,
    }
}

/// Decode a stored base64 image, with or without a data-URI prefix.
pub fn decode_stored_image(stored: &str) -> Result<PixelGrid, DecodeError> {
    let payload: String = strip_data_uri(stored)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if payload.is_empty() {
        return Err(DecodeError::Empty);
    }
    let bytes = STANDARD.decode(payload.as_bytes())?;
    decode_image(&bytes)
}

/// Encode raw image bytes as a data URI suitable for storage.
///
/// The MIME type is sniffed from the bytes; unknown formats are stored as
/// `application/octet-stream`.
pub fn encode_stored_image(bytes: &[u8]) -> String {
    let mime = image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream");
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}
