//! Frame payloads: encoded images as they arrive from clients.
//!
//! Browsers post frames as `data:` URLs produced by `canvas.toDataURL()`.
//! A canvas with nothing drawn on it yields the literal `data:,`, which is
//! treated as the blank frame: no visual content, nothing to detect.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// Data URL emitted by an empty canvas.
pub const BLANK_DATA_URL: &str = "data:,";

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("malformed data URL: {0}")]
    MalformedDataUrl(String),
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("undecodable image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("frame is blank")]
    Blank,
}

/// An encoded image (JPEG, PNG, ...) submitted for recognition or enrollment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    bytes: Vec<u8>,
}

impl Frame {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn blank() -> Self {
        Self::default()
    }

    /// Parse a `data:[<mime>][;base64],<payload>` URL.
    pub fn from_data_url(url: &str) -> Result<Self, FrameError> {
        if url == BLANK_DATA_URL {
            return Ok(Self::blank());
        }

        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| FrameError::MalformedDataUrl("missing `data:` scheme".into()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| FrameError::MalformedDataUrl("missing `,` separator".into()))?;

        if !header.ends_with(";base64") {
            return Err(FrameError::MalformedDataUrl(
                "only base64 payloads are supported".into(),
            ));
        }

        Ok(Self::from_bytes(STANDARD.decode(payload.trim())?))
    }

    /// True for the no-content sentinel (empty payload).
    pub fn is_blank(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decode the payload into an 8-bit RGB image.
    pub fn decode(&self) -> Result<image::RgbImage, FrameError> {
        if self.is_blank() {
            return Err(FrameError::Blank);
        }
        Ok(image::load_from_memory(&self.bytes)?.to_rgb8())
    }
}

/// Encode raw image bytes as a base64 data URL.
pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return BLANK_DATA_URL.to_string();
    }
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_data_url() {
        let frame = Frame::from_data_url(BLANK_DATA_URL).unwrap();
        assert!(frame.is_blank());
    }

    #[test]
    fn test_data_url_payload_decoded() {
        let url = encode_data_url("image/jpeg", &[1, 2, 3, 4]);
        assert!(url.starts_with("data:image/jpeg;base64,"));
        let frame = Frame::from_data_url(&url).unwrap();
        assert_eq!(frame.as_bytes(), &[1, 2, 3, 4]);
        assert!(!frame.is_blank());
    }

    #[test]
    fn test_empty_bytes_encode_to_blank() {
        assert_eq!(encode_data_url("image/png", &[]), BLANK_DATA_URL);
    }

    #[test]
    fn test_missing_scheme_rejected() {
        let err = Frame::from_data_url("image/jpeg;base64,AAAA").unwrap_err();
        assert!(matches!(err, FrameError::MalformedDataUrl(_)));
    }

    #[test]
    fn test_non_base64_payload_rejected() {
        let err = Frame::from_data_url("data:text/plain,hello").unwrap_err();
        assert!(matches!(err, FrameError::MalformedDataUrl(_)));
    }

    #[test]
    fn test_bad_base64_rejected() {
        let err = Frame::from_data_url("data:image/png;base64,@@@").unwrap_err();
        assert!(matches!(err, FrameError::Base64(_)));
    }

    #[test]
    fn test_decode_garbage_is_error() {
        let frame = Frame::from_bytes(vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(matches!(frame.decode(), Err(FrameError::Decode(_))));
    }

    #[test]
    fn test_decode_png() {
        let img = image::RgbImage::from_pixel(4, 3, image::Rgb([10, 20, 30]));
        let mut png = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let decoded = Frame::from_bytes(png).decode().unwrap();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.get_pixel(0, 0).0, [10, 20, 30]);
    }
}
