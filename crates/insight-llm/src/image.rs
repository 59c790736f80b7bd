//! Image format detection.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::LlmError;

/// Accepted upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
}

const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];
const JPEG_MAGIC: &[u8] = &[0xff, 0xd8, 0xff];

impl ImageFormat {
    /// Detect the format from magic bytes.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(PNG_MAGIC) {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(JPEG_MAGIC) {
            Some(ImageFormat::Jpeg)
        } else {
            None
        }
    }

    /// Detect the format or explain why the bytes are rejected.
    pub fn require(bytes: &[u8]) -> Result<Self, LlmError> {
        if bytes.is_empty() {
            return Err(LlmError::UnsupportedImage("image is empty".to_string()));
        }
        Self::detect(bytes).ok_or_else(|| {
            LlmError::UnsupportedImage("only JPEG and PNG images are supported".to_string())
        })
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }

    /// `data:` URI carrying the base64-encoded image.
    pub fn data_uri(&self, bytes: &[u8]) -> String {
        format!("data:{};base64,{}", self.mime_type(), STANDARD.encode(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_formats() {
        assert_eq!(
            ImageFormat::detect(&[0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n', 0]),
            Some(ImageFormat::Png)
        );
        assert_eq!(
            ImageFormat::detect(&[0xff, 0xd8, 0xff, 0xe0]),
            Some(ImageFormat::Jpeg)
        );
        assert_eq!(ImageFormat::detect(b"GIF89a"), None);
    }

    #[test]
    fn test_require_rejects_empty_and_unknown() {
        assert!(matches!(
            ImageFormat::require(&[]),
            Err(LlmError::UnsupportedImage(msg)) if msg.contains("empty")
        ));
        assert!(ImageFormat::require(b"BM....").is_err());
    }

    #[test]
    fn test_data_uri() {
        let uri = ImageFormat::Jpeg.data_uri(&[0xff, 0xd8, 0xff]);
        assert_eq!(uri, "data:image/jpeg;base64,/9j/");
    }
}
