use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Content type of a compressed image buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentType {
    /// JPEG (`FF D8`)
    Jpeg,
    /// PNG (`89 50`)
    Png,
    /// TIFF, either byte order (`49 49` / `4D 4D`)
    Tiff,
    /// Anything the sniffer cannot classify (input shorter than two bytes)
    OctetStream,
}

impl ContentType {
    /// MIME string for HTTP headers
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Jpeg => "image/jpeg",
            ContentType::Png => "image/png",
            ContentType::Tiff => "image/tiff",
            ContentType::OctetStream => "application/octet-stream",
        }
    }

    /// Sniff a buffer's content type from its magic bytes.
    ///
    /// Total on non-empty input; unrecognised magic falls back to PNG, which
    /// matches what the capture tools emit when they are not producing TIFF.
    pub fn detect(bytes: &[u8]) -> ContentType {
        match bytes {
            [0xFF, 0xD8, ..] => ContentType::Jpeg,
            [0x89, 0x50, ..] => ContentType::Png,
            [0x49, 0x49, ..] | [0x4D, 0x4D, ..] => ContentType::Tiff,
            [_, _, ..] => ContentType::Png,
            _ => ContentType::OctetStream,
        }
    }
}

/// An immutable compressed image buffer with its detected content type
#[derive(Debug, Clone)]
pub struct CompressedFrame {
    pub bytes: Bytes,
    pub content_type: ContentType,
}

impl CompressedFrame {
    pub fn new(bytes: Vec<u8>, content_type: ContentType) -> Self {
        Self {
            bytes: Bytes::from(bytes),
            content_type,
        }
    }

    /// Wrap a buffer, sniffing its content type
    pub fn sniffed(bytes: Vec<u8>) -> Self {
        let content_type = ContentType::detect(&bytes);
        Self::new(bytes, content_type)
    }
}

/// A published preview frame.
///
/// The payload is shared: the producer's latest slot and every client
/// currently transmitting the frame hold the same buffer.
#[derive(Debug, Clone)]
pub struct Frame {
    pub bytes: Bytes,
    pub content_type: ContentType,
    /// Strictly increasing within one producer, starting at 1
    pub sequence: u64,
    /// Monotonic capture timestamp
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(compressed: CompressedFrame, sequence: u64) -> Self {
        Self {
            bytes: compressed.bytes,
            content_type: compressed.content_type,
            sequence,
            captured_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_magic_bytes() {
        assert_eq!(ContentType::detect(&[0xFF, 0xD8, 0xFF]), ContentType::Jpeg);
        assert_eq!(ContentType::detect(&[0x89, 0x50, 0x4E, 0x47]), ContentType::Png);
        assert_eq!(ContentType::detect(&[0x49, 0x49, 0x2A, 0x00]), ContentType::Tiff);
        assert_eq!(ContentType::detect(&[0x4D, 0x4D, 0x00, 0x2A]), ContentType::Tiff);
    }

    #[test]
    fn test_detect_falls_back_to_png() {
        assert_eq!(ContentType::detect(&[0x00, 0x01, 0x02]), ContentType::Png);
        assert_eq!(ContentType::detect(b"GIF89a"), ContentType::Png);
    }

    #[test]
    fn test_detect_is_total() {
        assert_eq!(ContentType::detect(&[]), ContentType::OctetStream);
        assert_eq!(ContentType::detect(&[0xFF]), ContentType::OctetStream);
        for b in 0..=255u8 {
            // any two-byte input classifies without panicking
            let _ = ContentType::detect(&[b, b]);
        }
    }

    #[test]
    fn test_mime_strings() {
        assert_eq!(ContentType::Jpeg.as_str(), "image/jpeg");
        assert_eq!(ContentType::Png.as_str(), "image/png");
        assert_eq!(ContentType::Tiff.as_str(), "image/tiff");
        assert_eq!(ContentType::OctetStream.as_str(), "application/octet-stream");
    }

    #[test]
    fn test_frame_shares_payload() {
        let compressed = CompressedFrame::sniffed(vec![0xFF, 0xD8, 0xFF, 0xD9]);
        let frame = Frame::new(compressed, 1);
        let other = frame.clone();

        assert_eq!(frame.sequence, 1);
        assert_eq!(frame.content_type, ContentType::Jpeg);
        // Bytes clones are views of the same allocation
        assert_eq!(frame.bytes.as_ptr(), other.bytes.as_ptr());
    }
}
