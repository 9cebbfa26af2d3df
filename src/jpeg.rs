//! Best-effort JPEG transcoding for captured frames.
//!
//! Screenshot tools hand us TIFF or PNG; browsers want JPEG. TIFF is decoded
//! and re-encoded here. Anything already JPEG, or anything we cannot decode,
//! passes through unchanged with its sniffed content type.

use jpeg_encoder::{ColorType, Encoder, SamplingFactor};
use tracing::debug;

use crate::frame::{CompressedFrame, ContentType};
use crate::tiff;

/// Compress a captured image buffer to JPEG at the given quality (1..=100).
///
/// Never fails: when the input cannot be transcoded the bytes are returned
/// as-is and the content type reflects what was actually produced.
pub fn compress(bytes: Vec<u8>, quality: u8) -> CompressedFrame {
    match ContentType::detect(&bytes) {
        ContentType::Jpeg => CompressedFrame::new(bytes, ContentType::Jpeg),
        ContentType::Tiff => match transcode_tiff(&bytes, quality) {
            Some(jpeg) => CompressedFrame::new(jpeg, ContentType::Jpeg),
            None => CompressedFrame::new(bytes, ContentType::Tiff),
        },
        other => CompressedFrame::new(bytes, other),
    }
}

fn transcode_tiff(bytes: &[u8], quality: u8) -> Option<Vec<u8>> {
    let image = match tiff::decode(bytes) {
        Ok(image) => image,
        Err(e) => {
            debug!("TIFF decode failed, passing frame through: {}", e);
            return None;
        }
    };

    let color_type = match image.samples_per_pixel {
        3 => ColorType::Rgb,
        4 => ColorType::Rgba,
        other => {
            debug!("unsupported samples per pixel {}, passing through", other);
            return None;
        }
    };

    let expected =
        image.width as usize * image.height as usize * image.samples_per_pixel as usize;
    if image.pixels.len() < expected
        || image.width > u16::MAX as u32
        || image.height > u16::MAX as u32
    {
        debug!(
            "TIFF pixel buffer {}x{}x{} is inconsistent, passing through",
            image.width, image.height, image.samples_per_pixel
        );
        return None;
    }

    let mut jpeg = Vec::new();
    let mut encoder = Encoder::new(&mut jpeg, quality.clamp(1, 100));
    encoder.set_sampling_factor(SamplingFactor::F_2_2);
    match encoder.encode(
        &image.pixels[..expected],
        image.width as u16,
        image.height as u16,
        color_type,
    ) {
        Ok(()) => Some(jpeg),
        Err(e) => {
            debug!("JPEG encode failed, passing frame through: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiff::fixtures::{build_tiff, build_tiff_with_compression, solid_rgb_tiff};

    #[test]
    fn test_jpeg_passthrough() {
        let input = vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0xFF, 0xD9];
        let out = compress(input.clone(), 80);
        assert_eq!(out.content_type, ContentType::Jpeg);
        assert_eq!(out.bytes.as_ref(), input.as_slice());
    }

    #[test]
    fn test_tiff_rgb_transcodes_to_jpeg() {
        let out = compress(solid_rgb_tiff(255, 0, 0), 80);
        assert_eq!(out.content_type, ContentType::Jpeg);
        assert!(out.bytes.len() > 2);
        assert_eq!(&out.bytes[..2], &[0xFF, 0xD8]);
        // Detecting the produced bytes agrees with the reported type
        assert_eq!(ContentType::detect(&out.bytes), ContentType::Jpeg);
    }

    #[test]
    fn test_tiff_rgba_transcodes_to_jpeg() {
        let pixels: Vec<u8> = [0u8, 128, 255, 255].repeat(4);
        let data = build_tiff(2, 2, 4, &pixels, false);
        let out = compress(data, 90);
        assert_eq!(out.content_type, ContentType::Jpeg);
        assert_eq!(&out.bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_compressed_tiff_passes_through() {
        let data = build_tiff_with_compression(1, 1, 3, &[9, 9, 9], true, 5);
        let out = compress(data.clone(), 80);
        assert_eq!(out.content_type, ContentType::Tiff);
        assert_eq!(out.bytes.as_ref(), data.as_slice());
    }

    #[test]
    fn test_png_passes_through_with_sniffed_mime() {
        let input = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
        let out = compress(input.clone(), 80);
        assert_eq!(out.content_type, ContentType::Png);
        assert_eq!(out.bytes.as_ref(), input.as_slice());
    }

    #[test]
    fn test_unknown_samples_per_pixel_passes_through() {
        let data = build_tiff(2, 1, 1, &[7, 7], true);
        let out = compress(data.clone(), 80);
        assert_eq!(out.content_type, ContentType::Tiff);
        assert_eq!(out.bytes.as_ref(), data.as_slice());
    }

    #[test]
    fn test_empty_input_is_octet_stream() {
        let out = compress(Vec::new(), 80);
        assert_eq!(out.content_type, ContentType::OctetStream);
        assert!(out.bytes.is_empty());
    }

    #[test]
    fn test_quality_bounds_accepted() {
        for quality in [1u8, 50, 100] {
            let out = compress(solid_rgb_tiff(0, 255, 0), quality);
            assert_eq!(out.content_type, ContentType::Jpeg);
            assert_eq!(&out.bytes[..2], &[0xFF, 0xD8]);
        }
    }
}
