// Image intake
//
// Evidence photos arrive as base64 data URLs from tablets in the field.
// They are recompressed server-side to keep order rows at a manageable
// size: longest edge capped at 1920px, then JPEG quality stepped down
// until the encoded payload fits the budget.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;

/// Longest-edge cap applied before encoding.
const MAX_DIMENSION: u32 = 1920;

/// JPEG quality schedule: start high, step down, never below the floor.
const QUALITY_START: u8 = 92;
const QUALITY_MIN: u8 = 50;
const QUALITY_STEP: u8 = 5;
const MAX_PASSES: usize = 10;

/// Default size budget for a stored photo, in kilobytes.
pub const DEFAULT_MAX_KB: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Unrecognized image data: {0}")]
    Decode(String),

    #[error("JPEG encoding failed: {0}")]
    Encode(String),
}

/// Compress raw image bytes into a `data:image/jpeg;base64,` URL no larger
/// than `max_kb` (best effort; the quality floor wins if they conflict).
pub fn compress_image_to_data_url(bytes: &[u8], max_kb: usize) -> Result<String, MediaError> {
    let img = image::load_from_memory(bytes).map_err(|e| MediaError::Decode(e.to_string()))?;
    let img = cap_dimensions(img);

    let budget = max_kb * 1024;
    let mut quality = QUALITY_START;
    let mut encoded = encode_jpeg(&img, quality)?;

    for _ in 0..MAX_PASSES {
        if encoded.len() <= budget || quality <= QUALITY_MIN {
            break;
        }
        quality = quality.saturating_sub(QUALITY_STEP).max(QUALITY_MIN);
        encoded = encode_jpeg(&img, quality)?;
    }

    Ok(format!(
        "data:image/jpeg;base64,{}",
        BASE64.encode(&encoded)
    ))
}

/// Recompress a data URL in place. Anything that cannot be parsed or decoded
/// is returned unchanged; a photo the intake cannot shrink is still a photo.
pub fn compress_data_url(input: &str, max_kb: usize) -> String {
    let Some(bytes) = decode_data_url(input) else {
        return input.to_string();
    };
    match compress_image_to_data_url(&bytes, max_kb) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!("Photo recompression skipped: {}", e);
            input.to_string()
        }
    }
}

fn decode_data_url(input: &str) -> Option<Vec<u8>> {
    let rest = input.strip_prefix("data:")?;
    let (_, payload) = rest.split_once(";base64,")?;
    BASE64.decode(payload.trim()).ok()
}

fn cap_dimensions(img: DynamicImage) -> DynamicImage {
    if img.width() <= MAX_DIMENSION && img.height() <= MAX_DIMENSION {
        return img;
    }
    img.resize(MAX_DIMENSION, MAX_DIMENSION, FilterType::Lanczos3)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, MediaError> {
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    img.write_with_encoder(encoder)
        .map_err(|e| MediaError::Encode(e.to_string()))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn gradient_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut buf = std::io::Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_compression_fits_budget() {
        let png = gradient_png(800, 600);
        let url = compress_image_to_data_url(&png, DEFAULT_MAX_KB).unwrap();
        assert!(url.starts_with("data:image/jpeg;base64,"));
        let payload = url.strip_prefix("data:image/jpeg;base64,").unwrap();
        let bytes = BASE64.decode(payload).unwrap();
        assert!(bytes.len() <= DEFAULT_MAX_KB * 1024);
    }

    #[test]
    fn test_longest_edge_is_capped() {
        let png = gradient_png(3840, 400);
        let url = compress_image_to_data_url(&png, DEFAULT_MAX_KB).unwrap();
        let bytes = decode_data_url(&url).unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert!(img.width() <= 1920);
        assert!(img.height() <= 1920);
    }

    #[test]
    fn test_small_image_keeps_dimensions() {
        let png = gradient_png(320, 240);
        let url = compress_image_to_data_url(&png, DEFAULT_MAX_KB).unwrap();
        let bytes = decode_data_url(&url).unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (320, 240));
    }

    #[test]
    fn test_unparseable_data_url_passes_through() {
        assert_eq!(compress_data_url("not a data url", 200), "not a data url");
        assert_eq!(
            compress_data_url("data:image/png;base64,%%%", 200),
            "data:image/png;base64,%%%"
        );
    }

    #[test]
    fn test_round_trip_via_data_url() {
        let png = gradient_png(640, 480);
        let input = format!("data:image/png;base64,{}", BASE64.encode(&png));
        let out = compress_data_url(&input, DEFAULT_MAX_KB);
        assert!(out.starts_with("data:image/jpeg;base64,"));
    }
}
