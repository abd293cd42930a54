use crate::error::{ProxyError, Result};
use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;

pub struct ResizedImage {
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

/// Shrinks `original` to fit inside `max_width` x `max_height`, keeping the
/// aspect ratio. Images already inside the box are returned unchanged.
/// Blocking; run it off the async workers.
pub fn resize_to_fit(original: &[u8], max_width: u32, max_height: u32) -> Result<ResizedImage> {
    let detected = image::guess_format(original).ok();
    let decoded = image::load_from_memory(original).map_err(|e| ProxyError::Decode(e.to_string()))?;
    let (width, height) = decoded.dimensions();

    if width <= max_width && height <= max_height {
        return Ok(ResizedImage {
            bytes: Bytes::copy_from_slice(original),
            width,
            height,
            format: detected.unwrap_or(ImageFormat::Jpeg),
        });
    }

    let resized = decoded.resize(max_width.max(1), max_height.max(1), FilterType::Lanczos3);
    let (width, height) = resized.dimensions();
    let (bytes, format) = encode(&resized, detected)?;

    Ok(ResizedImage {
        bytes,
        width,
        height,
        format,
    })
}

/// Encodes in `preferred` when the encoder supports it, JPEG otherwise.
fn encode(image: &DynamicImage, preferred: Option<ImageFormat>) -> Result<(Bytes, ImageFormat)> {
    if let Some(format) = preferred.filter(|f| *f != ImageFormat::Jpeg) {
        let mut buf = Vec::new();
        if image.write_to(&mut Cursor::new(&mut buf), format).is_ok() {
            return Ok((Bytes::from(buf), format));
        }
    }

    // jpeg has no alpha channel
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .map_err(|e| ProxyError::Decode(format!("re-encode failed: {e}")))?;
    Ok((Bytes::from(buf), ImageFormat::Jpeg))
}

#[cfg(test)]
pub(crate) fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    let image = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}
