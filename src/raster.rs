//! Texture Rasterizer - pixel-exact square resampling
//!
//! Output is always a PNG of exactly `size x size` pixels, produced with
//! nearest-neighbor sampling. Downstream consumers treat it as a fixed-grid
//! sprite, so no filter that blends neighboring pixels may be used here.

use base64::Engine as _;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::io::Cursor;
use thiserror::Error;

const DATA_URL_PREFIX: &str = "data:image/png;base64,";

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("Rasterization failed: cannot decode source image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Rasterization failed: cannot encode PNG: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Rasterization failed: target size must be positive")]
    ZeroSize,

    #[error("Invalid image data URL: {0}")]
    DataUrl(String),
}

/// A square PNG raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RasterImage {
    size: u32,
    png: Vec<u8>,
}

impl RasterImage {
    /// Wrap PNG bytes, reading the side length from the image itself.
    pub fn from_png(png: Vec<u8>) -> Result<Self, RasterError> {
        let decoded = image::load_from_memory_with_format(&png, ImageFormat::Png)
            .map_err(RasterError::Decode)?;
        Ok(Self { size: decoded.width().max(decoded.height()), png })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn png_bytes(&self) -> &[u8] {
        &self.png
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.png)
    }

    pub fn to_data_url(&self) -> String {
        format!("{}{}", DATA_URL_PREFIX, self.to_base64())
    }

    pub fn from_data_url(url: &str) -> Result<Self, RasterError> {
        let payload = url
            .strip_prefix(DATA_URL_PREFIX)
            .ok_or_else(|| RasterError::DataUrl("expected a base64 PNG data URL".into()))?;
        let png = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(|e| RasterError::DataUrl(e.to_string()))?;
        Self::from_png(png)
    }

    /// Decode back into pixels.
    pub fn decode(&self) -> Result<DynamicImage, RasterError> {
        image::load_from_memory_with_format(&self.png, ImageFormat::Png).map_err(RasterError::Decode)
    }
}

impl Serialize for RasterImage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_data_url())
    }
}

impl<'de> Deserialize<'de> for RasterImage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let url = String::deserialize(deserializer)?;
        Self::from_data_url(&url).map_err(serde::de::Error::custom)
    }
}

/// Resample any decodable image to a `size x size` PNG.
pub fn rasterize(source: &[u8], size: u32) -> Result<RasterImage, RasterError> {
    rasterize_as(source, None, size)
}

/// Like [`rasterize`], falling back to the declared MIME type when the bytes
/// carry no recognizable signature.
pub fn rasterize_as(
    source: &[u8],
    mime_type: Option<&str>,
    size: u32,
) -> Result<RasterImage, RasterError> {
    if size == 0 {
        return Err(RasterError::ZeroSize);
    }

    let decoded = decode_source(source, mime_type)?;
    tracing::debug!(
        source_width = decoded.width(),
        source_height = decoded.height(),
        mime_type,
        target = size,
        "rasterizing"
    );

    let rgba = DynamicImage::ImageRgba8(decoded.to_rgba8());
    let resized = rgba.resize_exact(size, size, FilterType::Nearest);

    let mut png = Vec::new();
    resized
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(RasterError::Encode)?;

    Ok(RasterImage { size, png })
}

fn decode_source(source: &[u8], mime_type: Option<&str>) -> Result<DynamicImage, RasterError> {
    let format = match image::guess_format(source) {
        Ok(format) => format,
        Err(e) => match mime_type.and_then(ImageFormat::from_mime_type) {
            Some(format) => format,
            None => return Err(RasterError::Decode(e)),
        },
    };
    image::load_from_memory_with_format(source, format).map_err(RasterError::Decode)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    /// Two-color checkerboard PNG with `cell`-pixel cells.
    pub(crate) fn checkerboard_png(width: u32, height: u32, cell: u32) -> Vec<u8> {
        let img = RgbaImage::from_fn(width, height, |x, y| {
            if ((x / cell) + (y / cell)) % 2 == 0 {
                Rgba([255, 0, 0, 255])
            } else {
                Rgba([0, 0, 255, 0])
            }
        });
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_output_is_exact_square() {
        for (w, h) in [(1, 1), (7, 300), (512, 512), (1024, 768)] {
            for size in [16, 32, 64, 128] {
                let raster = rasterize(&checkerboard_png(w, h, 1), size).unwrap();
                let decoded = raster.decode().unwrap();
                assert_eq!((decoded.width(), decoded.height()), (size, size));
                assert_eq!(raster.size(), size);
            }
        }
    }

    #[test]
    fn test_no_blended_colors() {
        // Downscale 512 -> 16 of a 32px checkerboard: every output pixel must be
        // one of the two source colors exactly.
        let raster = rasterize(&checkerboard_png(512, 512, 32), 16).unwrap();
        let pixels = raster.decode().unwrap().to_rgba8();
        for p in pixels.pixels() {
            assert!(
                *p == Rgba([255, 0, 0, 255]) || *p == Rgba([0, 0, 255, 0]),
                "blended pixel {:?}",
                p
            );
        }
    }

    #[test]
    fn test_upscale_keeps_hard_edges() {
        // 2x2 checkerboard to 16x16: each source pixel becomes an 8x8 block.
        let raster = rasterize(&checkerboard_png(2, 2, 1), 16).unwrap();
        let pixels = raster.decode().unwrap().to_rgba8();
        assert_eq!(*pixels.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(*pixels.get_pixel(7, 7), Rgba([255, 0, 0, 255]));
        assert_eq!(*pixels.get_pixel(8, 0), Rgba([0, 0, 255, 0]));
        assert_eq!(*pixels.get_pixel(15, 15), Rgba([255, 0, 0, 255]));
    }

    fn encoded(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), format).unwrap();
        out
    }

    #[test]
    fn test_jpeg_source_is_resampled() {
        let img = image::RgbImage::from_fn(40, 30, |x, _| {
            if x < 20 { image::Rgb([250, 10, 10]) } else { image::Rgb([10, 10, 250]) }
        });
        let jpeg = encoded(DynamicImage::ImageRgb8(img), ImageFormat::Jpeg);
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);

        let raster = rasterize(&jpeg, 32).unwrap();
        let decoded = raster.decode().unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 32));
    }

    #[test]
    fn test_gif_and_webp_sources_are_resampled() {
        let source = image::load_from_memory(&checkerboard_png(8, 8, 2)).unwrap();
        for format in [ImageFormat::Gif, ImageFormat::WebP] {
            let bytes = encoded(source.clone(), format);
            let raster = rasterize(&bytes, 16).unwrap();
            assert_eq!(raster.size(), 16);
            assert_eq!(raster.decode().unwrap().width(), 16);
        }
    }

    #[test]
    fn test_signature_wins_over_declared_type() {
        let raster = rasterize_as(&checkerboard_png(4, 4, 1), Some("image/jpeg"), 16).unwrap();
        assert_eq!(raster.size(), 16);
    }

    #[test]
    fn test_declared_type_does_not_rescue_garbage() {
        let err = rasterize_as(b"garbage", Some("image/png"), 16).unwrap_err();
        assert!(matches!(err, RasterError::Decode(_)));
    }

    #[test]
    fn test_undecodable_source() {
        let err = rasterize(b"definitely not an image", 32).unwrap_err();
        assert!(matches!(err, RasterError::Decode(_)));
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(matches!(
            rasterize(&checkerboard_png(4, 4, 1), 0),
            Err(RasterError::ZeroSize)
        ));
    }

    #[test]
    fn test_data_url_serde() {
        let raster = rasterize(&checkerboard_png(4, 4, 1), 16).unwrap();
        let json = serde_json::to_string(&raster).unwrap();
        assert!(json.starts_with("\"data:image/png;base64,"));
        let back: RasterImage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, raster);
    }
}
