//! Transform capability
//!
//! The engine treats pixel work as an opaque capability behind
//! [`Transformer`]. [`ImageTransformer`] is the default implementation on top
//! of the `image` crate; decoding and encoding run on the blocking thread pool
//! so the async runtime is never stalled.

use crate::error::TransformError;
use crate::geometry::{Geometry, ResizeStrategy};
use crate::options::{names, OptionSet};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GenericImageView, ImageFormat, ImageOutputFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::debug;

/// JPEG quality used when the options carry none
const FALLBACK_QUALITY: i64 = 85;

/// Luma at or above which a border pixel counts as background for autocrop
const AUTOCROP_THRESHOLD: u8 = 250;

const SHARPEN_KERNEL: [f32; 9] = [-2.0, -2.0, -2.0, -2.0, 32.0, -2.0, -2.0, -2.0, -2.0];
const DETAIL_KERNEL: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 10.0, -1.0, 0.0, -1.0, 0.0];

/// Encoded format of a stored derivative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
}

impl OutputFormat {
    /// Format selected by the canonical `format` option
    pub fn from_options(options: &OptionSet) -> Self {
        match options.choice(names::FORMAT) {
            Some("PNG") => OutputFormat::Png,
            _ => OutputFormat::Jpeg,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }
}

/// Result of a transform
#[derive(Debug, Clone)]
pub struct Transformed {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
}

/// Header information of encoded image bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
}

/// External transform capability
#[async_trait::async_trait]
pub trait Transformer: Send + Sync {
    /// Produce derivative bytes for the given geometry and canonical options
    async fn transform(
        &self,
        source: Bytes,
        geometry: &Geometry,
        options: &OptionSet,
    ) -> Result<Transformed, TransformError>;

    /// Read dimensions and format from a header without a full decode
    async fn probe(&self, data: Bytes) -> Result<ImageInfo, TransformError>;
}

/// Default transformer backed by the `image` crate
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageTransformer;

impl ImageTransformer {
    pub fn new() -> Self {
        Self
    }

    /// Blocking transform; use [`Transformer::transform`] from async code
    pub fn transform_blocking(
        source: &[u8],
        geometry: &Geometry,
        options: &OptionSet,
    ) -> Result<Transformed, TransformError> {
        let mut img = image::load_from_memory(source)
            .map_err(|e| TransformError::Decode(e.to_string()))?;

        if options.has_flag(names::AUTOCROP) {
            img = autocrop(img);
        }
        if options.choice(names::COLORSPACE) == Some("GRAY") {
            img = img.grayscale();
        }

        let (src_w, src_h) = img.dimensions();
        let upscale = options.has_flag(names::UPSCALE);
        let (scaled_w, scaled_h, final_w, final_h) =
            geometry.target_dimensions(src_w, src_h, upscale);

        if (scaled_w, scaled_h) != (src_w, src_h) {
            img = img.resize_exact(scaled_w, scaled_h, FilterType::Lanczos3);
        }

        match geometry.strategy {
            ResizeStrategy::Crop if (final_w, final_h) != (scaled_w, scaled_h) => {
                let x = (scaled_w - final_w) / 2;
                let y = (scaled_h - final_h) / 2;
                img = img.crop_imm(x, y, final_w, final_h);
            }
            ResizeStrategy::Pad if (final_w, final_h) != (scaled_w, scaled_h) => {
                let mut canvas = RgbaImage::from_pixel(final_w, final_h, Rgba([255, 255, 255, 255]));
                let x = i64::from(final_w.saturating_sub(scaled_w) / 2);
                let y = i64::from(final_h.saturating_sub(scaled_h) / 2);
                image::imageops::overlay(&mut canvas, &img.to_rgba8(), x, y);
                img = DynamicImage::ImageRgba8(canvas);
            }
            _ => {}
        }

        if options.has_flag(names::DETAIL) {
            img = img.filter3x3(&DETAIL_KERNEL);
        }
        if options.has_flag(names::SHARPEN) {
            img = img.filter3x3(&SHARPEN_KERNEL);
        }

        let format = OutputFormat::from_options(options);
        let quality = options
            .int(names::QUALITY)
            .unwrap_or(FALLBACK_QUALITY)
            .clamp(1, 100) as u8;
        let gray = options.choice(names::COLORSPACE) == Some("GRAY");
        let data = encode(&img, format, quality, gray)?;
        let (width, height) = img.dimensions();

        debug!(
            source_width = src_w,
            source_height = src_h,
            width,
            height,
            size = data.len(),
            "Derivative rendered"
        );

        Ok(Transformed {
            data,
            width,
            height,
            format,
        })
    }

    /// Header-only probe
    pub fn probe_blocking(data: &[u8]) -> Result<ImageInfo, TransformError> {
        let reader = image::io::Reader::new(Cursor::new(data))
            .with_guessed_format()
            .map_err(|e| TransformError::Decode(e.to_string()))?;

        let format = match reader.format() {
            Some(ImageFormat::Jpeg) => OutputFormat::Jpeg,
            Some(ImageFormat::Png) => OutputFormat::Png,
            other => {
                return Err(TransformError::Decode(format!(
                    "unsupported derivative format {:?}",
                    other
                )))
            }
        };

        let (width, height) = reader
            .into_dimensions()
            .map_err(|e| TransformError::Decode(e.to_string()))?;

        Ok(ImageInfo {
            width,
            height,
            format,
        })
    }
}

#[async_trait::async_trait]
impl Transformer for ImageTransformer {
    async fn transform(
        &self,
        source: Bytes,
        geometry: &Geometry,
        options: &OptionSet,
    ) -> Result<Transformed, TransformError> {
        let geometry = *geometry;
        let options = options.clone();

        tokio::task::spawn_blocking(move || Self::transform_blocking(&source, &geometry, &options))
            .await
            .map_err(|e| TransformError::Task(format!("Thumbnail task panicked: {e}")))?
    }

    async fn probe(&self, data: Bytes) -> Result<ImageInfo, TransformError> {
        Self::probe_blocking(&data)
    }
}

/// Trim uniform near-white borders
fn autocrop(img: DynamicImage) -> DynamicImage {
    let luma = img.to_luma8();
    let (w, h) = luma.dimensions();

    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in luma.enumerate_pixels() {
        if pixel.0[0] >= AUTOCROP_THRESHOLD {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }

    match bounds {
        Some((x0, y0, x1, y1)) if (x1 - x0 + 1, y1 - y0 + 1) != (w, h) => {
            img.crop_imm(x0, y0, x1 - x0 + 1, y1 - y0 + 1)
        }
        _ => img,
    }
}

fn encode(
    img: &DynamicImage,
    format: OutputFormat,
    quality: u8,
    gray: bool,
) -> Result<Bytes, TransformError> {
    let mut buf = Vec::new();

    match format {
        OutputFormat::Jpeg => {
            let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
            let result = if gray {
                let luma = img.to_luma8();
                encoder.encode(luma.as_raw(), luma.width(), luma.height(), ColorType::L8)
            } else {
                let rgb = img.to_rgb8();
                encoder.encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
            };
            result.map_err(|e| TransformError::Encode(format!("Failed to encode JPEG: {e}")))?;
        }
        OutputFormat::Png => {
            let img = if gray {
                DynamicImage::ImageLuma8(img.to_luma8())
            } else {
                img.clone()
            };
            img.write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
                .map_err(|e| TransformError::Encode(format!("Failed to encode PNG: {e}")))?;
        }
    }

    Ok(Bytes::from(buf))
}
