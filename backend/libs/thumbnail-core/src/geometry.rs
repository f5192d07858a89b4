//! Target geometry: the `WxH` grammar
//!
//! Either side may be blank (`x200`, `200x`), meaning "derive it from the
//! source aspect ratio". A bare number is ambiguous and rejected.

use crate::error::ValidationError;
use crate::options::{names, OptionSet};
use std::fmt;

/// How the source is fitted into the target box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeStrategy {
    /// Scale to fit inside the box, preserving aspect ratio
    #[default]
    Fit,
    /// Scale to cover the box, then center-crop to it
    Crop,
    /// Fit inside the box, then pad to exactly its size
    Pad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub strategy: ResizeStrategy,
}

impl Geometry {
    /// Parse `WxH`, `Wx` or `xH`
    pub fn parse(spec: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::BadGeometry(spec.to_string());

        let (width, height) = spec.split_once('x').ok_or_else(invalid)?;
        let width = parse_side(width).ok_or_else(invalid)?;
        let height = parse_side(height).ok_or_else(invalid)?;

        if width.is_none() && height.is_none() {
            return Err(invalid());
        }

        Ok(Self {
            width,
            height,
            strategy: ResizeStrategy::Fit,
        })
    }

    /// Derive the strategy from canonical options; `crop` wins over `pad`
    pub fn with_options(mut self, options: &OptionSet) -> Self {
        self.strategy = if options.has_flag(names::CROP) {
            ResizeStrategy::Crop
        } else if options.has_flag(names::PAD) {
            ResizeStrategy::Pad
        } else {
            ResizeStrategy::Fit
        };
        self
    }

    /// Output dimensions for a source of the given size
    ///
    /// Returns `(scaled_w, scaled_h, final_w, final_h)`: the size the source
    /// is resized to, and the size of the delivered image after cropping or
    /// padding.
    pub fn target_dimensions(&self, src_w: u32, src_h: u32, upscale: bool) -> (u32, u32, u32, u32) {
        let src_w = src_w.max(1);
        let src_h = src_h.max(1);
        let ratio_w = self.width.map(|w| w as f64 / src_w as f64);
        let ratio_h = self.height.map(|h| h as f64 / src_h as f64);

        let mut scale = match (self.strategy, ratio_w, ratio_h) {
            (ResizeStrategy::Crop, Some(rw), Some(rh)) => rw.max(rh),
            (_, Some(rw), Some(rh)) => rw.min(rh),
            (_, Some(r), None) | (_, None, Some(r)) => r,
            (_, None, None) => 1.0,
        };
        if !upscale {
            scale = scale.min(1.0);
        }

        let scaled_w = ((src_w as f64 * scale).round() as u32).max(1);
        let scaled_h = ((src_h as f64 * scale).round() as u32).max(1);

        match (self.strategy, self.width, self.height) {
            (ResizeStrategy::Crop, Some(w), Some(h)) => {
                (scaled_w, scaled_h, scaled_w.min(w), scaled_h.min(h))
            }
            (ResizeStrategy::Pad, Some(w), Some(h)) => (scaled_w, scaled_h, w, h),
            _ => (scaled_w, scaled_h, scaled_w, scaled_h),
        }
    }
}

fn parse_side(raw: &str) -> Option<Option<u32>> {
    if raw.is_empty() {
        return Some(None);
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    match raw.parse::<u32>() {
        Ok(0) | Err(_) => None,
        Ok(value) => Some(Some(value)),
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(w) = self.width {
            write!(f, "{}", w)?;
        }
        f.write_str("x")?;
        if let Some(h) = self.height {
            write!(f, "{}", h)?;
        }
        Ok(())
    }
}
