//! Texture size buckets

use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_TEXTURE_SIZE: TextureSize = TextureSize::X32;

/// One of the fixed square raster sizes a texture may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum TextureSize {
    X16,
    X32,
    X64,
    X128,
}

impl TextureSize {
    /// Ascending. Tie-breaking in [`normalize`] relies on this order.
    pub const ALL: [TextureSize; 4] = [Self::X16, Self::X32, Self::X64, Self::X128];

    pub const fn pixels(self) -> u32 {
        match self {
            Self::X16 => 16,
            Self::X32 => 32,
            Self::X64 => 64,
            Self::X128 => 128,
        }
    }

    pub fn from_pixels(pixels: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.pixels() == pixels)
    }
}

impl fmt::Display for TextureSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pixels())
    }
}

impl From<TextureSize> for u32 {
    fn from(size: TextureSize) -> u32 {
        size.pixels()
    }
}

impl TryFrom<u32> for TextureSize {
    type Error = String;

    fn try_from(pixels: u32) -> Result<Self, Self::Error> {
        Self::from_pixels(pixels).ok_or_else(|| format!("{} is not a valid texture size", pixels))
    }
}

/// Map a size hint onto a bucket. Total and pure.
///
/// Missing or NaN hints resolve to the default without clamping. Everything
/// else is clamped into `[16, 128]` and snapped to the nearest bucket, ties
/// going to the smaller one.
pub fn normalize(hint: Option<f64>) -> TextureSize {
    let hint = match hint {
        Some(h) if !h.is_nan() => h,
        _ => return DEFAULT_TEXTURE_SIZE,
    };

    let min = TextureSize::X16.pixels() as f64;
    let max = TextureSize::X128.pixels() as f64;
    let clamped = hint.clamp(min, max);

    let mut best = TextureSize::ALL[0];
    for candidate in TextureSize::ALL.into_iter().skip(1) {
        let distance = (candidate.pixels() as f64 - clamped).abs();
        let best_distance = (best.pixels() as f64 - clamped).abs();
        if distance < best_distance {
            best = candidate;
        }
    }
    best
}

/// Read a size hint out of a loosely typed JSON value.
///
/// Numbers are used as-is; strings are accepted when they hold a number.
/// Anything else counts as missing.
pub fn hint_from_json(value: Option<&serde_json::Value>) -> Option<f64> {
    match value? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_and_nan_default() {
        assert_eq!(normalize(None), TextureSize::X32);
        assert_eq!(normalize(Some(f64::NAN)), TextureSize::X32);
    }

    #[test]
    fn test_clamps_out_of_range() {
        assert_eq!(normalize(Some(200.0)), TextureSize::X128);
        assert_eq!(normalize(Some(10.0)), TextureSize::X16);
        assert_eq!(normalize(Some(-5.0)), TextureSize::X16);
        assert_eq!(normalize(Some(f64::INFINITY)), TextureSize::X128);
        assert_eq!(normalize(Some(f64::NEG_INFINITY)), TextureSize::X16);
    }

    #[test]
    fn test_ties_go_to_smaller_bucket() {
        assert_eq!(normalize(Some(24.0)), TextureSize::X16);
        assert_eq!(normalize(Some(48.0)), TextureSize::X32);
        assert_eq!(normalize(Some(96.0)), TextureSize::X64);
    }

    #[test]
    fn test_nearest_bucket() {
        assert_eq!(normalize(Some(25.0)), TextureSize::X32);
        assert_eq!(normalize(Some(50.0)), TextureSize::X64);
        assert_eq!(normalize(Some(100.0)), TextureSize::X128);
        assert_eq!(normalize(Some(63.9)), TextureSize::X64);
    }

    #[test]
    fn test_idempotent_over_sweep() {
        let mut h = -50.0;
        while h < 300.0 {
            let once = normalize(Some(h));
            assert!(TextureSize::ALL.contains(&once));
            assert_eq!(normalize(Some(once.pixels() as f64)), once);
            h += 0.5;
        }
    }

    #[test]
    fn test_hint_from_json() {
        assert_eq!(hint_from_json(Some(&json!(64))), Some(64.0));
        assert_eq!(hint_from_json(Some(&json!(" 128 "))), Some(128.0));
        assert_eq!(hint_from_json(Some(&json!("large"))), None);
        assert_eq!(hint_from_json(Some(&json!(null))), None);
        assert_eq!(hint_from_json(None), None);
    }

    #[test]
    fn test_serde_as_pixels() {
        let json = serde_json::to_string(&TextureSize::X64).unwrap();
        assert_eq!(json, "64");
        let back: TextureSize = serde_json::from_str("16").unwrap();
        assert_eq!(back, TextureSize::X16);
        assert!(serde_json::from_str::<TextureSize>("20").is_err());
    }
}
