//! Outline Configuration
//!
//! This module defines the outline settings as pure data, following the same
//! pattern as the post-processing settings of the engine (`BloomSettings`,
//! `ToneMappingSettings`): plain fields for things the render passes read every
//! frame, range-checked setters for the user-facing knobs.
//!
//! The settings are consumed by [`OutlineFeature`](crate::feature::OutlineFeature)
//! once per camera per frame and copied into both passes before either of them
//! prepares or runs. Changing them while a frame is being recorded is not
//! supported.
//!
//! # Persistence
//!
//! Settings round-trip through JSON:
//!
//! ```rust,ignore
//! let settings = OutlineSettings::from_json(r#"{
//!     "layer_mask": 2,
//!     "opacity": 0.5,
//!     "downsample": 2,
//!     "blur_iterations": 4
//! }"#)?;
//! ```

use std::ops::{BitAnd, BitOr};

use serde::{Deserialize, Serialize};

use crate::errors::{OutlineError, Result};

// ============================================================================
// LayerMask
// ============================================================================

/// 32-bit layer selection mask.
///
/// Every renderer lives on exactly one layer (`0..32`); a renderer takes part
/// in the identification pass when its layer bit is set in the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerMask(u32);

impl LayerMask {
    /// Selects no layer at all.
    pub const NOTHING: Self = Self(0);
    /// Selects every layer.
    pub const EVERYTHING: Self = Self(u32::MAX);

    /// Builds a mask from raw bits.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Builds a mask selecting a single layer. Layers `>= 32` select nothing.
    #[inline]
    #[must_use]
    pub const fn from_layer(layer: u8) -> Self {
        if layer < 32 {
            Self(1 << layer)
        } else {
            Self::NOTHING
        }
    }

    /// Returns a copy of the mask with `layer` added.
    #[inline]
    #[must_use]
    pub const fn with_layer(self, layer: u8) -> Self {
        Self(self.0 | Self::from_layer(layer).0)
    }

    #[inline]
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn contains_layer(self, layer: u8) -> bool {
        layer < 32 && self.0 & (1 << layer) != 0
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for LayerMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for LayerMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

// ============================================================================
// OutlineSettings
// ============================================================================

/// Supported opacity range (inclusive).
pub const OPACITY_RANGE: (f32, f32) = (0.0, 1.0);
/// Supported downsample factors (inclusive).
pub const DOWNSAMPLE_RANGE: (u32, u32) = (1, 4);
/// Supported blur iteration counts (inclusive).
pub const BLUR_ITERATIONS_RANGE: (u32, u32) = (1, 10);

/// Blurred-buffer outline configuration.
///
/// # Fields
///
/// | Field | Range | Default | Meaning |
/// |-------|-------|---------|---------|
/// | `layer_mask` | any | nothing | Renderers taking part in the outline |
/// | `opacity` | `0..=1` | `0.8` | Strength of the composited outline |
/// | `downsample` | `1..=4` | `2` | Divides the blur working resolution |
/// | `blur_iterations` | `1..=10` | `4` | Vertical + horizontal blur pairs |
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlineSettings {
    /// Renderers whose layer is in this mask receive an outline.
    pub layer_mask: LayerMask,
    opacity: f32,
    downsample: u32,
    blur_iterations: u32,
}

impl Default for OutlineSettings {
    fn default() -> Self {
        Self {
            layer_mask: LayerMask::NOTHING,
            opacity: 0.8,
            downsample: 2,
            blur_iterations: 4,
        }
    }
}

impl OutlineSettings {
    /// Creates settings for `layer_mask` with every other knob at its default.
    #[must_use]
    pub fn new(layer_mask: LayerMask) -> Self {
        Self {
            layer_mask,
            ..Default::default()
        }
    }

    /// Parses and validates settings from JSON. Missing fields take their
    /// default value.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Serializes the settings to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks every field against its supported range.
    pub fn validate(&self) -> Result<()> {
        let (min_opacity, max_opacity) = OPACITY_RANGE;
        if !(min_opacity..=max_opacity).contains(&self.opacity) {
            return Err(OutlineError::InvalidSettings {
                field: "opacity",
                reason: format!(
                    "{} is outside {min_opacity}..={max_opacity}",
                    self.opacity
                ),
            });
        }

        let (min_ds, max_ds) = DOWNSAMPLE_RANGE;
        if !(min_ds..=max_ds).contains(&self.downsample) {
            return Err(OutlineError::InvalidSettings {
                field: "downsample",
                reason: format!("{} is outside {min_ds}..={max_ds}", self.downsample),
            });
        }

        let (min_it, max_it) = BLUR_ITERATIONS_RANGE;
        if !(min_it..=max_it).contains(&self.blur_iterations) {
            return Err(OutlineError::InvalidSettings {
                field: "blur_iterations",
                reason: format!(
                    "{} is outside {min_it}..={max_it}",
                    self.blur_iterations
                ),
            });
        }

        Ok(())
    }

    // === Accessors ===

    #[inline]
    #[must_use]
    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    #[inline]
    #[must_use]
    pub fn downsample(&self) -> u32 {
        self.downsample
    }

    #[inline]
    #[must_use]
    pub fn blur_iterations(&self) -> u32 {
        self.blur_iterations
    }

    // === Clamping setters ===

    /// Sets the outline opacity, clamped to `0..=1`. NaN resets to the default.
    pub fn set_opacity(&mut self, opacity: f32) {
        let (min, max) = OPACITY_RANGE;
        let clamped = if opacity.is_nan() {
            Self::default().opacity
        } else {
            opacity.clamp(min, max)
        };
        if clamped.to_bits() != opacity.to_bits() {
            log::warn!("Outline opacity {opacity} clamped to {clamped}");
        }
        self.opacity = clamped;
    }

    /// Sets the working-buffer downsample factor, clamped to `1..=4`.
    pub fn set_downsample(&mut self, downsample: u32) {
        let (min, max) = DOWNSAMPLE_RANGE;
        let clamped = downsample.clamp(min, max);
        if clamped != downsample {
            log::warn!("Outline downsample {downsample} clamped to {clamped}");
        }
        self.downsample = clamped;
    }

    /// Sets the number of blur iterations, clamped to `1..=10`.
    pub fn set_blur_iterations(&mut self, iterations: u32) {
        let (min, max) = BLUR_ITERATIONS_RANGE;
        let clamped = iterations.clamp(min, max);
        if clamped != iterations {
            log::warn!("Outline blur iterations {iterations} clamped to {clamped}");
        }
        self.blur_iterations = clamped;
    }

    /// Builder-style variant of [`set_opacity`](Self::set_opacity).
    #[must_use]
    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.set_opacity(opacity);
        self
    }

    /// Builder-style variant of [`set_downsample`](Self::set_downsample).
    #[must_use]
    pub fn with_downsample(mut self, downsample: u32) -> Self {
        self.set_downsample(downsample);
        self
    }

    /// Builder-style variant of [`set_blur_iterations`](Self::set_blur_iterations).
    #[must_use]
    pub fn with_blur_iterations(mut self, iterations: u32) -> Self {
        self.set_blur_iterations(iterations);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_mask_bits() {
        let mask = LayerMask::from_layer(3).with_layer(5);
        assert!(mask.contains_layer(3));
        assert!(mask.contains_layer(5));
        assert!(!mask.contains_layer(4));
        assert!(!mask.contains_layer(40));
        assert_eq!(mask.bits(), 0b10_1000);
        assert!(LayerMask::NOTHING.is_empty());
        assert_eq!(LayerMask::from_layer(32), LayerMask::NOTHING);
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = OutlineSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.downsample(), 2);
        assert_eq!(settings.blur_iterations(), 4);
        assert!((settings.opacity() - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_setters_clamp() {
        let mut settings = OutlineSettings::default();
        settings.set_opacity(1.5);
        settings.set_downsample(0);
        settings.set_blur_iterations(42);
        assert!((settings.opacity() - 1.0).abs() < f32::EPSILON);
        assert_eq!(settings.downsample(), 1);
        assert_eq!(settings.blur_iterations(), 10);

        settings.set_opacity(f32::NAN);
        assert!((settings.opacity() - 0.8).abs() < f32::EPSILON);
    }

    #[test]
    fn test_from_json_rejects_out_of_range() {
        let err = OutlineSettings::from_json(r#"{ "downsample": 8 }"#).unwrap_err();
        assert!(matches!(
            err,
            OutlineError::InvalidSettings {
                field: "downsample",
                ..
            }
        ));
    }

    #[test]
    fn test_json_round_trip_keeps_layer_mask() {
        let settings = OutlineSettings::new(LayerMask::from_layer(7)).with_opacity(0.25);
        let json = settings.to_json().unwrap();
        assert!(json.contains("\"layer_mask\": 128"));
        let parsed = OutlineSettings::from_json(&json).unwrap();
        assert_eq!(parsed, settings);
    }
}
