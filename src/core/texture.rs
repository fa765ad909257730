//! Render Target Descriptors & Allocate-If-Needed Slots
//!
//! Every buffer of the outline pipeline is a 2D, single-sample, depth-less
//! color image described by a [`TextureDesc`]. Passes keep their targets in
//! `Option<RenderTarget>` slots and call [`reallocate_if_needed`] from their
//! prepare phase; a slot is only reallocated when the requested descriptor
//! differs from the one it currently holds, so calling it every frame with an
//! unchanged camera size costs nothing.
//!
//! ```text
//! prepare(frame N)   : slot None           → create  (allocation)
//! prepare(frame N+1) : slot desc == desc   → keep    (no-op)
//! prepare(resize)    : slot desc != desc   → release + create
//! dispose()          : slot Some           → release → None
//! ```
//!
//! Camera color/depth targets are host-owned and never pass through a slot.

use bitflags::bitflags;
use glam::Vec4;
use slotmap::new_key_type;

use crate::core::backend::RenderBackend;
use crate::errors::{OutlineError, Result};

pub use wgpu::TextureFormat;

new_key_type! {
    /// Backend handle of a 2D texture.
    pub struct TextureId;
}

// ============================================================================
// TextureDesc
// ============================================================================

/// Descriptor of a 2D texture.
///
/// Equality on the whole descriptor is what decides whether a render target
/// slot needs to be reallocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub sample_count: u32,
    pub depth_bits: u32,
}

impl TextureDesc {
    /// Single-sample color descriptor.
    #[must_use]
    pub const fn color(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            format,
            sample_count: 1,
            depth_bits: 0,
        }
    }

    /// Single-sample depth descriptor (32-bit float depth).
    #[must_use]
    pub const fn depth(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            format: TextureFormat::Depth32Float,
            sample_count: 1,
            depth_bits: 32,
        }
    }

    /// Strips multi-sampling and depth from a camera target descriptor,
    /// producing the descriptor used for the pipeline's own color buffers.
    #[must_use]
    pub const fn single_sample_color(self) -> Self {
        Self {
            sample_count: 1,
            depth_bits: 0,
            ..self
        }
    }

    /// Divides width and height by `factor` (truncating), never going below 1.
    ///
    /// A factor of 0 is treated as 1.
    #[must_use]
    pub fn downsampled(self, factor: u32) -> Self {
        let factor = factor.max(1);
        Self {
            width: (self.width / factor).max(1),
            height: (self.height / factor).max(1),
            ..self
        }
    }

    #[inline]
    #[must_use]
    pub const fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    #[inline]
    #[must_use]
    pub fn is_depth(&self) -> bool {
        self.format.is_depth_stencil_format()
    }
}

// ============================================================================
// Clear operations
// ============================================================================

bitflags! {
    /// Which attachments a render target binding clears.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClearFlags: u8 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
    }
}

/// Clear applied when a render target is bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClearOp {
    pub flags: ClearFlags,
    pub color: Vec4,
    pub depth: f32,
}

impl ClearOp {
    /// Loads both attachments untouched.
    pub const NONE: Self = Self {
        flags: ClearFlags::empty(),
        color: Vec4::ZERO,
        depth: 0.0,
    };

    /// Clears color only; depth is loaded.
    #[must_use]
    pub const fn color(color: Vec4) -> Self {
        Self {
            flags: ClearFlags::COLOR,
            color,
            depth: 0.0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn clears_color(&self) -> bool {
        self.flags.contains(ClearFlags::COLOR)
    }

    #[inline]
    #[must_use]
    pub const fn clears_depth(&self) -> bool {
        self.flags.contains(ClearFlags::DEPTH)
    }
}

// ============================================================================
// RenderTarget slots
// ============================================================================

/// A texture owned by a pass, together with the descriptor it was created from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderTarget {
    pub id: TextureId,
    pub desc: TextureDesc,
    pub name: &'static str,
}

/// (Re)allocates `slot` when it is empty or holds a texture created from a
/// different descriptor.
///
/// Returns `Ok(true)` when a new texture was created, `Ok(false)` when the
/// existing one was kept. Allocation errors from the backend are returned
/// unchanged and leave the slot empty.
pub fn reallocate_if_needed(
    backend: &mut dyn RenderBackend,
    slot: &mut Option<RenderTarget>,
    desc: &TextureDesc,
    name: &'static str,
) -> Result<bool> {
    if let Some(current) = slot
        && current.desc == *desc
        && current.name == name
    {
        return Ok(false);
    }

    if desc.width == 0 || desc.height == 0 {
        return Err(OutlineError::ZeroSizedTarget {
            name: name.to_string(),
        });
    }

    if let Some(old) = slot.take() {
        log::debug!(
            "Reallocating `{name}`: {}x{} -> {}x{}",
            old.desc.width,
            old.desc.height,
            desc.width,
            desc.height
        );
        backend.release_texture(old.id);
    } else {
        log::debug!("Allocating `{name}`: {}x{} {:?}", desc.width, desc.height, desc.format);
    }

    let id = backend.create_texture(desc, name)?;
    *slot = Some(RenderTarget {
        id,
        desc: *desc,
        name,
    });
    Ok(true)
}

/// Releases the texture held by `slot`, if any. Safe to call repeatedly.
pub fn release_target(backend: &mut dyn RenderBackend, slot: &mut Option<RenderTarget>) {
    if let Some(target) = slot.take() {
        log::debug!("Releasing `{}`", target.name);
        backend.release_texture(target.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downsample_truncates() {
        let desc = TextureDesc::color(1919, 1081, TextureFormat::Rgba8Unorm);
        let half = desc.downsampled(2);
        assert_eq!((half.width, half.height), (959, 540));
        let third = desc.downsampled(3);
        assert_eq!((third.width, third.height), (639, 360));
    }

    #[test]
    fn test_downsample_never_zero() {
        let desc = TextureDesc::color(3, 1, TextureFormat::Rgba8Unorm);
        let quarter = desc.downsampled(4);
        assert_eq!((quarter.width, quarter.height), (1, 1));
        assert_eq!(desc.downsampled(0), desc);
    }

    #[test]
    fn test_single_sample_color_strips_msaa_and_depth() {
        let camera = TextureDesc {
            width: 640,
            height: 480,
            format: TextureFormat::Rgba16Float,
            sample_count: 4,
            depth_bits: 24,
        };
        let desc = camera.single_sample_color();
        assert_eq!(desc.sample_count, 1);
        assert_eq!(desc.depth_bits, 0);
        assert_eq!(desc.format, TextureFormat::Rgba16Float);
    }

    #[test]
    fn test_clear_op_flags() {
        let op = ClearOp::color(Vec4::W);
        assert!(op.clears_color());
        assert!(!op.clears_depth());
        assert!(!ClearOp::NONE.clears_color());
    }
}
