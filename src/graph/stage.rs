//! Render Stage Definitions
//!
//! `RenderStage` mirrors the host frame's injection points. The outline
//! pipeline only uses two of them, but hosts schedule their own passes at the
//! others, so the full ordering is kept.

/// Render stage enumeration.
///
/// Passes within the same stage execute in insertion order.
///
/// # Stage Overview
///
/// | Stage | Typical Content |
/// |-------|-----------------|
/// | `BeforeRendering` | Uploads, shadow maps |
/// | `Opaque` | Opaque geometry |
/// | `Skybox` | Sky / environment |
/// | `Transparent` | Alpha-blended geometry |
/// | `AfterTransparents` | Outline identification |
/// | `PostProcessing` | Tone mapping, bloom, FXAA |
/// | `AfterPostProcessing` | Outline blur and composite |
/// | `Overlay` | UI, debug overlays |
#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy, PartialOrd, Ord)]
#[repr(u8)]
pub enum RenderStage {
    BeforeRendering = 0,
    Opaque = 1,
    Skybox = 2,
    Transparent = 3,
    /// Scene geometry is complete but post-processing has not run yet.
    AfterTransparents = 4,
    PostProcessing = 5,
    /// The camera color holds the final post-processed image.
    AfterPostProcessing = 6,
    Overlay = 7,
}

impl RenderStage {
    /// Returns the numeric index of the stage (used for sorting).
    #[inline]
    #[must_use]
    pub const fn order(self) -> u8 {
        self as u8
    }

    /// Stage name (for debugging).
    #[inline]
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::BeforeRendering => "BeforeRendering",
            Self::Opaque => "Opaque",
            Self::Skybox => "Skybox",
            Self::Transparent => "Transparent",
            Self::AfterTransparents => "AfterTransparents",
            Self::PostProcessing => "PostProcessing",
            Self::AfterPostProcessing => "AfterPostProcessing",
            Self::Overlay => "Overlay",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_ordering() {
        assert!(RenderStage::BeforeRendering < RenderStage::Opaque);
        assert!(RenderStage::Opaque < RenderStage::Skybox);
        assert!(RenderStage::Skybox < RenderStage::Transparent);
        assert!(RenderStage::Transparent < RenderStage::AfterTransparents);
        assert!(RenderStage::AfterTransparents < RenderStage::PostProcessing);
        assert!(RenderStage::PostProcessing < RenderStage::AfterPostProcessing);
        assert!(RenderStage::AfterPostProcessing < RenderStage::Overlay);
    }
}
