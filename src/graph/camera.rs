//! Per-frame camera description handed to the outline pipeline by the host.

use crate::core::texture::{TextureDesc, TextureId};
use crate::graph::culling::SortingCriteria;

/// What a camera renders for.
///
/// Only [`CameraType::Game`] cameras receive outlines; every other type is an
/// expected skip, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CameraType {
    /// Primary rendered game view.
    #[default]
    Game,
    /// Editor scene view.
    SceneView,
    /// Asset / material preview.
    Preview,
    /// Reflection capture.
    Reflection,
    /// Per-eye VR camera.
    VR,
}

impl CameraType {
    #[inline]
    #[must_use]
    pub const fn is_game(self) -> bool {
        matches!(self, Self::Game)
    }
}

/// Host-owned camera targets, borrowed for the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraTargets {
    pub color: TextureId,
    pub depth: Option<TextureId>,
}

/// Everything the passes need to know about the camera being rendered.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraData {
    pub camera_type: CameraType,
    /// Descriptor of the camera color target. May be multi-sampled; the
    /// passes derive their own single-sample descriptors from it.
    pub target: TextureDesc,
    pub targets: CameraTargets,
    /// Default sort criteria of the camera.
    pub sorting: SortingCriteria,
}

impl CameraData {
    /// Game camera with opaque sorting.
    #[must_use]
    pub fn game(target: TextureDesc, targets: CameraTargets) -> Self {
        Self {
            camera_type: CameraType::Game,
            target,
            targets,
            sorting: SortingCriteria::COMMON_OPAQUE,
        }
    }

    #[must_use]
    pub fn with_type(mut self, camera_type: CameraType) -> Self {
        self.camera_type = camera_type;
        self
    }

    #[must_use]
    pub fn with_sorting(mut self, sorting: SortingCriteria) -> Self {
        self.sorting = sorting;
        self
    }

    /// Whether the outline pipeline runs for this camera.
    #[inline]
    #[must_use]
    pub fn wants_outlines(&self) -> bool {
        self.camera_type.is_game()
    }
}
