//! Render Graph Context System
//!
//! - [`PrepareContext`]: mutable backend access for the **prepare** phase.
//!   Passes allocate and resize their render targets here.
//! - [`ExecuteContext`]: the **run** phase. No backend access at all; passes
//!   only read the camera and cull results and record commands. The frame's
//!   [`FrameResources`] table is the only thing they may mutate.

use crate::core::backend::RenderBackend;
use crate::graph::camera::CameraData;
use crate::graph::culling::CullResults;
use crate::graph::resources::FrameResources;

pub struct PrepareContext<'a> {
    pub backend: &'a mut dyn RenderBackend,
    pub camera: &'a CameraData,
}

pub struct ExecuteContext<'a> {
    pub camera: &'a CameraData,
    pub cull_results: &'a CullResults,
    pub resources: &'a mut FrameResources,
}
