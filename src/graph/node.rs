//! Render Node Trait
//!
//! Two-phase contract of every pass scheduled through
//! [`FramePassList`](super::FramePassList).

use super::context::{ExecuteContext, PrepareContext};
use super::stage::RenderStage;
use crate::core::commands::CommandBuffer;
use crate::errors::Result;

/// A pass of the host frame.
///
/// - `prepare` gets mutable access to the backend: allocate or resize render
///   targets here. Errors are fatal for the frame.
/// - `run` records commands only. It may publish textures into the frame's
///   resource table for later passes.
///
/// A pass that cannot do its work (wrong camera, missing material) returns
/// early from both phases without recording anything.
pub trait RenderNode {
    /// Returns the node name, used for debug groups and logging.
    fn name(&self) -> &str;

    /// Stage the node is scheduled at.
    fn stage(&self) -> RenderStage;

    /// Allocation phase.
    fn prepare(&mut self, _ctx: &mut PrepareContext) -> Result<()> {
        Ok(())
    }

    /// Recording phase.
    fn run(&self, ctx: &mut ExecuteContext, cmd: &mut CommandBuffer);
}
