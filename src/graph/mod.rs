//! Host frame model.
//!
//! - [`RenderStage`]: injection points of the host frame
//! - [`RenderNode`]: two-phase (prepare / run) pass contract
//! - [`PrepareContext`] / [`ExecuteContext`]: per-phase contexts
//! - [`FramePassList`]: per-camera pass list, sorted by stage
//! - [`FrameResources`]: per-frame named texture table
//! - [`CameraData`], [`CullResults`]: host inputs

pub mod camera;
pub mod context;
pub mod culling;
pub mod frame;
pub mod node;
pub mod resources;
pub mod stage;

pub use camera::{CameraData, CameraTargets, CameraType};
pub use context::{ExecuteContext, PrepareContext};
pub use culling::{
    CullResults, DrawingSettings, FilteringSettings, RenderQueueRange, ShaderTag,
    SortingCriteria, VisibleRenderer, build_draw_list,
};
pub use frame::FramePassList;
pub use node::RenderNode;
pub use resources::FrameResources;
pub use stage::RenderStage;
