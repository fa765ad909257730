//! Frame Pass List
//!
//! `FramePassList` collects the passes a camera runs this frame and executes
//! them in stage order:
//!
//! ```text
//! sort by (stage, insertion order)
//!   └─► prepare every pass      (allocation, may fail)
//!   └─► run every pass          (records into one CommandBuffer)
//!   └─► backend.submit(buffer)
//! ```
//!
//! The list does not own its passes; it stores `&mut dyn RenderNode`
//! references whose lifetime is managed by the caller.

use smallvec::SmallVec;

use super::camera::CameraData;
use super::context::{ExecuteContext, PrepareContext};
use super::culling::CullResults;
use super::node::RenderNode;
use super::resources::FrameResources;
use super::stage::RenderStage;
use crate::core::backend::RenderBackend;
use crate::core::commands::CommandBuffer;
use crate::errors::Result;

struct NodeEntry<'a> {
    stage: RenderStage,
    /// Insertion order within the list (stable sort key).
    order: u16,
    node: &'a mut dyn RenderNode,
}

pub struct FramePassList<'a> {
    nodes: SmallVec<[NodeEntry<'a>; 8]>,
    next_order: u16,
}

impl Default for FramePassList<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> FramePassList<'a> {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: SmallVec::new(),
            next_order: 0,
        }
    }

    /// Enqueues `node` at its own [`RenderNode::stage`].
    #[inline]
    pub fn add_node(&mut self, node: &'a mut dyn RenderNode) -> &mut Self {
        let stage = node.stage();
        self.add_node_at(stage, node)
    }

    /// Enqueues `node` at an explicit stage.
    pub fn add_node_at(&mut self, stage: RenderStage, node: &'a mut dyn RenderNode) -> &mut Self {
        self.nodes.push(NodeEntry {
            stage,
            order: self.next_order,
            node,
        });
        self.next_order = self.next_order.wrapping_add(1);
        self
    }

    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    #[must_use]
    pub fn has_stage(&self, stage: RenderStage) -> bool {
        self.nodes.iter().any(|e| e.stage == stage)
    }

    /// Node names in execution order.
    #[must_use]
    pub fn execution_order(&self) -> Vec<String> {
        let mut entries: Vec<&NodeEntry> = self.nodes.iter().collect();
        entries.sort_by_key(|e| (e.stage.order(), e.order));
        entries.iter().map(|e| e.node.name().to_string()).collect()
    }

    /// Prepares, runs and submits every enqueued node.
    ///
    /// Returns the submitted command buffer.
    ///
    /// # Errors
    ///
    /// The first error returned by a node's `prepare` or by the backend's
    /// `submit`. Nothing is submitted when a `prepare` fails.
    pub fn execute(
        mut self,
        backend: &mut dyn RenderBackend,
        camera: &CameraData,
        cull_results: &CullResults,
    ) -> Result<CommandBuffer> {
        self.nodes.sort_by_key(|e| (e.stage.order(), e.order));

        {
            let mut ctx = PrepareContext {
                backend: &mut *backend,
                camera,
            };
            for entry in &mut self.nodes {
                entry.node.prepare(&mut ctx)?;
            }
        }

        let mut resources = FrameResources::new();
        let mut cmd = CommandBuffer::new("Frame");
        {
            let mut ctx = ExecuteContext {
                camera,
                cull_results,
                resources: &mut resources,
            };
            for entry in &self.nodes {
                log::trace!("Running `{}` at {}", entry.node.name(), entry.stage.name());
                entry.node.run(&mut ctx, &mut cmd);
            }
        }

        backend.submit(&cmd)?;
        Ok(cmd)
    }
}
