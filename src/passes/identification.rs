//! Outline Identification Pass
//!
//! Draws the renderers selected by the layer mask into a full-resolution
//! color buffer, replacing their material with the identification override
//! (shader pass 0). Each object writes its vertex color; everything else stays
//! at the clear color, opaque black.
//!
//! The camera depth buffer is bound for occlusion with load-only semantics:
//! depth test on, depth write off, no depth clear. Objects hidden behind
//! non-outlined geometry therefore leave no identification signal.
//!
//! The finished buffer is published in the frame's
//! [`FrameResources`] under [`FrameResources::IDENTIFICATION_TEXTURE`].

use glam::Vec4;

use crate::core::commands::CommandBuffer;
use crate::core::material::{MaterialId, MaterialPass};
use crate::core::texture::{ClearOp, RenderTarget, reallocate_if_needed, release_target};
use crate::core::RenderBackend;
use crate::errors::Result;
use crate::graph::{
    CameraTargets, DrawingSettings, ExecuteContext, FilteringSettings, FrameResources,
    PrepareContext, RenderNode, RenderQueueRange, RenderStage, ShaderTag, build_draw_list,
};
use crate::settings::LayerMask;

/// Clear value of the identification buffer: "no object here".
pub const IDENTIFICATION_CLEAR_COLOR: Vec4 = Vec4::W;

pub struct IdentificationPass {
    material: Option<MaterialId>,
    layer_mask: LayerMask,
    render_queue_range: RenderQueueRange,
    camera_targets: Option<CameraTargets>,
    target: Option<RenderTarget>,

    // Set during prepare, used during run
    enabled: bool,
}

impl IdentificationPass {
    pub const NAME: &'static str = "Outlines.Identification";
    pub const TARGET_NAME: &'static str = "_OutlineIdentification";

    /// `material` is the identification override, owned by the caller.
    /// `None` turns the pass into a no-op.
    #[must_use]
    pub fn new(material: Option<MaterialId>) -> Self {
        Self {
            material,
            layer_mask: LayerMask::NOTHING,
            render_queue_range: RenderQueueRange::all(),
            camera_targets: None,
            target: None,
            enabled: false,
        }
    }

    /// Per-frame parameters, applied before `prepare`.
    pub fn setup(&mut self, layer_mask: LayerMask, camera_targets: CameraTargets) {
        self.layer_mask = layer_mask;
        self.camera_targets = Some(camera_targets);
    }

    pub fn set_render_queue_range(&mut self, range: RenderQueueRange) {
        self.render_queue_range = range;
    }

    #[inline]
    #[must_use]
    pub fn layer_mask(&self) -> LayerMask {
        self.layer_mask
    }

    #[inline]
    #[must_use]
    pub fn material(&self) -> Option<MaterialId> {
        self.material
    }

    /// Currently allocated identification buffer.
    #[inline]
    #[must_use]
    pub fn target(&self) -> Option<&RenderTarget> {
        self.target.as_ref()
    }

    /// Releases the identification buffer. Safe to call repeatedly.
    pub fn release(&mut self, backend: &mut dyn RenderBackend) {
        release_target(backend, &mut self.target);
        self.enabled = false;
    }
}

impl RenderNode for IdentificationPass {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn stage(&self) -> RenderStage {
        RenderStage::AfterTransparents
    }

    fn prepare(&mut self, ctx: &mut PrepareContext) -> Result<()> {
        self.enabled = false;

        if !ctx.camera.wants_outlines() || self.material.is_none() {
            return Ok(());
        }

        let desc = ctx.camera.target.single_sample_color();
        reallocate_if_needed(ctx.backend, &mut self.target, &desc, Self::TARGET_NAME)?;

        self.enabled = true;
        Ok(())
    }

    fn run(&self, ctx: &mut ExecuteContext, cmd: &mut CommandBuffer) {
        if !self.enabled || !ctx.camera.wants_outlines() {
            return;
        }
        let (Some(material), Some(target), Some(camera_targets)) =
            (self.material, self.target.as_ref(), self.camera_targets)
        else {
            return;
        };

        let drawing = DrawingSettings::with_tags(&ShaderTag::OUTLINE_TAGS, ctx.camera.sorting);
        let filtering = FilteringSettings::new(self.render_queue_range.clone(), self.layer_mask);
        let renderers = build_draw_list(ctx.cull_results, &drawing, &filtering);

        cmd.debug_group(Self::NAME, |cmd| {
            cmd.set_render_target(
                target.id,
                camera_targets.depth,
                ClearOp::color(IDENTIFICATION_CLEAR_COLOR),
            );
            if !renderers.is_empty() {
                cmd.draw_renderers(renderers, MaterialPass::first(material));
            }
        });

        ctx.resources
            .publish(FrameResources::IDENTIFICATION_TEXTURE, target.id);
    }
}
