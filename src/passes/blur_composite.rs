//! Outline Blur & Composite Pass
//!
//! Turns the identification buffer into a soft outline and composites it
//! onto the camera color.
//!
//! # Algorithm
//!
//! 1. **Save**: copy the camera color into `SavedCameraColor` (plain blit).
//! 2. **Extract**: blit `WorkA → WorkA` through the copy-identification
//!    material, which reads the identification buffer and ignores the blit
//!    source. This downsamples the signal into the working resolution.
//! 3. **Blur**: `N` iterations of vertical (`A → B`) then horizontal
//!    (`B → A`) separable blur. Every iteration ends on `A`.
//! 4. **Mask**: blit `WorkA → Mask` through the mask material, which combines
//!    the blurred signal, the raw identification buffer, the saved camera
//!    color and the opacity.
//! 5. **Composite**: blit `Mask → camera color` (plain blit).
//!
//! # Buffers
//!
//! ```text
//! SavedCameraColor  full res      owned
//! Mask              full res      owned
//! WorkA, WorkB      full res / d  owned, always the same size
//! camera color      full res      borrowed, read then written
//! ```
//!
//! The blur direction is baked into two blur materials at creation time, so
//! the blur loop never writes a material property.

use crate::core::commands::CommandBuffer;
use crate::core::material::{MaterialId, MaterialPass};
use crate::core::texture::{
    RenderTarget, TextureDesc, TextureId, reallocate_if_needed, release_target,
};
use crate::core::{ClearOp, RenderBackend};
use crate::errors::Result;
use crate::graph::{
    CameraTargets, ExecuteContext, FrameResources, PrepareContext, RenderNode, RenderStage,
};
use crate::settings::OutlineSettings;
use crate::shaders::{
    CAMERA_COLOR_PROPERTY, IDENTIFICATION_TEXTURE_PROPERTY, OPACITY_PROPERTY,
};

/// Axis sampled by a blur material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum BlurDirection {
    Horizontal = 0,
    Vertical = 1,
}

impl BlurDirection {
    /// Value of the `blur_direction` material property.
    #[inline]
    #[must_use]
    pub const fn as_int(self) -> i32 {
        self as i32
    }
}

/// Materials the pass blits through. All of them are owned by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlurCompositeMaterials {
    pub copy_identification: MaterialId,
    pub vertical_blur: MaterialId,
    pub horizontal_blur: MaterialId,
    pub mask: MaterialId,
}

// ============================================================================
// PingPong
// ============================================================================

/// Two equally sized buffers and the index of the one holding the signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingPong {
    buffers: [TextureId; 2],
    current: usize,
}

impl PingPong {
    /// Starts with the signal in `a`.
    #[must_use]
    pub const fn new(a: TextureId, b: TextureId) -> Self {
        Self {
            buffers: [a, b],
            current: 0,
        }
    }

    /// Buffer holding the signal.
    #[inline]
    #[must_use]
    pub const fn current(&self) -> TextureId {
        self.buffers[self.current]
    }

    /// Buffer the next blit writes to.
    #[inline]
    #[must_use]
    pub const fn other(&self) -> TextureId {
        self.buffers[1 - self.current]
    }

    #[inline]
    #[must_use]
    pub const fn is_first(&self) -> bool {
        self.current == 0
    }

    pub fn swap(&mut self) {
        self.current = 1 - self.current;
    }

    /// Records one `current → other` blit through `material` and swaps.
    pub fn blit(&mut self, cmd: &mut CommandBuffer, material: MaterialPass) {
        cmd.blit_with_material(self.current(), self.other(), material);
        self.swap();
    }
}

// ============================================================================
// BlurCompositePass
// ============================================================================

pub struct BlurCompositePass {
    materials: Option<BlurCompositeMaterials>,
    camera_targets: Option<CameraTargets>,

    opacity: f32,
    downsample: u32,
    blur_iterations: u32,

    saved_color: Option<RenderTarget>,
    mask: Option<RenderTarget>,
    work: [Option<RenderTarget>; 2],

    // Set during prepare, used during run
    enabled: bool,
}

impl BlurCompositePass {
    pub const NAME: &'static str = "Outlines.BlurAndMask";
    pub const SAVED_COLOR_NAME: &'static str = "_OutlineSavedCameraColor";
    pub const MASK_NAME: &'static str = "_OutlineMask";
    pub const WORK_A_NAME: &'static str = "_OutlineWorkA";
    pub const WORK_B_NAME: &'static str = "_OutlineWorkB";

    /// `None` turns the pass into a no-op.
    #[must_use]
    pub fn new(materials: Option<BlurCompositeMaterials>) -> Self {
        let defaults = OutlineSettings::default();
        Self {
            materials,
            camera_targets: None,
            opacity: defaults.opacity(),
            downsample: defaults.downsample(),
            blur_iterations: defaults.blur_iterations(),
            saved_color: None,
            mask: None,
            work: [None, None],
            enabled: false,
        }
    }

    /// Per-frame parameters, applied before `prepare`.
    pub fn setup(&mut self, settings: &OutlineSettings, camera_targets: CameraTargets) {
        self.opacity = settings.opacity();
        self.downsample = settings.downsample();
        self.blur_iterations = settings.blur_iterations();
        self.camera_targets = Some(camera_targets);
    }

    /// Overrides the iteration count.
    ///
    /// Unlike [`OutlineSettings`], 0 is accepted: the mask then reads the
    /// raw downsampled identification signal.
    pub fn set_blur_iterations(&mut self, iterations: u32) {
        self.blur_iterations = iterations;
    }

    #[inline]
    #[must_use]
    pub fn blur_iterations(&self) -> u32 {
        self.blur_iterations
    }

    #[inline]
    #[must_use]
    pub fn downsample(&self) -> u32 {
        self.downsample
    }

    #[inline]
    #[must_use]
    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    #[inline]
    #[must_use]
    pub fn materials(&self) -> Option<BlurCompositeMaterials> {
        self.materials
    }

    #[inline]
    #[must_use]
    pub fn saved_color_target(&self) -> Option<&RenderTarget> {
        self.saved_color.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn mask_target(&self) -> Option<&RenderTarget> {
        self.mask.as_ref()
    }

    /// The two downsampled working buffers, A then B.
    #[must_use]
    pub fn work_targets(&self) -> Option<(&RenderTarget, &RenderTarget)> {
        match &self.work {
            [Some(a), Some(b)] => Some((a, b)),
            _ => None,
        }
    }

    /// Descriptor of the working buffers for a camera target.
    #[must_use]
    pub fn work_desc(&self, camera_target: &TextureDesc) -> TextureDesc {
        camera_target.single_sample_color().downsampled(self.downsample)
    }

    /// Releases every owned buffer. Safe to call repeatedly.
    pub fn release(&mut self, backend: &mut dyn RenderBackend) {
        release_target(backend, &mut self.saved_color);
        release_target(backend, &mut self.mask);
        for slot in &mut self.work {
            release_target(backend, slot);
        }
        self.enabled = false;
    }

    fn record(
        &self,
        cmd: &mut CommandBuffer,
        materials: BlurCompositeMaterials,
        camera_color: TextureId,
        identification: TextureId,
    ) {
        let (Some(saved), Some(mask), [Some(work_a), Some(work_b)]) =
            (self.saved_color.as_ref(), self.mask.as_ref(), &self.work)
        else {
            return;
        };

        // Output target is the camera color; it is never cleared here.
        cmd.set_render_target(camera_color, None, ClearOp::NONE);

        // 1. Save
        cmd.blit(camera_color, saved.id);

        // 2. Extract
        cmd.set_material_texture(
            materials.copy_identification,
            IDENTIFICATION_TEXTURE_PROPERTY,
            identification,
        );
        cmd.blit_with_material(
            work_a.id,
            work_a.id,
            MaterialPass::first(materials.copy_identification),
        );

        // 3. Blur
        let mut ping_pong = PingPong::new(work_a.id, work_b.id);
        for _ in 0..self.blur_iterations {
            ping_pong.blit(cmd, MaterialPass::first(materials.vertical_blur));
            ping_pong.blit(cmd, MaterialPass::first(materials.horizontal_blur));
        }
        debug_assert!(ping_pong.is_first());

        // 4. Mask
        cmd.set_material_float(materials.mask, OPACITY_PROPERTY, self.opacity);
        cmd.set_material_texture(materials.mask, CAMERA_COLOR_PROPERTY, saved.id);
        cmd.set_material_texture(
            materials.mask,
            IDENTIFICATION_TEXTURE_PROPERTY,
            identification,
        );
        cmd.blit_with_material(ping_pong.current(), mask.id, MaterialPass::first(materials.mask));

        // 5. Composite
        cmd.blit(mask.id, camera_color);
    }
}

impl RenderNode for BlurCompositePass {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn stage(&self) -> RenderStage {
        RenderStage::AfterPostProcessing
    }

    fn prepare(&mut self, ctx: &mut PrepareContext) -> Result<()> {
        self.enabled = false;

        if !ctx.camera.wants_outlines() || self.materials.is_none() {
            return Ok(());
        }

        let full = ctx.camera.target.single_sample_color();
        let work = self.work_desc(&ctx.camera.target);

        reallocate_if_needed(ctx.backend, &mut self.saved_color, &full, Self::SAVED_COLOR_NAME)?;
        reallocate_if_needed(ctx.backend, &mut self.mask, &full, Self::MASK_NAME)?;
        let [work_a, work_b] = &mut self.work;
        reallocate_if_needed(ctx.backend, work_a, &work, Self::WORK_A_NAME)?;
        reallocate_if_needed(ctx.backend, work_b, &work, Self::WORK_B_NAME)?;

        self.enabled = true;
        Ok(())
    }

    fn run(&self, ctx: &mut ExecuteContext, cmd: &mut CommandBuffer) {
        if !self.enabled || !ctx.camera.wants_outlines() {
            return;
        }
        let (Some(materials), Some(camera_targets)) = (self.materials, self.camera_targets) else {
            return;
        };
        let Some(identification) = ctx.resources.get(FrameResources::IDENTIFICATION_TEXTURE)
        else {
            log::debug!("No identification buffer this frame, skipping outline composite");
            return;
        };

        cmd.debug_group(Self::NAME, |cmd| {
            self.record(cmd, materials, camera_targets.color, identification);
        });
    }
}

#[cfg(test)]
mod tests {
    use slotmap::SlotMap;

    use super::*;

    #[test]
    fn test_ping_pong_returns_to_first_after_pairs() {
        let mut textures: SlotMap<TextureId, ()> = SlotMap::with_key();
        let a = textures.insert(());
        let b = textures.insert(());
        let mut materials: SlotMap<MaterialId, ()> = SlotMap::with_key();
        let blur = MaterialPass::first(materials.insert(()));

        for iterations in 1..=10 {
            let mut cmd = CommandBuffer::new("ping-pong");
            let mut ping_pong = PingPong::new(a, b);
            for _ in 0..iterations {
                ping_pong.blit(&mut cmd, blur);
                ping_pong.blit(&mut cmd, blur);
            }
            assert_eq!(ping_pong.current(), a);
            assert_eq!(cmd.blit_count(), 2 * iterations);
        }
    }

    #[test]
    fn test_ping_pong_alternates() {
        let mut textures: SlotMap<TextureId, ()> = SlotMap::with_key();
        let a = textures.insert(());
        let b = textures.insert(());

        let mut ping_pong = PingPong::new(a, b);
        assert_eq!((ping_pong.current(), ping_pong.other()), (a, b));
        ping_pong.swap();
        assert_eq!((ping_pong.current(), ping_pong.other()), (b, a));
        assert!(!ping_pong.is_first());
    }

    #[test]
    fn test_blur_direction_values() {
        assert_eq!(BlurDirection::Horizontal.as_int(), 0);
        assert_eq!(BlurDirection::Vertical.as_int(), 1);
    }
}
