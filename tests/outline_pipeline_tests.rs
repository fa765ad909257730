//! Outline Pipeline Tests
//!
//! End-to-end frames on the software backend:
//! - Pass scheduling (stages, insertion order, non-game cameras)
//! - Blit sequence and ping-pong parity
//! - Allocate-if-needed behavior across frames and resizes
//! - Visual results (halo outside, untouched interior, occlusion)
//! - Degraded configurations (missing shaders, missing identification)
//! - Teardown

use glam::Vec4;

use myth_outlines::backend::{ScreenRect, SoftwareBackend, SoftwareStats};
use myth_outlines::core::{
    CommandBuffer, MaterialProperties, RenderBackend, TextureDesc, TextureFormat, TextureId,
};
use myth_outlines::errors::OutlineError;
use myth_outlines::graph::{
    CameraData, CameraTargets, CameraType, CullResults, ExecuteContext, FramePassList,
    RenderNode, RenderStage, VisibleRenderer,
};
use myth_outlines::passes::{BlurCompositeMaterials, BlurCompositePass, BlurDirection, IdentificationPass};
use myth_outlines::shaders::{
    BLUR_DIRECTION_PROPERTY, BLUR_SHADER, COPY_IDENTIFICATION_SHADER, IDENTIFICATION_SHADER,
    MASK_SHADER, ShaderLibrary,
};
use myth_outlines::{LayerMask, OutlineFeature, OutlineSettings};

const OUTLINE_LAYER: u8 = 3;
const BACKGROUND: Vec4 = Vec4::new(0.1, 0.1, 0.1, 1.0);
const RED: Vec4 = Vec4::new(1.0, 0.0, 0.0, 1.0);

// ============================================================================
// Harness
// ============================================================================

struct Frame {
    backend: SoftwareBackend,
    camera: CameraData,
    cull: CullResults,
}

impl Frame {
    fn new(width: u32, height: u32) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut backend = SoftwareBackend::new();
        let desc = TextureDesc::color(width, height, TextureFormat::Rgba8Unorm);
        let color = backend.import_texture(desc, "Camera Color", BACKGROUND);
        // Reverse-Z: a cleared depth buffer holds the far plane at 0.
        let depth = backend.import_depth(width, height, 0.0);
        let camera = CameraData::game(
            desc,
            CameraTargets {
                color,
                depth: Some(depth),
            },
        );
        Self {
            backend,
            camera,
            cull: CullResults::new(),
        }
    }

    fn add(&mut self, rect: ScreenRect, layer: u8) {
        let id = self.backend.add_renderer(rect);
        self.cull.push(VisibleRenderer::new(id, layer));
    }

    fn color(&self) -> TextureId {
        self.camera.targets.color
    }

    fn camera_pixels(&self) -> Vec<Vec4> {
        self.backend
            .pixels(self.color())
            .map(<[Vec4]>::to_vec)
            .unwrap_or_default()
    }

    fn render(&mut self, feature: &mut OutlineFeature) -> myth_outlines::Result<CommandBuffer> {
        let mut passes = FramePassList::new();
        feature.add_render_passes(&self.camera, &mut passes);
        passes.execute(&mut self.backend, &self.camera, &self.cull)
    }
}

fn outlined(settings: OutlineSettings, frame: &mut Frame) -> OutlineFeature {
    let mut feature = OutlineFeature::new(settings);
    feature.create(&mut frame.backend);
    feature
}

fn default_settings() -> OutlineSettings {
    OutlineSettings::new(LayerMask::from_layer(OUTLINE_LAYER))
}

/// Centered 8x8 red square on the outline layer, in a 64x64 frame.
fn square_frame() -> Frame {
    let mut frame = Frame::new(64, 64);
    frame.add(ScreenRect::new(28, 28, 8, 8, RED), OUTLINE_LAYER);
    frame
}

// ============================================================================
// Scheduling
// ============================================================================

struct StageMarker {
    stage: RenderStage,
}

impl RenderNode for StageMarker {
    fn name(&self) -> &str {
        self.stage.name()
    }

    fn stage(&self) -> RenderStage {
        self.stage
    }

    fn run(&self, _ctx: &mut ExecuteContext, _cmd: &mut CommandBuffer) {}
}

#[test]
fn passes_run_at_their_injection_points() {
    let mut frame = square_frame();
    let mut feature = outlined(default_settings(), &mut frame);

    let mut post = StageMarker {
        stage: RenderStage::PostProcessing,
    };
    let mut overlay = StageMarker {
        stage: RenderStage::Overlay,
    };
    let mut opaque = StageMarker {
        stage: RenderStage::Opaque,
    };

    let mut passes = FramePassList::new();
    passes.add_node(&mut overlay);
    passes.add_node(&mut post);
    feature.add_render_passes(&frame.camera, &mut passes);
    passes.add_node(&mut opaque);

    assert!(passes.has_stage(RenderStage::AfterTransparents));
    assert!(passes.has_stage(RenderStage::AfterPostProcessing));
    assert_eq!(
        passes.execution_order(),
        vec![
            RenderStage::Opaque.name().to_string(),
            IdentificationPass::NAME.to_string(),
            RenderStage::PostProcessing.name().to_string(),
            BlurCompositePass::NAME.to_string(),
            RenderStage::Overlay.name().to_string(),
        ]
    );
}

#[test]
fn non_game_cameras_are_skipped() {
    for camera_type in [
        CameraType::SceneView,
        CameraType::Preview,
        CameraType::Reflection,
        CameraType::VR,
    ] {
        let mut frame = square_frame();
        frame.camera = frame.camera.with_type(camera_type);
        let mut feature = outlined(default_settings(), &mut frame);
        let before = frame.camera_pixels();

        let mut passes = FramePassList::new();
        feature.add_render_passes(&frame.camera, &mut passes);
        assert_eq!(passes.node_count(), 0, "{camera_type:?} enqueued passes");

        let cmd = passes
            .execute(&mut frame.backend, &frame.camera, &frame.cull)
            .unwrap();
        assert!(cmd.is_empty());
        assert_eq!(frame.backend.stats().texel_writes(), 0);
        assert_eq!(frame.backend.live_textures(), 0);
        assert_eq!(frame.camera_pixels(), before);
    }
}

// ============================================================================
// Command sequence
// ============================================================================

#[test]
fn blit_count_is_save_extract_pairs_mask_composite() {
    for iterations in [1, 4, 10] {
        let mut frame = square_frame();
        let mut feature = outlined(default_settings().with_blur_iterations(iterations), &mut frame);

        let cmd = frame.render(&mut feature).unwrap();

        let expected = 2 * iterations as usize + 4;
        assert_eq!(cmd.blit_count(), expected, "iterations = {iterations}");
        assert_eq!(frame.backend.stats().blits, expected);
        assert_eq!(cmd.draw_count(), 1);
        assert_eq!(frame.backend.stats().renderers_drawn, 1);
    }
}

#[test]
fn blur_alternates_vertical_then_horizontal() {
    use myth_outlines::core::RenderCommand;

    let mut frame = square_frame();
    let mut feature = outlined(default_settings().with_blur_iterations(3), &mut frame);
    let cmd = frame.render(&mut feature).unwrap();

    let materials = feature.materials();
    let (vertical, horizontal) = (
        materials.vertical_blur.unwrap(),
        materials.horizontal_blur.unwrap(),
    );
    let (work_a, work_b) = {
        let (a, b) = feature.blur_composite_pass().unwrap().work_targets().unwrap();
        (a.id, b.id)
    };

    let blur_blits: Vec<_> = cmd
        .commands()
        .iter()
        .filter_map(|c| match c {
            RenderCommand::Blit {
                source,
                destination,
                material: Some(pass),
            } if pass.material == vertical || pass.material == horizontal => {
                Some((*source, *destination, pass.material))
            }
            _ => None,
        })
        .collect();

    assert_eq!(blur_blits.len(), 6);
    for (i, (source, destination, material)) in blur_blits.iter().enumerate() {
        let expected_material = if i % 2 == 0 { vertical } else { horizontal };
        let (expected_source, expected_destination) = if i % 2 == 0 {
            (work_a, work_b)
        } else {
            (work_b, work_a)
        };
        assert_eq!(*material, expected_material, "blit {i}");
        assert_eq!((*source, *destination), (expected_source, expected_destination), "blit {i}");
    }

    let props = frame.backend.material_properties(vertical).unwrap();
    assert_eq!(
        props.int(BLUR_DIRECTION_PROPERTY),
        Some(BlurDirection::Vertical.as_int())
    );
}

#[test]
fn composite_writes_camera_color_last() {
    use myth_outlines::core::RenderCommand;

    let mut frame = square_frame();
    let mut feature = outlined(default_settings(), &mut frame);
    let cmd = frame.render(&mut feature).unwrap();

    let last_blit = cmd
        .commands()
        .iter()
        .rev()
        .find_map(|c| match c {
            RenderCommand::Blit {
                source,
                destination,
                material,
            } => Some((*source, *destination, *material)),
            _ => None,
        })
        .unwrap();

    let mask = feature.blur_composite_pass().unwrap().mask_target().unwrap().id;
    assert_eq!(last_blit, (mask, frame.color(), None));
}

// ============================================================================
// Allocation
// ============================================================================

#[test]
fn buffers_are_allocated_once() {
    let mut frame = square_frame();
    let mut feature = outlined(default_settings(), &mut frame);

    frame.render(&mut feature).unwrap();
    let first = frame.backend.stats();
    assert_eq!(first.textures_created, 5);
    assert_eq!(
        frame.backend.live_texture_labels(),
        vec![
            "_OutlineIdentification",
            "_OutlineMask",
            "_OutlineSavedCameraColor",
            "_OutlineWorkA",
            "_OutlineWorkB",
        ]
    );

    frame.render(&mut feature).unwrap();
    frame.render(&mut feature).unwrap();
    let after = frame.backend.stats();
    assert_eq!(after.textures_created, 5);
    assert_eq!(after.textures_released, 0);
}

#[test]
fn resize_reallocates_every_buffer() {
    let mut frame = square_frame();
    let mut feature = outlined(default_settings(), &mut frame);
    frame.render(&mut feature).unwrap();

    let resized = TextureDesc::color(128, 96, TextureFormat::Rgba8Unorm);
    let color = frame.backend.import_texture(resized, "Camera Color 2", BACKGROUND);
    let depth = frame.backend.import_depth(128, 96, 0.0);
    frame.camera = CameraData::game(
        resized,
        CameraTargets {
            color,
            depth: Some(depth),
        },
    );
    frame.render(&mut feature).unwrap();

    let stats = frame.backend.stats();
    assert_eq!(stats.textures_created, 10);
    assert_eq!(stats.textures_released, 5);
    assert_eq!(frame.backend.live_textures(), 5);

    let target = feature.identification_pass().unwrap().target().unwrap();
    assert_eq!((target.desc.width, target.desc.height), (128, 96));
}

#[test]
fn work_buffers_follow_downsample() {
    for (downsample, expected) in [(1, (63, 37)), (2, (31, 18)), (3, (21, 12)), (4, (15, 9))] {
        let mut frame = Frame::new(63, 37);
        let mut feature = outlined(default_settings().with_downsample(downsample), &mut frame);
        frame.render(&mut feature).unwrap();

        let pass = feature.blur_composite_pass().unwrap();
        let (a, b) = pass.work_targets().unwrap();
        assert_eq!((a.desc.width, a.desc.height), expected, "downsample = {downsample}");
        assert_eq!(a.desc, b.desc);

        let mask = pass.mask_target().unwrap();
        assert_eq!((mask.desc.width, mask.desc.height), (63, 37));
    }
}

#[test]
fn settings_changes_apply_next_frame() {
    let mut frame = square_frame();
    let mut feature = outlined(default_settings(), &mut frame);
    frame.render(&mut feature).unwrap();

    feature.settings_mut().set_downsample(4);
    feature.settings_mut().set_blur_iterations(2);
    let cmd = frame.render(&mut feature).unwrap();

    assert_eq!(cmd.blit_count(), 8);
    // Only the two work buffers change size.
    assert_eq!(frame.backend.stats().textures_created, 7);
    assert_eq!(frame.backend.stats().textures_released, 2);
}

#[test]
fn allocation_failure_propagates() {
    let mut frame = square_frame();
    let mut feature = outlined(default_settings(), &mut frame);
    frame.backend.reject_format(TextureFormat::Rgba8Unorm);
    let before = frame.camera_pixels();

    let result = frame.render(&mut feature);
    assert!(matches!(result, Err(OutlineError::UnsupportedFormat { .. })));
    assert_eq!(frame.backend.stats().submits, 0);
    assert_eq!(frame.camera_pixels(), before);
}

// ============================================================================
// Visual results
// ============================================================================

#[test]
fn halo_appears_outside_objects_only() {
    let mut frame = square_frame();
    let mut feature = outlined(
        default_settings().with_opacity(1.0).with_blur_iterations(1),
        &mut frame,
    );
    frame.render(&mut feature).unwrap();

    let color = frame.color();
    let inside = frame.backend.pixel(color, 32, 32).unwrap();
    let edge = frame.backend.pixel(color, 27, 32).unwrap();
    let far = frame.backend.pixel(color, 0, 0).unwrap();

    assert_eq!(inside, BACKGROUND, "interior must keep the camera color");
    assert_eq!(far, BACKGROUND, "halo must stay local");
    assert!(edge.x > BACKGROUND.x + 0.05, "no halo at the edge: {edge}");
    assert!(edge.y < BACKGROUND.y + 1e-6, "halo is not tinted red: {edge}");
    assert_eq!(edge.w, BACKGROUND.w);
}

#[test]
fn zero_opacity_leaves_camera_untouched() {
    let mut frame = square_frame();
    let mut feature = outlined(default_settings().with_opacity(0.0), &mut frame);
    let before = frame.camera_pixels();

    frame.render(&mut feature).unwrap();

    assert_eq!(frame.camera_pixels(), before);
    assert!(frame.backend.stats().blits > 0);
}

#[test]
fn unmatched_layers_leave_camera_untouched() {
    let mut frame = Frame::new(64, 64);
    frame.add(ScreenRect::new(28, 28, 8, 8, RED), OUTLINE_LAYER + 1);
    let mut feature = outlined(default_settings().with_opacity(1.0), &mut frame);
    let before = frame.camera_pixels();

    let cmd = frame.render(&mut feature).unwrap();

    assert_eq!(cmd.draw_count(), 0);
    assert_eq!(frame.camera_pixels(), before);
}

#[test]
fn occluded_objects_get_no_outline() {
    let mut frame = Frame::new(64, 64);
    // Nearer occluder (reverse-Z: larger is nearer) covering the object.
    let depth = frame.camera.targets.depth.unwrap();
    frame
        .backend
        .draw_depth(depth, &ScreenRect::new(20, 20, 24, 24, Vec4::ONE).with_depth(0.9))
        .unwrap();
    frame.add(ScreenRect::new(28, 28, 8, 8, RED).with_depth(0.5), OUTLINE_LAYER);

    let mut feature = outlined(default_settings().with_opacity(1.0), &mut frame);
    let before = frame.camera_pixels();
    frame.render(&mut feature).unwrap();

    assert_eq!(frame.backend.stats().renderers_drawn, 1);
    assert_eq!(frame.camera_pixels(), before);
}

// ============================================================================
// Degraded configurations
// ============================================================================

#[test]
fn missing_shaders_disable_the_feature() {
    let mut frame = square_frame();
    let mut feature = OutlineFeature::with_library(default_settings(), ShaderLibrary::empty());
    feature.create(&mut frame.backend);
    let before = frame.camera_pixels();

    assert!(feature.is_created());
    assert_eq!(feature.materials().count(), 0);

    let cmd = frame.render(&mut feature).unwrap();
    assert!(cmd.is_empty());
    assert_eq!(frame.backend.live_textures(), 0);
    assert_eq!(frame.camera_pixels(), before);
}

#[test]
fn refused_mask_material_skips_composite_only() {
    let mut frame = square_frame();
    frame.backend.reject_shader(MASK_SHADER);
    let mut feature = outlined(default_settings(), &mut frame);
    let before = frame.camera_pixels();

    assert!(feature.materials().mask.is_none());
    assert!(feature.materials().identification.is_some());

    let cmd = frame.render(&mut feature).unwrap();
    assert_eq!(cmd.draw_count(), 1);
    assert_eq!(cmd.blit_count(), 0);
    assert_eq!(frame.backend.live_texture_labels(), vec!["_OutlineIdentification"]);
    assert_eq!(frame.camera_pixels(), before);
}

#[test]
fn refused_identification_material_disables_blur_and_composite() {
    let mut frame = square_frame();
    frame.backend.reject_shader(IDENTIFICATION_SHADER);
    let mut feature = outlined(default_settings(), &mut frame);
    let before = frame.camera_pixels();

    assert!(feature.materials().identification.is_none());
    assert!(feature.materials().blur_composite().is_some());
    assert!(
        feature
            .blur_composite_pass()
            .is_some_and(|pass| pass.materials().is_none())
    );

    for _ in 0..3 {
        let cmd = frame.render(&mut feature).unwrap();
        assert!(cmd.is_empty());
    }
    assert_eq!(frame.backend.live_textures(), 0);
    assert_eq!(frame.backend.stats().textures_created, 0);
    assert_eq!(frame.camera_pixels(), before);
}

// ============================================================================
// Pass-level
// ============================================================================

fn pass_materials(backend: &mut SoftwareBackend) -> (myth_outlines::core::MaterialId, BlurCompositeMaterials) {
    let mut library = ShaderLibrary::new();
    let none = MaterialProperties::new();
    let mut build = |name: &str, props: &MaterialProperties| {
        let program = library.find(name).unwrap();
        backend.create_material(&program, props).unwrap()
    };

    let identification = build(IDENTIFICATION_SHADER, &none);
    let materials = BlurCompositeMaterials {
        copy_identification: build(COPY_IDENTIFICATION_SHADER, &none),
        vertical_blur: build(
            BLUR_SHADER,
            &MaterialProperties::new()
                .with_int(BLUR_DIRECTION_PROPERTY, BlurDirection::Vertical.as_int()),
        ),
        horizontal_blur: build(
            BLUR_SHADER,
            &MaterialProperties::new()
                .with_int(BLUR_DIRECTION_PROPERTY, BlurDirection::Horizontal.as_int()),
        ),
        mask: build(MASK_SHADER, &none),
    };
    (identification, materials)
}

#[test]
fn zero_iterations_are_deterministic() {
    let mut results = Vec::new();
    for _ in 0..2 {
        let mut frame = square_frame();
        let (identification_material, materials) = pass_materials(&mut frame.backend);
        let settings = default_settings().with_opacity(1.0);

        let mut identification = IdentificationPass::new(Some(identification_material));
        identification.setup(settings.layer_mask, frame.camera.targets);
        let mut blur = BlurCompositePass::new(Some(materials));
        blur.setup(&settings, frame.camera.targets);
        blur.set_blur_iterations(0);

        let mut passes = FramePassList::new();
        passes.add_node(&mut identification);
        passes.add_node(&mut blur);
        let cmd = passes
            .execute(&mut frame.backend, &frame.camera, &frame.cull)
            .unwrap();

        assert_eq!(cmd.blit_count(), 4);
        results.push(frame.camera_pixels());
    }
    assert_eq!(results[0], results[1]);
}

#[test]
fn composite_without_identification_is_skipped() {
    let mut frame = square_frame();
    let (_, materials) = pass_materials(&mut frame.backend);
    let before = frame.camera_pixels();

    let mut blur = BlurCompositePass::new(Some(materials));
    blur.setup(&default_settings(), frame.camera.targets);

    let mut passes = FramePassList::new();
    passes.add_node(&mut blur);
    let cmd = passes
        .execute(&mut frame.backend, &frame.camera, &frame.cull)
        .unwrap();

    assert!(cmd.is_empty());
    assert_eq!(frame.backend.stats().texel_writes(), 0);
    assert_eq!(frame.camera_pixels(), before);
}

// ============================================================================
// Teardown
// ============================================================================

#[test]
fn dispose_releases_everything_and_is_idempotent() {
    let mut frame = square_frame();
    let mut feature = outlined(default_settings(), &mut frame);
    frame.render(&mut feature).unwrap();

    assert_eq!(frame.backend.live_textures(), 5);
    assert_eq!(frame.backend.live_materials(), 5);

    feature.dispose(&mut frame.backend);
    assert_eq!(frame.backend.live_textures(), 0);
    assert_eq!(frame.backend.live_materials(), 0);
    assert!(!feature.is_created());

    feature.dispose(&mut frame.backend);
    let stats = frame.backend.stats();
    assert_eq!(stats.textures_released, 5);
    assert_eq!(stats.materials_destroyed, 5);
}

#[test]
fn dispose_before_create_is_harmless() {
    let mut backend = SoftwareBackend::new();
    let mut feature = OutlineFeature::new(default_settings());
    feature.dispose(&mut backend);
    assert_eq!(backend.stats(), SoftwareStats::default());
}

#[test]
fn recreate_after_dispose_renders_again() {
    let mut frame = square_frame();
    let mut feature = outlined(default_settings(), &mut frame);
    frame.render(&mut feature).unwrap();
    feature.dispose(&mut frame.backend);

    feature.create(&mut frame.backend);
    let cmd = frame.render(&mut feature).unwrap();
    assert_eq!(cmd.draw_count(), 1);
    assert_eq!(frame.backend.live_textures(), 5);
}
