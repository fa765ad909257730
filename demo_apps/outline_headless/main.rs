//! Headless Outline Example
//!
//! Draws a few flat shapes into a camera color buffer, outlines the ones on
//! the outline layer and writes the result to a PNG.
//!
//! Usage:
//! - `outline_headless [output.png] [settings.json]`
//! - `RUST_LOG=debug` shows buffer allocation and pass scheduling

use anyhow::Context;
use glam::Vec4;

use myth_outlines::prelude::*;

const WIDTH: u32 = 320;
const HEIGHT: u32 = 200;
const OUTLINE_LAYER: u8 = 3;
const BACKGROUND: Vec4 = Vec4::new(0.12, 0.13, 0.16, 1.0);

struct Shape {
    rect: ScreenRect,
    layer: u8,
}

fn shapes() -> [Shape; 3] {
    [
        Shape {
            rect: ScreenRect::new(40, 60, 60, 80, Vec4::new(1.0, 0.55, 0.1, 1.0)),
            layer: OUTLINE_LAYER,
        },
        Shape {
            rect: ScreenRect::new(140, 40, 50, 50, Vec4::new(0.2, 0.8, 1.0, 1.0)).with_depth(0.6),
            layer: OUTLINE_LAYER,
        },
        // Not on the outline layer, and in front of the second shape.
        Shape {
            rect: ScreenRect::new(165, 70, 100, 70, Vec4::new(0.5, 0.5, 0.5, 1.0)).with_depth(0.8),
            layer: 0,
        },
    ]
}

fn load_settings(path: Option<&str>) -> anyhow::Result<OutlineSettings> {
    let Some(path) = path else {
        return Ok(OutlineSettings::new(LayerMask::from_layer(OUTLINE_LAYER)).with_opacity(1.0));
    };
    let json = std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    Ok(OutlineSettings::from_json(&json)?)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let output = args.first().map_or("outline.png", String::as_str);
    let settings = load_settings(args.get(1).map(String::as_str))?;
    log::info!("Outline settings: {settings:?}");

    let mut backend = SoftwareBackend::new();
    let target = TextureDesc::color(WIDTH, HEIGHT, TextureFormat::Rgba8Unorm);
    let color = backend.import_texture(target, "Camera Color", BACKGROUND);
    let depth = backend.import_depth(WIDTH, HEIGHT, 0.0);
    let camera = CameraData::game(
        target,
        CameraTargets {
            color,
            depth: Some(depth),
        },
    );

    // Stand-in for the host's opaque pass: color and depth of every shape,
    // drawn back to front.
    let mut cull = CullResults::new();
    let mut shapes = shapes();
    shapes.sort_by(|a, b| a.rect.depth.total_cmp(&b.rect.depth));
    for shape in &shapes {
        let mut pixels = backend
            .pixels(color)
            .context("camera color missing")?
            .to_vec();
        for y in shape.rect.min.y..shape.rect.max.y {
            for x in shape.rect.min.x..shape.rect.max.x {
                pixels[(y * WIDTH + x) as usize] = shape.rect.color;
            }
        }
        backend.write_pixels(color, &pixels)?;
        backend.draw_depth(depth, &shape.rect)?;

        let id = backend.add_renderer(shape.rect);
        cull.push(VisibleRenderer::new(id, shape.layer));
    }

    let mut feature = OutlineFeature::new(settings);
    feature.create(&mut backend);

    let mut passes = FramePassList::new();
    feature.add_render_passes(&camera, &mut passes);
    log::info!("Frame passes: {:?}", passes.execution_order());
    let commands = passes.execute(&mut backend, &camera, &cull)?;
    log::info!(
        "Recorded {} commands ({} blits), backend stats: {:?}",
        commands.len(),
        commands.blit_count(),
        backend.stats()
    );

    let pixels = backend.pixels(color).context("camera color missing")?;
    let bytes: Vec<u8> = pixels
        .iter()
        .flat_map(|p| p.clamp(Vec4::ZERO, Vec4::ONE).to_array())
        .map(|c| (c * 255.0).round() as u8)
        .collect();
    image::save_buffer(output, &bytes, WIDTH, HEIGHT, image::ExtendedColorType::Rgba8)
        .with_context(|| format!("writing {output}"))?;
    log::info!("Wrote {output}");

    feature.dispose(&mut backend);
    Ok(())
}
