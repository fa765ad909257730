//! Outline frame benchmarks on the software backend.
//!
//! - `record`: pass scheduling + command recording only
//! - `frame`: full frame (prepare, record, execute) per blur iteration count

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use glam::Vec4;

use myth_outlines::prelude::*;

const WIDTH: u32 = 256;
const HEIGHT: u32 = 144;

fn setup(settings: OutlineSettings) -> (SoftwareBackend, CameraData, CullResults, OutlineFeature) {
    let mut backend = SoftwareBackend::new();
    let target = TextureDesc::color(WIDTH, HEIGHT, TextureFormat::Rgba8Unorm);
    let color = backend.import_texture(target, "Camera Color", Vec4::new(0.1, 0.1, 0.1, 1.0));
    let depth = backend.import_depth(WIDTH, HEIGHT, 0.0);
    let camera = CameraData::game(
        target,
        CameraTargets {
            color,
            depth: Some(depth),
        },
    );

    let mut cull = CullResults::new();
    for i in 0..8 {
        let rect = ScreenRect::new(10 + i * 30, 20 + (i % 3) * 30, 20, 40, Vec4::new(1.0, 0.4, 0.1, 1.0));
        let id = backend.add_renderer(rect);
        cull.push(VisibleRenderer::new(id, (i % 2) as u8));
    }

    let mut feature = OutlineFeature::new(settings);
    feature.create(&mut backend);
    (backend, camera, cull, feature)
}

fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame");
    group.sample_size(20);

    for iterations in [1, 4, 10] {
        let settings = OutlineSettings::new(LayerMask::from_layer(0)).with_blur_iterations(iterations);
        let (mut backend, camera, cull, mut feature) = setup(settings);

        group.bench_with_input(BenchmarkId::from_parameter(iterations), &iterations, |b, _| {
            b.iter(|| {
                let mut passes = FramePassList::new();
                feature.add_render_passes(&camera, &mut passes);
                let commands = passes.execute(&mut backend, &camera, &cull);
                black_box(commands.map(|c| c.len()).unwrap_or_default())
            });
        });

        feature.dispose(&mut backend);
    }
    group.finish();
}

fn bench_record(c: &mut Criterion) {
    use myth_outlines::core::CommandBuffer;
    use myth_outlines::graph::{ExecuteContext, FrameResources, RenderNode};

    let settings = OutlineSettings::new(LayerMask::from_layer(0)).with_blur_iterations(10);
    let (mut backend, camera, cull, mut feature) = setup(settings);

    // Allocate once through a real frame, then only re-record.
    {
        let mut passes = FramePassList::new();
        feature.add_render_passes(&camera, &mut passes);
        if passes.execute(&mut backend, &camera, &cull).is_err() {
            return;
        }
    }

    let (Some(identification), Some(blur)) =
        (feature.identification_pass(), feature.blur_composite_pass())
    else {
        return;
    };

    c.bench_function("record", |b| {
        b.iter(|| {
            let mut resources = FrameResources::new();
            let mut cmd = CommandBuffer::new("Bench");
            let mut exec = ExecuteContext {
                camera: &camera,
                cull_results: &cull,
                resources: &mut resources,
            };
            identification.run(&mut exec, &mut cmd);
            blur.run(&mut exec, &mut cmd);
            black_box(cmd.len())
        });
    });
}

criterion_group!(benches, bench_frame, bench_record);
criterion_main!(benches);
