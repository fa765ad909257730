//! wgpu Backend
//!
//! Executes recorded outline commands on a `wgpu::Device`.
//!
//! # Command mapping
//!
//! | Command | wgpu |
//! |---------|------|
//! | `PushDebugGroup` / `PopDebugGroup` | `encoder.push_debug_group` / `pop_debug_group` |
//! | `SetRenderTarget` | remembered; its clear is folded into the next render pass, or flushed as an empty pass |
//! | `DrawRenderers` | one render pass over the bound target, one `draw_indexed` per mesh |
//! | `Blit` | one full-screen triangle pass; `source == destination` samples a scratch copy |
//! | `SetMaterial*` | CPU-side property update + `queue.write_buffer` of the params uniform |
//!
//! # Material layout
//!
//! Every full-screen program shares one bind group layout:
//!
//! ```text
//! @binding(0) source texture     (blit source)
//! @binding(1) linear sampler     (clamp-to-edge)
//! @binding(2) params uniform     floats: vec4<f32>, ints: vec4<i32>
//! @binding(3) aux texture 0      (1x1 black when unbound)
//! @binding(4) aux texture 1      (1x1 black when unbound)
//! ```
//!
//! Params uniforms are written with `queue.write_buffer`, which lands before
//! the submitted command buffer executes. Writing the same material twice
//! within one submit therefore keeps only the last value; the outline passes
//! write each material at most once per frame.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec4};
use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use wgpu::util::DeviceExt;

use crate::core::backend::RenderBackend;
use crate::core::commands::{CommandBuffer, RenderCommand};
use crate::core::material::{
    MATERIAL_PARAM_SLOTS, MaterialId, MaterialPass, MaterialProperties, PropertySlot,
    PropertyValue, ShaderKind, ShaderProgram,
};
use crate::core::texture::{ClearOp, TextureDesc, TextureFormat, TextureId};
use crate::core::RendererId;
use crate::errors::{OutlineError, Result};
use crate::shaders::{BLIT_SHADER, ShaderLibrary};

// ============================================================================
// GPU data
// ============================================================================

/// Vertex layout of identification meshes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct OutlineVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl OutlineVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x4];

    #[must_use]
    pub const fn new(position: [f32; 3], color: [f32; 4]) -> Self {
        Self { position, color }
    }

    fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
struct MaterialParams {
    floats: [f32; MATERIAL_PARAM_SLOTS],
    ints: [i32; MATERIAL_PARAM_SLOTS],
}

impl MaterialParams {
    fn pack(program: &ShaderProgram, properties: &MaterialProperties) -> Self {
        let mut params = Self::default();
        for (name, value) in properties.iter() {
            let Some(property) = program.property(name) else {
                continue;
            };
            match (property.slot, value) {
                (PropertySlot::Float(i), PropertyValue::Float(v)) => {
                    if let Some(slot) = params.floats.get_mut(usize::from(i)) {
                        *slot = v;
                    }
                }
                (PropertySlot::Int(i), PropertyValue::Int(v)) => {
                    if let Some(slot) = params.ints.get_mut(usize::from(i)) {
                        *slot = v;
                    }
                }
                _ => {}
            }
        }
        params
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct MatrixUniform {
    matrix: [[f32; 4]; 4],
}

impl From<Mat4> for MatrixUniform {
    fn from(m: Mat4) -> Self {
        Self {
            matrix: m.to_cols_array_2d(),
        }
    }
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    desc: TextureDesc,
    imported: bool,
}

struct GpuMaterial {
    program: ShaderProgram,
    properties: MaterialProperties,
    params: wgpu::Buffer,
}

struct GpuMesh {
    vertices: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
    model: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct PipelineKey {
    shader: u64,
    color_format: TextureFormat,
    depth_format: Option<TextureFormat>,
    depth_compare: wgpu::CompareFunction,
}

/// Render target bound by the last `SetRenderTarget`.
struct BoundTarget {
    color: TextureId,
    depth: Option<TextureId>,
    pending_clear: Option<ClearOp>,
}

// ============================================================================
// WgpuBackend
// ============================================================================

pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,

    textures: SlotMap<TextureId, GpuTexture>,
    materials: SlotMap<MaterialId, GpuMaterial>,
    meshes: SlotMap<RendererId, GpuMesh>,

    // === Layouts ===
    fullscreen_layout: wgpu::BindGroupLayout,
    fullscreen_pipeline_layout: wgpu::PipelineLayout,
    object_layout: wgpu::BindGroupLayout,
    geometry_pipeline_layout: wgpu::PipelineLayout,

    // === Shared resources ===
    sampler: wgpu::Sampler,
    camera_buffer: wgpu::Buffer,
    camera_bind_group: wgpu::BindGroup,
    fallback_view: wgpu::TextureView,
    blit_program: ShaderProgram,
    blit_params: wgpu::Buffer,
    scratch: Option<GpuTexture>,

    // === Caches ===
    modules: FxHashMap<u64, wgpu::ShaderModule>,
    pipelines: FxHashMap<PipelineKey, wgpu::RenderPipeline>,

    depth_compare: wgpu::CompareFunction,
}

impl WgpuBackend {
    /// Wraps an existing device.
    ///
    /// # Errors
    ///
    /// Fails if the internal blit program cannot be rendered.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Result<Self> {
        let blit_program = ShaderLibrary::new().find(BLIT_SHADER)?;

        let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let uniform_entry = |binding: u32, visibility: wgpu::ShaderStages| wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let fullscreen_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Outline Fullscreen Layout"),
            entries: &[
                // Binding 0: Source texture
                texture_entry(0),
                // Binding 1: Sampler
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                // Binding 2: Params
                uniform_entry(2, wgpu::ShaderStages::FRAGMENT),
                // Binding 3-4: Auxiliary textures
                texture_entry(3),
                texture_entry(4),
            ],
        });

        let camera_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Outline Camera Layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX)],
        });
        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Outline Object Layout"),
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX)],
        });

        let fullscreen_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Outline Fullscreen Pipeline Layout"),
            bind_group_layouts: &[Some(&fullscreen_layout)],
            immediate_size: 0,
        });
        let geometry_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Outline Geometry Pipeline Layout"),
            bind_group_layouts: &[Some(&camera_layout), Some(&object_layout)],
            immediate_size: 0,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Outline Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Outline Camera Uniforms"),
            contents: bytemuck::bytes_of(&MatrixUniform::from(Mat4::IDENTITY)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Outline Camera BindGroup"),
            layout: &camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let fallback = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Outline Fallback Texture"),
            size: wgpu::Extent3d {
                width: 1,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let fallback_view = fallback.create_view(&wgpu::TextureViewDescriptor::default());

        let blit_params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Outline Blit Params"),
            contents: bytemuck::bytes_of(&MaterialParams::default()),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let backend = Self {
            device,
            queue,
            textures: SlotMap::with_key(),
            materials: SlotMap::with_key(),
            meshes: SlotMap::with_key(),
            fullscreen_layout,
            fullscreen_pipeline_layout,
            object_layout,
            geometry_pipeline_layout,
            sampler,
            camera_buffer,
            camera_bind_group,
            fallback_view,
            blit_program,
            blit_params,
            scratch: None,
            modules: FxHashMap::default(),
            pipelines: FxHashMap::default(),
            depth_compare: wgpu::CompareFunction::GreaterEqual,
        };

        // The fallback texture starts undefined; clear it to black once.
        let fallback_view = backend.fallback_view.clone();
        backend.clear_view(&fallback_view, "Outline Fallback Clear");

        Ok(backend)
    }

    /// Creates a device without a surface.
    ///
    /// # Errors
    ///
    /// `AdapterRequestFailed` when no adapter is available,
    /// `DeviceCreateFailed` when the device request is refused.
    pub async fn new_headless() -> Result<Self> {
        let instance = wgpu::Instance::default();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| OutlineError::AdapterRequestFailed(e.to_string()))?;

        log::debug!("Outline headless adapter: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Outline Device"),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await?;

        Self::new(device, queue)
    }

    /// Blocking variant of [`new_headless`](Self::new_headless).
    pub fn new_headless_blocking() -> Result<Self> {
        pollster::block_on(Self::new_headless())
    }

    #[inline]
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[inline]
    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn set_depth_compare(&mut self, compare: wgpu::CompareFunction) {
        self.depth_compare = compare;
    }

    // === Host resources ===

    /// Registers a host-owned texture (camera color or depth).
    ///
    /// Color textures need `TEXTURE_BINDING | RENDER_ATTACHMENT`, plus
    /// `COPY_SRC` when they are blitted in place.
    pub fn import_texture(&mut self, texture: wgpu::Texture) -> TextureId {
        let size = texture.size();
        let format = texture.format();
        let desc = TextureDesc {
            width: size.width,
            height: size.height,
            format,
            sample_count: texture.sample_count(),
            depth_bits: if format.is_depth_stencil_format() { 32 } else { 0 },
        };
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.textures.insert(GpuTexture {
            texture,
            view,
            desc,
            imported: true,
        })
    }

    #[must_use]
    pub fn texture(&self, id: TextureId) -> Option<&wgpu::Texture> {
        self.textures.get(id).map(|t| &t.texture)
    }

    /// Uploads the camera view-projection used by geometry programs.
    pub fn set_view_projection(&mut self, view_projection: Mat4) {
        self.queue.write_buffer(
            &self.camera_buffer,
            0,
            bytemuck::bytes_of(&MatrixUniform::from(view_projection)),
        );
    }

    /// Uploads a mesh drawable by `DrawRenderers`.
    pub fn add_mesh(&mut self, vertices: &[OutlineVertex], indices: &[u32], model: Mat4) -> RendererId {
        let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Outline Mesh Vertices"),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Outline Mesh Indices"),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let model_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Outline Mesh Model"),
            contents: bytemuck::bytes_of(&MatrixUniform::from(model)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Outline Mesh BindGroup"),
            layout: &self.object_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: model_buffer.as_entire_binding(),
            }],
        });

        self.meshes.insert(GpuMesh {
            vertices: vertex_buffer,
            indices: index_buffer,
            index_count: indices.len() as u32,
            model: model_buffer,
            bind_group,
        })
    }

    pub fn set_mesh_transform(&mut self, id: RendererId, model: Mat4) {
        if let Some(mesh) = self.meshes.get(id) {
            self.queue
                .write_buffer(&mesh.model, 0, bytemuck::bytes_of(&MatrixUniform::from(model)));
        }
    }

    pub fn remove_mesh(&mut self, id: RendererId) -> bool {
        self.meshes.remove(id).is_some()
    }

    // =========================================================================
    // Pipelines
    // =========================================================================

    fn module(&mut self, program: &ShaderProgram) -> wgpu::ShaderModule {
        self.modules
            .entry(program.source_hash())
            .or_insert_with(|| {
                log::debug!("Compiling shader module `{}`", program.name());
                self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(program.name()),
                    source: wgpu::ShaderSource::Wgsl(program.source().to_owned().into()),
                })
            })
            .clone()
    }

    fn pipeline(
        &mut self,
        program: &ShaderProgram,
        color_format: TextureFormat,
        depth_format: Option<TextureFormat>,
    ) -> wgpu::RenderPipeline {
        let key = PipelineKey {
            shader: program.source_hash(),
            color_format,
            depth_format,
            depth_compare: self.depth_compare,
        };
        if let Some(pipeline) = self.pipelines.get(&key) {
            return pipeline.clone();
        }

        let module = self.module(program);
        let vertex_buffers = [OutlineVertex::layout()];
        let (layout, buffers): (&wgpu::PipelineLayout, &[wgpu::VertexBufferLayout]) =
            match program.kind() {
                ShaderKind::Fullscreen => (&self.fullscreen_pipeline_layout, &[]),
                ShaderKind::Geometry => (&self.geometry_pipeline_layout, &vertex_buffers),
            };

        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(program.name()),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: color_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            // Depth is tested, never written.
            depth_stencil: depth_format.map(|format| wgpu::DepthStencilState {
                format,
                depth_write_enabled: Some(false),
                depth_compare: Some(key.depth_compare),
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        log::debug!(
            "Created pipeline `{}` for {color_format:?} / {depth_format:?}",
            program.name()
        );
        self.pipelines.insert(key, pipeline.clone());
        pipeline
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    fn view(&self, id: TextureId, usage: &'static str) -> Result<(wgpu::TextureView, TextureDesc)> {
        self.textures
            .get(id)
            .map(|t| (t.view.clone(), t.desc))
            .ok_or(OutlineError::UnknownTexture(usage))
    }

    fn clear_view(&self, view: &wgpu::TextureView, label: &str) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                ..Default::default()
            });
        }
        self.queue.submit(Some(encoder.finish()));
    }

    /// Begins a render pass on `target`, consuming its pending clear.
    fn begin_target_pass<'e>(
        &self,
        encoder: &'e mut wgpu::CommandEncoder,
        target: &mut BoundTarget,
        label: &str,
    ) -> Result<wgpu::RenderPass<'e>> {
        let (color_view, _) = self.view(target.color, "render target color")?;
        let depth_view = match target.depth {
            Some(id) => Some(self.view(id, "render target depth")?.0),
            None => None,
        };
        let clear = target.pending_clear.take().unwrap_or(ClearOp::NONE);

        let color_load = if clear.clears_color() {
            wgpu::LoadOp::Clear(to_wgpu_color(clear.color))
        } else {
            wgpu::LoadOp::Load
        };
        let depth_load = if clear.clears_depth() {
            wgpu::LoadOp::Clear(clear.depth)
        } else {
            wgpu::LoadOp::Load
        };

        Ok(encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: color_load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: depth_view.as_ref().map(|view| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            ..Default::default()
        }))
    }

    /// Emits an empty pass for a target whose clear was never consumed.
    fn flush_clear(&self, encoder: &mut wgpu::CommandEncoder, target: Option<&mut BoundTarget>) -> Result<()> {
        if let Some(target) = target
            && target.pending_clear.is_some()
        {
            let _pass = self.begin_target_pass(encoder, target, "Outline Clear")?;
        }
        Ok(())
    }

    fn encode_draw(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        target: &mut BoundTarget,
        renderers: &[RendererId],
        material: MaterialPass,
    ) -> Result<()> {
        let program = self
            .materials
            .get(material.material)
            .ok_or(OutlineError::UnknownMaterial)?
            .program
            .clone();
        if program.kind() != ShaderKind::Geometry {
            return Err(OutlineError::MaterialCreation {
                shader: program.name().to_string(),
                reason: "not a geometry program".to_string(),
            });
        }

        let (_, color_desc) = self.view(target.color, "render target color")?;
        let depth_format = match target.depth {
            Some(id) => Some(self.view(id, "render target depth")?.1.format),
            None => None,
        };
        let pipeline = self.pipeline(&program, color_desc.format, depth_format);

        let mut pass = self.begin_target_pass(encoder, target, program.name())?;
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &self.camera_bind_group, &[]);
        for id in renderers {
            let Some(mesh) = self.meshes.get(*id) else {
                log::warn!("Draw references a removed mesh, skipping it");
                continue;
            };
            pass.set_bind_group(1, &mesh.bind_group, &[]);
            pass.set_vertex_buffer(0, mesh.vertices.slice(..));
            pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
        Ok(())
    }

    /// Copies `source` into the scratch texture and returns its view.
    fn copy_to_scratch(&mut self, encoder: &mut wgpu::CommandEncoder, source: TextureId) -> Result<wgpu::TextureView> {
        let (_, desc) = self.view(source, "in-place blit")?;
        if self.scratch.as_ref().is_none_or(|s| s.desc != desc) {
            let texture = self.create_gpu_texture(&desc, "Outline Blit Scratch");
            self.scratch = Some(texture);
        }
        let (Some(scratch), Some(src)) = (self.scratch.as_ref(), self.textures.get(source)) else {
            return Err(OutlineError::UnknownTexture("in-place blit"));
        };

        encoder.copy_texture_to_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &src.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyTextureInfo {
                texture: &scratch.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(scratch.view.clone())
    }

    fn aux_view(&self, program: &ShaderProgram, properties: &MaterialProperties, slot: u8) -> Result<wgpu::TextureView> {
        let bound = program
            .properties()
            .iter()
            .find(|p| p.slot == PropertySlot::Texture(slot))
            .and_then(|p| properties.texture(p.name));
        match bound {
            Some(id) => Ok(self.view(id, "material texture")?.0),
            None => Ok(self.fallback_view.clone()),
        }
    }

    fn encode_blit(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        source: TextureId,
        destination: TextureId,
        material: Option<MaterialPass>,
    ) -> Result<()> {
        let (program, properties, params) = match material {
            Some(pass) => {
                let material = self
                    .materials
                    .get(pass.material)
                    .ok_or(OutlineError::UnknownMaterial)?;
                (
                    material.program.clone(),
                    material.properties.clone(),
                    material.params.clone(),
                )
            }
            None => (
                self.blit_program.clone(),
                MaterialProperties::new(),
                self.blit_params.clone(),
            ),
        };
        if program.kind() != ShaderKind::Fullscreen {
            return Err(OutlineError::MaterialCreation {
                shader: program.name().to_string(),
                reason: "geometry program used for a blit".to_string(),
            });
        }

        let (dest_view, dest_desc) = self.view(destination, "blit destination")?;
        let source_view = if source == destination {
            self.copy_to_scratch(encoder, source)?
        } else {
            self.view(source, "blit source")?.0
        };
        let aux0 = self.aux_view(&program, &properties, 0)?;
        let aux1 = self.aux_view(&program, &properties, 1)?;
        let pipeline = self.pipeline(&program, dest_desc.format, None);

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(program.name()),
            layout: &self.fullscreen_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&source_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&aux0),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&aux1),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(program.name()),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &dest_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            ..Default::default()
        });
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
        Ok(())
    }

    fn write_material(&mut self, id: MaterialId, update: impl FnOnce(&mut MaterialProperties)) -> Result<()> {
        let material = self
            .materials
            .get_mut(id)
            .ok_or(OutlineError::UnknownMaterial)?;
        update(&mut material.properties);
        let params = MaterialParams::pack(&material.program, &material.properties);
        self.queue
            .write_buffer(&material.params, 0, bytemuck::bytes_of(&params));
        Ok(())
    }

    fn create_gpu_texture(&self, desc: &TextureDesc, label: &str) -> GpuTexture {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        GpuTexture {
            texture,
            view,
            desc: *desc,
            imported: false,
        }
    }
}

fn to_wgpu_color(c: Vec4) -> wgpu::Color {
    wgpu::Color {
        r: f64::from(c.x),
        g: f64::from(c.y),
        b: f64::from(c.z),
        a: f64::from(c.w),
    }
}

impl RenderBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn create_texture(&mut self, desc: &TextureDesc, label: &str) -> Result<TextureId> {
        let features = desc.format.guaranteed_format_features(self.device.features());
        let required = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        if desc.is_depth()
            || desc.sample_count != 1
            || !features.allowed_usages.contains(required)
            || !features
                .flags
                .contains(wgpu::TextureFormatFeatureFlags::FILTERABLE)
        {
            return Err(OutlineError::UnsupportedFormat {
                format: desc.format,
                usage: "filterable render target",
            });
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(OutlineError::ZeroSizedTarget {
                name: label.to_string(),
            });
        }

        let texture = self.create_gpu_texture(desc, label);
        Ok(self.textures.insert(texture))
    }

    fn release_texture(&mut self, id: TextureId) {
        match self.textures.get(id) {
            Some(texture) if !texture.imported => {
                if let Some(texture) = self.textures.remove(id) {
                    texture.texture.destroy();
                }
            }
            Some(_) => log::warn!("Ignoring release of a host-owned texture"),
            None => {}
        }
    }

    fn texture_desc(&self, id: TextureId) -> Option<TextureDesc> {
        self.textures.get(id).map(|t| t.desc)
    }

    fn create_material(
        &mut self,
        program: &ShaderProgram,
        properties: &MaterialProperties,
    ) -> Result<MaterialId> {
        program.validate(properties)?;

        // Compile eagerly so broken programs fail here instead of mid-frame.
        self.module(program);

        let params = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(program.name()),
            contents: bytemuck::bytes_of(&MaterialParams::pack(program, properties)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        Ok(self.materials.insert(GpuMaterial {
            program: program.clone(),
            properties: properties.clone(),
            params,
        }))
    }

    fn destroy_material(&mut self, id: MaterialId) {
        if let Some(material) = self.materials.remove(id) {
            material.params.destroy();
        }
    }

    fn submit(&mut self, commands: &CommandBuffer) -> Result<()> {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(commands.label()),
            });
        let mut target: Option<BoundTarget> = None;

        for command in commands.commands() {
            log::trace!("[{}] {command:?}", commands.label());
            match command {
                RenderCommand::PushDebugGroup(name) => {
                    self.flush_clear(&mut encoder, target.as_mut())?;
                    encoder.push_debug_group(name);
                }
                RenderCommand::PopDebugGroup => {
                    self.flush_clear(&mut encoder, target.as_mut())?;
                    encoder.pop_debug_group();
                }
                RenderCommand::SetRenderTarget {
                    color,
                    depth,
                    clear,
                } => {
                    self.flush_clear(&mut encoder, target.as_mut())?;
                    target = Some(BoundTarget {
                        color: *color,
                        depth: *depth,
                        pending_clear: (!clear.flags.is_empty()).then_some(*clear),
                    });
                }
                RenderCommand::DrawRenderers {
                    renderers,
                    material,
                } => {
                    let bound = target
                        .as_mut()
                        .ok_or(OutlineError::UnknownTexture("draw without render target"))?;
                    self.encode_draw(&mut encoder, bound, renderers, *material)?;
                }
                RenderCommand::Blit {
                    source,
                    destination,
                    material,
                } => {
                    self.flush_clear(&mut encoder, target.as_mut())?;
                    self.encode_blit(&mut encoder, *source, *destination, *material)?;
                }
                RenderCommand::SetMaterialInt {
                    material,
                    name,
                    value,
                } => self.write_material(*material, |p| p.set_int(*name, *value))?,
                RenderCommand::SetMaterialFloat {
                    material,
                    name,
                    value,
                } => self.write_material(*material, |p| p.set_float(*name, *value))?,
                RenderCommand::SetMaterialTexture {
                    material,
                    name,
                    texture,
                } => self.write_material(*material, |p| p.set_texture(*name, *texture))?,
            }
        }

        self.flush_clear(&mut encoder, target.as_mut())?;
        self.queue.submit(Some(encoder.finish()));
        Ok(())
    }
}
