//! CPU Reference Backend
//!
//! Executes recorded outline commands on `f32` RGBA images. It is the host
//! used by the test-suite, the benches and the headless demo, and doubles as
//! the executable definition of what each built-in program computes.
//!
//! # Host model
//!
//! - Textures are `Vec<Vec4>` images. Depth textures store depth in `x`.
//! - Renderers are screen-space rectangles ([`ScreenRect`]) with a depth and
//!   a vertex color, registered with [`SoftwareBackend::add_renderer`].
//! - Camera targets are imported with [`SoftwareBackend::import_texture`];
//!   imported textures are never released by the pipeline.
//! - Depth testing uses reverse-Z by default (`GreaterEqual`) and never
//!   writes depth.
//!
//! Materials are matched to kernels by shader program name; programs
//! without a kernel fail material creation.

pub mod kernels;

use glam::{UVec2, Vec4};
use rustc_hash::FxHashSet;
use slotmap::SlotMap;
use smallvec::SmallVec;

use self::kernels::Image;
use crate::core::backend::RenderBackend;
use crate::core::commands::{CommandBuffer, RenderCommand};
use crate::core::material::{MaterialId, MaterialPass, MaterialProperties, ShaderProgram};
use crate::core::texture::{ClearOp, TextureDesc, TextureFormat, TextureId};
use crate::core::RendererId;
use crate::errors::{OutlineError, Result};
use crate::shaders::{
    BLIT_SHADER, BLUR_DIRECTION_PROPERTY, BLUR_KERNEL, BLUR_SHADER, CAMERA_COLOR_PROPERTY,
    COPY_IDENTIFICATION_SHADER, IDENTIFICATION_SHADER, IDENTIFICATION_TEXTURE_PROPERTY,
    MASK_SHADER, OPACITY_PROPERTY,
};

/// Axis-aligned screen rectangle standing in for a mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    /// Top-left corner, inclusive.
    pub min: UVec2,
    /// Bottom-right corner, exclusive.
    pub max: UVec2,
    pub depth: f32,
    pub color: Vec4,
}

impl ScreenRect {
    /// Rectangle at depth 1.0 (the near plane with reverse-Z).
    #[must_use]
    pub fn new(x: u32, y: u32, width: u32, height: u32, color: Vec4) -> Self {
        Self {
            min: UVec2::new(x, y),
            max: UVec2::new(x + width, y + height),
            depth: 1.0,
            color,
        }
    }

    #[must_use]
    pub fn with_depth(mut self, depth: f32) -> Self {
        self.depth = depth;
        self
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.min.x && x < self.max.x && y >= self.min.y && y < self.max.y
    }
}

/// Counters of the work a backend performed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SoftwareStats {
    pub textures_created: usize,
    pub textures_released: usize,
    pub materials_created: usize,
    pub materials_destroyed: usize,
    pub clears: usize,
    pub draw_calls: usize,
    pub renderers_drawn: usize,
    pub blits: usize,
    pub material_writes: usize,
    pub submits: usize,
}

impl SoftwareStats {
    /// Commands that changed texels.
    #[must_use]
    pub fn texel_writes(&self) -> usize {
        self.clears + self.draw_calls + self.blits
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kernel {
    Identification,
    CopyIdentification,
    Blur,
    Mask,
    Blit,
}

impl Kernel {
    fn for_program(name: &str) -> Option<Self> {
        match name {
            IDENTIFICATION_SHADER => Some(Self::Identification),
            COPY_IDENTIFICATION_SHADER => Some(Self::CopyIdentification),
            BLUR_SHADER => Some(Self::Blur),
            MASK_SHADER => Some(Self::Mask),
            BLIT_SHADER => Some(Self::Blit),
            _ => None,
        }
    }
}

struct SoftTexture {
    desc: TextureDesc,
    label: String,
    image: Image,
    imported: bool,
}

struct SoftMaterial {
    kernel: Kernel,
    shader: String,
    properties: MaterialProperties,
}

pub struct SoftwareBackend {
    textures: SlotMap<TextureId, SoftTexture>,
    materials: SlotMap<MaterialId, SoftMaterial>,
    renderers: SlotMap<RendererId, ScreenRect>,
    depth_compare: wgpu::CompareFunction,
    blur_weights: SmallVec<[f32; 8]>,
    rejected_shaders: FxHashSet<String>,
    unsupported_formats: FxHashSet<TextureFormat>,
    stats: SoftwareStats,
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            textures: SlotMap::with_key(),
            materials: SlotMap::with_key(),
            renderers: SlotMap::with_key(),
            depth_compare: wgpu::CompareFunction::GreaterEqual,
            blur_weights: BLUR_KERNEL.weights(),
            rejected_shaders: FxHashSet::default(),
            unsupported_formats: FxHashSet::default(),
            stats: SoftwareStats::default(),
        }
    }

    // === Host configuration ===

    pub fn set_depth_compare(&mut self, compare: wgpu::CompareFunction) {
        self.depth_compare = compare;
    }

    /// Makes material creation fail for `shader`, as if its program did not
    /// compile on this host.
    pub fn reject_shader(&mut self, shader: &str) {
        self.rejected_shaders.insert(shader.to_string());
    }

    /// Makes texture allocation fail for `format`.
    pub fn reject_format(&mut self, format: TextureFormat) {
        self.unsupported_formats.insert(format);
    }

    // === Textures ===

    /// Registers a host-owned texture filled with `fill`.
    pub fn import_texture(&mut self, desc: TextureDesc, label: &str, fill: Vec4) -> TextureId {
        self.textures.insert(SoftTexture {
            desc,
            label: label.to_string(),
            image: Image::filled(desc.width, desc.height, fill),
            imported: true,
        })
    }

    /// Registers a host-owned depth buffer cleared to `depth`.
    pub fn import_depth(&mut self, width: u32, height: u32, depth: f32) -> TextureId {
        self.import_texture(
            TextureDesc::depth(width, height),
            "Camera Depth",
            Vec4::new(depth, 0.0, 0.0, 0.0),
        )
    }

    #[must_use]
    pub fn pixels(&self, id: TextureId) -> Option<&[Vec4]> {
        self.textures.get(id).map(|t| t.image.pixels.as_slice())
    }

    #[must_use]
    pub fn pixel(&self, id: TextureId, x: u32, y: u32) -> Option<Vec4> {
        let texture = self.textures.get(id)?;
        (x < texture.desc.width && y < texture.desc.height)
            .then(|| texture.image.texel(i64::from(x), i64::from(y)))
    }

    /// Replaces the texels of a texture.
    ///
    /// # Errors
    ///
    /// `UnknownTexture` for a dead id, `InvalidSettings` on a size mismatch.
    pub fn write_pixels(&mut self, id: TextureId, pixels: &[Vec4]) -> Result<()> {
        let texture = self
            .textures
            .get_mut(id)
            .ok_or(OutlineError::UnknownTexture("write target"))?;
        if pixels.len() != texture.image.pixels.len() {
            return Err(OutlineError::InvalidSettings {
                field: "pixels",
                reason: format!(
                    "expected {} texels for `{}`, got {}",
                    texture.image.pixels.len(),
                    texture.label,
                    pixels.len()
                ),
            });
        }
        texture.image.pixels.copy_from_slice(pixels);
        Ok(())
    }

    /// Fills a texture with a single value.
    pub fn fill(&mut self, id: TextureId, value: Vec4) -> Result<()> {
        let texture = self
            .textures
            .get_mut(id)
            .ok_or(OutlineError::UnknownTexture("fill target"))?;
        texture.image.pixels.fill(value);
        Ok(())
    }

    /// Rasterizes `rect`'s depth into a depth texture, the way the host's
    /// opaque pass would.
    pub fn draw_depth(&mut self, depth: TextureId, rect: &ScreenRect) -> Result<()> {
        let texture = self
            .textures
            .get_mut(depth)
            .ok_or(OutlineError::UnknownTexture("depth target"))?;
        let (width, height) = (texture.desc.width, texture.desc.height);
        for y in rect.min.y..rect.max.y.min(height) {
            for x in rect.min.x..rect.max.x.min(width) {
                let index = y as usize * width as usize + x as usize;
                texture.image.pixels[index].x = rect.depth;
            }
        }
        Ok(())
    }

    /// Number of live textures created through [`RenderBackend::create_texture`].
    #[must_use]
    pub fn live_textures(&self) -> usize {
        self.textures.values().filter(|t| !t.imported).count()
    }

    #[must_use]
    pub fn live_materials(&self) -> usize {
        self.materials.len()
    }

    /// Labels of live owned textures, sorted.
    #[must_use]
    pub fn live_texture_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self
            .textures
            .values()
            .filter(|t| !t.imported)
            .map(|t| t.label.clone())
            .collect();
        labels.sort();
        labels
    }

    // === Renderers ===

    pub fn add_renderer(&mut self, rect: ScreenRect) -> RendererId {
        self.renderers.insert(rect)
    }

    pub fn remove_renderer(&mut self, id: RendererId) -> Option<ScreenRect> {
        self.renderers.remove(id)
    }

    #[must_use]
    pub fn renderer(&self, id: RendererId) -> Option<&ScreenRect> {
        self.renderers.get(id)
    }

    // === Materials ===

    /// Current value of a material's properties.
    #[must_use]
    pub fn material_properties(&self, id: MaterialId) -> Option<&MaterialProperties> {
        self.materials.get(id).map(|m| &m.properties)
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> SoftwareStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = SoftwareStats::default();
    }

    // === Execution ===

    fn snapshot(&self, id: TextureId, usage: &'static str) -> Result<Image> {
        self.textures
            .get(id)
            .map(|t| t.image.clone())
            .ok_or(OutlineError::UnknownTexture(usage))
    }

    fn material_texture(&self, properties: &MaterialProperties, name: &str) -> Result<Image> {
        match properties.texture(name) {
            Some(id) => self.snapshot(id, "material texture"),
            None => Ok(Image::fallback()),
        }
    }

    fn material_mut(&mut self, id: MaterialId) -> Result<&mut SoftMaterial> {
        self.stats.material_writes += 1;
        self.materials.get_mut(id).ok_or(OutlineError::UnknownMaterial)
    }

    fn bind_target(&mut self, color: TextureId, depth: Option<TextureId>, clear: &ClearOp) -> Result<()> {
        if !self.textures.contains_key(color) {
            return Err(OutlineError::UnknownTexture("render target color"));
        }
        if clear.clears_color() {
            self.fill(color, clear.color)?;
            self.stats.clears += 1;
        }
        if let Some(depth) = depth {
            if !self.textures.contains_key(depth) {
                return Err(OutlineError::UnknownTexture("render target depth"));
            }
            if clear.clears_depth() {
                self.fill(depth, Vec4::new(clear.depth, 0.0, 0.0, 0.0))?;
                self.stats.clears += 1;
            }
        }
        Ok(())
    }

    fn draw(
        &mut self,
        color: TextureId,
        depth: Option<TextureId>,
        renderers: &[RendererId],
        material: MaterialPass,
    ) -> Result<()> {
        let kernel = self
            .materials
            .get(material.material)
            .ok_or(OutlineError::UnknownMaterial)?
            .kernel;
        if kernel != Kernel::Identification {
            return Err(OutlineError::MaterialCreation {
                shader: format!("{kernel:?}"),
                reason: "not a geometry program".to_string(),
            });
        }

        let depth_image = match depth {
            Some(id) => Some(self.snapshot(id, "depth attachment")?),
            None => None,
        };
        let compare = self.depth_compare;

        let mut drawn = 0;
        for id in renderers {
            let Some(rect) = self.renderers.get(*id).copied() else {
                log::warn!("Draw references a removed renderer, skipping it");
                continue;
            };
            let target = self
                .textures
                .get_mut(color)
                .ok_or(OutlineError::UnknownTexture("render target color"))?;
            let (width, height) = (target.desc.width, target.desc.height);

            for y in rect.min.y..rect.max.y.min(height) {
                for x in rect.min.x..rect.max.x.min(width) {
                    if let Some(depth) = &depth_image {
                        let stored = depth.texel(i64::from(x), i64::from(y)).x;
                        if !depth_test(compare, rect.depth, stored) {
                            continue;
                        }
                    }
                    let index = y as usize * width as usize + x as usize;
                    target.image.pixels[index] = rect.color.truncate().extend(1.0);
                }
            }
            drawn += 1;
        }

        self.stats.draw_calls += 1;
        self.stats.renderers_drawn += drawn;
        Ok(())
    }

    fn blit(
        &mut self,
        source: TextureId,
        destination: TextureId,
        material: Option<MaterialPass>,
    ) -> Result<()> {
        let (kernel, properties) = match material {
            Some(pass) => {
                let material = self
                    .materials
                    .get(pass.material)
                    .ok_or(OutlineError::UnknownMaterial)?;
                (material.kernel, material.properties.clone())
            }
            None => (Kernel::Blit, MaterialProperties::new()),
        };

        // In-place blits read the snapshot, never the texels being written.
        let src = self.snapshot(source, "blit source")?;
        let desc = self
            .texture_desc(destination)
            .ok_or(OutlineError::UnknownTexture("blit destination"))?;
        let (width, height) = (desc.width, desc.height);

        let pixels = match kernel {
            Kernel::Blit => kernels::copy(&src, width, height),
            Kernel::CopyIdentification => {
                let identification =
                    self.material_texture(&properties, IDENTIFICATION_TEXTURE_PROPERTY)?;
                kernels::copy_identification(&identification, width, height)
            }
            Kernel::Blur => {
                let horizontal = properties.int(BLUR_DIRECTION_PROPERTY).unwrap_or(0) == 0;
                kernels::blur(&src, width, height, horizontal, &self.blur_weights)
            }
            Kernel::Mask => {
                let raw = self.material_texture(&properties, IDENTIFICATION_TEXTURE_PROPERTY)?;
                let saved = self.material_texture(&properties, CAMERA_COLOR_PROPERTY)?;
                let opacity = properties.float(OPACITY_PROPERTY).unwrap_or(1.0);
                kernels::mask(&src, &raw, &saved, opacity, width, height)
            }
            Kernel::Identification => {
                return Err(OutlineError::MaterialCreation {
                    shader: IDENTIFICATION_SHADER.to_string(),
                    reason: "geometry program used for a blit".to_string(),
                });
            }
        };

        if let Some(texture) = self.textures.get_mut(destination) {
            texture.image.pixels = pixels;
        }
        self.stats.blits += 1;
        Ok(())
    }
}

fn depth_test(compare: wgpu::CompareFunction, incoming: f32, stored: f32) -> bool {
    use wgpu::CompareFunction as C;
    match compare {
        C::Never => false,
        C::Less => incoming < stored,
        C::Equal => incoming == stored,
        C::LessEqual => incoming <= stored,
        C::Greater => incoming > stored,
        C::NotEqual => incoming != stored,
        C::GreaterEqual => incoming >= stored,
        C::Always => true,
    }
}

impl RenderBackend for SoftwareBackend {
    fn name(&self) -> &'static str {
        "software"
    }

    fn create_texture(&mut self, desc: &TextureDesc, label: &str) -> Result<TextureId> {
        if desc.is_depth() || desc.sample_count != 1 || self.unsupported_formats.contains(&desc.format) {
            return Err(OutlineError::UnsupportedFormat {
                format: desc.format,
                usage: "software render target",
            });
        }
        if desc.width == 0 || desc.height == 0 {
            return Err(OutlineError::ZeroSizedTarget {
                name: label.to_string(),
            });
        }

        self.stats.textures_created += 1;
        Ok(self.textures.insert(SoftTexture {
            desc: *desc,
            label: label.to_string(),
            image: Image::filled(desc.width, desc.height, Vec4::ZERO),
            imported: false,
        }))
    }

    fn release_texture(&mut self, id: TextureId) {
        match self.textures.get(id) {
            Some(texture) if !texture.imported => {
                self.textures.remove(id);
                self.stats.textures_released += 1;
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
        let kernel = Kernel::for_program(program.name())
            .filter(|_| !self.rejected_shaders.contains(program.name()))
            .ok_or_else(|| OutlineError::MaterialCreation {
                shader: program.name().to_string(),
                reason: "no software kernel for this program".to_string(),
            })?;

        program.validate(properties)?;

        self.stats.materials_created += 1;
        Ok(self.materials.insert(SoftMaterial {
            kernel,
            shader: program.name().to_string(),
            properties: properties.clone(),
        }))
    }

    fn destroy_material(&mut self, id: MaterialId) {
        if let Some(material) = self.materials.remove(id) {
            log::trace!("Destroyed software material `{}`", material.shader);
            self.stats.materials_destroyed += 1;
        }
    }

    fn submit(&mut self, commands: &CommandBuffer) -> Result<()> {
        self.stats.submits += 1;
        let mut target: Option<(TextureId, Option<TextureId>)> = None;

        for command in commands.commands() {
            log::trace!("[{}] {command:?}", commands.label());
            match command {
                RenderCommand::PushDebugGroup(_) | RenderCommand::PopDebugGroup => {}
                RenderCommand::SetRenderTarget {
                    color,
                    depth,
                    clear,
                } => {
                    self.bind_target(*color, *depth, clear)?;
                    target = Some((*color, *depth));
                }
                RenderCommand::DrawRenderers {
                    renderers,
                    material,
                } => {
                    let (color, depth) =
                        target.ok_or(OutlineError::UnknownTexture("draw without render target"))?;
                    self.draw(color, depth, renderers, *material)?;
                }
                RenderCommand::Blit {
                    source,
                    destination,
                    material,
                } => self.blit(*source, *destination, *material)?,
                RenderCommand::SetMaterialInt {
                    material,
                    name,
                    value,
                } => self.material_mut(*material)?.properties.set_int(*name, *value),
                RenderCommand::SetMaterialFloat {
                    material,
                    name,
                    value,
                } => self.material_mut(*material)?.properties.set_float(*name, *value),
                RenderCommand::SetMaterialTexture {
                    material,
                    name,
                    texture,
                } => self
                    .material_mut(*material)?
                    .properties
                    .set_texture(*name, *texture),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::material::{PropertySlot, ShaderKind, ShaderProperty};
    use crate::shaders::ShaderLibrary;

    const NO_PROPERTIES: &[ShaderProperty] = &[];

    #[test]
    fn test_in_place_blit_reads_snapshot() {
        let mut backend = SoftwareBackend::new();
        let mut library = ShaderLibrary::new();
        let blur = library.find(BLUR_SHADER).unwrap();
        let material = backend
            .create_material(&blur, &MaterialProperties::new().with_int(BLUR_DIRECTION_PROPERTY, 0))
            .unwrap();

        let desc = TextureDesc::color(8, 1, TextureFormat::Rgba16Float);
        let texture = backend.create_texture(&desc, "line").unwrap();
        let mut line = vec![Vec4::ZERO; 8];
        line[4] = Vec4::ONE;
        backend.write_pixels(texture, &line).unwrap();

        let mut cmd = CommandBuffer::new("in-place");
        cmd.blit_with_material(texture, texture, MaterialPass::first(material));
        backend.submit(&cmd).unwrap();

        let out = backend.pixels(texture).unwrap();
        let weights = BLUR_KERNEL.weights();
        assert!((out[4].x - weights[0]).abs() < 1e-6);
        assert!((out[3].x - weights[1]).abs() < 1e-6);
        assert!((out[5].x - weights[1]).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_program_fails_material_creation() {
        let mut backend = SoftwareBackend::new();
        let program = ShaderProgram::new("custom/unknown", ShaderKind::Fullscreen, "", NO_PROPERTIES);
        assert!(matches!(
            backend.create_material(&program, &MaterialProperties::new()),
            Err(OutlineError::MaterialCreation { .. })
        ));
    }

    #[test]
    fn test_param_slot_past_the_uniform_fails_material_creation() {
        const FIFTH_INT: &[ShaderProperty] = &[ShaderProperty {
            name: BLUR_DIRECTION_PROPERTY,
            slot: PropertySlot::Int(4),
        }];
        let mut backend = SoftwareBackend::new();
        let program = ShaderProgram::new(BLUR_SHADER, ShaderKind::Fullscreen, "", FIFTH_INT);
        let props = MaterialProperties::new().with_int(BLUR_DIRECTION_PROPERTY, 1);
        assert!(matches!(
            backend.create_material(&program, &props),
            Err(OutlineError::MaterialCreation { .. })
        ));
        assert_eq!(backend.live_materials(), 0);
    }

    #[test]
    fn test_depth_test_is_reverse_z() {
        assert!(depth_test(wgpu::CompareFunction::GreaterEqual, 0.5, 0.0));
        assert!(!depth_test(wgpu::CompareFunction::GreaterEqual, 0.2, 0.5));
    }

    #[test]
    fn test_release_ignores_imported_textures() {
        let mut backend = SoftwareBackend::new();
        let camera = backend.import_texture(
            TextureDesc::color(4, 4, TextureFormat::Rgba8Unorm),
            "Camera",
            Vec4::W,
        );
        backend.release_texture(camera);
        assert!(backend.pixels(camera).is_some());
        assert_eq!(backend.live_textures(), 0);
    }
}
