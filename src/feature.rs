//! Outline Feature
//!
//! [`OutlineFeature`] owns the outline configuration, the shader programs,
//! every material and both passes. Per camera per frame the host calls
//! [`add_render_passes`](OutlineFeature::add_render_passes), which copies the
//! current settings and camera targets into the passes and enqueues them:
//!
//! ```text
//! create(backend)           resolve shaders, build materials, build passes
//!   │
//!   ├─ per camera per frame
//!   │    add_render_passes(camera, list)
//!   │      ├─ setup_render_passes(camera)   settings + targets → passes
//!   │      ├─ list.add_node(identification) @ AfterTransparents
//!   │      └─ list.add_node(blur_composite) @ AfterPostProcessing
//!   │    list.execute(backend, camera, cull)
//!   │
//! dispose(backend)          release buffers, destroy materials
//! ```
//!
//! Shader programs explicitly assigned through [`OutlineShaders`] win over
//! the library lookup by well-known name. A program that cannot be resolved
//! or a material the backend refuses to build is logged once and disables
//! the pass that needs it.

use crate::core::material::{MaterialId, MaterialProperties, ShaderProgram};
use crate::core::RenderBackend;
use crate::graph::{CameraData, FramePassList};
use crate::passes::{BlurCompositeMaterials, BlurCompositePass, BlurDirection, IdentificationPass};
use crate::settings::OutlineSettings;
use crate::shaders::{
    BLUR_DIRECTION_PROPERTY, BLUR_SHADER, COPY_IDENTIFICATION_SHADER, IDENTIFICATION_SHADER,
    MASK_SHADER, OPACITY_PROPERTY, ShaderLibrary,
};

/// Explicitly assigned shader programs. `None` falls back to the library.
#[derive(Debug, Clone, Default)]
pub struct OutlineShaders {
    pub identification: Option<ShaderProgram>,
    pub copy_identification: Option<ShaderProgram>,
    pub blur: Option<ShaderProgram>,
    pub mask: Option<ShaderProgram>,
}

/// Materials built by [`OutlineFeature::create`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutlineMaterials {
    pub identification: Option<MaterialId>,
    pub copy_identification: Option<MaterialId>,
    pub vertical_blur: Option<MaterialId>,
    pub horizontal_blur: Option<MaterialId>,
    pub mask: Option<MaterialId>,
}

impl OutlineMaterials {
    /// Material set of the blur pass, if every one of them exists.
    #[must_use]
    pub fn blur_composite(&self) -> Option<BlurCompositeMaterials> {
        Some(BlurCompositeMaterials {
            copy_identification: self.copy_identification?,
            vertical_blur: self.vertical_blur?,
            horizontal_blur: self.horizontal_blur?,
            mask: self.mask?,
        })
    }

    fn iter(&self) -> impl Iterator<Item = MaterialId> {
        [
            self.identification,
            self.copy_identification,
            self.vertical_blur,
            self.horizontal_blur,
            self.mask,
        ]
        .into_iter()
        .flatten()
    }

    /// Number of materials that were built.
    #[must_use]
    pub fn count(&self) -> usize {
        self.iter().count()
    }
}

pub struct OutlineFeature {
    settings: OutlineSettings,
    shaders: OutlineShaders,
    library: ShaderLibrary,
    materials: OutlineMaterials,
    identification: Option<IdentificationPass>,
    blur_composite: Option<BlurCompositePass>,
}

impl OutlineFeature {
    #[must_use]
    pub fn new(settings: OutlineSettings) -> Self {
        Self::with_library(settings, ShaderLibrary::new())
    }

    /// Resolves shaders from `library` instead of the built-in one.
    #[must_use]
    pub fn with_library(settings: OutlineSettings, library: ShaderLibrary) -> Self {
        Self {
            settings,
            shaders: OutlineShaders::default(),
            library,
            materials: OutlineMaterials::default(),
            identification: None,
            blur_composite: None,
        }
    }

    // === Configuration ===

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &OutlineSettings {
        &self.settings
    }

    /// Mutable settings. Changes apply from the next `add_render_passes`.
    #[inline]
    pub fn settings_mut(&mut self) -> &mut OutlineSettings {
        &mut self.settings
    }

    pub fn set_settings(&mut self, settings: OutlineSettings) {
        self.settings = settings;
    }

    /// Explicit shader assignments. Only read by [`create`](Self::create).
    #[inline]
    pub fn shaders_mut(&mut self) -> &mut OutlineShaders {
        &mut self.shaders
    }

    #[inline]
    pub fn library_mut(&mut self) -> &mut ShaderLibrary {
        &mut self.library
    }

    #[inline]
    #[must_use]
    pub fn materials(&self) -> &OutlineMaterials {
        &self.materials
    }

    #[inline]
    #[must_use]
    pub fn identification_pass(&self) -> Option<&IdentificationPass> {
        self.identification.as_ref()
    }

    #[inline]
    #[must_use]
    pub fn blur_composite_pass(&self) -> Option<&BlurCompositePass> {
        self.blur_composite.as_ref()
    }

    #[inline]
    pub fn blur_composite_pass_mut(&mut self) -> Option<&mut BlurCompositePass> {
        self.blur_composite.as_mut()
    }

    #[inline]
    #[must_use]
    pub fn is_created(&self) -> bool {
        self.identification.is_some() && self.blur_composite.is_some()
    }

    // === Lifecycle ===

    /// Resolves shaders, builds materials and instantiates both passes.
    ///
    /// Does nothing when already created. Never fails: unresolved shaders
    /// and refused materials are logged and leave the owning pass disabled.
    pub fn create(&mut self, backend: &mut dyn RenderBackend) {
        if self.is_created() {
            return;
        }

        let identification = self
            .library
            .resolve(self.shaders.identification.as_ref(), IDENTIFICATION_SHADER);
        let copy = self
            .library
            .resolve(self.shaders.copy_identification.as_ref(), COPY_IDENTIFICATION_SHADER);
        let blur = self.library.resolve(self.shaders.blur.as_ref(), BLUR_SHADER);
        let mask = self.library.resolve(self.shaders.mask.as_ref(), MASK_SHADER);

        let none = MaterialProperties::new();
        self.materials = OutlineMaterials {
            identification: build_material(backend, identification.as_ref(), &none),
            copy_identification: build_material(backend, copy.as_ref(), &none),
            vertical_blur: build_material(
                backend,
                blur.as_ref(),
                &MaterialProperties::new()
                    .with_int(BLUR_DIRECTION_PROPERTY, BlurDirection::Vertical.as_int()),
            ),
            horizontal_blur: build_material(
                backend,
                blur.as_ref(),
                &MaterialProperties::new()
                    .with_int(BLUR_DIRECTION_PROPERTY, BlurDirection::Horizontal.as_int()),
            ),
            mask: build_material(
                backend,
                mask.as_ref(),
                &MaterialProperties::new().with_float(OPACITY_PROPERTY, self.settings.opacity()),
            ),
        };

        log::debug!(
            "Outline feature created on `{}` with {} materials",
            backend.name(),
            self.materials.count()
        );

        // Without identification nothing is ever published for the blur to read.
        let blur_composite = self
            .materials
            .identification
            .and(self.materials.blur_composite());
        if blur_composite.is_none() && self.materials.blur_composite().is_some() {
            log::warn!("Outline identification unavailable, blur and composite disabled");
        }

        self.identification = Some(IdentificationPass::new(self.materials.identification));
        self.blur_composite = Some(BlurCompositePass::new(blur_composite));
    }

    /// Copies the current settings and the camera's targets into both passes.
    pub fn setup_render_passes(&mut self, camera: &CameraData) {
        if let Some(pass) = &mut self.identification {
            pass.setup(self.settings.layer_mask, camera.targets);
        }
        if let Some(pass) = &mut self.blur_composite {
            pass.setup(&self.settings, camera.targets);
        }
    }

    /// Enqueues identification then blur-and-composite for game cameras.
    ///
    /// Other camera types enqueue nothing.
    pub fn add_render_passes<'a>(&'a mut self, camera: &CameraData, passes: &mut FramePassList<'a>) {
        if !camera.wants_outlines() {
            log::trace!("Skipping outlines for {:?} camera", camera.camera_type);
            return;
        }

        self.setup_render_passes(camera);

        let (Some(identification), Some(blur_composite)) =
            (self.identification.as_mut(), self.blur_composite.as_mut())
        else {
            log::debug!("Outline feature used before create(), nothing enqueued");
            return;
        };

        passes.add_node(identification);
        passes.add_node(blur_composite);
    }

    /// Releases every buffer and destroys every material.
    ///
    /// Idempotent: safe before `create` and safe to call twice.
    pub fn dispose(&mut self, backend: &mut dyn RenderBackend) {
        if let Some(mut pass) = self.identification.take() {
            pass.release(backend);
        }
        if let Some(mut pass) = self.blur_composite.take() {
            pass.release(backend);
        }

        for material in self.materials.iter() {
            backend.destroy_material(material);
        }
        if self.materials.count() > 0 {
            log::debug!("Outline feature disposed");
        }
        self.materials = OutlineMaterials::default();
    }
}

fn build_material(
    backend: &mut dyn RenderBackend,
    program: Option<&ShaderProgram>,
    properties: &MaterialProperties,
) -> Option<MaterialId> {
    let program = program?;
    match backend.create_material(program, properties) {
        Ok(id) => Some(id),
        Err(e) => {
            log::warn!("Outline material for `{}` not created: {e}", program.name());
            None
        }
    }
}
