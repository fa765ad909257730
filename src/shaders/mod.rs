//! Shader Library
//!
//! Built-in WGSL programs of the outline pipeline, stored as minijinja
//! templates embedded into the binary with `rust-embed`.
//!
//! | Name | Kind | Used by |
//! |------|------|---------|
//! | [`IDENTIFICATION_SHADER`] | geometry | identification draw override |
//! | [`COPY_IDENTIFICATION_SHADER`] | fullscreen | extract pass of the blur chain |
//! | [`BLUR_SHADER`] | fullscreen | separable blur, one axis per blit |
//! | [`MASK_SHADER`] | fullscreen | mask / composite |
//! | [`BLIT_SHADER`] | fullscreen | material-less blits (backend internal) |
//!
//! Programs are resolved by name. An explicitly registered program always
//! wins over the embedded template of the same name, and
//! [`ShaderLibrary::empty`] resolves nothing but registered programs.
//!
//! Template syntax matches the rest of the engine: `{$ ... $}` blocks,
//! `{{ ... }}` expressions and `$$` line statements. `include` paths are
//! resolved relative to `chunks/`.

use minijinja::{Environment, Error, context, syntax::SyntaxConfig};
use rust_embed::RustEmbed;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::core::material::{PropertySlot, ShaderKind, ShaderProgram, ShaderProperty};
use crate::errors::{OutlineError, Result};

// ============================================================================
// Well-known names
// ============================================================================

pub const IDENTIFICATION_SHADER: &str = "outlines/identification";
pub const COPY_IDENTIFICATION_SHADER: &str = "outlines/copy_identification";
pub const BLUR_SHADER: &str = "outlines/blur";
pub const MASK_SHADER: &str = "outlines/mask";
pub const BLIT_SHADER: &str = "outlines/blit";

/// Int property: 0 = horizontal, 1 = vertical.
pub const BLUR_DIRECTION_PROPERTY: &str = "blur_direction";
/// Float property of the mask program.
pub const OPACITY_PROPERTY: &str = "opacity";
/// Raw identification buffer, read by the copy and mask programs.
pub const IDENTIFICATION_TEXTURE_PROPERTY: &str = "identification_texture";
/// Camera color saved before compositing, read by the mask program.
pub const CAMERA_COLOR_PROPERTY: &str = "camera_color_texture";

const COPY_IDENTIFICATION_PROPERTIES: &[ShaderProperty] = &[ShaderProperty {
    name: IDENTIFICATION_TEXTURE_PROPERTY,
    slot: PropertySlot::Texture(0),
}];

const BLUR_PROPERTIES: &[ShaderProperty] = &[ShaderProperty {
    name: BLUR_DIRECTION_PROPERTY,
    slot: PropertySlot::Int(0),
}];

const MASK_PROPERTIES: &[ShaderProperty] = &[
    ShaderProperty {
        name: OPACITY_PROPERTY,
        slot: PropertySlot::Float(0),
    },
    ShaderProperty {
        name: IDENTIFICATION_TEXTURE_PROPERTY,
        slot: PropertySlot::Texture(0),
    },
    ShaderProperty {
        name: CAMERA_COLOR_PROPERTY,
        slot: PropertySlot::Texture(1),
    },
];

struct BuiltinShader {
    name: &'static str,
    template: &'static str,
    kind: ShaderKind,
    properties: &'static [ShaderProperty],
}

const BUILTIN_SHADERS: &[BuiltinShader] = &[
    BuiltinShader {
        name: IDENTIFICATION_SHADER,
        template: "identification.wgsl",
        kind: ShaderKind::Geometry,
        properties: &[],
    },
    BuiltinShader {
        name: COPY_IDENTIFICATION_SHADER,
        template: "copy_identification.wgsl",
        kind: ShaderKind::Fullscreen,
        properties: COPY_IDENTIFICATION_PROPERTIES,
    },
    BuiltinShader {
        name: BLUR_SHADER,
        template: "blur.wgsl",
        kind: ShaderKind::Fullscreen,
        properties: BLUR_PROPERTIES,
    },
    BuiltinShader {
        name: MASK_SHADER,
        template: "mask.wgsl",
        kind: ShaderKind::Fullscreen,
        properties: MASK_PROPERTIES,
    },
    BuiltinShader {
        name: BLIT_SHADER,
        template: "blit.wgsl",
        kind: ShaderKind::Fullscreen,
        properties: &[],
    },
];

// ============================================================================
// Blur kernel
// ============================================================================

/// 1-D gaussian kernel applied along one axis per blur blit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurKernel {
    /// Taps on each side of the center texel.
    pub radius: u32,
    pub sigma: f32,
}

/// Kernel baked into [`BLUR_SHADER`] and mirrored by the software backend.
pub const BLUR_KERNEL: BlurKernel = BlurKernel {
    radius: 4,
    sigma: 2.0,
};

impl BlurKernel {
    /// Normalized weights for offsets `0..=radius`.
    ///
    /// The center weight is counted once and every other weight twice, so
    /// `w[0] + 2 * sum(w[1..]) == 1`.
    #[must_use]
    pub fn weights(&self) -> SmallVec<[f32; 8]> {
        let sigma = self.sigma.max(f32::EPSILON);
        let denom = 2.0 * sigma * sigma;
        let mut weights: SmallVec<[f32; 8]> = (0..=self.radius)
            .map(|i| {
                let x = i as f32;
                (-(x * x) / denom).exp()
            })
            .collect();

        let total = weights[0] + 2.0 * weights[1..].iter().sum::<f32>();
        for w in &mut weights {
            *w /= total;
        }
        weights
    }
}

// ============================================================================
// Template environment
// ============================================================================

#[derive(RustEmbed)]
#[folder = "src/shaders/wgsl"]
struct ShaderAssets;

fn build_environment() -> Environment<'static> {
    let mut env = Environment::new();

    match SyntaxConfig::builder()
        .block_delimiters("{$", "$}")
        .variable_delimiters("{{", "}}")
        .line_statement_prefix("$$")
        .build()
    {
        Ok(syntax) => env.set_syntax(syntax),
        Err(e) => log::error!("Failed to configure shader template syntax: {e}"),
    }

    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.set_undefined_behavior(minijinja::UndefinedBehavior::SemiStrict);
    env.set_loader(shader_loader);
    env.set_path_join_callback(|name, _parent| format!("chunks/{name}").into());
    env
}

fn shader_loader(name: &str) -> std::result::Result<Option<String>, Error> {
    Ok(ShaderAssets::get(name)
        .and_then(|file| String::from_utf8(file.data.into_owned()).ok()))
}

// ============================================================================
// ShaderLibrary
// ============================================================================

/// Name → program registry backed by the embedded templates.
///
/// Owned by [`OutlineFeature`](crate::feature::OutlineFeature). Rendered
/// programs are cached, so resolving the same name twice renders once.
pub struct ShaderLibrary {
    env: Environment<'static>,
    programs: FxHashMap<String, ShaderProgram>,
    builtins: bool,
    kernel: BlurKernel,
}

impl Default for ShaderLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderLibrary {
    /// Library resolving every built-in program.
    #[must_use]
    pub fn new() -> Self {
        Self {
            env: build_environment(),
            programs: FxHashMap::default(),
            builtins: true,
            kernel: BLUR_KERNEL,
        }
    }

    /// Library without built-ins; only [`register`](Self::register)ed
    /// programs resolve.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            builtins: false,
            ..Self::new()
        }
    }

    #[inline]
    #[must_use]
    pub fn blur_kernel(&self) -> BlurKernel {
        self.kernel
    }

    /// Registers `program` under its own name, replacing any previous one.
    pub fn register(&mut self, program: ShaderProgram) {
        log::debug!("Registered shader `{}`", program.name());
        self.programs.insert(program.name().to_string(), program);
    }

    /// Removes a registered (or cached) program.
    pub fn unregister(&mut self, name: &str) -> Option<ShaderProgram> {
        self.programs.remove(name)
    }

    /// Whether `name` resolves without rendering anything new.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.programs.contains_key(name)
            || (self.builtins && BUILTIN_SHADERS.iter().any(|b| b.name == name))
    }

    /// Resolves a program by name.
    ///
    /// # Errors
    ///
    /// [`OutlineError::ShaderNotFound`] for unknown names,
    /// [`OutlineError::ShaderTemplate`] when a built-in template fails to render.
    pub fn find(&mut self, name: &str) -> Result<ShaderProgram> {
        if let Some(program) = self.programs.get(name) {
            return Ok(program.clone());
        }

        let builtin = self
            .builtins
            .then(|| BUILTIN_SHADERS.iter().find(|b| b.name == name))
            .flatten()
            .ok_or_else(|| OutlineError::ShaderNotFound(name.to_string()))?;

        let source = self.render_template(builtin.template)?;
        log::debug!("Rendered shader `{name}` ({} bytes)", source.len());

        let program = ShaderProgram::new(builtin.name, builtin.kind, source, builtin.properties);
        self.programs.insert(name.to_string(), program.clone());
        Ok(program)
    }

    /// Returns `explicit` when set, otherwise looks `name` up.
    ///
    /// Lookup failures are logged and yield `None`.
    pub fn resolve(&mut self, explicit: Option<&ShaderProgram>, name: &str) -> Option<ShaderProgram> {
        if let Some(program) = explicit {
            return Some(program.clone());
        }
        match self.find(name) {
            Ok(program) => Some(program),
            Err(e) => {
                log::warn!("Outline shader `{name}` unavailable: {e}");
                None
            }
        }
    }

    fn render_template(&self, template: &str) -> Result<String> {
        let weights: Vec<String> = self
            .kernel
            .weights()
            .iter()
            .map(|w| format!("{w:.8}"))
            .collect();

        let source = self
            .env
            .get_template(template)?
            .render(context! { blur_weights => weights })?;
        Ok(source)
    }
}
