//! Shader Programs & Materials
//!
//! A [`ShaderProgram`] is backend-agnostic: a name, the WGSL source rendered by
//! the [`ShaderLibrary`](crate::shaders::ShaderLibrary) and the list of named
//! properties the program exposes. Backends turn a program plus an initial
//! [`MaterialProperties`] set into a material and hand back a [`MaterialId`].
//!
//! Materials are owned by [`OutlineFeature`](crate::feature::OutlineFeature);
//! passes only copy the ids they were given and never create or destroy
//! materials themselves.

use std::borrow::Cow;
use std::sync::Arc;

use slotmap::new_key_type;
use smallvec::SmallVec;
use xxhash_rust::xxh3::xxh3_64;

use crate::core::texture::TextureId;
use crate::errors::{OutlineError, Result};

new_key_type! {
    /// Backend handle of a material instance.
    pub struct MaterialId;
}

/// A material together with the shader pass index to render it with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialPass {
    pub material: MaterialId,
    pub pass_index: u32,
}

impl MaterialPass {
    #[inline]
    #[must_use]
    pub const fn first(material: MaterialId) -> Self {
        Self {
            material,
            pass_index: 0,
        }
    }
}

// ============================================================================
// Properties
// ============================================================================

/// Value stored in a material property.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyValue {
    Int(i32),
    Float(f32),
    Texture(TextureId),
}

/// Named material properties.
///
/// Materials expose a handful of properties at most, so a small inline vector
/// with linear lookup beats a hash map here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialProperties {
    values: SmallVec<[(&'static str, PropertyValue); 4]>,
}

impl MaterialProperties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: &'static str, value: PropertyValue) {
        if let Some(slot) = self.values.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = value;
        } else {
            self.values.push((name, value));
        }
    }

    pub fn set_int(&mut self, name: &'static str, value: i32) {
        self.set(name, PropertyValue::Int(value));
    }

    pub fn set_float(&mut self, name: &'static str, value: f32) {
        self.set(name, PropertyValue::Float(value));
    }

    pub fn set_texture(&mut self, name: &'static str, texture: TextureId) {
        self.set(name, PropertyValue::Texture(texture));
    }

    /// Builder-style [`set_int`](Self::set_int).
    #[must_use]
    pub fn with_int(mut self, name: &'static str, value: i32) -> Self {
        self.set_int(name, value);
        self
    }

    #[must_use]
    pub fn with_float(mut self, name: &'static str, value: f32) -> Self {
        self.set_float(name, value);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<PropertyValue> {
        self.values
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, value)| *value)
    }

    #[must_use]
    pub fn int(&self, name: &str) -> Option<i32> {
        match self.get(name) {
            Some(PropertyValue::Int(v)) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn float(&self, name: &str) -> Option<f32> {
        match self.get(name) {
            Some(PropertyValue::Float(v)) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn texture(&self, name: &str) -> Option<TextureId> {
        match self.get(name) {
            Some(PropertyValue::Texture(v)) => Some(v),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, PropertyValue)> + '_ {
        self.values.iter().copied()
    }
}

// ============================================================================
// ShaderProgram
// ============================================================================

/// How a program is invoked by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderKind {
    /// Drawn over scene geometry (`DrawRenderers`). Vertex input is
    /// position + vertex color.
    Geometry,
    /// Full-screen triangle used by `Blit`.
    Fullscreen,
}

/// Where a named property lives in the fixed material layout.
///
/// Fullscreen programs share one bind group layout: the blit source, a
/// sampler, a params uniform (`floats: vec4<f32>`, `ints: vec4<i32>`) and two
/// auxiliary textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertySlot {
    Float(u8),
    Int(u8),
    Texture(u8),
}

/// A named property exposed by a shader program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderProperty {
    pub name: &'static str,
    pub slot: PropertySlot,
}

/// Number of float / int slots in the params uniform.
pub const MATERIAL_PARAM_SLOTS: usize = 4;

/// Number of auxiliary texture bindings next to the blit source.
pub const MATERIAL_TEXTURE_SLOTS: usize = 2;

impl PropertySlot {
    /// Whether the slot index addresses an existing binding of the layout.
    #[inline]
    #[must_use]
    pub fn fits_layout(self) -> bool {
        match self {
            Self::Float(i) | Self::Int(i) => usize::from(i) < MATERIAL_PARAM_SLOTS,
            Self::Texture(i) => usize::from(i) < MATERIAL_TEXTURE_SLOTS,
        }
    }
}

/// Compiled-from-template shader program.
#[derive(Debug, Clone)]
pub struct ShaderProgram {
    name: Cow<'static, str>,
    kind: ShaderKind,
    source: Arc<str>,
    properties: Cow<'static, [ShaderProperty]>,
    pass_count: u32,
    hash: u64,
}

impl ShaderProgram {
    #[must_use]
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        kind: ShaderKind,
        source: impl Into<Arc<str>>,
        properties: impl Into<Cow<'static, [ShaderProperty]>>,
    ) -> Self {
        let source: Arc<str> = source.into();
        let hash = xxh3_64(source.as_bytes());
        Self {
            name: name.into(),
            kind,
            source,
            properties: properties.into(),
            pass_count: 1,
            hash,
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    #[must_use]
    pub fn kind(&self) -> ShaderKind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[inline]
    #[must_use]
    pub fn properties(&self) -> &[ShaderProperty] {
        &self.properties
    }

    /// Number of shader passes. Every built-in program has exactly one.
    #[inline]
    #[must_use]
    pub fn pass_count(&self) -> u32 {
        self.pass_count
    }

    /// Hash of the WGSL source, used as pipeline cache key.
    #[inline]
    #[must_use]
    pub fn source_hash(&self) -> u64 {
        self.hash
    }

    #[must_use]
    pub fn property(&self, name: &str) -> Option<ShaderProperty> {
        self.properties.iter().find(|p| p.name == name).copied()
    }

    /// Checks that `properties` only names properties of this program and
    /// that every property slot exists in the material layout.
    ///
    /// # Errors
    ///
    /// [`OutlineError::MaterialCreation`] naming the offending property.
    pub fn validate(&self, properties: &MaterialProperties) -> Result<()> {
        if let Some(property) = self.properties.iter().find(|p| !p.slot.fits_layout()) {
            return Err(OutlineError::MaterialCreation {
                shader: self.name().to_string(),
                reason: format!(
                    "property `{}` uses {:?}, outside the material layout",
                    property.name, property.slot
                ),
            });
        }
        if let Some((name, _)) = properties.iter().find(|(name, _)| self.property(name).is_none()) {
            return Err(OutlineError::MaterialCreation {
                shader: self.name().to_string(),
                reason: format!("unknown property `{name}`"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NO_PROPERTIES: &[ShaderProperty] = &[];

    #[test]
    fn test_properties_overwrite_in_place() {
        let mut props = MaterialProperties::new().with_int("blur_direction", 0);
        props.set_int("blur_direction", 1);
        props.set_float("opacity", 0.5);
        assert_eq!(props.int("blur_direction"), Some(1));
        assert_eq!(props.float("opacity"), Some(0.5));
        assert_eq!(props.iter().count(), 2);
        assert_eq!(props.texture("opacity"), None);
    }

    #[test]
    fn test_program_hash_follows_source() {
        let a = ShaderProgram::new("a", ShaderKind::Fullscreen, "fn a() {}", NO_PROPERTIES);
        let b = ShaderProgram::new("b", ShaderKind::Fullscreen, "fn a() {}", NO_PROPERTIES);
        let c = ShaderProgram::new("a", ShaderKind::Fullscreen, "fn c() {}", NO_PROPERTIES);
        assert_eq!(a.source_hash(), b.source_hash());
        assert_ne!(a.source_hash(), c.source_hash());
        assert_eq!(a.pass_count(), 1);
    }

    #[test]
    fn test_slots_outside_the_layout_are_rejected() {
        const WIDE: &[ShaderProperty] = &[ShaderProperty {
            name: "tint",
            slot: PropertySlot::Float(4),
        }];
        const THIRD_TEXTURE: &[ShaderProperty] = &[ShaderProperty {
            name: "extra",
            slot: PropertySlot::Texture(2),
        }];
        const LAST_SLOTS: &[ShaderProperty] = &[
            ShaderProperty {
                name: "tint",
                slot: PropertySlot::Float(3),
            },
            ShaderProperty {
                name: "mode",
                slot: PropertySlot::Int(3),
            },
            ShaderProperty {
                name: "extra",
                slot: PropertySlot::Texture(1),
            },
        ];

        let props = MaterialProperties::new().with_float("tint", 1.0);
        let wide = ShaderProgram::new("wide", ShaderKind::Fullscreen, "", WIDE);
        assert!(matches!(
            wide.validate(&props),
            Err(OutlineError::MaterialCreation { ref reason, .. }) if reason.contains("tint")
        ));
        let third = ShaderProgram::new("third", ShaderKind::Fullscreen, "", THIRD_TEXTURE);
        assert!(third.validate(&MaterialProperties::new()).is_err());

        let last = ShaderProgram::new("last", ShaderKind::Fullscreen, "", LAST_SLOTS);
        assert!(last.validate(&props).is_ok());
        assert!(last.validate(&props.clone().with_int("unknown", 1)).is_err());
    }
}
