//! Command Recording
//!
//! Passes never talk to the GPU directly during their run phase. They record
//! [`RenderCommand`]s into a [`CommandBuffer`], which the frame submits to the
//! backend once every enqueued pass has run. Recording is single-threaded and
//! ordered; the backend executes commands in recording order, so a command that
//! reads a texture always observes every earlier write to it.
//!
//! # Command Set
//!
//! | Command | Host primitive |
//! |---------|----------------|
//! | `PushDebugGroup` / `PopDebugGroup` | profiling scope / debug marker |
//! | `SetRenderTarget` | bind color (+ optional depth), apply clear |
//! | `DrawRenderers` | draw a pre-filtered, pre-sorted renderer list with an override material |
//! | `Blit` | full-screen copy, optionally through a material pass; `source == destination` is legal |
//! | `SetMaterial*` | update a material property before the next command that uses it |

use std::borrow::Cow;

use crate::core::RendererId;
use crate::core::material::{MaterialId, MaterialPass};
use crate::core::texture::{ClearOp, TextureId};

/// A single recorded command.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    PushDebugGroup(Cow<'static, str>),
    PopDebugGroup,
    SetRenderTarget {
        color: TextureId,
        depth: Option<TextureId>,
        clear: ClearOp,
    },
    DrawRenderers {
        renderers: Vec<RendererId>,
        material: MaterialPass,
    },
    Blit {
        source: TextureId,
        destination: TextureId,
        material: Option<MaterialPass>,
    },
    SetMaterialInt {
        material: MaterialId,
        name: &'static str,
        value: i32,
    },
    SetMaterialFloat {
        material: MaterialId,
        name: &'static str,
        value: f32,
    },
    SetMaterialTexture {
        material: MaterialId,
        name: &'static str,
        texture: TextureId,
    },
}

/// Ordered list of recorded commands.
#[derive(Debug, Clone, Default)]
pub struct CommandBuffer {
    label: Cow<'static, str>,
    commands: Vec<RenderCommand>,
    debug_depth: u32,
}

impl CommandBuffer {
    #[must_use]
    pub fn new(label: impl Into<Cow<'static, str>>) -> Self {
        Self {
            label: label.into(),
            commands: Vec::with_capacity(32),
            debug_depth: 0,
        }
    }

    #[inline]
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    // === Debug groups ===

    pub fn push_debug_group(&mut self, name: impl Into<Cow<'static, str>>) {
        self.debug_depth += 1;
        self.commands.push(RenderCommand::PushDebugGroup(name.into()));
    }

    pub fn pop_debug_group(&mut self) {
        debug_assert!(self.debug_depth > 0, "unbalanced pop_debug_group");
        self.debug_depth = self.debug_depth.saturating_sub(1);
        self.commands.push(RenderCommand::PopDebugGroup);
    }

    /// Records `f` inside a named debug group.
    pub fn debug_group<R>(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        self.push_debug_group(name);
        let result = f(self);
        self.pop_debug_group();
        result
    }

    // === Targets & draws ===

    pub fn set_render_target(&mut self, color: TextureId, depth: Option<TextureId>, clear: ClearOp) {
        self.commands.push(RenderCommand::SetRenderTarget {
            color,
            depth,
            clear,
        });
    }

    pub fn draw_renderers(&mut self, renderers: Vec<RendererId>, material: MaterialPass) {
        self.commands
            .push(RenderCommand::DrawRenderers { renderers, material });
    }

    /// Plain full-screen copy, rescaling when the sizes differ.
    pub fn blit(&mut self, source: TextureId, destination: TextureId) {
        self.commands.push(RenderCommand::Blit {
            source,
            destination,
            material: None,
        });
    }

    /// Full-screen blit through `material`.
    pub fn blit_with_material(
        &mut self,
        source: TextureId,
        destination: TextureId,
        material: MaterialPass,
    ) {
        self.commands.push(RenderCommand::Blit {
            source,
            destination,
            material: Some(material),
        });
    }

    // === Material properties ===

    pub fn set_material_int(&mut self, material: MaterialId, name: &'static str, value: i32) {
        self.commands.push(RenderCommand::SetMaterialInt {
            material,
            name,
            value,
        });
    }

    pub fn set_material_float(&mut self, material: MaterialId, name: &'static str, value: f32) {
        self.commands.push(RenderCommand::SetMaterialFloat {
            material,
            name,
            value,
        });
    }

    pub fn set_material_texture(
        &mut self,
        material: MaterialId,
        name: &'static str,
        texture: TextureId,
    ) {
        self.commands.push(RenderCommand::SetMaterialTexture {
            material,
            name,
            texture,
        });
    }

    // === Inspection ===

    #[inline]
    #[must_use]
    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Number of `Blit` commands.
    #[must_use]
    pub fn blit_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, RenderCommand::Blit { .. }))
            .count()
    }

    /// Number of `DrawRenderers` commands.
    #[must_use]
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, RenderCommand::DrawRenderers { .. }))
            .count()
    }

    /// Commands that write texels: target bindings with a clear, draws, blits.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| match c {
                RenderCommand::SetRenderTarget { clear, .. } => !clear.flags.is_empty(),
                RenderCommand::DrawRenderers { .. } | RenderCommand::Blit { .. } => true,
                _ => false,
            })
            .count()
    }

    /// Removes every command, keeping the allocation.
    pub fn clear(&mut self) {
        self.commands.clear();
        self.debug_depth = 0;
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec4;
    use slotmap::SlotMap;

    use super::*;

    #[test]
    fn test_debug_group_is_balanced() {
        let mut textures: SlotMap<TextureId, ()> = SlotMap::with_key();
        let a = textures.insert(());
        let b = textures.insert(());

        let mut cmd = CommandBuffer::new("test");
        cmd.debug_group("scope", |cmd| {
            cmd.set_render_target(a, None, ClearOp::color(Vec4::W));
            cmd.blit(a, b);
        });

        assert_eq!(cmd.len(), 4);
        assert!(matches!(cmd.commands()[0], RenderCommand::PushDebugGroup(_)));
        assert!(matches!(cmd.commands()[3], RenderCommand::PopDebugGroup));
        assert_eq!(cmd.blit_count(), 1);
        assert_eq!(cmd.write_count(), 2);
        assert_eq!(cmd.draw_count(), 0);
    }
}
