//! Backend-agnostic building blocks: textures, materials, recorded commands
//! and the backend contract.

pub mod backend;
pub mod commands;
pub mod material;
pub mod texture;

use slotmap::new_key_type;

new_key_type! {
    /// Host handle of a renderable object (mesh instance, sprite, ...).
    pub struct RendererId;
}

pub use backend::RenderBackend;
pub use commands::{CommandBuffer, RenderCommand};
pub use material::{
    MaterialId, MaterialPass, MaterialProperties, PropertySlot, PropertyValue, ShaderKind,
    ShaderProgram, ShaderProperty,
};
pub use texture::{
    ClearFlags, ClearOp, RenderTarget, TextureDesc, TextureFormat, TextureId,
    reallocate_if_needed, release_target,
};
