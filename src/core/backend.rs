//! Host Backend Contract
//!
//! [`RenderBackend`] is everything the outline pipeline needs from its host:
//!
//! - a texture allocator (the allocate-if-needed policy itself lives in
//!   [`reallocate_if_needed`](crate::core::texture::reallocate_if_needed)),
//! - material construction from a [`ShaderProgram`],
//! - in-order execution of a recorded [`CommandBuffer`] (draws with an
//!   override material, full-screen blits, material property updates).
//!
//! Two implementations ship with the crate: the CPU reference
//! [`SoftwareBackend`](crate::backend::software::SoftwareBackend) and the GPU
//! [`WgpuBackend`](crate::backend::gpu::WgpuBackend).

use crate::core::commands::CommandBuffer;
use crate::core::material::{MaterialId, MaterialProperties, ShaderProgram};
use crate::core::texture::{TextureDesc, TextureId};
use crate::errors::Result;

pub trait RenderBackend {
    /// Backend name, for logging.
    fn name(&self) -> &'static str;

    /// Creates a texture usable as render target and as sampled input.
    fn create_texture(&mut self, desc: &TextureDesc, label: &str) -> Result<TextureId>;

    /// Releases a texture created by [`create_texture`](Self::create_texture).
    ///
    /// Unknown ids and host-imported textures are ignored.
    fn release_texture(&mut self, id: TextureId);

    /// Returns the descriptor of a live texture.
    fn texture_desc(&self, id: TextureId) -> Option<TextureDesc>;

    /// Builds a material for `program` with its initial property values.
    fn create_material(
        &mut self,
        program: &ShaderProgram,
        properties: &MaterialProperties,
    ) -> Result<MaterialId>;

    /// Destroys a material. Unknown ids are ignored.
    fn destroy_material(&mut self, id: MaterialId);

    /// Executes `commands` in recording order.
    fn submit(&mut self, commands: &CommandBuffer) -> Result<()>;
}
