//! Backends executing recorded outline commands.
//!
//! - [`software`]: CPU reference with exact texel semantics, used by tests,
//!   benches and the headless demo
//! - [`gpu`]: `wgpu` device host

pub mod gpu;
pub mod software;

pub use gpu::{OutlineVertex, WgpuBackend};
pub use software::{ScreenRect, SoftwareBackend, SoftwareStats};
