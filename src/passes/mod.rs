//! Outline render passes.
//!
//! | Pass | Stage | Reads | Writes |
//! |------|-------|-------|--------|
//! | [`IdentificationPass`] | `AfterTransparents` | scene geometry, camera depth | identification buffer |
//! | [`BlurCompositePass`] | `AfterPostProcessing` | identification buffer, camera color | camera color |

pub mod blur_composite;
pub mod identification;

pub use blur_composite::{BlurCompositeMaterials, BlurCompositePass, BlurDirection, PingPong};
pub use identification::IdentificationPass;
