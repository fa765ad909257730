//! # Myth Outlines
//!
//! Screen-space outlines built from a blurred identification buffer.
//!
//! Objects on the selected layers are drawn flat-colored into an
//! identification buffer, the buffer is blurred at reduced resolution with a
//! separable ping-pong blur, and the blurred halo is composited over the
//! camera color everywhere the objects themselves are absent.
//!
//! ```text
//! AfterTransparents     Identification   scene ──► _OutlineIdentification
//! AfterPostProcessing   BlurAndMask      identification ──► blur (2N) ──► mask ──► camera
//! ```
//!
//! # Quick start
//!
//! ```rust,ignore
//! use myth_outlines::prelude::*;
//!
//! let mut feature = OutlineFeature::new(OutlineSettings::new(LayerMask::from_layer(3)));
//! feature.create(&mut backend);
//!
//! // per camera, per frame
//! let mut passes = FramePassList::new();
//! feature.add_render_passes(&camera, &mut passes);
//! passes.execute(&mut backend, &camera, &cull_results)?;
//!
//! feature.dispose(&mut backend);
//! ```

#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod backend;
pub mod core;
pub mod errors;
pub mod feature;
pub mod graph;
pub mod passes;
pub mod settings;
pub mod shaders;

pub use errors::{OutlineError, Result};
pub use feature::{OutlineFeature, OutlineMaterials, OutlineShaders};
pub use settings::{LayerMask, OutlineSettings};

pub mod prelude {
    pub use crate::backend::{ScreenRect, SoftwareBackend, WgpuBackend};
    pub use crate::core::{RenderBackend, RendererId, TextureDesc, TextureFormat, TextureId};
    pub use crate::errors::{OutlineError, Result};
    pub use crate::feature::OutlineFeature;
    pub use crate::graph::{
        CameraData, CameraTargets, CameraType, CullResults, FramePassList, RenderStage,
        VisibleRenderer,
    };
    pub use crate::settings::{LayerMask, OutlineSettings};
}
