//! Error Types
//!
//! This module defines the error types used throughout the outline pipeline.
//!
//! # Overview
//!
//! The main error type [`OutlineError`] covers the failure modes that can
//! leave this crate:
//! - Invalid persisted settings
//! - Shader resolution and template rendering failures
//! - Material construction failures reported by a backend
//! - Render target allocation failures reported by a backend
//! - GPU initialization failures (wgpu backend)
//!
//! Missing shaders and materials are *not* fatal for a frame: the orchestrator
//! logs them once and the owning pass degrades to a no-op. Allocation errors on
//! the other hand propagate out of the frame as `Err`.
//!
//! # Usage
//!
//! All fallible public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, OutlineError>`.
//!
//! ```rust,ignore
//! use myth_outlines::errors::{OutlineError, Result};
//!
//! fn load_settings(json: &str) -> Result<OutlineSettings> {
//!     OutlineSettings::from_json(json)
//! }
//! ```

use thiserror::Error;

use crate::core::texture::TextureFormat;

/// The main error type for the outline pipeline.
#[derive(Error, Debug)]
pub enum OutlineError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// A settings field is outside of its supported range.
    #[error("Invalid outline setting `{field}`: {reason}")]
    InvalidSettings {
        /// Name of the offending field
        field: &'static str,
        /// Human readable explanation
        reason: String,
    },

    /// Settings JSON could not be parsed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // Shader & Material Errors
    // ========================================================================
    /// No shader program is registered under the requested name.
    #[error("Shader not found: {0}")]
    ShaderNotFound(String),

    /// The shader template could not be rendered.
    #[error("Shader template error: {0}")]
    ShaderTemplate(String),

    /// The backend refused to build a material for the given shader.
    #[error("Failed to create material for shader `{shader}`: {reason}")]
    MaterialCreation {
        /// Shader program name
        shader: String,
        /// Backend-specific reason
        reason: String,
    },

    /// A command referenced a material that does not exist (anymore).
    #[error("Unknown material handle")]
    UnknownMaterial,

    // ========================================================================
    // Render Target Errors
    // ========================================================================
    /// The backend cannot allocate a texture of this format for this usage.
    #[error("Unsupported texture format {format:?} for {usage}")]
    UnsupportedFormat {
        /// Requested format
        format: TextureFormat,
        /// What the texture was requested for
        usage: &'static str,
    },

    /// A render target was requested with a zero width or height.
    #[error("Render target `{name}` has a zero-sized extent")]
    ZeroSizedTarget {
        /// Debug name of the target
        name: String,
    },

    /// A command referenced a texture that does not exist (anymore).
    #[error("Unknown texture handle used as {0}")]
    UnknownTexture(&'static str),

    // ========================================================================
    // GPU Initialization Errors
    // ========================================================================
    /// Failed to request a compatible GPU adapter.
    #[error("Failed to request WGPU adapter: {0}")]
    AdapterRequestFailed(String),

    /// Failed to create the GPU device.
    #[error("Failed to create WGPU device: {0}")]
    DeviceCreateFailed(#[from] wgpu::RequestDeviceError),
}

impl From<minijinja::Error> for OutlineError {
    fn from(err: minijinja::Error) -> Self {
        OutlineError::ShaderTemplate(err.to_string())
    }
}

/// Alias for `Result<T, OutlineError>`.
pub type Result<T> = std::result::Result<T, OutlineError>;
