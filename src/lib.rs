//! Two-pass shadow mapping demo.
//!
//! A depth pass renders the scene from a directional light into an off-screen
//! depth texture; the colour pass then shades the scene from the camera and
//! samples that texture to decide what is in shadow. The pieces that drive the
//! graphics API (shader programs, the shadow map, the frame loop) are written
//! against [`render::GraphicsApi`] so they can run without a window.

pub mod app;
pub mod config;
pub mod error;
pub mod model;
pub mod platform;
pub mod render;
pub mod validate;

pub use config::{AppConfig, CliOptions};
pub use error::{ModelError, RenderError, ShaderError};
pub use model::{GpuModel, MeshData, Model};
pub use platform::{probe_display, DisplayCapability};
pub use render::{SceneRenderer, ShaderProgram, ShadowMap, WgpuContext};
pub use validate::{run_validation, ValidationReport};
