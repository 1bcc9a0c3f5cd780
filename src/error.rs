use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::render::{FramebufferStatus, ShaderStage};

/// Failures raised while building a [`crate::render::ShaderProgram`].
#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("failed to read shader source {}: {source}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{stage} shader failed to compile:\n{log}")]
    Compilation { stage: ShaderStage, log: String },
    #[error("shader program failed to link:\n{log}")]
    Link { log: String },
}

/// Failures raised while importing a model file.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read model {}: {source}", path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to import model {}: {source}", path.display())]
    Import {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },
    #[error("model {} does not contain any triangles", path.display())]
    Empty { path: PathBuf },
}

impl ModelError {
    /// Returns true when the file itself could not be read.
    pub fn is_file_read(&self) -> bool {
        matches!(self, Self::FileRead { .. })
    }
}

/// Failures raised by the graphics context or during a frame.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to initialize graphics context: {0}")]
    ContextInit(String),
    #[error("graphics adapter does not meet the minimum requirements: {0}")]
    UnsupportedVersion(String),
    #[error("shadow framebuffer is not complete ({0:?})")]
    FramebufferIncomplete(FramebufferStatus),
    #[error("graphics device error: {0}")]
    Device(String),
    #[error("GPU is out of memory")]
    OutOfMemory,
}
