//! Immediate-mode graphics interface driven by the shader program, the shadow
//! map and the frame loop.
//!
//! Calls are made from the thread that owns the context. Every method takes
//! `&self`; implementations keep their mutable state behind cells so that
//! several owners can share one context through an `Rc`.

use std::fmt;

use glam::{Mat4, Vec3, Vec4};

use crate::error::RenderError;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name(pub u32);
    };
}

handle!(
    /// Compiled, not yet linked, shader stage.
    StageId
);
handle!(
    /// Linked program.
    ProgramId
);
handle!(TextureId);
handle!(FramebufferId);
handle!(MeshId);

/// Resolved uniform slot inside one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vertex => "VERTEX",
            Self::Fragment => "FRAGMENT",
        })
    }
}

/// Value uploaded to a uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

/// Where draws land.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    /// The window surface with its depth buffer.
    #[default]
    Default,
    Offscreen(FramebufferId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn sized(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearFlags {
    Depth,
    ColorDepth([f64; 4]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureFilter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextureWrap {
    ClampToEdge,
    /// Samples outside `[0, 1]` return the border colour.
    ClampToBorder([f32; 4]),
}

/// Description of a depth-format texture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthTextureDesc {
    pub width: u32,
    pub height: u32,
    pub filter: TextureFilter,
    pub wrap: TextureWrap,
}

/// Completeness of a framebuffer after its attachments were set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    MissingAttachment,
    IncompleteAttachment,
    Unsupported,
}

/// The graphics API seen by the renderer.
pub trait GraphicsApi {
    /// Compiles one stage. The error carries the compiler diagnostic.
    fn compile_stage(&self, stage: ShaderStage, source: &str) -> Result<StageId, String>;
    /// Links two compiled stages. The error carries the linker diagnostic.
    fn link_program(&self, vertex: StageId, fragment: StageId) -> Result<ProgramId, String>;
    fn delete_stage(&self, stage: StageId);
    fn delete_program(&self, program: ProgramId);
    fn use_program(&self, program: ProgramId);
    /// Returns `None` when the program has no active uniform with that name.
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;
    fn set_uniform(&self, program: ProgramId, location: UniformLocation, value: UniformValue);

    fn create_depth_texture(&self, desc: &DepthTextureDesc) -> TextureId;
    fn delete_texture(&self, texture: TextureId);
    fn bind_texture(&self, unit: u32, texture: TextureId);

    /// Creates a framebuffer whose only attachment is `depth`; no colour
    /// buffers are drawn or read.
    fn create_depth_framebuffer(&self, depth: TextureId) -> FramebufferId;
    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus;
    fn delete_framebuffer(&self, framebuffer: FramebufferId);
    fn bind_framebuffer(&self, target: RenderTarget);

    fn set_viewport(&self, viewport: Viewport);
    fn clear(&self, flags: ClearFlags);

    /// Uploads interleaved `position.xyz, normal.xyz` vertices.
    fn create_mesh(&self, vertices: &[f32], indices: &[u32]) -> MeshId;
    fn delete_mesh(&self, mesh: MeshId);
    /// Draws with the current program, target, viewport and texture units.
    fn draw_mesh(&self, mesh: MeshId);

    /// Size of the default render target.
    fn surface_size(&self) -> (u32, u32);
    fn present(&self) -> Result<(), RenderError>;
}
