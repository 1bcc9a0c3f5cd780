pub mod api;
pub mod frame;
pub mod native;
pub mod reflect;
pub mod shader;
pub mod shadow;

#[cfg(test)]
pub(crate) mod recording;

pub use api::{
    ClearFlags, DepthTextureDesc, FramebufferId, FramebufferStatus, GraphicsApi, MeshId,
    ProgramId, RenderTarget, ShaderStage, StageId, TextureFilter, TextureId, TextureWrap,
    UniformLocation, UniformValue, Viewport,
};
pub use frame::{model_transform, FrameTransforms, SceneRenderer, SHADOW_MAP_TEXTURE_UNIT};
pub use native::WgpuContext;
pub use shader::ShaderProgram;
pub use shadow::{LightFrustum, ShadowMap, DEFAULT_SHADOW_SIZE};
