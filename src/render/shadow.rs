use std::rc::Rc;

use glam::{Mat4, Vec3};
use log::{debug, error};

use crate::error::RenderError;

use super::api::{
    DepthTextureDesc, FramebufferId, FramebufferStatus, GraphicsApi, RenderTarget, TextureFilter,
    TextureId, TextureWrap, Viewport,
};

pub const DEFAULT_SHADOW_SIZE: u32 = 1024;

/// Orthographic frustum of the directional light that casts shadows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightFrustum {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Half width and half height of the orthographic box.
    pub extent: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for LightFrustum {
    fn default() -> Self {
        Self {
            position: Vec3::new(-2.0, 4.0, -1.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            extent: 10.0,
            near: 1.0,
            far: 7.5,
        }
    }
}

impl LightFrustum {
    /// Projection × view, using a `[-1, 1]` clip depth range.
    pub fn light_space_transform(&self) -> Mat4 {
        let projection = Mat4::orthographic_rh_gl(
            -self.extent,
            self.extent,
            -self.extent,
            self.extent,
            self.near,
            self.far,
        );
        let view = Mat4::look_at_rh(self.position, self.target, self.up);
        projection * view
    }
}

/// Depth-only render target sampled by the lighting pass.
///
/// The light-space transform is computed once when the map is built and stays
/// fixed for its lifetime.
pub struct ShadowMap {
    api: Rc<dyn GraphicsApi>,
    width: u32,
    height: u32,
    depth_texture: TextureId,
    framebuffer: FramebufferId,
    status: FramebufferStatus,
    light_space: Mat4,
}

impl ShadowMap {
    pub fn new(api: Rc<dyn GraphicsApi>, width: u32, height: u32) -> Self {
        Self::with_light(api, width, height, LightFrustum::default())
    }

    pub fn with_light(
        api: Rc<dyn GraphicsApi>,
        width: u32,
        height: u32,
        light: LightFrustum,
    ) -> Self {
        // Outside the light frustum the border reads as maximum depth, i.e. lit.
        let depth_texture = api.create_depth_texture(&DepthTextureDesc {
            width,
            height,
            filter: TextureFilter::Nearest,
            wrap: TextureWrap::ClampToBorder([1.0; 4]),
        });
        let framebuffer = api.create_depth_framebuffer(depth_texture);
        let status = api.framebuffer_status(framebuffer);
        if status != FramebufferStatus::Complete {
            error!("{}", RenderError::FramebufferIncomplete(status));
        }
        api.bind_framebuffer(RenderTarget::Default);
        debug!("allocated {width}x{height} shadow map");

        Self {
            api,
            width,
            height,
            depth_texture,
            framebuffer,
            status,
            light_space: light.light_space_transform(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_complete(&self) -> bool {
        self.status == FramebufferStatus::Complete
    }

    pub fn status(&self) -> FramebufferStatus {
        self.status
    }

    /// Redirects draws into the depth texture. The caller clears it.
    pub fn bind_framebuffer(&self) {
        self.api.set_viewport(Viewport::sized(self.width, self.height));
        self.api
            .bind_framebuffer(RenderTarget::Offscreen(self.framebuffer));
    }

    /// Restores the default target; the viewport is left as it was.
    pub fn unbind_framebuffer(&self) {
        self.api.bind_framebuffer(RenderTarget::Default);
    }

    pub fn bind_depth_map_as_texture(&self, unit: u32) {
        self.api.bind_texture(unit, self.depth_texture);
    }

    pub fn light_space_transform(&self) -> Mat4 {
        self.light_space
    }

    pub fn depth_texture(&self) -> TextureId {
        self.depth_texture
    }
}

impl Drop for ShadowMap {
    fn drop(&mut self) {
        self.api.delete_framebuffer(self.framebuffer);
        self.api.delete_texture(self.depth_texture);
    }
}
