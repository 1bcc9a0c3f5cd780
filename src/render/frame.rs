use std::rc::Rc;

use glam::{Mat4, Vec3};

use crate::error::RenderError;
use crate::model::GpuModel;

use super::api::{ClearFlags, GraphicsApi, Viewport};
use super::shader::ShaderProgram;
use super::shadow::ShadowMap;

/// Texture unit the scene shader samples the depth map from.
pub const SHADOW_MAP_TEXTURE_UNIT: u32 = 1;
pub const CLEAR_COLOR: [f64; 4] = [0.1, 0.1, 0.12, 1.0];
pub const CAMERA_POSITION: Vec3 = Vec3::new(0.0, 2.0, 6.0);
pub const LIGHT_POSITION: Vec3 = Vec3::new(-2.0, 4.0, -1.0);
/// Model spin around +Y.
pub const ROTATION_DEGREES_PER_SECOND: f32 = 25.0;

const FIELD_OF_VIEW_DEGREES: f32 = 45.0;
const NEAR_PLANE: f32 = 0.1;
const FAR_PLANE: f32 = 100.0;

/// Scene transforms shared by both passes.
///
/// Projection and view are fixed for the lifetime of the renderer; only the
/// model transform changes between frames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTransforms {
    pub projection: Mat4,
    pub view: Mat4,
    pub camera_position: Vec3,
    pub light_position: Vec3,
}

impl FrameTransforms {
    pub fn new(aspect: f32) -> Self {
        Self {
            projection: Mat4::perspective_rh_gl(
                FIELD_OF_VIEW_DEGREES.to_radians(),
                aspect.max(0.01),
                NEAR_PLANE,
                FAR_PLANE,
            ),
            view: Mat4::look_at_rh(CAMERA_POSITION, Vec3::ZERO, Vec3::Y),
            camera_position: CAMERA_POSITION,
            light_position: LIGHT_POSITION,
        }
    }
}

impl Default for FrameTransforms {
    fn default() -> Self {
        Self::new(800.0 / 600.0)
    }
}

/// Model transform after `elapsed` seconds.
pub fn model_transform(elapsed: f32) -> Mat4 {
    Mat4::from_rotation_y((elapsed * ROTATION_DEGREES_PER_SECOND).to_radians())
}

/// Owns everything drawn each frame and sequences the depth and colour passes.
pub struct SceneRenderer {
    api: Rc<dyn GraphicsApi>,
    shadow_program: ShaderProgram,
    scene_program: ShaderProgram,
    shadow_map: ShadowMap,
    model: GpuModel,
    transforms: FrameTransforms,
}

impl SceneRenderer {
    pub fn new(
        api: Rc<dyn GraphicsApi>,
        shadow_program: ShaderProgram,
        scene_program: ShaderProgram,
        shadow_map: ShadowMap,
        model: GpuModel,
    ) -> Self {
        Self {
            api,
            shadow_program,
            scene_program,
            shadow_map,
            model,
            transforms: FrameTransforms::default(),
        }
    }

    pub fn transforms(&self) -> &FrameTransforms {
        &self.transforms
    }

    pub fn shadow_map(&self) -> &ShadowMap {
        &self.shadow_map
    }

    /// Renders and presents one frame. The pass order is fixed: the colour
    /// pass samples what the depth pass wrote.
    pub fn render_frame(&self, elapsed: f32) -> Result<(), RenderError> {
        let model = model_transform(elapsed);
        let light_space = self.shadow_map.light_space_transform();

        self.shadow_map.bind_framebuffer();
        self.api.clear(ClearFlags::Depth);
        self.shadow_program.activate();
        self.shadow_program
            .set_mat4("light_space_matrix", light_space);
        self.shadow_program.set_mat4("model", model);
        self.model.draw();
        self.shadow_map.unbind_framebuffer();

        let (width, height) = self.api.surface_size();
        self.api.set_viewport(Viewport::sized(width, height));
        self.api.clear(ClearFlags::ColorDepth(CLEAR_COLOR));
        let scene = &self.scene_program;
        scene.activate();
        scene.set_mat4("projection", self.transforms.projection);
        scene.set_mat4("view", self.transforms.view);
        scene.set_mat4("model", model);
        scene.set_mat4("light_space_matrix", light_space);
        scene.set_vec3("light_pos", self.transforms.light_position);
        scene.set_vec3("view_pos", self.transforms.camera_position);
        self.shadow_map
            .bind_depth_map_as_texture(SHADOW_MAP_TEXTURE_UNIT);
        scene.set_int("shadow_map", SHADOW_MAP_TEXTURE_UNIT as i32);
        self.model.draw();

        self.api.present()
    }
}
