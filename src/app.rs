use std::rc::Rc;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use log::{error, info};
use pollster::block_on;
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use crate::config::AppConfig;
use crate::model::Model;
use crate::render::{GraphicsApi, SceneRenderer, ShaderProgram, ShadowMap, WgpuContext};

/// Opens the window and renders until it is closed or Escape is pressed.
pub fn run_interactive(config: AppConfig) -> Result<()> {
    let event_loop = EventLoop::new().context("failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = ViewerApp::new(config);
    event_loop
        .run_app(&mut app)
        .context("event loop terminated with error")?;
    app.shutdown();

    match app.last_error.take() {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Compiles both programs, loads the model and allocates the shadow map.
pub fn build_scene(api: Rc<dyn GraphicsApi>, config: &AppConfig) -> Result<SceneRenderer> {
    let shadow_program = ShaderProgram::compile(
        Rc::clone(&api),
        &config.shadow_shader.vertex,
        &config.shadow_shader.fragment,
    )
    .context("failed to build the shadow depth program")?;
    let scene_program = ShaderProgram::compile(
        Rc::clone(&api),
        &config.scene_shader.vertex,
        &config.scene_shader.fragment,
    )
    .context("failed to build the scene program")?;
    let model = Model::load(&config.model_path).context("failed to load the scene model")?;
    info!(
        "loaded {} mesh(es), {} triangles",
        model.meshes.len(),
        model.triangle_count()
    );

    let shadow_map = ShadowMap::new(
        Rc::clone(&api),
        config.shadow_map_size,
        config.shadow_map_size,
    );
    let gpu_model = model.upload(Rc::clone(&api));
    Ok(SceneRenderer::new(
        api,
        shadow_program,
        scene_program,
        shadow_map,
        gpu_model,
    ))
}

struct ViewerApp {
    config: AppConfig,
    context: Option<Rc<WgpuContext>>,
    scene: Option<SceneRenderer>,
    started: Instant,
    last_error: Option<anyhow::Error>,
}

impl ViewerApp {
    fn new(config: AppConfig) -> Self {
        Self {
            config,
            context: None,
            scene: None,
            started: Instant::now(),
            last_error: None,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attributes = Window::default_attributes()
            .with_title(self.config.window_title.clone())
            .with_inner_size(PhysicalSize::new(
                self.config.window_width,
                self.config.window_height,
            ));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .context("failed to create window")?,
        );

        let context = Rc::new(block_on(WgpuContext::new(Arc::clone(&window)))?);
        let api: Rc<dyn GraphicsApi> = context.clone();
        let scene = build_scene(api, &self.config)?;
        if !scene.shadow_map().is_complete() {
            error!("rendering continues with an unreliable shadow target");
        }

        self.context = Some(context);
        self.scene = Some(scene);
        self.started = Instant::now();
        window.request_redraw();
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        self.last_error = Some(err);
        event_loop.exit();
    }

    /// Scene resources go first; they release their GPU objects through the
    /// context.
    fn shutdown(&mut self) {
        self.scene = None;
        self.context = None;
    }
}

impl ApplicationHandler for ViewerApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.context.is_some() {
            return;
        }
        if let Err(err) = self.start(event_loop) {
            self.fail(event_loop, err);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(context) = self.context.clone() else {
            return;
        };
        if window_id != context.window_id() {
            return;
        }

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::KeyboardInput { event, .. }
                if event.state == ElementState::Pressed
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape) =>
            {
                event_loop.exit();
            }
            WindowEvent::Resized(size) => context.resize(size),
            WindowEvent::ScaleFactorChanged { .. } => {
                context.resize(context.window().inner_size());
            }
            WindowEvent::RedrawRequested => {
                let Some(scene) = &self.scene else {
                    return;
                };
                let elapsed = self.started.elapsed().as_secs_f32();
                if let Err(err) = scene.render_frame(elapsed) {
                    self.fail(
                        event_loop,
                        anyhow::Error::new(err).context("frame rendering failed"),
                    );
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(context) = &self.context {
            context.window().request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}
