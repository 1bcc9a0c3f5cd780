use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info, warn};
use pollster::block_on;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;
use winit::window::{Window, WindowId};

use crate::error::RenderError;
use crate::model::VERTEX_STRIDE;

use super::api::{
    ClearFlags, DepthTextureDesc, FramebufferId, FramebufferStatus, GraphicsApi, MeshId,
    ProgramId, RenderTarget, ShaderStage, StageId, TextureFilter, TextureId, TextureWrap,
    UniformLocation, UniformValue, Viewport,
};
use super::reflect::{
    self, ProgramInterface, StageReflection, TextureKind, UniformKind, UniformSlot,
};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// [`GraphicsApi`] on top of wgpu.
///
/// Draw calls are recorded into passes, one per render-target switch, and
/// encoded into a single command buffer when the frame is presented. Each draw
/// snapshots the current uniform values of its program.
pub struct WgpuContext {
    window: Arc<Window>,
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: RefCell<wgpu::SurfaceConfiguration>,
    depth: RefCell<DepthBuffer>,
    border_clamp: bool,
    resources: RefCell<Resources>,
    frame: RefCell<FrameState>,
}

impl WgpuContext {
    /// Initializes the device and swap chain for the provided window.
    pub async fn new(window: Arc<Window>) -> Result<Self, RenderError> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(RenderError::ContextInit("window has zero area".into()));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: Default::default(),
            backend_options: Default::default(),
        });
        let surface = instance
            .create_surface(Arc::clone(&window))
            .map_err(|err| RenderError::ContextInit(format!("failed to create surface: {err}")))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| RenderError::ContextInit(format!("failed to acquire GPU adapter: {err}")))?;
        check_adapter(&adapter)?;

        let border_clamp = adapter
            .features()
            .contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER);
        if !border_clamp {
            warn!("adapter lacks clamp-to-border sampling; shadow lookups clamp to edge");
        }
        let required_features = if border_clamp {
            wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER
        } else {
            wgpu::Features::empty()
        };

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("umbra-device"),
                required_features,
                required_limits: wgpu::Limits::downlevel_defaults()
                    .using_resolution(adapter.limits()),
                experimental_features: Default::default(),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await
            .map_err(|err| RenderError::ContextInit(format!("failed to create GPU device: {err}")))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| RenderError::ContextInit("surface reports no formats".into()))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let info = adapter.get_info();
        info!(
            "using {} ({:?}) with surface format {surface_format:?}",
            info.name, info.backend
        );

        let depth = DepthBuffer::create(&device, config.width, config.height);
        Ok(Self {
            window,
            surface,
            device,
            queue,
            config: RefCell::new(config),
            depth: RefCell::new(depth),
            border_clamp,
            resources: RefCell::new(Resources::default()),
            frame: RefCell::new(FrameState::default()),
        })
    }

    /// Returns the identifier of the window owned by the context.
    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    /// Exposes the inner window for event handling.
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Resizes the swap chain and window depth buffer.
    pub fn resize(&self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        let mut config = self.config.borrow_mut();
        config.width = new_size.width;
        config.height = new_size.height;
        self.surface.configure(&self.device, &config);
        *self.depth.borrow_mut() =
            DepthBuffer::create(&self.device, new_size.width, new_size.height);
    }

    fn target_size(&self, target: RenderTarget, resources: &Resources) -> Option<(u32, u32)> {
        match target {
            RenderTarget::Default => {
                let config = self.config.borrow();
                Some((config.width, config.height))
            }
            RenderTarget::Offscreen(framebuffer) => resources
                .depth_attachment(framebuffer)
                .map(|texture| (texture.width, texture.height)),
        }
    }

    fn encode_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pass: &PassRecord,
        surface_view: &wgpu::TextureView,
        window_depth: &wgpu::TextureView,
        resources: &Resources,
    ) {
        let (color_view, depth_view, label) = match pass.target {
            RenderTarget::Default => (Some(surface_view), window_depth, "default-pass"),
            RenderTarget::Offscreen(framebuffer) => {
                let Some(texture) = resources.depth_attachment(framebuffer) else {
                    warn!("framebuffer {framebuffer:?} was deleted before the frame was presented");
                    return;
                };
                (None, &texture.view, "offscreen-pass")
            }
        };
        let Some((target_width, target_height)) = self.target_size(pass.target, resources) else {
            return;
        };

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = color_view
            .map(|view| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: pass.clear_color.map_or(wgpu::LoadOp::Load, |[r, g, b, a]| {
                            wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a })
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .into_iter()
            .collect();

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &color_attachments,
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: if pass.clear_depth {
                        wgpu::LoadOp::Clear(1.0)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for draw in &pass.draws {
            let (Some(program), Some(mesh)) = (
                resources.programs.get(&draw.program),
                resources.meshes.get(&draw.mesh),
            ) else {
                continue;
            };
            render_pass.set_pipeline(&program.pipeline);
            if let Some(viewport) = draw.viewport {
                let Viewport {
                    x,
                    y,
                    width,
                    height,
                } = clamp_viewport(viewport, target_width, target_height);
                render_pass.set_viewport(
                    x as f32,
                    y as f32,
                    width as f32,
                    height as f32,
                    0.0,
                    1.0,
                );
            }
            render_pass.set_bind_group(0, &draw.uniforms, &[]);
            if let Some(textures) = &draw.textures {
                render_pass.set_bind_group(1, textures, &[]);
            }
            render_pass.set_vertex_buffer(0, mesh.vertex.slice(..));
            render_pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
            render_pass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
    }
}

impl GraphicsApi for WgpuContext {
    fn compile_stage(&self, stage: ShaderStage, source: &str) -> Result<StageId, String> {
        let reflection = reflect::compile_stage(stage, source)?;

        let label = format!("{}-stage", reflection.entry_point);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label.as_str()),
                source: wgpu::ShaderSource::Wgsl(Cow::Owned(source.to_string())),
            });
        if let Some(err) = block_on(self.device.pop_error_scope()) {
            return Err(err.to_string());
        }

        let mut resources = self.resources.borrow_mut();
        let id = StageId(resources.allocate());
        resources
            .stages
            .insert(id, CompiledStage { module, reflection });
        Ok(id)
    }

    fn link_program(&self, vertex: StageId, fragment: StageId) -> Result<ProgramId, String> {
        let mut resources = self.resources.borrow_mut();
        let (Some(vs), Some(fs)) = (
            resources.stages.get(&vertex),
            resources.stages.get(&fragment),
        ) else {
            return Err("unknown shader stage".into());
        };
        let interface = reflect::link_interface(&vs.reflection, &fs.reflection)?;

        let uniform_entry = [wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        }];
        let uniform_entries: &[wgpu::BindGroupLayoutEntry] = if interface.block_size > 0 {
            &uniform_entry
        } else {
            &[]
        };
        let uniform_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("program-uniform-layout"),
                entries: uniform_entries,
            });
        let texture_layout = (!interface.textures.is_empty())
            .then(|| texture_bind_group_layout(&self.device, &interface));

        let mut bind_group_layouts = vec![&uniform_layout];
        if let Some(layout) = &texture_layout {
            bind_group_layouts.push(layout);
        }
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("program-pipeline-layout"),
                bind_group_layouts: &bind_group_layouts,
                push_constant_ranges: &[],
            });

        let color_targets: Vec<Option<wgpu::ColorTargetState>> = if interface.has_color_output {
            vec![Some(wgpu::ColorTargetState {
                format: self.config.borrow().format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })]
        } else {
            Vec::new()
        };

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("program-pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vs.module,
                    entry_point: Some(vs.reflection.entry_point.as_str()),
                    compilation_options: Default::default(),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: (VERTEX_STRIDE * std::mem::size_of::<f32>()) as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &[
                            wgpu::VertexAttribute {
                                format: wgpu::VertexFormat::Float32x3,
                                offset: 0,
                                shader_location: 0,
                            },
                            wgpu::VertexAttribute {
                                format: wgpu::VertexFormat::Float32x3,
                                offset: (3 * std::mem::size_of::<f32>()) as u64,
                                shader_location: 1,
                            },
                        ],
                    }],
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: Default::default(),
                    bias: Default::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &fs.module,
                    entry_point: Some(fs.reflection.entry_point.as_str()),
                    compilation_options: Default::default(),
                    targets: &color_targets,
                }),
                multiview: None,
                cache: None,
            });
        if let Some(err) = block_on(self.device.pop_error_scope()) {
            return Err(err.to_string());
        }

        let program = LinkedProgram {
            pipeline,
            uniform_layout,
            texture_layout,
            staging: vec![0; interface.block_size as usize],
            texture_units: vec![0; interface.textures.len()],
            interface,
        };
        let id = ProgramId(resources.allocate());
        resources.programs.insert(id, program);
        Ok(id)
    }

    fn delete_stage(&self, stage: StageId) {
        self.resources.borrow_mut().stages.remove(&stage);
    }

    fn delete_program(&self, program: ProgramId) {
        self.resources.borrow_mut().programs.remove(&program);
        let mut frame = self.frame.borrow_mut();
        if frame.active_program == Some(program) {
            frame.active_program = None;
        }
    }

    fn use_program(&self, program: ProgramId) {
        self.frame.borrow_mut().active_program = Some(program);
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.resources
            .borrow()
            .programs
            .get(&program)?
            .interface
            .find(name)
            .map(|index| UniformLocation(index as u32))
    }

    fn set_uniform(&self, program: ProgramId, location: UniformLocation, value: UniformValue) {
        if let Some(program) = self.resources.borrow_mut().programs.get_mut(&program) {
            program.write(location, value);
        }
    }

    fn create_depth_texture(&self, desc: &DepthTextureDesc) -> TextureId {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-map"),
            size: wgpu::Extent3d {
                width: desc.width.max(1),
                height: desc.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let filter = match desc.filter {
            TextureFilter::Nearest => wgpu::FilterMode::Nearest,
            TextureFilter::Linear => wgpu::FilterMode::Linear,
        };
        let (address_mode, border_color) = match desc.wrap {
            TextureWrap::ClampToBorder(color) if self.border_clamp => (
                wgpu::AddressMode::ClampToBorder,
                Some(sampler_border(color)),
            ),
            TextureWrap::ClampToBorder(_) | TextureWrap::ClampToEdge => {
                (wgpu::AddressMode::ClampToEdge, None)
            }
        };
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("depth-map-sampler"),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: address_mode,
            mag_filter: filter,
            min_filter: filter,
            border_color,
            ..Default::default()
        });

        let mut resources = self.resources.borrow_mut();
        let id = TextureId(resources.allocate());
        debug!("created {}x{} depth texture {id:?}", desc.width, desc.height);
        resources.textures.insert(
            id,
            DepthTexture {
                _texture: texture,
                view,
                sampler,
                width: desc.width.max(1),
                height: desc.height.max(1),
            },
        );
        id
    }

    fn delete_texture(&self, texture: TextureId) {
        self.resources.borrow_mut().textures.remove(&texture);
        self.frame
            .borrow_mut()
            .texture_units
            .retain(|_, bound| *bound != texture);
    }

    fn bind_texture(&self, unit: u32, texture: TextureId) {
        self.frame.borrow_mut().texture_units.insert(unit, texture);
    }

    fn create_depth_framebuffer(&self, depth: TextureId) -> FramebufferId {
        let mut resources = self.resources.borrow_mut();
        let id = FramebufferId(resources.allocate());
        resources.framebuffers.insert(id, depth);
        id
    }

    fn framebuffer_status(&self, framebuffer: FramebufferId) -> FramebufferStatus {
        let resources = self.resources.borrow();
        match resources.framebuffers.get(&framebuffer) {
            None => FramebufferStatus::Unsupported,
            Some(texture) if !resources.textures.contains_key(texture) => {
                FramebufferStatus::MissingAttachment
            }
            Some(_) => FramebufferStatus::Complete,
        }
    }

    fn delete_framebuffer(&self, framebuffer: FramebufferId) {
        self.resources
            .borrow_mut()
            .framebuffers
            .remove(&framebuffer);
        let mut frame = self.frame.borrow_mut();
        if frame.target == RenderTarget::Offscreen(framebuffer) {
            frame.target = RenderTarget::Default;
        }
    }

    fn bind_framebuffer(&self, target: RenderTarget) {
        self.frame.borrow_mut().target = target;
    }

    fn set_viewport(&self, viewport: Viewport) {
        self.frame.borrow_mut().viewport = Some(viewport);
    }

    fn clear(&self, flags: ClearFlags) {
        let mut frame = self.frame.borrow_mut();
        let pass = frame.open_pass(true);
        pass.clear_depth = true;
        if let ClearFlags::ColorDepth(color) = flags {
            pass.clear_color = Some(color);
        }
    }

    fn create_mesh(&self, vertices: &[f32], indices: &[u32]) -> MeshId {
        let mut resources = self.resources.borrow_mut();
        let id = MeshId(resources.allocate());
        let label = format!("mesh-{}", id.0);
        resources
            .meshes
            .insert(id, MeshBuffers::from_slices(&self.device, vertices, indices, &label));
        id
    }

    fn delete_mesh(&self, mesh: MeshId) {
        self.resources.borrow_mut().meshes.remove(&mesh);
    }

    fn draw_mesh(&self, mesh: MeshId) {
        let mut frame = self.frame.borrow_mut();
        let Some(program_id) = frame.active_program else {
            warn!("draw of {mesh:?} skipped: no active program");
            return;
        };
        let resources = self.resources.borrow();
        let Some(program) = resources.programs.get(&program_id) else {
            warn!("draw of {mesh:?} skipped: program {program_id:?} was deleted");
            return;
        };
        if !resources.meshes.contains_key(&mesh) {
            warn!("draw of unknown mesh {mesh:?} skipped");
            return;
        }

        let uniforms = program.uniform_bind_group(&self.device);
        let textures =
            match program.texture_bind_group(&self.device, &frame.texture_units, &resources) {
                Ok(textures) => textures,
                Err(name) => {
                    warn!("draw of {mesh:?} skipped: `{name}` has no texture bound to its unit");
                    return;
                }
            };
        let viewport = frame.viewport;
        frame.open_pass(false).draws.push(DrawRecord {
            program: program_id,
            mesh,
            viewport,
            uniforms,
            textures,
        });
    }

    fn surface_size(&self) -> (u32, u32) {
        let config = self.config.borrow();
        (config.width, config.height)
    }

    fn present(&self) -> Result<(), RenderError> {
        let passes = std::mem::take(&mut self.frame.borrow_mut().passes);
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config.borrow());
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(RenderError::OutOfMemory),
            Err(err) => {
                info!("skipping frame: {err}");
                return Ok(());
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame-encoder"),
            });

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        {
            let resources = self.resources.borrow();
            let depth = self.depth.borrow();
            for pass in &passes {
                self.encode_pass(&mut encoder, pass, &view, &depth.view, &resources);
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        if let Some(err) = block_on(self.device.pop_error_scope()) {
            return Err(RenderError::Device(err.to_string()));
        }
        output.present();
        Ok(())
    }
}

fn check_adapter(adapter: &wgpu::Adapter) -> Result<(), RenderError> {
    let info = adapter.get_info();
    let downlevel = adapter.get_downlevel_capabilities();
    if matches!(downlevel.shader_model, wgpu::ShaderModel::Sm2) {
        return Err(RenderError::UnsupportedVersion(format!(
            "{} supports shader model 2 only, shader model 4 is required",
            info.name
        )));
    }
    let depth = adapter.get_texture_format_features(DEPTH_FORMAT);
    let needed = wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
    if !depth.allowed_usages.contains(needed) {
        return Err(RenderError::UnsupportedVersion(format!(
            "{} cannot render to and sample {DEPTH_FORMAT:?}",
            info.name
        )));
    }
    Ok(())
}

fn sampler_border(color: [f32; 4]) -> wgpu::SamplerBorderColor {
    match color {
        [1.0, 1.0, 1.0, 1.0] => wgpu::SamplerBorderColor::OpaqueWhite,
        [0.0, 0.0, 0.0, 1.0] => wgpu::SamplerBorderColor::OpaqueBlack,
        _ => wgpu::SamplerBorderColor::TransparentBlack,
    }
}

fn texture_bind_group_layout(
    device: &wgpu::Device,
    interface: &ProgramInterface,
) -> wgpu::BindGroupLayout {
    let mut entries = Vec::with_capacity(interface.textures.len() * 2);
    for slot in &interface.textures {
        let sample_type = match slot.kind {
            TextureKind::Depth => wgpu::TextureSampleType::Depth,
            TextureKind::Float => wgpu::TextureSampleType::Float { filterable: false },
        };
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: slot.texture_binding,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type,
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        });
        // Depth maps are sampled with nearest filtering only.
        let sampler = if slot.sampler.comparison {
            wgpu::SamplerBindingType::Comparison
        } else {
            wgpu::SamplerBindingType::NonFiltering
        };
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: slot.sampler.binding,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: wgpu::BindingType::Sampler(sampler),
            count: None,
        });
    }
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("program-texture-layout"),
        entries: &entries,
    })
}

#[derive(Default)]
struct Resources {
    next_id: u32,
    stages: HashMap<StageId, CompiledStage>,
    programs: HashMap<ProgramId, LinkedProgram>,
    textures: HashMap<TextureId, DepthTexture>,
    framebuffers: HashMap<FramebufferId, TextureId>,
    meshes: HashMap<MeshId, MeshBuffers>,
}

impl Resources {
    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn depth_attachment(&self, framebuffer: FramebufferId) -> Option<&DepthTexture> {
        self.framebuffers
            .get(&framebuffer)
            .and_then(|texture| self.textures.get(texture))
    }
}

struct CompiledStage {
    module: wgpu::ShaderModule,
    reflection: StageReflection,
}

struct LinkedProgram {
    pipeline: wgpu::RenderPipeline,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: Option<wgpu::BindGroupLayout>,
    interface: ProgramInterface,
    /// CPU copy of the uniform block.
    staging: Vec<u8>,
    /// Texture unit per entry of `interface.textures`.
    texture_units: Vec<u32>,
}

impl LinkedProgram {
    fn write(&mut self, location: UniformLocation, value: UniformValue) {
        write_uniform(
            &self.interface.uniforms,
            &mut self.staging,
            &mut self.texture_units,
            location,
            value,
        );
    }

    fn uniform_bind_group(&self, device: &wgpu::Device) -> wgpu::BindGroup {
        if self.staging.is_empty() {
            return device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("program-uniforms"),
                layout: &self.uniform_layout,
                entries: &[],
            });
        }
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("program-uniforms"),
            contents: &self.staging,
            usage: wgpu::BufferUsages::UNIFORM,
        });
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("program-uniforms"),
            layout: &self.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
        })
    }

    /// Returns the name of the first texture slot with nothing bound to its
    /// unit on failure.
    fn texture_bind_group(
        &self,
        device: &wgpu::Device,
        units: &HashMap<u32, TextureId>,
        resources: &Resources,
    ) -> Result<Option<wgpu::BindGroup>, String> {
        let Some(layout) = &self.texture_layout else {
            return Ok(None);
        };
        let mut entries = Vec::with_capacity(self.interface.textures.len() * 2);
        for (slot, unit) in self.interface.textures.iter().zip(&self.texture_units) {
            let texture = units
                .get(unit)
                .and_then(|id| resources.textures.get(id))
                .ok_or_else(|| slot.name.clone())?;
            entries.push(wgpu::BindGroupEntry {
                binding: slot.texture_binding,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: slot.sampler.binding,
                resource: wgpu::BindingResource::Sampler(&texture.sampler),
            });
        }
        Ok(Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("program-textures"),
            layout,
            entries: &entries,
        })))
    }
}

/// Stores `value` into the CPU copy of a uniform block. Sampler slots route an
/// `Int` to `texture_units` instead; values of the wrong type are dropped.
fn write_uniform(
    uniforms: &[UniformSlot],
    staging: &mut [u8],
    texture_units: &mut [u32],
    location: UniformLocation,
    value: UniformValue,
) {
    let Some(slot) = uniforms.get(location.0 as usize) else {
        return;
    };
    let offset = slot.offset as usize;
    match (slot.kind, value) {
        (UniformKind::Sampler(texture), UniformValue::Int(unit)) => {
            if let Some(bound) = texture_units.get_mut(texture) {
                *bound = unit.max(0) as u32;
            }
        }
        (UniformKind::Int, UniformValue::Int(v)) => put(staging, offset, bytemuck::bytes_of(&v)),
        (UniformKind::Uint, UniformValue::Int(v)) => {
            put(staging, offset, bytemuck::bytes_of(&(v as u32)));
        }
        (UniformKind::Int | UniformKind::Uint, UniformValue::Bool(v)) => {
            put(staging, offset, bytemuck::bytes_of(&u32::from(v)));
        }
        (UniformKind::Float, UniformValue::Float(v)) => put(staging, offset, bytemuck::bytes_of(&v)),
        (UniformKind::Vec3, UniformValue::Vec3(v)) => {
            put(staging, offset, bytemuck::cast_slice(&v.to_array()));
        }
        (UniformKind::Vec4, UniformValue::Vec4(v)) => {
            put(staging, offset, bytemuck::cast_slice(&v.to_array()));
        }
        (UniformKind::Mat4, UniformValue::Mat4(m)) => {
            put(staging, offset, bytemuck::cast_slice(&m.to_cols_array()));
        }
        (kind, value) => {
            warn!("uniform `{}` is {kind:?}; ignoring {value:?}", slot.name);
        }
    }
}

fn put(staging: &mut [u8], offset: usize, bytes: &[u8]) {
    if let Some(dst) = staging.get_mut(offset..offset + bytes.len()) {
        dst.copy_from_slice(bytes);
    }
}

struct DepthTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    width: u32,
    height: u32,
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn from_slices(device: &wgpu::Device, vertices: &[f32], indices: &[u32], label: &str) -> Self {
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(format!("{label}-vertices").as_str()),
            contents: bytemuck::cast_slice(vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(format!("{label}-indices").as_str()),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex,
            index,
            index_count: indices.len() as u32,
        }
    }
}

struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("window-depth"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

#[derive(Default)]
struct FrameState {
    target: RenderTarget,
    viewport: Option<Viewport>,
    active_program: Option<ProgramId>,
    texture_units: HashMap<u32, TextureId>,
    passes: Vec<PassRecord>,
}

impl FrameState {
    fn open_pass(&mut self, clearing: bool) -> &mut PassRecord {
        open_pass(&mut self.passes, self.target, clearing)
    }
}

/// Returns the pass collecting work for `target`, starting a new one on a
/// target switch or, for clears, once the open pass has draws.
fn open_pass<D>(
    passes: &mut Vec<PassRecord<D>>,
    target: RenderTarget,
    clearing: bool,
) -> &mut PassRecord<D> {
    let reusable = passes
        .last()
        .is_some_and(|pass| pass.target == target && !(clearing && !pass.draws.is_empty()));
    if !reusable {
        passes.push(PassRecord {
            target,
            clear_color: None,
            clear_depth: false,
            draws: Vec::new(),
        });
    }
    let last = passes.len() - 1;
    &mut passes[last]
}

/// Keeps a viewport inside a `width` x `height` target and at least one pixel
/// in size.
fn clamp_viewport(viewport: Viewport, width: u32, height: u32) -> Viewport {
    let x = viewport.x.min(width.saturating_sub(1));
    let y = viewport.y.min(height.saturating_sub(1));
    Viewport {
        x,
        y,
        width: viewport.width.min(width.saturating_sub(x)).max(1),
        height: viewport.height.min(height.saturating_sub(y)).max(1),
    }
}

struct PassRecord<D = DrawRecord> {
    target: RenderTarget,
    clear_color: Option<[f64; 4]>,
    clear_depth: bool,
    draws: Vec<D>,
}

struct DrawRecord {
    program: ProgramId,
    mesh: MeshId,
    viewport: Option<Viewport>,
    uniforms: wgpu::BindGroup,
    textures: Option<wgpu::BindGroup>,
}
