//! Graphics double that records every call for unit tests.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use crate::error::RenderError;

use super::api::{
    ClearFlags, DepthTextureDesc, FramebufferId, FramebufferStatus, GraphicsApi, MeshId,
    ProgramId, RenderTarget, ShaderStage, StageId, TextureId, UniformLocation, UniformValue,
    Viewport,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CompileStage(ShaderStage),
    LinkProgram(ProgramId),
    DeleteStage(StageId),
    DeleteProgram(ProgramId),
    UseProgram(ProgramId),
    UniformLocation(ProgramId, String),
    SetUniform(ProgramId, String, UniformValue),
    CreateDepthTexture(DepthTextureDesc),
    DeleteTexture(TextureId),
    BindTexture(u32, TextureId),
    CreateFramebuffer(FramebufferId),
    DeleteFramebuffer(FramebufferId),
    BindFramebuffer(RenderTarget),
    Viewport(Viewport),
    Clear(ClearFlags),
    CreateMesh(MeshId),
    DeleteMesh(MeshId),
    Draw {
        mesh: MeshId,
        program: Option<ProgramId>,
        target: RenderTarget,
    },
    Present,
}

pub struct RecordingApi {
    calls: RefCell<Vec<Call>>,
    next_id: Cell<u32>,
    uniforms: Vec<String>,
    failing_stage: Cell<Option<ShaderStage>>,
    failing_link: Cell<bool>,
    framebuffer_status: Cell<FramebufferStatus>,
    target: Cell<RenderTarget>,
    program: Cell<Option<ProgramId>>,
    live: RefCell<HashSet<u32>>,
    attachments: RefCell<HashMap<FramebufferId, TextureId>>,
    depth_writes: RefCell<HashMap<TextureId, usize>>,
}

impl RecordingApi {
    /// `uniforms` are the names every linked program reports as active.
    pub fn new(uniforms: &[&str]) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
            uniforms: uniforms.iter().map(|name| name.to_string()).collect(),
            failing_stage: Cell::new(None),
            failing_link: Cell::new(false),
            framebuffer_status: Cell::new(FramebufferStatus::Complete),
            target: Cell::new(RenderTarget::Default),
            program: Cell::new(None),
            live: RefCell::new(HashSet::new()),
            attachments: RefCell::new(HashMap::new()),
            depth_writes: RefCell::new(HashMap::new()),
        }
    }

    pub fn fail_stage(&self, stage: ShaderStage) {
        self.failing_stage.set(Some(stage));
    }

    pub fn fail_link(&self) {
        self.failing_link.set(true);
    }

    pub fn report_framebuffer_status(&self, status: FramebufferStatus) {
        self.framebuffer_status.set(status);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.borrow_mut())
    }

    pub fn location_lookups(&self, name: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| matches!(call, Call::UniformLocation(_, n) if n == name))
            .count()
    }

    /// Number of allocated objects that were never deleted.
    pub fn live_objects(&self) -> usize {
        self.live.borrow().len()
    }

    pub fn current_target(&self) -> RenderTarget {
        self.target.get()
    }

    pub fn depth_writes(&self, texture: TextureId) -> usize {
        self.depth_writes
            .borrow()
            .get(&texture)
            .copied()
            .unwrap_or(0)
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn allocate(&self) -> u32 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.live.borrow_mut().insert(id);
        id
    }

    fn release(&self, id: u32) {
        self.live.borrow_mut().remove(&id);
    }
}

impl GraphicsApi for RecordingApi {
    fn compile_stage(&self, stage: ShaderStage, _source: &str) -> Result<StageId, String> {
        self.record(Call::CompileStage(stage));
        if self.failing_stage.get() == Some(stage) {
            return Err(format!("0:1: syntax error in {stage} stage"));
        }
        Ok(StageId(self.allocate()))
    }

    fn link_program(&self, _vertex: StageId, _fragment: StageId) -> Result<ProgramId, String> {
        if self.failing_link.get() {
            return Err("varying `v_normal` has no producer".into());
        }
        let program = ProgramId(self.allocate());
        self.record(Call::LinkProgram(program));
        Ok(program)
    }

    fn delete_stage(&self, stage: StageId) {
        self.release(stage.0);
        self.record(Call::DeleteStage(stage));
    }

    fn delete_program(&self, program: ProgramId) {
        self.release(program.0);
        self.record(Call::DeleteProgram(program));
    }

    fn use_program(&self, program: ProgramId) {
        self.program.set(Some(program));
        self.record(Call::UseProgram(program));
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        self.record(Call::UniformLocation(program, name.to_string()));
        self.uniforms
            .iter()
            .position(|known| known == name)
            .map(|index| UniformLocation(index as u32))
    }

    fn set_uniform(&self, program: ProgramId, location: UniformLocation, value: UniformValue) {
        let name = self.uniforms[location.0 as usize].clone();
        self.record(Call::SetUniform(program, name, value));
    }

    fn create_depth_texture(&self, desc: &DepthTextureDesc) -> TextureId {
        self.record(Call::CreateDepthTexture(*desc));
        TextureId(self.allocate())
    }

    fn delete_texture(&self, texture: TextureId) {
        self.release(texture.0);
        self.record(Call::DeleteTexture(texture));
    }

    fn bind_texture(&self, unit: u32, texture: TextureId) {
        self.record(Call::BindTexture(unit, texture));
    }

    fn create_depth_framebuffer(&self, depth: TextureId) -> FramebufferId {
        let framebuffer = FramebufferId(self.allocate());
        self.attachments.borrow_mut().insert(framebuffer, depth);
        self.record(Call::CreateFramebuffer(framebuffer));
        framebuffer
    }

    fn framebuffer_status(&self, _framebuffer: FramebufferId) -> FramebufferStatus {
        self.framebuffer_status.get()
    }

    fn delete_framebuffer(&self, framebuffer: FramebufferId) {
        self.release(framebuffer.0);
        self.attachments.borrow_mut().remove(&framebuffer);
        self.record(Call::DeleteFramebuffer(framebuffer));
    }

    fn bind_framebuffer(&self, target: RenderTarget) {
        self.target.set(target);
        self.record(Call::BindFramebuffer(target));
    }

    fn set_viewport(&self, viewport: Viewport) {
        self.record(Call::Viewport(viewport));
    }

    fn clear(&self, flags: ClearFlags) {
        self.record(Call::Clear(flags));
    }

    fn create_mesh(&self, _vertices: &[f32], _indices: &[u32]) -> MeshId {
        let mesh = MeshId(self.allocate());
        self.record(Call::CreateMesh(mesh));
        mesh
    }

    fn delete_mesh(&self, mesh: MeshId) {
        self.release(mesh.0);
        self.record(Call::DeleteMesh(mesh));
    }

    fn draw_mesh(&self, mesh: MeshId) {
        let target = self.target.get();
        if let RenderTarget::Offscreen(framebuffer) = target {
            if let Some(texture) = self.attachments.borrow().get(&framebuffer) {
                *self.depth_writes.borrow_mut().entry(*texture).or_default() += 1;
            }
        }
        self.record(Call::Draw {
            mesh,
            program: self.program.get(),
            target,
        });
    }

    fn surface_size(&self) -> (u32, u32) {
        (800, 600)
    }

    fn present(&self) -> Result<(), RenderError> {
        self.record(Call::Present);
        Ok(())
    }
}
