use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use glam::{Mat4, Vec3, Vec4};
use log::debug;

use crate::error::ShaderError;

use super::api::{GraphicsApi, ProgramId, ShaderStage, StageId, UniformLocation, UniformValue};

/// A linked vertex + fragment program with cached uniform locations.
///
/// A program built with [`ShaderProgram::validate_only`] never talks to the
/// graphics API; activating it and setting uniforms do nothing.
pub struct ShaderProgram {
    handle: ProgramHandle,
    locations: RefCell<HashMap<String, Option<UniformLocation>>>,
}

enum ProgramHandle {
    Unallocated,
    Linked {
        api: Rc<dyn GraphicsApi>,
        id: ProgramId,
    },
}

impl ShaderProgram {
    /// Reads, compiles and links the two stages.
    pub fn compile(
        api: Rc<dyn GraphicsApi>,
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
    ) -> Result<Self, ShaderError> {
        let vertex_source = read_source(vertex_path.as_ref())?;
        let fragment_source = read_source(fragment_path.as_ref())?;

        let vertex = CompiledStage::new(api.as_ref(), ShaderStage::Vertex, &vertex_source)?;
        let fragment = CompiledStage::new(api.as_ref(), ShaderStage::Fragment, &fragment_source)?;
        let id = api
            .link_program(vertex.id, fragment.id)
            .map_err(|log| ShaderError::Link { log })?;
        drop(vertex);
        drop(fragment);

        debug!(
            "linked program {id:?} from {} and {}",
            vertex_path.as_ref().display(),
            fragment_path.as_ref().display()
        );
        Ok(Self {
            handle: ProgramHandle::Linked { api, id },
            locations: RefCell::new(HashMap::new()),
        })
    }

    /// Confirms both stage sources are readable without creating a program.
    pub fn validate_only(
        vertex_path: impl AsRef<Path>,
        fragment_path: impl AsRef<Path>,
    ) -> Result<Self, ShaderError> {
        read_source(vertex_path.as_ref())?;
        read_source(fragment_path.as_ref())?;
        Ok(Self {
            handle: ProgramHandle::Unallocated,
            locations: RefCell::new(HashMap::new()),
        })
    }

    pub fn is_linked(&self) -> bool {
        matches!(self.handle, ProgramHandle::Linked { .. })
    }

    /// Makes this program current for subsequent draws.
    pub fn activate(&self) {
        if let ProgramHandle::Linked { api, id } = &self.handle {
            api.use_program(*id);
        }
    }

    pub fn set_bool(&self, name: &str, value: bool) {
        self.set_uniform(name, UniformValue::Bool(value));
    }

    pub fn set_int(&self, name: &str, value: i32) {
        self.set_uniform(name, UniformValue::Int(value));
    }

    pub fn set_float(&self, name: &str, value: f32) {
        self.set_uniform(name, UniformValue::Float(value));
    }

    pub fn set_vec3(&self, name: &str, value: Vec3) {
        self.set_uniform(name, UniformValue::Vec3(value));
    }

    pub fn set_vec4(&self, name: &str, value: Vec4) {
        self.set_uniform(name, UniformValue::Vec4(value));
    }

    pub fn set_mat4(&self, name: &str, value: Mat4) {
        self.set_uniform(name, UniformValue::Mat4(value));
    }

    /// Uploads `value`; names with no active uniform are ignored.
    pub fn set_uniform(&self, name: &str, value: UniformValue) {
        let ProgramHandle::Linked { api, id } = &self.handle else {
            return;
        };
        if let Some(location) = self.location(api.as_ref(), *id, name) {
            api.set_uniform(*id, location, value);
        }
    }

    fn location(
        &self,
        api: &dyn GraphicsApi,
        program: ProgramId,
        name: &str,
    ) -> Option<UniformLocation> {
        if let Some(cached) = self.locations.borrow().get(name) {
            return *cached;
        }
        let location = api.uniform_location(program, name);
        if location.is_none() {
            debug!("program {program:?} has no active uniform `{name}`");
        }
        self.locations
            .borrow_mut()
            .insert(name.to_string(), location);
        location
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        if let ProgramHandle::Linked { api, id } = &self.handle {
            api.delete_program(*id);
        }
    }
}

/// Stage object released as soon as it goes out of scope, linked or not.
struct CompiledStage<'a> {
    api: &'a dyn GraphicsApi,
    id: StageId,
}

impl<'a> CompiledStage<'a> {
    fn new(api: &'a dyn GraphicsApi, stage: ShaderStage, source: &str) -> Result<Self, ShaderError> {
        let id = api
            .compile_stage(stage, source)
            .map_err(|log| ShaderError::Compilation { stage, log })?;
        Ok(Self { api, id })
    }
}

impl Drop for CompiledStage<'_> {
    fn drop(&mut self) {
        self.api.delete_stage(self.id);
    }
}

fn read_source(path: &Path) -> Result<String, ShaderError> {
    fs::read_to_string(path).map_err(|source| ShaderError::FileRead {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::render::recording::{Call, RecordingApi};

    fn source_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("temp shader");
        file.write_all(contents.as_bytes()).expect("write shader");
        file
    }

    fn compile(api: &Rc<RecordingApi>) -> Result<ShaderProgram, ShaderError> {
        let vertex = source_file("@vertex fn vs_main() {}");
        let fragment = source_file("@fragment fn fs_main() {}");
        let api: Rc<dyn GraphicsApi> = api.clone();
        ShaderProgram::compile(api, vertex.path(), fragment.path())
    }

    #[test]
    fn compiles_links_and_releases_stages() {
        let api = Rc::new(RecordingApi::new(&["model"]));
        let program = compile(&api).expect("program");
        assert!(program.is_linked());

        let calls = api.calls();
        assert_eq!(calls[0], Call::CompileStage(ShaderStage::Vertex));
        assert_eq!(calls[1], Call::CompileStage(ShaderStage::Fragment));
        assert!(matches!(calls[2], Call::LinkProgram(_)));
        assert!(matches!(calls[3], Call::DeleteStage(_)));
        assert!(matches!(calls[4], Call::DeleteStage(_)));
        assert_eq!(api.live_objects(), 1);

        drop(program);
        assert_eq!(api.live_objects(), 0);
    }

    #[test]
    fn location_is_queried_once_per_name() {
        let api = Rc::new(RecordingApi::new(&["model"]));
        let program = compile(&api).expect("program");
        for frame in 0..5 {
            program.set_mat4("model", Mat4::from_rotation_y(frame as f32));
            program.set_float("missing", 1.0);
        }
        assert_eq!(api.location_lookups("model"), 1);
        assert_eq!(api.location_lookups("missing"), 1);
        let uploads = api
            .calls()
            .into_iter()
            .filter(|call| matches!(call, Call::SetUniform(_, name, _) if name == "model"))
            .count();
        assert_eq!(uploads, 5);
    }

    #[test]
    fn vec4_setter_uploads_a_vec4() {
        let api = Rc::new(RecordingApi::new(&["tint"]));
        let program = compile(&api).expect("program");
        let tint = Vec4::new(1.0, 0.5, 0.25, 1.0);
        program.set_vec4("tint", tint);
        assert!(api.calls().iter().any(|call| matches!(
            call,
            Call::SetUniform(_, name, UniformValue::Vec4(v)) if name == "tint" && *v == tint
        )));
    }

    #[test]
    fn unknown_uniform_is_silently_ignored() {
        let api = Rc::new(RecordingApi::new(&[]));
        let program = compile(&api).expect("program");
        program.set_vec3("light_pos", Vec3::ONE);
        assert!(!api
            .calls()
            .iter()
            .any(|call| matches!(call, Call::SetUniform(..))));
    }

    #[test]
    fn compile_failure_names_stage_and_releases_vertex() {
        let api = Rc::new(RecordingApi::new(&[]));
        api.fail_stage(ShaderStage::Fragment);
        let err = compile(&api).err().expect("fragment failure");
        match err {
            ShaderError::Compilation { stage, log } => {
                assert_eq!(stage, ShaderStage::Fragment);
                assert!(log.contains("syntax error"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(api.live_objects(), 0);
    }

    #[test]
    fn link_failure_releases_both_stages() {
        let api = Rc::new(RecordingApi::new(&[]));
        api.fail_link();
        let err = compile(&api).err().expect("link failure");
        assert!(matches!(err, ShaderError::Link { .. }));
        assert_eq!(api.live_objects(), 0);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let api = Rc::new(RecordingApi::new(&[]));
        let fragment = source_file("@fragment fn fs_main() {}");
        let dyn_api: Rc<dyn GraphicsApi> = api.clone();
        let err = ShaderProgram::compile(dyn_api, "/nonexistent/shader.vert.wgsl", fragment.path())
            .err()
            .expect("read failure");
        assert!(matches!(err, ShaderError::FileRead { .. }));
        assert!(api.calls().is_empty());
    }

    #[test]
    fn validate_only_never_allocates() {
        let vertex = source_file("@vertex fn vs_main() {}");
        let fragment = source_file("@fragment fn fs_main() {}");
        let program = ShaderProgram::validate_only(vertex.path(), fragment.path()).expect("readable");
        assert!(!program.is_linked());
        program.activate();
        program.set_int("shadow_map", 1);

        let err = ShaderProgram::validate_only(vertex.path(), "/nonexistent/shader.frag.wgsl")
            .err()
            .expect("unreadable");
        assert!(matches!(err, ShaderError::FileRead { .. }));
    }
}
