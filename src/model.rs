use std::fs;
use std::path::Path;
use std::rc::Rc;

use glam::Vec3;
use log::{debug, warn};

use crate::error::ModelError;
use crate::render::{GraphicsApi, MeshId};

/// Floats per interleaved vertex: `position.xyz` then `normal.xyz`.
pub const VERTEX_STRIDE: usize = 6;

/// Triangle mesh with interleaved position/normal vertices.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / VERTEX_STRIDE
    }
}

/// Geometry imported from a model file, kept on the CPU.
#[derive(Debug, Clone)]
pub struct Model {
    pub meshes: Vec<MeshData>,
}

impl Model {
    /// Imports an OBJ file. Materials are not used; a broken material library
    /// only produces a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        let path = path.as_ref();
        // Directories open fine on some platforms; reading them does not.
        let contents = fs::read(path).map_err(|source| ModelError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let base = path.parent().unwrap_or(Path::new(""));
        let (models, materials) = tobj::load_obj_buf(
            &mut contents.as_slice(),
            &tobj::GPU_LOAD_OPTIONS,
            |library| tobj::load_mtl(base.join(library)),
        )
        .map_err(|source| ModelError::Import {
            path: path.to_path_buf(),
            source,
        })?;
        if let Err(err) = materials {
            warn!("ignoring materials of {}: {err}", path.display());
        }

        let meshes: Vec<MeshData> = models
            .into_iter()
            .filter(|model| !model.mesh.indices.is_empty())
            .map(|model| mesh_from_import(model.name, &model.mesh))
            .collect();
        if meshes.is_empty() {
            return Err(ModelError::Empty {
                path: path.to_path_buf(),
            });
        }

        debug!(
            "loaded {} mesh(es) from {}",
            meshes.len(),
            path.display()
        );
        Ok(Self { meshes })
    }

    pub fn triangle_count(&self) -> usize {
        self.meshes.iter().map(|mesh| mesh.indices.len() / 3).sum()
    }

    /// Uploads every mesh to the GPU.
    pub fn upload(&self, api: Rc<dyn GraphicsApi>) -> GpuModel {
        let meshes = self
            .meshes
            .iter()
            .map(|mesh| api.create_mesh(&mesh.vertices, &mesh.indices))
            .collect();
        GpuModel { api, meshes }
    }
}

/// GPU copy of a [`Model`]; mesh buffers are released on drop.
pub struct GpuModel {
    api: Rc<dyn GraphicsApi>,
    meshes: Vec<MeshId>,
}

impl GpuModel {
    /// Issues one draw per mesh with the current program and target.
    pub fn draw(&self) {
        for mesh in &self.meshes {
            self.api.draw_mesh(*mesh);
        }
    }
}

impl Drop for GpuModel {
    fn drop(&mut self) {
        for mesh in self.meshes.drain(..) {
            self.api.delete_mesh(mesh);
        }
    }
}

fn mesh_from_import(name: String, mesh: &tobj::Mesh) -> MeshData {
    let vertex_count = mesh.positions.len() / 3;
    let has_normals = mesh.normals.len() == mesh.positions.len();
    let mut vertices = Vec::with_capacity(vertex_count * VERTEX_STRIDE);
    for i in 0..vertex_count {
        vertices.extend_from_slice(&mesh.positions[i * 3..i * 3 + 3]);
        if has_normals {
            vertices.extend_from_slice(&mesh.normals[i * 3..i * 3 + 3]);
        } else {
            vertices.extend_from_slice(&[0.0; 3]);
        }
    }

    let mut data = MeshData {
        name,
        vertices,
        indices: mesh.indices.clone(),
    };
    if !has_normals {
        compute_normals(&mut data);
    }
    data
}

/// Area-weighted smooth normals for meshes imported without any.
fn compute_normals(mesh: &mut MeshData) {
    let mut accum = vec![Vec3::ZERO; mesh.vertex_count()];

    for triangle in mesh.indices.chunks_exact(3) {
        let [i0, i1, i2] = [
            triangle[0] as usize,
            triangle[1] as usize,
            triangle[2] as usize,
        ];
        let p0 = position(&mesh.vertices, i0);
        let p1 = position(&mesh.vertices, i1);
        let p2 = position(&mesh.vertices, i2);
        let normal = (p1 - p0).cross(p2 - p0);
        if normal.length_squared() > f32::EPSILON {
            accum[i0] += normal;
            accum[i1] += normal;
            accum[i2] += normal;
        }
    }

    for (i, normal) in accum.into_iter().enumerate() {
        let normal = normal.normalize_or_zero();
        mesh.vertices[i * VERTEX_STRIDE + 3..i * VERTEX_STRIDE + 6]
            .copy_from_slice(&normal.to_array());
    }
}

fn position(vertices: &[f32], index: usize) -> Vec3 {
    Vec3::from_slice(&vertices[index * VERTEX_STRIDE..index * VERTEX_STRIDE + 3])
}
