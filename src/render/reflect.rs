//! WGSL compilation and reflection with naga.
//!
//! Conventions shared by every shader in the demo:
//! - uniforms live in one struct bound at `@group(0) @binding(0)`; its member
//!   names are the uniform names,
//! - sampled textures live in `@group(1)`, each texture at binding `N` paired
//!   with its sampler at binding `N + 1`; the texture variable name is the
//!   sampler uniform that receives a texture unit.

use naga::valid::{Capabilities, ValidationFlags, Validator};

use super::api::ShaderStage;

pub const UNIFORM_GROUP: u32 = 0;
pub const TEXTURE_GROUP: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Int,
    Uint,
    Float,
    Vec3,
    Vec4,
    Mat4,
    /// Texture binding; the value is the index into [`ProgramInterface::textures`].
    Sampler(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformSlot {
    pub name: String,
    pub offset: u32,
    pub kind: UniformKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformBlock {
    pub size: u32,
    pub members: Vec<UniformSlot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    Depth,
    Float,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureBinding {
    pub name: String,
    pub binding: u32,
    pub kind: TextureKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerBinding {
    pub binding: u32,
    pub comparison: bool,
}

/// What one compiled stage exposes.
#[derive(Debug, Clone)]
pub struct StageReflection {
    pub stage: ShaderStage,
    pub entry_point: String,
    pub uniform_block: Option<UniformBlock>,
    pub textures: Vec<TextureBinding>,
    pub samplers: Vec<SamplerBinding>,
    pub has_color_output: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureSlot {
    pub name: String,
    pub kind: TextureKind,
    pub texture_binding: u32,
    pub sampler: SamplerBinding,
}

/// Combined uniform interface of a linked program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramInterface {
    pub block_size: u32,
    pub uniforms: Vec<UniformSlot>,
    pub textures: Vec<TextureSlot>,
    pub has_color_output: bool,
}

impl ProgramInterface {
    pub fn find(&self, name: &str) -> Option<usize> {
        self.uniforms.iter().position(|slot| slot.name == name)
    }
}

/// Parses and validates `source`, returning a diagnostic rendered against the
/// source on failure.
pub fn compile_stage(stage: ShaderStage, source: &str) -> Result<StageReflection, String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|err| err.emit_to_string(source))?;
    Validator::new(ValidationFlags::all(), Capabilities::all())
        .validate(&module)
        .map_err(|err| err.emit_to_string(source))?;
    reflect_stage(&module, stage)
}

fn reflect_stage(module: &naga::Module, stage: ShaderStage) -> Result<StageReflection, String> {
    let wanted = match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    };
    let entry = module
        .entry_points
        .iter()
        .find(|ep| ep.stage == wanted)
        .ok_or_else(|| format!("no {stage} entry point found"))?;

    let mut reflection = StageReflection {
        stage,
        entry_point: entry.name.clone(),
        uniform_block: None,
        textures: Vec::new(),
        samplers: Vec::new(),
        has_color_output: has_color_output(module, entry),
    };

    for (_, global) in module.global_variables.iter() {
        let Some(binding) = &global.binding else {
            continue;
        };
        let ty = &module.types[global.ty];
        match (binding.group, &ty.inner) {
            (UNIFORM_GROUP, naga::TypeInner::Struct { members, span })
                if global.space == naga::AddressSpace::Uniform =>
            {
                if binding.binding != 0 || reflection.uniform_block.is_some() {
                    return Err(format!(
                        "uniform block must be the single binding at @group({UNIFORM_GROUP}) @binding(0)"
                    ));
                }
                reflection.uniform_block = Some(UniformBlock {
                    size: *span,
                    members: members
                        .iter()
                        .filter_map(|member| {
                            let kind = uniform_kind(&module.types[member.ty].inner)?;
                            Some(UniformSlot {
                                name: member.name.clone()?,
                                offset: member.offset,
                                kind,
                            })
                        })
                        .collect(),
                });
            }
            (TEXTURE_GROUP, naga::TypeInner::Image { class, .. }) => {
                let kind = match class {
                    naga::ImageClass::Depth { .. } => TextureKind::Depth,
                    naga::ImageClass::Sampled { .. } => TextureKind::Float,
                    _ => return Err("storage textures are not supported".into()),
                };
                reflection.textures.push(TextureBinding {
                    name: global.name.clone().unwrap_or_default(),
                    binding: binding.binding,
                    kind,
                });
            }
            (TEXTURE_GROUP, naga::TypeInner::Sampler { comparison }) => {
                reflection.samplers.push(SamplerBinding {
                    binding: binding.binding,
                    comparison: *comparison,
                });
            }
            (group, _) => {
                return Err(format!(
                    "unsupported resource `{}` at @group({group}) @binding({})",
                    global.name.as_deref().unwrap_or("<unnamed>"),
                    binding.binding
                ));
            }
        }
    }

    Ok(reflection)
}

/// Merges the interfaces of both stages, failing like a linker would when they
/// disagree.
pub fn link_interface(
    vertex: &StageReflection,
    fragment: &StageReflection,
) -> Result<ProgramInterface, String> {
    if vertex.stage != ShaderStage::Vertex || fragment.stage != ShaderStage::Fragment {
        return Err("program needs one vertex and one fragment stage".into());
    }

    let block = match (&vertex.uniform_block, &fragment.uniform_block) {
        (Some(a), Some(b)) if a != b => {
            return Err("uniform block layout differs between vertex and fragment stages".into())
        }
        (Some(block), _) | (None, Some(block)) => Some(block.clone()),
        (None, None) => None,
    };

    let mut interface = ProgramInterface {
        has_color_output: fragment.has_color_output,
        ..Default::default()
    };
    if let Some(block) = block {
        interface.block_size = block.size;
        interface.uniforms = block.members;
    }

    let stages = [vertex, fragment];
    for texture in stages.iter().flat_map(|stage| stage.textures.iter()) {
        if interface.textures.iter().any(|t| t.texture_binding == texture.binding) {
            continue;
        }
        let sampler = stages
            .iter()
            .flat_map(|stage| stage.samplers.iter())
            .find(|sampler| sampler.binding == texture.binding + 1)
            .copied()
            .ok_or_else(|| {
                format!(
                    "texture `{}` at binding {} has no sampler at binding {}",
                    texture.name,
                    texture.binding,
                    texture.binding + 1
                )
            })?;
        let slot = interface.textures.len();
        interface.textures.push(TextureSlot {
            name: texture.name.clone(),
            kind: texture.kind,
            texture_binding: texture.binding,
            sampler,
        });
        interface.uniforms.push(UniformSlot {
            name: texture.name.clone(),
            offset: 0,
            kind: UniformKind::Sampler(slot),
        });
    }

    Ok(interface)
}

fn uniform_kind(inner: &naga::TypeInner) -> Option<UniformKind> {
    use naga::{ScalarKind, TypeInner, VectorSize};

    match inner {
        TypeInner::Scalar(scalar) if scalar.width == 4 => match scalar.kind {
            ScalarKind::Sint => Some(UniformKind::Int),
            ScalarKind::Uint => Some(UniformKind::Uint),
            ScalarKind::Float => Some(UniformKind::Float),
            _ => None,
        },
        TypeInner::Vector { size, scalar } if scalar.kind == ScalarKind::Float => match size {
            VectorSize::Tri => Some(UniformKind::Vec3),
            VectorSize::Quad => Some(UniformKind::Vec4),
            _ => None,
        },
        TypeInner::Matrix {
            columns: VectorSize::Quad,
            rows: VectorSize::Quad,
            ..
        } => Some(UniformKind::Mat4),
        _ => None,
    }
}

fn has_color_output(module: &naga::Module, entry: &naga::EntryPoint) -> bool {
    let Some(result) = &entry.function.result else {
        return false;
    };
    if matches!(result.binding, Some(naga::Binding::Location { .. })) {
        return true;
    }
    match &module.types[result.ty].inner {
        naga::TypeInner::Struct { members, .. } => members
            .iter()
            .any(|member| matches!(member.binding, Some(naga::Binding::Location { .. }))),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = r#"
struct Uniforms {
    model: mat4x4<f32>,
    light_pos: vec3<f32>,
    strength: f32,
}
@group(0) @binding(0) var<uniform> uniforms: Uniforms;

@vertex
fn vs_main(@location(0) position: vec3<f32>) -> @builtin(position) vec4<f32> {
    return uniforms.model * vec4<f32>(position * uniforms.strength, 1.0);
}
"#;

    const FRAGMENT: &str = r#"
@group(1) @binding(0) var shadow_map: texture_depth_2d;
@group(1) @binding(1) var shadow_sampler: sampler;

@fragment
fn fs_main(@builtin(position) coord: vec4<f32>) -> @location(0) vec4<f32> {
    let depth = textureSampleLevel(shadow_map, shadow_sampler, coord.xy, 0);
    return vec4<f32>(depth, depth, depth, 1.0);
}
"#;

    #[test]
    fn reflects_uniform_offsets() {
        let reflection = compile_stage(ShaderStage::Vertex, VERTEX).expect("valid vertex stage");
        assert_eq!(reflection.entry_point, "vs_main");
        let block = reflection.uniform_block.expect("uniform block");
        let offsets: Vec<_> = block
            .members
            .iter()
            .map(|m| (m.name.as_str(), m.offset, m.kind))
            .collect();
        assert_eq!(
            offsets,
            vec![
                ("model", 0, UniformKind::Mat4),
                ("light_pos", 64, UniformKind::Vec3),
                ("strength", 76, UniformKind::Float),
            ]
        );
        assert_eq!(block.size, 80);
        assert!(!reflection.has_color_output);
    }

    #[test]
    fn links_textures_as_sampler_uniforms() {
        let vertex = compile_stage(ShaderStage::Vertex, VERTEX).expect("vertex");
        let fragment = compile_stage(ShaderStage::Fragment, FRAGMENT).expect("fragment");
        let interface = link_interface(&vertex, &fragment).expect("linked");
        assert!(interface.has_color_output);
        assert_eq!(interface.textures.len(), 1);
        assert_eq!(interface.textures[0].kind, TextureKind::Depth);
        assert_eq!(interface.textures[0].sampler.binding, 1);
        let slot = interface.find("shadow_map").expect("sampler uniform");
        assert_eq!(interface.uniforms[slot].kind, UniformKind::Sampler(0));
    }

    #[test]
    fn parse_errors_carry_a_diagnostic() {
        let err = compile_stage(ShaderStage::Vertex, "@vertex fn vs_main( {").unwrap_err();
        assert!(err.contains("error"));
    }

    #[test]
    fn missing_entry_point_is_a_compile_error() {
        let err = compile_stage(ShaderStage::Fragment, VERTEX).unwrap_err();
        assert!(err.contains("FRAGMENT"));
    }

    #[test]
    fn mismatched_blocks_fail_to_link() {
        let vertex = compile_stage(ShaderStage::Vertex, VERTEX).expect("vertex");
        let fragment_source = r#"
struct Uniforms { tint: vec4<f32> }
@group(0) @binding(0) var<uniform> uniforms: Uniforms;
@fragment
fn fs_main() -> @location(0) vec4<f32> { return uniforms.tint; }
"#;
        let fragment = compile_stage(ShaderStage::Fragment, fragment_source).expect("fragment");
        assert!(link_interface(&vertex, &fragment).is_err());
    }
}
