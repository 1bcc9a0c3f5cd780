use std::fs;

use umbra::config::{AppConfig, ShaderPaths};
use umbra::render::reflect::{self, ProgramInterface, TextureKind, UniformKind};
use umbra::render::ShaderStage;

fn link(paths: &ShaderPaths) -> ProgramInterface {
    let vertex = fs::read_to_string(&paths.vertex).expect("vertex source");
    let fragment = fs::read_to_string(&paths.fragment).expect("fragment source");
    let vertex = reflect::compile_stage(ShaderStage::Vertex, &vertex)
        .unwrap_or_else(|log| panic!("{}:\n{log}", paths.vertex.display()));
    let fragment = reflect::compile_stage(ShaderStage::Fragment, &fragment)
        .unwrap_or_else(|log| panic!("{}:\n{log}", paths.fragment.display()));
    reflect::link_interface(&vertex, &fragment).expect("link")
}

#[test]
fn shadow_depth_program_is_depth_only() {
    let interface = link(&AppConfig::default().shadow_shader);
    assert!(!interface.has_color_output);
    assert!(interface.textures.is_empty());
    let names: Vec<&str> = interface.uniforms.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, ["light_space_matrix", "model"]);
}

#[test]
fn scene_program_exposes_every_frame_uniform() {
    let interface = link(&AppConfig::default().scene_shader);
    assert!(interface.has_color_output);
    for name in [
        "projection",
        "view",
        "model",
        "light_space_matrix",
        "light_pos",
        "view_pos",
        "shadow_map",
    ] {
        assert!(interface.find(name).is_some(), "missing uniform {name}");
    }

    let shadow_map = &interface.uniforms[interface.find("shadow_map").expect("sampler")];
    assert_eq!(shadow_map.kind, UniformKind::Sampler(0));
    assert_eq!(interface.textures[0].kind, TextureKind::Depth);
    assert_eq!(interface.textures[0].sampler.binding, 1);

    let light_pos = &interface.uniforms[interface.find("light_pos").expect("light_pos")];
    assert_eq!(light_pos.offset, 256);
    assert_eq!(light_pos.kind, UniformKind::Vec3);
}
