use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

use crate::render::DEFAULT_SHADOW_SIZE;

pub const WINDOW_WIDTH: u32 = 800;
pub const WINDOW_HEIGHT: u32 = 600;
pub const WINDOW_TITLE: &str = "Umbra - shadow mapping";

pub const USAGE: &str = "\
Usage: umbra [--test] [--assets <dir>] [--shaders <dir>] [--model <path>]

  --test            check that shaders and the model load, without a window
  --assets <dir>    asset root holding shaders/ and models/
  --shaders <dir>   directory with the .wgsl shader sources
  --model <path>    OBJ file to render
  --help            print this message";

/// Vertex and fragment sources of one program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderPaths {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl ShaderPaths {
    fn in_dir(dir: &Path, stem: &str) -> Self {
        Self {
            vertex: dir.join(format!("{stem}.vert.wgsl")),
            fragment: dir.join(format!("{stem}.frag.wgsl")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub window_width: u32,
    pub window_height: u32,
    pub window_title: String,
    pub shadow_map_size: u32,
    pub shadow_shader: ShaderPaths,
    pub scene_shader: ShaderPaths,
    pub model_path: PathBuf,
}

impl AppConfig {
    /// Default layout below `root`: `shaders/*.wgsl` and `models/scene.obj`.
    pub fn from_asset_root(root: &Path) -> Self {
        let shaders = root.join("shaders");
        Self {
            window_width: WINDOW_WIDTH,
            window_height: WINDOW_HEIGHT,
            window_title: WINDOW_TITLE.to_string(),
            shadow_map_size: DEFAULT_SHADOW_SIZE,
            shadow_shader: ShaderPaths::in_dir(&shaders, "shadow_depth"),
            scene_shader: ShaderPaths::in_dir(&shaders, "scene"),
            model_path: root.join("models").join("scene.obj"),
        }
    }

    pub fn with_shader_dir(mut self, dir: &Path) -> Self {
        self.shadow_shader = ShaderPaths::in_dir(dir, "shadow_depth");
        self.scene_shader = ShaderPaths::in_dir(dir, "scene");
        self
    }

    pub fn with_model(mut self, path: PathBuf) -> Self {
        self.model_path = path;
        self
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_asset_root(&locate_asset_root())
    }
}

/// Finds `assets/` next to the executable, then two levels up (the cargo
/// `target/<profile>` layout), then in the crate directory.
pub fn locate_asset_root() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets");
    let exe_dir = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf));
    let mut candidates = Vec::new();
    if let Some(dir) = exe_dir {
        candidates.push(dir.join("assets"));
        if let Some(up) = dir.parent().and_then(Path::parent) {
            candidates.push(up.join("assets"));
        }
    }
    candidates
        .into_iter()
        .find(|candidate| candidate.is_dir())
        .unwrap_or(manifest)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOptions {
    pub validate_only: bool,
    pub show_help: bool,
    pub assets: Option<PathBuf>,
    pub shaders: Option<PathBuf>,
    pub model: Option<PathBuf>,
}

impl CliOptions {
    pub fn parse() -> Result<Self> {
        Self::parse_from(env::args().skip(1))
    }

    pub fn parse_from<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = Self::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--test" => options.validate_only = true,
                "--help" | "-h" => options.show_help = true,
                "--assets" => options.assets = Some(path_value(&mut args, "--assets")?),
                "--shaders" => options.shaders = Some(path_value(&mut args, "--shaders")?),
                "--model" => options.model = Some(path_value(&mut args, "--model")?),
                other => {
                    return Err(anyhow!("Unknown argument: {other}\n\n{USAGE}"));
                }
            }
        }
        Ok(options)
    }

    pub fn to_config(&self) -> AppConfig {
        let root = self.assets.clone().unwrap_or_else(locate_asset_root);
        let mut config = AppConfig::from_asset_root(&root);
        if let Some(dir) = &self.shaders {
            config = config.with_shader_dir(dir);
        }
        if let Some(model) = &self.model {
            config = config.with_model(model.clone());
        }
        config
    }
}

fn path_value(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<PathBuf> {
    args.next()
        .map(PathBuf::from)
        .with_context(|| format!("{flag} expects a value"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<CliOptions> {
        CliOptions::parse_from(args.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn no_arguments_is_normal_mode() {
        let options = parse(&[]).expect("parse");
        assert_eq!(options, CliOptions::default());
    }

    #[test]
    fn parses_test_flag_and_overrides() {
        let options = parse(&["--test", "--shaders", "/tmp/shaders", "--model", "a.obj"])
            .expect("parse");
        assert!(options.validate_only);
        assert_eq!(options.shaders, Some(PathBuf::from("/tmp/shaders")));

        let config = options.to_config();
        assert_eq!(
            config.scene_shader.fragment,
            PathBuf::from("/tmp/shaders/scene.frag.wgsl")
        );
        assert_eq!(
            config.shadow_shader.vertex,
            PathBuf::from("/tmp/shaders/shadow_depth.vert.wgsl")
        );
        assert_eq!(config.model_path, PathBuf::from("a.obj"));
    }

    #[test]
    fn rejects_unknown_and_incomplete_arguments() {
        let err = parse(&["--fullscreen"]).unwrap_err();
        assert!(err.to_string().contains("Unknown argument: --fullscreen"));
        let err = parse(&["--model"]).unwrap_err();
        assert!(err.to_string().contains("--model expects a value"));
    }

    #[test]
    fn asset_root_layout() {
        let config = AppConfig::from_asset_root(Path::new("/opt/umbra/assets"));
        assert_eq!(config.window_width, 800);
        assert_eq!(config.window_height, 600);
        assert_eq!(config.shadow_map_size, 1024);
        assert_eq!(
            config.model_path,
            PathBuf::from("/opt/umbra/assets/models/scene.obj")
        );
    }

    #[test]
    fn bundled_assets_are_found() {
        let config = AppConfig::default();
        assert!(config.scene_shader.vertex.is_file());
        assert!(config.model_path.is_file());
    }
}
