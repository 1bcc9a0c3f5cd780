//! Headless check that every asset the renderer needs can be loaded.

use log::info;

use crate::config::AppConfig;
use crate::error::{ModelError, ShaderError};
use crate::model::Model;
use crate::render::ShaderProgram;

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub shader_error: Option<ShaderError>,
    pub model_error: Option<ModelError>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.shader_error.is_none() && self.model_error.is_none()
    }

    pub fn exit_code(&self) -> i32 {
        if self.passed() {
            0
        } else {
            1
        }
    }

    /// One line per check, as printed by [`run_validation`].
    pub fn lines(&self) -> Vec<String> {
        let shaders = match &self.shader_error {
            None => "Shader compilation successful".to_string(),
            Some(err) => format!("Shader compilation failed: {err}"),
        };
        let model = match &self.model_error {
            None => "Model loading successful".to_string(),
            Some(err) => format!("Model loading failed: {err}"),
        };
        vec![shaders, model]
    }
}

/// Builds both programs in validate-only mode and imports the model. Nothing
/// here touches a graphics context.
pub fn run_validation(config: &AppConfig) -> ValidationReport {
    info!("validating assets without a graphics context");
    let report = ValidationReport {
        shader_error: validate_shaders(config).err(),
        model_error: Model::load(&config.model_path).err(),
    };
    for line in report.lines() {
        println!("{line}");
    }
    report
}

fn validate_shaders(config: &AppConfig) -> Result<(), ShaderError> {
    for paths in [&config.shadow_shader, &config.scene_shader] {
        ShaderProgram::validate_only(&paths.vertex, &paths.fragment)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;

    fn asset_root() -> TempDir {
        let dir = TempDir::new().expect("temp dir");
        let shaders = dir.path().join("shaders");
        let models = dir.path().join("models");
        fs::create_dir_all(&shaders).expect("shaders dir");
        fs::create_dir_all(&models).expect("models dir");
        for stem in ["shadow_depth", "scene"] {
            fs::write(shaders.join(format!("{stem}.vert.wgsl")), "@vertex fn vs_main() {}")
                .expect("vertex");
            fs::write(shaders.join(format!("{stem}.frag.wgsl")), "@fragment fn fs_main() {}")
                .expect("fragment");
        }
        fs::write(
            models.join("scene.obj"),
            "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n",
        )
        .expect("model");
        dir
    }

    #[test]
    fn readable_assets_pass() {
        let root = asset_root();
        let report = run_validation(&AppConfig::from_asset_root(root.path()));
        assert!(report.passed());
        assert_eq!(report.exit_code(), 0);
        assert_eq!(
            report.lines(),
            ["Shader compilation successful", "Model loading successful"]
        );
    }

    #[test]
    fn missing_shader_fails_with_read_error() {
        let root = asset_root();
        let config =
            AppConfig::from_asset_root(root.path()).with_shader_dir(Path::new("/nonexistent"));
        let report = run_validation(&config);
        assert!(matches!(
            report.shader_error,
            Some(ShaderError::FileRead { .. })
        ));
        assert!(report.model_error.is_none());
        assert_eq!(report.exit_code(), 1);
        assert!(report.lines()[0].starts_with("Shader compilation failed: "));
    }

    #[test]
    fn missing_model_fails_with_read_error() {
        let root = asset_root();
        let config = AppConfig::from_asset_root(root.path())
            .with_model(root.path().join("models/missing.obj"));
        let report = run_validation(&config);
        assert!(report.model_error.as_ref().is_some_and(ModelError::is_file_read));
        assert!(!report.passed());
        assert_eq!(report.lines()[1].split(':').next(), Some("Model loading failed"));
    }
}
