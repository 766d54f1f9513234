use std::path::PathBuf;

use planforge_model::{ModelError, TemplateSpec};

/// Builder configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Directory receiving persisted models and rendered images.
    pub output_dir: PathBuf,
    /// Optional JSON project template. The built-in template is used otherwise.
    pub template_path: Option<PathBuf>,
}

impl BuilderConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var         | Default        |
    /// |-----------------|----------------|
    /// | `OUTPUT_DIR`    | `data/models`  |
    /// | `TEMPLATE_PATH` | (built-in)     |
    pub fn from_env() -> Self {
        let output_dir = std::env::var("OUTPUT_DIR")
            .unwrap_or_else(|_| "data/models".into())
            .into();

        let template_path = std::env::var("TEMPLATE_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Self {
            output_dir,
            template_path,
        }
    }

    /// Load the configured template, falling back to the built-in one.
    pub fn load_template(&self) -> Result<TemplateSpec, ModelError> {
        match &self.template_path {
            Some(path) => {
                let template = TemplateSpec::load(path)?;
                tracing::info!(path = %path.display(), "Loaded project template");
                Ok(template)
            }
            None => Ok(TemplateSpec::builtin()),
        }
    }
}
