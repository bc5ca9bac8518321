// Template store - Loads `<name>.json` dashboard templates from a directory
use std::path::{Path, PathBuf};

use crate::domain::dashboard::DashboardModel;
use crate::domain::error::TemplateLoadError;
use crate::domain::template::{Template, TemplateKind};

#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, kind: TemplateKind) -> PathBuf {
        self.dir.join(format!("{}.json", kind.template_name()))
    }

    pub fn load(&self, kind: TemplateKind) -> Result<Template, TemplateLoadError> {
        let path = self.path_for(kind);
        let contents = std::fs::read_to_string(&path).map_err(|source| TemplateLoadError::Io {
            path: path.clone(),
            source,
        })?;
        parse_template(kind, &path, &contents)
    }

    /// Load every known kind; a kind that fails is logged and left out.
    pub fn load_all(&self) -> Vec<Template> {
        let mut templates = Vec::new();
        for kind in TemplateKind::ALL {
            match self.load(kind) {
                Ok(template) => {
                    tracing::info!(kind = %kind, path = ?self.path_for(kind), "Loaded template");
                    templates.push(template);
                }
                Err(e) => tracing::error!(kind = %kind, error = %e, "Skipping template"),
            }
        }
        templates
    }
}

fn parse_template(kind: TemplateKind, path: &Path, contents: &str) -> Result<Template, TemplateLoadError> {
    let model: DashboardModel =
        serde_json::from_str(contents).map_err(|source| TemplateLoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    Template::new(kind, model).map_err(|source| TemplateLoadError::Placeholder {
        path: path.to_path_buf(),
        source,
    })
}
