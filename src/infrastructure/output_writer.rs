// Output writer - Dashboard, import envelope and upload log files
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::application::generation_service::GeneratedDashboard;
use crate::domain::report::UploadLog;

#[derive(Debug, Clone, PartialEq)]
pub struct WrittenFiles {
    pub dashboard: PathBuf,
    pub import: PathBuf,
}

#[derive(Debug, Clone)]
pub struct OutputWriter {
    dir: PathBuf,
}

impl OutputWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write `<title>.json` and `<title>_import.json`.
    pub fn write_dashboard(
        &self,
        dashboard: &GeneratedDashboard,
        folder_id: i64,
        overwrite: bool,
    ) -> Result<WrittenFiles> {
        let document = &dashboard.document;
        let dashboard_path = self.write_json(&document.filename(), &document.model)?;
        let import_path = self.write_json(
            &document.import_filename(),
            &document.envelope(folder_id, overwrite),
        )?;

        Ok(WrittenFiles {
            dashboard: dashboard_path,
            import: import_path,
        })
    }

    /// Write `<campus>_<building>_upload_response_<stamp>.json`.
    pub fn write_upload_log(
        &self,
        log: &UploadLog,
        campus: &str,
        building: &str,
        at: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let name = format!(
            "{}_{}_upload_response_{}.json",
            campus,
            building,
            at.format("%Y%m%d_%H%M%S")
        );
        self.write_json(&name, log)
    }

    fn write_json<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create output directory {:?}", self.dir))?;

        let path = self.dir.join(name);
        write_pretty(&path, value).with_context(|| format!("Failed to write {:?}", path))?;
        Ok(path)
    }
}

fn write_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
