//! Versioned CSV output store.

use crate::domain::error::CausalError;
use crate::domain::panel::Panel;
use crate::ports::persistence_port::PersistencePort;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

/// Writes each panel to `<dir>/<name>_<version>.csv`, one `date` column
/// followed by the panel's columns. Missing cells are left blank.
pub struct CsvStoreAdapter {
    dir: PathBuf,
}

impl CsvStoreAdapter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn write(&self, path: &PathBuf, panel: &Panel) -> Result<(), CausalError> {
        fs::create_dir_all(&self.dir)?;
        write_panel(panel, File::create(path)?)
    }
}

/// Write a panel as CSV: a `date` column followed by the panel's columns,
/// with missing cells left blank.
pub fn write_panel<W: Write>(panel: &Panel, out: W) -> Result<(), CausalError> {
    let mut writer = csv::Writer::from_writer(out);

    let mut header = Vec::with_capacity(panel.width() + 1);
    header.push("date".to_string());
    header.extend(panel.columns().iter().cloned());
    writer.write_record(&header)?;

    for (row, date) in panel.index().iter().enumerate() {
        let mut record = Vec::with_capacity(panel.width() + 1);
        record.push(date.format("%Y-%m-%d").to_string());
        for col in 0..panel.width() {
            record.push(panel.value(row, col).map(|v| v.to_string()).unwrap_or_default());
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

impl PersistencePort for CsvStoreAdapter {
    fn store(&self, name: &str, version: &str, panel: &Panel) -> Result<PathBuf, CausalError> {
        let path = self.dir.join(format!("{name}_{version}.csv"));
        self.write(&path, panel).map_err(|e| CausalError::Persistence {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        tracing::info!(path = %path.display(), rows = panel.len(), "stored panel");
        Ok(path)
    }
}
