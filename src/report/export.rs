//! Byte-stream exporters for finished reports

use std::path::{Path, PathBuf};

use tracing::info;

use crate::models::ReportRecord;
use crate::types::{AppError, AppResult};

/// A renderer that turns a [`ReportRecord`] into a downloadable document
pub trait ReportExporter: Send + Sync {
    fn content_type(&self) -> &'static str;

    fn file_name(&self, record: &ReportRecord) -> String;

    fn export(&self, record: &ReportRecord) -> AppResult<Vec<u8>>;
}

/// Pretty-printed JSON of the whole record; [`import_json`] reverses it exactly
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonExporter;

impl ReportExporter for JsonExporter {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn file_name(&self, record: &ReportRecord) -> String {
        format!("diagnosis_{}.json", record.id)
    }

    fn export(&self, record: &ReportRecord) -> AppResult<Vec<u8>> {
        serde_json::to_vec_pretty(record)
            .map_err(|e| AppError::Export(format!("Failed to serialise report: {}", e)))
    }
}

pub fn import_json(bytes: &[u8]) -> AppResult<ReportRecord> {
    let record: ReportRecord = serde_json::from_slice(bytes)
        .map_err(|e| AppError::InputRejected(format!("Not a diagnosis report: {}", e)))?;
    super::validate_record(&record)?;
    Ok(record)
}

/// Run every exporter and write its output into `dir`
pub async fn write_exports(
    record: &ReportRecord,
    dir: &Path,
    exporters: &[&dyn ReportExporter],
) -> AppResult<Vec<PathBuf>> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| AppError::Export(format!("Cannot create {}: {}", dir.display(), e)))?;

    let mut written = Vec::with_capacity(exporters.len());
    for exporter in exporters {
        let bytes = exporter.export(record)?;
        let path = dir.join(exporter.file_name(record));
        tokio::fs::write(&path, &bytes)
            .await
            .map_err(|e| AppError::Export(format!("Cannot write {}: {}", path.display(), e)))?;

        info!(path = %path.display(), bytes = bytes.len(), "Report exported");
        written.push(path);
    }

    Ok(written)
}
