//! Export of a partition to an external sink.

use std::io::Write;
use std::path::PathBuf;

use tracing::info;

use crate::error::{AppError, Result};
use crate::models::{Partition, Rental};
use crate::store::RecordStore;

/// Destination for an exported payload.
pub trait ExportSink {
    fn deliver(&self, payload: &str) -> Result<()>;

    fn describe(&self) -> String;
}

/// Writes the payload to standard output.
pub struct StdoutSink;

impl ExportSink for StdoutSink {
    fn deliver(&self, payload: &str) -> Result<()> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{payload}").map_err(|e| AppError::export(e))?;
        stdout.flush().map_err(|e| AppError::export(e))
    }

    fn describe(&self) -> String {
        "stdout".to_string()
    }
}

/// Writes the payload to a file, replacing it.
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ExportSink for FileSink {
    fn deliver(&self, payload: &str) -> Result<()> {
        std::fs::write(&self.path, payload)
            .map_err(|e| AppError::export(format!("{}: {}", self.path.display(), e)))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// JSON text of a listing list, as stored.
pub fn to_payload(rentals: &[Rental]) -> Result<String> {
    Ok(serde_json::to_string(rentals)?)
}

/// Serialize a partition's stored list and hand it to `sink`.
///
/// Returns the number of listings exported.
pub fn export_partition(
    store: &RecordStore,
    partition: Partition,
    sink: &dyn ExportSink,
) -> Result<usize> {
    let rentals = store.records(partition);
    let payload = to_payload(&rentals)?;
    sink.deliver(&payload)?;
    info!(
        "Exported {} {} listings to {}",
        rentals.len(),
        partition,
        sink.describe()
    );
    Ok(rentals.len())
}
