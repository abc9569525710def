//! Batch file writing with atomic persistence.
//!
//! Each batch is written to a temporary file in the same directory as the
//! destination and atomically moved onto `<entity>_batch_<n>.json` once the
//! whole array has been flushed. If the writer is dropped before finishing,
//! the temporary file is removed and no batch file appears.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::info;

use crate::batch::packer::{record_size, Batch, BatchPacker, BATCH_FRAMING_BYTES};
use crate::error::AppError;
use crate::Record;

/// Summary of the files produced for one entity.
#[derive(Debug, Clone, Default)]
pub struct WriteSummary {
    /// Paths of the written batch files, in batch number order.
    pub files: Vec<PathBuf>,
    /// Number of records in each file (parallel to `files`).
    pub records_per_file: Vec<usize>,
    /// Total records written.
    pub total_records: usize,
}

/// File name of batch `batch_number` (1-based) for an entity.
pub fn batch_file_name(entity: &str, batch_number: usize) -> String {
    format!("{}_batch_{}.json", entity, batch_number)
}

/// An atomic JSON writer for one batch file.
pub struct AtomicJsonWriter {
    writer: BufWriter<NamedTempFile>,
    final_path: PathBuf,
}

impl AtomicJsonWriter {
    /// Creates a writer targeting `final_path`.
    ///
    /// The temporary file lives next to the destination so the final rename
    /// stays on one filesystem.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the parent directory cannot be determined or
    /// the temporary file cannot be created.
    pub fn new(final_path: impl AsRef<Path>) -> Result<Self, AppError> {
        let final_path = final_path.as_ref().to_path_buf();

        let parent_dir = final_path.parent().ok_or_else(|| {
            AppError::Io(format!(
                "Cannot determine parent directory for: {}",
                final_path.display()
            ))
        })?;

        let temp_file = NamedTempFile::new_in(parent_dir)
            .map_err(|e| AppError::Io(format!("Failed to create temporary file: {}", e)))?;

        Ok(Self {
            writer: BufWriter::new(temp_file),
            final_path,
        })
    }

    /// Writes `records` as a pretty-printed JSON array (two-space indent).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Serialization` if a record cannot be encoded.
    pub fn write_records(&mut self, records: &[Record]) -> Result<(), AppError> {
        serde_json::to_writer_pretty(&mut self.writer, records)?;
        Ok(())
    }

    /// Flushes all buffers and atomically moves the file into place,
    /// replacing any file already at the destination.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if flushing or persisting fails. The temporary
    /// file is cleaned up on error.
    pub fn finish(mut self) -> Result<PathBuf, AppError> {
        self.writer
            .flush()
            .map_err(|e| AppError::Io(format!("Failed to flush batch file: {}", e)))?;

        let named_temp = self
            .writer
            .into_inner()
            .map_err(|e| AppError::Io(format!("Failed to flush buffer: {}", e.error())))?;

        named_temp.persist(&self.final_path).map_err(|e| {
            AppError::Io(format!(
                "Failed to persist file to {}: {}",
                self.final_path.display(),
                e.error
            ))
        })?;

        Ok(self.final_path)
    }
}

/// Packs `records` into batches of at most `max_bytes` and writes one file
/// per batch into `output_dir`.
///
/// The directory is created if missing. No file is written for an empty
/// record set. Existing files with the same batch numbers are overwritten.
///
/// # Errors
///
/// Any serialization or I/O failure aborts the write; batches already
/// persisted stay on disk, no partial batch file is left behind.
pub async fn write_batches(
    entity: &str,
    output_dir: &Path,
    records: Vec<Record>,
    max_bytes: u64,
) -> Result<WriteSummary, AppError> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .map_err(|e| AppError::Io(format!("Failed to create output directory: {}", e)))?;

    let entity = entity.to_owned();
    let output_dir = output_dir.to_owned();

    // File output is blocking; keep it off the async context.
    tokio::task::spawn_blocking(move || {
        write_batches_blocking(&entity, &output_dir, records, max_bytes)
    })
    .await
    .map_err(|e| AppError::Internal(format!("Task join error: {}", e)))?
}

/// Blocking implementation of [`write_batches`].
fn write_batches_blocking(
    entity: &str,
    output_dir: &Path,
    records: Vec<Record>,
    max_bytes: u64,
) -> Result<WriteSummary, AppError> {
    let mut summary = WriteSummary::default();
    let mut packer = BatchPacker::new(max_bytes, record_size).with_framing(BATCH_FRAMING_BYTES);

    for record in records {
        if let Some(batch) = packer.push(record)? {
            persist_batch(entity, output_dir, batch, &mut summary)?;
        }
    }
    if let Some(batch) = packer.finish() {
        persist_batch(entity, output_dir, batch, &mut summary)?;
    }

    info!(
        "[WRITE] {}: {} records in {} batch files",
        entity,
        summary.total_records,
        summary.files.len()
    );

    Ok(summary)
}

fn persist_batch(
    entity: &str,
    output_dir: &Path,
    batch: Batch,
    summary: &mut WriteSummary,
) -> Result<(), AppError> {
    let batch_number = summary.files.len() + 1;
    let path = output_dir.join(batch_file_name(entity, batch_number));

    let mut writer = AtomicJsonWriter::new(&path)?;
    writer.write_records(&batch.records)?;
    let path = writer.finish()?;

    info!(
        "[WRITE] Wrote batch {} with {} records ({} bytes)",
        batch_number,
        batch.len(),
        batch.bytes
    );

    summary.total_records += batch.len();
    summary.records_per_file.push(batch.len());
    summary.files.push(path);
    Ok(())
}

/// Reads a batch file back into records.
#[cfg(test)]
pub(crate) fn read_batch_file(path: &Path) -> Result<Vec<Record>, AppError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| AppError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(serde_json::from_str(&content)?)
}
