//! Newline-delimited JSON snapshots of raw API records.
//!
//! [`SnapshotWriter`] records every raw record an ingest run fetched.
//! [`SnapshotSource`] replays such a file (or any in-memory record list)
//! through the same [`PageSource`] interface the live API uses, answering
//! keyset queries exactly like the server would.

use std::fs::File;
use std::io::{BufRead as _, BufReader, BufWriter, Write as _};
use std::path::Path;

use async_trait::async_trait;
use parking_map_source_models::RawViolationRecord;

use crate::{PageQuery, PageSource, SourceError};

/// [`PageSource`] over a fixed set of raw records.
pub struct SnapshotSource {
    label: String,
    records: Vec<RawViolationRecord>,
}

impl SnapshotSource {
    /// Wraps in-memory records. Records are sorted into API order; those
    /// lacking a ticket id or issue date are kept but can never be paged
    /// to, as on the live API where they sort outside any keyset window.
    #[must_use]
    pub fn from_records(label: impl Into<String>, mut records: Vec<RawViolationRecord>) -> Self {
        records.sort_by_cached_key(RawViolationRecord::cursor_position);
        Self {
            label: label.into(),
            records,
        }
    }

    /// Loads a snapshot file written by [`SnapshotWriter`]. Blank lines are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the file cannot be read or a line is not
    /// a JSON record.
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        log::info!("Loaded {} records from {}", records.len(), path.display());
        Ok(Self::from_records(path.display().to_string(), records))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl PageSource for SnapshotSource {
    fn label(&self) -> &str {
        &self.label
    }

    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<RawViolationRecord>, SourceError> {
        Ok(self
            .records
            .iter()
            .filter(|record| query.admits(record))
            .take(query.page_size as usize)
            .cloned()
            .collect())
    }
}

/// Appends raw records to a newline-delimited JSON file.
pub struct SnapshotWriter {
    writer: BufWriter<File>,
    written: u64,
}

impl SnapshotWriter {
    /// Creates (or truncates) the snapshot file, creating parent
    /// directories as needed.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Io`] if the file cannot be created.
    pub fn create(path: &Path) -> Result<Self, SourceError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            writer: BufWriter::new(File::create(path)?),
            written: 0,
        })
    }

    /// Writes one line per record.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if serialization or the write fails.
    pub fn write_page(&mut self, records: &[RawViolationRecord]) -> Result<(), SourceError> {
        for record in records {
            serde_json::to_writer(&mut self.writer, record)?;
            self.writer.write_all(b"\n")?;
            self.written += 1;
        }
        Ok(())
    }

    /// Flushes buffered output and returns the number of records written.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Io`] if the flush fails.
    pub fn finish(mut self) -> Result<u64, SourceError> {
        self.writer.flush()?;
        Ok(self.written)
    }
}
