//! Per-run outcome counters returned by every batch operation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::image_pipeline::common::error::PipelineError;

/// A unit of work (frame, mosaic member, tile) that was skipped, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkippedEntry {
    pub path: PathBuf,
    pub reason: String,
}

/// Outcome of a batch run: enough for an orchestrator to decide on retry.
///
/// Batches build one of these per worker and fold them with [`BatchReport::merge`];
/// nothing in the pipeline keeps process-wide counters.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BatchReport {
    /// Units that produced a new output.
    pub processed: usize,
    /// Units whose output already existed and was kept (overwrite disabled).
    pub reused: usize,
    /// Units that failed and were skipped.
    pub skipped: usize,
    /// Bytes of newly written output.
    pub bytes_written: u64,
    pub skipped_entries: Vec<SkippedEntry>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a freshly written output file, sizing it from disk.
    pub fn record_output(&mut self, path: &Path) {
        self.processed += 1;
        self.bytes_written += std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    }

    pub fn record_reused(&mut self) {
        self.reused += 1;
    }

    pub fn record_skip(&mut self, path: impl Into<PathBuf>, error: &PipelineError) {
        self.skipped += 1;
        self.skipped_entries.push(SkippedEntry {
            path: path.into(),
            reason: error.to_string(),
        });
    }

    pub fn merge(&mut self, other: BatchReport) {
        self.processed += other.processed;
        self.reused += other.reused;
        self.skipped += other.skipped;
        self.bytes_written += other.bytes_written;
        self.skipped_entries.extend(other.skipped_entries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_accumulates_counts_and_entries() {
        let mut a = BatchReport::new();
        a.processed = 2;
        a.bytes_written = 100;
        a.record_skip("a.bin", &PipelineError::InvalidShape("short".into()));

        let mut b = BatchReport::new();
        b.processed = 1;
        b.record_reused();
        b.bytes_written = 50;
        b.record_skip("b.bin", &PipelineError::InputNotFound("b.bin".into()));

        a.merge(b);
        assert_eq!(a.processed, 3);
        assert_eq!(a.reused, 1);
        assert_eq!(a.skipped, 2);
        assert_eq!(a.bytes_written, 150);
        assert_eq!(a.skipped_entries.len(), 2);
        assert_eq!(a.skipped_entries[1].path, PathBuf::from("b.bin"));
    }

    #[test]
    fn record_output_reads_file_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        std::fs::write(&path, [0u8; 42]).unwrap();

        let mut report = BatchReport::new();
        report.record_output(&path);
        assert_eq!(report.processed, 1);
        assert_eq!(report.bytes_written, 42);
    }
}
