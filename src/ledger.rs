//! The progress ledger: an append-only record of what has been posted.
//!
//! One JSON record per line in `progress.jsonl`, keyed by content identity.
//! Loaded fully into memory at startup; appends are flushed and fsynced
//! before returning, so a crash between a post and its append is the only
//! window where a duplicate post could occur. Records are never updated or
//! deleted.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::PathBuf;

// Traits must be in scope for `.lines()` on BufReader and `.write_all()` on File.
use io::{BufRead, Write};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::model::ContentId;

/// Sentinel external id recorded when the service reports the content as
/// already posted.
pub const DUPLICATE_EXTERNAL_ID: &str = "[duplicate]";

/// Errors from ledger I/O.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One posting outcome, serialized as one line of JSONL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub text: String,

    /// The timestamp the compiler planned. Stable across re-runs: compilation
    /// adopts it verbatim for any entry already in the ledger.
    #[serde(with = "crate::timefmt")]
    pub planned_timestamp: Timestamp,

    /// When the service says the post actually went out, or the ledger write
    /// time on the duplicate fallback.
    #[serde(with = "crate::timefmt")]
    pub actual_timestamp: Timestamp,

    pub internal_id: ContentId,
    pub external_id: String,
}

/// In-memory view of the progress file.
pub struct Ledger {
    path: PathBuf,
    records: HashMap<ContentId, LedgerRecord>,
}

impl Ledger {
    /// Load the ledger at `path`. A missing file is an empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Ok(Self {
                    path,
                    records: HashMap::new(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let reader = io::BufReader::new(file);
        let mut records = HashMap::new();
        for line in reader.lines() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let record: LedgerRecord = serde_json::from_str(&line)?;
            records.insert(record.internal_id.clone(), record);
        }
        Ok(Self { path, records })
    }

    /// An empty ledger with nowhere to write, for compile-only tests.
    /// Production paths go through `load`, which treats a missing file as
    /// empty and keeps the path for later appends.
    #[cfg(test)]
    pub fn empty() -> Self {
        Self {
            path: PathBuf::new(),
            records: HashMap::new(),
        }
    }

    pub fn contains(&self, id: &ContentId) -> bool {
        self.records.contains_key(id)
    }

    pub fn get(&self, id: &ContentId) -> Option<&LedgerRecord> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append one record durably: the line is written, flushed, and fsynced
    /// before this returns.
    pub fn append(&mut self, record: LedgerRecord) -> Result<(), LedgerError> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        file.flush()?;
        file.sync_all()?;
        self.records.insert(record.internal_id.clone(), record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn sample_record(text: &str, external_id: &str) -> LedgerRecord {
        let ts = crate::timefmt::parse("01 Jan 2000 06:00:00 UTC").unwrap();
        LedgerRecord {
            text: text.into(),
            planned_timestamp: ts,
            actual_timestamp: ts,
            internal_id: ContentId::of(text),
            external_id: external_id.into(),
        }
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::load(dir.path().join("progress.jsonl")).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn append_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.jsonl");

        let mut ledger = Ledger::load(&path).unwrap();
        ledger.append(sample_record("First", "100")).unwrap();
        ledger.append(sample_record("Second", "101")).unwrap();
        assert_eq!(ledger.len(), 2);

        let reloaded = Ledger::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        let record = reloaded.get(&ContentId::of("First")).unwrap();
        assert_eq!(record.external_id, "100");
        assert_eq!(
            crate::timefmt::format(record.planned_timestamp),
            "01 Jan 2000 06:00:00 UTC"
        );
    }

    #[test]
    fn contains_is_keyed_by_text_identity() {
        let dir = TempDir::new().unwrap();
        let mut ledger = Ledger::load(dir.path().join("progress.jsonl")).unwrap();
        ledger.append(sample_record("First", "100")).unwrap();

        assert!(ledger.contains(&ContentId::of("First")));
        // Edited text is a different identity.
        assert!(!ledger.contains(&ContentId::of("First!")));
    }

    #[test]
    fn append_writes_one_line_per_record() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.jsonl");
        let mut ledger = Ledger::load(&path).unwrap();
        ledger.append(sample_record("First", "100")).unwrap();
        ledger
            .append(sample_record("Second", DUPLICATE_EXTERNAL_ID))
            .unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
        assert!(contents.lines().nth(1).unwrap().contains("[duplicate]"));
    }
}
