//! The sync engine: at most one post per invocation.
//!
//! Each run walks the compiled timeline in order, finds the first entry that
//! is due and not yet in the ledger, posts it, and appends the outcome. One
//! post per run bounds the blast radius of a scheduling bug or an outage to
//! a single entry; a scheduler re-invokes the process to drain the rest.

use std::fs;
use std::io;
use std::path::Path;

// Trait must be in scope for `.lines()` on BufReader.
use io::BufRead;

use jiff::{SignedDuration, Timestamp};

use crate::config::Config;
use crate::ledger::{DUPLICATE_EXTERNAL_ID, Ledger, LedgerError, LedgerRecord};
use crate::model::Author;
use crate::timeline::CompiledEntry;

/// What the external service reports for a successful post.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub external_id: String,
    pub created_at: Timestamp,
}

/// Failures the external service can report.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The service recognized this exact content as already posted.
    /// Treated as success: the entry is ledgered with a sentinel id.
    #[error("the service reports this content as already posted")]
    Duplicate,

    #[error("post failed: {0}")]
    Failed(String),
}

/// The publishing service boundary.
///
/// One operation: post a text, optionally as a reply to an external id the
/// service assigned earlier.
pub trait PostingService {
    fn post(
        &self,
        author: &Author,
        text: &str,
        reply_to: Option<&str>,
    ) -> Result<Receipt, ServiceError>;
}

/// Errors from one sync invocation.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("could not find {0}; run `serialist compile` first")]
    MissingTimeline(String),

    #[error("unknown author {0:?} in compiled timeline")]
    UnknownAuthor(String),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The outcome of one sync invocation.
#[derive(Debug)]
pub enum SyncOutcome {
    /// Posted one entry.
    Posted { text: String },

    /// The next unposted entry isn't due yet.
    Waiting {
        text: String,
        remaining: SignedDuration,
    },

    /// Every compiled entry is already in the ledger.
    UpToDate,
}

/// Load the compiled timeline from `timeline.jsonl` in the story directory.
pub fn load_compiled(dir: &Path) -> Result<Vec<CompiledEntry>, PublishError> {
    let path = dir.join("timeline.jsonl");
    let file = match fs::File::open(&path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(PublishError::MissingTimeline(path.display().to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    let reader = io::BufReader::new(file);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if !line.is_empty() {
            entries.push(serde_json::from_str(&line)?);
        }
    }
    Ok(entries)
}

/// Walk the compiled timeline and post at most one due, unposted entry.
///
/// The timeline is chronological, so the scan stops at the first entry whose
/// timestamp is still in the future: nothing past it could be due either.
pub fn sync(
    script: &[CompiledEntry],
    config: &Config,
    ledger: &mut Ledger,
    service: &dyn PostingService,
    now: Timestamp,
) -> Result<SyncOutcome, PublishError> {
    for entry in script {
        if ledger.contains(&entry.internal_id) {
            continue;
        }
        if entry.timestamp <= now {
            post(entry, config, ledger, service, now)?;
            return Ok(SyncOutcome::Posted {
                text: entry.text.clone(),
            });
        }
        return Ok(SyncOutcome::Waiting {
            text: entry.text.clone(),
            remaining: now.duration_until(entry.timestamp),
        });
    }
    Ok(SyncOutcome::UpToDate)
}

fn post(
    entry: &CompiledEntry,
    config: &Config,
    ledger: &mut Ledger,
    service: &dyn PostingService,
    now: Timestamp,
) -> Result<(), PublishError> {
    let author = config
        .author_by_account(&entry.author)
        .ok_or_else(|| PublishError::UnknownAuthor(entry.author.clone()))?;

    let reply_to = entry.in_reply_to.as_ref().and_then(|target| {
        match ledger.get(target) {
            Some(record) => Some(record.external_id.clone()),
            None => {
                // Inconsistent state: the reply target was never posted.
                // Downgrade to a standalone post rather than failing.
                eprintln!(
                    "warning: \"{}\" replies to {target}, which is not in the ledger; \
                     posting it as a standalone entry",
                    entry.text
                );
                None
            }
        }
    });

    let (external_id, actual_timestamp) =
        match service.post(author, &entry.text, reply_to.as_deref()) {
            Ok(receipt) => (receipt.external_id, receipt.created_at),
            Err(ServiceError::Duplicate) => (DUPLICATE_EXTERNAL_ID.to_string(), now),
            Err(e) => return Err(e.into()),
        };

    // The append is durable before this returns; a crash between the post
    // above and this line is the only double-post window.
    ledger.append(LedgerRecord {
        text: entry.text.clone(),
        planned_timestamp: entry.timestamp,
        actual_timestamp,
        internal_id: entry.internal_id.clone(),
        external_id,
    })?;
    Ok(())
}
