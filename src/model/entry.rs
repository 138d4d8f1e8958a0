//! Entries: the atomic post unit.

use std::fmt;

use jiff::{SignedDuration, Zoned};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::Author;

/// Delay injected when a line specifies neither a delay nor an hour of day.
pub const DEFAULT_DELAY: SignedDuration = SignedDuration::from_hours(4);

const ONE_DAY: SignedDuration = SignedDuration::from_hours(24);

/// Stable identity of an entry: the lowercase hex SHA-256 of its text.
///
/// This is the idempotency key joining compiled entries to the progress
/// ledger. It is a pure function of the text: editing unposted text changes
/// its identity, while posted text is frozen by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Compute the identity of the given entry text.
    pub fn of(text: &str) -> Self {
        Self(hex::encode(Sha256::digest(text.as_bytes())))
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where timestamp calculation starts for an entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Anchor {
    /// A fixed base: the stream start date for the first entry ever, the
    /// chapter start date for the first entry of a chapter.
    Fixed(Zoned),

    /// Relative to the previous entry's final timestamp.
    Previous,

    /// The start of the calendar day after the previous entry's final
    /// timestamp. Used for the first entry of a later in-story day that
    /// carries no timing directive; resolved at schedule time, when the
    /// previous timestamp exists.
    NextDay,
}

/// Errors from entry construction.
#[derive(Debug, thiserror::Error)]
pub enum EntryError {
    #[error(
        "\"{text}\" defines both a delay and an hour of day, but the delay is less than one day"
    )]
    DelayWithHourOfDay { text: String },
}

/// One schedulable post: text, author, timing directives, optional reply.
///
/// Created by the script compiler from one line; the timestamp is finalized
/// in the timeline's schedule pass and never mutated once published.
#[derive(Debug, Clone)]
pub struct Entry {
    pub text: String,
    pub author: Author,
    pub id: ContentId,
    pub reply_to: Option<ContentId>,
    pub delay: Option<SignedDuration>,
    pub hour_of_day: Option<i8>,
    pub anchor: Anchor,

    /// Final (or ledger-adopted) timestamp. `None` until the schedule pass
    /// runs.
    pub timestamp: Option<Zoned>,
}

impl Entry {
    /// Build an entry from parsed directives.
    ///
    /// Injects the default delay when neither a delay nor an hour of day was
    /// given, and rejects a sub-day delay combined with an hour of day.
    pub fn new(
        text: impl Into<String>,
        author: Author,
        anchor: Anchor,
        delay: Option<SignedDuration>,
        hour_of_day: Option<i8>,
        reply_to: Option<ContentId>,
    ) -> Result<Self, EntryError> {
        let text = text.into();

        let delay = match (delay, hour_of_day) {
            (None, None) => Some(DEFAULT_DELAY),
            (d, _) => d,
        };

        if let (Some(d), Some(_)) = (delay, hour_of_day)
            && d < ONE_DAY
        {
            return Err(EntryError::DelayWithHourOfDay { text });
        }

        let id = ContentId::of(&text);
        Ok(Self {
            text,
            author,
            id,
            reply_to,
            delay,
            hour_of_day,
            anchor,
            timestamp: None,
        })
    }
}
