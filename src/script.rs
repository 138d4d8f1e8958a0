//! The script compiler: one line of script becomes one entry.
//!
//! The first whitespace-delimited token of a line may be a command built
//! from sub-codes, each consumed at most once, in a fixed order:
//!
//! - an author's dispatch code (e.g. `+`) selects that author;
//! - `R` replies to the most recently compiled entry;
//! - `10M` / `4H` / `1D` delays roughly that long after the previous entry;
//! - `10A` / `9P` sets a time of day.
//!
//! If any characters of the token survive extraction, it was not a command
//! at all: the whole line is the post text, and the author, reply, and delay
//! revert to their defaults. A parsed time of day still applies.

use std::sync::LazyLock;

use jiff::SignedDuration;
use regex::Regex;

use crate::config::Config;
use crate::ledger::Ledger;
use crate::model::{Anchor, ContentId, Entry};
use crate::timeline::{CompileError, Timeline};

/// Reply-to-previous marker.
const REPLY_CODE: &str = "R";

/// Soft limit on post text length. Overruns warn, never fail.
const POST_LENGTH_LIMIT: usize = 280;

static DELAY_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^([0-9]+)([MHD])").expect("delay pattern is valid")
});

static TIME_OF_DAY_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("^([0-9]{1,2})([AP])").expect("time-of-day pattern is valid")
});

/// Parses script lines against the timeline compiled so far.
pub struct LineParser<'a> {
    config: &'a Config,
    ledger: &'a Ledger,
}

impl<'a> LineParser<'a> {
    pub fn new(config: &'a Config, ledger: &'a Ledger) -> Self {
        Self { config, ledger }
    }

    /// Compile one trimmed, non-empty, non-marker line into an entry.
    ///
    /// `stream` is the timeline compiled so far; the current chapter and day
    /// already exist when this runs.
    pub fn parse(&self, line: &str, stream: &Timeline) -> Result<Entry, CompileError> {
        let mut author = self.config.default_author();
        let mut reply_to: Option<ContentId> = None;
        let mut delay: Option<SignedDuration> = None;
        let mut hour_of_day: Option<i8> = None;
        let mut text = line;

        if let Some((token, rest)) = line.split_once(' ') {
            let mut remaining = token.to_string();

            // Author code: first configured author whose non-empty code
            // appears anywhere in the token.
            for candidate in &self.config.authors {
                if !candidate.code.is_empty() && remaining.contains(&candidate.code) {
                    author = candidate;
                    remaining = remaining.replacen(&candidate.code, "", 1);
                    break;
                }
            }

            let mut is_reply = false;
            if remaining.contains(REPLY_CODE) {
                is_reply = true;
                remaining = remaining.replacen(REPLY_CODE, "", 1);
            }

            if let Some((end, amount, unit)) = capture(&DELAY_CODE, &remaining) {
                delay = Some(delay_duration(&amount, &unit, line)?);
                remaining.drain(..end);
            }

            if let Some((end, hour, meridiem)) = capture(&TIME_OF_DAY_CODE, &remaining) {
                hour_of_day = Some(convert_hour(&hour, &meridiem, line)?);
                remaining.drain(..end);
            }

            if remaining.is_empty() {
                // The token was entirely commands; the rest of the line is
                // the post text.
                text = rest;
                if is_reply {
                    match stream.latest_entry() {
                        Some(previous) => reply_to = Some(previous.id.clone()),
                        None => {
                            return Err(CompileError::ReplyBeforeFirstEntry {
                                line: line.to_string(),
                            });
                        }
                    }
                }
            } else {
                // The token was not a command after all. Keep the whole line
                // as text; the author, reply, and delay revert, but a parsed
                // time of day still applies.
                author = self.config.default_author();
                delay = None;
            }
        }

        let mut anchor = if stream.current_chapter_entry_count() == 0 {
            // First entry of the stream or of a chapter: anchored at the
            // chapter's derived start date (the stream start for chapter one).
            match stream.current_chapter() {
                Some(chapter) => Anchor::Fixed(chapter.start.clone()),
                None => Anchor::Previous,
            }
        } else {
            Anchor::Previous
        };

        if delay.is_none() && hour_of_day.is_none() {
            if stream.current_day_is_empty() && stream.current_chapter_entry_count() > 0 {
                // First entry of a later in-story day with no timing
                // directive: publish it at the start of the next real-world
                // day.
                anchor = Anchor::NextDay;
            } else if stream.current_chapter_entry_count() == 0 {
                delay = Some(SignedDuration::ZERO);
            }
        }

        if text.chars().count() > POST_LENGTH_LIMIT {
            eprintln!(
                "warning: {} characters in \"{text}\"",
                text.chars().count()
            );
        }

        let mut entry = Entry::new(text, author.clone(), anchor, delay, hour_of_day, reply_to)?;

        // Already posted: adopt the planned timestamp verbatim. The schedule
        // pass leaves it alone.
        if let Some(record) = self.ledger.get(&entry.id) {
            entry.timestamp = Some(
                record
                    .planned_timestamp
                    .to_zoned(self.config.timezone.clone()),
            );
        }

        Ok(entry)
    }
}

/// Run an anchored two-group pattern against the token, returning the end of
/// the match and both groups as owned strings.
fn capture(pattern: &Regex, token: &str) -> Option<(usize, String, String)> {
    let caps = pattern.captures(token)?;
    let full = caps.get(0)?;
    Some((full.end(), caps[1].to_string(), caps[2].to_string()))
}

fn delay_duration(amount: &str, unit: &str, line: &str) -> Result<SignedDuration, CompileError> {
    let bad = || CompileError::BadDelay {
        code: format!("{amount}{unit}"),
        line: line.to_string(),
    };
    let amount: i64 = amount.parse().map_err(|_| bad())?;
    let seconds = match unit {
        "M" => amount.checked_mul(60),
        "H" => amount.checked_mul(3_600),
        // "D": the pattern admits nothing else.
        _ => amount.checked_mul(86_400),
    };
    seconds.map(SignedDuration::from_secs).ok_or_else(bad)
}

fn convert_hour(hour: &str, meridiem: &str, line: &str) -> Result<i8, CompileError> {
    let bad = || CompileError::BadTimeOfDay {
        code: format!("{hour}{meridiem}"),
        line: line.to_string(),
    };
    let mut hour: i8 = hour.parse().map_err(|_| bad())?;
    if meridiem == "A" && hour == 12 {
        hour = 0;
    } else if meridiem == "P" && hour != 12 {
        hour += 12;
    }
    if hour > 23 {
        return Err(bad());
    }
    Ok(hour)
}
