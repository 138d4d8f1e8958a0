//! Timestamp assignment: an exact phase, then randomized fuzz.
//!
//! Posting one entry exactly four hours after another looks mechanical, so
//! every computed timestamp gets bounded jitter. Fuzz can push an entry
//! before its predecessor; the pass recomputes a bounded number of times and
//! fails loudly if no attempt lands strictly after.

use jiff::{SignedDuration, Span, Zoned};
use rand::Rng;

use crate::config::Config;
use crate::ledger::Ledger;
use crate::model::{Anchor, Entry};
use crate::timeline::{CompileError, Timeline};

const ONE_DAY: SignedDuration = SignedDuration::from_hours(24);
const SECONDS_PER_DAY: i64 = 86_400;

/// How many times a non-monotonic timestamp is recomputed before giving up.
const MAX_ATTEMPTS: u32 = 10;

/// Entries with an hour of day land in the first 45 minutes of that hour,
/// to keep clear of whatever comes next.
const HOUR_FUZZ_SECONDS: i64 = 45 * 60;

/// Assign final timestamps to every entry of the timeline, in compile order.
///
/// Entries already in the ledger keep their adopted timestamp and still
/// anchor the entry after them.
pub fn assign(
    timeline: &mut Timeline,
    config: &Config,
    ledger: &Ledger,
    rng: &mut impl Rng,
) -> Result<(), CompileError> {
    let mut previous: Option<(Zoned, String)> = None;

    for entry in timeline.entries_mut() {
        if ledger.contains(&entry.id) {
            if let Some(ts) = &entry.timestamp {
                previous = Some((ts.clone(), entry.text.clone()));
            }
            continue;
        }

        let previous_ts = previous.as_ref().map(|(ts, _)| ts);
        let mut assigned = None;
        let mut last_attempt = None;
        for _ in 0..MAX_ATTEMPTS {
            let ts = calculate(entry, previous_ts, config, rng)?;
            if previous_ts.is_none_or(|p| *p < ts) {
                assigned = Some(ts);
                break;
            }
            last_attempt = Some(ts);
        }

        match assigned {
            Some(ts) => {
                entry.timestamp = Some(ts.clone());
                previous = Some((ts, entry.text.clone()));
            }
            None => {
                // The first entry always succeeds (nothing precedes it), so
                // a failure here has a previous entry to report.
                let (previous_timestamp, previous_text) = previous
                    .map_or((String::new(), String::new()), |(ts, text)| {
                        (ts.to_string(), text)
                    });
                return Err(CompileError::NonMonotonic {
                    text: entry.text.clone(),
                    timestamp: last_attempt.map(|ts| ts.to_string()).unwrap_or_default(),
                    previous_text,
                    previous_timestamp,
                });
            }
        }
    }
    Ok(())
}

/// Compute one candidate timestamp for an entry.
///
/// Exact phase first: resolve the anchor, apply a multi-day delay (snapping
/// to start of day), set the hour of day (bumping a day if already past it),
/// then apply a sub-day delay. Fuzz phase second.
fn calculate(
    entry: &Entry,
    previous: Option<&Zoned>,
    config: &Config,
    rng: &mut impl Rng,
) -> Result<Zoned, CompileError> {
    let time_err = |source| CompileError::Time {
        text: entry.text.clone(),
        source,
    };
    let missing_previous = || CompileError::MissingPrevious {
        text: entry.text.clone(),
    };

    let mut ts = match &entry.anchor {
        Anchor::Fixed(base) => base.clone(),
        Anchor::Previous => previous.cloned().ok_or_else(missing_previous)?,
        Anchor::NextDay => previous
            .ok_or_else(missing_previous)?
            .start_of_day()
            .and_then(|day| day.checked_add(Span::new().days(1)))
            .map_err(time_err)?,
    };

    if let Some(delay) = entry.delay
        && delay >= ONE_DAY
    {
        ts = ts.checked_add(delay).map_err(time_err)?;
        ts = ts.start_of_day().map_err(time_err)?;
    }

    if let Some(hour) = entry.hour_of_day {
        if ts.hour() > hour {
            // Already past that hour today; bump to the next day.
            ts = ts.checked_add(Span::new().days(1)).map_err(time_err)?;
        }
        ts = ts
            .with()
            .hour(hour)
            .minute(0)
            .second(0)
            .subsec_nanosecond(0)
            .build()
            .map_err(time_err)?;
    }

    if let Some(delay) = entry.delay
        && delay < ONE_DAY
    {
        ts = ts.checked_add(delay).map_err(time_err)?;
    }

    // Fuzz phase.
    if entry.hour_of_day.is_some() {
        let offset = rng.gen_range(0..HOUR_FUZZ_SECONDS);
        ts = ts
            .checked_add(SignedDuration::from_secs(offset))
            .map_err(time_err)?;
    } else if let Some(delay) = entry.delay {
        // Only the sub-day component feeds the window, so multi-day delays
        // don't wander across days.
        let subday_seconds = delay.as_secs().rem_euclid(SECONDS_PER_DAY);
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
        let max_variation = (subday_seconds as f64 * config.fuzz_quotient)
            .max(config.fuzz_minimum_seconds as f64) as i64;
        let offset = if max_variation > 0 {
            rng.gen_range(0..max_variation)
        } else {
            0
        };
        let offset = SignedDuration::from_secs(offset);
        ts = if rng.gen_bool(0.5) {
            ts.checked_add(offset)
        } else {
            ts.checked_sub(offset)
        }
        .map_err(time_err)?;
    } else {
        return Err(CompileError::MissingTiming {
            text: entry.text.clone(),
        });
    }

    Ok(ts)
}
