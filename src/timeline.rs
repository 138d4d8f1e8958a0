//! The timeline: chapters and days built from a script, then scheduled.
//!
//! Compilation is two passes. The structural pass feeds lines to the script
//! compiler in order, dispatching on the chapter (`== `) and day (`-- `)
//! markers. The schedule pass assigns final fuzzed timestamps and validates
//! monotonicity; advisory diagnostics are collected as warnings for the
//! caller to report.

use jiff::{Span, Timestamp};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::ledger::Ledger;
use crate::model::{Chapter, ContentId, Day, Entry, EntryError};
use crate::schedule;
use crate::script::LineParser;

const CHAPTER_MARKER: &str = "== ";
const DAY_MARKER: &str = "-- ";

/// Errors raised while compiling a script into a timeline.
///
/// Every variant is fatal: a broken script must not silently skip or guess.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("the first entry in the script cannot be a reply: {line:?}")]
    ReplyBeforeFirstEntry { line: String },

    #[error("bad delay {code:?} in {line:?}")]
    BadDelay { code: String, line: String },

    #[error("bad time of day {code:?} in {line:?}")]
    BadTimeOfDay { code: String, line: String },

    #[error(transparent)]
    Entry(#[from] EntryError),

    #[error("entry {text:?} has neither an hour of day nor a delay since the previous entry")]
    MissingTiming { text: String },

    #[error("entry {text:?} has no previous entry to anchor to")]
    MissingPrevious { text: String },

    #[error(
        "calculated timestamp for {text:?} is {timestamp}, which comes before the previous \
         entry {previous_text:?} ({previous_timestamp}); adjust its delay or hour directive"
    )]
    NonMonotonic {
        text: String,
        timestamp: String,
        previous_text: String,
        previous_timestamp: String,
    },

    #[error("could not derive start date for chapter {name:?}: {source}")]
    ChapterStart {
        name: String,
        #[source]
        source: jiff::Error,
    },

    #[error("timestamp arithmetic failed for {text:?}: {source}")]
    Time {
        text: String,
        #[source]
        source: jiff::Error,
    },

    #[error("entry {text:?} was never scheduled")]
    Unscheduled { text: String },
}

/// One line of the persisted timeline (`timeline.jsonl`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledEntry {
    pub internal_id: ContentId,
    pub text: String,
    pub author: String,
    pub in_reply_to: Option<ContentId>,
    #[serde(with = "crate::timefmt")]
    pub timestamp: Timestamp,
}

/// The compiled stream: chapters in script order.
#[derive(Debug)]
pub struct Timeline {
    chapters: Vec<Chapter>,
}

impl Timeline {
    /// Compile a script into a fully scheduled timeline.
    pub fn compile<'a, I>(lines: I, config: &Config, ledger: &Ledger) -> Result<Self, CompileError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        Self::compile_with_rng(lines, config, ledger, &mut rand::thread_rng())
    }

    /// Compile with a caller-provided fuzz source.
    pub fn compile_with_rng<'a, I>(
        lines: I,
        config: &Config,
        ledger: &Ledger,
        rng: &mut impl Rng,
    ) -> Result<Self, CompileError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let parser = LineParser::new(config, ledger);
        let mut timeline = Self {
            chapters: Vec::new(),
        };

        for raw in lines {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(name) = line.strip_prefix(CHAPTER_MARKER) {
                timeline.begin_chapter(name, config)?;
            } else if let Some(label) = line.strip_prefix(DAY_MARKER) {
                timeline.ensure_chapter(config)?;
                timeline.begin_day(label);
            } else {
                timeline.ensure_chapter(config)?;
                timeline.ensure_day();
                let entry = parser.parse(line, &timeline)?;
                timeline.push_entry(entry);
            }
        }

        schedule::assign(&mut timeline, config, ledger, rng)?;
        Ok(timeline)
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    /// Entries in compile order, across every chapter and day.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.chapters.iter().flat_map(Chapter::entries)
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut Entry> {
        self.chapters
            .iter_mut()
            .flat_map(|c| c.days.iter_mut().flat_map(|d| d.entries.iter_mut()))
    }

    /// The most recently compiled entry, if any.
    pub fn latest_entry(&self) -> Option<&Entry> {
        self.chapters.iter().rev().find_map(Chapter::last_entry)
    }

    /// The chapter currently being compiled.
    pub fn current_chapter(&self) -> Option<&Chapter> {
        self.chapters.last()
    }

    /// Number of entries compiled into the current chapter so far.
    pub fn current_chapter_entry_count(&self) -> usize {
        self.chapters.last().map_or(0, Chapter::total_entries)
    }

    /// Whether the current in-story day has no entries yet.
    pub fn current_day_is_empty(&self) -> bool {
        self.chapters
            .last()
            .and_then(|c| c.days.last())
            .is_none_or(|d| d.entries.is_empty())
    }

    /// The persisted form: one record per entry, in compile order, UTC.
    pub fn compiled(&self) -> Result<Vec<CompiledEntry>, CompileError> {
        self.entries()
            .map(|e| {
                let timestamp = e.timestamp.as_ref().ok_or_else(|| CompileError::Unscheduled {
                    text: e.text.clone(),
                })?;
                Ok(CompiledEntry {
                    internal_id: e.id.clone(),
                    text: e.text.clone(),
                    author: e.author.account.clone(),
                    in_reply_to: e.reply_to.clone(),
                    timestamp: timestamp.timestamp(),
                })
            })
            .collect()
    }

    fn begin_chapter(&mut self, name: &str, config: &Config) -> Result<(), CompileError> {
        let chapter_err = |source| CompileError::ChapterStart {
            name: name.to_string(),
            source,
        };
        let start = match self.chapters.last() {
            None => config
                .start_date
                .to_zoned(config.timezone.clone())
                .map_err(chapter_err)?,
            Some(previous) => previous
                .start
                .checked_add(Span::new().days(config.chapter_duration_days))
                .map_err(chapter_err)?,
        };
        self.chapters.push(Chapter::new(name, start));
        Ok(())
    }

    fn ensure_chapter(&mut self, config: &Config) -> Result<(), CompileError> {
        if self.chapters.is_empty() {
            self.begin_chapter("", config)?;
        }
        Ok(())
    }

    fn begin_day(&mut self, label: &str) {
        if let Some(chapter) = self.chapters.last_mut() {
            chapter.days.push(Day::new(label));
        }
    }

    fn ensure_day(&mut self) {
        if let Some(chapter) = self.chapters.last_mut()
            && chapter.days.is_empty()
        {
            chapter.days.push(Day::new(""));
        }
    }

    fn push_entry(&mut self, entry: Entry) {
        // ensure_chapter/ensure_day ran before the parse, so both levels exist.
        if let Some(day) = self.chapters.last_mut().and_then(|c| c.days.last_mut()) {
            day.entries.push(entry);
        }
    }

    /// Advisory diagnostics: schedule overlaps across chapter boundaries and
    /// chapters whose first entry misses the configured start day. Warnings
    /// only; the caller decides where to report them.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for pair in self.chapters.windows(2) {
            let (previous, next) = (&pair[0], &pair[1]);
            if let Some(last) = previous.last_entry().and_then(|e| e.timestamp.as_ref())
                && *last > next.start
            {
                warnings.push(format!(
                    "last entry in chapter \"{}\" overlaps the start of chapter \"{}\"",
                    previous.name, next.name
                ));
            }
        }
        for chapter in &self.chapters {
            if let Some(first) = chapter.entries().next().and_then(|e| e.timestamp.as_ref())
                && first.date() != chapter.start.date()
            {
                warnings.push(format!(
                    "chapter \"{}\" starts on {}, but its first entry happens on {}",
                    chapter.name,
                    chapter.start.date(),
                    first.date()
                ));
            }
        }
        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use jiff::SignedDuration;
    use jiff::civil::date;
    use jiff::tz::TimeZone;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use tempfile::TempDir;

    use crate::ledger::{Ledger, LedgerRecord};
    use crate::model::Anchor;

    const CONFIG: &str = r#"
timezone = "US/Central"
start-date = "2000/01/01"
chapter-duration-days = 10
fuzz-quotient = 0.0
fuzz-minimum-seconds = 0

[[authors]]
account = "author1"
color = "red"

[[authors]]
account = "author2"
code = "+"

[[authors]]
account = "author3"
code = "-"
"#;

    fn config() -> Config {
        Config::from_toml(CONFIG).unwrap()
    }

    fn compile(lines: &[&str], ledger: &Ledger) -> Result<Timeline, CompileError> {
        let mut rng = StdRng::seed_from_u64(7);
        Timeline::compile_with_rng(lines.iter().copied(), &config(), ledger, &mut rng)
    }

    fn start() -> jiff::Zoned {
        date(2000, 1, 1).to_zoned(TimeZone::get("US/Central").unwrap()).unwrap()
    }

    #[test]
    fn implicit_chapter_and_day() {
        let timeline = compile(&["First entry"], &Ledger::empty()).unwrap();
        assert_eq!(timeline.chapters().len(), 1);
        assert_eq!(timeline.chapters()[0].name, "");
        assert_eq!(timeline.chapters()[0].days.len(), 1);
        assert_eq!(timeline.entries().count(), 1);
    }

    #[test]
    fn chapter_markers_derive_start_dates() {
        let script = ["== One", "First entry", "== Two", "10A Second entry"];
        let timeline = compile(&script, &Ledger::empty()).unwrap();
        let chapters = timeline.chapters();
        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].name, "One");
        assert_eq!(chapters[0].start, start());
        assert_eq!(
            chapters[1].start,
            start().checked_add(Span::new().days(10)).unwrap()
        );
    }

    #[test]
    fn first_entry_lands_on_the_start_date() {
        let timeline = compile(&["First entry"], &Ledger::empty()).unwrap();
        let entry = timeline.entries().next().unwrap();
        // Zero delay, zero fuzz: exactly the configured start.
        assert_eq!(entry.timestamp.as_ref().unwrap(), &start());
    }

    #[test]
    fn timestamps_are_strictly_monotonic() {
        let script = [
            "First entry",
            "40M Second entry",
            "-- next day",
            "Third entry",
            "9P Fourth entry",
        ];
        let timeline = compile(&script, &Ledger::empty()).unwrap();
        let stamps: Vec<_> = timeline
            .entries()
            .map(|e| e.timestamp.clone().unwrap())
            .collect();
        assert_eq!(stamps.len(), 4);
        for pair in stamps.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn day_marker_advances_to_the_next_morning() {
        let script = ["First entry", "-- next day", "Second entry"];
        let timeline = compile(&script, &Ledger::empty()).unwrap();
        let entries: Vec<_> = timeline.entries().collect();
        assert_eq!(entries[1].anchor, Anchor::NextDay);
        assert_eq!(timeline.chapters()[0].days[1].label, "next day");
        // Start of the next day plus the injected default delay.
        let expected = start()
            .checked_add(Span::new().days(1))
            .unwrap()
            .checked_add(SignedDuration::from_hours(4))
            .unwrap();
        assert_eq!(entries[1].timestamp.as_ref().unwrap(), &expected);
    }

    #[test]
    fn equal_timestamps_exhaust_the_retry_loop() {
        // Zero delay with zero fuzz can never land strictly after.
        let err = compile(&["First entry", "0M Second entry"], &Ledger::empty()).unwrap_err();
        assert!(matches!(err, CompileError::NonMonotonic { .. }));
    }

    #[test]
    fn compiled_form_round_trips() {
        let script = ["First entry", "R Second entry"];
        let timeline = compile(&script, &Ledger::empty()).unwrap();
        let compiled = timeline.compiled().unwrap();
        assert_eq!(compiled.len(), 2);
        assert_eq!(compiled[1].in_reply_to, Some(compiled[0].internal_id.clone()));

        for record in &compiled {
            let line = serde_json::to_string(record).unwrap();
            let parsed: CompiledEntry = serde_json::from_str(&line).unwrap();
            assert_eq!(&parsed, record);
        }
    }

    #[test]
    fn overlapping_chapters_produce_warnings() {
        // One-day chapters, three-day delays: chapter One runs past the
        // start of chapter Two, and Two's first entry misses its start day.
        let toml = CONFIG.replace("chapter-duration-days = 10", "chapter-duration-days = 1");
        let config = Config::from_toml(&toml).unwrap();
        let script = ["== One", "First entry", "3D Second entry", "== Two", "3D Third entry"];
        let mut rng = StdRng::seed_from_u64(7);
        let timeline =
            Timeline::compile_with_rng(script.iter().copied(), &config, &Ledger::empty(), &mut rng)
                .unwrap();

        let warnings = timeline.warnings();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("overlaps the start of chapter \"Two\""));
        assert!(warnings[1].contains("chapter \"Two\" starts on 2000-01-02"));
    }

    #[test]
    fn aligned_chapters_produce_no_warnings() {
        let timeline = compile(&["First entry", "40M Second entry"], &Ledger::empty()).unwrap();
        assert!(timeline.warnings().is_empty());
    }

    #[test]
    fn ledgered_entries_keep_their_planned_timestamps() {
        let script = ["First entry", "Second entry"];
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("progress.jsonl");

        let first_pass = compile(&script, &Ledger::load(&path).unwrap()).unwrap();
        let compiled = first_pass.compiled().unwrap();

        // Record the first entry as posted.
        let mut ledger = Ledger::load(&path).unwrap();
        ledger
            .append(LedgerRecord {
                text: compiled[0].text.clone(),
                planned_timestamp: compiled[0].timestamp,
                actual_timestamp: compiled[0].timestamp,
                internal_id: compiled[0].internal_id.clone(),
                external_id: "100".into(),
            })
            .unwrap();

        // Recompile with aggressive fuzz: the posted entry must be untouched.
        let noisy = CONFIG
            .replace("fuzz-quotient = 0.0", "fuzz-quotient = 0.5")
            .replace("fuzz-minimum-seconds = 0", "fuzz-minimum-seconds = 600");
        let noisy_config = Config::from_toml(&noisy).unwrap();
        let mut rng = StdRng::seed_from_u64(99);
        let second_pass = Timeline::compile_with_rng(
            script.iter().copied(),
            &noisy_config,
            &ledger,
            &mut rng,
        )
        .unwrap();
        let recompiled = second_pass.compiled().unwrap();
        assert_eq!(recompiled[0].timestamp, compiled[0].timestamp);
    }
}
