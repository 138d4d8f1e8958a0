//! Narrative grouping levels: chapters and in-story days.

use jiff::Zoned;

use super::Entry;

/// One in-story day's worth of entries.
#[derive(Debug, Clone)]
pub struct Day {
    pub label: String,
    pub entries: Vec<Entry>,
}

impl Day {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            entries: Vec::new(),
        }
    }
}

/// A chapter: a named run of in-story days with a derived start date.
///
/// The first chapter starts at the campaign start date; each later chapter
/// starts at the previous chapter's start plus the configured duration.
#[derive(Debug, Clone)]
pub struct Chapter {
    pub name: String,
    pub start: Zoned,
    pub days: Vec<Day>,
}

impl Chapter {
    pub fn new(name: impl Into<String>, start: Zoned) -> Self {
        Self {
            name: name.into(),
            start,
            days: Vec::new(),
        }
    }

    /// Number of entries across every day of this chapter.
    pub fn total_entries(&self) -> usize {
        self.days.iter().map(|d| d.entries.len()).sum()
    }

    /// Entries of this chapter in compile order.
    pub fn entries(&self) -> impl Iterator<Item = &Entry> {
        self.days.iter().flat_map(|d| d.entries.iter())
    }

    /// The most recently compiled entry of this chapter, if any.
    pub fn last_entry(&self) -> Option<&Entry> {
        self.days.iter().rev().find_map(|d| d.entries.last())
    }
}
