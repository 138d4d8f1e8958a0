//! Core data model: authors, entries, days, and chapters.

mod author;
mod chapter;
mod entry;

pub use author::Author;
pub use chapter::{Chapter, Day};
pub use entry::{Anchor, ContentId, DEFAULT_DELAY, Entry, EntryError};
