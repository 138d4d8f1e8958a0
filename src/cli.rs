//! CLI interface for serialist.
//!
//! Two non-interactive subcommands operate on a story directory:
//!
//! - `serialist compile <dir>` — turn `script.txt` into a scheduled
//!   `timeline.jsonl`.
//! - `serialist sync <dir>` — post the next due entry, if any, and record
//!   it in `progress.jsonl`. Safe to run from cron.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use jiff::{SignedDuration, Timestamp};

use crate::config::Config;
use crate::ledger::Ledger;
use crate::publish::{self, SyncOutcome};
use crate::service::HttpService;
use crate::timeline::Timeline;

/// serialist — compile a serialized-narrative script and post it on schedule.
#[derive(Debug, Parser)]
#[command(name = "serialist")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compile `script.txt` into a scheduled `timeline.jsonl`.
    Compile {
        /// Story directory holding `config.toml` and `script.txt`.
        dir: PathBuf,
    },

    /// Post the next due entry, if any. Posts at most one per run.
    Sync {
        /// Story directory holding the compiled timeline and progress ledger.
        dir: PathBuf,
    },
}

/// Run the CLI, returning an error message on failure.
pub fn run() -> Result<(), String> {
    let cli = Cli::parse();
    match cli.command {
        Command::Compile { dir } => cmd_compile(&dir),
        Command::Sync { dir } => cmd_sync(&dir),
    }
}

fn cmd_compile(dir: &Path) -> Result<(), String> {
    let config = Config::load(dir).map_err(|e| e.to_string())?;
    let ledger = Ledger::load(dir.join("progress.jsonl"))
        .map_err(|e| format!("failed to load progress ledger: {e}"))?;

    let script_path = dir.join("script.txt");
    let script = fs::read_to_string(&script_path)
        .map_err(|e| format!("failed to read {}: {e}", script_path.display()))?;

    let timeline =
        Timeline::compile(script.lines(), &config, &ledger).map_err(|e| e.to_string())?;
    for warning in timeline.warnings() {
        eprintln!("warning: {warning}");
    }
    let compiled = timeline.compiled().map_err(|e| e.to_string())?;

    let mut out = String::new();
    for record in &compiled {
        let line = serde_json::to_string(record)
            .map_err(|e| format!("failed to serialize timeline: {e}"))?;
        out.push_str(&line);
        out.push('\n');
    }
    let out_path = dir.join("timeline.jsonl");
    fs::write(&out_path, out).map_err(|e| format!("failed to write {}: {e}", out_path.display()))?;

    println!(
        "Compiled {} entries in {} chapters → {}",
        compiled.len(),
        timeline.chapters().len(),
        out_path.display()
    );
    Ok(())
}

fn cmd_sync(dir: &Path) -> Result<(), String> {
    let config = Config::load(dir).map_err(|e| e.to_string())?;
    let script = publish::load_compiled(dir).map_err(|e| e.to_string())?;
    let mut ledger = Ledger::load(dir.join("progress.jsonl"))
        .map_err(|e| format!("failed to load progress ledger: {e}"))?;

    let service_config = config
        .service
        .as_ref()
        .ok_or("no [service] section in config.toml")?;
    let service = HttpService::new(service_config);

    let outcome = publish::sync(&script, &config, &mut ledger, &service, Timestamp::now())
        .map_err(|e| e.to_string())?;

    match outcome {
        SyncOutcome::Posted { text } => println!("Posted \"{text}\""),
        SyncOutcome::Waiting { text, remaining } => {
            println!("Coming up in {}: \"{text}\"", format_remaining(remaining));
        }
        SyncOutcome::UpToDate => println!("Nothing left to post."),
    }
    Ok(())
}

/// Render a remaining duration as `2d 3h 14m` (seconds only under a minute).
fn format_remaining(remaining: SignedDuration) -> String {
    let secs = remaining.as_secs().max(0);
    let days = secs / 86_400;
    let hours = secs % 86_400 / 3_600;
    let mins = secs % 3_600 / 60;
    if days > 0 {
        format!("{days}d {hours}h {mins}m")
    } else if hours > 0 {
        format!("{hours}h {mins}m")
    } else if mins > 0 {
        format!("{mins}m")
    } else {
        format!("{secs}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_formats_scale_with_magnitude() {
        assert_eq!(format_remaining(SignedDuration::from_secs(42)), "42s");
        assert_eq!(format_remaining(SignedDuration::from_mins(5)), "5m");
        assert_eq!(
            format_remaining(SignedDuration::from_secs(3 * 3600 + 14 * 60)),
            "3h 14m"
        );
        assert_eq!(
            format_remaining(SignedDuration::from_secs(2 * 86_400 + 3 * 3600)),
            "2d 3h 0m"
        );
    }
}
