mod cli;
mod config;
mod ledger;
mod model;
mod publish;
mod schedule;
mod script;
mod service;
mod timefmt;
mod timeline;

use std::process;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
