use std::io::{self, Write};

use serde::Serialize;

use crate::fetcher::{FetchOutcome, ProgressEvent, ProgressSink};
use crate::manifest::Manifest;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_fetch(result: &FetchOutcome) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_info(result: Option<&Manifest>) -> io::Result<()> {
        Self::print_json(&result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Writes progress lines to stderr, keeping stdout for results.
pub struct ConsoleOutput;

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        let mut stderr = io::stderr().lock();
        let _ = match event.elapsed {
            Some(elapsed) => writeln!(stderr, "{} ({} ms)", event.message, elapsed.as_millis()),
            None => writeln!(stderr, "{}", event.message),
        };
    }
}
