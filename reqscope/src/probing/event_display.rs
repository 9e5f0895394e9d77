//! Presentation of decoded requests
//!
//! Runs on its own thread behind the lossy hand-off so a slow terminal never
//! stalls the ring-buffer consumer.

use crossbeam_channel::Receiver;
use serde::Serialize;
use std::borrow::Cow;
use std::io::{self, Write};
use std::thread::JoinHandle;

use super::event_decoder::DecodedRequest;

/// Width of the left-justified method column
pub const METHOD_COLUMN_WIDTH: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// `Method     Path` table
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

#[derive(Serialize)]
struct JsonRecord<'a> {
    method: &'a str,
    path: &'a str,
    method_len: u64,
    path_len: u64,
    truncated: bool,
}

/// Header line of the text format
#[must_use]
pub fn header_line() -> String {
    format!("{:<width$} {}", "Method", "Path", width = METHOD_COLUMN_WIDTH)
}

/// Render one event as a single line (no trailing newline)
#[must_use]
pub fn format_event(event: &DecodedRequest, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => format!(
            "{:<width$} {}",
            single_line(&event.method.text),
            single_line(&event.path.text),
            width = METHOD_COLUMN_WIDTH
        ),
        OutputFormat::Json => {
            let record = JsonRecord {
                method: &event.method.text,
                path: &event.path.text,
                method_len: event.method.claimed_len,
                path_len: event.path.claimed_len,
                truncated: event.truncated_fields() > 0,
            };
            // Plain struct of strings and integers, cannot fail
            serde_json::to_string(&record).unwrap_or_default()
        }
    }
}

/// Replace control characters so one event is always one line
fn single_line(text: &str) -> Cow<'_, str> {
    if text.chars().any(char::is_control) {
        Cow::Owned(text.chars().map(|c| if c.is_control() { '\u{fffd}' } else { c }).collect())
    } else {
        Cow::Borrowed(text)
    }
}

/// Write the header, then every event received until the channel closes.
/// Returns the number of events written.
///
/// # Errors
/// Returns an error if the output cannot be written
pub fn run_sink<W: Write>(
    events: &Receiver<DecodedRequest>,
    format: OutputFormat,
    mut out: W,
) -> io::Result<u64> {
    if format == OutputFormat::Text {
        writeln!(out, "{}", header_line())?;
        out.flush()?;
    }

    let mut written = 0;
    for event in events {
        writeln!(out, "{}", format_event(&event, format))?;
        written += 1;
        if events.is_empty() {
            out.flush()?;
        }
    }
    out.flush()?;
    Ok(written)
}

/// Run [`run_sink`] on stdout in a dedicated thread
#[must_use]
pub fn spawn_stdout_sink(
    events: Receiver<DecodedRequest>,
    format: OutputFormat,
) -> JoinHandle<io::Result<u64>> {
    std::thread::spawn(move || run_sink(&events, format, io::stdout().lock()))
}
