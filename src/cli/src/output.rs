//! Table and progress formatting for CLI output.

use std::io::Write;

use comfy_table::{ContentArrangement, Table};
use jmanager_core::distribution::Distribution;
use jmanager_runtime::Progress;

/// Create a styled table with the given headers.
pub fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(comfy_table::presets::NOTHING);
    table.set_header(headers);
    table
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Components in extraction order, comma separated.
pub fn format_components(distribution: &Distribution) -> String {
    distribution
        .components
        .iter()
        .map(|c| c.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

/// One status line for a progress event.
pub fn render_progress(progress: &Progress<'_>) -> String {
    match progress {
        Progress::Fetch(f) => {
            let speed = format!("{}/s", format_bytes(f.bytes_per_sec as u64));
            if f.total > 0 {
                format!(
                    "Fetching {} {}/{} ({}%) {}",
                    f.label,
                    format_bytes(f.received),
                    format_bytes(f.total),
                    f.received * 100 / f.total,
                    speed
                )
            } else {
                format!("Fetching {} {} {}", f.label, format_bytes(f.received), speed)
            }
        }
        Progress::Build(b) => format!(
            "Extracting {} {}/{}",
            b.component, b.entries_done, b.entries_total
        ),
    }
}

/// Redraws a single status line on stderr.
#[derive(Debug, Default)]
pub struct ProgressPrinter {
    quiet: bool,
    width: usize,
}

impl ProgressPrinter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet, width: 0 }
    }

    pub fn report(&mut self, progress: Progress<'_>) -> jmanager_core::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let line = render_progress(&progress);
        let pad = self.width.saturating_sub(line.len());
        self.width = line.len();

        let mut stderr = std::io::stderr().lock();
        write!(stderr, "\r{}{}", line, " ".repeat(pad))?;
        let finished = match progress {
            Progress::Fetch(f) => f.total > 0 && f.received >= f.total,
            Progress::Build(b) => b.entries_done >= b.entries_total,
        };
        if finished {
            writeln!(stderr)?;
            self.width = 0;
        }
        stderr.flush()?;
        Ok(())
    }
}
