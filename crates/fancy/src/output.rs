//! Output formatting: table, JSON, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one identifier per line.

use std::io::{self, Write};

use tabled::{Table, Tabled, settings::Style};

use crate::cli::OutputFormat;
use crate::error::CliError;

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
pub fn render_list<T, R>(
    format: OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
    R: Tabled,
{
    Ok(match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            render_table(&rows)
        }
        OutputFormat::Json => serde_json::to_string_pretty(data)?,
        OutputFormat::JsonCompact => serde_json::to_string(data)?,
        OutputFormat::Plain => data.iter().map(id_fn).collect::<Vec<_>>().join("\n"),
    })
}

/// Render a single item; table and plain use `text_fn`.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    text_fn: impl Fn(&T) -> Result<String, CliError>,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table | OutputFormat::Plain => text_fn(data),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
        OutputFormat::JsonCompact => Ok(serde_json::to_string(data)?),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}
