//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits bare values.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use vigil_core::ChannelState;

use crate::cli::{ColorMode, OutputFormat};

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Channel state, colored by health.
pub fn paint_state(state: ChannelState, color: bool) -> String {
    let text = state.to_string();
    if !color {
        return text;
    }
    match state {
        ChannelState::Connected => text.green().to_string(),
        ChannelState::Connecting => text.cyan().to_string(),
        ChannelState::Disconnected => text.yellow().to_string(),
        ChannelState::Error => text.red().bold().to_string(),
        ChannelState::Idle => text.dimmed().to_string(),
    }
}

pub fn paint_count(value: u64, color: bool) -> String {
    if !color {
        return value.to_string();
    }
    if value == 0 {
        value.green().bold().to_string()
    } else {
        value.red().bold().to_string()
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a single serde-serializable report in the chosen format.
///
/// Table output is a two-column field/value table built by `rows_fn`;
/// plain output is whatever `plain_fn` returns.
pub fn render_single<T, R>(
    format: OutputFormat,
    data: &T,
    rows_fn: impl Fn(&T) -> Vec<R>,
    plain_fn: impl Fn(&T) -> String,
) -> String
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => render_table(&rows_fn(data)),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => plain_fn(data),
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

// ── Format-specific renderers ────────────────────────────────────────

/// One line of a field/value table.
#[derive(Tabled)]
pub struct FieldRow {
    #[tabled(rename = "Field")]
    pub field: &'static str,
    #[tabled(rename = "Value")]
    pub value: String,
}

impl FieldRow {
    pub fn new(field: &'static str, value: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
        }
    }
}

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

pub(crate) fn render_json<T: serde::Serialize + ?Sized>(data: &T, compact: bool) -> String {
    let rendered = if compact {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    rendered.unwrap_or_else(|e| format!("{{\"error\": \"serialization failed: {e}\"}}"))
}

fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> String {
    serde_yaml::to_string(data).unwrap_or_else(|e| format!("error: serialization failed: {e}"))
}
