//! Output formatter for human-readable and JSON output
//!
//! Ensures consistent output formatting across all commands.

use comfy_table::{Table, presets};
use console::style;
use serde::Serialize;

use super::OutputConfig;

/// Formatter for CLI output
///
/// Handles both human-readable and JSON output formats based on configuration.
/// When JSON mode is enabled, all output is strict JSON without colors or progress.
#[derive(Debug, Clone)]
pub struct Formatter {
    config: OutputConfig,
}

impl Formatter {
    /// Create a new formatter with the given configuration
    pub fn new(config: OutputConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    /// Check if JSON output mode is enabled
    pub fn is_json(&self) -> bool {
        self.config.json
    }

    /// Check if colors are enabled
    pub fn colors_enabled(&self) -> bool {
        !self.config.no_color && !self.config.json
    }

    /// Output a success message
    ///
    /// In JSON mode, success is indicated by the exit code alone.
    pub fn success(&self, message: &str) {
        if self.config.quiet || self.config.json {
            return;
        }

        if self.colors_enabled() {
            println!("{} {message}", style("✓").green());
        } else {
            println!("✓ {message}");
        }
    }

    /// Output an error message
    ///
    /// Errors are always printed, even in quiet mode.
    pub fn error(&self, message: &str) {
        if self.config.json {
            let error = serde_json::json!({ "error": message });
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&error).unwrap_or_else(|_| message.to_string())
            );
        } else if self.colors_enabled() {
            eprintln!("{} {message}", style("✗").red());
        } else {
            eprintln!("✗ {message}");
        }
    }

    /// Output a warning message
    pub fn warning(&self, message: &str) {
        if self.config.quiet || self.config.json {
            return;
        }

        if self.colors_enabled() {
            eprintln!("{} {message}", style("⚠").yellow());
        } else {
            eprintln!("⚠ {message}");
        }
    }

    /// Output JSON directly
    pub fn json<T: Serialize>(&self, value: &T) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{json}"),
            Err(e) => eprintln!("Error serializing output: {e}"),
        }
    }

    /// Print a line of text (respects quiet mode)
    pub fn println(&self, message: &str) {
        if self.config.quiet {
            return;
        }
        println!("{message}");
    }

    /// Print rows as an aligned, borderless table (respects quiet mode)
    pub fn table(&self, header: &[&str], rows: Vec<Vec<String>>) {
        if self.config.quiet {
            return;
        }
        println!("{}", render_table(header, rows, self.colors_enabled()));
    }

    /// Dim secondary text when colors are enabled
    pub fn dim(&self, text: &str) -> String {
        if self.colors_enabled() {
            style(text).dim().to_string()
        } else {
            text.to_string()
        }
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(OutputConfig::default())
    }
}

fn render_table(header: &[&str], rows: Vec<Vec<String>>, colors: bool) -> Table {
    let mut table = Table::new();
    table.load_preset(presets::NOTHING);
    if !colors {
        table.force_no_tty();
    }
    table.set_header(header.to_vec());
    for row in rows {
        table.add_row(row);
    }
    table
}
