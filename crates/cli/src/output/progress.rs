//! Spinner for uploads
//!
//! Closing a written handle performs one upload whose length is only known
//! once it starts, so progress is shown as an indeterminate spinner.

use std::time::Duration;

use super::OutputConfig;

/// Spinner wrapper
///
/// In quiet, JSON or no-progress mode nothing is drawn.
#[derive(Debug)]
pub struct ProgressBar {
    bar: Option<indicatif::ProgressBar>,
}

impl ProgressBar {
    /// Create a spinner with an initial message
    pub fn spinner(config: &OutputConfig, message: &str) -> Self {
        if config.quiet || config.json || config.no_progress {
            return Self { bar: None };
        }

        let bar = indicatif::ProgressBar::new_spinner();
        if let Ok(style) = indicatif::ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            bar.set_style(style);
        }
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar: Some(bar) }
    }

    /// Set message
    pub fn set_message(&self, message: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(message.to_string());
        }
    }

    /// Finish and clear the spinner
    pub fn finish_and_clear(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }

    /// Check if the spinner is visible
    pub fn is_visible(&self) -> bool {
        self.bar.is_some()
    }
}
