//! # Progress Feedback Module
//!
//! Feedback visivo per una singola conversione con `indicatif`.
//!
//! ## Responsabilità:
//! - Spinner animato mentre la conversione gira in background
//! - Messaggio finale di successo o errore
//! - Modalità nascosta quando l'output è JSON (stdout riservato ai messaggi)
//! - Riga finale semplice quando stderr non è un terminale
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:04] Converting clip.mp4 -> clip.mkv (media)
//! ✅ clip.mkv (1.2 MB) in 4.1s
//! ```

use crate::file_manager::FileManager;
use crate::request::ConversionReport;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Spinner shown while one conversion is running
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
    /// Print nothing at all, not even the final line
    quiet: bool,
}

impl ProgressManager {
    /// Start a spinner with the given message
    pub fn spinner(message: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(style);
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(100));
        Self { bar, quiet: false }
    }

    /// Progress manager that draws nothing
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            quiet: true,
        }
    }

    pub fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    /// Stop the spinner with a success line
    pub fn finish(&self, report: &ConversionReport, output_size: Option<u64>) {
        let size = output_size
            .map(|bytes| format!(" ({})", FileManager::format_size(bytes)))
            .unwrap_or_default();
        let message = format!(
            "✅ {}{} in {:.1}s",
            report.output_path.display(),
            size,
            report.elapsed.as_secs_f64()
        );
        if self.prints_plain_lines() {
            println!("{}", message);
        }
        self.bar.finish_with_message(message);
    }

    /// Stop the spinner leaving the failure message on screen
    pub fn fail(&self, message: &str) {
        let message = format!("❌ {}", message);
        if self.prints_plain_lines() {
            eprintln!("{}", message);
        }
        self.bar.abandon_with_message(message);
    }

    /// The spinner is not drawn (stderr is not a terminal) but the result must still be shown
    fn prints_plain_lines(&self) -> bool {
        !self.quiet && self.bar.is_hidden()
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    pub fn is_finished(&self) -> bool {
        self.bar.is_finished()
    }
}
