//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il progress tracking visuale e il riepilogo di un run.
//!
//! ## Responsabilità:
//! - Progress bar con `indicatif` per feedback real-time nella CLI
//! - Percentuale dell'entry in compressione (i video avanzano, le immagini saltano a 100)
//! - `RunSummary`: contatori del singolo `compress_all`
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:42] [=========>------------------------------] 3/12 (25%) clip.mov 47%
//! ```
//!
//! ## Esempio:
//! ```rust,ignore
//! let progress = ProgressManager::new(total_entries);
//! progress.set_entry_progress("clip.mov", 47);
//! progress.update("[OK] clip.mov: 38% saved");
//! progress.finish(&summary.format_summary());
//! ```

use crate::file_manager::FileManager;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;

/// Manages progress reporting for a compression run
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    pub fn new(total_entries: u64) -> Self {
        let bar = ProgressBar::new(total_entries);

        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Advance by one finished entry
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    /// Show the percentage of the entry currently compressing
    pub fn set_entry_progress(&self, name: &str, percent: u8) {
        self.bar.set_message(format!("{} {}%", name, percent));
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

/// Counters for one `compress_all` run
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub entries_processed: usize,
    pub entries_done: usize,
    pub entries_failed: usize,
    pub total_original_size: u64,
    pub total_bytes_saved: u64,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_done(&mut self, original_size: u64, compressed_size: u64) {
        self.entries_processed += 1;
        self.entries_done += 1;
        self.total_original_size += original_size;
        self.total_bytes_saved += original_size.saturating_sub(compressed_size);
    }

    pub fn add_failed(&mut self, original_size: u64) {
        self.entries_processed += 1;
        self.entries_failed += 1;
        self.total_original_size += original_size;
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        if self.total_original_size > 0 {
            (self.total_bytes_saved as f64 / self.total_original_size as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Processed: {} | Done: {} | Failed: {} | Saved: {} ({:.2}%)",
            self.entries_processed,
            self.entries_done,
            self.entries_failed,
            FileManager::format_size(self.total_bytes_saved),
            self.overall_reduction_percent()
        )
    }
}
