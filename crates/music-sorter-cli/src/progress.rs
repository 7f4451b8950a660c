use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use music_sorter_core::{ProgressReporter, ProgressUpdate, Stage};
use std::sync::Mutex;
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// indicatif front end for stage progress.
///
/// A stage with a known total gets a bar; a stage that starts with nothing to do
/// gets a spinner.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn set_bar(&self, pb: ProgressBar) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(old) = guard.replace(pb) {
                old.finish_and_clear();
            }
        }
    }

    fn finish_bar(&self) {
        if let Ok(mut guard) = self.bar.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "  {spinner:.cyan} {prefix} [{bar:30.cyan/dim}] {pos}/{len} ({eta} remaining) {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("━╸─")
    .tick_chars(TICK_CHARS)
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner:.cyan} {prefix} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(TICK_CHARS)
}

fn label(stage: Stage) -> &'static str {
    match stage {
        Stage::Index => "Indexing",
        Stage::Metadata => "Reading tags",
        Stage::Dedupe => "Finding duplicates",
        Stage::Migration => "Migrating",
    }
}

impl ProgressReporter for CliReporter {
    fn on_stage_start(&self, stage: Stage, total: usize) {
        let pb = if total > 0 {
            ProgressBar::new(total as u64).with_style(bar_style())
        } else {
            ProgressBar::new_spinner().with_style(spinner_style())
        };
        pb.set_prefix(label(stage));
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_progress(&self, update: &ProgressUpdate) {
        let Ok(guard) = self.bar.lock() else {
            return;
        };
        if let Some(pb) = guard.as_ref() {
            // Duplicate detection re-bases its total when it moves from grouping to scoring.
            if pb.length() != Some(update.total as u64) {
                pb.set_length(update.total as u64);
            }
            pb.set_position(update.progress as u64);
            let c = update.counters;
            pb.set_message(match update.operation {
                Stage::Dedupe => format!("{} groups", c.groups),
                _ => format!("{} ok, {} skipped, {} failed", c.added, c.skipped, c.failed),
            });
        }
    }

    fn on_stage_complete(&self, stage: Stage, elapsed: Duration) {
        self.finish_bar();
        eprintln!(
            "  {} {} finished in {:.2}s",
            "✓".green(),
            label(stage),
            elapsed.as_secs_f64()
        );
    }
}
