//! Output formatting and progress reporting

use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use storyreel::{BatchObserver, BatchSummary, CaptureUnit, ExportConfig, UnitReport};

/// Progress reporter for export runs
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    progress_bar: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            progress_bar: None,
            use_color,
            quiet,
        }
    }

    /// Start a progress bar
    pub fn start_progress(&mut self, total: u64, message: &str) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new(total);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );
        pb.set_message(message.to_string());
        pb.enable_steady_tick(Duration::from_millis(120));
        self.progress_bar = Some(pb);
    }

    /// Increment progress
    pub fn increment(&self, delta: u64) {
        if let Some(ref pb) = self.progress_bar {
            pb.inc(delta);
        }
    }

    /// Update progress message
    pub fn set_message(&self, message: &str) {
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(message.to_string());
        }
    }

    /// Finish and clear the progress bar
    pub fn finish(&mut self) {
        if let Some(pb) = self.progress_bar.take() {
            pb.finish_and_clear();
        }
    }

    fn line(&self, text: &str) {
        match self.progress_bar {
            Some(ref pb) => pb.println(text),
            None => {
                let _ = self.term.write_line(text);
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("✓").green().bold().to_string()
        } else {
            "OK".to_string()
        };

        self.line(&format!("{prefix} {message}"));
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // Always print failures, even in quiet mode
        let prefix = if self.use_color {
            style("✗").red().bold().to_string()
        } else {
            "FAIL".to_string()
        };

        self.line(&format!("{prefix} {message}"));
    }

    /// Print a warning message
    pub fn warning(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("⚠").yellow().bold().to_string()
        } else {
            "WARN".to_string()
        };

        self.line(&format!("{prefix} {message}"));
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("ℹ").blue().bold().to_string()
        } else {
            "INFO".to_string()
        };

        self.line(&format!("{prefix} {message}"));
    }

    /// Print the final tally
    pub fn summary(&self, placed: usize, failed: usize, duration: Duration) {
        if self.quiet && failed == 0 {
            return;
        }

        let _ = self.term.write_line("");

        let total = placed + failed;
        let duration_secs = duration.as_secs_f64();

        if self.use_color {
            let placed_style = Style::new().green().bold();
            let failed_style = Style::new().red().bold();

            let status = if failed > 0 {
                failed_style.apply_to("INCOMPLETE")
            } else {
                placed_style.apply_to("DONE")
            };

            let _ = self.term.write_line(&format!(
                "{} {} visuals in {:.2}s ({} placed, {} failed)",
                status,
                total,
                duration_secs,
                placed_style.apply_to(placed),
                if failed > 0 {
                    failed_style.apply_to(failed).to_string()
                } else {
                    failed.to_string()
                },
            ));
        } else {
            let status = if failed > 0 { "INCOMPLETE" } else { "DONE" };
            let _ = self.term.write_line(&format!(
                "{status} {total} visuals in {duration_secs:.2}s ({placed} placed, {failed} failed)"
            ));
        }
    }
}

impl BatchObserver for ProgressReporter {
    fn on_batch_start(&mut self, total: usize, config: &ExportConfig) {
        self.info(&format!(
            "exporting {total} visuals as {} into {}",
            config.strategy.name(),
            config.output_dir.display()
        ));
        self.start_progress(total as u64, "launching browser");
    }

    fn on_unit_start(&mut self, _index: usize, unit: &CaptureUnit) {
        self.set_message(&unit.label());
    }

    fn on_unit_finish(&mut self, _index: usize, report: &UnitReport) {
        if report.is_placed() {
            let kib = report.bytes.unwrap_or(0) / 1024;
            let mut message = format!("{} -> {} ({kib} KiB)", report.label(), report.path.display());
            if report.ready == Some(false) {
                message.push_str(" [not ready, fallback delay used]");
            }
            self.success(&message);
        } else {
            self.failure(&format!(
                "{}: {}",
                report.label(),
                report.error.as_deref().unwrap_or("unknown error")
            ));
        }
        self.increment(1);
    }

    fn on_batch_finish(&mut self, summary: &BatchSummary) {
        self.finish();
        self.summary(
            summary.placed,
            summary.failed,
            Duration::from_millis(summary.elapsed_ms),
        );
    }
}
