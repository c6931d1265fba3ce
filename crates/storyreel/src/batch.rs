//! Batch driver.
//!
//! Expands the catalog into capture units and runs them strictly in order
//! against one shared browser session. A unit failure is recorded and the
//! batch moves on; only a browser that cannot be launched stops the run.
//! The session is closed and lingering processes are cleaned up at the end
//! regardless of how the units went.

use crate::browser::BrowserLauncher;
use crate::capture::capture_unit;
use crate::catalog::{CaptureUnit, Catalog};
use crate::config::ExportConfig;
use crate::output::{ensure_dir, OutputLayout};
use crate::process::force_kill_lingering;
use crate::readiness::ReadyOutcome;
use crate::result::{ExportError, ExportResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;

// =============================================================================
// UNIT STATE
// =============================================================================

/// Lifecycle of one capture unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    /// Not started
    Pending,
    /// Browser work in progress
    Capturing,
    /// External encoder running
    Transcoding,
    /// Output file in place
    Placed,
    /// Terminal failure
    Failed,
}

impl UnitState {
    /// Whether no further transition is possible
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Placed | Self::Failed)
    }

    /// Whether `self -> next` is a legal forward transition
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Capturing)
                | (Self::Capturing, Self::Transcoding | Self::Placed)
                | (Self::Transcoding, Self::Placed)
                | (Self::Pending | Self::Capturing | Self::Transcoding, Self::Failed)
        )
    }
}

impl std::fmt::Display for UnitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Capturing => "capturing",
            Self::Transcoding => "transcoding",
            Self::Placed => "placed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Forward-only state tracker for one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitProgress {
    state: UnitState,
}

impl Default for UnitProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitProgress {
    /// Start in `Pending`
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: UnitState::Pending,
        }
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> UnitState {
        self.state
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// Rejects backward transitions and anything out of a terminal state.
    pub fn advance(&mut self, next: UnitState) -> ExportResult<()> {
        if !self.state.can_advance_to(next) {
            return Err(ExportError::config(format!(
                "illegal unit transition {} -> {next}",
                self.state
            )));
        }
        tracing::trace!(from = %self.state, to = %next, "unit state");
        self.state = next;
        Ok(())
    }

    /// Mark the unit failed unless it is already terminal
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = UnitState::Failed;
        }
    }
}

// =============================================================================
// REPORTING
// =============================================================================

/// Final record of one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitReport {
    /// Story identifier
    pub story: String,
    /// `cover` or `frame-N`
    pub visual: String,
    /// Render URL
    pub url: String,
    /// Output path
    pub path: PathBuf,
    /// Terminal state
    pub state: UnitState,
    /// Bytes written, for placed units
    pub bytes: Option<u64>,
    /// Wall-clock time spent on the unit
    pub elapsed_ms: u64,
    /// Whether readiness signals were all seen (placed units only)
    pub ready: Option<bool>,
    /// Error detail, for failed units
    pub error: Option<String>,
}

impl UnitReport {
    /// Whether the unit produced its file
    #[must_use]
    pub fn is_placed(&self) -> bool {
        self.state == UnitState::Placed
    }

    /// Short label, e.g. `welcome/cover`
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}/{}", self.story, self.visual)
    }
}

/// Result of a whole batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Strategy name (`gif` or `video`)
    pub strategy: String,
    /// Output root
    pub output_dir: PathBuf,
    /// Units attempted
    pub attempted: usize,
    /// Units placed
    pub placed: usize,
    /// Units failed
    pub failed: usize,
    /// Wall-clock duration of the run
    pub elapsed_ms: u64,
    /// Per-unit records in run order
    pub units: Vec<UnitReport>,
}

impl BatchSummary {
    fn from_reports(config: &ExportConfig, units: Vec<UnitReport>, elapsed_ms: u64) -> Self {
        let placed = units.iter().filter(|u| u.is_placed()).count();
        Self {
            strategy: config.strategy.name().to_string(),
            output_dir: config.output_dir.clone(),
            attempted: units.len(),
            placed,
            failed: units.len() - placed,
            elapsed_ms,
            units,
        }
    }

    /// Whether every unit was placed
    #[must_use]
    pub const fn all_placed(&self) -> bool {
        self.failed == 0
    }

    /// Failed units only
    pub fn failures(&self) -> impl Iterator<Item = &UnitReport> {
        self.units.iter().filter(|u| !u.is_placed())
    }

    /// Write the summary as pretty JSON
    pub fn write_json(&self, path: &std::path::Path) -> ExportResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Receives batch progress. Every method defaults to doing nothing.
pub trait BatchObserver {
    /// Called once before the browser is launched
    fn on_batch_start(&mut self, _total: usize, _config: &ExportConfig) {}

    /// Called before each unit
    fn on_unit_start(&mut self, _index: usize, _unit: &CaptureUnit) {}

    /// Called after each unit reaches a terminal state
    fn on_unit_finish(&mut self, _index: usize, _report: &UnitReport) {}

    /// Called once with the final summary
    fn on_batch_finish(&mut self, _summary: &BatchSummary) {}
}

/// Observer that ignores everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl BatchObserver for NullObserver {}

// =============================================================================
// DRIVER
// =============================================================================

/// Run every unit of `catalog` with `config`.
///
/// # Errors
///
/// Fails only if the configuration is invalid, the output root cannot be
/// created, or the browser cannot be launched. Unit failures are reported
/// in the returned summary.
pub async fn run_batch(
    launcher: &dyn BrowserLauncher,
    catalog: &Catalog,
    config: &ExportConfig,
    observer: &mut dyn BatchObserver,
) -> ExportResult<BatchSummary> {
    config.validate()?;
    let layout = OutputLayout::for_config(config);
    let units = layout.units(catalog, &config.base_url)?;
    ensure_dir(layout.root())?;

    let started = Instant::now();
    observer.on_batch_start(units.len(), config);
    tracing::info!(
        units = units.len(),
        strategy = config.strategy.name(),
        output = %layout.root().display(),
        "starting batch"
    );

    let mut session = match launcher.launch(&config.browser).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(error = %e, "browser launch failed, aborting batch");
            teardown(config).await;
            return Err(e);
        }
    };

    let mut reports = Vec::with_capacity(units.len());
    for (index, unit) in units.iter().enumerate() {
        observer.on_unit_start(index, unit);
        let unit_started = Instant::now();
        let mut progress = UnitProgress::new();

        let result = match progress.advance(UnitState::Capturing) {
            Ok(()) => capture_unit(session.as_mut(), unit, config, &layout, &mut progress).await,
            Err(e) => Err(e),
        };
        let elapsed_ms = unit_started.elapsed().as_millis() as u64;

        let report = match result {
            Ok(outcome) => {
                tracing::info!(
                    unit = %unit.label(),
                    path = %outcome.path.display(),
                    bytes = outcome.bytes,
                    elapsed_ms,
                    "unit placed"
                );
                UnitReport {
                    story: unit.story.to_string(),
                    visual: unit.selector.to_string(),
                    url: unit.url.clone(),
                    path: outcome.path,
                    state: progress.state(),
                    bytes: Some(outcome.bytes),
                    elapsed_ms,
                    ready: Some(matches!(outcome.readiness, ReadyOutcome::Ready { .. })),
                    error: None,
                }
            }
            Err(e) => {
                progress.fail();
                tracing::warn!(unit = %unit.label(), error = %e, elapsed_ms, "unit failed");
                UnitReport {
                    story: unit.story.to_string(),
                    visual: unit.selector.to_string(),
                    url: unit.url.clone(),
                    path: unit.output.clone(),
                    state: progress.state(),
                    bytes: None,
                    elapsed_ms,
                    ready: None,
                    error: Some(e.to_string()),
                }
            }
        };
        observer.on_unit_finish(index, &report);
        reports.push(report);
    }

    if let Err(e) = session.close().await {
        tracing::warn!(error = %e, "browser did not close cleanly");
    }
    teardown(config).await;

    let summary =
        BatchSummary::from_reports(config, reports, started.elapsed().as_millis() as u64);
    tracing::info!(
        attempted = summary.attempted,
        placed = summary.placed,
        failed = summary.failed,
        elapsed_ms = summary.elapsed_ms,
        "batch finished"
    );
    observer.on_batch_finish(&summary);
    Ok(summary)
}

/// Top-level process cleanup, run once per batch
async fn teardown(config: &ExportConfig) {
    if config.browser.force_kill_on_exit {
        force_kill_lingering(&config.browser.kill_patterns).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod state_tests {
        use super::*;

        #[test]
        fn test_forward_path_gif() {
            let mut progress = UnitProgress::new();
            progress.advance(UnitState::Capturing).unwrap();
            progress.advance(UnitState::Placed).unwrap();
            assert_eq!(progress.state(), UnitState::Placed);
        }

        #[test]
        fn test_forward_path_video() {
            let mut progress = UnitProgress::new();
            progress.advance(UnitState::Capturing).unwrap();
            progress.advance(UnitState::Transcoding).unwrap();
            progress.advance(UnitState::Placed).unwrap();
        }

        #[test]
        fn test_no_backward_transitions() {
            let mut progress = UnitProgress::new();
            progress.advance(UnitState::Capturing).unwrap();
            progress.advance(UnitState::Transcoding).unwrap();
            assert!(progress.advance(UnitState::Capturing).is_err());
            assert!(progress.advance(UnitState::Pending).is_err());
        }

        #[test]
        fn test_terminal_states_are_final() {
            let mut progress = UnitProgress::new();
            progress.fail();
            assert_eq!(progress.state(), UnitState::Failed);
            assert!(progress.advance(UnitState::Capturing).is_err());
            assert!(progress.advance(UnitState::Placed).is_err());

            let mut placed = UnitProgress::new();
            placed.advance(UnitState::Capturing).unwrap();
            placed.advance(UnitState::Placed).unwrap();
            placed.fail();
            assert_eq!(placed.state(), UnitState::Placed);
        }

        #[test]
        fn test_cannot_skip_capture() {
            let mut progress = UnitProgress::new();
            assert!(progress.advance(UnitState::Placed).is_err());
            assert!(progress.advance(UnitState::Transcoding).is_err());
        }
    }

    mod summary_tests {
        use super::*;

        fn report(state: UnitState) -> UnitReport {
            UnitReport {
                story: "welcome".to_string(),
                visual: "cover".to_string(),
                url: "http://localhost/export?story=welcome&cover=true".to_string(),
                path: PathBuf::from("exports/welcome/welcome-cover.gif"),
                state,
                bytes: None,
                elapsed_ms: 10,
                ready: None,
                error: None,
            }
        }

        #[test]
        fn test_counts() {
            let summary = BatchSummary::from_reports(
                &ExportConfig::default(),
                vec![
                    report(UnitState::Placed),
                    report(UnitState::Failed),
                    report(UnitState::Placed),
                ],
                30,
            );
            assert_eq!(summary.attempted, 3);
            assert_eq!(summary.placed, 2);
            assert_eq!(summary.failed, 1);
            assert!(!summary.all_placed());
            assert_eq!(summary.failures().count(), 1);
            assert_eq!(summary.strategy, "gif");
        }

        #[test]
        fn test_json_round_trip_fields() {
            let summary =
                BatchSummary::from_reports(&ExportConfig::default(), vec![report(UnitState::Placed)], 5);
            let json = serde_json::to_value(&summary).unwrap();
            assert_eq!(json["units"][0]["state"], "placed");
            assert_eq!(json["placed"], 1);
        }
    }
}
