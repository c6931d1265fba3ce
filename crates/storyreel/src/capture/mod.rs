//! Capture strategies.
//!
//! Both strategies follow the same contract: open an isolated context,
//! load the unit's render URL, wait for readiness, capture, and leave one
//! verified file at the unit's output path. Everything intermediate lives
//! in a scratch directory owned by the unit and removed on every exit path.

mod gif;
mod video;

use crate::batch::{UnitProgress, UnitState};
use crate::browser::{BrowserSession, CapturePage};
use crate::catalog::CaptureUnit;
use crate::config::{CaptureStrategy, ExportConfig};
use crate::output::{place, verify_output, MediaFormat, OutputLayout};
use crate::readiness::{await_ready, ReadyOutcome};
use crate::result::{ExportError, ExportResult};
use std::path::{Path, PathBuf};

/// A unit that reached its output path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    /// Final output path
    pub path: PathBuf,
    /// Bytes written
    pub bytes: u64,
    /// How the readiness wait ended
    pub readiness: ReadyOutcome,
}

/// Capture one unit with the configured strategy.
///
/// The scratch directory is removed whether or not the capture succeeds;
/// a failure to remove it is logged and does not fail the unit.
pub async fn capture_unit(
    session: &mut dyn BrowserSession,
    unit: &CaptureUnit,
    config: &ExportConfig,
    layout: &OutputLayout,
    progress: &mut UnitProgress,
) -> ExportResult<CaptureOutcome> {
    let scratch = layout.scratch_dir()?;
    let result = match &config.strategy {
        CaptureStrategy::Gif(settings) => {
            gif::capture(session, unit, config, settings, scratch.path()).await
        }
        CaptureStrategy::Video(settings) => {
            video::capture(session, unit, config, settings, scratch.path(), progress).await
        }
    };
    let placed = result.and_then(|(staged, readiness)| {
        let format = MediaFormat::for_strategy(&config.strategy);
        finalize(&staged, &unit.output, format).map(|bytes| (bytes, readiness))
    });

    let scratch_path = scratch.path().to_path_buf();
    if let Err(e) = scratch.close() {
        tracing::warn!(
            path = %scratch_path.display(),
            error = %e,
            "failed to remove scratch directory"
        );
    }

    let (bytes, readiness) = placed?;
    progress.advance(UnitState::Placed)?;
    Ok(CaptureOutcome {
        path: unit.output.clone(),
        bytes,
        readiness,
    })
}

/// Check a staged artifact, then move it into place.
///
/// An artifact that fails the check never touches `dest`, so output from an
/// earlier run survives a failed unit.
fn finalize(staged: &Path, dest: &Path, format: MediaFormat) -> ExportResult<u64> {
    verify_output(staged, format)?;
    let bytes = place(staged, dest)?;
    tracing::debug!(path = %dest.display(), bytes, "output placed");
    Ok(bytes)
}

/// Navigate and wait until the page is safe to capture.
///
/// A readiness timeout is logged and followed by the configured fallback
/// delay; an unknown story fails the unit.
async fn settle(
    page: &mut dyn CapturePage,
    unit: &CaptureUnit,
    config: &ExportConfig,
) -> ExportResult<ReadyOutcome> {
    page.navigate(&unit.url, config.browser.navigation_timeout())
        .await?;

    let outcome = await_ready(&*page, &config.readiness).await;
    if !outcome.should_capture() {
        return Err(ExportError::StoryNotFound {
            url: unit.url.clone(),
        });
    }
    if let ReadyOutcome::TimedOut { missing, .. } = &outcome {
        tracing::debug!(
            unit = %unit.label(),
            missing = ?missing,
            fallback_ms = config.readiness.fallback_delay_ms,
            "page not ready, using fallback delay"
        );
        tokio::time::sleep(std::time::Duration::from_millis(
            config.readiness.fallback_delay_ms,
        ))
        .await;
    }
    Ok(outcome)
}

/// Close a page; errors are logged and returned
async fn close_page(mut page: Box<dyn CapturePage>, unit: &CaptureUnit) -> ExportResult<()> {
    let result = page.close().await;
    if let Err(e) = &result {
        tracing::warn!(unit = %unit.label(), error = %e, "failed to close capture context");
    }
    result
}

/// Name of the staged artifact inside the scratch directory
fn staged_name(unit: &CaptureUnit, extension: &str) -> String {
    format!("{}-{}.{extension}", unit.story, unit.selector)
}
