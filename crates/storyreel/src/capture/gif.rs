//! Screenshot sequence to animated GIF.

use super::{close_page, settle, staged_name};
use crate::browser::{BrowserSession, CapturePage, ContextSpec};
use crate::catalog::CaptureUnit;
use crate::config::{ExportConfig, GifSettings};
use crate::media::GifAssembler;
use crate::readiness::ReadyOutcome;
use crate::result::{ExportError, ExportResult};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Capture `fps * duration` screenshots and encode them into a staged GIF.
pub(super) async fn capture(
    session: &mut dyn BrowserSession,
    unit: &CaptureUnit,
    config: &ExportConfig,
    settings: &GifSettings,
    scratch: &Path,
) -> ExportResult<(PathBuf, ReadyOutcome)> {
    let mut assembler = GifAssembler::new(settings)?;
    let mut page = session.new_context(&ContextSpec::new(config.viewport)).await?;

    let shot = async {
        let readiness = settle(page.as_mut(), unit, config).await?;
        take_screenshots(page.as_ref(), settings, config.screenshot_timeout(), &mut assembler)
            .await?;
        Ok::<_, ExportError>(readiness)
    }
    .await;
    let closed = close_page(page, unit).await;
    let readiness = shot?;
    closed?;

    let started = Instant::now();
    let frames = assembler.frame_count();
    let bytes = tokio::task::spawn_blocking(move || assembler.encode())
        .await
        .map_err(|e| ExportError::ImageProcessing {
            message: format!("encoder task failed: {e}"),
        })??;
    tracing::debug!(
        unit = %unit.label(),
        frames,
        bytes = bytes.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "gif encoded"
    );

    let staged = scratch.join(staged_name(unit, "gif"));
    tokio::fs::write(&staged, &bytes).await?;
    Ok((staged, readiness))
}

/// Take exactly `settings.total_frames()` screenshots, `1000 / fps` ms apart.
///
/// The interval is slept after each screenshot, so screenshot latency adds
/// to the wall-clock duration.
async fn take_screenshots(
    page: &dyn CapturePage,
    settings: &GifSettings,
    timeout: Duration,
    assembler: &mut GifAssembler,
) -> ExportResult<()> {
    let total = settings.total_frames();
    let interval = settings.frame_interval();
    for index in 0..total {
        let png = tokio::time::timeout(timeout, page.screenshot_png())
            .await
            .map_err(|_| ExportError::Screenshot {
                message: format!("frame {} timed out after {}ms", index + 1, timeout.as_millis()),
            })??;
        assembler.push_png(&png)?;
        if index + 1 < total {
            tokio::time::sleep(interval).await;
        }
    }
    Ok(())
}
