//! Native recording to MP4/WebM.
//!
//! Recording starts with the context, so the browser records from the first
//! paint. After readiness the page is held open for the performance window,
//! then closed; the recorder flushes asynchronously, so the raw container is
//! awaited with a bounded backoff poll before it is transcoded.

use super::{close_page, settle, staged_name};
use crate::batch::{UnitProgress, UnitState};
use crate::browser::{BrowserSession, ContextSpec};
use crate::catalog::CaptureUnit;
use crate::config::{ExportConfig, VideoSettings};
use crate::media::RECORDING_FILE;
use crate::readiness::ReadyOutcome;
use crate::result::ExportResult;
use crate::transcode::Transcoder;
use crate::wait::{wait_for_file, WaitOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on the gap between file-appearance polls
const FILE_POLL_CEILING_MS: u64 = 500;

/// Record the unit, then transcode the raw container into a staged file.
pub(super) async fn capture(
    session: &mut dyn BrowserSession,
    unit: &CaptureUnit,
    config: &ExportConfig,
    settings: &VideoSettings,
    scratch: &Path,
    progress: &mut UnitProgress,
) -> ExportResult<(PathBuf, ReadyOutcome)> {
    let spec = ContextSpec::new(config.viewport).with_recording(scratch, settings.fps);
    let mut page = session.new_context(&spec).await?;

    let performed = async {
        let readiness = settle(page.as_mut(), unit, config).await?;
        tokio::time::sleep(Duration::from_millis(settings.performance_window_ms)).await;
        Ok::<_, crate::ExportError>(readiness)
    }
    .await;
    let closed = close_page(page, unit).await;
    let readiness = performed?;
    closed?;

    let wait = WaitOptions::new()
        .with_timeout(settings.file_wait_timeout_ms)
        .with_max_poll_interval(FILE_POLL_CEILING_MS);
    let raw = wait_for_file(&scratch.join(RECORDING_FILE), &wait).await?;

    progress.advance(UnitState::Transcoding)?;
    let staged = scratch.join(staged_name(unit, settings.container.extension()));
    Transcoder::new(&settings.encoder)
        .transcode(&raw, &staged, &settings.codec_params())
        .await?;

    if let Err(e) = tokio::fs::remove_file(&raw).await {
        tracing::warn!(path = %raw.display(), error = %e, "failed to remove raw recording");
    }
    Ok((staged, readiness))
}
