//! Raw recording container.
//!
//! Screencast frames arrive whenever the compositor produces them, so their
//! spacing is irregular. [`FrameTimeline`] keeps them with their arrival
//! offsets and resamples onto a constant frame rate by holding the most
//! recent frame. The result is written as a concatenated MJPEG stream, first
//! to a `.part` file that is renamed once complete, so the container only
//! becomes visible when it is whole.

use crate::result::{ExportError, ExportResult};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Name of the raw container inside a unit's scratch directory
pub const RECORDING_FILE: &str = "recording.mjpeg";

const PART_SUFFIX: &str = ".part";

/// One JPEG frame and when it arrived, relative to recording start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedFrame {
    /// Offset from recording start
    pub at: Duration,
    /// Encoded JPEG
    pub jpeg: Vec<u8>,
}

/// Irregularly-timed frames of one recording
#[derive(Debug, Clone, Default)]
pub struct FrameTimeline {
    frames: Vec<TimedFrame>,
}

impl FrameTimeline {
    /// Empty timeline
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a frame. Offsets earlier than the previous frame are clamped
    /// so the timeline stays sorted.
    pub fn push(&mut self, at: Duration, jpeg: Vec<u8>) {
        let at = self.frames.last().map_or(at, |last| at.max(last.at));
        self.frames.push(TimedFrame { at, jpeg });
    }

    /// Number of source frames
    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Source frame index for each output slot at `fps` over `[0, end)`.
    ///
    /// Slot `i` shows the latest frame that arrived at or before `i / fps`;
    /// slots before the first arrival repeat the first frame.
    #[must_use]
    pub fn resample(&self, fps: u32, end: Duration) -> Vec<usize> {
        if self.frames.is_empty() || fps == 0 {
            return Vec::new();
        }
        let slots = (end.as_secs_f64() * f64::from(fps)).ceil().max(1.0) as usize;
        let mut out = Vec::with_capacity(slots);
        let mut current = 0usize;
        for slot in 0..slots {
            let t = Duration::from_secs_f64(slot as f64 / f64::from(fps));
            while current + 1 < self.frames.len() && self.frames[current + 1].at <= t {
                current += 1;
            }
            out.push(current);
        }
        out
    }

    /// Write the resampled stream to `dir/recording.mjpeg`.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Recording`] for an empty timeline and
    /// [`ExportError::Io`] if the file cannot be written.
    pub async fn write_mjpeg(&self, dir: &Path, fps: u32, end: Duration) -> ExportResult<PathBuf> {
        let slots = self.resample(fps, end);
        if slots.is_empty() {
            return Err(ExportError::Recording {
                message: "no frames were recorded".to_string(),
            });
        }

        let final_path = dir.join(RECORDING_FILE);
        let part_path = dir.join(format!("{RECORDING_FILE}{PART_SUFFIX}"));

        let mut file = tokio::fs::File::create(&part_path).await?;
        for index in &slots {
            file.write_all(&self.frames[*index].jpeg).await?;
        }
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&part_path, &final_path).await?;
        tracing::debug!(
            path = %final_path.display(),
            source_frames = self.frames.len(),
            output_frames = slots.len(),
            "recording written"
        );
        Ok(final_path)
    }
}

/// Write `timeline` in the background, as a browser does after its context
/// closes. Errors are logged; the caller notices by the file never appearing.
pub fn spawn_flush(
    timeline: FrameTimeline,
    dir: PathBuf,
    fps: u32,
    end: Duration,
    delay: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Err(e) = timeline.write_mjpeg(&dir, fps, end).await {
            tracing::warn!(dir = %dir.display(), error = %e, "recording flush failed");
        }
    })
}
