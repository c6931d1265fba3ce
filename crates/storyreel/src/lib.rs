//! Storyreel: story export pipeline
//!
//! Drives a headless browser over a catalog of animated stories and writes
//! one shareable asset per story visual (the cover plus every content
//! frame), either as an animated GIF built from screenshots or as an
//! MP4/WebM transcoded from a native recording.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌───────────┐   ┌───────────┐   ┌──────────┐
//! │ Catalog  │──►│ BatchDriver │──►│ Browser   │──►│ Readiness │──►│ Capture  │
//! │ (units)  │   │ (sequential)│   │ (context) │   │ (poll)    │   │ gif/video│
//! └──────────┘   └─────────────┘   └───────────┘   └───────────┘   └────┬─────┘
//!                                                                         │
//!                        ┌──────────────┐   ┌───────────┐                 │
//!                        │ OutputLayout │◄──│ Transcode │◄────────────────┘
//!                        │ (place+check)│   │ (ffmpeg)  │
//!                        └──────────────┘   └───────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use storyreel::{run_batch, Catalog, ChromiumLauncher, ExportConfig, NullObserver};
//!
//! # async fn demo() -> storyreel::ExportResult<()> {
//! let config = ExportConfig::default().with_output_dir("exports");
//! let catalog = Catalog::builtin().filtered(&["welcome".to_string()])?;
//! let summary = run_batch(&ChromiumLauncher::new(), &catalog, &config, &mut NullObserver).await?;
//! println!("{}/{} placed", summary.placed, summary.attempted);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod batch;
mod capture;
mod catalog;
mod config;
mod output;
mod process;
mod readiness;
mod result;

/// Browser backends (Chromium over CDP, in-process mock)
pub mod browser;

/// GIF assembly and the raw recording container
pub mod media;

/// External encoder invocation
pub mod transcode;

/// Bounded polling with backoff
pub mod wait;

pub use batch::{
    run_batch, BatchObserver, BatchSummary, NullObserver, UnitProgress, UnitReport, UnitState,
};
#[cfg(feature = "browser")]
pub use browser::ChromiumLauncher;
pub use browser::{BrowserLauncher, BrowserSession, CapturePage, ContextSpec, MockBrowser};
pub use capture::{capture_unit, CaptureOutcome};
pub use catalog::{render_url, CaptureUnit, Catalog, FrameSelector, StoryEntry, StoryId};
pub use config::{
    BrowserOptions, CaptureStrategy, ExportConfig, GifSettings, ReadinessConfig, VideoSettings,
    Viewport, DEFAULT_BASE_URL, DEFAULT_OUTPUT_DIR, MAX_GIF_DIMENSION, MAX_GIF_FRAMES,
};
pub use output::{ensure_dir, place, verify_output, MediaFormat, OutputLayout, TEMP_DIR_PREFIX};
pub use process::{force_kill_lingering, KillReport};
pub use readiness::{await_ready, ReadyOutcome};
pub use result::{ExportError, ExportResult};
pub use transcode::{CodecParams, Transcoder, VideoContainer};
