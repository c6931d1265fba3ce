//! Browser session management.
//!
//! The pipeline talks to a browser through three traits so that capture
//! logic can be exercised without a real Chromium:
//!
//! ```text
//! BrowserLauncher ──launch──▶ BrowserSession ──new_context──▶ CapturePage
//!   (one per run)             (one process per batch)         (one isolated
//!                                                               context per unit)
//! ```
//!
//! - [`ChromiumLauncher`] drives Chromium over CDP (feature `browser`).
//! - [`MockBrowser`] is a scriptable in-process backend.

#[cfg(feature = "browser")]
mod chromium;
mod mock;

#[cfg(feature = "browser")]
pub use chromium::ChromiumLauncher;
pub use mock::{MockBrowser, MockCalls};

use crate::config::{BrowserOptions, Viewport};
use crate::result::ExportResult;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// Native recording requested for a context at creation time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSpec {
    /// Directory the raw container is written into
    pub dir: PathBuf,
    /// Constant output frame rate
    pub fps: u32,
}

/// Everything needed to open one isolated capture context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSpec {
    /// Viewport in CSS pixels
    pub viewport: Viewport,
    /// Recording to start with the context, if any
    pub recording: Option<RecordingSpec>,
}

impl ContextSpec {
    /// Context without recording
    #[must_use]
    pub const fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            recording: None,
        }
    }

    /// Record the context into `dir` at `fps`
    #[must_use]
    pub fn with_recording(mut self, dir: impl Into<PathBuf>, fps: u32) -> Self {
        self.recording = Some(RecordingSpec {
            dir: dir.into(),
            fps,
        });
        self
    }
}

/// Starts browser processes
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launch a browser.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ExportError::BrowserLaunch`] if no browser could be
    /// started; callers treat this as fatal for the batch.
    async fn launch(&self, options: &BrowserOptions) -> ExportResult<Box<dyn BrowserSession>>;
}

/// A running browser shared sequentially by capture units
#[async_trait]
pub trait BrowserSession: Send {
    /// Open a fresh isolated context with one page
    async fn new_context(&mut self, spec: &ContextSpec) -> ExportResult<Box<dyn CapturePage>>;

    /// Shut the browser down. Safe to call more than once.
    async fn close(&mut self) -> ExportResult<()>;
}

/// One page inside an isolated context
#[async_trait]
pub trait CapturePage: Send + Sync {
    /// Load `url`, failing after `timeout`
    async fn navigate(&mut self, url: &str, timeout: Duration) -> ExportResult<()>;

    /// For each attribute, whether some element carries it with value `"true"`
    async fn flags_set(&self, attributes: &[String]) -> ExportResult<Vec<bool>>;

    /// Capture the viewport as PNG
    async fn screenshot_png(&self) -> ExportResult<Vec<u8>>;

    /// Close the page and dispose of its context.
    ///
    /// A recording started with the context is flushed to disk in the
    /// background; the file may appear after this returns. Safe to call
    /// more than once.
    async fn close(&mut self) -> ExportResult<()>;
}

/// Script evaluated to read readiness attributes.
///
/// `%ATTRS%` is replaced by a JSON array of attribute names.
#[cfg_attr(not(feature = "browser"), allow(dead_code))]
pub(crate) const FLAGS_SCRIPT: &str = r#"(() => {
  const attrs = %ATTRS%;
  return attrs.map((a) => document.querySelector('[' + a + '="true"]') !== null);
})()"#;

/// Build the flag-reading script for `attributes`
#[cfg_attr(not(feature = "browser"), allow(dead_code))]
pub(crate) fn flags_script(attributes: &[String]) -> ExportResult<String> {
    let list = serde_json::to_string(attributes)?;
    Ok(FLAGS_SCRIPT.replace("%ATTRS%", &list))
}
