//! In-process browser backend for tests.
//!
//! `MockBrowser` renders solid-colour frames, answers readiness probes from
//! a small script, and writes recordings through the real MJPEG writer so
//! the rest of the pipeline runs unchanged.

use super::{BrowserLauncher, BrowserSession, CapturePage, ContextSpec, RecordingSpec};
use crate::config::{BrowserOptions, Viewport};
use crate::media::{spawn_flush, FrameTimeline};
use crate::result::{ExportError, ExportResult};
use async_trait::async_trait;
use image::{ImageFormat, Rgba, RgbImage, RgbaImage};
use std::collections::HashSet;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Attribute raised for unknown stories unless overridden
const DEFAULT_NOT_FOUND_ATTRIBUTE: &str = "data-story-not-found";

#[derive(Debug, Default)]
struct Script {
    fail_launch: bool,
    unknown_stories: HashSet<String>,
    withheld_signals: HashSet<String>,
    ready_after: Duration,
    flush_delay: Duration,
    drop_recordings: bool,
    screenshot_failures: HashSet<String>,
    navigation_failures: HashSet<String>,
    not_found_attribute: Option<String>,
}

impl Script {
    fn not_found(&self) -> &str {
        self.not_found_attribute
            .as_deref()
            .unwrap_or(DEFAULT_NOT_FOUND_ATTRIBUTE)
    }
}

#[derive(Debug, Default)]
struct Counters {
    launches: AtomicUsize,
    session_closes: AtomicUsize,
    contexts_opened: AtomicUsize,
    contexts_closed: AtomicUsize,
    navigations: AtomicUsize,
    screenshots: AtomicUsize,
    recordings_flushed: AtomicUsize,
}

/// Snapshot of how the mock was driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MockCalls {
    /// Successful launches
    pub launches: usize,
    /// Sessions actually shut down (repeat closes not counted)
    pub session_closes: usize,
    /// Contexts created
    pub contexts_opened: usize,
    /// Contexts disposed (repeat closes not counted)
    pub contexts_closed: usize,
    /// Navigations attempted
    pub navigations: usize,
    /// Screenshots taken, including failed ones
    pub screenshots: usize,
    /// Recordings handed to the writer
    pub recordings_flushed: usize,
}

/// Scriptable browser backend.
///
/// Clones share state, so a test can keep one handle for assertions while
/// the batch drives another.
#[derive(Debug, Clone, Default)]
pub struct MockBrowser {
    script: Arc<Script>,
    counters: Arc<Counters>,
}

impl MockBrowser {
    /// A browser where every known story becomes ready immediately
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn edit(mut self, f: impl FnOnce(&mut Script)) -> Self {
        // builders run before the mock is shared
        if let Some(script) = Arc::get_mut(&mut self.script) {
            f(script);
        }
        self
    }

    /// Make every launch fail
    #[must_use]
    pub fn failing_launch(self) -> Self {
        self.edit(|s| s.fail_launch = true)
    }

    /// Report `story` as unknown to the render target
    #[must_use]
    pub fn with_unknown_story(self, story: &str) -> Self {
        self.edit(|s| {
            s.unknown_stories.insert(story.to_string());
        })
    }

    /// Never set `attribute`
    #[must_use]
    pub fn withholding_signal(self, attribute: &str) -> Self {
        self.edit(|s| {
            s.withheld_signals.insert(attribute.to_string());
        })
    }

    /// Raise `attribute` instead of `data-story-not-found` for unknown stories
    #[must_use]
    pub fn with_not_found_attribute(self, attribute: &str) -> Self {
        self.edit(|s| s.not_found_attribute = Some(attribute.to_string()))
    }

    /// Set signals only after `delay` from navigation
    #[must_use]
    pub fn with_ready_after(self, delay: Duration) -> Self {
        self.edit(|s| s.ready_after = delay)
    }

    /// Delay writing recordings after close
    #[must_use]
    pub fn with_flush_delay(self, delay: Duration) -> Self {
        self.edit(|s| s.flush_delay = delay)
    }

    /// Discard recordings instead of writing them
    #[must_use]
    pub fn dropping_recordings(self) -> Self {
        self.edit(|s| s.drop_recordings = true)
    }

    /// Fail every screenshot of `story`
    #[must_use]
    pub fn failing_screenshots_for(self, story: &str) -> Self {
        self.edit(|s| {
            s.screenshot_failures.insert(story.to_string());
        })
    }

    /// Fail navigation for `story`
    #[must_use]
    pub fn failing_navigation_for(self, story: &str) -> Self {
        self.edit(|s| {
            s.navigation_failures.insert(story.to_string());
        })
    }

    /// Current call counters
    #[must_use]
    pub fn calls(&self) -> MockCalls {
        let c = &self.counters;
        MockCalls {
            launches: c.launches.load(Ordering::SeqCst),
            session_closes: c.session_closes.load(Ordering::SeqCst),
            contexts_opened: c.contexts_opened.load(Ordering::SeqCst),
            contexts_closed: c.contexts_closed.load(Ordering::SeqCst),
            navigations: c.navigations.load(Ordering::SeqCst),
            screenshots: c.screenshots.load(Ordering::SeqCst),
            recordings_flushed: c.recordings_flushed.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl BrowserLauncher for MockBrowser {
    async fn launch(&self, _options: &BrowserOptions) -> ExportResult<Box<dyn BrowserSession>> {
        if self.script.fail_launch {
            return Err(ExportError::BrowserLaunch {
                message: "mock browser configured to fail".to_string(),
            });
        }
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            browser: self.clone(),
            closed: false,
        }))
    }
}

#[derive(Debug)]
struct MockSession {
    browser: MockBrowser,
    closed: bool,
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn new_context(&mut self, spec: &ContextSpec) -> ExportResult<Box<dyn CapturePage>> {
        if self.closed {
            return Err(ExportError::Page {
                message: "session already closed".to_string(),
            });
        }
        self.browser
            .counters
            .contexts_opened
            .fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockPage {
            browser: self.browser.clone(),
            viewport: spec.viewport,
            recording: spec.recording.clone(),
            created: Instant::now(),
            story: None,
            navigated_at: None,
            shots: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&mut self) -> ExportResult<()> {
        if !self.closed {
            self.closed = true;
            self.browser
                .counters
                .session_closes
                .fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[derive(Debug)]
struct MockPage {
    browser: MockBrowser,
    viewport: Viewport,
    recording: Option<RecordingSpec>,
    created: Instant,
    story: Option<String>,
    navigated_at: Option<Instant>,
    shots: AtomicUsize,
    closed: AtomicBool,
}

impl MockPage {
    fn script(&self) -> &Script {
        &self.browser.script
    }

    fn story_known(&self) -> bool {
        self.story
            .as_ref()
            .is_some_and(|s| !self.script().unknown_stories.contains(s))
    }

    fn colour(&self, n: usize) -> [u8; 3] {
        let seed = self.story.as_ref().map_or(0, String::len);
        [
            (n * 37 % 256) as u8,
            (seed * 53 % 256) as u8,
            (n * 11 % 256) as u8,
        ]
    }

    fn render_jpeg(&self, n: usize) -> ExportResult<Vec<u8>> {
        let img = RgbImage::from_pixel(
            self.viewport.width,
            self.viewport.height,
            image::Rgb(self.colour(n)),
        );
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Jpeg)
            .map_err(|e| ExportError::Recording {
                message: e.to_string(),
            })?;
        Ok(out.into_inner())
    }
}

#[async_trait]
impl CapturePage for MockPage {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> ExportResult<()> {
        self.browser
            .counters
            .navigations
            .fetch_add(1, Ordering::SeqCst);
        let parsed = url::Url::parse(url).map_err(|e| ExportError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        let story = parsed
            .query_pairs()
            .find(|(k, _)| k == "story")
            .map(|(_, v)| v.into_owned());
        if story
            .as_ref()
            .is_some_and(|s| self.script().navigation_failures.contains(s))
        {
            return Err(ExportError::Navigation {
                url: url.to_string(),
                message: "net::ERR_CONNECTION_REFUSED".to_string(),
            });
        }
        self.story = story;
        self.navigated_at = Some(Instant::now());
        Ok(())
    }

    async fn flags_set(&self, attributes: &[String]) -> ExportResult<Vec<bool>> {
        let Some(navigated_at) = self.navigated_at else {
            return Ok(vec![false; attributes.len()]);
        };
        let known = self.story_known();
        let settled = navigated_at.elapsed() >= self.script().ready_after;
        Ok(attributes
            .iter()
            .map(|attr| {
                if attr == self.script().not_found() {
                    !known
                } else {
                    known && settled && !self.script().withheld_signals.contains(attr)
                }
            })
            .collect())
    }

    async fn screenshot_png(&self) -> ExportResult<Vec<u8>> {
        self.browser
            .counters
            .screenshots
            .fetch_add(1, Ordering::SeqCst);
        if self
            .story
            .as_ref()
            .is_some_and(|s| self.script().screenshot_failures.contains(s))
        {
            return Err(ExportError::Screenshot {
                message: "Timed out capturing screenshot".to_string(),
            });
        }
        let n = self.shots.fetch_add(1, Ordering::SeqCst);
        let [r, g, b] = self.colour(n);
        let img = RgbaImage::from_pixel(
            self.viewport.width,
            self.viewport.height,
            Rgba([r, g, b, 255]),
        );
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png)
            .map_err(|e| ExportError::Screenshot {
                message: e.to_string(),
            })?;
        Ok(out.into_inner())
    }

    async fn close(&mut self) -> ExportResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.browser
            .counters
            .contexts_closed
            .fetch_add(1, Ordering::SeqCst);

        let Some(recording) = self.recording.take() else {
            return Ok(());
        };
        if self.script().drop_recordings {
            return Ok(());
        }
        let end = self.created.elapsed();
        let mut timeline = FrameTimeline::new();
        timeline.push(Duration::ZERO, self.render_jpeg(0)?);
        timeline.push(end / 2, self.render_jpeg(1)?);
        self.browser
            .counters
            .recordings_flushed
            .fetch_add(1, Ordering::SeqCst);
        spawn_flush(
            timeline,
            recording.dir,
            recording.fps,
            end,
            self.script().flush_delay,
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::media::RECORDING_FILE;
    use tempfile::TempDir;

    async fn session(mock: &MockBrowser) -> Box<dyn BrowserSession> {
        mock.launch(&BrowserOptions::default()).await.unwrap()
    }

    #[tokio::test]
    async fn test_launch_failure_is_fatal_error() {
        let mock = MockBrowser::new().failing_launch();
        let err = mock.launch(&BrowserOptions::default()).await.err().unwrap();
        assert!(err.is_fatal());
        assert_eq!(mock.calls().launches, 0);
    }

    #[tokio::test]
    async fn test_session_close_idempotent() {
        let mock = MockBrowser::new();
        let mut session = session(&mock).await;
        session.close().await.unwrap();
        session.close().await.unwrap();
        assert_eq!(mock.calls().session_closes, 1);
        assert!(session
            .new_context(&ContextSpec::new(Viewport::new(8, 8)))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_screenshot_is_png_of_viewport() {
        let mock = MockBrowser::new();
        let mut session = session(&mock).await;
        let mut page = session
            .new_context(&ContextSpec::new(Viewport::new(20, 10)))
            .await
            .unwrap();
        page.navigate("http://localhost/export?story=welcome&frame=0", Duration::from_secs(1))
            .await
            .unwrap();
        let png = page.screenshot_png().await.unwrap();
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!((img.width(), img.height()), (20, 10));
        assert_eq!(mock.calls().screenshots, 1);
    }

    #[tokio::test]
    async fn test_flags_before_navigation_are_unset() {
        let mock = MockBrowser::new();
        let mut session = session(&mock).await;
        let page = session
            .new_context(&ContextSpec::new(Viewport::new(8, 8)))
            .await
            .unwrap();
        let flags = page
            .flags_set(&["data-export-ready".to_string()])
            .await
            .unwrap();
        assert_eq!(flags, vec![false]);
    }

    #[tokio::test]
    async fn test_recording_written_after_close() {
        let dir = TempDir::new().unwrap();
        let mock = MockBrowser::new().with_flush_delay(Duration::from_millis(50));
        let mut session = session(&mock).await;
        let mut page = session
            .new_context(&ContextSpec::new(Viewport::new(16, 16)).with_recording(dir.path(), 10))
            .await
            .unwrap();
        page.navigate("http://localhost/export?story=welcome&cover=true", Duration::from_secs(1))
            .await
            .unwrap();
        page.close().await.unwrap();
        page.close().await.unwrap();

        let target = dir.path().join(RECORDING_FILE);
        assert!(!target.exists());
        tokio::time::sleep(Duration::from_millis(400)).await;
        let bytes = std::fs::read(&target).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        let calls = mock.calls();
        assert_eq!(calls.contexts_closed, 1);
        assert_eq!(calls.recordings_flushed, 1);
    }
}
