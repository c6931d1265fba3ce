//! Chromium backend over CDP.
//!
//! One browser process serves the whole batch. Each capture unit gets its
//! own CDP browser context (separate cookies, storage and navigation state)
//! with a single page whose viewport is set through device-metrics
//! emulation. Native recording uses the CDP screencast: JPEG frames are
//! collected while the context lives and written out after it closes.

use super::{flags_script, BrowserLauncher, BrowserSession, CapturePage, ContextSpec, RecordingSpec};
use crate::config::BrowserOptions;
use crate::media::{spawn_flush, FrameTimeline};
use crate::result::{ExportError, ExportResult};
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams, EventScreencastFrame,
    ScreencastFrameAckParams, StartScreencastFormat, StartScreencastParams, StopScreencastParams,
};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{CreateBrowserContextParams, CreateTargetParams};
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Mutex};

/// Flags that let animations composite on the GPU
const GPU_ARGS: &[&str] = &[
    "--enable-gpu-rasterization",
    "--ignore-gpu-blocklist",
    "--enable-zero-copy",
];

/// Software rendering fallback
const NO_GPU_ARGS: &[&str] = &["--disable-gpu"];

/// Keep timers and rendering running at full rate in headless windows
const RENDER_ARGS: &[&str] = &[
    "--hide-scrollbars",
    "--mute-audio",
    "--force-color-profile=srgb",
    "--disable-background-timer-throttling",
    "--disable-renderer-backgrounding",
    "--disable-backgrounding-occluded-windows",
];

/// JPEG quality requested from the screencast
const SCREENCAST_QUALITY: i64 = 90;

/// Launches Chromium with chromiumoxide
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromiumLauncher;

impl ChromiumLauncher {
    /// Create a launcher
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn config(options: &BrowserOptions, gpu: bool) -> ExportResult<CdpConfig> {
        let mut builder = CdpConfig::builder();
        if !options.headless {
            builder = builder.with_head();
        }
        if !options.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = options.chromium_path {
            builder = builder.chrome_executable(path);
        }
        let gpu_args = if gpu { GPU_ARGS } else { NO_GPU_ARGS };
        for arg in RENDER_ARGS.iter().chain(gpu_args) {
            builder = builder.arg(*arg);
        }
        builder
            .request_timeout(options.navigation_timeout())
            .build()
            .map_err(|message| ExportError::BrowserLaunch { message })
    }

    async fn launch_once(options: &BrowserOptions, gpu: bool) -> ExportResult<ChromiumSession> {
        let config = Self::config(options, gpu)?;
        let launched = tokio::time::timeout(options.launch_timeout(), CdpBrowser::launch(config))
            .await
            .map_err(|_| ExportError::BrowserLaunch {
                message: format!("no response within {}ms", options.launch_timeout_ms),
            })?;
        let (browser, mut handler) = launched.map_err(|e| ExportError::BrowserLaunch {
            message: e.to_string(),
        })?;

        let handle = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        Ok(ChromiumSession {
            browser: Arc::new(Mutex::new(browser)),
            handler: handle,
            closed: false,
        })
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, options: &BrowserOptions) -> ExportResult<Box<dyn BrowserSession>> {
        if options.gpu {
            match Self::launch_once(options, true).await {
                Ok(session) => {
                    tracing::info!(gpu = true, headless = options.headless, "browser launched");
                    return Ok(Box::new(session));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "launch with GPU flags failed, retrying without GPU");
                }
            }
        }
        let session = Self::launch_once(options, false).await?;
        tracing::info!(gpu = false, headless = options.headless, "browser launched");
        Ok(Box::new(session))
    }
}

#[derive(Debug)]
struct ChromiumSession {
    browser: Arc<Mutex<CdpBrowser>>,
    handler: tokio::task::JoinHandle<()>,
    closed: bool,
}

fn page_error(e: impl std::fmt::Display) -> ExportError {
    ExportError::Page {
        message: e.to_string(),
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn new_context(&mut self, spec: &ContextSpec) -> ExportResult<Box<dyn CapturePage>> {
        if self.closed {
            return Err(page_error("browser session already closed"));
        }

        let (context_id, page) = {
            let mut browser = self.browser.lock().await;
            let context_id = browser
                .create_browser_context(CreateBrowserContextParams::default())
                .await
                .map_err(page_error)?;
            let target = CreateTargetParams::builder()
                .url("about:blank")
                .browser_context_id(context_id.clone())
                .build()
                .map_err(page_error)?;
            match browser.new_page(target).await {
                Ok(page) => (context_id, page),
                Err(e) => {
                    if let Err(dispose) = browser.dispose_browser_context(context_id).await {
                        tracing::debug!(error = %dispose, "context dispose after failed page");
                    }
                    return Err(page_error(e));
                }
            }
        };

        let mut capture = ChromiumPage {
            browser: Arc::clone(&self.browser),
            page: Some(page),
            context_id: Some(context_id),
            recorder: None,
        };

        // From here on the page owns the context; close it on any error.
        if let Err(e) = capture.prepare(spec).await {
            if let Err(close) = capture.close().await {
                tracing::debug!(error = %close, "closing half-open context");
            }
            return Err(e);
        }
        Ok(Box::new(capture))
    }

    async fn close(&mut self) -> ExportResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut browser = self.browser.lock().await;
        let result = browser.close().await;
        if let Err(e) = browser.wait().await {
            tracing::debug!(error = %e, "waiting for browser exit");
        }
        self.handler.abort();
        result.map(|_| ()).map_err(page_error)
    }
}

#[derive(Debug)]
struct Recorder {
    spec: RecordingSpec,
    started: Instant,
    stop: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<FrameTimeline>,
}

#[derive(Debug)]
struct ChromiumPage {
    browser: Arc<Mutex<CdpBrowser>>,
    page: Option<CdpPage>,
    context_id: Option<BrowserContextId>,
    recorder: Option<Recorder>,
}

impl ChromiumPage {
    fn page(&self) -> ExportResult<&CdpPage> {
        self.page.as_ref().ok_or_else(|| page_error("page already closed"))
    }

    async fn prepare(&mut self, spec: &ContextSpec) -> ExportResult<()> {
        let page = self.page()?.clone();
        let metrics = SetDeviceMetricsOverrideParams::new(
            i64::from(spec.viewport.width),
            i64::from(spec.viewport.height),
            1.0,
            false,
        );
        page.execute(metrics).await.map_err(page_error)?;

        if let Some(recording) = &spec.recording {
            self.recorder = Some(Self::start_recording(page, recording.clone(), spec).await?);
        }
        Ok(())
    }

    async fn start_recording(
        page: CdpPage,
        spec: RecordingSpec,
        context: &ContextSpec,
    ) -> ExportResult<Recorder> {
        let recording_error = |e: chromiumoxide::error::CdpError| ExportError::Recording {
            message: e.to_string(),
        };

        let mut frames = page
            .event_listener::<EventScreencastFrame>()
            .await
            .map_err(recording_error)?;
        let params = StartScreencastParams::builder()
            .format(StartScreencastFormat::Jpeg)
            .quality(SCREENCAST_QUALITY)
            .max_width(i64::from(context.viewport.width))
            .max_height(i64::from(context.viewport.height))
            .every_nth_frame(1)
            .build();
        page.execute(params).await.map_err(recording_error)?;

        let started = Instant::now();
        let (stop, mut stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut timeline = FrameTimeline::new();
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    frame = frames.next() => {
                        let Some(frame) = frame else { break };
                        let at = started.elapsed();
                        match base64::engine::general_purpose::STANDARD.decode(&frame.data) {
                            Ok(jpeg) => timeline.push(at, jpeg),
                            Err(e) => tracing::debug!(error = %e, "undecodable screencast frame"),
                        }
                        let ack = ScreencastFrameAckParams::new(frame.session_id);
                        if let Err(e) = page.execute(ack).await {
                            tracing::debug!(error = %e, "screencast ack failed");
                        }
                    }
                }
            }
            timeline
        });

        Ok(Recorder {
            spec,
            started,
            stop,
            task,
        })
    }

    async fn finish_recording(page: &CdpPage, recorder: Recorder) {
        if let Err(e) = page.execute(StopScreencastParams::default()).await {
            tracing::debug!(error = %e, "stop screencast failed");
        }
        let end = recorder.started.elapsed();
        // The receiver is gone only if the task already ended.
        let _ = recorder.stop.send(());
        match recorder.task.await {
            Ok(timeline) => {
                tracing::debug!(frames = timeline.len(), "screencast collected");
                spawn_flush(
                    timeline,
                    recorder.spec.dir,
                    recorder.spec.fps,
                    end,
                    Duration::ZERO,
                );
            }
            Err(e) => tracing::warn!(error = %e, "screencast task failed, recording lost"),
        }
    }
}

#[async_trait]
impl CapturePage for ChromiumPage {
    async fn navigate(&mut self, url: &str, timeout: Duration) -> ExportResult<()> {
        let page = self.page()?;
        match tokio::time::timeout(timeout, page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ExportError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            }),
            Err(_) => Err(ExportError::Navigation {
                url: url.to_string(),
                message: format!("timed out after {}ms", timeout.as_millis()),
            }),
        }
    }

    async fn flags_set(&self, attributes: &[String]) -> ExportResult<Vec<bool>> {
        let script = flags_script(attributes)?;
        self.page()?
            .evaluate(script)
            .await
            .map_err(page_error)?
            .into_value::<Vec<bool>>()
            .map_err(page_error)
    }

    async fn screenshot_png(&self) -> ExportResult<Vec<u8>> {
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        let screenshot = self
            .page()?
            .execute(params)
            .await
            .map_err(|e| ExportError::Screenshot {
                message: e.to_string(),
            })?;
        base64::engine::general_purpose::STANDARD
            .decode(&screenshot.data)
            .map_err(|e| ExportError::Screenshot {
                message: e.to_string(),
            })
    }

    async fn close(&mut self) -> ExportResult<()> {
        let Some(page) = self.page.take() else {
            return Ok(());
        };
        if let Some(recorder) = self.recorder.take() {
            Self::finish_recording(&page, recorder).await;
        }
        let closed = page.close().await.map_err(page_error);

        if let Some(context_id) = self.context_id.take() {
            let browser = self.browser.lock().await;
            if let Err(e) = browser.dispose_browser_context(context_id).await {
                tracing::warn!(error = %e, "failed to dispose browser context");
            }
        }
        closed
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod launcher_tests {
        use super::*;

        #[test]
        fn test_context_id_round_trips_through_cdp_type() {
            let id = BrowserContextId::new("ctx-1");
            assert_eq!(id.inner(), "ctx-1");
        }

        #[test]
        fn test_config_builds_with_explicit_executable() {
            let options = BrowserOptions::default().with_chromium_path("/usr/bin/chromium");
            assert!(ChromiumLauncher::config(&options, false).is_ok());
            assert!(ChromiumLauncher::config(&options.with_headless(false), true).is_ok());
        }
    }
}
