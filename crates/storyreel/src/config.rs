//! Export configuration.
//!
//! [`ExportConfig`] is built once (defaults, then an optional YAML file, then
//! command-line overrides), validated, and passed by reference through the
//! whole batch. Nothing in the pipeline reads ambient state.

use crate::result::{ExportError, ExportResult};
use crate::transcode::{CodecParams, VideoContainer, DEFAULT_ENCODER};
use crate::wait::WaitOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest GIF logical screen dimension
pub const MAX_GIF_DIMENSION: u32 = 65_535;

/// Upper bound on buffered GIF frames per unit
pub const MAX_GIF_FRAMES: u32 = 300;

/// Default render page
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/export";

/// Default output root
pub const DEFAULT_OUTPUT_DIR: &str = "exports";

// =============================================================================
// VIEWPORT
// =============================================================================

/// Browser viewport in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        // 9:16 story format
        Self {
            width: 1080,
            height: 1920,
        }
    }
}

impl Viewport {
    /// Create a viewport
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

// =============================================================================
// CAPTURE STRATEGY
// =============================================================================

/// Screenshot-sequence capture settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GifSettings {
    /// Screenshots per second
    pub fps: u32,
    /// Capture duration in seconds
    pub duration_secs: u32,
    /// Output width in pixels
    pub width: u32,
    /// Output height in pixels
    pub height: u32,
    /// Palette quality (1-100)
    pub quality: u8,
    /// Loop count (0 = infinite)
    pub loop_count: u16,
}

impl Default for GifSettings {
    fn default() -> Self {
        Self {
            fps: 10,
            duration_secs: 3,
            width: 540,
            height: 960,
            quality: 80,
            loop_count: 0,
        }
    }
}

impl GifSettings {
    /// Set frames per second
    #[must_use]
    pub const fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Set duration in seconds
    #[must_use]
    pub const fn with_duration(mut self, secs: u32) -> Self {
        self.duration_secs = secs;
        self
    }

    /// Set output size
    #[must_use]
    pub const fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set palette quality (clamped to 1-100)
    #[must_use]
    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    /// Number of screenshots one unit takes
    #[must_use]
    pub const fn total_frames(&self) -> u32 {
        self.fps.saturating_mul(self.duration_secs)
    }

    /// Nominal spacing between screenshots
    #[must_use]
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.fps.max(1)))
    }

    /// Per-frame GIF delay in centiseconds
    #[must_use]
    pub fn frame_delay_cs(&self) -> u16 {
        let fps = self.fps.max(1);
        let cs = (100 + fps / 2) / fps;
        u16::try_from(cs).unwrap_or(u16::MAX).max(1)
    }
}

/// Native recording settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    /// Distribution container
    pub container: VideoContainer,
    /// Recording frame rate
    pub fps: u32,
    /// How long the page stays open after readiness
    pub performance_window_ms: u64,
    /// Bound on waiting for the raw recording after close
    pub file_wait_timeout_ms: u64,
    /// Constant rate factor (codec default when absent)
    pub crf: Option<u8>,
    /// Encoder preset (H.264 only)
    pub preset: String,
    /// Encoder binary
    pub encoder: PathBuf,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            container: VideoContainer::Mp4,
            fps: 30,
            performance_window_ms: 5_000,
            file_wait_timeout_ms: 15_000,
            crf: None,
            preset: "slow".to_string(),
            encoder: PathBuf::from(DEFAULT_ENCODER),
        }
    }
}

impl VideoSettings {
    /// Settings for a container with defaults elsewhere
    #[must_use]
    pub fn new(container: VideoContainer) -> Self {
        Self {
            container,
            ..Self::default()
        }
    }

    /// Set the performance window
    #[must_use]
    pub const fn with_performance_window(mut self, ms: u64) -> Self {
        self.performance_window_ms = ms;
        self
    }

    /// Set the raw-file wait bound
    #[must_use]
    pub const fn with_file_wait_timeout(mut self, ms: u64) -> Self {
        self.file_wait_timeout_ms = ms;
        self
    }

    /// Set the recording frame rate
    #[must_use]
    pub const fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }

    /// Use a specific encoder binary
    #[must_use]
    pub fn with_encoder(mut self, encoder: impl Into<PathBuf>) -> Self {
        self.encoder = encoder.into();
        self
    }

    /// Codec parameters for the transcode step
    #[must_use]
    pub fn codec_params(&self) -> CodecParams {
        let mut params = CodecParams::new(self.container, self.fps).with_preset(&self.preset);
        if let Some(crf) = self.crf {
            params = params.with_crf(crf);
        }
        params
    }
}

/// How each unit is captured, chosen once per batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CaptureStrategy {
    /// Screenshot sequence encoded as an animated GIF
    Gif(GifSettings),
    /// Native recording transcoded to MP4/WebM
    Video(VideoSettings),
}

impl Default for CaptureStrategy {
    fn default() -> Self {
        Self::Gif(GifSettings::default())
    }
}

impl CaptureStrategy {
    /// Output file extension
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Gif(_) => "gif",
            Self::Video(video) => video.container.extension(),
        }
    }

    /// Short name for logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Gif(_) => "gif",
            Self::Video(_) => "video",
        }
    }
}

// =============================================================================
// READINESS
// =============================================================================

/// Readiness attributes polled on the render target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    /// Attributes that must all read `"true"`, in page lifecycle order
    pub signals: Vec<String>,
    /// Attribute marking an unknown story
    pub not_found_attribute: String,
    /// Bound on the whole readiness wait
    pub timeout_ms: u64,
    /// Extra settle delay applied when the wait times out
    pub fallback_delay_ms: u64,
    /// First poll interval
    pub initial_poll_ms: u64,
    /// Poll interval ceiling
    pub max_poll_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            signals: vec![
                "data-export-ready".to_string(),
                "data-animations-ready".to_string(),
                "data-react-rendered".to_string(),
            ],
            not_found_attribute: "data-story-not-found".to_string(),
            timeout_ms: 10_000,
            fallback_delay_ms: 2_000,
            initial_poll_ms: 50,
            max_poll_ms: 500,
        }
    }
}

impl ReadinessConfig {
    /// Set the overall timeout
    #[must_use]
    pub const fn with_timeout(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }

    /// Set the fallback delay
    #[must_use]
    pub const fn with_fallback_delay(mut self, ms: u64) -> Self {
        self.fallback_delay_ms = ms;
        self
    }

    /// Polling schedule for the readiness wait
    #[must_use]
    pub fn wait_options(&self) -> WaitOptions {
        WaitOptions::new()
            .with_timeout(self.timeout_ms)
            .with_poll_interval(self.initial_poll_ms)
            .with_max_poll_interval(self.max_poll_ms)
    }

    /// Attributes queried per poll: readiness signals then the not-found flag
    #[must_use]
    pub fn probe_attributes(&self) -> Vec<String> {
        let mut attrs = self.signals.clone();
        attrs.push(self.not_found_attribute.clone());
        attrs
    }
}

// =============================================================================
// BROWSER
// =============================================================================

/// Browser launch options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserOptions {
    /// Run without a window
    pub headless: bool,
    /// Try GPU acceleration flags first
    pub gpu: bool,
    /// Keep the Chromium sandbox enabled
    pub sandbox: bool,
    /// Explicit Chromium executable
    pub chromium_path: Option<PathBuf>,
    /// Bound on launching the browser
    pub launch_timeout_ms: u64,
    /// Bound on each navigation
    pub navigation_timeout_ms: u64,
    /// Force-kill matching processes at teardown
    pub force_kill_on_exit: bool,
    /// Command-line patterns matched by the force kill
    pub kill_patterns: Vec<String>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            gpu: true,
            sandbox: true,
            chromium_path: None,
            launch_timeout_ms: 30_000,
            navigation_timeout_ms: 30_000,
            force_kill_on_exit: true,
            kill_patterns: vec!["chromium".to_string(), "chrome-headless".to_string()],
        }
    }
}

impl BrowserOptions {
    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Enable or disable GPU flags
    #[must_use]
    pub const fn with_gpu(mut self, gpu: bool) -> Self {
        self.gpu = gpu;
        self
    }

    /// Enable or disable the sandbox
    #[must_use]
    pub const fn with_sandbox(mut self, sandbox: bool) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Use a specific Chromium executable
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Enable or disable the teardown force kill
    #[must_use]
    pub const fn with_force_kill(mut self, enabled: bool) -> Self {
        self.force_kill_on_exit = enabled;
        self
    }

    /// Launch timeout as a duration
    #[must_use]
    pub const fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }

    /// Navigation timeout as a duration
    #[must_use]
    pub const fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }
}

// =============================================================================
// EXPORT CONFIG
// =============================================================================

/// Complete, immutable configuration for one batch run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Render page the story query is appended to
    pub base_url: String,
    /// Output root
    pub output_dir: PathBuf,
    /// Browser viewport
    pub viewport: Viewport,
    /// Capture strategy
    pub strategy: CaptureStrategy,
    /// Readiness polling
    pub readiness: ReadinessConfig,
    /// Browser launch options
    pub browser: BrowserOptions,
    /// Bound on a single screenshot
    pub screenshot_timeout_ms: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            viewport: Viewport::default(),
            strategy: CaptureStrategy::default(),
            readiness: ReadinessConfig::default(),
            browser: BrowserOptions::default(),
            screenshot_timeout_ms: 10_000,
        }
    }
}

impl ExportConfig {
    /// Defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse YAML; absent keys keep their defaults
    pub fn from_yaml(text: &str) -> ExportResult<Self> {
        Ok(serde_yaml_ng::from_str(text)?)
    }

    /// Load YAML from disk
    pub fn from_file(path: &Path) -> ExportResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ExportError::config(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_yaml(&text)
    }

    /// Set the render page
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the output root
    #[must_use]
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the viewport
    #[must_use]
    pub const fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    /// Set the capture strategy
    #[must_use]
    pub fn with_strategy(mut self, strategy: CaptureStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set readiness polling
    #[must_use]
    pub fn with_readiness(mut self, readiness: ReadinessConfig) -> Self {
        self.readiness = readiness;
        self
    }

    /// Set browser options
    #[must_use]
    pub fn with_browser(mut self, browser: BrowserOptions) -> Self {
        self.browser = browser;
        self
    }

    /// Set the screenshot timeout
    #[must_use]
    pub const fn with_screenshot_timeout(mut self, ms: u64) -> Self {
        self.screenshot_timeout_ms = ms;
        self
    }

    /// Screenshot timeout as a duration
    #[must_use]
    pub const fn screenshot_timeout(&self) -> Duration {
        Duration::from_millis(self.screenshot_timeout_ms)
    }

    /// Check every constraint once, before the batch starts.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Config`] describing the first violation.
    pub fn validate(&self) -> ExportResult<()> {
        url::Url::parse(&self.base_url).map_err(|e| {
            ExportError::config(format!("base_url '{}' is not a URL: {e}", self.base_url))
        })?;

        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(ExportError::config(format!(
                "viewport must be positive, got {}x{}",
                self.viewport.width, self.viewport.height
            )));
        }

        if self.readiness.signals.is_empty() {
            return Err(ExportError::config("at least one readiness signal is required"));
        }
        if let Some(bad) = self
            .readiness
            .probe_attributes()
            .into_iter()
            .find(|name| !is_attribute_name(name))
        {
            return Err(ExportError::config(format!(
                "readiness attribute '{bad}' is not a valid attribute name"
            )));
        }

        match &self.strategy {
            CaptureStrategy::Gif(gif) => Self::validate_gif(gif),
            CaptureStrategy::Video(video) => Self::validate_video(video),
        }
    }

    fn validate_gif(gif: &GifSettings) -> ExportResult<()> {
        if gif.width == 0
            || gif.height == 0
            || gif.width > MAX_GIF_DIMENSION
            || gif.height > MAX_GIF_DIMENSION
        {
            return Err(ExportError::config(format!(
                "gif size must be within 1..={MAX_GIF_DIMENSION}, got {}x{}",
                gif.width, gif.height
            )));
        }
        if gif.fps == 0 {
            return Err(ExportError::config("gif fps must be at least 1"));
        }
        if gif.duration_secs == 0 {
            return Err(ExportError::config("gif duration must be at least 1 second"));
        }
        if gif.total_frames() > MAX_GIF_FRAMES {
            return Err(ExportError::config(format!(
                "gif would buffer {} frames per unit (max {MAX_GIF_FRAMES})",
                gif.total_frames()
            )));
        }
        Ok(())
    }

    fn validate_video(video: &VideoSettings) -> ExportResult<()> {
        if video.fps == 0 {
            return Err(ExportError::config("video fps must be at least 1"));
        }
        if let Some(crf) = video.crf {
            let max = video.container.max_crf();
            if crf > max {
                return Err(ExportError::config(format!(
                    "crf {crf} out of range for {} (0..={max})",
                    video.container
                )));
            }
        }
        if video.encoder.as_os_str().is_empty() {
            return Err(ExportError::config("encoder path must not be empty"));
        }
        Ok(())
    }
}

/// Attribute names usable unquoted in a `[name="true"]` selector
fn is_attribute_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'))
}
