//! Transcoding raw recordings with ffmpeg.
//!
//! The raw container produced by the recorder is an MJPEG stream at a
//! constant frame rate. ffmpeg converts it into a silent, web-ready MP4
//! (H.264, `+faststart`) or WebM (VP9). ffmpeg is a runtime dependency.

use crate::result::{ExportError, ExportResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;

/// Default encoder binary, resolved through `PATH`.
pub const DEFAULT_ENCODER: &str = "ffmpeg";

/// Number of stderr lines kept in a transcode error.
const STDERR_TAIL_LINES: usize = 20;

/// Distribution container for recorded stories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoContainer {
    /// H.264 in MP4
    #[default]
    Mp4,
    /// VP9 in WebM
    #[serde(alias = "WebM")]
    Webm,
}

impl VideoContainer {
    /// File extension for this container
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
        }
    }

    /// ffmpeg video encoder for this container
    #[must_use]
    pub const fn video_codec(self) -> &'static str {
        match self {
            Self::Mp4 => "libx264",
            Self::Webm => "libvpx-vp9",
        }
    }

    /// Default constant-rate-factor for this container
    #[must_use]
    pub const fn default_crf(self) -> u8 {
        match self {
            Self::Mp4 => 18,
            Self::Webm => 32,
        }
    }

    /// Highest valid CRF for the codec
    #[must_use]
    pub const fn max_crf(self) -> u8 {
        match self {
            Self::Mp4 => 51,
            Self::Webm => 63,
        }
    }
}

impl std::fmt::Display for VideoContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Encoding policy for one transcode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecParams {
    /// Output container
    pub container: VideoContainer,
    /// Constant rate factor (lower = better quality)
    pub crf: u8,
    /// x264 preset (ignored for WebM)
    pub preset: String,
    /// Frame rate of the raw input stream
    pub input_fps: u32,
}

impl CodecParams {
    /// Default parameters for a container
    #[must_use]
    pub fn new(container: VideoContainer, input_fps: u32) -> Self {
        Self {
            container,
            crf: container.default_crf(),
            preset: "slow".to_string(),
            input_fps,
        }
    }

    /// Set CRF
    #[must_use]
    pub const fn with_crf(mut self, crf: u8) -> Self {
        self.crf = crf;
        self
    }

    /// Set x264 preset
    #[must_use]
    pub fn with_preset(mut self, preset: impl Into<String>) -> Self {
        self.preset = preset.into();
        self
    }
}

/// Build the ffmpeg arguments for one transcode.
#[must_use]
pub fn build_ffmpeg_args(input: &Path, output: &Path, params: &CodecParams) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-y".to_string(),
        "-f".to_string(),
        "mjpeg".to_string(),
        "-framerate".to_string(),
        params.input_fps.max(1).to_string(),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-an".to_string(),
        "-vf".to_string(),
        "scale=trunc(iw/2)*2:trunc(ih/2)*2".to_string(),
        "-c:v".to_string(),
        params.container.video_codec().to_string(),
        "-crf".to_string(),
        params.crf.to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
    ];

    match params.container {
        VideoContainer::Mp4 => args.extend([
            "-preset".to_string(),
            params.preset.clone(),
            "-movflags".to_string(),
            "+faststart".to_string(),
            "-f".to_string(),
            "mp4".to_string(),
        ]),
        VideoContainer::Webm => args.extend([
            "-b:v".to_string(),
            "0".to_string(),
            "-f".to_string(),
            "webm".to_string(),
        ]),
    }

    args.push(output.to_string_lossy().to_string());
    args
}

/// Last few lines of an encoder's stderr.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Runs the external encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcoder {
    program: PathBuf,
}

impl Default for Transcoder {
    fn default() -> Self {
        Self::new(DEFAULT_ENCODER)
    }
}

impl Transcoder {
    /// Create a transcoder using the given encoder binary
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Encoder binary
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Convert `input` into `output`.
    ///
    /// The encoder is the only writer of `output`; callers pass a staging
    /// path and move the result into place after this returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Transcode`] if the encoder cannot be spawned,
    /// exits non-zero (stderr tail included), or produces no output.
    pub async fn transcode(
        &self,
        input: &Path,
        output: &Path,
        params: &CodecParams,
    ) -> ExportResult<()> {
        let args = build_ffmpeg_args(input, output, params);
        tracing::debug!(program = %self.program.display(), ?args, "running encoder");

        let result = tokio::process::Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ExportError::Transcode {
                message: format!("Failed to execute {}: {e}", self.program.display()),
            })?;

        if !result.status.success() {
            return Err(ExportError::Transcode {
                message: format!(
                    "{} exited with {}: {}",
                    self.program.display(),
                    result.status,
                    stderr_tail(&result.stderr)
                ),
            });
        }

        let written = tokio::fs::metadata(output)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if written == 0 {
            return Err(ExportError::Transcode {
                message: format!(
                    "{} reported success but wrote nothing to {}",
                    self.program.display(),
                    output.display()
                ),
            });
        }

        Ok(())
    }
}
