//! Command handlers
//!
//! Each subcommand loads the catalog and the layered export config the same
//! way: defaults, then `--config`, then individual flags.

pub mod export;
pub mod list;
pub mod verify;

use crate::commands::{CatalogArgs, FormatArg, SettingsArgs};
use crate::error::CliResult;
use storyreel::{CaptureStrategy, Catalog, ExportConfig, GifSettings, VideoContainer, VideoSettings};

/// Load the catalog and apply `--story` filters
pub fn load_catalog(args: &CatalogArgs) -> CliResult<Catalog> {
    let catalog = match &args.catalog {
        Some(path) => Catalog::from_file(path)?,
        None => Catalog::builtin(),
    };
    if args.stories.is_empty() {
        Ok(catalog)
    } else {
        Ok(catalog.filtered(&args.stories)?)
    }
}

/// Build and validate the export config for a run
pub fn load_export_config(settings: &SettingsArgs) -> CliResult<ExportConfig> {
    let base = match &settings.config {
        Some(path) => ExportConfig::from_file(path)?,
        None => ExportConfig::default(),
    };
    let config = apply_settings(base, settings);
    config.validate()?;
    Ok(config)
}

/// Layer command-line flags over `config`
#[must_use]
pub fn apply_settings(mut config: ExportConfig, settings: &SettingsArgs) -> ExportConfig {
    if let Some(format) = settings.format {
        config.strategy = strategy_for(format, config.strategy);
    }

    match &mut config.strategy {
        CaptureStrategy::Gif(gif) => {
            if let Some(fps) = settings.fps {
                gif.fps = fps;
            }
            if let Some(secs) = settings.duration {
                gif.duration_secs = secs;
            }
            if settings.ffmpeg.is_some() {
                tracing::debug!("--ffmpeg ignored for GIF export");
            }
        }
        CaptureStrategy::Video(video) => {
            if let Some(fps) = settings.fps {
                video.fps = fps;
            }
            if let Some(secs) = settings.duration {
                video.performance_window_ms = u64::from(secs) * 1000;
            }
            if let Some(ffmpeg) = &settings.ffmpeg {
                video.encoder.clone_from(ffmpeg);
            }
        }
    }

    if let Some(url) = &settings.base_url {
        config.base_url.clone_from(url);
    }
    if let Some(out) = &settings.out {
        config.output_dir.clone_from(out);
    }
    if let Some(width) = settings.width {
        config.viewport.width = width;
    }
    if let Some(height) = settings.height {
        config.viewport.height = height;
    }
    if settings.no_gpu {
        config.browser.gpu = false;
    }
    if settings.headed {
        config.browser.headless = false;
    }
    if settings.no_sandbox {
        config.browser.sandbox = false;
    }
    if let Some(chromium) = &settings.chromium {
        config.browser.chromium_path = Some(chromium.clone());
    }
    config
}

/// Switch strategy, keeping settings when the kind is unchanged
fn strategy_for(format: FormatArg, current: CaptureStrategy) -> CaptureStrategy {
    let container = match format {
        FormatArg::Gif => {
            return match current {
                gif @ CaptureStrategy::Gif(_) => gif,
                CaptureStrategy::Video(_) => CaptureStrategy::Gif(GifSettings::default()),
            };
        }
        FormatArg::Mp4 => VideoContainer::Mp4,
        FormatArg::Webm => VideoContainer::Webm,
    };
    match current {
        CaptureStrategy::Video(mut video) => {
            if video.container != container {
                video.container = container;
                video.crf = None;
            }
            CaptureStrategy::Video(video)
        }
        CaptureStrategy::Gif(_) => CaptureStrategy::Video(VideoSettings::new(container)),
    }
}
