//! CLI command definitions using clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Storyreel: export story covers and frames as GIF, MP4 or WebM
#[derive(Parser, Debug)]
#[command(name = "storyreel")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (only failures are printed)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture every story visual and write the assets
    Export(ExportArgs),

    /// Print every capture unit without launching a browser
    List(ListArgs),

    /// Check that every expected output exists and is valid
    Verify(VerifyArgs),
}

/// Catalog selection shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct CatalogArgs {
    /// Story catalog YAML (built-in catalog when absent)
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Only these stories (repeatable)
    #[arg(short, long = "story", value_name = "ID")]
    pub stories: Vec<String>,
}

/// Export settings layered over the config file
#[derive(Args, Debug, Clone, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct SettingsArgs {
    /// Export config YAML
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(short, long)]
    pub format: Option<FormatArg>,

    /// Frames per second (GIF sampling or recording rate)
    #[arg(long)]
    pub fps: Option<u32>,

    /// Seconds captured per visual (GIF duration or recording window)
    #[arg(long)]
    pub duration: Option<u32>,

    /// Render page URL
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Output root directory
    #[arg(short, long, value_name = "DIR")]
    pub out: Option<PathBuf>,

    /// Browser viewport width
    #[arg(long)]
    pub width: Option<u32>,

    /// Browser viewport height
    #[arg(long)]
    pub height: Option<u32>,

    /// Disable GPU acceleration
    #[arg(long)]
    pub no_gpu: bool,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Disable the Chromium sandbox
    #[arg(long)]
    pub no_sandbox: bool,

    /// Chromium executable
    #[arg(long, value_name = "PATH")]
    pub chromium: Option<PathBuf>,

    /// ffmpeg executable
    #[arg(long, value_name = "PATH")]
    pub ffmpeg: Option<PathBuf>,
}

/// Arguments for the export command
#[derive(Args, Debug, Clone, Default)]
pub struct ExportArgs {
    /// Catalog selection
    #[command(flatten)]
    pub catalog: CatalogArgs,

    /// Export settings
    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Write the batch summary as JSON
    #[arg(long, value_name = "FILE")]
    pub summary: Option<PathBuf>,

    /// Do not force-kill lingering browser processes afterwards
    #[arg(long)]
    pub no_kill: bool,
}

/// Arguments for the list command
#[derive(Args, Debug, Clone, Default)]
pub struct ListArgs {
    /// Catalog selection
    #[command(flatten)]
    pub catalog: CatalogArgs,

    /// Export settings
    #[command(flatten)]
    pub settings: SettingsArgs,

    /// Print units as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the verify command
#[derive(Args, Debug, Clone, Default)]
pub struct VerifyArgs {
    /// Catalog selection
    #[command(flatten)]
    pub catalog: CatalogArgs,

    /// Export settings
    #[command(flatten)]
    pub settings: SettingsArgs,
}

/// Output format
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormatArg {
    /// Animated GIF from screenshots
    Gif,
    /// H.264 MP4 from a native recording
    Mp4,
    /// VP9 WebM from a native recording
    Webm,
}

/// Color argument
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for crate::config::ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
