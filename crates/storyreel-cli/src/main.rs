//! Storyreel CLI: export animated stories as shareable assets
//!
//! ## Usage
//!
//! ```bash
//! storyreel export                         # GIF for every cover and frame
//! storyreel export --format mp4 -s welcome # one story as MP4
//! storyreel list --json                    # capture units, no browser
//! storyreel verify --out exports           # check what is on disk
//! ```

use clap::Parser;
use std::process::ExitCode;
use storyreel_cli::{
    handlers::{export::run_export, list::run_list, verify::run_verify},
    init_logging, Cli, CliConfig, CliResult, ColorChoice, Commands, Verbosity,
};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> CliResult<()> {
    let cli = Cli::parse();
    let config = build_config(&cli);
    init_logging(&config);

    match cli.command {
        Commands::Export(args) => run_export(&config, &args),
        Commands::List(args) => run_list(&config, &args),
        Commands::Verify(args) => run_verify(&config, &args),
    }
}

fn build_config(cli: &Cli) -> CliConfig {
    let color: ColorChoice = cli.color.into();
    CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(color)
        .with_log_json(cli.log_json)
}
