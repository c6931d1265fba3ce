//! Export command handler

use crate::commands::ExportArgs;
use crate::config::CliConfig;
use crate::error::CliResult;
use crate::handlers::{load_catalog, load_export_config};
use crate::output::ProgressReporter;
use std::path::Path;
use storyreel::{run_batch, BatchSummary, BrowserLauncher, Catalog, ExportConfig};

/// Run the export command.
///
/// Units that fail are reported but do not change the exit status; only a
/// configuration problem or a browser that cannot be launched does.
pub fn run_export(config: &CliConfig, args: &ExportArgs) -> CliResult<()> {
    let mut export = load_export_config(&args.settings)?;
    if args.no_kill {
        export.browser.force_kill_on_exit = false;
    }
    let catalog = load_catalog(&args.catalog)?;
    let launcher = launcher()?;

    let mut reporter =
        ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(execute(
        launcher.as_ref(),
        &catalog,
        &export,
        &mut reporter,
        args.summary.as_deref(),
    ))?;
    Ok(())
}

/// Run the batch and write the optional JSON summary
pub async fn execute(
    launcher: &dyn BrowserLauncher,
    catalog: &Catalog,
    export: &ExportConfig,
    reporter: &mut ProgressReporter,
    summary_path: Option<&Path>,
) -> CliResult<BatchSummary> {
    let summary = match run_batch(launcher, catalog, export, reporter).await {
        Ok(summary) => summary,
        Err(e) => {
            reporter.finish();
            return Err(e.into());
        }
    };

    if let Some(path) = summary_path {
        summary.write_json(path)?;
        reporter.info(&format!("summary written to {}", path.display()));
    }
    for failed in summary.failures() {
        tracing::debug!(unit = %failed.label(), url = %failed.url, "failed unit");
    }
    Ok(summary)
}

#[cfg(feature = "browser")]
fn launcher() -> CliResult<Box<dyn BrowserLauncher>> {
    Ok(Box::new(storyreel::ChromiumLauncher::new()))
}

#[cfg(not(feature = "browser"))]
fn launcher() -> CliResult<Box<dyn BrowserLauncher>> {
    Err(crate::error::CliError::config(
        "built without the `browser` feature; rebuild with --features browser",
    ))
}
