//! Verify command handler

use crate::commands::VerifyArgs;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::handlers::{load_catalog, load_export_config};
use crate::output::ProgressReporter;
use std::path::PathBuf;
use storyreel::{verify_output, CaptureUnit, MediaFormat};

/// Result of checking one expected output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputCheck {
    /// Unit label
    pub label: String,
    /// Expected path
    pub path: PathBuf,
    /// Size in bytes when valid
    pub bytes: Option<u64>,
    /// Why the output is bad
    pub problem: Option<String>,
}

impl OutputCheck {
    /// Whether the output is present and valid
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.problem.is_none()
    }
}

/// Check every unit's output against `format`
#[must_use]
pub fn check_outputs(units: &[CaptureUnit], format: MediaFormat) -> Vec<OutputCheck> {
    units
        .iter()
        .map(|unit| {
            let (bytes, problem) = if unit.output.is_file() {
                match verify_output(&unit.output, format) {
                    Ok(bytes) => (Some(bytes), None),
                    Err(e) => (None, Some(e.to_string())),
                }
            } else {
                (None, Some("missing".to_string()))
            };
            OutputCheck {
                label: unit.label(),
                path: unit.output.clone(),
                bytes,
                problem,
            }
        })
        .collect()
}

/// Run the verify command
pub fn run_verify(config: &CliConfig, args: &VerifyArgs) -> CliResult<()> {
    let export = load_export_config(&args.settings)?;
    let catalog = load_catalog(&args.catalog)?;
    let layout = storyreel::OutputLayout::for_config(&export);
    let units = layout.units(&catalog, &export.base_url)?;
    let checks = check_outputs(&units, MediaFormat::for_strategy(&export.strategy));

    let reporter = ProgressReporter::new(config.color.should_color(), config.verbosity.is_quiet());
    for check in &checks {
        match &check.problem {
            None => reporter.success(&format!(
                "{} ({} bytes)",
                check.path.display(),
                check.bytes.unwrap_or(0)
            )),
            Some(problem) => reporter.failure(&format!("{}: {problem}", check.path.display())),
        }
    }
    for dir in layout.leftover_scratch_dirs()? {
        reporter.warning(&format!("leftover scratch directory {}", dir.display()));
    }

    let bad = checks.iter().filter(|c| !c.is_ok()).count();
    if bad > 0 {
        return Err(CliError::Verification {
            bad,
            total: checks.len(),
        });
    }
    reporter.info(&format!("{} outputs verified", checks.len()));
    Ok(())
}
