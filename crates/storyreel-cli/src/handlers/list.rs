//! List command handler

use crate::commands::ListArgs;
use crate::config::CliConfig;
use crate::error::CliResult;
use crate::handlers::{load_catalog, load_export_config};
use serde::Serialize;
use std::fmt::Write as _;
use storyreel::{CaptureUnit, OutputLayout};

/// One line of `list` output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitRow {
    /// Story identifier
    pub story: String,
    /// `cover` or `frame-N`
    pub visual: String,
    /// Render URL
    pub url: String,
    /// Output path
    pub output: String,
}

impl From<&CaptureUnit> for UnitRow {
    fn from(unit: &CaptureUnit) -> Self {
        Self {
            story: unit.story.to_string(),
            visual: unit.selector.to_string(),
            url: unit.url.clone(),
            output: unit.output.display().to_string(),
        }
    }
}

/// Run the list command
pub fn run_list(config: &CliConfig, args: &ListArgs) -> CliResult<()> {
    let export = load_export_config(&args.settings)?;
    let catalog = load_catalog(&args.catalog)?;
    let units = OutputLayout::for_config(&export).units(&catalog, &export.base_url)?;
    let rows: Vec<UnitRow> = units.iter().map(UnitRow::from).collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows).map_err(storyreel::ExportError::from)?);
    } else {
        print!("{}", render_table(&rows));
        if !config.verbosity.is_quiet() {
            eprintln!(
                "{} stories, {} visuals, {}",
                catalog.len(),
                rows.len(),
                export.strategy.name()
            );
        }
    }
    Ok(())
}

/// Tab-separated listing, one unit per line
#[must_use]
pub fn render_table(rows: &[UnitRow]) -> String {
    let mut out = String::new();
    for row in rows {
        let _ = writeln!(
            out,
            "{}/{}\t{}\t{}",
            row.story, row.visual, row.url, row.output
        );
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use storyreel::{Catalog, ExportConfig, StoryEntry};

    fn rows() -> Vec<UnitRow> {
        let catalog = Catalog::new(vec![StoryEntry::new("welcome", 1).unwrap()]).unwrap();
        let config = ExportConfig::default();
        OutputLayout::for_config(&config)
            .units(&catalog, &config.base_url)
            .unwrap()
            .iter()
            .map(UnitRow::from)
            .collect()
    }

    #[test]
    fn test_rows_cover_first() {
        let rows = rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].visual, "cover");
        assert_eq!(rows[1].visual, "frame-1");
        assert!(rows[0].url.contains("cover=true"));
        assert!(rows[1].url.contains("frame=0"));
        assert!(rows[1].output.ends_with("welcome-frame-1.gif"));
    }

    #[test]
    fn test_table_lines() {
        let table = render_table(&rows());
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("welcome/cover\t"));
        assert_eq!(lines[1].split('\t').count(), 3);
    }

    #[test]
    fn test_rows_serialize() {
        let json = serde_json::to_value(rows()).unwrap();
        assert_eq!(json[0]["story"], "welcome");
    }
}
