//! Last-resort process cleanup.
//!
//! After the browser session is closed, any process whose command line
//! matches one of the configured patterns is force-killed so repeated runs
//! do not accumulate orphaned renderers. This is imprecise: it matches by
//! name and can hit unrelated processes (another Chromium the operator has
//! open, for instance). It is only called from the top-level teardown of a
//! batch and can be disabled with `browser.force_kill_on_exit: false`.
//!
//! The current process and its ancestors are never signalled, even when
//! their command lines match (a `--chromium /path/to/chromium` argument or
//! a wrapper script named after the browser).

use std::collections::HashSet;
use std::process::Stdio;

/// Bound on the parent chain walk
const MAX_ANCESTORS: usize = 64;

/// Outcome of one kill attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillReport {
    /// Pattern that was matched
    pub pattern: String,
    /// Processes signalled
    pub killed: Vec<u32>,
    /// Matches skipped because they are this process or an ancestor
    pub spared: Vec<u32>,
}

impl KillReport {
    /// Whether any process was killed
    #[must_use]
    pub fn matched(&self) -> bool {
        !self.killed.is_empty()
    }
}

/// Parse `pgrep` output, one pid per line
#[must_use]
pub fn parse_pids(output: &str) -> Vec<u32> {
    output
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

/// Split candidates into (kill, spare) against the protected set
#[must_use]
pub fn partition_targets(candidates: &[u32], protected: &HashSet<u32>) -> (Vec<u32>, Vec<u32>) {
    candidates
        .iter()
        .copied()
        .partition(|pid| !protected.contains(pid))
}

async fn run_quiet(program: &str, args: &[String]) -> Option<std::process::Output> {
    match tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
    {
        Ok(output) => Some(output),
        Err(e) => {
            tracing::debug!(program, error = %e, "command unavailable");
            None
        }
    }
}

async fn parent_of(pid: u32) -> Option<u32> {
    let args = ["-o".to_string(), "ppid=".to_string(), "-p".to_string(), pid.to_string()];
    let output = run_quiet("ps", &args).await?;
    String::from_utf8_lossy(&output.stdout).trim().parse().ok()
}

/// This process and every ancestor up to init
pub async fn protected_pids() -> HashSet<u32> {
    let mut pid = std::process::id();
    let mut protected = HashSet::from([pid]);
    while protected.len() < MAX_ANCESTORS {
        match parent_of(pid).await {
            Some(parent) if parent > 1 && protected.insert(parent) => pid = parent,
            _ => break,
        }
    }
    protected
}

#[cfg(unix)]
async fn kill_matching(pattern: &str, protected: &HashSet<u32>) -> KillReport {
    let candidates = match run_quiet("pgrep", &["-f".to_string(), pattern.to_string()]).await {
        Some(output) => parse_pids(&String::from_utf8_lossy(&output.stdout)),
        None => Vec::new(),
    };
    let (targets, spared) = partition_targets(&candidates, protected);

    let mut killed = Vec::new();
    if !targets.is_empty() {
        let mut args = vec!["-9".to_string()];
        args.extend(targets.iter().map(u32::to_string));
        if run_quiet("kill", &args).await.is_some() {
            killed = targets;
        }
    }
    KillReport {
        pattern: pattern.to_string(),
        killed,
        spared,
    }
}

#[cfg(windows)]
async fn kill_matching(pattern: &str, _protected: &HashSet<u32>) -> KillReport {
    // Image-name match; storyreel's own image never carries a browser name.
    let args = [
        "/F".to_string(),
        "/T".to_string(),
        "/IM".to_string(),
        format!("{pattern}*"),
    ];
    let killed = match run_quiet("taskkill", &args).await {
        Some(output) if output.status.success() => vec![0],
        _ => Vec::new(),
    };
    KillReport {
        pattern: pattern.to_string(),
        killed,
        spared: Vec::new(),
    }
}

/// Kill every process matching any of `patterns`, sparing this process and
/// its ancestors.
///
/// Never fails: a missing `pgrep`/`kill`/`taskkill` or a pattern with no
/// match is logged and skipped.
pub async fn force_kill_lingering(patterns: &[String]) -> Vec<KillReport> {
    let patterns: Vec<&String> = patterns.iter().filter(|p| !p.trim().is_empty()).collect();
    if patterns.is_empty() {
        return Vec::new();
    }
    let protected = protected_pids().await;

    let mut reports = Vec::with_capacity(patterns.len());
    for pattern in patterns {
        let report = kill_matching(pattern, &protected).await;
        if report.matched() {
            tracing::warn!(pattern = %pattern, pids = ?report.killed, "force-killed lingering processes");
        }
        if !report.spared.is_empty() {
            tracing::debug!(pattern = %pattern, pids = ?report.spared, "spared own process tree");
        }
        reports.push(report);
    }
    reports
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    mod selection_tests {
        use super::*;

        #[test]
        fn test_parse_pids() {
            assert_eq!(parse_pids("123\n 456 \n\nnot-a-pid\n789"), vec![123, 456, 789]);
            assert!(parse_pids("").is_empty());
        }

        #[test]
        fn test_protected_pids_are_spared() {
            let protected = HashSet::from([10, 20]);
            let (kill, spare) = partition_targets(&[5, 10, 15, 20], &protected);
            assert_eq!(kill, vec![5, 15]);
            assert_eq!(spare, vec![10, 20]);
        }
    }

    #[tokio::test]
    async fn test_blank_patterns_skipped() {
        let reports = force_kill_lingering(&[String::new(), "  ".to_string()]).await;
        assert!(reports.is_empty());
    }

    #[tokio::test]
    async fn test_unmatched_pattern_kills_nothing() {
        let reports =
            force_kill_lingering(&["storyreel-no-such-process-4f2a9c".to_string()]).await;
        assert_eq!(reports.len(), 1);
        assert!(!reports[0].matched());
    }

    #[tokio::test]
    async fn test_current_process_is_protected() {
        let protected = protected_pids().await;
        assert!(protected.contains(&std::process::id()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pattern_matching_own_command_line_spares_self() {
        // Every argument of this test binary's command line matches itself.
        let own = std::env::current_exe().unwrap();
        let name = own.file_name().unwrap().to_string_lossy().to_string();

        let reports = force_kill_lingering(&[name]).await;

        // Still running, so nothing in our own tree was signalled.
        assert_eq!(reports.len(), 1);
        assert!(!reports[0].killed.contains(&std::process::id()));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_matching_unrelated_process_is_killed() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("37.4817")
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let reports = force_kill_lingering(&["sleep 37.4817".to_string()]).await;

        assert!(reports[0].killed.contains(&pid));
        let status = tokio::time::timeout(std::time::Duration::from_secs(5), child.wait())
            .await
            .unwrap()
            .unwrap();
        assert!(!status.success());
    }
}
