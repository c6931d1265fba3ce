//! Bounded polling with exponential backoff.
//!
//! One primitive serves every "wait until something is true" in the
//! pipeline: readiness attributes on the render target and the raw
//! recording container appearing on disk. Every wait carries a hard
//! deadline; a predicate that never succeeds still returns control
//! shortly after `timeout_ms`.

use crate::result::{ExportError, ExportResult};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for wait operations (10 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10_000;

/// Default first polling interval (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// Default ceiling for the backoff interval (1 second)
pub const DEFAULT_MAX_POLL_INTERVAL_MS: u64 = 1_000;

/// Default multiplier applied to the interval after each miss
pub const DEFAULT_BACKOFF_FACTOR: u32 = 2;

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Options for wait operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// First polling interval in milliseconds
    pub poll_interval_ms: u64,
    /// Upper bound for the polling interval in milliseconds
    pub max_poll_interval_ms: u64,
    /// Interval multiplier after each unsuccessful probe
    pub backoff_factor: u32,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_poll_interval_ms: DEFAULT_MAX_POLL_INTERVAL_MS,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the first polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Set the backoff ceiling in milliseconds
    #[must_use]
    pub const fn with_max_poll_interval(mut self, max_poll_interval_ms: u64) -> Self {
        self.max_poll_interval_ms = max_poll_interval_ms;
        self
    }

    /// Set the backoff multiplier (1 = fixed interval)
    #[must_use]
    pub const fn with_backoff_factor(mut self, factor: u32) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get the first poll interval as Duration
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Interval to use after `current` missed.
    #[must_use]
    pub fn next_interval(&self, current: Duration) -> Duration {
        let floor = self.poll_interval();
        let ceiling = Duration::from_millis(self.max_poll_interval_ms).max(floor);
        current
            .saturating_mul(self.backoff_factor.max(1))
            .clamp(floor, ceiling)
    }
}

// =============================================================================
// OUTCOMES
// =============================================================================

/// Result of a boolean wait
#[derive(Debug, Clone)]
pub struct WaitResult {
    /// Whether the condition was met before the deadline
    pub success: bool,
    /// Time spent waiting
    pub elapsed: Duration,
    /// Number of probes performed
    pub attempts: u32,
    /// Description of what was waited for
    pub waited_for: String,
}

impl WaitResult {
    /// Create a successful wait result
    #[must_use]
    pub fn success(elapsed: Duration, attempts: u32, waited_for: impl Into<String>) -> Self {
        Self {
            success: true,
            elapsed,
            attempts,
            waited_for: waited_for.into(),
        }
    }

    /// Create a timeout wait result
    #[must_use]
    pub fn timeout(elapsed: Duration, attempts: u32, waited_for: impl Into<String>) -> Self {
        Self {
            success: false,
            elapsed,
            attempts,
            waited_for: waited_for.into(),
        }
    }
}

/// Result of a value-producing poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The probe produced a value
    Ready {
        /// Value returned by the probe
        value: T,
        /// Time spent waiting
        elapsed: Duration,
        /// Number of probes performed
        attempts: u32,
    },
    /// The deadline passed first
    TimedOut {
        /// Time spent waiting
        elapsed: Duration,
        /// Number of probes performed
        attempts: u32,
    },
}

impl<T> PollOutcome<T> {
    /// Time spent waiting, whichever way the poll ended
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        match self {
            Self::Ready { elapsed, .. } | Self::TimedOut { elapsed, .. } => *elapsed,
        }
    }
}

// =============================================================================
// POLLING
// =============================================================================

/// Poll `probe` until it yields `Some`, backing off between misses.
///
/// A single probe that hangs is cut off at the deadline, so the call
/// returns no later than `timeout_ms` plus scheduler jitter.
pub async fn poll_until<T, F, Fut>(mut probe: F, options: &WaitOptions) -> PollOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let start = Instant::now();
    let deadline = start + options.timeout();
    let mut interval = options.poll_interval();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        if let Ok(Some(value)) = tokio::time::timeout(remaining, probe()).await {
            return PollOutcome::Ready {
                value,
                elapsed: start.elapsed(),
                attempts,
            };
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return PollOutcome::TimedOut {
                elapsed: start.elapsed(),
                attempts,
            };
        }

        tokio::time::sleep(interval.min(remaining)).await;
        interval = options.next_interval(interval);
    }
}

/// Wait for an async predicate to return true.
pub async fn wait_for<F, Fut>(
    mut predicate: F,
    options: &WaitOptions,
    description: impl Into<String>,
) -> WaitResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let outcome = poll_until(
        || {
            let check = predicate();
            async move { check.await.then_some(()) }
        },
        options,
    )
    .await;

    match outcome {
        PollOutcome::Ready {
            elapsed, attempts, ..
        } => WaitResult::success(elapsed, attempts, description),
        PollOutcome::TimedOut { elapsed, attempts } => {
            WaitResult::timeout(elapsed, attempts, description)
        }
    }
}

/// Wait for a regular file to exist at `path`.
///
/// # Errors
///
/// Returns [`ExportError::RecordingMissing`] if the file is still absent
/// when the deadline passes.
pub async fn wait_for_file(path: &Path, options: &WaitOptions) -> ExportResult<PathBuf> {
    let result = wait_for(
        || async move {
            tokio::fs::metadata(path)
                .await
                .map(|meta| meta.is_file())
                .unwrap_or(false)
        },
        options,
        format!("file {}", path.display()),
    )
    .await;

    if result.success {
        tracing::debug!(
            path = %path.display(),
            elapsed_ms = result.elapsed.as_millis() as u64,
            attempts = result.attempts,
            "file appeared"
        );
        Ok(path.to_path_buf())
    } else {
        Err(ExportError::RecordingMissing {
            path: path.to_path_buf(),
            ms: options.timeout_ms,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================
