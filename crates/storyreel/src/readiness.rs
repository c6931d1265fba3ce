//! Frame-readiness synchronizer.
//!
//! Polls the render target's DOM attributes until every readiness signal
//! reads `"true"`, the not-found flag appears, or the timeout passes. A
//! timeout is not an error: the caller captures anyway.

use crate::browser::CapturePage;
use crate::config::ReadinessConfig;
use crate::wait::{poll_until, PollOutcome};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How a readiness wait ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyOutcome {
    /// Every signal was set
    Ready {
        /// Time spent polling
        elapsed: Duration,
    },
    /// The deadline passed with some signals unset
    TimedOut {
        /// Time spent polling
        elapsed: Duration,
        /// Signals not seen as set on the last successful probe
        missing: Vec<String>,
    },
    /// The page reported an unknown story
    NotFound {
        /// Time spent polling
        elapsed: Duration,
    },
}

impl ReadyOutcome {
    /// Whether capture may proceed
    #[must_use]
    pub const fn should_capture(&self) -> bool {
        !matches!(self, Self::NotFound { .. })
    }

    /// Time spent polling
    #[must_use]
    pub const fn elapsed(&self) -> Duration {
        match self {
            Self::Ready { elapsed } | Self::TimedOut { elapsed, .. } | Self::NotFound { elapsed } => {
                *elapsed
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Seen {
    Ready,
    NotFound,
}

/// Wait for the page's readiness signals.
///
/// Never blocks past `readiness.timeout_ms` plus scheduler jitter, even if
/// the page stops responding. Probe errors count as "not ready yet".
pub async fn await_ready(page: &dyn CapturePage, readiness: &ReadinessConfig) -> ReadyOutcome {
    let attributes = readiness.probe_attributes();
    let signal_count = readiness.signals.len();
    let last_seen: Arc<Mutex<Option<Vec<bool>>>> = Arc::new(Mutex::new(None));
    let attributes = &attributes;
    let recorder = Arc::clone(&last_seen);

    let outcome = poll_until(
        move || {
            let last_seen = Arc::clone(&recorder);
            async move {
                let flags = match page.flags_set(attributes).await {
                    Ok(flags) if flags.len() == attributes.len() => flags,
                    Ok(_) | Err(_) => return None,
                };
                if flags[signal_count] {
                    return Some(Seen::NotFound);
                }
                if flags[..signal_count].iter().all(|set| *set) {
                    return Some(Seen::Ready);
                }
                if let Ok(mut slot) = last_seen.lock() {
                    *slot = Some(flags);
                }
                None
            }
        },
        &readiness.wait_options(),
    )
    .await;

    match outcome {
        PollOutcome::Ready {
            value: Seen::Ready,
            elapsed,
            attempts,
        } => {
            tracing::debug!(elapsed_ms = elapsed.as_millis() as u64, attempts, "page ready");
            ReadyOutcome::Ready { elapsed }
        }
        PollOutcome::Ready {
            value: Seen::NotFound,
            elapsed,
            ..
        } => ReadyOutcome::NotFound { elapsed },
        PollOutcome::TimedOut { elapsed, attempts } => {
            let last = last_seen.lock().ok().and_then(|slot| slot.clone());
            let missing = readiness
                .signals
                .iter()
                .enumerate()
                .filter(|(i, _)| !last.as_ref().is_some_and(|flags| flags[*i]))
                .map(|(_, name)| name.clone())
                .collect::<Vec<_>>();
            tracing::warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                attempts,
                missing = ?missing,
                "readiness signals not seen before timeout, capturing anyway"
            );
            ReadyOutcome::TimedOut { elapsed, missing }
        }
    }
}
