// ── Workflow tuning ──
//
// Polling, retry, and run-mode knobs for the orchestrator. Built by the
// CLI from the active profile; core never reads config files.

use std::time::Duration;

/// Bounded readiness polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            max_attempts: 12,
        }
    }
}

/// Per-call retry for transient failures (connection errors, 5xx).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

/// Everything one orchestrator invocation needs besides the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub poll: PollPolicy,
    pub retry: RetryPolicy,
    /// Record documents instead of sending mutating calls.
    pub dry_run: bool,
    /// Query live gateway interfaces before building VRRP.
    pub discover_interfaces: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll: PollPolicy::default(),
            retry: RetryPolicy::default(),
            dry_run: false,
            discover_interfaces: true,
        }
    }
}
