use serde::{Deserialize, Serialize};
use std::time::Duration;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session behaviour
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-session timing knobs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Upper bound on waiting for one reply line (ms). `0` disables the bound.
    #[serde(default = "d_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// How the supervisor decides a freshly spawned process is ready.
    #[serde(default)]
    pub readiness: Readiness,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: d_request_timeout_ms(),
            readiness: Readiness::default(),
        }
    }
}

impl SessionConfig {
    /// The reply timeout, or `None` when waiting is unbounded.
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }
}

/// Readiness policy applied right after a subprocess is spawned.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Readiness {
    /// Sleep for a fixed grace period before the first write.
    Delay {
        #[serde(default = "d_delay_ms")]
        delay_ms: u64,
    },
    /// Write immediately; rely on the pipe buffer.
    Immediate,
    /// Read stdout until a line equal to `marker` arrives.
    Marker {
        marker: String,
        #[serde(default = "d_marker_timeout_ms")]
        timeout_ms: u64,
    },
}

impl Default for Readiness {
    fn default() -> Self {
        Readiness::Delay {
            delay_ms: d_delay_ms(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_request_timeout_ms() -> u64 {
    30_000
}
fn d_delay_ms() -> u64 {
    500
}
fn d_marker_timeout_ms() -> u64 {
    5_000
}
