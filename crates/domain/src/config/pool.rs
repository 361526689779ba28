use serde::{Deserialize, Serialize};

/// Limits for the session pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PoolConfig {
    /// Maximum number of sessions kept open at once. When full, the
    /// least-recently-used idle session is closed to make room.
    #[serde(default = "d_max_sessions")]
    pub max_sessions: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_sessions: d_max_sessions(),
        }
    }
}

fn d_max_sessions() -> usize {
    8
}
