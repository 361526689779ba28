//! Session pool: one session per target id, bounded, LRU-evicted.
//!
//! The pool is an ordinary value passed to whoever needs sessions; there
//! is no process-wide registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use tw_domain::config::{Config, ConnectionTarget, PoolConfig, SessionConfig};

use crate::error::RpcError;
use crate::session::Session;

/// A pooled session. Lock it to run operations.
pub type SharedSession = Arc<tokio::sync::Mutex<Session>>;

struct PoolEntry {
    session: SharedSession,
    last_used: u64,
}

/// Owns at most `max_sessions` open sessions keyed by target id.
pub struct SessionPool {
    targets: HashMap<String, ConnectionTarget>,
    session_config: SessionConfig,
    max_sessions: usize,
    entries: Mutex<HashMap<String, PoolEntry>>,
    clock: AtomicU64,
}

impl SessionPool {
    pub fn new(
        targets: impl IntoIterator<Item = ConnectionTarget>,
        session_config: SessionConfig,
        pool_config: PoolConfig,
    ) -> Self {
        Self {
            targets: targets.into_iter().map(|t| (t.id.clone(), t)).collect(),
            session_config,
            max_sessions: pool_config.max_sessions,
            entries: Mutex::new(HashMap::new()),
            clock: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.targets.iter().cloned(),
            config.session.clone(),
            config.pool.clone(),
        )
    }

    /// Get the session for `target_id`, opening one if needed.
    ///
    /// When the pool is full, the least-recently-used session that nobody
    /// currently holds locked is closed and dropped to make room. If every
    /// pooled session is locked, this fails with [`RpcError::PoolExhausted`].
    ///
    /// Sessions the pool drops (by eviction, [`evict`](Self::evict) or
    /// [`close_all`](Self::close_all)) are retired: operations through an
    /// `Arc` obtained earlier fail with [`RpcError::Evicted`] instead of
    /// spawning a process the pool no longer tracks.
    pub async fn acquire(&self, target_id: &str) -> Result<SharedSession, RpcError> {
        let target = self
            .targets
            .get(target_id)
            .ok_or_else(|| RpcError::UnknownTarget(target_id.to_string()))?;
        let tick = self.clock.fetch_add(1, Ordering::Relaxed);

        let (session, evicted) = {
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get_mut(target_id) {
                entry.last_used = tick;
                return Ok(entry.session.clone());
            }

            let evicted = if entries.len() >= self.max_sessions {
                let victim = entries
                    .iter()
                    .filter(|(_, e)| e.session.try_lock().is_ok())
                    .min_by_key(|(_, e)| e.last_used)
                    .map(|(id, _)| id.clone());
                let Some(victim) = victim else {
                    return Err(RpcError::PoolExhausted {
                        max: self.max_sessions,
                    });
                };
                entries.remove(&victim).map(|e| (victim, e.session))
            } else {
                None
            };

            let session = Arc::new(tokio::sync::Mutex::new(Session::open(
                target.clone(),
                self.session_config.clone(),
            )));
            entries.insert(
                target_id.to_string(),
                PoolEntry {
                    session: session.clone(),
                    last_used: tick,
                },
            );
            (session, evicted)
        };

        if let Some((victim_id, victim)) = evicted {
            tracing::info!(evicted = %victim_id, target_id, "evicting least-recently-used session");
            victim.lock().await.retire().await;
        }

        Ok(session)
    }

    /// Retire and remove the session for `target_id`. Returns whether one existed.
    pub async fn evict(&self, target_id: &str) -> bool {
        let removed = self.entries.lock().remove(target_id);
        match removed {
            Some(entry) => {
                entry.session.lock().await.retire().await;
                true
            }
            None => false,
        }
    }

    /// Retire every pooled session concurrently and empty the pool.
    pub async fn close_all(&self) {
        let drained: Vec<SharedSession> = self
            .entries
            .lock()
            .drain()
            .map(|(_, entry)| entry.session)
            .collect();
        if drained.is_empty() {
            return;
        }
        tracing::info!(count = drained.len(), "closing pooled sessions");
        let futs: Vec<_> = drained
            .iter()
            .map(|session| async move { session.lock().await.retire().await })
            .collect();
        futures_util::future::join_all(futs).await;
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Whether a session for `target_id` is currently pooled.
    pub fn contains(&self, target_id: &str) -> bool {
        self.entries.lock().contains_key(target_id)
    }

    /// Ids of all configured targets, sorted.
    pub fn target_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.targets.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
