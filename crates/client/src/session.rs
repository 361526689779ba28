//! RPC session: handshake, discovery and invocation over one subprocess.
//!
//! A session owns its [`Supervisor`] exclusively. Every operation takes
//! `&mut self`, so at most one request is ever in flight and replies are
//! consumed strictly in the order requests were sent. Replies are not
//! demultiplexed by id; pipelining several requests on one session would
//! need a reader task and a pending-reply map, which this type does not
//! have.

use serde_json::{Map, Value};
use uuid::Uuid;

use tw_domain::config::{ConnectionTarget, SessionConfig};

use crate::error::{RpcError, TransportError};
use crate::framing;
use crate::protocol::{
    self, methods, DiscoveryResult, InvocationResult, OperationDescriptor, Reply, RequestEnvelope,
    ServerInfo,
};
use crate::supervisor::{ProcessInfo, Supervisor};

/// Observable lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No process has been spawned yet.
    Unstarted,
    /// A process is held but the handshake has not completed.
    Started,
    /// Handshake completed; discovery and invocation go straight through.
    Ready,
    /// A reply timed out or could not be attributed; `close()` is required.
    Degraded,
    /// Torn down by `close()`. The next operation starts over.
    Closed,
}

/// Logical conversation with one subprocess.
pub struct Session {
    session_id: Uuid,
    target: ConnectionTarget,
    config: SessionConfig,
    supervisor: Supervisor,
    handshake_completed: bool,
    /// Last id handed out. Never reset, including across respawns.
    last_request_id: u64,
    /// Set between writing a request and consuming its reply. Still set at
    /// the start of an operation means the previous future was dropped.
    in_flight: Option<u64>,
    degraded: bool,
    closed: bool,
    /// Dropped by the pool that created it; no further operations.
    evicted: bool,
    server_info: Option<ServerInfo>,
}

impl Session {
    /// Create a session bound to `target`. Nothing is spawned yet.
    pub fn open(target: ConnectionTarget, config: SessionConfig) -> Self {
        let supervisor = Supervisor::new(config.readiness.clone());
        Self {
            session_id: Uuid::new_v4(),
            target,
            config,
            supervisor,
            handshake_completed: false,
            last_request_id: 0,
            in_flight: None,
            degraded: false,
            closed: false,
            evicted: false,
            server_info: None,
        }
    }

    // ── Operations ──────────────────────────────────────────────────

    /// Negotiate capabilities, spawning the subprocess first if needed.
    ///
    /// Once the handshake has succeeded on the current process, further
    /// calls return the cached server info without sending anything.
    pub async fn handshake(&mut self) -> Result<ServerInfo, RpcError> {
        self.begin_operation().await?;
        if self.handshake_completed {
            if let Some(info) = &self.server_info {
                return Ok(info.clone());
            }
        }
        self.perform_handshake().await
    }

    /// List the operations the subprocess offers, in the order it sent them.
    pub async fn discover(&mut self) -> Result<Vec<OperationDescriptor>, RpcError> {
        self.begin_operation().await?;
        self.ensure_handshake().await?;

        let result = self.call(methods::DISCOVER, serde_json::json!({})).await?;
        let parsed: DiscoveryResult = serde_json::from_value(result).map_err(|e| {
            RpcError::UnexpectedFormat(format!("{} result: {e}", methods::DISCOVER))
        })?;

        tracing::debug!(
            session_id = %self.session_id,
            target_id = %self.target.id,
            count = parsed.operations.len(),
            "operations discovered"
        );
        Ok(parsed.operations)
    }

    /// Run operation `name` and return the text of the first content block.
    pub async fn invoke(&mut self, name: &str, arguments: Map<String, Value>) -> Result<String, RpcError> {
        self.begin_operation().await?;
        self.ensure_handshake().await?;

        let result = self
            .call(methods::INVOKE, protocol::invoke_params(name, arguments))
            .await?;
        let parsed: InvocationResult = serde_json::from_value(result).map_err(|e| {
            RpcError::UnexpectedFormat(format!("{} result: {e}", methods::INVOKE))
        })?;

        parsed.first_text().map(str::to_owned).ok_or_else(|| {
            RpcError::UnexpectedFormat(format!(
                "{} result has no text in its first content block",
                methods::INVOKE
            ))
        })
    }

    /// Tear down the subprocess. Never fails; safe to call repeatedly.
    pub async fn close(&mut self) {
        if self.supervisor.has_handle() {
            tracing::info!(
                session_id = %self.session_id,
                target_id = %self.target.id,
                "closing session"
            );
        }
        self.teardown().await;
        self.degraded = false;
        self.closed = true;
    }

    /// Close for good. Used by the pool when it stops tracking a session,
    /// so a stale handle cannot respawn a process nobody will close.
    pub(crate) async fn retire(&mut self) {
        self.close().await;
        self.evicted = true;
    }

    // ── Introspection ───────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        if self.degraded {
            SessionState::Degraded
        } else if self.closed {
            SessionState::Closed
        } else if !self.supervisor.has_handle() {
            SessionState::Unstarted
        } else if self.handshake_completed {
            SessionState::Ready
        } else {
            SessionState::Started
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    pub fn handshake_completed(&self) -> bool {
        self.handshake_completed
    }

    /// The id assigned to the most recent request (0 before any request).
    pub fn last_request_id(&self) -> u64 {
        self.last_request_id
    }

    /// Server info from the last successful handshake on the current process.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    pub fn is_running(&mut self) -> bool {
        self.supervisor.is_running()
    }

    pub fn pid(&self) -> Option<u32> {
        self.supervisor.pid()
    }

    pub fn process_info(&self) -> Option<ProcessInfo> {
        self.supervisor.info()
    }

    /// Number of process handles held (0 or 1).
    pub fn live_handles(&self) -> usize {
        self.supervisor.live_handles()
    }

    /// Processes spawned over this session's lifetime.
    pub fn spawn_count(&self) -> u64 {
        self.supervisor.spawn_count()
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Recover from whatever the previous operation left behind.
    async fn begin_operation(&mut self) -> Result<(), RpcError> {
        if self.evicted {
            return Err(RpcError::Evicted(self.target.id.clone()));
        }
        if self.degraded {
            return Err(TransportError::Degraded.into());
        }
        self.closed = false;

        if let Some(id) = self.in_flight.take() {
            tracing::warn!(
                session_id = %self.session_id,
                target_id = %self.target.id,
                id,
                "previous request was abandoned mid-exchange, restarting subprocess"
            );
            self.teardown().await;
        }

        if self.supervisor.has_handle() && !self.supervisor.is_running() {
            tracing::warn!(
                session_id = %self.session_id,
                target_id = %self.target.id,
                pid = ?self.supervisor.pid(),
                "subprocess exited since the last operation, respawning"
            );
            self.teardown().await;
        }
        Ok(())
    }

    async fn ensure_handshake(&mut self) -> Result<(), RpcError> {
        if !self.handshake_completed {
            self.perform_handshake().await?;
        }
        Ok(())
    }

    async fn perform_handshake(&mut self) -> Result<ServerInfo, RpcError> {
        self.supervisor.start(&self.target).await?;

        let result = self
            .call(methods::HANDSHAKE, serde_json::json!({}))
            .await
            .map_err(|e| RpcError::Handshake(Box::new(e)))?;
        let info: ServerInfo = serde_json::from_value(result).map_err(|e| {
            RpcError::Handshake(Box::new(RpcError::UnexpectedFormat(format!(
                "{} result: {e}",
                methods::HANDSHAKE
            ))))
        })?;

        tracing::info!(
            session_id = %self.session_id,
            target_id = %self.target.id,
            server = %info.name,
            version = %info.version,
            "handshake completed"
        );

        self.handshake_completed = true;
        self.server_info = Some(info.clone());
        Ok(info)
    }

    /// Send one request and wait for its reply.
    async fn call(&mut self, method: &str, params: Value) -> Result<Value, RpcError> {
        if !self.supervisor.is_running() {
            let err = if self.supervisor.has_handle() {
                TransportError::ProcessExited
            } else {
                TransportError::NotStarted
            };
            self.handshake_completed = false;
            return Err(err.into());
        }

        self.last_request_id += 1;
        let id = self.last_request_id;
        let request = RequestEnvelope::new(id, method, params);

        tracing::debug!(session_id = %self.session_id, id, method, "sending request");

        self.in_flight = Some(id);
        let exchanged = self.exchange(&request).await;
        self.in_flight = None;

        let envelope = match exchanged {
            Ok(envelope) => envelope,
            Err(e) => {
                self.record_failure(&e, method);
                if e.process_gone() {
                    self.teardown().await;
                }
                return Err(e.into());
            }
        };

        match envelope.into_reply() {
            Some(Reply::Result(value)) => {
                tracing::debug!(session_id = %self.session_id, id, method, "received result");
                Ok(value)
            }
            Some(Reply::Error(error)) => {
                tracing::debug!(
                    session_id = %self.session_id,
                    id,
                    method,
                    error = %error,
                    "received error reply"
                );
                Err(RpcError::Invocation {
                    method: method.to_string(),
                    error,
                })
            }
            None => Err(RpcError::UnexpectedFormat(format!(
                "{method} reply carries neither result nor error"
            ))),
        }
    }

    /// Write the request and read its reply, both under the request timeout.
    /// A subprocess that stops draining stdin blocks the write, so the bound
    /// covers the whole round trip.
    async fn exchange(&mut self, request: &RequestEnvelope) -> Result<protocol::ResponseEnvelope, TransportError> {
        match self.config.request_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.round_trip(request))
                .await
                .map_err(|_| TransportError::Timeout(limit))?,
            None => self.round_trip(request).await,
        }
    }

    async fn round_trip(&mut self, request: &RequestEnvelope) -> Result<protocol::ResponseEnvelope, TransportError> {
        self.supervisor.write_request(request).await?;
        let line = self.supervisor.read_line().await?;

        let envelope = framing::parse_response(&line)?;
        if let Some(got) = envelope.id {
            if got != request.id {
                return Err(TransportError::IdMismatch {
                    expected: request.id,
                    got,
                });
            }
        }
        Ok(envelope)
    }

    fn record_failure(&mut self, err: &TransportError, method: &str) {
        if err.poisons_stream() {
            self.degraded = true;
        }
        tracing::warn!(
            session_id = %self.session_id,
            target_id = %self.target.id,
            method,
            error = %err,
            degraded = self.degraded,
            "exchange failed"
        );
    }

    /// Release the process and forget per-process state. Request ids keep
    /// counting.
    async fn teardown(&mut self) {
        self.supervisor.stop().await;
        self.handshake_completed = false;
        self.in_flight = None;
        self.server_info = None;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Free-function surface
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Open a session with default settings. Does not spawn.
pub fn open(target: ConnectionTarget) -> Session {
    Session::open(target, SessionConfig::default())
}

pub async fn handshake(session: &mut Session) -> Result<ServerInfo, RpcError> {
    session.handshake().await
}

pub async fn discover(session: &mut Session) -> Result<Vec<OperationDescriptor>, RpcError> {
    session.discover().await
}

pub async fn invoke(
    session: &mut Session,
    operation_name: &str,
    arguments: Map<String, Value>,
) -> Result<String, RpcError> {
    session.invoke(operation_name, arguments).await
}

pub async fn close(session: &mut Session) {
    session.close().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_session_is_unstarted() {
        let session = open(ConnectionTarget::new("t", "sh"));
        assert_eq!(session.state(), SessionState::Unstarted);
        assert_eq!(session.last_request_id(), 0);
        assert_eq!(session.live_handles(), 0);
        assert!(!session.handshake_completed());
        assert!(session.server_info().is_none());
    }

    #[tokio::test]
    async fn close_on_fresh_session_is_a_noop() {
        let mut session = open(ConnectionTarget::new("t", "sh"));
        session.close().await;
        session.close().await;
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.spawn_count(), 0);
    }

    #[tokio::test]
    async fn spawn_failure_leaves_session_unstarted() {
        let mut session = open(ConnectionTarget::new("ghost", "toolwire-no-such-binary-7f3a"));
        let err = session.discover().await.unwrap_err();
        assert!(matches!(err, RpcError::Spawn { .. }), "{err:?}");
        assert_eq!(session.state(), SessionState::Unstarted);
        assert_eq!(session.last_request_id(), 0);
    }
}
