//! Error taxonomy for sessions and the transport underneath them.

use std::time::Duration;

use crate::protocol::RemoteError;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Transport errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Failures moving one envelope across the pipes.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("subprocess closed its output stream")]
    Closed,

    #[error("subprocess sent an empty reply line")]
    EmptyReply,

    #[error("malformed reply {line:?}: {source}")]
    Malformed {
        line: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("request not answered within {0:?}")]
    Timeout(Duration),

    #[error("subprocess has exited")]
    ProcessExited,

    #[error("subprocess has not been started")]
    NotStarted,

    #[error("reply id {got} does not match request id {expected}")]
    IdMismatch { expected: u64, got: u64 },

    #[error("session is degraded; close it before reuse")]
    Degraded,
}

impl TransportError {
    /// Whether the pipe may hold a partial request, an unread reply or a
    /// misattributed one, making further exchanges on this process unsafe.
    pub(crate) fn poisons_stream(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Timeout(_)
                | Self::Malformed { .. }
                | Self::EmptyReply
                | Self::IdMismatch { .. }
        )
    }

    /// Whether the failure means the subprocess is gone.
    pub(crate) fn process_gone(&self) -> bool {
        matches!(self, Self::Closed | Self::ProcessExited)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Session errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Errors surfaced by session and pool operations.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The subprocess could not be launched, or died while starting up.
    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process started but capability negotiation did not succeed.
    #[error("handshake failed: {0}")]
    Handshake(#[source] Box<RpcError>),

    #[error("communication error: {0}")]
    Communication(#[from] TransportError),

    /// The subprocess understood the request and answered with an error.
    #[error("{method} failed: {error}")]
    Invocation { method: String, error: RemoteError },

    #[error("unexpected response format: {0}")]
    UnexpectedFormat(String),

    #[error("unknown target: {0}")]
    UnknownTarget(String),

    #[error("all {max} pooled sessions are busy")]
    PoolExhausted { max: usize },

    /// The pool closed this session; acquire a fresh one.
    #[error("session for target `{0}` was evicted from the pool")]
    Evicted(String),
}

impl RpcError {
    /// Whether repeating the same call on the same session can succeed
    /// without the caller first fixing something or closing the session.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Handshake(inner) => !inner.requires_teardown(),
            Self::Invocation { .. } | Self::PoolExhausted { .. } => true,
            Self::Spawn { .. }
            | Self::Communication(_)
            | Self::UnexpectedFormat(_)
            | Self::UnknownTarget(_)
            | Self::Evicted(_) => false,
        }
    }

    /// Whether the session should be closed and reopened before reuse.
    pub fn requires_teardown(&self) -> bool {
        match self {
            Self::Communication(_) => true,
            Self::Handshake(inner) => inner.requires_teardown(),
            _ => false,
        }
    }

    /// The server-reported error, when the subprocess refused a request.
    pub fn remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Invocation { error, .. } => Some(error),
            Self::Handshake(inner) => inner.remote(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(message: &str) -> RemoteError {
        serde_json::from_value(serde_json::json!({ "message": message })).unwrap()
    }

    #[test]
    fn invocation_error_is_retryable_in_place() {
        let err = RpcError::Invocation {
            method: "operations/call".into(),
            error: remote("boom"),
        };
        assert!(err.is_retryable());
        assert!(!err.requires_teardown());
        assert_eq!(err.remote().map(|r| r.message.as_str()), Some("boom"));
        assert_eq!(err.to_string(), "operations/call failed: boom");
    }

    #[test]
    fn communication_error_requires_teardown() {
        let err = RpcError::from(TransportError::Closed);
        assert!(err.requires_teardown());
        assert!(!err.is_retryable());
    }

    #[test]
    fn handshake_follows_its_cause() {
        let rejected = RpcError::Handshake(Box::new(RpcError::Invocation {
            method: "initialize".into(),
            error: remote("not yet"),
        }));
        assert!(rejected.is_retryable());
        assert_eq!(rejected.remote().map(|r| r.message.as_str()), Some("not yet"));

        let timed_out = RpcError::Handshake(Box::new(RpcError::from(TransportError::Timeout(
            Duration::from_millis(10),
        ))));
        assert!(timed_out.requires_teardown());
        assert!(!timed_out.is_retryable());
    }

    #[test]
    fn stream_poisoning_classification() {
        assert!(TransportError::Timeout(Duration::from_secs(1)).poisons_stream());
        assert!(TransportError::EmptyReply.poisons_stream());
        assert!(TransportError::Io(std::io::Error::other("short write")).poisons_stream());
        assert!(!TransportError::Closed.poisons_stream());
        assert!(TransportError::Closed.process_gone());
        assert!(TransportError::ProcessExited.process_gone());
    }
}
