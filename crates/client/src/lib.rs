//! `tw-client`: client runtime for line-delimited RPC subprocesses.
//!
//! This crate provides:
//! - Wire envelope types and the three method kinds (handshake, discovery,
//!   invocation).
//! - A [`Supervisor`] that spawns one child process and talks to it over
//!   stdin/stdout.
//! - A [`Session`] that sequences requests over that process with lazy,
//!   one-shot handshake semantics and deterministic teardown.
//! - A [`SessionPool`] holding one session per configured target.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tw_client::{ConnectionTarget, Session, SessionConfig};
//!
//! let target = ConnectionTarget::new("files", "python3").with_args(["server.py"]);
//! let mut session = Session::open(target, SessionConfig::default());
//!
//! let result = async {
//!     for op in session.discover().await? {
//!         println!("{}: {}", op.name, op.description);
//!     }
//!     let mut args = serde_json::Map::new();
//!     args.insert("path".into(), "/tmp/test.txt".into());
//!     session.invoke("read_file", args).await
//! }
//! .await;
//! session.close().await;
//! ```

pub mod error;
pub mod framing;
pub mod pool;
pub mod protocol;
pub mod session;
pub mod supervisor;

// Re-exports for convenience.
pub use error::{RpcError, TransportError};
pub use pool::{SessionPool, SharedSession};
pub use protocol::{OperationDescriptor, RemoteError, ServerInfo};
pub use session::{close, discover, handshake, invoke, open, Session, SessionState};
pub use supervisor::{ProcessInfo, StartOutcome, Supervisor};
pub use tw_domain::config::{ConnectionTarget, PoolConfig, Readiness, SessionConfig};
