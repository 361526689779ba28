//! Shell-script mock servers for driving real subprocesses in tests.
//!
//! Each mock runs `sh mock.sh` inside its own temp directory and appends
//! every request line it receives to `requests.log` there, before replying.

#![allow(dead_code)]

use std::path::Path;

use serde_json::Value;
use tempfile::TempDir;
use tw_client::{ConnectionTarget, Readiness, SessionConfig};

/// Replies to every method the session uses, keyed on operation name for
/// invocations.
pub const STANDARD: &str = r#"
while IFS= read -r line; do
  printf '%s\n' "$line" >> requests.log
  id=$(printf '%s\n' "$line" | sed -n 's/.*"id":\([0-9][0-9]*\)}$/\1/p')
  case "$line" in
    *'"method":"initialize"'*)
      printf '{"protocol_version":"2.0","id":%s,"result":{"name":"mock","version":"1"}}\n' "$id" ;;
    *'"method":"operations/list"'*)
      printf '{"protocol_version":"2.0","id":%s,"result":{"operations":[{"name":"echo","description":"echoes input","parameter_schema":{}}]}}\n' "$id" ;;
    *'"name":"echo"'*)
      printf '{"protocol_version":"2.0","id":%s,"result":{"content":[{"type":"text","text":"hello"}]}}\n' "$id" ;;
    *'"name":"explode"'*)
      printf '{"error":{"message":"boom"}}\n' ;;
    *'"name":"garbage"'*)
      printf 'not json at all\n' ;;
    *'"name":"noshape"'*)
      printf '{"id":%s,"result":{"rows":3}}\n' "$id" ;;
    *'"name":"neither"'*)
      printf '{"id":%s}\n' "$id" ;;
    *'"name":"binary"'*)
      printf '\377\376\n' ;;
    *'"name":"wrongid"'*)
      printf '{"id":999999,"result":{"content":[]}}\n' ;;
    *'"name":"die"'*)
      exit 0 ;;
    *'"name":"hang"'*)
      exec sleep 30 ;;
    *)
      printf '{"protocol_version":"2.0","id":%s,"error":{"message":"unknown method"}}\n' "$id" ;;
  esac
done
"#;

/// Rejects the handshake, answers nothing else.
pub const REJECT_HANDSHAKE: &str = r#"
while IFS= read -r line; do
  printf '%s\n' "$line" >> requests.log
  printf '{"error":{"message":"not ready","code":-32002}}\n'
done
"#;

/// Answers the handshake, then stops reading stdin for good.
pub const DEAF_AFTER_HANDSHAKE: &str = r#"
IFS= read -r line
printf '%s\n' "$line" >> requests.log
printf '{"protocol_version":"2.0","id":1,"result":{"name":"deaf","version":"1"}}\n'
exec sleep 30
"#;

/// Answers every request with a non-JSON diagnostic line.
pub const CHATTY: &str = r#"
while IFS= read -r line; do
  printf '%s\n' "$line" >> requests.log
  printf 'DEBUG: got a request\n'
done
"#;

pub struct MockServer {
    dir: TempDir,
}

impl MockServer {
    pub fn new(script: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("mock.sh"), script).unwrap();
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn target(&self, id: &str) -> ConnectionTarget {
        ConnectionTarget::new(id, "sh")
            .with_args(["mock.sh"])
            .with_working_dir(self.dir.path())
    }

    /// Every request received so far, across all spawned processes.
    pub fn requests(&self) -> Vec<Value> {
        match std::fs::read_to_string(self.dir.path().join("requests.log")) {
            Ok(raw) => raw
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn methods(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| r["method"].as_str().unwrap().to_string())
            .collect()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.requests()
            .iter()
            .map(|r| r["id"].as_u64().unwrap())
            .collect()
    }
}

pub fn fast_config() -> SessionConfig {
    SessionConfig {
        request_timeout_ms: 5_000,
        readiness: Readiness::Immediate,
    }
}

pub fn args(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Whether a process with `pid` still exists.
pub fn pid_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
