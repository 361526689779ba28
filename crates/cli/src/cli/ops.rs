//! One-shot session commands: each opens a session against a configured
//! target, runs one operation and closes the session on every exit path.

use anyhow::Context;
use serde_json::{Map, Value};

use tw_client::{OperationDescriptor, RpcError, Session};
use tw_domain::config::Config;

fn open_session(config: &Config, target_id: &str) -> anyhow::Result<Session> {
    let target = config.target(target_id)?.clone();
    Ok(Session::open(target, config.session.clone()))
}

pub async fn handshake(config: &Config, target_id: &str) -> anyhow::Result<()> {
    let mut session = open_session(config, target_id)?;
    let result = session.handshake().await;
    session.close().await;

    let info = result.with_context(|| format!("handshake with `{target_id}`"))?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

pub async fn discover(config: &Config, target_id: &str, json: bool) -> anyhow::Result<()> {
    let mut session = open_session(config, target_id)?;
    let result = session.discover().await;
    session.close().await;

    let ops = result.with_context(|| format!("discovery on `{target_id}`"))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ops)?);
    } else {
        print!("{}", render_operations(&ops));
    }
    Ok(())
}

pub async fn invoke(
    config: &Config,
    target_id: &str,
    operation: &str,
    raw_args: &str,
) -> anyhow::Result<()> {
    let arguments = parse_arguments(raw_args)?;
    let mut session = open_session(config, target_id)?;
    let result = session.invoke(operation, arguments).await;
    session.close().await;

    let text = result.with_context(|| format!("invoking `{operation}` on `{target_id}`"))?;
    println!("{text}");
    Ok(())
}

/// Parse `--args` into an argument map. Only JSON objects are accepted.
pub fn parse_arguments(raw: &str) -> anyhow::Result<Map<String, Value>> {
    let value: Value = serde_json::from_str(raw).context("--args is not valid JSON")?;
    match value {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!("--args must be a JSON object, got {}", kind_of(&other)),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// One line per operation: name, then description when present.
pub fn render_operations(ops: &[OperationDescriptor]) -> String {
    if ops.is_empty() {
        return "(no operations)\n".to_string();
    }
    let width = ops.iter().map(|op| op.name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for op in ops {
        if op.description.is_empty() {
            out.push_str(&format!("{}\n", op.name));
        } else {
            out.push_str(&format!("{:<width$}  {}\n", op.name, op.description));
        }
    }
    out
}

/// Short hint printed after a failure, derived from the error kind.
pub fn hint(err: &anyhow::Error) -> Option<&'static str> {
    let rpc = err.downcast_ref::<RpcError>()?;
    if rpc.is_retryable() {
        Some("the server rejected the request; retrying may succeed")
    } else if rpc.requires_teardown() {
        Some("the subprocess is in an unknown state; check its stderr output")
    } else {
        None
    }
}
