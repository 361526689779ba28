//! Line framing: one envelope per `\n`-terminated line.
//!
//! These helpers only need `AsyncWrite` / `AsyncBufRead`, so they work on
//! child pipes as well as any other duplex byte stream.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::TransportError;
use crate::protocol::{RequestEnvelope, ResponseEnvelope};

/// Serialize `request` and write it as a single line, then flush.
///
/// The line is assembled in memory first so the peer never observes a
/// partial envelope from this side.
pub async fn write_envelope<W>(writer: &mut W, request: &RequestEnvelope) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let mut line = serde_json::to_vec(request)?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Read exactly one line, without its terminator.
///
/// End of stream is reported as [`TransportError::Closed`].
pub async fn read_line<R>(reader: &mut R) -> Result<String, TransportError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line).await?;
    if bytes_read == 0 {
        return Err(TransportError::Closed);
    }
    let trimmed_len = line.trim_end_matches(['\n', '\r']).len();
    line.truncate(trimmed_len);
    Ok(line)
}

/// Parse one reply line. The raw line is kept in the error for diagnosis.
pub fn parse_response(line: &str) -> Result<ResponseEnvelope, TransportError> {
    if line.trim().is_empty() {
        return Err(TransportError::EmptyReply);
    }
    serde_json::from_str(line).map_err(|source| TransportError::Malformed {
        line: line.to_string(),
        source,
    })
}
