// src/daemon/framing.rs

//! Newline-delimited JSON frames over any async byte stream.

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Write `message` as one line and flush.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_string(message).context("encoding frame")?;
    line.push('\n');
    writer
        .write_all(line.as_bytes())
        .await
        .context("writing frame")?;
    writer.flush().await.context("flushing frame")?;
    Ok(())
}

/// Read the next frame. `None` at end of stream; blank lines are skipped.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    loop {
        line.clear();
        let read = reader.read_line(&mut line).await.context("reading frame")?;
        if read == 0 {
            return Ok(None);
        }
        if line.trim().is_empty() {
            continue;
        }
        let message = serde_json::from_str(line.trim_end())
            .with_context(|| format!("decoding frame: {}", line.trim_end()))?;
        return Ok(Some(message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::daemon::messages::DaemonRequest;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn frames_cross_a_pipe_in_order() {
        let (mut write_half, server) = tokio::io::duplex(1024);
        let mut reader = BufReader::new(server);

        write_frame(&mut write_half, &DaemonRequest::Status).await.unwrap();
        write_frame(
            &mut write_half,
            &DaemonRequest::Glob {
                patterns: vec!["**/*.rs".to_string()],
            },
        )
        .await
        .unwrap();
        drop(write_half);

        let first: Option<DaemonRequest> = read_frame(&mut reader).await.unwrap();
        assert_eq!(first, Some(DaemonRequest::Status));
        let second: Option<DaemonRequest> = read_frame(&mut reader).await.unwrap();
        assert!(matches!(second, Some(DaemonRequest::Glob { .. })));
    }

    #[tokio::test]
    async fn garbage_is_an_error() {
        let mut reader = BufReader::new(&b"\n{not json}\n"[..]);
        let result: Result<Option<DaemonRequest>> = read_frame(&mut reader).await;
        assert!(result.is_err());
    }
}
