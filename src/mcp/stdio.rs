//! MCP over stdio.
//!
//! rmcp owns the JSON-RPC session. Input passes through a line filter first:
//! the rmcp reader stops at the first line it cannot decode, so anything that
//! is not a client JSON-RPC message is logged and dropped here instead.

use anyhow::Context;
use rmcp::model::ClientJsonRpcMessage;
use rmcp::ServiceExt;
use serde_json::Value;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::mcp::server::McpSshService;

const INBOUND_BUFFER: usize = 64 * 1024;

/// Serve MCP requests read from `reader`, writing responses and progress
/// notifications to `writer`, until the reader reaches end of input.
pub async fn serve<R, W>(service: McpSshService, reader: R, writer: W) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (inbound, filtered) = tokio::io::duplex(INBOUND_BUFFER);
    let filter = tokio::spawn(async move {
        if let Err(e) = forward_client_messages(reader, inbound).await {
            tracing::error!("Failed to read input: {}", e);
        }
    });

    let running = service
        .serve((filtered, writer))
        .await
        .context("MCP initialization failed")?;
    let quit = running.waiting().await;
    filter.abort();

    let reason = quit.context("MCP service task failed")?;
    tracing::info!("Input closed, shutting down ({:?})", reason);
    Ok(())
}

/// Copy lines that decode as client JSON-RPC messages from `reader` to
/// `inbound`. Blank lines, invalid UTF-8, malformed JSON and messages with a
/// null id are dropped.
async fn forward_client_messages<R, W>(reader: R, mut inbound: W) -> io::Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }

        let message = line.trim_ascii();
        if message.is_empty() {
            continue;
        }

        match check_message(message) {
            Ok(()) => {
                inbound.write_all(message).await?;
                inbound.write_all(b"\n").await?;
                inbound.flush().await?;
            }
            Err(e) => tracing::warn!("Discarding input line ({} bytes): {}", message.len(), e),
        }
    }

    inbound.shutdown().await
}

fn check_message(line: &[u8]) -> anyhow::Result<()> {
    let value: Value = serde_json::from_slice(line)?;
    // A null id can be neither answered nor treated as a notification.
    if value.get("id").is_some_and(Value::is_null) {
        anyhow::bail!("request id is null");
    }
    serde_json::from_value::<ClientJsonRpcMessage>(value)?;
    Ok(())
}
