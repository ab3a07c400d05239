//! MCP adapter over newline-delimited JSON-RPC 2.0.
//!
//! Requests are handled concurrently; a single writer task owns the output
//! stream so replies are never interleaved.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use serde_json::{Value, from_str, json, to_string};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::protocol::rpc::{METHOD_NOT_FOUND, SERVER_ERROR};
use crate::protocol::tools::SCREENSHOT_TOOL;
use crate::protocol::{RpcRequest, RpcResponse, ToolTarget, find_tool, tool_catalog};
use crate::relay::Relay;

use super::local_wait;

// ============================================================================
// Constants
// ============================================================================

/// MCP protocol revision reported by `initialize`.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name reported by `initialize`.
pub const SERVER_NAME: &str = "bridgemcp";

/// Longest accepted request line.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

const READ_CHUNK: usize = 8 * 1024;

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

// ============================================================================
// LineBuffer
// ============================================================================

/// Splits a byte stream into lines, keeping partial lines across reads.
///
/// Blank lines are skipped and a trailing `\r` is removed. Invalid UTF-8 is
/// replaced rather than rejected. A line longer than the limit is dropped up
/// to its newline.
#[derive(Debug)]
pub struct LineBuffer {
    buf: Vec<u8>,
    max_line: usize,
    discarding: bool,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_limit(MAX_LINE_BYTES)
    }
}

impl LineBuffer {
    /// Creates an empty buffer with the default line limit.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty buffer that drops lines over `max_line` bytes.
    #[must_use]
    pub fn with_limit(max_line: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_line,
            discarding: false,
        }
    }

    /// Appends `bytes` and returns every line they complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for piece in bytes.split_inclusive(|&b| b == b'\n') {
            let (body, terminated) = match piece.strip_suffix(b"\n") {
                Some(body) => (body, true),
                None => (piece, false),
            };

            if !self.discarding {
                if self.buf.len() + body.len() > self.max_line {
                    warn!(limit = self.max_line, "Discarding oversized input line");
                    self.buf.clear();
                    self.discarding = true;
                } else {
                    self.buf.extend_from_slice(body);
                }
            }

            if terminated {
                let line = std::mem::take(&mut self.buf);
                if !std::mem::take(&mut self.discarding)
                    && let Some(text) = clean_line(&line)
                {
                    lines.push(text);
                }
            }
        }

        lines
    }

    /// Returns the unterminated tail, if any.
    #[must_use]
    pub fn remainder(&self) -> &[u8] {
        &self.buf
    }
}

fn clean_line(line: &[u8]) -> Option<String> {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let text = String::from_utf8_lossy(line);
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

// ============================================================================
// StdioAdapter
// ============================================================================

/// Serves MCP on a reader/writer pair, normally stdin/stdout.
#[derive(Debug, Clone)]
pub struct StdioAdapter {
    relay: Arc<Relay>,
}

impl StdioAdapter {
    /// Creates an adapter bound to `relay`.
    #[must_use]
    pub fn new(relay: Arc<Relay>) -> Self {
        Self { relay }
    }

    /// Processes requests until `reader` reaches EOF.
    ///
    /// At EOF, requests already read are allowed to finish and their replies
    /// are written before returning. Requests still running after the longer
    /// of the call timeout and the wait cap are abandoned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if reading fails.
    pub async fn run<R, W>(&self, mut reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
        let writer_task = tokio::spawn(write_loop(writer, out_rx));

        let mut lines = LineBuffer::new();
        let mut tasks = JoinSet::new();
        let mut chunk = vec![0u8; READ_CHUNK];

        let outcome = loop {
            let n = match reader.read(&mut chunk).await {
                Ok(0) => break Ok(()),
                Ok(n) => n,
                Err(e) => break Err(Error::from(e)),
            };

            for line in lines.push(&chunk[..n]) {
                let request = match from_str::<RpcRequest>(&line) {
                    Ok(request) => request,
                    Err(e) => {
                        warn!(error = %e, "Ignoring unparseable line");
                        continue;
                    }
                };

                let relay = Arc::clone(&self.relay);
                let out_tx = out_tx.clone();
                tasks.spawn(async move {
                    if let Some(response) = handle_rpc(&relay, request).await {
                        match to_string(&response) {
                            Ok(text) => {
                                let _ = out_tx.send(text);
                            }
                            Err(e) => warn!(error = %e, "Failed to serialize reply"),
                        }
                    }
                });
            }

            while tasks.try_join_next().is_some() {}
        };

        if !lines.remainder().is_empty() {
            debug!(bytes = lines.remainder().len(), "Discarding unterminated input");
        }

        let config = self.relay.config();
        let grace = config.call_timeout.max(config.max_wait);
        let drained = timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await
        .is_ok();
        if !drained {
            warn!(abandoned = tasks.len(), "Abandoning requests still running at EOF");
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
        drop(out_tx);

        if let Err(e) = writer_task.await {
            warn!(error = %e, "Writer task failed");
        }

        info!("Stdio input closed");
        outcome
    }
}

async fn write_loop<W>(mut writer: W, mut out_rx: mpsc::UnboundedReceiver<String>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(mut line) = out_rx.recv().await {
        line.push('\n');
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            warn!(error = %e, "Failed to write reply");
            return;
        }
        if let Err(e) = writer.flush().await {
            warn!(error = %e, "Failed to flush reply");
            return;
        }
    }
    let _ = writer.flush().await;
}

// ============================================================================
// Dispatch
// ============================================================================

/// Handles one request. Returns `None` for notifications.
pub async fn handle_rpc(relay: &Relay, request: RpcRequest) -> Option<RpcResponse> {
    let RpcRequest {
        method, params, id, ..
    } = request;
    trace!(%method, "RPC request");

    let response = match method.as_str() {
        "initialize" => RpcResponse::result(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": { "name": SERVER_NAME, "version": env!("CARGO_PKG_VERSION") },
            }),
        ),

        "tools/list" => RpcResponse::result(id, json!({ "tools": tool_catalog() })),

        "tools/call" => match call_tool(relay, &params).await {
            Ok(result) => RpcResponse::result(id, result),
            Err(e) => {
                debug!(error = %e, "Tool call failed");
                RpcResponse::error(id, SERVER_ERROR, error_message(&e))
            }
        },

        "notifications/initialized" | "notifications/cancelled" => return None,

        other => RpcResponse::error(id, METHOD_NOT_FOUND, format!("Method not found: {other}")),
    };

    Some(response)
}

async fn call_tool(relay: &Relay, params: &Value) -> Result<Value> {
    let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
    let arguments = match params.get("arguments") {
        Some(Value::Object(args)) => Value::Object(args.clone()),
        _ => json!({}),
    };

    let Some(tool) = find_tool(name) else {
        return Err(Error::bad_request(format!("Unknown tool: {name}")));
    };

    let data = match tool.target {
        ToolTarget::Wait => local_wait(arguments.get("time"), relay.config().max_wait).await,
        ToolTarget::Peer(action) => relay.registry().submit(action, arguments).await?,
    };

    Ok(json!({ "content": [content_item(name, &data)?] }))
}

/// Request errors carry their own message; everything else its display text.
fn error_message(err: &Error) -> String {
    match err {
        Error::BadRequest { message } => message.clone(),
        other => other.to_string(),
    }
}

/// Wraps tool output as one MCP content item.
fn content_item(tool: &str, data: &Value) -> Result<Value> {
    if tool == SCREENSHOT_TOOL
        && let Some(url) = data.get("screenshot").and_then(Value::as_str)
    {
        let base64 = url.strip_prefix(PNG_DATA_URL_PREFIX).unwrap_or(url);
        return Ok(json!({ "type": "image", "data": base64, "mimeType": "image/png" }));
    }

    Ok(json!({ "type": "text", "text": to_string(data)? }))
}

// ============================================================================
// Tests
// ============================================================================
