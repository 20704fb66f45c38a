//! Minimal line-delimited JSON dispatch over stdio.
//!
//! Each request line is `{"tool": "...", "args": {...}}`; each response
//! line is `{"ok": true, "result": ...}` or `{"ok": false, "error":
//! {"code": TAG, "message": ...}}`. Richer transports (MCP registration,
//! schemas) wrap [`crate::tools::ToolHandler`] directly.

use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;

use crate::tools::ToolHandler;

#[derive(Debug, Deserialize)]
struct ToolRequest {
  tool: String,
  #[serde(default)]
  args: Value,
}

/// Serve tool calls from stdin until EOF.
pub async fn run_stdio(handler: ToolHandler) -> std::io::Result<()> {
  let stdin = BufReader::new(tokio::io::stdin());
  let mut stdout = tokio::io::stdout();
  let mut lines = stdin.lines();

  info!("Tool server listening on stdio");
  while let Some(line) = lines.next_line().await? {
    if line.trim().is_empty() {
      continue;
    }
    let response = respond(&handler, &line).await;
    stdout.write_all(response.to_string().as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
  }

  handler.shutdown().await;
  info!("Tool server stopped (stdin closed)");
  Ok(())
}

async fn respond(handler: &ToolHandler, line: &str) -> Value {
  let request: ToolRequest = match serde_json::from_str(line) {
    Ok(request) => request,
    Err(e) => {
      return json!({
        "ok": false,
        "error": { "code": "INVALID_PATTERN", "message": format!("Malformed request: {e}") },
      });
    }
  };

  let args = if request.args.is_null() { json!({}) } else { request.args };
  match handler.handle(&request.tool, args).await {
    Ok(result) => json!({ "ok": true, "result": result }),
    Err(e) => json!({
      "ok": false,
      "error": { "code": e.tag().as_str(), "message": e.user_message() },
    }),
  }
}
