//! A minimal stand-in for a guest endpoint's control socket, for exercising
//! `vmswitch-core`'s attach/regulator/reader machinery end-to-end without a
//! real guest process. Mirrors the shape of the teacher's own mock server
//! test helpers (bind, accept one connection, script responses).

use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

mod recording_adapters;
pub use recording_adapters::{Call, RecordingConsoleBackend, RecordingConsoleFrontend};

/// One decoded inbound request frame: `{"id": N, "execute": "...", "arguments": {...}}`.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub id: Option<i64>,
    pub execute: String,
    pub arguments: serde_json::Value,
}

/// Binds a Unix stream socket at a `slot-<N>` path, accepts exactly one
/// connection, and exposes the decoded requests it receives plus methods to
/// script canned `"return"`/`"event"` responses.
pub struct MockGuest {
    requests_rx: mpsc::UnboundedReceiver<RecordedRequest>,
    writer_tx: mpsc::UnboundedSender<Vec<u8>>,
    _task: JoinHandle<()>,
}

impl MockGuest {
    /// Bind the socket and start accepting in the background. `path` must
    /// not already exist.
    pub async fn bind(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let listener = UnixListener::bind(path.as_ref())?;

        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (writer_tx, mut writer_rx) = mpsc::unbounded_channel::<Vec<u8>>();

        let task = tokio::spawn(async move {
            let Ok((stream, _)) = listener.accept().await else { return };
            let (mut read_half, mut write_half) = stream.into_split();

            let writer_task = tokio::spawn(async move {
                while let Some(bytes) = writer_rx.recv().await {
                    if write_half.write_all(&bytes).await.is_err() {
                        break;
                    }
                }
            });

            let mut buf = Vec::new();
            let mut chunk = [0_u8; 4096];
            loop {
                match read_half.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
                while let Some(raw) = take_frame(&mut buf) {
                    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&raw) {
                        let id = value.get("id").and_then(serde_json::Value::as_i64);
                        let execute = value
                            .get("execute")
                            .and_then(serde_json::Value::as_str)
                            .unwrap_or_default()
                            .to_owned();
                        let arguments = value.get("arguments").cloned().unwrap_or(serde_json::Value::Null);
                        if requests_tx.send(RecordedRequest { id, execute, arguments }).is_err() {
                            break;
                        }
                    }
                }
            }
            writer_task.abort();
        });

        Ok(Self { requests_rx, writer_tx, _task: task })
    }

    /// Wait for the next request the core sent.
    pub async fn next_request(&mut self) -> Option<RecordedRequest> {
        self.requests_rx.recv().await
    }

    /// Send `{"id": id, "return": value}`.
    pub fn reply(&self, id: i64, value: serde_json::Value) {
        self.send_frame(&serde_json::json!({"id": id, "return": value}));
    }

    /// Send `{"event": name, "data": data}`.
    pub fn emit_event(&self, name: &str, data: serde_json::Value) {
        self.send_frame(&serde_json::json!({"event": name, "data": data}));
    }

    /// Send an arbitrary frame body, for constructing protocol-violation
    /// scenarios (e.g. a `return` whose `id` matches nothing pending).
    pub fn send_raw(&self, value: &serde_json::Value) {
        self.send_frame(value);
    }

    fn send_frame(&self, value: &serde_json::Value) {
        let mut bytes = serde_json::to_vec(value).expect("test fixture always serializes");
        bytes.extend_from_slice(b"\r\n");
        let _ = self.writer_tx.send(bytes);
    }
}

/// Pull one complete top-level JSON object out of `buf`, draining the bytes
/// it occupied. Tracks brace depth and string/escape state, same as the
/// core's own restartable decoder, so the mock never needs a line
/// delimiter to do its job.
fn take_frame(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let start = buf.iter().position(|&b| !b.is_ascii_whitespace())?;
    if start > 0 {
        buf.drain(..start);
    }
    if buf.first() != Some(&b'{') {
        return None;
    }

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    for (i, &b) in buf.iter().enumerate() {
        if in_string {
            if escape {
                escape = false;
            } else if b == b'\\' {
                escape = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    let end = i + 1;
                    return Some(buf.drain(..end).collect());
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_request_and_a_reply() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slot-1");
        let mut guest = MockGuest::bind(&path).await.unwrap();

        let client = tokio::net::UnixStream::connect(&path).await.unwrap();
        let (mut read_half, mut write_half) = client.into_split();

        write_half.write_all(b"{\"id\":1,\"execute\":\"qmp_capabilities\"}\r\n").await.unwrap();
        let req = guest.next_request().await.unwrap();
        assert_eq!(req.id, Some(1));
        assert_eq!(req.execute, "qmp_capabilities");

        guest.reply(1, serde_json::json!({}));
        let mut buf = [0_u8; 256];
        let n = read_half.read(&mut buf).await.unwrap();
        let text = String::from_utf8_lossy(&buf[..n]);
        assert!(text.contains("\"id\":1"));
        assert!(text.contains("\"return\""));
    }
}
