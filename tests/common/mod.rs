//! Shared test utilities and fixtures
//!
//! Drives a full server over in-memory pipes, speaking the same framing the
//! editor does.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::time::Duration;

use epsilon_lsp::codec::{FrameReader, FrameWriter};
use epsilon_lsp::{AnalyzerConfig, LspConfig, ServerStopReason};
use serde_json::Value;
use tokio::io::{self, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;
use tokio::time;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Upper bound on any single wait for the server.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(10);

pub const MAIN_URI: &str = "file:///work/main.epsilon";

/// Config whose analyzer is `sh -c <script>`; the snapshot path arrives as `$1`.
pub fn shell_analyzer_config(script: &str, snapshot_dir: &Path) -> LspConfig {
    LspConfig {
        snapshot_dir: Some(snapshot_dir.to_path_buf()),
        analyzer: AnalyzerConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "analyzer".to_string()],
            timeout_ms: Some(10_000),
        },
        ..LspConfig::default()
    }
}

/// Stands in for the editor.
pub struct TestClient {
    to_server: DuplexStream,
    reader: FrameReader<DuplexStream>,
    /// Frames read while waiting for something else.
    buffered: VecDeque<Value>,
    server: Option<JoinHandle<anyhow::Result<ServerStopReason>>>,
    next_id: u64,
    snapshots: tempfile::TempDir,
}

impl TestClient {
    /// Start a server whose analyzer runs `script` under `sh`.
    pub fn start(script: &str) -> Self {
        let snapshots = tempfile::tempdir().expect("snapshot dir");
        let config = shell_analyzer_config(script, snapshots.path());
        Self::start_with(config, snapshots)
    }

    pub fn start_with(config: LspConfig, snapshots: tempfile::TempDir) -> Self {
        let (to_server, server_input) = io::duplex(PIPE_CAPACITY);
        let (server_output, from_server) = io::duplex(PIPE_CAPACITY);
        let server = tokio::spawn(async move {
            epsilon_lsp::serve(server_input, server_output, &config).await
        });

        Self {
            to_server,
            reader: FrameReader::new(from_server),
            buffered: VecDeque::new(),
            server: Some(server),
            next_id: 1,
            snapshots,
        }
    }

    /// Start and complete the `initialize` handshake.
    pub async fn initialized(script: &str) -> Self {
        let mut client = Self::start(script);
        let result = client.request("initialize", serde_json::json!({ "capabilities": {} })).await;
        assert!(result.get("result").is_some(), "initialize failed: {result}");
        client.notify("initialized", serde_json::json!({})).await;
        client
    }

    pub fn snapshot_dir(&self) -> &Path {
        self.snapshots.path()
    }

    pub async fn send(&mut self, frame: Value) {
        FrameWriter::new(&mut self.to_server)
            .write_frame(&frame)
            .await
            .expect("write frame");
    }

    pub async fn notify(&mut self, method: &str, params: Value) {
        self.send(serde_json::json!({"jsonrpc": "2.0", "method": method, "params": params}))
            .await;
    }

    /// Send a request and wait for its response, buffering anything else.
    pub async fn request(&mut self, method: &str, params: Value) -> Value {
        let id = self.next_id;
        self.next_id += 1;
        self.send(serde_json::json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await;
        self.wait_for(|frame| frame.get("method").is_none() && frame["id"] == id)
            .await
    }

    /// Next `publishDiagnostics` notification, in arrival order.
    pub async fn diagnostics(&mut self) -> Value {
        let frame = self
            .wait_for(|frame| frame["method"] == "textDocument/publishDiagnostics")
            .await;
        frame["params"].clone()
    }

    /// Buffered `publishDiagnostics` params received so far but not yet consumed.
    pub fn pending_diagnostics(&self) -> Vec<Value> {
        self.buffered
            .iter()
            .filter(|f| f["method"] == "textDocument/publishDiagnostics")
            .map(|f| f["params"].clone())
            .collect()
    }

    pub async fn wait_for(
        &mut self,
        matches: impl Fn(&Value) -> bool,
    ) -> Value {
        if let Some(pos) = self.buffered.iter().position(&matches) {
            return self.buffered.remove(pos).expect("buffered frame");
        }
        loop {
            let frame = time::timeout(RECV_TIMEOUT, self.reader.read_frame())
                .await
                .expect("timed out waiting for server")
                .expect("read frame")
                .expect("server closed its output");
            if matches(&frame) {
                return frame;
            }
            self.buffered.push_back(frame);
        }
    }

    pub async fn open(&mut self, uri: &str, version: i32, text: &str) {
        self.notify(
            "textDocument/didOpen",
            serde_json::json!({"textDocument": {
                "uri": uri, "languageId": "epsilon", "version": version, "text": text
            }}),
        )
        .await;
    }

    pub async fn replace(&mut self, uri: &str, version: i32, text: &str) {
        self.notify(
            "textDocument/didChange",
            serde_json::json!({
                "textDocument": { "uri": uri, "version": version },
                "contentChanges": [{ "text": text }]
            }),
        )
        .await;
    }

    pub async fn edit(
        &mut self,
        uri: &str,
        version: i32,
        (start_line, start_char): (u32, u32),
        (end_line, end_char): (u32, u32),
        text: &str,
    ) {
        self.notify(
            "textDocument/didChange",
            serde_json::json!({
                "textDocument": { "uri": uri, "version": version },
                "contentChanges": [{
                    "range": {
                        "start": { "line": start_line, "character": start_char },
                        "end": { "line": end_line, "character": end_char }
                    },
                    "text": text
                }]
            }),
        )
        .await;
    }

    pub async fn close(&mut self, uri: &str) {
        self.notify(
            "textDocument/didClose",
            serde_json::json!({"textDocument": { "uri": uri }}),
        )
        .await;
    }

    /// Send `shutdown` + `exit` and return how the server stopped.
    pub async fn shutdown(mut self) -> ServerStopReason {
        let resp = self.request("shutdown", Value::Null).await;
        assert!(resp["result"].is_null(), "shutdown failed: {resp}");
        self.notify("exit", Value::Null).await;
        self.join().await
    }

    /// Wait for the server task to finish.
    pub async fn join(&mut self) -> ServerStopReason {
        let handle = self.server.take().expect("server already joined");
        time::timeout(RECV_TIMEOUT, handle)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
            .expect("server failed")
    }

    /// Close the input pipe without `exit`.
    pub async fn hang_up(mut self) -> anyhow::Result<ServerStopReason> {
        let handle = self.server.take().expect("server already joined");
        drop(self);
        time::timeout(RECV_TIMEOUT, handle)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
    }

    /// Write raw bytes to the server input, bypassing framing.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.to_server.write_all(bytes).await.expect("write raw");
    }

    /// Take the server handle, for tests that inspect a failed run.
    pub fn take_server(&mut self) -> JoinHandle<anyhow::Result<ServerStopReason>> {
        self.server.take().expect("server already joined")
    }
}

/// Number of snapshot artifacts still on disk.
pub fn leftover_snapshots(dir: &Path) -> usize {
    fs::read_dir(dir).map(Iterator::count).unwrap_or(0)
}
