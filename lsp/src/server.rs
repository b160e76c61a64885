//! Dispatch loop: owns the connection, the document store and the validator.
//!
//! Client frames arrive from a reader task and finished validation runs from
//! the validator; both are handled one at a time on this loop.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use url::Url;

use crate::analyzer::{Analyzer, ProcessAnalyzer};
use crate::codec::{FrameReader, FrameWriter};
use crate::completion::{self, CompletionItem};
use crate::documents::DocumentStore;
use crate::protocol::{
    self, DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    DidSaveTextDocumentParams, INVALID_PARAMS, INVALID_REQUEST, Incoming, METHOD_NOT_FOUND,
    PARSE_ERROR, Response, SERVER_NOT_INITIALIZED,
};
use crate::publisher::{Client, WRITER_CHANNEL_CAPACITY, WriterCommand};
use crate::snapshot::SnapshotMaterializer;
use crate::types::{LspConfig, ServerStopReason};
use crate::validation::{ValidationContext, Validator};

const FRAME_CHANNEL_CAPACITY: usize = 64;

/// What the reader task hands to the dispatch loop.
#[derive(Debug)]
enum Inbound {
    Frame(Value),
    /// A well-framed body that is not JSON. The connection stays usable.
    Unparseable(serde_json::Error),
    /// Framing broke; nothing more can be read.
    Failed(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Uninitialized,
    Running,
    ShuttingDown,
}

/// Serve one client connection with the configured analyzer process.
pub async fn serve<R, W>(input: R, output: W, config: &LspConfig) -> Result<ServerStopReason>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let analyzer = ProcessAnalyzer::new(config.analyzer.clone());
    serve_with_analyzer(input, output, config, analyzer).await
}

/// Serve one client connection, validating with `analyzer`.
pub async fn serve_with_analyzer<R, W, A>(
    input: R,
    output: W,
    config: &LspConfig,
    analyzer: A,
) -> Result<ServerStopReason>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
    A: Analyzer,
{
    let (writer_tx, writer_rx) = mpsc::channel(WRITER_CHANNEL_CAPACITY);
    let writer_handle = tokio::spawn(write_loop(output, writer_rx));

    let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
    let reader_handle = tokio::spawn(read_loop(input, frame_tx));

    let client = Client::new(writer_tx);
    let materializer =
        SnapshotMaterializer::new(config.snapshot_dir(), &config.snapshot_extension);
    let validator = Validator::new(ValidationContext {
        analyzer,
        publisher: client.clone(),
        materializer,
        settings: config.into(),
    });

    let mut server = Server::new(client.clone(), validator);
    let result = server.run(frame_rx).await;

    // Queued frames are written before the writer stops.
    client.shutdown().await;
    let _ = writer_handle.await;
    reader_handle.abort();

    match &result {
        Ok(reason) => tracing::info!(?reason, "Server stopped"),
        Err(e) => tracing::warn!("Server stopped: {e:#}"),
    }
    result
}

async fn read_loop<R: AsyncRead + Unpin>(input: R, frame_tx: mpsc::Sender<Inbound>) {
    let mut reader = FrameReader::new(input);
    loop {
        let inbound = match reader.read_body().await {
            Ok(Some(body)) => match serde_json::from_slice(&body) {
                Ok(frame) => Inbound::Frame(frame),
                Err(e) => Inbound::Unparseable(e),
            },
            Ok(None) => break,
            Err(e) => {
                let _ = frame_tx.send(Inbound::Failed(e)).await;
                break;
            }
        };
        if frame_tx.send(inbound).await.is_err() {
            break;
        }
    }
}

async fn write_loop<W: AsyncWrite + Unpin>(output: W, mut writer_rx: mpsc::Receiver<WriterCommand>) {
    let mut writer = FrameWriter::new(output);
    while let Some(cmd) = writer_rx.recv().await {
        match cmd {
            WriterCommand::Send(frame) => {
                if let Err(e) = writer.write_frame(&frame).await {
                    tracing::warn!("Client write error: {e:#}");
                    break;
                }
            }
            WriterCommand::Shutdown => break,
        }
    }
}

/// What a request handler answers with.
enum Reply {
    Result(Value),
    Error(i64, String),
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(params)
}

struct Server<A: Analyzer> {
    client: Client,
    documents: DocumentStore,
    validator: Validator<A, Client>,
    state: Lifecycle,
}

impl<A: Analyzer> Server<A> {
    fn new(client: Client, validator: Validator<A, Client>) -> Self {
        Self {
            client,
            documents: DocumentStore::new(),
            validator,
            state: Lifecycle::Uninitialized,
        }
    }

    async fn run(
        &mut self,
        mut frames: mpsc::Receiver<Inbound>,
    ) -> Result<ServerStopReason> {
        loop {
            tokio::select! {
                inbound = frames.recv() => {
                    let frame = match inbound {
                        Some(Inbound::Frame(frame)) => frame,
                        Some(Inbound::Unparseable(e)) => {
                            self.reject_unparseable(&e).await?;
                            continue;
                        }
                        Some(Inbound::Failed(e)) => return Err(e.context("reading client message")),
                        None => return Ok(ServerStopReason::InputClosed),
                    };
                    if let Some(reason) = self.handle_frame(frame).await? {
                        return Ok(reason);
                    }
                }
                Some(outcome) = self.validator.next_outcome() => {
                    self.validator.complete_run(outcome, &self.documents).await;
                }
            }
        }
    }

    /// Answer a body that is not JSON with a parse error; its id is unknown.
    async fn reject_unparseable(&self, error: &serde_json::Error) -> Result<()> {
        tracing::warn!("Discarding client message that is not JSON: {error}");
        self.client
            .respond(Response::error(
                Value::Null,
                PARSE_ERROR,
                format!("Parse error: {error}"),
            ))
            .await
            .context("sending response")
    }

    async fn handle_frame(&mut self, frame: Value) -> Result<Option<ServerStopReason>> {
        let Some(incoming) = Incoming::classify(frame) else {
            tracing::debug!("Ignoring frame that is not a JSON-RPC message");
            return Ok(None);
        };

        match incoming {
            Incoming::Request { id, method, params } => {
                let response = match self.handle_request(&method, params) {
                    Reply::Result(result) => Response::ok(id, result),
                    Reply::Error(code, message) => {
                        tracing::debug!(%method, code, "Request failed: {message}");
                        Response::error(id, code, message)
                    }
                };
                self.client
                    .respond(response)
                    .await
                    .context("sending response")?;
                Ok(None)
            }
            Incoming::Notification { method, params } => {
                Ok(self.handle_notification(&method, params).await)
            }
            Incoming::Response { id } => {
                tracing::trace!(%id, "Ignoring response from client");
                Ok(None)
            }
        }
    }

    fn handle_request(&mut self, method: &str, params: Value) -> Reply {
        match (self.state, method) {
            (Lifecycle::Uninitialized, "initialize") => {
                tracing::info!(
                    client = ?params.get("clientInfo"),
                    "Initialize request received"
                );
                self.state = Lifecycle::Running;
                Reply::Result(protocol::initialize_result())
            }
            (Lifecycle::Uninitialized, _) => Reply::Error(
                SERVER_NOT_INITIALIZED,
                "Server not initialized".to_string(),
            ),
            (Lifecycle::ShuttingDown, _) => Reply::Error(
                INVALID_REQUEST,
                "Server is shutting down".to_string(),
            ),
            (Lifecycle::Running, "initialize") => Reply::Error(
                INVALID_REQUEST,
                "Server already initialized".to_string(),
            ),
            (Lifecycle::Running, "shutdown") => {
                tracing::info!("Shutdown requested");
                self.state = Lifecycle::ShuttingDown;
                Reply::Result(Value::Null)
            }
            (Lifecycle::Running, "textDocument/completion") => {
                Reply::Result(serde_json::json!(completion::keyword_completions()))
            }
            (Lifecycle::Running, "completionItem/resolve") => {
                match parse_params::<CompletionItem>(params) {
                    Ok(item) => Reply::Result(serde_json::json!(completion::resolve(item))),
                    Err(e) => Reply::Error(INVALID_PARAMS, format!("Invalid completion item: {e}")),
                }
            }
            (Lifecycle::Running, _) => {
                Reply::Error(METHOD_NOT_FOUND, format!("Method not found: {method}"))
            }
        }
    }

    async fn handle_notification(
        &mut self,
        method: &str,
        params: Value,
    ) -> Option<ServerStopReason> {
        if method == "exit" {
            return Some(if self.state == Lifecycle::ShuttingDown {
                ServerStopReason::Exited
            } else {
                ServerStopReason::ExitedWithoutShutdown
            });
        }
        if self.state != Lifecycle::Running {
            tracing::debug!(%method, state = ?self.state, "Dropping notification");
            return None;
        }

        let handled = match method {
            "initialized" => {
                tracing::info!("Client initialized");
                Ok(())
            }
            "textDocument/didOpen" => parse_params(params).map(|p| self.did_open(p)),
            "textDocument/didChange" => parse_params(params).map(|p| self.did_change(p)),
            "textDocument/didSave" => parse_params(params).map(|p| self.did_save(p)),
            "textDocument/didClose" => match parse_params(params) {
                Ok(p) => {
                    self.did_close(p).await;
                    Ok(())
                }
                Err(e) => Err(e),
            },
            m if m.starts_with("$/") => Ok(()),
            _ => {
                tracing::trace!(%method, "Ignoring notification");
                Ok(())
            }
        };
        if let Err(e) = handled {
            tracing::warn!(%method, "Invalid notification params: {e}");
        }
        None
    }

    fn did_open(&mut self, params: DidOpenTextDocumentParams) {
        let item = params.text_document;
        tracing::info!(uri = %item.uri, version = %item.version, "Document opened");
        let uri = item.uri.clone();
        self.documents
            .open(item.uri, item.language_id, item.version, item.text);
        self.validate(&uri);
    }

    fn did_change(&mut self, params: DidChangeTextDocumentParams) {
        let doc = params.text_document;
        if self
            .documents
            .change(&doc.uri, doc.version, &params.content_changes)
            .is_none()
        {
            tracing::warn!(uri = %doc.uri, "Change for document that is not open");
            return;
        }
        self.validate(&doc.uri);
    }

    fn did_save(&mut self, params: DidSaveTextDocumentParams) {
        self.validate(&params.text_document.uri);
    }

    async fn did_close(&mut self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        if self.documents.close(&uri).is_none() {
            tracing::debug!(uri = %uri, "Close for document that is not open");
        }
        tracing::info!(uri = %uri, "Document closed");
        self.validator.document_closed(&uri).await;
    }

    fn validate(&self, uri: &Url) {
        let Some(doc) = self.documents.get(uri) else {
            tracing::debug!(uri = %uri, "Not validating unknown document");
            return;
        };
        if let Err(e) = self.validator.start_run(doc) {
            tracing::warn!(uri = %uri, version = %doc.version(), "Validation aborted: {e}");
        }
    }
}
