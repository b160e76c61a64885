//! Outbound side of the connection: responses, notifications and diagnostics.

use std::future::Future;

use anyhow::{Context, Result};
use epsilon_types::{Diagnostic, DocumentVersion};
use tokio::sync::mpsc;
use url::Url;

use crate::protocol::{LspDiagnostic, Notification, PublishDiagnosticsParams, Response};

pub(crate) const WRITER_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug)]
pub(crate) enum WriterCommand {
    Send(serde_json::Value),
    Shutdown,
}

/// Delivers a document's complete diagnostic set to the editor.
///
/// Each call replaces whatever was previously shown for `uri`; an empty slice
/// clears it.
pub trait DiagnosticPublisher: Send + Sync + 'static {
    fn publish(
        &self,
        uri: &Url,
        version: Option<DocumentVersion>,
        diagnostics: &[Diagnostic],
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Cloneable handle onto the writer task.
#[derive(Debug, Clone)]
pub struct Client {
    writer_tx: mpsc::Sender<WriterCommand>,
}

impl Client {
    pub(crate) fn new(writer_tx: mpsc::Sender<WriterCommand>) -> Self {
        Self { writer_tx }
    }

    async fn send(&self, frame: serde_json::Value) -> Result<()> {
        self.writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .map_err(|_| anyhow::anyhow!("writer channel closed"))
    }

    pub(crate) async fn respond(&self, response: Response) -> Result<()> {
        let frame = serde_json::to_value(&response).context("serializing response")?;
        self.send(frame).await
    }

    pub(crate) async fn notify(
        &self,
        method: &'static str,
        params: Option<serde_json::Value>,
    ) -> Result<()> {
        let notification = Notification::new(method, params);
        let frame = serde_json::to_value(&notification).context("serializing notification")?;
        self.send(frame).await
    }

    /// Flush queued frames and stop the writer task.
    pub(crate) async fn shutdown(&self) {
        let _ = self.writer_tx.send(WriterCommand::Shutdown).await;
    }
}

impl DiagnosticPublisher for Client {
    async fn publish(
        &self,
        uri: &Url,
        version: Option<DocumentVersion>,
        diagnostics: &[Diagnostic],
    ) -> Result<()> {
        let params = PublishDiagnosticsParams {
            uri: uri.clone(),
            version,
            diagnostics: diagnostics.iter().map(LspDiagnostic::from).collect(),
        };
        let params = serde_json::to_value(&params).context("serializing diagnostics")?;
        self.notify("textDocument/publishDiagnostics", Some(params))
            .await
    }
}
