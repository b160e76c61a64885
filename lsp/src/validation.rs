//! Validation orchestrator: materialize, analyze, parse, publish, discard.
//!
//! Only the analyzer invocation leaves the dispatch loop. Each run's result
//! comes back through a channel and is gated there, so the per-document
//! publish state is never touched concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use epsilon_types::{DocumentVersion, SessionId};
use tokio::sync::mpsc;
use url::Url;

use crate::analyzer::{Analyzer, AnalyzerError, AnalyzerOutput};
use crate::documents::{Document, DocumentStore};
use crate::parser::{DiagnosticParser, refine_spans};
use crate::publisher::DiagnosticPublisher;
use crate::snapshot::{SnapshotError, SnapshotHandle, SnapshotMaterializer};
use crate::types::LspConfig;

const OUTCOME_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct ValidationSettings {
    pub source: String,
    pub precise_spans: bool,
}

impl From<&LspConfig> for ValidationSettings {
    fn from(config: &LspConfig) -> Self {
        Self {
            source: config.source.clone(),
            precise_spans: config.precise_spans,
        }
    }
}

/// Everything a [`Validator`] needs, assembled once at startup.
pub struct ValidationContext<A, P> {
    pub analyzer: A,
    pub publisher: P,
    pub materializer: SnapshotMaterializer,
    pub settings: ValidationSettings,
}

/// Identifies the document state a run was started from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTicket {
    pub uri: Url,
    pub session: SessionId,
    pub version: DocumentVersion,
}

/// A finished analysis, waiting to be gated and published.
#[derive(Debug)]
pub struct RunOutcome {
    pub ticket: RunTicket,
    pub snapshot: SnapshotHandle,
    /// Text the snapshot was written from, used for span refinement.
    pub text: String,
    pub analysis: Result<AnalyzerOutput, AnalyzerError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunDisposition {
    Published { count: usize },
    /// Document closed, reopened, or a newer run already published.
    Superseded,
    /// The run failed; nothing was published and prior diagnostics stand.
    Failed,
}

pub struct Validator<A, P> {
    analyzer: Arc<A>,
    publisher: P,
    materializer: SnapshotMaterializer,
    parser: DiagnosticParser,
    precise_spans: bool,
    /// Last published (session, version) per document.
    published: HashMap<Url, (SessionId, DocumentVersion)>,
    outcome_tx: mpsc::Sender<RunOutcome>,
    outcome_rx: mpsc::Receiver<RunOutcome>,
}

impl<A: Analyzer, P: DiagnosticPublisher> Validator<A, P> {
    #[must_use]
    pub fn new(context: ValidationContext<A, P>) -> Self {
        let (outcome_tx, outcome_rx) = mpsc::channel(OUTCOME_CHANNEL_CAPACITY);
        Self {
            analyzer: Arc::new(context.analyzer),
            publisher: context.publisher,
            materializer: context.materializer,
            parser: DiagnosticParser::new(context.settings.source),
            precise_spans: context.settings.precise_spans,
            published: HashMap::new(),
            outcome_tx,
            outcome_rx,
        }
    }

    /// Snapshot `doc` and launch the analyzer on it in the background.
    ///
    /// A materialization failure aborts the run before the analyzer is
    /// invoked; nothing is left on disk.
    pub fn start_run(&self, doc: &Document) -> Result<RunTicket, SnapshotError> {
        let ticket = RunTicket {
            uri: doc.uri().clone(),
            session: doc.session(),
            version: doc.version(),
        };
        let snapshot = self.materializer.materialize(doc.text())?;
        tracing::debug!(
            uri = %ticket.uri,
            version = %ticket.version,
            language = doc.language_id(),
            snapshot = %snapshot.path().display(),
            "Validation run started"
        );

        let analyzer = Arc::clone(&self.analyzer);
        let outcome_tx = self.outcome_tx.clone();
        let text = doc.text().to_string();
        let run_ticket = ticket.clone();
        tokio::spawn(async move {
            let analysis = analyzer.check(snapshot.path()).await;
            let outcome = RunOutcome {
                ticket: run_ticket,
                snapshot,
                text,
                analysis,
            };
            // The receiver only goes away with the server; the snapshot is
            // then removed when the outcome is dropped.
            let _ = outcome_tx.send(outcome).await;
        });

        Ok(ticket)
    }

    /// Wait for the next finished run.
    pub async fn next_outcome(&mut self) -> Option<RunOutcome> {
        self.outcome_rx.recv().await
    }

    /// Gate, parse and publish a finished run, then discard its snapshot.
    pub async fn complete_run(
        &mut self,
        outcome: RunOutcome,
        documents: &DocumentStore,
    ) -> RunDisposition {
        let RunOutcome {
            ticket,
            snapshot,
            text,
            analysis,
        } = outcome;

        let disposition = if self.is_current(&ticket, documents) {
            self.publish_run(&ticket, &text, analysis).await
        } else {
            tracing::debug!(
                uri = %ticket.uri,
                version = %ticket.version,
                "Dropping superseded validation run"
            );
            RunDisposition::Superseded
        };

        let path = snapshot.path().to_path_buf();
        if let Err(e) = snapshot.discard() {
            tracing::warn!(snapshot = %path.display(), "Failed to remove snapshot: {e}");
        }
        disposition
    }

    async fn publish_run(
        &mut self,
        ticket: &RunTicket,
        text: &str,
        analysis: Result<AnalyzerOutput, AnalyzerError>,
    ) -> RunDisposition {
        let output = match analysis {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(uri = %ticket.uri, version = %ticket.version, "Validation failed: {e}");
                return RunDisposition::Failed;
            }
        };

        let mut diagnostics = self.parser.parse(&output.stderr);
        if self.precise_spans {
            diagnostics = refine_spans(diagnostics, text);
        }

        if let Err(e) = self
            .publisher
            .publish(&ticket.uri, Some(ticket.version), &diagnostics)
            .await
        {
            tracing::warn!(uri = %ticket.uri, "Failed to publish diagnostics: {e:#}");
            return RunDisposition::Failed;
        }

        for diag in &diagnostics {
            tracing::trace!("{}", diag.display_with_uri(ticket.uri.as_str()));
        }
        tracing::debug!(
            uri = %ticket.uri,
            version = %ticket.version,
            count = diagnostics.len(),
            status = ?output.status,
            "Published diagnostics"
        );
        self.published
            .insert(ticket.uri.clone(), (ticket.session, ticket.version));
        RunDisposition::Published {
            count: diagnostics.len(),
        }
    }

    fn is_current(&self, ticket: &RunTicket, documents: &DocumentStore) -> bool {
        let Some(doc) = documents.get(&ticket.uri) else {
            return false;
        };
        if doc.session() != ticket.session {
            return false;
        }
        match self.published.get(&ticket.uri) {
            Some(&(session, version)) => session != ticket.session || version <= ticket.version,
            None => true,
        }
    }

    /// Forget `uri` and clear whatever the editor shows for it.
    pub async fn document_closed(&mut self, uri: &Url) {
        self.published.remove(uri);
        if let Err(e) = self.publisher.publish(uri, None, &[]).await {
            tracing::warn!(uri = %uri, "Failed to clear diagnostics: {e:#}");
        }
    }
}
