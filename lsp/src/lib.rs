//! Language server that validates Epsilon sources with the compiler front end.

pub mod analyzer;
pub mod codec;
pub mod completion;
pub mod documents;
pub mod parser;
pub mod protocol;
pub mod publisher;
pub mod snapshot;
pub mod types;
pub mod validation;

mod server;

pub use analyzer::{Analyzer, AnalyzerError, AnalyzerOutput, ProcessAnalyzer};
pub use epsilon_types::{Diagnostic, DiagnosticSeverity, DocumentVersion};
pub use parser::DiagnosticParser;
pub use publisher::DiagnosticPublisher;
pub use server::{serve, serve_with_analyzer};
pub use snapshot::{SnapshotError, SnapshotHandle, SnapshotMaterializer};
pub use types::{AnalyzerConfig, LspConfig, ServerStopReason};
