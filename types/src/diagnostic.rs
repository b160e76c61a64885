//! Diagnostic records produced from analyzer output.

use thiserror::Error;

/// Width assumed for a diagnostic's span when the offending token's extent is unknown.
///
/// The analyzer reports only a start position, so the end is approximated.
pub const FALLBACK_SPAN_WIDTH: u32 = 10;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticSeverity {
    Error = 1,
    Warning = 2,
    Information = 3,
    Hint = 4,
}

impl DiagnosticSeverity {
    /// LSP numeric value.
    #[must_use]
    pub fn to_lsp(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "info",
            Self::Hint => "hint",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("analyzer coordinates are 1-based, got {line}:{column}")]
pub struct InvalidCoordinateError {
    pub line: u32,
    pub column: u32,
}

/// A single diagnostic for one document.
///
/// Fields are private so that the coordinate invariant (0-based, and
/// `end_character >= character`) cannot be broken after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    severity: DiagnosticSeverity,
    message: String,
    /// 0-indexed line number.
    line: u32,
    /// 0-indexed start column, in UTF-16 code units.
    character: u32,
    /// 0-indexed exclusive end column on the same line.
    end_character: u32,
    /// Source tag shown by the client (e.g. "epsilon-frontend").
    source: String,
}

impl Diagnostic {
    /// Construct a diagnostic from 0-based coordinates with the fixed-width span.
    #[must_use]
    pub fn new(
        severity: DiagnosticSeverity,
        message: String,
        line: u32,
        character: u32,
        source: String,
    ) -> Self {
        Self {
            severity,
            message,
            line,
            character,
            end_character: character.saturating_add(FALLBACK_SPAN_WIDTH),
            source,
        }
    }

    /// Construct a diagnostic from the analyzer's 1-based line and column.
    pub fn from_one_based(
        severity: DiagnosticSeverity,
        message: String,
        line: u32,
        column: u32,
        source: String,
    ) -> Result<Self, InvalidCoordinateError> {
        if line == 0 || column == 0 {
            return Err(InvalidCoordinateError { line, column });
        }
        Ok(Self::new(severity, message, line - 1, column - 1, source))
    }

    /// Replace the span end. Values before the start collapse to an empty span.
    #[must_use]
    pub fn with_end_character(mut self, end_character: u32) -> Self {
        self.end_character = end_character.max(self.character);
        self
    }

    #[must_use]
    pub fn severity(&self) -> DiagnosticSeverity {
        self.severity
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 0-indexed line number.
    #[must_use]
    pub fn line(&self) -> u32 {
        self.line
    }

    /// 0-indexed start column.
    #[must_use]
    pub fn character(&self) -> u32 {
        self.character
    }

    #[must_use]
    pub fn end_character(&self) -> u32 {
        self.end_character
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Format as `uri:line:col: severity: [source] message` (1-indexed for display).
    #[must_use]
    pub fn display_with_uri(&self, uri: &str) -> String {
        format!(
            "{}:{}:{}: {}: [{}] {}",
            uri,
            self.line + 1,
            self.character + 1,
            self.severity.label(),
            self.source,
            self.message,
        )
    }
}
