//! Diagnostic parser for the front end's `[LINE:COL] MESSAGE` error lines.
//!
//! Parsing is tolerant: stderr may interleave diagnostics with stack traces,
//! banners and JVM noise, and any line that does not match exactly is skipped.

use std::sync::LazyLock;

use epsilon_types::{Diagnostic, DiagnosticSeverity};
use regex::Regex;

// ASCII digits only; `\d` would also accept other Unicode decimal digits.
// The message ends at the first carriage return or Unicode line separator.
static ERROR_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[([0-9]+):([0-9]+)\] ([^\r\x{2028}\x{2029}]*)")
        .expect("error line pattern is valid")
});

#[derive(Debug, Clone)]
pub struct DiagnosticParser {
    source: String,
}

impl DiagnosticParser {
    /// `source` is the tag attached to every diagnostic produced.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Convert analyzer stderr into diagnostics, in output order.
    ///
    /// Coordinates are shifted to 0-based. The end of each span is the
    /// fixed-width approximation; see [`refine_spans`] for the precise one.
    #[must_use]
    pub fn parse(&self, stderr: &str) -> Vec<Diagnostic> {
        stderr
            .split('\n')
            .filter_map(|line| self.parse_line(line.strip_suffix('\r').unwrap_or(line)))
            .collect()
    }

    fn parse_line(&self, line: &str) -> Option<Diagnostic> {
        let caps = ERROR_LINE.captures(line)?;
        // Overflowing numbers cannot refer to a real position; treat as noise.
        let line_no: u32 = caps[1].parse().ok()?;
        let column: u32 = caps[2].parse().ok()?;

        match Diagnostic::from_one_based(
            DiagnosticSeverity::Error,
            caps[3].to_string(),
            line_no,
            column,
            self.source.clone(),
        ) {
            Ok(diag) => Some(diag),
            Err(e) => {
                tracing::trace!("Skipping analyzer line: {e}");
                None
            }
        }
    }
}

/// Narrow each diagnostic's span to the token starting at its position in `text`.
///
/// Identifier and number tokens extend over the whole word; anything else
/// covers a single character. Diagnostics whose start does not land on a
/// token in `text` keep the fixed-width span.
#[must_use]
pub fn refine_spans(diagnostics: Vec<Diagnostic>, text: &str) -> Vec<Diagnostic> {
    if diagnostics.is_empty() {
        return diagnostics;
    }
    let lines: Vec<&str> = text
        .split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .collect();

    diagnostics
        .into_iter()
        .map(|diag| {
            let end = lines
                .get(diag.line() as usize)
                .and_then(|line| token_end(line, diag.character()));
            match end {
                Some(end) => diag.with_end_character(end),
                None => diag,
            }
        })
        .collect()
}

fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

/// End (in UTF-16 units) of the token that starts at `character` on `line`.
fn token_end(line: &str, character: u32) -> Option<u32> {
    let mut chars = line.chars();
    let mut units = 0u32;
    while units < character {
        units += chars.next()?.len_utf16() as u32;
    }
    // Landed inside a surrogate pair.
    if units != character {
        return None;
    }

    let first = chars.next()?;
    if first.is_whitespace() {
        return None;
    }
    let mut end = units + first.len_utf16() as u32;
    if is_word_char(first) {
        end += chars
            .take_while(|&c| is_word_char(c))
            .map(|c| c.len_utf16() as u32)
            .sum::<u32>();
    }
    Some(end)
}
