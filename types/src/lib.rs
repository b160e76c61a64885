//! Core domain types for the Epsilon language server.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the server.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod diagnostic;
mod ids;

pub use diagnostic::{Diagnostic, DiagnosticSeverity, FALLBACK_SPAN_WIDTH, InvalidCoordinateError};
pub use ids::{DocumentVersion, SessionId};
