//! External collaborator traits: translation units, their files, and the
//! diagnostic channel for per-file lowering failures.

use anyhow::Error;
use log::error;

use crate::phase::PhaseData;

/// One file of a translation unit.
///
/// Implementations are cheap handles (typically `Arc`-backed) with stable
/// identity: file-level phases receive and return them by value while
/// mutating the underlying file through the handle.
pub trait SourceFile: PhaseData + Clone {
    /// Human-readable identity used in diagnostics.
    fn name(&self) -> String;
}

/// A named, ordered collection of files.
pub trait TranslationUnit: PhaseData {
    type File: SourceFile;

    fn name(&self) -> &str;

    /// The unit's files in their declared order.
    fn files(&self) -> Vec<Self::File>;
}

/// Receives per-file lowering failures together with a stage label and the
/// failing file's identity. Presentation is the collaborator's business.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, error: &Error, stage: &str, file: &str);
}

/// Default sink that forwards failures to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDiagnostics;

impl DiagnosticSink for LogDiagnostics {
    fn report(&self, error: &Error, stage: &str, file: &str) {
        error!("{stage} failed for `{file}`: {error:#}");
    }
}
