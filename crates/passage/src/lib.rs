//! Composable compiler phase pipelines.
//!
//! Passage provides the scheduling substrate of a compiler backend: small,
//! independently testable phases composed with a type-changing `then`
//! combinator, named phases that wrap execution with validation and dump
//! hooks, per-run execution bookkeeping, and a per-file fan-out strategy
//! that can run file-level phases across a bounded worker pool.
//!
//! The concrete lowering logic, the translation-unit representation, and the
//! diagnostic presentation are external collaborators supplied through the
//! traits in [`translation_unit`] and the hook types in [`validation`] and
//! [`actions`].

pub mod actions;
pub mod composition;
pub mod config;
pub mod named_phase;
pub mod per_file;
pub mod phase;
pub mod phaser_state;
pub mod translation_unit;
pub mod validation;

pub use actions::{Action, ActionState, BeforeOrAfter, dump_action};
pub use composition::CompositePhase;
pub use config::PhaseConfig;
pub use named_phase::{NamedPhase, custom_phase, op_phase};
pub use per_file::{FILE_LOWERING_STAGE, PerFilePhase, per_file_phase, per_file_phase_with};
pub use phase::{
    Phase, PhaseData, PhaseDescriptor, PhaseName, take_from_context, transform, unit_sink,
};
pub use phaser_state::PhaserState;
pub use translation_unit::{DiagnosticSink, LogDiagnostics, SourceFile, TranslationUnit};
pub use validation::{AnyChecker, CheckResult, Checker};
