//! Per-file fan-out: apply an ordered sequence of file-level phases to every
//! file of a translation unit, sequentially or across a bounded worker pool.
//!
//! One file's failure never aborts the rest of the unit: failures are caught
//! at the file boundary and handed to the diagnostic sink with the failing
//! file's identity. The unit value itself passes through unchanged in both
//! modes; phases are trusted to preserve the unit's file set.

use std::{fmt, sync::Arc};

use anyhow::{Context, Error, Result};
use log::debug;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use crate::{
    actions::dump_action,
    config::PhaseConfig,
    named_phase::NamedPhase,
    phase::{Phase, PhaseDescriptor, PhaseName},
    phaser_state::PhaserState,
    translation_unit::{DiagnosticSink, LogDiagnostics, SourceFile, TranslationUnit},
};

/// Stage label attached to per-file failure reports.
pub const FILE_LOWERING_STAGE: &str = "file lowering";

type FilePhases<C, F> = Vec<Box<dyn Phase<C, Input = F, Output = F>>>;

/// The fan-out strategy itself; build it through [`per_file_phase`] or
/// [`per_file_phase_with`] to get the usual named-phase wrapper.
pub struct PerFilePhase<C: 'static, U: TranslationUnit> {
    lower: FilePhases<C, U::File>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

/// Wraps a sequence of file-level phases into a unit-level named phase that
/// reports failures through the log. The default dumping action is installed
/// on the wrapper.
pub fn per_file_phase<C, U>(
    name: impl Into<PhaseName>,
    description: impl Into<String>,
    lower: FilePhases<C, U::File>,
) -> NamedPhase<C, U>
where
    C: Sync + 'static,
    U: TranslationUnit + fmt::Debug,
{
    per_file_phase_with(name, description, lower, Arc::new(LogDiagnostics))
}

/// Same as [`per_file_phase`] with an explicit diagnostic sink.
pub fn per_file_phase_with<C, U>(
    name: impl Into<PhaseName>,
    description: impl Into<String>,
    lower: FilePhases<C, U::File>,
    diagnostics: Arc<dyn DiagnosticSink>,
) -> NamedPhase<C, U>
where
    C: Sync + 'static,
    U: TranslationUnit + fmt::Debug,
{
    NamedPhase::new(name, description, PerFilePhase { lower, diagnostics })
        .with_action(dump_action())
}

impl<C: Sync + 'static, U: TranslationUnit> PerFilePhase<C, U> {
    fn run_file(
        &self,
        config: &PhaseConfig,
        state: &mut PhaserState<C>,
        context: &C,
        file: U::File,
    ) -> Result<()> {
        let mut data = file;
        for phase in &self.lower {
            data = phase.invoke(config, state, context, data)?;
        }
        Ok(())
    }

    fn invoke_sequential(
        &self,
        config: &PhaseConfig,
        state: &mut PhaserState<C>,
        context: &C,
        input: U,
    ) -> Result<U> {
        // One shared state, reshaped for file granularity.
        let mut file_state = state.change_type();
        for file in input.files() {
            let file_name = file.name();
            if let Err(error) = self.run_file(config, &mut file_state, context, file) {
                self.diagnostics
                    .report(&error, FILE_LOWERING_STAGE, &file_name);
            }
        }
        state.merge_done(&file_state);
        Ok(input)
    }

    fn invoke_parallel(
        &self,
        config: &PhaseConfig,
        state: &mut PhaserState<C>,
        context: &C,
        input: U,
        workers: usize,
    ) -> Result<U> {
        let files = input.files();
        if files.is_empty() {
            return Ok(input);
        }

        debug!(
            "Lowering {} files of `{}` across {workers} worker threads",
            files.len(),
            input.name()
        );

        // Each worker owns a copy of the bookkeeping; the failure list is the
        // only memory shared for writes.
        let failures: Mutex<Vec<(Error, String)>> = Mutex::new(Vec::new());
        let file_names: Vec<String> = files.iter().map(SourceFile::name).collect();
        let mut states: Vec<PhaserState<C>> = files.iter().map(|_| state.change_type()).collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .context("failed to build the file lowering worker pool")?;
        pool.scope(|scope| {
            for (file, file_state) in files.into_iter().zip(states.iter_mut()) {
                let failures = &failures;
                scope.spawn(move |_| {
                    let file_name = file.name();
                    if let Err(error) = self.run_file(config, file_state, context, file) {
                        failures.lock().push((error, file_name));
                    }
                });
            }
        });

        let failures = failures.into_inner();
        let failed: FxHashSet<&str> = failures.iter().map(|(_, name)| name.as_str()).collect();
        for (error, file) in &failures {
            self.diagnostics.report(error, FILE_LOWERING_STAGE, file);
        }

        // Workers that completed the whole sequence must agree on what ran.
        // A worker whose file failed stopped partway and is excluded from
        // the check; its bookkeeping is a prefix of the others'.
        let mut reference: Option<&PhaserState<C>> = None;
        for (name, file_state) in file_names.iter().zip(&states) {
            if failed.contains(name.as_str()) {
                continue;
            }
            match reference {
                Some(reference) => assert!(
                    reference.already_done == file_state.already_done,
                    "parallel file lowering produced diverging phase bookkeeping"
                ),
                None => reference = Some(file_state),
            }
        }

        for file_state in &states {
            state.merge_done(file_state);
        }
        Ok(input)
    }
}

impl<C: Sync + 'static, U: TranslationUnit> Phase<C> for PerFilePhase<C, U> {
    type Input = U;
    type Output = U;

    fn invoke(
        &self,
        config: &PhaseConfig,
        state: &mut PhaserState<C>,
        context: &C,
        input: U,
    ) -> Result<U> {
        let workers = config.worker_threads();
        if workers > 1 {
            self.invoke_parallel(config, state, context, input, workers)
        } else {
            self.invoke_sequential(config, state, context, input)
        }
    }

    fn named_subphases(&self, start_depth: usize, out: &mut Vec<(usize, PhaseDescriptor)>) {
        for phase in &self.lower {
            phase.named_subphases(start_depth, out);
        }
    }
}

impl<C: 'static, U: TranslationUnit> std::fmt::Debug for PerFilePhase<C, U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerFilePhase")
            .field("phases", &self.lower.len())
            .finish_non_exhaustive()
    }
}
