//! Side-effecting hooks run around named phase invocations.
//!
//! Actions are opaque callables over `(context, data)`; the engine only
//! guarantees that "before" actions run ahead of the preconditions and
//! "after" actions run once the phase's output has been validated.

use std::{fmt, sync::Arc};

use log::debug;

use crate::{config::PhaseConfig, phase::PhaseName};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeforeOrAfter {
    Before,
    After,
}

/// Snapshot handed to action hooks around a named phase invocation.
#[derive(Debug, Clone, Copy)]
pub struct ActionState<'a> {
    pub config: &'a PhaseConfig,
    pub name: &'a PhaseName,
    pub description: &'a str,
    pub depth: usize,
    pub when: BeforeOrAfter,
}

pub type Action<C, D> = Arc<dyn Fn(&ActionState<'_>, &C, &D) + Send + Sync>;

/// The default dumping action: logs the phase's data at `debug` level,
/// indented by nesting depth, when the configuration selects this phase for
/// dumping.
pub fn dump_action<C, D: fmt::Debug>() -> Action<C, D> {
    Arc::new(|action: &ActionState<'_>, _context: &C, data: &D| {
        if !action.config.should_dump(action.when, action.name) {
            return;
        }
        let when = match action.when {
            BeforeOrAfter::Before => "before",
            BeforeOrAfter::After => "after",
        };
        let indent = action.depth * 2;
        debug!("{:indent$}Dump {when} `{}`: {data:#?}", "", action.name);
    })
}
