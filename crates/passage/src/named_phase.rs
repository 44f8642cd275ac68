//! Named phases: identity, dependency and validation metadata around a bare
//! transformation.
//!
//! A named phase keeps the data shape (`Input = Output`); shape changes
//! happen through the bare combinators in [`crate::phase`]. Its invocation
//! wraps the underlying transformation with prerequisite assertions,
//! precondition/postcondition checks, accumulated sticky postconditions, and
//! the caller-supplied action hooks.

use std::{
    any::{Any, TypeId},
    fmt,
    marker::PhantomData,
    sync::Arc,
    time::Instant,
};

use anyhow::Result;
use log::{debug, info};
use rustc_hash::FxHashSet;

use crate::{
    actions::{Action, ActionState, BeforeOrAfter, dump_action},
    config::PhaseConfig,
    phase::{Phase, PhaseData, PhaseDescriptor, PhaseName},
    phaser_state::PhaserState,
    validation::{AnyChecker, CheckResult, Checker},
};

pub struct NamedPhase<C: 'static, D: PhaseData> {
    name: PhaseName,
    description: String,
    prerequisite: FxHashSet<PhaseName>,
    lower: Box<dyn Phase<C, Input = D, Output = D>>,
    preconditions: Vec<Checker<C, D>>,
    postconditions: Vec<Checker<C, D>>,
    sticky_postconditions: Vec<AnyChecker<C>>,
    actions: Vec<Action<C, D>>,
    nlevels: usize,
}

impl<C: 'static, D: PhaseData> NamedPhase<C, D> {
    pub fn new(
        name: impl Into<PhaseName>,
        description: impl Into<String>,
        lower: impl Phase<C, Input = D, Output = D> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            prerequisite: FxHashSet::default(),
            lower: Box::new(lower),
            preconditions: Vec::new(),
            postconditions: Vec::new(),
            sticky_postconditions: Vec::new(),
            actions: Vec::new(),
            nlevels: 1,
        }
    }

    pub fn name(&self) -> &PhaseName {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn descriptor(&self) -> PhaseDescriptor {
        PhaseDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }

    /// Requires the given phase to have run earlier in the same pipeline.
    /// Violations are programming errors and abort the run.
    #[must_use]
    pub fn with_prerequisite(mut self, name: impl Into<PhaseName>) -> Self {
        self.prerequisite.insert(name.into());
        self
    }

    /// Checked against the input immediately before invocation; a failure
    /// indicates pipeline mis-assembly and aborts the run.
    #[must_use]
    pub fn with_precondition(
        mut self,
        checker: impl Fn(&C, &D) -> CheckResult + Send + Sync + 'static,
    ) -> Self {
        self.preconditions.push(Arc::new(checker));
        self
    }

    /// Checked against the output immediately after invocation.
    #[must_use]
    pub fn with_postcondition(
        mut self,
        checker: impl Fn(&C, &D) -> CheckResult + Send + Sync + 'static,
    ) -> Self {
        self.postconditions.push(Arc::new(checker));
        self
    }

    /// Once this phase has run, the checker must keep holding after every
    /// later phase operating on the same data shape.
    #[must_use]
    pub fn with_sticky_postcondition(
        mut self,
        checker: impl Fn(&C, &D) -> CheckResult + Send + Sync + 'static,
    ) -> Self {
        let checker: Checker<C, D> = Arc::new(checker);
        self.sticky_postconditions.push(AnyChecker::new(checker));
        self
    }

    #[must_use]
    pub fn with_action(mut self, action: Action<C, D>) -> Self {
        self.actions.push(action);
        self
    }

    /// Nesting depth added while the wrapped phase runs; used only for
    /// report indentation.
    #[must_use]
    pub fn with_nlevels(mut self, nlevels: usize) -> Self {
        self.nlevels = nlevels;
        self
    }

    fn run_actions(
        &self,
        when: BeforeOrAfter,
        config: &PhaseConfig,
        depth: usize,
        context: &C,
        data: &D,
    ) {
        if self.actions.is_empty() {
            return;
        }
        let action_state = ActionState {
            config,
            name: &self.name,
            description: &self.description,
            depth,
            when,
        };
        for action in &self.actions {
            action(&action_state, context, data);
        }
    }

    fn check_all(&self, checkers: &[Checker<C, D>], context: &C, data: &D, kind: &str) {
        for checker in checkers {
            if let Err(message) = checker(context, data) {
                panic!("{kind} failed for phase `{}`: {message}", self.name);
            }
        }
    }

    fn check_sticky(&self, state: &PhaserState<C>, context: &C, data: &D) {
        let any_data: &dyn Any = data;
        for checker in state.sticky_postconditions() {
            debug_assert!(
                checker.applies_to(TypeId::of::<D>()),
                "stale sticky postcondition survived a data shape change"
            );
            if let Err(message) = checker.check(context, any_data) {
                panic!(
                    "sticky postcondition violated after phase `{}`: {message}",
                    self.name
                );
            }
        }
    }

    fn run_lower(
        &self,
        config: &PhaseConfig,
        state: &mut PhaserState<C>,
        context: &C,
        input: D,
    ) -> Result<D> {
        debug!(
            "{:indent$}Running phase `{}`",
            "",
            self.name,
            indent = state.depth * 2
        );
        state.depth += self.nlevels;
        let result = if config.profile {
            let started = Instant::now();
            let result = self.lower.invoke(config, state, context, input);
            info!("{}: {:.3?}", self.name, started.elapsed());
            result
        } else {
            self.lower.invoke(config, state, context, input)
        };
        state.depth -= self.nlevels;
        result
    }
}

impl<C: 'static, D: PhaseData> Phase<C> for NamedPhase<C, D> {
    type Input = D;
    type Output = D;

    fn invoke(
        &self,
        config: &PhaseConfig,
        state: &mut PhaserState<C>,
        context: &C,
        input: D,
    ) -> Result<D> {
        if !config.is_enabled(&self.name) {
            debug!("Skipping disabled phase `{}`", self.name);
            return Ok(input);
        }

        for dep in &self.prerequisite {
            assert!(
                state.already_done.contains(dep),
                "phase `{}` invoked before its prerequisite `{dep}` has run",
                self.name
            );
        }

        self.run_actions(BeforeOrAfter::Before, config, state.depth, context, &input);
        self.check_all(&self.preconditions, context, &input, "precondition");

        let output = self.run_lower(config, state, context, input)?;

        self.check_all(&self.postconditions, context, &output, "postcondition");
        self.check_sticky(state, context, &output);
        for checker in &self.sticky_postconditions {
            state.push_sticky(checker.clone());
        }

        self.run_actions(BeforeOrAfter::After, config, state.depth, context, &output);
        state.already_done.insert(self.name.clone());
        Ok(output)
    }

    fn sticky_postconditions(&self) -> Vec<AnyChecker<C>> {
        self.sticky_postconditions.clone()
    }

    fn named_subphases(&self, start_depth: usize, out: &mut Vec<(usize, PhaseDescriptor)>) {
        out.push((start_depth, self.descriptor()));
        self.lower.named_subphases(start_depth + self.nlevels, out);
    }
}

impl<C: 'static, D: PhaseData> fmt::Debug for NamedPhase<C, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamedPhase")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("prerequisite", &self.prerequisite)
            .field("nlevels", &self.nlevels)
            .finish_non_exhaustive()
    }
}

struct CustomPhaseAdapter<F, D> {
    op: F,
    _shape: PhantomData<fn(D) -> D>,
}

impl<C: 'static, F, D> Phase<C> for CustomPhaseAdapter<F, D>
where
    F: Fn(&C, &mut D) + Send + Sync,
    D: PhaseData,
{
    type Input = D;
    type Output = D;

    fn invoke(
        &self,
        _config: &PhaseConfig,
        _state: &mut PhaserState<C>,
        context: &C,
        mut input: D,
    ) -> Result<D> {
        (self.op)(context, &mut input);
        Ok(input)
    }
}

/// A named phase defined by a context-mutating operation with no change of
/// data shape. The default dumping action is installed.
pub fn custom_phase<C, D, F>(
    name: impl Into<PhaseName>,
    description: impl Into<String>,
    op: F,
) -> NamedPhase<C, D>
where
    C: 'static,
    D: PhaseData + fmt::Debug,
    F: Fn(&C, &mut D) + Send + Sync + 'static,
{
    NamedPhase::new(
        name,
        description,
        CustomPhaseAdapter {
            op,
            _shape: PhantomData,
        },
    )
    .with_action(dump_action())
}

struct OpPhaseAdapter<F> {
    op: F,
}

impl<C: 'static, F: Fn(&C) + Send + Sync> Phase<C> for OpPhaseAdapter<F> {
    type Input = ();
    type Output = ();

    fn invoke(
        &self,
        _config: &PhaseConfig,
        _state: &mut PhaserState<C>,
        context: &C,
        _input: (),
    ) -> Result<()> {
        (self.op)(context);
        Ok(())
    }
}

/// A named phase defined purely as an operation on the execution context,
/// carrying no pipeline data.
pub fn op_phase<C, F>(
    name: impl Into<PhaseName>,
    description: impl Into<String>,
    op: F,
) -> NamedPhase<C, ()>
where
    C: 'static,
    F: Fn(&C) + Send + Sync + 'static,
{
    NamedPhase::new(name, description, OpPhaseAdapter { op }).with_nlevels(0)
}
