//! The core phase abstraction and the small stateless combinators used to
//! reshape data between pipeline stages.

use std::{
    any::{Any, TypeId},
    fmt,
    marker::PhantomData,
    sync::Arc,
};

use anyhow::Result;

use crate::{
    composition::CompositePhase, config::PhaseConfig, phaser_state::PhaserState,
    validation::AnyChecker,
};

/// Marker for values that can flow between phases.
///
/// Everything that is `'static` and sendable qualifies; the bound exists so
/// composite pipelines can move data across the erased segment boundary and
/// the per-file fan-out can hand files to worker threads.
pub trait PhaseData: Any + Send {}

impl<T: Any + Send> PhaseData for T {}

/// Identity of a named phase.
///
/// This is what gets recorded in [`PhaserState::already_done`], referenced by
/// prerequisites, and matched against [`PhaseConfig`] selections. Cloning is
/// cheap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PhaseName(Arc<str>);

impl PhaseName {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PhaseName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for PhaseName {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

/// Reporting handle for a named phase, as returned by phase listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseDescriptor {
    pub name: PhaseName,
    pub description: String,
}

/// An atomic, typed transformation step in a compiler pipeline.
///
/// A phase maps `(config, state, context, input)` to an output, where the
/// context is a read-only collaborator shared by reference (callers provide
/// interior mutability and, for parallel fan-out, cross-thread safety) and
/// the state carries per-run bookkeeping.
///
/// Phase values are assembled once, are immutable afterwards, and describe
/// the pipeline shape; all run-scoped mutation lives in [`PhaserState`].
pub trait Phase<C: 'static>: Send + Sync {
    type Input: PhaseData;
    type Output: PhaseData;

    fn invoke(
        &self,
        config: &PhaseConfig,
        state: &mut PhaserState<C>,
        context: &C,
        input: Self::Input,
    ) -> Result<Self::Output>;

    /// Validators this phase establishes over its output shape.
    ///
    /// Composite pipelines transfer these onto the run so that every later
    /// phase operating on the same data shape re-checks them.
    fn sticky_postconditions(&self) -> Vec<AnyChecker<C>> {
        Vec::new()
    }

    /// Whether the caller must reshape the execution state once this phase
    /// has run.
    ///
    /// True exactly when the input and output shapes differ. Composite
    /// pipelines reshape the state internally at each boundary they contain
    /// and override this to `false`, so a caller never discards sticky
    /// postconditions that were established over the final shape.
    fn reshapes_data(&self) -> bool {
        TypeId::of::<Self::Input>() != TypeId::of::<Self::Output>()
    }

    /// Collects the named phases nested under this one together with their
    /// reporting depth, in execution order.
    fn named_subphases(&self, _start_depth: usize, _out: &mut Vec<(usize, PhaseDescriptor)>) {}

    /// Sequences `self` before `next`, threading `self`'s output into
    /// `next`'s input.
    ///
    /// The result is a flat [`CompositePhase`]; appending to an existing
    /// composite extends its segment list instead of nesting, so left-nested
    /// chains of arbitrary length add no call depth per segment.
    #[must_use]
    fn then<Q>(self, next: Q) -> CompositePhase<C, Self::Input, Q::Output>
    where
        Self: Sized + 'static,
        Q: Phase<C, Input = Self::Output> + 'static,
    {
        CompositePhase::pair(self, next)
    }
}

struct UnitSink<In>(PhantomData<fn(In)>);

impl<C: 'static, In: PhaseData> Phase<C> for UnitSink<In> {
    type Input = In;
    type Output = ();

    fn invoke(
        &self,
        _config: &PhaseConfig,
        _state: &mut PhaserState<C>,
        _context: &C,
        _input: In,
    ) -> Result<()> {
        Ok(())
    }
}

/// A pipeline terminator: discards its typed input and produces nothing.
pub fn unit_sink<C: 'static, In: PhaseData>() -> impl Phase<C, Input = In, Output = ()> + 'static {
    UnitSink(PhantomData)
}

struct TakeFromContext<F, Old> {
    op: F,
    _shape: PhantomData<fn(Old)>,
}

impl<C: 'static, F, Old, New> Phase<C> for TakeFromContext<F, Old>
where
    F: Fn(&C) -> New + Send + Sync,
    Old: PhaseData,
    New: PhaseData,
{
    type Input = Old;
    type Output = New;

    fn invoke(
        &self,
        _config: &PhaseConfig,
        _state: &mut PhaserState<C>,
        context: &C,
        _input: Old,
    ) -> Result<New> {
        Ok((self.op)(context))
    }
}

/// Switches the pipeline's data to a value recomputed purely from the
/// execution context, discarding the current data.
pub fn take_from_context<C: 'static, F, Old, New>(
    op: F,
) -> impl Phase<C, Input = Old, Output = New> + 'static
where
    F: Fn(&C) -> New + Send + Sync + 'static,
    Old: PhaseData,
    New: PhaseData,
{
    TakeFromContext {
        op,
        _shape: PhantomData,
    }
}

struct Transform<F, In> {
    op: F,
    _shape: PhantomData<fn(In)>,
}

impl<C: 'static, F, In, Out> Phase<C> for Transform<F, In>
where
    F: Fn(In) -> Out + Send + Sync,
    In: PhaseData,
    Out: PhaseData,
{
    type Input = In;
    type Output = Out;

    fn invoke(
        &self,
        _config: &PhaseConfig,
        _state: &mut PhaserState<C>,
        _context: &C,
        input: In,
    ) -> Result<Out> {
        Ok((self.op)(input))
    }
}

/// Lifts a plain data-to-data function into the phase contract without any
/// validator or state interaction. Useful for lightweight reshaping between
/// stages.
pub fn transform<C: 'static, F, In, Out>(op: F) -> impl Phase<C, Input = In, Output = Out> + 'static
where
    F: Fn(In) -> Out + Send + Sync + 'static,
    In: PhaseData,
    Out: PhaseData,
{
    Transform {
        op,
        _shape: PhantomData,
    }
}
