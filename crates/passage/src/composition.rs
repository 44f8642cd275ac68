//! Composite phases: the `then` algebra.
//!
//! A composite is an ordered, flat list of segments. Each segment wraps a
//! fully typed phase behind an object-safe adapter that moves boxed data
//! across the segment boundary; the adapter reshapes the execution state
//! right where its phase changes the data shape, so nesting composites
//! inside composites leaves sticky postconditions established over the final
//! shape intact.

use std::{any::Any, fmt, marker::PhantomData};

use anyhow::Result;

use crate::{
    config::PhaseConfig,
    phase::{Phase, PhaseData, PhaseDescriptor},
    phaser_state::PhaserState,
    validation::AnyChecker,
};

type BoxedData = Box<dyn Any + Send>;

/// Object-safe view of a phase operating on boxed data.
pub(crate) trait ErasedPhase<C: 'static>: Send + Sync {
    fn invoke_boxed(
        &self,
        config: &PhaseConfig,
        state: &mut PhaserState<C>,
        context: &C,
        input: BoxedData,
    ) -> Result<BoxedData>;

    fn sticky_postconditions(&self) -> Vec<AnyChecker<C>>;

    fn named_subphases(&self, start_depth: usize, out: &mut Vec<(usize, PhaseDescriptor)>);
}

struct ErasedAdapter<P>(P);

impl<C: 'static, P: Phase<C> + 'static> ErasedPhase<C> for ErasedAdapter<P> {
    fn invoke_boxed(
        &self,
        config: &PhaseConfig,
        state: &mut PhaserState<C>,
        context: &C,
        input: BoxedData,
    ) -> Result<BoxedData> {
        let input = match input.downcast::<P::Input>() {
            Ok(input) => *input,
            Err(_) => panic!("pipeline segment received data of an unexpected shape"),
        };
        let output = self.0.invoke(config, state, context, input)?;
        if self.0.reshapes_data() {
            // The data shape just changed; sticky postconditions over the
            // old shape stop applying.
            *state = state.change_type();
        }
        Ok(Box::new(output))
    }

    fn sticky_postconditions(&self) -> Vec<AnyChecker<C>> {
        self.0.sticky_postconditions()
    }

    fn named_subphases(&self, start_depth: usize, out: &mut Vec<(usize, PhaseDescriptor)>) {
        self.0.named_subphases(start_depth, out);
    }
}

/// An ordered sequence of phases flattened into one pipeline.
///
/// Composition associates: `(a.then(b)).then(c)` and `a.then(b.then(c))`
/// execute the same effective sequence in the same order. Left-nested chains
/// extend one flat list, so arbitrarily long pipelines add no call depth per
/// segment.
pub struct CompositePhase<C: 'static, In, Out> {
    phases: Vec<Box<dyn ErasedPhase<C>>>,
    _shape: PhantomData<fn(In) -> Out>,
}

impl<C: 'static, In: PhaseData, Out: PhaseData> CompositePhase<C, In, Out> {
    pub(crate) fn pair<A, B>(first: A, second: B) -> Self
    where
        A: Phase<C, Input = In> + 'static,
        B: Phase<C, Input = A::Output, Output = Out> + 'static,
    {
        Self {
            phases: vec![Box::new(ErasedAdapter(first)), Box::new(ErasedAdapter(second))],
            _shape: PhantomData,
        }
    }

    /// Appends a phase to the flat segment list.
    ///
    /// Shadows the trait-level [`Phase::then`] on purpose: composing onto an
    /// existing composite extends it instead of nesting wrapper objects.
    #[must_use]
    pub fn then<Q>(mut self, next: Q) -> CompositePhase<C, In, Q::Output>
    where
        Q: Phase<C, Input = Out> + 'static,
    {
        self.phases.push(Box::new(ErasedAdapter(next)));
        CompositePhase {
            phases: self.phases,
            _shape: PhantomData,
        }
    }

    /// Number of directly held segments (nested composites count as one).
    pub fn segment_count(&self) -> usize {
        self.phases.len()
    }
}

impl<C: 'static, In: PhaseData, Out: PhaseData> Phase<C> for CompositePhase<C, In, Out> {
    type Input = In;
    type Output = Out;

    fn invoke(
        &self,
        config: &PhaseConfig,
        state: &mut PhaserState<C>,
        context: &C,
        input: In,
    ) -> Result<Out> {
        let mut data: BoxedData = Box::new(input);
        let mut carried: Vec<AnyChecker<C>> = Vec::new();
        for (index, phase) in self.phases.iter().enumerate() {
            if index > 0 {
                // The previous segment's declared sticky postconditions now
                // bind the rest of the run.
                for checker in carried.drain(..) {
                    state.push_sticky(checker);
                }
            }
            data = phase.invoke_boxed(config, state, context, data)?;
            carried = phase.sticky_postconditions();
        }
        match data.downcast::<Out>() {
            Ok(output) => Ok(*output),
            Err(_) => panic!("composite pipeline produced output of an unexpected shape"),
        }
    }

    fn sticky_postconditions(&self) -> Vec<AnyChecker<C>> {
        self.phases
            .last()
            .map_or_else(Vec::new, |phase| phase.sticky_postconditions())
    }

    /// A composite reshapes the state at each internal boundary as it runs;
    /// its caller must not reshape again, whatever the outer `In`/`Out` pair
    /// looks like.
    fn reshapes_data(&self) -> bool {
        false
    }

    fn named_subphases(&self, start_depth: usize, out: &mut Vec<(usize, PhaseDescriptor)>) {
        for phase in &self.phases {
            phase.named_subphases(start_depth, out);
        }
    }
}

impl<C: 'static, In, Out> fmt::Debug for CompositePhase<C, In, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositePhase")
            .field("segments", &self.phases.len())
            .finish()
    }
}
