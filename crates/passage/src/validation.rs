//! Validator hook contract.
//!
//! Checkers are opaque callables over `(context, data)` supplied by external
//! collaborators; the engine only guarantees when they run. [`AnyChecker`]
//! erases a checker's data shape so accumulated sticky postconditions can
//! ride through composite pipelines whose data shape changes between
//! segments.

use std::{
    any::{Any, TypeId},
    fmt,
    sync::Arc,
};

/// Outcome of a validator. `Err` carries a short human-readable explanation
/// that ends up in the abort message.
pub type CheckResult = Result<(), String>;

/// A validator over a concrete data shape.
pub type Checker<C, D> = Arc<dyn Fn(&C, &D) -> CheckResult + Send + Sync>;

/// A [`Checker`] erased over its data shape.
///
/// The checker remembers the `TypeId` it was defined for; applying it to
/// data of a different shape is an assembly-contract violation and aborts.
/// Type-changes in the execution state drop stale checkers before that can
/// happen.
pub struct AnyChecker<C> {
    data_type: TypeId,
    run: Arc<dyn Fn(&C, &dyn Any) -> CheckResult + Send + Sync>,
}

impl<C: 'static> AnyChecker<C> {
    pub fn new<D: Any>(checker: Checker<C, D>) -> Self {
        Self {
            data_type: TypeId::of::<D>(),
            run: Arc::new(move |context, data| {
                let data = data
                    .downcast_ref::<D>()
                    .expect("validator applied to data of a different shape");
                checker(context, data)
            }),
        }
    }

    /// Whether this checker was defined over the given data shape.
    pub fn applies_to(&self, data_type: TypeId) -> bool {
        self.data_type == data_type
    }

    pub fn check(&self, context: &C, data: &dyn Any) -> CheckResult {
        (self.run)(context, data)
    }
}

// Unbounded: callable from `PhaserState<C>`, which places no lifetime bound
// on its context parameter.
impl<C> AnyChecker<C> {
    /// Identity comparison, used to avoid registering the same checker twice
    /// when both a named phase and the surrounding composite transfer it.
    pub(crate) fn same_checker(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.run, &other.run)
    }
}

impl<C> Clone for AnyChecker<C> {
    fn clone(&self) -> Self {
        Self {
            data_type: self.data_type,
            run: Arc::clone(&self.run),
        }
    }
}

impl<C> fmt::Debug for AnyChecker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyChecker")
            .field("data_type", &self.data_type)
            .finish_non_exhaustive()
    }
}
