//! Effect identities and the primitives that raise them.

use std::any::{type_name, Any};
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::context::Context;
use crate::error::{Error, Result};

pub(crate) type Value = Box<dyn Any + Send>;

/// A one-shot erased continuation.
pub(crate) type RawCont<T> = Box<dyn FnOnce(Value) -> Result<T> + Send>;

static NEXT_EFFECT: AtomicU64 = AtomicU64::new(1);

/// The identity of a declared effect. Two effects are the same only if
/// they came from the same `Effect::new` call.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct EffectId(u64);

impl EffectId {
    fn fresh() -> EffectId {
        EffectId(NEXT_EFFECT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "effect#{}", self.0)
    }
}

/// An effect taking an `A` and answered with an `R`.
pub struct Effect<A, R> {
    id: EffectId,
    _marker: PhantomData<fn(A) -> R>,
}

impl<A, R> Clone for Effect<A, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A, R> Copy for Effect<A, R> {}

impl<A, R> fmt::Debug for Effect<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Effect({})", self.id)
    }
}

impl<A, R> Default for Effect<A, R> {
    fn default() -> Self {
        Effect::new()
    }
}

impl<A, R> Effect<A, R> {
    pub fn new() -> Effect<A, R> {
        Effect {
            id: EffectId::fresh(),
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> EffectId {
        self.id
    }
}

impl<A: Send + 'static, R: 'static> Effect<A, R> {
    /// Raises this effect and blocks until a handler resumes with an answer.
    ///
    /// Must be called from inside a body run by `Handler::handle` on `ctx`.
    pub fn perform(&self, ctx: &Context, arg: A) -> Result<R> {
        let answer = ctx.suspend(Signal::Perform(Instance {
            id: self.id,
            arg: Box::new(arg),
        }))?;
        downcast(answer)
    }
}

pub(crate) fn downcast<T: 'static>(v: Value) -> Result<T> {
    v.downcast::<T>().map(|b| *b).map_err(|_| Error::TypeMismatch {
        expected: type_name::<T>(),
    })
}

/// One performance of an effect.
pub(crate) struct Instance {
    pub(crate) id: EffectId,
    pub(crate) arg: Value,
}

impl Instance {
    /// Forwards this instance, with the continuation of the scope that let
    /// it through, to the next enclosing handler scope.
    pub(crate) fn resend(self, ctx: &Context, cont: RawCont<Value>) -> Result<Value> {
        let id = self.id;
        debug!(effect = %id, "resending effect outward");
        ctx.suspend(Signal::Resend(Resend {
            instance: self,
            cont: cont,
        }))
        .map_err(|e| match e {
            Error::NoResumePoint => {
                warn!(effect = %id, "effect reached the outermost handler unclaimed");
                Error::UnhandledEffect(id)
            }
            e => e,
        })
    }
}

pub(crate) struct Resend {
    pub(crate) instance: Instance,
    pub(crate) cont: RawCont<Value>,
}

/// What a handled body hands to its handler loop.
pub(crate) enum Signal {
    Perform(Instance),
    Resend(Resend),
    Return(Value),
}
