//! Effect handlers: dispatching performed effects of a body to handler
//! functions, forwarding the rest to enclosing handlers.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::co::{self, Coroutine};
use crate::context::Context;
use crate::eff::{downcast, Effect, EffectId, Instance, RawCont, Resend, Signal, Value};
use crate::error::Result;
use crate::invoke_box::OnceInvokeBox;

type EffectFn<T> = Arc<dyn Fn(Value, RawCont<T>) -> Result<T> + Send + Sync>;
type ValueFn<V, T> = Arc<dyn Fn(V) -> Result<T> + Send + Sync>;

/// The rest of a handled computation, from the perform that was
/// intercepted up to the end of its `handle` call.
///
/// Resuming consumes it, so it runs at most once.
pub struct Cont<R, T> {
    inner: RawCont<T>,
    _marker: PhantomData<fn(R)>,
}

impl<R: Send + 'static, T> Cont<R, T> {
    fn new(inner: RawCont<T>) -> Cont<R, T> {
        Cont {
            inner: inner,
            _marker: PhantomData,
        }
    }

    /// Answers the pending perform with `value` and runs the handled body
    /// on, returning what the whole `handle` call would return.
    pub fn resume(self, value: R) -> Result<T> {
        (self.inner)(Box::new(value))
    }
}

/// Maps effects to handler functions, plus a value handler applied to
/// what the handled body returns.
///
/// Building is non-destructive: clone a base handler to specialize it.
pub struct Handler<V, T> {
    effects: HashMap<EffectId, EffectFn<T>>,
    value: ValueFn<V, T>,
}

impl<V, T> Clone for Handler<V, T> {
    fn clone(&self) -> Self {
        Handler {
            effects: self.effects.clone(),
            value: self.value.clone(),
        }
    }
}

impl<V, T> fmt::Debug for Handler<V, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut ids: Vec<_> = self.effects.keys().collect();
        ids.sort();
        f.debug_struct("Handler").field("effects", &ids).finish()
    }
}

impl<T: Send + 'static> Handler<T, T> {
    /// A handler whose value handler passes the body's result through.
    pub fn identity() -> Handler<T, T> {
        Handler::new(Ok)
    }
}

impl<V: Send + 'static, T: Send + 'static> Handler<V, T> {
    pub fn new<F>(value: F) -> Handler<V, T>
    where
        F: Fn(V) -> Result<T> + Send + Sync + 'static,
    {
        Handler {
            effects: HashMap::new(),
            value: Arc::new(value),
        }
    }

    /// Binds `effect` to `f`, replacing any earlier binding for it.
    pub fn on<A, R, F>(mut self, effect: &Effect<A, R>, f: F) -> Handler<V, T>
    where
        A: Send + 'static,
        R: Send + 'static,
        F: Fn(A, Cont<R, T>) -> Result<T> + Send + Sync + 'static,
    {
        let f: EffectFn<T> = Arc::new(move |arg: Value, k: RawCont<T>| {
            f(downcast::<A>(arg)?, Cont::new(k))
        });
        self.effects.insert(effect.id(), f);
        self
    }

    /// Replaces the value handler.
    pub fn to<V2, F>(self, value: F) -> Handler<V2, T>
    where
        V2: Send + 'static,
        F: Fn(V2) -> Result<T> + Send + Sync + 'static,
    {
        Handler {
            effects: self.effects,
            value: Arc::new(value),
        }
    }

    pub fn handles(&self, id: EffectId) -> bool {
        self.effects.contains_key(&id)
    }

    /// Runs `thunk` as a fresh coroutine, dispatching whatever it performs.
    ///
    /// Effects not bound here are forwarded to the enclosing `handle` call
    /// on the same context. An error returned by `thunk` is returned as is;
    /// a panic inside it is re-raised here.
    ///
    /// Each forwarded effect that an enclosing handler resumes keeps one
    /// thread parked until the whole computation finishes, so a body that
    /// performs `n` such effects holds about `n` threads at its peak. Call
    /// depth is spread over extra threads sized by `CoConfig::stack_size`
    /// rather than growing the caller's stack.
    pub fn handle<F>(&self, ctx: &Context, thunk: F) -> Result<T>
    where
        F: FnOnce(&Context) -> Result<V> + Send + 'static,
    {
        let body_ctx = ctx.clone();
        let co = ctx.spawn(move |_, _| thunk(&body_ctx).map(|v| Signal::Return(Box::new(v))))?;

        let scope = Arc::new(Scope {
            ctx: ctx.clone(),
            handler: self.clone(),
            co: co,
        });
        scope.cont(Box::new(()))
    }
}

/// One running `handle` call.
struct Scope<V, T> {
    ctx: Context,
    handler: Handler<V, T>,
    co: Coroutine<Value, Signal>,
}

impl<V: Send + 'static, T: Send + 'static> Scope<V, T> {
    fn cont(self: &Arc<Self>, input: Value) -> Result<T> {
        co::nested(self.ctx.config(), move || {
            let signal = self.ctx.resume(&self.co, input)?;
            self.dispatch(signal)
        })
    }

    fn continuation(self: &Arc<Self>) -> RawCont<T> {
        let me = self.clone();
        Box::new(move |v: Value| me.cont(v))
    }

    fn dispatch(self: &Arc<Self>, signal: Signal) -> Result<T> {
        match signal {
            Signal::Perform(instance) => {
                let k = self.continuation();
                match self.handler.effects.get(&instance.id) {
                    Some(f) => {
                        debug!(coroutine = self.co.id(), effect = %instance.id, "handling effect");
                        f(instance.arg, k)
                    }
                    None => self.resend(instance, k),
                }
            }
            Signal::Resend(Resend { instance, cont }) => {
                let k = self.rehandle(cont);
                match self.handler.effects.get(&instance.id) {
                    Some(f) => {
                        debug!(coroutine = self.co.id(), effect = %instance.id, "handling resent effect");
                        f(instance.arg, k)
                    }
                    None => self.resend(instance, k),
                }
            }
            Signal::Return(v) => (self.handler.value)(downcast::<V>(v)?),
        }
    }

    /// Lets an enclosing scope handle `instance`. Whatever that scope
    /// eventually resumes us with is the result of this whole scope.
    fn resend(&self, instance: Instance, k: RawCont<T>) -> Result<T> {
        let k: RawCont<Value> = Box::new(move |v: Value| k(v).map(|t| Box::new(t) as Value));
        downcast(instance.resend(&self.ctx, k)?)
    }

    /// Wraps a continuation that came up from an inner scope so that running
    /// it happens under a fresh copy of this scope's handlers. Effects the
    /// inner computation performs after being resumed still reach us, even
    /// though control has since passed through outer scopes.
    fn rehandle(self: &Arc<Self>, k: RawCont<Value>) -> RawCont<T> {
        let me = self.clone();
        Box::new(move |a: Value| {
            debug!(coroutine = me.co.id(), "rehandling continuation");
            let outer = OnceInvokeBox::new(me.continuation());
            let fresh: Handler<Value, T> = me.handler.clone().to(move |v: Value| outer.call(v));
            fresh.handle(&me.ctx, move |_| k(a))
        })
    }
}
