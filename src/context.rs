use std::fmt;
use std::sync::Arc;

use crate::co::{self, Coroutine, Point, Yielder};
use crate::config::CoConfig;
use crate::eff::{Signal, Value};
use crate::error::Result;
use crate::stack::SuspendStack;

lazy_static! {
    static ref GLOBAL: Context = Context::new();
}

/// Everything handlers and performs running under one computation share:
/// the pending resume points and the coroutine configuration.
///
/// Cheap to clone. Independent computations should use independent
/// contexts.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

struct Inner {
    points: SuspendStack<Point<Value, Signal>>,
    config: CoConfig,
}

impl Default for Context {
    fn default() -> Self {
        Context::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Context")
            .field("pending", &self.pending())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Context {
    pub fn new() -> Context {
        Context::with_config(CoConfig::default())
    }

    pub fn with_config(config: CoConfig) -> Context {
        Context {
            inner: Arc::new(Inner {
                points: SuspendStack::new(),
                config: config,
            }),
        }
    }

    /// The process-wide default context.
    pub fn global() -> Context {
        GLOBAL.clone()
    }

    pub fn config(&self) -> &CoConfig {
        &self.inner.config
    }

    /// Number of resume calls currently waiting on a body.
    pub fn pending(&self) -> usize {
        self.inner.points.len()
    }

    pub(crate) fn spawn<F>(&self, f: F) -> Result<Coroutine<Value, Signal>>
    where
        F: FnOnce(Value, &Yielder<Value, Signal>) -> Result<Signal> + Send + 'static,
    {
        Coroutine::with_config(&self.inner.config, f)
    }

    pub(crate) fn resume(&self, co: &Coroutine<Value, Signal>, input: Value) -> Result<Signal> {
        co.resume_on(&self.inner.points, input)
    }

    pub(crate) fn suspend(&self, out: Signal) -> Result<Value> {
        co::suspend(&self.inner.points, out)
    }
}
