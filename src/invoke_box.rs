use std::sync::{Mutex, PoisonError};

use crate::error::{Error, Result};

/// Lets a `FnOnce` stand where an `Fn` is required; calls after the first
/// fail with `ContinuationReused`.
pub struct OnceInvokeBox<A, R> {
    inner: Mutex<Option<Box<dyn FnOnce(A) -> Result<R> + Send>>>,
}

impl<A, R> OnceInvokeBox<A, R> {
    pub fn new<F: FnOnce(A) -> Result<R> + Send + 'static>(f: F) -> OnceInvokeBox<A, R> {
        OnceInvokeBox {
            inner: Mutex::new(Some(Box::new(f))),
        }
    }

    pub fn call(&self, a: A) -> Result<R> {
        let target = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match target {
            Some(f) => f(a),
            None => Err(Error::ContinuationReused),
        }
    }
}
