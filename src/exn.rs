//! Exceptions as an effect.
//!
//! ```ignore
//! let res = exn::try_with(&ctx, |ctx| {
//!     let n: i32 = exn::check(ctx, "42".parse::<i32>())?;
//!     Ok(n)
//! }, exn::Handlers::new().on::<ParseIntError, _>(|_| Ok(0)));
//! ```

use std::convert::Infallible;
use std::error::Error as StdError;
use std::sync::Arc;

use crate::context::Context;
use crate::eff::Effect;
use crate::error::{BoxError, Result};
use crate::handler::Handler;

pub type Raised = BoxError;

lazy_static! {
    static ref EXCEPTION: Effect<Raised, Infallible> = Effect::new();
}

type Arm<T> = Arc<dyn Fn(Raised) -> Result<T> + Send + Sync>;
type Matcher = fn(&(dyn StdError + 'static)) -> bool;

/// Raises `e` to the nearest enclosing `try_with`.
///
/// Only returns once that `try_with` has finished without resuming us, as
/// `Error::Canceled`; propagate it.
pub fn raise<T, E: Into<Raised>>(ctx: &Context, e: E) -> Result<T> {
    match EXCEPTION.perform(ctx, e.into())? {}
}

/// Raises the error of `r`, if any.
pub fn check<T, E: Into<Raised>>(ctx: &Context, r: ::std::result::Result<T, E>) -> Result<T> {
    match r {
        Ok(v) => Ok(v),
        Err(e) => raise(ctx, e),
    }
}

/// Error-kind arms of a `try_with`.
pub struct Handlers<T> {
    arms: Vec<(Matcher, Arm<T>)>,
    any: Option<Arm<T>>,
}

impl<T> Clone for Handlers<T> {
    fn clone(&self) -> Self {
        Handlers {
            arms: self.arms.clone(),
            any: self.any.clone(),
        }
    }
}

impl<T> Default for Handlers<T> {
    fn default() -> Self {
        Handlers::new()
    }
}

fn is_kind<E: StdError + 'static>(e: &(dyn StdError + 'static)) -> bool {
    e.is::<E>()
}

impl<T> Handlers<T> {
    pub fn new() -> Handlers<T> {
        Handlers {
            arms: Vec::new(),
            any: None,
        }
    }

    /// Catches errors that are, or are caused by, an `E`.
    pub fn on<E, F>(mut self, f: F) -> Handlers<T>
    where
        E: StdError + 'static,
        F: Fn(Raised) -> Result<T> + Send + Sync + 'static,
    {
        let arm: Arm<T> = Arc::new(f);
        self.arms.push((is_kind::<E> as Matcher, arm));
        self
    }

    /// Catches anything no other arm matches.
    pub fn any<F>(mut self, f: F) -> Handlers<T>
    where
        F: Fn(Raised) -> Result<T> + Send + Sync + 'static,
    {
        self.any = Some(Arc::new(f));
        self
    }

    /// Picks the arm whose kind appears closest to the top of the error's
    /// cause chain; earlier arms win ties.
    fn select(&self, e: &(dyn StdError + 'static)) -> Option<&Arm<T>> {
        let mut best: Option<(usize, &Arm<T>)> = None;
        for &(matches, ref arm) in &self.arms {
            let mut depth = 0;
            let mut cur = Some(e);
            while let Some(c) = cur {
                if best.map_or(false, |(d, _)| depth >= d) {
                    break;
                }
                if matches(c) {
                    best = Some((depth, arm));
                    break;
                }
                depth += 1;
                cur = c.source();
            }
        }
        best.map(|(_, arm)| arm).or_else(|| self.any.as_ref())
    }
}

/// Runs `f`, handing anything it raises to the matching arm of `handlers`.
/// Errors no arm matches are raised again to the enclosing `try_with`.
pub fn try_with<T, F>(ctx: &Context, f: F, handlers: Handlers<T>) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&Context) -> Result<T> + Send + 'static,
{
    let outer = ctx.clone();
    Handler::identity()
        .on(&*EXCEPTION, move |e: Raised, _| {
            let arm = handlers.select(&*e).cloned();
            match arm {
                Some(arm) => arm(e),
                None => {
                    debug!(error = %e, "no arm matched, raising again");
                    raise(&outer, e)
                }
            }
        })
        .handle(ctx, f)
}
