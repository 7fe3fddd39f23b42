use std::error::Error as StdError;
use std::io;

use crate::co::State;
use crate::eff::EffectId;

pub type BoxError = Box<dyn StdError + Send + Sync>;

pub type Result<T> = ::std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("coroutine cannot resume: {0}")]
    CannotResume(State),

    #[error("coroutine cannot be canceled: {0}")]
    CannotCancel(State),

    #[error("coroutine cannot yield: {0}")]
    CannotYield(State),

    #[error("coroutine canceled")]
    Canceled,

    /// A yield was issued outside any body a pending resume is waiting on.
    #[error("no pending resume point to yield to")]
    NoResumePoint,

    #[error("unhandled effect {0}")]
    UnhandledEffect(EffectId),

    #[error("continuation already resumed")]
    ContinuationReused,

    #[error("value is not a {expected}")]
    TypeMismatch { expected: &'static str },

    #[error("coroutine thread detached")]
    Detached,

    #[error("failed to spawn coroutine thread")]
    Spawn(#[source] io::Error),

    /// An error produced by user code, carried through unchanged.
    #[error(transparent)]
    Body(BoxError),
}

impl Error {
    pub fn body<E: Into<BoxError>>(e: E) -> Error {
        Error::Body(e.into())
    }

    pub fn is_canceled(&self) -> bool {
        match *self {
            Error::Canceled => true,
            _ => false,
        }
    }

    /// Looks through a `Body` error for a user error of type `E`.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        match *self {
            Error::Body(ref e) => e.downcast_ref::<E>(),
            _ => None,
        }
    }
}
