use std::any::Any;

use crate::error::{Error, Result};

/// What a resumer hands to a suspended body.
pub(crate) enum Input<T> {
    Value(T),
    Cancel,
}

/// What a body hands back to its resumer.
pub(crate) enum Output<T> {
    Value(T),
    Error(Error),
    Panic(Box<dyn Any + Send>),
}

impl<T> From<Result<T>> for Output<T> {
    fn from(r: Result<T>) -> Output<T> {
        match r {
            Ok(v) => Output::Value(v),
            Err(e) => Output::Error(e),
        }
    }
}
