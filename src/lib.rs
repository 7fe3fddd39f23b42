#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate tracing;

pub mod co;
pub mod config;
pub mod context;
pub mod eff;
pub mod error;
pub mod exn;
pub mod handler;
pub mod stack;
mod invoke_box;
mod message;

pub use co::{Coroutine, Point, State, Yielder};
pub use config::CoConfig;
pub use context::Context;
pub use eff::{Effect, EffectId};
pub use error::{BoxError, Error, Result};
pub use handler::{Cont, Handler};
pub use stack::SuspendStack;
