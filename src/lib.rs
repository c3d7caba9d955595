#![forbid(unsafe_code)]
#![doc = include_str!("../README.md")]

mod context;
mod error;
mod graph;
#[cfg(feature = "logging")]
pub mod logging;
mod task;
mod workflow;

use std::any::Any;
use std::sync::Arc;

pub use crate::context::{Arg, Context, Key, Resolved, SharedSignature, Signature};
pub use crate::error::{KeyflowError, RuntimeError};
pub use crate::graph::{Graph, LevelOrder, Observer, Traverse, Visit};
pub use crate::task::{Direct, Task, TaskFn};
pub use crate::workflow::{Fold, Pipeline, Sequence, Workflow};

/// A type-erased, thread-safe container for anything stored in a [`Context`]
/// or returned from a step.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Wrap a concrete value into a [`Value`].
pub fn value<T: Send + Sync + 'static>(value: T) -> Value {
    Arc::new(value)
}

/// The shared capability of every runnable unit: execute against a context,
/// possibly mutate it, return a result.
///
/// Implemented by [`Task`], [`Workflow`], [`Pipeline`] and [`Graph`], and by
/// any plain closure over `&mut Context`, so ad-hoc steps can appear in item
/// lists next to fully-built tasks.
pub trait Invoke: Send + Sync {
    fn invoke(&self, context: &mut Context) -> Result<Option<Value>, KeyflowError>;
}

impl<F> Invoke for F
where
    F: Fn(&mut Context) -> Result<Option<Value>, KeyflowError> + Send + Sync,
{
    fn invoke(&self, context: &mut Context) -> Result<Option<Value>, KeyflowError> {
        self(context)
    }
}

/// Wrap a closure into an invocable item.
pub fn step<F>(func: F) -> Arc<dyn Invoke>
where
    F: Fn(&mut Context) -> Result<Option<Value>, KeyflowError> + Send + Sync + 'static,
{
    Arc::new(func)
}

/// Pluggable execution behavior for an owner type.
///
/// Each runnable unit delegates its [`Invoke::invoke`] to one strategy
/// chosen at construction. Substituting behavior means implementing this
/// trait for the owner and passing the instance in; composing behavior means
/// wrapping an existing strategy and delegating to it.
pub trait Strategy<O>: Send + Sync {
    fn run(&self, owner: &O, context: &mut Context) -> Result<Option<Value>, KeyflowError>;
}
