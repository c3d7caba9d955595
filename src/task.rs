//! Single computation steps.

use std::fmt;
use std::sync::{Arc, RwLock};

use crate::context::{Key, Resolved, SharedSignature, Signature};
use crate::error::RuntimeError;
use crate::{Context, Invoke, KeyflowError, Strategy, Value};

/// Function pointer called with resolved arguments. The concrete callable
/// type is erased behind the `dyn Fn` existential type.
type TaskFnPtr = Arc<dyn Fn(Resolved) -> Result<Value, RuntimeError> + Send + Sync>;

/// Wraps `TaskFnPtr` and implements the `Debug` trait for function pointer.
#[derive(Clone)]
pub struct TaskFn(TaskFnPtr);

impl TaskFn {
    pub fn new<F>(func: F) -> Self
    where
        F: Fn(Resolved) -> Result<Value, RuntimeError> + Send + Sync + 'static,
    {
        TaskFn(Arc::new(func))
    }

    /// Call the contained function pointer.
    pub fn call(&self, args: Resolved) -> Result<Value, RuntimeError> {
        (self.0)(args)
    }
}

impl fmt::Debug for TaskFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskFn(*)")
    }
}

/// One computation step: a function, its argument template, an optional
/// output key, and the strategy that executes it.
///
/// The four parts are fixed at construction. The template's contents stay
/// reachable through the shared handle, see [`SharedSignature`].
pub struct Task {
    func: TaskFn,
    signature: SharedSignature,
    put_to: Option<Key>,
    strategy: Arc<dyn Strategy<Task>>,
}

impl Task {
    pub fn new(func: TaskFn, signature: Signature, put_to: impl Into<Option<Key>>) -> Self {
        Self::shared(func, Arc::new(RwLock::new(signature)), put_to)
    }

    /// Build a task around an externally shared template. The caller keeps
    /// its clone of the handle to patch the template between runs or to
    /// share it across tasks.
    pub fn shared(
        func: TaskFn,
        signature: SharedSignature,
        put_to: impl Into<Option<Key>>,
    ) -> Self {
        Self {
            func,
            signature,
            put_to: put_to.into(),
            strategy: Arc::new(Direct),
        }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn Strategy<Task>>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn func(&self) -> &TaskFn {
        &self.func
    }

    pub fn signature(&self) -> &SharedSignature {
        &self.signature
    }

    pub fn put_to(&self) -> Option<&Key> {
        self.put_to.as_ref()
    }
}

impl Invoke for Task {
    fn invoke(&self, context: &mut Context) -> Result<Option<Value>, KeyflowError> {
        self.strategy.run(self, context)
    }
}

/// The default task strategy: resolve the template, call the function,
/// store the result under `put_to` when one is set, return the result
/// either way.
#[derive(Debug, Clone, Copy, Default)]
pub struct Direct;

impl Strategy<Task> for Direct {
    fn run(&self, task: &Task, context: &mut Context) -> Result<Option<Value>, KeyflowError> {
        let resolved = {
            let signature = task.signature().read().unwrap();
            context.resolve(&signature)?
        };

        let result = task.func().call(resolved)?;

        if let Some(key) = task.put_to() {
            tracing::trace!(key = %key, "storing task result");
            context.insert(key, result.clone());
        }

        Ok(Some(result))
    }
}
