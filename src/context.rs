//! The shared store every step reads from and writes to.
//!
//! Steps in a run never hand values to each other directly. A producer
//! stores its result under a [`Key`], and a consumer puts an [`Arg::Lookup`]
//! for that key into its [`Signature`]. [`Context::resolve`] turns the
//! signature into concrete call arguments right before the call, so the
//! wiring between steps lives entirely in the keys.

use std::any::type_name;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};

use anyhow::anyhow;
use serde::Serialize;

use crate::Value;
use crate::error::KeyflowError;

/// A context key. String keys are the common case, integer keys are legal
/// as well; both are cheap to clone and hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum Key {
    Str(Arc<str>),
    Int(i64),
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Key::Str(Arc::from(key))
    }
}

impl From<String> for Key {
    fn from(key: String) -> Self {
        Key::Str(Arc::from(key))
    }
}

impl From<Arc<str>> for Key {
    fn from(key: Arc<str>) -> Self {
        Key::Str(key)
    }
}

impl From<i64> for Key {
    fn from(key: i64) -> Self {
        Key::Int(key)
    }
}

impl From<&Key> for Key {
    fn from(key: &Key) -> Self {
        key.clone()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Str(key) => write!(f, "{key}"),
            Key::Int(key) => write!(f, "{key}"),
        }
    }
}

/// One entry of a [`Signature`], either a literal or an indirect reference
/// resolved against the context at call time.
#[derive(Debug, Clone)]
pub enum Arg {
    /// Pass this value through unchanged.
    Literal(Value),
    /// Read the value stored under this key when the call happens.
    Lookup(Key),
}

impl Arg {
    /// Wrap a concrete value into a literal entry.
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Arg::Literal(Arc::new(value))
    }

    /// Defer to the context: the value under `key` at call time.
    pub fn lookup(key: impl Into<Key>) -> Self {
        Arg::Lookup(key.into())
    }
}

/// The argument template of a task: ordered positional entries plus named
/// entries.
///
/// Both fields are public on purpose. Templates are plain data and callers
/// patch them between invocations, typically by prepending a lookup for a
/// running value when assembling a chained pipeline.
#[derive(Debug, Clone, Default)]
pub struct Signature {
    pub args: Vec<Arg>,
    pub kwargs: BTreeMap<String, Arg>,
}

impl Signature {
    pub fn new(args: impl IntoIterator<Item = Arg>) -> Self {
        Self {
            args: args.into_iter().collect(),
            kwargs: BTreeMap::new(),
        }
    }

    /// Add a named entry, builder style.
    pub fn kwarg(mut self, name: impl Into<String>, arg: Arg) -> Self {
        self.kwargs.insert(name.into(), arg);
        self
    }
}

/// A signature behind a shared handle.
///
/// A [`Task`](crate::Task) keeps its template behind this handle so a caller
/// can hold a clone of the `Arc`, mutate the template between runs, or share
/// one template across several tasks. The engine is single-threaded; the
/// lock only makes the sharing explicit.
pub type SharedSignature = Arc<RwLock<Signature>>;

/// A signature after resolution: every entry replaced by a concrete value.
#[derive(Debug, Clone, Default)]
pub struct Resolved {
    pub args: Vec<Value>,
    pub kwargs: BTreeMap<String, Value>,
}

impl Resolved {
    /// Downcast the positional argument at `index`.
    pub fn arg<T: 'static>(&self, index: usize) -> anyhow::Result<&T> {
        let value = self
            .args
            .get(index)
            .ok_or_else(|| anyhow!("missing positional argument {index}"))?;
        value
            .downcast_ref::<T>()
            .ok_or_else(|| anyhow!("positional argument {index} is not a {}", type_name::<T>()))
    }

    /// Downcast the named argument `name`.
    pub fn kwarg<T: 'static>(&self, name: &str) -> anyhow::Result<&T> {
        let value = self
            .kwargs
            .get(name)
            .ok_or_else(|| anyhow!("missing named argument '{name}'"))?;
        value
            .downcast_ref::<T>()
            .ok_or_else(|| anyhow!("named argument '{name}' is not a {}", type_name::<T>()))
    }
}

/// The single shared mutable store of a run.
///
/// A context is created by the caller, passed by mutable reference through
/// the whole call tree, and read back after the run. The engine never copies
/// it. After a failed run it is left exactly as the failing step found it,
/// including any writes made by earlier steps.
#[derive(Debug, Default)]
pub struct Context {
    values: HashMap<Key, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a pre-erased value, overwriting any previous one.
    pub fn insert(&mut self, key: impl Into<Key>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    /// Store a concrete value, overwriting any previous one.
    pub fn put<T: Send + Sync + 'static>(
        &mut self,
        key: impl Into<Key>,
        value: T,
    ) -> Option<Value> {
        self.insert(key, Arc::new(value))
    }

    pub fn get(&self, key: impl Into<Key>) -> Option<&Value> {
        self.values.get(&key.into())
    }

    /// Read a value and downcast it to a concrete type.
    pub fn get_as<T: 'static>(&self, key: impl Into<Key>) -> Option<&T> {
        self.get(key).and_then(|value| value.downcast_ref::<T>())
    }

    /// Read a value, failing with [`KeyflowError::KeyNotFound`] when the key
    /// is absent. Clones the `Arc`, not the data.
    pub fn lookup(&self, key: &Key) -> Result<Value, KeyflowError> {
        self.values
            .get(key)
            .cloned()
            .ok_or_else(|| KeyflowError::KeyNotFound(key.clone()))
    }

    pub fn contains(&self, key: impl Into<Key>) -> bool {
        self.values.contains_key(&key.into())
    }

    pub fn remove(&mut self, key: impl Into<Key>) -> Option<Value> {
        self.values.remove(&key.into())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.values.keys()
    }

    /// Resolve a signature into concrete call arguments.
    ///
    /// Literal entries pass through unchanged, lookup entries are read from
    /// the store. A missing key fails the whole resolution; nothing is
    /// mutated either way.
    pub fn resolve(&self, signature: &Signature) -> Result<Resolved, KeyflowError> {
        let args = signature
            .args
            .iter()
            .map(|arg| self.resolve_arg(arg))
            .collect::<Result<Vec<_>, _>>()?;

        let kwargs = signature
            .kwargs
            .iter()
            .map(|(name, arg)| Ok((name.clone(), self.resolve_arg(arg)?)))
            .collect::<Result<BTreeMap<_, _>, KeyflowError>>()?;

        Ok(Resolved { args, kwargs })
    }

    fn resolve_arg(&self, arg: &Arg) -> Result<Value, KeyflowError> {
        match arg {
            Arg::Literal(value) => Ok(value.clone()),
            Arg::Lookup(key) => self.lookup(key),
        }
    }
}

impl FromIterator<(Key, Value)> for Context {
    fn from_iter<I: IntoIterator<Item = (Key, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
