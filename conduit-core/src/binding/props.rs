//! Props records passed to bound instances.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::equality::{shallow_equal, SameValue};
use crate::error::Result;
use crate::store::Dispatcher;

/// Callable prop, typically a bound action creator.
pub type Handler = Rc<dyn Fn(Value) -> Result<Value>>;

/// One entry of a [`Props`] record.
#[derive(Clone)]
pub enum Prop {
    /// Plain data.
    Value(Value),
    /// A function. Compared by identity.
    Handler(Handler),
}

impl Prop {
    /// Wrap a closure as a handler prop.
    pub fn handler<F>(f: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + 'static,
    {
        Prop::Handler(Rc::new(f))
    }

    /// The data, if this is a value prop.
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Prop::Value(value) => Some(value),
            Prop::Handler(_) => None,
        }
    }

    /// The function, if this is a handler prop.
    pub fn as_handler(&self) -> Option<&Handler> {
        match self {
            Prop::Handler(handler) => Some(handler),
            Prop::Value(_) => None,
        }
    }
}

impl SameValue for Prop {
    fn same_value(&self, other: &Self) -> bool {
        match (self, other) {
            (Prop::Value(a), Prop::Value(b)) => a == b,
            (Prop::Handler(a), Prop::Handler(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<Value> for Prop {
    fn from(value: Value) -> Self {
        Prop::Value(value)
    }
}

impl From<Dispatcher> for Prop {
    fn from(dispatcher: Dispatcher) -> Self {
        Prop::handler(move |action| dispatcher.dispatch(action))
    }
}

impl fmt::Debug for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prop::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Prop::Handler(_) => f.write_str("Handler(..)"),
        }
    }
}

/// Ordered key-value record.
///
/// Inserting an existing key replaces its prop in place, so merging records
/// left to right keeps first-seen key order with last-writer-wins values.
#[derive(Clone, Default, Debug)]
pub struct Props {
    entries: IndexMap<String, Prop>,
}

impl Props {
    /// An empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, prop: impl Into<Prop>) -> Self {
        self.insert(key, prop);
        self
    }

    /// Insert or replace `key`.
    pub fn insert(&mut self, key: impl Into<String>, prop: impl Into<Prop>) {
        self.entries.insert(key.into(), prop.into());
    }

    /// Look up `key`.
    pub fn get(&self, key: &str) -> Option<&Prop> {
        self.entries.get(key)
    }

    /// Look up a value prop.
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.get(key).and_then(Prop::as_value)
    }

    /// Look up a handler prop.
    pub fn handler(&self, key: &str) -> Option<&Handler> {
        self.get(key).and_then(Prop::as_handler)
    }

    /// Call the handler under `key`. Returns `None` when there is none.
    pub fn call(&self, key: &str, arg: Value) -> Option<Result<Value>> {
        self.handler(key).map(|handler| handler(arg))
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Prop)> {
        self.entries.iter().map(|(key, prop)| (key.as_str(), prop))
    }

    /// Copy every entry of `other` over this record.
    pub fn assign(&mut self, other: &Props) {
        for (key, prop) in &other.entries {
            self.entries.insert(key.clone(), prop.clone());
        }
    }

    /// Merge records left to right; later records win on shared keys.
    pub fn merged<'a>(layers: impl IntoIterator<Item = &'a Props>) -> Props {
        let mut merged = Props::new();
        for layer in layers {
            merged.assign(layer);
        }
        merged
    }

    /// One-level comparison: same keys, equal values, identical handlers.
    pub fn shallow_eq(&self, other: &Props) -> bool {
        shallow_equal(&self.entries, &other.entries)
    }
}

impl<K: Into<String>, P: Into<Prop>> FromIterator<(K, P)> for Props {
    fn from_iter<I: IntoIterator<Item = (K, P)>>(iter: I) -> Self {
        let mut props = Props::new();
        for (key, prop) in iter {
            props.insert(key, prop);
        }
        props
    }
}
