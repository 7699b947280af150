//! Dispatch composition.
//!
//! Middleware wraps the store's dispatch function. Each layer receives the
//! next dispatch in the chain and returns a new one; the first middleware
//! given to the builder is the outermost layer.

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::error::Result;

/// Cloneable dispatch function.
#[derive(Clone)]
pub struct Dispatcher {
    dispatch: Rc<dyn Fn(Value) -> Result<Value>>,
}

impl Dispatcher {
    /// Wrap a dispatch function.
    pub fn new<F>(dispatch: F) -> Self
    where
        F: Fn(Value) -> Result<Value> + 'static,
    {
        Self {
            dispatch: Rc::new(dispatch),
        }
    }

    /// Dispatch an action through this function.
    pub fn dispatch(&self, action: impl Into<Value>) -> Result<Value> {
        (self.dispatch)(action.into())
    }

    /// Returns true if both handles wrap the same function.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.dispatch, &other.dispatch)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

/// What a middleware can reach of the store it is applied to.
pub struct MiddlewareApi<S> {
    pub(crate) get_state: Rc<dyn Fn() -> Result<Rc<S>>>,
    pub(crate) dispatch: Dispatcher,
}

impl<S> MiddlewareApi<S> {
    /// Read the store's current state.
    pub fn get_state(&self) -> Result<Rc<S>> {
        (self.get_state)()
    }

    /// Dispatch through the whole chain, starting at the outermost layer.
    pub fn dispatch(&self, action: impl Into<Value>) -> Result<Value> {
        self.dispatch.dispatch(action)
    }
}

impl<S> Clone for MiddlewareApi<S> {
    fn clone(&self) -> Self {
        Self {
            get_state: Rc::clone(&self.get_state),
            dispatch: self.dispatch.clone(),
        }
    }
}

/// A layer around the store's dispatch.
pub trait Middleware<S> {
    /// Return a dispatch function that eventually calls `next`, or not.
    fn wrap(&self, api: &MiddlewareApi<S>, next: Dispatcher) -> Dispatcher;
}

impl<S, F> Middleware<S> for F
where
    F: Fn(&MiddlewareApi<S>, Dispatcher) -> Dispatcher,
{
    fn wrap(&self, api: &MiddlewareApi<S>, next: Dispatcher) -> Dispatcher {
        self(api, next)
    }
}

/// Compose single-argument functions from right to left.
///
/// `compose(vec![f, g, h])(x)` is `f(g(h(x)))`; an empty list is the
/// identity.
pub fn compose<T: 'static>(funcs: Vec<Box<dyn Fn(T) -> T>>) -> Box<dyn Fn(T) -> T> {
    let identity: Box<dyn Fn(T) -> T> = Box::new(|arg| arg);
    funcs
        .into_iter()
        .rev()
        .fold(identity, |inner, outer| -> Box<dyn Fn(T) -> T> {
            Box::new(move |arg| outer(inner(arg)))
        })
}
