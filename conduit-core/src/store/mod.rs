//! The Store
//!
//! A store holds one state tree and is the only place it can change. The
//! state is replaced wholesale by the reducer on every dispatch and handed
//! out as an `Rc`, so every reader holds a version frozen in time.
//!
//! # Dispatch
//!
//! 1. The action is validated: it must be a key-value record with a
//!    defined `type`.
//!
//! 2. The reducer runs with the dispatching flag set. While it is set,
//!    `get_state`, `subscribe`, unsubscribing and nested dispatches fail.
//!    The flag is released by a guard, so a panicking reducer leaves the
//!    store usable.
//!
//! 3. The listener list is snapshotted and every listener registered before
//!    the dispatch began is called once, in subscription order. Listeners
//!    may subscribe, unsubscribe and dispatch; none of it affects the
//!    snapshot being iterated.
//!
//! # Sharing
//!
//! `Store` is a cheap handle; clones share the same state. It is
//! single-threaded by construction (`!Send`).

mod action;
mod listeners;
mod middleware;
mod reducer;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::config::Config;
use crate::error::{Error, Result};

pub use action::{Action, ActionType};
pub use listeners::{ListenerId, Unsubscribe};
pub use middleware::{compose, Dispatcher, Middleware, MiddlewareApi};
pub use reducer::{combine_reducers, CombinedReducer, CombinedState, Reducer};

use listeners::ListenerRegistry;

/// Anything that can register a change listener.
///
/// The subscription tree roots itself on a `ListenerSource`, which keeps it
/// independent of the store's state type.
pub trait ListenerSource {
    /// Register `listener` to be called after every state change.
    fn subscribe_listener(&self, listener: Rc<dyn Fn()>) -> Result<Unsubscribe>;
}

/// A state container.
pub struct Store<S> {
    inner: Rc<StoreInner<S>>,
}

struct StoreInner<S> {
    /// Current state; replaced wholesale by every reduction.
    state: RefCell<Rc<S>>,
    /// Swapped by `replace_reducer`.
    reducer: RefCell<Rc<dyn Reducer<S>>>,
    /// Registered listeners in subscription order.
    listeners: RefCell<ListenerRegistry>,
    /// Set while the reducer runs.
    is_dispatching: Cell<bool>,
    /// Outermost dispatch: the base dispatch wrapped by any middleware.
    dispatcher: RefCell<Dispatcher>,
    /// Settings handed to bindings created on this store.
    config: Config,
}

/// Holds the dispatching flag for the duration of a reducer call.
struct DispatchGuard<'a> {
    flag: &'a Cell<bool>,
}

impl<'a> DispatchGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self { flag }
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(false);
    }
}

impl<S: 'static> StoreInner<S> {
    fn dispatch_base(&self, action: Value) -> Result<Value> {
        let action = Action::from_value(action)?;

        if self.is_dispatching.get() {
            return Err(Error::ReentrantDispatch);
        }

        let reducer = self.reducer.borrow().clone();
        let previous = self.state.borrow().clone();
        {
            let _guard = DispatchGuard::enter(&self.is_dispatching);
            let next = reducer.reduce(Some(previous), &action);
            *self.state.borrow_mut() = next;
        }

        let listeners = self.listeners.borrow_mut().snapshot();
        trace!(
            action_type = %action.kind(),
            listeners = listeners.len(),
            "dispatch"
        );
        for entry in listeners.iter() {
            (entry.callback)();
        }

        Ok(action.into_value())
    }
}

impl<S: 'static> Store<S> {
    /// Create a store, initializing the state from the reducer's default.
    pub fn new<R>(reducer: R) -> Self
    where
        R: Reducer<S> + 'static,
    {
        Self::builder(reducer).build()
    }

    /// Create a store whose reducer starts from `state`.
    pub fn with_state<R>(reducer: R, state: S) -> Self
    where
        R: Reducer<S> + 'static,
    {
        Self::builder(reducer).preloaded_state(state).build()
    }

    /// Start configuring a store.
    pub fn builder<R>(reducer: R) -> StoreBuilder<S>
    where
        R: Reducer<S> + 'static,
    {
        StoreBuilder {
            reducer: Rc::new(reducer),
            preloaded: None,
            middleware: Vec::new(),
            config: Config::default(),
        }
    }

    fn from_weak(weak: &Weak<StoreInner<S>>) -> Result<Self> {
        weak.upgrade()
            .map(|inner| Self { inner })
            .ok_or(Error::StoreDropped)
    }

    /// Read the current state.
    pub fn get_state(&self) -> Result<Rc<S>> {
        if self.inner.is_dispatching.get() {
            return Err(Error::IllegalStateAccess);
        }
        Ok(self.inner.state.borrow().clone())
    }

    /// The current state, for readers that never run inside a reducer.
    pub(crate) fn state_snapshot(&self) -> Rc<S> {
        self.inner.state.borrow().clone()
    }

    /// Dispatch an action through the middleware chain.
    ///
    /// Returns the action unchanged unless a middleware says otherwise.
    pub fn dispatch(&self, action: impl Into<Value>) -> Result<Value> {
        let dispatcher = self.inner.dispatcher.borrow().clone();
        dispatcher.dispatch(action)
    }

    /// Serialize `action` and dispatch it.
    pub fn dispatch_action<A: Serialize>(&self, action: &A) -> Result<Value> {
        let value = serde_json::to_value(action).map_err(Error::Serialize)?;
        self.dispatch(value)
    }

    /// The outermost dispatch function, as a standalone handle.
    pub fn dispatcher(&self) -> Dispatcher {
        self.inner.dispatcher.borrow().clone()
    }

    /// Register a change listener.
    ///
    /// The listener runs after every dispatch, starting with the next one.
    pub fn subscribe<F>(&self, listener: F) -> Result<Unsubscribe>
    where
        F: Fn() + 'static,
    {
        self.subscribe_rc(Rc::new(listener))
    }

    fn subscribe_rc(&self, listener: Rc<dyn Fn()>) -> Result<Unsubscribe> {
        if self.inner.is_dispatching.get() {
            return Err(Error::SubscribeDuringDispatch);
        }

        let id = self.inner.listeners.borrow_mut().add(listener);
        trace!(?id, "listener subscribed");

        let weak = Rc::downgrade(&self.inner);
        let subscribed = Cell::new(true);
        Ok(Unsubscribe::new(move || {
            if !subscribed.get() {
                return Ok(());
            }
            let Some(inner) = weak.upgrade() else {
                subscribed.set(false);
                return Ok(());
            };
            if inner.is_dispatching.get() {
                return Err(Error::UnsubscribeDuringDispatch);
            }

            subscribed.set(false);
            inner.listeners.borrow_mut().remove(id);
            trace!(?id, "listener unsubscribed");
            Ok(())
        }))
    }

    /// Replace the reducer and re-derive the state with it.
    ///
    /// The new reducer receives the current state along with
    /// [`ActionType::REPLACE`], so slices it still knows about are kept.
    pub fn replace_reducer<R>(&self, reducer: R) -> Result<()>
    where
        R: Reducer<S> + 'static,
    {
        if self.inner.is_dispatching.get() {
            return Err(Error::ReentrantDispatch);
        }

        *self.inner.reducer.borrow_mut() = Rc::new(reducer);
        debug!("reducer replaced");
        self.inner
            .dispatch_base(Action::new(ActionType::REPLACE).into_value())?;
        Ok(())
    }

    /// Observe the state: `observer` is called with the current state right
    /// away and again after every dispatch.
    pub fn observe<F>(&self, observer: F) -> Result<Unsubscribe>
    where
        F: Fn(Rc<S>) + 'static,
    {
        observer(self.get_state()?);

        let weak = Rc::downgrade(&self.inner);
        self.subscribe(move || {
            if let Ok(state) = Self::from_weak(&weak).and_then(|store| store.get_state()) {
                observer(state);
            }
        })
    }

    /// The configuration this store was built with.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Number of listeners that will be called by the next dispatch.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    /// Returns true if a reducer is currently running.
    pub fn is_dispatching(&self) -> bool {
        self.inner.is_dispatching.get()
    }

    /// Returns true if both handles refer to the same store.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn apply_middleware(&self, middleware: Vec<Rc<dyn Middleware<S>>>) {
        let state_source = Rc::downgrade(&self.inner);
        let dispatch_source = Rc::downgrade(&self.inner);
        let api = MiddlewareApi {
            get_state: Rc::new(move || Self::from_weak(&state_source)?.get_state()),
            dispatch: Dispatcher::new(move |action| {
                Self::from_weak(&dispatch_source)?.dispatch(action)
            }),
        };

        let chain: Vec<Box<dyn Fn(Dispatcher) -> Dispatcher>> = middleware
            .into_iter()
            .map(|layer| {
                let api = api.clone();
                Box::new(move |next: Dispatcher| layer.wrap(&api, next)) as Box<dyn Fn(Dispatcher) -> Dispatcher>
            })
            .collect();

        let base = self.dispatcher();
        let enhanced = compose(chain)(base);
        *self.inner.dispatcher.borrow_mut() = enhanced;
    }
}

impl<S: 'static> ListenerSource for Store<S> {
    fn subscribe_listener(&self, listener: Rc<dyn Fn()>) -> Result<Unsubscribe> {
        self.subscribe_rc(listener)
    }
}

impl<S> Clone for Store<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<S> fmt::Debug for Store<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("listener_count", &self.inner.listeners.borrow().len())
            .field("is_dispatching", &self.inner.is_dispatching.get())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Configures and builds a [`Store`].
pub struct StoreBuilder<S> {
    reducer: Rc<dyn Reducer<S>>,
    preloaded: Option<Rc<S>>,
    middleware: Vec<Rc<dyn Middleware<S>>>,
    config: Config,
}

impl<S: 'static> StoreBuilder<S> {
    /// Start the reducer from `state` instead of its default.
    pub fn preloaded_state(mut self, state: S) -> Self {
        self.preloaded = Some(Rc::new(state));
        self
    }

    /// Add a middleware layer. Layers added first run first.
    pub fn middleware<M>(mut self, middleware: M) -> Self
    where
        M: Middleware<S> + 'static,
    {
        self.middleware.push(Rc::new(middleware));
        self
    }

    /// Use `config` instead of the defaults.
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Build the store and dispatch the init action.
    pub fn build(self) -> Store<S> {
        // No listeners or middleware exist yet, so initialization reduces
        // directly.
        trace!(action_type = ActionType::INIT, "dispatch");
        let initial = self
            .reducer
            .reduce(self.preloaded, &Action::new(ActionType::INIT));

        let inner = Rc::new_cyclic(|weak: &Weak<StoreInner<S>>| {
            let base = weak.clone();
            StoreInner {
                state: RefCell::new(initial),
                reducer: RefCell::new(self.reducer),
                listeners: RefCell::new(ListenerRegistry::new()),
                is_dispatching: Cell::new(false),
                dispatcher: RefCell::new(Dispatcher::new(move |action| {
                    let inner = base.upgrade().ok_or(Error::StoreDropped)?;
                    inner.dispatch_base(action)
                })),
                config: self.config,
            }
        });

        let store = Store { inner };
        let layers = self.middleware.len();
        if layers > 0 {
            store.apply_middleware(self.middleware);
        }
        debug!(middleware = layers, "store created");
        store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn counter(state: Option<Rc<i64>>, action: &Action) -> Rc<i64> {
        match action.kind_str() {
            Some("INC") => Rc::new(state.map_or(0, |s| *s) + 1),
            Some("ADD") => {
                let amount = action.payload().and_then(Value::as_i64).unwrap_or(0);
                Rc::new(state.map_or(0, |s| *s) + amount)
            }
            _ => state.unwrap_or_else(|| Rc::new(0)),
        }
    }

    #[test]
    fn init_establishes_default_state() {
        let store = Store::new(counter);
        assert_eq!(*store.get_state().unwrap(), 0);
    }

    #[test]
    fn preloaded_state_is_passed_to_init() {
        let store = Store::with_state(counter, 41);
        store.dispatch(json!({ "type": "INC" })).unwrap();
        assert_eq!(*store.get_state().unwrap(), 42);
    }

    #[test]
    fn dispatch_returns_the_action() {
        let store = Store::new(counter);
        let action = json!({ "type": "ADD", "payload": 5, "meta": "x" });
        assert_eq!(store.dispatch(action.clone()).unwrap(), action);
        assert_eq!(*store.get_state().unwrap(), 5);
    }

    #[test]
    fn typed_actions_are_serialized() {
        #[derive(Serialize)]
        struct Add {
            #[serde(rename = "type")]
            kind: &'static str,
            payload: i64,
        }

        let store = Store::new(counter);
        store
            .dispatch_action(&Add {
                kind: "ADD",
                payload: 3,
            })
            .unwrap();
        assert_eq!(*store.get_state().unwrap(), 3);
    }

    #[test]
    fn invalid_actions_fail_before_listeners_run() {
        let store = Store::new(counter);
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let _unsubscribe = store
            .subscribe(move || calls_clone.set(calls_clone.get() + 1))
            .unwrap();

        assert!(matches!(
            store.dispatch(json!([1])),
            Err(Error::InvalidActionShape { kind: "array" })
        ));
        assert!(matches!(
            store.dispatch(json!({ "payload": 1 })),
            Err(Error::MissingActionType)
        ));
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn reducer_cannot_read_state_subscribe_or_dispatch() {
        let slot: Rc<RefCell<Option<Store<i64>>>> = Rc::new(RefCell::new(None));
        let outcomes: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

        let reducer = {
            let slot = slot.clone();
            let outcomes = outcomes.clone();
            move |state: Option<Rc<i64>>, action: &Action| {
                if action.is("PROBE") {
                    if let Some(store) = slot.borrow().as_ref() {
                        let mut log = outcomes.borrow_mut();
                        log.push(format!("{:?}", store.get_state().err()));
                        log.push(format!("{:?}", store.subscribe(|| {}).err()));
                        log.push(format!("{:?}", store.dispatch(json!({ "type": "X" })).err()));
                    }
                }
                state.unwrap_or_else(|| Rc::new(0))
            }
        };

        let store = Store::new(reducer);
        *slot.borrow_mut() = Some(store.clone());
        store.dispatch(json!({ "type": "PROBE" })).unwrap();

        assert_eq!(
            *outcomes.borrow(),
            vec![
                "Some(IllegalStateAccess)".to_string(),
                "Some(SubscribeDuringDispatch)".to_string(),
                "Some(ReentrantDispatch)".to_string(),
            ]
        );
        slot.borrow_mut().take();
    }

    #[test]
    fn unsubscribe_inside_reducer_is_rejected() {
        let slot: Rc<RefCell<Option<Unsubscribe>>> = Rc::new(RefCell::new(None));
        let result: Rc<RefCell<Option<Result<()>>>> = Rc::new(RefCell::new(None));

        let reducer = {
            let slot = slot.clone();
            let result = result.clone();
            move |state: Option<Rc<i64>>, action: &Action| {
                if action.is("PROBE") {
                    if let Some(handle) = slot.borrow().as_ref() {
                        *result.borrow_mut() = Some(handle.unsubscribe());
                    }
                }
                state.unwrap_or_else(|| Rc::new(0))
            }
        };

        let store = Store::new(reducer);
        *slot.borrow_mut() = Some(store.subscribe(|| {}).unwrap());
        store.dispatch(json!({ "type": "PROBE" })).unwrap();

        assert!(matches!(
            result.borrow_mut().take(),
            Some(Err(Error::UnsubscribeDuringDispatch))
        ));
        assert_eq!(store.listener_count(), 1);
    }

    #[test]
    fn panicking_reducer_releases_the_dispatch_flag() {
        let store = Store::new(|state: Option<Rc<i64>>, action: &Action| {
            if action.is("BOOM") {
                panic!("reducer failure");
            }
            state.unwrap_or_else(|| Rc::new(0))
        });

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _ = store.dispatch(json!({ "type": "BOOM" }));
        }));
        assert!(outcome.is_err());
        assert!(!store.is_dispatching());
        assert_eq!(*store.get_state().unwrap(), 0);
    }

    #[test]
    fn listeners_fire_once_in_subscription_order() {
        let store = Store::new(counter);
        let log = Rc::new(RefCell::new(Vec::new()));

        let handles: Vec<_> = (0..3)
            .map(|i| {
                let log = log.clone();
                store.subscribe(move || log.borrow_mut().push(i)).unwrap()
            })
            .collect();

        store.dispatch(json!({ "type": "INC" })).unwrap();
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert_eq!(handles.len(), 3);
    }

    #[test]
    fn double_unsubscribe_is_a_noop() {
        let store = Store::new(counter);
        let a = store.subscribe(|| {}).unwrap();
        let _b = store.subscribe(|| {}).unwrap();

        a.unsubscribe().unwrap();
        a.unsubscribe().unwrap();
        assert_eq!(store.listener_count(), 1);
    }

    #[test]
    fn listeners_may_dispatch() {
        let store = Store::new(counter);
        let inner = store.clone();
        let _unsubscribe = store
            .subscribe(move || {
                if *inner.get_state().unwrap() < 3 {
                    inner.dispatch(json!({ "type": "INC" })).unwrap();
                }
            })
            .unwrap();

        store.dispatch(json!({ "type": "INC" })).unwrap();
        assert_eq!(*store.get_state().unwrap(), 3);
    }

    #[test]
    fn replace_reducer_dispatches_replace() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let store = Store::new(counter);
        store.dispatch(json!({ "type": "INC" })).unwrap();

        let seen_clone = seen.clone();
        store
            .replace_reducer(move |state: Option<Rc<i64>>, action: &Action| {
                seen_clone.borrow_mut().push(action.kind().clone());
                match action.kind_str() {
                    Some("INC") => Rc::new(state.map_or(0, |s| *s) + 100),
                    _ => state.unwrap_or_else(|| Rc::new(0)),
                }
            })
            .unwrap();

        assert_eq!(*seen.borrow(), vec![json!(ActionType::REPLACE)]);
        assert_eq!(*store.get_state().unwrap(), 1);

        store.dispatch(json!({ "type": "INC" })).unwrap();
        assert_eq!(*store.get_state().unwrap(), 101);
    }

    #[test]
    fn middleware_wraps_outermost_first() {
        let log = Rc::new(RefCell::new(Vec::new()));

        let tag = |name: &'static str, log: Rc<RefCell<Vec<String>>>| {
            move |_api: &MiddlewareApi<i64>, next: Dispatcher| {
                let log = log.clone();
                Dispatcher::new(move |action| {
                    log.borrow_mut().push(format!("{name}:before"));
                    let result = next.dispatch(action);
                    log.borrow_mut().push(format!("{name}:after"));
                    result
                })
            }
        };

        let store = Store::builder(counter)
            .middleware(tag("outer", log.clone()))
            .middleware(tag("inner", log.clone()))
            .build();

        store.dispatch(json!({ "type": "INC" })).unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["outer:before", "inner:before", "inner:after", "outer:after"]
        );
        assert_eq!(*store.get_state().unwrap(), 1);
    }

    #[test]
    fn middleware_api_reaches_the_store() {
        // Turns {"type": "DOUBLE"} into two INC dispatches through the chain.
        let doubler = |api: &MiddlewareApi<i64>, next: Dispatcher| {
            let api = api.clone();
            Dispatcher::new(move |action: Value| {
                if action["type"] == "DOUBLE" {
                    api.dispatch(json!({ "type": "INC" }))?;
                    api.dispatch(json!({ "type": "INC" }))?;
                    assert_eq!(*api.get_state()?, 2);
                    return Ok(action);
                }
                next.dispatch(action)
            })
        };

        let store = Store::builder(counter).middleware(doubler).build();
        store.dispatch(json!({ "type": "DOUBLE" })).unwrap();
        assert_eq!(*store.get_state().unwrap(), 2);
    }

    #[test]
    fn observe_emits_immediately_and_on_change() {
        let store = Store::new(counter);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let seen_clone = seen.clone();

        let handle = store
            .observe(move |state| seen_clone.borrow_mut().push(*state))
            .unwrap();
        store.dispatch(json!({ "type": "INC" })).unwrap();
        handle.unsubscribe().unwrap();
        store.dispatch(json!({ "type": "INC" })).unwrap();

        assert_eq!(*seen.borrow(), vec![0, 1]);
    }

    #[test]
    fn config_is_carried_by_the_store() {
        let config = Config {
            nested_render_limit: 3,
            check_snapshot_caching: false,
        };
        let store = Store::builder(counter).config(config.clone()).build();
        assert_eq!(store.config(), &config);
    }
}
