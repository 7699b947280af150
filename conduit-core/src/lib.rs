//! Conduit Core
//!
//! This crate provides the core runtime for the Conduit state container.
//! It implements:
//!
//! - A store holding one state tree, changed only by dispatching actions
//! - Reducer composition and a dispatch middleware chain
//! - A hierarchical subscription tree with strictly top-down notification
//! - Tear-free snapshot synchronization for rendering instances
//! - Bindings that derive memoized props and selections from the store
//!
//! Everything is single-threaded: handles are `Rc`-based and `!Send`.
//!
//! # Architecture
//!
//! - `store`: the store, actions, reducers and middleware
//! - `subscription`: the notification tree between the store and bindings
//! - `sync`: snapshot synchronization and selector memoization
//! - `binding`: providers, bound instances and selections
//! - `host`: what the rendering host supplies (batching, forced renders)
//!
//! # Example
//!
//! ```rust,ignore
//! use std::rc::Rc;
//! use conduit_core::{Action, Store};
//! use serde_json::json;
//!
//! fn counter(state: Option<Rc<i64>>, action: &Action) -> Rc<i64> {
//!     let current = state.unwrap_or_else(|| Rc::new(0));
//!     match action.kind_str() {
//!         Some("INC") => Rc::new(*current + 1),
//!         _ => current,
//!     }
//! }
//!
//! let store = Store::new(counter);
//! let _unsubscribe = store.subscribe(|| println!("changed"))?;
//!
//! store.dispatch(json!({ "type": "INC" }))?;
//! assert_eq!(*store.get_state()?, 1);
//! ```

pub mod binding;
pub mod config;
pub mod equality;
pub mod error;
pub mod host;
pub mod store;
pub mod subscription;
pub mod sync;

pub use binding::{
    connect, use_selector, ConnectOptions, Connected, Connector, MapDispatch, MapState, MergeProps,
    Prop, Props, Provider, ProviderContext, SelectorInstance,
};
pub use config::Config;
pub use equality::SameValue;
pub use error::{Error, Result};
pub use host::{Batch, ForceUpdate, ForceUpdateHandle, Unbatched};
pub use store::{
    combine_reducers, compose, Action, ActionType, Dispatcher, Middleware, MiddlewareApi, Reducer,
    Store, StoreBuilder, Unsubscribe,
};
pub use subscription::Subscription;
pub use sync::{ExternalStore, ExternalStoreWithSelector};
