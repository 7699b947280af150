//! Bindings
//!
//! This module connects a store to a tree of rendering instances owned by a
//! host.
//!
//! # Concepts
//!
//! ## Provider
//!
//! A [`Provider`] owns the root of the subscription tree for one store. Its
//! [`ProviderContext`] is handed down explicitly to everything bound below
//! it.
//!
//! ## Bound instances
//!
//! A [`Connector`] describes how to derive an instance's props from the
//! store state, the dispatcher and the props its parent passed in. Each
//! [`Connected`] instance memoizes that derivation and only asks the host to
//! re-render when the derived props change.
//!
//! ## Selections
//!
//! [`use_selector`] reads one value out of the state and re-renders when it
//! changes. The store itself and its dispatcher are available from the
//! context directly.
//!
//! # Ordering
//!
//! Instances nest their subscriptions under the nearest bound ancestor.
//! A store change therefore reaches a parent before its children, and a
//! child whose parent is about to re-render waits for that render.

mod connect;
mod map_props;
mod props;
mod provider;
mod selector_factory;
mod use_selector;

pub use connect::{connect, Connected, Connector};
pub use map_props::{
    bind_action_creators, ActionCreator, ActionCreators, DispatchMapper, MapDispatch,
    MapDispatchFn, MapDispatchWithPropsFn, MapState, MapStateFn, MapStateWithPropsFn,
    MergeProps, MergePropsFn, StateMapper,
};
pub use props::{Handler, Prop, Props};
pub use provider::{Provider, ProviderContext};
pub use selector_factory::{ConnectOptions, EqualityFn, PropsSelector};
pub use use_selector::{use_selector, SelectorInstance};
