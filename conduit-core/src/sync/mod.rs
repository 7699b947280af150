//! Snapshot synchronization.
//!
//! [`ExternalStore`] keeps one rendering instance in step with a snapshot
//! read from an external source; [`ExternalStoreWithSelector`] adds a
//! memoized projection of that snapshot.

mod external_store;
mod with_selector;

pub use external_store::{ExternalStore, GetSnapshot, Subscribe};
pub use with_selector::{
    ExternalStoreWithSelector, IsEqual, RenderedSelection, Selector, SelectorMemo,
};
