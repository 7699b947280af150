//! Root of a bound tree.
//!
//! A [`Provider`] owns the root [`Subscription`] of one store and hands out
//! a [`ProviderContext`]: the store plus the subscription that bound
//! instances nest under. The context is passed down explicitly; there is no
//! ambient lookup.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::error::Result;
use crate::host::{unbatched, Batch};
use crate::store::{Dispatcher, Store};
use crate::subscription::Subscription;

/// What a bound instance needs from the tree above it.
pub struct ProviderContext<S> {
    store: Store<S>,
    subscription: Subscription,
}

impl<S: 'static> ProviderContext<S> {
    pub fn new(store: Store<S>, subscription: Subscription) -> Self {
        Self {
            store,
            subscription,
        }
    }

    /// The store.
    pub fn store(&self) -> &Store<S> {
        &self.store
    }

    /// The subscription nested instances attach under.
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    /// The store's outermost dispatch function.
    pub fn dispatcher(&self) -> Dispatcher {
        self.store.dispatcher()
    }

    /// The same store with a different parent subscription.
    pub fn with_subscription(&self, subscription: Subscription) -> Self {
        Self::new(self.store.clone(), subscription)
    }
}

impl<S> Clone for ProviderContext<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            subscription: self.subscription.clone(),
        }
    }
}

impl<S> fmt::Debug for ProviderContext<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderContext")
            .field("store", &self.store)
            .field("subscription", &self.subscription)
            .finish()
    }
}

/// Connects a store to a tree of bound instances.
pub struct Provider<S> {
    context: ProviderContext<S>,
    /// State seen at creation; compared on mount to catch early changes.
    previous_state: Rc<S>,
    mounted: Cell<bool>,
}

impl<S: 'static> Provider<S> {
    /// Create a provider with the [`Unbatched`](crate::host::Unbatched)
    /// boundary.
    pub fn new(store: Store<S>) -> Self {
        Self::with_batch(store, unbatched())
    }

    /// Create a provider whose notifications run inside `batch`.
    ///
    /// The state at this point is remembered; if it changed by the time
    /// [`mount`](Self::mount) runs, mounting notifies the tree once.
    pub fn with_batch(store: Store<S>, batch: Rc<dyn Batch>) -> Self {
        let previous_state = store.state_snapshot();
        let subscription = Subscription::root(store.clone(), batch);
        Self {
            context: ProviderContext::new(store, subscription),
            previous_state,
            mounted: Cell::new(false),
        }
    }

    /// The context to pass to bound instances.
    pub fn context(&self) -> ProviderContext<S> {
        self.context.clone()
    }

    /// Start forwarding store changes to the tree.
    pub fn mount(&self) -> Result<()> {
        if self.mounted.replace(true) {
            return Ok(());
        }

        let subscription = self.context.subscription();
        subscription.forward_to_nested_subs();
        subscription.try_subscribe()?;
        debug!("provider mounted");

        if !Rc::ptr_eq(&self.previous_state, &self.context.store.state_snapshot()) {
            debug!("state changed before mount, notifying");
            subscription.notify_nested_subs();
        }
        Ok(())
    }

    /// Stop forwarding and drop every nested subscription.
    pub fn unmount(&self) -> Result<()> {
        if !self.mounted.get() {
            return Ok(());
        }

        let subscription = self.context.subscription();
        subscription.try_unsubscribe()?;
        subscription.clear_on_state_change();
        self.mounted.set(false);
        debug!("provider unmounted");
        Ok(())
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.get()
    }
}

impl<S> fmt::Debug for Provider<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("context", &self.context)
            .field("mounted", &self.mounted.get())
            .finish()
    }
}
