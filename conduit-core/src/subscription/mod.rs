//! Subscription tree.
//!
//! A `Subscription` is one node of a pub/sub overlay on top of the store.
//! The root node listens to the store; every other node listens to its
//! parent. When a node is notified it runs its own `on_state_change`, which
//! is expected to forward to its children by calling
//! [`Subscription::notify_nested_subs`] once it is done. Notification is
//! therefore strictly top-down: a node's children never run before the node
//! itself has observed the new state.
//!
//! A detached node owns no child collection at all. The collection is
//! allocated on first attach and dropped again on detach, which makes every
//! unsubscribe handle issued before the detach inert.

mod collection;

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::error::Result;
use crate::host::{unbatched, Batch};
use crate::store::{ListenerSource, Unsubscribe};

use collection::ListenerCollection;

/// Where a node attaches its change handler.
/// Where a node attaches: the store for the root, a parent node otherwise.
enum Upstream {
    Store(Rc<dyn ListenerSource>),
    Parent(Subscription),
}

/// Present while a node is attached upstream.
struct Attachment {
    /// Detaches this node from its upstream.
    unsubscribe: Unsubscribe,
    /// Nested callbacks, notified in insertion order.
    listeners: Rc<RefCell<ListenerCollection>>,
}

struct SubscriptionInner {
    upstream: Upstream,
    /// Wraps every nested notification pass.
    batch: Rc<dyn Batch>,
    attachment: RefCell<Option<Attachment>>,
    /// Called first on every change reaching this node.
    on_state_change: RefCell<Option<Rc<dyn Fn()>>>,
}

/// A node of the subscription tree. Clones share the node.
#[derive(Clone)]
pub struct Subscription {
    inner: Rc<SubscriptionInner>,
}

impl Subscription {
    /// Create a root node listening to `source`.
    ///
    /// `batch` wraps every fan-out to children, here and in every descendant.
    pub fn root<L>(source: L, batch: Rc<dyn Batch>) -> Self
    where
        L: ListenerSource + 'static,
    {
        Self::with_upstream(Upstream::Store(Rc::new(source)), batch)
    }

    /// Create a root node with the [`Unbatched`](crate::host::Unbatched)
    /// boundary.
    pub fn root_unbatched<L>(source: L) -> Self
    where
        L: ListenerSource + 'static,
    {
        Self::root(source, unbatched())
    }

    /// Create a node listening to `parent`.
    pub fn child(parent: &Subscription) -> Self {
        let batch = Rc::clone(&parent.inner.batch);
        Self::with_upstream(Upstream::Parent(parent.clone()), batch)
    }

    fn with_upstream(upstream: Upstream, batch: Rc<dyn Batch>) -> Self {
        Self {
            inner: Rc::new(SubscriptionInner {
                upstream,
                batch,
                attachment: RefCell::new(None),
                on_state_change: RefCell::new(None),
            }),
        }
    }

    /// Attach to the parent or the store if not attached yet.
    pub fn try_subscribe(&self) -> Result<()> {
        self.attach().map(|_| ())
    }

    /// Attach if needed and return the child collection.
    fn attach(&self) -> Result<Rc<RefCell<ListenerCollection>>> {
        if let Some(attachment) = self.inner.attachment.borrow().as_ref() {
            return Ok(Rc::clone(&attachment.listeners));
        }

        let weak = Rc::downgrade(&self.inner);
        let handler: Rc<dyn Fn()> = Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                Subscription { inner }.handle_change_wrapper();
            }
        });

        let unsubscribe = match &self.inner.upstream {
            Upstream::Store(source) => source.subscribe_listener(handler)?,
            Upstream::Parent(parent) => parent.add_nested_sub_rc(handler)?,
        };

        let listeners = Rc::new(RefCell::new(ListenerCollection::new()));
        *self.inner.attachment.borrow_mut() = Some(Attachment {
            unsubscribe,
            listeners: Rc::clone(&listeners),
        });
        debug!(root = self.is_root(), "subscription attached");
        Ok(listeners)
    }

    /// Detach from upstream and drop every child callback.
    ///
    /// Does nothing when not attached. If the upstream refuses the
    /// unsubscribe (the store is reducing) the node stays attached.
    pub fn try_unsubscribe(&self) -> Result<()> {
        let Some(attachment) = self.inner.attachment.borrow_mut().take() else {
            return Ok(());
        };

        if let Err(err) = attachment.unsubscribe.unsubscribe() {
            *self.inner.attachment.borrow_mut() = Some(attachment);
            return Err(err);
        }

        attachment.listeners.borrow_mut().clear();
        debug!(root = self.is_root(), "subscription detached");
        Ok(())
    }

    /// Register a descendant's callback, attaching this node first.
    pub fn add_nested_sub<F>(&self, callback: F) -> Result<Unsubscribe>
    where
        F: Fn() + 'static,
    {
        self.add_nested_sub_rc(Rc::new(callback))
    }

    pub(crate) fn add_nested_sub_rc(&self, callback: Rc<dyn Fn()>) -> Result<Unsubscribe> {
        let listeners = self.attach()?;
        let key = listeners.borrow_mut().insert(callback);

        let collection = Rc::downgrade(&listeners);
        Ok(Unsubscribe::new(move || {
            if let Some(listeners) = Weak::upgrade(&collection) {
                listeners.borrow_mut().remove(key);
            }
            Ok(())
        }))
    }

    /// Call every child callback, in registration order, inside the batch
    /// boundary.
    ///
    /// The callbacks are captured before the first one runs; children added
    /// or removed by a callback take effect on the next notification.
    pub fn notify_nested_subs(&self) {
        let callbacks = match self.inner.attachment.borrow().as_ref() {
            Some(attachment) => attachment.listeners.borrow().callbacks(),
            None => return,
        };
        if callbacks.is_empty() {
            return;
        }

        trace!(children = callbacks.len(), "notify nested subscriptions");
        self.inner.batch.batch(&mut || {
            for callback in &callbacks {
                callback();
            }
        });
    }

    /// Entry point for upstream notifications: runs `on_state_change`.
    pub fn handle_change_wrapper(&self) {
        let on_state_change = self.inner.on_state_change.borrow().clone();
        if let Some(on_state_change) = on_state_change {
            on_state_change();
        }
    }

    /// Set the handler run when upstream fires.
    pub fn set_on_state_change<F>(&self, on_state_change: F)
    where
        F: Fn() + 'static,
    {
        *self.inner.on_state_change.borrow_mut() = Some(Rc::new(on_state_change));
    }

    /// Make this node forward every upstream notification to its children.
    pub fn forward_to_nested_subs(&self) {
        let weak = Rc::downgrade(&self.inner);
        self.set_on_state_change(move || {
            if let Some(inner) = weak.upgrade() {
                Subscription { inner }.notify_nested_subs();
            }
        });
    }

    /// Remove the handler set by [`set_on_state_change`](Self::set_on_state_change).
    pub fn clear_on_state_change(&self) {
        self.inner.on_state_change.borrow_mut().take();
    }

    /// Returns true while attached upstream.
    pub fn is_subscribed(&self) -> bool {
        self.inner.attachment.borrow().is_some()
    }

    /// Number of registered child callbacks.
    pub fn listener_count(&self) -> usize {
        self.inner
            .attachment
            .borrow()
            .as_ref()
            .map_or(0, |attachment| attachment.listeners.borrow().len())
    }

    /// The batch boundary shared by this tree.
    pub fn batch(&self) -> Rc<dyn Batch> {
        Rc::clone(&self.inner.batch)
    }

    /// Returns true for nodes created with [`root`](Self::root).
    pub fn is_root(&self) -> bool {
        matches!(self.inner.upstream, Upstream::Store(_))
    }

    /// Returns true if both handles refer to the same node.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("root", &self.is_root())
            .field("subscribed", &self.is_subscribed())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Action, Store};
    use std::cell::Cell;

    fn counter(state: Option<Rc<i64>>, action: &Action) -> Rc<i64> {
        let current = state.unwrap_or_else(|| Rc::new(0));
        if action.is("INC") {
            Rc::new(*current + 1)
        } else {
            current
        }
    }

    fn inc() -> serde_json::Value {
        serde_json::json!({ "type": "INC" })
    }

    #[test]
    fn try_subscribe_is_idempotent() {
        let store = Store::new(counter);
        let root = Subscription::root_unbatched(store.clone());

        root.try_subscribe().unwrap();
        root.try_subscribe().unwrap();
        assert!(root.is_subscribed());
        assert_eq!(store.listener_count(), 1);
    }

    #[test]
    fn try_unsubscribe_detaches_and_is_idempotent() {
        let store = Store::new(counter);
        let root = Subscription::root_unbatched(store.clone());
        root.try_subscribe().unwrap();

        root.try_unsubscribe().unwrap();
        root.try_unsubscribe().unwrap();
        assert!(!root.is_subscribed());
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn nested_sub_attaches_the_parent() {
        let store = Store::new(counter);
        let root = Subscription::root_unbatched(store.clone());

        let _unsubscribe = root.add_nested_sub(|| {}).unwrap();
        assert!(root.is_subscribed());
        assert_eq!(root.listener_count(), 1);
        assert_eq!(store.listener_count(), 1);
    }

    #[test]
    fn child_attach_chains_up_to_the_store() {
        let store = Store::new(counter);
        let root = Subscription::root_unbatched(store.clone());
        let child = Subscription::child(&root);
        let grandchild = Subscription::child(&child);

        grandchild.try_subscribe().unwrap();
        assert!(child.is_subscribed());
        assert!(root.is_subscribed());
        assert_eq!(store.listener_count(), 1);
    }

    #[test]
    fn notification_runs_parents_before_children() {
        let store = Store::new(counter);
        let log = Rc::new(RefCell::new(Vec::new()));

        let root = Subscription::root_unbatched(store.clone());
        let child = Subscription::child(&root);
        let grandchild = Subscription::child(&child);

        for (node, name) in [(&root, "root"), (&child, "child"), (&grandchild, "grandchild")] {
            let log = log.clone();
            let weak = Rc::downgrade(&node.inner);
            node.set_on_state_change(move || {
                log.borrow_mut().push(name);
                if let Some(inner) = weak.upgrade() {
                    Subscription { inner }.notify_nested_subs();
                }
            });
        }
        grandchild.try_subscribe().unwrap();

        store.dispatch(inc()).unwrap();
        assert_eq!(*log.borrow(), vec!["root", "child", "grandchild"]);
    }

    #[test]
    fn removed_nested_sub_stops_firing() {
        let store = Store::new(counter);
        let root = Subscription::root_unbatched(store.clone());
        root.forward_to_nested_subs();

        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let unsubscribe = root
            .add_nested_sub(move || calls_clone.set(calls_clone.get() + 1))
            .unwrap();

        store.dispatch(inc()).unwrap();
        unsubscribe.unsubscribe().unwrap();
        unsubscribe.unsubscribe().unwrap();
        store.dispatch(inc()).unwrap();

        assert_eq!(calls.get(), 1);
        assert_eq!(root.listener_count(), 0);
    }

    #[test]
    fn handles_issued_before_detach_are_inert() {
        let store = Store::new(counter);
        let root = Subscription::root_unbatched(store.clone());
        root.forward_to_nested_subs();

        let first = root.add_nested_sub(|| {}).unwrap();
        root.try_unsubscribe().unwrap();
        assert_eq!(root.listener_count(), 0);

        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();
        let _second = root
            .add_nested_sub(move || calls_clone.set(calls_clone.get() + 1))
            .unwrap();
        first.unsubscribe().unwrap();

        store.dispatch(inc()).unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn detached_node_notifies_nobody() {
        let store = Store::new(counter);
        let root = Subscription::root_unbatched(store);
        root.notify_nested_subs();
        assert_eq!(root.listener_count(), 0);
    }

    #[test]
    fn sub_added_during_notification_waits_for_the_next_one() {
        let store = Store::new(counter);
        let root = Subscription::root_unbatched(store.clone());
        root.forward_to_nested_subs();

        let late_calls = Rc::new(Cell::new(0));
        let added = Rc::new(Cell::new(false));
        let root_clone = root.clone();
        let late_calls_clone = late_calls.clone();
        let _unsubscribe = root
            .add_nested_sub(move || {
                if !added.replace(true) {
                    let late_calls = late_calls_clone.clone();
                    let _ = root_clone
                        .add_nested_sub(move || late_calls.set(late_calls.get() + 1))
                        .unwrap();
                }
            })
            .unwrap();

        store.dispatch(inc()).unwrap();
        assert_eq!(late_calls.get(), 0);
        store.dispatch(inc()).unwrap();
        assert_eq!(late_calls.get(), 1);
    }

    #[test]
    fn fan_out_runs_inside_the_batch_boundary() {
        struct Counting(Rc<Cell<u32>>);
        impl Batch for Counting {
            fn batch(&self, f: &mut dyn FnMut()) {
                self.0.set(self.0.get() + 1);
                f()
            }
        }

        let store = Store::new(counter);
        let batches = Rc::new(Cell::new(0));
        let root = Subscription::root(store.clone(), Rc::new(Counting(batches.clone())));
        root.forward_to_nested_subs();

        let child = Subscription::child(&root);
        child.forward_to_nested_subs();
        let _a = child.add_nested_sub(|| {}).unwrap();
        let _b = child.add_nested_sub(|| {}).unwrap();

        store.dispatch(inc()).unwrap();
        assert_eq!(batches.get(), 2);
    }
}
