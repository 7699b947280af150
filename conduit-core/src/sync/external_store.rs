//! Snapshot synchronization for one rendering instance.
//!
//! The host drives the lifecycle explicitly:
//!
//! 1. [`ExternalStore::render`] on every render pass, returning the value to
//!    render with.
//! 2. [`ExternalStore::commit_layout`] right after the host committed that
//!    render. The rendered value becomes the committed one and is checked
//!    against a fresh read; a mismatch means the store changed between
//!    render and commit, and a re-render is forced.
//! 3. [`ExternalStore::attach`] after paint, once. Checks again, then
//!    subscribes.
//! 4. [`ExternalStore::detach`] on teardown.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{trace, warn};

use crate::config::Config;
use crate::equality::SameValue;
use crate::error::{Error, Result};
use crate::host::ForceUpdateHandle;
use crate::store::Unsubscribe;

/// Registers a change callback with some external source.
pub type Subscribe = Rc<dyn Fn(Rc<dyn Fn()>) -> Result<Unsubscribe>>;

/// Reads the current snapshot. Must return the same snapshot (by
/// [`SameValue`]) for as long as the source has not changed.
pub type GetSnapshot<T> = Rc<dyn Fn() -> T>;

/// Last committed value and the getter it was read with.
struct Instance<T> {
    value: T,
    get_snapshot: GetSnapshot<T>,
}

struct Inner<T> {
    subscribe: Subscribe,
    get_snapshot: RefCell<GetSnapshot<T>>,
    instance: RefCell<Instance<T>>,
    force_update: ForceUpdateHandle,
    unsubscribe: RefCell<Option<Unsubscribe>>,
    /// Bumped on every detach; handlers from an older epoch are inert.
    epoch: Cell<u64>,
    forced_renders: Cell<u32>,
    nested_render_limit: u32,
    check_snapshot_caching: bool,
}

impl<T: Clone + SameValue> Inner<T> {
    fn snapshot_changed(&self) -> bool {
        let (previous, get_snapshot) = {
            let instance = self.instance.borrow();
            (instance.value.clone(), Rc::clone(&instance.get_snapshot))
        };
        !previous.same_value(&get_snapshot())
    }

    fn handle_store_change(&self, epoch: u64) {
        if self.epoch.get() != epoch || self.unsubscribe.borrow().is_none() {
            return;
        }
        if self.snapshot_changed() {
            trace!("snapshot changed, forcing update");
            self.force_update.force_update();
        }
    }

    /// Force a render on behalf of a commit-time check.
    fn force_from_commit(&self) -> Result<()> {
        let forced = self.forced_renders.get() + 1;
        if forced > self.nested_render_limit {
            self.forced_renders.set(0);
            warn!(
                limit = self.nested_render_limit,
                "snapshot never settled; get_snapshot is probably not cached"
            );
            return Err(Error::RenderLoop {
                limit: self.nested_render_limit,
            });
        }
        self.forced_renders.set(forced);
        self.force_update.force_update();
        Ok(())
    }
}

/// Keeps one rendering instance consistent with an external snapshot.
pub struct ExternalStore<T> {
    inner: Rc<Inner<T>>,
}

impl<T: Clone + SameValue + 'static> ExternalStore<T> {
    /// Create the instance and read its initial snapshot. Nothing is
    /// subscribed until [`attach`](Self::attach).
    pub fn new(
        subscribe: Subscribe,
        get_snapshot: GetSnapshot<T>,
        force_update: ForceUpdateHandle,
        config: &Config,
    ) -> Self {
        let value = get_snapshot();
        Self {
            inner: Rc::new(Inner {
                subscribe,
                get_snapshot: RefCell::new(Rc::clone(&get_snapshot)),
                instance: RefCell::new(Instance {
                    value,
                    get_snapshot,
                }),
                force_update,
                unsubscribe: RefCell::new(None),
                epoch: Cell::new(0),
                forced_renders: Cell::new(0),
                nested_render_limit: config.nested_render_limit,
                check_snapshot_caching: config.check_snapshot_caching,
            }),
        }
    }

    /// Read the value for this render pass.
    ///
    /// With snapshot caching checks enabled the getter is called twice and
    /// both reads must be the same snapshot.
    pub fn render(&self) -> Result<T> {
        let get_snapshot = self.inner.get_snapshot.borrow().clone();
        let value = get_snapshot();

        if self.inner.check_snapshot_caching && !value.same_value(&get_snapshot()) {
            warn!("get_snapshot returned a different value on consecutive reads");
            return Err(Error::UncachedSnapshot);
        }
        Ok(value)
    }

    /// Record the committed render and check for a change that slipped in
    /// between render and commit.
    ///
    /// Fails with [`Error::RenderLoop`] once more than
    /// `Config::nested_render_limit` consecutive commits each forced another
    /// render.
    pub fn commit_layout(&self, rendered: T) -> Result<()> {
        {
            let mut instance = self.inner.instance.borrow_mut();
            instance.value = rendered;
            instance.get_snapshot = self.inner.get_snapshot.borrow().clone();
        }

        if self.inner.snapshot_changed() {
            self.inner.force_from_commit()
        } else {
            self.inner.forced_renders.set(0);
            Ok(())
        }
    }

    /// Subscribe to the source. Calling it while attached does nothing.
    pub fn attach(&self) -> Result<()> {
        if self.is_attached() {
            return Ok(());
        }

        if self.inner.snapshot_changed() {
            self.inner.force_update.force_update();
        }

        let epoch = self.inner.epoch.get();
        let weak: Weak<Inner<T>> = Rc::downgrade(&self.inner);
        let handler: Rc<dyn Fn()> = Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.handle_store_change(epoch);
            }
        });

        let unsubscribe = (self.inner.subscribe)(handler)?;
        *self.inner.unsubscribe.borrow_mut() = Some(unsubscribe);
        Ok(())
    }

    /// Run the change check as if the source had notified.
    pub fn handle_store_change(&self) {
        self.inner.handle_store_change(self.inner.epoch.get());
    }

    /// Use `get_snapshot` from the next render on.
    pub fn set_get_snapshot(&self, get_snapshot: GetSnapshot<T>) {
        *self.inner.get_snapshot.borrow_mut() = get_snapshot;
    }

    /// Unsubscribe. Change callbacks already captured by the source become
    /// no-ops. Calling it while detached does nothing.
    pub fn detach(&self) -> Result<()> {
        let Some(unsubscribe) = self.inner.unsubscribe.borrow_mut().take() else {
            return Ok(());
        };
        self.inner.epoch.set(self.inner.epoch.get() + 1);
        unsubscribe.unsubscribe()
    }

    /// Returns true between [`attach`](Self::attach) and
    /// [`detach`](Self::detach).
    pub fn is_attached(&self) -> bool {
        self.inner.unsubscribe.borrow().is_some()
    }

    /// The value recorded by the last commit.
    pub fn committed(&self) -> T {
        self.inner.instance.borrow().value.clone()
    }
}

impl<T> fmt::Debug for ExternalStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalStore")
            .field("attached", &self.inner.unsubscribe.borrow().is_some())
            .field("forced_renders", &self.inner.forced_renders.get())
            .finish_non_exhaustive()
    }
}
