//! Selector memoization on top of [`ExternalStore`].
//!
//! A [`SelectorMemo`] turns a snapshot into a selection and avoids both
//! recomputation and new selection identities where it can. The order of
//! its checks is observable through re-render counts and is kept exactly:
//!
//! - First call: compute. If an `is_equal` is given and the instance has
//!   already rendered a selection equal to the new one, reuse the rendered
//!   one.
//! - Later calls: same snapshot as last time returns the last selection.
//!   Otherwise compute; if `is_equal` holds against the last selection, keep
//!   returning the last selection (without remembering the new snapshot).
//!   Otherwise adopt the new snapshot and selection.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::config::Config;
use crate::equality::SameValue;
use crate::error::Result;
use crate::host::ForceUpdateHandle;

use super::external_store::{ExternalStore, GetSnapshot, Subscribe};

/// Projects a snapshot to a selection.
pub type Selector<Snap, Sel> = Rc<dyn Fn(&Snap) -> Sel>;

/// Decides whether two selections are interchangeable.
pub type IsEqual<Sel> = Rc<dyn Fn(&Sel, &Sel) -> bool>;

/// The selection an instance last rendered, shared across selector changes.
#[derive(Debug, Clone)]
pub struct RenderedSelection<Sel> {
    value: Option<Sel>,
}

impl<Sel> Default for RenderedSelection<Sel> {
    fn default() -> Self {
        Self { value: None }
    }
}

impl<Sel: Clone> RenderedSelection<Sel> {
    /// Returns true once a selection has been recorded.
    pub fn has_value(&self) -> bool {
        self.value.is_some()
    }

    /// The recorded selection.
    pub fn value(&self) -> Option<Sel> {
        self.value.clone()
    }

    /// Record `value` as rendered.
    pub fn record(&mut self, value: Sel) {
        self.value = Some(value);
    }
}

struct Memo<Snap, Sel> {
    snapshot: Snap,
    selection: Sel,
}

/// Memoized selector for one selector/`is_equal` pair.
pub struct SelectorMemo<Snap, Sel> {
    selector: Selector<Snap, Sel>,
    is_equal: Option<IsEqual<Sel>>,
    rendered: Rc<RefCell<RenderedSelection<Sel>>>,
    memo: RefCell<Option<Memo<Snap, Sel>>>,
}

impl<Snap, Sel> SelectorMemo<Snap, Sel>
where
    Snap: Clone + SameValue,
    Sel: Clone,
{
    /// Create an empty memo. `rendered` is consulted on the first call only.
    pub fn new(
        selector: Selector<Snap, Sel>,
        is_equal: Option<IsEqual<Sel>>,
        rendered: Rc<RefCell<RenderedSelection<Sel>>>,
    ) -> Self {
        Self {
            selector,
            is_equal,
            rendered,
            memo: RefCell::new(None),
        }
    }

    /// Select from `next_snapshot`.
    ///
    /// Panics raised by the selector or `is_equal` propagate; the memo is
    /// left as it was before the call.
    pub fn select(&self, next_snapshot: Snap) -> Sel {
        let previous = self
            .memo
            .borrow()
            .as_ref()
            .map(|memo| (memo.snapshot.clone(), memo.selection.clone()));

        let Some((previous_snapshot, previous_selection)) = previous else {
            let next_selection = (self.selector)(&next_snapshot);
            let current = self.rendered.borrow().value();
            let selection = match (&self.is_equal, current) {
                (Some(is_equal), Some(current)) if is_equal(&current, &next_selection) => current,
                _ => next_selection,
            };
            self.remember(next_snapshot, selection.clone());
            return selection;
        };

        if previous_snapshot.same_value(&next_snapshot) {
            return previous_selection;
        }

        let next_selection = (self.selector)(&next_snapshot);
        if let Some(is_equal) = &self.is_equal {
            if is_equal(&previous_selection, &next_selection) {
                return previous_selection;
            }
        }

        self.remember(next_snapshot, next_selection.clone());
        next_selection
    }

    fn remember(&self, snapshot: Snap, selection: Sel) {
        *self.memo.borrow_mut() = Some(Memo {
            snapshot,
            selection,
        });
    }

    /// Returns true once [`select`](Self::select) has completed.
    pub fn has_memo(&self) -> bool {
        self.memo.borrow().is_some()
    }
}

/// [`ExternalStore`] over a memoized selection of a snapshot.
pub struct ExternalStoreWithSelector<Snap, Sel> {
    get_snapshot: GetSnapshot<Snap>,
    rendered: Rc<RefCell<RenderedSelection<Sel>>>,
    memo: RefCell<Rc<SelectorMemo<Snap, Sel>>>,
    store: ExternalStore<Sel>,
}

impl<Snap, Sel> ExternalStoreWithSelector<Snap, Sel>
where
    Snap: Clone + SameValue + 'static,
    Sel: Clone + SameValue + 'static,
{
    /// Create the instance and read its initial selection.
    pub fn new(
        subscribe: Subscribe,
        get_snapshot: GetSnapshot<Snap>,
        selector: Selector<Snap, Sel>,
        is_equal: Option<IsEqual<Sel>>,
        force_update: ForceUpdateHandle,
        config: &Config,
    ) -> Self {
        let rendered = Rc::new(RefCell::new(RenderedSelection::default()));
        let memo = Rc::new(SelectorMemo::new(selector, is_equal, Rc::clone(&rendered)));
        let getter = Self::selection_getter(Rc::clone(&get_snapshot), Rc::clone(&memo));

        Self {
            get_snapshot,
            rendered,
            memo: RefCell::new(memo),
            store: ExternalStore::new(subscribe, getter, force_update, config),
        }
    }

    fn selection_getter(
        get_snapshot: GetSnapshot<Snap>,
        memo: Rc<SelectorMemo<Snap, Sel>>,
    ) -> GetSnapshot<Sel> {
        Rc::new(move || memo.select(get_snapshot()))
    }

    /// See [`ExternalStore::render`].
    pub fn render(&self) -> Result<Sel> {
        self.store.render()
    }

    /// See [`ExternalStore::commit_layout`].
    pub fn commit_layout(&self, rendered: Sel) -> Result<()> {
        self.store.commit_layout(rendered)
    }

    /// Record `rendered` as the selection this instance displays. Called
    /// by the host after paint.
    pub fn commit_passive(&self, rendered: Sel) {
        self.rendered.borrow_mut().record(rendered);
    }

    /// See [`ExternalStore::attach`].
    pub fn attach(&self) -> Result<()> {
        self.store.attach()
    }

    /// See [`ExternalStore::detach`].
    pub fn detach(&self) -> Result<()> {
        self.store.detach()
    }

    /// See [`ExternalStore::handle_store_change`].
    pub fn handle_store_change(&self) {
        self.store.handle_store_change()
    }

    /// Swap the selector and `is_equal`.
    ///
    /// The memo starts over; the rendered selection is kept so the first
    /// selection of the new selector can reuse it.
    pub fn set_selector(&self, selector: Selector<Snap, Sel>, is_equal: Option<IsEqual<Sel>>) {
        let memo = Rc::new(SelectorMemo::new(selector, is_equal, Rc::clone(&self.rendered)));
        self.store
            .set_get_snapshot(Self::selection_getter(Rc::clone(&self.get_snapshot), Rc::clone(&memo)));
        *self.memo.borrow_mut() = memo;
    }

    /// The selection recorded by [`commit_passive`](Self::commit_passive).
    pub fn rendered_selection(&self) -> Option<Sel> {
        self.rendered.borrow().value()
    }

    /// Returns true while subscribed.
    pub fn is_attached(&self) -> bool {
        self.store.is_attached()
    }

    /// Returns true once the current selector has produced a selection.
    pub fn has_memo(&self) -> bool {
        self.memo.borrow().has_memo()
    }
}

impl<Snap, Sel> fmt::Debug for ExternalStoreWithSelector<Snap, Sel> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalStoreWithSelector")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}
