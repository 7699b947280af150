//! Store listener registry.
//!
//! Listeners are kept in two arrays. `current` is the array the last
//! dispatch iterated over; `next` is where subscribe and unsubscribe write.
//! Both start out as the same array and `next` is cloned lazily, the first
//! time it is mutated while still aliased to `current`. A dispatch that is
//! iterating therefore always sees the list as it was when the dispatch
//! began.

use std::fmt;
use std::rc::Rc;

use crate::error::Result;

/// Identifier of a listener within one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Clone)]
pub(crate) struct ListenerEntry {
    pub(crate) id: ListenerId,
    pub(crate) callback: Rc<dyn Fn()>,
}

pub(crate) struct ListenerRegistry {
    /// Array handed to the last dispatch; `next` is copied before mutation while the two alias.
    current: Option<Rc<Vec<ListenerEntry>>>,
    /// The list the next dispatch will notify.
    next: Rc<Vec<ListenerEntry>>,
    next_id: u64,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        let list = Rc::new(Vec::new());
        Self {
            current: Some(Rc::clone(&list)),
            next: list,
            next_id: 0,
        }
    }

    /// Clone `next` if it is still the array a dispatch may be iterating.
    fn ensure_can_mutate_next(&mut self) {
        if let Some(current) = &self.current {
            if Rc::ptr_eq(current, &self.next) {
                self.next = Rc::new(current.as_ref().clone());
            }
        }
    }

    pub(crate) fn add(&mut self, callback: Rc<dyn Fn()>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;

        self.ensure_can_mutate_next();
        Rc::make_mut(&mut self.next).push(ListenerEntry { id, callback });
        id
    }

    pub(crate) fn remove(&mut self, id: ListenerId) {
        self.ensure_can_mutate_next();
        Rc::make_mut(&mut self.next).retain(|entry| entry.id != id);
        self.current = None;
    }

    /// Promote `next` to `current` and return it for iteration.
    pub(crate) fn snapshot(&mut self) -> Rc<Vec<ListenerEntry>> {
        self.current = Some(Rc::clone(&self.next));
        Rc::clone(&self.next)
    }

    pub(crate) fn len(&self) -> usize {
        self.next.len()
    }
}

/// Handle returned by every subscribe operation.
///
/// Calling [`unsubscribe`](Self::unsubscribe) more than once is a no-op.
/// Dropping the handle does not unsubscribe.
#[must_use = "an Unsubscribe handle is the only way to remove the listener"]
#[derive(Clone)]
pub struct Unsubscribe {
    detach: Rc<dyn Fn() -> Result<()>>,
}

impl Unsubscribe {
    pub(crate) fn new<F>(detach: F) -> Self
    where
        F: Fn() -> Result<()> + 'static,
    {
        Self {
            detach: Rc::new(detach),
        }
    }

    /// A handle with nothing to remove.
    pub fn noop() -> Self {
        Self::new(|| Ok(()))
    }

    /// Remove the listener.
    pub fn unsubscribe(&self) -> Result<()> {
        (self.detach)()
    }
}

impl fmt::Debug for Unsubscribe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe").finish_non_exhaustive()
    }
}
