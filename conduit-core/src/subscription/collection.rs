//! Ordered listener collection.
//!
//! Listeners live in an arena of slots linked into a doubly linked list by
//! index. Freed slots go on a free list and are reused; each slot carries a
//! generation that is bumped on removal, so a handle to a removed listener
//! can never remove whatever later occupies the same slot.

use std::rc::Rc;

use smallvec::SmallVec;

/// Callbacks captured for one notification pass.
pub(crate) type CallbackSnapshot = SmallVec<[Rc<dyn Fn()>; 8]>;

/// Handle to one listener in a [`ListenerCollection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ListenerKey {
    index: usize,
    generation: u32,
}

struct Node {
    callback: Rc<dyn Fn()>,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Slot {
    generation: u32,
    node: Option<Node>,
}

#[derive(Default)]
pub(crate) struct ListenerCollection {
    slots: Vec<Slot>,
    free: Vec<usize>,
    first: Option<usize>,
    last: Option<usize>,
    len: usize,
}

impl ListenerCollection {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn node_mut(&mut self, index: usize) -> Option<&mut Node> {
        self.slots.get_mut(index).and_then(|slot| slot.node.as_mut())
    }

    /// Append `callback` at the end of the list.
    pub(crate) fn insert(&mut self, callback: Rc<dyn Fn()>) -> ListenerKey {
        let node = Node {
            callback,
            prev: self.last,
            next: None,
        };

        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index].node = Some(node);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                self.slots.len() - 1
            }
        };

        match self.last {
            Some(last) => {
                if let Some(tail) = self.node_mut(last) {
                    tail.next = Some(index);
                }
            }
            None => self.first = Some(index),
        }
        self.last = Some(index);
        self.len += 1;

        ListenerKey {
            index,
            generation: self.slots[index].generation,
        }
    }

    /// Unlink the listener behind `key`. Returns false if it was already
    /// removed.
    pub(crate) fn remove(&mut self, key: ListenerKey) -> bool {
        let node = match self.slots.get_mut(key.index) {
            Some(slot) if slot.generation == key.generation => match slot.node.take() {
                Some(node) => {
                    slot.generation = slot.generation.wrapping_add(1);
                    node
                }
                None => return false,
            },
            _ => return false,
        };

        match node.next {
            Some(next) => {
                if let Some(successor) = self.node_mut(next) {
                    successor.prev = node.prev;
                }
            }
            None => self.last = node.prev,
        }
        match node.prev {
            Some(prev) => {
                if let Some(predecessor) = self.node_mut(prev) {
                    predecessor.next = node.next;
                }
            }
            None => self.first = node.next,
        }

        self.free.push(key.index);
        self.len -= 1;
        true
    }

    /// Remove every listener. Outstanding keys become stale.
    pub(crate) fn clear(&mut self) {
        self.free.clear();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
            self.free.push(index);
        }
        self.first = None;
        self.last = None;
        self.len = 0;
    }

    /// The callbacks in insertion order.
    pub(crate) fn callbacks(&self) -> CallbackSnapshot {
        let mut callbacks = CallbackSnapshot::with_capacity(self.len);
        let mut cursor = self.first;
        while let Some(index) = cursor {
            match self.slots.get(index).and_then(|slot| slot.node.as_ref()) {
                Some(node) => {
                    callbacks.push(Rc::clone(&node.callback));
                    cursor = node.next;
                }
                None => break,
            }
        }
        callbacks
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}
