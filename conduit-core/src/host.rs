//! Host rendering system contracts.
//!
//! The rendering system that owns the component tree is an external
//! collaborator. It is expected to provide:
//!
//! - per-instance state that survives re-renders (the host simply owns the
//!   instance objects this crate hands out),
//! - two effect timings, driven through the explicit lifecycle methods on
//!   [`ExternalStore`](crate::sync::ExternalStore) and
//!   [`Connected`](crate::binding::Connected): `commit_layout` right after
//!   commit and `attach` after paint,
//! - a [`ForceUpdate`] primitive that always schedules a re-render,
//! - a [`Batch`] boundary that coalesces synchronous notifications into one
//!   scheduling pass.

use std::rc::Rc;

/// Coalesces the updates requested inside `f` into one scheduling pass.
pub trait Batch {
    /// Run `f` inside the batching boundary.
    fn batch(&self, f: &mut dyn FnMut());
}

/// Batch boundary that runs the callback immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbatched;

impl Batch for Unbatched {
    fn batch(&self, f: &mut dyn FnMut()) {
        f()
    }
}

/// Asks the host to re-render one instance.
///
/// Every call must result in a render, even when issued several times
/// before the host gets around to it.
pub trait ForceUpdate {
    /// Schedule a re-render of the owning instance.
    fn force_update(&self);
}

impl<F: Fn()> ForceUpdate for F {
    fn force_update(&self) {
        self()
    }
}

/// Shared handle to a host's force-update primitive.
pub type ForceUpdateHandle = Rc<dyn ForceUpdate>;

/// Default batch boundary handle.
pub fn unbatched() -> Rc<dyn Batch> {
    Rc::new(Unbatched)
}
