//! Selecting a value from the store inside a bound tree.
//!
//! A [`SelectorInstance`] nests under the context's subscription rather than
//! subscribing to the store directly, so it hears about a change only after
//! every bound instance above it has handled that change.

use std::fmt;
use std::rc::Rc;

use crate::equality::SameValue;
use crate::error::Result;
use crate::host::ForceUpdateHandle;
use crate::store::Store;
use crate::sync::{ExternalStoreWithSelector, GetSnapshot, IsEqual, Selector, Subscribe};

use super::provider::ProviderContext;

/// One selection of the store state, owned by one rendering instance.
pub struct SelectorInstance<S, Sel> {
    inner: ExternalStoreWithSelector<Rc<S>, Sel>,
}

/// Select with `selector`, re-rendering when the selection is no longer the
/// same value as the last one.
pub fn use_selector<S, Sel, F>(
    context: &ProviderContext<S>,
    selector: F,
    force_update: ForceUpdateHandle,
) -> SelectorInstance<S, Sel>
where
    S: 'static,
    Sel: Clone + SameValue + 'static,
    F: Fn(&S) -> Sel + 'static,
{
    SelectorInstance::new(context, selector, |a: &Sel, b: &Sel| a.same_value(b), force_update)
}

fn wrap_selector<S: 'static, Sel: 'static>(selector: impl Fn(&S) -> Sel + 'static) -> Selector<Rc<S>, Sel> {
    Rc::new(move |state: &Rc<S>| selector(state))
}

impl<S, Sel> SelectorInstance<S, Sel>
where
    S: 'static,
    Sel: Clone + SameValue + 'static,
{
    /// Select with `selector`, treating selections for which `is_equal`
    /// holds as unchanged.
    pub fn new<F, E>(context: &ProviderContext<S>, selector: F, is_equal: E, force_update: ForceUpdateHandle) -> Self
    where
        F: Fn(&S) -> Sel + 'static,
        E: Fn(&Sel, &Sel) -> bool + 'static,
    {
        let store = context.store().clone();
        let is_equal: IsEqual<Sel> = Rc::new(is_equal);
        let inner = ExternalStoreWithSelector::new(
            nested_subscribe(context),
            state_getter(&store),
            wrap_selector(selector),
            Some(is_equal),
            force_update,
            store.config(),
        );
        Self { inner }
    }

    /// The selection for this render pass.
    pub fn render(&self) -> Result<Sel> {
        self.inner.render()
    }

    /// The host committed a render with `rendered`.
    pub fn commit_layout(&self, rendered: Sel) -> Result<()> {
        self.inner.commit_layout(rendered)
    }

    /// Record the selection shown after paint.
    pub fn commit_passive(&self, rendered: Sel) {
        self.inner.commit_passive(rendered)
    }

    /// Subscribe under the context's subscription.
    pub fn attach(&self) -> Result<()> {
        self.inner.attach()
    }

    /// Unsubscribe. Safe to call more than once.
    pub fn teardown(&self) -> Result<()> {
        self.inner.detach()
    }

    /// Replace the selector, for example when it closes over new props.
    pub fn set_selector<F, E>(&self, selector: F, is_equal: E)
    where
        F: Fn(&S) -> Sel + 'static,
        E: Fn(&Sel, &Sel) -> bool + 'static,
    {
        let is_equal: IsEqual<Sel> = Rc::new(is_equal);
        self.inner.set_selector(wrap_selector(selector), Some(is_equal));
    }

    pub fn rendered_selection(&self) -> Option<Sel> {
        self.inner.rendered_selection()
    }

    pub fn is_attached(&self) -> bool {
        self.inner.is_attached()
    }
}

fn nested_subscribe<S: 'static>(context: &ProviderContext<S>) -> Subscribe {
    let subscription = context.subscription().clone();
    Rc::new(move |listener: Rc<dyn Fn()>| subscription.add_nested_sub_rc(listener))
}

fn state_getter<S: 'static>(store: &Store<S>) -> GetSnapshot<Rc<S>> {
    let store = store.clone();
    Rc::new(move || store.state_snapshot())
}

impl<S, Sel> fmt::Debug for SelectorInstance<S, Sel> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectorInstance")
            .field("inner", &self.inner)
            .finish()
    }
}
