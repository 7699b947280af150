//! Reducers.
//!
//! A reducer computes the next state from the current one and an action.
//! It receives the current state as a shared reference-counted value and
//! returns the same `Rc` when nothing changed, so that readers comparing
//! snapshots by identity can bail out.

use std::rc::Rc;

use indexmap::IndexMap;

use super::action::Action;

/// Pure `(state, action) -> state` function.
///
/// `state` is `None` only for the store's init action when no preloaded
/// state was supplied; the reducer must then return its default state.
pub trait Reducer<S> {
    /// Compute the next state.
    fn reduce(&self, state: Option<Rc<S>>, action: &Action) -> Rc<S>;
}

impl<S, F> Reducer<S> for F
where
    F: Fn(Option<Rc<S>>, &Action) -> Rc<S>,
{
    fn reduce(&self, state: Option<Rc<S>>, action: &Action) -> Rc<S> {
        self(state, action)
    }
}

/// State produced by [`combine_reducers`]: one slice per reducer key.
pub type CombinedState<T> = IndexMap<String, Rc<T>>;

/// Reducer that delegates each key of its state to its own slice reducer.
pub struct CombinedReducer<T> {
    reducers: IndexMap<String, Rc<dyn Reducer<T>>>,
}

/// Combine named slice reducers into one reducer over a [`CombinedState`].
///
/// Every slice reducer sees every action along with its own slice only.
/// Keys present in the previous state but unknown to the reducers are
/// dropped. When no slice changed identity the previous state is returned
/// as is.
pub fn combine_reducers<T, I, K>(reducers: I) -> CombinedReducer<T>
where
    I: IntoIterator<Item = (K, Rc<dyn Reducer<T>>)>,
    K: Into<String>,
{
    CombinedReducer {
        reducers: reducers
            .into_iter()
            .map(|(key, reducer)| (key.into(), reducer))
            .collect(),
    }
}

impl<T> Reducer<CombinedState<T>> for CombinedReducer<T> {
    fn reduce(
        &self,
        state: Option<Rc<CombinedState<T>>>,
        action: &Action,
    ) -> Rc<CombinedState<T>> {
        let mut has_changed = match &state {
            Some(previous) => previous.len() != self.reducers.len(),
            None => true,
        };

        let mut next = CombinedState::with_capacity(self.reducers.len());
        for (key, reducer) in &self.reducers {
            let previous_slice = state.as_ref().and_then(|s| s.get(key)).cloned();
            let next_slice = reducer.reduce(previous_slice.clone(), action);

            has_changed |= match &previous_slice {
                Some(previous_slice) => !Rc::ptr_eq(previous_slice, &next_slice),
                None => true,
            };
            next.insert(key.clone(), next_slice);
        }

        match state {
            Some(previous) if !has_changed => previous,
            _ => Rc::new(next),
        }
    }
}
