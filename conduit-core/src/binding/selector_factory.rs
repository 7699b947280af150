//! Final props selector.
//!
//! [`PropsSelector`] derives the props a bound instance renders with from
//! the store state and the instance's own props. It remembers its last
//! inputs and only re-runs the mappings whose inputs changed:
//!
//! | own props | state   | work                                                  |
//! |-----------|---------|-------------------------------------------------------|
//! | changed   | changed | map state; map dispatch if it reads own props; merge  |
//! | changed   | same    | re-map what reads own props; merge                    |
//! | same      | changed | map state; merge only if the state props changed      |
//! | same      | same    | nothing                                               |
//!
//! The result is an `Rc<Props>`; an unchanged result is the same `Rc`.

use std::fmt;
use std::rc::Rc;

use crate::store::Dispatcher;

use super::map_props::{DispatchProxy, MapDispatch, MapState, MergeProps, MergePropsFn, StateProxy};
use super::props::Props;

/// Equality function over two values of `T`, called as `(next, previous)`.
pub type EqualityFn<T> = Rc<dyn Fn(&T, &T) -> bool>;

/// Comparisons used by [`PropsSelector`].
pub struct ConnectOptions<S> {
    /// Whether two store states count as the same. Defaults to identity.
    pub are_states_equal: EqualityFn<Rc<S>>,
    /// Defaults to [`Props::shallow_eq`].
    pub are_own_props_equal: EqualityFn<Props>,
    /// Defaults to [`Props::shallow_eq`].
    pub are_state_props_equal: EqualityFn<Props>,
    /// Used by [`MergeProps::Custom`] only. Defaults to [`Props::shallow_eq`].
    pub are_merged_props_equal: EqualityFn<Props>,
}

impl<S> ConnectOptions<S> {
    pub fn are_states_equal<F>(mut self, f: F) -> Self
    where
        F: Fn(&Rc<S>, &Rc<S>) -> bool + 'static,
    {
        self.are_states_equal = Rc::new(f);
        self
    }

    pub fn are_own_props_equal<F>(mut self, f: F) -> Self
    where
        F: Fn(&Props, &Props) -> bool + 'static,
    {
        self.are_own_props_equal = Rc::new(f);
        self
    }

    pub fn are_state_props_equal<F>(mut self, f: F) -> Self
    where
        F: Fn(&Props, &Props) -> bool + 'static,
    {
        self.are_state_props_equal = Rc::new(f);
        self
    }

    pub fn are_merged_props_equal<F>(mut self, f: F) -> Self
    where
        F: Fn(&Props, &Props) -> bool + 'static,
    {
        self.are_merged_props_equal = Rc::new(f);
        self
    }
}

impl<S> Default for ConnectOptions<S> {
    fn default() -> Self {
        let shallow: EqualityFn<Props> = Rc::new(|next: &Props, previous: &Props| next.shallow_eq(previous));
        Self {
            are_states_equal: Rc::new(|next: &Rc<S>, previous: &Rc<S>| Rc::ptr_eq(next, previous)),
            are_own_props_equal: Rc::clone(&shallow),
            are_state_props_equal: Rc::clone(&shallow),
            are_merged_props_equal: shallow,
        }
    }
}

impl<S> Clone for ConnectOptions<S> {
    fn clone(&self) -> Self {
        Self {
            are_states_equal: Rc::clone(&self.are_states_equal),
            are_own_props_equal: Rc::clone(&self.are_own_props_equal),
            are_state_props_equal: Rc::clone(&self.are_state_props_equal),
            are_merged_props_equal: Rc::clone(&self.are_merged_props_equal),
        }
    }
}

impl<S> fmt::Debug for ConnectOptions<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions").finish_non_exhaustive()
    }
}

/// Per-instance merge step.
enum MergeProxy {
    Default,
    Custom {
        merge: MergePropsFn,
        are_equal: EqualityFn<Props>,
        last: Option<Rc<Props>>,
    },
}

impl MergeProxy {
    fn new(source: &MergeProps, are_equal: &EqualityFn<Props>) -> Self {
        match source {
            MergeProps::Default => MergeProxy::Default,
            MergeProps::Custom(merge) => MergeProxy::Custom {
                merge: Rc::clone(merge),
                are_equal: Rc::clone(are_equal),
                last: None,
            },
        }
    }

    fn merge(&mut self, state_props: &Props, dispatch_props: &Props, own_props: &Props) -> Rc<Props> {
        match self {
            MergeProxy::Default => Rc::new(Props::merged([own_props, state_props, dispatch_props])),
            MergeProxy::Custom {
                merge,
                are_equal,
                last,
            } => {
                let next = merge(state_props, dispatch_props, own_props);
                if let Some(previous) = last.as_ref() {
                    if are_equal(&next, previous) {
                        return Rc::clone(previous);
                    }
                }
                let next = Rc::new(next);
                *last = Some(Rc::clone(&next));
                next
            }
        }
    }
}

/// Inputs and outputs of the last call.
struct Memo<S> {
    state: Rc<S>,
    own_props: Rc<Props>,
    state_props: Rc<Props>,
    dispatch_props: Rc<Props>,
    merged: Rc<Props>,
}

/// Memoized `(state, own props) -> props` for one bound instance.
pub struct PropsSelector<S> {
    map_state: StateProxy<S>,
    map_dispatch: DispatchProxy,
    merge: MergeProxy,
    dispatcher: Dispatcher,
    options: ConnectOptions<S>,
    memo: Option<Memo<S>>,
}

impl<S> PropsSelector<S> {
    pub fn new(
        map_state: MapState<S>,
        map_dispatch: &MapDispatch,
        merge_props: &MergeProps,
        dispatcher: Dispatcher,
        options: ConnectOptions<S>,
    ) -> Self {
        Self {
            map_state: StateProxy::new(map_state),
            map_dispatch: DispatchProxy::new(map_dispatch, &dispatcher),
            merge: MergeProxy::new(merge_props, &options.are_merged_props_equal),
            dispatcher,
            options,
            memo: None,
        }
    }

    /// Derive the props for `state` and `own_props`.
    pub fn select(&mut self, state: Rc<S>, own_props: Rc<Props>) -> Rc<Props> {
        let Some(memo) = self.memo.take() else {
            return self.first_call(state, own_props);
        };

        let props_changed = !(self.options.are_own_props_equal)(&own_props, &memo.own_props);
        let state_changed = !(self.options.are_states_equal)(&state, &memo.state);

        let memo = Memo {
            state,
            own_props,
            ..memo
        };
        let memo = match (props_changed, state_changed) {
            (true, true) => self.new_props_and_state(memo),
            (true, false) => self.new_props(memo),
            (false, true) => self.new_state(memo),
            (false, false) => memo,
        };

        let merged = Rc::clone(&memo.merged);
        self.memo = Some(memo);
        merged
    }

    fn first_call(&mut self, state: Rc<S>, own_props: Rc<Props>) -> Rc<Props> {
        let state_props = Rc::new(self.map_state.map(&state, &own_props));
        let dispatch_props = self.map_dispatch.map(&self.dispatcher, &own_props);
        let merged = self.merge.merge(&state_props, &dispatch_props, &own_props);

        self.memo = Some(Memo {
            state,
            own_props,
            state_props,
            dispatch_props,
            merged: Rc::clone(&merged),
        });
        merged
    }

    fn new_props_and_state(&mut self, mut memo: Memo<S>) -> Memo<S> {
        memo.state_props = Rc::new(self.map_state.map(&memo.state, &memo.own_props));
        if self.map_dispatch.depends_on_own_props() {
            memo.dispatch_props = self.map_dispatch.map(&self.dispatcher, &memo.own_props);
        }
        memo.merged = self.merge.merge(&memo.state_props, &memo.dispatch_props, &memo.own_props);
        memo
    }

    fn new_props(&mut self, mut memo: Memo<S>) -> Memo<S> {
        if self.map_state.depends_on_own_props() {
            memo.state_props = Rc::new(self.map_state.map(&memo.state, &memo.own_props));
        }
        if self.map_dispatch.depends_on_own_props() {
            memo.dispatch_props = self.map_dispatch.map(&self.dispatcher, &memo.own_props);
        }
        memo.merged = self.merge.merge(&memo.state_props, &memo.dispatch_props, &memo.own_props);
        memo
    }

    fn new_state(&mut self, mut memo: Memo<S>) -> Memo<S> {
        let next_state_props = self.map_state.map(&memo.state, &memo.own_props);
        let state_props_changed = !(self.options.are_state_props_equal)(&next_state_props, &memo.state_props);
        memo.state_props = Rc::new(next_state_props);

        if state_props_changed {
            memo.merged = self.merge.merge(&memo.state_props, &memo.dispatch_props, &memo.own_props);
        }
        memo
    }

    /// The props returned by the last call, if any.
    pub fn last(&self) -> Option<Rc<Props>> {
        self.memo.as_ref().map(|memo| Rc::clone(&memo.merged))
    }
}
