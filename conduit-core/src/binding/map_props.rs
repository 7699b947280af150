//! Mapping store state and dispatch to props.
//!
//! Each mapping is a tagged variant picked once when a connector is built.
//! Per instance, a mapping is wrapped in a proxy that resolves factories on
//! first use and knows whether the mapping reads the own props.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::store::Dispatcher;

use super::props::{Prop, Props};

/// `state -> props`.
pub type MapStateFn<S> = Rc<dyn Fn(&S) -> Props>;
/// `(state, own props) -> props`.
pub type MapStateWithPropsFn<S> = Rc<dyn Fn(&S, &Props) -> Props>;
/// `dispatch -> props`.
pub type MapDispatchFn = Rc<dyn Fn(&Dispatcher) -> Props>;
/// `(dispatch, own props) -> props`.
pub type MapDispatchWithPropsFn = Rc<dyn Fn(&Dispatcher, &Props) -> Props>;
/// `(state props, dispatch props, own props) -> props`.
pub type MergePropsFn = Rc<dyn Fn(&Props, &Props, &Props) -> Props>;

/// Builds an action record from its arguments.
pub type ActionCreator = Rc<dyn Fn(Value) -> Value>;
/// Named action creators.
pub type ActionCreators = IndexMap<String, ActionCreator>;

/// A resolved state mapping, as produced by a [`MapState::Factory`].
pub enum StateMapper<S> {
    State(MapStateFn<S>),
    StateAndOwnProps(MapStateWithPropsFn<S>),
}

impl<S> StateMapper<S> {
    fn depends_on_own_props(&self) -> bool {
        matches!(self, StateMapper::StateAndOwnProps(_))
    }

    fn map(&self, state: &S, own_props: &Props) -> Props {
        match self {
            StateMapper::State(f) => f(state),
            StateMapper::StateAndOwnProps(f) => f(state, own_props),
        }
    }
}

/// How store state becomes props.
pub enum MapState<S> {
    /// No state props; the instance never subscribes to the store.
    None,
    State(MapStateFn<S>),
    StateAndOwnProps(MapStateWithPropsFn<S>),
    /// Called once per instance, with the first state and own props, to
    /// produce the mapping that instance uses.
    Factory(Rc<dyn Fn(&S, &Props) -> StateMapper<S>>),
}

impl<S> MapState<S> {
    pub fn state<F>(f: F) -> Self
    where
        F: Fn(&S) -> Props + 'static,
    {
        MapState::State(Rc::new(f))
    }

    pub fn with_own_props<F>(f: F) -> Self
    where
        F: Fn(&S, &Props) -> Props + 'static,
    {
        MapState::StateAndOwnProps(Rc::new(f))
    }

    pub fn factory<F>(f: F) -> Self
    where
        F: Fn(&S, &Props) -> StateMapper<S> + 'static,
    {
        MapState::Factory(Rc::new(f))
    }

    /// Returns true unless this is [`MapState::None`].
    pub fn is_present(&self) -> bool {
        !matches!(self, MapState::None)
    }
}

impl<S> Default for MapState<S> {
    fn default() -> Self {
        MapState::None
    }
}

// Manual impls: deriving would require `S: Clone`.
impl<S> Clone for StateMapper<S> {
    fn clone(&self) -> Self {
        match self {
            StateMapper::State(f) => StateMapper::State(Rc::clone(f)),
            StateMapper::StateAndOwnProps(f) => StateMapper::StateAndOwnProps(Rc::clone(f)),
        }
    }
}

impl<S> Clone for MapState<S> {
    fn clone(&self) -> Self {
        match self {
            MapState::None => MapState::None,
            MapState::State(f) => MapState::State(Rc::clone(f)),
            MapState::StateAndOwnProps(f) => MapState::StateAndOwnProps(Rc::clone(f)),
            MapState::Factory(f) => MapState::Factory(Rc::clone(f)),
        }
    }
}

impl<S> fmt::Debug for MapState<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MapState::None => "MapState::None",
            MapState::State(_) => "MapState::State",
            MapState::StateAndOwnProps(_) => "MapState::StateAndOwnProps",
            MapState::Factory(_) => "MapState::Factory",
        })
    }
}

/// A resolved dispatch mapping, as produced by a [`MapDispatch::Factory`].
#[derive(Clone)]
pub enum DispatchMapper {
    Dispatch(MapDispatchFn),
    DispatchAndOwnProps(MapDispatchWithPropsFn),
}

impl DispatchMapper {
    fn depends_on_own_props(&self) -> bool {
        matches!(self, DispatchMapper::DispatchAndOwnProps(_))
    }

    fn map(&self, dispatcher: &Dispatcher, own_props: &Props) -> Props {
        match self {
            DispatchMapper::Dispatch(f) => f(dispatcher),
            DispatchMapper::DispatchAndOwnProps(f) => f(dispatcher, own_props),
        }
    }
}

/// How the dispatch function becomes props.
#[derive(Clone, Default)]
pub enum MapDispatch {
    /// A single `dispatch` handler prop.
    #[default]
    Missing,
    /// Each creator bound to dispatch, under its own name.
    ActionCreators(ActionCreators),
    Dispatch(MapDispatchFn),
    DispatchAndOwnProps(MapDispatchWithPropsFn),
    /// Called once per instance to produce the mapping that instance uses.
    Factory(Rc<dyn Fn(&Dispatcher, &Props) -> DispatchMapper>),
}

impl MapDispatch {
    pub fn dispatch<F>(f: F) -> Self
    where
        F: Fn(&Dispatcher) -> Props + 'static,
    {
        MapDispatch::Dispatch(Rc::new(f))
    }

    pub fn with_own_props<F>(f: F) -> Self
    where
        F: Fn(&Dispatcher, &Props) -> Props + 'static,
    {
        MapDispatch::DispatchAndOwnProps(Rc::new(f))
    }

    pub fn factory<F>(f: F) -> Self
    where
        F: Fn(&Dispatcher, &Props) -> DispatchMapper + 'static,
    {
        MapDispatch::Factory(Rc::new(f))
    }

    /// Bind a set of named creators.
    pub fn action_creators<I, K>(creators: I) -> Self
    where
        I: IntoIterator<Item = (K, ActionCreator)>,
        K: Into<String>,
    {
        MapDispatch::ActionCreators(
            creators
                .into_iter()
                .map(|(key, creator)| (key.into(), creator))
                .collect(),
        )
    }
}

impl fmt::Debug for MapDispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapDispatch::Missing => f.write_str("MapDispatch::Missing"),
            MapDispatch::ActionCreators(creators) => f
                .debug_tuple("MapDispatch::ActionCreators")
                .field(&creators.keys().collect::<Vec<_>>())
                .finish(),
            MapDispatch::Dispatch(_) => f.write_str("MapDispatch::Dispatch"),
            MapDispatch::DispatchAndOwnProps(_) => f.write_str("MapDispatch::DispatchAndOwnProps"),
            MapDispatch::Factory(_) => f.write_str("MapDispatch::Factory"),
        }
    }
}

/// How state, dispatch and own props combine into the final props.
#[derive(Clone, Default)]
pub enum MergeProps {
    /// `own < state < dispatch`: later layers win on shared keys.
    #[default]
    Default,
    /// A custom merge. Its result is kept across calls while
    /// `are_merged_props_equal` holds.
    Custom(MergePropsFn),
}

impl MergeProps {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Props, &Props, &Props) -> Props + 'static,
    {
        MergeProps::Custom(Rc::new(f))
    }
}

impl fmt::Debug for MergeProps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MergeProps::Default => "MergeProps::Default",
            MergeProps::Custom(_) => "MergeProps::Custom",
        })
    }
}

/// Bind every creator so that calling it dispatches the action it builds.
pub fn bind_action_creators(creators: &ActionCreators, dispatcher: &Dispatcher) -> Props {
    creators
        .iter()
        .map(|(key, creator)| {
            let creator = Rc::clone(creator);
            let dispatcher = dispatcher.clone();
            let bound = Prop::handler(move |args| dispatcher.dispatch(creator(args)));
            (key.clone(), bound)
        })
        .collect()
}

/// Per-instance state mapping.
pub(crate) struct StateProxy<S> {
    source: MapState<S>,
    resolved: Option<StateMapper<S>>,
}

impl<S> StateProxy<S> {
    pub(crate) fn new(source: MapState<S>) -> Self {
        Self {
            source,
            resolved: None,
        }
    }

    /// An unresolved factory counts as depending on own props.
    pub(crate) fn depends_on_own_props(&self) -> bool {
        if let Some(mapper) = &self.resolved {
            return mapper.depends_on_own_props();
        }
        match &self.source {
            MapState::None | MapState::State(_) => false,
            MapState::StateAndOwnProps(_) | MapState::Factory(_) => true,
        }
    }

    pub(crate) fn map(&mut self, state: &S, own_props: &Props) -> Props {
        if let Some(mapper) = &self.resolved {
            return mapper.map(state, own_props);
        }
        match &self.source {
            MapState::None => Props::new(),
            MapState::State(f) => f(state),
            MapState::StateAndOwnProps(f) => f(state, own_props),
            MapState::Factory(factory) => {
                let mapper = factory(state, own_props);
                let props = mapper.map(state, own_props);
                self.resolved = Some(mapper);
                props
            }
        }
    }
}

/// Per-instance dispatch mapping.
pub(crate) enum DispatchProxy {
    /// Computed once when the instance is created.
    Constant(Rc<Props>),
    Pending(Rc<dyn Fn(&Dispatcher, &Props) -> DispatchMapper>),
    Mapper(DispatchMapper),
}

impl DispatchProxy {
    pub(crate) fn new(source: &MapDispatch, dispatcher: &Dispatcher) -> Self {
        match source {
            MapDispatch::Missing => {
                DispatchProxy::Constant(Rc::new(Props::new().with("dispatch", dispatcher.clone())))
            }
            MapDispatch::ActionCreators(creators) => {
                DispatchProxy::Constant(Rc::new(bind_action_creators(creators, dispatcher)))
            }
            MapDispatch::Dispatch(f) => DispatchProxy::Mapper(DispatchMapper::Dispatch(Rc::clone(f))),
            MapDispatch::DispatchAndOwnProps(f) => {
                DispatchProxy::Mapper(DispatchMapper::DispatchAndOwnProps(Rc::clone(f)))
            }
            MapDispatch::Factory(factory) => DispatchProxy::Pending(Rc::clone(factory)),
        }
    }

    pub(crate) fn depends_on_own_props(&self) -> bool {
        match self {
            DispatchProxy::Constant(_) => false,
            DispatchProxy::Pending(_) => true,
            DispatchProxy::Mapper(mapper) => mapper.depends_on_own_props(),
        }
    }

    pub(crate) fn map(&mut self, dispatcher: &Dispatcher, own_props: &Props) -> Rc<Props> {
        match self {
            DispatchProxy::Constant(props) => Rc::clone(props),
            DispatchProxy::Mapper(mapper) => Rc::new(mapper.map(dispatcher, own_props)),
            DispatchProxy::Pending(factory) => {
                let mapper = factory(dispatcher, own_props);
                let props = Rc::new(mapper.map(dispatcher, own_props));
                *self = DispatchProxy::Mapper(mapper);
                props
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    fn recording_dispatcher() -> (Dispatcher, Rc<RefCell<Vec<Value>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = log.clone();
        let dispatcher = Dispatcher::new(move |action| {
            log_clone.borrow_mut().push(action.clone());
            Ok(action)
        });
        (dispatcher, log)
    }

    #[test]
    fn bound_creators_dispatch_what_they_build() {
        let (dispatcher, log) = recording_dispatcher();
        let add: ActionCreator = Rc::new(|text| json!({ "type": "ADD", "text": text }));
        let mut creators = ActionCreators::new();
        creators.insert("add".to_string(), add);

        let props = bind_action_creators(&creators, &dispatcher);
        props.call("add", json!("milk")).unwrap().unwrap();
        assert_eq!(*log.borrow(), vec![json!({ "type": "ADD", "text": "milk" })]);
    }

    #[test]
    fn missing_dispatch_mapping_exposes_dispatch() {
        let (dispatcher, log) = recording_dispatcher();
        let mut proxy = DispatchProxy::new(&MapDispatch::Missing, &dispatcher);

        let first = proxy.map(&dispatcher, &Props::new());
        let second = proxy.map(&dispatcher, &Props::new());
        assert!(Rc::ptr_eq(&first, &second));
        assert!(!proxy.depends_on_own_props());

        first.call("dispatch", json!({ "type": "PING" })).unwrap().unwrap();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn state_factory_resolves_once() {
        let calls = Rc::new(RefCell::new(0));
        let calls_clone = calls.clone();
        let map_state: MapState<i64> = MapState::factory(move |_, _| {
            *calls_clone.borrow_mut() += 1;
            StateMapper::State(Rc::new(|state: &i64| Props::new().with("n", json!(state))))
        });

        let mut proxy = StateProxy::new(map_state);
        assert!(proxy.depends_on_own_props());
        assert_eq!(proxy.map(&1, &Props::new()).value("n"), Some(&json!(1)));
        assert_eq!(proxy.map(&2, &Props::new()).value("n"), Some(&json!(2)));
        assert_eq!(*calls.borrow(), 1);
        assert!(!proxy.depends_on_own_props());
    }

    #[test]
    fn dispatch_factory_resolves_once() {
        let (dispatcher, _) = recording_dispatcher();
        let map_dispatch = MapDispatch::factory(|_, _| {
            DispatchMapper::DispatchAndOwnProps(Rc::new(|_: &Dispatcher, own: &Props| {
                Props::new().with("id", own.value("id").cloned().unwrap_or(Value::Null))
            }))
        });

        let mut proxy = DispatchProxy::new(&map_dispatch, &dispatcher);
        let own = Props::new().with("id", json!(7));
        assert_eq!(proxy.map(&dispatcher, &own).value("id"), Some(&json!(7)));
        assert!(proxy.depends_on_own_props());
    }
}
