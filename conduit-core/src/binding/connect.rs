//! Bound instances.
//!
//! A [`Connector`] holds the mappings and comparison options chosen once for
//! a kind of component. [`Connector::connect`] creates one [`Connected`]
//! instance per mounted component; the host drives it through `render`,
//! `commit_layout`, `attach` and `teardown`.
//!
//! An instance with a state mapping gets its own child [`Subscription`] and
//! re-derives its props on every store change. When the props are the same
//! `Rc` as the last rendered ones, nothing re-renders and the change is
//! passed straight on to nested instances. Otherwise a render is requested
//! and the nested instances are notified only after that render committed,
//! so they never derive from props their parent has not rendered yet.
//!
//! Without a state mapping an instance never subscribes.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use crate::error::Result;
use crate::host::ForceUpdateHandle;
use crate::store::{Store, Unsubscribe};
use crate::subscription::Subscription;
use crate::sync::{ExternalStore, GetSnapshot, Subscribe};

use super::map_props::{MapDispatch, MapState, MergeProps};
use super::props::Props;
use super::provider::ProviderContext;
use super::selector_factory::{ConnectOptions, PropsSelector};

/// Mapping configuration shared by every instance of one bound component.
pub struct Connector<S> {
    map_state: MapState<S>,
    map_dispatch: MapDispatch,
    merge_props: MergeProps,
    options: ConnectOptions<S>,
}

/// Build a [`Connector`] from all four parts at once.
pub fn connect<S: 'static>(
    map_state: MapState<S>,
    map_dispatch: MapDispatch,
    merge_props: MergeProps,
    options: ConnectOptions<S>,
) -> Connector<S> {
    Connector {
        map_state,
        map_dispatch,
        merge_props,
        options,
    }
}

impl<S: 'static> Connector<S> {
    /// No state props, a `dispatch` prop, default merge and options.
    pub fn new() -> Self {
        connect(
            MapState::None,
            MapDispatch::Missing,
            MergeProps::Default,
            ConnectOptions::default(),
        )
    }

    pub fn map_state(mut self, map_state: MapState<S>) -> Self {
        self.map_state = map_state;
        self
    }

    pub fn map_dispatch(mut self, map_dispatch: MapDispatch) -> Self {
        self.map_dispatch = map_dispatch;
        self
    }

    pub fn merge_props(mut self, merge_props: MergeProps) -> Self {
        self.merge_props = merge_props;
        self
    }

    pub fn options(mut self, options: ConnectOptions<S>) -> Self {
        self.options = options;
        self
    }

    /// Returns true if instances subscribe to store changes.
    pub fn handles_state_changes(&self) -> bool {
        self.map_state.is_present()
    }

    /// Create an instance under `context`, rendering first with `own_props`.
    pub fn connect(
        &self,
        context: &ProviderContext<S>,
        own_props: Rc<Props>,
        force_update: ForceUpdateHandle,
    ) -> Connected<S> {
        Connected::new(self, context, own_props, force_update)
    }
}

impl<S: 'static> Default for Connector<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for Connector<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("map_state", &self.map_state)
            .field("map_dispatch", &self.map_dispatch)
            .field("merge_props", &self.merge_props)
            .finish()
    }
}

/// State shared between an instance, its snapshot getter and its store
/// change handler.
struct Shared<S> {
    store: Store<S>,
    /// Empty while one of this instance's mappings is running.
    selector: RefCell<Option<PropsSelector<S>>>,
    /// Present only when the instance maps state.
    subscription: Option<Subscription>,
    /// Props of the last commit, or of the last store-driven change.
    last_child_props: RefCell<Option<Rc<Props>>>,
    /// Own props of the last commit.
    last_wrapper_props: RefCell<Rc<Props>>,
    /// Props computed by a store change and not yet rendered.
    child_props_from_store_update: RefCell<Option<Rc<Props>>>,
    /// Set by a store-driven change until the next commit.
    render_is_scheduled: Cell<bool>,
    /// Set by the first commit, cleared by teardown.
    is_mounted: Cell<bool>,
    /// A store change arrived while the selector was out of its slot.
    missed_update: Cell<bool>,
}

/// Keeps the selector out of its slot while user mappings run and puts it
/// back on drop, unwinding included.
struct SelectorLease<'a, S> {
    slot: &'a RefCell<Option<PropsSelector<S>>>,
    selector: Option<PropsSelector<S>>,
}

impl<S> Drop for SelectorLease<'_, S> {
    fn drop(&mut self) {
        *self.slot.borrow_mut() = self.selector.take();
    }
}

impl<S: 'static> Shared<S> {
    fn notify_nested_subs(&self) {
        if let Some(subscription) = &self.subscription {
            subscription.notify_nested_subs();
        }
    }

    /// Run the selector. Returns `None` when re-entered from a mapping
    /// that dispatched.
    fn select(&self, state: Rc<S>, wrapper_props: Rc<Props>) -> Option<Rc<Props>> {
        let selector = self.selector.borrow_mut().take()?;
        let mut lease = SelectorLease {
            slot: &self.selector,
            selector: Some(selector),
        };
        let props = lease.selector.as_mut()?.select(state, wrapper_props);
        Some(props)
    }

    fn child_props(&self, wrapper_props: &Rc<Props>) -> Rc<Props> {
        let from_store_update = self.child_props_from_store_update.borrow().clone();
        if let Some(props) = from_store_update {
            if Rc::ptr_eq(wrapper_props, &self.last_wrapper_props.borrow()) {
                return props;
            }
        }
        let state = self.store.state_snapshot();
        match self.select(state, Rc::clone(wrapper_props)) {
            Some(props) => props,
            None => {
                // Rendered from inside a mapping; the outer check re-runs.
                self.missed_update.set(true);
                self.last_child_props
                    .borrow()
                    .clone()
                    .unwrap_or_else(|| Rc::new(Props::new()))
            }
        }
    }

    /// Runs on every store change reaching this instance.
    ///
    /// A change raised by a mapping while it runs is picked up by looping
    /// once the selector is back.
    fn check_for_updates(&self, did_unsubscribe: &Cell<bool>, request_render: &Rc<dyn Fn()>) {
        loop {
            if did_unsubscribe.get() || !self.is_mounted.get() {
                return;
            }
            self.missed_update.set(false);

            let state = self.store.state_snapshot();
            let wrapper_props = self.last_wrapper_props.borrow().clone();
            let Some(new_child_props) = self.select(state, wrapper_props) else {
                self.missed_update.set(true);
                return;
            };

            let unchanged = self
                .last_child_props
                .borrow()
                .as_ref()
                .is_some_and(|last| Rc::ptr_eq(last, &new_child_props));

            if unchanged {
                if !self.render_is_scheduled.get() {
                    self.notify_nested_subs();
                }
            } else {
                trace!("props changed, requesting render");
                *self.last_child_props.borrow_mut() = Some(Rc::clone(&new_child_props));
                *self.child_props_from_store_update.borrow_mut() = Some(new_child_props);
                self.render_is_scheduled.set(true);
                request_render();
            }

            if !self.missed_update.get() {
                return;
            }
            trace!("store changed during mapping, checking again");
        }
    }
}

/// One bound instance.
pub struct Connected<S> {
    shared: Rc<Shared<S>>,
    external: ExternalStore<Rc<Props>>,
    context: ProviderContext<S>,
    /// Own props the snapshot getter was built for.
    getter_props: RefCell<Rc<Props>>,
    /// Own props of the last `render`.
    rendered_props: RefCell<Rc<Props>>,
}

impl<S: 'static> Connected<S> {
    fn new(
        connector: &Connector<S>,
        context: &ProviderContext<S>,
        own_props: Rc<Props>,
        force_update: ForceUpdateHandle,
    ) -> Self {
        let store = context.store().clone();
        let subscription = connector
            .handles_state_changes()
            .then(|| Subscription::child(context.subscription()));

        let selector = PropsSelector::new(
            connector.map_state.clone(),
            &connector.map_dispatch,
            &connector.merge_props,
            store.dispatcher(),
            connector.options.clone(),
        );

        let shared = Rc::new(Shared {
            store: store.clone(),
            selector: RefCell::new(Some(selector)),
            subscription: subscription.clone(),
            last_child_props: RefCell::new(None),
            last_wrapper_props: RefCell::new(Rc::clone(&own_props)),
            child_props_from_store_update: RefCell::new(None),
            render_is_scheduled: Cell::new(false),
            is_mounted: Cell::new(false),
            missed_update: Cell::new(false),
        });

        let external = ExternalStore::new(
            Self::subscribe_updates(&shared),
            Self::child_props_getter(&shared, Rc::clone(&own_props)),
            force_update,
            store.config(),
        );

        let context = match subscription {
            Some(subscription) => context.with_subscription(subscription),
            None => context.clone(),
        };

        Self {
            shared,
            external,
            context,
            getter_props: RefCell::new(Rc::clone(&own_props)),
            rendered_props: RefCell::new(own_props),
        }
    }

    fn child_props_getter(shared: &Rc<Shared<S>>, wrapper_props: Rc<Props>) -> GetSnapshot<Rc<Props>> {
        let shared = Rc::clone(shared);
        Rc::new(move || shared.child_props(&wrapper_props))
    }

    fn subscribe_updates(shared: &Rc<Shared<S>>) -> Subscribe {
        let shared = Rc::clone(shared);
        Rc::new(move |request_render: Rc<dyn Fn()>| -> Result<Unsubscribe> {
            let Some(subscription) = shared.subscription.clone() else {
                return Ok(Unsubscribe::noop());
            };

            let did_unsubscribe = Rc::new(Cell::new(false));
            {
                let weak = Rc::downgrade(&shared);
                let did_unsubscribe = Rc::clone(&did_unsubscribe);
                let request_render = Rc::clone(&request_render);
                subscription.set_on_state_change(move || {
                    if let Some(shared) = weak.upgrade() {
                        shared.check_for_updates(&did_unsubscribe, &request_render);
                    }
                });
            }
            subscription.try_subscribe()?;
            shared.check_for_updates(&did_unsubscribe, &request_render);

            Ok(Unsubscribe::new(move || {
                did_unsubscribe.set(true);
                subscription.try_unsubscribe()?;
                subscription.clear_on_state_change();
                Ok(())
            }))
        })
    }

    /// Compute the props to render with for `own_props`.
    pub fn render(&self, own_props: Rc<Props>) -> Result<Rc<Props>> {
        let stale = !Rc::ptr_eq(&self.getter_props.borrow(), &own_props);
        if stale {
            self.external
                .set_get_snapshot(Self::child_props_getter(&self.shared, Rc::clone(&own_props)));
            *self.getter_props.borrow_mut() = Rc::clone(&own_props);
        }
        *self.rendered_props.borrow_mut() = own_props;
        self.external.render()
    }

    /// The host committed a render with `rendered`.
    ///
    /// Nested instances waiting on this render are notified here.
    pub fn commit_layout(&self, rendered: Rc<Props>) -> Result<()> {
        let shared = &self.shared;
        shared.is_mounted.set(true);
        *shared.last_wrapper_props.borrow_mut() = self.rendered_props.borrow().clone();
        shared.render_is_scheduled.set(false);

        let from_store_update = shared.child_props_from_store_update.borrow_mut().take();
        if from_store_update.is_some() {
            shared.notify_nested_subs();
        }

        let checked = self.external.commit_layout(Rc::clone(&rendered));
        *shared.last_child_props.borrow_mut() = Some(rendered);
        shared.child_props_from_store_update.borrow_mut().take();
        checked
    }

    /// Start listening for store changes, after the first paint.
    pub fn attach(&self) -> Result<()> {
        self.external.attach()
    }

    /// Stop listening. Safe to call more than once.
    pub fn teardown(&self) -> Result<()> {
        self.shared.is_mounted.set(false);
        self.external.detach()
    }

    /// Context for the instances nested inside this one.
    ///
    /// With a state mapping this carries the instance's own subscription;
    /// otherwise it is the context the instance was created with.
    pub fn context(&self) -> ProviderContext<S> {
        self.context.clone()
    }

    /// The instance's own subscription, if it handles state changes.
    pub fn subscription(&self) -> Option<&Subscription> {
        self.shared.subscription.as_ref()
    }

    /// Props of the last commit.
    pub fn last_props(&self) -> Option<Rc<Props>> {
        self.shared.last_child_props.borrow().clone()
    }

    /// Returns true while a store-driven render is pending.
    pub fn render_is_scheduled(&self) -> bool {
        self.shared.render_is_scheduled.get()
    }
}

impl<S> fmt::Debug for Connected<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connected")
            .field("subscription", &self.shared.subscription)
            .field("mounted", &self.shared.is_mounted.get())
            .field("render_is_scheduled", &self.shared.render_is_scheduled.get())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Provider;
    use crate::store::Action;
    use serde_json::{json, Value};

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        count: i64,
        other: i64,
    }

    fn reducer(state: Option<Rc<Counter>>, action: &Action) -> Rc<Counter> {
        let current = state.unwrap_or_else(|| Rc::new(Counter { count: 0, other: 0 }));
        match action.kind_str() {
            Some("INC") => Rc::new(Counter {
                count: current.count + 1,
                ..*current
            }),
            Some("OTHER") => Rc::new(Counter {
                other: current.other + 1,
                ..*current
            }),
            _ => current,
        }
    }

    /// Host stand-in: counts requested renders and runs them on demand.
    struct Host {
        requests: Rc<Cell<u32>>,
    }

    impl Host {
        fn new() -> Self {
            Self {
                requests: Rc::new(Cell::new(0)),
            }
        }

        fn force_update(&self) -> ForceUpdateHandle {
            let requests = self.requests.clone();
            Rc::new(move || requests.set(requests.get() + 1))
        }

        fn render_pass<S: 'static>(&self, instance: &Connected<S>, own: &Rc<Props>) -> Rc<Props> {
            let props = instance.render(Rc::clone(own)).unwrap();
            instance.commit_layout(Rc::clone(&props)).unwrap();
            props
        }
    }

    fn count_props() -> MapState<Counter> {
        MapState::state(|state: &Counter| Props::new().with("count", json!(state.count)))
    }

    fn mounted(
        connector: &Connector<Counter>,
        context: &ProviderContext<Counter>,
        host: &Host,
    ) -> (Connected<Counter>, Rc<Props>) {
        let own = Rc::new(Props::new());
        let instance = connector.connect(context, Rc::clone(&own), host.force_update());
        host.render_pass(&instance, &own);
        instance.attach().unwrap();
        (instance, own)
    }

    #[test]
    fn renders_state_and_dispatch_props() {
        let store = Store::new(reducer);
        let provider = Provider::new(store.clone());
        provider.mount().unwrap();
        let host = Host::new();

        let connector = Connector::new().map_state(count_props());
        let (instance, _) = mounted(&connector, &provider.context(), &host);

        let props = instance.last_props().unwrap();
        assert_eq!(props.value("count"), Some(&json!(0)));
        props.call("dispatch", json!({ "type": "INC" })).unwrap().unwrap();
        assert_eq!(store.get_state().unwrap().count, 1);
    }

    #[test]
    fn relevant_change_requests_one_render() {
        let store = Store::new(reducer);
        let provider = Provider::new(store.clone());
        provider.mount().unwrap();
        let host = Host::new();

        let connector = Connector::new().map_state(count_props());
        let (instance, own) = mounted(&connector, &provider.context(), &host);

        store.dispatch(json!({ "type": "INC" })).unwrap();
        assert_eq!(host.requests.get(), 1);
        assert!(instance.render_is_scheduled());

        let props = host.render_pass(&instance, &own);
        assert_eq!(props.value("count"), Some(&json!(1)));
        assert!(!instance.render_is_scheduled());
    }

    #[test]
    fn irrelevant_change_does_not_render() {
        let store = Store::new(reducer);
        let provider = Provider::new(store.clone());
        provider.mount().unwrap();
        let host = Host::new();

        let connector = Connector::new().map_state(count_props());
        let (_instance, _) = mounted(&connector, &provider.context(), &host);

        store.dispatch(json!({ "type": "OTHER" })).unwrap();
        assert_eq!(host.requests.get(), 0);
    }

    #[test]
    fn without_state_mapping_nothing_subscribes() {
        let store = Store::new(reducer);
        let provider = Provider::new(store.clone());
        let host = Host::new();

        let (instance, _) = mounted(&Connector::new(), &provider.context(), &host);
        assert!(instance.subscription().is_none());
        assert_eq!(store.listener_count(), 0);
        assert_eq!(provider.context().subscription().listener_count(), 0);

        store.dispatch(json!({ "type": "INC" })).unwrap();
        assert_eq!(host.requests.get(), 0);
        assert!(instance.context().subscription().ptr_eq(provider.context().subscription()));
    }

    #[test]
    fn nested_instance_waits_for_parent_commit() {
        let store = Store::new(reducer);
        let provider = Provider::new(store.clone());
        provider.mount().unwrap();

        let parent_host = Host::new();
        let child_host = Host::new();
        let connector = Connector::new().map_state(count_props());

        let (parent, parent_own) = mounted(&connector, &provider.context(), &parent_host);
        let (_child, _) = mounted(&connector, &parent.context(), &child_host);

        store.dispatch(json!({ "type": "INC" })).unwrap();
        assert_eq!(parent_host.requests.get(), 1);
        assert_eq!(child_host.requests.get(), 0);

        parent_host.render_pass(&parent, &parent_own);
        assert_eq!(child_host.requests.get(), 1);
    }

    #[test]
    fn unchanged_parent_passes_the_change_through() {
        let store = Store::new(reducer);
        let provider = Provider::new(store.clone());
        provider.mount().unwrap();

        let parent_host = Host::new();
        let child_host = Host::new();
        let parent_connector = Connector::new().map_state(MapState::state(|_: &Counter| Props::new()));
        let child_connector = Connector::new().map_state(count_props());

        let (parent, _) = mounted(&parent_connector, &provider.context(), &parent_host);
        let (_child, _) = mounted(&child_connector, &parent.context(), &child_host);

        store.dispatch(json!({ "type": "INC" })).unwrap();
        assert_eq!(parent_host.requests.get(), 0);
        assert_eq!(child_host.requests.get(), 1);
    }

    #[test]
    fn teardown_unsubscribes() {
        let store = Store::new(reducer);
        let provider = Provider::new(store.clone());
        provider.mount().unwrap();
        let host = Host::new();

        let connector = Connector::new().map_state(count_props());
        let (instance, _) = mounted(&connector, &provider.context(), &host);
        assert_eq!(provider.context().subscription().listener_count(), 1);

        instance.teardown().unwrap();
        instance.teardown().unwrap();
        assert_eq!(provider.context().subscription().listener_count(), 0);

        store.dispatch(json!({ "type": "INC" })).unwrap();
        assert_eq!(host.requests.get(), 0);
    }

    #[test]
    fn own_props_flow_into_the_mapping() {
        let store = Store::new(reducer);
        let provider = Provider::new(store.clone());
        provider.mount().unwrap();
        let host = Host::new();

        let connector = Connector::new().map_state(MapState::with_own_props(|state: &Counter, own: &Props| {
            let step = own.value("step").and_then(Value::as_i64).unwrap_or(1);
            Props::new().with("scaled", json!(state.count * step))
        }));
        let first = Rc::new(Props::new().with("step", json!(10)));
        let instance = connector.connect(&provider.context(), Rc::clone(&first), host.force_update());
        host.render_pass(&instance, &first);
        instance.attach().unwrap();

        store.dispatch(json!({ "type": "INC" })).unwrap();
        let props = host.render_pass(&instance, &first);
        assert_eq!(props.value("scaled"), Some(&json!(10)));

        let second = Rc::new(Props::new().with("step", json!(3)));
        let props = host.render_pass(&instance, &second);
        assert_eq!(props.value("scaled"), Some(&json!(3)));
        assert_eq!(props.value("step"), Some(&json!(3)));
    }

    #[test]
    fn mapping_that_dispatches_is_checked_again() {
        let store = Store::new(reducer);
        let provider = Provider::new(store.clone());
        provider.mount().unwrap();
        let host = Host::new();

        let inner_store = store.clone();
        let connector = Connector::new().map_state(MapState::state(move |state: &Counter| {
            if state.count == 1 {
                inner_store.dispatch(json!({ "type": "INC" })).unwrap();
            }
            Props::new().with("count", json!(state.count))
        }));
        let (instance, own) = mounted(&connector, &provider.context(), &host);

        store.dispatch(json!({ "type": "INC" })).unwrap();
        assert_eq!(store.get_state().unwrap().count, 2);
        assert!(instance.render_is_scheduled());

        let props = host.render_pass(&instance, &own);
        assert_eq!(props.value("count"), Some(&json!(2)));
        assert_eq!(instance.last_props().unwrap().value("count"), Some(&json!(2)));
    }
}
