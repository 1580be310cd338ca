//! Process-wide publish/subscribe hub.
//!
//! Every topic is a variant of [`Topic`] and every message a variant of
//! [`EditorEvent`], so a handler subscribed to `object.selected` can only
//! ever observe an `ObjectSelected(handle)` payload.
//!
//! Dispatch is synchronous and ordered: handlers run in subscription order.
//! The subscriber list is snapshotted before the first handler runs, so
//! handlers may subscribe, unsubscribe or publish without disturbing the
//! dispatch already in flight.

use crate::assets::LoadError;
use crate::materials::MaterialSnapshot;
use crate::render::TransformMode;
use crate::scene::{Axis, Color, ObjectHandle};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    ObjectSelected,
    ObjectDeselected,
    ObjectTransformed,
    SceneObjectAdded,
    SceneObjectRemoved,
    UiObjectPositionChange,
    UiObjectRotationChange,
    UiObjectScaleChange,
    UiMaterialColorChange,
    UiMaterialOpacityChange,
    UiMaterialTransparentChange,
    UiMaterialDiffuseToggle,
    UiMaterialNormalToggle,
    UiMaterialDiffuseFile,
    UiMaterialNormalFile,
    MaterialUpdated,
    UiEnvironmentMapSelected,
    UiEnvironmentBackgroundToggle,
    UiModelImport,
    OrbitEnabled,
    TransformModeChanged,
    LoadStart,
    LoadComplete,
    LoadError,
}

impl Topic {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ObjectSelected => "object.selected",
            Self::ObjectDeselected => "object.deselected",
            Self::ObjectTransformed => "object.transformed",
            Self::SceneObjectAdded => "scene.object.added",
            Self::SceneObjectRemoved => "scene.object.removed",
            Self::UiObjectPositionChange => "ui.object.position.change",
            Self::UiObjectRotationChange => "ui.object.rotation.change",
            Self::UiObjectScaleChange => "ui.object.scale.change",
            Self::UiMaterialColorChange => "ui.material.color.change",
            Self::UiMaterialOpacityChange => "ui.material.opacity.change",
            Self::UiMaterialTransparentChange => "ui.material.transparent.change",
            Self::UiMaterialDiffuseToggle => "ui.material.diffuse.toggle",
            Self::UiMaterialNormalToggle => "ui.material.normal.toggle",
            Self::UiMaterialDiffuseFile => "ui.material.diffuse.file",
            Self::UiMaterialNormalFile => "ui.material.normal.file",
            Self::MaterialUpdated => "material.updated",
            Self::UiEnvironmentMapSelected => "ui.environment.map.selected",
            Self::UiEnvironmentBackgroundToggle => "ui.environment.map.background.toggle",
            Self::UiModelImport => "ui.model.import",
            Self::OrbitEnabled => "controls.orbit.enabled",
            Self::TransformModeChanged => "controls.transform.mode.changed",
            Self::LoadStart => "loadingManager.load.start",
            Self::LoadComplete => "loadingManager.load.complete",
            Self::LoadError => "loadingManager.load.error",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single-axis edit coming from the object panel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisChange {
    pub axis: Axis,
    pub value: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentSelection {
    pub name: String,
    pub background_visible: bool,
}

#[derive(Debug, Clone)]
pub enum EditorEvent {
    ObjectSelected(ObjectHandle),
    ObjectDeselected(ObjectHandle),
    ObjectTransformed(ObjectHandle),
    SceneObjectAdded(ObjectHandle),
    SceneObjectRemoved(ObjectHandle),
    UiObjectPositionChange(AxisChange),
    UiObjectRotationChange(AxisChange),
    UiObjectScaleChange(AxisChange),
    UiMaterialColorChange(Color),
    UiMaterialOpacityChange(f32),
    UiMaterialTransparentChange(bool),
    UiMaterialDiffuseToggle(bool),
    UiMaterialNormalToggle(bool),
    UiMaterialDiffuseFile(PathBuf),
    UiMaterialNormalFile(PathBuf),
    MaterialUpdated(MaterialSnapshot),
    UiEnvironmentMapSelected(EnvironmentSelection),
    UiEnvironmentBackgroundToggle(bool),
    UiModelImport(PathBuf),
    OrbitEnabled(bool),
    TransformModeChanged(TransformMode),
    LoadStart,
    LoadComplete,
    LoadError(LoadError),
}

impl EditorEvent {
    pub fn topic(&self) -> Topic {
        match self {
            Self::ObjectSelected(_) => Topic::ObjectSelected,
            Self::ObjectDeselected(_) => Topic::ObjectDeselected,
            Self::ObjectTransformed(_) => Topic::ObjectTransformed,
            Self::SceneObjectAdded(_) => Topic::SceneObjectAdded,
            Self::SceneObjectRemoved(_) => Topic::SceneObjectRemoved,
            Self::UiObjectPositionChange(_) => Topic::UiObjectPositionChange,
            Self::UiObjectRotationChange(_) => Topic::UiObjectRotationChange,
            Self::UiObjectScaleChange(_) => Topic::UiObjectScaleChange,
            Self::UiMaterialColorChange(_) => Topic::UiMaterialColorChange,
            Self::UiMaterialOpacityChange(_) => Topic::UiMaterialOpacityChange,
            Self::UiMaterialTransparentChange(_) => Topic::UiMaterialTransparentChange,
            Self::UiMaterialDiffuseToggle(_) => Topic::UiMaterialDiffuseToggle,
            Self::UiMaterialNormalToggle(_) => Topic::UiMaterialNormalToggle,
            Self::UiMaterialDiffuseFile(_) => Topic::UiMaterialDiffuseFile,
            Self::UiMaterialNormalFile(_) => Topic::UiMaterialNormalFile,
            Self::MaterialUpdated(_) => Topic::MaterialUpdated,
            Self::UiEnvironmentMapSelected(_) => Topic::UiEnvironmentMapSelected,
            Self::UiEnvironmentBackgroundToggle(_) => Topic::UiEnvironmentBackgroundToggle,
            Self::UiModelImport(_) => Topic::UiModelImport,
            Self::OrbitEnabled(_) => Topic::OrbitEnabled,
            Self::TransformModeChanged(_) => Topic::TransformModeChanged,
            Self::LoadStart => Topic::LoadStart,
            Self::LoadComplete => Topic::LoadComplete,
            Self::LoadError(_) => Topic::LoadError,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("component is already handling another event")]
    Reentrant,
    #[error("{0}")]
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
#[error("handler for '{topic}' failed: {source}")]
pub struct DispatchError {
    pub topic: Topic,
    #[source]
    pub source: HandlerError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type HandlerResult = Result<(), HandlerError>;

type Handler = Rc<dyn Fn(&EditorEvent) -> HandlerResult>;

#[derive(Default)]
pub struct EventBus {
    next_id: Cell<u64>,
    topics: RefCell<HashMap<Topic, Vec<(SubscriptionId, Handler)>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> SubscriptionId
    where
        F: Fn(&EditorEvent) -> HandlerResult + 'static,
    {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.topics
            .borrow_mut()
            .entry(topic)
            .or_default()
            .push((id, Rc::new(handler)));
        id
    }

    /// Returns `false` when the pair was not registered.
    pub fn unsubscribe(&self, topic: Topic, id: SubscriptionId) -> bool {
        let mut topics = self.topics.borrow_mut();
        let Some(handlers) = topics.get_mut(&topic) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            topics.remove(&topic);
        }
        removed
    }

    pub fn publish(&self, event: EditorEvent) -> Result<(), DispatchError> {
        let topic = event.topic();
        let handlers: Vec<Handler> = match self.topics.borrow().get(&topic) {
            Some(handlers) => handlers.iter().map(|(_, h)| Rc::clone(h)).collect(),
            None => return Ok(()),
        };
        log::debug!("dispatch {} to {} handler(s)", topic, handlers.len());
        for handler in handlers {
            handler(&event).map_err(|source| DispatchError { topic, source })?;
        }
        Ok(())
    }

    /// Publish and log a failed dispatch instead of returning it.
    pub fn broadcast(&self, event: EditorEvent) {
        if let Err(err) = self.publish(event) {
            log::warn!("{}", err);
        }
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topics.borrow().get(&topic).map_or(0, Vec::len)
    }

    pub fn topic_count(&self) -> usize {
        self.topics.borrow().len()
    }
}

/// Subscribe a handler that holds only a weak reference to its component.
pub fn subscribe_weak<T, F>(bus: &EventBus, topic: Topic, target: &Rc<T>, handler: F) -> SubscriptionId
where
    T: 'static,
    F: Fn(&Rc<T>, &EditorEvent) -> HandlerResult + 'static,
{
    let weak = Rc::downgrade(target);
    bus.subscribe(topic, move |event| match weak.upgrade() {
        Some(target) => handler(&target, event),
        None => Ok(()),
    })
}

/// Subscriptions owned by one component, released together on teardown.
#[derive(Default)]
pub struct Subscriptions {
    entries: Vec<(Topic, SubscriptionId)>,
}

impl Subscriptions {
    pub fn push(&mut self, topic: Topic, id: SubscriptionId) {
        self.entries.push((topic, id));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn release(&mut self, bus: &EventBus) {
        for (topic, id) in self.entries.drain(..).rev() {
            bus.unsubscribe(topic, id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(log: &Rc<RefCell<Vec<&'static str>>>, tag: &'static str) -> impl Fn(&EditorEvent) -> HandlerResult {
        let log = Rc::clone(log);
        move |_| {
            log.borrow_mut().push(tag);
            Ok(())
        }
    }

    #[test]
    fn handlers_run_in_subscription_order_every_publish() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        bus.subscribe(Topic::OrbitEnabled, recorder(&log, "h1"));
        bus.subscribe(Topic::OrbitEnabled, recorder(&log, "h2"));
        bus.subscribe(Topic::OrbitEnabled, recorder(&log, "h3"));

        for _ in 0..3 {
            bus.publish(EditorEvent::OrbitEnabled(true)).unwrap();
        }
        assert_eq!(
            *log.borrow(),
            vec!["h1", "h2", "h3", "h1", "h2", "h3", "h1", "h2", "h3"]
        );
    }

    #[test]
    fn publish_only_reaches_matching_topic() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        bus.subscribe(Topic::LoadStart, recorder(&log, "start"));
        bus.subscribe(Topic::LoadComplete, recorder(&log, "complete"));

        bus.publish(EditorEvent::LoadComplete).unwrap();
        assert_eq!(*log.borrow(), vec!["complete"]);
    }

    #[test]
    fn unsubscribe_unknown_pair_is_noop() {
        let bus = EventBus::new();
        let id = bus.subscribe(Topic::LoadStart, |_| Ok(()));
        assert!(!bus.unsubscribe(Topic::LoadComplete, id));
        assert!(!bus.unsubscribe(Topic::LoadStart, SubscriptionId(999)));
        assert_eq!(bus.subscriber_count(Topic::LoadStart), 1);
        assert!(bus.unsubscribe(Topic::LoadStart, id));
        assert_eq!(bus.topic_count(), 0);
    }

    #[test]
    fn subscription_changes_during_dispatch_do_not_affect_in_flight_dispatch() {
        let bus = Rc::new(EventBus::new());
        let log = Rc::new(RefCell::new(Vec::new()));

        let late_id = Rc::new(Cell::new(None));
        {
            let bus_inner = Rc::clone(&bus);
            let log_inner = Rc::clone(&log);
            let late_id = Rc::clone(&late_id);
            bus.subscribe(Topic::LoadStart, move |_| {
                log_inner.borrow_mut().push("first");
                if let Some(id) = late_id.get() {
                    bus_inner.unsubscribe(Topic::LoadStart, id);
                }
                bus_inner.subscribe(Topic::LoadStart, recorder(&log_inner, "added"));
                Ok(())
            });
        }
        late_id.set(Some(bus.subscribe(Topic::LoadStart, recorder(&log, "second"))));

        bus.publish(EditorEvent::LoadStart).unwrap();
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn failing_handler_aborts_remaining_chain() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        bus.subscribe(Topic::LoadStart, recorder(&log, "before"));
        bus.subscribe(Topic::LoadStart, |_| Err(HandlerError::Failed("boom".into())));
        bus.subscribe(Topic::LoadStart, recorder(&log, "after"));

        let err = bus.publish(EditorEvent::LoadStart).unwrap_err();
        assert_eq!(err.topic, Topic::LoadStart);
        assert_eq!(*log.borrow(), vec!["before"]);

        // Next publish runs the chain again from the start.
        let _ = bus.publish(EditorEvent::LoadStart);
        assert_eq!(*log.borrow(), vec!["before", "before"]);
    }

    #[test]
    fn nested_publish_from_handler_is_delivered() {
        let bus = Rc::new(EventBus::new());
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let bus_inner = Rc::clone(&bus);
            bus.subscribe(Topic::LoadStart, move |_| {
                bus_inner.broadcast(EditorEvent::LoadComplete);
                Ok(())
            });
        }
        bus.subscribe(Topic::LoadComplete, recorder(&log, "complete"));
        bus.publish(EditorEvent::LoadStart).unwrap();
        assert_eq!(*log.borrow(), vec!["complete"]);
    }

    #[test]
    fn weak_handlers_go_inert_when_component_drops() {
        struct Counter(Cell<u32>);
        let bus = EventBus::new();
        let counter = Rc::new(Counter(Cell::new(0)));
        subscribe_weak(&bus, Topic::LoadStart, &counter, |c, _| {
            c.0.set(c.0.get() + 1);
            Ok(())
        });
        bus.publish(EditorEvent::LoadStart).unwrap();
        assert_eq!(counter.0.get(), 1);
        drop(counter);
        assert!(bus.publish(EditorEvent::LoadStart).is_ok());
    }

    #[test]
    fn subscriptions_release_all_entries() {
        let bus = EventBus::new();
        let mut subs = Subscriptions::default();
        subs.push(Topic::LoadStart, bus.subscribe(Topic::LoadStart, |_| Ok(())));
        subs.push(Topic::LoadError, bus.subscribe(Topic::LoadError, |_| Ok(())));
        assert_eq!(subs.len(), 2);
        subs.release(&bus);
        assert!(subs.is_empty());
        assert_eq!(bus.topic_count(), 0);
    }

    #[test]
    fn topic_names_match_wire_protocol() {
        assert_eq!(Topic::ObjectSelected.as_str(), "object.selected");
        assert_eq!(
            Topic::UiEnvironmentBackgroundToggle.as_str(),
            "ui.environment.map.background.toggle"
        );
        assert_eq!(
            EditorEvent::OrbitEnabled(false).topic().to_string(),
            "controls.orbit.enabled"
        );
    }
}
