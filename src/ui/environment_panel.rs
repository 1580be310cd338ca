use crate::bus::{EditorEvent, EnvironmentSelection, EventBus};
use crate::config::EnvironmentConfig;
use std::cell::Cell;
use std::rc::Rc;

/// Thumbnail strip of catalog maps plus the background checkbox.
pub struct EnvironmentPanel {
    bus: Rc<EventBus>,
    names: Vec<String>,
    active: Cell<Option<usize>>,
    background_visible: Cell<bool>,
}

impl EnvironmentPanel {
    pub fn new(bus: Rc<EventBus>, config: &EnvironmentConfig) -> Rc<Self> {
        let names: Vec<String> = config.catalog.iter().map(|entry| entry.name.clone()).collect();
        let active = names.iter().position(|name| *name == config.default_map);
        Rc::new(Self {
            bus,
            names,
            active: Cell::new(active),
            background_visible: Cell::new(config.background_visible),
        })
    }

    pub fn names(&self) -> Vec<String> {
        self.names.clone()
    }

    pub fn active(&self) -> Option<usize> {
        self.active.get()
    }

    pub fn background_visible(&self) -> bool {
        self.background_visible.get()
    }

    /// Marks thumbnail `index` active and requests it. Out-of-range indices are ignored.
    pub fn select(&self, index: usize) -> bool {
        let Some(name) = self.names.get(index).cloned() else {
            return false;
        };
        self.active.set(Some(index));
        self.bus
            .broadcast(EditorEvent::UiEnvironmentMapSelected(EnvironmentSelection {
                name,
                background_visible: self.background_visible.get(),
            }));
        true
    }

    pub fn set_background_visible(&self, visible: bool) {
        self.background_visible.set(visible);
        self.bus
            .broadcast(EditorEvent::UiEnvironmentBackgroundToggle(visible));
    }

    pub fn dispose(&self) {}
}
