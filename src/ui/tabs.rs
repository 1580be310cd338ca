use crate::bus::{subscribe_weak, EditorEvent, EventBus, Subscriptions, Topic};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    Object,
    Material,
}

/// Property section tabs. Hidden while nothing is selected.
pub struct Tabs {
    bus: Rc<EventBus>,
    visible: Cell<bool>,
    active: Cell<Option<Tab>>,
    subscriptions: RefCell<Subscriptions>,
}

impl Tabs {
    pub fn new(bus: Rc<EventBus>) -> Rc<Self> {
        let tabs = Rc::new(Self {
            bus,
            visible: Cell::new(false),
            active: Cell::new(None),
            subscriptions: RefCell::new(Subscriptions::default()),
        });
        {
            let mut subs = tabs.subscriptions.borrow_mut();
            for topic in [Topic::ObjectSelected, Topic::ObjectDeselected] {
                let id = subscribe_weak(&tabs.bus, topic, &tabs, |this, event| {
                    match event {
                        EditorEvent::ObjectSelected(_) => {
                            this.visible.set(true);
                            this.active.set(Some(Tab::Object));
                        }
                        EditorEvent::ObjectDeselected(_) => {
                            this.visible.set(false);
                            this.active.set(None);
                        }
                        _ => {}
                    }
                    Ok(())
                });
                subs.push(topic, id);
            }
        }
        tabs
    }

    pub fn is_visible(&self) -> bool {
        self.visible.get()
    }

    pub fn active(&self) -> Option<Tab> {
        self.active.get()
    }

    /// Ignored while the section is hidden.
    pub fn open(&self, tab: Tab) -> bool {
        if !self.visible.get() {
            return false;
        }
        self.active.set(Some(tab));
        true
    }

    pub fn dispose(&self) {
        self.subscriptions.borrow_mut().release(&self.bus);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::ObjectHandle;

    #[test]
    fn selection_shows_object_tab_and_deselection_hides() {
        let bus = Rc::new(EventBus::new());
        let tabs = Tabs::new(Rc::clone(&bus));
        assert!(!tabs.open(Tab::Material));

        let object = ObjectHandle::group("a");
        bus.publish(EditorEvent::ObjectSelected(object.clone())).unwrap();
        assert!(tabs.is_visible());
        assert_eq!(tabs.active(), Some(Tab::Object));
        assert!(tabs.open(Tab::Material));
        assert_eq!(tabs.active(), Some(Tab::Material));

        bus.publish(EditorEvent::ObjectDeselected(object)).unwrap();
        assert!(!tabs.is_visible());
        assert_eq!(tabs.active(), None);
    }
}
