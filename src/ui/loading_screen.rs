use crate::bus::{subscribe_weak, EditorEvent, EventBus, Subscriptions, Topic};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Overlay shown while any load is in flight. `busy` covers loads queued
/// before the screen subscribed.
pub struct LoadingScreen {
    bus: Rc<EventBus>,
    visible: Cell<bool>,
    last_error: RefCell<Option<String>>,
    subscriptions: RefCell<Subscriptions>,
}

impl LoadingScreen {
    pub fn new(bus: Rc<EventBus>, busy: bool) -> Rc<Self> {
        let screen = Rc::new(Self {
            bus,
            visible: Cell::new(busy),
            last_error: RefCell::new(None),
            subscriptions: RefCell::new(Subscriptions::default()),
        });
        {
            let mut subs = screen.subscriptions.borrow_mut();
            for topic in [Topic::LoadStart, Topic::LoadComplete, Topic::LoadError] {
                let id = subscribe_weak(&screen.bus, topic, &screen, |this, event| {
                    match event {
                        EditorEvent::LoadStart => {
                            this.visible.set(true);
                            this.last_error.borrow_mut().take();
                        }
                        EditorEvent::LoadComplete => this.visible.set(false),
                        EditorEvent::LoadError(err) => {
                            *this.last_error.borrow_mut() = Some(err.to_string());
                        }
                        _ => {}
                    }
                    Ok(())
                });
                subs.push(topic, id);
            }
        }
        screen
    }

    pub fn is_visible(&self) -> bool {
        self.visible.get()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }

    pub fn dispose(&self) {
        self.subscriptions.borrow_mut().release(&self.bus);
        self.visible.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::LoadError;

    #[test]
    fn follows_loading_lifecycle() {
        let bus = Rc::new(EventBus::new());
        let screen = LoadingScreen::new(Rc::clone(&bus), false);
        bus.publish(EditorEvent::LoadStart).unwrap();
        assert!(screen.is_visible());
        bus.publish(EditorEvent::LoadError(LoadError::Aborted("sky".into())))
            .unwrap();
        assert!(screen.is_visible());
        assert!(screen.last_error().unwrap().contains("sky"));
        bus.publish(EditorEvent::LoadComplete).unwrap();
        assert!(!screen.is_visible());

        screen.dispose();
        bus.publish(EditorEvent::LoadStart).unwrap();
        assert!(!screen.is_visible());
    }

    #[test]
    fn starts_visible_when_loads_are_already_queued() {
        let bus = Rc::new(EventBus::new());
        let screen = LoadingScreen::new(Rc::clone(&bus), true);
        assert!(screen.is_visible());
        bus.publish(EditorEvent::LoadComplete).unwrap();
        assert!(!screen.is_visible());
    }
}
