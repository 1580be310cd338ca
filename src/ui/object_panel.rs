use super::{validate_numeric_input, NumericRange};
use crate::bus::{subscribe_weak, AxisChange, EditorEvent, EventBus, Subscriptions, Topic};
use crate::scene::{Axis, ObjectHandle, TransformComponent};
use std::cell::RefCell;
use std::rc::Rc;

const SCALE_RANGE: NumericRange = NumericRange::new(0.001, f32::INFINITY);

/// Text shown in the transform fields. Rotation is in degrees.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ObjectFields {
    pub name: String,
    pub position: [String; 3],
    pub rotation: [String; 3],
    pub scale: [String; 3],
}

impl ObjectFields {
    fn component_mut(&mut self, component: TransformComponent) -> &mut [String; 3] {
        match component {
            TransformComponent::Position => &mut self.position,
            TransformComponent::Rotation => &mut self.rotation,
            TransformComponent::Scale => &mut self.scale,
        }
    }
}

pub struct ObjectPanel {
    bus: Rc<EventBus>,
    fields: RefCell<ObjectFields>,
    subscriptions: RefCell<Subscriptions>,
}

impl ObjectPanel {
    pub fn new(bus: Rc<EventBus>) -> Rc<Self> {
        let panel = Rc::new(Self {
            bus,
            fields: RefCell::new(ObjectFields::default()),
            subscriptions: RefCell::new(Subscriptions::default()),
        });
        {
            let mut subs = panel.subscriptions.borrow_mut();
            for topic in [Topic::ObjectSelected, Topic::ObjectTransformed] {
                let id = subscribe_weak(&panel.bus, topic, &panel, |this, event| {
                    if let EditorEvent::ObjectSelected(object) | EditorEvent::ObjectTransformed(object) =
                        event
                    {
                        this.refresh(object);
                    }
                    Ok(())
                });
                subs.push(topic, id);
            }
        }
        panel
    }

    pub fn fields(&self) -> ObjectFields {
        self.fields.borrow().clone()
    }

    fn refresh(&self, object: &ObjectHandle) {
        let transform = object.transform();
        let fixed = |v: f32| format!("{:.2}", v);
        let mut fields = self.fields.borrow_mut();
        fields.name = object.name();
        fields.position = transform.position.to_array().map(fixed);
        fields.rotation = transform.rotation.to_array().map(|r| fixed(r.to_degrees()));
        fields.scale = transform.scale.to_array().map(fixed);
    }

    /// Validate the text typed into one field and publish the change.
    ///
    /// Unparseable text becomes 0 (1 for scale). Rotation is entered in degrees
    /// and published in radians.
    pub fn submit(&self, component: TransformComponent, axis: Axis, text: &str) -> f32 {
        let (default, range) = match component {
            TransformComponent::Scale => (1.0, SCALE_RANGE),
            _ => (0.0, NumericRange::UNBOUNDED),
        };
        let input = validate_numeric_input(text, default, range);
        {
            let mut fields = self.fields.borrow_mut();
            let slot = &mut fields.component_mut(component)[axis.index()];
            *slot = if input.adjusted {
                input.value.to_string()
            } else {
                text.to_string()
            };
        }
        let change = AxisChange {
            axis,
            value: match component {
                TransformComponent::Rotation => input.value.to_radians(),
                _ => input.value,
            },
        };
        let event = match component {
            TransformComponent::Position => EditorEvent::UiObjectPositionChange(change),
            TransformComponent::Rotation => EditorEvent::UiObjectRotationChange(change),
            TransformComponent::Scale => EditorEvent::UiObjectScaleChange(change),
        };
        self.bus.broadcast(event);
        input.value
    }

    pub fn dispose(&self) {
        self.subscriptions.borrow_mut().release(&self.bus);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::Transform;
    use glam::Vec3;

    fn changes(bus: &EventBus) -> Rc<RefCell<Vec<(Topic, AxisChange)>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        for topic in [
            Topic::UiObjectPositionChange,
            Topic::UiObjectRotationChange,
            Topic::UiObjectScaleChange,
        ] {
            let seen = Rc::clone(&seen);
            bus.subscribe(topic, move |event| {
                if let EditorEvent::UiObjectPositionChange(c)
                | EditorEvent::UiObjectRotationChange(c)
                | EditorEvent::UiObjectScaleChange(c) = event
                {
                    seen.borrow_mut().push((event.topic(), *c));
                }
                Ok(())
            });
        }
        seen
    }

    #[test]
    fn selection_fills_fields_with_two_decimals() {
        let bus = Rc::new(EventBus::new());
        let panel = ObjectPanel::new(Rc::clone(&bus));
        let object = ObjectHandle::group("Crate");
        object.set_transform(Transform {
            position: Vec3::new(1.0, 0.5, -2.25),
            rotation: Vec3::new(0.0, std::f32::consts::FRAC_PI_2, 0.0),
            scale: Vec3::splat(1.5),
        });
        bus.publish(EditorEvent::ObjectSelected(object.clone())).unwrap();
        let fields = panel.fields();
        assert_eq!(fields.name, "Crate");
        assert_eq!(fields.position, ["1.00", "0.50", "-2.25"]);
        assert_eq!(fields.rotation, ["0.00", "90.00", "0.00"]);
        assert_eq!(fields.scale, ["1.50", "1.50", "1.50"]);

        object.update_transform(|t| t.position.x = 7.0);
        bus.publish(EditorEvent::ObjectTransformed(object)).unwrap();
        assert_eq!(panel.fields().position[0], "7.00");
    }

    #[test]
    fn rotation_is_published_in_radians() {
        let bus = Rc::new(EventBus::new());
        let panel = ObjectPanel::new(Rc::clone(&bus));
        let seen = changes(&bus);
        panel.submit(TransformComponent::Rotation, Axis::Y, "180");
        let (topic, change) = seen.borrow()[0];
        assert_eq!(topic, Topic::UiObjectRotationChange);
        assert_eq!(change.axis, Axis::Y);
        assert!((change.value - std::f32::consts::PI).abs() < 1e-6);
    }

    #[test]
    fn invalid_text_uses_field_default() {
        let bus = Rc::new(EventBus::new());
        let panel = ObjectPanel::new(Rc::clone(&bus));
        let seen = changes(&bus);
        assert_eq!(panel.submit(TransformComponent::Position, Axis::X, "abc"), 0.0);
        assert_eq!(panel.submit(TransformComponent::Scale, Axis::Z, ""), 1.0);
        assert_eq!(panel.fields().scale[2], "1");
        assert_eq!(seen.borrow().len(), 2);
        assert_eq!(seen.borrow()[1].1.value, 1.0);
    }

    #[test]
    fn scale_cannot_reach_zero() {
        let bus = Rc::new(EventBus::new());
        let panel = ObjectPanel::new(Rc::clone(&bus));
        assert!(panel.submit(TransformComponent::Scale, Axis::X, "-2") > 0.0);
    }
}
