//! Selection and transform controller.
//!
//! Owns the single selection and the transform gizmo. Other components only
//! learn about selection through `object.selected` / `object.deselected`.

pub mod gesture;

pub use gesture::{Gesture, PointerGesture};

use crate::bus::{subscribe_weak, AxisChange, EditorEvent, Subscriptions, Topic};
use crate::editor::EditorContext;
use crate::render::{GizmoEvent, TransformGizmo, TransformMode};
use crate::scene::{ObjectHandle, TransformComponent};
use glam::Vec2;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use winit::keyboard::KeyCode;

const TOPICS: [Topic; 4] = [
    Topic::UiObjectPositionChange,
    Topic::UiObjectRotationChange,
    Topic::UiObjectScaleChange,
    Topic::SceneObjectRemoved,
];

pub struct SelectionController {
    ctx: EditorContext,
    gizmo: RefCell<TransformGizmo>,
    selected: RefCell<Option<ObjectHandle>>,
    gesture: RefCell<PointerGesture>,
    /// Set when the current press started a gizmo drag; such a press never picks.
    press_on_gizmo: Cell<bool>,
    subscriptions: RefCell<Subscriptions>,
    disposed: Cell<bool>,
}

impl SelectionController {
    pub fn new(ctx: EditorContext) -> Rc<Self> {
        let controls = &ctx.config.controls;
        let controller = Rc::new(Self {
            gizmo: RefCell::new(TransformGizmo::new(controls.gizmo_size)),
            gesture: RefCell::new(PointerGesture::new(controls.click_threshold)),
            ctx,
            selected: RefCell::new(None),
            press_on_gizmo: Cell::new(false),
            subscriptions: RefCell::new(Subscriptions::default()),
            disposed: Cell::new(false),
        });
        {
            let mut subs = controller.subscriptions.borrow_mut();
            for topic in TOPICS {
                let id = subscribe_weak(&controller.ctx.bus, topic, &controller, |this, event| {
                    this.handle(event);
                    Ok(())
                });
                subs.push(topic, id);
            }
        }
        controller
    }

    fn handle(&self, event: &EditorEvent) {
        match event {
            EditorEvent::UiObjectPositionChange(change) => {
                self.apply_axis(TransformComponent::Position, *change)
            }
            EditorEvent::UiObjectRotationChange(change) => {
                self.apply_axis(TransformComponent::Rotation, *change)
            }
            EditorEvent::UiObjectScaleChange(change) => {
                self.apply_axis(TransformComponent::Scale, *change)
            }
            EditorEvent::SceneObjectRemoved(removed) => {
                let affected = self
                    .selected()
                    .is_some_and(|selected| selected.is_within(removed));
                if affected {
                    self.deselect();
                }
            }
            _ => {}
        }
    }

    pub fn selected(&self) -> Option<ObjectHandle> {
        self.selected.borrow().clone()
    }

    pub fn mode(&self) -> TransformMode {
        self.gizmo.borrow().mode()
    }

    pub fn gizmo_attached(&self) -> Option<ObjectHandle> {
        self.gizmo.borrow().attached().cloned()
    }

    /// Deselects the previous object first. Selecting the current object again does nothing.
    pub fn select(&self, object: &ObjectHandle) {
        if self.disposed.get() || self.selected.borrow().as_ref() == Some(object) {
            return;
        }
        self.deselect();
        *self.selected.borrow_mut() = Some(object.clone());
        self.gizmo.borrow_mut().attach(object);
        log::debug!("Selected {:?}", object);
        self.ctx
            .bus
            .broadcast(EditorEvent::ObjectSelected(object.clone()));
    }

    pub fn deselect(&self) {
        let Some(previous) = self.selected.borrow_mut().take() else {
            return;
        };
        let ended = self.gizmo.borrow_mut().detach();
        self.forward(ended);
        log::debug!("Deselected {:?}", previous);
        self.ctx.bus.broadcast(EditorEvent::ObjectDeselected(previous));
    }

    pub fn set_mode(&self, mode: TransformMode) {
        self.gizmo.borrow_mut().set_mode(mode);
        self.ctx.bus.broadcast(EditorEvent::TransformModeChanged(mode));
    }

    /// `W`/`E`/`R` switch modes while something is selected. Returns true if handled.
    pub fn handle_key(&self, key: KeyCode) -> bool {
        if self.selected.borrow().is_none() {
            return false;
        }
        let mode = match key {
            KeyCode::KeyW => TransformMode::Translate,
            KeyCode::KeyE => TransformMode::Rotate,
            KeyCode::KeyR => TransformMode::Scale,
            _ => return false,
        };
        self.set_mode(mode);
        true
    }

    pub fn pointer_down(&self, at: Vec2) {
        self.gesture.borrow_mut().press(at);
        self.press_on_gizmo.set(false);
        if self.selected.borrow().is_none() {
            return;
        }
        let ray = self.ctx.registry.ray_from_screen(at);
        let began = {
            let camera = self.ctx.registry.camera();
            let mut gizmo = self.gizmo.borrow_mut();
            gizmo
                .hit_test(&ray, &camera)
                .and_then(|axis| gizmo.begin_drag(axis, &ray, &camera))
        };
        if began.is_some() {
            self.press_on_gizmo.set(true);
        }
        self.forward(began);
    }

    pub fn pointer_move(&self, at: Vec2) {
        self.gesture.borrow_mut().motion(at);
        if !self.gizmo.borrow().is_dragging() {
            return;
        }
        let ray = self.ctx.registry.ray_from_screen(at);
        let changed = self.gizmo.borrow_mut().drag_to(&ray);
        self.forward(changed);
    }

    /// Ends any gizmo drag, then picks if the press was a click.
    pub fn pointer_up(&self, at: Vec2) {
        let ended = self.gizmo.borrow_mut().end_drag();
        self.forward(ended);
        let gesture = self.gesture.borrow_mut().release(at);
        if self.press_on_gizmo.replace(false) {
            return;
        }
        if let Some(Gesture::Click(point)) = gesture {
            self.pick_at(point);
        }
    }

    /// Select whatever registered object is under `at`, or deselect on a miss.
    pub fn pick_at(&self, at: Vec2) {
        match self.ctx.registry.pick_object_at(at) {
            Some(hit) => self.select(&hit.object),
            None => self.deselect(),
        }
    }

    pub fn is_dragging_gizmo(&self) -> bool {
        self.gizmo.borrow().is_dragging()
    }

    /// Deselects the selected object and removes it from the scene.
    pub fn remove_selected(&self) -> bool {
        let Some(object) = self.selected() else {
            return false;
        };
        self.deselect();
        let removed = self.ctx.registry.remove_object(&object);
        if removed {
            log::info!("Removed '{}'", object.name());
        }
        removed
    }

    fn apply_axis(&self, component: TransformComponent, change: AxisChange) {
        let Some(object) = self.selected() else {
            return;
        };
        object.update_transform(|transform| transform.set_axis(component, change.axis, change.value));
        self.ctx.bus.broadcast(EditorEvent::ObjectTransformed(object));
    }

    fn forward(&self, event: Option<GizmoEvent>) {
        match event {
            Some(GizmoEvent::DraggingChanged(dragging)) => {
                self.ctx.bus.broadcast(EditorEvent::OrbitEnabled(!dragging));
            }
            Some(GizmoEvent::ObjectChange) => {
                if let Some(object) = self.selected() {
                    self.ctx.bus.broadcast(EditorEvent::ObjectTransformed(object));
                }
            }
            None => {}
        }
    }

    /// Drops the selection without broadcasting and stops listening. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.subscriptions.borrow_mut().release(&self.ctx.bus);
        self.selected.borrow_mut().take();
        if self.gizmo.borrow_mut().detach().is_some() {
            self.ctx.bus.broadcast(EditorEvent::OrbitEnabled(true));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::test_context;
    use crate::scene::{Aabb, Axis, Material, MaterialHandle, MaterialKind, Mesh, Transform};
    use glam::{Vec3, Vec4};

    fn cube(name: &str, position: Vec3) -> ObjectHandle {
        let cube = ObjectHandle::mesh(
            name,
            Mesh::new(
                Aabb::from_center_size(Vec3::ZERO, Vec3::ONE),
                MaterialHandle::new(Material::new(MaterialKind::Standard)),
            ),
        );
        cube.set_transform(Transform::from_position(position));
        cube
    }

    fn event_log(ctx: &EditorContext, topics: &[Topic]) -> Rc<RefCell<Vec<String>>> {
        let log = Rc::new(RefCell::new(Vec::new()));
        for &topic in topics {
            let log = Rc::clone(&log);
            ctx.bus.subscribe(topic, move |event| {
                let entry = match event {
                    EditorEvent::ObjectSelected(o) => format!("selected {}", o.name()),
                    EditorEvent::ObjectDeselected(o) => format!("deselected {}", o.name()),
                    EditorEvent::ObjectTransformed(o) => format!("transformed {}", o.name()),
                    EditorEvent::OrbitEnabled(on) => format!("orbit {on}"),
                    EditorEvent::TransformModeChanged(mode) => format!("mode {mode}"),
                    other => other.topic().to_string(),
                };
                log.borrow_mut().push(entry);
                Ok(())
            });
        }
        log
    }

    fn project(ctx: &EditorContext, world: Vec3) -> Vec2 {
        let clip = ctx.registry.camera().view_projection() * Vec4::new(world.x, world.y, world.z, 1.0);
        let ndc = clip.truncate() / clip.w;
        let (width, height) = ctx.registry.viewport();
        Vec2::new(
            (ndc.x + 1.0) * 0.5 * width as f32,
            (1.0 - ndc.y) * 0.5 * height as f32,
        )
    }

    const SELECTION: [Topic; 2] = [Topic::ObjectSelected, Topic::ObjectDeselected];

    #[test]
    fn switching_selection_deselects_first() {
        let ctx = test_context();
        let controller = SelectionController::new(ctx.clone());
        let log = event_log(&ctx, &SELECTION);
        let a = cube("a", Vec3::ZERO);
        let b = cube("b", Vec3::X * 3.0);

        controller.select(&a);
        controller.select(&b);
        assert_eq!(*log.borrow(), ["selected a", "deselected a", "selected b"]);
        assert_eq!(controller.gizmo_attached(), Some(b.clone()));
        assert_eq!(controller.selected(), Some(b));
    }

    #[test]
    fn reselecting_same_object_is_silent() {
        let ctx = test_context();
        let controller = SelectionController::new(ctx.clone());
        let log = event_log(&ctx, &SELECTION);
        let a = cube("a", Vec3::ZERO);
        controller.select(&a);
        controller.select(&a);
        assert_eq!(*log.borrow(), ["selected a"]);
    }

    #[test]
    fn deselect_without_selection_is_a_noop() {
        let ctx = test_context();
        let controller = SelectionController::new(ctx.clone());
        let log = event_log(&ctx, &SELECTION);
        controller.deselect();
        controller.deselect();
        assert!(log.borrow().is_empty());
        assert!(controller.selected().is_none());
        assert!(controller.gizmo_attached().is_none());
    }

    #[test]
    fn click_under_threshold_picks_and_drag_does_not() {
        let ctx = test_context();
        let controller = SelectionController::new(ctx.clone());
        let target = cube("target", Vec3::ZERO);
        ctx.registry.add_object(&target);
        let center = project(&ctx, Vec3::ZERO);

        controller.pointer_down(center);
        controller.pointer_move(center + Vec2::new(10.0, 0.0));
        controller.pointer_up(center);
        assert!(controller.selected().is_none());

        controller.pointer_down(center);
        controller.pointer_move(center + Vec2::new(3.0, -2.0));
        controller.pointer_up(center + Vec2::new(3.0, -2.0));
        assert_eq!(controller.selected(), Some(target));

        controller.pointer_down(Vec2::new(2.0, 2.0));
        controller.pointer_up(Vec2::new(2.0, 2.0));
        assert!(controller.selected().is_none());
    }

    #[test]
    fn mode_keys_require_selection() {
        let ctx = test_context();
        let controller = SelectionController::new(ctx.clone());
        let log = event_log(&ctx, &[Topic::TransformModeChanged]);
        assert!(!controller.handle_key(KeyCode::KeyE));
        assert_eq!(controller.mode(), TransformMode::Translate);

        controller.select(&cube("a", Vec3::ZERO));
        assert!(controller.handle_key(KeyCode::KeyE));
        assert!(controller.handle_key(KeyCode::KeyR));
        assert!(!controller.handle_key(KeyCode::KeyQ));
        assert_eq!(controller.mode(), TransformMode::Scale);
        assert_eq!(*log.borrow(), ["mode rotate", "mode scale"]);
    }

    #[test]
    fn gizmo_drag_suppresses_orbit_and_reports_transforms() {
        let ctx = test_context();
        let controller = SelectionController::new(ctx.clone());
        let target = cube("target", Vec3::ZERO);
        ctx.registry.add_object(&target);
        controller.select(&target);
        let log = event_log(
            &ctx,
            &[Topic::OrbitEnabled, Topic::ObjectTransformed, Topic::ObjectDeselected],
        );

        let handle = project(&ctx, Vec3::new(0.6, 0.0, 0.0));
        controller.pointer_down(handle);
        assert!(controller.is_dragging_gizmo());
        assert!(!ctx.registry.orbit_enabled());
        controller.pointer_move(project(&ctx, Vec3::new(1.6, 0.0, 0.0)));
        controller.pointer_up(project(&ctx, Vec3::new(1.6, 0.0, 0.0)));

        assert!((target.transform().position.x - 1.0).abs() < 1e-3);
        assert!(ctx.registry.orbit_enabled());
        assert_eq!(
            *log.borrow(),
            ["orbit false", "transformed target", "orbit true"]
        );
        assert_eq!(controller.selected(), Some(target));
    }

    #[test]
    fn panel_edits_apply_to_selection_only() {
        let ctx = test_context();
        let controller = SelectionController::new(ctx.clone());
        let log = event_log(&ctx, &[Topic::ObjectTransformed]);
        let change = |axis, value| AxisChange { axis, value };

        ctx.bus
            .publish(EditorEvent::UiObjectPositionChange(change(Axis::X, 4.0)))
            .unwrap();
        assert!(log.borrow().is_empty());

        let a = cube("a", Vec3::ZERO);
        controller.select(&a);
        ctx.bus
            .publish(EditorEvent::UiObjectPositionChange(change(Axis::Y, 2.0)))
            .unwrap();
        ctx.bus
            .publish(EditorEvent::UiObjectRotationChange(change(Axis::Z, 1.5)))
            .unwrap();
        ctx.bus
            .publish(EditorEvent::UiObjectScaleChange(change(Axis::X, 3.0)))
            .unwrap();
        let transform = a.transform();
        assert_eq!(transform.position, Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(transform.rotation.z, 1.5);
        assert_eq!(transform.scale, Vec3::new(3.0, 1.0, 1.0));
        assert_eq!(log.borrow().len(), 3);
    }

    #[test]
    fn removing_selected_object_deselects_it() {
        let ctx = test_context();
        let controller = SelectionController::new(ctx.clone());
        let a = cube("a", Vec3::ZERO);
        ctx.registry.add_object(&a);
        controller.select(&a);
        let log = event_log(&ctx, &[Topic::ObjectDeselected, Topic::SceneObjectRemoved]);

        assert!(controller.remove_selected());
        assert!(controller.selected().is_none());
        assert!(ctx.registry.list_objects().is_empty());
        assert_eq!(*log.borrow(), ["deselected a", "scene.object.removed"]);
        assert!(!controller.remove_selected());
    }

    #[test]
    fn external_removal_of_selection_deselects() {
        let ctx = test_context();
        let controller = SelectionController::new(ctx.clone());
        let group = ObjectHandle::group("model");
        let part = cube("part", Vec3::ZERO);
        group.add_child(&part);
        ctx.registry.add_object(&group);
        controller.select(&part);
        ctx.registry.remove_object(&group);
        assert!(controller.selected().is_none());
    }

    #[test]
    fn dispose_stops_listening() {
        let ctx = test_context();
        let controller = SelectionController::new(ctx.clone());
        controller.select(&cube("a", Vec3::ZERO));
        controller.dispose();
        controller.dispose();
        assert!(controller.selected().is_none());
        assert_eq!(ctx.bus.subscriber_count(Topic::UiObjectScaleChange), 0);
        controller.select(&cube("b", Vec3::ZERO));
        assert!(controller.selected().is_none());
    }
}
