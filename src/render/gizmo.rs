//! Transform gizmo.
//!
//! Three axis handles drawn at the attached object's world position. Handle
//! length scales with camera distance so the gizmo keeps a constant apparent
//! size. Dragging a handle projects the pointer ray onto the handle's axis and
//! turns the travelled distance into a translation, rotation or scale change
//! depending on the current mode.

use super::camera::PerspectiveCamera;
use super::pick::Ray;
use crate::scene::{Aabb, Axis, ObjectHandle, Transform};
use glam::Vec3;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransformMode {
    #[default]
    Translate,
    Rotate,
    Scale,
}

impl TransformMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            TransformMode::Translate => "translate",
            TransformMode::Rotate => "rotate",
            TransformMode::Scale => "scale",
        }
    }
}

impl fmt::Display for TransformMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type GizmoAxis = Axis;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GizmoEvent {
    DraggingChanged(bool),
    ObjectChange,
}

const HANDLE_THICKNESS: f32 = 0.12;
const MIN_SCALE: f32 = 0.001;

#[derive(Debug, Clone, Copy)]
struct DragState {
    axis: Axis,
    origin: Vec3,
    start_param: f32,
    handle_length: f32,
    start: Transform,
}

#[derive(Debug)]
pub struct TransformGizmo {
    size: f32,
    mode: TransformMode,
    attached: Option<ObjectHandle>,
    drag: Option<DragState>,
}

impl TransformGizmo {
    pub fn new(size: f32) -> Self {
        Self {
            size,
            mode: TransformMode::Translate,
            attached: None,
            drag: None,
        }
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn mode(&self) -> TransformMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: TransformMode) {
        self.mode = mode;
    }

    pub fn attached(&self) -> Option<&ObjectHandle> {
        self.attached.as_ref()
    }

    /// Replaces any previous attachment.
    pub fn attach(&mut self, object: &ObjectHandle) {
        self.drag = None;
        self.attached = Some(object.clone());
    }

    /// Detaching mid-drag ends the drag and reports it.
    pub fn detach(&mut self) -> Option<GizmoEvent> {
        self.attached = None;
        self.drag
            .take()
            .map(|_| GizmoEvent::DraggingChanged(false))
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    fn handle_length(&self, origin: Vec3, camera: &PerspectiveCamera) -> f32 {
        let distance = (camera.position - origin).length().max(camera.near);
        self.size * distance * 0.25
    }

    fn handle_bounds(origin: Vec3, axis: Axis, length: f32) -> Aabb {
        let thickness = Vec3::splat(length * HANDLE_THICKNESS);
        let tip = origin + axis.unit() * length;
        Aabb::new(origin.min(tip) - thickness, origin.max(tip) + thickness)
    }

    /// Nearest handle under `ray`, if the gizmo is attached.
    pub fn hit_test(&self, ray: &Ray, camera: &PerspectiveCamera) -> Option<Axis> {
        let object = self.attached.as_ref()?;
        let origin = object.world_matrix().w_axis.truncate();
        let length = self.handle_length(origin, camera);
        Axis::ALL
            .iter()
            .filter_map(|axis| {
                ray.intersect_aabb(&Self::handle_bounds(origin, *axis, length))
                    .map(|t| (*axis, t))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(axis, _)| axis)
    }

    pub fn begin_drag(&mut self, axis: Axis, ray: &Ray, camera: &PerspectiveCamera) -> Option<GizmoEvent> {
        let object = self.attached.as_ref()?;
        if self.drag.is_some() {
            return None;
        }
        let origin = object.world_matrix().w_axis.truncate();
        let start_param = axis_param(origin, axis.unit(), ray)?;
        self.drag = Some(DragState {
            axis,
            origin,
            start_param,
            handle_length: self.handle_length(origin, camera),
            start: object.transform(),
        });
        Some(GizmoEvent::DraggingChanged(true))
    }

    /// Applies the drag to the attached object.
    pub fn drag_to(&mut self, ray: &Ray) -> Option<GizmoEvent> {
        let drag = self.drag?;
        let object = self.attached.as_ref()?;
        let param = axis_param(drag.origin, drag.axis.unit(), ray)?;
        let delta = param - drag.start_param;
        let index = drag.axis.index();
        let mut transform = drag.start;
        match self.mode {
            TransformMode::Translate => {
                transform.position += drag.axis.unit() * delta;
            }
            TransformMode::Rotate => {
                transform.rotation[index] += delta / drag.handle_length * std::f32::consts::FRAC_PI_2;
            }
            TransformMode::Scale => {
                let factor = 1.0 + delta / drag.handle_length;
                transform.scale[index] = (drag.start.scale[index] * factor).max(MIN_SCALE);
            }
        }
        if transform == object.transform() {
            return None;
        }
        object.set_transform(transform);
        Some(GizmoEvent::ObjectChange)
    }

    pub fn end_drag(&mut self) -> Option<GizmoEvent> {
        self.drag.take().map(|_| GizmoEvent::DraggingChanged(false))
    }
}

/// Parameter along the line `origin + s * axis` closest to `ray`.
fn axis_param(origin: Vec3, axis: Vec3, ray: &Ray) -> Option<f32> {
    let w = origin - ray.origin;
    let b = axis.dot(ray.direction);
    let d = axis.dot(w);
    let e = ray.direction.dot(w);
    let denom = 1.0 - b * b;
    if denom.abs() < 1e-6 {
        return None;
    }
    Some((b * e - d) / denom)
}
