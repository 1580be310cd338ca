//! CPU ray picking.
//!
//! A click is turned into a world-space ray through the camera and tested
//! against each mesh's local bounding box (the ray is moved into mesh space,
//! so rotated and scaled meshes are tested against their oriented box).
//! Only the subtrees handed to [`pick_nearest`] are considered; helpers,
//! lights and the gizmo are never part of them.

use super::camera::PerspectiveCamera;
use crate::scene::{Aabb, NodeKind, ObjectHandle};
use glam::{Vec2, Vec3, Vec4};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    /// `screen` is in pixels with the origin at the top-left of a `viewport`-sized surface.
    pub fn from_screen(camera: &PerspectiveCamera, screen: Vec2, viewport: Vec2) -> Self {
        let ndc = screen_to_ndc(screen, viewport);
        let inverse = camera.view_projection().inverse();
        let near = inverse * Vec4::new(ndc.x, ndc.y, -1.0, 1.0);
        let far = inverse * Vec4::new(ndc.x, ndc.y, 1.0, 1.0);
        let near = near.truncate() / near.w;
        let far = far.truncate() / far.w;
        Self::new(near, far - near)
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Slab test. Returns the entry distance, or 0 when the origin is inside.
    pub fn intersect_aabb(&self, bounds: &Aabb) -> Option<f32> {
        if bounds.is_empty() {
            return None;
        }
        let inv = self.direction.recip();
        let t1 = (bounds.min - self.origin) * inv;
        let t2 = (bounds.max - self.origin) * inv;
        let t_near = t1.min(t2).max_element();
        let t_far = t1.max(t2).min_element();
        if t_far < 0.0 || t_near > t_far || t_near.is_nan() || t_far.is_nan() {
            return None;
        }
        Some(t_near.max(0.0))
    }
}

pub fn screen_to_ndc(screen: Vec2, viewport: Vec2) -> Vec2 {
    let viewport = viewport.max(Vec2::ONE);
    Vec2::new(
        (screen.x / viewport.x) * 2.0 - 1.0,
        -(screen.y / viewport.y) * 2.0 + 1.0,
    )
}

#[derive(Debug, Clone)]
pub struct PickHit {
    pub object: ObjectHandle,
    pub distance: f32,
    pub point: Vec3,
}

/// Nearest visible mesh hit by `ray` inside any of `roots`.
pub fn pick_nearest(ray: &Ray, roots: &[ObjectHandle]) -> Option<PickHit> {
    let mut best: Option<PickHit> = None;
    for root in roots {
        root.traverse(&mut |handle| {
            let bounds = {
                let node = handle.node();
                match &node.kind {
                    NodeKind::Mesh(mesh) if node.visible => mesh.bounds,
                    _ => return,
                }
            };
            let Some(distance) = intersect_in_local_space(ray, handle, &bounds) else {
                return;
            };
            if best.as_ref().map_or(true, |hit| distance < hit.distance) {
                best = Some(PickHit {
                    object: handle.clone(),
                    distance,
                    point: ray.at(distance),
                });
            }
        });
    }
    best
}

fn intersect_in_local_space(ray: &Ray, handle: &ObjectHandle, bounds: &Aabb) -> Option<f32> {
    let world = handle.world_matrix();
    if world.determinant().abs() < 1e-12 {
        return None;
    }
    let inverse = world.inverse();
    let local_origin = inverse.transform_point3(ray.origin);
    let local_dir = inverse.transform_vector3(ray.direction);
    let local_ray = Ray {
        origin: local_origin,
        direction: local_dir,
    };
    let t_local = local_ray.intersect_aabb(bounds)?;
    let world_point = world.transform_point3(local_ray.at(t_local));
    Some((world_point - ray.origin).length())
}
