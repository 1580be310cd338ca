pub mod material;
pub mod registry;

pub use material::{Color, Material, MaterialCapabilities, MaterialHandle, MaterialId, MaterialKind};
pub use registry::SceneRegistry;

use glam::{EulerRot, Mat4, Quat, Vec3};
use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a scene node, unique for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    pub fn unit(self) -> Vec3 {
        match self {
            Axis::X => Vec3::X,
            Axis::Y => Vec3::Y,
            Axis::Z => Vec3::Z,
        }
    }
}

/// Local transform. Rotation is XYZ euler angles in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    pub fn quat(&self) -> Quat {
        Quat::from_euler(EulerRot::XYZ, self.rotation.x, self.rotation.y, self.rotation.z)
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.quat(), self.position)
    }

    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, position) = matrix.to_scale_rotation_translation();
        let (x, y, z) = rotation.to_euler(EulerRot::XYZ);
        Self {
            position,
            rotation: Vec3::new(x, y, z),
            scale,
        }
    }

    pub fn set_axis(&mut self, component: TransformComponent, axis: Axis, value: f32) {
        let target = match component {
            TransformComponent::Position => &mut self.position,
            TransformComponent::Rotation => &mut self.rotation,
            TransformComponent::Scale => &mut self.scale,
        };
        target[axis.index()] = value;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformComponent {
    Position,
    Rotation,
    Scale,
}

/// Axis-aligned bounding box. An empty box has `min > max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Aabb {
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn from_center_size(center: Vec3, size: Vec3) -> Self {
        let half = size * 0.5;
        Self::new(center - half, center + half)
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn size(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            self.max - self.min
        }
    }

    pub fn center(&self) -> Vec3 {
        if self.is_empty() {
            Vec3::ZERO
        } else {
            (self.min + self.max) * 0.5
        }
    }

    pub fn max_dimension(&self) -> f32 {
        self.size().max_element()
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb::new(self.min.min(other.min), self.max.max(other.max))
    }

    pub fn expand_to(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }

    /// Bounds of this box after `matrix`, re-fitted to the world axes.
    pub fn transformed(&self, matrix: &Mat4) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        let mut out = Aabb::EMPTY;
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 == 0 { self.min.x } else { self.max.x },
                if i & 2 == 0 { self.min.y } else { self.max.y },
                if i & 4 == 0 { self.min.z } else { self.max.z },
            );
            out.expand_to(matrix.transform_point3(corner));
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct Mesh {
    pub bounds: Aabb,
    pub materials: Vec<MaterialHandle>,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

impl Mesh {
    pub fn new(bounds: Aabb, material: MaterialHandle) -> Self {
        Self {
            bounds,
            materials: vec![material],
            cast_shadow: false,
            receive_shadow: false,
        }
    }

    pub fn primary_material(&self) -> Option<&MaterialHandle> {
        self.materials.first()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    Ambient { intensity: f32 },
    Directional { intensity: f32, cast_shadow: bool },
    Hemisphere { sky: Color, ground: Color, intensity: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperKind {
    Grid { size: u32, divisions: u32 },
    Axes { size: u32 },
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Group,
    Mesh(Mesh),
    Light(LightKind),
    Helper(HelperKind),
}

#[derive(Debug)]
pub struct SceneNode {
    pub name: String,
    pub transform: Transform,
    pub kind: NodeKind,
    pub visible: bool,
    parent: Weak<RefCell<SceneNode>>,
    parent_id: Option<ObjectId>,
    children: Vec<ObjectHandle>,
}

/// Shared reference to a node of the scene graph.
///
/// Cloning yields another reference to the same node; equality is identity.
#[derive(Clone)]
pub struct ObjectHandle {
    id: ObjectId,
    node: Rc<RefCell<SceneNode>>,
}

impl PartialEq for ObjectHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ObjectHandle {}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node.try_borrow() {
            Ok(node) => write!(f, "ObjectHandle({}, {:?})", self.id, node.name),
            Err(_) => write!(f, "ObjectHandle({})", self.id),
        }
    }
}

impl ObjectHandle {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: ObjectId::next(),
            node: Rc::new(RefCell::new(SceneNode {
                name: name.into(),
                transform: Transform::default(),
                kind,
                visible: true,
                parent: Weak::new(),
                parent_id: None,
                children: Vec::new(),
            })),
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self::new(name, NodeKind::Group)
    }

    pub fn mesh(name: impl Into<String>, mesh: Mesh) -> Self {
        Self::new(name, NodeKind::Mesh(mesh))
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn node(&self) -> Ref<'_, SceneNode> {
        self.node.borrow()
    }

    pub fn name(&self) -> String {
        self.node.borrow().name.clone()
    }

    pub fn transform(&self) -> Transform {
        self.node.borrow().transform
    }

    pub fn set_transform(&self, transform: Transform) {
        self.node.borrow_mut().transform = transform;
    }

    pub fn update_transform(&self, f: impl FnOnce(&mut Transform)) {
        f(&mut self.node.borrow_mut().transform);
    }

    pub fn set_visible(&self, visible: bool) {
        self.node.borrow_mut().visible = visible;
    }

    /// First material of this node, if it is a mesh.
    pub fn primary_material(&self) -> Option<MaterialHandle> {
        match &self.node.borrow().kind {
            NodeKind::Mesh(mesh) => mesh.primary_material().cloned(),
            _ => None,
        }
    }

    pub fn with_mesh_mut<R>(&self, f: impl FnOnce(&mut Mesh) -> R) -> Option<R> {
        match &mut self.node.borrow_mut().kind {
            NodeKind::Mesh(mesh) => Some(f(mesh)),
            _ => None,
        }
    }

    /// Reparent `child` under this node, detaching it from any previous parent.
    pub fn add_child(&self, child: &ObjectHandle) {
        if child == self {
            return;
        }
        if let Some(previous) = child.parent() {
            previous.remove_child(child);
        }
        {
            let mut node = child.node.borrow_mut();
            node.parent = Rc::downgrade(&self.node);
            node.parent_id = Some(self.id);
        }
        self.node.borrow_mut().children.push(child.clone());
    }

    pub fn remove_child(&self, child: &ObjectHandle) -> bool {
        let removed = {
            let mut node = self.node.borrow_mut();
            let before = node.children.len();
            node.children.retain(|existing| existing != child);
            node.children.len() != before
        };
        if removed {
            let mut node = child.node.borrow_mut();
            node.parent = Weak::new();
            node.parent_id = None;
        }
        removed
    }

    pub fn children(&self) -> Vec<ObjectHandle> {
        self.node.borrow().children.clone()
    }

    pub fn parent(&self) -> Option<ObjectHandle> {
        let node = self.node.borrow();
        let parent = node.parent.upgrade()?;
        Some(ObjectHandle {
            id: node.parent_id?,
            node: parent,
        })
    }

    /// True when `self` is `other` or one of its descendants.
    pub fn is_within(&self, other: &ObjectHandle) -> bool {
        let mut current = Some(self.clone());
        while let Some(handle) = current {
            if &handle == other {
                return true;
            }
            current = handle.parent();
        }
        false
    }

    pub fn world_matrix(&self) -> Mat4 {
        let local = self.transform().matrix();
        match self.parent() {
            Some(parent) => parent.world_matrix() * local,
            None => local,
        }
    }

    /// Depth-first, parent before children.
    pub fn traverse(&self, f: &mut dyn FnMut(&ObjectHandle)) {
        f(self);
        for child in self.children() {
            child.traverse(f);
        }
    }

    /// Union of every mesh's bounds in the subtree, in world space.
    pub fn world_bounds(&self) -> Aabb {
        let mut bounds = Aabb::EMPTY;
        self.traverse(&mut |handle| {
            let local = match &handle.node().kind {
                NodeKind::Mesh(mesh) => mesh.bounds,
                _ => return,
            };
            bounds = bounds.union(&local.transformed(&handle.world_matrix()));
        });
        bounds
    }
}
