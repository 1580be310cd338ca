//! Scene registry: the one owner of the scene graph, camera, orbit controls
//! and render backend.
//!
//! Registered objects are the only pickable content. Lights and helpers are
//! kept in a separate overlay list so they are drawn but never hit.

use super::{
    Aabb, HelperKind, LightKind, Material, MaterialHandle, MaterialKind, Mesh, NodeKind,
    ObjectHandle, ObjectId, Transform,
};
use crate::bus::{subscribe_weak, EditorEvent, EventBus, Subscriptions, Topic};
use crate::config::EditorConfig;
use crate::render::pick::pick_nearest;
use crate::render::{
    Background, BackendStats, FrameInput, OrbitControls, PerspectiveCamera, PickHit, Ray,
    RenderBackend, RenderError, TextureData, TextureId,
};
use crate::scene::Color;
use glam::{Vec2, Vec3};
use std::cell::{Cell, Ref, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

const DEFAULT_BACKGROUND: u32 = 0x1e1f22;
const TEST_CUBE_COLOR: u32 = 0x3498db;

pub struct SceneRegistry {
    bus: Rc<EventBus>,
    backend: RefCell<Box<dyn RenderBackend>>,
    camera: RefCell<PerspectiveCamera>,
    orbit: RefCell<OrbitControls>,
    /// Scene root. Registered objects are its direct children.
    root: ObjectHandle,
    objects: RefCell<HashMap<ObjectId, ObjectHandle>>,
    order: RefCell<Vec<ObjectId>>,
    overlays: Vec<ObjectHandle>,
    background: Cell<Background>,
    environment: Cell<Option<TextureId>>,
    viewport: Cell<(u32, u32)>,
    max_pixel_ratio: f32,
    subscriptions: RefCell<Subscriptions>,
    disposed: Cell<bool>,
}

impl SceneRegistry {
    pub fn new(bus: Rc<EventBus>, config: &EditorConfig, backend: Box<dyn RenderBackend>) -> Rc<Self> {
        let cam = &config.camera;
        let mut camera = PerspectiveCamera::new(cam.fov_y_deg, 1.0, cam.near, cam.far);
        camera.position = Vec3::from_array(cam.position);
        camera.look_at(Vec3::ZERO);
        let orbit = OrbitControls::with_damping(cam.damping);

        let background = Color::parse_hex(&config.scene.background).unwrap_or_else(|| {
            log::warn!(
                "Invalid scene background '{}', using default",
                config.scene.background
            );
            Color::from_hex(DEFAULT_BACKGROUND)
        });

        let registry = Rc::new(Self {
            bus,
            backend: RefCell::new(backend),
            camera: RefCell::new(camera),
            orbit: RefCell::new(orbit),
            root: ObjectHandle::group("Scene"),
            objects: RefCell::new(HashMap::new()),
            order: RefCell::new(Vec::new()),
            overlays: startup_overlays(config),
            background: Cell::new(Background::Color(background)),
            environment: Cell::new(None),
            viewport: Cell::new((1, 1)),
            max_pixel_ratio: cam.max_pixel_ratio,
            subscriptions: RefCell::new(Subscriptions::default()),
            disposed: Cell::new(false),
        });

        let id = subscribe_weak(&registry.bus, Topic::OrbitEnabled, &registry, |this, event| {
            if let EditorEvent::OrbitEnabled(enabled) = event {
                this.orbit.borrow_mut().enabled = *enabled;
            }
            Ok(())
        });
        registry.subscriptions.borrow_mut().push(Topic::OrbitEnabled, id);

        if config.scene.test_cubes {
            registry.add_object(&test_cubes());
        }
        log::info!(
            "Scene ready ({} overlay node(s), {} object(s))",
            registry.overlays.len(),
            registry.order.borrow().len()
        );
        registry
    }

    /// Insert into the scene graph and the registry. Returns false if already registered.
    pub fn add_object(&self, object: &ObjectHandle) -> bool {
        if self.disposed.get() {
            return false;
        }
        {
            let mut objects = self.objects.borrow_mut();
            if objects.contains_key(&object.id()) {
                return false;
            }
            objects.insert(object.id(), object.clone());
            self.order.borrow_mut().push(object.id());
        }
        self.root.add_child(object);
        log::debug!("Added {:?} to scene", object);
        self.bus.broadcast(EditorEvent::SceneObjectAdded(object.clone()));
        true
    }

    /// Remove a registered object, or a node nested inside one.
    pub fn remove_object(&self, object: &ObjectHandle) -> bool {
        let registered = self.objects.borrow_mut().remove(&object.id()).is_some();
        if registered {
            self.order.borrow_mut().retain(|id| *id != object.id());
            self.root.remove_child(object);
        } else {
            let nested = self.list_objects().iter().any(|root| object.is_within(root));
            let detached = nested && object.parent().is_some_and(|parent| parent.remove_child(object));
            if !detached {
                return false;
            }
        }
        log::debug!("Removed {:?} from scene", object);
        self.bus.broadcast(EditorEvent::SceneObjectRemoved(object.clone()));
        true
    }

    /// Registered objects in insertion order.
    pub fn list_objects(&self) -> Vec<ObjectHandle> {
        let objects = self.objects.borrow();
        self.order
            .borrow()
            .iter()
            .filter_map(|id| objects.get(id).cloned())
            .collect()
    }

    pub fn contains(&self, object: &ObjectHandle) -> bool {
        self.objects.borrow().contains_key(&object.id())
    }

    pub fn overlays(&self) -> &[ObjectHandle] {
        &self.overlays
    }

    /// `screen` in logical pixels from the top-left of the viewport.
    pub fn ray_from_screen(&self, screen: Vec2) -> Ray {
        let (width, height) = self.viewport.get();
        Ray::from_screen(
            &self.camera.borrow(),
            screen,
            Vec2::new(width as f32, height as f32),
        )
    }

    /// Nearest registered mesh under `screen`. Helpers, lights and the gizmo never hit.
    pub fn pick_object_at(&self, screen: Vec2) -> Option<PickHit> {
        let ray = self.ray_from_screen(screen);
        pick_nearest(&ray, &self.list_objects())
    }

    pub fn camera(&self) -> Ref<'_, PerspectiveCamera> {
        self.camera.borrow()
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport.get()
    }

    /// Applied immediately: camera aspect and backend size are both updated here.
    pub fn resize(&self, width: u32, height: u32, device_pixel_ratio: f32) {
        let width = width.max(1);
        let height = height.max(1);
        self.viewport.set((width, height));
        self.camera.borrow_mut().set_aspect(width, height);
        let pixel_ratio = device_pixel_ratio.max(0.1).min(self.max_pixel_ratio);
        self.backend.borrow_mut().set_size(width, height, pixel_ratio);
    }

    pub fn orbit_rotate(&self, dx: f32, dy: f32) {
        self.orbit.borrow_mut().rotate(dx, dy);
    }

    pub fn orbit_dolly(&self, amount: f32) {
        self.orbit.borrow_mut().dolly(amount);
    }

    pub fn orbit_enabled(&self) -> bool {
        self.orbit.borrow().enabled
    }

    /// One render-loop iteration. Returns `Ok(false)` once disposed.
    pub fn tick(&self) -> Result<bool, RenderError> {
        if self.disposed.get() {
            return Ok(false);
        }
        {
            let mut camera = self.camera.borrow_mut();
            self.orbit.borrow_mut().update(&mut camera);
        }
        let objects = self.list_objects();
        let camera = *self.camera.borrow();
        let frame = FrameInput {
            view: camera.view(),
            projection: camera.projection(),
            background: self.background.get(),
            environment: self.environment.get(),
            objects: &objects,
            overlays: &self.overlays,
        };
        self.backend.borrow_mut().render(&frame)?;
        Ok(true)
    }

    pub fn upload_texture(&self, data: &TextureData) -> Result<TextureId, RenderError> {
        if self.disposed.get() {
            return Err(RenderError::Disposed);
        }
        self.backend.borrow_mut().create_texture(data)
    }

    pub fn release_texture(&self, texture: TextureId) -> bool {
        let released = self.backend.borrow_mut().destroy_texture(texture);
        if released {
            if self.environment.get() == Some(texture) {
                self.environment.set(None);
            }
            log::debug!("Released texture {}", texture);
        }
        released
    }

    pub fn live_texture_count(&self) -> usize {
        self.backend.borrow().stats().live_textures
    }

    pub fn set_environment(&self, texture: Option<TextureId>) {
        self.environment.set(texture);
    }

    pub fn environment(&self) -> Option<TextureId> {
        self.environment.get()
    }

    pub fn set_background(&self, background: Background) {
        self.background.set(background);
    }

    pub fn background(&self) -> Background {
        self.background.get()
    }

    pub fn stats(&self) -> BackendStats {
        self.backend.borrow().stats()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Stops the render loop and releases every backend resource. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.subscriptions.borrow_mut().release(&self.bus);
        self.environment.set(None);
        self.backend.borrow_mut().dispose();
        log::info!("Scene disposed");
    }
}

fn startup_overlays(config: &EditorConfig) -> Vec<ObjectHandle> {
    let ambient = ObjectHandle::new("AmbientLight", NodeKind::Light(LightKind::Ambient { intensity: 0.5 }));
    let directional = ObjectHandle::new(
        "DirectionalLight",
        NodeKind::Light(LightKind::Directional {
            intensity: 1.0,
            cast_shadow: true,
        }),
    );
    directional.set_transform(Transform::from_position(Vec3::splat(5.0)));
    let hemisphere = ObjectHandle::new(
        "HemisphereLight",
        NodeKind::Light(LightKind::Hemisphere {
            sky: Color::WHITE,
            ground: Color::from_hex(0x444444),
            intensity: 0.6,
        }),
    );
    let grid = ObjectHandle::new(
        "Grid",
        NodeKind::Helper(HelperKind::Grid {
            size: config.scene.grid_size,
            divisions: config.scene.grid_divisions,
        }),
    );
    let axes = ObjectHandle::new(
        "Axes",
        NodeKind::Helper(HelperKind::Axes {
            size: config.scene.axes_size,
        }),
    );
    vec![ambient, directional, hemisphere, grid, axes]
}

/// Three unit cubes sharing one material, grouped.
fn test_cubes() -> ObjectHandle {
    let group = ObjectHandle::group("TestCubes");
    let material = MaterialHandle::new(
        Material::new(MaterialKind::Standard).with_color(Color::from_hex(TEST_CUBE_COLOR)),
    );
    let positions = [
        Vec3::new(0.0, 0.5, 0.0),
        Vec3::new(2.0, 0.5, 0.0),
        Vec3::new(0.0, 0.5, 2.0),
    ];
    for (index, position) in positions.into_iter().enumerate() {
        let mut mesh = Mesh::new(Aabb::from_center_size(Vec3::ZERO, Vec3::ONE), material.clone());
        mesh.cast_shadow = true;
        mesh.receive_shadow = true;
        let cube = ObjectHandle::mesh(format!("TestCube_{}", index + 1), mesh);
        cube.set_transform(Transform::from_position(position));
        group.add_child(&cube);
    }
    group
}
