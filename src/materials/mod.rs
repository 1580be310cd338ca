//! Material state manager.
//!
//! Edits always target the primary material of the selected mesh. Texture
//! slots are cached per material so toggling a map off and on again reuses
//! the same GPU texture; replacing a slot's texture releases the old one.

use crate::assets::texture::{decode_texture, is_texture_file};
use crate::assets::{Generation, JobId, LoadError};
use crate::bus::{subscribe_weak, EditorEvent, Subscriptions, Topic};
use crate::editor::EditorContext;
use crate::render::{TextureData, TextureId};
use crate::scene::{Color, Material, MaterialHandle, MaterialId, ObjectHandle};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureSlot {
    Diffuse,
    Normal,
}

impl fmt::Display for TextureSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TextureSlot::Diffuse => "diffuse",
            TextureSlot::Normal => "normal",
        })
    }
}

/// Payload of `material.updated`, mirrored by the material panel.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialSnapshot {
    /// `#rrggbb`
    pub color: String,
    pub opacity: f32,
    pub transparent: bool,
    pub has_diffuse_map: bool,
    pub has_normal_map: bool,
}

impl MaterialSnapshot {
    pub fn of(material: &Material) -> Self {
        let caps = material.kind.capabilities();
        Self {
            color: material.color.to_hex_string(),
            opacity: material.opacity,
            transparent: material.transparent,
            has_diffuse_map: caps.base_color_map && material.map.is_some(),
            has_normal_map: caps.normal_map && material.normal_map.is_some(),
        }
    }
}

struct TextureRecord {
    material: MaterialHandle,
    diffuse: Option<TextureId>,
    normal: Option<TextureId>,
}

impl TextureRecord {
    fn seeded_from(material: &MaterialHandle) -> Self {
        let current = material.get();
        let caps = current.kind.capabilities();
        Self {
            material: material.clone(),
            diffuse: current.map.filter(|_| caps.base_color_map),
            normal: current.normal_map.filter(|_| caps.normal_map),
        }
    }

    fn slot_mut(&mut self, slot: TextureSlot) -> &mut Option<TextureId> {
        match slot {
            TextureSlot::Diffuse => &mut self.diffuse,
            TextureSlot::Normal => &mut self.normal,
        }
    }
}

fn supports(material: &MaterialHandle, slot: TextureSlot) -> bool {
    let caps = material.capabilities();
    match slot {
        TextureSlot::Diffuse => caps.base_color_map,
        TextureSlot::Normal => caps.normal_map,
    }
}

fn bind_slot(material: &mut Material, slot: TextureSlot, texture: Option<TextureId>) {
    match slot {
        TextureSlot::Diffuse => material.map = texture,
        TextureSlot::Normal => material.normal_map = texture,
    }
}

const TOPICS: [Topic; 9] = [
    Topic::ObjectSelected,
    Topic::ObjectDeselected,
    Topic::UiMaterialColorChange,
    Topic::UiMaterialOpacityChange,
    Topic::UiMaterialTransparentChange,
    Topic::UiMaterialDiffuseToggle,
    Topic::UiMaterialNormalToggle,
    Topic::UiMaterialDiffuseFile,
    Topic::UiMaterialNormalFile,
];

pub struct MaterialManager {
    ctx: EditorContext,
    generation: Generation,
    selected: RefCell<Option<MaterialHandle>>,
    textures: RefCell<HashMap<MaterialId, TextureRecord>>,
    /// Newest outstanding request per slot; older completions are discarded.
    requests: RefCell<HashMap<(MaterialId, TextureSlot), u64>>,
    next_request: Cell<u64>,
    subscriptions: RefCell<Subscriptions>,
    disposed: Cell<bool>,
}

impl MaterialManager {
    pub fn new(ctx: EditorContext) -> Rc<Self> {
        let manager = Rc::new(Self {
            ctx,
            generation: Generation::new(),
            selected: RefCell::new(None),
            textures: RefCell::new(HashMap::new()),
            requests: RefCell::new(HashMap::new()),
            next_request: Cell::new(1),
            subscriptions: RefCell::new(Subscriptions::default()),
            disposed: Cell::new(false),
        });
        {
            let mut subs = manager.subscriptions.borrow_mut();
            for topic in TOPICS {
                let id = subscribe_weak(&manager.ctx.bus, topic, &manager, |this, event| {
                    this.handle(event);
                    Ok(())
                });
                subs.push(topic, id);
            }
        }
        manager
    }

    fn handle(self: &Rc<Self>, event: &EditorEvent) {
        match event {
            EditorEvent::ObjectSelected(object) => self.select_object(object),
            EditorEvent::ObjectDeselected(_) => self.clear_selection(),
            EditorEvent::UiMaterialColorChange(color) => self.set_color(*color),
            EditorEvent::UiMaterialOpacityChange(opacity) => self.set_opacity(*opacity),
            EditorEvent::UiMaterialTransparentChange(transparent) => {
                self.set_transparent(*transparent)
            }
            EditorEvent::UiMaterialDiffuseToggle(on) => self.toggle_map(TextureSlot::Diffuse, *on),
            EditorEvent::UiMaterialNormalToggle(on) => self.toggle_map(TextureSlot::Normal, *on),
            EditorEvent::UiMaterialDiffuseFile(path) => {
                self.replace_texture(TextureSlot::Diffuse, path);
            }
            EditorEvent::UiMaterialNormalFile(path) => {
                self.replace_texture(TextureSlot::Normal, path);
            }
            _ => {}
        }
    }

    /// Track the primary material of `object`. Non-mesh objects leave the selection alone.
    pub fn select_object(&self, object: &ObjectHandle) {
        let Some(material) = object.primary_material() else {
            return;
        };
        *self.selected.borrow_mut() = Some(material.clone());
        self.publish_snapshot(&material);
    }

    pub fn clear_selection(&self) {
        self.selected.borrow_mut().take();
    }

    pub fn selected_material(&self) -> Option<MaterialHandle> {
        self.selected.borrow().clone()
    }

    pub fn snapshot(&self) -> Option<MaterialSnapshot> {
        self.selected_material()
            .map(|material| MaterialSnapshot::of(&material.get()))
    }

    pub fn set_color(&self, color: Color) {
        let Some(material) = self.selected_material() else {
            return;
        };
        if !material.capabilities().base_color_map {
            return;
        }
        material.update(|m| m.color = color);
    }

    pub fn set_opacity(&self, opacity: f32) {
        if let Some(material) = self.selected_material() {
            material.update(|m| m.opacity = opacity);
        }
    }

    pub fn set_transparent(&self, transparent: bool) {
        if let Some(material) = self.selected_material() {
            material.update(|m| m.transparent = transparent);
        }
    }

    /// Attach or detach the cached texture of `slot`. The cache itself is kept.
    pub fn toggle_map(&self, slot: TextureSlot, enabled: bool) {
        let Some(material) = self.selected_material() else {
            return;
        };
        if !supports(&material, slot) {
            return;
        }
        let cached = self.with_record(&material, |record| *record.slot_mut(slot));
        let texture = if enabled { cached } else { None };
        material.update(|m| bind_slot(m, slot, texture));
    }

    /// Decode `path` on the loading workers and swap it into `slot` of the selected material.
    pub fn replace_texture(self: &Rc<Self>, slot: TextureSlot, path: &Path) -> Option<JobId> {
        if self.disposed.get() {
            return None;
        }
        if !is_texture_file(path) {
            log::error!("Unsupported {} texture file {}", slot, path.display());
            return None;
        }
        let material = self.selected_material()?;
        if !supports(&material, slot) {
            return None;
        }
        let request = self.next_request.get();
        self.next_request.set(request + 1);
        self.requests
            .borrow_mut()
            .insert((material.id(), slot), request);

        let weak = Rc::downgrade(self);
        let job_path = path.to_path_buf();
        log::info!("Loading {} texture {} for {}", slot, path.display(), material.id());
        self.ctx.loading.request(
            format!("{} texture {}", slot, path.display()),
            self.generation.token(),
            move || decode_texture(&job_path),
            move |result| {
                if let Some(this) = weak.upgrade() {
                    this.finish_texture(&material, slot, request, result);
                }
            },
        )
    }

    fn finish_texture(
        &self,
        material: &MaterialHandle,
        slot: TextureSlot,
        request: u64,
        result: Result<TextureData, LoadError>,
    ) {
        let key = (material.id(), slot);
        {
            let mut requests = self.requests.borrow_mut();
            if requests.get(&key) != Some(&request) {
                log::debug!("Discarding superseded {} texture for {}", slot, material.id());
                return;
            }
            requests.remove(&key);
        }
        let data = match result {
            Ok(data) => data,
            Err(err) => {
                log::warn!("Keeping previous {} texture for {}: {}", slot, material.id(), err);
                return;
            }
        };
        let texture = match self.ctx.registry.upload_texture(&data) {
            Ok(texture) => texture,
            Err(err) => {
                log::warn!("Failed to upload {} texture for {}: {}", slot, material.id(), err);
                return;
            }
        };

        let previous = self.with_record(material, |record| record.slot_mut(slot).replace(texture));
        if let Some(previous) = previous.filter(|previous| *previous != texture) {
            self.ctx.registry.release_texture(previous);
        }
        material.update(|m| bind_slot(m, slot, Some(texture)));

        let still_selected = self.selected.borrow().as_ref() == Some(material);
        if still_selected {
            self.publish_snapshot(material);
        }
    }

    fn with_record<R>(&self, material: &MaterialHandle, f: impl FnOnce(&mut TextureRecord) -> R) -> R {
        let mut textures = self.textures.borrow_mut();
        let record = textures
            .entry(material.id())
            .or_insert_with(|| TextureRecord::seeded_from(material));
        f(record)
    }

    fn publish_snapshot(&self, material: &MaterialHandle) {
        if !material.capabilities().base_color_map {
            return;
        }
        self.with_record(material, |_| ());
        let snapshot = MaterialSnapshot::of(&material.get());
        self.ctx.bus.broadcast(EditorEvent::MaterialUpdated(snapshot));
    }

    /// Number of textures currently held in the cache.
    pub fn cached_texture_count(&self) -> usize {
        self.textures
            .borrow()
            .values()
            .map(|record| record.diffuse.iter().count() + record.normal.iter().count())
            .sum()
    }

    /// Stops listening and releases every cached texture. Idempotent.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.generation.advance();
        self.subscriptions.borrow_mut().release(&self.ctx.bus);
        self.selected.borrow_mut().take();
        self.requests.borrow_mut().clear();
        let records: Vec<TextureRecord> = self.textures.borrow_mut().drain().map(|(_, r)| r).collect();
        for record in records {
            record.material.update(|m| {
                m.map = m.map.filter(|id| Some(*id) != record.diffuse);
                m.normal_map = m.normal_map.filter(|id| Some(*id) != record.normal);
            });
            for texture in record.diffuse.into_iter().chain(record.normal) {
                self.ctx.registry.release_texture(texture);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::test_context;
    use crate::scene::{Aabb, MaterialKind, Mesh};
    use glam::Vec3;
    use std::path::PathBuf;

    fn mesh_with(kind: MaterialKind) -> (ObjectHandle, MaterialHandle) {
        let material = MaterialHandle::new(Material::new(kind).with_color(Color::from_hex(0x3498db)));
        let object = ObjectHandle::mesh(
            "cube",
            Mesh::new(Aabb::from_center_size(Vec3::ZERO, Vec3::ONE), material.clone()),
        );
        (object, material)
    }

    fn snapshots(ctx: &EditorContext) -> Rc<RefCell<Vec<MaterialSnapshot>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        ctx.bus.subscribe(Topic::MaterialUpdated, move |event| {
            if let EditorEvent::MaterialUpdated(snapshot) = event {
                sink.borrow_mut().push(snapshot.clone());
            }
            Ok(())
        });
        seen
    }

    fn png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        image::RgbImage::new(2, 2).save(&path).unwrap();
        path
    }

    fn select(ctx: &EditorContext, object: &ObjectHandle) {
        ctx.bus
            .publish(EditorEvent::ObjectSelected(object.clone()))
            .unwrap();
    }

    #[test]
    fn selection_broadcasts_snapshot() {
        let ctx = test_context();
        let _manager = MaterialManager::new(ctx.clone());
        let seen = snapshots(&ctx);
        let (object, _) = mesh_with(MaterialKind::Standard);
        select(&ctx, &object);
        assert_eq!(
            *seen.borrow(),
            vec![MaterialSnapshot {
                color: "#3498db".into(),
                opacity: 1.0,
                transparent: false,
                has_diffuse_map: false,
                has_normal_map: false,
            }]
        );
    }

    #[test]
    fn opacity_round_trips_through_snapshot() {
        let ctx = test_context();
        let manager = MaterialManager::new(ctx.clone());
        let seen = snapshots(&ctx);
        let (object, material) = mesh_with(MaterialKind::Standard);
        select(&ctx, &object);
        let version = material.version();

        ctx.bus
            .publish(EditorEvent::UiMaterialOpacityChange(0.42))
            .unwrap();
        assert!(material.version() > version);
        assert!((manager.snapshot().unwrap().opacity - 0.42).abs() < 1e-6);

        ctx.bus
            .publish(EditorEvent::ObjectDeselected(object.clone()))
            .unwrap();
        select(&ctx, &object);
        let last = seen.borrow().last().cloned().unwrap();
        assert!((last.opacity - 0.42).abs() < 1e-6);
    }

    #[test]
    fn mutations_without_selection_are_ignored() {
        let ctx = test_context();
        let manager = MaterialManager::new(ctx.clone());
        let (object, material) = mesh_with(MaterialKind::Standard);
        select(&ctx, &object);
        ctx.bus
            .publish(EditorEvent::ObjectDeselected(object))
            .unwrap();
        let version = material.version();

        manager.set_color(Color::from_hex(0xff0000));
        manager.set_opacity(0.1);
        manager.toggle_map(TextureSlot::Diffuse, true);
        assert!(manager
            .replace_texture(TextureSlot::Diffuse, Path::new("any.png"))
            .is_none());
        assert_eq!(material.version(), version);
        assert_eq!(material.get().opacity, 1.0);
    }

    #[test]
    fn normal_map_never_reported_for_flat_material() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context();
        let manager = MaterialManager::new(ctx.clone());
        let seen = snapshots(&ctx);
        let (object, material) = mesh_with(MaterialKind::Basic);
        select(&ctx, &object);

        ctx.bus
            .publish(EditorEvent::UiMaterialNormalFile(png(dir.path(), "n.png")))
            .unwrap();
        ctx.bus
            .publish(EditorEvent::UiMaterialNormalToggle(true))
            .unwrap();
        assert!(ctx.loading.is_idle());

        ctx.bus
            .publish(EditorEvent::UiMaterialDiffuseFile(png(dir.path(), "d.png")))
            .unwrap();
        ctx.loading.pump();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|snapshot| !snapshot.has_normal_map));
        assert!(seen[1].has_diffuse_map);
        assert!(material.get().normal_map.is_none());
        assert_eq!(manager.cached_texture_count(), 1);
    }

    #[test]
    fn color_requires_base_color_capability() {
        let ctx = test_context();
        let manager = MaterialManager::new(ctx.clone());
        let (object, material) = mesh_with(MaterialKind::Depth);
        select(&ctx, &object);
        manager.set_color(Color::from_hex(0xff0000));
        assert_eq!(material.get().color, Color::from_hex(0x3498db));
        manager.set_transparent(true);
        assert!(material.get().transparent);
    }

    #[test]
    fn replacing_diffuse_twice_leaves_one_live_texture() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context();
        let manager = MaterialManager::new(ctx.clone());
        let (object, material) = mesh_with(MaterialKind::Standard);
        let original = ctx
            .registry
            .upload_texture(&TextureData::rgba8(1, 1, vec![255; 4]))
            .unwrap();
        material.update(|m| m.map = Some(original));
        select(&ctx, &object);

        for name in ["first.png", "second.png"] {
            ctx.bus
                .publish(EditorEvent::UiMaterialDiffuseFile(png(dir.path(), name)))
                .unwrap();
            ctx.loading.pump();
        }

        let stats = ctx.registry.stats();
        assert_eq!(stats.textures_created, 3);
        assert_eq!(stats.textures_destroyed, 2);
        assert_eq!(ctx.registry.live_texture_count(), 1);
        assert!(material.get().map.is_some());
        assert_ne!(material.get().map, Some(original));
        assert_eq!(manager.cached_texture_count(), 1);
    }

    #[test]
    fn latest_texture_request_wins() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context();
        let _manager = MaterialManager::new(ctx.clone());
        let (object, material) = mesh_with(MaterialKind::Standard);
        select(&ctx, &object);

        let older = png(dir.path(), "older.png");
        let newer = dir.path().join("newer.png");
        image::RgbImage::new(4, 4).save(&newer).unwrap();
        ctx.bus
            .publish(EditorEvent::UiMaterialDiffuseFile(older))
            .unwrap();
        ctx.bus
            .publish(EditorEvent::UiMaterialDiffuseFile(newer))
            .unwrap();
        ctx.loading.pump();

        assert_eq!(ctx.registry.stats().textures_created, 1);
        assert_eq!(ctx.registry.live_texture_count(), 1);
        assert!(material.get().map.is_some());
    }

    #[test]
    fn toggling_off_keeps_cache_for_reuse() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context();
        let manager = MaterialManager::new(ctx.clone());
        let (object, material) = mesh_with(MaterialKind::Phong);
        select(&ctx, &object);
        ctx.bus
            .publish(EditorEvent::UiMaterialNormalFile(png(dir.path(), "n.png")))
            .unwrap();
        ctx.loading.pump();
        let loaded = material.get().normal_map;
        assert!(loaded.is_some());

        manager.toggle_map(TextureSlot::Normal, false);
        assert!(material.get().normal_map.is_none());
        assert_eq!(ctx.registry.live_texture_count(), 1);
        manager.toggle_map(TextureSlot::Normal, true);
        assert_eq!(material.get().normal_map, loaded);
    }

    #[test]
    fn texture_for_deselected_material_still_lands_without_panel_refresh() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context();
        let _manager = MaterialManager::new(ctx.clone());
        let seen = snapshots(&ctx);
        let (object, material) = mesh_with(MaterialKind::Standard);
        select(&ctx, &object);
        ctx.bus
            .publish(EditorEvent::UiMaterialDiffuseFile(png(dir.path(), "d.png")))
            .unwrap();
        ctx.bus
            .publish(EditorEvent::ObjectDeselected(object))
            .unwrap();
        ctx.loading.pump();
        assert!(material.get().map.is_some());
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn non_image_texture_file_is_rejected_before_loading() {
        let ctx = test_context();
        let manager = MaterialManager::new(ctx.clone());
        let starts = Rc::new(Cell::new(0));
        let sink = Rc::clone(&starts);
        ctx.bus.subscribe(Topic::LoadStart, move |_| {
            sink.set(sink.get() + 1);
            Ok(())
        });
        let (object, material) = mesh_with(MaterialKind::Standard);
        select(&ctx, &object);
        let version = material.version();

        assert!(manager
            .replace_texture(TextureSlot::Diffuse, Path::new("notes.txt"))
            .is_none());
        ctx.bus
            .publish(EditorEvent::UiMaterialNormalFile(PathBuf::from("scan.obj")))
            .unwrap();
        assert!(ctx.loading.is_idle());
        assert_eq!(starts.get(), 0);
        assert_eq!(material.version(), version);
    }

    #[test]
    fn failed_texture_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context();
        let _manager = MaterialManager::new(ctx.clone());
        let (object, material) = mesh_with(MaterialKind::Standard);
        select(&ctx, &object);
        let version = material.version();
        ctx.bus
            .publish(EditorEvent::UiMaterialDiffuseFile(dir.path().join("missing.png")))
            .unwrap();
        ctx.loading.pump();
        assert_eq!(material.version(), version);
        assert!(material.get().map.is_none());
        assert_eq!(ctx.registry.live_texture_count(), 0);
    }

    #[test]
    fn dispose_releases_cache_and_drops_in_flight_loads() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context();
        let manager = MaterialManager::new(ctx.clone());
        let (object, material) = mesh_with(MaterialKind::Standard);
        select(&ctx, &object);
        ctx.bus
            .publish(EditorEvent::UiMaterialDiffuseFile(png(dir.path(), "a.png")))
            .unwrap();
        ctx.loading.pump();
        ctx.bus
            .publish(EditorEvent::UiMaterialNormalFile(png(dir.path(), "b.png")))
            .unwrap();

        manager.dispose();
        manager.dispose();
        ctx.loading.pump();
        assert_eq!(ctx.registry.live_texture_count(), 0);
        assert!(material.get().map.is_none());
        assert!(material.get().normal_map.is_none());
        assert_eq!(ctx.bus.subscriber_count(Topic::UiMaterialDiffuseFile), 0);
    }
}
