//! Model import: format dispatch, scene instantiation and normalization.

use super::{Generation, JobId, LoadError};
use crate::bus::{subscribe_weak, EditorEvent, Subscriptions, Topic};
use crate::editor::EditorContext;
use crate::render::TextureData;
use crate::scene::{
    Aabb, Color, Material, MaterialHandle, MaterialKind, Mesh, ObjectHandle, Transform,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFormat {
    Gltf,
    Glb,
    Fbx,
}

impl ModelFormat {
    pub const EXTENSIONS: [&'static str; 3] = ["gltf", "glb", "fbx"];

    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "gltf" => Some(Self::Gltf),
            "glb" => Some(Self::Glb),
            "fbx" => Some(Self::Fbx),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, ImportError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or_default();
        Self::from_extension(extension).ok_or_else(|| ImportError::UnsupportedFormat {
            path: path.to_path_buf(),
            extension: extension.to_string(),
        })
    }
}

impl fmt::Display for ModelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModelFormat::Gltf => "glTF",
            ModelFormat::Glb => "GLB",
            ModelFormat::Fbx => "FBX",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("unsupported file format '{extension}' for {path}")]
    UnsupportedFormat { path: PathBuf, extension: String },
    #[error("no loader registered for {0} files")]
    LoaderUnavailable(ModelFormat),
    #[error("import manager has been shut down")]
    ShutDown,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelMaterial {
    pub name: String,
    pub kind: MaterialKind,
    pub color: Color,
    pub opacity: f32,
    pub transparent: bool,
    pub base_color_texture: Option<TextureData>,
    pub normal_texture: Option<TextureData>,
}

impl Default for ModelMaterial {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: MaterialKind::Standard,
            color: Color::WHITE,
            opacity: 1.0,
            transparent: false,
            base_color_texture: None,
            normal_texture: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelMesh {
    pub bounds: Aabb,
    /// Index into [`ModelData::materials`].
    pub material: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelNode {
    pub name: String,
    pub transform: Transform,
    pub meshes: Vec<ModelMesh>,
    pub children: Vec<ModelNode>,
}

/// Decoded model, independent of the source format. Built on a loader thread.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ModelData {
    pub name: Option<String>,
    pub nodes: Vec<ModelNode>,
    pub materials: Vec<ModelMaterial>,
}

pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<ModelData, LoadError>;
}

/// Enables shadows on every mesh and shrinks `root` so its largest world
/// dimension fits in `max_dimension`. Returns the applied scale factor.
pub fn normalize_model(root: &ObjectHandle, max_dimension: f32) -> f32 {
    root.traverse(&mut |node| {
        node.with_mesh_mut(|mesh| {
            mesh.cast_shadow = true;
            mesh.receive_shadow = true;
        });
    });
    let max_dim = root.world_bounds().max_dimension();
    if max_dim <= max_dimension || max_dim <= 0.0 {
        return 1.0;
    }
    let factor = max_dimension / max_dim;
    root.update_transform(|t| t.scale *= factor);
    factor
}

pub struct ImportManager {
    ctx: EditorContext,
    generation: Generation,
    loaders: RefCell<HashMap<ModelFormat, Arc<dyn ModelLoader>>>,
    subscriptions: RefCell<Subscriptions>,
    disposed: std::cell::Cell<bool>,
}

impl ImportManager {
    pub fn new(ctx: EditorContext) -> Rc<Self> {
        let gltf: Arc<dyn ModelLoader> = Arc::new(super::gltf_loader::GltfModelLoader);
        let mut loaders = HashMap::new();
        loaders.insert(ModelFormat::Gltf, Arc::clone(&gltf));
        loaders.insert(ModelFormat::Glb, gltf);

        let manager = Rc::new(Self {
            ctx,
            generation: Generation::new(),
            loaders: RefCell::new(loaders),
            subscriptions: RefCell::new(Subscriptions::default()),
            disposed: std::cell::Cell::new(false),
        });
        let id = subscribe_weak(&manager.ctx.bus, Topic::UiModelImport, &manager, |this, event| {
            if let EditorEvent::UiModelImport(path) = event {
                // Failures are logged inside import_file; the bus chain continues.
                let _ = this.import_file(path);
            }
            Ok(())
        });
        manager
            .subscriptions
            .borrow_mut()
            .push(Topic::UiModelImport, id);
        manager
    }

    pub fn register_loader(&self, format: ModelFormat, loader: Arc<dyn ModelLoader>) {
        self.loaders.borrow_mut().insert(format, loader);
    }

    pub fn supports(&self, format: ModelFormat) -> bool {
        self.loaders.borrow().contains_key(&format)
    }

    /// Queue an import. The model is added to the scene from a later `pump`.
    pub fn import_file(self: &Rc<Self>, path: &Path) -> Result<JobId, ImportError> {
        if self.disposed.get() {
            return Err(ImportError::ShutDown);
        }
        let format = ModelFormat::from_path(path).map_err(|err| {
            log::error!("{}", err);
            err
        })?;
        let loader = self
            .loaders
            .borrow()
            .get(&format)
            .cloned()
            .ok_or_else(|| {
                log::error!("Cannot import {}: no {} loader", path.display(), format);
                ImportError::LoaderUnavailable(format)
            })?;

        let fallback_name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());
        let job_path = path.to_path_buf();
        let weak = Rc::downgrade(self);
        log::info!("Importing {} model {}", format, path.display());
        self.ctx
            .loading
            .request(
                format!("model {}", path.display()),
                self.generation.token(),
                move || loader.load(&job_path),
                move |result| {
                    let Some(this) = weak.upgrade() else {
                        return;
                    };
                    match result {
                        Ok(data) => {
                            this.add_model(data, &fallback_name);
                        }
                        Err(err) => log::warn!("Model import failed: {}", err),
                    }
                },
            )
            .ok_or(ImportError::ShutDown)
    }

    fn add_model(&self, data: ModelData, fallback_name: &str) -> ObjectHandle {
        let root = self.instantiate(data, fallback_name);
        let factor = normalize_model(&root, self.ctx.config.import.max_dimension);
        if factor < 1.0 {
            log::info!("Scaled '{}' by {:.3} to fit the scene", root.name(), factor);
        }
        self.ctx.registry.add_object(&root);
        root
    }

    fn instantiate(&self, data: ModelData, fallback_name: &str) -> ObjectHandle {
        let materials: Vec<MaterialHandle> = data
            .materials
            .iter()
            .map(|source| self.build_material(source))
            .collect();
        let default_material = MaterialHandle::new(Material::new(MaterialKind::Standard));

        let name = data
            .name
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| fallback_name.to_string());
        let root = ObjectHandle::group(name);
        for node in &data.nodes {
            let child = build_node(node, &materials, &default_material);
            root.add_child(&child);
        }
        root
    }

    fn build_material(&self, source: &ModelMaterial) -> MaterialHandle {
        let mut material = Material::new(source.kind).with_color(source.color);
        material.name = source.name.clone();
        material.opacity = source.opacity;
        material.transparent = source.transparent;
        material.map = source
            .base_color_texture
            .as_ref()
            .and_then(|data| self.upload(data, &source.name));
        if source.kind.capabilities().normal_map {
            material.normal_map = source
                .normal_texture
                .as_ref()
                .and_then(|data| self.upload(data, &source.name));
        }
        MaterialHandle::new(material)
    }

    fn upload(&self, data: &TextureData, material: &str) -> Option<crate::render::TextureId> {
        match self.ctx.registry.upload_texture(data) {
            Ok(id) => Some(id),
            Err(err) => {
                log::warn!("Skipping texture of material '{}': {}", material, err);
                None
            }
        }
    }

    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        self.generation.advance();
        self.subscriptions.borrow_mut().release(&self.ctx.bus);
    }
}

fn build_node(
    node: &ModelNode,
    materials: &[MaterialHandle],
    default_material: &MaterialHandle,
) -> ObjectHandle {
    let material_for = |mesh: &ModelMesh| {
        mesh.material
            .and_then(|index| materials.get(index))
            .unwrap_or(default_material)
            .clone()
    };
    let handle = match node.meshes.as_slice() {
        [single] => ObjectHandle::mesh(&node.name, Mesh::new(single.bounds, material_for(single))),
        many => {
            let group = ObjectHandle::group(&node.name);
            for (index, mesh) in many.iter().enumerate() {
                let part = ObjectHandle::mesh(
                    format!("{}_{}", node.name, index),
                    Mesh::new(mesh.bounds, material_for(mesh)),
                );
                group.add_child(&part);
            }
            group
        }
    };
    handle.set_transform(node.transform);
    for child in &node.children {
        handle.add_child(&build_node(child, materials, default_material));
    }
    handle
}
