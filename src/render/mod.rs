//! Rendering seam.
//!
//! The editor core never talks to a GPU API directly. Everything that needs
//! drawing or GPU-side memory goes through [`RenderBackend`]; the scene graph,
//! picking and gizmo math live on the CPU side in this crate.

pub mod camera;
pub mod gizmo;
pub mod pick;

pub use camera::{OrbitControls, PerspectiveCamera};
pub use gizmo::{GizmoAxis, GizmoEvent, TransformGizmo, TransformMode};
pub use pick::{PickHit, Ray};

use crate::scene::{Color, ObjectHandle};
use glam::Mat4;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(u64);

impl fmt::Display for TextureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tex#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureMapping {
    Uv,
    Equirectangular,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PixelData {
    Rgba8(Vec<u8>),
    Rgba32F(Vec<f32>),
}

impl PixelData {
    fn channel_count(&self) -> usize {
        match self {
            PixelData::Rgba8(data) => data.len(),
            PixelData::Rgba32F(data) => data.len(),
        }
    }
}

/// Decoded image ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub pixels: PixelData,
    pub mapping: TextureMapping,
}

impl TextureData {
    pub fn rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels: PixelData::Rgba8(pixels),
            mapping: TextureMapping::Uv,
        }
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::EmptyTexture);
        }
        let expected = self.width as usize * self.height as usize * 4;
        let actual = self.pixels.channel_count();
        if expected != actual {
            return Err(RenderError::TextureSizeMismatch { expected, actual });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Background {
    Color(Color),
    Texture(TextureId),
}

pub struct FrameInput<'a> {
    pub view: Mat4,
    pub projection: Mat4,
    pub background: Background,
    pub environment: Option<TextureId>,
    pub objects: &'a [ObjectHandle],
    pub overlays: &'a [ObjectHandle],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub frames: u64,
    pub live_textures: usize,
    pub textures_created: u64,
    pub textures_destroyed: u64,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("render backend has been disposed")]
    Disposed,
    #[error("texture has zero width or height")]
    EmptyTexture,
    #[error("texture data holds {actual} channels, expected {expected}")]
    TextureSizeMismatch { expected: usize, actual: usize },
}

pub trait RenderBackend {
    /// `width`/`height` are logical pixels; the drawing buffer is scaled by `pixel_ratio`.
    fn set_size(&mut self, width: u32, height: u32, pixel_ratio: f32);
    fn create_texture(&mut self, data: &TextureData) -> Result<TextureId, RenderError>;
    /// Returns `false` when `id` was not live.
    fn destroy_texture(&mut self, id: TextureId) -> bool;
    fn render(&mut self, frame: &FrameInput<'_>) -> Result<(), RenderError>;
    fn dispose(&mut self);
    fn stats(&self) -> BackendStats;
}

/// Backend without a GPU. Tracks resources and frame submissions only.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    next_texture: u64,
    live: HashMap<TextureId, (u32, u32)>,
    stats: BackendStats,
    last_background: Option<Background>,
    last_draw_count: usize,
    disposed: bool,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_background(&self) -> Option<Background> {
        self.last_background
    }

    pub fn last_draw_count(&self) -> usize {
        self.last_draw_count
    }
}

impl RenderBackend for HeadlessBackend {
    fn set_size(&mut self, width: u32, height: u32, pixel_ratio: f32) {
        self.stats.width = (width as f32 * pixel_ratio).round() as u32;
        self.stats.height = (height as f32 * pixel_ratio).round() as u32;
    }

    fn create_texture(&mut self, data: &TextureData) -> Result<TextureId, RenderError> {
        if self.disposed {
            return Err(RenderError::Disposed);
        }
        data.validate()?;
        self.next_texture += 1;
        let id = TextureId(self.next_texture);
        self.live.insert(id, (data.width, data.height));
        self.stats.textures_created += 1;
        self.stats.live_textures = self.live.len();
        Ok(id)
    }

    fn destroy_texture(&mut self, id: TextureId) -> bool {
        let removed = self.live.remove(&id).is_some();
        if removed {
            self.stats.textures_destroyed += 1;
            self.stats.live_textures = self.live.len();
        }
        removed
    }

    fn render(&mut self, frame: &FrameInput<'_>) -> Result<(), RenderError> {
        if self.disposed {
            return Err(RenderError::Disposed);
        }
        let mut drawn = 0;
        for object in frame.objects.iter().chain(frame.overlays) {
            object.traverse(&mut |node| {
                if node.node().visible {
                    drawn += 1;
                }
            });
        }
        self.last_draw_count = drawn;
        self.last_background = Some(frame.background);
        self.stats.frames += 1;
        Ok(())
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        let ids: Vec<TextureId> = self.live.keys().copied().collect();
        for id in ids {
            self.destroy_texture(id);
        }
        self.disposed = true;
    }

    fn stats(&self) -> BackendStats {
        self.stats
    }
}
