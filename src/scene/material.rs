use crate::render::TextureId;
use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_MATERIAL_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(u64);

impl fmt::Display for MaterialId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mat#{}", self.0)
    }
}

/// Linear RGB color with components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xFF) as f32 / 255.0,
            g: ((hex >> 8) & 0xFF) as f32 / 255.0,
            b: (hex & 0xFF) as f32 / 255.0,
        }
    }

    /// Parses `#rrggbb` (the leading `#` is optional).
    pub fn parse_hex(text: &str) -> Option<Self> {
        let digits = text.trim().trim_start_matches('#');
        if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        u32::from_str_radix(digits, 16).ok().map(Self::from_hex)
    }

    pub fn to_hex(&self) -> u32 {
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
        (channel(self.r) << 16) | (channel(self.g) << 8) | channel(self.b)
    }

    pub fn to_hex_string(&self) -> String {
        format!("#{:06x}", self.to_hex())
    }

    pub fn to_array(&self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialCapabilities {
    pub base_color_map: bool,
    pub normal_map: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialKind {
    Basic,
    Lambert,
    Phong,
    Standard,
    Physical,
    Toon,
    Depth,
    Normal,
    Line,
}

impl MaterialKind {
    pub fn capabilities(self) -> MaterialCapabilities {
        match self {
            Self::Basic => MaterialCapabilities {
                base_color_map: true,
                normal_map: false,
            },
            Self::Lambert | Self::Phong | Self::Standard | Self::Physical | Self::Toon => {
                MaterialCapabilities {
                    base_color_map: true,
                    normal_map: true,
                }
            }
            Self::Depth | Self::Normal | Self::Line => MaterialCapabilities {
                base_color_map: false,
                normal_map: false,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub kind: MaterialKind,
    pub color: Color,
    pub opacity: f32,
    pub transparent: bool,
    pub map: Option<TextureId>,
    pub normal_map: Option<TextureId>,
}

impl Material {
    pub fn new(kind: MaterialKind) -> Self {
        Self {
            name: String::new(),
            kind,
            color: Color::WHITE,
            opacity: 1.0,
            transparent: false,
            map: None,
            normal_map: None,
        }
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = color;
        self
    }
}

#[derive(Debug)]
struct MaterialCell {
    material: Material,
    version: u64,
}

/// Shared material. Every mutation through [`MaterialHandle::update`] bumps the
/// version so the renderer knows to refresh its copy.
#[derive(Debug, Clone)]
pub struct MaterialHandle {
    id: MaterialId,
    cell: Rc<RefCell<MaterialCell>>,
}

impl PartialEq for MaterialHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl MaterialHandle {
    pub fn new(material: Material) -> Self {
        Self {
            id: MaterialId(NEXT_MATERIAL_ID.fetch_add(1, Ordering::Relaxed)),
            cell: Rc::new(RefCell::new(MaterialCell {
                material,
                version: 0,
            })),
        }
    }

    pub fn id(&self) -> MaterialId {
        self.id
    }

    pub fn get(&self) -> Ref<'_, Material> {
        Ref::map(self.cell.borrow(), |cell| &cell.material)
    }

    pub fn kind(&self) -> MaterialKind {
        self.cell.borrow().material.kind
    }

    pub fn capabilities(&self) -> MaterialCapabilities {
        self.kind().capabilities()
    }

    pub fn version(&self) -> u64 {
        self.cell.borrow().version
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut Material) -> R) -> R {
        let mut cell = self.cell.borrow_mut();
        let out = f(&mut cell.material);
        cell.version += 1;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_colors_parse_and_format() {
        let color = Color::parse_hex("#3498DB").unwrap();
        assert_eq!(color.to_hex(), 0x3498db);
        assert_eq!(color.to_hex_string(), "#3498db");
        assert_eq!(Color::parse_hex("3498db"), Some(color));
        assert!(Color::parse_hex("#34").is_none());
        assert!(Color::parse_hex("#zzzzzz").is_none());
    }

    #[test]
    fn flat_and_utility_kinds_lack_normal_maps() {
        assert!(MaterialKind::Basic.capabilities().base_color_map);
        assert!(!MaterialKind::Basic.capabilities().normal_map);
        assert!(MaterialKind::Standard.capabilities().normal_map);
        assert!(MaterialKind::Toon.capabilities().normal_map);
        assert!(!MaterialKind::Depth.capabilities().base_color_map);
    }

    #[test]
    fn update_bumps_version() {
        let material = MaterialHandle::new(Material::new(MaterialKind::Phong));
        assert_eq!(material.version(), 0);
        material.update(|m| m.opacity = 0.5);
        assert_eq!(material.version(), 1);
        assert_eq!(material.get().opacity, 0.5);
    }
}
