//! glTF 2.0 (`.gltf` and `.glb`) loader.

use super::import::{ModelData, ModelLoader, ModelMaterial, ModelMesh, ModelNode};
use super::LoadError;
use crate::render::TextureData;
use crate::scene::{Aabb, Color, MaterialKind, Transform};
use glam::{EulerRot, Quat, Vec3};
use std::path::Path;

#[derive(Debug, Default, Clone, Copy)]
pub struct GltfModelLoader;

impl ModelLoader for GltfModelLoader {
    fn load(&self, path: &Path) -> Result<ModelData, LoadError> {
        let (document, _buffers, images) = gltf::import(path).map_err(|err| match err {
            gltf::Error::Io(io) => LoadError::Read {
                path: path.display().to_string(),
                message: io.to_string(),
            },
            other => LoadError::Decode {
                path: path.display().to_string(),
                message: other.to_string(),
            },
        })?;

        let materials = document
            .materials()
            .map(|material| convert_material(&material, &images))
            .collect();

        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next());
        let (name, nodes) = match scene {
            Some(scene) => (
                scene.name().map(str::to_string),
                scene.nodes().map(|node| convert_node(&node)).collect(),
            ),
            None => (None, Vec::new()),
        };

        Ok(ModelData {
            name,
            nodes,
            materials,
        })
    }
}

fn convert_node(node: &gltf::Node<'_>) -> ModelNode {
    let (translation, rotation, scale) = node.transform().decomposed();
    let (x, y, z) = Quat::from_array(rotation).to_euler(EulerRot::XYZ);
    let transform = Transform {
        position: Vec3::from_array(translation),
        rotation: Vec3::new(x, y, z),
        scale: Vec3::from_array(scale),
    };

    let meshes = node
        .mesh()
        .map(|mesh| {
            mesh.primitives()
                .map(|primitive| {
                    let bounds = primitive.bounding_box();
                    ModelMesh {
                        bounds: Aabb::new(Vec3::from_array(bounds.min), Vec3::from_array(bounds.max)),
                        material: primitive.material().index(),
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    ModelNode {
        name: node
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("node_{}", node.index())),
        transform,
        meshes,
        children: node.children().map(|child| convert_node(&child)).collect(),
    }
}

fn convert_material(material: &gltf::Material<'_>, images: &[gltf::image::Data]) -> ModelMaterial {
    let pbr = material.pbr_metallic_roughness();
    let [r, g, b, a] = pbr.base_color_factor();
    let texture_image = |index: usize| images.get(index).and_then(to_rgba8);

    ModelMaterial {
        name: material.name().unwrap_or_default().to_string(),
        kind: MaterialKind::Standard,
        color: Color::rgb(r, g, b),
        opacity: a,
        transparent: material.alpha_mode() == gltf::material::AlphaMode::Blend,
        base_color_texture: pbr
            .base_color_texture()
            .and_then(|info| texture_image(info.texture().source().index())),
        normal_texture: material
            .normal_texture()
            .and_then(|normal| texture_image(normal.texture().source().index())),
    }
}

/// Expand any 8/16/32-bit glTF image to RGBA8. 16-bit and float channels are
/// reduced to their top 8 bits / clamped to `[0, 1]`.
fn to_rgba8(image: &gltf::image::Data) -> Option<TextureData> {
    use gltf::image::Format;

    let (channels, bytes_per_channel) = match image.format {
        Format::R8 => (1, 1),
        Format::R8G8 => (2, 1),
        Format::R8G8B8 => (3, 1),
        Format::R8G8B8A8 => (4, 1),
        Format::R16 => (1, 2),
        Format::R16G16 => (2, 2),
        Format::R16G16B16 => (3, 2),
        Format::R16G16B16A16 => (4, 2),
        Format::R32G32B32FLOAT => (3, 4),
        Format::R32G32B32A32FLOAT => (4, 4),
        #[allow(unreachable_patterns)]
        _ => return None,
    };
    let texel_count = image.width as usize * image.height as usize;
    if image.pixels.len() != texel_count * channels * bytes_per_channel {
        return None;
    }

    let read = |chunk: &[u8]| -> u8 {
        match chunk.len() {
            1 => chunk[0],
            2 => (u16::from_ne_bytes([chunk[0], chunk[1]]) >> 8) as u8,
            _ => {
                let value = f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                (value.clamp(0.0, 1.0) * 255.0).round() as u8
            }
        }
    };

    let mut rgba = Vec::with_capacity(texel_count * 4);
    for texel in image.pixels.chunks_exact(channels * bytes_per_channel) {
        let mut out = [0u8, 0, 0, 255];
        for (index, chunk) in texel.chunks_exact(bytes_per_channel).enumerate() {
            out[index] = read(chunk);
        }
        if channels == 1 {
            out[1] = out[0];
            out[2] = out[0];
        }
        rgba.extend_from_slice(&out);
    }
    Some(TextureData::rgba8(image.width, image.height, rgba))
}

#[cfg(test)]
mod tests {
    use super::*;

    // One triangle: (0,0,0) (2,0,0) (0,4,0), as 9 little-endian f32s.
    const TRIANGLE_BUFFER: &str =
        "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAAAAQAAAAAAAAAAAAAAAAAAAgEAAAAAA";

    fn write_fixture(dir: &Path) -> std::path::PathBuf {
        let json = format!(
            r#"{{
  "asset": {{ "version": "2.0" }},
  "scene": 0,
  "scenes": [{{ "name": "Props", "nodes": [0] }}],
  "nodes": [{{ "name": "Wedge", "mesh": 0, "translation": [1.0, 0.0, 0.0], "scale": [2.0, 2.0, 2.0] }}],
  "meshes": [{{ "primitives": [{{ "attributes": {{ "POSITION": 0 }}, "material": 0 }}] }}],
  "materials": [{{
    "name": "Orange",
    "alphaMode": "BLEND",
    "pbrMetallicRoughness": {{ "baseColorFactor": [1.0, 0.5, 0.0, 0.25] }}
  }}],
  "buffers": [{{ "byteLength": 36, "uri": "{TRIANGLE_BUFFER}" }}],
  "bufferViews": [{{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }}],
  "accessors": [{{
    "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
    "min": [0.0, 0.0, 0.0], "max": [2.0, 4.0, 0.0]
  }}]
}}"#
        );
        let path = dir.join("wedge.gltf");
        std::fs::write(&path, json).unwrap();
        path
    }

    #[test]
    fn loads_nodes_bounds_and_materials() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(dir.path());
        let model = GltfModelLoader.load(&path).unwrap();

        assert_eq!(model.name.as_deref(), Some("Props"));
        assert_eq!(model.nodes.len(), 1);
        let node = &model.nodes[0];
        assert_eq!(node.name, "Wedge");
        assert_eq!(node.transform.position, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(node.transform.scale, Vec3::splat(2.0));
        assert_eq!(node.meshes.len(), 1);
        assert_eq!(node.meshes[0].bounds.max, Vec3::new(2.0, 4.0, 0.0));
        assert_eq!(node.meshes[0].material, Some(0));

        let material = &model.materials[0];
        assert_eq!(material.name, "Orange");
        assert!(material.transparent);
        assert_eq!(material.opacity, 0.25);
        assert_eq!(material.color.to_hex(), 0xff8000);
        assert!(material.base_color_texture.is_none());
    }

    #[test]
    fn missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = GltfModelLoader
            .load(&dir.path().join("absent.glb"))
            .unwrap_err();
        assert!(matches!(err, LoadError::Read { .. }));
    }

    #[test]
    fn malformed_json_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.gltf");
        std::fs::write(&path, "{ \"asset\": ").unwrap();
        let err = GltfModelLoader.load(&path).unwrap_err();
        assert!(matches!(err, LoadError::Decode { .. }));
    }

    #[test]
    fn grayscale_images_expand_to_rgba() {
        let data = gltf::image::Data {
            pixels: vec![0, 128],
            format: gltf::image::Format::R8,
            width: 2,
            height: 1,
        };
        let texture = to_rgba8(&data).unwrap();
        assert_eq!(
            texture.pixels,
            crate::render::PixelData::Rgba8(vec![0, 0, 0, 255, 128, 128, 128, 255])
        );
    }
}
