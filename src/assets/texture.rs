use super::LoadError;
use crate::render::{PixelData, TextureData, TextureMapping};
use std::path::Path;

/// Image formats accepted as material maps.
pub const TEXTURE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// Extension check only; the file is not opened.
pub fn is_texture_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            TEXTURE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Decode an image file into RGBA8 for use as a material map.
pub fn decode_texture(path: &Path) -> Result<TextureData, LoadError> {
    let image = image::open(path).map_err(|err| decode_error(path, err))?;
    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(TextureData {
        width,
        height,
        pixels: PixelData::Rgba8(rgba.into_raw()),
        mapping: TextureMapping::Uv,
    })
}

/// Decode a Radiance HDR (or any float-capable format) as an equirectangular environment.
pub fn decode_environment(path: &Path) -> Result<TextureData, LoadError> {
    let image = image::open(path).map_err(|err| decode_error(path, err))?;
    let rgba = image.to_rgba32f();
    let (width, height) = rgba.dimensions();
    Ok(TextureData {
        width,
        height,
        pixels: PixelData::Rgba32F(rgba.into_raw()),
        mapping: TextureMapping::Equirectangular,
    })
}

fn decode_error(path: &Path, err: image::ImageError) -> LoadError {
    match err {
        image::ImageError::IoError(io) => LoadError::Read {
            path: path.display().to_string(),
            message: io.to_string(),
        },
        other => LoadError::Decode {
            path: path.display().to_string(),
            message: other.to_string(),
        },
    }
}
