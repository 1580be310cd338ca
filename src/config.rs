use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_ENV_VAR: &str = "SCENEDIT_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("default environment map '{0}' is not in the catalog")]
    UnknownDefaultEnvironment(String),
    #[error("import max_dimension must be a positive number, got {0}")]
    InvalidMaxDimension(f32),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub fov_y_deg: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
    pub damping: f32,
    pub max_pixel_ratio: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y_deg: 75.0,
            near: 0.1,
            far: 1000.0,
            position: [5.0, 5.0, 5.0],
            damping: 0.05,
            max_pixel_ratio: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// `#rrggbb` clear color shown before any environment background.
    pub background: String,
    pub grid_size: u32,
    pub grid_divisions: u32,
    pub axes_size: u32,
    pub test_cubes: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            background: "#1e1f22".to_string(),
            grid_size: 10,
            grid_divisions: 10,
            axes_size: 5,
            test_cubes: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    /// Pixels of movement per axis before a press stops being a click.
    pub click_threshold: f32,
    pub gizmo_size: f32,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            click_threshold: 5.0,
            gizmo_size: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub max_dimension: f32,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self { max_dimension: 10.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentEntry {
    pub name: String,
    /// Relative to `asset_root`.
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub catalog: Vec<EnvironmentEntry>,
    pub default_map: String,
    /// Flat color used when the environment background is switched off.
    pub background_off: String,
    /// Whether the default map also becomes the background once loaded.
    pub background_visible: bool,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        let entry = |name: &str| EnvironmentEntry {
            name: name.to_string(),
            path: PathBuf::from(format!("envmaps/{name}.hdr")),
        };
        Self {
            catalog: vec![
                entry("studio_small_09"),
                entry("rainforest_trail"),
                entry("rogland_clear_night"),
            ],
            default_map: "studio_small_09".to_string(),
            background_off: "#2b2d31".to_string(),
            background_visible: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderMode {
    Threaded,
    Inline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    pub mode: LoaderMode,
    pub workers: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            mode: LoaderMode::Threaded,
            workers: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub asset_root: PathBuf,
    pub camera: CameraConfig,
    pub scene: SceneConfig,
    pub controls: ControlsConfig,
    pub import: ImportConfig,
    pub environment: EnvironmentConfig,
    pub loader: LoaderConfig,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("."),
            camera: CameraConfig::default(),
            scene: SceneConfig::default(),
            controls: ControlsConfig::default(),
            import: ImportConfig::default(),
            environment: EnvironmentConfig::default(),
            loader: LoaderConfig::default(),
        }
    }
}

impl EditorConfig {
    /// No worker threads, no test cubes and an empty environment catalog.
    pub fn headless() -> Self {
        let mut config = Self::default();
        config.loader.mode = LoaderMode::Inline;
        config.scene.test_cubes = false;
        config.environment.catalog.clear();
        config.environment.default_map.clear();
        config
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads the file named by `SCENEDIT_CONFIG`, or falls back to defaults.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => {
                let path = PathBuf::from(path);
                log::info!("Loading editor config from {}", path.display());
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let known = self
            .environment
            .catalog
            .iter()
            .any(|entry| entry.name == self.environment.default_map);
        if !self.environment.default_map.is_empty() && !known {
            return Err(ConfigError::UnknownDefaultEnvironment(
                self.environment.default_map.clone(),
            ));
        }
        let cap = self.import.max_dimension;
        if !cap.is_finite() || cap <= 0.0 {
            return Err(ConfigError::InvalidMaxDimension(cap));
        }
        Ok(())
    }

    pub fn resolve_asset(&self, relative: &Path) -> PathBuf {
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.asset_root.join(relative)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_editor_conventions() {
        let config = EditorConfig::default();
        assert_eq!(config.controls.click_threshold, 5.0);
        assert_eq!(config.controls.gizmo_size, 0.5);
        assert_eq!(config.import.max_dimension, 10.0);
        assert_eq!(config.environment.catalog.len(), 3);
        assert_eq!(config.environment.default_map, "studio_small_09");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "import": {{ "max_dimension": 4.0 }}, "loader": {{ "mode": "inline" }} }}"#
        )
        .unwrap();
        let config = EditorConfig::load(file.path()).unwrap();
        assert_eq!(config.import.max_dimension, 4.0);
        assert_eq!(config.loader.mode, LoaderMode::Inline);
        assert_eq!(config.loader.workers, 2);
        assert_eq!(config.camera.fov_y_deg, 75.0);
    }

    #[test]
    fn unknown_default_environment_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "environment": {{ "default_map": "nope" }} }}"#).unwrap();
        let err = EditorConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownDefaultEnvironment(name) if name == "nope"));
    }

    #[test]
    fn non_positive_import_cap_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "import": {{ "max_dimension": -2.0 }} }}"#).unwrap();
        let err = EditorConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMaxDimension(cap) if cap == -2.0));

        let mut config = EditorConfig::default();
        config.import.max_dimension = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn malformed_json_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let err = EditorConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));
    }
}
