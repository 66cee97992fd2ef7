use glam::{EulerRot, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use vista_camera::FlyCamera;
use vista_runtime::{MeshSetup, RuntimeSetup, SceneSetup};

pub const DEFAULT_CONFIG_PATH: &str = "vista.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSection {
    pub title: String,
    pub fps: u64,
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            title: "Vista".into(),
            fps: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSection {
    pub eye: [f32; 3],
    pub yaw_degrees: f32,
    pub pitch_degrees: f32,
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub speed: f32,
}

impl Default for CameraSection {
    fn default() -> Self {
        Self {
            eye: [0.0, 0.0, 3.0],
            yaw_degrees: 90.0,
            pitch_degrees: 0.0,
            fov_y_degrees: 45.0,
            near: 0.1,
            far: 100.0,
            speed: 3.0,
        }
    }
}

impl CameraSection {
    pub fn to_camera(&self) -> FlyCamera {
        FlyCamera::new(
            Vec3::from_array(self.eye),
            self.yaw_degrees.to_radians(),
            self.pitch_degrees.to_radians(),
        )
        .with_lens(self.fov_y_degrees.to_radians(), self.near, self.far)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: "info".into(),
        }
    }
}

/// Scale, then rotate (yaw, pitch, roll order), then translate.
///
/// Scale is a single factor. The shader moves normals with the
/// world-view matrix, which is only correct for uniform scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformSection {
    pub translation: [f32; 3],
    pub rotation_degrees: [f32; 3],
    pub scale: f32,
}

impl Default for TransformSection {
    fn default() -> Self {
        Self {
            translation: [0.0; 3],
            rotation_degrees: [0.0; 3],
            scale: 1.0,
        }
    }
}

impl TransformSection {
    pub fn to_mat4(&self) -> Mat4 {
        let [x, y, z] = self.rotation_degrees.map(f32::to_radians);
        Mat4::from_scale_rotation_translation(
            Vec3::splat(self.scale),
            Quat::from_euler(EulerRot::YXZ, y, x, z),
            Vec3::from_array(self.translation),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshEntry {
    pub path: PathBuf,
    #[serde(flatten)]
    pub transform: TransformSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneSection {
    /// Recorded on the scene graph. Put actual scaling into `world.scale`.
    pub scaling: f32,
    pub world: TransformSection,
    pub meshes: Vec<MeshEntry>,
}

impl Default for SceneSection {
    fn default() -> Self {
        Self {
            scaling: 1.0,
            world: TransformSection::default(),
            meshes: vec![MeshEntry {
                path: PathBuf::from("assets/BoomBox.glb"),
                transform: TransformSection::default(),
            }],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub window: WindowSection,
    pub camera: CameraSection,
    pub logging: LoggingSection,
    pub scene: SceneSection,
}

impl ViewerConfig {
    /// Reads `path`. A missing file is `Ok(None)`.
    pub fn load(path: impl AsRef<Path>) -> Result<Option<Self>, ConfigError> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Some(config))
    }

    /// Relative mesh paths are resolved against `base_dir`, normally the
    /// directory holding the config file.
    pub fn runtime_setup(&self, base_dir: &Path) -> RuntimeSetup {
        let meshes = self
            .scene
            .meshes
            .iter()
            .map(|m| MeshSetup {
                path: if m.path.is_absolute() {
                    m.path.clone()
                } else {
                    base_dir.join(&m.path)
                },
                position: m.transform.to_mat4(),
            })
            .collect();

        RuntimeSetup {
            scene: SceneSetup {
                world: self.scene.world.to_mat4(),
                scaling: self.scene.scaling,
                meshes,
            },
            camera: self.camera.to_camera(),
            camera_speed: self.camera.speed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[window]
title = "Yard"

[camera]
eye = [1.0, 2.0, 3.0]
speed = 6.0

[scene]
scaling = 0.5

[scene.world]
scale = 2.0

[[scene.meshes]]
path = "crate.glb"
translation = [1.0, 0.0, 0.0]

[[scene.meshes]]
path = "/abs/tree.gltf"
rotation_degrees = [0.0, 90.0, 0.0]
"#;

    #[test]
    fn missing_sections_take_defaults() {
        let cfg: ViewerConfig = toml::from_str(SAMPLE).unwrap();
        assert_eq!(cfg.window.title, "Yard");
        assert_eq!(cfg.window.fps, 120);
        assert_eq!(cfg.camera.eye, [1.0, 2.0, 3.0]);
        assert_eq!(cfg.camera.near, 0.1);
        assert_eq!(cfg.logging, LoggingSection::default());
        assert_eq!(cfg.scene.meshes.len(), 2);
        assert_eq!(cfg.scene.meshes[0].transform.scale, 1.0);
    }

    #[test]
    fn empty_file_is_the_default_config() {
        let cfg: ViewerConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, ViewerConfig::default());
    }

    #[test]
    fn runtime_setup_resolves_paths_and_transforms() {
        let cfg: ViewerConfig = toml::from_str(SAMPLE).unwrap();
        let setup = cfg.runtime_setup(Path::new("scenes"));

        assert_eq!(setup.scene.scaling, 0.5);
        assert_eq!(setup.camera_speed, 6.0);
        assert_eq!(setup.scene.world, Mat4::from_scale(Vec3::splat(2.0)));
        assert_eq!(setup.scene.meshes[0].path, Path::new("scenes").join("crate.glb"));
        assert_eq!(
            setup.scene.meshes[0].position,
            Mat4::from_translation(Vec3::X)
        );

        let turned = setup.scene.meshes[1].position.transform_vector3(Vec3::X);
        assert!(turned.abs_diff_eq(Vec3::NEG_Z, 1e-6));
    }

    #[test]
    fn per_axis_scale_is_rejected() {
        let text = "[scene.world]\nscale = [1.0, 2.0, 3.0]\n";
        assert!(toml::from_str::<ViewerConfig>(text).is_err());
    }

    #[test]
    fn scale_is_applied_evenly() {
        let section = TransformSection {
            scale: 3.0,
            ..TransformSection::default()
        };
        assert_eq!(section.to_mat4(), Mat4::from_scale(Vec3::splat(3.0)));
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let loaded = ViewerConfig::load("no/such/vista.toml").unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn parse_error_names_the_file() {
        let path = std::env::temp_dir().join(format!("vista-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[window\ntitle = 3").unwrap();
        let err = ViewerConfig::load(&path).unwrap_err();
        std::fs::remove_file(&path).ok();

        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("vista-bad-"));
    }
}
