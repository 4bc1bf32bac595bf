use crate::occlusion_scene::{ASSETS_ROOT_DEFAULT, CONFIG_PATH, DEFAULT_INSTRUCTION_TEXT};
use anyhow::{Result, bail};
use bevy::prelude::{EulerRot, Quat, Resource, Transform, Vec3};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: ron::error::SpannedError,
    },
}

/// One loadable asset. The first entry of [`SceneConfig::assets`] is the
/// session's active descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetDescriptor {
    #[serde(default)]
    pub uri: String,
    #[serde(default = "default_asset_scale")]
    pub scale: [f32; 3],
    #[serde(default = "default_asset_rotation")]
    pub rotation_degrees: [f32; 3],
}

fn default_asset_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

fn default_asset_rotation() -> [f32; 3] {
    [0.0, 180.0, 0.0]
}

impl AssetDescriptor {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            scale: default_asset_scale(),
            rotation_degrees: default_asset_rotation(),
        }
    }

    pub fn is_malformed(&self) -> bool {
        self.uri.trim().is_empty()
    }

    pub fn scale_vec3(&self) -> Vec3 {
        Vec3::from_array(self.scale)
    }

    pub fn rotation(&self) -> Quat {
        let [x, y, z] = self.rotation_degrees;
        Quat::from_euler(EulerRot::XYZ, x.to_radians(), y.to_radians(), z.to_radians())
    }

    /// Local transform of the content attached under the placeable.
    pub fn local_transform(&self) -> Transform {
        Transform::from_scale(self.scale_vec3()).with_rotation(self.rotation())
    }
}

impl Default for AssetDescriptor {
    fn default() -> Self {
        Self::new(String::new())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    pub position: [f32; 3],
    pub illuminance: f32,
    pub shadows: bool,
    pub shadow_map_size: usize,
    pub ambient_brightness: f32,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            position: [0.0, 500.0, -10.0],
            illuminance: 8_000.0,
            shadows: true,
            shadow_map_size: 2048,
            ambient_brightness: 600.0,
        }
    }
}

impl LightConfig {
    pub fn position_vec3(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub room_width: f32,
    pub room_depth: f32,
    pub wall_height: f32,
    pub eye_height: f32,
    pub refresh_interval_secs: f32,
    pub surface_jitter: f32,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            room_width: 8.0,
            room_depth: 8.0,
            wall_height: 2.8,
            eye_height: 1.6,
            refresh_interval_secs: 0.5,
            surface_jitter: 0.004,
        }
    }
}

#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub assets_root: String,
    pub assets: Vec<AssetDescriptor>,
    pub instruction_text: String,
    pub light: LightConfig,
    pub simulator: SimulatorConfig,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            assets_root: ASSETS_ROOT_DEFAULT.to_string(),
            assets: vec![AssetDescriptor::new("splats/house.splat")],
            instruction_text: DEFAULT_INSTRUCTION_TEXT.to_string(),
            light: LightConfig::default(),
            simulator: SimulatorConfig::default(),
        }
    }
}

impl SceneConfig {
    /// The single descriptor loaded this session. An empty asset list yields a
    /// malformed descriptor so the failure surfaces through the load pipeline.
    pub fn active_asset(&self) -> AssetDescriptor {
        self.assets.first().cloned().unwrap_or_default()
    }

    pub fn override_active_uri(&mut self, uri: String) {
        match self.assets.first_mut() {
            Some(descriptor) => descriptor.uri = uri,
            None => self.assets.push(AssetDescriptor::new(uri)),
        }
    }
}

pub fn parse_scene_config(text: &str, source: &str) -> Result<SceneConfig, ConfigError> {
    ron::de::from_str::<SceneConfig>(text).map_err(|err| ConfigError::Parse {
        path: source.to_string(),
        source: err,
    })
}

pub fn load_scene_config(path: &Path) -> Result<SceneConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|err| ConfigError::Read {
        path: path.display().to_string(),
        source: err,
    })?;
    parse_scene_config(&text, &path.display().to_string())
}

/// Warnings gathered before the app (and its log subscriber) exists; reported
/// on the operator channel at startup.
#[derive(Resource, Debug, Default, Clone)]
pub struct StartupWarnings(pub Vec<String>);

pub fn load_initial_config(options: &CliOptions) -> (SceneConfig, StartupWarnings) {
    let mut warnings = Vec::new();
    let mut config = match load_scene_config(&options.config_path) {
        Ok(config) => config,
        Err(err) => {
            warnings.push(format!("Falling back to built-in scene config: {err}"));
            SceneConfig::default()
        }
    };

    if let Some(uri) = options.asset_uri.clone() {
        config.override_active_uri(uri);
    }

    (config, StartupWarnings(warnings))
}

#[derive(Debug, Clone, PartialEq)]
pub struct CliOptions {
    pub config_path: PathBuf,
    pub asset_uri: Option<String>,
    pub show_help: bool,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(CONFIG_PATH),
            asset_uri: None,
            show_help: false,
        }
    }
}

pub fn parse_cli_options() -> Result<CliOptions> {
    parse_cli_args(env::args().skip(1))
}

pub fn parse_cli_args(args: impl IntoIterator<Item = String>) -> Result<CliOptions> {
    let mut options = CliOptions::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let Some(value) = args.next() else {
                    bail!("{arg} expects a path");
                };
                options.config_path = PathBuf::from(value);
            }
            "--asset" | "-a" => {
                let Some(value) = args.next() else {
                    bail!("{arg} expects an asset uri");
                };
                options.asset_uri = Some(value);
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            _ => bail!("unknown option: {arg}"),
        }
    }

    Ok(options)
}

pub fn cli_help() -> &'static str {
    "Usage:\n  depth-anchor [options]\n\nOptions:\n  -c, --config <path>   Scene config (.ron), default config/occlusion_scene.ron\n  -a, --asset <uri>     Replace the active asset uri\n  -h, --help            Show this help"
}
