pub mod app;
pub mod asset_load;
pub mod config;
pub mod depth_mesh;
pub mod diagnostics;
pub mod input;
pub mod occlusion;
pub mod placement;
pub mod simulator;
pub mod splat;
pub mod ui;

pub const CONFIG_PATH: &str = "config/occlusion_scene.ron";
pub const ASSETS_ROOT_DEFAULT: &str = "assets";
pub const DEFAULT_INSTRUCTION_TEXT: &str = "Pinch to place building";
pub const OCCLUDABLE_ITEMS_LAYER: usize = 4;
pub const RETICLE_RADIUS_METERS: f32 = 0.06;
