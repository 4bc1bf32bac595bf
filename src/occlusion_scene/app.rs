use crate::occlusion_scene::asset_load::{AssetLoadPipeline, FileAssetSource};
use crate::occlusion_scene::config::{CliOptions, SceneConfig, load_initial_config};
use crate::occlusion_scene::depth_mesh::{draw_depth_reticle, show_reticle_on_depth_mesh};
use crate::occlusion_scene::diagnostics::{OperatorChannel, report_startup_warnings};
use crate::occlusion_scene::input::{
    ControllerSelectStart, PlacementRay, controller_placement_rays, pointer_placement_rays,
};
use crate::occlusion_scene::placement::{
    attach_loaded_assets, process_placement_rays, request_active_asset_load, spawn_placeable,
};
use crate::occlusion_scene::simulator::{
    SimulatorStarted, move_simulator_viewer, refresh_simulated_depth_mesh, simulate_pinch_select,
    spawn_simulated_room, spawn_simulator_viewer,
};
use crate::occlusion_scene::ui::{
    InstructionText, reset_instruction_on_simulator_start, spawn_instruction_panel,
    sync_instruction_label,
};
use bevy::light::DirectionalLightShadowMap;
use bevy::prelude::*;
use bevy::window::{PresentMode, Window, WindowPlugin, WindowResolution};

const SKY_COLOR: Color = Color::srgb(0.733, 0.733, 0.733);
const GROUND_COLOR: Color = Color::srgb(0.533, 0.533, 0.533);
const GROUND_BOUNCE_FRACTION: f32 = 0.15;

/// Sun at the configured position, plus an unshadowed upward fill in the
/// ground colour. With the sky-tinted ambient light the pair stands in for a
/// sky/ground hemisphere light.
pub fn spawn_lights(mut commands: Commands, config: Res<SceneConfig>) {
    let light = &config.light;
    commands.spawn((
        Name::new("Sun"),
        DirectionalLight {
            shadows_enabled: light.shadows,
            illuminance: light.illuminance,
            ..default()
        },
        Transform::from_translation(light.position_vec3()).looking_at(Vec3::ZERO, Vec3::Y),
    ));
    commands.spawn((
        Name::new("Ground bounce"),
        DirectionalLight {
            color: GROUND_COLOR,
            shadows_enabled: false,
            illuminance: light.illuminance * GROUND_BOUNCE_FRACTION,
            ..default()
        },
        Transform::from_xyz(0.0, -1.0, 0.0).looking_at(Vec3::ZERO, Vec3::Z),
    ));
}

pub fn run(options: &CliOptions) {
    let (config, warnings) = load_initial_config(options);
    let pipeline = AssetLoadPipeline::new(FileAssetSource::new(config.assets_root.clone()));

    App::new()
        .add_plugins(DefaultPlugins.set(WindowPlugin {
            primary_window: Some(Window {
                title: "depth-anchor".into(),
                resolution: WindowResolution::new(1280, 800),
                present_mode: PresentMode::AutoVsync,
                ..default()
            }),
            ..default()
        }))
        .insert_resource(DirectionalLightShadowMap {
            size: config.light.shadow_map_size,
        })
        .insert_resource(GlobalAmbientLight {
            color: SKY_COLOR,
            brightness: config.light.ambient_brightness,
            affects_lightmapped_meshes: true,
        })
        .insert_resource(InstructionText::new(config.instruction_text.clone()))
        .insert_resource(OperatorChannel::default())
        .insert_resource(warnings)
        .insert_resource(config)
        .insert_non_send_resource(pipeline)
        .add_message::<PlacementRay>()
        .add_message::<ControllerSelectStart>()
        .add_message::<SimulatorStarted>()
        .add_systems(
            Startup,
            (
                report_startup_warnings,
                spawn_simulator_viewer,
                spawn_lights,
                (spawn_simulated_room, show_reticle_on_depth_mesh).chain(),
                spawn_placeable,
                spawn_instruction_panel,
                request_active_asset_load,
            ),
        )
        .add_systems(
            Update,
            (
                move_simulator_viewer,
                pointer_placement_rays,
                simulate_pinch_select,
                controller_placement_rays,
                attach_loaded_assets,
                process_placement_rays,
            )
                .chain(),
        )
        .add_systems(Update, refresh_simulated_depth_mesh)
        .add_systems(Update, draw_depth_reticle.after(move_simulator_viewer))
        .add_systems(
            Update,
            (reset_instruction_on_simulator_start, sync_instruction_label).chain(),
        )
        .run();
}
