use crate::occlusion_scene::RETICLE_RADIUS_METERS;
use crate::occlusion_scene::hit_test::DepthSurfaces;
use crate::occlusion_scene::input::{ViewerCamera, pointer_ray};
use bevy::prelude::*;
use bevy::window::PrimaryWindow;

/// The live, sensor-derived surface. Its mesh asset is rebuilt in place by
/// whoever owns depth sensing; readers always go through `Assets<Mesh>`.
#[derive(Component, Debug, Default)]
pub struct DepthMesh {
    pub reticle_visible: bool,
}

/// Geometry that takes part in placement hit tests.
#[derive(Component, Debug, Default)]
pub struct HitSurface;

pub fn show_reticle_on_depth_mesh(mut depth_meshes: Query<&mut DepthMesh>) {
    for mut depth_mesh in &mut depth_meshes {
        depth_mesh.reticle_visible = true;
    }
}

pub fn draw_depth_reticle(
    mut gizmos: Gizmos,
    windows: Query<&Window, With<PrimaryWindow>>,
    cameras: Query<(&Camera, &GlobalTransform), With<ViewerCamera>>,
    surfaces: DepthSurfaces,
) {
    let Some((depth_entity, depth_mesh)) = surfaces.depth_mesh() else {
        return;
    };
    if !depth_mesh.reticle_visible {
        return;
    }
    let Ok(window) = windows.single() else {
        return;
    };
    let Some(cursor) = window.cursor_position() else {
        return;
    };
    let Ok((camera, camera_transform)) = cameras.single() else {
        return;
    };
    let Some(ray) = pointer_ray(camera, camera_transform, cursor) else {
        return;
    };
    let Some(hit) = surfaces.cast(ray) else {
        return;
    };
    if hit.entity != depth_entity || hit.normal == Vec3::ZERO {
        return;
    }

    let rotation = Quat::from_rotation_arc(Vec3::Z, hit.normal);
    let center = hit.point + hit.normal * 0.002;
    gizmos.circle(
        Isometry3d::new(center, rotation),
        RETICLE_RADIUS_METERS,
        Color::srgba(1.0, 1.0, 1.0, 0.85),
    );
    gizmos.circle(
        Isometry3d::new(center, rotation),
        RETICLE_RADIUS_METERS * 0.35,
        Color::srgba(1.0, 1.0, 1.0, 0.6),
    );
}
