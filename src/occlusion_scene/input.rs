use bevy::input::touch::Touches;
use bevy::prelude::*;
use bevy::window::PrimaryWindow;

/// The camera whose pose stands in for the viewer's head.
#[derive(Component, Debug, Default)]
pub struct ViewerCamera;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Pointer,
    Controller,
}

/// A candidate placement gesture, already turned into a world-space ray.
#[derive(Message, Debug, Clone, Copy)]
pub struct PlacementRay {
    pub ray: Ray3d,
    pub source: InputSource,
}

/// Select-start from a controller or hand-tracking pinch, carrying the ray the
/// gesture subsystem computed.
#[derive(Message, Debug, Clone, Copy)]
pub struct ControllerSelectStart {
    pub ray: Ray3d,
}

/// World ray through a pointer position given in logical viewport pixels.
/// `None` until the camera's viewport and projection have been computed.
pub fn pointer_ray(
    camera: &Camera,
    camera_transform: &GlobalTransform,
    position: Vec2,
) -> Option<Ray3d> {
    camera.viewport_to_world(camera_transform, position).ok()
}

pub fn pointer_placement_rays(
    mouse_buttons: Res<ButtonInput<MouseButton>>,
    touches: Res<Touches>,
    windows: Query<&Window, With<PrimaryWindow>>,
    cameras: Query<(&Camera, &GlobalTransform), With<ViewerCamera>>,
    mut rays: MessageWriter<PlacementRay>,
) {
    let Ok(window) = windows.single() else {
        return;
    };
    let Ok((camera, camera_transform)) = cameras.single() else {
        return;
    };

    let mut positions: Vec<Vec2> = touches.iter_just_pressed().map(|t| t.position()).collect();
    if mouse_buttons.just_pressed(MouseButton::Left) {
        positions.extend(window.cursor_position());
    }

    for position in positions {
        if let Some(ray) = pointer_ray(camera, camera_transform, position) {
            rays.write(PlacementRay {
                ray,
                source: InputSource::Pointer,
            });
        }
    }
}

pub fn controller_placement_rays(
    mut selects: MessageReader<ControllerSelectStart>,
    mut rays: MessageWriter<PlacementRay>,
) {
    for select in selects.read() {
        rays.write(PlacementRay {
            ray: select.ray,
            source: InputSource::Controller,
        });
    }
}
