//! Desktop stand-in for the headset's depth sensing: a simulated room whose
//! mesh is rebuilt on a timer, plus a walkable viewer that can "pinch".

use crate::occlusion_scene::config::{SceneConfig, SimulatorConfig};
use crate::occlusion_scene::depth_mesh::{DepthMesh, HitSurface};
use crate::occlusion_scene::input::{ControllerSelectStart, ViewerCamera};
use crate::occlusion_scene::occlusion::viewer_layers;
use bevy::asset::RenderAssetUsages;
use bevy::input::mouse::AccumulatedMouseMotion;
use bevy::mesh::{Indices, PrimitiveTopology};
use bevy::prelude::*;
use tracing::info;

/// Written once the simulated depth mesh exists.
#[derive(Message, Debug, Clone, Copy, Default)]
pub struct SimulatorStarted;

#[derive(Resource, Debug)]
pub struct SimulatedDepthSensor {
    pub mesh: Handle<Mesh>,
    pub refresh: Timer,
}

#[derive(Component, Debug, Clone)]
pub struct SimulatorViewer {
    pub yaw: f32,
    pub pitch: f32,
    pub walk_speed: f32,
    pub look_sensitivity: f32,
}

impl Default for SimulatorViewer {
    fn default() -> Self {
        Self {
            yaw: 0.0,
            pitch: -0.35,
            walk_speed: 1.4,
            look_sensitivity: 0.004,
        }
    }
}

impl SimulatorViewer {
    pub fn rotation(&self) -> Quat {
        Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0)
    }
}

#[derive(Default)]
struct QuadBuffers {
    positions: Vec<[f32; 3]>,
    normals: Vec<[f32; 3]>,
    uvs: Vec<[f32; 2]>,
    indices: Vec<u32>,
}

impl QuadBuffers {
    fn add_quad(&mut self, mut corners: [Vec3; 4], expected_normal: Vec3, offset: f32) {
        let mut normal = (corners[1] - corners[0]).cross(corners[2] - corners[0]);
        if normal.dot(expected_normal) < 0.0 {
            corners = [corners[0], corners[3], corners[2], corners[1]];
            normal = (corners[1] - corners[0]).cross(corners[2] - corners[0]);
        }
        let normal = normal.normalize_or_zero();

        let base = self.positions.len() as u32;
        for corner in corners {
            let corner = corner + normal * offset;
            self.positions.push(corner.to_array());
            self.normals.push(normal.to_array());
        }
        self.uvs
            .extend_from_slice(&[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    fn into_mesh(self) -> Mesh {
        let mut mesh = Mesh::new(
            PrimitiveTopology::TriangleList,
            RenderAssetUsages::default(),
        );
        mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, self.positions);
        mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, self.normals);
        mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, self.uvs);
        mesh.insert_indices(Indices::U32(self.indices));
        mesh
    }
}

/// Sensor noise along the surface normal. Deterministic in `phase`.
fn surface_offset(jitter: f32, phase: f32, quad: usize) -> f32 {
    jitter * (phase * 2.3 + quad as f32 * 1.7).sin()
}

/// Floor, back wall, right wall and a low block, as one triangle-list mesh.
pub fn build_room_mesh(room: &SimulatorConfig, phase: f32) -> Mesh {
    let half_w = room.room_width * 0.5;
    let half_d = room.room_depth * 0.5;
    let height = room.wall_height;

    let block_center = Vec3::new(-half_w * 0.5, 0.0, -half_d * 0.5);
    let block_half = Vec3::new(0.5, 0.45, 0.3);
    let bx0 = block_center.x - block_half.x;
    let bx1 = block_center.x + block_half.x;
    let bz0 = block_center.z - block_half.z;
    let bz1 = block_center.z + block_half.z;
    let by = block_half.y;

    let quads = [
        (
            [
                Vec3::new(-half_w, 0.0, -half_d),
                Vec3::new(half_w, 0.0, -half_d),
                Vec3::new(half_w, 0.0, half_d),
                Vec3::new(-half_w, 0.0, half_d),
            ],
            Vec3::Y,
        ),
        (
            [
                Vec3::new(-half_w, 0.0, -half_d),
                Vec3::new(half_w, 0.0, -half_d),
                Vec3::new(half_w, height, -half_d),
                Vec3::new(-half_w, height, -half_d),
            ],
            Vec3::Z,
        ),
        (
            [
                Vec3::new(half_w, 0.0, -half_d),
                Vec3::new(half_w, 0.0, half_d),
                Vec3::new(half_w, height, half_d),
                Vec3::new(half_w, height, -half_d),
            ],
            Vec3::NEG_X,
        ),
        (
            [
                Vec3::new(bx0, by, bz0),
                Vec3::new(bx1, by, bz0),
                Vec3::new(bx1, by, bz1),
                Vec3::new(bx0, by, bz1),
            ],
            Vec3::Y,
        ),
        (
            [
                Vec3::new(bx0, 0.0, bz1),
                Vec3::new(bx1, 0.0, bz1),
                Vec3::new(bx1, by, bz1),
                Vec3::new(bx0, by, bz1),
            ],
            Vec3::Z,
        ),
        (
            [
                Vec3::new(bx0, 0.0, bz0),
                Vec3::new(bx1, 0.0, bz0),
                Vec3::new(bx1, by, bz0),
                Vec3::new(bx0, by, bz0),
            ],
            Vec3::NEG_Z,
        ),
        (
            [
                Vec3::new(bx1, 0.0, bz0),
                Vec3::new(bx1, 0.0, bz1),
                Vec3::new(bx1, by, bz1),
                Vec3::new(bx1, by, bz0),
            ],
            Vec3::X,
        ),
        (
            [
                Vec3::new(bx0, 0.0, bz0),
                Vec3::new(bx0, 0.0, bz1),
                Vec3::new(bx0, by, bz1),
                Vec3::new(bx0, by, bz0),
            ],
            Vec3::NEG_X,
        ),
    ];

    let mut buffers = QuadBuffers::default();
    for (index, (corners, normal)) in quads.into_iter().enumerate() {
        let offset = surface_offset(room.surface_jitter, phase, index);
        buffers.add_quad(corners, normal, offset);
    }
    buffers.into_mesh()
}

pub fn spawn_simulated_room(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    config: Res<SceneConfig>,
    mut started: MessageWriter<SimulatorStarted>,
) {
    let room = &config.simulator;
    let mesh = meshes.add(build_room_mesh(room, 0.0));
    let material = materials.add(StandardMaterial {
        base_color: Color::srgb(0.55, 0.57, 0.6),
        perceptual_roughness: 0.94,
        ..default()
    });

    commands.spawn((
        Name::new("Simulated depth mesh"),
        DepthMesh::default(),
        HitSurface,
        Mesh3d(mesh.clone()),
        MeshMaterial3d(material),
        Transform::default(),
    ));
    commands.insert_resource(SimulatedDepthSensor {
        mesh,
        refresh: Timer::from_seconds(room.refresh_interval_secs.max(0.05), TimerMode::Repeating),
    });

    info!(
        width = room.room_width,
        depth = room.room_depth,
        "depth simulator started"
    );
    started.write(SimulatorStarted);
}

/// Replaces the depth mesh asset in place; the entity and handle stay the same.
pub fn refresh_simulated_depth_mesh(
    time: Res<Time>,
    config: Res<SceneConfig>,
    sensor: Option<ResMut<SimulatedDepthSensor>>,
    mut meshes: ResMut<Assets<Mesh>>,
) {
    let Some(mut sensor) = sensor else {
        return;
    };
    if !sensor.refresh.tick(time.delta()).just_finished() {
        return;
    }

    if let Some(mesh) = meshes.get_mut(&sensor.mesh) {
        *mesh = build_room_mesh(&config.simulator, time.elapsed_secs());
    }
}

pub fn spawn_simulator_viewer(mut commands: Commands, config: Res<SceneConfig>) {
    let room = &config.simulator;
    let viewer = SimulatorViewer::default();
    commands.spawn((
        Name::new("Viewer"),
        Camera3d::default(),
        Transform::from_xyz(0.0, room.eye_height, room.room_depth * 0.25)
            .with_rotation(viewer.rotation()),
        viewer,
        ViewerCamera,
        viewer_layers(),
    ));
}

pub fn move_simulator_viewer(
    keys: Res<ButtonInput<KeyCode>>,
    mouse_buttons: Res<ButtonInput<MouseButton>>,
    mouse_motion: Res<AccumulatedMouseMotion>,
    time: Res<Time>,
    mut viewers: Query<(&mut Transform, &mut SimulatorViewer)>,
) {
    let Ok((mut transform, mut viewer)) = viewers.single_mut() else {
        return;
    };

    if mouse_buttons.pressed(MouseButton::Right) {
        let delta = mouse_motion.delta;
        viewer.yaw -= delta.x * viewer.look_sensitivity;
        viewer.pitch = (viewer.pitch - delta.y * viewer.look_sensitivity).clamp(-1.4, 1.4);
    }

    let yaw_rotation = Quat::from_rotation_y(viewer.yaw);
    let forward = yaw_rotation * -Vec3::Z;
    let right = yaw_rotation * Vec3::X;

    let mut movement = Vec3::ZERO;
    if keys.pressed(KeyCode::KeyW) {
        movement += forward;
    }
    if keys.pressed(KeyCode::KeyS) {
        movement -= forward;
    }
    if keys.pressed(KeyCode::KeyA) {
        movement -= right;
    }
    if keys.pressed(KeyCode::KeyD) {
        movement += right;
    }

    transform.translation += movement.normalize_or_zero() * viewer.walk_speed * time.delta_secs();
    transform.rotation = viewer.rotation();
}

/// `Space` stands in for a hand-tracking pinch along the viewer's gaze.
pub fn simulate_pinch_select(
    keys: Res<ButtonInput<KeyCode>>,
    viewers: Query<&GlobalTransform, With<ViewerCamera>>,
    mut selects: MessageWriter<ControllerSelectStart>,
) {
    if !keys.just_pressed(KeyCode::Space) {
        return;
    }
    let Ok(viewer) = viewers.single() else {
        return;
    };
    selects.write(ControllerSelectStart {
        ray: Ray3d::new(viewer.translation(), viewer.forward()),
    });
}
