use crate::occlusion_scene::asset_load::{AssetLoadPipeline, LoadStatus};
use crate::occlusion_scene::config::SceneConfig;
use crate::occlusion_scene::diagnostics::OperatorChannel;
use crate::occlusion_scene::hit_test::{DepthSurfaces, HitResult};
use crate::occlusion_scene::input::{PlacementRay, ViewerCamera};
use crate::occlusion_scene::occlusion::{Occludable, bind_occlusion_layer};
use bevy::camera::visibility::RenderLayers;
use bevy::light::{NotShadowCaster, NotShadowReceiver};
use bevy::prelude::*;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementState {
    #[default]
    Unplaced,
    Placed,
}

/// The one placeable object of the session. Spawned hidden at the origin and
/// never despawned; placement and content attachment mutate it in place.
#[derive(Component, Debug, Default)]
pub struct Placeable {
    pub state: PlacementState,
    pub content: Option<Entity>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PlacementError {
    #[error("ray hit nothing")]
    NoHit,
    #[error("ray hit {0:?} instead of the depth mesh")]
    WrongTarget(Entity),
    #[error("asset content is not attached yet")]
    ContentMissing,
}

/// Only hits on the live depth mesh are placement targets.
pub fn route_hit(hit: Option<HitResult>, depth_mesh: Entity) -> Result<HitResult, PlacementError> {
    let hit = hit.ok_or(PlacementError::NoHit)?;
    if hit.entity != depth_mesh {
        return Err(PlacementError::WrongTarget(hit.entity));
    }
    Ok(hit)
}

/// Yaws the transform so its local +Z axis points at the viewer horizontally,
/// the way a scene-graph `look_at` orients a non-camera object. Attached
/// content is turned half a revolution by its descriptor, so its front (-Z)
/// ends up facing the viewer. Translation and pitch are left alone; a viewer
/// straight above or below keeps the current yaw.
pub fn face_viewer(transform: &mut Transform, viewer: Vec3) {
    let to_viewer = viewer - transform.translation;
    let flat = Vec2::new(to_viewer.x, to_viewer.z);
    if flat.length_squared() <= f32::EPSILON {
        return;
    }
    transform.rotation = Quat::from_rotation_y(flat.x.atan2(flat.y));
}

pub fn place(
    placeable: &mut Placeable,
    transform: &mut Transform,
    visibility: &mut Visibility,
    hit: &HitResult,
    viewer: Option<Vec3>,
) -> Result<PlacementState, PlacementError> {
    if placeable.content.is_none() {
        return Err(PlacementError::ContentMissing);
    }

    transform.translation = hit.point;
    *visibility = Visibility::Visible;
    if let Some(viewer) = viewer {
        face_viewer(transform, viewer);
    }
    placeable.state = PlacementState::Placed;
    Ok(placeable.state)
}

pub fn spawn_placeable(mut commands: Commands) {
    let mut entity = commands.spawn((
        Name::new("Placeable"),
        Placeable::default(),
        Transform::default(),
        Visibility::Hidden,
    ));
    bind_occlusion_layer(&mut entity);
}

pub fn process_placement_rays(
    mut rays: MessageReader<PlacementRay>,
    surfaces: DepthSurfaces,
    viewers: Query<&GlobalTransform, With<ViewerCamera>>,
    mut placeables: Query<(&mut Placeable, &mut Transform, &mut Visibility)>,
) {
    let viewer = viewers.single().ok().map(GlobalTransform::translation);

    for request in rays.read() {
        let Some((depth_mesh, _)) = surfaces.depth_mesh() else {
            debug!(source = ?request.source, "placement skipped: no depth mesh");
            continue;
        };
        let Ok((mut placeable, mut transform, mut visibility)) = placeables.single_mut() else {
            continue;
        };

        let result = route_hit(surfaces.cast(request.ray), depth_mesh).and_then(|hit| {
            place(
                &mut placeable,
                &mut transform,
                &mut visibility,
                &hit,
                viewer,
            )
        });

        match result {
            Ok(state) => debug!(
                source = ?request.source,
                position = ?transform.translation,
                ?state,
                "placed"
            ),
            Err(reason) => debug!(source = ?request.source, %reason, "placement skipped"),
        }
    }
}

pub fn request_active_asset_load(
    config: Res<SceneConfig>,
    mut pipeline: NonSendMut<AssetLoadPipeline>,
    mut channel: ResMut<OperatorChannel>,
) {
    let descriptor = config.active_asset();
    match pipeline.request(&descriptor) {
        LoadStatus::Started => channel.info(format!("Loading asset: {}", descriptor.uri)),
        LoadStatus::InFlight => debug!(uri = %descriptor.uri, "asset already loading"),
        LoadStatus::Ready(_) => debug!(uri = %descriptor.uri, "asset already loaded"),
    }
}

pub fn attach_loaded_assets(
    mut commands: Commands,
    mut pipeline: NonSendMut<AssetLoadPipeline>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut channel: ResMut<OperatorChannel>,
    mut placeables: Query<(Entity, &mut Placeable, &RenderLayers)>,
) {
    if !pipeline.is_loading() {
        return;
    }

    for completed in pipeline.poll() {
        let asset = match completed.outcome {
            Ok(asset) => asset,
            Err(err) => {
                channel.error(format!("Failed to load asset: {err}"));
                continue;
            }
        };
        channel.info("Asset loaded successfully");
        debug!(
            uri = %completed.descriptor.uri,
            splats = asset.splat_count,
            bounds = ?asset.bounds,
            "asset decoded"
        );

        let Ok((entity, mut placeable, layers)) = placeables.single_mut() else {
            warn!("asset loaded but there is no placeable to attach it to");
            continue;
        };
        if placeable.content.is_some() {
            continue;
        }

        let material = materials.add(StandardMaterial {
            base_color: Color::WHITE,
            unlit: true,
            ..default()
        });
        let content = commands
            .spawn((
                Name::new(format!("Asset {}", completed.descriptor.uri)),
                Mesh3d(meshes.add(asset.mesh.clone())),
                MeshMaterial3d(material),
                completed.descriptor.local_transform(),
                Visibility::Inherited,
                Occludable,
                layers.clone(),
                NotShadowCaster,
                NotShadowReceiver,
                ChildOf(entity),
            ))
            .id();
        placeable.content = Some(content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occlusion_scene::asset_load::LoadError;
    use crate::occlusion_scene::asset_load::tests::StubSource;
    use crate::occlusion_scene::config::AssetDescriptor;
    use crate::occlusion_scene::depth_mesh::{DepthMesh, HitSurface};
    use crate::occlusion_scene::diagnostics::DiagnosticLevel;
    use crate::occlusion_scene::hit_test::tests::floor_mesh;
    use crate::occlusion_scene::input::{
        ControllerSelectStart, InputSource, controller_placement_rays,
    };
    use crate::occlusion_scene::occlusion::is_occludable;
    use crate::occlusion_scene::splat::tests::house_bytes;
    use crate::occlusion_scene::ui::InstructionText;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use rstest::rstest;
    use std::time::{Duration, Instant};

    fn hit_at(point: Vec3, entity: Entity) -> HitResult {
        HitResult {
            point,
            normal: Vec3::Y,
            distance: 1.0,
            entity,
        }
    }

    fn loaded_placeable() -> Placeable {
        Placeable {
            state: PlacementState::Unplaced,
            content: Some(Entity::PLACEHOLDER),
        }
    }

    fn facing(transform: &Transform) -> Vec3 {
        transform.rotation * Vec3::Z
    }

    #[test]
    fn first_placement_shows_and_moves_object() {
        let mut placeable = loaded_placeable();
        let mut transform = Transform::default();
        let mut visibility = Visibility::Hidden;

        let state = place(
            &mut placeable,
            &mut transform,
            &mut visibility,
            &hit_at(Vec3::new(2.0, 0.0, -3.0), Entity::PLACEHOLDER),
            Some(Vec3::new(0.0, 1.6, 0.0)),
        )
        .unwrap();

        assert_eq!(state, PlacementState::Placed);
        assert_eq!(visibility, Visibility::Visible);
        assert_eq!(transform.translation, Vec3::new(2.0, 0.0, -3.0));
    }

    #[test]
    fn repositioning_stays_visible() {
        let mut placeable = loaded_placeable();
        let mut transform = Transform::default();
        let mut visibility = Visibility::Hidden;
        let viewer = Some(Vec3::new(0.0, 1.6, 0.0));

        place(
            &mut placeable,
            &mut transform,
            &mut visibility,
            &hit_at(Vec3::new(1.0, 0.0, -1.0), Entity::PLACEHOLDER),
            viewer,
        )
        .unwrap();
        place(
            &mut placeable,
            &mut transform,
            &mut visibility,
            &hit_at(Vec3::new(-1.0, 0.2, -4.0), Entity::PLACEHOLDER),
            viewer,
        )
        .unwrap();

        assert_eq!(placeable.state, PlacementState::Placed);
        assert_eq!(visibility, Visibility::Visible);
        assert_eq!(transform.translation, Vec3::new(-1.0, 0.2, -4.0));
    }

    #[test]
    fn placement_without_content_is_a_no_op() {
        let mut placeable = Placeable::default();
        let mut transform = Transform::default();
        let mut visibility = Visibility::Hidden;

        let err = place(
            &mut placeable,
            &mut transform,
            &mut visibility,
            &hit_at(Vec3::new(2.0, 0.0, -3.0), Entity::PLACEHOLDER),
            None,
        )
        .unwrap_err();

        assert_eq!(err, PlacementError::ContentMissing);
        assert_eq!(placeable.state, PlacementState::Unplaced);
        assert_eq!(visibility, Visibility::Hidden);
        assert_eq!(transform, Transform::default());
    }

    #[test]
    fn routing_accepts_only_the_depth_mesh() {
        let mut world = World::new();
        let depth_mesh = world.spawn_empty().id();
        let panel = world.spawn_empty().id();

        assert_eq!(route_hit(None, depth_mesh), Err(PlacementError::NoHit));
        assert_eq!(
            route_hit(Some(hit_at(Vec3::ZERO, panel)), depth_mesh),
            Err(PlacementError::WrongTarget(panel))
        );
        assert!(route_hit(Some(hit_at(Vec3::ZERO, depth_mesh)), depth_mesh).is_ok());
    }

    #[rstest]
    #[case(Vec3::new(2.0, 0.0, -3.0), Vec3::new(0.0, 1.6, 0.0))]
    #[case(Vec3::new(0.0, 0.0, -2.0), Vec3::new(0.0, 1.6, 0.0))]
    #[case(Vec3::new(-3.0, 0.7, 1.0), Vec3::new(4.0, 1.2, -2.0))]
    #[case(Vec3::new(0.0, 0.0, 5.0), Vec3::new(0.0, 0.0, 0.0))]
    fn local_z_points_at_viewer_horizontally(#[case] position: Vec3, #[case] viewer: Vec3) {
        let mut transform = Transform::from_translation(position);
        face_viewer(&mut transform, viewer);

        let expected = Vec3::new(viewer.x - position.x, 0.0, viewer.z - position.z).normalize();
        let facing = facing(&transform);
        assert_relative_eq!(facing.x, expected.x, epsilon = 1e-5);
        assert_relative_eq!(facing.y, 0.0, epsilon = 1e-5);
        assert_relative_eq!(facing.z, expected.z, epsilon = 1e-5);
        assert_eq!(transform.translation, position);
    }

    #[test]
    fn content_front_faces_viewer_with_default_descriptor() {
        let mut parent = Transform::from_xyz(0.0, 0.0, -2.0);
        face_viewer(&mut parent, Vec3::new(0.0, 1.6, 0.0));
        let content = AssetDescriptor::new("house.splat").local_transform();

        let parent_z = parent.rotation * Vec3::Z;
        assert_relative_eq!(parent_z.z, 1.0, epsilon = 1e-5);
        let content_front = parent.rotation * content.rotation * Vec3::NEG_Z;
        assert_relative_eq!(content_front.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(content_front.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn viewer_straight_above_keeps_yaw() {
        let initial = Quat::from_rotation_y(0.7);
        let mut transform = Transform::from_xyz(1.0, 0.0, 1.0).with_rotation(initial);
        face_viewer(&mut transform, Vec3::new(1.0, 3.0, 1.0));
        assert_eq!(transform.rotation, initial);
    }

    proptest! {
        #[test]
        fn placing_twice_equals_placing_once(
            x in -20.0f32..20.0,
            y in -2.0f32..3.0,
            z in -20.0f32..20.0,
            vx in -5.0f32..5.0,
            vz in -5.0f32..5.0,
        ) {
            let hit = hit_at(Vec3::new(x, y, z), Entity::PLACEHOLDER);
            let viewer = Some(Vec3::new(vx, 1.6, vz));

            let mut once = (loaded_placeable(), Transform::default(), Visibility::Hidden);
            place(&mut once.0, &mut once.1, &mut once.2, &hit, viewer).unwrap();

            let mut twice = (loaded_placeable(), Transform::default(), Visibility::Hidden);
            place(&mut twice.0, &mut twice.1, &mut twice.2, &hit, viewer).unwrap();
            place(&mut twice.0, &mut twice.1, &mut twice.2, &hit, viewer).unwrap();

            prop_assert_eq!(once.1.translation, twice.1.translation);
            prop_assert!(once.1.rotation.abs_diff_eq(twice.1.rotation, 1e-6));
            prop_assert_eq!(once.2, twice.2);
            prop_assert_eq!(twice.1.translation, hit.point);
        }
    }

    struct Scene {
        app: App,
    }

    impl Scene {
        fn new(source: StubSource) -> Self {
            let mut app = App::new();
            app.init_resource::<Assets<Mesh>>()
                .init_resource::<Assets<StandardMaterial>>()
                .init_resource::<OperatorChannel>()
                .insert_resource(InstructionText::new("Pinch to place building"))
                .insert_resource(SceneConfig {
                    assets: vec![AssetDescriptor::new("house.splat")],
                    ..default()
                })
                .insert_non_send_resource(AssetLoadPipeline::new(source))
                .add_message::<PlacementRay>()
                .add_message::<ControllerSelectStart>()
                .add_systems(Startup, (spawn_placeable, request_active_asset_load))
                .add_systems(
                    Update,
                    (
                        controller_placement_rays,
                        attach_loaded_assets,
                        process_placement_rays,
                    )
                        .chain(),
                );

            let floor = app
                .world_mut()
                .resource_mut::<Assets<Mesh>>()
                .add(floor_mesh(10.0));
            app.world_mut().spawn((
                DepthMesh::default(),
                HitSurface,
                Mesh3d(floor),
                GlobalTransform::IDENTITY,
            ));
            app.world_mut().spawn((
                ViewerCamera,
                GlobalTransform::from_translation(Vec3::new(0.0, 1.6, 0.0)),
            ));
            app.update();

            Self { app }
        }

        fn placeable(&mut self) -> (Entity, PlacementState, Option<Entity>, Visibility, Transform) {
            let world = self.app.world_mut();
            let mut query = world.query::<(Entity, &Placeable, &Visibility, &Transform)>();
            let (entity, placeable, visibility, transform) =
                query.iter(world).next().expect("placeable");
            (
                entity,
                placeable.state,
                placeable.content,
                *visibility,
                *transform,
            )
        }

        fn wait_for_load(&mut self) {
            let deadline = Instant::now() + Duration::from_secs(5);
            while self.app.world().non_send_resource::<AssetLoadPipeline>().is_loading()
                && Instant::now() < deadline
            {
                std::thread::sleep(Duration::from_millis(5));
                self.app.update();
            }
            self.app.update();
        }

        fn tap_down_at(&mut self, x: f32, z: f32) {
            self.app.world_mut().write_message(PlacementRay {
                ray: Ray3d::new(Vec3::new(x, 5.0, z), Dir3::NEG_Y),
                source: InputSource::Pointer,
            });
            self.app.update();
        }

        fn select_down_at(&mut self, x: f32, z: f32) {
            self.app.world_mut().write_message(ControllerSelectStart {
                ray: Ray3d::new(Vec3::new(x, 5.0, z), Dir3::NEG_Y),
            });
            self.app.update();
        }

        fn add_panel(&mut self, center: Vec3) {
            let panel_mesh = self
                .app
                .world_mut()
                .resource_mut::<Assets<Mesh>>()
                .add(floor_mesh(1.0));
            self.app.world_mut().spawn((
                HitSurface,
                Mesh3d(panel_mesh),
                GlobalTransform::from_translation(center),
            ));
        }

        fn channel(&self) -> &OperatorChannel {
            self.app.world().resource::<OperatorChannel>()
        }
    }

    #[test]
    fn loaded_asset_is_placed_at_hit_facing_viewer() {
        let mut scene = Scene::new(StubSource::serving(Ok(house_bytes())));
        scene.wait_for_load();

        let (_, state, content, visibility, _) = scene.placeable();
        assert_eq!(state, PlacementState::Unplaced);
        assert!(content.is_some());
        assert_eq!(visibility, Visibility::Hidden);

        scene.tap_down_at(2.0, -3.0);

        let (_, state, _, visibility, transform) = scene.placeable();
        assert_eq!(state, PlacementState::Placed);
        assert_eq!(visibility, Visibility::Visible);
        assert_relative_eq!(transform.translation.x, 2.0, epsilon = 1e-4);
        assert_relative_eq!(transform.translation.y, 0.0, epsilon = 1e-4);
        assert_relative_eq!(transform.translation.z, -3.0, epsilon = 1e-4);

        let facing = facing(&transform);
        let expected = Vec3::new(-2.0, 0.0, 3.0).normalize();
        assert_relative_eq!(facing.x, expected.x, epsilon = 1e-4);
        assert_relative_eq!(facing.z, expected.z, epsilon = 1e-4);

        let channel = scene.channel();
        let messages: Vec<&str> = channel.entries().map(|e| e.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["Loading asset: house.splat", "Asset loaded successfully"]
        );
    }

    #[test]
    fn attached_content_shares_occlusion_layers() {
        let mut scene = Scene::new(StubSource::serving(Ok(house_bytes())));
        scene.wait_for_load();
        scene.tap_down_at(0.0, -2.0);

        let (entity, _, content, _, _) = scene.placeable();
        let world = scene.app.world();
        assert!(is_occludable(world.get::<RenderLayers>(entity).unwrap()));
        let content = content.unwrap();
        assert!(is_occludable(world.get::<RenderLayers>(content).unwrap()));
        assert_eq!(world.get::<ChildOf>(content).map(ChildOf::parent), Some(entity));
    }

    #[test]
    fn miss_changes_nothing() {
        let mut scene = Scene::new(StubSource::serving(Ok(house_bytes())));
        scene.wait_for_load();

        scene.tap_down_at(50.0, 50.0);

        let (_, state, _, visibility, transform) = scene.placeable();
        assert_eq!(state, PlacementState::Unplaced);
        assert_eq!(visibility, Visibility::Hidden);
        assert_eq!(transform, Transform::default());
        assert_eq!(
            scene.app.world().resource::<InstructionText>().text(),
            "Pinch to place building"
        );
    }

    #[test]
    fn other_geometry_in_front_blocks_placement() {
        let mut scene = Scene::new(StubSource::serving(Ok(house_bytes())));
        scene.wait_for_load();

        scene.add_panel(Vec3::new(0.0, 1.0, -2.0));

        scene.tap_down_at(0.0, -2.0);
        let (_, state, _, visibility, _) = scene.placeable();
        assert_eq!(state, PlacementState::Unplaced);
        assert_eq!(visibility, Visibility::Hidden);

        scene.tap_down_at(4.0, -2.0);
        let (_, state, _, _, transform) = scene.placeable();
        assert_eq!(state, PlacementState::Placed);
        assert_relative_eq!(transform.translation.x, 4.0, epsilon = 1e-4);
    }

    #[rstest]
    #[case::depth_mesh_hit(2.0, -3.0, true)]
    #[case::blocked_by_panel(0.0, -2.0, false)]
    #[case::miss(50.0, 50.0, false)]
    fn controller_select_matches_pointer_tap(
        #[case] x: f32,
        #[case] z: f32,
        #[case] expect_placed: bool,
    ) {
        let mut by_pointer = Scene::new(StubSource::serving(Ok(house_bytes())));
        let mut by_controller = Scene::new(StubSource::serving(Ok(house_bytes())));
        for scene in [&mut by_pointer, &mut by_controller] {
            scene.wait_for_load();
            scene.add_panel(Vec3::new(0.0, 1.0, -2.0));
        }

        by_pointer.tap_down_at(x, z);
        by_controller.select_down_at(x, z);

        let (_, pointer_state, _, pointer_visibility, pointer_transform) = by_pointer.placeable();
        let (_, controller_state, _, controller_visibility, controller_transform) =
            by_controller.placeable();
        assert_eq!(controller_state, pointer_state);
        assert_eq!(controller_visibility, pointer_visibility);
        assert_eq!(controller_transform, pointer_transform);
        assert_eq!(controller_state == PlacementState::Placed, expect_placed);
    }

    #[test]
    fn placement_before_load_waits_for_next_gesture() {
        let (source, release) = StubSource::gated(Ok(house_bytes()));
        let mut scene = Scene::new(source);

        scene.tap_down_at(1.0, -1.0);
        let (_, state, content, visibility, _) = scene.placeable();
        assert!(content.is_none());
        assert_eq!(state, PlacementState::Unplaced);
        assert_eq!(visibility, Visibility::Hidden);

        release.send(()).unwrap();
        scene.wait_for_load();

        let (_, _, content, visibility, _) = scene.placeable();
        assert!(content.is_some());
        assert_eq!(visibility, Visibility::Hidden);

        scene.tap_down_at(1.0, -1.0);
        let (_, state, _, visibility, _) = scene.placeable();
        assert_eq!(state, PlacementState::Placed);
        assert_eq!(visibility, Visibility::Visible);
    }

    #[test]
    fn failed_load_is_reported_once_and_object_stays_hidden() {
        let mut scene = Scene::new(StubSource::serving(Err(LoadError::Fetch {
            uri: "house.splat".to_string(),
            reason: "network unreachable".to_string(),
        })));
        scene.wait_for_load();
        scene.tap_down_at(2.0, -3.0);
        scene.app.update();

        let (_, state, content, visibility, _) = scene.placeable();
        assert!(content.is_none());
        assert_eq!(state, PlacementState::Unplaced);
        assert_eq!(visibility, Visibility::Hidden);

        let channel = scene.channel();
        assert_eq!(channel.count(DiagnosticLevel::Error), 1);
        let failure = channel
            .entries()
            .find(|e| e.level == DiagnosticLevel::Error)
            .unwrap();
        assert_eq!(
            failure.message,
            "Failed to load asset: failed to fetch house.splat: network unreachable"
        );
    }
}
