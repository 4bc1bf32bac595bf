use crate::occlusion_scene::OCCLUDABLE_ITEMS_LAYER;
use bevy::camera::visibility::RenderLayers;
use bevy::ecs::system::EntityCommands;
use bevy::prelude::*;

/// Marks geometry that the renderer depth-tests against the live depth mesh.
#[derive(Component, Debug, Default)]
pub struct Occludable;

/// Default layer plus the occludable-items layer.
pub fn occludable_layers() -> RenderLayers {
    RenderLayers::layer(0).with(OCCLUDABLE_ITEMS_LAYER)
}

/// Layers a viewer camera needs to see both ordinary and occludable geometry.
pub fn viewer_layers() -> RenderLayers {
    occludable_layers()
}

pub fn is_occludable(layers: &RenderLayers) -> bool {
    layers.intersects(&RenderLayers::layer(OCCLUDABLE_ITEMS_LAYER))
}

/// One-time binding, applied when the entity is spawned.
pub fn bind_occlusion_layer(entity: &mut EntityCommands) {
    entity.insert((Occludable, occludable_layers()));
}
