//! Decoder for `.splat` gaussian-splat files: a flat array of little-endian
//! 32-byte records (position `f32x3`, scale `f32x3`, RGBA `u8x4`, rotation
//! `u8x4` quantised as `(b - 128) / 128`, w first).

use bevy::asset::RenderAssetUsages;
use bevy::mesh::PrimitiveTopology;
use bevy::prelude::*;
use thiserror::Error;

pub const SPLAT_RECORD_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Splat {
    pub position: Vec3,
    pub scale: Vec3,
    pub color: [u8; 4],
    pub rotation: Quat,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SplatDecodeError {
    #[error("file contains no splats")]
    Empty,
    #[error("length {len} is not a multiple of {SPLAT_RECORD_BYTES} bytes")]
    TruncatedRecord { len: usize },
    #[error("splat {index} has a non-finite position")]
    NonFinitePosition { index: usize },
}

fn read_f32(record: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([
        record[offset],
        record[offset + 1],
        record[offset + 2],
        record[offset + 3],
    ])
}

fn read_vec3(record: &[u8], offset: usize) -> Vec3 {
    Vec3::new(
        read_f32(record, offset),
        read_f32(record, offset + 4),
        read_f32(record, offset + 8),
    )
}

fn dequantize(byte: u8) -> f32 {
    (f32::from(byte) - 128.0) / 128.0
}

pub fn decode_splats(bytes: &[u8]) -> Result<Vec<Splat>, SplatDecodeError> {
    if bytes.is_empty() {
        return Err(SplatDecodeError::Empty);
    }
    if bytes.len() % SPLAT_RECORD_BYTES != 0 {
        return Err(SplatDecodeError::TruncatedRecord { len: bytes.len() });
    }

    bytes
        .chunks_exact(SPLAT_RECORD_BYTES)
        .enumerate()
        .map(|(index, record)| {
            let position = read_vec3(record, 0);
            if !position.is_finite() {
                return Err(SplatDecodeError::NonFinitePosition { index });
            }
            let scale = read_vec3(record, 12);
            let color = [record[24], record[25], record[26], record[27]];
            let raw = Quat::from_xyzw(
                dequantize(record[29]),
                dequantize(record[30]),
                dequantize(record[31]),
                dequantize(record[28]),
            );
            let rotation = if raw.length_squared() > f32::EPSILON {
                raw.normalize()
            } else {
                Quat::IDENTITY
            };
            Ok(Splat {
                position,
                scale,
                color,
                rotation,
            })
        })
        .collect()
}

/// Axis-aligned bounds of the splat centres, `None` for an empty slice.
pub fn splat_bounds(splats: &[Splat]) -> Option<(Vec3, Vec3)> {
    let first = splats.first()?.position;
    Some(splats.iter().fold((first, first), |(min, max), splat| {
        (min.min(splat.position), max.max(splat.position))
    }))
}

/// Point-list mesh of the splat centres with per-vertex linear colour.
pub fn splat_point_mesh(splats: &[Splat]) -> Mesh {
    let positions: Vec<[f32; 3]> = splats.iter().map(|s| s.position.to_array()).collect();
    let colors: Vec<[f32; 4]> = splats
        .iter()
        .map(|s| {
            let [r, g, b, a] = s.color;
            let linear = LinearRgba::from(Color::srgba_u8(r, g, b, a));
            [linear.red, linear.green, linear.blue, linear.alpha]
        })
        .collect();

    let mut mesh = Mesh::new(PrimitiveTopology::PointList, RenderAssetUsages::default());
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
    mesh.insert_attribute(Mesh::ATTRIBUTE_COLOR, colors);
    mesh
}
