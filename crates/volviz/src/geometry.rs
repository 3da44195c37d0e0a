//! Geometry descriptors and CPU-side mesh preparation.
//!
//! The renderable kinds form a closed set — axis-aligned plane, cube,
//! triangle mesh — so they are a plain enum dispatched with `match` instead
//! of trait objects. Once a name is registered its kind is fixed; updates
//! must carry the same descriptor kind.

use glam::Vec3;

use crate::error::{Result, VizError};

/// World axis selector for axis-aligned planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// Per-axis drag permission mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveMask {
    pub x: bool,
    pub y: bool,
    pub z: bool,
}

impl MoveMask {
    pub const NONE: Self = Self { x: false, y: false, z: false };
    pub const ALL: Self = Self { x: true, y: true, z: true };

    pub fn axis(axis: Axis) -> Self {
        match axis {
            Axis::X => Self { x: true, ..Self::NONE },
            Axis::Y => Self { y: true, ..Self::NONE },
            Axis::Z => Self { z: true, ..Self::NONE },
        }
    }

    /// Component-wise 0/1 vector used to mask drag deltas.
    pub fn unit_vector(self) -> Vec3 {
        Vec3::new(
            if self.x { 1.0 } else { 0.0 },
            if self.y { 1.0 } else { 0.0 },
            if self.z { 1.0 } else { 0.0 },
        )
    }
}

/// An axis-aligned slicing plane. The intercept is the signed offset along
/// the axis, in metres. A plane whose intercept is at or near zero snaps to
/// the origin and is sized to span the active volume.
#[derive(Debug, Clone)]
pub struct PlaneDescriptor {
    pub axis: Axis,
    pub intercept_m: f32,
    pub color: Vec3,
    pub movable: bool,
}

impl Default for PlaneDescriptor {
    fn default() -> Self {
        Self {
            axis: Axis::X,
            intercept_m: 0.0,
            color: Vec3::ONE,
            movable: true,
        }
    }
}

/// A small axis-aligned marker cube.
#[derive(Debug, Clone)]
pub struct CubeDescriptor {
    /// Center position in render-space units.
    pub position: Vec3,
    /// Edge half-extent scale factor.
    pub radius: f32,
    /// Per-instance scale in metres.
    pub scale_m: f32,
    pub color: Vec3,
    pub move_mask: MoveMask,
}

impl Default for CubeDescriptor {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            radius: 1.0,
            scale_m: 1e-3,
            color: Vec3::ONE,
            move_mask: MoveMask::ALL,
        }
    }
}

/// A triangle mesh with per-vertex positions; normals are derived.
#[derive(Debug, Clone)]
pub struct MeshDescriptor {
    pub vertices: Vec<Vec3>,
    pub indices: Vec<[u32; 3]>,
    pub position: Vec3,
    /// Per-instance scale in metres.
    pub scale_m: f32,
    pub color: Vec3,
    pub move_mask: MoveMask,
}

impl Default for MeshDescriptor {
    fn default() -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            position: Vec3::ZERO,
            scale_m: 1e-3,
            color: Vec3::ONE,
            move_mask: MoveMask::ALL,
        }
    }
}

/// Closed sum over the renderable kinds.
#[derive(Debug, Clone)]
pub enum GeometryDescriptor {
    Plane(PlaneDescriptor),
    Cube(CubeDescriptor),
    Mesh(MeshDescriptor),
}

impl GeometryDescriptor {
    pub fn kind(&self) -> GeometryKind {
        match self {
            GeometryDescriptor::Plane(_) => GeometryKind::Plane,
            GeometryDescriptor::Cube(_) => GeometryKind::Cube,
            GeometryDescriptor::Mesh(_) => GeometryKind::Mesh,
        }
    }

    /// Rejects malformed descriptors before they are queued: out-of-range
    /// mesh indices, empty meshes, non-positive cube radius.
    pub fn validate(&self) -> Result<()> {
        match self {
            GeometryDescriptor::Plane(_) => Ok(()),
            GeometryDescriptor::Cube(c) => {
                if c.radius <= 0.0 || c.scale_m <= 0.0 {
                    return Err(VizError::ContractViolation(format!(
                        "cube radius and scale must be positive (radius {}, scale {} m)",
                        c.radius, c.scale_m
                    )));
                }
                Ok(())
            }
            GeometryDescriptor::Mesh(m) => {
                if m.scale_m <= 0.0 {
                    return Err(VizError::ContractViolation(format!(
                        "mesh scale must be positive, got {} m",
                        m.scale_m
                    )));
                }
                if m.vertices.is_empty() || m.indices.is_empty() {
                    return Err(VizError::InvalidGeometryData(
                        "mesh has no vertices or no triangles".into(),
                    ));
                }
                let n = m.vertices.len() as u32;
                for (t, tri) in m.indices.iter().enumerate() {
                    for &i in tri {
                        if i >= n {
                            return Err(VizError::InvalidGeometryData(format!(
                                "triangle {t} references vertex {i}, mesh has {n} vertices"
                            )));
                        }
                    }
                }
                Ok(())
            }
        }
    }
}

/// Discriminant of [`GeometryDescriptor`], used for kind checks on update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryKind {
    Plane,
    Cube,
    Mesh,
}

impl GeometryKind {
    pub fn name(self) -> &'static str {
        match self {
            GeometryKind::Plane => "plane",
            GeometryKind::Cube => "cube",
            GeometryKind::Mesh => "mesh",
        }
    }
}

/// Interleaved GPU vertex: position, padding, normal, padding. The two spare
/// floats keep the stride at 32 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub _pad0: f32,
    pub normal: [f32; 3],
    pub _pad1: f32,
}

/// Builds the interleaved vertex buffer with area-weighted vertex normals:
/// every triangle adds its unnormalized edge cross product to the normal
/// accumulator of each of its vertices, and the accumulators are normalized
/// once at the end. Larger triangles therefore contribute more.
///
/// The descriptor must have passed [`GeometryDescriptor::validate`]; indices
/// are trusted here.
pub fn build_mesh_vertices(vertices: &[Vec3], indices: &[[u32; 3]]) -> Vec<MeshVertex> {
    let mut normals = vec![Vec3::ZERO; vertices.len()];

    for tri in indices {
        let [a, b, c] = tri.map(|i| vertices[i as usize]);
        let face = (b - a).cross(c - a);
        for &i in tri {
            normals[i as usize] += face;
        }
    }

    vertices
        .iter()
        .zip(&normals)
        .map(|(p, n)| MeshVertex {
            position: (*p).into(),
            _pad0: 0.0,
            normal: n.normalize_or_zero().into(),
            _pad1: 0.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flat_triangle_gets_the_face_normal_at_every_vertex() {
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        let indices = vec![[0u32, 1, 2]];

        let built = build_mesh_vertices(&vertices, &indices);
        assert_eq!(built.len(), 3);
        for v in &built {
            let n = Vec3::from(v.normal);
            assert!((n - Vec3::Z).length() < 1e-6);
            assert!((n.length() - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn shared_vertex_normals_are_area_weighted() {
        // Two triangles in the xy and xz planes sharing an edge; the big one
        // dominates the shared vertices' normals.
        let vertices = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 10.0, 0.0),
            Vec3::new(0.0, 0.0, 0.1),
        ];
        let indices = vec![[0u32, 1, 2], [0, 3, 1]];

        let built = build_mesh_vertices(&vertices, &indices);
        let n0 = Vec3::from(built[0].normal);
        // xy triangle has area 5 and normal +z; xz triangle area 0.05,
        // normal -y.
        assert!(n0.z > 0.9);
        assert!((n0.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn mesh_with_out_of_range_index_is_rejected() {
        let desc = GeometryDescriptor::Mesh(MeshDescriptor {
            vertices: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            indices: vec![[0, 1, 3]],
            scale_m: 1.0,
            ..Default::default()
        });
        assert!(matches!(
            desc.validate(),
            Err(VizError::InvalidGeometryData(_))
        ));
    }

    #[test]
    fn move_mask_unit_vector_selects_axes() {
        assert_eq!(MoveMask::axis(Axis::Y).unit_vector(), Vec3::Y);
        assert_eq!(MoveMask::ALL.unit_vector(), Vec3::ONE);
        assert_eq!(MoveMask::NONE.unit_vector(), Vec3::ZERO);
    }
}
