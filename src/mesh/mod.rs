//! Indexed triangle meshes
//!
//! Storage for large static collision surfaces: a deduplicated vertex array
//! and a triangle buffer carrying per triangle normal, active edge bits and
//! material id. The accompanying [`bvh`](bvh/index.html) module accelerates
//! queries against the triangles.

pub mod bvh;

use std::collections::HashMap;

use cgmath::{InnerSpace, Point3, Vector3};
use collision::{Aabb, Aabb3};

use error::ConfigurationError;

/// Edge between vertices `a` and `b` is active.
pub const EDGE_AB: u8 = 0b001;
/// Edge between vertices `b` and `c` is active.
pub const EDGE_BC: u8 = 0b010;
/// Edge between vertices `c` and `a` is active.
pub const EDGE_CA: u8 = 0b100;

/// One triangle of a mesh.
///
/// Matches the stride-8 triangle record: three vertex indices, the face
/// normal, the low three active edge bits and a material id.
#[derive(Clone, Copy, Debug)]
pub struct Triangle {
    /// Vertex indices, counter clockwise seen from the outside.
    pub indices: [u32; 3],
    /// Unit face normal.
    pub normal: Vector3<f32>,
    /// Which of the three edges may generate contacts.
    pub active_edges: u8,
    /// Material id, host defined.
    pub material: u32,
}

/// Settings for mesh construction.
#[derive(Clone, Debug)]
pub struct MeshSettings {
    /// Two faces meeting at an edge with normal dot product below this make
    /// the edge active (sharp). Boundary and non-manifold edges are always
    /// active.
    pub active_edge_cos_threshold: f32,
}

impl Default for MeshSettings {
    fn default() -> Self {
        MeshSettings {
            // cos 5 degrees: anything sharper than a gentle crease is active
            active_edge_cos_threshold: 0.996_194_7,
        }
    }
}

/// A deduplicated indexed triangle mesh.
#[derive(Clone, Debug, Default)]
pub struct TriangleMesh {
    vertices: Vec<Point3<f32>>,
    triangles: Vec<Triangle>,
}

/// Pack an undirected vertex pair into a single map key.
fn edge_key(a: u32, b: u32) -> u64 {
    let (low, high) = if a < b { (a, b) } else { (b, a) };
    (u64::from(high) << 32) | u64::from(low)
}

fn vertex_key(point: Point3<f32>) -> (u32, u32, u32) {
    (point.x.to_bits(), point.y.to_bits(), point.z.to_bits())
}

impl TriangleMesh {
    /// Build a mesh from raw positions and triangle indices.
    ///
    /// Vertices are deduplicated by exact value, zero area triangles are
    /// skipped, face normals are computed, and edges are classified as
    /// active (boundary, non-manifold or sharper than the settings
    /// threshold) or inactive.
    ///
    /// Fails when two triangles traverse a shared edge in the same direction
    /// (inconsistent winding) or when no usable triangle remains.
    pub fn build(
        positions: &[Point3<f32>],
        indices: &[[u32; 3]],
        materials: Option<&[u32]>,
        settings: &MeshSettings,
    ) -> Result<Self, ConfigurationError> {
        let mut vertices = Vec::new();
        let mut remap = HashMap::new();
        let mut dedup = |point: Point3<f32>| -> u32 {
            *remap.entry(vertex_key(point)).or_insert_with(|| {
                vertices.push(point);
                vertices.len() as u32 - 1
            })
        };

        let mut triangles = Vec::with_capacity(indices.len());
        for (source, triangle) in indices.iter().enumerate() {
            let points = [
                positions[triangle[0] as usize],
                positions[triangle[1] as usize],
                positions[triangle[2] as usize],
            ];
            let cross = (points[1] - points[0]).cross(points[2] - points[0]);
            if cross.magnitude2() < 1.0e-12 {
                // Degenerate triangle; drop it and move on.
                continue;
            }
            triangles.push(Triangle {
                indices: [dedup(points[0]), dedup(points[1]), dedup(points[2])],
                normal: cross.normalize(),
                active_edges: 0,
                material: materials.map(|m| m[source]).unwrap_or(0),
            });
        }
        if triangles.is_empty() {
            return Err(ConfigurationError::EmptyTriangleMesh);
        }

        classify_active_edges(&mut triangles, settings.active_edge_cos_threshold)?;

        Ok(TriangleMesh {
            vertices,
            triangles,
        })
    }

    /// Vertex positions.
    pub fn vertices(&self) -> &[Point3<f32>] {
        &self.vertices
    }

    /// Triangle records.
    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    /// Corner positions of a triangle.
    pub fn triangle_points(&self, triangle: usize) -> [Point3<f32>; 3] {
        let indices = self.triangles[triangle].indices;
        [
            self.vertices[indices[0] as usize],
            self.vertices[indices[1] as usize],
            self.vertices[indices[2] as usize],
        ]
    }

    /// Bounding box of a triangle.
    pub fn triangle_aabb(&self, triangle: usize) -> Aabb3<f32> {
        let points = self.triangle_points(triangle);
        Aabb3::new(points[0], points[1]).grow(points[2])
    }

    /// Swap two triangle records. The mesh BVH builder reorders triangles in
    /// place so leaf ranges are contiguous.
    pub(crate) fn swap_triangles(&mut self, a: usize, b: usize) {
        self.triangles.swap(a, b);
    }
}

fn classify_active_edges(
    triangles: &mut [Triangle],
    cos_threshold: f32,
) -> Result<(), ConfigurationError> {
    // edge key -> occurrences of (triangle, edge bit, traversal direction)
    let mut edges: HashMap<u64, Vec<(usize, u8, bool)>> = HashMap::new();
    for (index, triangle) in triangles.iter().enumerate() {
        let corners = triangle.indices;
        for (edge, bit) in [(0usize, EDGE_AB), (1, EDGE_BC), (2, EDGE_CA)].iter() {
            let from = corners[*edge];
            let to = corners[(*edge + 1) % 3];
            edges
                .entry(edge_key(from, to))
                .or_insert_with(Vec::new)
                .push((index, *bit, from < to));
        }
    }
    for users in edges.values() {
        match users.len() {
            1 => {
                let (triangle, bit, _) = users[0];
                triangles[triangle].active_edges |= bit;
            }
            2 => {
                let (first, first_bit, first_forward) = users[0];
                let (second, second_bit, second_forward) = users[1];
                if first_forward == second_forward {
                    // Both faces traverse the edge the same way around.
                    return Err(ConfigurationError::InvertedTriangleMesh(second));
                }
                let cos = triangles[first].normal.dot(triangles[second].normal);
                if cos < cos_threshold {
                    triangles[first].active_edges |= first_bit;
                    triangles[second].active_edges |= second_bit;
                }
            }
            _ => {
                for &(triangle, bit, _) in users {
                    triangles[triangle].active_edges |= bit;
                }
            }
        }
    }
    Ok(())
}

/// The twelve triangle unit cube used in tests and demos.
#[cfg(test)]
pub(crate) fn unit_cube_mesh() -> TriangleMesh {
    let half = 0.5;
    let positions = [
        Point3::new(-half, -half, -half),
        Point3::new(half, -half, -half),
        Point3::new(half, half, -half),
        Point3::new(-half, half, -half),
        Point3::new(-half, -half, half),
        Point3::new(half, -half, half),
        Point3::new(half, half, half),
        Point3::new(-half, half, half),
    ];
    // Counter clockwise seen from outside.
    let indices = [
        [0, 2, 1],
        [0, 3, 2], // -z
        [4, 5, 6],
        [4, 6, 7], // +z
        [0, 1, 5],
        [0, 5, 4], // -y
        [3, 6, 2],
        [3, 7, 6], // +y
        [0, 4, 7],
        [0, 7, 3], // -x
        [1, 2, 6],
        [1, 6, 5], // +x
    ];
    TriangleMesh::build(&positions, &indices, None, &MeshSettings::default()).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_dedups_and_marks_all_edges_active() {
        let mesh = unit_cube_mesh();
        assert_eq!(mesh.vertices().len(), 8);
        assert_eq!(mesh.triangles().len(), 12);
        // Every cube edge is a 90 degree crease; the face diagonals are flat.
        for triangle in mesh.triangles() {
            assert_ne!(triangle.active_edges & 0b111, 0);
        }
        let active: u32 = mesh
            .triangles()
            .iter()
            .map(|t| u32::from(t.active_edges.count_ones()))
            .sum();
        // 12 cube edges shared by two triangles each, 6 flat diagonals.
        assert_eq!(active, 24);
    }

    #[test]
    fn degenerate_triangles_are_skipped() {
        let positions = [
            Point3::new(0., 0., 0.),
            Point3::new(1., 0., 0.),
            Point3::new(0., 1., 0.),
        ];
        let indices = [[0, 1, 2], [0, 1, 1]];
        let mesh =
            TriangleMesh::build(&positions, &indices, None, &MeshSettings::default()).unwrap();
        assert_eq!(mesh.triangles().len(), 1);
    }

    #[test]
    fn inconsistent_winding_is_rejected() {
        let positions = [
            Point3::new(0., 0., 0.),
            Point3::new(1., 0., 0.),
            Point3::new(0., 1., 0.),
            Point3::new(1., 1., 1.),
        ];
        // Second triangle walks the shared edge 0->1 in the same direction.
        let indices = [[0, 1, 2], [0, 1, 3]];
        match TriangleMesh::build(&positions, &indices, None, &MeshSettings::default()) {
            Err(error) => assert_eq!(error, ConfigurationError::InvertedTriangleMesh(1)),
            Ok(_) => panic!("inverted mesh was accepted"),
        }
    }

    #[test]
    fn all_triangles_degenerate_is_an_error() {
        let positions = [Point3::new(0., 0., 0.), Point3::new(1., 0., 0.)];
        let indices = [[0, 1, 0]];
        match TriangleMesh::build(&positions, &indices, None, &MeshSettings::default()) {
            Err(error) => assert_eq!(error, ConfigurationError::EmptyTriangleMesh),
            Ok(_) => panic!("empty mesh was accepted"),
        }
    }
}
