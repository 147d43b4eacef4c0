//! Contact manifold reduction
//!
//! Narrow phase hits for one body pair are grouped by normal, optionally
//! clipped against supporting faces, and reduced to at most four points that
//! keep the deepest penetration and maximize manifold area.

use cgmath::{InnerSpace, Point3, Vector3};

use narrow::ContactHit;

/// Largest number of points a manifold keeps.
pub const MAX_MANIFOLD_POINTS: usize = 4;

/// One solved contact point of a manifold.
///
/// The cached impulses survive into the next step's warm start.
#[derive(Clone, Copy, Debug)]
pub struct ManifoldPoint {
    /// Contact point on the surface of A, world space.
    pub position_a: Point3<f32>,
    /// Contact point on the surface of B, world space.
    pub position_b: Point3<f32>,
    /// Accumulated normal impulse.
    pub normal_lambda: f32,
    /// Accumulated friction impulses along the two tangents.
    pub tangent_lambda: [f32; 2],
}

impl ManifoldPoint {
    fn new(position_a: Point3<f32>, position_b: Point3<f32>) -> Self {
        ManifoldPoint {
            position_a,
            position_b,
            normal_lambda: 0.,
            tangent_lambda: [0., 0.],
        }
    }

    /// Penetration along `normal` (A to B): positive when overlapping.
    pub fn penetration(&self, normal: Vector3<f32>) -> f32 {
        (self.position_a - self.position_b).dot(normal)
    }
}

/// Up to four contact points sharing one normal for a body pair.
#[derive(Clone, Debug)]
pub struct ContactManifold {
    /// Shared world space normal, pointing from A to B.
    pub normal: Vector3<f32>,
    /// Contact points, one to four.
    pub points: Vec<ManifoldPoint>,
    /// Material id on A, from the generating hit.
    pub material_a: u32,
    /// Material id on B.
    pub material_b: u32,
}

struct Candidate {
    position_a: Point3<f32>,
    position_b: Point3<f32>,
    depth: f32,
}

/// Reduce the hits of one body pair into manifolds.
///
/// With `use_reduction` off every hit becomes a single point manifold.
/// Otherwise hits whose normals agree within `normal_cos_max_delta` share a
/// manifold, supporting faces are clipped against each other when both are
/// present, candidates within `tolerance` of an already collected point are
/// dropped as duplicates, and the result is cut down to four points.
pub fn reduce_hits(
    hits: &[ContactHit],
    use_reduction: bool,
    normal_cos_max_delta: f32,
    tolerance: f32,
    out: &mut Vec<ContactManifold>,
) {
    if hits.is_empty() {
        return;
    }
    if !use_reduction {
        for hit in hits {
            out.push(ContactManifold {
                normal: hit.axis,
                points: vec![ManifoldPoint::new(hit.point_a, hit.point_b)],
                material_a: hit.material_a,
                material_b: hit.material_b,
            });
        }
        return;
    }

    // Group hit indices by normal agreement; first hit of a group sets its
    // normal.
    let mut groups: Vec<(Vector3<f32>, Vec<usize>)> = Vec::new();
    for (index, hit) in hits.iter().enumerate() {
        match groups
            .iter_mut()
            .find(|&&mut (normal, _)| normal.dot(hit.axis) >= normal_cos_max_delta)
        {
            Some(&mut (_, ref mut members)) => members.push(index),
            None => groups.push((hit.axis, vec![index])),
        }
    }

    let tolerance_sq = tolerance * tolerance;
    for (normal, members) in groups {
        let mut candidates: Vec<Candidate> = Vec::with_capacity(members.len());
        for &index in &members {
            let hit = &hits[index];
            let first_new = candidates.len();
            if !hit.face_a.is_empty() && !hit.face_b.is_empty() {
                clip_supporting_faces(hit, normal, &mut candidates);
            } else {
                candidates.push(Candidate {
                    position_a: hit.point_a,
                    position_b: hit.point_b,
                    depth: hit.penetration,
                });
            }
            // Drop near duplicates of points collected from earlier hits.
            let mut write = first_new;
            for read in first_new..candidates.len() {
                let duplicate = candidates[..first_new].iter().any(|existing| {
                    (existing.position_a - candidates[read].position_a).magnitude2()
                        < tolerance_sq
                });
                if !duplicate {
                    candidates.swap(write, read);
                    write += 1;
                }
            }
            candidates.truncate(write);
        }
        if candidates.is_empty() {
            continue;
        }
        let selected = select_points(&candidates);
        let first = &hits[members[0]];
        out.push(ContactManifold {
            normal,
            points: selected
                .iter()
                .map(|&index| {
                    ManifoldPoint::new(
                        candidates[index].position_a,
                        candidates[index].position_b,
                    )
                })
                .collect(),
            material_a: first.material_a,
            material_b: first.material_b,
        });
    }
}

/// Clip `face_b` against the edge planes of `face_a` (Sutherland-Hodgman),
/// producing one candidate per surviving vertex.
fn clip_supporting_faces(hit: &ContactHit, normal: Vector3<f32>, out: &mut Vec<Candidate>) {
    let reference = &hit.face_a;
    if reference.len() < 3 {
        out.push(Candidate {
            position_a: hit.point_a,
            position_b: hit.point_b,
            depth: hit.penetration,
        });
        return;
    }
    // Inward orientation of the edge planes from the face centroid.
    let centroid = polygon_centroid(reference);
    let mut polygon: Vec<Point3<f32>> = hit.face_b.clone();
    let mut scratch = Vec::with_capacity(polygon.len() + reference.len());
    for index in 0..reference.len() {
        let edge_start = reference[index];
        let edge_end = reference[(index + 1) % reference.len()];
        let mut plane_normal = normal.cross(edge_end - edge_start);
        if plane_normal.magnitude2() < 1.0e-12 {
            continue;
        }
        plane_normal = plane_normal.normalize();
        if (centroid - edge_start).dot(plane_normal) < 0. {
            plane_normal = -plane_normal;
        }
        clip_by_plane(&polygon, edge_start, plane_normal, &mut scratch);
        ::std::mem::swap(&mut polygon, &mut scratch);
        if polygon.is_empty() {
            return;
        }
    }
    let plane_point = reference[0];
    for &point in &polygon {
        // Project the clipped point back onto A's face plane along the normal.
        let height = (point - plane_point).dot(normal);
        let position_a = point - normal * height;
        out.push(Candidate {
            position_a,
            position_b: point,
            depth: -height,
        });
    }
}

/// Keep the part of `polygon` on the positive side of the plane.
fn clip_by_plane(
    polygon: &[Point3<f32>],
    plane_point: Point3<f32>,
    plane_normal: Vector3<f32>,
    out: &mut Vec<Point3<f32>>,
) {
    out.clear();
    for index in 0..polygon.len() {
        let current = polygon[index];
        let next = polygon[(index + 1) % polygon.len()];
        let current_distance = (current - plane_point).dot(plane_normal);
        let next_distance = (next - plane_point).dot(plane_normal);
        if current_distance >= 0. {
            out.push(current);
        }
        if (current_distance > 0.) != (next_distance > 0.)
            && (next_distance - current_distance).abs() > 1.0e-12
        {
            let t = current_distance / (current_distance - next_distance);
            out.push(current + (next - current) * t);
        }
    }
}

fn polygon_centroid(polygon: &[Point3<f32>]) -> Point3<f32> {
    let mut sum = Vector3::new(0., 0., 0.);
    for point in polygon {
        sum += point - Point3::new(0., 0., 0.);
    }
    Point3::new(0., 0., 0.) + sum / polygon.len() as f32
}

/// Pick at most four candidate indices: the deepest point, the farthest
/// point from it, and the two that maximize manifold area.
fn select_points(candidates: &[Candidate]) -> Vec<usize> {
    if candidates.len() <= MAX_MANIFOLD_POINTS {
        return (0..candidates.len()).collect();
    }

    let mut selected = Vec::with_capacity(MAX_MANIFOLD_POINTS);

    let mut deepest = 0;
    for (index, candidate) in candidates.iter().enumerate() {
        if candidate.depth > candidates[deepest].depth {
            deepest = index;
        }
    }
    selected.push(deepest);
    let anchor = candidates[deepest].position_a;

    let mut farthest = None;
    let mut farthest_distance = -1f32;
    for (index, candidate) in candidates.iter().enumerate() {
        if selected.contains(&index) {
            continue;
        }
        let distance = (candidate.position_a - anchor).magnitude2();
        if distance > farthest_distance {
            farthest_distance = distance;
            farthest = Some(index);
        }
    }
    let farthest = match farthest {
        Some(index) => index,
        None => return selected,
    };
    selected.push(farthest);
    let edge = candidates[farthest].position_a - anchor;

    // Third point: largest triangle area on either side.
    let mut third = None;
    let mut third_area = 0f32;
    for (index, candidate) in candidates.iter().enumerate() {
        if selected.contains(&index) {
            continue;
        }
        let area = edge.cross(candidate.position_a - anchor).magnitude2();
        if area > third_area {
            third_area = area;
            third = Some(index);
        }
    }
    let third = match third {
        Some(index) => index,
        None => return selected,
    };
    selected.push(third);

    // Fourth point: farthest from the triangle's edges, to widen the patch.
    let triangle = [
        candidates[deepest].position_a,
        candidates[farthest].position_a,
        candidates[third].position_a,
    ];
    let mut fourth = None;
    let mut fourth_area = 0f32;
    for (index, candidate) in candidates.iter().enumerate() {
        if selected.contains(&index) {
            continue;
        }
        let mut best = 0f32;
        for corner in 0..3 {
            let start = triangle[corner];
            let end = triangle[(corner + 1) % 3];
            let area = (end - start)
                .cross(candidate.position_a - start)
                .magnitude2();
            best = best.max(area);
        }
        if best > fourth_area {
            fourth_area = best;
            fourth = Some(index);
        }
    }
    if let Some(index) = fourth {
        selected.push(index);
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use narrow::ContactHit;

    fn hit_at(x: f32, z: f32, depth: f32) -> ContactHit {
        ContactHit::new(
            Point3::new(x, depth, z),
            Point3::new(x, 0., z),
            Vector3::new(0., 1., 0.),
            depth,
        )
    }

    #[test]
    fn no_reduction_keeps_every_hit_separate() {
        let hits = vec![hit_at(0., 0., 0.1), hit_at(1., 0., 0.2)];
        let mut manifolds = Vec::new();
        reduce_hits(&hits, false, 0.996, 1.0e-3, &mut manifolds);
        assert_eq!(manifolds.len(), 2);
        assert_eq!(manifolds[0].points.len(), 1);
    }

    #[test]
    fn agreeing_normals_share_a_manifold() {
        let hits = vec![hit_at(0., 0., 0.1), hit_at(1., 0., 0.2), hit_at(0., 1., 0.05)];
        let mut manifolds = Vec::new();
        reduce_hits(&hits, true, 0.996, 1.0e-3, &mut manifolds);
        assert_eq!(manifolds.len(), 1);
        assert_eq!(manifolds[0].points.len(), 3);
    }

    #[test]
    fn disagreeing_normals_split_manifolds() {
        let mut tilted = hit_at(0., 0., 0.1);
        tilted.axis = Vector3::new(1., 0., 0.);
        let hits = vec![hit_at(0., 0., 0.1), tilted];
        let mut manifolds = Vec::new();
        reduce_hits(&hits, true, 0.996, 1.0e-3, &mut manifolds);
        assert_eq!(manifolds.len(), 2);
    }

    #[test]
    fn selection_keeps_deepest_and_extremes() {
        // A 3x3 grid of touching points with one deep point in a corner.
        let mut hits = Vec::new();
        for x in 0..3 {
            for z in 0..3 {
                let depth = if x == 0 && z == 0 { 0.3 } else { 0.01 };
                hits.push(hit_at(x as f32, z as f32, depth));
            }
        }
        let mut manifolds = Vec::new();
        reduce_hits(&hits, true, 0.996, 1.0e-3, &mut manifolds);
        assert_eq!(manifolds.len(), 1);
        let manifold = &manifolds[0];
        assert_eq!(manifold.points.len(), 4);
        // Deepest point survived.
        assert!(manifold
            .points
            .iter()
            .any(|point| point.penetration(manifold.normal) > 0.29));
        // The spread covers the far corner of the grid.
        assert!(manifold
            .points
            .iter()
            .any(|point| (point.position_b.x - 2.).abs() < 1.0e-6
                && (point.position_b.z - 2.).abs() < 1.0e-6));
    }
}
