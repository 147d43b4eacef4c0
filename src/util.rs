//! Small numeric helpers shared across modules

use cgmath::{InnerSpace, Point3, Vector3};
use collision::Aabb3;

/// Entry fraction of a segment `origin + t * displacement`, `t` in `[0, 1]`,
/// against an AABB. Parallel components outside their slab are a miss.
pub fn segment_aabb_entry(
    origin: Point3<f32>,
    displacement: Vector3<f32>,
    aabb: &Aabb3<f32>,
) -> Option<f32> {
    let mut t_min = 0f32;
    let mut t_max = 1f32;
    for axis in 0..3 {
        let start = origin[axis];
        let delta = displacement[axis];
        let (low, high) = (aabb.min[axis], aabb.max[axis]);
        if delta.abs() < 1.0e-20 {
            if start < low || start > high {
                return None;
            }
        } else {
            let inverse = 1. / delta;
            let mut t_low = (low - start) * inverse;
            let mut t_high = (high - start) * inverse;
            if t_low > t_high {
                ::std::mem::swap(&mut t_low, &mut t_high);
            }
            t_min = t_min.max(t_low);
            t_max = t_max.min(t_high);
            if t_min > t_max {
                return None;
            }
        }
    }
    Some(t_min)
}

/// Fraction along a segment `origin + t * displacement` at which it crosses
/// a triangle, if it does. Rays parallel to the triangle plane miss.
pub fn segment_triangle_intersection(
    origin: Point3<f32>,
    displacement: Vector3<f32>,
    a: Point3<f32>,
    b: Point3<f32>,
    c: Point3<f32>,
) -> Option<f32> {
    let edge1 = b - a;
    let edge2 = c - a;
    let p = displacement.cross(edge2);
    let determinant = edge1.dot(p);
    if determinant.abs() < 1.0e-12 {
        return None;
    }
    let inverse = 1. / determinant;
    let s = origin - a;
    let u = s.dot(p) * inverse;
    if u < 0. || u > 1. {
        return None;
    }
    let q = s.cross(edge1);
    let v = displacement.dot(q) * inverse;
    if v < 0. || u + v > 1. {
        return None;
    }
    let t = edge2.dot(q) * inverse;
    if t < 0. || t > 1. {
        return None;
    }
    Some(t)
}

/// Two unit vectors orthogonal to `normal` and each other.
///
/// `normal` must be unit length.
pub fn orthonormal_basis(normal: Vector3<f32>) -> (Vector3<f32>, Vector3<f32>) {
    // Pick the world axis least aligned with the normal as the seed.
    let seed = if normal.x.abs() < 0.57 {
        Vector3::new(1., 0., 0.)
    } else if normal.y.abs() < 0.57 {
        Vector3::new(0., 1., 0.)
    } else {
        Vector3::new(0., 0., 1.)
    };
    let tangent = normal.cross(seed).normalize();
    let bitangent = normal.cross(tangent);
    (tangent, bitangent)
}

/// Manhattan distance between two points.
pub fn manhattan_distance(a: Point3<f32>, b: Point3<f32>) -> f32 {
    (a.x - b.x).abs() + (a.y - b.y).abs() + (a.z - b.z).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::InnerSpace;

    #[test]
    fn segment_entry_hits_front_face() {
        let aabb = Aabb3::new(Point3::new(-1., -1., -1.), Point3::new(1., 1., 1.));
        let t = segment_aabb_entry(
            Point3::new(0., 0., -10.),
            Vector3::new(0., 0., 20.),
            &aabb,
        ).unwrap();
        assert!((t - 0.45).abs() < 1.0e-6);
    }

    #[test]
    fn parallel_segment_outside_slab_misses() {
        let aabb = Aabb3::new(Point3::new(-1., -1., -1.), Point3::new(1., 1., 1.));
        assert!(
            segment_aabb_entry(Point3::new(5., 0., -10.), Vector3::new(0., 0., 20.), &aabb)
                .is_none()
        );
    }

    #[test]
    fn basis_is_orthonormal() {
        for &normal in &[
            Vector3::new(0., 1., 0.),
            Vector3::new(1., 0., 0.),
            Vector3::new(0.267, 0.534, 0.802),
        ] {
            let (t, b) = orthonormal_basis(normal);
            assert!(normal.dot(t).abs() < 1.0e-5);
            assert!(normal.dot(b).abs() < 1.0e-5);
            assert!(t.dot(b).abs() < 1.0e-5);
            assert!((t.magnitude() - 1.).abs() < 1.0e-5);
        }
    }
}
