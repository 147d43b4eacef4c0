//! Built in pairwise collide functions
//!
//! Cover the primitive shape pairs the engine ships with. Every function
//! reports hits with the penetration axis pointing from the first shape
//! toward the second, keeps speculative hits up to the settings' separation,
//! and recovers locally from degenerate configurations.

use cgmath::{InnerSpace, Matrix3, Point3, Vector3};

use narrow::{CollideSettings, ContactHit, Shape};
use pose::BodyPose;

/// Relative preference for face contacts over edge contacts, so manifolds
/// stay stable when the two are nearly tied.
const EDGE_VS_FACE_TOLERANCE: f32 = 1.0e-4;

pub fn sphere_sphere(
    shape_a: &Shape,
    pose_a: &BodyPose,
    shape_b: &Shape,
    pose_b: &BodyPose,
    settings: &CollideSettings,
    out: &mut Vec<ContactHit>,
) {
    let (radius_a, radius_b) = match (shape_a, shape_b) {
        (&Shape::Sphere { radius: ra }, &Shape::Sphere { radius: rb }) => (ra, rb),
        _ => return,
    };
    let delta = pose_b.position - pose_a.position;
    let distance = delta.magnitude();
    let penetration = radius_a + radius_b - distance;
    if penetration < -settings.max_separation {
        return;
    }
    let axis = if distance > 1.0e-6 {
        delta / distance
    } else {
        // Concentric spheres: any axis works, pick a fixed one.
        Vector3::new(1., 0., 0.)
    };
    out.push(ContactHit::new(
        pose_a.position + axis * radius_a,
        pose_b.position - axis * radius_b,
        axis,
        penetration,
    ));
}

pub fn sphere_half_space(
    shape_a: &Shape,
    pose_a: &BodyPose,
    shape_b: &Shape,
    pose_b: &BodyPose,
    settings: &CollideSettings,
    out: &mut Vec<ContactHit>,
) {
    let radius = match *shape_a {
        Shape::Sphere { radius } => radius,
        _ => return,
    };
    let normal = match *shape_b {
        Shape::HalfSpace { normal } => pose_b.transform_vector(normal),
        _ => return,
    };
    let distance = (pose_a.position - pose_b.position).dot(normal) - radius;
    if distance > settings.max_separation {
        return;
    }
    let point_a = pose_a.position - normal * radius;
    out.push(ContactHit::new(
        point_a,
        point_a - normal * distance,
        -normal,
        -distance,
    ));
}

pub fn sphere_cuboid(
    shape_a: &Shape,
    pose_a: &BodyPose,
    shape_b: &Shape,
    pose_b: &BodyPose,
    settings: &CollideSettings,
    out: &mut Vec<ContactHit>,
) {
    let radius = match *shape_a {
        Shape::Sphere { radius } => radius,
        _ => return,
    };
    let half_extents = match *shape_b {
        Shape::Cuboid { half_extents } => half_extents,
        _ => return,
    };
    // Work in the box frame.
    let center = pose_b.inverse_transform_point(pose_a.position);
    let clamped = Point3::new(
        center.x.max(-half_extents.x).min(half_extents.x),
        center.y.max(-half_extents.y).min(half_extents.y),
        center.z.max(-half_extents.z).min(half_extents.z),
    );
    let delta = center - clamped;
    let distance_sq = delta.magnitude2();
    if distance_sq > 1.0e-12 {
        // Sphere center outside the box.
        let distance = distance_sq.sqrt();
        let penetration = radius - distance;
        if penetration < -settings.max_separation {
            return;
        }
        let outward = pose_b.transform_vector(delta / distance);
        out.push(ContactHit::new(
            pose_a.position - outward * radius,
            pose_b.transform_point(clamped),
            -outward,
            penetration,
        ));
    } else {
        // Center inside: push out through the nearest face.
        let mut best_axis = 0;
        let mut best_depth = half_extents.x - center.x.abs();
        for axis in 1..3 {
            let depth = half_extents[axis] - center[axis].abs();
            if depth < best_depth {
                best_depth = depth;
                best_axis = axis;
            }
        }
        let mut local_normal = Vector3::new(0., 0., 0.);
        local_normal[best_axis] = if center[best_axis] >= 0. { 1. } else { -1. };
        let outward = pose_b.transform_vector(local_normal);
        let mut surface = center;
        surface[best_axis] = half_extents[best_axis] * local_normal[best_axis];
        out.push(ContactHit::new(
            pose_a.position - outward * radius,
            pose_b.transform_point(surface),
            -outward,
            radius + best_depth,
        ));
    }
}

pub fn cuboid_half_space(
    shape_a: &Shape,
    pose_a: &BodyPose,
    shape_b: &Shape,
    pose_b: &BodyPose,
    settings: &CollideSettings,
    out: &mut Vec<ContactHit>,
) {
    let half_extents = match *shape_a {
        Shape::Cuboid { half_extents } => half_extents,
        _ => return,
    };
    let normal = match *shape_b {
        Shape::HalfSpace { normal } => pose_b.transform_vector(normal),
        _ => return,
    };
    let rotation = Matrix3::from(pose_a.rotation);
    for &sx in &[-1f32, 1.] {
        for &sy in &[-1f32, 1.] {
            for &sz in &[-1f32, 1.] {
                let corner = pose_a.position
                    + rotation.x * (sx * half_extents.x)
                    + rotation.y * (sy * half_extents.y)
                    + rotation.z * (sz * half_extents.z);
                let distance = (corner - pose_b.position).dot(normal);
                if distance <= settings.max_separation {
                    out.push(ContactHit::new(
                        corner,
                        corner - normal * distance,
                        -normal,
                        -distance,
                    ));
                }
            }
        }
    }
}

pub fn capsule_sphere(
    shape_a: &Shape,
    pose_a: &BodyPose,
    shape_b: &Shape,
    pose_b: &BodyPose,
    settings: &CollideSettings,
    out: &mut Vec<ContactHit>,
) {
    let (half_height, radius_a) = match *shape_a {
        Shape::Capsule {
            half_height,
            radius,
        } => (half_height, radius),
        _ => return,
    };
    let radius_b = match *shape_b {
        Shape::Sphere { radius } => radius,
        _ => return,
    };
    let axis = pose_a.transform_vector(Vector3::new(0., 1., 0.));
    let top = pose_a.position + axis * half_height;
    let bottom = pose_a.position - axis * half_height;
    let on_segment = closest_point_on_segment(pose_b.position, bottom, top);
    let delta = pose_b.position - on_segment;
    let distance = delta.magnitude();
    let penetration = radius_a + radius_b - distance;
    if penetration < -settings.max_separation {
        return;
    }
    let direction = if distance > 1.0e-6 {
        delta / distance
    } else {
        Vector3::new(1., 0., 0.)
    };
    out.push(ContactHit::new(
        on_segment + direction * radius_a,
        pose_b.position - direction * radius_b,
        direction,
        penetration,
    ));
}

pub fn capsule_capsule(
    shape_a: &Shape,
    pose_a: &BodyPose,
    shape_b: &Shape,
    pose_b: &BodyPose,
    settings: &CollideSettings,
    out: &mut Vec<ContactHit>,
) {
    let (half_a, radius_a) = match *shape_a {
        Shape::Capsule {
            half_height,
            radius,
        } => (half_height, radius),
        _ => return,
    };
    let (half_b, radius_b) = match *shape_b {
        Shape::Capsule {
            half_height,
            radius,
        } => (half_height, radius),
        _ => return,
    };
    let axis_a = pose_a.transform_vector(Vector3::new(0., 1., 0.));
    let axis_b = pose_b.transform_vector(Vector3::new(0., 1., 0.));
    let (on_a, on_b) = closest_points_between_segments(
        pose_a.position - axis_a * half_a,
        pose_a.position + axis_a * half_a,
        pose_b.position - axis_b * half_b,
        pose_b.position + axis_b * half_b,
    );
    let delta = on_b - on_a;
    let distance = delta.magnitude();
    let penetration = radius_a + radius_b - distance;
    if penetration < -settings.max_separation {
        return;
    }
    let direction = if distance > 1.0e-6 {
        delta / distance
    } else {
        Vector3::new(1., 0., 0.)
    };
    out.push(ContactHit::new(
        on_a + direction * radius_a,
        on_b - direction * radius_b,
        direction,
        penetration,
    ));
}

pub fn capsule_half_space(
    shape_a: &Shape,
    pose_a: &BodyPose,
    shape_b: &Shape,
    pose_b: &BodyPose,
    settings: &CollideSettings,
    out: &mut Vec<ContactHit>,
) {
    let (half_height, radius) = match *shape_a {
        Shape::Capsule {
            half_height,
            radius,
        } => (half_height, radius),
        _ => return,
    };
    let normal = match *shape_b {
        Shape::HalfSpace { normal } => pose_b.transform_vector(normal),
        _ => return,
    };
    let axis = pose_a.transform_vector(Vector3::new(0., 1., 0.));
    for &end in &[
        pose_a.position + axis * half_height,
        pose_a.position - axis * half_height,
    ] {
        let distance = (end - pose_b.position).dot(normal) - radius;
        if distance <= settings.max_separation {
            let point_a = end - normal * radius;
            out.push(ContactHit::new(
                point_a,
                point_a - normal * distance,
                -normal,
                -distance,
            ));
        }
    }
}

/// Half spaces never generate contacts against each other; registered so
/// worlds containing several planes pass the dispatch check.
pub fn half_space_half_space(
    _shape_a: &Shape,
    _pose_a: &BodyPose,
    _shape_b: &Shape,
    _pose_b: &BodyPose,
    _settings: &CollideSettings,
    _out: &mut Vec<ContactHit>,
) {
}

pub fn cuboid_cuboid(
    shape_a: &Shape,
    pose_a: &BodyPose,
    shape_b: &Shape,
    pose_b: &BodyPose,
    settings: &CollideSettings,
    out: &mut Vec<ContactHit>,
) {
    let half_a = match *shape_a {
        Shape::Cuboid { half_extents } => half_extents,
        _ => return,
    };
    let half_b = match *shape_b {
        Shape::Cuboid { half_extents } => half_extents,
        _ => return,
    };
    let rotation_a = Matrix3::from(pose_a.rotation);
    let rotation_b = Matrix3::from(pose_b.rotation);
    let axes_a = [rotation_a.x, rotation_a.y, rotation_a.z];
    let axes_b = [rotation_b.x, rotation_b.y, rotation_b.z];
    let delta = pose_b.position - pose_a.position;

    let separation_on = |axis: Vector3<f32>| -> f32 {
        let radius_a = half_a.x * axes_a[0].dot(axis).abs()
            + half_a.y * axes_a[1].dot(axis).abs()
            + half_a.z * axes_a[2].dot(axis).abs();
        let radius_b = half_b.x * axes_b[0].dot(axis).abs()
            + half_b.y * axes_b[1].dot(axis).abs()
            + half_b.z * axes_b[2].dot(axis).abs();
        delta.dot(axis).abs() - radius_a - radius_b
    };

    // Face axes of both boxes: keep the largest separation (least overlap).
    let mut best_face_separation = ::std::f32::MIN;
    let mut best_face = (0usize, true); // (axis index, reference is A)
    for index in 0..3 {
        let separation = separation_on(axes_a[index]);
        if separation > settings.max_separation {
            return;
        }
        if separation > best_face_separation {
            best_face_separation = separation;
            best_face = (index, true);
        }
        let separation = separation_on(axes_b[index]);
        if separation > settings.max_separation {
            return;
        }
        if separation > best_face_separation {
            best_face_separation = separation;
            best_face = (index, false);
        }
    }

    // Edge cross axes.
    let mut best_edge_separation = ::std::f32::MIN;
    let mut best_edge = (0usize, 0usize, Vector3::new(0., 0., 0.));
    for i in 0..3 {
        for j in 0..3 {
            let cross = axes_a[i].cross(axes_b[j]);
            let length = cross.magnitude();
            if length < 1.0e-6 {
                // Parallel edges; the face axes cover this direction.
                continue;
            }
            let axis = cross / length;
            let separation = separation_on(axis);
            if separation > settings.max_separation {
                return;
            }
            if separation > best_edge_separation {
                best_edge_separation = separation;
                best_edge = (i, j, axis);
            }
        }
    }

    if best_edge_separation > best_face_separation + EDGE_VS_FACE_TOLERANCE {
        // Edge-edge contact: closest points of the two supporting edges.
        let (i, j, mut axis) = best_edge;
        if axis.dot(delta) < 0. {
            axis = -axis;
        }
        let edge_a = supporting_edge(pose_a, &axes_a, half_a, i, axis);
        let edge_b = supporting_edge(pose_b, &axes_b, half_b, j, -axis);
        let (on_a, on_b) = closest_points_between_segments(edge_a.0, edge_a.1, edge_b.0, edge_b.1);
        out.push(ContactHit::new(on_a, on_b, axis, -best_edge_separation));
        return;
    }

    // Face contact: clip the incident face against the reference face sides.
    let (face_axis, reference_is_a) = best_face;
    let (reference_pose, reference_axes, reference_half, incident_pose, incident_axes, incident_half) =
        if reference_is_a {
            (pose_a, &axes_a, half_a, pose_b, &axes_b, half_b)
        } else {
            (pose_b, &axes_b, half_b, pose_a, &axes_a, half_a)
        };
    let toward_other = if reference_is_a { delta } else { -delta };
    let reference_sign = if reference_axes[face_axis].dot(toward_other) >= 0. {
        1.
    } else {
        -1.
    };
    let reference_normal = reference_axes[face_axis] * reference_sign;

    // Incident face: the one most anti-parallel to the reference normal.
    let mut incident_axis = 0;
    let mut incident_alignment = ::std::f32::MAX;
    for index in 0..3 {
        let alignment = incident_axes[index].dot(reference_normal);
        if alignment.abs() > incident_alignment.abs() || incident_alignment == ::std::f32::MAX {
            incident_alignment = alignment;
            incident_axis = index;
        }
    }
    let incident_sign = if incident_alignment >= 0. { -1. } else { 1. };

    let mut polygon = face_corners(incident_pose, incident_axes, incident_half, incident_axis, incident_sign);
    let face_center = reference_pose.position
        + reference_normal * reference_half[face_axis];
    let side_u = (face_axis + 1) % 3;
    let side_v = (face_axis + 2) % 3;
    let mut scratch = Vec::with_capacity(8);
    for &(direction, limit) in &[
        (reference_axes[side_u], reference_half[side_u]),
        (-reference_axes[side_u], reference_half[side_u]),
        (reference_axes[side_v], reference_half[side_v]),
        (-reference_axes[side_v], reference_half[side_v]),
    ] {
        clip_against_side(&polygon, direction, face_center, limit, &mut scratch);
        ::std::mem::swap(&mut polygon, &mut scratch);
        if polygon.is_empty() {
            return;
        }
    }

    for &point in &polygon {
        let separation = (point - face_center).dot(reference_normal);
        if separation > settings.max_separation {
            continue;
        }
        let projected = point - reference_normal * separation;
        let (point_a, point_b, axis) = if reference_is_a {
            (projected, point, reference_normal)
        } else {
            (point, projected, -reference_normal)
        };
        out.push(ContactHit::new(point_a, point_b, axis, -separation));
    }
}

/// The supporting edge of a box along `direction`: the edge parallel to the
/// box axis `edge_axis` on the corner extremal in `direction`.
fn supporting_edge(
    pose: &BodyPose,
    axes: &[Vector3<f32>; 3],
    half: Vector3<f32>,
    edge_axis: usize,
    direction: Vector3<f32>,
) -> (Point3<f32>, Point3<f32>) {
    let mut center = pose.position;
    for index in 0..3 {
        if index == edge_axis {
            continue;
        }
        let sign = if axes[index].dot(direction) >= 0. { 1. } else { -1. };
        center += axes[index] * (sign * half[index]);
    }
    let along = axes[edge_axis] * half[edge_axis];
    (center + -along, center + along)
}

/// World corners of a box face, wound around the face.
fn face_corners(
    pose: &BodyPose,
    axes: &[Vector3<f32>; 3],
    half: Vector3<f32>,
    face_axis: usize,
    sign: f32,
) -> Vec<Point3<f32>> {
    let u = (face_axis + 1) % 3;
    let v = (face_axis + 2) % 3;
    let center = pose.position + axes[face_axis] * (sign * half[face_axis]);
    let du = axes[u] * half[u];
    let dv = axes[v] * half[v];
    vec![
        center + du + dv,
        center + -du + dv,
        center + -du + -dv,
        center + du + -dv,
    ]
}

/// Keep the part of `polygon` with `(p - origin) . direction <= limit`.
fn clip_against_side(
    polygon: &[Point3<f32>],
    direction: Vector3<f32>,
    origin: Point3<f32>,
    limit: f32,
    out: &mut Vec<Point3<f32>>,
) {
    out.clear();
    for index in 0..polygon.len() {
        let current = polygon[index];
        let next = polygon[(index + 1) % polygon.len()];
        let current_distance = (current - origin).dot(direction) - limit;
        let next_distance = (next - origin).dot(direction) - limit;
        if current_distance <= 0. {
            out.push(current);
        }
        if (current_distance < 0.) != (next_distance < 0.)
            && (next_distance - current_distance).abs() > 1.0e-12
        {
            let t = current_distance / (current_distance - next_distance);
            out.push(current + (next - current) * t);
        }
    }
}

fn closest_point_on_segment(
    point: Point3<f32>,
    start: Point3<f32>,
    end: Point3<f32>,
) -> Point3<f32> {
    let axis = end - start;
    let length_sq = axis.magnitude2();
    if length_sq < 1.0e-12 {
        return start;
    }
    let t = ((point - start).dot(axis) / length_sq).max(0.).min(1.);
    start + axis * t
}

/// Closest points between two segments (Ericson, Real-Time Collision
/// Detection 5.1.9).
fn closest_points_between_segments(
    p1: Point3<f32>,
    q1: Point3<f32>,
    p2: Point3<f32>,
    q2: Point3<f32>,
) -> (Point3<f32>, Point3<f32>) {
    let d1 = q1 - p1;
    let d2 = q2 - p2;
    let r = p1 - p2;
    let a = d1.magnitude2();
    let e = d2.magnitude2();
    let f = d2.dot(r);

    let (mut s, mut t);
    if a <= 1.0e-12 && e <= 1.0e-12 {
        return (p1, p2);
    }
    if a <= 1.0e-12 {
        s = 0.;
        t = (f / e).max(0.).min(1.);
    } else {
        let c = d1.dot(r);
        if e <= 1.0e-12 {
            t = 0.;
            s = (-c / a).max(0.).min(1.);
        } else {
            let b = d1.dot(d2);
            let denominator = a * e - b * b;
            s = if denominator > 1.0e-12 {
                ((b * f - c * e) / denominator).max(0.).min(1.)
            } else {
                0.
            };
            t = (b * s + f) / e;
            if t < 0. {
                t = 0.;
                s = (-c / a).max(0.).min(1.);
            } else if t > 1. {
                t = 1.;
                s = ((b - c) / a).max(0.).min(1.);
            }
        }
    }
    (p1 + d1 * s, p2 + d2 * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{Quaternion, Rad, Rotation3};
    use narrow::CollideSettings;

    fn settings() -> CollideSettings {
        CollideSettings {
            max_separation: 0.02,
        }
    }

    #[test]
    fn overlapping_spheres_produce_one_hit() {
        let mut hits = Vec::new();
        sphere_sphere(
            &Shape::sphere(1.),
            &BodyPose::new(Point3::new(0., 0., 0.), Quaternion::new(1., 0., 0., 0.)),
            &Shape::sphere(1.),
            &BodyPose::new(Point3::new(1.5, 0., 0.), Quaternion::new(1., 0., 0., 0.)),
            &settings(),
            &mut hits,
        );
        assert_eq!(hits.len(), 1);
        let hit = &hits[0];
        assert!((hit.penetration - 0.5).abs() < 1.0e-6);
        assert!((hit.axis - Vector3::new(1., 0., 0.)).magnitude() < 1.0e-6);
        assert!((hit.point_a.x - 1.).abs() < 1.0e-6);
        assert!((hit.point_b.x - 0.5).abs() < 1.0e-6);
    }

    #[test]
    fn separated_spheres_within_speculative_margin_report_negative_penetration() {
        let mut hits = Vec::new();
        sphere_sphere(
            &Shape::sphere(0.5),
            &BodyPose::one(),
            &Shape::sphere(0.5),
            &BodyPose::new(Point3::new(1.01, 0., 0.), Quaternion::new(1., 0., 0., 0.)),
            &settings(),
            &mut hits,
        );
        assert_eq!(hits.len(), 1);
        assert!(hits[0].penetration < 0.);
        assert!(hits[0].penetration >= -0.02);
    }

    #[test]
    fn resting_cube_on_plane_touches_with_four_corners() {
        let mut hits = Vec::new();
        cuboid_half_space(
            &Shape::cuboid(Vector3::new(0.5, 0.5, 0.5)),
            &BodyPose::new(Point3::new(0., 0.5, 0.), Quaternion::new(1., 0., 0., 0.)),
            &Shape::half_space(Vector3::new(0., 1., 0.)),
            &BodyPose::one(),
            &settings(),
            &mut hits,
        );
        assert_eq!(hits.len(), 4);
        for hit in &hits {
            assert!(hit.penetration.abs() < 1.0e-5);
            assert!((hit.axis - Vector3::new(0., -1., 0.)).magnitude() < 1.0e-6);
        }
    }

    #[test]
    fn stacked_cubes_touch_face_to_face() {
        let mut hits = Vec::new();
        cuboid_cuboid(
            &Shape::cuboid(Vector3::new(0.5, 0.5, 0.5)),
            &BodyPose::new(Point3::new(0., 0.5, 0.), Quaternion::new(1., 0., 0., 0.)),
            &Shape::cuboid(Vector3::new(0.5, 0.5, 0.5)),
            &BodyPose::new(Point3::new(0., 1.5, 0.), Quaternion::new(1., 0., 0., 0.)),
            &settings(),
            &mut hits,
        );
        // Four corners of the shared face.
        assert_eq!(hits.len(), 4);
        for hit in &hits {
            assert!(hit.penetration.abs() < 1.0e-5);
            assert!((hit.axis - Vector3::new(0., 1., 0.)).magnitude() < 1.0e-6);
            assert!((hit.point_a.y - 1.).abs() < 1.0e-5);
        }
    }

    #[test]
    fn offset_boxes_clip_to_the_overlap_region() {
        let mut hits = Vec::new();
        cuboid_cuboid(
            &Shape::cuboid(Vector3::new(0.5, 0.5, 0.5)),
            &BodyPose::new(Point3::new(0., 0., 0.), Quaternion::new(1., 0., 0., 0.)),
            &Shape::cuboid(Vector3::new(0.5, 0.5, 0.5)),
            &BodyPose::new(Point3::new(0.6, 0.95, 0.), Quaternion::new(1., 0., 0., 0.)),
            &settings(),
            &mut hits,
        );
        assert!(!hits.is_empty());
        for hit in &hits {
            // Clipped points stay inside the x overlap of the two boxes.
            assert!(hit.point_b.x >= 0.1 - 1.0e-5 && hit.point_b.x <= 0.5 + 1.0e-5);
            assert!((hit.penetration - 0.05).abs() < 1.0e-5);
        }
    }

    #[test]
    fn rotated_box_hits_edge_on() {
        // A box rotated 45 degrees about z rests its edge on the other box.
        let rotated = Quaternion::from_angle_z(Rad(::std::f32::consts::FRAC_PI_4));
        let mut hits = Vec::new();
        cuboid_cuboid(
            &Shape::cuboid(Vector3::new(2., 0.5, 2.)),
            &BodyPose::new(Point3::new(0., 0., 0.), Quaternion::new(1., 0., 0., 0.)),
            &Shape::cuboid(Vector3::new(0.5, 0.5, 0.5)),
            &BodyPose::new(
                Point3::new(0., 0.5 + ::std::f32::consts::FRAC_1_SQRT_2 - 0.01, 0.),
                rotated,
            ),
            &settings(),
            &mut hits,
        );
        assert!(!hits.is_empty());
        for hit in &hits {
            assert!(hit.axis.y > 0.9);
            assert!(hit.penetration > 0.);
        }
    }

    #[test]
    fn capsule_rests_on_plane_with_both_caps() {
        let lying = Quaternion::from_angle_z(Rad(::std::f32::consts::FRAC_PI_2));
        let mut hits = Vec::new();
        capsule_half_space(
            &Shape::capsule(0.5, 0.25),
            &BodyPose::new(Point3::new(0., 0.25, 0.), lying),
            &Shape::half_space(Vector3::new(0., 1., 0.)),
            &BodyPose::one(),
            &settings(),
            &mut hits,
        );
        assert_eq!(hits.len(), 2);
        for hit in &hits {
            assert!(hit.penetration.abs() < 1.0e-5);
        }
    }
}
