//! Narrow phase
//!
//! Shapes, the pairwise collide dispatch table, and manifold reduction.
//! The solver core only consumes [`ContactHit`](struct.ContactHit.html)s;
//! new shape types can be supported by registering collide functions for
//! their pairs, with reversed wrappers installed automatically.

pub mod manifold;
mod primitives;

use std::f32;

use cgmath::{InnerSpace, Matrix3, Point3, Vector3};
use collision::{Aabb, Aabb3};

use error::ConfigurationError;
use pose::BodyPose;

/// Half extent used for the unbounded half space shape's AABB.
const HALF_SPACE_EXTENT: f32 = 1.0e6;

/// Density used when computing mass from shape volume, kg/m^3.
const DEFAULT_DENSITY: f32 = 1000.;

/// Number of shape type tags; sizes the dispatch table.
pub const SHAPE_TYPE_COUNT: usize = 4;

/// Tag of a [`Shape`](enum.Shape.html) variant, the dispatch table key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeType {
    /// Sphere.
    Sphere = 0,
    /// Axis aligned box in body space.
    Cuboid = 1,
    /// Capsule around the local Y axis.
    Capsule = 2,
    /// Infinite half space below a plane.
    HalfSpace = 3,
}

/// Collision shape of a body.
#[derive(Clone, Debug)]
pub enum Shape {
    /// Sphere of the given radius centered on the body origin.
    Sphere {
        /// Radius.
        radius: f32,
    },
    /// Box with the given half extents centered on the body origin.
    Cuboid {
        /// Half extent on each local axis.
        half_extents: Vector3<f32>,
    },
    /// Capsule: segment of `2 * half_height` along local Y, swept by `radius`.
    Capsule {
        /// Half the segment length.
        half_height: f32,
        /// Sweep radius.
        radius: f32,
    },
    /// All points below the plane through the body origin with the given
    /// local normal. Static only.
    HalfSpace {
        /// Outward plane normal in body space, unit length.
        normal: Vector3<f32>,
    },
}

/// A support point of a convex shape: the core point plus the convex radius
/// swept around it.
#[derive(Clone, Copy, Debug)]
pub struct SupportPoint {
    /// Core point in body space.
    pub point: Point3<f32>,
    /// Radius swept around the core point.
    pub convex_radius: f32,
}

/// Mass and body space inertia computed from a shape.
#[derive(Clone, Copy, Debug)]
pub struct MassProperties {
    /// Mass in kilograms.
    pub mass: f32,
    /// Diagonal of the inertia tensor in body space.
    pub inertia: Vector3<f32>,
}

impl Shape {
    /// Sphere of the given radius.
    pub fn sphere(radius: f32) -> Self {
        Shape::Sphere { radius }
    }

    /// Box with the given half extents.
    pub fn cuboid(half_extents: Vector3<f32>) -> Self {
        Shape::Cuboid { half_extents }
    }

    /// Capsule along local Y.
    pub fn capsule(half_height: f32, radius: f32) -> Self {
        Shape::Capsule {
            half_height,
            radius,
        }
    }

    /// Half space below the plane with the given normal.
    pub fn half_space(normal: Vector3<f32>) -> Self {
        Shape::HalfSpace {
            normal: normal.normalize(),
        }
    }

    /// Dispatch tag of this shape.
    pub fn shape_type(&self) -> ShapeType {
        match *self {
            Shape::Sphere { .. } => ShapeType::Sphere,
            Shape::Cuboid { .. } => ShapeType::Cuboid,
            Shape::Capsule { .. } => ShapeType::Capsule,
            Shape::HalfSpace { .. } => ShapeType::HalfSpace,
        }
    }

    /// Body space bounding box.
    pub fn local_aabb(&self) -> Aabb3<f32> {
        let extent = match *self {
            Shape::Sphere { radius } => Vector3::new(radius, radius, radius),
            Shape::Cuboid { half_extents } => half_extents,
            Shape::Capsule {
                half_height,
                radius,
            } => Vector3::new(radius, half_height + radius, radius),
            Shape::HalfSpace { .. } => {
                Vector3::new(HALF_SPACE_EXTENT, HALF_SPACE_EXTENT, HALF_SPACE_EXTENT)
            }
        };
        Aabb3::new(
            Point3::new(-extent.x, -extent.y, -extent.z),
            Point3::new(extent.x, extent.y, extent.z),
        )
    }

    /// World space bounding box under a pose. Conservative for rotated
    /// shapes: the local AABB extents are pushed through the absolute value
    /// of the rotation matrix.
    pub fn world_aabb(&self, pose: &BodyPose) -> Aabb3<f32> {
        let local = self.local_aabb();
        let extent = local.dim() * 0.5;
        let rotation = Matrix3::from(pose.rotation);
        let world_extent = Vector3::new(
            rotation.x.x.abs() * extent.x
                + rotation.y.x.abs() * extent.y
                + rotation.z.x.abs() * extent.z,
            rotation.x.y.abs() * extent.x
                + rotation.y.y.abs() * extent.y
                + rotation.z.y.abs() * extent.z,
            rotation.x.z.abs() * extent.x
                + rotation.y.z.abs() * extent.y
                + rotation.z.z.abs() * extent.z,
        );
        Aabb3::new(pose.position + -world_extent, pose.position + world_extent)
    }

    /// Support point of a convex shape in the given body space direction.
    ///
    /// `None` for the half space, which is not convex-queryable.
    pub fn support(&self, direction: Vector3<f32>) -> Option<SupportPoint> {
        match *self {
            Shape::Sphere { radius } => Some(SupportPoint {
                point: Point3::new(0., 0., 0.),
                convex_radius: radius,
            }),
            Shape::Cuboid { half_extents } => Some(SupportPoint {
                point: Point3::new(
                    half_extents.x.copysign(direction.x),
                    half_extents.y.copysign(direction.y),
                    half_extents.z.copysign(direction.z),
                ),
                convex_radius: 0.,
            }),
            Shape::Capsule {
                half_height,
                radius,
            } => Some(SupportPoint {
                point: Point3::new(0., half_height.copysign(direction.y), 0.),
                convex_radius: radius,
            }),
            Shape::HalfSpace { .. } => None,
        }
    }

    /// Radius of the largest sphere centered on the body origin that fits
    /// inside the shape.
    pub fn inner_radius(&self) -> f32 {
        match *self {
            Shape::Sphere { radius } => radius,
            Shape::Cuboid { half_extents } => {
                half_extents.x.min(half_extents.y).min(half_extents.z)
            }
            Shape::Capsule { radius, .. } => radius,
            Shape::HalfSpace { .. } => 0.,
        }
    }

    /// Outward surface normal at a world space point on (or near) the
    /// shape's surface.
    pub fn surface_normal(&self, pose: &BodyPose, point: Point3<f32>) -> Vector3<f32> {
        let local = pose.inverse_transform_point(point);
        let local_vec = local - Point3::new(0., 0., 0.);
        let local_normal = match *self {
            Shape::Sphere { .. } => {
                if local_vec.magnitude2() > 1.0e-12 {
                    local_vec.normalize()
                } else {
                    Vector3::new(0., 1., 0.)
                }
            }
            Shape::Cuboid { half_extents } => {
                // The face the point is closest to, by relative depth.
                let mut best_axis = 0;
                let mut best_ratio = local.x.abs() / half_extents.x;
                for axis in 1..3 {
                    let ratio = local[axis].abs() / half_extents[axis];
                    if ratio > best_ratio {
                        best_ratio = ratio;
                        best_axis = axis;
                    }
                }
                let mut normal = Vector3::new(0., 0., 0.);
                normal[best_axis] = if local[best_axis] >= 0. { 1. } else { -1. };
                normal
            }
            Shape::Capsule { half_height, .. } => {
                let clamped = local.y.max(-half_height).min(half_height);
                let delta = Vector3::new(local.x, local.y - clamped, local.z);
                if delta.magnitude2() > 1.0e-12 {
                    delta.normalize()
                } else {
                    Vector3::new(0., 1., 0.)
                }
            }
            Shape::HalfSpace { normal } => normal,
        };
        pose.transform_vector(local_normal)
    }

    /// The face of the shape that supports contacts in the given world
    /// space direction, wound as a polygon. Shapes without flat faces
    /// (spheres, capsules) leave `out` empty.
    pub fn supporting_face(
        &self,
        pose: &BodyPose,
        direction: Vector3<f32>,
        out: &mut Vec<Point3<f32>>,
    ) {
        out.clear();
        if let Shape::Cuboid { half_extents } = *self {
            let local_direction = pose.inverse_transform_vector(direction);
            let mut face_axis = 0;
            let mut best = local_direction.x.abs();
            for axis in 1..3 {
                if local_direction[axis].abs() > best {
                    best = local_direction[axis].abs();
                    face_axis = axis;
                }
            }
            let sign = if local_direction[face_axis] >= 0. { 1. } else { -1. };
            let u = (face_axis + 1) % 3;
            let v = (face_axis + 2) % 3;
            let mut center = Vector3::new(0., 0., 0.);
            center[face_axis] = sign * half_extents[face_axis];
            let mut du = Vector3::new(0., 0., 0.);
            du[u] = half_extents[u];
            let mut dv = Vector3::new(0., 0., 0.);
            dv[v] = half_extents[v];
            for &(su, sv) in &[(1., 1.), (-1., 1.), (-1., -1.), (1., -1.)] {
                out.push(pose.transform_point(
                    Point3::new(0., 0., 0.) + center + du * su + dv * sv,
                ));
            }
        }
    }

    /// Fraction along `origin + t * direction * length`, `t` in `[0, 1]`,
    /// at which the ray enters the shape, if it does. Rays starting inside
    /// report fraction 0.
    pub fn cast_ray(
        &self,
        pose: &BodyPose,
        origin: Point3<f32>,
        direction: Vector3<f32>,
        length: f32,
    ) -> Option<f32> {
        let local_origin = pose.inverse_transform_point(origin);
        let local_displacement = pose.inverse_transform_vector(direction * length);
        match *self {
            Shape::Sphere { radius } => {
                ray_sphere(local_origin, local_displacement, Point3::new(0., 0., 0.), radius)
            }
            Shape::Cuboid { half_extents } => ::util::segment_aabb_entry(
                local_origin,
                local_displacement,
                &Aabb3::new(
                    Point3::new(-half_extents.x, -half_extents.y, -half_extents.z),
                    Point3::new(half_extents.x, half_extents.y, half_extents.z),
                ),
            ),
            Shape::Capsule {
                half_height,
                radius,
            } => {
                let mut best: Option<f32> = None;
                for &center in &[
                    Point3::new(0., half_height, 0.),
                    Point3::new(0., -half_height, 0.),
                ] {
                    if let Some(t) = ray_sphere(local_origin, local_displacement, center, radius) {
                        best = Some(best.map_or(t, |b: f32| b.min(t)));
                    }
                }
                if let Some(t) =
                    ray_cylinder(local_origin, local_displacement, half_height, radius)
                {
                    best = Some(best.map_or(t, |b: f32| b.min(t)));
                }
                best
            }
            Shape::HalfSpace { normal } => {
                let distance = local_origin.x * normal.x
                    + local_origin.y * normal.y
                    + local_origin.z * normal.z;
                let rate = local_displacement.dot(normal);
                if distance <= 0. {
                    Some(0.)
                } else if rate >= -1.0e-12 {
                    None
                } else {
                    let t = -distance / rate;
                    if t <= 1. {
                        Some(t)
                    } else {
                        None
                    }
                }
            }
        }
    }

    /// Does the shape contain a world space point?
    pub fn contains_point(&self, pose: &BodyPose, point: Point3<f32>) -> bool {
        let local = pose.inverse_transform_point(point);
        let local_vec = local - Point3::new(0., 0., 0.);
        match *self {
            Shape::Sphere { radius } => local_vec.magnitude2() <= radius * radius,
            Shape::Cuboid { half_extents } => {
                local.x.abs() <= half_extents.x
                    && local.y.abs() <= half_extents.y
                    && local.z.abs() <= half_extents.z
            }
            Shape::Capsule {
                half_height,
                radius,
            } => {
                let clamped = local.y.max(-half_height).min(half_height);
                let delta = Vector3::new(local.x, local.y - clamped, local.z);
                delta.magnitude2() <= radius * radius
            }
            Shape::HalfSpace { normal } => local_vec.dot(normal) <= 0.,
        }
    }

    /// Mass and inertia at the default density.
    pub fn mass_properties(&self) -> MassProperties {
        match *self {
            Shape::Sphere { radius } => {
                let mass = 4. / 3. * f32::consts::PI * radius.powi(3) * DEFAULT_DENSITY;
                let moment = 0.4 * mass * radius * radius;
                MassProperties {
                    mass,
                    inertia: Vector3::new(moment, moment, moment),
                }
            }
            Shape::Cuboid { half_extents } => {
                let mass =
                    8. * half_extents.x * half_extents.y * half_extents.z * DEFAULT_DENSITY;
                let third = mass / 3.;
                MassProperties {
                    mass,
                    inertia: Vector3::new(
                        third
                            * (half_extents.y * half_extents.y
                                + half_extents.z * half_extents.z),
                        third
                            * (half_extents.x * half_extents.x
                                + half_extents.z * half_extents.z),
                        third
                            * (half_extents.x * half_extents.x
                                + half_extents.y * half_extents.y),
                    ),
                }
            }
            Shape::Capsule {
                half_height,
                radius,
            } => {
                let cylinder_mass =
                    f32::consts::PI * radius * radius * 2. * half_height * DEFAULT_DENSITY;
                let sphere_mass = 4. / 3. * f32::consts::PI * radius.powi(3) * DEFAULT_DENSITY;
                let mass = cylinder_mass + sphere_mass;
                // Cylinder part.
                let lateral = cylinder_mass
                    * (radius * radius / 4. + half_height * half_height / 3.);
                let axial = cylinder_mass * radius * radius / 2.;
                // Hemisphere caps shifted to the segment ends.
                let cap_moment = 0.4 * sphere_mass * radius * radius;
                let cap_offset = sphere_mass
                    * (half_height * half_height + 0.75 * half_height * radius);
                let around = lateral + cap_moment + cap_offset;
                let along = axial + cap_moment;
                MassProperties {
                    mass,
                    inertia: Vector3::new(around, along, around),
                }
            }
            Shape::HalfSpace { .. } => MassProperties {
                mass: f32::INFINITY,
                inertia: Vector3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            },
        }
    }
}

/// Entry fraction of a segment against a sphere, `t` in `[0, 1]`.
fn ray_sphere(
    origin: Point3<f32>,
    displacement: Vector3<f32>,
    center: Point3<f32>,
    radius: f32,
) -> Option<f32> {
    let m = origin - center;
    if m.magnitude2() <= radius * radius {
        return Some(0.);
    }
    let a = displacement.magnitude2();
    if a < 1.0e-20 {
        return None;
    }
    let b = m.dot(displacement);
    let c = m.magnitude2() - radius * radius;
    let discriminant = b * b - a * c;
    if discriminant < 0. {
        return None;
    }
    let t = (-b - discriminant.sqrt()) / a;
    if t >= 0. && t <= 1. {
        Some(t)
    } else {
        None
    }
}

/// Entry fraction of a segment against the open cylinder of a Y capsule.
fn ray_cylinder(
    origin: Point3<f32>,
    displacement: Vector3<f32>,
    half_height: f32,
    radius: f32,
) -> Option<f32> {
    let ox = origin.x;
    let oz = origin.z;
    let dx = displacement.x;
    let dz = displacement.z;
    let a = dx * dx + dz * dz;
    if a < 1.0e-20 {
        return None;
    }
    let b = ox * dx + oz * dz;
    let c = ox * ox + oz * oz - radius * radius;
    if c <= 0. && origin.y.abs() <= half_height {
        return Some(0.);
    }
    let discriminant = b * b - a * c;
    if discriminant < 0. {
        return None;
    }
    let t = (-b - discriminant.sqrt()) / a;
    if t < 0. || t > 1. {
        return None;
    }
    let y = origin.y + displacement.y * t;
    if y.abs() <= half_height {
        Some(t)
    } else {
        None
    }
}

/// One narrow phase hit between two shapes.
#[derive(Clone, Debug)]
pub struct ContactHit {
    /// Deepest point on the surface of A, world space.
    pub point_a: Point3<f32>,
    /// Deepest point on the surface of B, world space.
    pub point_b: Point3<f32>,
    /// Unit penetration axis, pointing from A toward B.
    pub axis: Vector3<f32>,
    /// Positive when the shapes overlap; negative for a speculative hit.
    pub penetration: f32,
    /// Supporting face on A, world space; may be empty.
    pub face_a: Vec<Point3<f32>>,
    /// Supporting face on B, world space; may be empty.
    pub face_b: Vec<Point3<f32>>,
    /// Sub shape id on A (mesh triangle index, compound child, ...).
    pub sub_shape_a: u32,
    /// Sub shape id on B.
    pub sub_shape_b: u32,
    /// Material id on A.
    pub material_a: u32,
    /// Material id on B.
    pub material_b: u32,
}

impl ContactHit {
    /// A hit with no faces and zeroed sub shape and material ids.
    pub fn new(
        point_a: Point3<f32>,
        point_b: Point3<f32>,
        axis: Vector3<f32>,
        penetration: f32,
    ) -> Self {
        ContactHit {
            point_a,
            point_b,
            axis,
            penetration,
            face_a: Vec::new(),
            face_b: Vec::new(),
            sub_shape_a: 0,
            sub_shape_b: 0,
            material_a: 0,
            material_b: 0,
        }
    }

    fn flip(&mut self) {
        ::std::mem::swap(&mut self.point_a, &mut self.point_b);
        ::std::mem::swap(&mut self.face_a, &mut self.face_b);
        ::std::mem::swap(&mut self.sub_shape_a, &mut self.sub_shape_b);
        ::std::mem::swap(&mut self.material_a, &mut self.material_b);
        self.axis = -self.axis;
    }
}

/// Settings handed to collide functions.
#[derive(Clone, Copy, Debug)]
pub struct CollideSettings {
    /// Hits separated up to this distance are still reported, with negative
    /// penetration.
    pub max_separation: f32,
}

/// A pairwise collide function. Appends hits for `(shape_a, shape_b)`.
pub type CollideFn =
    fn(&Shape, &BodyPose, &Shape, &BodyPose, &CollideSettings, &mut Vec<ContactHit>);

#[derive(Clone, Copy)]
enum TableEntry {
    Direct(CollideFn),
    /// Call with arguments reversed and flip the hits afterwards.
    Flipped(CollideFn),
}

/// Pairwise collide dispatch, keyed by `(ShapeType, ShapeType)`.
///
/// Registering `(a, b)` automatically installs the reversed wrapper at
/// `(b, a)`.
pub struct CollideShapeTable {
    entries: [[Option<TableEntry>; SHAPE_TYPE_COUNT]; SHAPE_TYPE_COUNT],
}

impl Default for CollideShapeTable {
    /// Table with the built in primitive pairs registered.
    fn default() -> Self {
        let mut table = CollideShapeTable::empty();
        table.register(ShapeType::Sphere, ShapeType::Sphere, primitives::sphere_sphere);
        table.register(
            ShapeType::Sphere,
            ShapeType::HalfSpace,
            primitives::sphere_half_space,
        );
        table.register(ShapeType::Sphere, ShapeType::Cuboid, primitives::sphere_cuboid);
        table.register(
            ShapeType::Cuboid,
            ShapeType::HalfSpace,
            primitives::cuboid_half_space,
        );
        table.register(ShapeType::Cuboid, ShapeType::Cuboid, primitives::cuboid_cuboid);
        table.register(
            ShapeType::Capsule,
            ShapeType::Sphere,
            primitives::capsule_sphere,
        );
        table.register(
            ShapeType::Capsule,
            ShapeType::Capsule,
            primitives::capsule_capsule,
        );
        table.register(
            ShapeType::Capsule,
            ShapeType::HalfSpace,
            primitives::capsule_half_space,
        );
        table.register(
            ShapeType::HalfSpace,
            ShapeType::HalfSpace,
            primitives::half_space_half_space,
        );
        table
    }
}

impl CollideShapeTable {
    /// A table with nothing registered.
    pub fn empty() -> Self {
        CollideShapeTable {
            entries: [[None; SHAPE_TYPE_COUNT]; SHAPE_TYPE_COUNT],
        }
    }

    /// Register a collide function for a shape type pair.
    ///
    /// The reversed pair is covered by an automatically generated wrapper
    /// that swaps the arguments and flips the resulting hits.
    pub fn register(&mut self, a: ShapeType, b: ShapeType, function: CollideFn) {
        self.entries[a as usize][b as usize] = Some(TableEntry::Direct(function));
        if a != b {
            self.entries[b as usize][a as usize] = Some(TableEntry::Flipped(function));
        }
    }

    /// Is a pair dispatchable?
    pub fn supports(&self, a: ShapeType, b: ShapeType) -> bool {
        self.entries[a as usize][b as usize].is_some()
    }

    /// Check a pair, surfacing the missing entry as a configuration error.
    pub fn verify(&self, a: ShapeType, b: ShapeType) -> Result<(), ConfigurationError> {
        if self.supports(a, b) {
            Ok(())
        } else {
            Err(ConfigurationError::MissingCollideFunction(
                a as usize, b as usize,
            ))
        }
    }

    /// Collide two shapes, appending hits to `out`.
    ///
    /// Unregistered pairs produce no hits; registration is checked when
    /// bodies are created, not here.
    pub fn collide(
        &self,
        shape_a: &Shape,
        pose_a: &BodyPose,
        shape_b: &Shape,
        pose_b: &BodyPose,
        settings: &CollideSettings,
        out: &mut Vec<ContactHit>,
    ) {
        let entry = self.entries[shape_a.shape_type() as usize][shape_b.shape_type() as usize];
        match entry {
            Some(TableEntry::Direct(function)) => {
                function(shape_a, pose_a, shape_b, pose_b, settings, out)
            }
            Some(TableEntry::Flipped(function)) => {
                let first_new = out.len();
                function(shape_b, pose_b, shape_a, pose_a, settings, out);
                for hit in &mut out[first_new..] {
                    hit.flip();
                }
            }
            None => debug_assert!(false, "unregistered shape pair hit the dispatch table"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Quaternion;

    #[test]
    fn missing_pair_is_a_configuration_error() {
        let table = CollideShapeTable::default();
        // Capsule vs cuboid is intentionally not built in.
        assert!(table.verify(ShapeType::Capsule, ShapeType::Cuboid).is_err());
        assert!(table.verify(ShapeType::Sphere, ShapeType::Cuboid).is_ok());
    }

    #[test]
    fn flipped_wrapper_mirrors_the_hit() {
        let table = CollideShapeTable::default();
        let sphere = Shape::sphere(0.5);
        let plane = Shape::half_space(Vector3::new(0., 1., 0.));
        let sphere_pose = BodyPose::new(Point3::new(0., 0.4, 0.), Quaternion::new(1., 0., 0., 0.));
        let plane_pose = BodyPose::one();
        let settings = CollideSettings {
            max_separation: 0.02,
        };

        let mut direct = Vec::new();
        table.collide(&sphere, &sphere_pose, &plane, &plane_pose, &settings, &mut direct);
        let mut flipped = Vec::new();
        table.collide(&plane, &plane_pose, &sphere, &sphere_pose, &settings, &mut flipped);

        assert_eq!(direct.len(), 1);
        assert_eq!(flipped.len(), 1);
        assert_eq!(direct[0].point_a, flipped[0].point_b);
        assert_eq!(direct[0].point_b, flipped[0].point_a);
        assert_eq!(direct[0].axis, -flipped[0].axis);
        assert_eq!(direct[0].penetration, flipped[0].penetration);
    }

    #[test]
    fn cuboid_mass_properties_match_the_analytic_box() {
        let properties = Shape::cuboid(Vector3::new(0.5, 0.5, 0.5)).mass_properties();
        assert!((properties.mass - 1000.).abs() < 1.0e-3);
        // m/12 * (w^2 + h^2) for the unit cube.
        assert!((properties.inertia.x - 1000. / 6.).abs() < 1.0e-2);
    }

    #[test]
    fn world_aabb_is_conservative_under_rotation() {
        use cgmath::Rotation3;
        let shape = Shape::cuboid(Vector3::new(1., 0.2, 0.2));
        let pose = BodyPose::new(
            Point3::new(0., 0., 0.),
            Quaternion::from_angle_z(::cgmath::Rad(::std::f32::consts::FRAC_PI_4)),
        );
        let aabb = shape.world_aabb(&pose);
        // The rotated long axis must stay inside.
        let reach = (2f32).sqrt() / 2. * (1. + 0.2);
        assert!(aabb.max.x >= reach - 1.0e-4);
        assert!(aabb.max.y >= reach - 1.0e-4);
    }
}
