//! Cone constraint

use cgmath::{InnerSpace, Point3, Rotation, Vector2, Vector3};

use body::{BodyId, RigidBody};
use constraint::part::{AxisConstraintPart, DualAxisConstraintPart};
use constraint::{Constraint, ConstraintBase};
use util::orthonormal_basis;

/// Description of a [`ConeConstraint`](struct.ConeConstraint.html).
#[derive(Clone, Debug)]
pub struct ConeSettings {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// World space pivot point.
    pub anchor: Point3<f32>,
    /// World space cone axis on A, unit length.
    pub twist_axis: Vector3<f32>,
    /// Largest allowed angle between the two twist axes, radians.
    pub half_angle: f32,
}

/// Pins a point and keeps the angle between the two twist axes inside a
/// cone; twist about the axis stays free.
#[derive(Debug)]
pub struct ConeConstraint {
    base: ConstraintBase,
    local_a: Point3<f32>,
    local_b: Point3<f32>,
    local_twist_a: Vector3<f32>,
    local_twist_b: Vector3<f32>,
    cos_half_angle: f32,

    r1: Vector3<f32>,
    r2: Vector3<f32>,
    rotation_axis: Vector3<f32>,
    cos_angle: f32,
    translation_xy: DualAxisConstraintPart,
    translation_z: AxisConstraintPart,
    cone: AxisConstraintPart,
}

impl ConeConstraint {
    /// Build from settings and the current body poses.
    pub fn new(settings: &ConeSettings, body_a: &RigidBody, body_b: &RigidBody) -> Self {
        let twist = settings.twist_axis.normalize();
        ConeConstraint {
            base: ConstraintBase::new(settings.body_a, settings.body_b),
            local_a: body_a.pose.inverse_transform_point(settings.anchor),
            local_b: body_b.pose.inverse_transform_point(settings.anchor),
            local_twist_a: body_a.pose.inverse_transform_vector(twist),
            local_twist_b: body_b.pose.inverse_transform_vector(twist),
            cos_half_angle: settings.half_angle.cos(),
            r1: Vector3::new(0., 0., 0.),
            r2: Vector3::new(0., 0., 0.),
            rotation_axis: Vector3::new(0., 0., 1.),
            cos_angle: 1.,
            translation_xy: DualAxisConstraintPart::new(),
            translation_z: AxisConstraintPart::new(),
            cone: AxisConstraintPart::new(),
        }
    }

    fn update_geometry(&mut self, body_a: &RigidBody, body_b: &RigidBody) {
        self.r1 = body_a
            .pose
            .rotation
            .rotate_vector(self.local_a - Point3::new(0., 0., 0.));
        self.r2 = body_b
            .pose
            .rotation
            .rotate_vector(self.local_b - Point3::new(0., 0., 0.));
        let twist_a = body_a.pose.rotation.rotate_vector(self.local_twist_a);
        let twist_b = body_b.pose.rotation.rotate_vector(self.local_twist_b);
        self.cos_angle = twist_a.dot(twist_b);
        let cross = twist_a.cross(twist_b);
        self.rotation_axis = if cross.magnitude2() > 1.0e-12 {
            cross.normalize()
        } else {
            // Axes (anti)parallel: any perpendicular direction works.
            orthonormal_basis(twist_a).0
        };
    }
}

impl Constraint for ConeConstraint {
    fn base(&self) -> &ConstraintBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConstraintBase {
        &mut self.base
    }

    fn setup_velocity(&mut self, body_a: &RigidBody, body_b: &RigidBody, dt: f32) {
        self.update_geometry(body_a, body_b);
        self.translation_xy.calculate_constraint_properties(
            body_a,
            body_b,
            self.r1,
            self.r2,
            Vector3::new(1., 0., 0.),
            Vector3::new(0., 1., 0.),
        );
        self.translation_z.calculate_constraint_properties(
            body_a,
            body_b,
            self.r1,
            self.r2,
            Vector3::new(0., 0., 1.),
            0.,
            dt,
            None,
        );
        if self.cos_angle < self.cos_half_angle {
            self.cone.calculate_angular_constraint_properties(
                body_a,
                body_b,
                self.rotation_axis,
                0.,
                dt,
                None,
            );
        } else {
            self.cone.deactivate();
        }
    }

    fn warm_start_velocity(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody, ratio: f32) {
        self.translation_xy.warm_start(body_a, body_b, ratio);
        self.translation_z.warm_start(body_a, body_b, ratio);
        self.cone.warm_start(body_a, body_b, ratio);
    }

    fn solve_velocity(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody, _dt: f32) -> bool {
        let mut applied = false;
        if self.cone.is_active() {
            // Only impulses that close the cone are allowed.
            applied |=
                self.cone
                    .solve_velocity_constraint(body_a, body_b, ::std::f32::MIN, 0.);
        }
        applied |= self.translation_xy.solve_velocity_constraint(body_a, body_b);
        applied |= self.translation_z.solve_velocity_constraint(
            body_a,
            body_b,
            ::std::f32::MIN,
            ::std::f32::MAX,
        );
        applied
    }

    fn solve_position(
        &mut self,
        body_a: &mut RigidBody,
        body_b: &mut RigidBody,
        dt: f32,
        baumgarte: f32,
    ) -> bool {
        self.setup_velocity(body_a, body_b, dt);
        let mut applied = false;
        if self.cos_angle < self.cos_half_angle {
            let clamped = self.cos_angle.max(-1.).min(1.);
            let error = clamped.acos() - self.cos_half_angle.min(1.).acos();
            applied |= self.cone.solve_position_constraint(
                body_a,
                body_b,
                error,
                baumgarte,
                ::std::f32::MAX,
            );
        }
        self.update_geometry(body_a, body_b);
        let error = (body_b.pose.position + self.r2) - (body_a.pose.position + self.r1);
        applied |= self.translation_xy.solve_position_constraint(
            body_a,
            body_b,
            Vector2::new(error.x, error.y),
            baumgarte,
        );
        applied |= self.translation_z.solve_position_constraint(
            body_a,
            body_b,
            error.z,
            baumgarte,
            ::std::f32::MAX,
        );
        applied
    }
}
