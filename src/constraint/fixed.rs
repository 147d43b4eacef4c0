//! Fixed (weld) constraint

use cgmath::{EuclideanSpace, Point3, Quaternion, Rotation, Vector2, Vector3};

use body::{BodyId, RigidBody};
use constraint::part::{AxisConstraintPart, DualAxisConstraintPart, RotationEulerConstraintPart};
use constraint::{Constraint, ConstraintBase};

/// Description of a [`FixedConstraint`](struct.FixedConstraint.html).
#[derive(Clone, Debug)]
pub struct FixedSettings {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// World space reference point; defaults to the midpoint of the two
    /// centers of mass when `None`.
    pub anchor: Option<Point3<f32>>,
}

/// Welds two bodies together in their current relative pose, removing all
/// six degrees of freedom.
#[derive(Debug)]
pub struct FixedConstraint {
    base: ConstraintBase,
    local_a: Point3<f32>,
    local_b: Point3<f32>,
    inverse_initial_orientation: Quaternion<f32>,
    r1: Vector3<f32>,
    r2: Vector3<f32>,
    translation_xy: DualAxisConstraintPart,
    translation_z: AxisConstraintPart,
    rotation: RotationEulerConstraintPart,
}

impl FixedConstraint {
    /// Build from settings and the current body poses.
    pub fn new(settings: &FixedSettings, body_a: &RigidBody, body_b: &RigidBody) -> Self {
        let anchor = settings.anchor.unwrap_or_else(|| {
            Point3::from_vec(
                (body_a.pose.position.to_vec() + body_b.pose.position.to_vec()) * 0.5,
            )
        });
        FixedConstraint {
            base: ConstraintBase::new(settings.body_a, settings.body_b),
            local_a: body_a.pose.inverse_transform_point(anchor),
            local_b: body_b.pose.inverse_transform_point(anchor),
            inverse_initial_orientation:
                RotationEulerConstraintPart::inverse_initial_orientation(body_a, body_b),
            r1: Vector3::new(0., 0., 0.),
            r2: Vector3::new(0., 0., 0.),
            translation_xy: DualAxisConstraintPart::new(),
            translation_z: AxisConstraintPart::new(),
            rotation: RotationEulerConstraintPart::new(),
        }
    }

    fn update_arms(&mut self, body_a: &RigidBody, body_b: &RigidBody) {
        self.r1 = body_a
            .pose
            .rotation
            .rotate_vector(self.local_a - Point3::new(0., 0., 0.));
        self.r2 = body_b
            .pose
            .rotation
            .rotate_vector(self.local_b - Point3::new(0., 0., 0.));
    }
}

impl Constraint for FixedConstraint {
    fn base(&self) -> &ConstraintBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConstraintBase {
        &mut self.base
    }

    fn setup_velocity(&mut self, body_a: &RigidBody, body_b: &RigidBody, dt: f32) {
        self.update_arms(body_a, body_b);
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
        self.rotation.calculate_constraint_properties(body_a, body_b);
    }

    fn warm_start_velocity(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody, ratio: f32) {
        self.translation_xy.warm_start(body_a, body_b, ratio);
        self.translation_z.warm_start(body_a, body_b, ratio);
        self.rotation.warm_start(body_a, body_b, ratio);
    }

    fn solve_velocity(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody, _dt: f32) -> bool {
        let mut applied = self.rotation.solve_velocity_constraint(body_a, body_b);
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
        let mut applied = self.rotation.solve_position_constraint(
            body_a,
            body_b,
            self.inverse_initial_orientation,
            baumgarte,
        );
        // Re-derive the arms after the rotation fix, then close the gap.
        self.update_arms(body_a, body_b);
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
