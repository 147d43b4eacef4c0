//! Point (ball socket) constraint

use cgmath::{Point3, Rotation, Vector2, Vector3};

use body::{BodyId, RigidBody};
use constraint::part::{AxisConstraintPart, DualAxisConstraintPart};
use constraint::{Constraint, ConstraintBase};

const X: Vector3<f32> = Vector3 {
    x: 1.,
    y: 0.,
    z: 0.,
};
const Y: Vector3<f32> = Vector3 {
    x: 0.,
    y: 1.,
    z: 0.,
};
const Z: Vector3<f32> = Vector3 {
    x: 0.,
    y: 0.,
    z: 1.,
};

/// Description of a [`PointConstraint`](struct.PointConstraint.html).
#[derive(Clone, Debug)]
pub struct PointSettings {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// World space point both bodies are pinned to.
    pub anchor: Point3<f32>,
}

/// Pins a point of A to a point of B, removing three translation DOF and
/// leaving all rotation free.
#[derive(Debug)]
pub struct PointConstraint {
    base: ConstraintBase,
    local_a: Point3<f32>,
    local_b: Point3<f32>,
    r1: Vector3<f32>,
    r2: Vector3<f32>,
    translation_xy: DualAxisConstraintPart,
    translation_z: AxisConstraintPart,
}

impl PointConstraint {
    /// Build from settings and the current body poses.
    pub fn new(settings: &PointSettings, body_a: &RigidBody, body_b: &RigidBody) -> Self {
        PointConstraint {
            base: ConstraintBase::new(settings.body_a, settings.body_b),
            local_a: body_a.pose.inverse_transform_point(settings.anchor),
            local_b: body_b.pose.inverse_transform_point(settings.anchor),
            r1: Vector3::new(0., 0., 0.),
            r2: Vector3::new(0., 0., 0.),
            translation_xy: DualAxisConstraintPart::new(),
            translation_z: AxisConstraintPart::new(),
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

    fn separation(&self, body_a: &RigidBody, body_b: &RigidBody) -> Vector3<f32> {
        (body_b.pose.position + self.r2) - (body_a.pose.position + self.r1)
    }
}

impl Constraint for PointConstraint {
    fn base(&self) -> &ConstraintBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConstraintBase {
        &mut self.base
    }

    fn setup_velocity(&mut self, body_a: &RigidBody, body_b: &RigidBody, dt: f32) {
        self.update_arms(body_a, body_b);
        self.translation_xy
            .calculate_constraint_properties(body_a, body_b, self.r1, self.r2, X, Y);
        self.translation_z.calculate_constraint_properties(
            body_a, body_b, self.r1, self.r2, Z, 0., dt, None,
        );
    }

    fn warm_start_velocity(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody, ratio: f32) {
        self.translation_xy.warm_start(body_a, body_b, ratio);
        self.translation_z.warm_start(body_a, body_b, ratio);
    }

    fn solve_velocity(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody, _dt: f32) -> bool {
        let mut applied = self.translation_xy.solve_velocity_constraint(body_a, body_b);
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
        // Bodies moved during integration; rebuild the Jacobians.
        self.setup_velocity(body_a, body_b, dt);
        let error = self.separation(body_a, body_b);
        let mut applied = self.translation_xy.solve_position_constraint(
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
