//! 3-DOF rotation constraint part
//!
//! Locks the relative orientation of two bodies. The Jacobian has no linear
//! block; the angular blocks are the identity, so the effective mass is the
//! inverse of the summed world space inverse inertias.

use cgmath::{Matrix3, Quaternion, SquareMatrix, Vector3, Zero};

use body::RigidBody;
use constraint::part::apply_position_correction;

/// A rotation locking (3-DOF) constraint part.
#[derive(Clone, Debug)]
pub struct RotationEulerConstraintPart {
    inv_inertia_a: Matrix3<f32>,
    inv_inertia_b: Matrix3<f32>,
    effective_mass: Matrix3<f32>,
    active: bool,
    total_lambda: Vector3<f32>,
}

impl Default for RotationEulerConstraintPart {
    fn default() -> Self {
        RotationEulerConstraintPart {
            inv_inertia_a: Matrix3::zero(),
            inv_inertia_b: Matrix3::zero(),
            effective_mass: Matrix3::zero(),
            active: false,
            total_lambda: Vector3::zero(),
        }
    }
}

impl RotationEulerConstraintPart {
    /// New inactive part.
    pub fn new() -> Self {
        RotationEulerConstraintPart::default()
    }

    /// The initial relative orientation to lock in, inverted for use in
    /// [`solve_position_constraint`](#method.solve_position_constraint).
    pub fn inverse_initial_orientation(
        body_a: &RigidBody,
        body_b: &RigidBody,
    ) -> Quaternion<f32> {
        use cgmath::Rotation;
        (body_a.pose.rotation.invert() * body_b.pose.rotation).invert()
    }

    /// Cache the effective mass for this step.
    pub fn calculate_constraint_properties(&mut self, body_a: &RigidBody, body_b: &RigidBody) {
        self.inv_inertia_a = body_a.inverse_inertia_world();
        self.inv_inertia_b = body_b.inverse_inertia_world();
        match (self.inv_inertia_a + self.inv_inertia_b).invert() {
            Some(inverse) => {
                self.effective_mass = inverse;
                self.active = true;
            }
            None => self.deactivate(),
        }
    }

    /// Forget the cached effective mass; the part no longer solves.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.total_lambda = Vector3::zero();
    }

    /// Did the last `calculate_constraint_properties` succeed?
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Accumulated angular impulse.
    pub fn total_lambda(&self) -> Vector3<f32> {
        self.total_lambda
    }

    /// Re-apply the scaled cached impulse from the previous step.
    pub fn warm_start(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody, ratio: f32) {
        if !self.active {
            return;
        }
        self.total_lambda *= ratio;
        let lambda = self.total_lambda;
        self.apply_impulse(body_a, body_b, lambda);
    }

    fn apply_impulse(&self, body_a: &mut RigidBody, body_b: &mut RigidBody, lambda: Vector3<f32>) {
        body_a.motion.angular_velocity -= self.inv_inertia_a * lambda;
        body_b.motion.angular_velocity += self.inv_inertia_b * lambda;
    }

    /// One velocity iteration driving the relative angular velocity to zero.
    pub fn solve_velocity_constraint(
        &mut self,
        body_a: &mut RigidBody,
        body_b: &mut RigidBody,
    ) -> bool {
        if !self.active {
            return false;
        }
        let jv = body_b.motion.angular_velocity - body_a.motion.angular_velocity;
        let lambda = self.effective_mass * -jv;
        if lambda == Vector3::zero() {
            return false;
        }
        self.total_lambda += lambda;
        self.apply_impulse(body_a, body_b, lambda);
        true
    }

    /// One position iteration.
    ///
    /// The rotation error is
    /// `q_error = inverse_initial_orientation * conj(q_a) * q_b`, reduced to
    /// the small angle vector `2 * q_error.xyz` with the sign chosen by
    /// `q_error.w`.
    pub fn solve_position_constraint(
        &mut self,
        body_a: &mut RigidBody,
        body_b: &mut RigidBody,
        inverse_initial_orientation: Quaternion<f32>,
        baumgarte: f32,
    ) -> bool {
        if !self.active {
            return false;
        }
        let q_error =
            inverse_initial_orientation * body_a.pose.rotation.conjugate() * body_b.pose.rotation;
        let sign = if q_error.s >= 0. { 1. } else { -1. };
        let error = q_error.v * (2. * sign);
        if error == Vector3::zero() {
            return false;
        }
        let lambda = self.effective_mass * (error * -baumgarte);
        apply_position_correction(body_a, Vector3::zero(), self.inv_inertia_a * -lambda);
        apply_position_correction(body_b, Vector3::zero(), self.inv_inertia_b * lambda);
        true
    }
}
