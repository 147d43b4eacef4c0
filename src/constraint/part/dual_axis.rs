//! 2-DOF constraint part
//!
//! Locks relative motion along two axes at once with a 2x2 effective mass
//! block, so the two rows do not fight each other the way two independent
//! axis parts would.

use cgmath::{InnerSpace, Matrix2, SquareMatrix, Vector2, Vector3, Zero};

use body::RigidBody;
use constraint::part::apply_position_correction;

/// A dual axis (2-DOF) constraint part.
#[derive(Clone, Debug)]
pub struct DualAxisConstraintPart {
    axes: [Vector3<f32>; 2],
    r1_cross: [Vector3<f32>; 2],
    r2_cross: [Vector3<f32>; 2],
    inv_inertia_a_terms: [Vector3<f32>; 2],
    inv_inertia_b_terms: [Vector3<f32>; 2],
    effective_mass: Matrix2<f32>,
    linear: bool,
    active: bool,
    total_lambda: Vector2<f32>,
}

impl Default for DualAxisConstraintPart {
    fn default() -> Self {
        DualAxisConstraintPart {
            axes: [Vector3::zero(); 2],
            r1_cross: [Vector3::zero(); 2],
            r2_cross: [Vector3::zero(); 2],
            inv_inertia_a_terms: [Vector3::zero(); 2],
            inv_inertia_b_terms: [Vector3::zero(); 2],
            effective_mass: Matrix2::zero(),
            linear: true,
            active: false,
            total_lambda: Vector2::zero(),
        }
    }
}

impl DualAxisConstraintPart {
    /// New inactive part.
    pub fn new() -> Self {
        DualAxisConstraintPart::default()
    }

    /// Prepare two linear rows along the world axes `n1` and `n2`.
    pub fn calculate_constraint_properties(
        &mut self,
        body_a: &RigidBody,
        body_b: &RigidBody,
        r1: Vector3<f32>,
        r2: Vector3<f32>,
        n1: Vector3<f32>,
        n2: Vector3<f32>,
    ) {
        self.axes = [n1, n2];
        self.linear = true;
        let inv_inertia_a = body_a.inverse_inertia_world();
        let inv_inertia_b = body_b.inverse_inertia_world();
        for row in 0..2 {
            self.r1_cross[row] = r1.cross(self.axes[row]);
            self.r2_cross[row] = r2.cross(self.axes[row]);
            self.inv_inertia_a_terms[row] = inv_inertia_a * self.r1_cross[row];
            self.inv_inertia_b_terms[row] = inv_inertia_b * self.r2_cross[row];
        }
        let sum_inverse_mass = body_a.motion.inverse_mass + body_b.motion.inverse_mass;
        let mut k = Matrix2::zero();
        for row in 0..2 {
            for column in 0..2 {
                let mut value = self.r1_cross[row].dot(inv_inertia_a * self.r1_cross[column])
                    + self.r2_cross[row].dot(inv_inertia_b * self.r2_cross[column]);
                if row == column {
                    value += sum_inverse_mass;
                } else {
                    value += sum_inverse_mass * self.axes[row].dot(self.axes[column]);
                }
                k[column][row] = value;
            }
        }
        self.invert(k);
    }

    /// Prepare two angular rows around the world axes `n1` and `n2`.
    pub fn calculate_angular_constraint_properties(
        &mut self,
        body_a: &RigidBody,
        body_b: &RigidBody,
        n1: Vector3<f32>,
        n2: Vector3<f32>,
    ) {
        self.axes = [n1, n2];
        self.linear = false;
        let inv_inertia_a = body_a.inverse_inertia_world();
        let inv_inertia_b = body_b.inverse_inertia_world();
        for row in 0..2 {
            self.r1_cross[row] = self.axes[row];
            self.r2_cross[row] = self.axes[row];
            self.inv_inertia_a_terms[row] = inv_inertia_a * self.axes[row];
            self.inv_inertia_b_terms[row] = inv_inertia_b * self.axes[row];
        }
        let mut k = Matrix2::zero();
        for row in 0..2 {
            for column in 0..2 {
                k[column][row] = self.axes[row]
                    .dot(inv_inertia_a * self.axes[column])
                    + self.axes[row].dot(inv_inertia_b * self.axes[column]);
            }
        }
        self.invert(k);
    }

    fn invert(&mut self, k: Matrix2<f32>) {
        match k.invert() {
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
        self.total_lambda = Vector2::zero();
    }

    /// Did the last `calculate_*` produce a solvable block?
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Accumulated impulse over both rows.
    pub fn total_lambda(&self) -> Vector2<f32> {
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

    fn jacobian_velocity(&self, body_a: &RigidBody, body_b: &RigidBody) -> Vector2<f32> {
        let mut jv = Vector2::zero();
        for row in 0..2 {
            jv[row] = if self.linear {
                self.axes[row]
                    .dot(body_b.motion.linear_velocity - body_a.motion.linear_velocity)
                    + self.r2_cross[row].dot(body_b.motion.angular_velocity)
                    - self.r1_cross[row].dot(body_a.motion.angular_velocity)
            } else {
                self.axes[row]
                    .dot(body_b.motion.angular_velocity - body_a.motion.angular_velocity)
            };
        }
        jv
    }

    fn apply_impulse(&self, body_a: &mut RigidBody, body_b: &mut RigidBody, lambda: Vector2<f32>) {
        if self.linear {
            let linear = self.axes[0] * lambda.x + self.axes[1] * lambda.y;
            body_a.motion.linear_velocity -= linear * body_a.motion.inverse_mass;
            body_b.motion.linear_velocity += linear * body_b.motion.inverse_mass;
        }
        body_a.motion.angular_velocity -=
            self.inv_inertia_a_terms[0] * lambda.x + self.inv_inertia_a_terms[1] * lambda.y;
        body_b.motion.angular_velocity +=
            self.inv_inertia_b_terms[0] * lambda.x + self.inv_inertia_b_terms[1] * lambda.y;
    }

    /// One velocity iteration driving both rows to zero relative velocity.
    pub fn solve_velocity_constraint(
        &mut self,
        body_a: &mut RigidBody,
        body_b: &mut RigidBody,
    ) -> bool {
        if !self.active {
            return false;
        }
        let jv = self.jacobian_velocity(body_a, body_b);
        let lambda = self.effective_mass * -jv;
        if lambda == Vector2::zero() {
            return false;
        }
        self.total_lambda += lambda;
        self.apply_impulse(body_a, body_b, lambda);
        true
    }

    /// One position iteration correcting the 2-vector `error` by `baumgarte`.
    pub fn solve_position_constraint(
        &mut self,
        body_a: &mut RigidBody,
        body_b: &mut RigidBody,
        error: Vector2<f32>,
        baumgarte: f32,
    ) -> bool {
        if !self.active || error == Vector2::zero() {
            return false;
        }
        let lambda = self.effective_mass * (error * -baumgarte);
        if self.linear {
            let linear = self.axes[0] * lambda.x + self.axes[1] * lambda.y;
            apply_position_correction(
                body_a,
                linear * -body_a.motion.inverse_mass,
                -(self.inv_inertia_a_terms[0] * lambda.x
                    + self.inv_inertia_a_terms[1] * lambda.y),
            );
            apply_position_correction(
                body_b,
                linear * body_b.motion.inverse_mass,
                self.inv_inertia_b_terms[0] * lambda.x + self.inv_inertia_b_terms[1] * lambda.y,
            );
        } else {
            apply_position_correction(
                body_a,
                Vector3::zero(),
                -(self.inv_inertia_a_terms[0] * lambda.x
                    + self.inv_inertia_a_terms[1] * lambda.y),
            );
            apply_position_correction(
                body_b,
                Vector3::zero(),
                self.inv_inertia_b_terms[0] * lambda.x + self.inv_inertia_b_terms[1] * lambda.y,
            );
        }
        true
    }
}
