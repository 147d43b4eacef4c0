//! 1-DOF constraint part
//!
//! Constrains relative motion along one axis, linear
//! (`J = [-n, -(r1 x n), n, r2 x n]`) or purely angular
//! (`J = [0, -n, 0, n]`). Used for contact normals, friction, limits and
//! motors.

use cgmath::{InnerSpace, Vector3, Zero};

use body::RigidBody;
use constraint::part::spring::SpringSettings;
use constraint::part::{apply_position_correction, MIN_EFFECTIVE_MASS_DENOMINATOR};

/// A single axis (1-DOF) constraint part.
#[derive(Clone, Debug)]
pub struct AxisConstraintPart {
    axis: Vector3<f32>,
    r1_cross_axis: Vector3<f32>,
    r2_cross_axis: Vector3<f32>,
    /// `I_A^-1 * (r1 x n)` for linear parts, `I_A^-1 * n` for angular ones.
    inv_inertia_a_term: Vector3<f32>,
    inv_inertia_b_term: Vector3<f32>,
    effective_mass: f32,
    gamma: f32,
    bias: f32,
    target_velocity: f32,
    linear: bool,
    total_lambda: f32,
}

impl Default for AxisConstraintPart {
    fn default() -> Self {
        AxisConstraintPart {
            axis: Vector3::zero(),
            r1_cross_axis: Vector3::zero(),
            r2_cross_axis: Vector3::zero(),
            inv_inertia_a_term: Vector3::zero(),
            inv_inertia_b_term: Vector3::zero(),
            effective_mass: 0.,
            gamma: 0.,
            bias: 0.,
            target_velocity: 0.,
            linear: true,
            total_lambda: 0.,
        }
    }
}

impl AxisConstraintPart {
    /// New inactive part.
    pub fn new() -> Self {
        AxisConstraintPart::default()
    }

    /// Prepare a linear row along the world `axis`.
    ///
    /// `r1` and `r2` are the attachment offsets from the two centers of
    /// mass, `target_velocity` the desired relative velocity along the axis.
    /// A spring with stiffness plus a position `error` makes the row soft.
    /// The accumulated impulse survives for warm starting.
    pub fn calculate_constraint_properties(
        &mut self,
        body_a: &RigidBody,
        body_b: &RigidBody,
        r1: Vector3<f32>,
        r2: Vector3<f32>,
        axis: Vector3<f32>,
        target_velocity: f32,
        dt: f32,
        spring: Option<(&SpringSettings, f32)>,
    ) {
        self.axis = axis;
        self.linear = true;
        self.r1_cross_axis = r1.cross(axis);
        self.r2_cross_axis = r2.cross(axis);
        self.inv_inertia_a_term = body_a.inverse_inertia_world() * self.r1_cross_axis;
        self.inv_inertia_b_term = body_b.inverse_inertia_world() * self.r2_cross_axis;
        let denominator = body_a.motion.inverse_mass
            + body_b.motion.inverse_mass
            + self.r1_cross_axis.dot(self.inv_inertia_a_term)
            + self.r2_cross_axis.dot(self.inv_inertia_b_term);
        self.finish(denominator, target_velocity, dt, spring);
    }

    /// Prepare a purely angular row around the world `axis`.
    pub fn calculate_angular_constraint_properties(
        &mut self,
        body_a: &RigidBody,
        body_b: &RigidBody,
        axis: Vector3<f32>,
        target_velocity: f32,
        dt: f32,
        spring: Option<(&SpringSettings, f32)>,
    ) {
        self.axis = axis;
        self.linear = false;
        self.r1_cross_axis = axis;
        self.r2_cross_axis = axis;
        self.inv_inertia_a_term = body_a.inverse_inertia_world() * axis;
        self.inv_inertia_b_term = body_b.inverse_inertia_world() * axis;
        let denominator = axis.dot(self.inv_inertia_a_term) + axis.dot(self.inv_inertia_b_term);
        self.finish(denominator, target_velocity, dt, spring);
    }

    fn finish(
        &mut self,
        denominator: f32,
        target_velocity: f32,
        dt: f32,
        spring: Option<(&SpringSettings, f32)>,
    ) {
        if denominator < MIN_EFFECTIVE_MASS_DENOMINATOR {
            // Both ends immovable along this axis; nothing to solve.
            self.deactivate();
            return;
        }
        self.target_velocity = target_velocity;
        match spring {
            Some((settings, error)) if settings.has_stiffness() => {
                let (gamma, bias, effective_mass) =
                    settings.soft_parameters(denominator, dt, error);
                self.gamma = gamma;
                self.bias = bias;
                self.effective_mass = effective_mass;
            }
            _ => {
                self.gamma = 0.;
                self.bias = 0.;
                self.effective_mass = 1. / denominator;
            }
        }
    }

    /// Forget the cached effective mass; the part no longer solves.
    pub fn deactivate(&mut self) {
        self.effective_mass = 0.;
        self.total_lambda = 0.;
    }

    /// Did the last `calculate_*` produce a solvable row?
    pub fn is_active(&self) -> bool {
        self.effective_mass != 0.
    }

    /// Accumulated impulse, kept across steps for warm starting.
    pub fn total_lambda(&self) -> f32 {
        self.total_lambda
    }

    /// Seed the accumulated impulse (warm start transfer).
    pub fn set_total_lambda(&mut self, lambda: f32) {
        self.total_lambda = lambda;
    }

    /// Is this a soft (spring driven) row?
    pub fn is_spring(&self) -> bool {
        self.gamma != 0.
    }

    /// Re-apply the scaled cached impulse from the previous step.
    pub fn warm_start(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody, ratio: f32) {
        if !self.is_active() {
            return;
        }
        self.total_lambda *= ratio;
        let lambda = self.total_lambda;
        self.apply_impulse(body_a, body_b, lambda);
    }

    /// Relative velocity along the constrained axis.
    fn jacobian_velocity(&self, body_a: &RigidBody, body_b: &RigidBody) -> f32 {
        if self.linear {
            self.axis
                .dot(body_b.motion.linear_velocity - body_a.motion.linear_velocity)
                + self.r2_cross_axis.dot(body_b.motion.angular_velocity)
                - self.r1_cross_axis.dot(body_a.motion.angular_velocity)
        } else {
            self.axis
                .dot(body_b.motion.angular_velocity - body_a.motion.angular_velocity)
        }
    }

    fn apply_impulse(&self, body_a: &mut RigidBody, body_b: &mut RigidBody, lambda: f32) {
        if self.linear {
            body_a.motion.linear_velocity -=
                self.axis * (lambda * body_a.motion.inverse_mass);
            body_b.motion.linear_velocity +=
                self.axis * (lambda * body_b.motion.inverse_mass);
        }
        body_a.motion.angular_velocity -= self.inv_inertia_a_term * lambda;
        body_b.motion.angular_velocity += self.inv_inertia_b_term * lambda;
    }

    /// One velocity iteration. The accumulated impulse is clamped into
    /// `[min_lambda, max_lambda]`. Returns whether an impulse was applied.
    pub fn solve_velocity_constraint(
        &mut self,
        body_a: &mut RigidBody,
        body_b: &mut RigidBody,
        min_lambda: f32,
        max_lambda: f32,
    ) -> bool {
        if !self.is_active() {
            return false;
        }
        let jv = self.jacobian_velocity(body_a, body_b);
        let lambda = self.effective_mass
            * (self.target_velocity - jv - self.bias - self.gamma * self.total_lambda);
        let clamped = (self.total_lambda + lambda).max(min_lambda).min(max_lambda);
        let delta = clamped - self.total_lambda;
        if delta == 0. {
            return false;
        }
        self.total_lambda = clamped;
        self.apply_impulse(body_a, body_b, delta);
        true
    }

    /// One position iteration: correct the position error `error` along the
    /// axis by `baumgarte`, moving at most `max_correction`. Spring rows do
    /// not position solve. Returns whether a correction was applied.
    pub fn solve_position_constraint(
        &mut self,
        body_a: &mut RigidBody,
        body_b: &mut RigidBody,
        error: f32,
        baumgarte: f32,
        max_correction: f32,
    ) -> bool {
        if !self.is_active() || self.is_spring() || error == 0. {
            return false;
        }
        let clamped_error = error.max(-max_correction).min(max_correction);
        let lambda = -self.effective_mass * baumgarte * clamped_error;
        if self.linear {
            apply_position_correction(
                body_a,
                self.axis * (-lambda * body_a.motion.inverse_mass),
                self.inv_inertia_a_term * -lambda,
            );
            apply_position_correction(
                body_b,
                self.axis * (lambda * body_b.motion.inverse_mass),
                self.inv_inertia_b_term * lambda,
            );
        } else {
            apply_position_correction(body_a, Vector3::zero(), self.inv_inertia_a_term * -lambda);
            apply_position_correction(body_b, Vector3::zero(), self.inv_inertia_b_term * lambda);
        }
        true
    }
}
