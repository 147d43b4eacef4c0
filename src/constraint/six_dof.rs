//! Six degree of freedom constraint

use cgmath::{InnerSpace, Matrix3, Point3, Quaternion, Rotation, Vector3};

use body::{BodyId, RigidBody};
use constraint::part::{AxisConstraintPart, RotationEulerConstraintPart};
use constraint::{Constraint, ConstraintBase};

/// Limit value treated as "unbounded" on either side.
pub const FREE_LIMIT: f32 = 3.4e38;

/// Per axis freedom of a six DOF constraint.
///
/// Sentinel limit values of `+-3.4e38` encode free and fixed axes in limit
/// form; [`from_limits`](#method.from_limits) and
/// [`limits`](#method.limits) convert on the way in and out.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AxisMode {
    /// Unconstrained.
    Free,
    /// Fully locked at the initial value.
    Fixed,
    /// Constrained to a range.
    Limited {
        /// Lower bound (meters or radians).
        min: f32,
        /// Upper bound.
        max: f32,
    },
}

impl AxisMode {
    /// Interpret a limit pair: fully open means free, an inverted or empty
    /// range means fixed, anything else is a real range.
    pub fn from_limits(min: f32, max: f32) -> AxisMode {
        if min <= -FREE_LIMIT && max >= FREE_LIMIT {
            AxisMode::Free
        } else if min >= max {
            AxisMode::Fixed
        } else {
            AxisMode::Limited { min, max }
        }
    }

    /// The sentinel encoded limit pair for this mode.
    pub fn limits(&self) -> (f32, f32) {
        match *self {
            AxisMode::Free => (-FREE_LIMIT, FREE_LIMIT),
            AxisMode::Fixed => (FREE_LIMIT, -FREE_LIMIT),
            AxisMode::Limited { min, max } => (min, max),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum LimitState {
    Inactive,
    AtMin,
    AtMax,
    Locked,
}

/// Description of a [`SixDofConstraint`](struct.SixDofConstraint.html).
#[derive(Clone, Debug)]
pub struct SixDofSettings {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// World space constraint origin.
    pub anchor: Point3<f32>,
    /// World space X axis of the constraint frame.
    pub axis_x: Vector3<f32>,
    /// World space Y axis of the constraint frame.
    pub axis_y: Vector3<f32>,
    /// Freedom per translation axis.
    pub translation: [AxisMode; 3],
    /// Freedom per rotation axis.
    pub rotation: [AxisMode; 3],
}

impl SixDofSettings {
    /// A fully free constraint frame at the anchor.
    pub fn new(body_a: BodyId, body_b: BodyId, anchor: Point3<f32>) -> Self {
        SixDofSettings {
            body_a,
            body_b,
            anchor,
            axis_x: Vector3::new(1., 0., 0.),
            axis_y: Vector3::new(0., 1., 0.),
            translation: [AxisMode::Free; 3],
            rotation: [AxisMode::Free; 3],
        }
    }
}

/// Independent limit ranges for all three translation and all three
/// rotation axes of a constraint frame.
#[derive(Debug)]
pub struct SixDofConstraint {
    base: ConstraintBase,
    local_a: Point3<f32>,
    local_b: Point3<f32>,
    frame_a: Quaternion<f32>,
    frame_b: Quaternion<f32>,
    translation_modes: [AxisMode; 3],
    rotation_modes: [AxisMode; 3],

    r1: Vector3<f32>,
    r2: Vector3<f32>,
    world_axes: [Vector3<f32>; 3],
    translation_values: [f32; 3],
    rotation_values: [f32; 3],
    translation_states: [LimitState; 3],
    rotation_states: [LimitState; 3],
    translation_parts: [AxisConstraintPart; 3],
    rotation_parts: [AxisConstraintPart; 3],
    rotation_lock: RotationEulerConstraintPart,
    inverse_initial_orientation: Quaternion<f32>,
}

impl SixDofConstraint {
    /// Build from settings and the current body poses.
    pub fn new(settings: &SixDofSettings, body_a: &RigidBody, body_b: &RigidBody) -> Self {
        let x = settings.axis_x.normalize();
        let y = (settings.axis_y - x * settings.axis_y.dot(x)).normalize();
        let z = x.cross(y);
        let frame_world = Quaternion::from(Matrix3::from_cols(x, y, z));
        SixDofConstraint {
            base: ConstraintBase::new(settings.body_a, settings.body_b),
            local_a: body_a.pose.inverse_transform_point(settings.anchor),
            local_b: body_b.pose.inverse_transform_point(settings.anchor),
            frame_a: body_a.pose.rotation.invert() * frame_world,
            frame_b: body_b.pose.rotation.invert() * frame_world,
            translation_modes: settings.translation,
            rotation_modes: settings.rotation,
            r1: Vector3::new(0., 0., 0.),
            r2: Vector3::new(0., 0., 0.),
            world_axes: [Vector3::new(1., 0., 0.); 3],
            translation_values: [0.; 3],
            rotation_values: [0.; 3],
            translation_states: [LimitState::Inactive; 3],
            rotation_states: [LimitState::Inactive; 3],
            translation_parts: [
                AxisConstraintPart::new(),
                AxisConstraintPart::new(),
                AxisConstraintPart::new(),
            ],
            rotation_parts: [
                AxisConstraintPart::new(),
                AxisConstraintPart::new(),
                AxisConstraintPart::new(),
            ],
            rotation_lock: RotationEulerConstraintPart::new(),
            inverse_initial_orientation:
                RotationEulerConstraintPart::inverse_initial_orientation(body_a, body_b),
        }
    }

    /// Freedom of a translation axis.
    pub fn translation_mode(&self, axis: usize) -> AxisMode {
        self.translation_modes[axis]
    }

    /// Freedom of a rotation axis.
    pub fn rotation_mode(&self, axis: usize) -> AxisMode {
        self.rotation_modes[axis]
    }

    fn all_rotations_fixed(&self) -> bool {
        self.rotation_modes
            .iter()
            .all(|&mode| mode == AxisMode::Fixed)
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
        let constraint_a = body_a.pose.rotation * self.frame_a;
        let constraint_b = body_b.pose.rotation * self.frame_b;
        self.world_axes = [
            constraint_a.rotate_vector(Vector3::new(1., 0., 0.)),
            constraint_a.rotate_vector(Vector3::new(0., 1., 0.)),
            constraint_a.rotate_vector(Vector3::new(0., 0., 1.)),
        ];
        let u = (body_b.pose.position + self.r2) - (body_a.pose.position + self.r1);
        for axis in 0..3 {
            self.translation_values[axis] = u.dot(self.world_axes[axis]);
        }
        let relative = constraint_a.invert() * constraint_b;
        let sign = if relative.s >= 0. { 1. } else { -1. };
        for axis in 0..3 {
            self.rotation_values[axis] = 2. * (relative.v[axis] * sign).atan2(relative.s * sign);
        }
    }

    fn state_for(mode: AxisMode, value: f32) -> LimitState {
        match mode {
            AxisMode::Free => LimitState::Inactive,
            AxisMode::Fixed => LimitState::Locked,
            AxisMode::Limited { min, max } => {
                if value <= min {
                    LimitState::AtMin
                } else if value >= max {
                    LimitState::AtMax
                } else {
                    LimitState::Inactive
                }
            }
        }
    }

    fn clamps(state: LimitState) -> (f32, f32) {
        match state {
            LimitState::AtMin => (0., ::std::f32::MAX),
            LimitState::AtMax => (::std::f32::MIN, 0.),
            _ => (::std::f32::MIN, ::std::f32::MAX),
        }
    }

    fn error_for(mode: AxisMode, value: f32) -> f32 {
        match mode {
            AxisMode::Free => 0.,
            AxisMode::Fixed => value,
            AxisMode::Limited { min, max } => value - value.max(min).min(max),
        }
    }
}

impl Constraint for SixDofConstraint {
    fn base(&self) -> &ConstraintBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConstraintBase {
        &mut self.base
    }

    fn setup_velocity(&mut self, body_a: &RigidBody, body_b: &RigidBody, dt: f32) {
        self.update_geometry(body_a, body_b);

        for axis in 0..3 {
            let state = Self::state_for(self.translation_modes[axis], self.translation_values[axis]);
            self.translation_states[axis] = state;
            if state != LimitState::Inactive {
                self.translation_parts[axis].calculate_constraint_properties(
                    body_a,
                    body_b,
                    self.r1,
                    self.r2,
                    self.world_axes[axis],
                    0.,
                    dt,
                    None,
                );
            } else {
                self.translation_parts[axis].deactivate();
            }
        }

        if self.all_rotations_fixed() {
            self.rotation_lock.calculate_constraint_properties(body_a, body_b);
            for part in &mut self.rotation_parts {
                part.deactivate();
            }
        } else {
            self.rotation_lock.deactivate();
            for axis in 0..3 {
                let state = Self::state_for(self.rotation_modes[axis], self.rotation_values[axis]);
                self.rotation_states[axis] = state;
                if state != LimitState::Inactive {
                    self.rotation_parts[axis].calculate_angular_constraint_properties(
                        body_a,
                        body_b,
                        self.world_axes[axis],
                        0.,
                        dt,
                        None,
                    );
                } else {
                    self.rotation_parts[axis].deactivate();
                }
            }
        }
    }

    fn warm_start_velocity(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody, ratio: f32) {
        for part in &mut self.translation_parts {
            part.warm_start(body_a, body_b, ratio);
        }
        for part in &mut self.rotation_parts {
            part.warm_start(body_a, body_b, ratio);
        }
        self.rotation_lock.warm_start(body_a, body_b, ratio);
    }

    fn solve_velocity(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody, _dt: f32) -> bool {
        let mut applied = self.rotation_lock.solve_velocity_constraint(body_a, body_b);
        for axis in 0..3 {
            if self.rotation_parts[axis].is_active() {
                let (min_lambda, max_lambda) = Self::clamps(self.rotation_states[axis]);
                applied |= self.rotation_parts[axis].solve_velocity_constraint(
                    body_a, body_b, min_lambda, max_lambda,
                );
            }
        }
        for axis in 0..3 {
            if self.translation_parts[axis].is_active() {
                let (min_lambda, max_lambda) = Self::clamps(self.translation_states[axis]);
                applied |= self.translation_parts[axis].solve_velocity_constraint(
                    body_a, body_b, min_lambda, max_lambda,
                );
            }
        }
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
        if self.all_rotations_fixed() {
            applied |= self.rotation_lock.solve_position_constraint(
                body_a,
                body_b,
                self.inverse_initial_orientation,
                baumgarte,
            );
        } else {
            for axis in 0..3 {
                let error =
                    Self::error_for(self.rotation_modes[axis], self.rotation_values[axis]);
                if error != 0. && self.rotation_parts[axis].is_active() {
                    applied |= self.rotation_parts[axis].solve_position_constraint(
                        body_a,
                        body_b,
                        error,
                        baumgarte,
                        ::std::f32::MAX,
                    );
                }
            }
        }
        self.update_geometry(body_a, body_b);
        for axis in 0..3 {
            let error =
                Self::error_for(self.translation_modes[axis], self.translation_values[axis]);
            if error != 0. && self.translation_parts[axis].is_active() {
                applied |= self.translation_parts[axis].solve_position_constraint(
                    body_a,
                    body_b,
                    error,
                    baumgarte,
                    ::std::f32::MAX,
                );
            }
        }
        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_limits_map_to_modes() {
        assert_eq!(AxisMode::from_limits(-3.4e38, 3.4e38), AxisMode::Free);
        assert_eq!(AxisMode::from_limits(3.4e38, -3.4e38), AxisMode::Fixed);
        assert_eq!(AxisMode::from_limits(0., 0.), AxisMode::Fixed);
        assert_eq!(
            AxisMode::from_limits(-1., 2.),
            AxisMode::Limited { min: -1., max: 2. }
        );
        // Round trip through the sentinel encoding.
        for &mode in &[
            AxisMode::Free,
            AxisMode::Fixed,
            AxisMode::Limited { min: -0.5, max: 1.5 },
        ] {
            let (min, max) = mode.limits();
            assert_eq!(AxisMode::from_limits(min, max), mode);
        }
    }
}
