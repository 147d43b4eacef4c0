//! Hinge constraint

use cgmath::{InnerSpace, Point3, Rotation, Vector2, Vector3};

use body::{BodyId, RigidBody};
use constraint::part::{AxisConstraintPart, DualAxisConstraintPart, SpringSettings};
use constraint::{Constraint, ConstraintBase, MotorMode};
use util::orthonormal_basis;

const FREE_LIMIT: f32 = 3.4e38;

#[derive(Clone, Copy, Debug, PartialEq)]
enum LimitState {
    Inactive,
    AtMin,
    AtMax,
    Locked,
}

/// Description of a [`HingeConstraint`](struct.HingeConstraint.html).
#[derive(Clone, Debug)]
pub struct HingeSettings {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// World space point on the hinge axis.
    pub anchor: Point3<f32>,
    /// World space hinge axis, unit length.
    pub axis: Vector3<f32>,
    /// Smallest allowed hinge angle, radians.
    pub limits_min: f32,
    /// Largest allowed hinge angle, radians.
    pub limits_max: f32,
    /// Torque resisting free rotation while the motor is off.
    pub max_friction_torque: f32,
    /// Motor state.
    pub motor: MotorMode,
    /// Target angular velocity for [`MotorMode::Velocity`](../enum.MotorMode.html).
    pub motor_target_velocity: f32,
    /// Target angle for [`MotorMode::Position`](../enum.MotorMode.html).
    pub motor_target_angle: f32,
    /// Largest torque the motor may apply.
    pub max_motor_torque: f32,
    /// Spring driving the position motor.
    pub motor_spring: SpringSettings,
}

impl HingeSettings {
    /// An unlimited, unmotorized hinge.
    pub fn new(body_a: BodyId, body_b: BodyId, anchor: Point3<f32>, axis: Vector3<f32>) -> Self {
        HingeSettings {
            body_a,
            body_b,
            anchor,
            axis,
            limits_min: -FREE_LIMIT,
            limits_max: FREE_LIMIT,
            max_friction_torque: 0.,
            motor: MotorMode::Off,
            motor_target_velocity: 0.,
            motor_target_angle: 0.,
            max_motor_torque: ::std::f32::MAX,
            motor_spring: SpringSettings::frequency(2., 1.),
        }
    }
}

/// Allows rotation about a single axis only, with optional angle limits,
/// friction and a motor.
#[derive(Debug)]
pub struct HingeConstraint {
    base: ConstraintBase,
    local_a: Point3<f32>,
    local_b: Point3<f32>,
    local_axis_a: Vector3<f32>,
    local_axis_b: Vector3<f32>,
    local_normal_a: Vector3<f32>,
    local_normal_b: Vector3<f32>,
    limits_min: f32,
    limits_max: f32,
    max_friction_torque: f32,
    /// Motor state, changeable at runtime.
    pub motor: MotorMode,
    /// Target angular velocity of the velocity motor, rad/s.
    pub motor_target_velocity: f32,
    /// Target angle of the position motor, radians.
    pub motor_target_angle: f32,
    /// Largest torque the motor may apply.
    pub max_motor_torque: f32,
    motor_spring: SpringSettings,

    r1: Vector3<f32>,
    r2: Vector3<f32>,
    world_axis: Vector3<f32>,
    current_angle: f32,
    limit_state: LimitState,
    translation_xy: DualAxisConstraintPart,
    translation_z: AxisConstraintPart,
    rotation_lock: DualAxisConstraintPart,
    limit: AxisConstraintPart,
    motor_part: AxisConstraintPart,
}

impl HingeConstraint {
    /// Build from settings and the current body poses.
    pub fn new(settings: &HingeSettings, body_a: &RigidBody, body_b: &RigidBody) -> Self {
        let axis = settings.axis.normalize();
        let (normal, _) = orthonormal_basis(axis);
        HingeConstraint {
            base: ConstraintBase::new(settings.body_a, settings.body_b),
            local_a: body_a.pose.inverse_transform_point(settings.anchor),
            local_b: body_b.pose.inverse_transform_point(settings.anchor),
            local_axis_a: body_a.pose.inverse_transform_vector(axis),
            local_axis_b: body_b.pose.inverse_transform_vector(axis),
            local_normal_a: body_a.pose.inverse_transform_vector(normal),
            local_normal_b: body_b.pose.inverse_transform_vector(normal),
            limits_min: settings.limits_min,
            limits_max: settings.limits_max,
            max_friction_torque: settings.max_friction_torque,
            motor: settings.motor,
            motor_target_velocity: settings.motor_target_velocity,
            motor_target_angle: settings.motor_target_angle,
            max_motor_torque: settings.max_motor_torque,
            motor_spring: settings.motor_spring,
            r1: Vector3::new(0., 0., 0.),
            r2: Vector3::new(0., 0., 0.),
            world_axis: axis,
            current_angle: 0.,
            limit_state: LimitState::Inactive,
            translation_xy: DualAxisConstraintPart::new(),
            translation_z: AxisConstraintPart::new(),
            rotation_lock: DualAxisConstraintPart::new(),
            limit: AxisConstraintPart::new(),
            motor_part: AxisConstraintPart::new(),
        }
    }

    /// Current hinge angle, radians in `(-pi, pi]`.
    pub fn angle(&self) -> f32 {
        self.current_angle
    }

    /// Do the limits actually bound anything?
    fn has_limits(&self) -> bool {
        self.limits_min > -FREE_LIMIT || self.limits_max < FREE_LIMIT
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
        self.world_axis = body_a.pose.rotation.rotate_vector(self.local_axis_a);
        let normal_a = body_a.pose.rotation.rotate_vector(self.local_normal_a);
        let normal_b = body_b.pose.rotation.rotate_vector(self.local_normal_b);
        self.current_angle = normal_a
            .cross(normal_b)
            .dot(self.world_axis)
            .atan2(normal_a.dot(normal_b));
    }

    fn limit_error(&self) -> f32 {
        self.current_angle
            - self
                .current_angle
                .max(self.limits_min)
                .min(self.limits_max)
    }
}

impl Constraint for HingeConstraint {
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

        // Lock the two rotations perpendicular to the hinge axis.
        let (perpendicular_1, perpendicular_2) = orthonormal_basis(self.world_axis);
        self.rotation_lock.calculate_angular_constraint_properties(
            body_a,
            body_b,
            perpendicular_1,
            perpendicular_2,
        );

        self.limit_state = if !self.has_limits() {
            LimitState::Inactive
        } else if self.limits_min >= self.limits_max {
            LimitState::Locked
        } else if self.current_angle <= self.limits_min {
            LimitState::AtMin
        } else if self.current_angle >= self.limits_max {
            LimitState::AtMax
        } else {
            LimitState::Inactive
        };
        if self.limit_state != LimitState::Inactive {
            self.limit.calculate_angular_constraint_properties(
                body_a,
                body_b,
                self.world_axis,
                0.,
                dt,
                None,
            );
        } else {
            self.limit.deactivate();
        }

        match self.motor {
            MotorMode::Off if self.max_friction_torque > 0. => {
                self.motor_part.calculate_angular_constraint_properties(
                    body_a,
                    body_b,
                    self.world_axis,
                    0.,
                    dt,
                    None,
                );
            }
            MotorMode::Off => self.motor_part.deactivate(),
            MotorMode::Velocity => {
                self.motor_part.calculate_angular_constraint_properties(
                    body_a,
                    body_b,
                    self.world_axis,
                    self.motor_target_velocity,
                    dt,
                    None,
                );
            }
            MotorMode::Position => {
                let spring = self.motor_spring;
                let error = self.current_angle - self.motor_target_angle;
                self.motor_part.calculate_angular_constraint_properties(
                    body_a,
                    body_b,
                    self.world_axis,
                    0.,
                    dt,
                    Some((&spring, error)),
                );
            }
        }
    }

    fn warm_start_velocity(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody, ratio: f32) {
        self.motor_part.warm_start(body_a, body_b, ratio);
        self.translation_xy.warm_start(body_a, body_b, ratio);
        self.translation_z.warm_start(body_a, body_b, ratio);
        self.rotation_lock.warm_start(body_a, body_b, ratio);
        self.limit.warm_start(body_a, body_b, ratio);
    }

    fn solve_velocity(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody, dt: f32) -> bool {
        let mut applied = false;
        if self.motor_part.is_active() {
            let max_impulse = match self.motor {
                MotorMode::Off => self.max_friction_torque * dt,
                _ => self.max_motor_torque * dt,
            };
            applied |= self.motor_part.solve_velocity_constraint(
                body_a,
                body_b,
                -max_impulse,
                max_impulse,
            );
        }
        applied |= self.rotation_lock.solve_velocity_constraint(body_a, body_b);
        if self.limit.is_active() {
            let (min_lambda, max_lambda) = match self.limit_state {
                LimitState::AtMin => (0., ::std::f32::MAX),
                LimitState::AtMax => (::std::f32::MIN, 0.),
                _ => (::std::f32::MIN, ::std::f32::MAX),
            };
            applied |= self
                .limit
                .solve_velocity_constraint(body_a, body_b, min_lambda, max_lambda);
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

        // Align the hinge axes: the error is the misalignment cross product
        // resolved onto the two locked directions.
        let axis_b = body_b.pose.rotation.rotate_vector(self.local_axis_b);
        let misalignment = self.world_axis.cross(axis_b);
        let (perpendicular_1, perpendicular_2) = orthonormal_basis(self.world_axis);
        applied |= self.rotation_lock.solve_position_constraint(
            body_a,
            body_b,
            Vector2::new(
                misalignment.dot(perpendicular_1),
                misalignment.dot(perpendicular_2),
            ),
            baumgarte,
        );

        if self.limit.is_active() {
            let error = self.limit_error();
            if error != 0. {
                applied |= self.limit.solve_position_constraint(
                    body_a,
                    body_b,
                    error,
                    baumgarte,
                    ::std::f32::MAX,
                );
            }
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
