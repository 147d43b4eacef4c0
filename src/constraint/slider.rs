//! Slider (prismatic) constraint

use cgmath::{InnerSpace, Point3, Quaternion, Rotation, Vector2, Vector3};

use body::{BodyId, RigidBody};
use constraint::part::{
    AxisConstraintPart, DualAxisConstraintPart, RotationEulerConstraintPart, SpringSettings,
};
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

/// Description of a [`SliderConstraint`](struct.SliderConstraint.html).
#[derive(Clone, Debug)]
pub struct SliderSettings {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// World space point both attachments start at.
    pub anchor: Point3<f32>,
    /// World space slide direction, unit length.
    pub axis: Vector3<f32>,
    /// Smallest allowed position along the axis.
    pub limits_min: f32,
    /// Largest allowed position along the axis.
    pub limits_max: f32,
    /// Spring softening the limits; zero stiffness keeps them rigid.
    pub limit_spring: SpringSettings,
    /// Force resisting free sliding while the motor is off.
    pub max_friction_force: f32,
    /// Motor state.
    pub motor: MotorMode,
    /// Target velocity of the velocity motor, m/s.
    pub motor_target_velocity: f32,
    /// Target position of the position motor, m.
    pub motor_target_position: f32,
    /// Largest force the motor may apply.
    pub max_motor_force: f32,
    /// Spring driving the position motor.
    pub motor_spring: SpringSettings,
}

impl SliderSettings {
    /// An unlimited, unmotorized slider.
    pub fn new(body_a: BodyId, body_b: BodyId, anchor: Point3<f32>, axis: Vector3<f32>) -> Self {
        SliderSettings {
            body_a,
            body_b,
            anchor,
            axis,
            limits_min: -FREE_LIMIT,
            limits_max: FREE_LIMIT,
            limit_spring: SpringSettings::frequency(0., 0.),
            max_friction_force: 0.,
            motor: MotorMode::Off,
            motor_target_velocity: 0.,
            motor_target_position: 0.,
            max_motor_force: ::std::f32::MAX,
            motor_spring: SpringSettings::frequency(2., 1.),
        }
    }
}

/// Removes five degrees of freedom, leaving translation along one axis:
/// two perpendicular translations are held by a dual axis part, the three
/// rotations by a rotation part, and limits, friction and motor act along
/// the slider axis.
#[derive(Debug)]
pub struct SliderConstraint {
    base: ConstraintBase,
    local_a: Point3<f32>,
    local_b: Point3<f32>,
    local_axis_a: Vector3<f32>,
    local_normal_1: Vector3<f32>,
    local_normal_2: Vector3<f32>,
    inverse_initial_orientation: Quaternion<f32>,
    limits_min: f32,
    limits_max: f32,
    limit_spring: SpringSettings,
    max_friction_force: f32,
    /// Motor state, changeable at runtime.
    pub motor: MotorMode,
    /// Target velocity of the velocity motor, m/s.
    pub motor_target_velocity: f32,
    /// Target position of the position motor, m.
    pub motor_target_position: f32,
    /// Largest force the motor may apply.
    pub max_motor_force: f32,
    motor_spring: SpringSettings,

    r1: Vector3<f32>,
    r2: Vector3<f32>,
    u: Vector3<f32>,
    world_axis: Vector3<f32>,
    current_position: f32,
    limit_state: LimitState,
    perpendicular: DualAxisConstraintPart,
    rotation: RotationEulerConstraintPart,
    limit: AxisConstraintPart,
    motor_part: AxisConstraintPart,
}

impl SliderConstraint {
    /// Build from settings and the current body poses.
    pub fn new(settings: &SliderSettings, body_a: &RigidBody, body_b: &RigidBody) -> Self {
        let axis = settings.axis.normalize();
        let (normal_1, normal_2) = orthonormal_basis(axis);
        SliderConstraint {
            base: ConstraintBase::new(settings.body_a, settings.body_b),
            local_a: body_a.pose.inverse_transform_point(settings.anchor),
            local_b: body_b.pose.inverse_transform_point(settings.anchor),
            local_axis_a: body_a.pose.inverse_transform_vector(axis),
            local_normal_1: body_a.pose.inverse_transform_vector(normal_1),
            local_normal_2: body_a.pose.inverse_transform_vector(normal_2),
            inverse_initial_orientation:
                RotationEulerConstraintPart::inverse_initial_orientation(body_a, body_b),
            limits_min: settings.limits_min,
            limits_max: settings.limits_max,
            limit_spring: settings.limit_spring,
            max_friction_force: settings.max_friction_force,
            motor: settings.motor,
            motor_target_velocity: settings.motor_target_velocity,
            motor_target_position: settings.motor_target_position,
            max_motor_force: settings.max_motor_force,
            motor_spring: settings.motor_spring,
            r1: Vector3::new(0., 0., 0.),
            r2: Vector3::new(0., 0., 0.),
            u: Vector3::new(0., 0., 0.),
            world_axis: axis,
            current_position: 0.,
            limit_state: LimitState::Inactive,
            perpendicular: DualAxisConstraintPart::new(),
            rotation: RotationEulerConstraintPart::new(),
            limit: AxisConstraintPart::new(),
            motor_part: AxisConstraintPart::new(),
        }
    }

    /// Current position along the slider axis, meters.
    pub fn position(&self) -> f32 {
        self.current_position
    }

    /// Accumulated limit impulse from the last step; non zero while a limit
    /// is held.
    pub fn limit_impulse(&self) -> f32 {
        self.limit.total_lambda()
    }

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
        self.u = (body_b.pose.position + self.r2) - (body_a.pose.position + self.r1);
        self.world_axis = body_a.pose.rotation.rotate_vector(self.local_axis_a);
        self.current_position = self.u.dot(self.world_axis);
    }

    fn limit_error(&self) -> f32 {
        self.current_position
            - self
                .current_position
                .max(self.limits_min)
                .min(self.limits_max)
    }
}

impl Constraint for SliderConstraint {
    fn base(&self) -> &ConstraintBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConstraintBase {
        &mut self.base
    }

    fn setup_velocity(&mut self, body_a: &RigidBody, body_b: &RigidBody, dt: f32) {
        self.update_geometry(body_a, body_b);
        let normal_1 = body_a.pose.rotation.rotate_vector(self.local_normal_1);
        let normal_2 = body_a.pose.rotation.rotate_vector(self.local_normal_2);

        // Both constraint points coincide at B's attachment, so A's arm is
        // extended by the current separation.
        self.perpendicular.calculate_constraint_properties(
            body_a,
            body_b,
            self.r1 + self.u,
            self.r2,
            normal_1,
            normal_2,
        );
        self.rotation.calculate_constraint_properties(body_a, body_b);

        self.limit_state = if !self.has_limits() {
            LimitState::Inactive
        } else if self.limits_min >= self.limits_max {
            LimitState::Locked
        } else if self.current_position <= self.limits_min {
            LimitState::AtMin
        } else if self.current_position >= self.limits_max {
            LimitState::AtMax
        } else {
            LimitState::Inactive
        };
        if self.limit_state != LimitState::Inactive {
            let spring_error = self.limit_error();
            let spring = self.limit_spring;
            self.limit.calculate_constraint_properties(
                body_a,
                body_b,
                self.r1 + self.u,
                self.r2,
                self.world_axis,
                0.,
                dt,
                if spring.has_stiffness() {
                    Some((&spring, spring_error))
                } else {
                    None
                },
            );
        } else {
            self.limit.deactivate();
        }

        match self.motor {
            MotorMode::Off if self.max_friction_force > 0. => {
                self.motor_part.calculate_constraint_properties(
                    body_a,
                    body_b,
                    self.r1 + self.u,
                    self.r2,
                    self.world_axis,
                    0.,
                    dt,
                    None,
                );
            }
            MotorMode::Off => self.motor_part.deactivate(),
            MotorMode::Velocity => {
                self.motor_part.calculate_constraint_properties(
                    body_a,
                    body_b,
                    self.r1 + self.u,
                    self.r2,
                    self.world_axis,
                    self.motor_target_velocity,
                    dt,
                    None,
                );
            }
            MotorMode::Position => {
                let spring = self.motor_spring;
                let error = self.current_position - self.motor_target_position;
                self.motor_part.calculate_constraint_properties(
                    body_a,
                    body_b,
                    self.r1 + self.u,
                    self.r2,
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
        self.perpendicular.warm_start(body_a, body_b, ratio);
        self.rotation.warm_start(body_a, body_b, ratio);
        self.limit.warm_start(body_a, body_b, ratio);
    }

    fn solve_velocity(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody, dt: f32) -> bool {
        let mut applied = false;
        if self.motor_part.is_active() {
            let max_impulse = match self.motor {
                MotorMode::Off => self.max_friction_force * dt,
                _ => self.max_motor_force * dt,
            };
            applied |= self.motor_part.solve_velocity_constraint(
                body_a,
                body_b,
                -max_impulse,
                max_impulse,
            );
        }
        applied |= self.rotation.solve_velocity_constraint(body_a, body_b);
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
        applied |= self.perpendicular.solve_velocity_constraint(body_a, body_b);
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

        self.update_geometry(body_a, body_b);
        let normal_1 = body_a.pose.rotation.rotate_vector(self.local_normal_1);
        let normal_2 = body_a.pose.rotation.rotate_vector(self.local_normal_2);
        applied |= self.perpendicular.solve_position_constraint(
            body_a,
            body_b,
            Vector2::new(self.u.dot(normal_1), self.u.dot(normal_2)),
            baumgarte,
        );

        if self.limit.is_active() && !self.limit_spring.has_stiffness() {
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
        applied
    }
}
