//! Swing twist constraint

use cgmath::{InnerSpace, Matrix3, Point3, Quaternion, Rotation, Vector3};

use body::{BodyId, RigidBody};
use constraint::part::{AxisConstraintPart, DualAxisConstraintPart};
use constraint::{Constraint, ConstraintBase};

#[derive(Clone, Copy, Debug, PartialEq)]
enum LimitState {
    Inactive,
    AtMin,
    AtMax,
    Locked,
}

fn limit_state(angle: f32, min: f32, max: f32) -> LimitState {
    if min >= max {
        LimitState::Locked
    } else if angle <= min {
        LimitState::AtMin
    } else if angle >= max {
        LimitState::AtMax
    } else {
        LimitState::Inactive
    }
}

fn limit_clamps(state: LimitState) -> Option<(f32, f32)> {
    match state {
        LimitState::Inactive => None,
        LimitState::AtMin => Some((0., ::std::f32::MAX)),
        LimitState::AtMax => Some((::std::f32::MIN, 0.)),
        LimitState::Locked => Some((::std::f32::MIN, ::std::f32::MAX)),
    }
}

/// Description of a [`SwingTwistConstraint`](struct.SwingTwistConstraint.html).
#[derive(Clone, Debug)]
pub struct SwingTwistSettings {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// World space pivot point.
    pub anchor: Point3<f32>,
    /// World space twist axis, unit length.
    pub twist_axis: Vector3<f32>,
    /// World space plane axis, perpendicular to the twist axis.
    pub plane_axis: Vector3<f32>,
    /// Swing half angle around the plane axis, radians.
    pub plane_half_angle: f32,
    /// Swing half angle around the normal axis, radians.
    pub normal_half_angle: f32,
    /// Smallest allowed twist angle, radians.
    pub twist_min: f32,
    /// Largest allowed twist angle, radians.
    pub twist_max: f32,
}

/// Pins a point and decomposes the relative orientation into twist about an
/// axis and swing in the orthogonal plane; cone limits bound the swing, an
/// angular range bounds the twist.
#[derive(Debug)]
pub struct SwingTwistConstraint {
    base: ConstraintBase,
    local_a: Point3<f32>,
    local_b: Point3<f32>,
    /// Constraint frame in A body space; X is the twist axis.
    frame_a: Quaternion<f32>,
    /// Constraint frame in B body space.
    frame_b: Quaternion<f32>,
    plane_half_angle: f32,
    normal_half_angle: f32,
    twist_min: f32,
    twist_max: f32,

    r1: Vector3<f32>,
    r2: Vector3<f32>,
    twist_angle: f32,
    swing_plane_angle: f32,
    swing_normal_angle: f32,
    world_twist_axis: Vector3<f32>,
    world_plane_axis: Vector3<f32>,
    world_normal_axis: Vector3<f32>,
    twist_state: LimitState,
    plane_state: LimitState,
    normal_state: LimitState,
    translation_xy: DualAxisConstraintPart,
    translation_z: AxisConstraintPart,
    twist: AxisConstraintPart,
    swing_plane: AxisConstraintPart,
    swing_normal: AxisConstraintPart,
}

impl SwingTwistConstraint {
    /// Build from settings and the current body poses.
    pub fn new(settings: &SwingTwistSettings, body_a: &RigidBody, body_b: &RigidBody) -> Self {
        let twist = settings.twist_axis.normalize();
        let plane = (settings.plane_axis
            - twist * settings.plane_axis.dot(twist))
            .normalize();
        let normal = twist.cross(plane);
        let frame_world = Quaternion::from(Matrix3::from_cols(twist, plane, normal));
        let frame_a = body_a.pose.rotation.invert() * frame_world;
        let frame_b = body_b.pose.rotation.invert() * frame_world;
        SwingTwistConstraint {
            base: ConstraintBase::new(settings.body_a, settings.body_b),
            local_a: body_a.pose.inverse_transform_point(settings.anchor),
            local_b: body_b.pose.inverse_transform_point(settings.anchor),
            frame_a,
            frame_b,
            plane_half_angle: settings.plane_half_angle,
            normal_half_angle: settings.normal_half_angle,
            twist_min: settings.twist_min,
            twist_max: settings.twist_max,
            r1: Vector3::new(0., 0., 0.),
            r2: Vector3::new(0., 0., 0.),
            twist_angle: 0.,
            swing_plane_angle: 0.,
            swing_normal_angle: 0.,
            world_twist_axis: twist,
            world_plane_axis: plane,
            world_normal_axis: normal,
            twist_state: LimitState::Inactive,
            plane_state: LimitState::Inactive,
            normal_state: LimitState::Inactive,
            translation_xy: DualAxisConstraintPart::new(),
            translation_z: AxisConstraintPart::new(),
            twist: AxisConstraintPart::new(),
            swing_plane: AxisConstraintPart::new(),
            swing_normal: AxisConstraintPart::new(),
        }
    }

    /// Current twist angle, radians.
    pub fn twist_angle(&self) -> f32 {
        self.twist_angle
    }

    /// Decompose the relative rotation into twist about the constraint X
    /// axis and the two swing components.
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
        self.world_twist_axis = constraint_a.rotate_vector(Vector3::new(1., 0., 0.));
        self.world_plane_axis = constraint_a.rotate_vector(Vector3::new(0., 1., 0.));
        self.world_normal_axis = constraint_a.rotate_vector(Vector3::new(0., 0., 1.));

        let relative = constraint_a.invert() * constraint_b;
        // Twist: the component of the relative rotation about X.
        let twist_norm = (relative.s * relative.s + relative.v.x * relative.v.x).sqrt();
        let (twist, swing) = if twist_norm > 1.0e-6 {
            let twist = Quaternion::new(
                relative.s / twist_norm,
                relative.v.x / twist_norm,
                0.,
                0.,
            );
            (twist, relative * twist.invert())
        } else {
            // Swing of exactly pi; twist is undefined, treat it as zero.
            (Quaternion::new(1., 0., 0., 0.), relative)
        };
        self.twist_angle = 2. * twist.v.x.atan2(twist.s);
        self.swing_plane_angle = 2. * swing.v.y.atan2(swing.s);
        self.swing_normal_angle = 2. * swing.v.z.atan2(swing.s);
    }
}

impl Constraint for SwingTwistConstraint {
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

        self.twist_state = limit_state(self.twist_angle, self.twist_min, self.twist_max);
        if self.twist_state != LimitState::Inactive {
            self.twist.calculate_angular_constraint_properties(
                body_a,
                body_b,
                self.world_twist_axis,
                0.,
                dt,
                None,
            );
        } else {
            self.twist.deactivate();
        }

        self.plane_state = limit_state(
            self.swing_plane_angle,
            -self.plane_half_angle,
            self.plane_half_angle,
        );
        if self.plane_state != LimitState::Inactive {
            self.swing_plane.calculate_angular_constraint_properties(
                body_a,
                body_b,
                self.world_plane_axis,
                0.,
                dt,
                None,
            );
        } else {
            self.swing_plane.deactivate();
        }

        self.normal_state = limit_state(
            self.swing_normal_angle,
            -self.normal_half_angle,
            self.normal_half_angle,
        );
        if self.normal_state != LimitState::Inactive {
            self.swing_normal.calculate_angular_constraint_properties(
                body_a,
                body_b,
                self.world_normal_axis,
                0.,
                dt,
                None,
            );
        } else {
            self.swing_normal.deactivate();
        }
    }

    fn warm_start_velocity(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody, ratio: f32) {
        self.translation_xy.warm_start(body_a, body_b, ratio);
        self.translation_z.warm_start(body_a, body_b, ratio);
        self.twist.warm_start(body_a, body_b, ratio);
        self.swing_plane.warm_start(body_a, body_b, ratio);
        self.swing_normal.warm_start(body_a, body_b, ratio);
    }

    fn solve_velocity(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody, _dt: f32) -> bool {
        let mut applied = false;
        for &(part, state) in &[
            (0usize, self.twist_state),
            (1, self.plane_state),
            (2, self.normal_state),
        ] {
            if let Some((min_lambda, max_lambda)) = limit_clamps(state) {
                let part = match part {
                    0 => &mut self.twist,
                    1 => &mut self.swing_plane,
                    _ => &mut self.swing_normal,
                };
                applied |=
                    part.solve_velocity_constraint(body_a, body_b, min_lambda, max_lambda);
            }
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

        let twist_error = self.twist_angle
            - self.twist_angle.max(self.twist_min).min(self.twist_max);
        if twist_error != 0. && self.twist.is_active() {
            applied |= self.twist.solve_position_constraint(
                body_a,
                body_b,
                twist_error,
                baumgarte,
                ::std::f32::MAX,
            );
        }
        let plane_error = self.swing_plane_angle
            - self
                .swing_plane_angle
                .max(-self.plane_half_angle)
                .min(self.plane_half_angle);
        if plane_error != 0. && self.swing_plane.is_active() {
            applied |= self.swing_plane.solve_position_constraint(
                body_a,
                body_b,
                plane_error,
                baumgarte,
                ::std::f32::MAX,
            );
        }
        let normal_error = self.swing_normal_angle
            - self
                .swing_normal_angle
                .max(-self.normal_half_angle)
                .min(self.normal_half_angle);
        if normal_error != 0. && self.swing_normal.is_active() {
            applied |= self.swing_normal.solve_position_constraint(
                body_a,
                body_b,
                normal_error,
                baumgarte,
                ::std::f32::MAX,
            );
        }

        self.update_geometry(body_a, body_b);
        let error = (body_b.pose.position + self.r2) - (body_a.pose.position + self.r1);
        applied |= self.translation_xy.solve_position_constraint(
            body_a,
            body_b,
            ::cgmath::Vector2::new(error.x, error.y),
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
