//! Distance constraint

use cgmath::{InnerSpace, Point3, Rotation, Vector3};

use body::{BodyId, RigidBody};
use constraint::part::{AxisConstraintPart, SpringSettings};
use constraint::{Constraint, ConstraintBase};

#[derive(Clone, Copy, Debug, PartialEq)]
enum LimitState {
    Inactive,
    AtMin,
    AtMax,
    Locked,
}

/// Description of a [`DistanceConstraint`](struct.DistanceConstraint.html).
#[derive(Clone, Debug)]
pub struct DistanceSettings {
    /// First body.
    pub body_a: BodyId,
    /// Second body.
    pub body_b: BodyId,
    /// Attachment point on A, world space.
    pub anchor_a: Point3<f32>,
    /// Attachment point on B, world space.
    pub anchor_b: Point3<f32>,
    /// Smallest allowed distance between the attachment points.
    pub min_distance: f32,
    /// Largest allowed distance. Equal to `min_distance` for a rod.
    pub max_distance: f32,
    /// Optional spring softening the limits.
    pub spring: Option<SpringSettings>,
}

impl DistanceSettings {
    /// A rigid rod keeping the anchors at their current distance.
    pub fn rod(body_a: BodyId, body_b: BodyId, anchor_a: Point3<f32>, anchor_b: Point3<f32>) -> Self {
        let distance = (anchor_b - anchor_a).magnitude();
        DistanceSettings {
            body_a,
            body_b,
            anchor_a,
            anchor_b,
            min_distance: distance,
            max_distance: distance,
            spring: None,
        }
    }
}

/// Keeps the distance between two attachment points inside a range,
/// optionally sprung.
#[derive(Debug)]
pub struct DistanceConstraint {
    base: ConstraintBase,
    local_a: Point3<f32>,
    local_b: Point3<f32>,
    min_distance: f32,
    max_distance: f32,
    spring: Option<SpringSettings>,
    axis: AxisConstraintPart,
    state: LimitState,
}

impl DistanceConstraint {
    /// Build from settings and the current body poses.
    pub fn new(settings: &DistanceSettings, body_a: &RigidBody, body_b: &RigidBody) -> Self {
        DistanceConstraint {
            base: ConstraintBase::new(settings.body_a, settings.body_b),
            local_a: body_a.pose.inverse_transform_point(settings.anchor_a),
            local_b: body_b.pose.inverse_transform_point(settings.anchor_b),
            min_distance: settings.min_distance.min(settings.max_distance),
            max_distance: settings.max_distance.max(settings.min_distance),
            spring: settings.spring,
            axis: AxisConstraintPart::new(),
            state: LimitState::Inactive,
        }
    }

    /// Current distance geometry: `(r1, r2, direction, distance)`.
    fn geometry(
        &self,
        body_a: &RigidBody,
        body_b: &RigidBody,
    ) -> Option<(Vector3<f32>, Vector3<f32>, Vector3<f32>, f32)> {
        let r1 = body_a
            .pose
            .rotation
            .rotate_vector(self.local_a - Point3::new(0., 0., 0.));
        let r2 = body_b
            .pose
            .rotation
            .rotate_vector(self.local_b - Point3::new(0., 0., 0.));
        let u = (body_b.pose.position + r2) - (body_a.pose.position + r1);
        let distance = u.magnitude();
        if distance < 1.0e-6 {
            // Anchors coincide, the direction is undefined this step.
            return None;
        }
        Some((r1, r2, u / distance, distance))
    }
}

impl Constraint for DistanceConstraint {
    fn base(&self) -> &ConstraintBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ConstraintBase {
        &mut self.base
    }

    fn setup_velocity(&mut self, body_a: &RigidBody, body_b: &RigidBody, dt: f32) {
        let (r1, r2, direction, distance) = match self.geometry(body_a, body_b) {
            Some(geometry) => geometry,
            None => {
                self.axis.deactivate();
                self.state = LimitState::Inactive;
                return;
            }
        };
        self.state = if self.min_distance >= self.max_distance {
            LimitState::Locked
        } else if distance <= self.min_distance {
            LimitState::AtMin
        } else if distance >= self.max_distance {
            LimitState::AtMax
        } else {
            LimitState::Inactive
        };
        let error = distance - distance.max(self.min_distance).min(self.max_distance);
        match self.spring {
            Some(ref spring) if spring.has_stiffness() => {
                // Springs engage permanently and only through velocity.
                self.axis.calculate_constraint_properties(
                    body_a,
                    body_b,
                    r1,
                    r2,
                    direction,
                    0.,
                    dt,
                    Some((spring, error)),
                );
            }
            _ if self.state != LimitState::Inactive => {
                self.axis.calculate_constraint_properties(
                    body_a, body_b, r1, r2, direction, 0., dt, None,
                );
            }
            _ => self.axis.deactivate(),
        }
    }

    fn warm_start_velocity(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody, ratio: f32) {
        self.axis.warm_start(body_a, body_b, ratio);
    }

    fn solve_velocity(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody, _dt: f32) -> bool {
        // Pulling apart needs positive impulses, pulling together negative.
        let (min_lambda, max_lambda) = match self.state {
            LimitState::AtMin => (0., ::std::f32::MAX),
            LimitState::AtMax => (::std::f32::MIN, 0.),
            LimitState::Locked => (::std::f32::MIN, ::std::f32::MAX),
            LimitState::Inactive if self.spring.is_some() => {
                (::std::f32::MIN, ::std::f32::MAX)
            }
            LimitState::Inactive => return false,
        };
        self.axis
            .solve_velocity_constraint(body_a, body_b, min_lambda, max_lambda)
    }

    fn solve_position(
        &mut self,
        body_a: &mut RigidBody,
        body_b: &mut RigidBody,
        dt: f32,
        baumgarte: f32,
    ) -> bool {
        if self.spring.as_ref().map_or(false, SpringSettings::has_stiffness) {
            return false;
        }
        self.setup_velocity(body_a, body_b, dt);
        let error = match self.geometry(body_a, body_b) {
            Some((_, _, _, distance)) => {
                distance - distance.max(self.min_distance).min(self.max_distance)
            }
            None => return false,
        };
        if error == 0. {
            return false;
        }
        self.axis
            .solve_position_constraint(body_a, body_b, error, baumgarte, ::std::f32::MAX)
    }
}
