//! Constraint parts
//!
//! The small reusable blocks higher level constraints are composed from:
//! a 1-DOF axis part, a 2-DOF dual axis part and a 3-DOF rotation part.
//! Each part caches its effective mass in `calculate_*`, applies cached
//! impulses in `warm_start`, clamps and accumulates impulses in
//! `solve_velocity_constraint` and corrects drift in
//! `solve_position_constraint`.

pub mod axis;
pub mod dual_axis;
pub mod rotation_euler;
pub mod spring;

use cgmath::{InnerSpace, Quaternion, Vector3};

use body::RigidBody;

pub use self::axis::AxisConstraintPart;
pub use self::dual_axis::DualAxisConstraintPart;
pub use self::rotation_euler::RotationEulerConstraintPart;
pub use self::spring::{SpringMode, SpringSettings};

/// Denominators below this deactivate a part for the step.
pub(crate) const MIN_EFFECTIVE_MASS_DENOMINATOR: f32 = 1.0e-10;

/// Translate and rotate a body directly, as the position solver does.
///
/// The rotation is a small angle update: `q += 0.5 * w * q`, renormalized.
pub(crate) fn apply_position_correction(
    body: &mut RigidBody,
    translation: Vector3<f32>,
    rotation: Vector3<f32>,
) {
    body.pose.position += translation;
    if rotation.magnitude2() > 0. {
        let spin = Quaternion::from_sv(0., rotation) * body.pose.rotation * 0.5;
        body.pose.rotation = (body.pose.rotation + spin).normalize();
    }
}
