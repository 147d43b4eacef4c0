//! World transform of a body

use cgmath::{InnerSpace, One, Point3, Quaternion, Rotation, Vector3};

/// Position and orientation of a rigid body.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyPose {
    /// World position of the center of mass.
    pub position: Point3<f32>,
    /// World orientation, a unit quaternion.
    pub rotation: Quaternion<f32>,
}

impl BodyPose {
    /// Create a new pose from position and rotation.
    pub fn new(position: Point3<f32>, rotation: Quaternion<f32>) -> Self {
        BodyPose { position, rotation }
    }

    /// The identity pose at the origin.
    pub fn one() -> Self {
        BodyPose::new(Point3::new(0., 0., 0.), Quaternion::one())
    }

    /// Transform a local point to world space.
    pub fn transform_point(&self, point: Point3<f32>) -> Point3<f32> {
        self.position + self.rotation.rotate_vector(point - Point3::new(0., 0., 0.))
    }

    /// Rotate a local vector to world space.
    pub fn transform_vector(&self, vector: Vector3<f32>) -> Vector3<f32> {
        self.rotation.rotate_vector(vector)
    }

    /// Transform a world point to local space.
    pub fn inverse_transform_point(&self, point: Point3<f32>) -> Point3<f32> {
        Point3::new(0., 0., 0.) + self.rotation.invert().rotate_vector(point - self.position)
    }

    /// Rotate a world vector to local space.
    pub fn inverse_transform_vector(&self, vector: Vector3<f32>) -> Vector3<f32> {
        self.rotation.invert().rotate_vector(vector)
    }

    /// Integrate the pose by a velocity over `dt`.
    ///
    /// The quaternion derivative `0.5 * w * q` is applied and the result
    /// renormalized.
    pub fn integrate(&mut self, linear: Vector3<f32>, angular: Vector3<f32>, dt: f32) {
        self.position += linear * dt;
        let spin = Quaternion::from_sv(0., angular) * self.rotation * (0.5 * dt);
        self.rotation = (self.rotation + spin).normalize();
    }
}
