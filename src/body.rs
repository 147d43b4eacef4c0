//! Rigid bodies and the body pool

use cgmath::{Matrix, Matrix3, One, Point3, Quaternion, SquareMatrix, Vector3, Zero};
use collision::Aabb3;

use constraint::ConstraintId;
use layers::{ObjectLayer, INVALID_BROAD_PHASE_LAYER};
use material::Material;
use narrow::Shape;
use pose::BodyPose;

/// Marker for "not a member of any island".
pub const INVALID_ISLAND: i32 = -1;

/// Marker for "no broad phase node".
pub const INVALID_BVH_NODE: i32 = -1;

/// Opaque rigid body handle: 24 bits of pool index, 8 bits of sequence.
///
/// The sequence byte changes every time a pool slot is reused, so a handle to
/// a removed body is detected instead of dereferencing the slot's new tenant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BodyId(u32);

impl BodyId {
    /// Handle that never refers to a body.
    pub const INVALID: BodyId = BodyId(!0);

    /// Pack an index and a sequence number into a handle.
    pub fn new(index: u32, sequence: u32) -> Self {
        debug_assert!(index < (1 << 24) && sequence < (1 << 8));
        BodyId(index | (sequence << 24))
    }

    /// Pool index part of the handle.
    pub fn index(self) -> u32 {
        self.0 & 0x00ff_ffff
    }

    /// Sequence part of the handle.
    pub fn sequence(self) -> u32 {
        self.0 >> 24
    }

    /// Raw packed value, usable as a stable sort key.
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Rebuild a handle from its raw packed value.
    pub fn from_raw(raw: u32) -> BodyId {
        BodyId(raw)
    }
}

/// Determines which forces and impulses apply to a body.
///
/// The ordering is meaningful: callbacks receive the body with the *higher*
/// motion type first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MotionType {
    /// Never moves.
    Static,
    /// Moved by the host, infinite mass.
    Kinematic,
    /// Fully simulated.
    Dynamic,
}

/// Velocities and mass data for a body that can move.
#[derive(Clone, Debug)]
pub struct MotionProperties {
    /// Linear velocity of the center of mass, world space.
    pub linear_velocity: Vector3<f32>,
    /// Angular velocity, world space.
    pub angular_velocity: Vector3<f32>,
    /// `1 / mass`; zero for non-dynamic bodies.
    pub inverse_mass: f32,
    /// Diagonal of the inverse inertia tensor in body space.
    pub inverse_inertia: Vector3<f32>,
}

impl Default for MotionProperties {
    fn default() -> Self {
        MotionProperties {
            linear_velocity: Vector3::zero(),
            angular_velocity: Vector3::zero(),
            inverse_mass: 0.,
            inverse_inertia: Vector3::zero(),
        }
    }
}

/// Description of a body to create.
///
/// Construct with [`BodyDesc::new`](#method.new), refine with the `with_*`
/// methods, then hand to `World::create_body`.
#[derive(Clone, Debug)]
pub struct BodyDesc {
    /// Collision shape.
    pub shape: Shape,
    /// Initial world position.
    pub position: Point3<f32>,
    /// Initial world rotation.
    pub rotation: Quaternion<f32>,
    /// Motion type.
    pub motion_type: MotionType,
    /// Object layer.
    pub object_layer: ObjectLayer,
    /// Surface material.
    pub material: Material,
    /// Collision group bits.
    pub collision_group: u32,
    /// Collision mask bits.
    pub collision_mask: u32,
    /// Sensors detect contacts but generate no constraint response.
    pub sensor: bool,
    /// Opt in to kinematic vs non-dynamic pairs.
    pub collide_kinematic_vs_non_dynamic: bool,
    /// Allow this body to sleep.
    pub allow_sleeping: bool,
    /// Override the mass computed from the shape, if positive.
    pub mass_override: f32,
    /// Initial linear velocity.
    pub linear_velocity: Vector3<f32>,
    /// Initial angular velocity.
    pub angular_velocity: Vector3<f32>,
}

impl BodyDesc {
    /// A dynamic body with the given shape at the given position.
    pub fn new(shape: Shape, position: Point3<f32>) -> Self {
        BodyDesc {
            shape,
            position,
            rotation: Quaternion::one(),
            motion_type: MotionType::Dynamic,
            object_layer: 0,
            material: Material::default(),
            collision_group: !0,
            collision_mask: !0,
            sensor: false,
            collide_kinematic_vs_non_dynamic: false,
            allow_sleeping: true,
            mass_override: 0.,
            linear_velocity: Vector3::zero(),
            angular_velocity: Vector3::zero(),
        }
    }

    /// Set the motion type.
    pub fn with_motion_type(mut self, motion_type: MotionType) -> Self {
        self.motion_type = motion_type;
        self
    }

    /// Set the object layer.
    pub fn with_object_layer(mut self, layer: ObjectLayer) -> Self {
        self.object_layer = layer;
        self
    }

    /// Set the initial rotation.
    pub fn with_rotation(mut self, rotation: Quaternion<f32>) -> Self {
        self.rotation = rotation;
        self
    }

    /// Set the material.
    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    /// Set group and mask bits.
    pub fn with_group_and_mask(mut self, group: u32, mask: u32) -> Self {
        self.collision_group = group;
        self.collision_mask = mask;
        self
    }

    /// Mark the body as a sensor.
    pub fn with_sensor(mut self, sensor: bool) -> Self {
        self.sensor = sensor;
        self
    }

    /// Override the mass computed from the shape.
    pub fn with_mass(mut self, mass: f32) -> Self {
        self.mass_override = mass;
        self
    }

    /// Set the initial velocities.
    pub fn with_velocity(mut self, linear: Vector3<f32>, angular: Vector3<f32>) -> Self {
        self.linear_velocity = linear;
        self.angular_velocity = angular;
        self
    }

    /// Opt in to kinematic vs non-dynamic contact pairs.
    pub fn with_collide_kinematic_vs_non_dynamic(mut self, enabled: bool) -> Self {
        self.collide_kinematic_vs_non_dynamic = enabled;
        self
    }

    /// Allow or forbid sleeping for this body.
    pub fn with_allow_sleeping(mut self, allow: bool) -> Self {
        self.allow_sleeping = allow;
        self
    }
}

/// A rigid body stored in the world's body pool.
#[derive(Debug)]
pub struct RigidBody {
    /// Handle of this body; sequence part updates on slot reuse.
    pub(crate) id: BodyId,
    /// World transform.
    pub pose: BodyPose,
    /// Cached world space bounding box.
    pub aabb: Aabb3<f32>,
    /// Collision shape.
    pub shape: Shape,
    /// Motion type.
    pub motion_type: MotionType,
    /// Velocities and mass data.
    pub motion: MotionProperties,
    /// Surface material.
    pub material: Material,
    /// Object layer.
    pub object_layer: ObjectLayer,
    /// Collision group bits.
    pub collision_group: u32,
    /// Collision mask bits.
    pub collision_mask: u32,
    /// Sensors detect but do not respond.
    pub sensor: bool,
    /// Whether the body (and its island) is asleep.
    pub(crate) sleeping: bool,
    /// Seconds the body has been under the sleep velocity threshold.
    pub(crate) sleep_timer: f32,
    /// Leaf node in the owning broad phase tree, or -1.
    pub(crate) bvh_node: i32,
    /// Broad phase layer the body is inserted in, or -1.
    pub(crate) broad_phase_layer: i32,
    /// Island membership, recomputed each step.
    pub(crate) island_index: i32,
    /// Constraints attached to this body.
    pub(crate) constraints: Vec<ConstraintId>,
    /// Opt in to kinematic vs non-dynamic pairs.
    pub collide_kinematic_vs_non_dynamic: bool,
    /// Whether this body may sleep.
    pub allow_sleeping: bool,
    /// Tombstone; set when the body is returned to the pool.
    pub(crate) pooled: bool,
}

impl RigidBody {
    fn from_desc(desc: BodyDesc, id: BodyId) -> Self {
        let mut motion = MotionProperties::default();
        if desc.motion_type == MotionType::Dynamic {
            let mass_properties = desc.shape.mass_properties();
            let (mass, inertia) = if desc.mass_override > 0. {
                let scale = desc.mass_override / mass_properties.mass;
                (desc.mass_override, mass_properties.inertia * scale)
            } else {
                (mass_properties.mass, mass_properties.inertia)
            };
            motion.inverse_mass = 1. / mass;
            motion.inverse_inertia =
                Vector3::new(1. / inertia.x, 1. / inertia.y, 1. / inertia.z);
        }
        motion.linear_velocity = desc.linear_velocity;
        motion.angular_velocity = desc.angular_velocity;
        let pose = BodyPose::new(desc.position, desc.rotation);
        let aabb = desc.shape.world_aabb(&pose);
        RigidBody {
            id,
            pose,
            aabb,
            shape: desc.shape,
            motion_type: desc.motion_type,
            motion,
            material: desc.material,
            object_layer: desc.object_layer,
            collision_group: desc.collision_group,
            collision_mask: desc.collision_mask,
            sensor: desc.sensor,
            sleeping: false,
            sleep_timer: 0.,
            bvh_node: INVALID_BVH_NODE,
            broad_phase_layer: INVALID_BROAD_PHASE_LAYER,
            island_index: INVALID_ISLAND,
            constraints: Vec::new(),
            collide_kinematic_vs_non_dynamic: desc.collide_kinematic_vs_non_dynamic,
            allow_sleeping: desc.allow_sleeping,
            pooled: false,
        }
    }

    /// Handle of this body.
    pub fn id(&self) -> BodyId {
        self.id
    }

    /// Is the body dynamic?
    pub fn is_dynamic(&self) -> bool {
        self.motion_type == MotionType::Dynamic
    }

    /// Is the body static?
    pub fn is_static(&self) -> bool {
        self.motion_type == MotionType::Static
    }

    /// Is the body asleep?
    pub fn is_sleeping(&self) -> bool {
        self.sleeping
    }

    /// Does this body take part in broad phase queries? Static and sleeping
    /// bodies are found by others but never query themselves.
    pub fn is_querying(&self) -> bool {
        !self.is_static() && !self.sleeping
    }

    /// Wake the body and restart its sleep timer.
    pub fn wake(&mut self) {
        self.sleeping = false;
        self.sleep_timer = 0.;
    }

    /// Recompute the cached world AABB from the shape and pose.
    pub fn update_world_aabb(&mut self) {
        self.aabb = self.shape.world_aabb(&self.pose);
    }

    /// Inverse inertia tensor in world space: `R * diag(inv_i) * R^T`.
    ///
    /// Zero for non-dynamic bodies.
    pub fn inverse_inertia_world(&self) -> Matrix3<f32> {
        if self.motion_type != MotionType::Dynamic {
            return Matrix3::zero();
        }
        let rotation = Matrix3::from(self.pose.rotation);
        rotation
            * Matrix3::from_diagonal(self.motion.inverse_inertia)
            * rotation.transpose()
    }

    /// Velocity of a world space point rigidly attached to the body.
    pub fn point_velocity(&self, point: Point3<f32>) -> Vector3<f32> {
        self.motion.linear_velocity
            + self
                .motion
                .angular_velocity
                .cross(point - self.pose.position)
    }
}

/// Free-list pool of rigid bodies.
///
/// Removal tombstones the slot and pushes its index on the free list; the
/// sequence byte of [`BodyId`](struct.BodyId.html) guards against stale
/// handles once a slot is reused.
#[derive(Debug, Default)]
pub struct BodyPool {
    bodies: Vec<RigidBody>,
    free: Vec<u32>,
}

impl BodyPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        BodyPool::default()
    }

    /// Add a body, reusing a free slot when available.
    pub fn add(&mut self, desc: BodyDesc) -> BodyId {
        match self.free.pop() {
            Some(index) => {
                let sequence = (self.bodies[index as usize].id.sequence() + 1) & 0xff;
                let id = BodyId::new(index, sequence);
                self.bodies[index as usize] = RigidBody::from_desc(desc, id);
                id
            }
            None => {
                let id = BodyId::new(self.bodies.len() as u32, 0);
                self.bodies.push(RigidBody::from_desc(desc, id));
                id
            }
        }
    }

    /// Tombstone a body and recycle its slot.
    ///
    /// Returns `false` for stale or unknown handles.
    pub fn remove(&mut self, id: BodyId) -> bool {
        let valid = self.get(id).is_some();
        if valid {
            let index = id.index();
            self.bodies[index as usize].pooled = true;
            self.free.push(index);
        }
        valid
    }

    /// Look up a body by handle; stale handles return `None`.
    pub fn get(&self, id: BodyId) -> Option<&RigidBody> {
        self.bodies.get(id.index() as usize).and_then(|body| {
            if body.pooled || body.id != id {
                None
            } else {
                Some(body)
            }
        })
    }

    /// Mutable lookup by handle; stale handles return `None`.
    pub fn get_mut(&mut self, id: BodyId) -> Option<&mut RigidBody> {
        self.bodies.get_mut(id.index() as usize).and_then(|body| {
            if body.pooled || body.id != id {
                None
            } else {
                Some(body)
            }
        })
    }

    /// Borrow a body by pool index. The slot must be live.
    pub fn at(&self, index: u32) -> &RigidBody {
        &self.bodies[index as usize]
    }

    /// Mutably borrow a body by pool index. The slot must be live.
    pub fn at_mut(&mut self, index: u32) -> &mut RigidBody {
        &mut self.bodies[index as usize]
    }

    /// Mutably borrow two distinct bodies at once.
    pub fn pair_mut(&mut self, a: u32, b: u32) -> (&mut RigidBody, &mut RigidBody) {
        debug_assert!(a != b);
        if a < b {
            let (head, tail) = self.bodies.split_at_mut(b as usize);
            (&mut head[a as usize], &mut tail[0])
        } else {
            let (head, tail) = self.bodies.split_at_mut(a as usize);
            (&mut tail[0], &mut head[b as usize])
        }
    }

    /// Number of slots, live or pooled.
    pub fn capacity(&self) -> usize {
        self.bodies.len()
    }

    /// Iterate over live bodies with their pool indices.
    pub fn iter<'a>(&'a self) -> impl Iterator<Item = (u32, &'a RigidBody)> + 'a {
        self.bodies
            .iter()
            .enumerate()
            .filter(|&(_, body)| !body.pooled)
            .map(|(index, body)| (index as u32, body))
    }

    /// Pool indices of live bodies, in index order.
    pub fn live_indices<'a>(&'a self) -> impl Iterator<Item = u32> + 'a {
        self.bodies
            .iter()
            .enumerate()
            .filter(|&(_, body)| !body.pooled)
            .map(|(index, _)| index as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use narrow::Shape;

    #[test]
    fn id_round_trips_exactly() {
        for &index in &[0u32, 1, 7, (1 << 24) - 1] {
            for sequence in 0..256u32 {
                let id = BodyId::new(index, sequence);
                assert_eq!(id.index(), index);
                assert_eq!(id.sequence(), sequence);
            }
        }
    }

    #[test]
    fn stale_handles_are_rejected() {
        let mut pool = BodyPool::new();
        let desc = BodyDesc::new(Shape::sphere(1.), Point3::new(0., 0., 0.));
        let first = pool.add(desc.clone());
        assert!(pool.get(first).is_some());
        assert!(pool.remove(first));
        assert!(pool.get(first).is_none());
        let second = pool.add(desc);
        assert_eq!(second.index(), first.index());
        assert_ne!(second.sequence(), first.sequence());
        assert!(pool.get(first).is_none());
        assert!(pool.get(second).is_some());
    }

    #[test]
    fn dynamic_body_gets_inverse_mass() {
        let mut pool = BodyPool::new();
        let id = pool.add(
            BodyDesc::new(Shape::sphere(1.), Point3::new(0., 0., 0.)).with_mass(2.),
        );
        let body = pool.get(id).unwrap();
        assert!((body.motion.inverse_mass - 0.5).abs() < 1.0e-6);

        let fixed = pool.add(
            BodyDesc::new(Shape::sphere(1.), Point3::new(0., 0., 0.))
                .with_motion_type(MotionType::Static),
        );
        assert_eq!(pool.get(fixed).unwrap().motion.inverse_mass, 0.);
    }
}
