//! Contact constraints
//!
//! Built fresh every step from the reduced manifolds, solved together with
//! the user constraints, and drained into the warm start cache afterwards.

use std::collections::HashMap;

use cgmath::{InnerSpace, Point3, Vector3};

use body::{BodyId, RigidBody};
use constraint::part::AxisConstraintPart;
use narrow::manifold::ContactManifold;
use pose::BodyPose;
use settings::WorldSettings;
use util::orthonormal_basis;

/// One solved contact point.
#[derive(Debug)]
struct ContactPoint {
    /// Contact point in A's body space, for post-integration penetration.
    local_a: Point3<f32>,
    /// Contact point in B's body space.
    local_b: Point3<f32>,
    normal_part: AxisConstraintPart,
    friction_1: AxisConstraintPart,
    friction_2: AxisConstraintPart,
}

/// A contact manifold prepared for the sequential impulse solver.
#[derive(Debug)]
pub struct ContactConstraint {
    /// Pool index of body A (the first body of the reported pair).
    pub body_a: u32,
    /// Pool index of body B.
    pub body_b: u32,
    /// Handle of body A, for the warm start cache key.
    pub id_a: BodyId,
    /// Handle of body B.
    pub id_b: BodyId,
    /// Contact normal, pointing from A to B.
    pub normal: Vector3<f32>,
    tangent_1: Vector3<f32>,
    tangent_2: Vector3<f32>,
    friction: f32,
    restitution: f32,
    points: Vec<ContactPoint>,
}

impl ContactConstraint {
    /// Build a constraint from a manifold.
    ///
    /// `friction` and `restitution` are the already combined values of the
    /// two touching materials. Cached impulses from
    /// [`ContactCache`](struct.ContactCache.html) are transferred to points
    /// that lie within the preserve distance of a previous point.
    pub fn new(
        body_a: &RigidBody,
        body_b: &RigidBody,
        manifold: &ContactManifold,
        friction: f32,
        restitution: f32,
        cache: Option<&CachedManifold>,
        settings: &WorldSettings,
    ) -> Self {
        let (tangent_1, tangent_2) = orthonormal_basis(manifold.normal);
        let mut constraint = ContactConstraint {
            body_a: body_a.id().index(),
            body_b: body_b.id().index(),
            id_a: body_a.id(),
            id_b: body_b.id(),
            normal: manifold.normal,
            tangent_1,
            tangent_2,
            friction,
            restitution,
            points: Vec::with_capacity(manifold.points.len()),
        };
        for point in &manifold.points {
            let mut contact = ContactPoint {
                local_a: body_a.pose.inverse_transform_point(point.position_a),
                local_b: body_b.pose.inverse_transform_point(point.position_b),
                normal_part: AxisConstraintPart::new(),
                friction_1: AxisConstraintPart::new(),
                friction_2: AxisConstraintPart::new(),
            };
            if let Some(cached) = cache {
                if let Some(previous) = cached.nearest(
                    point.position_a,
                    settings.contact_point_preserve_lambda_max_dist_sq,
                ) {
                    contact.normal_part.set_total_lambda(previous.normal_lambda);
                    contact
                        .friction_1
                        .set_total_lambda(previous.tangent_lambda[0]);
                    contact
                        .friction_2
                        .set_total_lambda(previous.tangent_lambda[1]);
                }
            }
            constraint.points.push(contact);
        }
        constraint
    }

    /// Number of contact points.
    pub fn point_count(&self) -> usize {
        self.points.len()
    }

    /// Accumulated normal impulse over all points.
    pub fn total_normal_lambda(&self) -> f32 {
        self.points
            .iter()
            .map(|point| point.normal_part.total_lambda())
            .sum()
    }

    fn world_points(
        point: &ContactPoint,
        pose_a: &BodyPose,
        pose_b: &BodyPose,
    ) -> (Point3<f32>, Point3<f32>) {
        (
            pose_a.transform_point(point.local_a),
            pose_b.transform_point(point.local_b),
        )
    }

    /// Compute effective masses and velocity targets for this step.
    pub fn setup_velocity(
        &mut self,
        body_a: &RigidBody,
        body_b: &RigidBody,
        dt: f32,
        settings: &WorldSettings,
    ) {
        let normal = self.normal;
        for point in &mut self.points {
            let (world_a, world_b) = Self::world_points(point, &body_a.pose, &body_b.pose);
            let r1 = world_a - body_a.pose.position;
            let r2 = world_b - body_b.pose.position;
            let penetration = (world_a - world_b).dot(normal);

            // Approach velocity decides restitution; separation decides the
            // speculative allowance.
            let approach = normal.dot(
                body_b.point_velocity(world_b) - body_a.point_velocity(world_a),
            );
            let mut target = 0.;
            if approach < -settings.min_velocity_for_restitution {
                target = -self.restitution * approach;
            }
            if penetration < 0. {
                // Speculative contact: let the bodies close the gap this
                // step, but no further.
                target = target.max(penetration / dt);
            }
            point.normal_part.calculate_constraint_properties(
                body_a, body_b, r1, r2, normal, target, dt, None,
            );
            point.friction_1.calculate_constraint_properties(
                body_a,
                body_b,
                r1,
                r2,
                self.tangent_1,
                0.,
                dt,
                None,
            );
            point.friction_2.calculate_constraint_properties(
                body_a,
                body_b,
                r1,
                r2,
                self.tangent_2,
                0.,
                dt,
                None,
            );
        }
    }

    /// Apply the scaled cached impulses.
    pub fn warm_start(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody, ratio: f32) {
        for point in &mut self.points {
            point.normal_part.warm_start(body_a, body_b, ratio);
            point.friction_1.warm_start(body_a, body_b, ratio);
            point.friction_2.warm_start(body_a, body_b, ratio);
        }
    }

    /// One velocity iteration: friction boxed by the accumulated normal
    /// impulse, then the non penetration constraint.
    pub fn solve_velocity(&mut self, body_a: &mut RigidBody, body_b: &mut RigidBody) -> bool {
        let mut applied = false;
        for point in &mut self.points {
            let max_friction = self.friction * point.normal_part.total_lambda();
            if max_friction > 0. {
                applied |= point.friction_1.solve_velocity_constraint(
                    body_a,
                    body_b,
                    -max_friction,
                    max_friction,
                );
                applied |= point.friction_2.solve_velocity_constraint(
                    body_a,
                    body_b,
                    -max_friction,
                    max_friction,
                );
            }
            applied |= point.normal_part.solve_velocity_constraint(
                body_a,
                body_b,
                0.,
                ::std::f32::MAX,
            );
        }
        applied
    }

    /// One position iteration: push penetration beyond the slop back out.
    pub fn solve_position(
        &mut self,
        body_a: &mut RigidBody,
        body_b: &mut RigidBody,
        dt: f32,
        settings: &WorldSettings,
    ) -> bool {
        let normal = self.normal;
        let mut applied = false;
        for point in &mut self.points {
            let (world_a, world_b) = Self::world_points(point, &body_a.pose, &body_b.pose);
            let penetration = (world_a - world_b).dot(normal);
            if penetration <= settings.penetration_slop {
                continue;
            }
            let r1 = world_a - body_a.pose.position;
            let r2 = world_b - body_b.pose.position;
            point.normal_part.calculate_constraint_properties(
                body_a, body_b, r1, r2, normal, 0., dt, None,
            );
            applied |= point.normal_part.solve_position_constraint(
                body_a,
                body_b,
                -(penetration - settings.penetration_slop),
                settings.baumgarte_factor,
                settings.max_penetration_distance,
            );
        }
        applied
    }

    /// Store this constraint's impulses into the cache for the next step.
    fn drain_into(&self, body_a: &RigidBody, cached: &mut CachedManifold) {
        for point in &self.points {
            cached.points.push(CachedPoint {
                position_a: body_a.pose.transform_point(point.local_a),
                normal_lambda: point.normal_part.total_lambda(),
                tangent_lambda: [
                    point.friction_1.total_lambda(),
                    point.friction_2.total_lambda(),
                ],
            });
        }
    }
}

/// One cached contact point.
#[derive(Clone, Debug)]
struct CachedPoint {
    position_a: Point3<f32>,
    normal_lambda: f32,
    tangent_lambda: [f32; 2],
}

/// Cached impulses of one body pair.
#[derive(Clone, Debug, Default)]
pub struct CachedManifold {
    points: Vec<CachedPoint>,
}

impl CachedManifold {
    fn nearest(&self, position: Point3<f32>, max_dist_sq: f32) -> Option<&CachedPoint> {
        let mut best = None;
        let mut best_distance = max_dist_sq;
        for point in &self.points {
            let distance = (point.position_a - position).magnitude2();
            if distance <= best_distance {
                best_distance = distance;
                best = Some(point);
            }
        }
        best
    }
}

/// Warm start impulses per body pair, carried across steps.
#[derive(Default)]
pub struct ContactCache {
    current: HashMap<u64, CachedManifold>,
    previous: HashMap<u64, CachedManifold>,
}

/// Cache key of a body pair, order independent.
pub fn pair_key(a: BodyId, b: BodyId) -> u64 {
    let (low, high) = if a.raw() < b.raw() {
        (a.raw(), b.raw())
    } else {
        (b.raw(), a.raw())
    };
    (u64::from(high) << 32) | u64::from(low)
}

impl ContactCache {
    /// Empty cache.
    pub fn new() -> Self {
        ContactCache::default()
    }

    /// Impulses stored for a pair last step.
    pub fn lookup(&self, key: u64) -> Option<&CachedManifold> {
        self.previous.get(&key)
    }

    /// Did this pair have contacts last step?
    pub fn was_touching(&self, key: u64) -> bool {
        self.previous.contains_key(&key)
    }

    /// Record a solved constraint's impulses for the next step.
    pub fn store(&mut self, constraint: &ContactConstraint, body_a: &RigidBody) {
        let key = pair_key(constraint.id_a, constraint.id_b);
        let entry = self.current.entry(key).or_insert_with(CachedManifold::default);
        constraint.drain_into(body_a, entry);
    }

    /// Mark a pair as touching without impulses (sensor overlaps), so
    /// added/persisted/removed transitions stay correct.
    pub fn mark(&mut self, key: u64) {
        self.current.entry(key).or_insert_with(CachedManifold::default);
    }

    /// Finish the step: current entries become the previous set.
    ///
    /// Pairs that were touching but produced nothing this step are either
    /// carried over (`keep`, used for pairs whose island went to sleep) or
    /// reported through `removed`.
    pub fn swap<K, F>(&mut self, keep: &mut K, removed: &mut F)
    where
        K: FnMut(u64) -> bool,
        F: FnMut(u64),
    {
        let current = &mut self.current;
        for (key, value) in self.previous.drain() {
            if !current.contains_key(&key) {
                if keep(key) {
                    current.insert(key, value);
                } else {
                    removed(key);
                }
            }
        }
        ::std::mem::swap(&mut self.previous, &mut self.current);
        self.current.clear();
    }
}
