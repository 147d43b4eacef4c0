//! The physics world
//!
//! Owns bodies, constraints, the broad phase and the contact cache, and
//! runs the fixed step pipeline: integrate forces, find pairs, narrow
//! phase, build contact constraints, solve velocity, integrate positions,
//! solve position, detect sleep.

use cgmath::{Point3, Vector3, Zero};
use collision::{Aabb3, Discrete};

use body::{BodyDesc, BodyId, BodyPool, MotionType, RigidBody};
use broad::dbvh::{RayVisit, Visit};
use broad::BroadPhase;
use constraint::contact::{pair_key, ContactCache, ContactConstraint};
use constraint::{
    ConeConstraint, ConeSettings, ConstraintId, ConstraintSet, ConstraintType, DistanceConstraint,
    DistanceSettings, FixedConstraint, FixedSettings, HingeConstraint, HingeSettings,
    PointConstraint, PointSettings, SixDofConstraint, SixDofSettings, SliderConstraint,
    SliderSettings, SwingTwistConstraint, SwingTwistSettings,
};
use error::ConfigurationError;
use events::{ContactListener, ValidateResult};
use filter::CollisionFilter;
use layers::LayerMatrix;
use narrow::manifold::{reduce_hits, ContactManifold};
use narrow::{CollideSettings, CollideShapeTable, ContactHit, ShapeType, SHAPE_TYPE_COUNT};
use settings::WorldSettings;
use solver::{
    sleep_island, solve_island_position, solve_island_velocity, update_body_sleep_timer,
    IslandBuilder, IslandEntry,
};

/// Result of a world ray cast.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    /// The body that was hit.
    pub body: BodyId,
    /// Fraction along the ray, in `[0, 1]`.
    pub fraction: f32,
}

/// Description of a user constraint to create.
#[derive(Clone, Debug)]
pub enum ConstraintDesc {
    /// Hinge.
    Hinge(HingeSettings),
    /// Slider.
    Slider(SliderSettings),
    /// Distance.
    Distance(DistanceSettings),
    /// Point.
    Point(PointSettings),
    /// Fixed.
    Fixed(FixedSettings),
    /// Swing twist.
    SwingTwist(SwingTwistSettings),
    /// Cone.
    Cone(ConeSettings),
    /// Six degrees of freedom.
    SixDof(SixDofSettings),
}

impl ConstraintDesc {
    fn bodies(&self) -> (BodyId, BodyId) {
        match *self {
            ConstraintDesc::Hinge(ref s) => (s.body_a, s.body_b),
            ConstraintDesc::Slider(ref s) => (s.body_a, s.body_b),
            ConstraintDesc::Distance(ref s) => (s.body_a, s.body_b),
            ConstraintDesc::Point(ref s) => (s.body_a, s.body_b),
            ConstraintDesc::Fixed(ref s) => (s.body_a, s.body_b),
            ConstraintDesc::SwingTwist(ref s) => (s.body_a, s.body_b),
            ConstraintDesc::Cone(ref s) => (s.body_a, s.body_b),
            ConstraintDesc::SixDof(ref s) => (s.body_a, s.body_b),
        }
    }
}

/// A physics world.
pub struct World {
    settings: WorldSettings,
    layers: LayerMatrix,
    bodies: BodyPool,
    broad_phase: BroadPhase,
    constraints: ConstraintSet,
    collide_table: CollideShapeTable,
    listener: Option<Box<dyn ContactListener>>,
    islands: IslandBuilder,
    contact_cache: ContactCache,
    contact_constraints: Vec<ContactConstraint>,
    hits_scratch: Vec<ContactHit>,
    manifold_scratch: Vec<ContactManifold>,
    user_entry_scratch: Vec<(u32, u32, u32, u64, ConstraintId)>,
    shape_type_counts: [usize; SHAPE_TYPE_COUNT],
    step_count: u64,
}

impl World {
    /// Create a world with the given settings and layer matrix.
    pub fn new(settings: WorldSettings, layers: LayerMatrix) -> Self {
        let broad_phase = BroadPhase::new(
            &layers,
            settings.expansion_margin,
            settings.velocity_prediction,
        );
        World {
            settings,
            layers,
            bodies: BodyPool::new(),
            broad_phase,
            constraints: ConstraintSet::new(),
            collide_table: CollideShapeTable::default(),
            listener: None,
            islands: IslandBuilder::new(),
            contact_cache: ContactCache::new(),
            contact_constraints: Vec::new(),
            hits_scratch: Vec::new(),
            manifold_scratch: Vec::new(),
            user_entry_scratch: Vec::new(),
            shape_type_counts: [0; SHAPE_TYPE_COUNT],
            step_count: 0,
        }
    }

    /// World settings.
    pub fn settings(&self) -> &WorldSettings {
        &self.settings
    }

    /// World settings, mutable. Changes apply from the next step.
    pub fn settings_mut(&mut self) -> &mut WorldSettings {
        &mut self.settings
    }

    /// Layer matrix.
    pub fn layers(&self) -> &LayerMatrix {
        &self.layers
    }

    /// Layer matrix, mutable; the matrix is append-only, so enabling a
    /// collision mid run takes effect on the next step.
    pub fn layers_mut(&mut self) -> &mut LayerMatrix {
        &mut self.layers
    }

    /// Install a contact listener.
    pub fn set_listener(&mut self, listener: Box<dyn ContactListener>) {
        self.listener = Some(listener);
    }

    /// Remove the contact listener.
    pub fn take_listener(&mut self) -> Option<Box<dyn ContactListener>> {
        self.listener.take()
    }

    /// The collide dispatch table, for registering host shape pairs.
    pub fn collide_table_mut(&mut self) -> &mut CollideShapeTable {
        &mut self.collide_table
    }

    /// User constraints.
    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    /// User constraints, mutable.
    pub fn constraints_mut(&mut self) -> &mut ConstraintSet {
        &mut self.constraints
    }

    /// Create a body.
    ///
    /// Fails eagerly when the body's object layer has no broad phase
    /// mapping, or when its shape type has no collide function against a
    /// shape type already present in the world.
    pub fn create_body(&mut self, desc: BodyDesc) -> Result<BodyId, ConfigurationError> {
        let new_type = desc.shape.shape_type();
        for other in 0..SHAPE_TYPE_COUNT {
            if self.shape_type_counts[other] > 0 {
                let other_type = match other {
                    0 => ShapeType::Sphere,
                    1 => ShapeType::Cuboid,
                    2 => ShapeType::Capsule,
                    _ => ShapeType::HalfSpace,
                };
                self.collide_table.verify(new_type, other_type)?;
            }
        }
        let id = self.bodies.add(desc);
        if let Err(error) = self
            .broad_phase
            .add_body(self.bodies.at_mut(id.index()), &self.layers)
        {
            self.bodies.remove(id);
            return Err(error);
        }
        self.shape_type_counts[new_type as usize] += 1;
        Ok(id)
    }

    /// Remove a body and every constraint attached to it. Stale handles are
    /// ignored.
    pub fn remove_body(&mut self, id: BodyId) -> bool {
        let attached = match self.bodies.get(id) {
            Some(body) => body.constraints.clone(),
            None => return false,
        };
        for constraint in attached {
            self.remove_constraint(constraint);
        }
        {
            let body = self.bodies.at_mut(id.index());
            self.shape_type_counts[body.shape.shape_type() as usize] -= 1;
        }
        self.broad_phase
            .remove_body(self.bodies.at_mut(id.index()));
        self.bodies.remove(id)
    }

    /// Look up a body; stale handles return `None`.
    pub fn body(&self, id: BodyId) -> Option<&RigidBody> {
        self.bodies.get(id)
    }

    /// Mutable body lookup; stale handles return `None`.
    pub fn body_mut(&mut self, id: BodyId) -> Option<&mut RigidBody> {
        self.bodies.get_mut(id)
    }

    /// Number of live bodies.
    pub fn body_count(&self) -> usize {
        self.bodies.iter().count()
    }

    /// Wake a body (and, through the island builder, whatever it touches
    /// next step).
    pub fn activate_body(&mut self, id: BodyId) {
        if let Some(body) = self.bodies.get_mut(id) {
            body.wake();
        }
    }

    /// Put a body to sleep immediately, zeroing its velocities.
    pub fn deactivate_body(&mut self, id: BodyId) {
        if let Some(body) = self.bodies.get_mut(id) {
            body.sleeping = true;
            body.motion.linear_velocity = Vector3::zero();
            body.motion.angular_velocity = Vector3::zero();
        }
    }

    /// Move a body to another object layer, reinserting it in the broad
    /// phase.
    pub fn set_body_layer(&mut self, id: BodyId, layer: u32) -> Result<(), ConfigurationError> {
        let index = match self.bodies.get(id) {
            Some(_) => id.index(),
            None => return Ok(()),
        };
        self.bodies.at_mut(index).object_layer = layer;
        self.broad_phase
            .reinsert_body(self.bodies.at_mut(index), &self.layers)
    }

    /// Create a user constraint. Returns `None` when either body handle is
    /// stale or both are the same body.
    pub fn add_constraint(&mut self, desc: ConstraintDesc) -> Option<ConstraintId> {
        let (id_a, id_b) = desc.bodies();
        if id_a.index() == id_b.index() {
            return None;
        }
        let id = {
            let body_a = self.bodies.get(id_a)?;
            let body_b = self.bodies.get(id_b)?;
            match desc {
                ConstraintDesc::Hinge(ref s) => self
                    .constraints
                    .add_hinge(HingeConstraint::new(s, body_a, body_b)),
                ConstraintDesc::Slider(ref s) => self
                    .constraints
                    .add_slider(SliderConstraint::new(s, body_a, body_b)),
                ConstraintDesc::Distance(ref s) => self
                    .constraints
                    .add_distance(DistanceConstraint::new(s, body_a, body_b)),
                ConstraintDesc::Point(ref s) => self
                    .constraints
                    .add_point(PointConstraint::new(s, body_a, body_b)),
                ConstraintDesc::Fixed(ref s) => self
                    .constraints
                    .add_fixed(FixedConstraint::new(s, body_a, body_b)),
                ConstraintDesc::SwingTwist(ref s) => self
                    .constraints
                    .add_swing_twist(SwingTwistConstraint::new(s, body_a, body_b)),
                ConstraintDesc::Cone(ref s) => self
                    .constraints
                    .add_cone(ConeConstraint::new(s, body_a, body_b)),
                ConstraintDesc::SixDof(ref s) => self
                    .constraints
                    .add_six_dof(SixDofConstraint::new(s, body_a, body_b)),
            }
        };
        for &body in &[id_a, id_b] {
            if let Some(body) = self.bodies.get_mut(body) {
                body.constraints.push(id);
                body.wake();
            }
        }
        Some(id)
    }

    /// Remove a user constraint. Stale handles are ignored.
    pub fn remove_constraint(&mut self, id: ConstraintId) -> bool {
        let bodies = match self.constraints.get(id) {
            Some(constraint) => (constraint.base().body_a, constraint.base().body_b),
            None => return false,
        };
        for &body in &[bodies.0, bodies.1] {
            if let Some(body) = self.bodies.get_mut(body) {
                body.constraints.retain(|&c| c != id);
                body.wake();
            }
        }
        self.constraints.remove(id)
    }

    /// A filter passing everything, sized for this world's layers.
    pub fn filter_all(&self) -> CollisionFilter {
        CollisionFilter::all(&self.layers)
    }

    /// Cast a ray and return the nearest hit body.
    pub fn cast_ray(
        &mut self,
        origin: Point3<f32>,
        direction: Vector3<f32>,
        length: f32,
        filter: &CollisionFilter,
    ) -> Option<RayHit> {
        let bodies = &self.bodies;
        let mut best: Option<RayHit> = None;
        self.broad_phase
            .cast_ray(bodies, filter, origin, direction, length, &mut |index, _| {
                let body = bodies.at(index);
                if let Some(fraction) = body.shape.cast_ray(&body.pose, origin, direction, length)
                {
                    if best.as_ref().map_or(true, |hit| fraction < hit.fraction) {
                        best = Some(RayHit {
                            body: body.id(),
                            fraction,
                        });
                        return RayVisit::Clip(fraction);
                    }
                }
                RayVisit::Continue
            });
        best
    }

    /// Collect the bodies whose shape contains the point.
    pub fn collide_point(
        &mut self,
        point: Point3<f32>,
        filter: &CollisionFilter,
        out: &mut Vec<BodyId>,
    ) {
        out.clear();
        let bodies = &self.bodies;
        self.broad_phase.collide_point(bodies, filter, point, &mut |index| {
            let body = bodies.at(index);
            if body.shape.contains_point(&body.pose, point) {
                out.push(body.id());
            }
            Visit::Continue
        });
    }

    /// Sweep an AABB along `displacement`, visiting candidate bodies with
    /// the entry fraction into their fat broad phase AABB, nearest first per
    /// layer.
    pub fn cast_aabb<F>(
        &mut self,
        aabb: &Aabb3<f32>,
        displacement: Vector3<f32>,
        filter: &CollisionFilter,
        visitor: &mut F,
    ) where
        F: FnMut(BodyId, f32) -> RayVisit,
    {
        let bodies = &self.bodies;
        self.broad_phase
            .cast_aabb(bodies, filter, aabb, displacement, &mut |index, fraction| {
                visitor(bodies.at(index).id(), fraction)
            });
    }

    /// Collect the bodies whose world AABB intersects the query AABB.
    pub fn collide_aabb(
        &mut self,
        aabb: &Aabb3<f32>,
        filter: &CollisionFilter,
        out: &mut Vec<BodyId>,
    ) {
        out.clear();
        let bodies = &self.bodies;
        self.broad_phase.collide_aabb(bodies, filter, aabb, &mut |index| {
            let body = bodies.at(index);
            if body.aabb.intersects(aabb) {
                out.push(body.id());
            }
            Visit::Continue
        });
    }

    /// Advance the simulation by `dt` seconds (one fixed step).
    pub fn step(&mut self, dt: f32) {
        debug_assert!(dt > 0.);
        let settings = self.settings.clone();
        let mut listener = self.listener.take();

        // Integrate forces: gravity only, applied to awake dynamic bodies.
        for index in 0..self.bodies.capacity() as u32 {
            let body = self.bodies.at_mut(index);
            if !body.pooled && body.is_dynamic() && !body.is_sleeping() {
                body.motion.linear_velocity += settings.gravity * dt;
            }
        }

        // Broad phase.
        self.broad_phase.find_colliding_pairs(
            &mut self.bodies,
            &self.layers,
            settings.speculative_contact_distance,
            &mut |_, _| {},
        );

        // Narrow phase and contact constraint building.
        self.contact_constraints.clear();
        let pair_count = self.broad_phase.pair_count();
        for pair_index in 0..pair_count {
            let (index_a, index_b) = self.broad_phase.pair(pair_index);
            if let Some(ref mut listener) = listener {
                if !listener
                    .on_body_pair_validate(self.bodies.at(index_a), self.bodies.at(index_b))
                {
                    continue;
                }
            }

            self.hits_scratch.clear();
            {
                let body_a = self.bodies.at(index_a);
                let body_b = self.bodies.at(index_b);
                self.collide_table.collide(
                    &body_a.shape,
                    &body_a.pose,
                    &body_b.shape,
                    &body_b.pose,
                    &CollideSettings {
                        max_separation: settings.speculative_contact_distance,
                    },
                    &mut self.hits_scratch,
                );
            }

            if let Some(ref mut listener) = listener {
                let mut kept = 0;
                let mut accept_all = false;
                for hit in 0..self.hits_scratch.len() {
                    let verdict = if accept_all {
                        ValidateResult::AcceptContact
                    } else {
                        listener.on_contact_validate(
                            self.bodies.at(index_a),
                            self.bodies.at(index_b),
                            &self.hits_scratch[hit],
                        )
                    };
                    match verdict {
                        ValidateResult::AcceptContact => {
                            self.hits_scratch.swap(kept, hit);
                            kept += 1;
                        }
                        ValidateResult::AcceptAllContactsForThisBodyPair => {
                            accept_all = true;
                            self.hits_scratch.swap(kept, hit);
                            kept += 1;
                        }
                        ValidateResult::RejectContact => {}
                        ValidateResult::RejectAllContactsForThisBodyPair => {
                            kept = 0;
                            break;
                        }
                    }
                }
                self.hits_scratch.truncate(kept);
            }
            if self.hits_scratch.is_empty() {
                continue;
            }

            self.manifold_scratch.clear();
            reduce_hits(
                &self.hits_scratch,
                settings.use_manifold_reduction,
                settings.normal_cos_max_delta_rotation,
                settings.manifold_tolerance,
                &mut self.manifold_scratch,
            );

            let (key, sensor_pair) = {
                let body_a = self.bodies.at(index_a);
                let body_b = self.bodies.at(index_b);
                (
                    pair_key(body_a.id(), body_b.id()),
                    body_a.sensor || body_b.sensor,
                )
            };
            let persisted = self.contact_cache.was_touching(key);
            for manifold in &self.manifold_scratch {
                if let Some(ref mut listener) = listener {
                    let body_a = self.bodies.at(index_a);
                    let body_b = self.bodies.at(index_b);
                    if persisted {
                        listener.on_contact_persisted(body_a, body_b, manifold);
                    } else {
                        listener.on_contact_added(body_a, body_b, manifold);
                    }
                }
                if sensor_pair {
                    // No response, but the pair counts as touching.
                    self.contact_cache.mark(key);
                    continue;
                }
                let constraint = {
                    let body_a = self.bodies.at(index_a);
                    let body_b = self.bodies.at(index_b);
                    let friction = body_a.material.combine_friction(&body_b.material);
                    let restitution = body_a.material.combine_restitution(&body_b.material);
                    let cache = if settings.warm_starting {
                        self.contact_cache.lookup(key)
                    } else {
                        None
                    };
                    ContactConstraint::new(
                        body_a,
                        body_b,
                        manifold,
                        friction,
                        restitution,
                        cache,
                        &settings,
                    )
                };
                self.contact_constraints.push(constraint);
            }
        }

        // Island partitioning over contacts and enabled user constraints.
        self.islands.reset(self.bodies.capacity());
        for contact in &self.contact_constraints {
            self.islands.link(&self.bodies, contact.body_a, contact.body_b);
        }
        self.user_entry_scratch.clear();
        {
            let constraints = &self.constraints;
            let bodies = &self.bodies;
            let scratch = &mut self.user_entry_scratch;
            constraints.each_id(&mut |id| {
                if let Some(constraint) = constraints.get(id) {
                    let base = constraint.base();
                    if !base.enabled {
                        return;
                    }
                    match (bodies.get(base.body_a), bodies.get(base.body_b)) {
                        (Some(body_a), Some(body_b)) => scratch.push((
                            body_a.id().index(),
                            body_b.id().index(),
                            base.priority,
                            u64::from(id.raw()),
                            id,
                        )),
                        _ => {}
                    }
                }
            });
        }
        for &(index_a, index_b, _, _, _) in &self.user_entry_scratch {
            self.islands.link(&self.bodies, index_a, index_b);
        }
        self.islands.collect_bodies(&mut self.bodies);
        for &(index_a, index_b, priority, sort_id, id) in &self.user_entry_scratch {
            self.islands.add_entry(
                &self.bodies,
                index_a,
                index_b,
                priority,
                sort_id,
                IslandEntry::User(id),
            );
        }
        for (index, contact) in self.contact_constraints.iter().enumerate() {
            let sort_id = u64::from(
                ConstraintId::new(index as u32, ConstraintType::Contact, 0).raw(),
            );
            self.islands.add_entry(
                &self.bodies,
                contact.body_a,
                contact.body_b,
                0,
                sort_id,
                IslandEntry::Contact(index as u32),
            );
        }

        // Solve islands.
        let mut island_count = 0;
        let mut sleeping_islands = 0;
        {
            let islands = self.islands.finish();
            island_count = islands.len();
            for island in islands.iter_mut() {
                let all_sleeping = {
                    let bodies = &self.bodies;
                    island
                        .bodies
                        .iter()
                        .all(|&index| bodies.at(index).is_sleeping())
                };
                if all_sleeping {
                    sleeping_islands += 1;
                    continue;
                }

                // Setup.
                for &(_, _, entry) in island.entries.iter() {
                    match entry {
                        IslandEntry::User(id) => {
                            if let Some(constraint) = self.constraints.get_mut(id) {
                                let index_a = constraint.base().body_a.index();
                                let index_b = constraint.base().body_b.index();
                                constraint.setup_velocity(
                                    self.bodies.at(index_a),
                                    self.bodies.at(index_b),
                                    dt,
                                );
                            }
                        }
                        IslandEntry::Contact(index) => {
                            let contact = &mut self.contact_constraints[index as usize];
                            contact.setup_velocity(
                                self.bodies.at(contact.body_a),
                                self.bodies.at(contact.body_b),
                                dt,
                                &settings,
                            );
                        }
                    }
                }

                // Warm start.
                if settings.warm_starting {
                    let ratio = settings.warm_start_impulse_ratio;
                    for &(_, _, entry) in island.entries.iter() {
                        match entry {
                            IslandEntry::User(id) => {
                                if let Some(constraint) = self.constraints.get_mut(id) {
                                    let index_a = constraint.base().body_a.index();
                                    let index_b = constraint.base().body_b.index();
                                    let (body_a, body_b) =
                                        self.bodies.pair_mut(index_a, index_b);
                                    constraint.warm_start_velocity(body_a, body_b, ratio);
                                }
                            }
                            IslandEntry::Contact(index) => {
                                let contact = &mut self.contact_constraints[index as usize];
                                let (body_a, body_b) =
                                    self.bodies.pair_mut(contact.body_a, contact.body_b);
                                contact.warm_start(body_a, body_b, ratio);
                            }
                        }
                    }
                }

                solve_island_velocity(
                    island,
                    &mut self.bodies,
                    &mut self.constraints,
                    &mut self.contact_constraints,
                    dt,
                    &settings,
                );

                // Integrate positions of the island's dynamic bodies.
                for &index in &island.bodies {
                    let body = self.bodies.at_mut(index);
                    if !body.is_sleeping() {
                        let linear = body.motion.linear_velocity;
                        let angular = body.motion.angular_velocity;
                        body.pose.integrate(linear, angular, dt);
                    }
                }

                solve_island_position(
                    island,
                    &mut self.bodies,
                    &mut self.constraints,
                    &mut self.contact_constraints,
                    dt,
                    &settings,
                );

                // Sleep detection: the island sleeps as a unit.
                if settings.allow_sleeping {
                    let mut island_may_sleep = true;
                    for &index in &island.bodies {
                        island_may_sleep &=
                            update_body_sleep_timer(&mut self.bodies, index, dt, &settings);
                    }
                    if island_may_sleep {
                        sleep_island(&mut self.bodies, island);
                    }
                }
            }
        }

        // Kinematic bodies follow their velocities outside the islands.
        for index in 0..self.bodies.capacity() as u32 {
            let body = self.bodies.at_mut(index);
            if !body.pooled
                && body.motion_type == MotionType::Kinematic
                && !body.is_sleeping()
            {
                let linear = body.motion.linear_velocity;
                let angular = body.motion.angular_velocity;
                body.pose.integrate(linear, angular, dt);
            }
        }

        // Refresh world AABBs and broad phase leaves of everything awake.
        for index in 0..self.bodies.capacity() as u32 {
            let refresh = {
                let body = self.bodies.at(index);
                !body.pooled && !body.is_static() && !body.is_sleeping()
            };
            if refresh {
                self.bodies.at_mut(index).update_world_aabb();
                self.broad_phase.update_body(self.bodies.at(index));
            }
        }

        // Warm start cache for the next step, plus removal callbacks.
        // Pairs that went quiet because their island fell asleep keep their
        // entry; everything else that disappeared is reported removed.
        for contact in &self.contact_constraints {
            self.contact_cache
                .store(contact, self.bodies.at(contact.body_a));
        }
        {
            let bodies = &self.bodies;
            self.contact_cache.swap(
                &mut |key| {
                    let body_a = bodies.get(BodyId::from_raw((key & 0xffff_ffff) as u32));
                    let body_b = bodies.get(BodyId::from_raw((key >> 32) as u32));
                    match (body_a, body_b) {
                        // If neither body queried the broad phase this step
                        // (asleep or static), the pair could not have been
                        // re-detected; keep it instead of reporting removal.
                        (Some(body_a), Some(body_b)) => {
                            !body_a.is_querying() && !body_b.is_querying()
                        }
                        _ => false,
                    }
                },
                &mut |key| {
                    if let Some(ref mut listener) = listener {
                        listener.on_contact_removed(
                            BodyId::from_raw((key & 0xffff_ffff) as u32),
                            BodyId::from_raw((key >> 32) as u32),
                        );
                    }
                },
            );
        }

        self.listener = listener;
        self.step_count += 1;
        debug!(
            "step {}: {} pairs, {} contacts, {} islands ({} asleep)",
            self.step_count,
            pair_count,
            self.contact_constraints.len(),
            island_count,
            sleeping_islands
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{InnerSpace, Matrix3, Rotation};
    use constraint::{AxisMode, MotorMode};
    use narrow::Shape;

    const DT: f32 = 1. / 60.;

    /// Two layer setup used by most scenarios: 0 = moving, 1 = ground.
    fn two_layer_world(settings: WorldSettings) -> World {
        let mut layers = LayerMatrix::new(2, 2);
        layers.map_object_layer(0, 0);
        layers.map_object_layer(1, 1);
        layers.enable_collision(0, 0);
        layers.enable_collision(0, 1);
        World::new(settings, layers)
    }

    fn ground_plane(world: &mut World) -> BodyId {
        world
            .create_body(
                BodyDesc::new(
                    Shape::half_space(Vector3::new(0., 1., 0.)),
                    Point3::new(0., 0., 0.),
                )
                .with_motion_type(MotionType::Static)
                .with_object_layer(1),
            )
            .unwrap()
    }

    #[test]
    fn box_drop_settles_and_sleeps() {
        let mut world = two_layer_world(WorldSettings::default());
        ground_plane(&mut world);
        let cube = world
            .create_body(
                BodyDesc::new(
                    Shape::cuboid(Vector3::new(0.5, 0.5, 0.5)),
                    Point3::new(0., 5., 0.),
                )
                .with_mass(1.),
            )
            .unwrap();
        for _ in 0..120 {
            world.step(DT);
        }
        let body = world.body(cube).unwrap();
        assert!(
            (body.pose.position.y - 0.5).abs() < 0.05,
            "resting height {} is off",
            body.pose.position.y
        );
        assert!(body.motion.linear_velocity.magnitude() < 0.05);
        assert!(body.is_sleeping());
    }

    #[test]
    fn hinge_swing_preserves_energy() {
        let settings = WorldSettings::default().without_sleeping();
        let mut world = two_layer_world(settings);
        let anchor = world
            .create_body(
                BodyDesc::new(Shape::sphere(0.1), Point3::new(0., 10., 0.))
                    .with_motion_type(MotionType::Static)
                    .with_object_layer(1)
                    .with_group_and_mask(0, 0),
            )
            .unwrap();
        // Horizontal bar from the origin to (1, 0, 0), hinged at the origin.
        let bar = world
            .create_body(
                BodyDesc::new(
                    Shape::cuboid(Vector3::new(0.5, 0.05, 0.05)),
                    Point3::new(0.5, 0., 0.),
                )
                .with_group_and_mask(0, 0),
            )
            .unwrap();
        let mass = 1. / world.body(bar).unwrap().motion.inverse_mass;
        world
            .add_constraint(ConstraintDesc::Hinge(HingeSettings::new(
                anchor,
                bar,
                Point3::new(0., 0., 0.),
                Vector3::new(0., 0., 1.),
            )))
            .unwrap();

        let mut max_angular = 0f32;
        for _ in 0..60 {
            world.step(DT);
            let body = world.body(bar).unwrap();
            max_angular = max_angular.max(body.motion.angular_velocity.magnitude());
        }
        // At the bottom of the swing all potential energy is rotational
        // kinetic energy about the pivot.
        let inertia_z = 1.
            / world
                .body(bar)
                .unwrap()
                .motion
                .inverse_inertia
                .z;
        let pivot_inertia = inertia_z + mass * 0.25;
        let kinetic = 0.5 * pivot_inertia * max_angular * max_angular;
        let potential = mass * 9.81 * 0.5;
        assert!(
            (kinetic - potential).abs() < 0.05 * potential,
            "kinetic {} vs potential {}",
            kinetic,
            potential
        );
    }

    #[test]
    fn stacked_cubes_stay_put() {
        let mut world = two_layer_world(WorldSettings::default());
        ground_plane(&mut world);
        let mut cubes = Vec::new();
        for level in 0..3 {
            cubes.push(
                world
                    .create_body(
                        BodyDesc::new(
                            Shape::cuboid(Vector3::new(0.5, 0.5, 0.5)),
                            Point3::new(0., 0.5 + level as f32, 0.),
                        )
                        .with_mass(1.),
                    )
                    .unwrap(),
            );
        }
        for _ in 0..300 {
            world.step(DT);
        }
        for (level, &cube) in cubes.iter().enumerate() {
            let body = world.body(cube).unwrap();
            assert!(
                (body.pose.position.y - (0.5 + level as f32)).abs() < 0.02,
                "cube {} drifted to {}",
                level,
                body.pose.position.y
            );
            assert!(body.motion.linear_velocity.y.abs() < 0.01);
        }
    }

    #[test]
    fn layer_filter_gates_pairs_until_enabled() {
        let mut layers = LayerMatrix::new(3, 2);
        layers.map_object_layer(0, 0); // moving
        layers.map_object_layer(1, 1); // not moving
        layers.map_object_layer(2, 0); // debris
        layers.enable_collision(0, 0);
        layers.enable_collision(0, 1);
        let settings = WorldSettings::default()
            .with_gravity(Vector3::new(0., 0., 0.))
            .without_sleeping();
        let mut world = World::new(settings, layers);
        let moving = world
            .create_body(
                BodyDesc::new(Shape::sphere(0.5), Point3::new(0., 0., 0.))
                    .with_object_layer(0),
            )
            .unwrap();
        let debris = world
            .create_body(
                BodyDesc::new(Shape::sphere(0.5), Point3::new(0.6, 0., 0.))
                    .with_object_layer(2),
            )
            .unwrap();
        let _ = (moving, debris);

        world.step(DT);
        assert_eq!(world.broad_phase.pair_count(), 0);

        world.layers_mut().enable_collision(0, 2);
        world.step(DT);
        assert_eq!(world.broad_phase.pair_count(), 1);
    }

    #[test]
    fn slider_motor_runs_into_its_limit() {
        let settings = WorldSettings::default()
            .with_gravity(Vector3::new(0., 0., 0.))
            .without_sleeping();
        let mut world = two_layer_world(settings);
        let anchor = world
            .create_body(
                BodyDesc::new(Shape::sphere(0.1), Point3::new(0., 0., 0.))
                    .with_motion_type(MotionType::Static)
                    .with_object_layer(1)
                    .with_group_and_mask(0, 0),
            )
            .unwrap();
        let runner = world
            .create_body(
                BodyDesc::new(
                    Shape::cuboid(Vector3::new(0.2, 0.2, 0.2)),
                    Point3::new(0., 0., 0.),
                )
                .with_group_and_mask(0, 0),
            )
            .unwrap();
        let mut slider_settings = SliderSettings::new(
            anchor,
            runner,
            Point3::new(0., 0., 0.),
            Vector3::new(1., 0., 0.),
        );
        slider_settings.limits_min = -1.;
        slider_settings.limits_max = 1.;
        slider_settings.motor = MotorMode::Velocity;
        slider_settings.motor_target_velocity = 2.;
        let slider = world
            .add_constraint(ConstraintDesc::Slider(slider_settings))
            .unwrap();

        let mut impulse_streak = 0;
        for _ in 0..120 {
            world.step(DT);
            if world.constraints().slider(slider).unwrap().limit_impulse() != 0. {
                impulse_streak += 1;
            } else {
                impulse_streak = 0;
            }
        }
        let constraint = world.constraints().slider(slider).unwrap();
        assert!(
            constraint.position() >= 0.95 && constraint.position() <= 1.05,
            "slider stopped at {}",
            constraint.position()
        );
        // The limit has been holding for a while, impulses warm started.
        assert!(impulse_streak >= 2);
    }

    #[test]
    fn resting_rod_constraint_is_exact_when_frozen() {
        // No gravity, no velocity: a satisfied constraint stays satisfied
        // bit for bit step after step.
        let settings = WorldSettings::default()
            .with_gravity(Vector3::new(0., 0., 0.))
            .without_sleeping();
        let mut world = two_layer_world(settings);
        let left = world
            .create_body(
                BodyDesc::new(Shape::sphere(0.2), Point3::new(0., 0., 0.))
                    .with_group_and_mask(0, 0),
            )
            .unwrap();
        let right = world
            .create_body(
                BodyDesc::new(Shape::sphere(0.2), Point3::new(2., 0., 0.))
                    .with_group_and_mask(0, 0),
            )
            .unwrap();
        world
            .add_constraint(ConstraintDesc::Distance(DistanceSettings::rod(
                left,
                right,
                Point3::new(0., 0., 0.),
                Point3::new(2., 0., 0.),
            )))
            .unwrap();
        let before = world.body(right).unwrap().pose.position;
        for _ in 0..10 {
            world.step(DT);
        }
        let after = world.body(right).unwrap().pose.position;
        assert_eq!(before, after);
    }

    #[test]
    fn sensors_report_contacts_without_response() {
        use std::cell::Cell;
        use std::rc::Rc;

        struct Recorder {
            added: Rc<Cell<usize>>,
        }
        impl ContactListener for Recorder {
            fn on_contact_added(
                &mut self,
                _body_a: &RigidBody,
                _body_b: &RigidBody,
                _manifold: &ContactManifold,
            ) {
                self.added.set(self.added.get() + 1);
            }
        }

        let settings = WorldSettings::default()
            .with_gravity(Vector3::new(0., 0., 0.))
            .without_sleeping();
        let mut world = two_layer_world(settings);
        let added = Rc::new(Cell::new(0));
        world.set_listener(Box::new(Recorder {
            added: added.clone(),
        }));
        world
            .create_body(BodyDesc::new(Shape::sphere(0.5), Point3::new(0., 0., 0.)))
            .unwrap();
        let sensor = world
            .create_body(
                BodyDesc::new(Shape::sphere(0.5), Point3::new(0.5, 0., 0.)).with_sensor(true),
            )
            .unwrap();
        let before = world.body(sensor).unwrap().pose.position;
        world.step(DT);
        assert!(added.get() > 0);
        // No constraint was built, so the overlap did not push anything.
        assert_eq!(world.body(sensor).unwrap().pose.position, before);
    }

    #[test]
    fn cast_ray_returns_the_nearest_body() {
        let settings = WorldSettings::default().with_gravity(Vector3::new(0., 0., 0.));
        let mut world = two_layer_world(settings);
        let near = world
            .create_body(BodyDesc::new(Shape::sphere(0.5), Point3::new(0., 0., 2.)))
            .unwrap();
        world
            .create_body(BodyDesc::new(Shape::sphere(0.5), Point3::new(0., 0., 6.)))
            .unwrap();
        let filter = world.filter_all();
        let hit = world
            .cast_ray(
                Point3::new(0., 0., -2.),
                Vector3::new(0., 0., 1.),
                20.,
                &filter,
            )
            .unwrap();
        assert_eq!(hit.body, near);
        assert!((hit.fraction - 3.5 / 20.).abs() < 1.0e-4);
    }

    #[test]
    fn stale_body_handles_are_rejected_everywhere() {
        let mut world = two_layer_world(WorldSettings::default());
        let body = world
            .create_body(BodyDesc::new(Shape::sphere(0.5), Point3::new(0., 0., 0.)))
            .unwrap();
        assert!(world.remove_body(body));
        assert!(world.body(body).is_none());
        assert!(!world.remove_body(body));
        assert!(world
            .add_constraint(ConstraintDesc::Point(PointSettings {
                body_a: body,
                body_b: body,
                anchor: Point3::new(0., 0., 0.),
            }))
            .is_none());
    }

    #[test]
    fn missing_dispatch_pair_fails_body_creation() {
        let mut world = two_layer_world(WorldSettings::default());
        world
            .create_body(BodyDesc::new(
                Shape::cuboid(Vector3::new(0.5, 0.5, 0.5)),
                Point3::new(0., 0., 0.),
            ))
            .unwrap();
        // Capsule vs cuboid has no built in collide function.
        let result = world.create_body(BodyDesc::new(
            Shape::capsule(0.5, 0.2),
            Point3::new(5., 0., 0.),
        ));
        match result {
            Err(ConfigurationError::MissingCollideFunction(_, _)) => {}
            other => panic!("expected missing collide function, got {:?}", other),
        }
    }

    #[test]
    fn unmapped_layer_fails_body_creation() {
        let layers = LayerMatrix::new(2, 1);
        // Layer 1 is never mapped to a broad phase layer.
        let mut world = World::new(WorldSettings::default(), {
            let mut layers = layers;
            layers.map_object_layer(0, 0);
            layers
        });
        let result = world.create_body(
            BodyDesc::new(Shape::sphere(0.5), Point3::new(0., 0., 0.)).with_object_layer(1),
        );
        assert_eq!(result, Err(ConfigurationError::UnmappedObjectLayer(1)));
        // The pool slot was rolled back.
        assert_eq!(world.body_count(), 0);
    }

    #[test]
    fn fixed_constraint_carries_a_body_rigidly() {
        let settings = WorldSettings::default().without_sleeping();
        let mut world = two_layer_world(settings);
        let carrier = world
            .create_body(
                BodyDesc::new(Shape::cuboid(Vector3::new(0.5, 0.5, 0.5)), Point3::new(0., 5., 0.))
                    .with_motion_type(MotionType::Kinematic)
                    .with_group_and_mask(0, 0),
            )
            .unwrap();
        let cargo = world
            .create_body(
                BodyDesc::new(Shape::cuboid(Vector3::new(0.2, 0.2, 0.2)), Point3::new(1., 5., 0.))
                    .with_group_and_mask(0, 0),
            )
            .unwrap();
        world
            .add_constraint(ConstraintDesc::Fixed(FixedSettings {
                body_a: carrier,
                body_b: cargo,
                anchor: None,
            }))
            .unwrap();
        world.body_mut(carrier).unwrap().motion.linear_velocity = Vector3::new(1., 0., 0.);
        for _ in 0..60 {
            world.step(DT);
        }
        let carrier_position = world.body(carrier).unwrap().pose.position;
        let cargo_position = world.body(cargo).unwrap().pose.position;
        // The relative offset survives a second of towing under gravity.
        assert!((carrier_position.x + 1. - cargo_position.x).abs() < 0.1);
        assert!((carrier_position.y - cargo_position.y).abs() < 0.1);
    }

    #[test]
    fn swing_twist_respects_the_cone() {
        let settings = WorldSettings::default().without_sleeping();
        let mut world = two_layer_world(settings);
        let anchor = world
            .create_body(
                BodyDesc::new(Shape::sphere(0.1), Point3::new(0., 10., 0.))
                    .with_motion_type(MotionType::Static)
                    .with_object_layer(1)
                    .with_group_and_mask(0, 0),
            )
            .unwrap();
        let arm = world
            .create_body(
                BodyDesc::new(
                    Shape::cuboid(Vector3::new(0.5, 0.05, 0.05)),
                    Point3::new(0.5, 0., 0.),
                )
                .with_group_and_mask(0, 0),
            )
            .unwrap();
        world
            .add_constraint(ConstraintDesc::SwingTwist(SwingTwistSettings {
                body_a: anchor,
                body_b: arm,
                anchor: Point3::new(0., 0., 0.),
                twist_axis: Vector3::new(1., 0., 0.),
                plane_axis: Vector3::new(0., 1., 0.),
                plane_half_angle: 0.2,
                normal_half_angle: 0.2,
                twist_min: -0.1,
                twist_max: 0.1,
            }))
            .unwrap();
        for _ in 0..120 {
            world.step(DT);
        }
        // Gravity tries to swing the arm down; the cone keeps it close to
        // horizontal.
        let rotation = Matrix3::from(world.body(arm).unwrap().pose.rotation);
        let x_axis = rotation.x;
        let droop = x_axis.dot(Vector3::new(0., -1., 0.)).asin();
        assert!(droop < 0.35, "arm drooped {} rad", droop);
    }

    #[test]
    fn six_dof_limited_translation_clamps_motion() {
        let settings = WorldSettings::default()
            .with_gravity(Vector3::new(0., 0., 0.))
            .without_sleeping();
        let mut world = two_layer_world(settings);
        let anchor = world
            .create_body(
                BodyDesc::new(Shape::sphere(0.1), Point3::new(0., 0., 0.))
                    .with_motion_type(MotionType::Static)
                    .with_object_layer(1)
                    .with_group_and_mask(0, 0),
            )
            .unwrap();
        let probe = world
            .create_body(
                BodyDesc::new(Shape::sphere(0.2), Point3::new(0., 0., 0.))
                    .with_group_and_mask(0, 0)
                    .with_velocity(Vector3::new(3., 0., 0.), Vector3::new(0., 0., 0.)),
            )
            .unwrap();
        let mut six_dof = SixDofSettings::new(anchor, probe, Point3::new(0., 0., 0.));
        six_dof.translation = [
            AxisMode::from_limits(-0.5, 0.5),
            AxisMode::Fixed,
            AxisMode::Fixed,
        ];
        six_dof.rotation = [AxisMode::Fixed; 3];
        world.add_constraint(ConstraintDesc::SixDof(six_dof)).unwrap();
        for _ in 0..60 {
            world.step(DT);
        }
        let position = world.body(probe).unwrap().pose.position;
        assert!(position.x <= 0.6, "probe escaped to {}", position.x);
        assert!(position.y.abs() < 0.05 && position.z.abs() < 0.05);
    }

    #[test]
    fn rotated_pose_quaternion_stays_unit_under_integration() {
        let settings = WorldSettings::default()
            .with_gravity(Vector3::new(0., 0., 0.))
            .without_sleeping();
        let mut world = two_layer_world(settings);
        let spinner = world
            .create_body(
                BodyDesc::new(Shape::cuboid(Vector3::new(0.3, 0.2, 0.1)), Point3::new(0., 0., 0.))
                    .with_velocity(Vector3::new(0., 0., 0.), Vector3::new(3., 5., 7.)),
            )
            .unwrap();
        for _ in 0..240 {
            world.step(DT);
        }
        let rotation = world.body(spinner).unwrap().pose.rotation;
        assert_relative_eq!(rotation.magnitude(), 1., epsilon = 1.0e-3);
        let _ = rotation.invert();
    }
}
