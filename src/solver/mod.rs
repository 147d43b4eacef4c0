//! Solver driver
//!
//! Partitions awake bodies and their constraints into islands with a union
//! find, runs the velocity and position passes per island in deterministic
//! order, and puts islands to sleep when every member has been at rest long
//! enough.

use cgmath::{InnerSpace, Point3};

use body::{BodyPool, MotionType, INVALID_ISLAND};
use constraint::contact::ContactConstraint;
use constraint::{ConstraintId, ConstraintSet};
use settings::WorldSettings;

/// One entry in an island's solve list.
#[derive(Clone, Copy, Debug)]
pub enum IslandEntry {
    /// A user constraint.
    User(ConstraintId),
    /// Index into the step's contact constraint list.
    Contact(u32),
}

/// A connected component of awake bodies.
#[derive(Debug, Default)]
pub struct Island {
    /// Pool indices of the member bodies, ascending.
    pub bodies: Vec<u32>,
    /// Constraints to solve, ordered by priority descending then id
    /// ascending (contacts after user constraints of equal priority).
    pub entries: Vec<(u32, u64, IslandEntry)>,
    /// Whether any constraint reported a non converged velocity solve.
    pub non_converged: bool,
}

/// Union-find over body pool indices, rebuilt every step.
#[derive(Debug, Default)]
pub struct IslandBuilder {
    parent: Vec<u32>,
    islands: Vec<Island>,
    island_of_root: Vec<i32>,
    free_islands: Vec<Island>,
}

impl IslandBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        IslandBuilder::default()
    }

    /// Reset for a pool of `capacity` bodies.
    pub fn reset(&mut self, capacity: usize) {
        self.parent.clear();
        self.parent.extend(0..capacity as u32);
        self.island_of_root.clear();
        self.island_of_root.resize(capacity, -1);
        // Recycle island storage instead of freeing it.
        for mut island in self.islands.drain(..) {
            island.bodies.clear();
            island.entries.clear();
            island.non_converged = false;
            self.free_islands.push(island);
        }
    }

    fn find(&mut self, index: u32) -> u32 {
        let mut root = index;
        while self.parent[root as usize] != root {
            // Path halving keeps the trees shallow without recursion.
            let grandparent = self.parent[self.parent[root as usize] as usize];
            self.parent[root as usize] = grandparent;
            root = grandparent;
        }
        root
    }

    /// Join the islands of two bodies. Non dynamic bodies never merge
    /// islands; they are shared freely between them.
    pub fn link(&mut self, bodies: &BodyPool, a: u32, b: u32) {
        let a_dynamic = bodies.at(a).motion_type == MotionType::Dynamic;
        let b_dynamic = bodies.at(b).motion_type == MotionType::Dynamic;
        if a_dynamic && b_dynamic {
            let root_a = self.find(a);
            let root_b = self.find(b);
            if root_a != root_b {
                // Lower root wins, keeping island numbering stable.
                if root_a < root_b {
                    self.parent[root_b as usize] = root_a;
                } else {
                    self.parent[root_a as usize] = root_b;
                }
            }
        }
    }

    /// Island of a dynamic body's root, creating it on first sight.
    fn island_index_for(&mut self, root: u32) -> usize {
        if self.island_of_root[root as usize] < 0 {
            let island = self.free_islands.pop().unwrap_or_default();
            self.islands.push(island);
            self.island_of_root[root as usize] = self.islands.len() as i32 - 1;
        }
        self.island_of_root[root as usize] as usize
    }

    /// Assign every awake dynamic body to an island, waking sleeping bodies
    /// that ended up sharing an island with an awake one.
    pub fn collect_bodies(&mut self, bodies: &mut BodyPool) {
        let count = self.parent.len();
        for index in 0..count as u32 {
            let (live, dynamic) = {
                let body = bodies.at(index);
                (!body.pooled, body.motion_type == MotionType::Dynamic)
            };
            if !live || !dynamic {
                if live {
                    bodies.at_mut(index).island_index = INVALID_ISLAND;
                }
                continue;
            }
            let root = self.find(index);
            let island = self.island_index_for(root);
            self.islands[island].bodies.push(index);
            bodies.at_mut(index).island_index = island as i32;
        }
        // An island is awake if any member is; sleepers joining it wake up.
        for island in &mut self.islands {
            let any_awake = island
                .bodies
                .iter()
                .any(|&index| !bodies.at(index).is_sleeping());
            if any_awake {
                for &index in &island.bodies {
                    if bodies.at(index).is_sleeping() {
                        bodies.at_mut(index).wake();
                    }
                }
            }
        }
    }

    /// File a constraint under the island of its first dynamic body.
    ///
    /// `priority` and `sort_id` form the in-island solve order: priority
    /// descending, then `sort_id` ascending.
    pub fn add_entry(
        &mut self,
        bodies: &BodyPool,
        body_a: u32,
        body_b: u32,
        priority: u32,
        sort_id: u64,
        entry: IslandEntry,
    ) {
        let carrier = if bodies.at(body_a).motion_type == MotionType::Dynamic {
            body_a
        } else {
            body_b
        };
        if bodies.at(carrier).motion_type != MotionType::Dynamic {
            return;
        }
        let root = self.find(carrier);
        let island = self.island_index_for(root);
        self.islands[island].entries.push((priority, sort_id, entry));
    }

    /// Sort the islands' solve lists and hand them out.
    ///
    /// Islands are ordered by their smallest body index, entries by
    /// priority descending then sort id ascending.
    pub fn finish(&mut self) -> &mut [Island] {
        self.islands
            .sort_by_key(|island| island.bodies.first().cloned().unwrap_or(!0));
        for island in &mut self.islands {
            island
                .entries
                .sort_by(|&(priority_a, id_a, _), &(priority_b, id_b, _)| {
                    priority_b.cmp(&priority_a).then(id_a.cmp(&id_b))
                });
        }
        &mut self.islands
    }
}

/// Update one body's sleep timer and report whether it may sleep now.
///
/// The probe velocity is the largest velocity of three points rigidly
/// attached to the body: the center of mass and the two bounding box face
/// centers farthest from it.
pub fn update_body_sleep_timer(
    bodies: &mut BodyPool,
    index: u32,
    dt: f32,
    settings: &WorldSettings,
) -> bool {
    let max_velocity = {
        let body = bodies.at(index);
        let center = body.pose.position;
        let aabb = &body.aabb;
        let mut face_centers = [
            Point3::new(aabb.min.x, center.y, center.z),
            Point3::new(aabb.max.x, center.y, center.z),
            Point3::new(center.x, aabb.min.y, center.z),
            Point3::new(center.x, aabb.max.y, center.z),
            Point3::new(center.x, center.y, aabb.min.z),
            Point3::new(center.x, center.y, aabb.max.z),
        ];
        // Two farthest face centers join the center of mass as probes.
        face_centers.sort_by(|a, b| {
            let distance_a = (*a - center).magnitude2();
            let distance_b = (*b - center).magnitude2();
            distance_b
                .partial_cmp(&distance_a)
                .unwrap_or(::std::cmp::Ordering::Equal)
        });
        let probes = [center, face_centers[0], face_centers[1]];
        probes
            .iter()
            .map(|&probe| body.point_velocity(probe).magnitude())
            .fold(0f32, f32::max)
    };
    let body = bodies.at_mut(index);
    if max_velocity < settings.point_velocity_sleep_threshold {
        body.sleep_timer += dt;
    } else {
        body.sleep_timer = 0.;
    }
    body.allow_sleeping && body.sleep_timer >= settings.time_before_sleep
}

/// Put every body of an island to sleep, zeroing velocities.
pub fn sleep_island(bodies: &mut BodyPool, island: &Island) {
    use cgmath::{Vector3, Zero};
    for &index in &island.bodies {
        let body = bodies.at_mut(index);
        body.sleeping = true;
        body.motion.linear_velocity = Vector3::zero();
        body.motion.angular_velocity = Vector3::zero();
    }
}

/// Solve one island: setup, warm start, velocity iterations, integrate,
/// position iterations — steps c through e of the per island pipeline are
/// driven from the world, this function covers the constraint passes.
pub fn solve_island_velocity(
    island: &mut Island,
    bodies: &mut BodyPool,
    constraints: &mut ConstraintSet,
    contacts: &mut [ContactConstraint],
    dt: f32,
    settings: &WorldSettings,
) {
    // Per constraint iteration overrides: the island runs the largest
    // requested count.
    let mut iterations = settings.velocity_iterations;
    for &(_, _, entry) in island.entries.iter() {
        if let IslandEntry::User(id) = entry {
            if let Some(constraint) = constraints.get(id) {
                let over = constraint.base().velocity_iterations_override;
                if over > iterations {
                    iterations = over;
                }
            }
        }
    }
    let mut converged = false;
    for _ in 0..iterations {
        let mut applied = false;
        for &(_, _, entry) in island.entries.iter() {
            match entry {
                IslandEntry::User(id) => {
                    if let Some(constraint) = constraints.get_mut(id) {
                        let (index_a, index_b) = (
                            constraint.base().body_a.index(),
                            constraint.base().body_b.index(),
                        );
                        let (body_a, body_b) = bodies.pair_mut(index_a, index_b);
                        applied |= constraint.solve_velocity(body_a, body_b, dt);
                    }
                }
                IslandEntry::Contact(index) => {
                    let contact = &mut contacts[index as usize];
                    let (body_a, body_b) = bodies.pair_mut(contact.body_a, contact.body_b);
                    applied |= contact.solve_velocity(body_a, body_b);
                }
            }
        }
        if !applied {
            converged = true;
            break;
        }
    }
    island.non_converged = !converged;
}

/// Run the position passes of one island.
pub fn solve_island_position(
    island: &mut Island,
    bodies: &mut BodyPool,
    constraints: &mut ConstraintSet,
    contacts: &mut [ContactConstraint],
    dt: f32,
    settings: &WorldSettings,
) {
    let mut iterations = settings.position_iterations;
    for &(_, _, entry) in island.entries.iter() {
        if let IslandEntry::User(id) = entry {
            if let Some(constraint) = constraints.get(id) {
                let over = constraint.base().position_iterations_override;
                if over > iterations {
                    iterations = over;
                }
            }
        }
    }
    for _ in 0..iterations {
        let mut applied = false;
        for &(_, _, entry) in island.entries.iter() {
            match entry {
                IslandEntry::User(id) => {
                    if let Some(constraint) = constraints.get_mut(id) {
                        let (index_a, index_b) = (
                            constraint.base().body_a.index(),
                            constraint.base().body_b.index(),
                        );
                        let (body_a, body_b) = bodies.pair_mut(index_a, index_b);
                        applied |= constraint.solve_position(
                            body_a,
                            body_b,
                            dt,
                            settings.baumgarte_factor,
                        );
                    }
                }
                IslandEntry::Contact(index) => {
                    let contact = &mut contacts[index as usize];
                    let (body_a, body_b) = bodies.pair_mut(contact.body_a, contact.body_b);
                    applied |= contact.solve_position(body_a, body_b, dt, settings);
                }
            }
        }
        if !applied {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use body::{BodyDesc, MotionType};
    use cgmath::Point3;
    use narrow::Shape;

    fn pool_with(descs: Vec<BodyDesc>) -> BodyPool {
        let mut pool = BodyPool::new();
        for desc in descs {
            pool.add(desc);
        }
        pool
    }

    #[test]
    fn static_bodies_do_not_merge_islands() {
        let dynamic =
            |x: f32| BodyDesc::new(Shape::sphere(0.5), Point3::new(x, 0., 0.));
        let fixed = BodyDesc::new(Shape::sphere(0.5), Point3::new(0., -1., 0.))
            .with_motion_type(MotionType::Static);
        let mut bodies = pool_with(vec![dynamic(0.), dynamic(5.), fixed]);
        let mut builder = IslandBuilder::new();
        builder.reset(bodies.capacity());
        // Both dynamic bodies touch the same static floor.
        builder.link(&bodies, 0, 2);
        builder.link(&bodies, 1, 2);
        builder.collect_bodies(&mut bodies);
        let islands = builder.finish();
        assert_eq!(islands.len(), 2);
        assert_eq!(islands[0].bodies, vec![0]);
        assert_eq!(islands[1].bodies, vec![1]);
    }

    #[test]
    fn contacts_merge_dynamic_islands() {
        let dynamic =
            |x: f32| BodyDesc::new(Shape::sphere(0.5), Point3::new(x, 0., 0.));
        let mut bodies = pool_with(vec![dynamic(0.), dynamic(1.), dynamic(5.)]);
        let mut builder = IslandBuilder::new();
        builder.reset(bodies.capacity());
        builder.link(&bodies, 0, 1);
        builder.collect_bodies(&mut bodies);
        let islands = builder.finish();
        assert_eq!(islands.len(), 2);
        assert_eq!(islands[0].bodies, vec![0, 1]);
        assert_eq!(islands[1].bodies, vec![2]);
        assert_eq!(bodies.at(0).island_index, bodies.at(1).island_index);
        assert_ne!(bodies.at(0).island_index, bodies.at(2).island_index);
    }

    #[test]
    fn awake_member_wakes_the_whole_island() {
        let dynamic =
            |x: f32| BodyDesc::new(Shape::sphere(0.5), Point3::new(x, 0., 0.));
        let mut bodies = pool_with(vec![dynamic(0.), dynamic(1.)]);
        bodies.at_mut(1).sleeping = true;
        let mut builder = IslandBuilder::new();
        builder.reset(bodies.capacity());
        builder.link(&bodies, 0, 1);
        builder.collect_bodies(&mut bodies);
        assert!(!bodies.at(1).is_sleeping());
    }
}
