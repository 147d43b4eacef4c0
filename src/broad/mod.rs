//! Broad phase
//!
//! One [`DynamicBvh`](dbvh/struct.DynamicBvh.html) per broad phase layer.
//! The coordinator routes bodies into the right tree, keeps leaves up to
//! date as bodies move, and produces the deduplicated candidate pair list
//! consumed by the narrow phase.

pub mod dbvh;

use cgmath::{Point3, Vector3};
use collision::{Aabb, Aabb3};

use self::dbvh::{DynamicBvh, RayVisit, Visit};
use body::{BodyPool, MotionType, RigidBody, INVALID_BVH_NODE};
use error::ConfigurationError;
use filter::{pair_passes, CollisionFilter};
use layers::{LayerMatrix, INVALID_BROAD_PHASE_LAYER};

/// Dedup index for bodies that never query (static or sleeping). Larger than
/// any real query position, so such bodies never report pairs themselves.
const INACTIVE_INDEX: u32 = !0;

/// Fraction of leaves re-optimized per `find_colliding_pairs` call.
const OPTIMIZE_FRACTION: usize = 100;

/// Layer-aware broad phase over a set of dynamic AABB trees.
pub struct BroadPhase {
    trees: Vec<DynamicBvh>,
    /// Candidate pairs, two body indices per pair. Reset every query.
    pairs: Vec<u32>,
    query_order: Vec<u32>,
    sorted_bodies: Vec<u32>,
}

impl BroadPhase {
    /// Create a broad phase with one tree per broad phase layer.
    pub fn new(matrix: &LayerMatrix, expansion_margin: f32, velocity_prediction: f32) -> Self {
        BroadPhase {
            trees: (0..matrix.broad_phase_layer_count())
                .map(|_| DynamicBvh::new(expansion_margin, velocity_prediction))
                .collect(),
            pairs: Vec::new(),
            query_order: Vec::new(),
            sorted_bodies: Vec::new(),
        }
    }

    /// Insert a body into the tree of its broad phase layer.
    ///
    /// Fails when the body's object layer has no broad phase mapping.
    pub fn add_body(
        &mut self,
        body: &mut RigidBody,
        matrix: &LayerMatrix,
    ) -> Result<(), ConfigurationError> {
        let layer = matrix
            .broad_phase_layer(body.object_layer)
            .ok_or(ConfigurationError::UnmappedObjectLayer(body.object_layer))?;
        body.bvh_node = self.trees[layer as usize].insert(body.id().index(), &body.aabb);
        body.broad_phase_layer = layer as i32;
        Ok(())
    }

    /// Remove a body's leaf and clear its broad phase fields.
    pub fn remove_body(&mut self, body: &mut RigidBody) {
        if body.broad_phase_layer != INVALID_BROAD_PHASE_LAYER {
            self.trees[body.broad_phase_layer as usize].remove(body.bvh_node);
            body.bvh_node = INVALID_BVH_NODE;
            body.broad_phase_layer = INVALID_BROAD_PHASE_LAYER;
        }
    }

    /// Refresh a body's leaf after its world AABB changed. A no-op while the
    /// AABB still fits the leaf's fat AABB.
    pub fn update_body(&mut self, body: &RigidBody) {
        if body.broad_phase_layer != INVALID_BROAD_PHASE_LAYER {
            self.trees[body.broad_phase_layer as usize].update(body.bvh_node, &body.aabb, -1);
        }
    }

    /// Remove and re-add a body; used when its object layer changed.
    pub fn reinsert_body(
        &mut self,
        body: &mut RigidBody,
        matrix: &LayerMatrix,
    ) -> Result<(), ConfigurationError> {
        self.remove_body(body);
        self.add_body(body, matrix)
    }

    /// Total leaves across all trees.
    pub fn body_count(&self) -> usize {
        self.trees.iter().map(DynamicBvh::leaf_count).sum()
    }

    /// Find all candidate collision pairs.
    ///
    /// Static and sleeping bodies never query; they are found by active
    /// bodies, and a found sleeping body is woken. Each admissible pair is
    /// reported exactly once, ordered with the higher motion type first (ties
    /// to the lower id), both to `listener` and into [`pairs`](#method.pairs).
    pub fn find_colliding_pairs<F>(
        &mut self,
        bodies: &mut BodyPool,
        matrix: &LayerMatrix,
        speculative_distance: f32,
        listener: &mut F,
    ) where
        F: FnMut(u32, u32),
    {
        self.pairs.clear();

        // Amortized tree maintenance: a sliver of each tree per step.
        for tree in &mut self.trees {
            let passes = (tree.leaf_count() / OPTIMIZE_FRACTION).max(1);
            tree.optimize(passes, &mut |body, node| {
                bodies.at_mut(body).bvh_node = node;
            });
        }

        self.sorted_bodies.clear();
        for index in bodies.live_indices() {
            if bodies.at(index).is_querying() {
                self.sorted_bodies.push(index);
            }
        }
        {
            let bodies = &*bodies;
            self.sorted_bodies.sort_by_key(|&index| {
                (bodies.at(index).broad_phase_layer, index)
            });
        }

        self.query_order.clear();
        self.query_order.resize(bodies.capacity(), INACTIVE_INDEX);
        for (order, &index) in self.sorted_bodies.iter().enumerate() {
            self.query_order[index as usize] = order as u32;
        }

        let trees = &mut self.trees;
        let pairs = &mut self.pairs;
        let query_order = &self.query_order;
        let margin = Vector3::new(
            speculative_distance,
            speculative_distance,
            speculative_distance,
        );
        for &index_a in &self.sorted_bodies {
            let (order_a, expanded, layer_a, motion_a, id_a, sensor_a, opt_in_a, group_a, mask_a) = {
                let body = bodies.at(index_a);
                (
                    query_order[index_a as usize],
                    body.aabb.add_margin(margin),
                    body.object_layer,
                    body.motion_type,
                    body.id().raw(),
                    body.sensor,
                    body.collide_kinematic_vs_non_dynamic,
                    body.collision_group,
                    body.collision_mask,
                )
            };
            for (tree_layer, tree) in trees.iter_mut().enumerate() {
                if !matrix.object_vs_broad_phase(layer_a, tree_layer as u32) {
                    continue;
                }
                tree.query_aabb(&expanded, &mut |index_b| {
                    if index_b == index_a {
                        return Visit::Continue;
                    }
                    if order_a >= query_order[index_b as usize] {
                        return Visit::Continue;
                    }
                    let accepted = {
                        let other = bodies.at(index_b);
                        let motion_b = other.motion_type;
                        let layers_pass = matrix.object_layer_collides(layer_a, other.object_layer)
                            && pair_passes(
                                group_a,
                                mask_a,
                                other.collision_group,
                                other.collision_mask,
                            );
                        let both_static = motion_a == MotionType::Static
                            && motion_b == MotionType::Static;
                        let kinematic_vs_non_dynamic = (motion_a == MotionType::Kinematic
                            && motion_b != MotionType::Dynamic)
                            || (motion_b == MotionType::Kinematic
                                && motion_a != MotionType::Dynamic);
                        let kinematic_allowed = !kinematic_vs_non_dynamic
                            || opt_in_a
                            || other.collide_kinematic_vs_non_dynamic
                            || sensor_a
                            || other.sensor;
                        layers_pass && !both_static && kinematic_allowed
                    };
                    if accepted {
                        let (first, second) = order_pair(bodies, index_a, index_b, motion_a, id_a);
                        if bodies.at(index_b).is_sleeping() {
                            bodies.at_mut(index_b).wake();
                        }
                        pairs.push(first);
                        pairs.push(second);
                        listener(first, second);
                    }
                    Visit::Continue
                });
            }
        }
        trace!(
            "broad phase found {} candidate pairs over {} querying bodies",
            pairs.len() / 2,
            self.sorted_bodies.len()
        );
    }

    /// Candidate pairs from the last `find_colliding_pairs` call.
    pub fn pairs<'a>(&'a self) -> impl Iterator<Item = (u32, u32)> + 'a {
        self.pairs.chunks(2).map(|pair| (pair[0], pair[1]))
    }

    /// Number of candidate pairs from the last query.
    pub fn pair_count(&self) -> usize {
        self.pairs.len() / 2
    }

    /// One candidate pair by index.
    pub fn pair(&self, index: usize) -> (u32, u32) {
        (self.pairs[2 * index], self.pairs[2 * index + 1])
    }

    /// Cast a ray against the filtered broad phase trees.
    ///
    /// The visitor sees candidate bodies with the entry fraction into their
    /// fat leaf AABB, near to far per tree.
    pub fn cast_ray<F>(
        &mut self,
        bodies: &BodyPool,
        filter: &CollisionFilter,
        origin: Point3<f32>,
        direction: Vector3<f32>,
        length: f32,
        visitor: &mut F,
    ) where
        F: FnMut(u32, f32) -> RayVisit,
    {
        for (layer, tree) in self.trees.iter_mut().enumerate() {
            if !filter.test_broad_phase_layer(layer as u32) {
                continue;
            }
            tree.cast_ray(origin, direction, length, &mut |body, fraction| {
                if filter.test_body(bodies.at(body)) {
                    visitor(body, fraction)
                } else {
                    RayVisit::Continue
                }
            });
        }
    }

    /// Visit bodies whose fat AABB contains the point.
    pub fn collide_point<F>(
        &mut self,
        bodies: &BodyPool,
        filter: &CollisionFilter,
        point: Point3<f32>,
        visitor: &mut F,
    ) where
        F: FnMut(u32) -> Visit,
    {
        for (layer, tree) in self.trees.iter_mut().enumerate() {
            if !filter.test_broad_phase_layer(layer as u32) {
                continue;
            }
            tree.query_point(point, &mut |body| {
                if filter.test_body(bodies.at(body)) {
                    visitor(body)
                } else {
                    Visit::Continue
                }
            });
        }
    }

    /// Visit bodies whose fat AABB intersects the AABB.
    pub fn collide_aabb<F>(
        &mut self,
        bodies: &BodyPool,
        filter: &CollisionFilter,
        aabb: &Aabb3<f32>,
        visitor: &mut F,
    ) where
        F: FnMut(u32) -> Visit,
    {
        for (layer, tree) in self.trees.iter_mut().enumerate() {
            if !filter.test_broad_phase_layer(layer as u32) {
                continue;
            }
            tree.query_aabb(aabb, &mut |body| {
                if filter.test_body(bodies.at(body)) {
                    visitor(body)
                } else {
                    Visit::Continue
                }
            });
        }
    }

    /// Sweep an AABB through the filtered trees.
    pub fn cast_aabb<F>(
        &mut self,
        bodies: &BodyPool,
        filter: &CollisionFilter,
        aabb: &Aabb3<f32>,
        displacement: Vector3<f32>,
        visitor: &mut F,
    ) where
        F: FnMut(u32, f32) -> RayVisit,
    {
        for (layer, tree) in self.trees.iter_mut().enumerate() {
            if !filter.test_broad_phase_layer(layer as u32) {
                continue;
            }
            tree.cast_aabb(aabb, displacement, &mut |body, fraction| {
                if filter.test_body(bodies.at(body)) {
                    visitor(body, fraction)
                } else {
                    RayVisit::Continue
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use body::BodyDesc;
    use cgmath::Point3;
    use narrow::Shape;

    fn matrix() -> LayerMatrix {
        let mut matrix = LayerMatrix::new(2, 2);
        matrix.map_object_layer(0, 0);
        matrix.map_object_layer(1, 1);
        matrix.enable_collision(0, 0);
        matrix.enable_collision(0, 1);
        matrix
    }

    fn add(
        broad: &mut BroadPhase,
        bodies: &mut BodyPool,
        matrix: &LayerMatrix,
        desc: BodyDesc,
    ) -> u32 {
        let id = bodies.add(desc);
        broad.add_body(bodies.at_mut(id.index()), matrix).unwrap();
        id.index()
    }

    fn collect_pairs(
        broad: &mut BroadPhase,
        bodies: &mut BodyPool,
        matrix: &LayerMatrix,
    ) -> Vec<(u32, u32)> {
        broad.find_colliding_pairs(bodies, matrix, 0.02, &mut |_, _| {});
        broad.pairs().collect()
    }

    #[test]
    fn overlapping_bodies_pair_exactly_once() {
        let matrix = matrix();
        let mut bodies = BodyPool::new();
        let mut broad = BroadPhase::new(&matrix, 0.05, 0.1);
        add(&mut broad, &mut bodies, &matrix, BodyDesc::new(Shape::sphere(1.), Point3::new(0., 0., 0.)));
        add(&mut broad, &mut bodies, &matrix, BodyDesc::new(Shape::sphere(1.), Point3::new(1., 0., 0.)));
        let pairs = collect_pairs(&mut broad, &mut bodies, &matrix);
        assert_eq!(pairs.len(), 1);
    }

    #[test]
    fn static_static_pairs_are_rejected() {
        let matrix = matrix();
        let mut bodies = BodyPool::new();
        let mut broad = BroadPhase::new(&matrix, 0.05, 0.1);
        for x in 0..2 {
            add(
                &mut broad,
                &mut bodies,
                &matrix,
                BodyDesc::new(Shape::sphere(1.), Point3::new(x as f32, 0., 0.))
                    .with_motion_type(MotionType::Static),
            );
        }
        assert!(collect_pairs(&mut broad, &mut bodies, &matrix).is_empty());
    }

    #[test]
    fn kinematic_vs_static_needs_opt_in() {
        let matrix = matrix();
        let mut bodies = BodyPool::new();
        let mut broad = BroadPhase::new(&matrix, 0.05, 0.1);
        add(
            &mut broad,
            &mut bodies,
            &matrix,
            BodyDesc::new(Shape::sphere(1.), Point3::new(0., 0., 0.))
                .with_motion_type(MotionType::Kinematic),
        );
        add(
            &mut broad,
            &mut bodies,
            &matrix,
            BodyDesc::new(Shape::sphere(1.), Point3::new(1., 0., 0.))
                .with_motion_type(MotionType::Static),
        );
        assert!(collect_pairs(&mut broad, &mut bodies, &matrix).is_empty());

        bodies.at_mut(0).collide_kinematic_vs_non_dynamic = true;
        assert_eq!(collect_pairs(&mut broad, &mut bodies, &matrix).len(), 1);
    }

    #[test]
    fn group_mask_filters_pairs() {
        let matrix = matrix();
        let mut bodies = BodyPool::new();
        let mut broad = BroadPhase::new(&matrix, 0.05, 0.1);
        add(
            &mut broad,
            &mut bodies,
            &matrix,
            BodyDesc::new(Shape::sphere(1.), Point3::new(0., 0., 0.))
                .with_group_and_mask(0b01, 0b01),
        );
        add(
            &mut broad,
            &mut bodies,
            &matrix,
            BodyDesc::new(Shape::sphere(1.), Point3::new(1., 0., 0.))
                .with_group_and_mask(0b10, 0b10),
        );
        assert!(collect_pairs(&mut broad, &mut bodies, &matrix).is_empty());
    }

    #[test]
    fn pair_reports_higher_motion_type_first() {
        let matrix = matrix();
        let mut bodies = BodyPool::new();
        let mut broad = BroadPhase::new(&matrix, 0.05, 0.1);
        let fixed = add(
            &mut broad,
            &mut bodies,
            &matrix,
            BodyDesc::new(Shape::sphere(1.), Point3::new(0., 0., 0.))
                .with_motion_type(MotionType::Static),
        );
        let dynamic = add(
            &mut broad,
            &mut bodies,
            &matrix,
            BodyDesc::new(Shape::sphere(1.), Point3::new(1., 0., 0.)),
        );
        let pairs = collect_pairs(&mut broad, &mut bodies, &matrix);
        assert_eq!(pairs, vec![(dynamic, fixed)]);
    }

    #[test]
    fn sleeping_bodies_are_found_and_woken() {
        let matrix = matrix();
        let mut bodies = BodyPool::new();
        let mut broad = BroadPhase::new(&matrix, 0.05, 0.1);
        let sleeper = add(
            &mut broad,
            &mut bodies,
            &matrix,
            BodyDesc::new(Shape::sphere(1.), Point3::new(0., 0., 0.)),
        );
        add(
            &mut broad,
            &mut bodies,
            &matrix,
            BodyDesc::new(Shape::sphere(1.), Point3::new(1., 0., 0.)),
        );
        bodies.at_mut(sleeper).sleeping = true;
        let pairs = collect_pairs(&mut broad, &mut bodies, &matrix);
        assert_eq!(pairs.len(), 1);
        assert!(!bodies.at(sleeper).is_sleeping());
    }
}

/// Order a pair for reporting: higher motion type first, ties to lower id.
fn order_pair(
    bodies: &BodyPool,
    index_a: u32,
    index_b: u32,
    motion_a: MotionType,
    id_a: u32,
) -> (u32, u32) {
    let other = bodies.at(index_b);
    let motion_b = other.motion_type;
    let id_b = other.id().raw();
    if motion_a > motion_b || (motion_a == motion_b && id_a < id_b) {
        (index_a, index_b)
    } else {
        (index_b, index_a)
    }
}
