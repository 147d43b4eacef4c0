//! Dynamic bounding volume hierarchy
//!
//! One tree per broad phase layer. Leaves carry fat AABBs (the body AABB
//! expanded by a margin) so small movements do not touch the tree; structure
//! is maintained with cheap incremental rotations rather than strict
//! balancing.

use std::mem;

use cgmath::{Point3, Vector3};
use collision::{Aabb, Aabb3, Contains, Discrete, SurfaceArea, Union};

use util::{manhattan_distance, segment_aabb_entry};

const NULL: i32 = -1;

/// Flow control for AABB and point queries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Visit {
    /// Keep visiting.
    Continue,
    /// Stop the query.
    Exit,
}

/// Flow control for ray and swept queries.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RayVisit {
    /// Keep visiting.
    Continue,
    /// Keep visiting, but prune nodes whose entry fraction exceeds the value.
    Clip(f32),
    /// Stop the query.
    Exit,
}

#[derive(Clone, Debug)]
struct Node {
    parent: i32,
    left: i32,
    right: i32,
    height: i32,
    /// Body index for leaves, -1 for internal nodes.
    body: i32,
    /// Fat AABB for leaves, child union for internal nodes.
    aabb: Aabb3<f32>,
    /// Exact body AABB at the last update, drives velocity prediction.
    previous_aabb: Aabb3<f32>,
}

impl Node {
    fn is_leaf(&self) -> bool {
        self.left == NULL
    }
}

/// An incrementally updated AABB tree over rigid bodies.
pub struct DynamicBvh {
    nodes: Vec<Node>,
    free: Vec<i32>,
    root: i32,
    leaf_count: usize,
    margin: f32,
    velocity_prediction: f32,
    optimization_path: u32,
    stack: Vec<i32>,
    ray_stack: Vec<(i32, f32)>,
    scratch: Vec<i32>,
}

impl DynamicBvh {
    /// Create an empty tree.
    ///
    /// `margin` fattens every leaf AABB; `velocity_prediction` additionally
    /// stretches the leaf along the body's motion so the next few updates hit
    /// the "still fits" early exit.
    pub fn new(margin: f32, velocity_prediction: f32) -> Self {
        DynamicBvh {
            nodes: Vec::new(),
            free: Vec::new(),
            root: NULL,
            leaf_count: 0,
            margin,
            velocity_prediction,
            optimization_path: 0,
            stack: Vec::new(),
            ray_stack: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Number of leaves (bodies) in the tree.
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Fat AABB of a leaf.
    pub fn leaf_aabb(&self, node: i32) -> &Aabb3<f32> {
        &self.nodes[node as usize].aabb
    }

    /// Does the body AABB still fit inside its leaf's fat AABB?
    pub fn leaf_fits(&self, node: i32, aabb: &Aabb3<f32>) -> bool {
        self.nodes[node as usize].aabb.contains(aabb)
    }

    fn alloc(&mut self, body: i32, aabb: Aabb3<f32>, previous: Aabb3<f32>) -> i32 {
        let node = Node {
            parent: NULL,
            left: NULL,
            right: NULL,
            height: 0,
            body,
            aabb,
            previous_aabb: previous,
        };
        match self.free.pop() {
            Some(index) => {
                self.nodes[index as usize] = node;
                index
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() as i32 - 1
            }
        }
    }

    fn release(&mut self, node: i32) {
        self.nodes[node as usize].height = NULL;
        self.free.push(node);
    }

    /// Insert a leaf for a body, returning the leaf node index.
    pub fn insert(&mut self, body: u32, aabb: &Aabb3<f32>) -> i32 {
        let margin = Vector3::new(self.margin, self.margin, self.margin);
        let fat = aabb.add_margin(margin);
        let leaf = self.alloc(body as i32, fat, *aabb);
        self.leaf_count += 1;
        let root = self.root;
        self.insert_leaf(leaf, root);
        leaf
    }

    /// Remove a leaf.
    pub fn remove(&mut self, node: i32) {
        self.detach(node);
        self.release(node);
        self.leaf_count -= 1;
    }

    /// Move a leaf to a new body AABB.
    ///
    /// Does nothing (returning `false`) while the body AABB still fits the
    /// cached fat AABB. Otherwise the leaf is detached, fattened (margin plus
    /// per axis velocity prediction, signed by the motion delta), and
    /// reinserted starting `lookahead` levels above the removal point; a
    /// negative `lookahead` reinserts from the root.
    pub fn update(&mut self, node: i32, aabb: &Aabb3<f32>, lookahead: i32) -> bool {
        if self.leaf_fits(node, aabb) {
            return false;
        }
        let margin = Vector3::new(self.margin, self.margin, self.margin);
        let mut fat = aabb.add_margin(margin);
        if self.velocity_prediction > 0. {
            let delta = aabb.center() - self.nodes[node as usize].previous_aabb.center();
            let stretch = aabb.dim() * (0.5 * self.velocity_prediction);
            let mut min = fat.min;
            let mut max = fat.max;
            for axis in 0..3 {
                if delta[axis] > 0. {
                    max[axis] += stretch[axis];
                } else if delta[axis] < 0. {
                    min[axis] -= stretch[axis];
                }
            }
            fat = Aabb3::new(min, max);
        }
        let refit_point = self.detach(node);
        {
            let stored = &mut self.nodes[node as usize];
            stored.aabb = fat;
            stored.previous_aabb = *aabb;
        }
        let start = if lookahead < 0 {
            self.root
        } else {
            let mut walk = refit_point;
            for _ in 0..lookahead {
                if walk == NULL {
                    break;
                }
                walk = self.nodes[walk as usize].parent;
            }
            if walk == NULL {
                self.root
            } else {
                walk
            }
        };
        self.insert_leaf(node, start);
        true
    }

    /// Descend from `start`, create a parent joining the reached leaf with
    /// `leaf`, refit upward.
    fn insert_leaf(&mut self, leaf: i32, start: i32) {
        if self.root == NULL {
            self.root = leaf;
            self.nodes[leaf as usize].parent = NULL;
            return;
        }
        let leaf_center = self.nodes[leaf as usize].aabb.center();
        let mut index = if start == NULL { self.root } else { start };
        while !self.nodes[index as usize].is_leaf() {
            let left = self.nodes[index as usize].left;
            let right = self.nodes[index as usize].right;
            let left_distance =
                manhattan_distance(self.nodes[left as usize].aabb.center(), leaf_center);
            let right_distance =
                manhattan_distance(self.nodes[right as usize].aabb.center(), leaf_center);
            // Ties go left.
            index = if left_distance <= right_distance {
                left
            } else {
                right
            };
        }

        let sibling = index;
        let old_parent = self.nodes[sibling as usize].parent;
        let union = self.nodes[sibling as usize]
            .aabb
            .union(&self.nodes[leaf as usize].aabb);
        let new_parent = self.alloc(NULL, union, union);
        {
            let stored = &mut self.nodes[new_parent as usize];
            stored.parent = old_parent;
            stored.left = sibling;
            stored.right = leaf;
        }
        self.nodes[new_parent as usize].height = self.nodes[sibling as usize]
            .height
            .max(self.nodes[leaf as usize].height)
            + 1;
        self.nodes[sibling as usize].parent = new_parent;
        self.nodes[leaf as usize].parent = new_parent;
        if old_parent == NULL {
            self.root = new_parent;
        } else if self.nodes[old_parent as usize].left == sibling {
            self.nodes[old_parent as usize].left = new_parent;
        } else {
            self.nodes[old_parent as usize].right = new_parent;
        }
        self.refit_upward(old_parent);
    }

    /// Unlink a leaf, collapsing its parent into the sibling. Returns the
    /// node that took the parent's place (the refit point), or -1.
    fn detach(&mut self, leaf: i32) -> i32 {
        if self.root == leaf {
            self.root = NULL;
            self.nodes[leaf as usize].parent = NULL;
            return NULL;
        }
        let parent = self.nodes[leaf as usize].parent;
        let sibling = if self.nodes[parent as usize].left == leaf {
            self.nodes[parent as usize].right
        } else {
            self.nodes[parent as usize].left
        };
        let grandparent = self.nodes[parent as usize].parent;
        self.nodes[sibling as usize].parent = grandparent;
        if grandparent == NULL {
            self.root = sibling;
        } else if self.nodes[grandparent as usize].left == parent {
            self.nodes[grandparent as usize].left = sibling;
        } else {
            self.nodes[grandparent as usize].right = sibling;
        }
        self.release(parent);
        self.nodes[leaf as usize].parent = NULL;
        self.refit_upward(grandparent);
        sibling
    }

    /// Recompute AABBs and heights along the ancestor chain, stopping once
    /// nothing changes.
    fn refit_upward(&mut self, from: i32) {
        let mut index = from;
        while index != NULL {
            let left = self.nodes[index as usize].left;
            let right = self.nodes[index as usize].right;
            let union = self.nodes[left as usize]
                .aabb
                .union(&self.nodes[right as usize].aabb);
            let height = self.nodes[left as usize]
                .height
                .max(self.nodes[right as usize].height)
                + 1;
            let node = &mut self.nodes[index as usize];
            let unchanged = node.height == height
                && node.aabb.contains(&union)
                && union.contains(&node.aabb);
            node.aabb = union;
            node.height = height;
            if unchanged {
                break;
            }
            index = node.parent;
        }
    }

    /// One incremental optimization pass per call in `passes`.
    ///
    /// Each pass walks one root-to-leaf path chosen by the persistent path
    /// word, one bit per level, and at every visited node swaps the node with
    /// its parent slot when the node's index is lower. The rotation chases
    /// index locality, not surface area; repeated passes gradually move
    /// ancestors to the front of the node array.
    ///
    /// `moved` is told about every leaf whose node index changed.
    pub fn optimize<F>(&mut self, passes: usize, moved: &mut F)
    where
        F: FnMut(u32, i32),
    {
        for _ in 0..passes {
            if self.root == NULL || self.nodes[self.root as usize].is_leaf() {
                return;
            }
            let mut path = self.optimization_path;
            let mut index = self.root;
            while !self.nodes[index as usize].is_leaf() {
                let parent = self.nodes[index as usize].parent;
                if parent != NULL && index < parent {
                    self.swap_slots(index, parent, moved);
                    index = parent;
                }
                let bit = path & 1;
                path >>= 1;
                index = if bit == 0 {
                    self.nodes[index as usize].left
                } else {
                    self.nodes[index as usize].right
                };
            }
            self.optimization_path = self.optimization_path.wrapping_add(1);
        }
    }

    /// Swap the array slots of two nodes, patching every link that referenced
    /// either slot.
    fn swap_slots<F>(&mut self, a: i32, b: i32, moved: &mut F)
    where
        F: FnMut(u32, i32),
    {
        if a == b {
            return;
        }
        self.nodes.swap(a as usize, b as usize);
        let remap = |x: i32| {
            if x == a {
                b
            } else if x == b {
                a
            } else {
                x
            }
        };
        for &slot in &[a, b] {
            let node = &mut self.nodes[slot as usize];
            node.parent = remap(node.parent);
            node.left = remap(node.left);
            node.right = remap(node.right);
        }
        let parent_a = self.nodes[a as usize].parent;
        let parent_b = self.nodes[b as usize].parent;
        if parent_a == parent_b && parent_a != NULL {
            // Siblings: the parent's child set is unchanged but the slots
            // traded tenants, so its left/right swap to keep orientation.
            let node = &mut self.nodes[parent_a as usize];
            mem::swap(&mut node.left, &mut node.right);
        } else {
            for &slot in &[a, b] {
                let parent = self.nodes[slot as usize].parent;
                if parent != NULL && parent != a && parent != b {
                    let other = remap(slot);
                    if self.nodes[parent as usize].left == other {
                        self.nodes[parent as usize].left = slot;
                    } else if self.nodes[parent as usize].right == other {
                        self.nodes[parent as usize].right = slot;
                    }
                }
            }
        }
        for &slot in &[a, b] {
            let (left, right, body) = {
                let node = &self.nodes[slot as usize];
                (node.left, node.right, node.body)
            };
            for &child in &[left, right] {
                if child != NULL && child != a && child != b {
                    self.nodes[child as usize].parent = slot;
                }
            }
            if body != NULL {
                moved(body as u32, slot);
            }
        }
        self.root = remap(self.root);
    }

    /// Rebuild the whole tree bottom-up, always merging the pair with the
    /// smallest union surface area. Quadratic; meant for small leaf sets.
    pub fn rebuild_bottom_up(&mut self) {
        let mut leaves = mem::replace(&mut self.scratch, Vec::new());
        leaves.clear();
        self.collect_leaves(&mut leaves);
        self.free_internal_nodes();
        self.root = self.build_bottom_up(&mut leaves);
        self.scratch = leaves;
    }

    /// Rebuild the whole tree top-down, splitting on the axis whose
    /// center-median partition is most balanced. Small ranges fall back to
    /// the bottom-up builder.
    pub fn rebuild_top_down(&mut self) {
        let mut leaves = mem::replace(&mut self.scratch, Vec::new());
        leaves.clear();
        self.collect_leaves(&mut leaves);
        self.free_internal_nodes();
        let count = leaves.len();
        self.root = self.build_top_down(&mut leaves, 0, count);
        self.scratch = leaves;
    }

    fn collect_leaves(&self, out: &mut Vec<i32>) {
        for (index, node) in self.nodes.iter().enumerate() {
            if node.height != NULL && node.is_leaf() {
                out.push(index as i32);
            }
        }
    }

    fn free_internal_nodes(&mut self) {
        for index in 0..self.nodes.len() {
            let node = &self.nodes[index];
            if node.height != NULL && !node.is_leaf() {
                self.release(index as i32);
            }
        }
        self.root = NULL;
    }

    fn join(&mut self, left: i32, right: i32) -> i32 {
        let union = self.nodes[left as usize]
            .aabb
            .union(&self.nodes[right as usize].aabb);
        let parent = self.alloc(NULL, union, union);
        self.nodes[parent as usize].left = left;
        self.nodes[parent as usize].right = right;
        self.nodes[parent as usize].height = self.nodes[left as usize]
            .height
            .max(self.nodes[right as usize].height)
            + 1;
        self.nodes[left as usize].parent = parent;
        self.nodes[right as usize].parent = parent;
        parent
    }

    fn build_bottom_up(&mut self, leaves: &mut Vec<i32>) -> i32 {
        if leaves.is_empty() {
            return NULL;
        }
        while leaves.len() > 1 {
            let mut best = (0usize, 1usize);
            let mut best_area = ::std::f32::MAX;
            for i in 0..leaves.len() {
                for j in i + 1..leaves.len() {
                    let area = self.nodes[leaves[i] as usize]
                        .aabb
                        .union(&self.nodes[leaves[j] as usize].aabb)
                        .surface_area();
                    if area < best_area {
                        best_area = area;
                        best = (i, j);
                    }
                }
            }
            let right = leaves.swap_remove(best.1);
            let left = leaves[best.0];
            let parent = self.join(left, right);
            leaves[best.0] = parent;
        }
        let root = leaves[0];
        self.nodes[root as usize].parent = NULL;
        leaves.clear();
        root
    }

    fn build_top_down(&mut self, leaves: &mut Vec<i32>, start: usize, end: usize) -> i32 {
        const BOTTOM_UP_THRESHOLD: usize = 8;
        let count = end - start;
        if count <= BOTTOM_UP_THRESHOLD {
            let mut subset = leaves[start..end].to_vec();
            return self.build_bottom_up(&mut subset);
        }
        let mut bounds = self.nodes[leaves[start] as usize].aabb;
        for &leaf in &leaves[start + 1..end] {
            bounds = bounds.union(&self.nodes[leaf as usize].aabb);
        }
        let median = bounds.center();
        let mut best_axis = 0;
        let mut best_balance = usize::max_value();
        let mut best_split = start;
        for axis in 0..3 {
            let mut mid = start;
            for i in start..end {
                if self.nodes[leaves[i] as usize].aabb.center()[axis] < median[axis] {
                    leaves.swap(i, mid);
                    mid += 1;
                }
            }
            let left = mid - start;
            let right = count - left;
            let balance = if left > right { left - right } else { right - left };
            if left > 0 && right > 0 && balance < best_balance {
                best_balance = balance;
                best_axis = axis;
                best_split = mid;
            }
        }
        if best_balance == usize::max_value() {
            // Degenerate spread on every axis; split by order.
            best_split = start + count / 2;
        } else {
            let mut mid = start;
            for i in start..end {
                if self.nodes[leaves[i] as usize].aabb.center()[best_axis] < median[best_axis] {
                    leaves.swap(i, mid);
                    mid += 1;
                }
            }
            best_split = mid;
        }
        let left = self.build_top_down(leaves, start, best_split);
        let right = self.build_top_down(leaves, best_split, end);
        self.join(left, right)
    }

    /// Visit every leaf whose fat AABB intersects `aabb`.
    pub fn query_aabb<F>(&mut self, aabb: &Aabb3<f32>, visitor: &mut F)
    where
        F: FnMut(u32) -> Visit,
    {
        if self.root == NULL {
            return;
        }
        let mut stack = mem::replace(&mut self.stack, Vec::new());
        stack.clear();
        stack.push(self.root);
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            if !node.aabb.intersects(aabb) {
                continue;
            }
            if node.is_leaf() {
                if visitor(node.body as u32) == Visit::Exit {
                    break;
                }
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
        self.stack = stack;
    }

    /// Visit every leaf whose fat AABB contains `point`.
    pub fn query_point<F>(&mut self, point: Point3<f32>, visitor: &mut F)
    where
        F: FnMut(u32) -> Visit,
    {
        if self.root == NULL {
            return;
        }
        let mut stack = mem::replace(&mut self.stack, Vec::new());
        stack.clear();
        stack.push(self.root);
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            if !node.aabb.contains(&point) {
                continue;
            }
            if node.is_leaf() {
                if visitor(node.body as u32) == Visit::Exit {
                    break;
                }
            } else {
                stack.push(node.left);
                stack.push(node.right);
            }
        }
        self.stack = stack;
    }

    /// Cast a ray of `length` through the tree. The visitor receives the body
    /// and the entry fraction into its fat AABB; returning
    /// [`RayVisit::Clip`](enum.RayVisit.html) prunes nodes farther than the
    /// new fraction. Children are visited near to far.
    pub fn cast_ray<F>(
        &mut self,
        origin: Point3<f32>,
        direction: Vector3<f32>,
        length: f32,
        visitor: &mut F,
    ) where
        F: FnMut(u32, f32) -> RayVisit,
    {
        self.cast(origin, direction * length, Vector3::new(0., 0., 0.), visitor);
    }

    /// Sweep an AABB along `displacement` through the tree. Reduces to a ray
    /// cast of the AABB center against node AABBs grown by the half extents.
    pub fn cast_aabb<F>(&mut self, aabb: &Aabb3<f32>, displacement: Vector3<f32>, visitor: &mut F)
    where
        F: FnMut(u32, f32) -> RayVisit,
    {
        let half_extent = aabb.dim() * 0.5;
        self.cast(aabb.center(), displacement, half_extent, visitor);
    }

    fn cast<F>(
        &mut self,
        origin: Point3<f32>,
        displacement: Vector3<f32>,
        half_extent: Vector3<f32>,
        visitor: &mut F,
    ) where
        F: FnMut(u32, f32) -> RayVisit,
    {
        if self.root == NULL {
            return;
        }
        let mut stack = mem::replace(&mut self.ray_stack, Vec::new());
        stack.clear();
        let mut max_fraction = 1f32;
        if let Some(t) = self.node_entry(self.root, origin, displacement, half_extent) {
            stack.push((self.root, t));
        }
        while let Some((index, entry)) = stack.pop() {
            if entry > max_fraction {
                continue;
            }
            let (is_leaf, body, left, right) = {
                let node = &self.nodes[index as usize];
                (node.is_leaf(), node.body, node.left, node.right)
            };
            if is_leaf {
                match visitor(body as u32, entry) {
                    RayVisit::Continue => {}
                    RayVisit::Clip(fraction) => max_fraction = max_fraction.min(fraction),
                    RayVisit::Exit => break,
                }
            } else {
                let left_entry = self.node_entry(left, origin, displacement, half_extent);
                let right_entry = self.node_entry(right, origin, displacement, half_extent);
                // Push the farther child first so the closer one pops first.
                match (left_entry, right_entry) {
                    (Some(tl), Some(tr)) => {
                        if tl <= tr {
                            stack.push((right, tr));
                            stack.push((left, tl));
                        } else {
                            stack.push((left, tl));
                            stack.push((right, tr));
                        }
                    }
                    (Some(tl), None) => stack.push((left, tl)),
                    (None, Some(tr)) => stack.push((right, tr)),
                    (None, None) => {}
                }
            }
        }
        self.ray_stack = stack;
    }

    fn node_entry(
        &self,
        node: i32,
        origin: Point3<f32>,
        displacement: Vector3<f32>,
        half_extent: Vector3<f32>,
    ) -> Option<f32> {
        let aabb = &self.nodes[node as usize].aabb;
        let grown = Aabb3::new(aabb.min + -half_extent, aabb.max + half_extent);
        segment_aabb_entry(origin, displacement, &grown)
    }

    /// Check structural invariants; test support.
    #[cfg(test)]
    fn validate(&self) {
        fn walk(tree: &DynamicBvh, index: i32, parent: i32, leaves: &mut usize) {
            let node = &tree.nodes[index as usize];
            assert_eq!(node.parent, parent, "node {} parent link", index);
            if node.is_leaf() {
                assert_eq!(node.right, NULL);
                assert!(node.body != NULL);
                *leaves += 1;
            } else {
                assert!(node.left != NULL && node.right != NULL);
                assert_eq!(node.body, NULL);
                let union = tree.nodes[node.left as usize]
                    .aabb
                    .union(&tree.nodes[node.right as usize].aabb);
                assert!(
                    node.aabb.contains(&union) && union.contains(&node.aabb),
                    "node {} aabb is not the union of its children",
                    index
                );
                walk(tree, node.left, index, leaves);
                walk(tree, node.right, index, leaves);
            }
        }
        if self.root != NULL {
            let mut leaves = 0;
            walk(self, self.root, NULL, &mut leaves);
            assert_eq!(leaves, self.leaf_count);
        } else {
            assert_eq!(self.leaf_count, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_aabb(center: Point3<f32>) -> Aabb3<f32> {
        let half = Vector3::new(0.5, 0.5, 0.5);
        Aabb3::new(center + -half, center + half)
    }

    // Tiny deterministic generator so the structural tests cover shuffled
    // insertion orders without a rand dependency.
    struct Lcg(u32);
    impl Lcg {
        fn next(&mut self) -> u32 {
            self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            self.0
        }
        fn next_f32(&mut self) -> f32 {
            (self.next() >> 8) as f32 / (1 << 24) as f32
        }
    }

    #[test]
    fn insert_update_remove_keeps_invariants() {
        let mut tree = DynamicBvh::new(0.05, 0.1);
        let mut rng = Lcg(7);
        let mut leaves = Vec::new();
        for body in 0..64u32 {
            let center = Point3::new(
                rng.next_f32() * 20. - 10.,
                rng.next_f32() * 20. - 10.,
                rng.next_f32() * 20. - 10.,
            );
            leaves.push((body, tree.insert(body, &unit_aabb(center))));
            tree.validate();
        }
        for &(_, leaf) in &leaves {
            let center = Point3::new(
                rng.next_f32() * 20. - 10.,
                rng.next_f32() * 20. - 10.,
                rng.next_f32() * 20. - 10.,
            );
            tree.update(leaf, &unit_aabb(center), -1);
            tree.validate();
        }
        for &(_, leaf) in leaves.iter().take(32) {
            tree.remove(leaf);
            tree.validate();
        }
        assert_eq!(tree.leaf_count(), 32);
    }

    #[test]
    fn leaf_fat_aabb_contains_body_aabb_after_update() {
        let mut tree = DynamicBvh::new(0.05, 0.1);
        let aabb = unit_aabb(Point3::new(0., 0., 0.));
        let leaf = tree.insert(0, &aabb);
        assert!(tree.leaf_fits(leaf, &aabb));
        let moved = unit_aabb(Point3::new(3., 0., 0.));
        tree.update(leaf, &moved, -1);
        assert!(tree.leaf_fits(leaf, &moved));
    }

    #[test]
    fn small_move_is_a_no_op() {
        let mut tree = DynamicBvh::new(0.05, 0.1);
        let leaf = tree.insert(0, &unit_aabb(Point3::new(0., 0., 0.)));
        assert!(!tree.update(leaf, &unit_aabb(Point3::new(0.01, 0., 0.)), -1));
        assert!(tree.update(leaf, &unit_aabb(Point3::new(5., 0., 0.)), -1));
    }

    #[test]
    fn query_aabb_finds_overlapping_leaves() {
        let mut tree = DynamicBvh::new(0.05, 0.);
        for body in 0..8u32 {
            tree.insert(body, &unit_aabb(Point3::new(body as f32 * 3., 0., 0.)));
        }
        let mut found = Vec::new();
        tree.query_aabb(
            &Aabb3::new(Point3::new(2., -1., -1.), Point3::new(7., 1., 1.)),
            &mut |body| {
                found.push(body);
                Visit::Continue
            },
        );
        found.sort();
        assert_eq!(found, vec![1, 2]);
    }

    #[test]
    fn ray_cast_visits_near_to_far() {
        let mut tree = DynamicBvh::new(0.0, 0.);
        for body in 0..4u32 {
            tree.insert(body, &unit_aabb(Point3::new(0., 0., body as f32 * 4.)));
        }
        let mut order = Vec::new();
        tree.cast_ray(
            Point3::new(0., 0., -10.),
            Vector3::new(0., 0., 1.),
            40.,
            &mut |body, _| {
                order.push(body);
                RayVisit::Continue
            },
        );
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn ray_clip_prunes_far_leaves() {
        let mut tree = DynamicBvh::new(0.0, 0.);
        for body in 0..4u32 {
            tree.insert(body, &unit_aabb(Point3::new(0., 0., body as f32 * 4.)));
        }
        let mut visited = Vec::new();
        tree.cast_ray(
            Point3::new(0., 0., -10.),
            Vector3::new(0., 0., 1.),
            40.,
            &mut |body, fraction| {
                visited.push(body);
                RayVisit::Clip(fraction)
            },
        );
        assert_eq!(visited, vec![0]);
    }

    #[test]
    fn optimization_preserves_structure_and_reports_moves() {
        let mut tree = DynamicBvh::new(0.05, 0.);
        let mut rng = Lcg(99);
        let mut node_of = vec![NULL; 32];
        for body in 0..32u32 {
            let center = Point3::new(
                rng.next_f32() * 10.,
                rng.next_f32() * 10.,
                rng.next_f32() * 10.,
            );
            node_of[body as usize] = tree.insert(body, &unit_aabb(center));
        }
        for _ in 0..100 {
            tree.optimize(1, &mut |body, node| node_of[body as usize] = node);
            tree.validate();
        }
        // Back references must still resolve to the right leaves.
        for (body, &node) in node_of.iter().enumerate() {
            assert_eq!(tree.nodes[node as usize].body, body as i32);
        }
    }

    #[test]
    fn rebuilds_keep_all_leaves() {
        let mut tree = DynamicBvh::new(0.05, 0.);
        let mut rng = Lcg(3);
        for body in 0..40u32 {
            let center = Point3::new(
                rng.next_f32() * 30.,
                rng.next_f32() * 30.,
                rng.next_f32() * 30.,
            );
            tree.insert(body, &unit_aabb(center));
        }
        tree.rebuild_bottom_up();
        tree.validate();
        assert_eq!(tree.leaf_count(), 40);
        tree.rebuild_top_down();
        tree.validate();
        assert_eq!(tree.leaf_count(), 40);
    }
}
