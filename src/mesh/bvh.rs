//! Static BVH over an indexed triangle mesh
//!
//! A single flat node array built once, with the mesh's triangle buffer
//! reordered in place so every leaf owns a contiguous triangle range.

use std::mem;

use cgmath::{Point3, Vector3};
use collision::{Aabb, Aabb3, Contains, Discrete, SurfaceArea};

use broad::dbvh::{RayVisit, Visit};
use mesh::TriangleMesh;
use util::{segment_aabb_entry, segment_triangle_intersection};

const BIN_COUNT: usize = 32;
const TRAVERSAL_COST: f32 = 1.0;
const TRIANGLE_INTERSECT_COST: f32 = 1.25;

/// How the builder chooses split planes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SplitStrategy {
    /// Longest axis of the triangle centers, split at the middle.
    Center,
    /// Longest axis of the node bounds, split at the mean center.
    Average,
    /// Surface area heuristic with binning.
    Sah,
}

/// Build settings for [`MeshBvh`](struct.MeshBvh.html).
#[derive(Clone, Debug)]
pub struct MeshBvhSettings {
    /// Split strategy.
    pub strategy: SplitStrategy,
    /// Ranges at or below this size become leaves.
    pub max_leaf_triangles: usize,
}

impl Default for MeshBvhSettings {
    fn default() -> Self {
        MeshBvhSettings {
            strategy: SplitStrategy::Sah,
            max_leaf_triangles: 4,
        }
    }
}

/// One flat node: bounds plus two packed words.
///
/// A node is a leaf iff `axis_or_neg_count < 0`; its triangles are the range
/// `[right_or_tri_start, right_or_tri_start + (-axis_or_neg_count - 1))`.
/// An internal node's left child immediately follows it in the array, its
/// right child sits at `right_or_tri_start`, and `axis_or_neg_count` is the
/// split axis.
#[derive(Clone, Copy, Debug)]
struct FlatNode {
    min: Point3<f32>,
    max: Point3<f32>,
    right_or_tri_start: i32,
    axis_or_neg_count: i32,
}

impl FlatNode {
    fn aabb(&self) -> Aabb3<f32> {
        Aabb3::new(self.min, self.max)
    }

    fn is_leaf(&self) -> bool {
        self.axis_or_neg_count < 0
    }

    fn triangle_range(&self) -> (usize, usize) {
        let start = self.right_or_tri_start as usize;
        (start, start + (-self.axis_or_neg_count - 1) as usize)
    }
}

/// Per triangle scratch built once per build and kept in lock step with
/// triangle swaps.
struct BuildData {
    center: Vec<Point3<f32>>,
    half_extent: Vec<Vector3<f32>>,
}

impl BuildData {
    fn swap(&mut self, a: usize, b: usize) {
        self.center.swap(a, b);
        self.half_extent.swap(a, b);
    }

    fn aabb(&self, triangle: usize) -> Aabb3<f32> {
        Aabb3::new(
            self.center[triangle] + -self.half_extent[triangle],
            self.center[triangle] + self.half_extent[triangle],
        )
    }
}

/// Static surface area heuristic BVH over a triangle mesh.
pub struct MeshBvh {
    nodes: Vec<FlatNode>,
    stack: Vec<(usize, f32)>,
}

impl MeshBvh {
    /// Build a BVH for `mesh`, reordering its triangle buffer in place.
    pub fn build(mesh: &mut TriangleMesh, settings: &MeshBvhSettings) -> MeshBvh {
        let count = mesh.triangles().len();
        let mut data = BuildData {
            center: Vec::with_capacity(count),
            half_extent: Vec::with_capacity(count),
        };
        for triangle in 0..count {
            let aabb = mesh.triangle_aabb(triangle);
            data.center.push(aabb.center());
            data.half_extent.push(aabb.dim() * 0.5);
        }
        let mut bvh = MeshBvh {
            nodes: Vec::with_capacity(2 * count),
            stack: Vec::new(),
        };
        if count > 0 {
            bvh.build_range(mesh, &mut data, 0, count, settings);
        }
        bvh
    }

    /// Number of nodes in the flat array.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Emit the subtree over `[start, end)` pre-order; returns its root index.
    fn build_range(
        &mut self,
        mesh: &mut TriangleMesh,
        data: &mut BuildData,
        start: usize,
        end: usize,
        settings: &MeshBvhSettings,
    ) -> usize {
        // Node bounds and center bounds in one pass.
        let mut bounds = data.aabb(start);
        let mut center_min = data.center[start];
        let mut center_max = data.center[start];
        for triangle in start + 1..end {
            bounds = union(&bounds, &data.aabb(triangle));
            let center = data.center[triangle];
            for axis in 0..3 {
                center_min[axis] = center_min[axis].min(center[axis]);
                center_max[axis] = center_max[axis].max(center[axis]);
            }
        }

        let index = self.nodes.len();
        self.nodes.push(FlatNode {
            min: bounds.min,
            max: bounds.max,
            right_or_tri_start: 0,
            axis_or_neg_count: 0,
        });

        let count = end - start;
        let split = if count <= settings.max_leaf_triangles {
            None
        } else {
            match settings.strategy {
                SplitStrategy::Center => split_center(center_min, center_max),
                SplitStrategy::Average => {
                    split_average(data, start, end, &bounds, center_min, center_max)
                }
                SplitStrategy::Sah => {
                    split_sah(data, start, end, &bounds, center_min, center_max)
                }
            }
        };

        let (axis, position) = match split {
            Some(split) => split,
            None => {
                self.make_leaf(index, start, count);
                return index;
            }
        };

        // Hoare partition: centers left of the plane go first.
        let mut mid = start;
        for triangle in start..end {
            if data.center[triangle][axis] < position {
                mesh.swap_triangles(triangle, mid);
                data.swap(triangle, mid);
                mid += 1;
            }
        }
        if mid == start || mid == end {
            // Every center landed on one side; give up on splitting.
            self.make_leaf(index, start, count);
            return index;
        }

        let left = self.build_range(mesh, data, start, mid, settings);
        debug_assert_eq!(left, index + 1);
        let right = self.build_range(mesh, data, mid, end, settings);
        self.nodes[index].right_or_tri_start = right as i32;
        self.nodes[index].axis_or_neg_count = axis as i32;
        index
    }

    fn make_leaf(&mut self, index: usize, start: usize, count: usize) {
        self.nodes[index].right_or_tri_start = start as i32;
        self.nodes[index].axis_or_neg_count = -(count as i32 + 1);
    }

    /// Cast a ray of `length` through the mesh.
    ///
    /// The visitor receives `(triangle, fraction)` for every triangle the ray
    /// crosses; [`RayVisit::Clip`](../../broad/dbvh/enum.RayVisit.html)
    /// prunes nodes entered beyond the given fraction. Children are pushed so
    /// the nearer one pops first. Returns the number of nodes visited.
    pub fn cast_ray<F>(
        &mut self,
        mesh: &TriangleMesh,
        origin: Point3<f32>,
        direction: Vector3<f32>,
        length: f32,
        visitor: &mut F,
    ) -> usize
    where
        F: FnMut(u32, f32) -> RayVisit,
    {
        if self.nodes.is_empty() {
            return 0;
        }
        let displacement = direction * length;
        let mut visited = 0;
        let mut max_fraction = 1f32;
        let mut stack = mem::replace(&mut self.stack, Vec::new());
        stack.clear();
        if let Some(entry) = self.node_entry(0, origin, displacement, Vector3::new(0., 0., 0.)) {
            stack.push((0, entry));
        }
        'outer: while let Some((index, entry)) = stack.pop() {
            if entry > max_fraction {
                continue;
            }
            visited += 1;
            let node = self.nodes[index];
            if node.is_leaf() {
                let (start, end) = node.triangle_range();
                for triangle in start..end {
                    let points = mesh.triangle_points(triangle);
                    if let Some(fraction) = segment_triangle_intersection(
                        origin,
                        displacement,
                        points[0],
                        points[1],
                        points[2],
                    ) {
                        match visitor(triangle as u32, fraction) {
                            RayVisit::Continue => {}
                            RayVisit::Clip(new_max) => {
                                max_fraction = max_fraction.min(new_max)
                            }
                            RayVisit::Exit => break 'outer,
                        }
                    }
                }
            } else {
                let left = index + 1;
                let right = node.right_or_tri_start as usize;
                let zero = Vector3::new(0., 0., 0.);
                let left_entry = self.node_entry(left, origin, displacement, zero);
                let right_entry = self.node_entry(right, origin, displacement, zero);
                push_ordered(&mut stack, left, left_entry, right, right_entry);
            }
        }
        self.stack = stack;
        visited
    }

    /// Visit triangles whose AABB contains the point.
    pub fn collide_point<F>(&mut self, mesh: &TriangleMesh, point: Point3<f32>, visitor: &mut F)
    where
        F: FnMut(u32) -> Visit,
    {
        if self.nodes.is_empty() {
            return;
        }
        let mut stack = mem::replace(&mut self.stack, Vec::new());
        stack.clear();
        stack.push((0, 0.));
        'outer: while let Some((index, _)) = stack.pop() {
            let node = self.nodes[index];
            if !contains_point(&node, point) {
                continue;
            }
            if node.is_leaf() {
                let (start, end) = node.triangle_range();
                for triangle in start..end {
                    if mesh.triangle_aabb(triangle).contains(&point)
                        && visitor(triangle as u32) == Visit::Exit
                    {
                        break 'outer;
                    }
                }
            } else {
                stack.push((index + 1, 0.));
                stack.push((node.right_or_tri_start as usize, 0.));
            }
        }
        self.stack = stack;
    }

    /// Visit triangles whose AABB intersects the query AABB.
    pub fn collide_aabb<F>(&mut self, mesh: &TriangleMesh, aabb: &Aabb3<f32>, visitor: &mut F)
    where
        F: FnMut(u32) -> Visit,
    {
        if self.nodes.is_empty() {
            return;
        }
        let mut stack = mem::replace(&mut self.stack, Vec::new());
        stack.clear();
        stack.push((0, 0.));
        'outer: while let Some((index, _)) = stack.pop() {
            let node = self.nodes[index];
            if !node.aabb().intersects(aabb) {
                continue;
            }
            if node.is_leaf() {
                let (start, end) = node.triangle_range();
                for triangle in start..end {
                    if mesh.triangle_aabb(triangle).intersects(aabb)
                        && visitor(triangle as u32) == Visit::Exit
                    {
                        break 'outer;
                    }
                }
            } else {
                stack.push((index + 1, 0.));
                stack.push((node.right_or_tri_start as usize, 0.));
            }
        }
        self.stack = stack;
    }

    /// Sweep an AABB along `displacement` through the mesh. Node tests grow
    /// the node bounds by the swept half extents and ray cast the center.
    pub fn cast_aabb<F>(
        &mut self,
        mesh: &TriangleMesh,
        aabb: &Aabb3<f32>,
        displacement: Vector3<f32>,
        visitor: &mut F,
    ) where
        F: FnMut(u32, f32) -> RayVisit,
    {
        if self.nodes.is_empty() {
            return;
        }
        let origin = aabb.center();
        let half_extent = aabb.dim() * 0.5;
        let mut max_fraction = 1f32;
        let mut stack = mem::replace(&mut self.stack, Vec::new());
        stack.clear();
        if let Some(entry) = self.node_entry(0, origin, displacement, half_extent) {
            stack.push((0, entry));
        }
        'outer: while let Some((index, entry)) = stack.pop() {
            if entry > max_fraction {
                continue;
            }
            let node = self.nodes[index];
            if node.is_leaf() {
                let (start, end) = node.triangle_range();
                for triangle in start..end {
                    let tri_aabb = mesh.triangle_aabb(triangle);
                    let grown = Aabb3::new(tri_aabb.min + -half_extent, tri_aabb.max + half_extent);
                    if let Some(fraction) = segment_aabb_entry(origin, displacement, &grown) {
                        match visitor(triangle as u32, fraction) {
                            RayVisit::Continue => {}
                            RayVisit::Clip(new_max) => {
                                max_fraction = max_fraction.min(new_max)
                            }
                            RayVisit::Exit => break 'outer,
                        }
                    }
                }
            } else {
                let left = index + 1;
                let right = node.right_or_tri_start as usize;
                let left_entry = self.node_entry(left, origin, displacement, half_extent);
                let right_entry = self.node_entry(right, origin, displacement, half_extent);
                push_ordered(&mut stack, left, left_entry, right, right_entry);
            }
        }
        self.stack = stack;
    }

    fn node_entry(
        &self,
        node: usize,
        origin: Point3<f32>,
        displacement: Vector3<f32>,
        half_extent: Vector3<f32>,
    ) -> Option<f32> {
        let aabb = self.nodes[node].aabb();
        let grown = Aabb3::new(aabb.min + -half_extent, aabb.max + half_extent);
        segment_aabb_entry(origin, displacement, &grown)
    }

    /// Check containment invariants against the mesh; test support.
    #[cfg(test)]
    fn validate(&self, mesh: &TriangleMesh) {
        fn walk(bvh: &MeshBvh, mesh: &TriangleMesh, index: usize, covered: &mut Vec<bool>) {
            let node = &bvh.nodes[index];
            if node.is_leaf() {
                let (start, end) = node.triangle_range();
                assert!(end > start);
                for triangle in start..end {
                    assert!(!covered[triangle], "triangle {} in two leaves", triangle);
                    covered[triangle] = true;
                    assert!(
                        node.aabb().contains(&mesh.triangle_aabb(triangle)),
                        "leaf {} does not contain triangle {}",
                        index,
                        triangle
                    );
                }
            } else {
                let left = index + 1;
                let right = node.right_or_tri_start as usize;
                let child_union = union(
                    &bvh.nodes[left].aabb(),
                    &bvh.nodes[right].aabb(),
                );
                assert!(
                    node.aabb().contains(&child_union) && child_union.contains(&node.aabb()),
                    "internal node {} is not the union of its children",
                    index
                );
                walk(bvh, mesh, left, covered);
                walk(bvh, mesh, right, covered);
            }
        }
        let mut covered = vec![false; mesh.triangles().len()];
        if !self.nodes.is_empty() {
            walk(self, mesh, 0, &mut covered);
        }
        assert!(covered.iter().all(|&c| c), "triangle missing from any leaf");
    }
}

fn union(a: &Aabb3<f32>, b: &Aabb3<f32>) -> Aabb3<f32> {
    use collision::Union;
    a.union(b)
}

fn contains_point(node: &FlatNode, point: Point3<f32>) -> bool {
    point.x >= node.min.x
        && point.x <= node.max.x
        && point.y >= node.min.y
        && point.y <= node.max.y
        && point.z >= node.min.z
        && point.z <= node.max.z
}

fn push_ordered(
    stack: &mut Vec<(usize, f32)>,
    left: usize,
    left_entry: Option<f32>,
    right: usize,
    right_entry: Option<f32>,
) {
    match (left_entry, right_entry) {
        (Some(near), Some(far)) => {
            if near <= far {
                stack.push((right, far));
                stack.push((left, near));
            } else {
                stack.push((left, near));
                stack.push((right, far));
            }
        }
        (Some(entry), None) => stack.push((left, entry)),
        (None, Some(entry)) => stack.push((right, entry)),
        (None, None) => {}
    }
}

fn split_center(center_min: Point3<f32>, center_max: Point3<f32>) -> Option<(usize, f32)> {
    let extent = center_max - center_min;
    let axis = longest_axis(extent);
    if extent[axis] <= 0. {
        return None;
    }
    Some((axis, (center_min[axis] + center_max[axis]) * 0.5))
}

fn split_average(
    data: &BuildData,
    start: usize,
    end: usize,
    bounds: &Aabb3<f32>,
    center_min: Point3<f32>,
    center_max: Point3<f32>,
) -> Option<(usize, f32)> {
    let axis = longest_axis(bounds.dim());
    if center_max[axis] - center_min[axis] <= 0. {
        return None;
    }
    let sum: f32 = (start..end).map(|triangle| data.center[triangle][axis]).sum();
    Some((axis, sum / (end - start) as f32))
}

fn split_sah(
    data: &BuildData,
    start: usize,
    end: usize,
    bounds: &Aabb3<f32>,
    center_min: Point3<f32>,
    center_max: Point3<f32>,
) -> Option<(usize, f32)> {
    let count = end - start;
    let root_area = bounds.surface_area().max(1.0e-20);
    let mut best: Option<(usize, f32)> = None;
    let mut best_cost = ::std::f32::MAX;

    for axis in 0..3 {
        let extent = center_max[axis] - center_min[axis];
        if extent <= 0. {
            // All centers coplanar on this axis; no usable split here.
            continue;
        }
        if count < BIN_COUNT / 4 {
            // Small ranges: sweep every distinct center as a candidate plane.
            let mut candidates: Vec<f32> = (start..end)
                .map(|triangle| data.center[triangle][axis])
                .collect();
            candidates.sort_by(|a, b| {
                a.partial_cmp(b).unwrap_or(::std::cmp::Ordering::Equal)
            });
            candidates.dedup();
            for &position in &candidates[1..] {
                if let Some(cost) =
                    plane_cost(data, start, end, axis, position, root_area)
                {
                    if cost < best_cost {
                        best_cost = cost;
                        best = Some((axis, position));
                    }
                }
            }
        } else {
            // Large ranges: bin, cache right-to-left bounds, sweep left-to-right.
            let mut bin_bounds: Vec<Option<Aabb3<f32>>> = vec![None; BIN_COUNT];
            let mut bin_counts = vec![0usize; BIN_COUNT];
            let scale = BIN_COUNT as f32 / extent;
            for triangle in start..end {
                let offset = (data.center[triangle][axis] - center_min[axis]) * scale;
                let bin = (offset as usize).min(BIN_COUNT - 1);
                bin_counts[bin] += 1;
                let aabb = data.aabb(triangle);
                bin_bounds[bin] = Some(match bin_bounds[bin] {
                    Some(ref existing) => union(existing, &aabb),
                    None => aabb,
                });
            }
            let mut right_bounds: Vec<Option<Aabb3<f32>>> = vec![None; BIN_COUNT];
            let mut right_counts = vec![0usize; BIN_COUNT];
            let mut running: Option<Aabb3<f32>> = None;
            let mut running_count = 0;
            for bin in (1..BIN_COUNT).rev() {
                running = merge(running, &bin_bounds[bin]);
                running_count += bin_counts[bin];
                right_bounds[bin] = running.clone();
                right_counts[bin] = running_count;
            }
            let mut left: Option<Aabb3<f32>> = None;
            let mut left_count = 0;
            for bin in 0..BIN_COUNT - 1 {
                left = merge(left, &bin_bounds[bin]);
                left_count += bin_counts[bin];
                let right_count = right_counts[bin + 1];
                if left_count == 0 || right_count == 0 {
                    continue;
                }
                let cost = TRAVERSAL_COST
                    + TRIANGLE_INTERSECT_COST
                        * (probability(&left, root_area) * left_count as f32
                            + probability(&right_bounds[bin + 1], root_area)
                                * right_count as f32);
                if cost < best_cost {
                    best_cost = cost;
                    let position = center_min[axis] + (bin + 1) as f32 / scale;
                    best = Some((axis, position));
                }
            }
        }
    }
    best
}

/// Cost of splitting `[start, end)` at `position` on `axis`, by direct scan.
fn plane_cost(
    data: &BuildData,
    start: usize,
    end: usize,
    axis: usize,
    position: f32,
    root_area: f32,
) -> Option<f32> {
    let mut left: Option<Aabb3<f32>> = None;
    let mut right: Option<Aabb3<f32>> = None;
    let mut left_count = 0;
    let mut right_count = 0;
    for triangle in start..end {
        let aabb = data.aabb(triangle);
        if data.center[triangle][axis] < position {
            left = merge(left, &Some(aabb));
            left_count += 1;
        } else {
            right = merge(right, &Some(aabb));
            right_count += 1;
        }
    }
    if left_count == 0 || right_count == 0 {
        return None;
    }
    Some(
        TRAVERSAL_COST
            + TRIANGLE_INTERSECT_COST
                * (probability(&left, root_area) * left_count as f32
                    + probability(&right, root_area) * right_count as f32),
    )
}

fn merge(a: Option<Aabb3<f32>>, b: &Option<Aabb3<f32>>) -> Option<Aabb3<f32>> {
    match (a, b) {
        (Some(ref a), &Some(ref b)) => Some(union(a, b)),
        (Some(a), &None) => Some(a),
        (None, &Some(b)) => Some(b),
        (None, &None) => None,
    }
}

fn probability(bounds: &Option<Aabb3<f32>>, root_area: f32) -> f32 {
    match *bounds {
        Some(ref aabb) => aabb.surface_area() / root_area,
        None => 0.,
    }
}

fn longest_axis(extent: Vector3<f32>) -> usize {
    if extent.x >= extent.y && extent.x >= extent.z {
        0
    } else if extent.y >= extent.z {
        1
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh::unit_cube_mesh;

    #[test]
    fn build_keeps_every_triangle_reachable() {
        for &strategy in &[SplitStrategy::Center, SplitStrategy::Average, SplitStrategy::Sah] {
            let mut mesh = unit_cube_mesh();
            let bvh = MeshBvh::build(
                &mut mesh,
                &MeshBvhSettings {
                    strategy,
                    max_leaf_triangles: 2,
                },
            );
            bvh.validate(&mesh);
        }
    }

    #[test]
    fn ray_hits_exactly_the_two_front_triangles() {
        let mut mesh = unit_cube_mesh();
        let mut bvh = MeshBvh::build(
            &mut mesh,
            &MeshBvhSettings {
                strategy: SplitStrategy::Sah,
                max_leaf_triangles: 2,
            },
        );
        let mut hits = Vec::new();
        let visited = bvh.cast_ray(
            &mesh,
            Point3::new(0., 0., -10.),
            Vector3::new(0., 0., 1.),
            20.,
            &mut |triangle, fraction| {
                hits.push((triangle, fraction));
                RayVisit::Clip(fraction)
            },
        );
        // Both -z face triangles share the entry point's leaf; everything
        // beyond the first hit fraction is pruned.
        assert_eq!(hits.len(), 2);
        for &(triangle, fraction) in &hits {
            assert_eq!(mesh.triangles()[triangle as usize].normal.z, -1.);
            assert!((fraction - 9.5 / 20.).abs() < 1.0e-5);
        }
        assert!(visited <= 8, "visited {} nodes", visited);
    }

    #[test]
    fn collide_aabb_finds_touching_triangles() {
        let mut mesh = unit_cube_mesh();
        let mut bvh = MeshBvh::build(&mut mesh, &MeshBvhSettings::default());
        let mut found = Vec::new();
        bvh.collide_aabb(
            &mesh,
            &Aabb3::new(Point3::new(0.4, -0.1, -0.1), Point3::new(0.6, 0.1, 0.1)),
            &mut |triangle| {
                found.push(triangle);
                Visit::Continue
            },
        );
        // Only the +x face triangles touch that box.
        assert_eq!(found.len(), 2);
        for &triangle in &found {
            assert_eq!(mesh.triangles()[triangle as usize].normal.x, 1.);
        }
    }

    #[test]
    fn cast_aabb_reports_entry_fraction() {
        let mut mesh = unit_cube_mesh();
        let mut bvh = MeshBvh::build(&mut mesh, &MeshBvhSettings::default());
        let aabb = Aabb3::new(Point3::new(-0.1, 1.9, -0.1), Point3::new(0.1, 2.1, 0.1));
        let mut best = 1f32;
        bvh.cast_aabb(&mesh, &aabb, Vector3::new(0., -4., 0.), &mut |_, fraction| {
            best = best.min(fraction);
            RayVisit::Continue
        });
        // Box bottom at 1.9 meets the cube top at 0.5 after 1.4 of 4.
        assert!((best - 1.4 / 4.).abs() < 1.0e-5);
    }
}
