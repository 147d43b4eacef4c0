//! Query filtering
//!
//! A [`CollisionFilter`](struct.CollisionFilter.html) narrows what a world
//! query may hit: per object layer and broad phase layer enable bits, a group
//! and mask pair, and an optional per body predicate.

use body::RigidBody;
use layers::{BroadPhaseLayer, LayerMatrix, ObjectLayer};

/// Group/mask test used for body pairs: both directions must pass.
pub fn pair_passes(group_a: u32, mask_a: u32, group_b: u32, mask_b: u32) -> bool {
    (group_a & mask_b) != 0 && (group_b & mask_a) != 0
}

/// Filter for broad phase and world queries.
pub struct CollisionFilter {
    object_layers: Vec<bool>,
    broad_layers: Vec<bool>,
    /// Collision group of the querying object.
    pub group: u32,
    /// Collision mask of the querying object.
    pub mask: u32,
    /// Extra per body test, run last.
    pub predicate: Option<Box<dyn Fn(&RigidBody) -> bool>>,
}

impl CollisionFilter {
    /// A filter that passes every layer, group and mask.
    pub fn all(matrix: &LayerMatrix) -> Self {
        CollisionFilter {
            object_layers: vec![true; matrix.object_layer_count()],
            broad_layers: vec![true; matrix.broad_phase_layer_count()],
            group: !0,
            mask: !0,
            predicate: None,
        }
    }

    /// A filter that passes nothing until layers are enabled.
    pub fn none(matrix: &LayerMatrix) -> Self {
        CollisionFilter {
            object_layers: vec![false; matrix.object_layer_count()],
            broad_layers: vec![false; matrix.broad_phase_layer_count()],
            group: !0,
            mask: !0,
            predicate: None,
        }
    }

    /// Configure the filter the way a body queries: only layers the body's
    /// object layer collides with are enabled, group and mask are copied,
    /// the predicate is cleared.
    pub fn set_from_body(&mut self, matrix: &LayerMatrix, body: &RigidBody) {
        for enabled in &mut self.object_layers {
            *enabled = false;
        }
        for enabled in &mut self.broad_layers {
            *enabled = false;
        }
        for layer in 0..matrix.object_layer_count() as ObjectLayer {
            if matrix.object_layer_collides(body.object_layer, layer) {
                self.enable_object_layer(matrix, layer);
            }
        }
        self.group = body.collision_group;
        self.mask = body.collision_mask;
        self.predicate = None;
    }

    /// Enable an object layer (and the broad phase layer it maps to).
    pub fn enable_object_layer(&mut self, matrix: &LayerMatrix, layer: ObjectLayer) {
        self.object_layers[layer as usize] = true;
        if let Some(broad) = matrix.broad_phase_layer(layer) {
            self.broad_layers[broad as usize] = true;
        }
    }

    /// Disable an object layer.
    ///
    /// Its broad phase layer is disabled only if no other enabled object
    /// layer still maps to it.
    pub fn disable_object_layer(&mut self, matrix: &LayerMatrix, layer: ObjectLayer) {
        self.object_layers[layer as usize] = false;
        if let Some(broad) = matrix.broad_phase_layer(layer) {
            let still_used = (0..matrix.object_layer_count() as ObjectLayer).any(|other| {
                self.object_layers[other as usize]
                    && matrix.broad_phase_layer(other) == Some(broad)
            });
            if !still_used {
                self.broad_layers[broad as usize] = false;
            }
        }
    }

    /// Does the filter pass an object layer?
    pub fn test_object_layer(&self, layer: ObjectLayer) -> bool {
        self.object_layers[layer as usize]
    }

    /// Does the filter pass a broad phase layer?
    pub fn test_broad_phase_layer(&self, layer: BroadPhaseLayer) -> bool {
        self.broad_layers[layer as usize]
    }

    /// Full per body test: layer, group/mask, then predicate.
    pub fn test_body(&self, body: &RigidBody) -> bool {
        if !self.test_object_layer(body.object_layer) {
            return false;
        }
        if !pair_passes(self.group, self.mask, body.collision_group, body.collision_mask) {
            return false;
        }
        match self.predicate {
            Some(ref predicate) => predicate(body),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_mask_requires_both_directions() {
        assert!(pair_passes(0b01, 0b10, 0b10, 0b01));
        assert!(!pair_passes(0b01, 0b10, 0b01, 0b01));
        assert!(!pair_passes(0b01, 0b01, 0b10, 0b10));
    }

    #[test]
    fn disabling_shared_broad_layer_needs_all_object_layers_off() {
        let mut matrix = LayerMatrix::new(3, 2);
        matrix.map_object_layer(0, 0);
        matrix.map_object_layer(1, 1);
        matrix.map_object_layer(2, 1);
        let mut filter = CollisionFilter::none(&matrix);
        filter.enable_object_layer(&matrix, 1);
        filter.enable_object_layer(&matrix, 2);
        assert!(filter.test_broad_phase_layer(1));
        filter.disable_object_layer(&matrix, 1);
        assert!(filter.test_broad_phase_layer(1));
        filter.disable_object_layer(&matrix, 2);
        assert!(!filter.test_broad_phase_layer(1));
    }
}
