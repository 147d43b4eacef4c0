//! Collision layers
//!
//! Bodies live on an *object layer*; every object layer maps to a *broad
//! phase layer*, and each broad phase layer owns one tree in the broad phase.
//! The layer matrix stores which object layers may collide, and the derived
//! object-vs-broad-phase and broad-phase-vs-broad-phase tables the broad
//! phase queries against.

/// Identifies an object layer. Bodies carry one of these.
pub type ObjectLayer = u32;

/// Identifies a broad phase layer, and with it one broad phase tree.
pub type BroadPhaseLayer = u32;

/// Marker for "no broad phase layer assigned".
pub const INVALID_BROAD_PHASE_LAYER: i32 = -1;

fn set_bit(bits: &mut [u32], index: usize) {
    bits[index / 32] |= 1 << (index % 32);
}

fn test_bit(bits: &[u32], index: usize) -> bool {
    bits[index / 32] & (1 << (index % 32)) != 0
}

fn words(bits: usize) -> usize {
    (bits + 31) / 32
}

/// Which layers collide with which.
///
/// All three tables are append-only: enabling a collision never clears a
/// previously set bit.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LayerMatrix {
    object_count: usize,
    broad_count: usize,
    object_to_broad: Vec<i32>,
    object_pairs: Vec<u32>,
    broad_pairs: Vec<u32>,
    object_vs_broad: Vec<u32>,
}

impl LayerMatrix {
    /// Create a matrix for the given number of object and broad phase layers.
    /// No layers are mapped and no collisions are enabled.
    pub fn new(object_count: usize, broad_count: usize) -> Self {
        LayerMatrix {
            object_count,
            broad_count,
            object_to_broad: vec![INVALID_BROAD_PHASE_LAYER; object_count],
            object_pairs: vec![0; words(object_count * object_count)],
            broad_pairs: vec![0; words(broad_count * broad_count)],
            object_vs_broad: vec![0; words(object_count * broad_count)],
        }
    }

    /// Number of object layers.
    pub fn object_layer_count(&self) -> usize {
        self.object_count
    }

    /// Number of broad phase layers.
    pub fn broad_phase_layer_count(&self) -> usize {
        self.broad_count
    }

    /// Assign an object layer to a broad phase layer.
    ///
    /// Collisions enabled before the mapping existed are propagated into the
    /// derived tables here, so mapping and enabling may happen in any order.
    pub fn map_object_layer(&mut self, object: ObjectLayer, broad: BroadPhaseLayer) {
        self.object_to_broad[object as usize] = broad as i32;
        for other in 0..self.object_count as u32 {
            if self.object_layer_collides(object, other) {
                self.propagate(object, other);
            }
        }
    }

    /// Broad phase layer an object layer maps to, if any.
    pub fn broad_phase_layer(&self, object: ObjectLayer) -> Option<BroadPhaseLayer> {
        match self.object_to_broad[object as usize] {
            INVALID_BROAD_PHASE_LAYER => None,
            mapped => Some(mapped as BroadPhaseLayer),
        }
    }

    /// Enable collision between two object layers (symmetric).
    pub fn enable_collision(&mut self, a: ObjectLayer, b: ObjectLayer) {
        let n = self.object_count;
        set_bit(&mut self.object_pairs, a as usize * n + b as usize);
        set_bit(&mut self.object_pairs, b as usize * n + a as usize);
        self.propagate(a, b);
    }

    fn propagate(&mut self, a: ObjectLayer, b: ObjectLayer) {
        let broad_a = self.object_to_broad[a as usize];
        let broad_b = self.object_to_broad[b as usize];
        if broad_b != INVALID_BROAD_PHASE_LAYER {
            set_bit(
                &mut self.object_vs_broad,
                a as usize * self.broad_count + broad_b as usize,
            );
        }
        if broad_a != INVALID_BROAD_PHASE_LAYER {
            set_bit(
                &mut self.object_vs_broad,
                b as usize * self.broad_count + broad_a as usize,
            );
        }
        if broad_a != INVALID_BROAD_PHASE_LAYER && broad_b != INVALID_BROAD_PHASE_LAYER {
            let n = self.broad_count;
            set_bit(&mut self.broad_pairs, broad_a as usize * n + broad_b as usize);
            set_bit(&mut self.broad_pairs, broad_b as usize * n + broad_a as usize);
        }
    }

    /// Do two object layers collide?
    pub fn object_layer_collides(&self, a: ObjectLayer, b: ObjectLayer) -> bool {
        test_bit(&self.object_pairs, a as usize * self.object_count + b as usize)
    }

    /// May an object layer produce pairs against a broad phase layer?
    pub fn object_vs_broad_phase(&self, object: ObjectLayer, broad: BroadPhaseLayer) -> bool {
        test_bit(
            &self.object_vs_broad,
            object as usize * self.broad_count + broad as usize,
        )
    }

    /// Do two broad phase layers contain any colliding object layers?
    pub fn broad_phase_collides(&self, a: BroadPhaseLayer, b: BroadPhaseLayer) -> bool {
        test_bit(&self.broad_pairs, a as usize * self.broad_count + b as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enable_collision_is_symmetric() {
        let mut matrix = LayerMatrix::new(4, 2);
        matrix.map_object_layer(0, 0);
        matrix.map_object_layer(1, 1);
        matrix.enable_collision(0, 1);
        assert!(matrix.object_layer_collides(0, 1));
        assert!(matrix.object_layer_collides(1, 0));
        assert!(!matrix.object_layer_collides(0, 0));
    }

    #[test]
    fn propagates_to_broad_phase_tables() {
        let mut matrix = LayerMatrix::new(3, 2);
        matrix.map_object_layer(0, 0);
        matrix.map_object_layer(1, 1);
        matrix.map_object_layer(2, 1);
        matrix.enable_collision(0, 1);
        assert!(matrix.object_vs_broad_phase(0, 1));
        assert!(matrix.object_vs_broad_phase(1, 0));
        assert!(!matrix.object_vs_broad_phase(2, 0));
        assert!(matrix.broad_phase_collides(0, 1));
        assert!(matrix.broad_phase_collides(1, 0));
        assert!(!matrix.broad_phase_collides(0, 0));
    }

    #[test]
    fn mapping_after_enabling_back_fills() {
        let mut matrix = LayerMatrix::new(2, 2);
        matrix.enable_collision(0, 1);
        assert!(!matrix.object_vs_broad_phase(0, 1));
        matrix.map_object_layer(0, 0);
        matrix.map_object_layer(1, 1);
        assert!(matrix.object_vs_broad_phase(0, 1));
        assert!(matrix.broad_phase_collides(0, 1));
    }
}
