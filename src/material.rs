//! Physics material
//!
//! Friction and restitution for a body surface, together with the rules for
//! combining the values of two touching surfaces.

/// How two material values are merged into the value used by a contact.
///
/// When the two bodies of a pair request different modes, the more dominant
/// mode wins: `Max > Min > GeometricMean > Multiply > Average`. The combined
/// *value* is symmetric in the two inputs for every mode; only the mode
/// selection uses the dominance order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CombineMode {
    /// Arithmetic mean of the two values.
    Average,
    /// Product of the two values.
    Multiply,
    /// Square root of the product.
    GeometricMean,
    /// Smaller of the two values.
    Min,
    /// Larger of the two values.
    Max,
}

impl CombineMode {
    fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            CombineMode::Average => (a + b) * 0.5,
            CombineMode::Multiply => a * b,
            CombineMode::GeometricMean => (a * b).sqrt(),
            CombineMode::Min => a.min(b),
            CombineMode::Max => a.max(b),
        }
    }
}

/// Combine two material values using the dominant of the two modes.
pub fn combine(a: f32, mode_a: CombineMode, b: f32, mode_b: CombineMode) -> f32 {
    mode_a.max(mode_b).apply(a, b)
}

/// Physics material
///
/// Used to describe the surface properties of physical bodies. The default
/// material has friction 0.5 and restitution 0, combining friction by
/// geometric mean and restitution by max.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Material {
    friction: f32,
    restitution: f32,
    combine_friction: CombineMode,
    combine_restitution: CombineMode,
}

impl Default for Material {
    fn default() -> Self {
        Material::new(0.5, 0.)
    }
}

impl Material {
    /// Rock
    pub const ROCK: Material = Material {
        friction: 0.8,
        restitution: 0.1,
        combine_friction: CombineMode::GeometricMean,
        combine_restitution: CombineMode::Max,
    };
    /// Wood
    pub const WOOD: Material = Material {
        friction: 0.5,
        restitution: 0.2,
        combine_friction: CombineMode::GeometricMean,
        combine_restitution: CombineMode::Max,
    };
    /// Metal
    pub const METAL: Material = Material {
        friction: 0.3,
        restitution: 0.05,
        combine_friction: CombineMode::GeometricMean,
        combine_restitution: CombineMode::Max,
    };
    /// Ice
    pub const ICE: Material = Material {
        friction: 0.02,
        restitution: 0.05,
        combine_friction: CombineMode::Min,
        combine_restitution: CombineMode::Max,
    };
    /// Bouncy ball
    pub const BOUNCY_BALL: Material = Material {
        friction: 0.5,
        restitution: 0.8,
        combine_friction: CombineMode::GeometricMean,
        combine_restitution: CombineMode::Max,
    };

    /// Create new material
    pub fn new(friction: f32, restitution: f32) -> Self {
        Self {
            friction,
            restitution,
            combine_friction: CombineMode::GeometricMean,
            combine_restitution: CombineMode::Max,
        }
    }

    /// Override the friction combine mode
    pub fn with_combine_friction(mut self, mode: CombineMode) -> Self {
        self.combine_friction = mode;
        self
    }

    /// Override the restitution combine mode
    pub fn with_combine_restitution(mut self, mode: CombineMode) -> Self {
        self.combine_restitution = mode;
        self
    }

    /// Get friction
    pub fn friction(&self) -> f32 {
        self.friction
    }

    /// Get restitution
    pub fn restitution(&self) -> f32 {
        self.restitution
    }

    /// Combined friction of two touching materials
    pub fn combine_friction(&self, other: &Material) -> f32 {
        combine(
            self.friction,
            self.combine_friction,
            other.friction,
            other.combine_friction,
        )
    }

    /// Combined restitution of two touching materials
    pub fn combine_restitution(&self, other: &Material) -> f32 {
        combine(
            self.restitution,
            self.combine_restitution,
            other.restitution,
            other.combine_restitution,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODES: [CombineMode; 5] = [
        CombineMode::Average,
        CombineMode::Multiply,
        CombineMode::GeometricMean,
        CombineMode::Min,
        CombineMode::Max,
    ];

    #[test]
    fn combine_is_symmetric_for_all_mode_pairs() {
        let values = [0., 0.25, 0.5, 1.];
        for &ma in &MODES {
            for &mb in &MODES {
                for &a in &values {
                    for &b in &values {
                        assert_eq!(combine(a, ma, b, mb), combine(b, mb, a, ma));
                    }
                }
            }
        }
    }

    #[test]
    fn dominant_mode_wins() {
        // Max beats everything, Average loses to everything.
        assert_eq!(combine(0.2, CombineMode::Max, 0.8, CombineMode::Average), 0.8);
        assert_eq!(combine(0.2, CombineMode::Min, 0.8, CombineMode::Multiply), 0.2);
        assert_eq!(
            combine(0.5, CombineMode::Average, 0.25, CombineMode::Average),
            0.375
        );
    }
}
