//! Global settings for the physics world

use cgmath::Vector3;

/// Tunable parameters for the physics world.
///
/// The defaults are sensible for worlds measured in meters with masses in
/// kilograms, stepped at 60 Hz.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct WorldSettings {
    /// World gravity applied to dynamic bodies every step.
    pub gravity: Vector3<f32>,
    /// Bodies closer than this generate speculative contacts, so fast movers
    /// land instead of tunnelling.
    pub speculative_contact_distance: f32,
    /// Separation tolerance when matching narrow phase hits into a manifold.
    pub manifold_tolerance: f32,
    /// Squared world-space distance under which a new contact point inherits
    /// the cached impulses of last step's nearest point.
    pub contact_point_preserve_lambda_max_dist_sq: f32,
    /// Suppress triangle mesh contacts on inactive (smooth interior) edges.
    pub collide_only_with_active_edges: bool,
    /// Reduce narrow phase hits to at most four points per manifold.
    pub use_manifold_reduction: bool,
    /// Cosine of the maximum angle between hit normals grouped into one
    /// manifold.
    pub normal_cos_max_delta_rotation: f32,
    /// Velocity solver passes per island per step.
    pub velocity_iterations: u32,
    /// Position solver passes per island per step.
    pub position_iterations: u32,
    /// Seed the solver with impulses cached from the previous step.
    pub warm_starting: bool,
    /// Penetration depth the position solver leaves uncorrected.
    pub penetration_slop: f32,
    /// Fraction of position error corrected per position iteration.
    pub baumgarte_factor: f32,
    /// Scale applied to cached impulses when warm starting.
    pub warm_start_impulse_ratio: f32,
    /// Largest penetration the position solver corrects in one pass.
    pub max_penetration_distance: f32,
    /// Relative normal velocity below this does not bounce.
    pub min_velocity_for_restitution: f32,
    /// Whether islands are allowed to fall asleep at all.
    pub allow_sleeping: bool,
    /// Seconds an island must stay under the sleep threshold before sleeping.
    pub time_before_sleep: f32,
    /// Maximum probe point velocity for a body to count as resting.
    pub point_velocity_sleep_threshold: f32,
    /// Motion (relative to body size) above which a cast is used instead of
    /// discrete detection.
    pub linear_cast_threshold: f32,
    /// Penetration allowed before a linear cast backs the body up.
    pub linear_cast_max_penetration: f32,
    /// Broad phase fat AABB margin.
    pub expansion_margin: f32,
    /// Fraction of a moving body's displacement added to its fat AABB, so the
    /// tree is not touched again next step.
    pub velocity_prediction: f32,
}

impl Default for WorldSettings {
    fn default() -> Self {
        WorldSettings {
            gravity: Vector3::new(0., -9.81, 0.),
            speculative_contact_distance: 0.02,
            manifold_tolerance: 1.0e-3,
            contact_point_preserve_lambda_max_dist_sq: 1.0e-4,
            collide_only_with_active_edges: true,
            use_manifold_reduction: true,
            normal_cos_max_delta_rotation: 0.996_194_7, // cos 5 degrees
            velocity_iterations: 10,
            position_iterations: 2,
            warm_starting: true,
            penetration_slop: 0.02,
            baumgarte_factor: 0.2,
            warm_start_impulse_ratio: 1.0,
            max_penetration_distance: 0.2,
            min_velocity_for_restitution: 1.0,
            allow_sleeping: true,
            time_before_sleep: 0.5,
            point_velocity_sleep_threshold: 0.03,
            linear_cast_threshold: 0.05,
            linear_cast_max_penetration: 0.25,
            expansion_margin: 0.05,
            velocity_prediction: 0.1,
        }
    }
}

impl WorldSettings {
    /// Override gravity
    pub fn with_gravity(mut self, gravity: Vector3<f32>) -> Self {
        self.gravity = gravity;
        self
    }

    /// Override solver iteration counts
    pub fn with_iterations(mut self, velocity: u32, position: u32) -> Self {
        self.velocity_iterations = velocity;
        self.position_iterations = position;
        self
    }

    /// Disable sleeping entirely
    pub fn without_sleeping(mut self) -> Self {
        self.allow_sleeping = false;
        self
    }
}
