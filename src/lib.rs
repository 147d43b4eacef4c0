//! # Impetus physics library
//!
//! A 3D rigid body physics engine.
//! Uses [`cgmath`](https://github.com/brendanzab/cgmath/) for all computation
//! and [`collision`](https://github.com/rustgd/collision-rs) for bounding
//! volumes.
//!
//! Features:
//!
//! * Layered broad phase over per-layer dynamic bounding volume trees, with
//!   AABB, point, ray and swept AABB queries.
//! * Static surface-area-heuristic BVH over indexed triangle meshes, with
//!   vertex deduplication and active edge classification at build time.
//! * Narrow phase over a pairwise collide dispatch table with automatically
//!   installed reversed wrappers; manifolds reduced to at most four points.
//! * Sequential impulse solver: warm starting, soft (spring) constraints,
//!   limits, motors and friction, velocity then position iterations, island
//!   based sleeping.
//! * Hinge, slider, distance, point, fixed, swing twist, cone and six
//!   degree of freedom constraints composed from shared constraint parts.
//! * Single threaded and deterministic: identical inputs and creation order
//!   produce identical steps.

#![deny(
    missing_docs, trivial_casts, unsafe_code, unstable_features, unused_import_braces,
    unused_qualifications
)]
#![allow(unknown_lints, type_complexity, too_many_arguments)]

extern crate cgmath;
extern crate collision;

#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

#[cfg(feature = "serde")]
#[macro_use]
extern crate serde;

#[cfg(test)]
#[macro_use]
extern crate approx;

pub use body::{BodyDesc, BodyId, BodyPool, MotionProperties, MotionType, RigidBody};
pub use broad::dbvh::{DynamicBvh, RayVisit, Visit};
pub use broad::BroadPhase;
pub use constraint::part::{
    AxisConstraintPart, DualAxisConstraintPart, RotationEulerConstraintPart, SpringMode,
    SpringSettings,
};
pub use constraint::{
    AxisMode, ConeSettings, Constraint, ConstraintBase, ConstraintId, ConstraintSet,
    ConstraintType, DistanceSettings, FixedSettings, HingeSettings, MotorMode, PointSettings,
    SixDofSettings, SliderSettings, SwingTwistSettings,
};
pub use error::ConfigurationError;
pub use events::{ContactListener, ValidateResult};
pub use filter::CollisionFilter;
pub use layers::{BroadPhaseLayer, LayerMatrix, ObjectLayer};
pub use material::{combine, CombineMode, Material};
pub use mesh::bvh::{MeshBvh, MeshBvhSettings, SplitStrategy};
pub use mesh::{MeshSettings, Triangle, TriangleMesh};
pub use narrow::manifold::{ContactManifold, ManifoldPoint};
pub use narrow::{
    CollideFn, CollideSettings, CollideShapeTable, ContactHit, MassProperties, Shape, ShapeType,
};
pub use pose::BodyPose;
pub use settings::WorldSettings;
pub use world::{ConstraintDesc, RayHit, World};

pub mod body;
pub mod broad;
pub mod constraint;
pub mod error;
pub mod events;
pub mod filter;
pub mod layers;
pub mod material;
pub mod mesh;
pub mod narrow;
pub mod pose;
pub mod settings;
pub mod solver;
pub mod world;

mod util;
