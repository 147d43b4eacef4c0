//! Error types surfaced at world configuration time.
//!
//! Everything that can go wrong *during* a step is recovered locally with a
//! documented fallback; only configuration mistakes surface as errors, and
//! they surface eagerly when the offending object is created.

/// Programmer-fault configuration errors.
///
/// These are raised when bodies, meshes or dispatch tables are set up, never
/// from inside [`World::step`](../struct.World.html#method.step).
#[derive(Debug, Fail, PartialEq)]
pub enum ConfigurationError {
    /// An object layer was used that has no broad phase layer mapping.
    #[fail(
        display = "object layer {} has no broad phase layer mapping",
        _0
    )]
    UnmappedObjectLayer(u32),

    /// A shape pair has no registered collide function.
    #[fail(
        display = "no collide function registered for shape types {} vs {}",
        _0, _1
    )]
    MissingCollideFunction(usize, usize),

    /// A convex hull had fewer than four non-coplanar points.
    #[fail(display = "degenerate convex hull: {} usable points", _0)]
    DegenerateConvexHull(usize),

    /// A triangle mesh had inconsistent winding.
    #[fail(display = "inverted triangle mesh: triangle {}", _0)]
    InvertedTriangleMesh(usize),

    /// A mesh build was requested with no usable triangles.
    #[fail(display = "triangle mesh has no non-degenerate triangles")]
    EmptyTriangleMesh,
}
