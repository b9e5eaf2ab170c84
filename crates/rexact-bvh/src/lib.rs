//! Double-precision AABB tree and the broad-phase traversers built on it.
//!
//! The exact kernel decides topology; this crate only ever needs to answer
//! "which primitives are worth an exact test," so everything here runs in
//! plain `f64` rather than the rational kernel.

mod tree;
mod traverse;

pub use tree::{Aabb, Tree};
pub use traverse::{NearestTriangleTraverse, PointInTetMeshTraverse, PointInTriangleMeshTraverse, Traverser};
