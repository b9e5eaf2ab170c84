use thiserror::Error;

use crate::options::LinSolver;

/// Fatal failures raised while constructing an [`crate::mesh::EmbeddedMesh`]
/// or a [`crate::solver::Solver`]. These abort construction and report a
/// string; there is no partially-built state to roll back to.
#[derive(Debug, Error)]
pub enum CreateError {
    #[error("mesh has no facet vertices or faces")]
    EmptyMesh,
    #[error("a facet vertex could not be embedded in the lattice, or its barycentric coordinates exceeded |b| <= 1+eps")]
    FacetVertexNotEmbedded,
    #[error("a rest tetrahedron has zero or negative volume")]
    InvertedRestTet,
}

#[derive(Debug, Error)]
pub enum SolverError {
    #[error(transparent)]
    Create(#[from] CreateError),
    #[error("linear solver {0:?} is not implemented")]
    UnsupportedLinSolver(LinSolver),
}

/// Per-step failures. The caller keeps the simulator in the state from
/// before the failed step (`x`/`v` rolled back to `x_start`), and may retry
/// or continue with adjusted options.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("local-step prox produced a non-finite value")]
    ProxDiverged,
    #[error("global linear solve failed to produce a finite result")]
    LinearSolveFailed,
}

/// Non-fatal conditions surfaced to the caller without aborting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeWarning {
    /// A lattice vertex touched no tet with positive rest volume; its mass
    /// was set to 1 rather than 0 to keep the system non-singular.
    IsolatedLatticeVertex,
}
