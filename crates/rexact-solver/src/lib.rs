//! The ADMM elastic solver: embedded-lattice construction, collision
//! detection, per-element local steps, and the global linear solve tying
//! them together into one simulation step.

mod collision;
mod elastic;
mod error;
mod mesh;
mod options;
mod solver;

pub use collision::{Collision, Contact, ObstacleGrid};
pub use elastic::Element;
pub use error::{CreateError, RuntimeWarning, SolverError, StepError};
pub use mesh::{EmbeddedMesh, FacetEmbedding};
pub use options::{LinSolver, LogLevel, Material, SolverOptions};
pub use solver::Solver;
