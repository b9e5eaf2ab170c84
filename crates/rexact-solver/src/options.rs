use glam::DVec3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinSolver {
    Ldlt,
    Pcg,
    /// Recognized so option structs round-trip, but selecting it returns
    /// [`crate::error::SolverError::UnsupportedLinSolver`]: a graph-coloured
    /// Gauss-Seidel pass is a prerequisite this crate does not implement.
    Mcgs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Material {
    Arap,
    NeoHookean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    None,
    Low,
    High,
    Debug,
}

/// Every recognized solver option and its default. `timestep_s <= 0`
/// interprets the solve as static (Δt²=1 rather than 0).
#[derive(Debug, Clone, Copy)]
pub struct SolverOptions {
    pub timestep_s: f64,
    pub linsolver: LinSolver,
    pub max_admm_iters: usize,
    pub max_cg_iters: usize,
    pub min_res: f64,
    pub elastic_material: Material,
    pub youngs: f64,
    pub poisson: f64,
    pub density_kgm3: f64,
    pub grav: DVec3,
    pub floor: f64,
    pub collision_thickness: f64,
    pub self_collision: bool,
    pub mult_pk: f64,
    pub mult_ck: f64,
    pub substeps: usize,
    pub max_threads: i32,
    pub log_level: LogLevel,
    pub lattice_subdiv: u32,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            timestep_s: 1.0 / 30.0,
            linsolver: LinSolver::Ldlt,
            max_admm_iters: 20,
            max_cg_iters: 100,
            min_res: 1e-4,
            elastic_material: Material::Arap,
            youngs: 1.0e6,
            poisson: 0.3,
            density_kgm3: 1100.0,
            grav: DVec3::new(0.0, 0.0, -9.8),
            floor: 0.0,
            collision_thickness: 1e-3,
            self_collision: false,
            mult_pk: 1.0,
            mult_ck: 1.0,
            substeps: 1,
            max_threads: -1,
            log_level: LogLevel::Low,
            lattice_subdiv: 4,
        }
    }
}

impl SolverOptions {
    pub fn is_static(&self) -> bool {
        self.timestep_s <= 0.0
    }

    pub fn effective_dt2(&self) -> f64 {
        if self.is_static() {
            1.0
        } else {
            self.timestep_s * self.timestep_s
        }
    }

    pub fn effective_dt(&self) -> f64 {
        self.effective_dt2().sqrt()
    }

    pub fn resolved_threads(&self) -> usize {
        if self.max_threads < 0 {
            std::thread::available_parallelism().map(|n| n.get().saturating_sub(1).max(1)).unwrap_or(1)
        } else {
            self.max_threads.max(1) as usize
        }
    }

    /// Lamé parameters derived from Young's modulus and Poisson's ratio,
    /// shared by both material models.
    pub fn lame(&self) -> (f64, f64) {
        let e = self.youngs;
        let nu = self.poisson;
        let mu = e / (2.0 * (1.0 + nu));
        let lambda = e * nu / ((1.0 + nu) * (1.0 - 2.0 * nu));
        (mu, lambda)
    }

    /// Reset whenever geometry, material, or Poisson's ratio changes: a
    /// solver must be re-initialised, not just re-stepped, after this.
    pub fn requires_reinit_vs(&self, prev: &SolverOptions) -> bool {
        self.elastic_material != prev.elastic_material
            || self.youngs != prev.youngs
            || self.poisson != prev.poisson
            || self.density_kgm3 != prev.density_kgm3
            || self.lattice_subdiv != prev.lattice_subdiv
    }
}
