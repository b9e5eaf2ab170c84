//! Global ADMM step and orchestration (C11 global solve + C12).

use glam::DVec3;
use nalgebra::DVector;
use nalgebra_sparse::factorization::CscCholesky;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::collision::{self, Collision, ConstraintRow, ObstacleGrid};
use crate::elastic::Element;
use crate::error::{SolverError, StepError};
use crate::mesh::EmbeddedMesh;
use crate::options::{LinSolver, SolverOptions};

/// The ADMM elastic solver bound to one embedded mesh. `x`/`v` are lattice
/// degrees of freedom; facet vertices are read back out through the mesh's
/// barycentric embedding.
pub struct Solver {
    mesh: EmbeddedMesh,
    elements: Vec<Element>,
    options: SolverOptions,
    x: Vec<DVec3>,
    v: Vec<DVec3>,
    obstacle: ObstacleGrid,
    a_static: CscMatrix<f64>,
    diag_max: f64,
    pin_chol: Option<CscCholesky<f64>>,
    pk_prev: f64,
    pin_snapshot: Vec<(Vec<(usize, f64)>, f64)>,
}

impl Solver {
    pub fn init(facet_verts: Vec<DVec3>, facet_faces: Vec<[u32; 3]>, options: SolverOptions) -> Result<Self, SolverError> {
        if options.linsolver == LinSolver::Mcgs {
            return Err(SolverError::UnsupportedLinSolver(options.linsolver));
        }
        let mut mesh = EmbeddedMesh::create(facet_verts, facet_faces, options.lattice_subdiv).map_err(SolverError::Create)?;
        let x = mesh.lattice_rest.clone();
        if let Some(w) = mesh.compute_masses(&x, options.density_kgm3) {
            warn!(?w, "embedded mesh has a runtime warning after mass computation");
        }
        let v = vec![DVec3::ZERO; x.len()];

        let (mu, lambda) = options.lame();
        let stiffness_k = mu.max(1e-12);
        let mut elements = Vec::with_capacity(mesh.tets.len());
        for &tet in &mesh.tets {
            let mut el = Element::create(tet, &mesh.lattice_rest, stiffness_k)?;
            el.material = options.elastic_material;
            elements.push(el);
        }

        let dt2 = Self::sub_dt2(&options);
        let a_static = assemble_static(&mesh, &elements, dt2);
        let diag_max = max_diag(&a_static);

        Ok(Self {
            mesh,
            elements,
            options,
            x,
            v,
            obstacle: ObstacleGrid::empty(),
            a_static,
            diag_max,
            pin_chol: None,
            pk_prev: f64::NAN,
            pin_snapshot: Vec::new(),
        })
    }

    fn sub_dt2(options: &SolverOptions) -> f64 {
        if options.is_static() {
            1.0
        } else {
            let dt_sub = options.timestep_s / options.substeps.max(1) as f64;
            dt_sub * dt_sub
        }
    }

    pub fn set_options(&mut self, options: SolverOptions) -> Result<(), SolverError> {
        if options.linsolver == LinSolver::Mcgs {
            return Err(SolverError::UnsupportedLinSolver(options.linsolver));
        }
        let needs_reinit = options.requires_reinit_vs(&self.options)
            || options.substeps != self.options.substeps
            || options.timestep_s != self.options.timestep_s;
        self.options = options;
        if needs_reinit {
            let facet_verts = self.mesh.facet_verts.clone();
            let facet_faces = self.mesh.facet_faces.clone();
            let rebuilt = Solver::init(facet_verts, facet_faces, self.options)?;
            *self = rebuilt;
        }
        Ok(())
    }

    pub fn set_obstacles(&mut self, vlist_t0: Vec<DVec3>, vlist_t1: Vec<DVec3>, faces: Vec<[u32; 3]>) {
        self.obstacle.set_obstacles(vlist_t0, vlist_t1, faces);
    }

    pub fn set_pin(&mut self, facet_vertex: u32, pos: DVec3, stiffness: DVec3) {
        self.mesh.set_pin(facet_vertex, pos, stiffness);
    }

    pub fn clear_pins(&mut self) {
        self.mesh.clear_pins();
    }

    pub fn mapped_facet_vertices(&self) -> Vec<DVec3> {
        (0..self.mesh.facet_verts.len()).map(|i| self.mesh.get_mapped_facet_vertex(&self.x, i)).collect()
    }

    /// Advances the simulation by `options.timestep_s`, running
    /// `options.substeps` ADMM solves of `timestep_s/substeps` each.
    pub fn step(&mut self) -> Result<(), StepError> {
        for _ in 0..self.options.substeps.max(1) {
            self.substep()?;
        }
        Ok(())
    }

    fn substep(&mut self) -> Result<(), StepError> {
        let static_solve = self.options.is_static();
        let dt = if static_solve { 0.0 } else { self.options.timestep_s / self.options.substeps.max(1) as f64 };
        let dt2 = Self::sub_dt2(&self.options);

        let x0 = self.x.clone();
        if !static_solve {
            for vi in self.v.iter_mut() {
                *vi += self.options.grav * dt;
            }
        }
        let mut x_bar = self.x.clone();
        if !static_solve {
            for (xb, &vi) in x_bar.iter_mut().zip(self.v.iter()) {
                *xb += vi * dt;
            }
        }
        let mut x = x_bar.clone();
        let mut x_prev = x.clone();

        for el in self.elements.iter_mut() {
            el.reset_duals();
        }

        let rhs_const = mass_scaled(&self.mesh.masses, &x_bar, 1.0 / dt2);

        let pk = self.options.mult_pk * self.diag_max;
        let ck = self.options.mult_ck * self.diag_max;
        let (mu, lambda) = self.options.lame();

        let pin_rows = self.mesh.linearize_pins().rows.into_iter().map(|r| ConstraintRow { cols: r.cols, rhs: r.rhs }).collect::<Vec<_>>();
        self.refresh_pin_factor(pk, &pin_rows);

        let mut converged = false;
        for _iter in 0..self.options.max_admm_iters.max(1) {
            let ok = self
                .elements
                .par_iter_mut()
                .map(|el| el.local_step(&x, mu, lambda, el.weight * el.weight))
                .reduce(|| true, |a, b| a && b);
            if !ok {
                debug!("local-step prox produced a non-finite value, rolling back");
                self.x = x0;
                return Err(StepError::ProxDiverged);
            }

            let contacts = collision::detect_contacts(&self.mesh, &x, self.options.floor, &self.obstacle, self.options.self_collision, self.options.resolved_threads());
            let (collision_rows, _graph) = collision::linearize_contacts(&self.mesh, &contacts, self.options.collision_thickness);

            let rhs = build_rhs(&rhs_const, &self.elements, pk, &pin_rows, ck, &collision_rows);

            let solved = if !collision_rows.is_empty() {
                self.solve_with_collisions(pk, &pin_rows, ck, &collision_rows, &rhs)
            } else {
                self.solve_pin_only(&rhs)
            };
            let solved = match solved {
                Some(s) => s,
                None => {
                    self.x = x0;
                    return Err(StepError::LinearSolveFailed);
                }
            };
            if !solved.iter().all(|v| v.is_finite()) {
                self.x = x0;
                return Err(StepError::LinearSolveFailed);
            }
            x = unflatten(&solved);

            let mut dz2 = 0.0;
            let mut dprev2 = 0.0;
            for el in &self.elements {
                let f = el.deformation_gradient(&x);
                dz2 += (f - el.z).norm_squared();
                let f_prev = el.deformation_gradient(&x_prev);
                dprev2 += (f - f_prev).norm_squared();
            }
            x_prev = x.clone();
            if dz2.sqrt() + dprev2.sqrt() < self.options.min_res {
                converged = true;
                break;
            }
        }
        if !converged {
            debug!("ADMM step reached max_admm_iters without converging");
        }

        self.x = x;
        if !static_solve {
            for ((vi, &xi), &x0i) in self.v.iter_mut().zip(self.x.iter()).zip(x0.iter()) {
                *vi = (xi - x0i) / dt;
            }
        }
        Ok(())
    }

    fn refresh_pin_factor(&mut self, pk: f64, pin_rows: &[ConstraintRow]) {
        let snapshot: Vec<(Vec<(usize, f64)>, f64)> = pin_rows.iter().map(|r| (r.cols.clone(), r.rhs)).collect();
        let pk_changed = !self.pk_prev.is_finite() || (pk - self.pk_prev).abs() > 1e-8;
        if !pk_changed && snapshot == self.pin_snapshot && self.pin_chol.is_some() {
            return;
        }
        let mut coo = CooMatrix::from(&self.a_static);
        add_outer_products(&mut coo, pin_rows, pk);
        let csc = CscMatrix::from(&coo);
        self.pin_chol = CscCholesky::factor(&csc).ok();
        self.pk_prev = pk;
        self.pin_snapshot = snapshot;
    }

    fn solve_pin_only(&self, rhs: &DVector<f64>) -> Option<DVector<f64>> {
        match self.options.linsolver {
            LinSolver::Ldlt => self.pin_chol.as_ref().map(|c| c.solve(rhs)),
            LinSolver::Pcg => pcg(&self.a_static, &[], 0.0, &[], 0.0, rhs, self.pin_chol.as_ref(), self.options.max_cg_iters, self.options.min_res),
            LinSolver::Mcgs => None,
        }
    }

    fn solve_with_collisions(&self, pk: f64, pin_rows: &[ConstraintRow], ck: f64, collision_rows: &[ConstraintRow], rhs: &DVector<f64>) -> Option<DVector<f64>> {
        match self.options.linsolver {
            LinSolver::Ldlt => {
                let mut coo = CooMatrix::from(&self.a_static);
                add_outer_products(&mut coo, pin_rows, pk);
                add_outer_products(&mut coo, collision_rows, ck);
                let csc = CscMatrix::from(&coo);
                CscCholesky::factor(&csc).ok().map(|c| c.solve(rhs))
            }
            LinSolver::Pcg => pcg(&self.a_static, pin_rows, pk, collision_rows, ck, rhs, self.pin_chol.as_ref(), self.options.max_cg_iters, self.options.min_res),
            LinSolver::Mcgs => None,
        }
    }
}

fn mass_scaled(masses: &[f64], x: &[DVec3], inv_dt2: f64) -> DVector<f64> {
    let mut v = DVector::zeros(masses.len() * 3);
    for (i, (&m, &p)) in masses.iter().zip(x.iter()).enumerate() {
        let s = m * inv_dt2;
        v[3 * i] = s * p.x;
        v[3 * i + 1] = s * p.y;
        v[3 * i + 2] = s * p.z;
    }
    v
}

fn assemble_static(mesh: &EmbeddedMesh, elements: &[Element], dt2: f64) -> CscMatrix<f64> {
    let n = mesh.lattice_rest.len() * 3;
    let mut coo = CooMatrix::new(n, n);
    for (i, &m) in mesh.masses.iter().enumerate() {
        let s = m / dt2;
        for a in 0..3 {
            coo.push(3 * i + a, 3 * i + a, s);
        }
    }
    for el in elements {
        let d = el.d_matrix();
        let w2 = el.weight * el.weight;
        for p in 0..4 {
            for q in 0..4 {
                let mut coeff = 0.0;
                for k in 0..3 {
                    coeff += d[(k, p)] * d[(k, q)];
                }
                coeff *= w2;
                if coeff == 0.0 {
                    continue;
                }
                for a in 0..3 {
                    coo.push(3 * el.tet[p] as usize + a, 3 * el.tet[q] as usize + a, coeff);
                }
            }
        }
    }
    CscMatrix::from(&coo)
}

fn max_diag(a: &CscMatrix<f64>) -> f64 {
    let n = a.nrows();
    let mut m = 0.0f64;
    for i in 0..n {
        if let Some(v) = a.get_entry(i, i) {
            m = m.max(v.into_value().abs());
        }
    }
    m.max(1e-12)
}

fn add_outer_products(coo: &mut CooMatrix<f64>, rows: &[ConstraintRow], scale: f64) {
    if scale == 0.0 {
        return;
    }
    for row in rows {
        for &(ci, vi) in &row.cols {
            for &(cj, vj) in &row.cols {
                coo.push(ci, cj, scale * vi * vj);
            }
        }
    }
}

fn build_rhs(rhs_const: &DVector<f64>, elements: &[Element], pk: f64, pin_rows: &[ConstraintRow], ck: f64, collision_rows: &[ConstraintRow]) -> DVector<f64> {
    let mut rhs = rhs_const.clone();
    for el in elements {
        let contrib = el.rhs_contribution();
        for j in 0..4 {
            let col = el.tet[j] as usize;
            for a in 0..3 {
                rhs[3 * col + a] += contrib[(a, j)];
            }
        }
    }
    for row in pin_rows {
        for &(c, v) in &row.cols {
            rhs[c] += pk * v * row.rhs;
        }
    }
    for row in collision_rows {
        for &(c, v) in &row.cols {
            rhs[c] += ck * v * row.rhs;
        }
    }
    rhs
}

fn unflatten(v: &DVector<f64>) -> Vec<DVec3> {
    (0..v.len() / 3).map(|i| DVec3::new(v[3 * i], v[3 * i + 1], v[3 * i + 2])).collect()
}

/// Matrix-free `y = (A + pk·PᵀP + ck·CᵀC)·x`.
fn matvec(a: &CscMatrix<f64>, pin_rows: &[ConstraintRow], pk: f64, collision_rows: &[ConstraintRow], ck: f64, x: &DVector<f64>) -> DVector<f64> {
    let mut y = a * x;
    for row in pin_rows {
        let dot: f64 = row.cols.iter().map(|&(c, v)| v * x[c]).sum();
        for &(c, v) in &row.cols {
            y[c] += pk * v * dot;
        }
    }
    for row in collision_rows {
        let dot: f64 = row.cols.iter().map(|&(c, v)| v * x[c]).sum();
        for &(c, v) in &row.cols {
            y[c] += ck * v * dot;
        }
    }
    y
}

/// Preconditioned conjugate gradient with an L∞ residual tolerance,
/// preconditioned by the pin-only Cholesky factor when available (falling
/// back to an unpreconditioned run otherwise).
#[allow(clippy::too_many_arguments)]
fn pcg(
    a: &CscMatrix<f64>,
    pin_rows: &[ConstraintRow],
    pk: f64,
    collision_rows: &[ConstraintRow],
    ck: f64,
    rhs: &DVector<f64>,
    preconditioner: Option<&CscCholesky<f64>>,
    max_iters: usize,
    tol: f64,
) -> Option<DVector<f64>> {
    let mut x = DVector::zeros(rhs.len());
    let mut r = rhs - matvec(a, pin_rows, pk, collision_rows, ck, &x);
    let apply_pc = |r: &DVector<f64>| match preconditioner {
        Some(c) => c.solve(r),
        None => r.clone(),
    };
    let mut z = apply_pc(&r);
    let mut p = z.clone();
    let mut rz_old = r.dot(&z);

    for _ in 0..max_iters.max(1) {
        if r.amax() < tol {
            break;
        }
        let ap = matvec(a, pin_rows, pk, collision_rows, ck, &p);
        let denom = p.dot(&ap);
        if denom.abs() < 1e-300 {
            break;
        }
        let alpha = rz_old / denom;
        x += alpha * &p;
        r -= alpha * &ap;
        if r.amax() < tol {
            break;
        }
        z = apply_pc(&r);
        let rz_new = r.dot(&z);
        let beta = rz_new / rz_old;
        p = &z + beta * &p;
        rz_old = rz_new;
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::SolverOptions;

    fn unit_cube_facets() -> (Vec<DVec3>, Vec<[u32; 3]>) {
        let v = vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(1.0, 1.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(0.0, 0.0, 1.0),
            DVec3::new(1.0, 0.0, 1.0),
            DVec3::new(1.0, 1.0, 1.0),
            DVec3::new(0.0, 1.0, 1.0),
        ];
        let f = vec![
            [0u32, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [1, 2, 6],
            [1, 6, 5],
            [2, 3, 7],
            [2, 7, 6],
            [3, 0, 4],
            [3, 4, 7],
        ];
        (v, f)
    }

    #[test]
    fn init_builds_a_solver_for_a_simple_cube() {
        let (v, f) = unit_cube_facets();
        let options = SolverOptions { lattice_subdiv: 2, ..SolverOptions::default() };
        let solver = Solver::init(v, f, options).expect("cube should build a solver without any inverted lattice tet");
        assert!(!solver.elements.is_empty());
        assert_eq!(solver.elements.len(), solver.mesh.tets.len());
    }

    #[test]
    fn pinned_static_step_leaves_the_cube_near_rest() {
        let (v, f) = unit_cube_facets();
        let options = SolverOptions { lattice_subdiv: 2, timestep_s: 0.0, max_admm_iters: 10, ..SolverOptions::default() };
        let mut solver = Solver::init(v, f, options).unwrap();
        let rest = solver.mapped_facet_vertices();
        for (i, &p) in rest.iter().enumerate() {
            solver.set_pin(i as u32, p, DVec3::new(1e6, 1e6, 1e6));
        }
        solver.step().expect("pinned static step should converge");
        let after = solver.mapped_facet_vertices();
        for (a, b) in after.iter().zip(rest.iter()) {
            assert!((*a - *b).length() < 1e-2, "{a:?} drifted from pinned rest {b:?}");
        }
    }

    #[test]
    fn unpinned_cube_falls_under_gravity() {
        let (v, f) = unit_cube_facets();
        let options = SolverOptions { lattice_subdiv: 2, max_admm_iters: 10, floor: -100.0, ..SolverOptions::default() };
        let mut solver = Solver::init(v, f, options).unwrap();
        let before = solver.mapped_facet_vertices();
        solver.step().expect("dynamic step should succeed");
        let after = solver.mapped_facet_vertices();
        let avg_dz: f64 = before.iter().zip(after.iter()).map(|(b, a)| a.z - b.z).sum::<f64>() / before.len() as f64;
        assert!(avg_dz < 0.0, "average z should drop under gravity, got {avg_dz}");
    }
}
