//! Per-element local step (C11): rest-shape Jacobians, signed SVD with the
//! reflection fix, and the ARAP / NeoHookean proximal updates.

use glam::DVec3;
use nalgebra::{Matrix3, Matrix3x4, SymmetricEigen, Vector3};

use crate::error::CreateError;
use crate::options::Material;

fn to_na(v: DVec3) -> Vector3<f64> {
    Vector3::new(v.x, v.y, v.z)
}

/// A single tetrahedron's ADMM state: its rest-shape reduction block `D_i`,
/// stiffness weight `w_i = sqrt(K*vol_i)`, rest volume, material model, and
/// the dual/auxiliary matrices carried between ADMM iterations.
pub struct Element {
    pub tet: [u32; 4],
    pub d: Matrix3x4<f64>,
    pub weight: f64,
    pub rest_vol: f64,
    pub material: Material,
    pub u: Matrix3<f64>,
    pub z: Matrix3<f64>,
}

impl Element {
    /// Builds `D_i` from `D = Sᵀ·edges⁻¹`: the rest edge matrix `Dm = [x1-x0, x2-x0, x3-x0]`
    /// is inverted once, and its rows give the per-vertex coefficients for
    /// each column of the deformed-space gradient `F`.
    pub fn create(tet: [u32; 4], rest: &[DVec3], stiffness_k: f64) -> Result<Self, CreateError> {
        let x0 = to_na(rest[tet[0] as usize]);
        let dm = Matrix3::from_columns(&[to_na(rest[tet[1] as usize]) - x0, to_na(rest[tet[2] as usize]) - x0, to_na(rest[tet[3] as usize]) - x0]);
        let vol = dm.determinant() / 6.0;
        if vol <= 0.0 {
            return Err(CreateError::InvertedRestTet);
        }
        let dm_inv = dm.try_inverse().ok_or(CreateError::InvertedRestTet)?;

        let mut d = Matrix3x4::zeros();
        for k in 0..3 {
            let mut col0 = 0.0;
            for l in 0..3 {
                let coeff = dm_inv[(l, k)];
                d[(k, 1 + l)] = coeff;
                col0 -= coeff;
            }
            d[(k, 0)] = col0;
        }

        let weight = (stiffness_k * vol).sqrt();
        Ok(Self { tet, d, weight, rest_vol: vol, material: Material::Arap, u: Matrix3::zeros(), z: Matrix3::identity() })
    }

    pub fn reset_duals(&mut self) {
        self.u = Matrix3::zeros();
        self.z = Matrix3::identity();
    }

    fn gather(&self, x: &[DVec3]) -> Matrix3x4<f64> {
        Matrix3x4::from_columns(&[to_na(x[self.tet[0] as usize]), to_na(x[self.tet[1] as usize]), to_na(x[self.tet[2] as usize]), to_na(x[self.tet[3] as usize])])
    }

    pub fn deformation_gradient(&self, x: &[DVec3]) -> Matrix3<f64> {
        self.gather(x) * self.d.transpose()
    }

    /// Runs one local-step ADMM sub-iteration: recompute `F`, form `Z = F+U`,
    /// take its signed SVD, run the model-specific prox on the singular
    /// values, then update the dual `U`.
    pub fn local_step(&mut self, x: &[DVec3], mu: f64, lambda: f64, kv: f64) -> bool {
        let f = self.deformation_gradient(x);
        let z_mat = f + self.u;
        let (u_rot, sigma, v_rot) = signed_svd(z_mat);

        let target = match self.material {
            Material::Arap => {
                let r = u_rot * v_rot.transpose();
                let w2 = self.weight * self.weight;
                let blended = (r * kv + z_mat * w2) / (w2 + kv);
                self.z = blended;
                self.u += f - self.z;
                return blended.iter().all(|v| v.is_finite());
            }
            Material::NeoHookean => prox_neohookean(mu, lambda, kv, Vector3::new(1.0, 1.0, 1.0), sigma),
        };

        if !target.iter().all(|v| v.is_finite()) {
            return false;
        }
        self.z = u_rot * Matrix3::from_diagonal(&target) * v_rot.transpose();
        self.u += f - self.z;
        self.z.iter().all(|v| v.is_finite()) && self.u.iter().all(|v| v.is_finite())
    }

    /// `Dᵀ·W²·(z-u)`, scattered as one 3-vector per tet corner via
    /// `(z-u)·D_i`, ready to add into the global right-hand side.
    pub fn rhs_contribution(&self) -> Matrix3x4<f64> {
        (self.weight * self.weight) * (self.z - self.u) * self.d
    }

    /// The rest-shape reduction block itself, for assembling `A`'s static
    /// `DᵀW²D` term as `G_i = D_iᵀD_i` scattered at
    /// `(3*tet[p]+axis, 3*tet[q]+axis)` for every `p, q, axis`.
    pub fn d_matrix(&self) -> &Matrix3x4<f64> {
        &self.d
    }
}

/// Signed SVD with the reflection fix: if `det(U) < 0`, flip `U`'s last
/// column and negate `Σ₃`; symmetrically for `V`. Guarantees `U`, `V` are
/// proper rotations and `U·diag(Σ)·Vᵀ` still reconstructs the input exactly.
pub fn signed_svd(m: Matrix3<f64>) -> (Matrix3<f64>, Vector3<f64>, Matrix3<f64>) {
    let svd = m.svd(true, true);
    let mut u = svd.u.expect("svd requested u");
    let mut v = svd.v_t.expect("svd requested v_t").transpose();
    let mut sigma = svd.singular_values;

    if u.determinant() < 0.0 {
        for r in 0..3 {
            u[(r, 2)] = -u[(r, 2)];
        }
        sigma[2] = -sigma[2];
    }
    if v.determinant() < 0.0 {
        for r in 0..3 {
            v[(r, 2)] = -v[(r, 2)];
        }
        sigma[2] = -sigma[2];
    }
    (u, sigma, v)
}

/// Damped Newton on the NeoHookean density
/// `f(s) = mu/2*(I1 - logI3 - 3) + lambda/8*(logI3)^2 + kv/2*||s-s0||^2`
/// with `I1 = sum(s_k^2)` and `logI3 = 2*sum(ln|s_k|)` (the `|.|` keeps the
/// log well-defined through an inversion, since only `det(F)^2` enters the
/// energy). Up to 10 Newton steps, each with up to 20 backtracking halvings;
/// the Hessian is eigen-clamped to SPD before each solve.
fn prox_neohookean(mu: f64, lambda: f64, kv: f64, s0: Vector3<f64>, sigma: Vector3<f64>) -> Vector3<f64> {
    let mut s = sigma;
    let floor = 1e-6;
    for k in 0..3 {
        if s[k].abs() < floor {
            s[k] = floor.copysign(if s[k] == 0.0 { 1.0 } else { s[k] });
        }
    }

    let energy = |s: &Vector3<f64>| -> f64 {
        let log_i3 = 2.0 * (s[0].abs().ln() + s[1].abs().ln() + s[2].abs().ln());
        let i1 = s[0] * s[0] + s[1] * s[1] + s[2] * s[2];
        let diff = s - s0;
        0.5 * mu * (i1 - log_i3 - 3.0) + 0.125 * lambda * log_i3 * log_i3 + 0.5 * kv * diff.dot(&diff)
    };

    for _ in 0..10 {
        let log_i3 = 2.0 * (s[0].abs().ln() + s[1].abs().ln() + s[2].abs().ln());
        let mut grad = Vector3::zeros();
        let mut hess = Matrix3::zeros();
        for k in 0..3 {
            grad[k] = mu * s[k] - mu / s[k] + 0.5 * lambda * log_i3 / s[k] + kv * (s[k] - s0[k]);
            hess[(k, k)] = mu + kv + (mu + lambda * (1.0 - 0.5 * log_i3)) / (s[k] * s[k]);
        }
        for k in 0..3 {
            for j in 0..3 {
                if j != k {
                    hess[(k, j)] = lambda / (s[j] * s[k]);
                }
            }
        }

        if grad.norm() < 1e-10 {
            break;
        }

        let hess_spd = project_spd(hess, 1e-8);
        let dir = match hess_spd.try_inverse() {
            Some(inv) => -(inv * grad),
            None => -grad,
        };

        let f0 = energy(&s);
        let mut alpha = 1.0;
        let mut accepted = false;
        for _ in 0..20 {
            let candidate = s + dir * alpha;
            if candidate.iter().all(|c| c.abs() > floor * 0.5) {
                let f1 = energy(&candidate);
                if f1.is_finite() && f1 <= f0 {
                    s = candidate;
                    accepted = true;
                    break;
                }
            }
            alpha *= 0.5;
        }
        if !accepted {
            break;
        }
    }
    s
}

fn project_spd(m: Matrix3<f64>, floor: f64) -> Matrix3<f64> {
    let eigen = SymmetricEigen::new(m);
    let clamped = eigen.eigenvalues.map(|v| v.max(floor));
    eigen.eigenvectors * Matrix3::from_diagonal(&clamped) * eigen.eigenvectors.transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_at_rest_has_identity_gradient() {
        let rest = vec![DVec3::new(0.0, 0.0, 0.0), DVec3::new(1.0, 0.0, 0.0), DVec3::new(0.0, 1.0, 0.0), DVec3::new(0.0, 0.0, 1.0)];
        let el = Element::create([0, 1, 2, 3], &rest, 1.0).unwrap();
        let f = el.deformation_gradient(&rest);
        assert!((f - Matrix3::identity()).norm() < 1e-10);
    }

    #[test]
    fn inverted_rest_tet_is_rejected() {
        let rest = vec![DVec3::new(0.0, 0.0, 0.0), DVec3::new(0.0, 1.0, 0.0), DVec3::new(1.0, 0.0, 0.0), DVec3::new(0.0, 0.0, 1.0)];
        assert!(matches!(Element::create([0, 1, 2, 3], &rest, 1.0), Err(CreateError::InvertedRestTet)));
    }

    #[test]
    fn signed_svd_reconstructs_input() {
        let m = Matrix3::new(1.2, 0.1, -0.2, 0.0, 0.9, 0.05, -0.1, 0.0, 1.1);
        let (u, sigma, v) = signed_svd(m);
        let recon = u * Matrix3::from_diagonal(&sigma) * v.transpose();
        assert!((recon - m).norm() < 1e-8);
        assert!(u.determinant() > 0.0);
        assert!(v.determinant() > 0.0);
    }

    #[test]
    fn arap_prox_pulls_towards_nearest_rotation() {
        let rest = vec![DVec3::new(0.0, 0.0, 0.0), DVec3::new(1.0, 0.0, 0.0), DVec3::new(0.0, 1.0, 0.0), DVec3::new(0.0, 0.0, 1.0)];
        let mut el = Element::create([0, 1, 2, 3], &rest, 1.0).unwrap();
        let stretched = vec![DVec3::new(0.0, 0.0, 0.0), DVec3::new(2.0, 0.0, 0.0), DVec3::new(0.0, 1.0, 0.0), DVec3::new(0.0, 0.0, 1.0)];
        el.reset_duals();
        let ok = el.local_step(&stretched, 0.0, 0.0, el.weight * el.weight);
        assert!(ok);
        assert!((el.z.determinant() - 1.0).abs() < 0.5);
    }

    #[test]
    fn neohookean_prox_is_stationary_at_rest() {
        let s0 = Vector3::new(1.0, 1.0, 1.0);
        let s = prox_neohookean(1000.0, 500.0, 1000.0, s0, Vector3::new(1.0, 1.0, 1.0));
        assert!((s - s0).norm() < 1e-6);
    }
}
