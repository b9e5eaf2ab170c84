use glam::DVec3;

use crate::tree::{Aabb, Tree};

/// A BVH visitor: `overlap` prunes subtrees, `leaf` is called once per
/// primitive in an unpruned leaf.
pub trait Traverser {
    fn overlap(&self, bounds: &Aabb) -> bool;
    fn leaf(&mut self, prim_idx: u32);
}

/// First tet containing `p`, tested by four signed-tetrahedron-volume
/// comparisons (all must agree in sign with the tet's own orientation).
pub struct PointInTetMeshTraverse<'a> {
    pub p: DVec3,
    pub x: &'a [DVec3],
    pub tets: &'a [[u32; 4]],
    pub skip_verts: &'a [u32],
    pub skip_tets: &'a [u32],
    pub prim: i64,
}

impl<'a> PointInTetMeshTraverse<'a> {
    pub fn new(p: DVec3, x: &'a [DVec3], tets: &'a [[u32; 4]], skip_verts: &'a [u32], skip_tets: &'a [u32]) -> Self {
        Self { p, x, tets, skip_verts, skip_tets, prim: -1 }
    }

    pub fn run(mut self, tree: &Tree) -> Self {
        tree.traverse(&mut self);
        self
    }
}

impl<'a> Traverser for PointInTetMeshTraverse<'a> {
    fn overlap(&self, bounds: &Aabb) -> bool {
        self.prim < 0 && bounds.contains_point(self.p)
    }

    fn leaf(&mut self, prim_idx: u32) {
        if self.prim >= 0 || self.skip_tets.contains(&prim_idx) {
            return;
        }
        let tet = &self.tets[prim_idx as usize];
        if tet.iter().any(|v| self.skip_verts.contains(v)) {
            return;
        }
        let (a, b, c, d) = (self.x[tet[0] as usize], self.x[tet[1] as usize], self.x[tet[2] as usize], self.x[tet[3] as usize]);
        if point_in_tet(self.p, a, b, c, d) {
            self.prim = prim_idx as i64;
        }
    }
}

fn signed_volume(a: DVec3, b: DVec3, c: DVec3, d: DVec3) -> f64 {
    (b - a).cross(c - a).dot(d - a)
}

fn point_in_tet(p: DVec3, a: DVec3, b: DVec3, c: DVec3, d: DVec3) -> bool {
    let s0 = signed_volume(a, b, c, d).signum();
    [signed_volume(p, b, c, d), signed_volume(a, p, c, d), signed_volume(a, b, p, d), signed_volume(a, b, c, p)]
        .iter()
        .all(|v| *v == 0.0 || v.signum() == s0)
}

/// Branch-and-bound nearest point on any candidate triangle to `p`.
pub struct NearestTriangleTraverse<'a> {
    pub p: DVec3,
    pub verts: &'a [DVec3],
    pub faces: &'a [[u32; 3]],
    pub skip_tris: &'a [u32],
    pub prim: i64,
    pub pt_on_tri: DVec3,
    best_dist2: f64,
}

impl<'a> NearestTriangleTraverse<'a> {
    pub fn new(p: DVec3, verts: &'a [DVec3], faces: &'a [[u32; 3]], skip_tris: &'a [u32]) -> Self {
        Self { p, verts, faces, skip_tris, prim: -1, pt_on_tri: p, best_dist2: f64::INFINITY }
    }

    pub fn run(mut self, tree: &Tree) -> Self {
        tree.traverse(&mut self);
        self
    }
}

impl<'a> Traverser for NearestTriangleTraverse<'a> {
    fn overlap(&self, bounds: &Aabb) -> bool {
        bounds.dist2_to_point(self.p) < self.best_dist2
    }

    fn leaf(&mut self, prim_idx: u32) {
        if self.skip_tris.contains(&prim_idx) {
            return;
        }
        let f = &self.faces[prim_idx as usize];
        let (a, b, c) = (self.verts[f[0] as usize], self.verts[f[1] as usize], self.verts[f[2] as usize]);
        let candidate = closest_point_on_triangle(self.p, a, b, c);
        let d2 = (candidate - self.p).length_squared();
        if d2 < self.best_dist2 {
            self.best_dist2 = d2;
            self.prim = prim_idx as i64;
            self.pt_on_tri = candidate;
        }
    }
}

/// Ericson's region-test closest-point-on-triangle, textbook-standard.
fn closest_point_on_triangle(p: DVec3, a: DVec3, b: DVec3, c: DVec3) -> DVec3 {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}

/// Point-in-mesh via ray-cast crossing parity, one traverser instance per
/// query (call [`PointInTriangleMeshTraverse::run`], then read `is_inside`).
pub struct PointInTriangleMeshTraverse<'a> {
    pub p: DVec3,
    pub verts: &'a [DVec3],
    pub faces: &'a [[u32; 3]],
    pub skip_tris: &'a [u32],
    dir: DVec3,
    crossings: i64,
    pub is_inside: bool,
}

impl<'a> PointInTriangleMeshTraverse<'a> {
    pub fn new(p: DVec3, verts: &'a [DVec3], faces: &'a [[u32; 3]], skip_tris: &'a [u32]) -> Self {
        Self { p, verts, faces, skip_tris, dir: DVec3::new(0.8732, 0.1187, 0.4721).normalize(), crossings: 0, is_inside: false }
    }

    pub fn run(mut self, tree: &Tree) -> Self {
        tree.traverse(&mut self);
        self.is_inside = self.crossings % 2 != 0;
        self
    }
}

impl<'a> Traverser for PointInTriangleMeshTraverse<'a> {
    fn overlap(&self, bounds: &Aabb) -> bool {
        ray_aabb(self.p, self.dir, bounds)
    }

    fn leaf(&mut self, prim_idx: u32) {
        if self.skip_tris.contains(&prim_idx) {
            return;
        }
        let f = &self.faces[prim_idx as usize];
        let (a, b, c) = (self.verts[f[0] as usize], self.verts[f[1] as usize], self.verts[f[2] as usize]);
        if ray_triangle_forward_crossing(self.p, self.dir, a, b, c) {
            self.crossings += 1;
        }
    }
}

fn ray_aabb(o: DVec3, d: DVec3, b: &Aabb) -> bool {
    let inv = DVec3::new(1.0 / d.x, 1.0 / d.y, 1.0 / d.z);
    let mut tmin = 0.0f64;
    let mut tmax = f64::INFINITY;
    for axis in 0..3 {
        let (o_i, inv_i, lo, hi) = match axis {
            0 => (o.x, inv.x, b.min.x, b.max.x),
            1 => (o.y, inv.y, b.min.y, b.max.y),
            _ => (o.z, inv.z, b.min.z, b.max.z),
        };
        let mut t0 = (lo - o_i) * inv_i;
        let mut t1 = (hi - o_i) * inv_i;
        if inv_i < 0.0 {
            std::mem::swap(&mut t0, &mut t1);
        }
        tmin = tmin.max(t0);
        tmax = tmax.min(t1);
        if tmax < tmin {
            return false;
        }
    }
    true
}

/// Möller–Trumbore, restricted to forward (`t > 0`) hits.
fn ray_triangle_forward_crossing(o: DVec3, d: DVec3, a: DVec3, b: DVec3, c: DVec3) -> bool {
    let e1 = b - a;
    let e2 = c - a;
    let pvec = d.cross(e2);
    let det = e1.dot(pvec);
    if det.abs() < 1e-12 {
        return false;
    }
    let inv_det = 1.0 / det;
    let tvec = o - a;
    let u = tvec.dot(pvec) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return false;
    }
    let qvec = tvec.cross(e1);
    let v = d.dot(qvec) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return false;
    }
    let t = e2.dot(qvec) * inv_det;
    t > 1e-12
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Tree;

    #[test]
    fn point_in_tet_mesh_finds_containing_tet() {
        let x = vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(0.0, 0.0, 1.0),
        ];
        let tets = vec![[0u32, 1, 2, 3]];
        let boxes: Vec<Aabb> = tets
            .iter()
            .map(|t| {
                let mut b = Aabb::from_point(x[t[0] as usize]);
                for &v in &t[1..] {
                    b.extend_point(x[v as usize]);
                }
                b
            })
            .collect();
        let tree = Tree::init(&boxes);
        let result = PointInTetMeshTraverse::new(DVec3::new(0.2, 0.2, 0.2), &x, &tets, &[], &[]).run(&tree);
        assert_eq!(result.prim, 0);
        let miss = PointInTetMeshTraverse::new(DVec3::new(5.0, 5.0, 5.0), &x, &tets, &[], &[]).run(&tree);
        assert_eq!(miss.prim, -1);
    }

    #[test]
    fn nearest_triangle_picks_closer_face() {
        let verts = vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(10.0, 10.0, 10.0),
            DVec3::new(11.0, 10.0, 10.0),
            DVec3::new(10.0, 11.0, 10.0),
        ];
        let faces = vec![[0u32, 1, 2], [3, 4, 5]];
        let boxes: Vec<Aabb> = faces
            .iter()
            .map(|f| {
                let mut b = Aabb::from_point(verts[f[0] as usize]);
                b.extend_point(verts[f[1] as usize]);
                b.extend_point(verts[f[2] as usize]);
                b
            })
            .collect();
        let tree = Tree::init(&boxes);
        let result = NearestTriangleTraverse::new(DVec3::new(0.1, 0.1, 0.0), &verts, &faces, &[]).run(&tree);
        assert_eq!(result.prim, 0);
    }

    #[test]
    fn point_in_triangle_mesh_tetrahedron_surface() {
        let verts = vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(4.0, 0.0, 0.0),
            DVec3::new(0.0, 4.0, 0.0),
            DVec3::new(0.0, 0.0, 4.0),
        ];
        let faces = vec![[0u32, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]];
        let boxes: Vec<Aabb> = faces
            .iter()
            .map(|f| {
                let mut b = Aabb::from_point(verts[f[0] as usize]);
                b.extend_point(verts[f[1] as usize]);
                b.extend_point(verts[f[2] as usize]);
                b
            })
            .collect();
        let tree = Tree::init(&boxes);
        let inside = PointInTriangleMeshTraverse::new(DVec3::new(0.5, 0.5, 0.5), &verts, &faces, &[]).run(&tree);
        assert!(inside.is_inside);
        let outside = PointInTriangleMeshTraverse::new(DVec3::new(100.0, 100.0, 100.0), &verts, &faces, &[]).run(&tree);
        assert!(!outside.is_inside);
    }
}
