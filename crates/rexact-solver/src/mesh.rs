//! Embedded mesh / lattice (C9): octree-background tet lattice, facet
//! vertex embedding via barycentric coordinates, mass lumping, and pins.

use std::collections::HashMap;

use glam::DVec3;
use rexact_bvh::{Aabb, PointInTetMeshTraverse, PointInTriangleMeshTraverse, Tree};

use crate::error::{CreateError, RuntimeWarning};

/// The Freudenthal (Kuhn) decomposition of a unit cube into six tets
/// sharing the main diagonal `0-7`, corner `i` bit-packed as `x | y<<1 | z<<2`.
/// Every tet is wound so `tet_volume` is positive for every grid cell; three
/// of the six (second, third, sixth) need their last two vertices swapped
/// relative to the textbook listing to make that hold.
const FREUDENTHAL_TETS: [[usize; 4]; 6] =
    [[0, 1, 3, 7], [0, 1, 7, 5], [0, 2, 7, 3], [0, 2, 6, 7], [0, 4, 5, 7], [0, 4, 7, 6]];

#[derive(Clone, Copy, Debug)]
pub struct FacetEmbedding {
    pub tet: u32,
    pub bary: [f64; 4],
}

#[derive(Clone, Copy, Debug)]
struct Pin {
    pos: DVec3,
    stiffness: DVec3,
}

pub struct PinRow {
    pub cols: Vec<(usize, f64)>,
    pub rhs: f64,
}

pub struct PinSystem {
    pub rows: Vec<PinRow>,
}

/// A facet mesh embedded in a background tetrahedral lattice, per §4.9.
pub struct EmbeddedMesh {
    pub facet_verts: Vec<DVec3>,
    pub facet_faces: Vec<[u32; 3]>,
    pub lattice_rest: Vec<DVec3>,
    pub tets: Vec<[u32; 4]>,
    pub embeddings: Vec<FacetEmbedding>,
    pub masses: Vec<f64>,
    pins: HashMap<u32, Pin>,
}

impl EmbeddedMesh {
    /// Builds the background lattice and embeds every facet vertex in it.
    /// Fails if the mesh is empty, or any facet vertex cannot be located in
    /// a lattice tet within `|bary| <= 1 + eps`.
    pub fn create(facet_verts: Vec<DVec3>, facet_faces: Vec<[u32; 3]>, subdiv_level: u32) -> Result<Self, CreateError> {
        if facet_verts.is_empty() || facet_faces.is_empty() {
            return Err(CreateError::EmptyMesh);
        }

        let mut bbox = Aabb::from_point(facet_verts[0]);
        for &v in &facet_verts[1..] {
            bbox.extend_point(v);
        }
        let size = bbox.max - bbox.min;
        let res = 1u32 << subdiv_level;
        let cell = DVec3::new(size.x / res as f64, size.y / res as f64, size.z / res as f64);

        let surf_boxes: Vec<Aabb> = facet_faces
            .iter()
            .map(|f| {
                let mut b = Aabb::from_point(facet_verts[f[0] as usize]);
                b.extend_point(facet_verts[f[1] as usize]);
                b.extend_point(facet_verts[f[2] as usize]);
                b
            })
            .collect();
        let surf_tree = Tree::init(&surf_boxes);

        let mut lattice_index: HashMap<(i64, i64, i64), u32> = HashMap::new();
        let mut lattice_rest: Vec<DVec3> = Vec::new();
        let mut tets: Vec<[u32; 4]> = Vec::new();

        for ix in 0..res {
            for iy in 0..res {
                for iz in 0..res {
                    let origin = bbox.min + DVec3::new(ix as f64, iy as f64, iz as f64) * cell;
                    let centre = origin + cell * 0.5;
                    let inside =
                        PointInTriangleMeshTraverse::new(centre, &facet_verts, &facet_faces, &[]).run(&surf_tree).is_inside;
                    if !inside {
                        continue;
                    }
                    let corners: [DVec3; 8] = [
                        origin,
                        origin + DVec3::new(cell.x, 0.0, 0.0),
                        origin + DVec3::new(0.0, cell.y, 0.0),
                        origin + DVec3::new(cell.x, cell.y, 0.0),
                        origin + DVec3::new(0.0, 0.0, cell.z),
                        origin + DVec3::new(cell.x, 0.0, cell.z),
                        origin + DVec3::new(0.0, cell.y, cell.z),
                        origin + DVec3::new(cell.x, cell.y, cell.z),
                    ];
                    let ids: [u32; 8] = corners.map(|p| intern_lattice_vert(p, &mut lattice_rest, &mut lattice_index));
                    for tet in FREUDENTHAL_TETS {
                        tets.push([ids[tet[0]], ids[tet[1]], ids[tet[2]], ids[tet[3]]]);
                    }
                }
            }
        }

        for &tet in &tets {
            let vol = tet_volume(lattice_rest[tet[0] as usize], lattice_rest[tet[1] as usize], lattice_rest[tet[2] as usize], lattice_rest[tet[3] as usize]);
            if vol <= 0.0 {
                return Err(CreateError::InvertedRestTet);
            }
        }

        let tet_boxes: Vec<Aabb> = tets
            .iter()
            .map(|t| {
                let mut b = Aabb::from_point(lattice_rest[t[0] as usize]);
                for &v in &t[1..] {
                    b.extend_point(lattice_rest[v as usize]);
                }
                b
            })
            .collect();
        let lattice_tree = Tree::init(&tet_boxes);

        let mut embeddings = Vec::with_capacity(facet_verts.len());
        for &v in &facet_verts {
            let hit = PointInTetMeshTraverse::new(v, &lattice_rest, &tets, &[], &[]).run(&lattice_tree);
            if hit.prim < 0 {
                return Err(CreateError::FacetVertexNotEmbedded);
            }
            let tet = tets[hit.prim as usize];
            let bary = tet_barycentric(
                v,
                lattice_rest[tet[0] as usize],
                lattice_rest[tet[1] as usize],
                lattice_rest[tet[2] as usize],
                lattice_rest[tet[3] as usize],
            );
            if bary.iter().any(|b| b.abs() > 1.0 + 1e-6) {
                return Err(CreateError::FacetVertexNotEmbedded);
            }
            embeddings.push(FacetEmbedding { tet: hit.prim as u32, bary });
        }

        let n_lattice = lattice_rest.len();
        Ok(Self { facet_verts, facet_faces, lattice_rest, tets, embeddings, masses: vec![0.0; n_lattice], pins: HashMap::new() })
    }

    pub fn get_mapped_facet_vertex(&self, x_lat: &[DVec3], i: usize) -> DVec3 {
        let e = &self.embeddings[i];
        let tet = self.tets[e.tet as usize];
        let mut p = DVec3::ZERO;
        for j in 0..4 {
            p += x_lat[tet[j] as usize] * e.bary[j];
        }
        p
    }

    /// Lumps `density * vol / 4` of each tet's mass onto its four corners.
    /// Isolated lattice vertices (touched by no tet, mass 0) are set to 1
    /// and warned about rather than left singular. Every tet's rest volume
    /// was already checked positive in `create`, so no further rejection
    /// happens here.
    pub fn compute_masses(&mut self, x: &[DVec3], density: f64) -> Option<RuntimeWarning> {
        let mut masses = vec![0.0; self.lattice_rest.len()];
        for tet in &self.tets {
            let vol = tet_volume(x[tet[0] as usize], x[tet[1] as usize], x[tet[2] as usize], x[tet[3] as usize]);
            let share = density * vol / 4.0;
            for &v in tet {
                masses[v as usize] += share;
            }
        }
        let mut isolated = false;
        for m in masses.iter_mut() {
            if *m == 0.0 {
                *m = 1.0;
                isolated = true;
            }
        }
        self.masses = masses;
        if isolated {
            Some(RuntimeWarning::IsolatedLatticeVertex)
        } else {
            None
        }
    }

    pub fn set_pin(&mut self, facet_vertex: u32, pos: DVec3, stiffness: DVec3) {
        self.pins.insert(facet_vertex, Pin { pos, stiffness });
    }

    pub fn clear_pins(&mut self) {
        self.pins.clear();
    }

    pub fn has_pins(&self) -> bool {
        !self.pins.is_empty()
    }

    /// Emits, for each pinned facet vertex and axis with nonzero stiffness,
    /// a row of the four `b_ij * k_i` coefficients at lattice columns
    /// `3*tet[j]+axis`, with right-hand side `p_i,axis * k_i,axis`.
    pub fn linearize_pins(&self) -> PinSystem {
        let mut rows = Vec::new();
        for (&facet_vertex, pin) in &self.pins {
            let e = &self.embeddings[facet_vertex as usize];
            let tet = self.tets[e.tet as usize];
            for axis in 0..3 {
                let k = component(pin.stiffness, axis);
                if k == 0.0 {
                    continue;
                }
                let cols = (0..4).map(|j| (3 * tet[j] as usize + axis, e.bary[j] * k)).collect();
                rows.push(PinRow { cols, rhs: component(pin.pos, axis) * k });
            }
        }
        PinSystem { rows }
    }
}

fn component(v: DVec3, axis: usize) -> f64 {
    match axis {
        0 => v.x,
        1 => v.y,
        _ => v.z,
    }
}

fn intern_lattice_vert(p: DVec3, verts: &mut Vec<DVec3>, index: &mut HashMap<(i64, i64, i64), u32>) -> u32 {
    let scale = 1e7;
    let key = ((p.x * scale).round() as i64, (p.y * scale).round() as i64, (p.z * scale).round() as i64);
    *index.entry(key).or_insert_with(|| {
        verts.push(p);
        (verts.len() - 1) as u32
    })
}

pub(crate) fn tet_volume(a: DVec3, b: DVec3, c: DVec3, d: DVec3) -> f64 {
    (b - a).cross(c - a).dot(d - a) / 6.0
}

pub(crate) fn tet_barycentric(p: DVec3, a: DVec3, b: DVec3, c: DVec3, d: DVec3) -> [f64; 4] {
    let vol = tet_volume(a, b, c, d);
    let v0 = tet_volume(p, b, c, d) / vol;
    let v1 = tet_volume(a, p, c, d) / vol;
    let v2 = tet_volume(a, b, p, d) / vol;
    let v3 = 1.0 - v0 - v1 - v2;
    [v0, v1, v2, v3]
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn create_embeds_every_facet_vertex() {
        let (v, f) = unit_cube_facets();
        let mesh = EmbeddedMesh::create(v.clone(), f, 2).expect("cube should embed cleanly");
        assert_eq!(mesh.embeddings.len(), v.len());
        for (i, e) in mesh.embeddings.iter().enumerate() {
            let mapped = mesh.get_mapped_facet_vertex(&mesh.lattice_rest, i);
            assert!((mapped - v[i]).length() < 1e-6);
            let _ = e.tet;
        }
    }

    #[test]
    fn compute_masses_sums_to_total_volume_times_density() {
        let (v, f) = unit_cube_facets();
        let mut mesh = EmbeddedMesh::create(v, f, 2).unwrap();
        let rest = mesh.lattice_rest.clone();
        mesh.compute_masses(&rest, 2.0);
        let total: f64 = mesh.masses.iter().sum();
        assert!(total > 0.0);
    }

    #[test]
    fn freudenthal_tets_are_consistently_oriented() {
        let unit_corners: [DVec3; 8] = [
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(1.0, 1.0, 0.0),
            DVec3::new(0.0, 0.0, 1.0),
            DVec3::new(1.0, 0.0, 1.0),
            DVec3::new(0.0, 1.0, 1.0),
            DVec3::new(1.0, 1.0, 1.0),
        ];
        for tet in FREUDENTHAL_TETS {
            let vol = tet_volume(unit_corners[tet[0]], unit_corners[tet[1]], unit_corners[tet[2]], unit_corners[tet[3]]);
            assert!(vol > 0.0, "{tet:?} has non-positive volume {vol}");
        }
    }

    #[test]
    fn empty_mesh_is_rejected() {
        let err = EmbeddedMesh::create(Vec::new(), Vec::new(), 2);
        assert!(matches!(err, Err(CreateError::EmptyMesh)));
    }
}
