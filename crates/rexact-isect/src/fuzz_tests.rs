//! Seeded-random regression cases for the self-intersect driver, in the
//! spirit of the tessellator's fixed fuzz cases: instead of asserting a
//! literal output, each case checks the invariants that must hold for any
//! input — the result never panics, and no two of its output triangles
//! properly cross one another (a self-intersect result is, by construction,
//! free of further self-intersection).

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use rexact_arena::{Arena, Mesh};
use rexact_math::{int, Vec3};

use crate::itt::{triangle_triangle_intersect, Itt};
use crate::self_intersect;

/// A tetrahedron's four triangular faces (CCW, outward normals), built from
/// one corner `o` and three edge vectors.
fn tetrahedron(o: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Vec<[Vec3; 3]> {
    let p0 = o.clone();
    let p1 = &o + &a;
    let p2 = &o + &b;
    let p3 = &o + &c;
    vec![
        [p0.clone(), p2.clone(), p1.clone()],
        [p0.clone(), p1.clone(), p3.clone()],
        [p0, p3.clone(), p2.clone()],
        [p1, p2, p3],
    ]
}

fn small_int(rng: &mut ChaCha8Rng, range: i64) -> i64 {
    rng.gen_range(-range..=range)
}

fn random_vec3(rng: &mut ChaCha8Rng, range: i64) -> Vec3 {
    Vec3::new(int(small_int(rng, range)), int(small_int(rng, range)), int(small_int(rng, range)))
}

fn build_mesh(arena: &mut Arena, triangles: &[[Vec3; 3]]) -> Mesh {
    let mut faces = Vec::new();
    for tri in triangles {
        let v0 = arena.add_or_find_vert(tri[0].clone(), None);
        let v1 = arena.add_or_find_vert(tri[1].clone(), None);
        let v2 = arena.add_or_find_vert(tri[2].clone(), None);
        if let Ok(id) = arena.add_face(vec![v0, v1, v2], None, None, None) {
            faces.push(id);
        }
    }
    Mesh::new(faces)
}

fn assert_no_improper_crossings(arena: &Arena, mesh: &Mesh) {
    let triangles: Vec<_> = mesh
        .faces
        .iter()
        .map(|&f| {
            let face = arena.face(f);
            let verts = [
                arena.vertex(face.verts[0]).co_exact.clone(),
                arena.vertex(face.verts[1]).co_exact.clone(),
                arena.vertex(face.verts[2]).co_exact.clone(),
            ];
            (verts, face.plane.clone())
        })
        .collect();

    for i in 0..triangles.len() {
        for j in (i + 1)..triangles.len() {
            let (va, pa) = &triangles[i];
            let (vb, pb) = &triangles[j];
            let result = triangle_triangle_intersect((&va[0], &va[1], &va[2]), pa, (&vb[0], &vb[1], &vb[2]), pb);
            assert!(
                !matches!(result, Itt::Segment(_, _)),
                "self-intersect left a proper crossing between two of its own output faces"
            );
        }
    }
}

fn run_case(seed: u64) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut triangles = tetrahedron(
        Vec3::zero(),
        Vec3::new(int(4), int(0), int(0)),
        Vec3::new(int(0), int(4), int(0)),
        Vec3::new(int(0), int(0), int(4)),
    );
    let offset = random_vec3(&mut rng, 3);
    let second = tetrahedron(
        offset,
        Vec3::new(int(4), int(0), int(0)),
        Vec3::new(int(0), int(4), int(0)),
        Vec3::new(int(0), int(0), int(4)),
    );
    triangles.extend(second);

    let mut arena = Arena::new();
    let mut mesh = build_mesh(&mut arena, &triangles);
    let result = self_intersect(&mut arena, &mut mesh);
    assert_no_improper_crossings(&arena, &result);
}

#[test]
fn fuzz_case_overlapping_tetrahedra_01() {
    run_case(1);
}

#[test]
fn fuzz_case_overlapping_tetrahedra_02() {
    run_case(2);
}

#[test]
fn fuzz_case_overlapping_tetrahedra_03() {
    run_case(3);
}

#[test]
fn fuzz_case_disjoint_tetrahedra_far_apart() {
    let mut arena = Arena::new();
    let mut triangles = tetrahedron(
        Vec3::zero(),
        Vec3::new(int(1), int(0), int(0)),
        Vec3::new(int(0), int(1), int(0)),
        Vec3::new(int(0), int(0), int(1)),
    );
    triangles.extend(tetrahedron(
        Vec3::new(int(100), int(100), int(100)),
        Vec3::new(int(1), int(0), int(0)),
        Vec3::new(int(0), int(1), int(0)),
        Vec3::new(int(0), int(0), int(1)),
    ));
    let mut mesh = build_mesh(&mut arena, &triangles);
    let result = self_intersect(&mut arena, &mut mesh);
    assert_eq!(result.faces.len(), 8);
    assert_no_improper_crossings(&arena, &result);
}
