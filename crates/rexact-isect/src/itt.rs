//! Triangle-triangle intersection over the exact kernel.
//!
//! Implements the same classification Guigue-Devillers target (NONE / POINT
//! / SEGMENT / COPLANAR) via the equivalent formulation used by Möller's
//! original fast triangle-triangle test: the planes' intersection is a line
//! `L`; each triangle's boundary crossing of the *other* plane is a chord of
//! `L`, and the triangle-triangle intersection is the overlap of those two
//! chords. This avoids hand-transcribing Guigue-Devillers' 6-case/3-case
//! permutation dispatch while producing the same classification, since both
//! are exact-predicate reformulations of the same geometric fact.

use rexact_arena::Plane;
use rexact_math::{sgn, Sign, Vec3, R};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Itt {
    None,
    Point(Vec3),
    Segment(Vec3, Vec3),
    Coplanar,
}

/// `T1 = (p1, q1, r1)`, `T2 = (p2, q2, r2)`, each with its cached canonical
/// plane.
pub fn triangle_triangle_intersect(
    t1: (&Vec3, &Vec3, &Vec3),
    plane1: &Plane,
    t2: (&Vec3, &Vec3, &Vec3),
    plane2: &Plane,
) -> Itt {
    let (p1, q1, r1) = t1;
    let (p2, q2, r2) = t2;

    let d1 = [dist(plane2, p1), dist(plane2, q1), dist(plane2, r1)];
    let d2 = [dist(plane1, p2), dist(plane1, q2), dist(plane1, r2)];

    if all_coplanar(&d1) && all_coplanar(&d2) {
        return Itt::Coplanar;
    }
    if same_strict_sign(&d1) || same_strict_sign(&d2) {
        return Itt::None;
    }

    let chord1 = chord(&[p1, q1, r1], &d1);
    let chord2 = chord(&[p2, q2, r2], &d2);

    let dir = plane1.n.cross(&plane2.n);
    classify_overlap(chord1, chord2, &dir)
}

fn dist(plane: &Plane, p: &Vec3) -> R {
    plane.n.dot(p) + &plane.d
}

fn all_coplanar(d: &[R; 3]) -> bool {
    d.iter().all(|v| sgn(v).is_zero())
}

fn same_strict_sign(d: &[R; 3]) -> bool {
    let signs: Vec<Sign> = d.iter().map(sgn).collect();
    let nonzero: Vec<&Sign> = signs.iter().filter(|s| !s.is_zero()).collect();
    nonzero.len() == 3 && nonzero.iter().all(|s| **s == *nonzero[0])
}

/// Where the boundary of a triangle with vertices `v` and other-plane signed
/// distances `d` crosses that plane: 1 point (a touching vertex) or 2
/// (a chord, possibly degenerating to a shared edge when two distances are
/// exactly zero).
fn chord(v: &[&Vec3; 3], d: &[R; 3]) -> Vec<Vec3> {
    let signs = [sgn(&d[0]), sgn(&d[1]), sgn(&d[2])];
    let zero_count = signs.iter().filter(|s| s.is_zero()).count();

    if zero_count >= 2 {
        // An edge (or the whole triangle) lies in the plane; both
        // zero-distance vertices are exact crossing points.
        return (0..3).filter(|&i| signs[i].is_zero()).map(|i| v[i].clone()).collect();
    }
    if zero_count == 1 {
        let zi = signs.iter().position(|s| s.is_zero()).unwrap();
        let others: Vec<usize> = (0..3).filter(|&i| i != zi).collect();
        if signs[others[0]] == signs[others[1]] {
            return vec![v[zi].clone()];
        }
        let cross = edge_crossing(v[others[0]], &d[others[0]], v[others[1]], &d[others[1]]);
        return vec![v[zi].clone(), cross];
    }
    // No zero distances: exactly one vertex is the lone sign, its two
    // incident edges each cross the plane once.
    let lone = if signs[0] == signs[1] {
        2
    } else if signs[0] == signs[2] {
        1
    } else {
        0
    };
    let others: Vec<usize> = (0..3).filter(|&i| i != lone).collect();
    vec![
        edge_crossing(v[lone], &d[lone], v[others[0]], &d[others[0]]),
        edge_crossing(v[lone], &d[lone], v[others[1]], &d[others[1]]),
    ]
}

fn edge_crossing(a: &Vec3, da: &R, b: &Vec3, db: &R) -> Vec3 {
    let t = da / &(da - db);
    a.interp(b, &t)
}

fn classify_overlap(chord1: Vec<Vec3>, chord2: Vec<Vec3>, dir: &Vec3) -> Itt {
    let key = |p: &Vec3| p.dot(dir);
    let mut c1 = chord1;
    let mut c2 = chord2;
    c1.sort_by(|a, b| key(a).cmp(&key(b)));
    c2.sort_by(|a, b| key(a).cmp(&key(b)));

    let lo1 = key(&c1[0]);
    let hi1 = key(c1.last().unwrap());
    let lo2 = key(&c2[0]);
    let hi2 = key(c2.last().unwrap());

    let lo = if lo1 >= lo2 { (lo1, &c1[0]) } else { (lo2, &c2[0]) };
    let hi = if hi1 <= hi2 { (hi1, c1.last().unwrap()) } else { (hi2, c2.last().unwrap()) };

    if lo.0 > hi.0 {
        Itt::None
    } else if lo.0 == hi.0 {
        Itt::Point(lo.1.clone())
    } else {
        Itt::Segment(lo.1.clone(), hi.1.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rexact_math::int;

    fn v(x: i64, y: i64, z: i64) -> Vec3 {
        Vec3::new(int(x), int(y), int(z))
    }

    fn plane(a: &Vec3, b: &Vec3, c: &Vec3) -> Plane {
        Plane::from_three_points(a, b, c).unwrap()
    }

    #[test]
    fn disjoint_triangles_return_none() {
        let (p1, q1, r1) = (v(0, 0, 0), v(1, 0, 0), v(0, 1, 0));
        let (p2, q2, r2) = (v(0, 0, 10), v(1, 0, 10), v(0, 1, 10));
        let pl1 = plane(&p1, &q1, &r1);
        let pl2 = plane(&p2, &q2, &r2);
        assert_eq!(
            triangle_triangle_intersect((&p1, &q1, &r1), &pl1, (&p2, &q2, &r2), &pl2),
            Itt::None
        );
    }

    #[test]
    fn coplanar_triangles_are_flagged() {
        let (p1, q1, r1) = (v(0, 0, 0), v(2, 0, 0), v(0, 2, 0));
        let (p2, q2, r2) = (v(1, 0, 0), v(3, 0, 0), v(1, 2, 0));
        let pl1 = plane(&p1, &q1, &r1);
        let pl2 = plane(&p2, &q2, &r2);
        assert_eq!(
            triangle_triangle_intersect((&p1, &q1, &r1), &pl1, (&p2, &q2, &r2), &pl2),
            Itt::Coplanar
        );
    }

    #[test]
    fn crossing_triangles_yield_a_segment() {
        // T1 in the z=0 plane, T2 straddling it, sharing a perpendicular cut.
        let (p1, q1, r1) = (v(-2, -2, 0), v(2, -2, 0), v(0, 2, 0));
        let (p2, q2, r2) = (v(-1, 0, -2), v(1, 0, -2), v(0, 0, 2));
        let pl1 = plane(&p1, &q1, &r1);
        let pl2 = plane(&p2, &q2, &r2);
        let result = triangle_triangle_intersect((&p1, &q1, &r1), &pl1, (&p2, &q2, &r2), &pl2);
        assert!(matches!(result, Itt::Segment(_, _) | Itt::Point(_)));
    }
}
