//! Plain triangle-soup Delaunay construction. Works over vertex indices into
//! a caller-owned `Vec<Vec2>` rather than the pooled [`crate::Arrangement`]:
//! the arrangement is only assembled once, from the final triangle set, by
//! [`crate::Arrangement::from_triangles`].

use std::collections::HashMap;

use rexact_math::{orient3d, sgn, Sign, Vec2, Vec3};

/// A mutable triangle soup plus a directed-edge -> owning-triangle index,
/// rebuilt incrementally as triangles are added/removed.
struct TriSoup {
    tris: Vec<[u32; 3]>,
    alive: Vec<bool>,
    edge_owner: HashMap<(u32, u32), usize>,
}

impl TriSoup {
    fn new() -> Self {
        TriSoup { tris: Vec::new(), alive: Vec::new(), edge_owner: HashMap::new() }
    }

    fn add(&mut self, a: u32, b: u32, c: u32) -> usize {
        let idx = self.tris.len();
        self.tris.push([a, b, c]);
        self.alive.push(true);
        self.edge_owner.insert((a, b), idx);
        self.edge_owner.insert((b, c), idx);
        self.edge_owner.insert((c, a), idx);
        idx
    }

    fn kill(&mut self, idx: usize) {
        let [a, b, c] = self.tris[idx];
        self.alive[idx] = false;
        for e in [(a, b), (b, c), (c, a)] {
            if self.edge_owner.get(&e) == Some(&idx) {
                self.edge_owner.remove(&e);
            }
        }
    }

    fn neighbor_across(&self, p: u32, q: u32) -> Option<usize> {
        self.edge_owner.get(&(q, p)).copied().filter(|&i| self.alive[i])
    }

    fn live_triangles(&self) -> impl Iterator<Item = &[u32; 3]> {
        self.tris
            .iter()
            .zip(self.alive.iter())
            .filter_map(|(t, &a)| if a { Some(t) } else { None })
    }
}

fn lift(p: &Vec2) -> Vec3 {
    let sq = &p.x * &p.x + &p.y * &p.y;
    Vec3::new(p.x.clone(), p.y.clone(), sq)
}

/// `Sign::Pos` iff `d` lies strictly inside the circumcircle of the
/// counterclockwise triangle `(a, b, c)`: the classic paraboloid-lift
/// reduction of the incircle determinant to an `orient3d` call.
fn in_circle(pts: &[Vec2], a: u32, b: u32, c: u32, d: u32) -> Sign {
    orient3d(&lift(&pts[a as usize]), &lift(&pts[b as usize]), &lift(&pts[c as usize]), &lift(&pts[d as usize]))
}

fn orient2d_idx(pts: &[Vec2], a: u32, b: u32, c: u32) -> Sign {
    rexact_math::orient2d(&pts[a as usize], &pts[b as usize], &pts[c as usize])
}

/// Builds an unconstrained Delaunay triangulation of `pts` (at least 3, not
/// all collinear) via Bowyer-Watson incremental insertion against a
/// bounding super-triangle, which is stripped out before returning.
pub fn bowyer_watson(pts: &[Vec2]) -> Vec<[u32; 3]> {
    let n = pts.len() as u32;
    if n < 3 {
        return Vec::new();
    }

    let mut work: Vec<Vec2> = pts.to_vec();
    let (lo, hi) = bounds(pts);
    let span = &hi - &lo;
    let big = (&span.x + &span.y + rexact_math::int(1)) * rexact_math::int(4);
    let s0 = Vec2::new(&lo.x - &big, &lo.y - &big);
    let s1 = Vec2::new(&hi.x + &big * rexact_math::int(2), lo.y.clone());
    let s2 = Vec2::new(lo.x.clone(), &hi.y + &big * rexact_math::int(2));
    let sa = n;
    let sb = n + 1;
    let sc = n + 2;
    work.push(s0);
    work.push(s1);
    work.push(s2);

    let mut soup = TriSoup::new();
    soup.add(sa, sb, sc);

    for i in 0..n {
        insert_point(&mut soup, &work, i);
    }

    soup
        .live_triangles()
        .filter(|t| t.iter().all(|&v| v < n))
        .copied()
        .collect()
}

fn bounds(pts: &[Vec2]) -> (Vec2, Vec2) {
    let mut lo = pts[0].clone();
    let mut hi = pts[0].clone();
    for p in &pts[1..] {
        if p.x < lo.x {
            lo.x = p.x.clone();
        }
        if p.y < lo.y {
            lo.y = p.y.clone();
        }
        if p.x > hi.x {
            hi.x = p.x.clone();
        }
        if p.y > hi.y {
            hi.y = p.y.clone();
        }
    }
    (lo, hi)
}

fn insert_point(soup: &mut TriSoup, pts: &[Vec2], p: u32) {
    let bad: Vec<usize> = soup
        .tris
        .iter()
        .enumerate()
        .filter(|(i, [a, b, c])| soup.alive[*i] && in_circle(pts, *a, *b, *c, p) == Sign::Pos)
        .map(|(i, _)| i)
        .collect();

    let mut boundary: Vec<(u32, u32)> = Vec::new();
    for &i in &bad {
        let [a, b, c] = soup.tris[i];
        for (u, v) in [(a, b), (b, c), (c, a)] {
            let shared = bad.iter().any(|&j| {
                j != i && {
                    let [x, y, z] = soup.tris[j];
                    [(x, y), (y, z), (z, x)].contains(&(v, u))
                }
            });
            if !shared {
                boundary.push((u, v));
            }
        }
    }

    for i in bad {
        soup.kill(i);
    }
    for (u, v) in boundary {
        soup.add(u, v, p);
    }
}

/// Flips crossed edges until every input segment `(u, v)` is present as an
/// edge of the live triangulation (Anglada-style constraint recovery).
pub fn recover_constraints(tris: Vec<[u32; 3]>, pts: &[Vec2], segments: &[(u32, u32)]) -> Vec<[u32; 3]> {
    let mut soup = TriSoup::new();
    for &[a, b, c] in &tris {
        soup.add(a, b, c);
    }

    for &(u, v) in segments {
        if u == v {
            continue;
        }
        let mut guard = 0usize;
        while !edge_present(&soup, u, v) && guard < 4 * soup.tris.len() + 64 {
            guard += 1;
            if let Some((p, q, t1, t2)) = find_crossed_edge(&soup, pts, u, v) {
                flip(&mut soup, pts, p, q, t1, t2);
            } else {
                break;
            }
        }
    }

    soup.live_triangles().copied().collect()
}

fn edge_present(soup: &TriSoup, u: u32, v: u32) -> bool {
    soup.edge_owner.contains_key(&(u, v)) || soup.edge_owner.contains_key(&(v, u))
}

/// Finds a triangle edge `(p, q)` (not touching `u`) that the open segment
/// `u-v` properly crosses, by walking the fan of triangles around `u`.
fn find_crossed_edge(soup: &TriSoup, pts: &[Vec2], u: u32, v: u32) -> Option<(u32, u32, usize, usize)> {
    let start = soup
        .tris
        .iter()
        .enumerate()
        .position(|(i, t)| soup.alive[i] && t.contains(&u))?;
    let mut visited = std::collections::HashSet::new();
    let mut stack = vec![start];
    while let Some(ti) = stack.pop() {
        if !visited.insert(ti) || !soup.alive[ti] {
            continue;
        }
        let [a, b, c] = soup.tris[ti];
        for (p, q) in [(a, b), (b, c), (c, a)] {
            if p == u || q == u {
                if let Some(nb) = soup.neighbor_across(p, q) {
                    stack.push(nb);
                }
                continue;
            }
            let side_u = orient2d_idx(pts, u, v, p);
            let side_v = orient2d_idx(pts, u, v, q);
            let side_p = orient2d_idx(pts, p, q, u);
            let side_q = orient2d_idx(pts, p, q, v);
            if side_u != side_v && side_u != Sign::Zero && side_v != Sign::Zero && side_p != side_q {
                if let Some(other) = soup.neighbor_across(p, q) {
                    return Some((p, q, ti, other));
                }
            }
        }
    }
    None
}

/// Replaces the two triangles sharing edge `(p, q)` with the two triangles
/// sharing the other diagonal of the quad they form.
fn flip(soup: &mut TriSoup, _pts: &[Vec2], p: u32, q: u32, t1: usize, t2: usize) {
    let a = opposite_vertex(&soup.tris[t1], p, q);
    let b = opposite_vertex(&soup.tris[t2], q, p);
    soup.kill(t1);
    soup.kill(t2);
    soup.add(a, b, q);
    soup.add(b, a, p);
}

fn opposite_vertex(tri: &[u32; 3], p: u32, q: u32) -> u32 {
    *tri.iter().find(|&&v| v != p && v != q).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rexact_math::int;

    fn v(x: i64, y: i64) -> Vec2 {
        Vec2::new(int(x), int(y))
    }

    #[test]
    fn triangulates_square_into_two_triangles() {
        let pts = vec![v(0, 0), v(1, 0), v(1, 1), v(0, 1)];
        let tris = bowyer_watson(&pts);
        assert_eq!(tris.len(), 2);
        for t in &tris {
            assert_ne!(orient2d_idx(&pts, t[0], t[1], t[2]), Sign::Zero);
        }
    }

    #[test]
    fn recovers_explicit_diagonal() {
        let pts = vec![v(0, 0), v(1, 0), v(1, 1), v(0, 1)];
        let tris = bowyer_watson(&pts);
        let recovered = recover_constraints(tris, &pts, &[(0, 2)]);
        assert!(recovered
            .iter()
            .any(|t| t.contains(&0) && t.contains(&2)));
    }

    #[test]
    fn in_circle_matches_known_containment() {
        let pts = vec![v(0, 0), v(4, 0), v(0, 4), v(1, 1), v(10, 10)];
        assert_eq!(in_circle(&pts, 0, 1, 2, 3), Sign::Pos);
        assert_eq!(in_circle(&pts, 0, 1, 2, 4), Sign::Neg);
    }
}
