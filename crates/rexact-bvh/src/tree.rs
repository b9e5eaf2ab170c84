use glam::DVec3;

/// An axis-aligned bounding box in double precision.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    pub fn empty() -> Self {
        Aabb { min: DVec3::splat(f64::INFINITY), max: DVec3::splat(f64::NEG_INFINITY) }
    }

    pub fn from_point(p: DVec3) -> Self {
        Aabb { min: p, max: p }
    }

    pub fn extend_point(&mut self, p: DVec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn extend_box(&mut self, other: &Aabb) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    pub fn diagonal(&self) -> f64 {
        (self.max - self.min).length()
    }

    /// Signed padding by 1e-8 of the box's own diagonal, to avoid missing
    /// exact-touching cases at leaf insertion.
    pub fn padded(&self) -> Aabb {
        let eps = self.diagonal() * 1e-8;
        Aabb { min: self.min - DVec3::splat(eps), max: self.max + DVec3::splat(eps) }
    }

    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    pub fn contains_point(&self, p: DVec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }

    pub fn dist2_to_point(&self, p: DVec3) -> f64 {
        let dx = (self.min.x - p.x).max(0.0).max(p.x - self.max.x);
        let dy = (self.min.y - p.y).max(0.0).max(p.y - self.max.y);
        let dz = (self.min.z - p.z).max(0.0).max(p.z - self.max.z);
        dx * dx + dy * dy + dz * dz
    }

    fn longest_axis(&self) -> usize {
        let d = self.max - self.min;
        if d.x >= d.y && d.x >= d.z {
            0
        } else if d.y >= d.z {
            1
        } else {
            2
        }
    }

    fn centroid(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }
}

struct Node {
    bounds: Aabb,
    prim: Option<u32>,
    left: Option<u32>,
    right: Option<u32>,
}

/// A balanced binary AABB tree. Children are always pushed before their
/// parent, so node index order is itself a valid bottom-up traversal order —
/// `update` relies on this to refit without any recursion.
pub struct Tree {
    nodes: Vec<Node>,
    root: Option<u32>,
}

impl Tree {
    /// Builds a balanced tree by repeatedly splitting the longest axis at
    /// the median primitive.
    pub fn init(boxes: &[Aabb]) -> Self {
        if boxes.is_empty() {
            return Tree { nodes: Vec::new(), root: None };
        }
        let mut items: Vec<(u32, Aabb)> = boxes.iter().enumerate().map(|(i, b)| (i as u32, b.padded())).collect();
        let mut nodes = Vec::new();
        let root = build(&mut items, &mut nodes);
        Tree { nodes, root: Some(root) }
    }

    /// Refits every box bottom-up without changing topology; valid for
    /// small deformations between successive calls to `init`.
    pub fn update(&mut self, boxes: &[Aabb]) {
        for node in self.nodes.iter_mut() {
            if let Some(prim) = node.prim {
                node.bounds = boxes[prim as usize].padded();
            }
        }
        for i in 0..self.nodes.len() {
            if self.nodes[i].prim.is_none() {
                let l = self.nodes[i].left.unwrap() as usize;
                let r = self.nodes[i].right.unwrap() as usize;
                let mut b = self.nodes[l].bounds;
                b.extend_box(&self.nodes[r].bounds);
                self.nodes[i].bounds = b;
            }
        }
    }

    pub fn root(&self) -> Option<u32> {
        self.root
    }

    pub fn bounds(&self, node: u32) -> &Aabb {
        &self.nodes[node as usize].bounds
    }

    pub fn traverse(&self, visitor: &mut impl super::Traverser) {
        if let Some(root) = self.root {
            self.traverse_node(root, visitor);
        }
    }

    fn traverse_node(&self, idx: u32, visitor: &mut impl super::Traverser) {
        let node = &self.nodes[idx as usize];
        if !visitor.overlap(&node.bounds) {
            return;
        }
        match node.prim {
            Some(p) => visitor.leaf(p),
            None => {
                self.traverse_node(node.left.unwrap(), visitor);
                self.traverse_node(node.right.unwrap(), visitor);
            }
        }
    }
}

fn build(items: &mut [(u32, Aabb)], nodes: &mut Vec<Node>) -> u32 {
    if items.len() == 1 {
        let (prim, bounds) = items[0];
        nodes.push(Node { bounds, prim: Some(prim), left: None, right: None });
        return (nodes.len() - 1) as u32;
    }

    let mut bounds = Aabb::empty();
    for (_, b) in items.iter() {
        bounds.extend_box(b);
    }
    let axis = bounds.longest_axis();
    items.sort_by(|a, b| {
        let ca = a.1.centroid();
        let cb = b.1.centroid();
        let (va, vb) = match axis {
            0 => (ca.x, cb.x),
            1 => (ca.y, cb.y),
            _ => (ca.z, cb.z),
        };
        va.partial_cmp(&vb).unwrap()
    });
    let mid = items.len() / 2;
    let (left_items, right_items) = items.split_at_mut(mid);
    let left = build(left_items, nodes);
    let right = build(right_items, nodes);
    let mut node_bounds = nodes[left as usize].bounds;
    node_bounds.extend_box(&nodes[right as usize].bounds);
    nodes.push(Node { bounds: node_bounds, prim: None, left: Some(left), right: Some(right) });
    (nodes.len() - 1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_empty_tree_has_no_root() {
        let tree = Tree::init(&[]);
        assert_eq!(tree.root(), None);
    }

    #[test]
    fn init_single_box() {
        let boxes = vec![Aabb { min: DVec3::new(0.0, 0.0, 0.0), max: DVec3::new(1.0, 1.0, 1.0) }];
        let tree = Tree::init(&boxes);
        assert!(tree.root().is_some());
    }

    #[test]
    fn update_refits_without_changing_node_count() {
        let boxes = vec![
            Aabb { min: DVec3::splat(0.0), max: DVec3::splat(1.0) },
            Aabb { min: DVec3::splat(5.0), max: DVec3::splat(6.0) },
            Aabb { min: DVec3::splat(10.0), max: DVec3::splat(11.0) },
        ];
        let mut tree = Tree::init(&boxes);
        let node_count = tree.nodes.len();
        let moved = vec![
            Aabb { min: DVec3::splat(100.0), max: DVec3::splat(101.0) },
            Aabb { min: DVec3::splat(5.0), max: DVec3::splat(6.0) },
            Aabb { min: DVec3::splat(10.0), max: DVec3::splat(11.0) },
        ];
        tree.update(&moved);
        assert_eq!(tree.nodes.len(), node_count);
        let root = tree.root().unwrap();
        assert!(tree.bounds(root).max.x >= 100.0);
    }
}
