use crate::MeshAdapter;
use metric_tensor::Dim;
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::Bfs;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("node {node} has {actual} coordinates, expected {expected}")]
    CoordinateLength {
        node: usize,
        expected: usize,
        actual: usize,
    },
    #[error("element {element} has {actual} nodes, expected {expected}")]
    ElementArity {
        element: usize,
        expected: usize,
        actual: usize,
    },
    #[error("element {element} references node {node}, but the mesh only has {num_nodes} nodes")]
    NodeOutOfRange {
        element: usize,
        node: usize,
        num_nodes: usize,
    },
    #[error("new2old permutation length {actual} does not match node count {expected}")]
    PermutationLength { expected: usize, actual: usize },
}

/// A self-contained, in-memory mesh: a node coordinate array and an
/// element-node list. Builds its own adjacency graph (for BFS patch
/// expansion) and boundary classification on construction. Exists purely
/// as a reference fixture for tests and the demo CLI — a production mesh
/// container is an external collaborator the core never depends on
/// directly.
pub struct InMemoryMesh {
    dim: Dim,
    coords: Vec<Vec<f64>>,
    elements: Vec<Vec<usize>>,
    adjacency: UnGraph<(), ()>,
    boundary: Vec<bool>,
    new2old: Vec<usize>,
}

impl InMemoryMesh {
    /// Builds a mesh from node coordinates and an element-node list, using
    /// the identity renumbering (`new2old(i) == i`).
    pub fn new(dim: Dim, coords: Vec<Vec<f64>>, elements: Vec<Vec<usize>>) -> Result<Self, MeshError> {
        let n = coords.len();
        let new2old = (0..n).collect();
        Self::with_renumbering(dim, coords, elements, new2old)
    }

    /// Builds a mesh with an explicit `new2old` renumbering (index `i` in
    /// the internal ordering maps to `new2old[i]` in the caller's original
    /// ordering).
    pub fn with_renumbering(
        dim: Dim,
        coords: Vec<Vec<f64>>,
        elements: Vec<Vec<usize>>,
        new2old: Vec<usize>,
    ) -> Result<Self, MeshError> {
        let n = coords.len();
        let d = dim.n();

        for (i, c) in coords.iter().enumerate() {
            if c.len() != d {
                return Err(MeshError::CoordinateLength {
                    node: i,
                    expected: d,
                    actual: c.len(),
                });
            }
        }
        for (e, nodes) in elements.iter().enumerate() {
            if nodes.len() != d + 1 {
                return Err(MeshError::ElementArity {
                    element: e,
                    expected: d + 1,
                    actual: nodes.len(),
                });
            }
            for &node in nodes {
                if node >= n {
                    return Err(MeshError::NodeOutOfRange {
                        element: e,
                        node,
                        num_nodes: n,
                    });
                }
            }
        }
        if new2old.len() != n {
            return Err(MeshError::PermutationLength {
                expected: n,
                actual: new2old.len(),
            });
        }

        let mut adjacency = UnGraph::<(), ()>::with_capacity(n, elements.len() * d);
        for _ in 0..n {
            adjacency.add_node(());
        }
        for nodes in &elements {
            for i in 0..nodes.len() {
                for j in (i + 1)..nodes.len() {
                    let a = NodeIndex::new(nodes[i]);
                    let b = NodeIndex::new(nodes[j]);
                    if adjacency.find_edge(a, b).is_none() {
                        adjacency.add_edge(a, b, ());
                    }
                }
            }
        }

        let boundary = classify_boundary(n, &elements, d);

        Ok(InMemoryMesh {
            dim,
            coords,
            elements,
            adjacency,
            boundary,
            new2old,
        })
    }
}

/// A node is on the boundary iff it belongs to a face (an edge in 2D, a
/// triangle in 3D) shared by exactly one element.
fn classify_boundary(n: usize, elements: &[Vec<usize>], d: usize) -> Vec<bool> {
    let mut face_counts: HashMap<Vec<usize>, usize> = HashMap::new();
    for nodes in elements {
        for skip in 0..nodes.len() {
            let mut face: Vec<usize> = nodes
                .iter()
                .enumerate()
                .filter(|&(idx, _)| idx != skip)
                .map(|(_, &v)| v)
                .collect();
            face.sort_unstable();
            debug_assert_eq!(face.len(), d);
            *face_counts.entry(face).or_insert(0) += 1;
        }
    }

    let mut boundary = vec![false; n];
    for (face, count) in face_counts {
        if count == 1 {
            for node in face {
                boundary[node] = true;
            }
        }
    }
    boundary
}

impl MeshAdapter for InMemoryMesh {
    fn num_nodes(&self) -> usize {
        self.coords.len()
    }

    fn num_elements(&self) -> usize {
        self.elements.len()
    }

    fn dimension(&self) -> Dim {
        self.dim
    }

    fn coords(&self, i: usize) -> &[f64] {
        &self.coords[i]
    }

    fn element(&self, e: usize) -> &[usize] {
        &self.elements[e]
    }

    fn expand_patch(&self, i: usize, min_required: usize) -> Vec<usize> {
        let start = NodeIndex::new(i);
        let mut bfs = Bfs::new(&self.adjacency, start);
        let mut seen = HashSet::new();
        let mut patch = Vec::new();
        // first yield from Bfs is always the start node itself; skip it.
        bfs.next(&self.adjacency);
        while patch.len() < min_required {
            match bfs.next(&self.adjacency) {
                Some(node) => {
                    let idx = node.index();
                    if idx != i && seen.insert(idx) {
                        patch.push(idx);
                    }
                }
                None => break,
            }
        }
        patch
    }

    fn on_boundary(&self, i: usize) -> bool {
        self.boundary[i]
    }

    fn new2old(&self, i: usize) -> usize {
        self.new2old[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_square_grid() -> InMemoryMesh {
        // 2x2 grid of nodes split into two triangles per cell (1x1 cell here).
        let coords = vec![
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 1.0],
        ];
        let elements = vec![vec![0, 1, 2], vec![1, 3, 2]];
        InMemoryMesh::new(Dim::Two, coords, elements).unwrap()
    }

    #[test]
    fn boundary_classification_on_unit_square() {
        let mesh = unit_square_grid();
        // every node of a 2-triangle unit square is on the hull boundary
        for i in 0..4 {
            assert!(mesh.on_boundary(i), "node {i} should be boundary");
        }
    }

    #[test]
    fn interior_node_is_not_boundary() {
        // a small fan of 4 triangles around a center node
        let coords = vec![
            vec![0.0, 0.0],   // 0: center
            vec![1.0, 0.0],   // 1
            vec![0.0, 1.0],   // 2
            vec![-1.0, 0.0],  // 3
            vec![0.0, -1.0],  // 4
        ];
        let elements = vec![
            vec![0, 1, 2],
            vec![0, 2, 3],
            vec![0, 3, 4],
            vec![0, 4, 1],
        ];
        let mesh = InMemoryMesh::new(Dim::Two, coords, elements).unwrap();
        assert!(!mesh.on_boundary(0), "center node should not be boundary");
        for i in 1..5 {
            assert!(mesh.on_boundary(i));
        }
    }

    #[test]
    fn expand_patch_excludes_self_and_meets_minimum() {
        let mesh = unit_square_grid();
        let patch = mesh.expand_patch(0, 2);
        assert!(!patch.contains(&0));
        assert!(patch.len() >= 2);
    }

    #[test]
    fn expand_patch_stops_when_mesh_exhausted() {
        let mesh = unit_square_grid();
        // only 3 other nodes exist in total
        let patch = mesh.expand_patch(0, 100);
        assert_eq!(patch.len(), 3);
    }

    #[test]
    fn identity_new2old_by_default() {
        let mesh = unit_square_grid();
        for i in 0..4 {
            assert_eq!(mesh.new2old(i), i);
        }
    }

    #[test]
    fn rejects_out_of_range_element_node() {
        let coords = vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]];
        let elements = vec![vec![0, 1, 5]];
        let err = InMemoryMesh::new(Dim::Two, coords, elements).unwrap_err();
        assert!(matches!(err, MeshError::NodeOutOfRange { .. }));
    }

    #[test]
    fn rejects_wrong_element_arity() {
        let coords = vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![0.0, 1.0]];
        let elements = vec![vec![0, 1]];
        let err = InMemoryMesh::new(Dim::Two, coords, elements).unwrap_err();
        assert!(matches!(err, MeshError::ElementArity { .. }));
    }
}
