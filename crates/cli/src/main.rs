//! Demo harness driving the metric-construction pipeline over a synthetic
//! uniform grid, for manual smoke-testing. Not a production CLI: the mesh
//! container, field generator, and any output format are all hard-coded.

use metric::{Dim, InMemoryMesh, MeshAdapter, MetricField};

fn synthetic_grid(n_per_side: usize) -> InMemoryMesh {
    let h = 1.0 / (n_per_side - 1) as f64;
    let mut coords = Vec::with_capacity(n_per_side * n_per_side);
    for j in 0..n_per_side {
        for i in 0..n_per_side {
            coords.push(vec![i as f64 * h, j as f64 * h]);
        }
    }
    let idx = |i: usize, j: usize| j * n_per_side + i;
    let mut elements = Vec::new();
    for j in 0..n_per_side - 1 {
        for i in 0..n_per_side - 1 {
            let a = idx(i, j);
            let b = idx(i + 1, j);
            let c = idx(i, j + 1);
            let d = idx(i + 1, j + 1);
            elements.push(vec![a, b, c]);
            elements.push(vec![b, d, c]);
        }
    }
    InMemoryMesh::new(Dim::Two, coords, elements).expect("synthetic grid is well-formed")
}

fn main() {
    env_logger::init();

    let n_per_side = 41;
    let mesh = synthetic_grid(n_per_side);
    let psi: Vec<f64> = (0..mesh.num_nodes())
        .map(|i| {
            let c = mesh.coords(i);
            c[0] * c[0] + 0.5 * c[1] * c[1]
        })
        .collect();

    let mut field = MetricField::new(&mesh);
    field
        .add_field(&psi, 0.01, -1.0)
        .expect("target_error and field length are valid by construction here");
    field
        .apply_max_edge_length(0.5)
        .expect("edge length is valid by construction here");
    field
        .apply_max_nelements(5000.0)
        .expect("target element count is valid by construction here");

    log::info!(
        "synthetic grid: {} nodes, predicted nelements = {:.1}, diagnostics = {:?}",
        mesh.num_nodes(),
        field.predict_nelements(),
        field.diagnostics()
    );
}
