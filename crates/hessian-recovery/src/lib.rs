//! Nodewise Hessian recovery: for each mesh node, fit a local quadratic
//! polynomial to a patch of neighbours by least squares and extract the
//! second derivatives.
//!
//! Parallelised over nodes with `rayon`, matching the data-parallel
//! node/element kernels the rest of the metric-construction pipeline uses.

mod lu;
mod monomial;

use mesh_adapter::{Dim, MeshAdapter};
use ndarray::Array2;
use rayon::prelude::*;
use thiserror::Error;

/// Tunable parameters for [`recover`]. Defaults match the production
/// constants from the metric-construction design: patches of at least 6
/// (2D) / 9 (3D) neighbours, doubled at the boundary.
#[derive(Debug, Clone, Copy)]
pub struct RecoveryConfig {
    pub min_patch_2d: usize,
    pub min_patch_3d: usize,
    pub boundary_multiplier: usize,
    /// A node's normal-equation solve is rejected (treated as singular) if
    /// the ratio of the largest to smallest pivot magnitude exceeds this.
    pub condition_threshold: f64,
    /// A pivot smaller than `pivot_floor_ratio * max|A|` is treated as a
    /// singular system.
    pub pivot_floor_ratio: f64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        RecoveryConfig {
            min_patch_2d: 6,
            min_patch_3d: 9,
            boundary_multiplier: 2,
            condition_threshold: 1e14,
            pivot_floor_ratio: 1e-30,
        }
    }
}

/// Per-node failure counters accumulated during a [`recover`] call.
/// Per spec, a singular node's Hessian is simply left at zero — this
/// never aborts recovery, it is only ever reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryDiagnostics {
    pub singular_nodes: usize,
}

#[derive(Debug, Error)]
pub enum HessianError {
    #[error("field length {actual} does not match node count {expected}")]
    ShapeMismatch { expected: usize, actual: usize },
}

/// Recovers a symmetric (not necessarily SPD) Hessian at every mesh node
/// from a dense scalar field `psi` given in the mesh's *internal* node
/// ordering (callers permute through [`MeshAdapter::new2old`] beforehand).
///
/// Returns an `(N, d*d)` row-major array of flattened Hessians plus
/// diagnostics counting how many nodes hit a singular normal-equation
/// system (for those nodes the row is left as zero).
pub fn recover(
    mesh: &dyn MeshAdapter,
    psi: &[f64],
    config: &RecoveryConfig,
) -> Result<(Array2<f64>, RecoveryDiagnostics), HessianError> {
    let n = mesh.num_nodes();
    if psi.len() != n {
        return Err(HessianError::ShapeMismatch {
            expected: n,
            actual: psi.len(),
        });
    }
    let d = mesh.dimension().n();
    let entries_per_node = d * d;

    let rows: Vec<Option<Vec<f64>>> = (0..n)
        .into_par_iter()
        .map(|i| compute_node_hessian(mesh, psi, i, config))
        .collect();

    let mut diagnostics = RecoveryDiagnostics::default();
    let mut out = Array2::<f64>::zeros((n, entries_per_node));
    for (i, row) in rows.into_iter().enumerate() {
        match row {
            Some(h) => {
                for (k, v) in h.into_iter().enumerate() {
                    out[[i, k]] = v;
                }
            }
            None => diagnostics.singular_nodes += 1,
        }
    }
    log::debug!(
        "hessian recovery: {} nodes, {} singular",
        n,
        diagnostics.singular_nodes
    );
    Ok((out, diagnostics))
}

/// Fits the local quadratic to node `i`'s patch and returns the flattened
/// symmetric Hessian, or `None` if the normal equations are singular.
///
/// Node `i` is added to the normal-equation sums exactly once: the patch
/// returned by [`MeshAdapter::expand_patch`] excludes `i` by contract, so
/// this loop adds `i`'s own sample before folding in the patch, avoiding
/// the double-counting ambiguity.
fn compute_node_hessian(
    mesh: &dyn MeshAdapter,
    psi: &[f64],
    i: usize,
    config: &RecoveryConfig,
) -> Option<Vec<f64>> {
    let dim = mesh.dimension();
    let base_min = match dim {
        Dim::Two => config.min_patch_2d,
        Dim::Three => config.min_patch_3d,
    };
    let min_required = if mesh.on_boundary(i) {
        base_min * config.boundary_multiplier
    } else {
        base_min
    };

    let patch = mesh.expand_patch(i, min_required);
    let basis_size = match dim {
        Dim::Two => 6,
        Dim::Three => 10,
    };

    let mut a = vec![0.0; basis_size * basis_size];
    let mut b = vec![0.0; basis_size];

    let mut accumulate = |node: usize| {
        let coords = mesh.coords(node);
        let m = monomial::evaluate(dim, coords);
        for r in 0..basis_size {
            b[r] += psi[node] * m[r];
            for c in 0..basis_size {
                a[r * basis_size + c] += m[r] * m[c];
            }
        }
    };
    accumulate(i);
    for &node in &patch {
        accumulate(node);
    }

    let coeffs = lu::solve_spd_like(
        &a,
        &b,
        basis_size,
        config.pivot_floor_ratio,
        config.condition_threshold,
    )?;

    Some(monomial::hessian_from_coeffs(dim, &coeffs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_adapter::InMemoryMesh;

    /// 11x11 uniform grid on the unit square, two triangles per cell.
    fn uniform_grid_2d(n_per_side: usize) -> (InMemoryMesh, Vec<f64>) {
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
        let mesh = InMemoryMesh::new(Dim::Two, coords.clone(), elements).unwrap();
        let psi: Vec<f64> = coords.iter().map(|c| c[0] * c[0]).collect();
        (mesh, psi)
    }

    #[test]
    fn recovers_exact_hessian_for_quadratic_field() {
        let (mesh, psi) = uniform_grid_2d(11);
        let (h, diag) = recover(&mesh, &psi, &RecoveryConfig::default()).unwrap();
        assert_eq!(diag.singular_nodes, 0);

        // an interior node, far from the boundary
        let n_per_side = 11;
        let center = (n_per_side / 2) * n_per_side + n_per_side / 2;
        // psi = x^2 => H = [[2, 0], [0, 0]]
        assert!((h[[center, 0]] - 2.0).abs() < 1e-8, "h_xx = {}", h[[center, 0]]);
        assert!((h[[center, 1]]).abs() < 1e-8, "h_xy = {}", h[[center, 1]]);
        assert!((h[[center, 3]]).abs() < 1e-8, "h_yy = {}", h[[center, 3]]);
    }

    #[test]
    fn constant_field_recovers_zero_hessian() {
        let (mesh, _) = uniform_grid_2d(11);
        let psi = vec![7.0; mesh.num_nodes()];
        let (h, diag) = recover(&mesh, &psi, &RecoveryConfig::default()).unwrap();
        assert_eq!(diag.singular_nodes, 0);
        for v in h.iter() {
            assert!(v.abs() < 1e-6, "expected ~0, got {v}");
        }
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let (mesh, _) = uniform_grid_2d(5);
        let bad_psi = vec![0.0; mesh.num_nodes() + 1];
        let err = recover(&mesh, &bad_psi, &RecoveryConfig::default()).unwrap_err();
        assert!(matches!(err, HessianError::ShapeMismatch { .. }));
    }
}
