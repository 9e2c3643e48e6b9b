//! The metric-assembly orchestrator: initialises a per-node tensor field
//! from the mesh bounding box, absorbs scalar-field contributions via
//! Hessian recovery and intersection, and applies edge-length / element-
//! count constraints.
//!
//! Parallelised over nodes and elements with `rayon`, matching the rest of
//! the pipeline.

use hessian_recovery::{recover, RecoveryConfig};
use mesh_adapter::{Dim, MeshAdapter};
use metric_geometry::{area, volume};
use metric_tensor::{IntersectMode, Tensor};
use rayon::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricError {
    #[error("target_error must be > 0, got {0}")]
    InvalidParameter(String),
    #[error("field length {actual} does not match node count {expected}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("aspect-ratio constraints are not implemented")]
    NotImplemented,
}

/// Counters for per-node numeric issues that never abort construction:
/// singular Hessian fits and non-SPD repairs during intersection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub numeric_singularities: usize,
    pub non_spd_repairs: usize,
}

/// Owns the per-node metric tensor array for a mesh of fixed size `N`.
/// Borrows the mesh for its lifetime; never owns or mutates it.
pub struct MetricField<'a> {
    mesh: &'a dyn MeshAdapter,
    tensors: Vec<Tensor>,
    diagnostics: Diagnostics,
    recovery_config: RecoveryConfig,
}

impl<'a> MetricField<'a> {
    /// Initialises every node's tensor to a diagonal metric from the
    /// domain's axis-aligned bounding box: `1/(extent_k)^2` per dimension
    /// `k`. This is the coarsest meaningful metric, so the first
    /// intersection always tightens it.
    pub fn new(mesh: &'a dyn MeshAdapter) -> Self {
        let dim = mesh.dimension();
        let n = dim.n();
        let num_nodes = mesh.num_nodes();

        let mut lo = vec![f64::INFINITY; n];
        let mut hi = vec![f64::NEG_INFINITY; n];
        for i in 0..num_nodes {
            let c = mesh.coords(i);
            for k in 0..n {
                lo[k] = lo[k].min(c[k]);
                hi[k] = hi[k].max(c[k]);
            }
        }
        let eigenvalues: Vec<f64> = (0..n)
            .map(|k| {
                let extent = (hi[k] - lo[k]).max(f64::MIN_POSITIVE);
                1.0 / (extent * extent)
            })
            .collect();
        let bbox_tensor = Tensor::diagonal(dim, &eigenvalues)
            .expect("eigenvalues length matches dimension by construction");

        let tensors: Vec<Tensor> = (0..num_nodes)
            .into_par_iter()
            .map(|_| bbox_tensor)
            .collect();

        log::debug!(
            "metric field initialised: {} nodes, dim={:?}, bbox extents={:?}",
            num_nodes,
            dim,
            hi.iter().zip(&lo).map(|(h, l)| h - l).collect::<Vec<_>>()
        );

        MetricField {
            mesh,
            tensors,
            diagnostics: Diagnostics::default(),
            recovery_config: RecoveryConfig::default(),
        }
    }

    /// Overrides the [`RecoveryConfig`] used by [`MetricField::add_field`].
    /// Mainly useful for tests exercising small synthetic meshes that would
    /// otherwise trip the production patch-size floor.
    pub fn set_recovery_config(&mut self, config: RecoveryConfig) {
        self.recovery_config = config;
    }

    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    /// Absorbs a scalar field's contribution into the metric:
    /// 1. Permutes `psi` through `mesh.new2old(i)` into internal ordering.
    /// 2. Recovers a per-node Hessian.
    /// 3. Scales each Hessian by `eta` (relative-error mode when `sigma >
    ///    0.0`, else absolute).
    /// 4. Intersects the scaled Hessian into the node's current metric;
    ///    `constrain` repairs it to SPD itself and reports whether that
    ///    repair fired, which is tallied into `diagnostics().non_spd_repairs`.
    pub fn add_field(&mut self, psi: &[f64], target_error: f64, sigma: f64) -> Result<(), MetricError> {
        if target_error <= 0.0 {
            return Err(MetricError::InvalidParameter(format!(
                "target_error must be > 0, got {target_error}"
            )));
        }
        let num_nodes = self.mesh.num_nodes();
        if psi.len() != num_nodes {
            return Err(MetricError::ShapeMismatch {
                expected: num_nodes,
                actual: psi.len(),
            });
        }

        let psi_internal: Vec<f64> = (0..num_nodes)
            .into_par_iter()
            .map(|i| psi[self.mesh.new2old(i)])
            .collect();

        let (hessians, recovery_diag) = recover(self.mesh, &psi_internal, &self.recovery_config)
            .map_err(|e| match e {
                hessian_recovery::HessianError::ShapeMismatch { expected, actual } => {
                    MetricError::ShapeMismatch { expected, actual }
                }
            })?;
        self.diagnostics.numeric_singularities += recovery_diag.singular_nodes;

        let dim = self.mesh.dimension();
        let n = dim.n();

        let results: Vec<(Tensor, bool)> = (0..num_nodes)
            .into_par_iter()
            .map(|i| {
                let eta = if sigma > 0.0 {
                    1.0 / (target_error * psi[self.mesh.new2old(i)].abs()).max(sigma)
                } else {
                    1.0 / target_error
                };
                let mut h_scaled = vec![0.0; n * n];
                for (k, v) in hessians.row(i).iter().enumerate() {
                    h_scaled[k] = v * eta;
                }
                let field_tensor = Tensor::from_buffer(dim, &h_scaled)
                    .expect("hessian buffer length matches dimension");
                let mut current = self.tensors[i];
                let was_repaired = current
                    .constrain(&field_tensor, IntersectMode::UseMin)
                    .expect("dimensions always match within a single MetricField");
                (current, was_repaired)
            })
            .collect();

        for (i, (t, was_repaired)) in results.into_iter().enumerate() {
            self.tensors[i] = t;
            if was_repaired {
                self.diagnostics.non_spd_repairs += 1;
            }
        }

        log::debug!(
            "add_field: {} nodes, {} singular, {} repairs this call",
            num_nodes,
            recovery_diag.singular_nodes,
            self.diagnostics.non_spd_repairs
        );
        Ok(())
    }

    fn constrain_all_with_diagonal(&mut self, value: f64, mode: IntersectMode) {
        let dim = self.mesh.dimension();
        let n = dim.n();
        let bound = Tensor::diagonal(dim, &vec![value; n])
            .expect("diagonal length matches dimension by construction");
        self.tensors.par_iter_mut().for_each(|t| {
            t.constrain(&bound, mode)
                .expect("dimensions always match within a single MetricField");
        });
    }

    /// Forbids edges longer than `L`: constrains every node's metric with a
    /// diagonal `1/L^2` tensor in `UseMin` mode.
    pub fn apply_max_edge_length(&mut self, length: f64) -> Result<(), MetricError> {
        if length <= 0.0 {
            return Err(MetricError::InvalidParameter(format!(
                "edge length must be > 0, got {length}"
            )));
        }
        self.constrain_all_with_diagonal(1.0 / (length * length), IntersectMode::UseMin);
        Ok(())
    }

    /// Forbids edges shorter than `L`: constrains every node's metric with a
    /// diagonal `1/L^2` tensor in `UseMax` mode.
    pub fn apply_min_edge_length(&mut self, length: f64) -> Result<(), MetricError> {
        if length <= 0.0 {
            return Err(MetricError::InvalidParameter(format!(
                "edge length must be > 0, got {length}"
            )));
        }
        self.constrain_all_with_diagonal(1.0 / (length * length), IntersectMode::UseMax);
        Ok(())
    }

    /// Uniformly rescales every tensor by `s = (n / predict_nelements())^(2/d)`,
    /// asymptotically matching the target element count while preserving
    /// directional anisotropy.
    pub fn apply_nelements(&mut self, n: f64) -> Result<(), MetricError> {
        if n < 0.0 {
            return Err(MetricError::InvalidParameter(format!(
                "target element count must be >= 0, got {n}"
            )));
        }
        let predicted = self.predict_nelements();
        if predicted <= 0.0 {
            return Ok(());
        }
        let d = self.mesh.dimension().n() as f64;
        let s = (n / predicted).powf(2.0 / d);
        self.tensors.par_iter_mut().for_each(|t| t.scale(s));
        log::debug!("apply_nelements({n}): predicted={predicted}, scale={s}");
        Ok(())
    }

    /// One-sided: only shrinks. A no-op unless the current prediction
    /// exceeds `n`.
    pub fn apply_max_nelements(&mut self, n: f64) -> Result<(), MetricError> {
        if n < 0.0 {
            return Err(MetricError::InvalidParameter(format!(
                "target element count must be >= 0, got {n}"
            )));
        }
        if self.predict_nelements() > n {
            self.apply_nelements(n)?;
        }
        Ok(())
    }

    /// One-sided: only grows. A no-op unless the current prediction falls
    /// below `n`.
    pub fn apply_min_nelements(&mut self, n: f64) -> Result<(), MetricError> {
        if n < 0.0 {
            return Err(MetricError::InvalidParameter(format!(
                "target element count must be >= 0, got {n}"
            )));
        }
        if self.predict_nelements() < n {
            self.apply_nelements(n)?;
        }
        Ok(())
    }

    /// Reserved for a future aspect-ratio clamp; not yet implemented.
    pub fn apply_max_aspect_ratio(&mut self, _ratio: f64) -> Result<(), MetricError> {
        Err(MetricError::NotImplemented)
    }

    /// Integrates `sqrt(det(M))` over the current mesh and divides by the
    /// ideal simplex measure in metric space. Returns 0 when the mesh has
    /// no elements.
    pub fn predict_nelements(&self) -> f64 {
        let dim = self.mesh.dimension();
        let num_elements = self.mesh.num_elements();
        if num_elements == 0 {
            return 0.0;
        }

        let ideal_measure = match dim {
            Dim::Two => 3.0_f64.sqrt() / 4.0,
            Dim::Three => 1.0 / 72.0_f64.sqrt(),
        };

        let sum: f64 = (0..num_elements)
            .into_par_iter()
            .map(|e| {
                let nodes = self.mesh.element(e);
                let vertex_tensors: Vec<Tensor> = nodes.iter().map(|&v| self.tensors[v]).collect();
                let mean = Tensor::average(&vertex_tensors)
                    .expect("all vertex tensors share the field's dimension");
                let measure = match dim {
                    Dim::Two => {
                        let c: Vec<[f64; 2]> = nodes
                            .iter()
                            .map(|&v| {
                                let c = self.mesh.coords(v);
                                [c[0], c[1]]
                            })
                            .collect();
                        area(c[0], c[1], c[2])
                    }
                    Dim::Three => {
                        let c: Vec<[f64; 3]> = nodes
                            .iter()
                            .map(|&v| {
                                let c = self.mesh.coords(v);
                                [c[0], c[1], c[2]]
                            })
                            .collect();
                        volume(c[0], c[1], c[2], c[3])
                    }
                };
                measure * mean.determinant().max(0.0).sqrt()
            })
            .sum();

        sum / ideal_measure
    }

    /// Bulk copy of the internal tensor array into a caller buffer of size
    /// `N * d^2`, row-major per node.
    pub fn get_metric(&self, out: &mut [f64]) -> Result<(), MetricError> {
        let n = self.mesh.dimension().n();
        let expected = self.tensors.len() * n * n;
        if out.len() != expected {
            return Err(MetricError::ShapeMismatch {
                expected,
                actual: out.len(),
            });
        }
        for (i, t) in self.tensors.iter().enumerate() {
            out[i * n * n..(i + 1) * n * n].copy_from_slice(t.get());
        }
        Ok(())
    }

    pub fn num_nodes(&self) -> usize {
        self.tensors.len()
    }

    pub fn tensor(&self, i: usize) -> &Tensor {
        &self.tensors[i]
    }
}
