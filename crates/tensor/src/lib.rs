//! Symmetric positive-definite tensor algebra for anisotropic mesh metrics.
//!
//! A [`Tensor`] represents a 2x2 or 3x3 SPD matrix attached to a mesh node.
//! Its eigenvalues encode desired edge lengths along the corresponding
//! eigendirections (`h = 1/sqrt(lambda)`); [`Tensor::constrain`] is the
//! lattice "intersection" operation that combines two such metrics into
//! the one that is at least as fine as either input.

mod eigen;

use thiserror::Error;

pub use eigen::Eigen;

/// SPD floor: eigenvalues below this are clamped up to keep a tensor SPD.
pub const EPS_ABS: f64 = 1e-30;

/// Spatial dimension of a metric tensor: 2 (triangles) or 3 (tetrahedra).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dim {
    Two,
    Three,
}

impl Dim {
    #[inline]
    pub fn n(self) -> usize {
        match self {
            Dim::Two => 2,
            Dim::Three => 3,
        }
    }

    pub fn from_usize(n: usize) -> Result<Self, TensorError> {
        match n {
            2 => Ok(Dim::Two),
            3 => Ok(Dim::Three),
            other => Err(TensorError::UnsupportedDimension(other)),
        }
    }
}

#[derive(Debug, Error)]
pub enum TensorError {
    #[error("dimension mismatch: {0} vs {1}")]
    DimensionMismatch(usize, usize),
    #[error("buffer length {actual} does not match the {expected} entries required for this dimension")]
    BufferLength { expected: usize, actual: usize },
    #[error("only dimension 2 or 3 is supported, got {0}")]
    UnsupportedDimension(usize),
}

/// Mode for [`Tensor::constrain`]: which of the two combined resolutions to
/// keep along each eigendirection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntersectMode {
    /// Keep the finer of the two metrics (max eigenvalue = min edge length).
    UseMin,
    /// Keep the coarser of the two metrics (min eigenvalue = max edge length).
    UseMax,
}

/// A symmetric positive-definite d x d tensor, d in {2, 3}, stored
/// row-major in a fixed 9-entry buffer (only the first `n*n` entries are
/// meaningful).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tensor {
    dim: Dim,
    data: [f64; 9],
}

impl Tensor {
    #[inline]
    fn idx(n: usize, i: usize, j: usize) -> usize {
        i * n + j
    }

    /// Builds a tensor from a raw row-major d*d buffer, symmetrising it
    /// (averaging with its transpose) in the process.
    pub fn from_buffer(dim: Dim, buffer: &[f64]) -> Result<Self, TensorError> {
        let n = dim.n();
        if buffer.len() != n * n {
            return Err(TensorError::BufferLength {
                expected: n * n,
                actual: buffer.len(),
            });
        }
        let mut data = [0.0; 9];
        for i in 0..n {
            for j in 0..n {
                let a = buffer[Self::idx(n, i, j)];
                let b = buffer[Self::idx(n, j, i)];
                data[Self::idx(n, i, j)] = 0.5 * (a + b);
            }
        }
        Ok(Tensor { dim, data })
    }

    /// Identity scaled by `scalar`: `scalar * I`.
    pub fn identity(dim: Dim, scalar: f64) -> Self {
        let n = dim.n();
        let mut data = [0.0; 9];
        for i in 0..n {
            data[Self::idx(n, i, i)] = scalar;
        }
        Tensor { dim, data }
    }

    /// Diagonal tensor from a d-length vector of eigenvalues.
    pub fn diagonal(dim: Dim, values: &[f64]) -> Result<Self, TensorError> {
        let n = dim.n();
        if values.len() != n {
            return Err(TensorError::BufferLength {
                expected: n,
                actual: values.len(),
            });
        }
        let mut data = [0.0; 9];
        for i in 0..n {
            data[Self::idx(n, i, i)] = values[i];
        }
        Ok(Tensor { dim, data })
    }

    pub fn dim(&self) -> Dim {
        self.dim
    }

    pub fn n(&self) -> usize {
        self.dim.n()
    }

    /// Replaces this tensor's entries in place, symmetrising the input.
    pub fn set(&mut self, buffer: &[f64]) -> Result<(), TensorError> {
        *self = Tensor::from_buffer(self.dim, buffer)?;
        Ok(())
    }

    /// Returns the row-major d*d view of this tensor's entries.
    pub fn get(&self) -> &[f64] {
        &self.data[..self.n() * self.n()]
    }

    pub fn entry(&self, i: usize, j: usize) -> f64 {
        self.data[Self::idx(self.n(), i, j)]
    }

    /// Multiplies every entry by `s`. Equivalent to dividing target edge
    /// lengths by `sqrt(s)`.
    pub fn scale(&mut self, s: f64) {
        let n = self.n();
        for v in self.data[..n * n].iter_mut() {
            *v *= s;
        }
    }

    /// Eigen-decomposition with values sorted descending.
    pub fn eigen_decompose(&self) -> Eigen {
        eigen::decompose(self.n(), self.get())
    }

    /// Row-major determinant, computed directly from the entries rather
    /// than from the eigenvalues (cheaper for the element-count predictor,
    /// which calls this once per mesh element).
    pub fn determinant(&self) -> f64 {
        match self.dim {
            Dim::Two => {
                let a = self.entry(0, 0);
                let b = self.entry(0, 1);
                let c = self.entry(1, 0);
                let d = self.entry(1, 1);
                a * d - b * c
            }
            Dim::Three => {
                let m = |i, j| self.entry(i, j);
                m(0, 0) * (m(1, 1) * m(2, 2) - m(1, 2) * m(2, 1))
                    - m(0, 1) * (m(1, 0) * m(2, 2) - m(1, 2) * m(2, 0))
                    + m(0, 2) * (m(1, 0) * m(2, 1) - m(1, 1) * m(2, 0))
            }
        }
    }

    /// Entrywise arithmetic mean of a non-empty slice of same-dimension
    /// tensors. Used by the element-count predictor to average the
    /// vertex tensors of a simplex.
    pub fn average(tensors: &[Tensor]) -> Result<Tensor, TensorError> {
        let dim = tensors[0].dim;
        let n = dim.n();
        let mut data = [0.0; 9];
        for t in tensors {
            if t.dim != dim {
                return Err(TensorError::DimensionMismatch(n, t.n()));
            }
            for k in 0..n * n {
                data[k] += t.data[k];
            }
        }
        let count = tensors.len() as f64;
        for v in data[..n * n].iter_mut() {
            *v /= count;
        }
        Ok(Tensor { dim, data })
    }

    /// Returns a copy of this tensor with its eigenvalues replaced by their
    /// absolute value, each clamped up to at least [`EPS_ABS`], so the
    /// result is SPD regardless of the input's definiteness.
    pub fn repaired(&self) -> Self {
        self.repaired_reporting().0
    }

    /// As [`Tensor::repaired`], additionally reporting whether any
    /// eigenvalue needed repair (was non-positive or below [`EPS_ABS`]).
    pub fn repaired_reporting(&self) -> (Self, bool) {
        let Eigen { mut values, vectors } = self.eigen_decompose();
        let mut repaired = false;
        for v in values.iter_mut() {
            let fixed = v.abs().max(EPS_ABS);
            if (fixed - *v).abs() > 0.0 {
                repaired = true;
            }
            *v = fixed;
        }
        (Self::from_eigen(self.dim, &values, &vectors), repaired)
    }

    /// Reconstructs a tensor `P diag(values) P^T` from eigenvalues and the
    /// matching eigenvectors (`vectors[k]` is the k-th eigenvector, stored
    /// row-wise as returned by [`Tensor::eigen_decompose`]).
    fn from_eigen(dim: Dim, values: &[f64], vectors: &[[f64; 3]]) -> Self {
        let n = dim.n();
        let mut data = [0.0; 9];
        for i in 0..n {
            for j in 0..n {
                let mut sum = 0.0;
                for k in 0..n {
                    sum += vectors[k][i] * values[k] * vectors[k][j];
                }
                data[Self::idx(n, i, j)] = sum;
            }
        }
        Tensor { dim, data }
    }

    /// Tensor intersection (the SPD lattice "constrain" operation).
    ///
    /// `other` is first repaired to SPD (abs + floor on its eigenvalues).
    /// Then the simultaneous eigenbasis of `self` and the repaired `other`
    /// is found via a generalised eigen-decomposition (diagonalise
    /// `self`, whiten `other` by `self^{-1/2}`, diagonalise the result),
    /// and per eigendirection the max (mode = UseMin) or min (mode =
    /// UseMax) of the two eigenvalues is kept. Mutates `self` in place to
    /// the combined tensor.
    pub fn constrain(&mut self, other: &Tensor, mode: IntersectMode) -> Result<bool, TensorError> {
        if self.dim != other.dim {
            return Err(TensorError::DimensionMismatch(self.n(), other.n()));
        }
        let (other, was_repaired) = other.repaired_reporting();
        let n = self.n();

        let self_eigen = self.eigen_decompose();
        let self_sqrt = Self::from_eigen(
            self.dim,
            &self_eigen.values.iter().map(|v| v.sqrt()).collect::<Vec<_>>(),
            &self_eigen.vectors,
        );
        let self_inv_sqrt = Self::from_eigen(
            self.dim,
            &self_eigen
                .values
                .iter()
                .map(|v| 1.0 / v.sqrt())
                .collect::<Vec<_>>(),
            &self_eigen.vectors,
        );

        // C = self^{-1/2} * other * self^{-1/2}
        let c = matmul(n, &matmul(n, self_inv_sqrt.get(), other.get()), self_inv_sqrt.get());
        let c_tensor = Tensor::from_buffer(self.dim, &c)?;
        let c_eigen = c_tensor.eigen_decompose();

        let combined: Vec<f64> = c_eigen
            .values
            .iter()
            .map(|&lambda| match mode {
                IntersectMode::UseMin => lambda.max(1.0),
                IntersectMode::UseMax => lambda.min(1.0),
            })
            .collect();

        // N^{-1} = P2^T * self^{1/2}; result = N^{-1}^T diag(combined) N^{-1}
        let p2_t = transpose(n, &eigen_matrix(n, &c_eigen.vectors));
        let n_inv = matmul(n, &p2_t, self_sqrt.get());
        let n_inv_t = transpose(n, &n_inv);
        let mut result = matmul(n, &n_inv_t, &scale_rows(n, &n_inv, &combined));
        for v in result.iter_mut() {
            if !v.is_finite() {
                *v = 0.0;
            }
        }
        *self = Tensor::from_buffer(self.dim, &result)?;
        // guard against roundoff pushing an eigenvalue negative
        *self = self.repaired();
        Ok(was_repaired)
    }
}

fn eigen_matrix(n: usize, vectors: &[[f64; 3]]) -> Vec<f64> {
    // column k holds eigenvector k
    let mut m = vec![0.0; n * n];
    for k in 0..n {
        for i in 0..n {
            m[i * n + k] = vectors[k][i];
        }
    }
    m
}

fn transpose(n: usize, a: &[f64]) -> Vec<f64> {
    let mut t = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            t[j * n + i] = a[i * n + j];
        }
    }
    t
}

fn matmul(n: usize, a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            let mut sum = 0.0;
            for k in 0..n {
                sum += a[i * n + k] * b[k * n + j];
            }
            out[i * n + j] = sum;
        }
    }
    out
}

/// Scales each row `i` of `a` (n x n) by `scales[i]`: used to apply a
/// diagonal matrix on the left without materialising it.
fn scale_rows(n: usize, a: &[f64], scales: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            out[i * n + j] = a[i * n + j] * scales[i];
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad_form(t: &Tensor, v: &[f64]) -> f64 {
        let n = t.n();
        let mut sum = 0.0;
        for i in 0..n {
            for j in 0..n {
                sum += v[i] * t.entry(i, j) * v[j];
            }
        }
        sum
    }

    #[test]
    fn identity_has_unit_eigenvalues() {
        let t = Tensor::identity(Dim::Two, 4.0);
        let eigen = t.eigen_decompose();
        assert!(eigen.values.iter().all(|&v| (v - 4.0).abs() < 1e-10));
    }

    #[test]
    fn diagonal_roundtrips() {
        let t = Tensor::diagonal(Dim::Three, &[1.0, 4.0, 9.0]).unwrap();
        assert_eq!(t.entry(0, 0), 1.0);
        assert_eq!(t.entry(1, 1), 4.0);
        assert_eq!(t.entry(2, 2), 9.0);
        assert_eq!(t.entry(0, 1), 0.0);
    }

    #[test]
    fn scale_multiplies_eigenvalues() {
        let mut t = Tensor::identity(Dim::Two, 1.0);
        t.scale(9.0);
        let eigen = t.eigen_decompose();
        assert!(eigen.values.iter().all(|&v| (v - 9.0).abs() < 1e-10));
    }

    #[test]
    fn intersection_is_monotone() {
        // v^T (M ⊓ N) v >= max(v^T M v, v^T N v) for mode = UseMin
        let mut m = Tensor::diagonal(Dim::Two, &[4.0, 1.0]).unwrap();
        let n = Tensor::diagonal(Dim::Two, &[1.0, 4.0]).unwrap();
        m.constrain(&n, IntersectMode::UseMin).unwrap();

        for &v in &[[1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [1.0, -1.0]] {
            let qm = quad_form(&Tensor::diagonal(Dim::Two, &[4.0, 1.0]).unwrap(), &v);
            let qn = quad_form(&Tensor::diagonal(Dim::Two, &[1.0, 4.0]).unwrap(), &v);
            let qc = quad_form(&m, &v);
            assert!(qc + 1e-8 >= qm.max(qn), "qc={qc} qm={qm} qn={qn}");
        }
    }

    #[test]
    fn intersection_is_idempotent() {
        let mut m = Tensor::diagonal(Dim::Three, &[2.0, 5.0, 7.0]).unwrap();
        let original = m;
        m.constrain(&original, IntersectMode::UseMin).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                assert!((m.entry(i, j) - original.entry(i, j)).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn repair_clamps_negative_eigenvalues() {
        // A symmetric but indefinite Hessian: diag(-2, 1)
        let h = Tensor::diagonal(Dim::Two, &[-2.0, 1.0]).unwrap();
        let repaired = h.repaired();
        let eigen = repaired.eigen_decompose();
        assert!(eigen.values.iter().all(|&v| v > 0.0));
        assert!(eigen.values.iter().any(|&v| (v - 2.0).abs() < 1e-8));
    }

    #[test]
    fn repair_floors_tiny_eigenvalues() {
        let h = Tensor::diagonal(Dim::Two, &[0.0, 1.0]).unwrap();
        let repaired = h.repaired();
        let eigen = repaired.eigen_decompose();
        assert!(eigen.values.iter().all(|&v| v >= EPS_ABS));
    }

    #[test]
    fn constrain_use_max_keeps_coarser() {
        let mut m = Tensor::diagonal(Dim::Two, &[4.0, 1.0]).unwrap();
        let n = Tensor::diagonal(Dim::Two, &[1.0, 4.0]).unwrap();
        m.constrain(&n, IntersectMode::UseMax).unwrap();
        let eigen = m.eigen_decompose();
        // coarser combination keeps the smaller eigenvalue along each shared direction
        assert!(eigen.values.iter().all(|&v| v <= 4.0 + 1e-8));
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut m = Tensor::identity(Dim::Two, 1.0);
        let n = Tensor::identity(Dim::Three, 1.0);
        assert!(matches!(
            m.constrain(&n, IntersectMode::UseMin),
            Err(TensorError::DimensionMismatch(2, 3))
        ));
    }

    #[test]
    fn constrain_reports_whether_other_needed_repair() {
        let mut m = Tensor::diagonal(Dim::Two, &[4.0, 1.0]).unwrap();
        let already_spd = Tensor::diagonal(Dim::Two, &[1.0, 4.0]).unwrap();
        let repaired = m.constrain(&already_spd, IntersectMode::UseMin).unwrap();
        assert!(!repaired);

        let mut m2 = Tensor::diagonal(Dim::Two, &[4.0, 1.0]).unwrap();
        let indefinite = Tensor::diagonal(Dim::Two, &[-3.0, 2.0]).unwrap();
        let repaired2 = m2.constrain(&indefinite, IntersectMode::UseMin).unwrap();
        assert!(repaired2);
    }

    #[test]
    fn determinant_matches_eigenvalue_product() {
        let t = Tensor::diagonal(Dim::Three, &[2.0, 3.0, 5.0]).unwrap();
        assert!((t.determinant() - 30.0).abs() < 1e-10);
    }

    #[test]
    fn average_of_identical_tensors_is_itself() {
        let t = Tensor::diagonal(Dim::Two, &[3.0, 4.0]).unwrap();
        let avg = Tensor::average(&[t, t, t]).unwrap();
        assert!((avg.entry(0, 0) - 3.0).abs() < 1e-12);
        assert!((avg.entry(1, 1) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn intersection_monotonicity_holds_over_random_tensors() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let a = [
                rng.gen_range(0.1..10.0),
                rng.gen_range(0.1..10.0),
                rng.gen_range(0.1..10.0),
            ];
            let b = [
                rng.gen_range(0.1..10.0),
                rng.gen_range(0.1..10.0),
                rng.gen_range(0.1..10.0),
            ];
            let mut m = Tensor::diagonal(Dim::Three, &a).unwrap();
            let n = Tensor::diagonal(Dim::Three, &b).unwrap();
            let original_m = m;
            m.constrain(&n, IntersectMode::UseMin).unwrap();

            let v = [
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
                rng.gen_range(-1.0..1.0),
            ];
            let qm = quad_form(&original_m, &v);
            let qn = quad_form(&n, &v);
            let qc = quad_form(&m, &v);
            assert!(qc + 1e-6 >= qm.max(qn), "qc={qc} qm={qm} qn={qn}");
        }
    }
}
