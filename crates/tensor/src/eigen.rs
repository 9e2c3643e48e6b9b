//! Symmetric eigen-decomposition for 2x2 and 3x3 matrices.
//!
//! Deliberately hand-written rather than pulled from a dense linear-algebra
//! crate: both sizes are small enough that a closed-form (2x2) or a
//! classic cyclic Jacobi sweep (3x3) is simpler and faster than going
//! through a general-purpose solver.

/// Eigenvalues (descending) and their eigenvectors. `vectors[k]` is the
/// eigenvector for `values[k]`, padded to 3 components (trailing
/// components are unused when `n == 2`).
#[derive(Debug, Clone)]
pub struct Eigen {
    pub values: Vec<f64>,
    pub vectors: Vec<[f64; 3]>,
}

pub fn decompose(n: usize, data: &[f64]) -> Eigen {
    match n {
        2 => decompose2(data),
        3 => decompose3(data),
        other => panic!("unsupported tensor dimension {other}"),
    }
}

fn decompose2(data: &[f64]) -> Eigen {
    let a = data[0];
    let b = data[1];
    let c = data[3];

    let trace = a + c;
    let diff = a - c;
    let radius = (diff * diff / 4.0 + b * b).sqrt();
    let mid = trace / 2.0;
    let lambda1 = mid + radius;
    let lambda2 = mid - radius;

    let (v1, v2) = if b.abs() > 1e-300 {
        let v1 = normalize2([b, lambda1 - a]);
        let v2 = normalize2([b, lambda2 - a]);
        (v1, v2)
    } else if a >= c {
        ([1.0, 0.0], [0.0, 1.0])
    } else {
        ([0.0, 1.0], [1.0, 0.0])
    };

    Eigen {
        values: vec![lambda1, lambda2],
        vectors: vec![[v1[0], v1[1], 0.0], [v2[0], v2[1], 0.0]],
    }
}

fn normalize2(v: [f64; 2]) -> [f64; 2] {
    let norm = (v[0] * v[0] + v[1] * v[1]).sqrt();
    if norm > 0.0 {
        [v[0] / norm, v[1] / norm]
    } else {
        [1.0, 0.0]
    }
}

/// Classic cyclic Jacobi eigenvalue algorithm for a symmetric 3x3 matrix.
fn decompose3(data: &[f64]) -> Eigen {
    const MAX_SWEEPS: usize = 64;

    let mut a = [
        [data[0], data[1], data[2]],
        [data[3], data[4], data[5]],
        [data[6], data[7], data[8]],
    ];
    let mut v = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

    let scale = a[0][0].abs() + a[1][1].abs() + a[2][2].abs();
    let eps = 1e-12_f64 * scale.max(1.0);

    for _sweep in 0..MAX_SWEEPS {
        let off = a[0][1] * a[0][1] + a[0][2] * a[0][2] + a[1][2] * a[1][2];
        if off <= eps * eps {
            break;
        }

        for &(p, q) in &[(0usize, 1usize), (0, 2), (1, 2)] {
            let apq = a[p][q];
            if apq.abs() <= eps {
                continue;
            }
            let app = a[p][p];
            let aqq = a[q][q];
            let phi = 0.5 * (2.0 * apq).atan2(aqq - app);
            let (cos, sin) = (phi.cos(), phi.sin());

            for r in 0..3 {
                let arp = a[r][p];
                let arq = a[r][q];
                a[r][p] = cos * arp - sin * arq;
                a[r][q] = sin * arp + cos * arq;
            }
            for r in 0..3 {
                let apr = a[p][r];
                let aqr = a[q][r];
                a[p][r] = cos * apr - sin * aqr;
                a[q][r] = sin * apr + cos * aqr;
            }
            a[p][q] = 0.0;
            a[q][p] = 0.0;

            for r in 0..3 {
                let vrp = v[r][p];
                let vrq = v[r][q];
                v[r][p] = cos * vrp - sin * vrq;
                v[r][q] = sin * vrp + cos * vrq;
            }
        }
    }

    let values = [a[0][0], a[1][1], a[2][2]];
    let vectors: Vec<[f64; 3]> = (0..3)
        .map(|k| normalize3([v[0][k], v[1][k], v[2][k]]))
        .collect();

    let mut order = [0usize, 1, 2];
    order.sort_by(|&i, &j| values[j].partial_cmp(&values[i]).unwrap());

    let sorted_values = order.iter().map(|&k| values[k]).collect();
    let sorted_vectors = order.iter().map(|&k| vectors[k]).collect();

    Eigen {
        values: sorted_values,
        vectors: sorted_vectors,
    }
}

fn normalize3(v: [f64; 3]) -> [f64; 3] {
    let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
    if norm > 0.0 {
        [v[0] / norm, v[1] / norm, v[2] / norm]
    } else {
        [1.0, 0.0, 0.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decompose2_matches_known_eigenvalues() {
        // [[2, 0], [0, 5]]
        let eigen = decompose2(&[2.0, 0.0, 0.0, 5.0]);
        assert!((eigen.values[0] - 5.0).abs() < 1e-10);
        assert!((eigen.values[1] - 2.0).abs() < 1e-10);
    }

    #[test]
    fn decompose2_off_diagonal() {
        // [[2, 1], [1, 2]] has eigenvalues 3 and 1
        let eigen = decompose2(&[2.0, 1.0, 1.0, 2.0]);
        assert!((eigen.values[0] - 3.0).abs() < 1e-10);
        assert!((eigen.values[1] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn decompose3_diagonal_is_exact() {
        let eigen = decompose3(&[3.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 7.0]);
        assert!((eigen.values[0] - 7.0).abs() < 1e-10);
        assert!((eigen.values[1] - 3.0).abs() < 1e-10);
        assert!((eigen.values[2] - 1.0).abs() < 1e-10);
    }

    #[test]
    fn decompose3_reconstructs_original_matrix() {
        let data = [4.0, 1.0, 0.5, 1.0, 3.0, 0.2, 0.5, 0.2, 2.0];
        let eigen = decompose3(&data);
        // P diag(lambda) P^T should reconstruct the original matrix
        let mut reconstructed = [0.0f64; 9];
        for i in 0..3 {
            for j in 0..3 {
                let mut sum = 0.0;
                for k in 0..3 {
                    sum += eigen.vectors[k][i] * eigen.values[k] * eigen.vectors[k][j];
                }
                reconstructed[i * 3 + j] = sum;
            }
        }
        for (a, b) in data.iter().zip(reconstructed.iter()) {
            assert!((a - b).abs() < 1e-8, "{a} vs {b}");
        }
    }
}
