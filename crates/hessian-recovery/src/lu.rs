//! Hand-written dense LU solve with partial pivoting, sized only for the
//! 6x6 (2D) / 10x10 (3D) normal-equation systems the quadratic fit
//! produces. Small enough that reaching for a general dense linear-algebra
//! crate would be overkill, per the design guidance this core follows.

/// Solves `A x = b` for a dense `n x n` system (`a`, `b` row-major),
/// returning `None` if the system is judged singular: either a pivot
/// collapses below `pivot_floor_ratio * max|A|`, or the ratio of largest
/// to smallest pivot magnitude exceeds `condition_threshold`.
pub fn solve_spd_like(
    a: &[f64],
    b: &[f64],
    n: usize,
    pivot_floor_ratio: f64,
    condition_threshold: f64,
) -> Option<Vec<f64>> {
    let mut m = a.to_vec();
    let mut rhs = b.to_vec();

    let max_entry = m.iter().fold(0.0_f64, |acc, &v| acc.max(v.abs()));
    if max_entry <= 0.0 {
        return None;
    }

    let mut min_pivot = f64::INFINITY;
    let mut max_pivot = 0.0_f64;

    for k in 0..n {
        let mut pivot_row = k;
        let mut pivot_val = m[k * n + k].abs();
        for i in (k + 1)..n {
            let v = m[i * n + k].abs();
            if v > pivot_val {
                pivot_val = v;
                pivot_row = i;
            }
        }

        if pivot_val < pivot_floor_ratio * max_entry {
            return None;
        }

        if pivot_row != k {
            for c in 0..n {
                m.swap(k * n + c, pivot_row * n + c);
            }
            rhs.swap(k, pivot_row);
        }

        let pivot = m[k * n + k];
        min_pivot = min_pivot.min(pivot.abs());
        max_pivot = max_pivot.max(pivot.abs());

        for i in (k + 1)..n {
            let factor = m[i * n + k] / pivot;
            if factor == 0.0 {
                continue;
            }
            for c in k..n {
                m[i * n + c] -= factor * m[k * n + c];
            }
            rhs[i] -= factor * rhs[k];
        }
    }

    if max_pivot / min_pivot > condition_threshold {
        return None;
    }

    let mut x = vec![0.0; n];
    for i in (0..n).rev() {
        let mut sum = rhs[i];
        for c in (i + 1)..n {
            sum -= m[i * n + c] * x[c];
        }
        x[i] = sum / m[i * n + i];
    }
    Some(x)
}
