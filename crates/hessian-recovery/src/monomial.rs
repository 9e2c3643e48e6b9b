use mesh_adapter::Dim;

/// Evaluates the quadratic monomial basis at a node's coordinates.
///
/// 2D basis (6 terms): `[y^2, x^2, x*y, y, x, 1]`, matching coefficient
/// order `a0..a5` in `psi ~= a0*y^2 + a1*x^2 + a2*x*y + a3*y + a4*x + a5`.
///
/// 3D basis (10 terms): `[1, x, y, z, x^2, x*y, x*z, y^2, y*z, z^2]`,
/// matching `a0..a9` in
/// `psi ~= a0 + a1*x + a2*y + a3*z + a4*x^2 + a5*x*y + a6*x*z + a7*y^2 + a8*y*z + a9*z^2`.
/// The basis intentionally omits a pure cubic term, per the observed
/// 10-term fit.
pub fn evaluate(dim: Dim, coords: &[f64]) -> Vec<f64> {
    match dim {
        Dim::Two => {
            let (x, y) = (coords[0], coords[1]);
            vec![y * y, x * x, x * y, y, x, 1.0]
        }
        Dim::Three => {
            let (x, y, z) = (coords[0], coords[1], coords[2]);
            vec![1.0, x, y, z, x * x, x * y, x * z, y * y, y * z, z * z]
        }
    }
}

/// Extracts the flattened symmetric Hessian (row-major, `d*d` entries)
/// from the fitted monomial coefficients.
pub fn hessian_from_coeffs(dim: Dim, a: &[f64]) -> Vec<f64> {
    match dim {
        Dim::Two => {
            // H = [[2*a1, a2], [a2, 2*a0]]
            vec![2.0 * a[1], a[2], a[2], 2.0 * a[0]]
        }
        Dim::Three => {
            // H = [[2a4, a5, a6], [a5, 2a7, a8], [a6, a8, 2a9]]
            vec![
                2.0 * a[4],
                a[5],
                a[6],
                a[5],
                2.0 * a[7],
                a[8],
                a[6],
                a[8],
                2.0 * a[9],
            ]
        }
    }
}
