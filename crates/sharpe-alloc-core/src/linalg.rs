//! Dense vector/matrix helpers shared by the statistics and optimizer code.

/// Dot product.
pub(crate) fn vec_dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Matrix-vector multiplication.
pub(crate) fn mat_vec_multiply(mat: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    mat.iter().map(|row| vec_dot(row, v)).collect()
}

/// Quadratic form `v' * M * v`.
pub(crate) fn quad_form(mat: &[Vec<f64>], v: &[f64]) -> f64 {
    vec_dot(v, &mat_vec_multiply(mat, v))
}

/// Infinity norm of `a - b`.
pub(crate) fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

/// Equal weights for n assets.
pub(crate) fn equal_weights(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

/// Euclidean projection onto the probability simplex `{w >= 0, sum(w) = 1}`.
///
/// Sort-based algorithm (Held, Wolfe & Crowder; Duchi et al. 2008).
pub(crate) fn project_simplex(v: &[f64]) -> Vec<f64> {
    if v.is_empty() {
        return Vec::new();
    }

    let mut u = v.to_vec();
    u.sort_by(|a, b| b.total_cmp(a));

    let mut cumsum = 0.0;
    let mut theta = 0.0;
    for (i, ui) in u.iter().enumerate() {
        cumsum += ui;
        let candidate = (cumsum - 1.0) / (i as f64 + 1.0);
        if ui - candidate > 0.0 {
            theta = candidate;
        }
    }

    v.iter().map(|x| (x - theta).max(0.0)).collect()
}

/// Clamp to `[0, 1]` and rescale to unit sum. Removes rounding residue left by
/// the projection.
pub(crate) fn clean_simplex(w: &mut [f64]) {
    for wi in w.iter_mut() {
        *wi = wi.clamp(0.0, 1.0);
    }
    let total: f64 = w.iter().sum();
    if total > 0.0 {
        for wi in w.iter_mut() {
            *wi /= total;
        }
    }
}
