//! Dense-layer ops shared by scorer implementations.

/// Linear layer: `y = x * W^T + b`.
///
/// Shapes:
/// - `input`: `[n_rows, in_dim]`
/// - `weight`: `[out_dim, in_dim]`
/// - output: `[n_rows, out_dim]`
pub fn linear(
    input: &[f32],
    n_rows: usize,
    in_dim: usize,
    weight: &[f32],
    out_dim: usize,
    bias: Option<&[f32]>,
) -> Vec<f32> {
    debug_assert_eq!(input.len(), n_rows * in_dim);
    debug_assert_eq!(weight.len(), out_dim * in_dim);
    if let Some(b) = bias {
        debug_assert_eq!(b.len(), out_dim);
    }

    let mut out = vec![0.0f32; n_rows * out_dim];
    for r in 0..n_rows {
        let x = &input[r * in_dim..(r + 1) * in_dim];
        let y = &mut out[r * out_dim..(r + 1) * out_dim];
        for o in 0..out_dim {
            let w = &weight[o * in_dim..(o + 1) * in_dim];
            let mut sum = bias.map_or(0.0, |b| b[o]);
            for i in 0..in_dim {
                sum += x[i] * w[i];
            }
            y[o] = sum;
        }
    }
    out
}

/// Per-feature standardisation `(x - mean) / scale`; zero scales pass values through centred.
pub fn standardize_inplace(x: &mut [f32], mean: &[f32], scale: &[f32]) {
    debug_assert_eq!(x.len(), mean.len());
    debug_assert_eq!(x.len(), scale.len());
    for ((v, &m), &s) in x.iter_mut().zip(mean).zip(scale) {
        *v -= m;
        if s != 0.0 {
            *v /= s;
        }
    }
}

#[inline]
pub fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[inline]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::{dot, linear, squared_distance, standardize_inplace};

    #[test]
    fn linear_matches_hand_computation() {
        // Two rows, in_dim 2, out_dim 1.
        let out = linear(&[1.0, 2.0, 3.0, 4.0], 2, 2, &[0.5, -1.0], 1, Some(&[0.25]));
        assert_eq!(out, vec![0.5 - 2.0 + 0.25, 1.5 - 4.0 + 0.25]);
    }

    #[test]
    fn standardize_and_distances() {
        let mut x = [3.0f32, 5.0];
        standardize_inplace(&mut x, &[1.0, 5.0], &[2.0, 0.0]);
        assert_eq!(x, [1.0, 0.0]);
        assert_eq!(squared_distance(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(dot(&[1.0, 2.0], &[3.0, 4.0]), 11.0);
    }
}
