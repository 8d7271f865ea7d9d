//! Small numeric kernels shared by scorers and the ensemble.

#[inline]
pub fn relu_inplace(x: &mut [f32]) {
    for v in x {
        if *v < 0.0 {
            *v = 0.0;
        }
    }
}

#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

pub fn softmax_inplace(x: &mut [f32]) {
    if x.is_empty() {
        return;
    }
    let mut max_v = x[0];
    for &v in &x[1..] {
        if v > max_v {
            max_v = v;
        }
    }

    let mut sum = 0.0f32;
    for v in x.iter_mut() {
        *v = (*v - max_v).exp();
        sum += *v;
    }
    if sum > 0.0 {
        for v in x {
            *v /= sum;
        }
    }
}

/// Scale non-negative values to sum to 1.
///
/// Returns `false` and leaves `x` untouched when the total is not a positive
/// finite number.
#[must_use]
pub fn normalize_sum_inplace(x: &mut [f32]) -> bool {
    let sum: f32 = x.iter().sum();
    if !(sum > 0.0 && sum.is_finite()) {
        return false;
    }
    for v in x.iter_mut() {
        *v /= sum;
    }
    true
}

/// Index of the maximum value; ties resolve to the lowest index.
#[must_use]
pub fn argmax(x: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in x.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::{argmax, normalize_sum_inplace, relu_inplace, sigmoid, softmax_inplace};

    #[test]
    fn argmax_prefers_first_on_ties() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), Some(1));
        assert_eq!(argmax(&[0.5, 0.5]), Some(0));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn relu_sigmoid_softmax_smoke() {
        let mut v = [-1.0f32, 0.0, 2.0];
        relu_inplace(&mut v);
        assert_eq!(v, [0.0, 0.0, 2.0]);

        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(10.0) > 0.99);

        let mut s = [1.0f32, 2.0, 3.0];
        softmax_inplace(&mut s);
        let sum: f32 = s.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(s[2] > s[1] && s[1] > s[0]);
    }

    #[test]
    fn normalize_sum_refuses_zero_mass() {
        let mut v = [2.0f32, 6.0];
        assert!(normalize_sum_inplace(&mut v));
        assert_eq!(v, [0.25, 0.75]);

        let mut z = [0.0f32; 4];
        assert!(!normalize_sum_inplace(&mut z));
        assert_eq!(z, [0.0; 4]);
        assert!(!normalize_sum_inplace(&mut []));
        assert!(!normalize_sum_inplace(&mut [f32::INFINITY, 1.0]));
    }
}
