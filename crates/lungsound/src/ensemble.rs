//! Unweighted probability averaging across scorers.

use crate::math::argmax;
use crate::{LungError, Result};

/// Elementwise mean of `vectors`, plus the index of its maximum (lowest index on ties).
///
/// All inputs must share one class ordering and length.
pub fn combine<V: AsRef<[f32]>>(vectors: &[V]) -> Result<(usize, Vec<f32>)> {
    let first = vectors.first().ok_or(LungError::EmptyEnsemble)?.as_ref();
    let n = first.len();

    let mut sum = vec![0.0f64; n];
    for v in vectors {
        let v = v.as_ref();
        if v.len() != n {
            return Err(LungError::LabelMismatch {
                expected: n,
                got: v.len(),
            });
        }
        for (s, &p) in sum.iter_mut().zip(v) {
            *s += f64::from(p);
        }
    }

    let k = vectors.len() as f64;
    let merged: Vec<f32> = sum.into_iter().map(|s| (s / k) as f32).collect();
    let index = argmax(&merged).ok_or(LungError::EmptyEnsemble)?;
    Ok((index, merged))
}

#[cfg(test)]
mod tests {
    use super::combine;
    use crate::LungError;

    #[test]
    fn averages_two_models() {
        let (idx, merged) = combine(&[[0.7f32, 0.2, 0.1], [0.5, 0.4, 0.1]]).expect("combine");
        assert_eq!(idx, 0);
        for (got, want) in merged.iter().zip([0.6f32, 0.3, 0.1]) {
            assert!((got - want).abs() < 1e-6, "{got} vs {want}");
        }
    }

    #[test]
    fn merged_vector_stays_normalized() {
        let inputs = vec![
            vec![0.1f32, 0.2, 0.3, 0.4],
            vec![0.25, 0.25, 0.25, 0.25],
            vec![0.9, 0.05, 0.03, 0.02],
        ];
        let (idx, merged) = combine(&inputs).expect("combine");
        let sum: f32 = merged.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        let max = merged.iter().copied().fold(f32::MIN, f32::max);
        assert_eq!(merged[idx], max);
    }

    #[test]
    fn ties_resolve_to_lowest_index() {
        let (idx, _) = combine(&[[0.4f32, 0.4, 0.2]]).expect("combine");
        assert_eq!(idx, 0);
        let (idx, _) = combine(&[[0.2f32, 0.5, 0.3], [0.2, 0.3, 0.5]]).expect("combine");
        assert_eq!(idx, 1);
    }

    #[test]
    fn rejects_empty_and_ragged_input() {
        let empty: [Vec<f32>; 0] = [];
        assert_eq!(combine(&empty), Err(LungError::EmptyEnsemble));
        let err = combine(&[vec![0.5f32, 0.5], vec![1.0]]).expect_err("ragged");
        assert_eq!(err.kind(), "label_mismatch");
    }
}
