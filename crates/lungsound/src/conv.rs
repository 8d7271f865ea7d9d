//! Convolution and pooling kernels for the CNN scorers.
//!
//! All activations are **channel-major**:
//! - 1D: `[channels, length]` stored as `x[c * length + t]`
//! - 2D: `[channels, height, width]` stored as `x[(c * height + y) * width + x]`
//!
//! Convolutions are stride 1 with "same" padding (`pad_total = kernel - 1`,
//! the smaller half on the leading side).

/// Same-padded 1D convolution.
///
/// Weights are stored as `[channels_out, channels_in, kernel]` contiguous.
#[allow(clippy::too_many_arguments)]
pub fn conv1d_same(
    output: &mut [f32],
    input: &[f32],
    weight: &[f32],
    bias: Option<&[f32]>,
    channels_in: usize,
    channels_out: usize,
    length: usize,
    kernel: usize,
) {
    debug_assert_eq!(output.len(), channels_out * length);
    debug_assert_eq!(input.len(), channels_in * length);
    debug_assert_eq!(weight.len(), channels_out * channels_in * kernel);

    let left_pad = ((kernel - 1) / 2) as isize;

    for oc in 0..channels_out {
        let b = bias.map_or(0.0, |bb| bb[oc]);
        let out_row = &mut output[oc * length..(oc + 1) * length];

        for (ol, out_elem) in out_row.iter_mut().enumerate() {
            let mut sum = b;
            let base = ol as isize - left_pad;
            for ic in 0..channels_in {
                let in_row = &input[ic * length..(ic + 1) * length];
                let w_base = (oc * channels_in * kernel) + (ic * kernel);
                for k in 0..kernel {
                    let il = base + (k as isize);
                    if il >= 0 && (il as usize) < length {
                        sum += in_row[il as usize] * weight[w_base + k];
                    }
                }
            }
            *out_elem = sum;
        }
    }
}

/// Same-padded 2D convolution.
///
/// Weights are stored as `[channels_out, channels_in, kernel_h, kernel_w]` contiguous.
#[allow(clippy::too_many_arguments)]
pub fn conv2d_same(
    output: &mut [f32],
    input: &[f32],
    weight: &[f32],
    bias: Option<&[f32]>,
    channels_in: usize,
    channels_out: usize,
    height: usize,
    width: usize,
    kernel_h: usize,
    kernel_w: usize,
) {
    let plane = height * width;
    debug_assert_eq!(output.len(), channels_out * plane);
    debug_assert_eq!(input.len(), channels_in * plane);
    debug_assert_eq!(weight.len(), channels_out * channels_in * kernel_h * kernel_w);

    let pad_y = ((kernel_h - 1) / 2) as isize;
    let pad_x = ((kernel_w - 1) / 2) as isize;

    for oc in 0..channels_out {
        let b = bias.map_or(0.0, |bb| bb[oc]);
        let out_plane = &mut output[oc * plane..(oc + 1) * plane];
        out_plane.fill(b);

        for ic in 0..channels_in {
            let in_plane = &input[ic * plane..(ic + 1) * plane];
            let w_base = (oc * channels_in + ic) * kernel_h * kernel_w;
            for ky in 0..kernel_h {
                for kx in 0..kernel_w {
                    let w = weight[w_base + ky * kernel_w + kx];
                    if w == 0.0 {
                        continue;
                    }
                    let dy = ky as isize - pad_y;
                    let dx = kx as isize - pad_x;
                    for y in 0..height {
                        let sy = y as isize + dy;
                        if sy < 0 || sy as usize >= height {
                            continue;
                        }
                        let in_row = &in_plane[(sy as usize) * width..(sy as usize + 1) * width];
                        let out_row = &mut out_plane[y * width..(y + 1) * width];
                        for (x, out) in out_row.iter_mut().enumerate() {
                            let sx = x as isize + dx;
                            if sx >= 0 && (sx as usize) < width {
                                *out += in_row[sx as usize] * w;
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Non-overlapping max pool along time; a trailing partial window is dropped.
#[must_use]
pub fn max_pool1d(input: &[f32], channels: usize, length: usize, pool: usize) -> Vec<f32> {
    debug_assert_eq!(input.len(), channels * length);
    let out_len = length / pool;
    let mut out = vec![0.0f32; channels * out_len];
    for c in 0..channels {
        let row = &input[c * length..(c + 1) * length];
        for (t, o) in out[c * out_len..(c + 1) * out_len].iter_mut().enumerate() {
            *o = row[t * pool..(t + 1) * pool]
                .iter()
                .copied()
                .fold(f32::NEG_INFINITY, f32::max);
        }
    }
    out
}

/// Non-overlapping `pool x pool` max pool; trailing partial rows/columns are dropped.
#[must_use]
pub fn max_pool2d(
    input: &[f32],
    channels: usize,
    height: usize,
    width: usize,
    pool: usize,
) -> Vec<f32> {
    debug_assert_eq!(input.len(), channels * height * width);
    let (oh, ow) = (height / pool, width / pool);
    let mut out = vec![f32::NEG_INFINITY; channels * oh * ow];
    for c in 0..channels {
        let in_plane = &input[c * height * width..(c + 1) * height * width];
        let out_plane = &mut out[c * oh * ow..(c + 1) * oh * ow];
        for y in 0..oh * pool {
            for x in 0..ow * pool {
                let o = &mut out_plane[(y / pool) * ow + x / pool];
                *o = o.max(in_plane[y * width + x]);
            }
        }
    }
    out
}

/// Mean over the spatial/time extent of each channel: `[channels, n] -> [channels]`.
#[must_use]
pub fn global_avg_pool(input: &[f32], channels: usize) -> Vec<f32> {
    if channels == 0 {
        return Vec::new();
    }
    let n = input.len() / channels;
    input
        .chunks_exact(n.max(1))
        .take(channels)
        .map(|row| row.iter().sum::<f32>() / n.max(1) as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conv1d_same_preserves_length() {
        // Single channel, kernel [1, 1, 1] is a 3-tap moving sum with zero edges.
        let input = [1.0f32, 2.0, 3.0, 4.0];
        let mut out = [0.0f32; 4];
        conv1d_same(&mut out, &input, &[1.0, 1.0, 1.0], Some(&[0.5]), 1, 1, 4, 3);
        assert_eq!(out, [3.5, 6.5, 9.5, 7.5]);
    }

    #[test]
    fn conv1d_even_kernel_pads_trailing_side() {
        // kernel 2, left pad 0: y[t] = x[t] + 10 * x[t+1]
        let input = [1.0f32, 2.0, 3.0];
        let mut out = [0.0f32; 3];
        conv1d_same(&mut out, &input, &[1.0, 10.0], None, 1, 1, 3, 2);
        assert_eq!(out, [21.0, 32.0, 3.0]);
    }

    #[test]
    fn conv2d_identity_kernel() {
        let input: Vec<f32> = (0..9).map(|v| v as f32).collect();
        let mut kernel = vec![0.0f32; 9];
        kernel[4] = 2.0; // center tap
        let mut out = vec![0.0f32; 9];
        conv2d_same(&mut out, &input, &kernel, Some(&[1.0]), 1, 1, 3, 3, 3, 3);
        let expect: Vec<f32> = input.iter().map(|v| v * 2.0 + 1.0).collect();
        assert_eq!(out, expect);
    }

    #[test]
    fn conv2d_box_kernel_sums_neighbourhood() {
        let input = vec![1.0f32; 9];
        let mut out = vec![0.0f32; 9];
        conv2d_same(&mut out, &input, &[1.0; 9], None, 1, 1, 3, 3, 3, 3);
        assert_eq!(out, vec![4.0, 6.0, 4.0, 6.0, 9.0, 6.0, 4.0, 6.0, 4.0]);
    }

    #[test]
    fn pooling_shapes_and_values() {
        let x = [1.0f32, 5.0, 2.0, 3.0, 9.0, 0.0, 4.0];
        assert_eq!(max_pool1d(&x, 1, 7, 2), vec![5.0, 3.0, 9.0]);

        let img: Vec<f32> = (0..16).map(|v| v as f32).collect();
        assert_eq!(max_pool2d(&img, 1, 4, 4, 2), vec![5.0, 7.0, 13.0, 15.0]);

        assert_eq!(global_avg_pool(&[1.0, 3.0, 10.0, 20.0], 2), vec![2.0, 15.0]);
    }
}
