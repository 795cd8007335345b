//! Implements the comb filter.

use crate::celt::mode;

#[cfg(not(any(
    all(target_arch = "x86", target_feature = "sse"),
    all(target_arch = "x86_64", target_feature = "sse"),
    all(target_arch = "x86_64", target_feature = "avx"),
    all(target_arch = "arm", target_feature = "neon", feature = "nightly"),
    all(target_arch = "aarch64", target_feature = "neon", feature = "nightly")
)))]
mod fallback;
#[cfg(not(any(
    all(target_arch = "x86", target_feature = "sse"),
    all(target_arch = "x86_64", target_feature = "sse"),
    all(target_arch = "x86_64", target_feature = "avx"),
    all(target_arch = "arm", target_feature = "neon", feature = "nightly"),
    all(target_arch = "aarch64", target_feature = "neon", feature = "nightly")
)))]
pub(crate) use fallback::{comb_filter_const, comb_filter_const_inplace};

#[cfg(all(target_arch = "x86_64", target_feature = "avx"))]
mod avx;
#[cfg(all(target_arch = "x86_64", target_feature = "avx"))]
pub(crate) use avx::{comb_filter_const, comb_filter_const_inplace};

#[cfg(all(
    any(target_arch = "x86", target_arch = "x86_64"),
    target_feature = "sse",
    not(target_feature = "avx")
))]
mod sse;
#[cfg(all(
    any(target_arch = "x86", target_arch = "x86_64"),
    target_feature = "sse",
    not(target_feature = "avx")
))]
pub(crate) use sse::{comb_filter_const, comb_filter_const_inplace};

#[cfg(any(
    all(target_arch = "arm", target_feature = "neon", feature = "nightly"),
    all(target_arch = "aarch64", target_feature = "neon", feature = "nightly")
))]
mod neon;
#[cfg(any(
    all(target_arch = "arm", target_feature = "neon", feature = "nightly"),
    all(target_arch = "aarch64", target_feature = "neon", feature = "nightly")
))]
pub(crate) use neon::{comb_filter_const, comb_filter_const_inplace};

const COMBFILTER_MINPERIOD: usize = 15;

const GAINS: [f32; 9] = [
    0.30664063,
    0.21704102,
    0.12963867,
    0.4638672,
    0.2680664,
    0.0,
    0.7998047,
    0.100097656,
    0.0,
];

#[allow(clippy::too_many_arguments)]
#[allow(clippy::many_single_char_names)]
pub(crate) fn comb_filter(
    y: &mut [f32],
    y_offset: usize,
    x: &[f32],
    x_offset: usize,
    mut t0: usize,
    mut t1: usize,
    n: usize,
    g0: f32,
    g1: f32,
    tapset0: usize,
    tapset1: usize,
    mut overlap: usize,
) {
    if g0 == 0.0 && g1 == 0.0 {
        y[y_offset..y_offset + n].copy_from_slice(&x[x_offset..x_offset + n]);
        return;
    }

    // When the gain is zero, t0 and/or t1 is set to zero.
    // We need to have then be at least 2 to avoid processing garbage data.
    t0 = usize::max(t0, COMBFILTER_MINPERIOD);
    t1 = usize::max(t1, COMBFILTER_MINPERIOD);

    let g00 = g0 * GAINS[tapset0 * 3];
    let g01 = g0 * GAINS[tapset0 * 3 + 1];
    let g02 = g0 * GAINS[tapset0 * 3 + 2];
    let g10 = g1 * GAINS[tapset1 * 3];
    let g11 = g1 * GAINS[tapset1 * 3 + 1];
    let g12 = g1 * GAINS[tapset1 * 3 + 2];

    let mut x1 = x[x_offset - t1 + 1];
    let mut x2 = x[x_offset - t1];
    let mut x3 = x[x_offset - t1 - 1];
    let mut x4 = x[x_offset - t1 - 2];

    // If the filter didn't change, we don't need the overlap.
    if (g0 - g1).abs() < f32::EPSILON && t0 == t1 && tapset0 == tapset1 {
        overlap = 0;
    }

    let mut j = 0;
    (0..overlap).into_iter().for_each(|i| {
        let x0 = x[x_offset + i - t1 + 2];
        let f = mode::window()[i] * mode::window()[i];
        y[y_offset + i] = x[x_offset + i]
            + (((1.0 - f) * g00) * x[x_offset + i - t0])
            + (((1.0 - f) * g01) * (x[x_offset + i - t0 + 1] + x[x_offset + i - t0 - 1]))
            + (((1.0 - f) * g02) * (x[x_offset + i - t0 + 2] + x[x_offset + i - t0 - 2]))
            + ((f * g10) * x2)
            + ((f * g11) * (x1 + x3))
            + ((f * g12) * (x0 + x4));

        x4 = x3;
        x3 = x2;
        x2 = x1;
        x1 = x0;

        j += 1;
    });

    if g1 == 0.0 {
        y[y_offset + overlap..y_offset + n].copy_from_slice(&x[x_offset + overlap..x_offset + n]);
        return;
    }

    // Compute the part with the constant filter.
    comb_filter_const(y, y_offset + j, x, x_offset + j, t1, n - j, g10, g11, g12);
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn comb_filter_inplace(
    y: &mut [f32],
    y_offset: usize,
    mut t0: usize,
    mut t1: usize,
    n: usize,
    g0: f32,
    g1: f32,
    tapset0: usize,
    tapset1: usize,
    mut overlap: usize,
) {
    if g0 == 0.0 && g1 == 0.0 {
        return;
    }

    // When the gain is zero, t0 and/or t1 is set to zero.
    // We need to have then be at least 2 to avoid processing garbage data.
    t0 = usize::max(t0, COMBFILTER_MINPERIOD);
    t1 = usize::max(t1, COMBFILTER_MINPERIOD);

    let g00 = g0 * GAINS[tapset0 * 3];
    let g01 = g0 * GAINS[tapset0 * 3 + 1];
    let g02 = g0 * GAINS[tapset0 * 3 + 2];
    let g10 = g1 * GAINS[tapset1 * 3];
    let g11 = g1 * GAINS[tapset1 * 3 + 1];
    let g12 = g1 * GAINS[tapset1 * 3 + 2];

    let mut x1 = y[y_offset - t1 + 1];
    let mut x2 = y[y_offset - t1];
    let mut x3 = y[y_offset - t1 - 1];
    let mut x4 = y[y_offset - t1 - 2];

    // If the filter didn't change, we don't need the overlap.
    if (g0 - g1).abs() < f32::EPSILON && t0 == t1 && tapset0 == tapset1 {
        overlap = 0;
    }

    let mut j = 0;
    (0..overlap).into_iter().for_each(|i| {
        let x0 = y[y_offset + i - t1 + 2];
        let f = mode::window()[i] * mode::window()[i];
        y[y_offset + i] = y[y_offset + i]
            + (((1.0 - f) * g00) * y[y_offset + i - t0])
            + (((1.0 - f) * g01) * (y[y_offset + i - t0 + 1] + y[y_offset + i - t0 - 1]))
            + (((1.0 - f) * g02) * (y[y_offset + i - t0 + 2] + y[y_offset + i - t0 - 2]))
            + ((f * g10) * x2)
            + ((f * g11) * (x1 + x3))
            + ((f * g12) * (x0 + x4));
        x4 = x3;
        x3 = x2;
        x2 = x1;
        x1 = x0;

        j += 1;
    });

    if g1 == 0.0 {
        return;
    }

    // Compute the part with the constant filter.
    comb_filter_const_inplace(y, y_offset + j, t1, n - j, g10, g11, g12);
}
