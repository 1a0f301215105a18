//! SIMD inner loops for the similarity kernels using the `wide` crate.
//!
//! All routines process four `f64` lanes at a time with a scalar tail, and
//! assume the two slices have equal length (checked by the callers in
//! `kernel`). They are pure functions over flat buffers and carry no state.

use wide::f64x4;

/// Dot product of two equal-length slices.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());

    let mut acc = f64x4::splat(0.0);
    let chunks_a = a.chunks_exact(4);
    let chunks_b = b.chunks_exact(4);
    let rem_a = chunks_a.remainder();
    let rem_b = chunks_b.remainder();

    for (ca, cb) in chunks_a.zip(chunks_b) {
        let va = f64x4::new([ca[0], ca[1], ca[2], ca[3]]);
        let vb = f64x4::new([cb[0], cb[1], cb[2], cb[3]]);
        acc += va * vb;
    }

    let mut sum = acc.to_array().iter().sum::<f64>();
    for (x, y) in rem_a.iter().zip(rem_b.iter()) {
        sum += x * y;
    }
    sum
}

/// Fused pass computing `(dot(a, b), ‖a‖², ‖b‖²)` in one traversal.
///
/// Cosine similarity needs all three quantities; computing them together
/// reads each input exactly once.
pub fn dot_and_norms(a: &[f64], b: &[f64]) -> (f64, f64, f64) {
    debug_assert_eq!(a.len(), b.len());

    let mut dot_acc = f64x4::splat(0.0);
    let mut norm_a_acc = f64x4::splat(0.0);
    let mut norm_b_acc = f64x4::splat(0.0);

    let chunks_a = a.chunks_exact(4);
    let chunks_b = b.chunks_exact(4);
    let rem_a = chunks_a.remainder();
    let rem_b = chunks_b.remainder();

    for (ca, cb) in chunks_a.zip(chunks_b) {
        let va = f64x4::new([ca[0], ca[1], ca[2], ca[3]]);
        let vb = f64x4::new([cb[0], cb[1], cb[2], cb[3]]);
        dot_acc += va * vb;
        norm_a_acc += va * va;
        norm_b_acc += vb * vb;
    }

    let mut dot = dot_acc.to_array().iter().sum::<f64>();
    let mut norm_a_sq = norm_a_acc.to_array().iter().sum::<f64>();
    let mut norm_b_sq = norm_b_acc.to_array().iter().sum::<f64>();

    for (x, y) in rem_a.iter().zip(rem_b.iter()) {
        dot += x * y;
        norm_a_sq += x * x;
        norm_b_sq += y * y;
    }

    (dot, norm_a_sq, norm_b_sq)
}

/// Squared Euclidean (L2) distance between two equal-length slices.
pub fn squared_l2_distance(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());

    let mut acc = f64x4::splat(0.0);
    let chunks_a = a.chunks_exact(4);
    let chunks_b = b.chunks_exact(4);
    let rem_a = chunks_a.remainder();
    let rem_b = chunks_b.remainder();

    for (ca, cb) in chunks_a.zip(chunks_b) {
        let va = f64x4::new([ca[0], ca[1], ca[2], ca[3]]);
        let vb = f64x4::new([cb[0], cb[1], cb[2], cb[3]]);
        let diff = va - vb;
        acc += diff * diff;
    }

    let mut sum = acc.to_array().iter().sum::<f64>();
    for (x, y) in rem_a.iter().zip(rem_b.iter()) {
        let d = x - y;
        sum += d * d;
    }
    sum
}

/// Squared L2 norm of a slice.
pub fn squared_norm(a: &[f64]) -> f64 {
    let mut acc = f64x4::splat(0.0);
    let chunks = a.chunks_exact(4);
    let rem = chunks.remainder();

    for chunk in chunks {
        let v = f64x4::new([chunk[0], chunk[1], chunk[2], chunk[3]]);
        acc += v * v;
    }

    let mut sum = acc.to_array().iter().sum::<f64>();
    for x in rem {
        sum += x * x;
    }
    sum
}
