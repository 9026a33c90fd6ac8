//! Numeric kernels in natural-log space.
//!
//! The recursions themselves run on scaled probabilities, so these are only
//! needed when scores from different reads or mutations are combined.
//! `logsumexp` accumulates with `logadd4`, which works on fixed-size lanes
//! so that the compiler can vectorize it.

/// log(exp(a) + exp(b)). Negative infinity is the identity.
pub fn logadd(a: f64, b: f64) -> f64 {
    if a == std::f64::NEG_INFINITY {
        b
    } else if b == std::f64::NEG_INFINITY {
        a
    } else {
        let (max, min) = if a < b { (b, a) } else { (a, b) };
        max + (min - max).exp().ln_1p()
    }
}

/// Lane-wise `logadd` over four values at once.
pub fn logadd4(xs: [f64; 4], ys: [f64; 4]) -> [f64; 4] {
    let mut result = [0f64; 4];
    for ((r, &x), &y) in result.iter_mut().zip(xs.iter()).zip(ys.iter()) {
        *r = logadd(x, y);
    }
    result
}

/// log(sum(exp(x))). Empty input gives negative infinity.
/// Summed four lanes at a time, then the lanes and the tail are folded.
pub fn logsumexp(xs: &[f64]) -> f64 {
    if xs.iter().any(|&x| x == std::f64::INFINITY) {
        return std::f64::INFINITY;
    }
    let chunks = xs.chunks_exact(4);
    let tail = chunks.remainder();
    let lanes = chunks.fold([std::f64::NEG_INFINITY; 4], |acc, c| {
        logadd4(acc, [c[0], c[1], c[2], c[3]])
    });
    lanes
        .iter()
        .chain(tail.iter())
        .fold(std::f64::NEG_INFINITY, |acc, &x| logadd(acc, x))
}

/// log(mean(exp(x))).
pub fn logmeanexp(xs: &[f64]) -> f64 {
    logsumexp(xs) - (xs.len() as f64).ln()
}
