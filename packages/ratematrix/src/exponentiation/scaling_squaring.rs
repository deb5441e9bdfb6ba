use crate::constants::MAX_TAYLOR_TERMS;
use crate::matrix::dense::{MatrixReal, identity, square_inplace};
use crate::utils::ndarray::{max_abs, max_abs_diag};
use ndarray::ArrayView2;

/// Approximates `exp(Q t)` by scaling and squaring.
///
/// `X = Q t / 2^squarings` is exponentiated with the order-4 Taylor polynomial
/// `I + X + X^2/2 + X^3/6 + X^4/24` (or with `I + X` when `taylor` is off) and the result is squared `squarings`
/// times.
pub fn scaling_and_squaring(q: &ArrayView2<f64>, t: f64, squarings: u32, taylor: bool) -> MatrixReal {
  let n = q.nrows();
  let x: MatrixReal = q.mapv(|q_ij| q_ij * t / 2.0_f64.powi(squarings as i32));

  let mut p = identity(n) + &x;
  if taylor {
    let x2 = x.dot(&x);
    let x3 = x2.dot(&x);
    let x4 = x3.dot(&x);
    p = p + x2 / 2.0 + x3 / 6.0 + x4 / 24.0;
  }

  square_inplace(&mut p, squarings);
  p
}

/// Approximates `exp(Q t)` by scaling and squaring with a Taylor series of adaptive length.
///
/// The number of squarings grows with `log2` of the matrix norm so that the scaled matrix has a tiny norm, and
/// series terms `X^k / k!` are added until the largest entry of a term drops below `tolerance`.
pub fn adaptive_taylor(q: &ArrayView2<f64>, t: f64, tolerance: f64) -> MatrixReal {
  let n = q.nrows();
  let norm = 2.0 * max_abs_diag(q) * t.abs();

  let squarings = if norm > 0.0 {
    (norm.log2().ceil() + 12.0).max(0.0) as u32
  } else {
    0
  };

  let x: MatrixReal = q.mapv(|q_ij| q_ij * t / 2.0_f64.powi(squarings as i32));

  let mut p = identity(n);
  let mut term = identity(n);
  for k in 1..=MAX_TAYLOR_TERMS {
    term = term.dot(&x) / (k as f64);
    p += &term;
    if max_abs(&term) < tolerance {
      break;
    }
  }

  square_inplace(&mut p, squarings);
  p
}
