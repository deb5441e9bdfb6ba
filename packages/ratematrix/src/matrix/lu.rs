use crate::constants::PIVOT_TOLERANCE;
use crate::utils::error::RateMatrixError;
use crate::utils::ndarray::max_abs;
use eyre::Report;
use log::warn;
use ndarray::{Array1, Array2, ArrayView2};

/// LU decomposition with partial pivoting, `P A = L U`.
///
/// Columns without a usable pivot are skipped rather than failing, so singular matrices (every rate matrix is
/// singular) still produce a valid upper-triangular factor.
#[derive(Clone, Debug)]
pub struct LuDecomposition {
  pub l: Array2<f64>,
  pub u: Array2<f64>,
  /// `permutation[i]` is the row of the input which ended up as row `i`
  pub permutation: Vec<usize>,
  /// Absolute magnitude under which a pivot counts as zero
  pub tolerance: f64,
}

pub fn compute_lu(a: &ArrayView2<f64>) -> LuDecomposition {
  let n = a.nrows();
  debug_assert_eq!(n, a.ncols());

  let mut u = a.to_owned();
  let mut l = Array2::<f64>::eye(n);
  let mut permutation: Vec<usize> = (0..n).collect();
  let tolerance = PIVOT_TOLERANCE * max_abs(&u).max(f64::MIN_POSITIVE);

  for c in 0..n {
    let pivot_row = (c..n).fold(c, |best, r| if u[[r, c]].abs() > u[[best, c]].abs() { r } else { best });

    if u[[pivot_row, c]].abs() <= tolerance {
      for r in c..n {
        u[[r, c]] = 0.0;
      }
      continue;
    }

    if pivot_row != c {
      for k in 0..n {
        u.swap([c, k], [pivot_row, k]);
      }
      for k in 0..c {
        l.swap([c, k], [pivot_row, k]);
      }
      permutation.swap(c, pivot_row);
    }

    let pivot = u[[c, c]];
    for r in (c + 1)..n {
      let factor = u[[r, c]] / pivot;
      l[[r, c]] = factor;
      u[[r, c]] = 0.0;
      for k in (c + 1)..n {
        u[[r, k]] -= factor * u[[c, k]];
      }
    }
  }

  LuDecomposition {
    l,
    u,
    permutation,
    tolerance,
  }
}

/// Solves `U x = 0` for a non-trivial `x` by back substitution.
///
/// The last unknown with a vanishing pivot (or, failing that, the one with the smallest pivot) is fixed to 1. Any
/// other unknown whose pivot vanishes is fixed to 0.
pub fn solve_null_vector(lu: &LuDecomposition) -> Array1<f64> {
  let u = &lu.u;
  let n = u.nrows();

  let free = (0..n)
    .rev()
    .find(|&i| u[[i, i]].abs() <= lu.tolerance)
    .unwrap_or_else(|| {
      (0..n).fold(0, |best, i| {
        if u[[i, i]].abs() <= u[[best, best]].abs() {
          i
        } else {
          best
        }
      })
    });

  let mut x = Array1::<f64>::zeros(n);
  for i in (0..n).rev() {
    if i == free {
      x[i] = 1.0;
    } else if u[[i, i]].abs() <= lu.tolerance {
      x[i] = 0.0;
    } else {
      let rhs: f64 = ((i + 1)..n).map(|j| u[[i, j]] * x[j]).sum();
      x[i] = -rhs / u[[i, i]];
    }
  }
  x
}

/// Stationary distribution `pi` of a rate matrix, `pi Q = 0`, `sum(pi) = 1`.
///
/// Decomposes the transpose of `Q` and back-substitutes for its null vector. Small negative components (round-off)
/// are clamped to zero before normalizing.
pub fn stationary_frequencies_from_rates(q: &ArrayView2<f64>) -> Result<Array1<f64>, Report> {
  let lu = compute_lu(&q.t());

  let num_zero_pivots = lu.u.diag().iter().filter(|d| d.abs() <= lu.tolerance).count();
  if num_zero_pivots > 1 {
    warn!(
      "Rate matrix has {num_zero_pivots} vanishing pivots, the chain is reducible. Stationary distribution is not unique, picking one of them."
    );
  }

  let mut x = solve_null_vector(&lu);
  x.mapv_inplace(|v| v.max(0.0));

  let total = x.sum();
  if !total.is_finite() || total <= 0.0 {
    return Err(RateMatrixError::numerical_degeneracy(
      "Unable to compute stationary frequencies: null vector of the rate matrix is zero or not finite",
    ));
  }
  Ok(x / total)
}
