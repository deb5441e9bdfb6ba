use crate::matrix::dense::{MatrixReal, identity};
use crate::utils::error::RateMatrixError;
use crate::utils::ndarray::max_abs_diag;
use eyre::Report;
use ndarray::{Array2, ArrayView2};
use statrs::distribution::{Discrete, Poisson};

/// Powers `R^k` of the uniformized jump chain `R = I + Q / lambda`, where `lambda = max_i |Q_ii|` is the dominating
/// rate. Powers are computed on demand and kept until the rate matrix changes.
#[derive(Clone, Debug)]
pub struct StochasticMatrices {
  dominating_rate: f64,
  powers: Vec<MatrixReal>,
}

impl StochasticMatrices {
  pub fn new(q: &ArrayView2<f64>) -> Self {
    let n = q.nrows();
    let dominating_rate = max_abs_diag(q);
    let jump_chain = if dominating_rate > 0.0 {
      identity(n) + &q.mapv(|q_ij| q_ij / dominating_rate)
    } else {
      identity(n)
    };
    Self {
      dominating_rate,
      powers: vec![identity(n), jump_chain],
    }
  }

  #[inline]
  pub const fn dominating_rate(&self) -> f64 {
    self.dominating_rate
  }

  #[inline]
  pub fn num_states(&self) -> usize {
    self.powers[0].nrows()
  }

  /// `R^k`, with `R^0 = I`
  pub fn power(&mut self, k: usize) -> &MatrixReal {
    while self.powers.len() <= k {
      let next = self.powers[self.powers.len() - 1].dot(&self.powers[1]);
      self.powers.push(next);
    }
    &self.powers[k]
  }

  /// Number of powers computed so far
  #[inline]
  pub fn len(&self) -> usize {
    self.powers.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.powers.is_empty()
  }
}

/// Number of Poisson terms needed for `lambda_t = lambda * t`
#[inline]
pub fn truncation_point(lambda_t: f64) -> usize {
  (4.0 + 6.0 * lambda_t.sqrt() + lambda_t).ceil() as usize
}

/// Computes `exp(Q t) = sum_k Pois(k; lambda t) R^k`.
///
/// Summation stops at the truncation point or as soon as the accumulated Poisson mass is within `tolerance` of 1.
pub fn uniformization(matrices: &mut StochasticMatrices, t: f64, tolerance: f64) -> Result<MatrixReal, Report> {
  let n = matrices.num_states();
  let lambda_t = matrices.dominating_rate() * t;
  if lambda_t <= 0.0 {
    return Ok(identity(n));
  }

  let poisson = Poisson::new(lambda_t)
    .map_err(|err| RateMatrixError::numerical_degeneracy(format!("Invalid uniformization rate {lambda_t}: {err}")))?;

  let mut p = Array2::<f64>::zeros((n, n));
  let mut mass = 0.0;
  for k in 0..=truncation_point(lambda_t) {
    let weight = poisson.pmf(k as u64);
    p.scaled_add(weight, matrices.power(k));
    mass += weight;
    if 1.0 - mass < tolerance {
      break;
    }
  }
  Ok(p)
}
