use crate::matrix::dense::{MatrixReal, get_element, get_row, row_sums};
use crate::utils::error::RateMatrixError;
use eyre::Report;
use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut2};
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Finite-time transition probabilities `P(t) = exp(Q t)`.
///
/// Entry `[i, j]` is the probability of being in state `j` after time `t` when starting in state `i`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MatrixReal", into = "MatrixReal")]
pub struct TransitionProbabilityMatrix {
  values: MatrixReal,
}

impl TransitionProbabilityMatrix {
  /// Creates a zero-filled matrix for `num_states` states, ready to be filled
  pub fn new(num_states: usize) -> Self {
    Self {
      values: Array2::zeros((num_states, num_states)),
    }
  }

  /// Wraps existing probabilities. Fails unless the matrix is square.
  pub fn from_array(values: MatrixReal) -> Result<Self, Report> {
    if !values.is_square() {
      return Err(RateMatrixError::invalid_configuration(format!(
        "Transition probability matrix must be square, but has shape {:?}",
        values.dim()
      )));
    }
    Ok(Self { values })
  }

  #[inline]
  pub fn num_states(&self) -> usize {
    self.values.nrows()
  }

  #[inline]
  pub fn values(&self) -> ArrayView2<f64> {
    self.values.view()
  }

  #[inline]
  pub fn values_mut(&mut self) -> ArrayViewMut2<f64> {
    self.values.view_mut()
  }

  pub fn get_element(&self, from: usize, to: usize) -> Result<f64, Report> {
    get_element(&self.values.view(), from, to)
  }

  pub fn row(&self, from: usize) -> Result<ArrayView1<f64>, Report> {
    get_row(&self.values, from)
  }

  pub(crate) fn assign(&mut self, values: &MatrixReal) {
    self.values.assign(values);
  }

  /// Largest absolute deviation of a row sum from 1
  pub fn max_row_sum_deviation(&self) -> f64 {
    row_sums(&self.values.view())
      .iter()
      .fold(0.0_f64, |acc, &s| acc.max((s - 1.0).abs()))
  }
}

impl TryFrom<MatrixReal> for TransitionProbabilityMatrix {
  type Error = Report;

  fn try_from(values: MatrixReal) -> Result<Self, Self::Error> {
    Self::from_array(values)
  }
}

impl From<TransitionProbabilityMatrix> for MatrixReal {
  fn from(p: TransitionProbabilityMatrix) -> Self {
    p.values
  }
}

impl Index<[usize; 2]> for TransitionProbabilityMatrix {
  type Output = f64;

  #[inline]
  fn index(&self, index: [usize; 2]) -> &Self::Output {
    debug_assert!(index[0] < self.num_states() && index[1] < self.num_states());
    &self.values[index]
  }
}

impl IndexMut<[usize; 2]> for TransitionProbabilityMatrix {
  #[inline]
  fn index_mut(&mut self, index: [usize; 2]) -> &mut Self::Output {
    debug_assert!(index[0] < self.num_states() && index[1] < self.num_states());
    &mut self.values[index]
  }
}
