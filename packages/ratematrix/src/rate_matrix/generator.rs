use crate::adapter::parameter::{ParameterName, ParameterValue};
use crate::exponentiation::method::ExponentiationMethod;
use crate::matrix::dense::MatrixReal;
use eyre::Report;
use ndarray::Array1;

/// Model-specific part of a rate matrix.
///
/// Implementors only know their parameters and how to lay them out in `Q`. Caching, the dirty flag, the diagonal,
/// rescaling and exponentiation live in [`crate::rate_matrix::model::RateMatrixModel`].
pub trait RateMatrixGenerator {
  /// Human-readable model name
  fn name(&self) -> &'static str;

  fn num_states(&self) -> usize;

  /// Writes the off-diagonal rates into `q`, which is zero-filled and has `num_states()` rows and columns.
  ///
  /// The diagonal is recomputed afterwards, so whatever is written there is ignored.
  fn build_rate_matrix(&self, q: &mut MatrixReal) -> Result<(), Report>;

  /// Average rate the freshly built matrix is rescaled to, if any
  fn rescale_target(&self) -> Option<f64> {
    None
  }

  /// Fixed value reported as the average rate, instead of computing it from `Q` and `pi`
  fn fixed_average_rate(&self) -> Option<f64> {
    None
  }

  /// Stationary frequencies known in closed form from the parameters
  fn stationary_frequencies(&self) -> Option<Array1<f64>> {
    None
  }

  /// Whether `Q` satisfies detailed balance with respect to `stationary_frequencies()` by construction
  fn is_time_reversible(&self) -> bool {
    false
  }

  fn default_exponentiation(&self) -> ExponentiationMethod;

  /// Whether transition probability rows are renormalized to sum to 1 after exponentiation
  fn renormalize_transition_probabilities(&self) -> bool {
    false
  }

  /// Changes one parameter. Fails when the model has no such parameter or the value is invalid.
  fn set_parameter(&mut self, name: ParameterName, value: &ParameterValue) -> Result<(), Report>;

  /// Current values of all parameters
  fn parameters(&self) -> Vec<(ParameterName, ParameterValue)>;
}

/// Error for a parameter the model does not have
pub fn unknown_parameter(model: &str, name: ParameterName) -> Report {
  crate::utils::error::RateMatrixError::invalid_configuration(format!("Model '{model}' has no parameter '{name}'"))
}

/// Routes deserialization of a model through its validating constructor, so that a model read from JSON
/// obeys the same invariants as one built by `new`
#[macro_export(local_inner_macros)]
macro_rules! validate_on_deserialize {
  ($model:ty, $params:ty) => {
    impl TryFrom<$params> for $model {
      type Error = eyre::Report;

      fn try_from(params: $params) -> Result<Self, Self::Error> {
        Self::new(params)
      }
    }
  };
}

pub use validate_on_deserialize;
