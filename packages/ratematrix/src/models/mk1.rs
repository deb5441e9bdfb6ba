use crate::adapter::parameter::{ParameterName, ParameterValue, check_rate};
use crate::exponentiation::method::ExponentiationMethod;
use crate::matrix::dense::MatrixReal;
use crate::rate_matrix::generator::{RateMatrixGenerator, unknown_parameter, validate_on_deserialize};
use crate::utils::error::RateMatrixError;
use eyre::Report;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Mk1Params {
  #[default = 4]
  pub num_states: usize,

  /// Rate of change between any two states
  #[default = 1.0]
  pub lambda: f64,
}

/// Lewis (2001) Mk model with a single rate: every state changes to every other state at rate `lambda`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Mk1Params", into = "Mk1Params")]
pub struct Mk1 {
  num_states: usize,
  lambda: f64,
}

impl Mk1 {
  pub fn new(Mk1Params { num_states, lambda }: Mk1Params) -> Result<Self, Report> {
    if num_states < 2 {
      return Err(RateMatrixError::invalid_configuration(format!(
        "Mk1 model requires at least 2 states, but got {num_states}"
      )));
    }
    Ok(Self {
      num_states,
      lambda: check_rate(ParameterName::Lambda, lambda)?,
    })
  }

  pub const fn lambda(&self) -> f64 {
    self.lambda
  }

  pub fn set_lambda(&mut self, lambda: f64) -> Result<(), Report> {
    self.lambda = check_rate(ParameterName::Lambda, lambda)?;
    Ok(())
  }
}

validate_on_deserialize!(Mk1, Mk1Params);

impl From<Mk1> for Mk1Params {
  fn from(Mk1 { num_states, lambda }: Mk1) -> Self {
    Self { num_states, lambda }
  }
}

impl RateMatrixGenerator for Mk1 {
  fn name(&self) -> &'static str {
    "Mk1"
  }

  fn num_states(&self) -> usize {
    self.num_states
  }

  fn build_rate_matrix(&self, q: &mut MatrixReal) -> Result<(), Report> {
    q.fill(self.lambda);
    Ok(())
  }

  fn stationary_frequencies(&self) -> Option<Array1<f64>> {
    Some(Array1::from_elem(self.num_states, 1.0 / self.num_states as f64))
  }

  fn is_time_reversible(&self) -> bool {
    true
  }

  fn default_exponentiation(&self) -> ExponentiationMethod {
    ExponentiationMethod::REPEATED_SQUARING
  }

  fn set_parameter(&mut self, name: ParameterName, value: &ParameterValue) -> Result<(), Report> {
    match name {
      ParameterName::Lambda => self.set_lambda(value.as_scalar(name)?),
      _ => Err(unknown_parameter(self.name(), name)),
    }
  }

  fn parameters(&self) -> Vec<(ParameterName, ParameterValue)> {
    vec![(ParameterName::Lambda, ParameterValue::Scalar(self.lambda))]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::rate_matrix::model::{ModelKind, RateMatrixModel};
  use approx::{assert_abs_diff_eq, assert_ulps_eq};
  use ndarray::array;
  use rstest::rstest;

  #[rstest]
  fn builds_two_state_symmetric_matrix() -> Result<(), Report> {
    let model = RateMatrixModel::new(ModelKind::Mk1(Mk1::new(Mk1Params {
      num_states: 2,
      lambda: 1.0,
    })?))?;
    assert_ulps_eq!(*model.rate_matrix(), array![[-1.0, 1.0], [1.0, -1.0]]);
    assert_ulps_eq!(model.stationary_frequencies()?, array![0.5, 0.5]);
    assert_ulps_eq!(model.calculate_stationary_frequencies()?, array![0.5, 0.5]);
    Ok(())
  }

  #[rstest]
  #[case(0.0, 1.0)]
  #[case(0.5, 0.5 + 0.5 * (-1.0_f64).exp())]
  #[case(50.0, 0.5)]
  fn two_state_transition_probabilities_follow_closed_form(#[case] t: f64, #[case] expected: f64) -> Result<(), Report> {
    let mut model = RateMatrixModel::new(ModelKind::Mk1(Mk1::new(Mk1Params {
      num_states: 2,
      lambda: 1.0,
    })?))?;
    let p = model.transition_probabilities(t)?;
    assert_abs_diff_eq!(p[[0, 0]], expected, epsilon = 1e-3);
    assert_abs_diff_eq!(p[[0, 1]], 1.0 - expected, epsilon = 1e-3);
    Ok(())
  }

  #[rstest]
  fn rejects_negative_rate() {
    assert!(Mk1::new(Mk1Params {
      num_states: 3,
      lambda: -1.0
    })
    .is_err());
  }
}
