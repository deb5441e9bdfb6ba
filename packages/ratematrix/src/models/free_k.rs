use crate::adapter::parameter::{ParameterName, ParameterValue, check_rates};
use crate::exponentiation::method::ExponentiationMethod;
use crate::matrix::dense::MatrixReal;
use crate::rate_matrix::generator::{RateMatrixGenerator, unknown_parameter, validate_on_deserialize};
use crate::utils::error::RateMatrixError;
use eyre::Report;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct FreeKParams {
  /// Off-diagonal rates, row by row, skipping the diagonal: `(0,1), (0,2), ..., (1,0), (1,2), ...`.
  /// There must be `n * (n - 1)` of them for `n` states.
  #[default(vec![1.0; 2])]
  pub rates: Vec<f64>,

  /// Rescale the matrix to one expected event per unit time
  #[default = true]
  pub rescale: bool,

  #[default(ExponentiationMethod::Eigen)]
  pub exponentiation: ExponentiationMethod,
}

/// Model with a free rate for every ordered pair of distinct states
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FreeKParams", into = "FreeKParams")]
pub struct FreeK {
  num_states: usize,
  rates: Vec<f64>,
  rescale: bool,
  exponentiation: ExponentiationMethod,
}

/// Number of states `n` such that `n * (n - 1) == num_rates`
pub(crate) fn num_states_from_rates(num_rates: usize) -> Option<usize> {
  (2..=num_rates + 1).find(|n| n * (n - 1) >= num_rates).filter(|n| n * (n - 1) == num_rates)
}

impl FreeK {
  pub fn new(
    FreeKParams {
      rates,
      rescale,
      exponentiation,
    }: FreeKParams,
  ) -> Result<Self, Report> {
    let num_states = num_states_from_rates(rates.len()).ok_or_else(|| {
      RateMatrixError::invalid_configuration(format!(
        "Number of rates of the free model must be n * (n - 1) for some number of states n >= 2, but got {}",
        rates.len()
      ))
    })?;
    let rates = check_rates(ParameterName::Rates, &rates)?;
    Ok(Self {
      num_states,
      rates,
      rescale,
      exponentiation,
    })
  }

  pub fn rates(&self) -> &[f64] {
    &self.rates
  }

  pub fn set_rates(&mut self, rates: &[f64]) -> Result<(), Report> {
    let value = ParameterValue::Vector(rates.to_vec());
    let rates = value.as_vector_of_len(ParameterName::Rates, self.rates.len())?;
    self.rates = check_rates(ParameterName::Rates, rates)?;
    Ok(())
  }
}

validate_on_deserialize!(FreeK, FreeKParams);

impl From<FreeK> for FreeKParams {
  fn from(model: FreeK) -> Self {
    Self {
      rates: model.rates,
      rescale: model.rescale,
      exponentiation: model.exponentiation,
    }
  }
}

impl RateMatrixGenerator for FreeK {
  fn name(&self) -> &'static str {
    "FreeK"
  }

  fn num_states(&self) -> usize {
    self.num_states
  }

  fn build_rate_matrix(&self, q: &mut MatrixReal) -> Result<(), Report> {
    let n = self.num_states;
    let mut rates = self.rates.iter();
    for i in 0..n {
      for j in 0..n {
        if i != j {
          if let Some(&rate) = rates.next() {
            q[[i, j]] = rate;
          }
        }
      }
    }
    Ok(())
  }

  fn rescale_target(&self) -> Option<f64> {
    self.rescale.then_some(1.0)
  }

  fn default_exponentiation(&self) -> ExponentiationMethod {
    self.exponentiation
  }

  fn renormalize_transition_probabilities(&self) -> bool {
    true
  }

  fn set_parameter(&mut self, name: ParameterName, value: &ParameterValue) -> Result<(), Report> {
    match name {
      ParameterName::Rates => self.set_rates(value.as_vector(name)?),
      _ => Err(unknown_parameter(self.name(), name)),
    }
  }

  fn parameters(&self) -> Vec<(ParameterName, ParameterValue)> {
    vec![(ParameterName::Rates, ParameterValue::Vector(self.rates.clone()))]
  }
}
