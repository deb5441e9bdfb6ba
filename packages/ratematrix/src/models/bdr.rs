use crate::adapter::parameter::{ParameterName, ParameterValue, check_rate};
use crate::exponentiation::method::ExponentiationMethod;
use crate::matrix::dense::MatrixReal;
use crate::rate_matrix::generator::{RateMatrixGenerator, unknown_parameter, validate_on_deserialize};
use crate::utils::error::RateMatrixError;
use eyre::Report;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct BdrParams {
  /// Largest count. States are `0..=max_state`.
  #[default = 10]
  pub max_state: usize,

  /// Per-copy birth rate
  #[default = 1.0]
  pub lambda: f64,

  /// Per-copy death rate
  #[default = 1.0]
  pub mu: f64,

  /// Re-establishment rate out of the empty state
  #[default = 0.1]
  pub rho: f64,
}

/// Linear birth-death process on counts with re-establishment from zero.
///
/// A count `i >= 1` grows by one at rate `lambda * i` and shrinks by one at rate `mu * i`.
/// The empty state is left at rate `rho`. Counts cannot exceed `max_state`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BdrParams", into = "BdrParams")]
pub struct Bdr {
  max_state: usize,
  lambda: f64,
  mu: f64,
  rho: f64,
}

impl Bdr {
  pub fn new(
    BdrParams {
      max_state,
      lambda,
      mu,
      rho,
    }: BdrParams,
  ) -> Result<Self, Report> {
    if max_state < 1 {
      return Err(RateMatrixError::invalid_configuration(
        "BDR model requires a maximum state of at least 1",
      ));
    }
    Ok(Self {
      max_state,
      lambda: check_rate(ParameterName::Lambda, lambda)?,
      mu: check_rate(ParameterName::Mu, mu)?,
      rho: check_rate(ParameterName::Rho, rho)?,
    })
  }
}

validate_on_deserialize!(Bdr, BdrParams);

impl From<Bdr> for BdrParams {
  fn from(Bdr { max_state, lambda, mu, rho }: Bdr) -> Self {
    Self {
      max_state,
      lambda,
      mu,
      rho,
    }
  }
}

impl RateMatrixGenerator for Bdr {
  fn name(&self) -> &'static str {
    "BDR"
  }

  fn num_states(&self) -> usize {
    self.max_state + 1
  }

  fn build_rate_matrix(&self, q: &mut MatrixReal) -> Result<(), Report> {
    q[[0, 1]] = self.rho;
    for i in 1..=self.max_state {
      let count = i as f64;
      if i < self.max_state {
        q[[i, i + 1]] = self.lambda * count;
      }
      q[[i, i - 1]] = self.mu * count;
    }
    Ok(())
  }

  fn default_exponentiation(&self) -> ExponentiationMethod {
    ExponentiationMethod::TAYLOR
  }

  fn set_parameter(&mut self, name: ParameterName, value: &ParameterValue) -> Result<(), Report> {
    match name {
      ParameterName::Lambda => self.lambda = check_rate(name, value.as_scalar(name)?)?,
      ParameterName::Mu => self.mu = check_rate(name, value.as_scalar(name)?)?,
      ParameterName::Rho => self.rho = check_rate(name, value.as_scalar(name)?)?,
      _ => return Err(unknown_parameter(self.name(), name)),
    }
    Ok(())
  }

  fn parameters(&self) -> Vec<(ParameterName, ParameterValue)> {
    vec![
      (ParameterName::Lambda, ParameterValue::Scalar(self.lambda)),
      (ParameterName::Mu, ParameterValue::Scalar(self.mu)),
      (ParameterName::Rho, ParameterValue::Scalar(self.rho)),
    ]
  }
}
