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
pub struct OrderedParams {
  /// Largest count. States are `0..=max_state`.
  #[default = 10]
  pub max_state: usize,

  /// Rate of gaining one unit
  #[default = 1.0]
  pub lambda: f64,

  /// Rate of losing one unit
  #[default = 1.0]
  pub mu: f64,

  /// Whether the count can drop to 0. State 0 is absorbing either way.
  #[default = true]
  pub allow_zero_state: bool,
}

/// Ordered count model: a count changes by one step at a time, up at rate `lambda` and down at rate `mu`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "OrderedParams", into = "OrderedParams")]
pub struct Ordered {
  max_state: usize,
  lambda: f64,
  mu: f64,
  allow_zero_state: bool,
}

impl Ordered {
  pub fn new(
    OrderedParams {
      max_state,
      lambda,
      mu,
      allow_zero_state,
    }: OrderedParams,
  ) -> Result<Self, Report> {
    if max_state < 1 {
      return Err(RateMatrixError::invalid_configuration(
        "Ordered model requires a maximum state of at least 1",
      ));
    }
    Ok(Self {
      max_state,
      lambda: check_rate(ParameterName::Lambda, lambda)?,
      mu: check_rate(ParameterName::Mu, mu)?,
      allow_zero_state,
    })
  }

  pub fn set_lambda(&mut self, lambda: f64) -> Result<(), Report> {
    self.lambda = check_rate(ParameterName::Lambda, lambda)?;
    Ok(())
  }

  pub fn set_mu(&mut self, mu: f64) -> Result<(), Report> {
    self.mu = check_rate(ParameterName::Mu, mu)?;
    Ok(())
  }
}

validate_on_deserialize!(Ordered, OrderedParams);

impl From<Ordered> for OrderedParams {
  fn from(model: Ordered) -> Self {
    Self {
      max_state: model.max_state,
      lambda: model.lambda,
      mu: model.mu,
      allow_zero_state: model.allow_zero_state,
    }
  }
}

impl RateMatrixGenerator for Ordered {
  fn name(&self) -> &'static str {
    "Ordered"
  }

  fn num_states(&self) -> usize {
    self.max_state + 1
  }

  fn build_rate_matrix(&self, q: &mut MatrixReal) -> Result<(), Report> {
    for i in 1..=self.max_state {
      if i < self.max_state {
        q[[i, i + 1]] = self.lambda;
      }
      if i > 1 || self.allow_zero_state {
        q[[i, i - 1]] = self.mu;
      }
    }
    Ok(())
  }

  fn default_exponentiation(&self) -> ExponentiationMethod {
    ExponentiationMethod::TAYLOR
  }

  fn set_parameter(&mut self, name: ParameterName, value: &ParameterValue) -> Result<(), Report> {
    match name {
      ParameterName::Lambda => self.set_lambda(value.as_scalar(name)?),
      ParameterName::Mu => self.set_mu(value.as_scalar(name)?),
      _ => Err(unknown_parameter(self.name(), name)),
    }
  }

  fn parameters(&self) -> Vec<(ParameterName, ParameterValue)> {
    vec![
      (ParameterName::Lambda, ParameterValue::Scalar(self.lambda)),
      (ParameterName::Mu, ParameterValue::Scalar(self.mu)),
    ]
  }
}
