use crate::utils::error::RateMatrixError;
use eyre::Report;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum_macros::{Display, EnumString};

/// Names of the model parameters which can be updated from outside
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ParameterName {
  Lambda,
  Mu,
  Rho,
  Gamma,
  Delta,
  Eta,
  GammaL,
  DeltaL,
  GammaDiploid,
  DeltaDiploid,
  RhoDiploid,
  EtaDiploid,
  GammaPolyploid,
  DeltaPolyploid,
  RhoPolyploid,
  EtaPolyploid,
  Beta,
  EffectivePopulationSize,
  Rates,
  Exchangeabilities,
  StationaryFrequencies,
  MutationRates,
  SelectionCoefficients,
  Kappa,
  Omega,
  NucleotideFrequencies,
  SwitchRates,
  ClockRates,
}

/// Current value of a parameter: a scalar or a vector (rates, simplex)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
  Scalar(f64),
  Vector(Vec<f64>),
}

impl ParameterValue {
  pub fn as_scalar(&self, name: ParameterName) -> Result<f64, Report> {
    match self {
      Self::Scalar(x) => Ok(*x),
      Self::Vector(_) => Err(RateMatrixError::invalid_configuration(format!(
        "Parameter '{name}' expects a scalar value, but got a vector"
      ))),
    }
  }

  pub fn as_vector(&self, name: ParameterName) -> Result<&[f64], Report> {
    match self {
      Self::Vector(values) => Ok(values),
      Self::Scalar(_) => Err(RateMatrixError::invalid_configuration(format!(
        "Parameter '{name}' expects a vector value, but got a scalar"
      ))),
    }
  }

  /// Vector value of an exact length
  pub fn as_vector_of_len(&self, name: ParameterName, len: usize) -> Result<&[f64], Report> {
    let values = self.as_vector(name)?;
    if values.len() != len {
      return Err(RateMatrixError::invalid_configuration(format!(
        "Parameter '{name}' expects {len} values, but got {}",
        values.len()
      )));
    }
    Ok(values)
  }
}

impl From<f64> for ParameterValue {
  fn from(x: f64) -> Self {
    Self::Scalar(x)
  }
}

impl From<Vec<f64>> for ParameterValue {
  fn from(values: Vec<f64>) -> Self {
    Self::Vector(values)
  }
}

/// Fails unless a rate is a non-negative finite number
pub fn check_rate(name: ParameterName, x: f64) -> Result<f64, Report> {
  if !x.is_finite() || x < 0.0 {
    return Err(RateMatrixError::invalid_configuration(format!(
      "Parameter '{name}' must be a non-negative finite number, but got {x}"
    )));
  }
  Ok(x)
}

/// Fails unless every element is a non-negative finite number
pub fn check_rates(name: ParameterName, values: &[f64]) -> Result<Vec<f64>, Report> {
  values.iter().map(|&x| check_rate(name, x)).collect()
}

/// Fails unless the values form a probability vector (non-negative and summing to 1)
pub fn check_simplex(name: ParameterName, values: &[f64]) -> Result<Vec<f64>, Report> {
  let values = check_rates(name, values)?;
  let sum: f64 = values.iter().sum();
  if (sum - 1.0).abs() > 1e-6 {
    return Err(RateMatrixError::invalid_configuration(format!(
      "Parameter '{name}' must sum to 1, but sums to {sum}"
    )));
  }
  Ok(values)
}

/// Provides the current value of a parameter owned by the surrounding model graph
pub trait ParameterSource {
  fn value(&self) -> ParameterValue;
}

/// Parameter which never changes
#[derive(Clone, Debug, PartialEq)]
pub struct ConstantParameter(pub ParameterValue);

impl ParameterSource for ConstantParameter {
  fn value(&self) -> ParameterValue {
    self.0.clone()
  }
}

/// Parameter shared between its owner (e.g. an MCMC move) and one or more rate matrix functions
#[derive(Clone, Debug)]
pub struct SharedParameter {
  inner: Arc<RwLock<ParameterValue>>,
}

impl SharedParameter {
  pub fn new(value: impl Into<ParameterValue>) -> Self {
    Self {
      inner: Arc::new(RwLock::new(value.into())),
    }
  }

  pub fn set(&self, value: impl Into<ParameterValue>) {
    *self.inner.write() = value.into();
  }
}

impl ParameterSource for SharedParameter {
  fn value(&self) -> ParameterValue {
    self.inner.read().clone()
  }
}
