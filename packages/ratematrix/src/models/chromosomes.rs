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
pub struct ChromosomesParams {
  /// Largest chromosome number. States are `0..=max_chromosomes`.
  #[default = 20]
  pub max_chromosomes: usize,

  /// Rate of gaining one chromosome
  #[default = 1.0]
  pub gamma: f64,

  /// Rate of losing one chromosome
  #[default = 1.0]
  pub delta: f64,

  /// Rate of polyploidization (doubling)
  #[default = 0.1]
  pub rho: f64,

  /// Rate of demi-polyploidization (multiplying by 1.5)
  #[default = 0.1]
  pub eta: f64,

  /// Exponential dependence of the gain rate on the chromosome number
  #[default = 0.0]
  pub gamma_l: f64,

  /// Exponential dependence of the loss rate on the chromosome number
  #[default = 0.0]
  pub delta_l: f64,
}

/// ChromEvol model of chromosome number evolution (Mayrose et al. 2010, Glick & Mayrose 2014).
///
/// From `i` chromosomes (`i >= 1`):
///  - gain to `i + 1` at `gamma * exp(gamma_l * (i - 1))`
///  - loss to `i - 1` (not below 1) at `delta * exp(delta_l * (i - 1))`
///  - polyploidization to `2 i` at `rho`
///  - demi-polyploidization to `1.5 i` at `eta` for even `i`, or to each of `1.5 i - 0.5` and `1.5 i + 0.5` at
///    `eta / 2` for odd `i > 1`
///
/// Transitions beyond `max_chromosomes` are dropped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ChromosomesParams", into = "ChromosomesParams")]
pub struct Chromosomes {
  max_chromosomes: usize,
  gamma: f64,
  delta: f64,
  rho: f64,
  eta: f64,
  gamma_l: f64,
  delta_l: f64,
}

/// Rate-scaled chromosome number changes shared with the ploidy model
#[derive(Copy, Clone, Debug, PartialEq)]
pub(crate) struct ChromosomeEvents {
  pub gamma: f64,
  pub delta: f64,
  pub rho: f64,
  pub eta: f64,
  pub gamma_l: f64,
  pub delta_l: f64,
}

impl ChromosomeEvents {
  /// Gain and loss from `i` chromosomes as `(target, rate)` pairs, within `1..=max`
  pub fn dysploidy(&self, i: usize, max: usize) -> Vec<(usize, f64)> {
    let mut events = vec![];
    if i == 0 {
      return events;
    }
    let linear = (i - 1) as f64;
    if i < max {
      events.push((i + 1, self.gamma * (self.gamma_l * linear).exp()));
    }
    if i > 1 {
      events.push((i - 1, self.delta * (self.delta_l * linear).exp()));
    }
    events
  }

  /// Polyploidization and demi-polyploidization from `i` chromosomes as `(target, rate)` pairs, within `1..=max`
  pub fn polyploidy(&self, i: usize, max: usize) -> Vec<(usize, f64)> {
    let mut events = vec![];
    if i == 0 {
      return events;
    }
    if 2 * i <= max {
      events.push((2 * i, self.rho));
    }
    if i % 2 == 0 {
      let j = 3 * i / 2;
      if j <= max {
        events.push((j, self.eta));
      }
    } else if i > 1 {
      let down = (3 * i - 1) / 2;
      let up = (3 * i + 1) / 2;
      if down <= max {
        events.push((down, self.eta / 2.0));
      }
      if up <= max {
        events.push((up, self.eta / 2.0));
      }
    }
    events
  }
}

impl Chromosomes {
  pub fn new(
    ChromosomesParams {
      max_chromosomes,
      gamma,
      delta,
      rho,
      eta,
      gamma_l,
      delta_l,
    }: ChromosomesParams,
  ) -> Result<Self, Report> {
    if max_chromosomes < 1 {
      return Err(RateMatrixError::invalid_configuration(
        "Chromosome number model requires a maximum chromosome number of at least 1",
      ));
    }
    if !gamma_l.is_finite() || !delta_l.is_finite() {
      return Err(RateMatrixError::invalid_configuration(
        "Linear dependence parameters of the chromosome number model must be finite",
      ));
    }
    Ok(Self {
      max_chromosomes,
      gamma: check_rate(ParameterName::Gamma, gamma)?,
      delta: check_rate(ParameterName::Delta, delta)?,
      rho: check_rate(ParameterName::Rho, rho)?,
      eta: check_rate(ParameterName::Eta, eta)?,
      gamma_l,
      delta_l,
    })
  }

  fn events(&self) -> ChromosomeEvents {
    ChromosomeEvents {
      gamma: self.gamma,
      delta: self.delta,
      rho: self.rho,
      eta: self.eta,
      gamma_l: self.gamma_l,
      delta_l: self.delta_l,
    }
  }
}

fn check_finite(name: ParameterName, x: f64) -> Result<f64, Report> {
  if !x.is_finite() {
    return Err(RateMatrixError::invalid_configuration(format!(
      "Parameter '{name}' must be finite, but got {x}"
    )));
  }
  Ok(x)
}

validate_on_deserialize!(Chromosomes, ChromosomesParams);

impl From<Chromosomes> for ChromosomesParams {
  fn from(model: Chromosomes) -> Self {
    Self {
      max_chromosomes: model.max_chromosomes,
      gamma: model.gamma,
      delta: model.delta,
      rho: model.rho,
      eta: model.eta,
      gamma_l: model.gamma_l,
      delta_l: model.delta_l,
    }
  }
}

impl RateMatrixGenerator for Chromosomes {
  fn name(&self) -> &'static str {
    "Chromosomes"
  }

  fn num_states(&self) -> usize {
    self.max_chromosomes + 1
  }

  fn build_rate_matrix(&self, q: &mut MatrixReal) -> Result<(), Report> {
    let events = self.events();
    let max = self.max_chromosomes;
    for i in 1..=max {
      for (j, rate) in events.dysploidy(i, max).into_iter().chain(events.polyploidy(i, max)) {
        q[[i, j]] += rate;
      }
    }
    Ok(())
  }

  fn default_exponentiation(&self) -> ExponentiationMethod {
    ExponentiationMethod::Eigen
  }

  fn set_parameter(&mut self, name: ParameterName, value: &ParameterValue) -> Result<(), Report> {
    match name {
      ParameterName::Gamma => self.gamma = check_rate(name, value.as_scalar(name)?)?,
      ParameterName::Delta => self.delta = check_rate(name, value.as_scalar(name)?)?,
      ParameterName::Rho => self.rho = check_rate(name, value.as_scalar(name)?)?,
      ParameterName::Eta => self.eta = check_rate(name, value.as_scalar(name)?)?,
      ParameterName::GammaL => self.gamma_l = check_finite(name, value.as_scalar(name)?)?,
      ParameterName::DeltaL => self.delta_l = check_finite(name, value.as_scalar(name)?)?,
      _ => return Err(unknown_parameter(self.name(), name)),
    }
    Ok(())
  }

  fn parameters(&self) -> Vec<(ParameterName, ParameterValue)> {
    vec![
      (ParameterName::Gamma, ParameterValue::Scalar(self.gamma)),
      (ParameterName::Delta, ParameterValue::Scalar(self.delta)),
      (ParameterName::Rho, ParameterValue::Scalar(self.rho)),
      (ParameterName::Eta, ParameterValue::Scalar(self.eta)),
      (ParameterName::GammaL, ParameterValue::Scalar(self.gamma_l)),
      (ParameterName::DeltaL, ParameterValue::Scalar(self.delta_l)),
    ]
  }
}
