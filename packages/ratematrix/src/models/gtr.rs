use crate::adapter::parameter::{ParameterName, ParameterValue, check_rates, check_simplex};
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
pub struct GtrParams {
  /// Symmetric exchangeability rates of the upper triangle, row by row:
  /// `(0,1), (0,2), ..., (0,n-1), (1,2), ...`. For nucleotides: AC, AG, AT, CG, CT, GT.
  #[default(vec![1.0; 6])]
  pub exchangeabilities: Vec<f64>,

  /// Equilibrium frequencies (must sum to 1)
  #[default(vec![0.25; 4])]
  pub stationary_frequencies: Vec<f64>,
}

/// General time-reversible model: `Q_ij = r_ij pi_j`, rescaled to one expected substitution per unit time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GtrParams", into = "GtrParams")]
pub struct Gtr {
  exchangeabilities: Array1<f64>,
  pi: Array1<f64>,
}

#[inline]
pub const fn num_exchangeabilities(num_states: usize) -> usize {
  num_states * (num_states - 1) / 2
}

impl Gtr {
  pub fn new(
    GtrParams {
      exchangeabilities,
      stationary_frequencies,
    }: GtrParams,
  ) -> Result<Self, Report> {
    let num_states = stationary_frequencies.len();
    if num_states < 2 {
      return Err(RateMatrixError::invalid_configuration(format!(
        "GTR model requires at least 2 states, but got {num_states} stationary frequencies"
      )));
    }

    let pi = check_simplex(ParameterName::StationaryFrequencies, &stationary_frequencies)?;
    let mut this = Self {
      exchangeabilities: Array1::zeros(num_exchangeabilities(num_states)),
      pi: Array1::from(pi),
    };
    this.set_exchangeabilities(&exchangeabilities)?;
    Ok(this)
  }

  pub fn exchangeabilities(&self) -> &Array1<f64> {
    &self.exchangeabilities
  }

  pub fn pi(&self) -> &Array1<f64> {
    &self.pi
  }

  pub fn set_exchangeabilities(&mut self, exchangeabilities: &[f64]) -> Result<(), Report> {
    let value = ParameterValue::Vector(exchangeabilities.to_vec());
    let exchangeabilities = value.as_vector_of_len(ParameterName::Exchangeabilities, self.exchangeabilities.len())?;
    self.exchangeabilities = Array1::from(check_rates(ParameterName::Exchangeabilities, exchangeabilities)?);
    Ok(())
  }

  pub fn set_stationary_frequencies(&mut self, pi: &[f64]) -> Result<(), Report> {
    let value = ParameterValue::Vector(pi.to_vec());
    let pi = value.as_vector_of_len(ParameterName::StationaryFrequencies, self.pi.len())?;
    self.pi = Array1::from(check_simplex(ParameterName::StationaryFrequencies, pi)?);
    Ok(())
  }
}

validate_on_deserialize!(Gtr, GtrParams);

impl From<Gtr> for GtrParams {
  fn from(model: Gtr) -> Self {
    Self {
      exchangeabilities: model.exchangeabilities.to_vec(),
      stationary_frequencies: model.pi.to_vec(),
    }
  }
}

impl RateMatrixGenerator for Gtr {
  fn name(&self) -> &'static str {
    "GTR"
  }

  fn num_states(&self) -> usize {
    self.pi.len()
  }

  fn build_rate_matrix(&self, q: &mut MatrixReal) -> Result<(), Report> {
    let n = self.num_states();
    let mut k = 0;
    for i in 0..n {
      for j in (i + 1)..n {
        let r = self.exchangeabilities[k];
        q[[i, j]] = r * self.pi[j];
        q[[j, i]] = r * self.pi[i];
        k += 1;
      }
    }
    Ok(())
  }

  fn rescale_target(&self) -> Option<f64> {
    Some(1.0)
  }

  fn stationary_frequencies(&self) -> Option<Array1<f64>> {
    Some(self.pi.clone())
  }

  fn is_time_reversible(&self) -> bool {
    true
  }

  fn default_exponentiation(&self) -> ExponentiationMethod {
    ExponentiationMethod::Eigen
  }

  fn set_parameter(&mut self, name: ParameterName, value: &ParameterValue) -> Result<(), Report> {
    match name {
      ParameterName::Exchangeabilities => self.set_exchangeabilities(value.as_vector(name)?),
      ParameterName::StationaryFrequencies => self.set_stationary_frequencies(value.as_vector(name)?),
      _ => Err(unknown_parameter(self.name(), name)),
    }
  }

  fn parameters(&self) -> Vec<(ParameterName, ParameterValue)> {
    vec![
      (
        ParameterName::Exchangeabilities,
        ParameterValue::Vector(self.exchangeabilities.to_vec()),
      ),
      (
        ParameterName::StationaryFrequencies,
        ParameterValue::Vector(self.pi.to_vec()),
      ),
    ]
  }
}
