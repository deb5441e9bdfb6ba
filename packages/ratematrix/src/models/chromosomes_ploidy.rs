use crate::adapter::parameter::{ParameterName, ParameterValue, check_rate};
use crate::exponentiation::method::ExponentiationMethod;
use crate::matrix::dense::MatrixReal;
use crate::models::chromosomes::ChromosomeEvents;
use crate::rate_matrix::generator::{RateMatrixGenerator, unknown_parameter, validate_on_deserialize};
use crate::utils::error::RateMatrixError;
use eyre::Report;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct ChromosomesPloidyParams {
  /// Largest chromosome number. Each ploidy level has states `0..=max_chromosomes`.
  #[default = 20]
  pub max_chromosomes: usize,

  #[default = 1.0]
  pub gamma_diploid: f64,

  #[default = 1.0]
  pub delta_diploid: f64,

  #[default = 0.1]
  pub rho_diploid: f64,

  #[default = 0.1]
  pub eta_diploid: f64,

  #[default = 1.0]
  pub gamma_polyploid: f64,

  #[default = 1.0]
  pub delta_polyploid: f64,

  #[default = 0.1]
  pub rho_polyploid: f64,

  #[default = 0.1]
  pub eta_polyploid: f64,

  /// Rediploidization rate
  #[default = 0.1]
  pub beta: f64,
}

/// Chromosome number evolution with separate diploid and polyploid rate classes (Zenil-Ferguson et al. 2017).
///
/// States `0..=max` are diploid counts, states `max+1..=2max+1` are polyploid counts. Gain and loss stay within
/// a ploidy level. Polyploidization and demi-polyploidization of a diploid lead into the polyploid level, while
/// those of a polyploid stay there. Rediploidization moves a polyploid with `i` chromosomes to the diploid
/// state with `i` chromosomes at rate `beta`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ChromosomesPloidyParams", into = "ChromosomesPloidyParams")]
pub struct ChromosomesPloidy {
  max_chromosomes: usize,
  gamma_diploid: f64,
  delta_diploid: f64,
  rho_diploid: f64,
  eta_diploid: f64,
  gamma_polyploid: f64,
  delta_polyploid: f64,
  rho_polyploid: f64,
  eta_polyploid: f64,
  beta: f64,
}

impl ChromosomesPloidy {
  pub fn new(params: ChromosomesPloidyParams) -> Result<Self, Report> {
    if params.max_chromosomes < 1 {
      return Err(RateMatrixError::invalid_configuration(
        "Chromosome ploidy model requires a maximum chromosome number of at least 1",
      ));
    }
    Ok(Self {
      max_chromosomes: params.max_chromosomes,
      gamma_diploid: check_rate(ParameterName::GammaDiploid, params.gamma_diploid)?,
      delta_diploid: check_rate(ParameterName::DeltaDiploid, params.delta_diploid)?,
      rho_diploid: check_rate(ParameterName::RhoDiploid, params.rho_diploid)?,
      eta_diploid: check_rate(ParameterName::EtaDiploid, params.eta_diploid)?,
      gamma_polyploid: check_rate(ParameterName::GammaPolyploid, params.gamma_polyploid)?,
      delta_polyploid: check_rate(ParameterName::DeltaPolyploid, params.delta_polyploid)?,
      rho_polyploid: check_rate(ParameterName::RhoPolyploid, params.rho_polyploid)?,
      eta_polyploid: check_rate(ParameterName::EtaPolyploid, params.eta_polyploid)?,
      beta: check_rate(ParameterName::Beta, params.beta)?,
    })
  }

  /// Index of the first polyploid state
  #[inline]
  pub const fn polyploid_offset(&self) -> usize {
    self.max_chromosomes + 1
  }

  fn diploid_events(&self) -> ChromosomeEvents {
    ChromosomeEvents {
      gamma: self.gamma_diploid,
      delta: self.delta_diploid,
      rho: self.rho_diploid,
      eta: self.eta_diploid,
      gamma_l: 0.0,
      delta_l: 0.0,
    }
  }

  fn polyploid_events(&self) -> ChromosomeEvents {
    ChromosomeEvents {
      gamma: self.gamma_polyploid,
      delta: self.delta_polyploid,
      rho: self.rho_polyploid,
      eta: self.eta_polyploid,
      gamma_l: 0.0,
      delta_l: 0.0,
    }
  }
}

validate_on_deserialize!(ChromosomesPloidy, ChromosomesPloidyParams);

impl From<ChromosomesPloidy> for ChromosomesPloidyParams {
  fn from(model: ChromosomesPloidy) -> Self {
    Self {
      max_chromosomes: model.max_chromosomes,
      gamma_diploid: model.gamma_diploid,
      delta_diploid: model.delta_diploid,
      rho_diploid: model.rho_diploid,
      eta_diploid: model.eta_diploid,
      gamma_polyploid: model.gamma_polyploid,
      delta_polyploid: model.delta_polyploid,
      rho_polyploid: model.rho_polyploid,
      eta_polyploid: model.eta_polyploid,
      beta: model.beta,
    }
  }
}

impl RateMatrixGenerator for ChromosomesPloidy {
  fn name(&self) -> &'static str {
    "ChromosomesPloidy"
  }

  fn num_states(&self) -> usize {
    2 * (self.max_chromosomes + 1)
  }

  fn build_rate_matrix(&self, q: &mut MatrixReal) -> Result<(), Report> {
    let max = self.max_chromosomes;
    let offset = self.polyploid_offset();
    let diploid = self.diploid_events();
    let polyploid = self.polyploid_events();

    for i in 1..=max {
      for (j, rate) in diploid.dysploidy(i, max) {
        q[[i, j]] += rate;
      }
      for (j, rate) in diploid.polyploidy(i, max) {
        q[[i, offset + j]] += rate;
      }

      for (j, rate) in polyploid.dysploidy(i, max).into_iter().chain(polyploid.polyploidy(i, max)) {
        q[[offset + i, offset + j]] += rate;
      }
      q[[offset + i, i]] += self.beta;
    }
    Ok(())
  }

  fn default_exponentiation(&self) -> ExponentiationMethod {
    ExponentiationMethod::TAYLOR
  }

  fn set_parameter(&mut self, name: ParameterName, value: &ParameterValue) -> Result<(), Report> {
    let field = match name {
      ParameterName::GammaDiploid => &mut self.gamma_diploid,
      ParameterName::DeltaDiploid => &mut self.delta_diploid,
      ParameterName::RhoDiploid => &mut self.rho_diploid,
      ParameterName::EtaDiploid => &mut self.eta_diploid,
      ParameterName::GammaPolyploid => &mut self.gamma_polyploid,
      ParameterName::DeltaPolyploid => &mut self.delta_polyploid,
      ParameterName::RhoPolyploid => &mut self.rho_polyploid,
      ParameterName::EtaPolyploid => &mut self.eta_polyploid,
      ParameterName::Beta => &mut self.beta,
      _ => return Err(unknown_parameter("ChromosomesPloidy", name)),
    };
    *field = check_rate(name, value.as_scalar(name)?)?;
    Ok(())
  }

  fn parameters(&self) -> Vec<(ParameterName, ParameterValue)> {
    vec![
      (ParameterName::GammaDiploid, ParameterValue::Scalar(self.gamma_diploid)),
      (ParameterName::DeltaDiploid, ParameterValue::Scalar(self.delta_diploid)),
      (ParameterName::RhoDiploid, ParameterValue::Scalar(self.rho_diploid)),
      (ParameterName::EtaDiploid, ParameterValue::Scalar(self.eta_diploid)),
      (ParameterName::GammaPolyploid, ParameterValue::Scalar(self.gamma_polyploid)),
      (ParameterName::DeltaPolyploid, ParameterValue::Scalar(self.delta_polyploid)),
      (ParameterName::RhoPolyploid, ParameterValue::Scalar(self.rho_polyploid)),
      (ParameterName::EtaPolyploid, ParameterValue::Scalar(self.eta_polyploid)),
      (ParameterName::Beta, ParameterValue::Scalar(self.beta)),
    ]
  }
}
