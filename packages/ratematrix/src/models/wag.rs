use crate::adapter::parameter::{ParameterName, ParameterValue};
use crate::constants::NUM_AMINO_ACIDS;
use crate::exponentiation::method::ExponentiationMethod;
use crate::matrix::dense::MatrixReal;
use crate::models::gtr::{Gtr, GtrParams, num_exchangeabilities};
use crate::rate_matrix::generator::{RateMatrixGenerator, unknown_parameter, validate_on_deserialize};
use crate::utils::error::RateMatrixError;
use eyre::Report;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Upper triangle of the WAG exchangeabilities, row by row, in the amino acid order `ARNDCQEGHILKMFPSTWYV`
#[rustfmt::skip]
const WAG_EXCHANGEABILITIES: [f64; num_exchangeabilities(NUM_AMINO_ACIDS)] = [
  // A
  0.551571, 0.509848, 0.738998, 1.02704, 0.908598, 1.58285, 1.41672, 0.316954, 0.193335, 0.397915,
  0.906265, 0.893496, 0.210494, 1.43855, 3.37079, 2.12111, 0.113133, 0.240735, 2.00601,
  // R
  0.635346, 0.147304, 0.528191, 3.0355, 0.439157, 0.584665, 2.13715, 0.186979, 0.497671, 5.35142,
  0.683162, 0.102711, 0.679489, 1.22419, 0.554413, 1.16392, 0.381533, 0.251849,
  // N
  5.42942, 0.265256, 1.54364, 0.947198, 1.12556, 3.95629, 0.554236, 0.131528, 3.01201, 0.198221,
  0.0961621, 0.195081, 3.97423, 2.03006, 0.0719167, 1.086, 0.196246,
  // D
  0.0302949, 0.616783, 6.17416, 0.865584, 0.930676, 0.039437, 0.0848047, 0.479855, 0.103754, 0.0467304,
  0.423984, 1.07176, 0.374866, 0.129767, 0.325711, 0.152335,
  // C
  0.0988179, 0.021352, 0.306674, 0.248972, 0.170135, 0.384287, 0.0740339, 0.390482, 0.39802, 0.109404,
  1.40766, 0.512984, 0.71707, 0.543833, 1.00214,
  // Q
  5.46947, 0.330052, 4.29411, 0.113917, 0.869489, 3.8949, 1.54526, 0.0999208, 0.933372, 1.02887,
  0.857928, 0.215737, 0.22771, 0.301281,
  // E
  0.567717, 0.570025, 0.127395, 0.154263, 2.58443, 0.315124, 0.0811339, 0.682355, 0.704939, 0.822765,
  0.156557, 0.196303, 0.588731,
  // G
  0.24941, 0.0304501, 0.0613037, 0.373558, 0.1741, 0.049931, 0.24357, 1.34182, 0.225833, 0.336983,
  0.103604, 0.187247,
  // H
  0.13819, 0.499462, 0.890432, 0.404141, 0.679371, 0.696198, 0.740169, 0.473307, 0.262569, 3.87344,
  0.118358,
  // I
  3.17097, 0.323832, 4.25746, 1.05947, 0.0999288, 0.31944, 1.45816, 0.212483, 0.42017, 7.8213,
  // L
  0.257555, 4.85402, 2.11517, 0.415844, 0.344739, 0.326622, 0.665309, 0.398618, 1.80034,
  // K
  0.934276, 0.088836, 0.556896, 0.96713, 1.38698, 0.137505, 0.133264, 0.305434,
  // M
  1.19063, 0.171329, 0.493905, 1.51612, 0.515706, 0.428437, 2.05845,
  // F
  0.161444, 0.545931, 0.171903, 1.52964, 6.45428, 0.649892,
  // P
  1.61328, 0.795384, 0.139405, 0.216046, 0.314887,
  // S
  4.37802, 0.523742, 0.786993, 0.232739,
  // T
  0.110864, 0.291148, 1.38823,
  // W
  2.48539, 0.365369,
  // Y
  0.31473,
];

#[rustfmt::skip]
const WAG_FREQUENCIES: [f64; NUM_AMINO_ACIDS] = [
  0.0866279, 0.043972, 0.0390894, 0.0570451, 0.0193078, 0.0367281, 0.0580589, 0.0832518, 0.0244313, 0.048466,
  0.086209, 0.0620286, 0.0195027, 0.0384319, 0.0457631, 0.0695179, 0.0610127, 0.0143859, 0.0352742, 0.0708956,
];

/// Empirical WAG frequencies. The published values are rounded and sum to 1 only up to 1e-7.
pub fn wag_frequencies() -> Vec<f64> {
  let total: f64 = WAG_FREQUENCIES.iter().sum();
  WAG_FREQUENCIES.iter().map(|f| f / total).collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct WagParams {
  /// Equilibrium amino acid frequencies. The empirical WAG frequencies when absent.
  pub stationary_frequencies: Option<Vec<f64>>,
}

/// Empirical amino acid model of Whelan & Goldman (2001): a GTR model over 20 amino acids whose exchangeabilities
/// are fixed. Only the equilibrium frequencies can change.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WagParams", into = "WagParams")]
pub struct Wag {
  gtr: Gtr,
}

impl Wag {
  pub fn new(WagParams { stationary_frequencies }: WagParams) -> Result<Self, Report> {
    let stationary_frequencies = stationary_frequencies.unwrap_or_else(wag_frequencies);
    if stationary_frequencies.len() != NUM_AMINO_ACIDS {
      return Err(RateMatrixError::invalid_configuration(format!(
        "WAG model requires {NUM_AMINO_ACIDS} amino acid frequencies, but got {}",
        stationary_frequencies.len()
      )));
    }
    let gtr = Gtr::new(GtrParams {
      exchangeabilities: WAG_EXCHANGEABILITIES.to_vec(),
      stationary_frequencies,
    })?;
    Ok(Self { gtr })
  }

  #[inline]
  pub fn pi(&self) -> &Array1<f64> {
    self.gtr.pi()
  }
}

validate_on_deserialize!(Wag, WagParams);

impl From<Wag> for WagParams {
  fn from(model: Wag) -> Self {
    Self {
      stationary_frequencies: Some(model.pi().to_vec()),
    }
  }
}

impl RateMatrixGenerator for Wag {
  fn name(&self) -> &'static str {
    "WAG"
  }

  fn num_states(&self) -> usize {
    NUM_AMINO_ACIDS
  }

  fn build_rate_matrix(&self, q: &mut MatrixReal) -> Result<(), Report> {
    self.gtr.build_rate_matrix(q)
  }

  fn rescale_target(&self) -> Option<f64> {
    self.gtr.rescale_target()
  }

  fn stationary_frequencies(&self) -> Option<Array1<f64>> {
    self.gtr.stationary_frequencies()
  }

  fn is_time_reversible(&self) -> bool {
    true
  }

  fn default_exponentiation(&self) -> ExponentiationMethod {
    ExponentiationMethod::Eigen
  }

  fn set_parameter(&mut self, name: ParameterName, value: &ParameterValue) -> Result<(), Report> {
    match name {
      ParameterName::StationaryFrequencies => self.gtr.set_stationary_frequencies(value.as_vector(name)?),
      _ => Err(unknown_parameter(self.name(), name)),
    }
  }

  fn parameters(&self) -> Vec<(ParameterName, ParameterValue)> {
    vec![(
      ParameterName::StationaryFrequencies,
      ParameterValue::Vector(self.pi().to_vec()),
    )]
  }
}
