use crate::adapter::parameter::{ParameterName, ParameterValue, check_rates, check_simplex};
use crate::constants::{NUM_NUCLEOTIDE_PAIRS, NUM_NUCLEOTIDES};
use crate::exponentiation::method::ExponentiationMethod;
use crate::matrix::dense::MatrixReal;
use crate::models::pomo_state::{NUCLEOTIDE_PAIRS, check_population_size, num_pomo_states, polymorphic_index};
use crate::rate_matrix::generator::{RateMatrixGenerator, unknown_parameter, validate_on_deserialize};
use eyre::Report;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct ReversiblePomoParams {
  /// Virtual population size `N`
  #[default = 10]
  pub virtual_population_size: usize,

  /// Exchangeabilities of the nucleotide pairs AC, AG, AT, CG, CT, GT
  #[default(vec![0.01; 6])]
  pub exchangeabilities: Vec<f64>,

  /// Equilibrium frequencies of A, C, G and T
  #[default(vec![0.25; 4])]
  pub stationary_frequencies: Vec<f64>,
}

/// Reversible polymorphism-aware model (Schrempf et al. 2016) with neutral drift.
///
/// Mutation from `a` to `b` happens at `rho_ab * pi_b`. Within a pair, a count `j` moves to `j +- 1` at
/// `j (N - j) / N`. The matrix is normalized to one expected event per unit time under its stationary distribution,
/// which is known in closed form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ReversiblePomoParams", into = "ReversiblePomoParams")]
pub struct ReversiblePomo {
  virtual_population_size: usize,
  exchangeabilities: Array1<f64>,
  pi: Array1<f64>,
}

impl ReversiblePomo {
  pub fn new(
    ReversiblePomoParams {
      virtual_population_size,
      exchangeabilities,
      stationary_frequencies,
    }: ReversiblePomoParams,
  ) -> Result<Self, Report> {
    let mut this = Self {
      virtual_population_size: check_population_size(virtual_population_size)?,
      exchangeabilities: Array1::zeros(NUM_NUCLEOTIDE_PAIRS),
      pi: Array1::zeros(NUM_NUCLEOTIDES),
    };
    this.set_exchangeabilities(&exchangeabilities)?;
    this.set_stationary_frequencies(&stationary_frequencies)?;
    Ok(this)
  }

  pub fn set_exchangeabilities(&mut self, exchangeabilities: &[f64]) -> Result<(), Report> {
    let value = ParameterValue::Vector(exchangeabilities.to_vec());
    let exchangeabilities = value.as_vector_of_len(ParameterName::Exchangeabilities, NUM_NUCLEOTIDE_PAIRS)?;
    self.exchangeabilities = Array1::from(check_rates(ParameterName::Exchangeabilities, exchangeabilities)?);
    Ok(())
  }

  pub fn set_stationary_frequencies(&mut self, pi: &[f64]) -> Result<(), Report> {
    let value = ParameterValue::Vector(pi.to_vec());
    let pi = value.as_vector_of_len(ParameterName::StationaryFrequencies, NUM_NUCLEOTIDES)?;
    self.pi = Array1::from(check_simplex(ParameterName::StationaryFrequencies, pi)?);
    Ok(())
  }

  /// Mutation rate from nucleotide `a` into the pair `pair`, whose other nucleotide is `b`
  #[inline]
  fn mutation_coefficient(&self, pair: usize, b: usize) -> f64 {
    self.pi[b] * self.exchangeabilities[pair]
  }

  fn unnormalized_stationary_frequencies(&self) -> Array1<f64> {
    let n = self.virtual_population_size;
    let size = n as f64;
    let mut pi = Array1::zeros(num_pomo_states(n));
    for a in 0..NUM_NUCLEOTIDES {
      pi[a] = self.pi[a];
    }
    for (pair, &(a, b)) in NUCLEOTIDE_PAIRS.iter().enumerate() {
      let flux = self.exchangeabilities[pair] * self.pi[a] * self.pi[b];
      for count in 1..n {
        pi[polymorphic_index(pair, count, n)] = flux * size / (count * (n - count)) as f64;
      }
    }
    pi
  }
}

validate_on_deserialize!(ReversiblePomo, ReversiblePomoParams);

impl From<ReversiblePomo> for ReversiblePomoParams {
  fn from(model: ReversiblePomo) -> Self {
    Self {
      virtual_population_size: model.virtual_population_size,
      exchangeabilities: model.exchangeabilities.to_vec(),
      stationary_frequencies: model.pi.to_vec(),
    }
  }
}

impl RateMatrixGenerator for ReversiblePomo {
  fn name(&self) -> &'static str {
    "ReversiblePoMo"
  }

  fn num_states(&self) -> usize {
    num_pomo_states(self.virtual_population_size)
  }

  fn build_rate_matrix(&self, q: &mut MatrixReal) -> Result<(), Report> {
    let n = self.virtual_population_size;
    let size = n as f64;

    for (pair, &(a, b)) in NUCLEOTIDE_PAIRS.iter().enumerate() {
      q[[a, polymorphic_index(pair, n - 1, n)]] = self.mutation_coefficient(pair, b);
      q[[b, polymorphic_index(pair, 1, n)]] = self.mutation_coefficient(pair, a);

      for count in 1..n {
        let from = polymorphic_index(pair, count, n);
        let up = if count + 1 == n { a } else { polymorphic_index(pair, count + 1, n) };
        let down = if count == 1 { b } else { polymorphic_index(pair, count - 1, n) };
        let drift = (count * (n - count)) as f64 / size;
        q[[from, up]] = drift;
        q[[from, down]] = drift;
      }
    }

    // One expected event per unit time at stationarity. The diagonal is still zero here.
    if let Some(pi) = self.stationary_frequencies() {
      let total: f64 = pi.iter().zip(q.rows()).map(|(pi_i, row)| pi_i * row.sum()).sum();
      if total > 0.0 {
        *q /= total;
      }
    }
    Ok(())
  }

  fn fixed_average_rate(&self) -> Option<f64> {
    Some(1.0)
  }

  fn stationary_frequencies(&self) -> Option<Array1<f64>> {
    let pi = self.unnormalized_stationary_frequencies();
    let sum = pi.sum();
    (sum > 0.0).then(|| pi / sum)
  }

  fn is_time_reversible(&self) -> bool {
    true
  }

  fn default_exponentiation(&self) -> ExponentiationMethod {
    ExponentiationMethod::TAYLOR_FINE
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
      (ParameterName::StationaryFrequencies, ParameterValue::Vector(self.pi.to_vec())),
    ]
  }
}
