use crate::adapter::parameter::{ParameterName, ParameterValue, check_rates};
use crate::constants::NUM_NUCLEOTIDES;
use crate::exponentiation::method::ExponentiationMethod;
use crate::matrix::dense::MatrixReal;
use crate::models::pomo_state::{NUCLEOTIDE_PAIRS, check_population_size, num_pomo_states, polymorphic_index};
use crate::rate_matrix::generator::{RateMatrixGenerator, unknown_parameter, validate_on_deserialize};
use crate::utils::error::RateMatrixError;
use eyre::Report;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct PomoParams {
  /// Virtual population size `N`
  #[default = 10]
  pub virtual_population_size: usize,

  /// Mutation rates between nucleotides: either 12 off-diagonal values row by row
  /// (`AC, AG, AT, CA, CG, CT, GA, GC, GT, TA, TC, TG`) or a full 4x4 matrix row by row, whose diagonal is ignored
  #[default(vec![0.01; 12])]
  pub mutation_rates: Vec<f64>,

  /// Relative fitness of A, C, G and T
  #[default(vec![1.0; 4])]
  pub selection_coefficients: Vec<f64>,
}

/// Polymorphism-aware phylogenetic model (De Maio et al. 2013) with general mutation rates and selection.
///
/// Besides the 4 monomorphic states, a population of `N` virtual individuals may be polymorphic for one of the 6
/// nucleotide pairs. A mutation turns a monomorphic population into one with a single mutant copy. Within a pair,
/// allele counts change by one through a Moran step in which the reproducing individual is drawn proportionally
/// to its fitness. Reaching a count of 0 or `N` fixes an allele.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PomoParams", into = "PomoParams")]
pub struct Pomo {
  virtual_population_size: usize,
  mutation_rates: Array2<f64>,
  selection_coefficients: Vec<f64>,
}

impl Pomo {
  pub fn new(
    PomoParams {
      virtual_population_size,
      mutation_rates,
      selection_coefficients,
    }: PomoParams,
  ) -> Result<Self, Report> {
    Ok(Self {
      virtual_population_size: check_population_size(virtual_population_size)?,
      mutation_rates: mutation_matrix(&mutation_rates)?,
      selection_coefficients: check_fitness(&selection_coefficients)?,
    })
  }

  #[inline]
  pub const fn virtual_population_size(&self) -> usize {
    self.virtual_population_size
  }

  /// Mutation rate from nucleotide `a` to nucleotide `b`
  #[inline]
  pub fn mutation_rate(&self, a: usize, b: usize) -> f64 {
    self.mutation_rates[[a, b]]
  }
}

fn mutation_matrix(values: &[f64]) -> Result<Array2<f64>, Report> {
  let values = check_rates(ParameterName::MutationRates, values)?;
  let n = NUM_NUCLEOTIDES;
  let mut mu = Array2::<f64>::zeros((n, n));
  match values.len() {
    12 => {
      let mut values = values.into_iter();
      for a in 0..n {
        for b in 0..n {
          if a != b {
            mu[[a, b]] = values.next().unwrap_or_default();
          }
        }
      }
    }
    16 => {
      for a in 0..n {
        for b in 0..n {
          if a != b {
            mu[[a, b]] = values[a * n + b];
          }
        }
      }
    }
    len => {
      return Err(RateMatrixError::invalid_configuration(format!(
        "Parameter '{}' expects 12 off-diagonal rates or a 4x4 matrix of 16 values, but got {len} values",
        ParameterName::MutationRates
      )));
    }
  }
  Ok(mu)
}

fn check_fitness(values: &[f64]) -> Result<Vec<f64>, Report> {
  let name = ParameterName::SelectionCoefficients;
  let values = ParameterValue::Vector(values.to_vec());
  let values = values.as_vector_of_len(name, NUM_NUCLEOTIDES)?;
  if let Some(f) = values.iter().find(|f| !f.is_finite() || **f <= 0.0) {
    return Err(RateMatrixError::invalid_configuration(format!(
      "Parameter '{name}' must contain positive finite fitness values, but got {f}"
    )));
  }
  Ok(values.to_vec())
}

validate_on_deserialize!(Pomo, PomoParams);

impl From<Pomo> for PomoParams {
  fn from(model: Pomo) -> Self {
    let mutation_rates = model
      .mutation_rates
      .indexed_iter()
      .filter(|((a, b), _)| a != b)
      .map(|(_, &rate)| rate)
      .collect();
    Self {
      virtual_population_size: model.virtual_population_size,
      mutation_rates,
      selection_coefficients: model.selection_coefficients,
    }
  }
}

impl RateMatrixGenerator for Pomo {
  fn name(&self) -> &'static str {
    "PoMo"
  }

  fn num_states(&self) -> usize {
    num_pomo_states(self.virtual_population_size)
  }

  fn build_rate_matrix(&self, q: &mut MatrixReal) -> Result<(), Report> {
    let n = self.virtual_population_size;
    let size = n as f64;

    for (pair, &(a, b)) in NUCLEOTIDE_PAIRS.iter().enumerate() {
      q[[a, polymorphic_index(pair, n - 1, n)]] = self.mutation_rate(a, b);
      q[[b, polymorphic_index(pair, 1, n)]] = self.mutation_rate(b, a);

      let (fa, fb) = (self.selection_coefficients[a], self.selection_coefficients[b]);
      for count in 1..n {
        let from = polymorphic_index(pair, count, n);
        let up = if count + 1 == n { a } else { polymorphic_index(pair, count + 1, n) };
        let down = if count == 1 { b } else { polymorphic_index(pair, count - 1, n) };

        let (ca, cb) = (count as f64, (n - count) as f64);
        let total_fitness = fa * ca + fb * cb;
        q[[from, up]] = fa * ca / total_fitness * cb / size;
        q[[from, down]] = fb * cb / total_fitness * ca / size;
      }
    }
    Ok(())
  }

  fn fixed_average_rate(&self) -> Option<f64> {
    Some(1.0)
  }

  fn default_exponentiation(&self) -> ExponentiationMethod {
    ExponentiationMethod::REPEATED_SQUARING
  }

  fn set_parameter(&mut self, name: ParameterName, value: &ParameterValue) -> Result<(), Report> {
    match name {
      ParameterName::MutationRates => self.mutation_rates = mutation_matrix(value.as_vector(name)?)?,
      ParameterName::SelectionCoefficients => self.selection_coefficients = check_fitness(value.as_vector(name)?)?,
      _ => return Err(unknown_parameter(self.name(), name)),
    }
    Ok(())
  }

  fn parameters(&self) -> Vec<(ParameterName, ParameterValue)> {
    let off_diagonal = self
      .mutation_rates
      .indexed_iter()
      .filter(|((a, b), _)| a != b)
      .map(|(_, &mu)| mu)
      .collect();
    vec![
      (ParameterName::MutationRates, ParameterValue::Vector(off_diagonal)),
      (
        ParameterName::SelectionCoefficients,
        ParameterValue::Vector(self.selection_coefficients.clone()),
      ),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::rate_matrix::model::{ModelKind, RateMatrixModel};
  use approx::{assert_abs_diff_eq, assert_ulps_eq};
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  fn model(params: PomoParams) -> Result<RateMatrixModel, Report> {
    RateMatrixModel::new(ModelKind::Pomo(Pomo::new(params)?))
  }

  fn increasing_rates() -> Vec<f64> {
    (1..=12).map(|i| f64::from(i) * 0.001).collect()
  }

  #[rstest]
  fn enters_polymorphic_blocks_at_the_boundary() -> Result<(), Report> {
    let model = model(PomoParams {
      virtual_population_size: 5,
      mutation_rates: increasing_rates(),
      ..PomoParams::default()
    })?;
    let q = model.rate_matrix();
    assert_eq!(model.num_states(), 28);

    // A -> C: one C among four A, the last state of the AC block
    assert_ulps_eq!(q[[0, 7]], 0.001);
    // C -> A: one A among four C, the first state of the AC block
    assert_ulps_eq!(q[[1, 4]], 0.004);
    // T -> G: one G among four T, the first state of the GT block
    assert_ulps_eq!(q[[3, 24]], 0.012);
    // G -> T: the last state of the GT block
    assert_ulps_eq!(q[[2, 27]], 0.009);

    // No direct mutation between monomorphic states
    assert_ulps_eq!(q[[0, 1]], 0.0);
    Ok(())
  }

  #[rstest]
  fn drifts_neutrally_with_equal_fitness() -> Result<(), Report> {
    let n = 5;
    let model = model(PomoParams {
      virtual_population_size: n,
      ..PomoParams::default()
    })?;
    let q = model.rate_matrix();
    let size = n as f64;

    for count in 1..(n - 1) {
      let from = polymorphic_index(2, count, n);
      let expected = (count * (n - count)) as f64 / (size * size);
      assert_abs_diff_eq!(q[[from, from + 1]], expected, epsilon = 1e-15);
    }
    // Fixation of A from one T
    assert_abs_diff_eq!(q[[polymorphic_index(2, 4, n), 0]], 4.0 / 25.0, epsilon = 1e-15);
    // Fixation of T from one A
    assert_abs_diff_eq!(q[[polymorphic_index(2, 1, n), 3]], 4.0 / 25.0, epsilon = 1e-15);
    Ok(())
  }

  #[rstest]
  fn favours_fitter_allele() -> Result<(), Report> {
    let n = 10;
    let model = model(PomoParams {
      virtual_population_size: n,
      selection_coefficients: vec![1.2, 1.0, 1.0, 1.0],
      ..PomoParams::default()
    })?;
    let q = model.rate_matrix();
    let middle = polymorphic_index(0, 5, n);
    assert!(q[[middle, middle + 1]] > q[[middle, middle - 1]]);

    let pi = model.stationary_frequencies()?;
    assert!(pi[0] > pi[1]);
    assert_abs_diff_eq!(pi.sum(), 1.0, epsilon = 1e-12);
    Ok(())
  }

  #[rstest]
  fn reports_unit_average_rate() -> Result<(), Report> {
    let model = model(PomoParams::default())?;
    assert_ulps_eq!(model.average_rate()?, 1.0);
    Ok(())
  }

  #[rstest]
  fn accepts_full_mutation_matrix() -> Result<(), Report> {
    #[rustfmt::skip]
    let matrix = vec![
      -9.0,  0.001, 0.002, 0.003,
      0.004, -9.0,  0.005, 0.006,
      0.007, 0.008, -9.0,  0.009,
      0.010, 0.011, 0.012, -9.0,
    ];
    let pomo = Pomo::new(PomoParams {
      mutation_rates: matrix.into_iter().map(f64::abs).collect(),
      ..PomoParams::default()
    })?;
    assert_ulps_eq!(pomo.mutation_rate(3, 2), 0.012);
    assert_ulps_eq!(pomo.mutation_rate(1, 1), 0.0);
    Ok(())
  }

  #[rstest]
  fn rejects_invalid_parameters() {
    assert!(
      Pomo::new(PomoParams {
        mutation_rates: vec![0.01; 11],
        ..PomoParams::default()
      })
      .is_err()
    );
    assert!(
      Pomo::new(PomoParams {
        selection_coefficients: vec![1.0, 0.0, 1.0, 1.0],
        ..PomoParams::default()
      })
      .is_err()
    );
    assert!(
      Pomo::new(PomoParams {
        virtual_population_size: 1,
        ..PomoParams::default()
      })
      .is_err()
    );
  }
}
