use crate::adapter::parameter::{ParameterName, ParameterValue, check_rate};
use crate::exponentiation::method::ExponentiationMethod;
use crate::matrix::dense::MatrixReal;
use crate::rate_matrix::generator::{RateMatrixGenerator, unknown_parameter, validate_on_deserialize};
use crate::utils::error::{RateMatrixError, check_index};
use eyre::Report;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct BinaryMutationCoalescentParams {
  /// Number of sampled lineages
  #[default = 10]
  pub num_lineages: usize,

  /// Per-lineage mutation rate between the two alleles
  #[default = 1.0]
  pub mu: f64,

  /// Effective population size
  #[default = 1.0]
  pub effective_population_size: f64,
}

/// Joint process of coalescence and symmetric binary mutation among `N` sampled lineages.
///
/// A state is a pair `(n, k)` of `n` remaining lineages, `k` of which carry allele 1. Backwards in time lineages
/// mutate and coalesce until one remains.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BinaryMutationCoalescentParams", into = "BinaryMutationCoalescentParams")]
pub struct BinaryMutationCoalescent {
  num_lineages: usize,
  mu: f64,
  effective_population_size: f64,
}

impl BinaryMutationCoalescent {
  pub fn new(
    BinaryMutationCoalescentParams {
      num_lineages,
      mu,
      effective_population_size,
    }: BinaryMutationCoalescentParams,
  ) -> Result<Self, Report> {
    if num_lineages < 1 {
      return Err(RateMatrixError::invalid_configuration(
        "Binary mutation coalescent model requires at least one lineage",
      ));
    }
    Ok(Self {
      num_lineages,
      mu: check_rate(ParameterName::Mu, mu)?,
      effective_population_size: check_population_size(effective_population_size)?,
    })
  }

  /// Index of the state with `n` lineages, `k` of which carry allele 1
  pub fn state_index(&self, n: usize, k: usize) -> Result<usize, Report> {
    check_index("number of lineages", n.wrapping_sub(1), self.num_lineages)?;
    check_index("number of derived alleles", k, n + 1)?;
    Ok(index(n, k))
  }
}

#[inline]
const fn index(n: usize, k: usize) -> usize {
  n * (n + 1) / 2 - 1 + k
}

fn check_population_size(ne: f64) -> Result<f64, Report> {
  if !ne.is_finite() || ne <= 0.0 {
    return Err(RateMatrixError::invalid_configuration(format!(
      "Effective population size must be a positive finite number, but got {ne}"
    )));
  }
  Ok(ne)
}

validate_on_deserialize!(BinaryMutationCoalescent, BinaryMutationCoalescentParams);

impl From<BinaryMutationCoalescent> for BinaryMutationCoalescentParams {
  fn from(model: BinaryMutationCoalescent) -> Self {
    Self {
      num_lineages: model.num_lineages,
      mu: model.mu,
      effective_population_size: model.effective_population_size,
    }
  }
}

impl RateMatrixGenerator for BinaryMutationCoalescent {
  fn name(&self) -> &'static str {
    "BinaryMutationCoalescent"
  }

  fn num_states(&self) -> usize {
    let n = self.num_lineages;
    (n + 1) * (n + 2) / 2 - 1
  }

  fn build_rate_matrix(&self, q: &mut MatrixReal) -> Result<(), Report> {
    let ne = self.effective_population_size;
    for n in 1..=self.num_lineages {
      for k in 0..=n {
        let from = index(n, k);
        let (carriers, others) = (k as f64, (n - k) as f64);

        if k < n {
          q[[from, index(n, k + 1)]] = others * self.mu;
        }
        if k > 0 {
          q[[from, index(n, k - 1)]] = carriers * self.mu;
        }

        if n > 1 {
          if k > 1 {
            q[[from, index(n - 1, k - 1)]] = carriers * (carriers - 1.0) / 2.0 / ne;
          }
          if n - k > 1 {
            q[[from, index(n - 1, k)]] = others * (others - 1.0) / 2.0 / ne;
          }
        }
      }
    }
    Ok(())
  }

  fn default_exponentiation(&self) -> ExponentiationMethod {
    ExponentiationMethod::REPEATED_SQUARING
  }

  fn set_parameter(&mut self, name: ParameterName, value: &ParameterValue) -> Result<(), Report> {
    match name {
      ParameterName::Mu => self.mu = check_rate(name, value.as_scalar(name)?)?,
      ParameterName::EffectivePopulationSize => {
        self.effective_population_size = check_population_size(value.as_scalar(name)?)?;
      }
      _ => return Err(unknown_parameter(self.name(), name)),
    }
    Ok(())
  }

  fn parameters(&self) -> Vec<(ParameterName, ParameterValue)> {
    vec![
      (ParameterName::Mu, ParameterValue::Scalar(self.mu)),
      (
        ParameterName::EffectivePopulationSize,
        ParameterValue::Scalar(self.effective_population_size),
      ),
    ]
  }
}
