use crate::adapter::parameter::{ParameterName, ParameterValue, check_rate, check_simplex};
use crate::constants::{NUM_NUCLEOTIDES, NUM_SENSE_CODONS};
use crate::exponentiation::method::ExponentiationMethod;
use crate::matrix::dense::MatrixReal;
use crate::models::codon_state::{Codon, is_transition, sense_codons};
use crate::rate_matrix::generator::{RateMatrixGenerator, unknown_parameter, validate_on_deserialize};
use eyre::Report;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Expected number of nucleotide substitutions per unit time: one per codon position
const CODON_AVERAGE_RATE: f64 = 3.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct CodonHkyParams {
  /// Transition/transversion rate ratio
  #[default = 1.0]
  pub kappa: f64,

  /// Nonsynonymous/synonymous rate ratio (dN/dS)
  #[default = 1.0]
  pub omega: f64,

  /// Frequencies of A, C, G and T at every codon position
  #[default(vec![0.25; 4])]
  pub nucleotide_frequencies: Vec<f64>,
}

/// Codon model over the 61 sense codons of the standard genetic code with HKY nucleotide substitutions
/// (Goldman & Yang 1994, Muse & Gaut 1994).
///
/// Codons which differ at exactly one position exchange at rate 1 for a transversion and `kappa` for a transition,
/// times `omega` if the amino acid changes. The rate is weighted by the frequency of the target codon, which is the
/// product of its nucleotide frequencies. Codons which differ at more than one position do not exchange directly.
/// The matrix is rescaled to 3 expected substitutions per unit time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CodonHkyParams", into = "CodonHkyParams")]
pub struct CodonHky {
  kappa: f64,
  omega: f64,
  nucleotide_frequencies: Array1<f64>,
}

impl CodonHky {
  pub fn new(
    CodonHkyParams {
      kappa,
      omega,
      nucleotide_frequencies,
    }: CodonHkyParams,
  ) -> Result<Self, Report> {
    let mut this = Self {
      kappa: check_rate(ParameterName::Kappa, kappa)?,
      omega: check_rate(ParameterName::Omega, omega)?,
      nucleotide_frequencies: Array1::zeros(NUM_NUCLEOTIDES),
    };
    this.set_nucleotide_frequencies(&nucleotide_frequencies)?;
    Ok(this)
  }

  pub fn set_nucleotide_frequencies(&mut self, frequencies: &[f64]) -> Result<(), Report> {
    let value = ParameterValue::Vector(frequencies.to_vec());
    let frequencies = value.as_vector_of_len(ParameterName::NucleotideFrequencies, NUM_NUCLEOTIDES)?;
    self.nucleotide_frequencies = Array1::from(check_simplex(ParameterName::NucleotideFrequencies, frequencies)?);
    Ok(())
  }

  /// Product of the nucleotide frequencies of a codon, before normalizing over the sense codons
  fn codon_weight(&self, codon: &Codon) -> f64 {
    codon.nucleotides().iter().map(|&n| self.nucleotide_frequencies[n]).product()
  }

  /// Symmetric part of the exchange rate between two codons
  fn exchangeability(&self, from: &Codon, to: &Codon) -> f64 {
    let Some((_, a, b)) = from.single_difference(to) else {
      return 0.0;
    };
    let mut rate = if is_transition(a, b) { self.kappa } else { 1.0 };
    if from.amino_acid() != to.amino_acid() {
      rate *= self.omega;
    }
    rate
  }
}

validate_on_deserialize!(CodonHky, CodonHkyParams);

impl From<CodonHky> for CodonHkyParams {
  fn from(model: CodonHky) -> Self {
    Self {
      kappa: model.kappa,
      omega: model.omega,
      nucleotide_frequencies: model.nucleotide_frequencies.to_vec(),
    }
  }
}

impl RateMatrixGenerator for CodonHky {
  fn name(&self) -> &'static str {
    "CodonHKY"
  }

  fn num_states(&self) -> usize {
    NUM_SENSE_CODONS
  }

  fn build_rate_matrix(&self, q: &mut MatrixReal) -> Result<(), Report> {
    let codons = sense_codons();
    for (i, from) in codons.iter().enumerate() {
      for (j, to) in codons.iter().enumerate().skip(i + 1) {
        let r = self.exchangeability(from, to);
        if r > 0.0 {
          q[[i, j]] = r * self.codon_weight(to);
          q[[j, i]] = r * self.codon_weight(from);
        }
      }
    }
    Ok(())
  }

  fn rescale_target(&self) -> Option<f64> {
    Some(CODON_AVERAGE_RATE)
  }

  fn stationary_frequencies(&self) -> Option<Array1<f64>> {
    let weights: Array1<f64> = sense_codons().iter().map(|codon| self.codon_weight(codon)).collect();
    let total = weights.sum();
    Some(weights / total)
  }

  fn is_time_reversible(&self) -> bool {
    true
  }

  fn default_exponentiation(&self) -> ExponentiationMethod {
    ExponentiationMethod::Eigen
  }

  fn set_parameter(&mut self, name: ParameterName, value: &ParameterValue) -> Result<(), Report> {
    match name {
      ParameterName::Kappa => self.kappa = check_rate(name, value.as_scalar(name)?)?,
      ParameterName::Omega => self.omega = check_rate(name, value.as_scalar(name)?)?,
      ParameterName::NucleotideFrequencies => self.set_nucleotide_frequencies(value.as_vector(name)?)?,
      _ => return Err(unknown_parameter(self.name(), name)),
    }
    Ok(())
  }

  fn parameters(&self) -> Vec<(ParameterName, ParameterValue)> {
    vec![
      (ParameterName::Kappa, ParameterValue::Scalar(self.kappa)),
      (ParameterName::Omega, ParameterValue::Scalar(self.omega)),
      (
        ParameterName::NucleotideFrequencies,
        ParameterValue::Vector(self.nucleotide_frequencies.to_vec()),
      ),
    ]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::codon_state::sense_codon_index;
  use crate::rate_matrix::model::{ModelKind, RateMatrixModel};
  use approx::{assert_abs_diff_eq, assert_ulps_eq};
  use ndarray::Array2;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  fn index(codon: &str) -> Result<usize, Report> {
    let codon = Codon::parse(codon)?;
    sense_codon_index(&codon).ok_or_else(|| eyre::eyre!("'{codon}' is a stop codon"))
  }

  fn unscaled_rates(model: &CodonHky) -> Result<MatrixReal, Report> {
    let mut q = Array2::<f64>::zeros((NUM_SENSE_CODONS, NUM_SENSE_CODONS));
    model.build_rate_matrix(&mut q)?;
    Ok(q)
  }

  #[rstest]
  fn weighs_substitutions_by_kind() -> Result<(), Report> {
    let model = CodonHky::new(CodonHkyParams {
      kappa: 4.0,
      omega: 0.5,
      nucleotide_frequencies: vec![0.1, 0.2, 0.3, 0.4],
    })?;
    let q = unscaled_rates(&model)?;

    // GCT -> GCC: synonymous transition (Ala), target weight G * C * C
    assert_abs_diff_eq!(q[[index("GCT")?, index("GCC")?]], 4.0 * 0.3 * 0.2 * 0.2, epsilon = 1e-15);

    // AAA -> ACA: nonsynonymous transversion (Lys -> Thr), target weight A * C * A
    assert_abs_diff_eq!(q[[index("AAA")?, index("ACA")?]], 0.5 * 0.1 * 0.2 * 0.1, epsilon = 1e-15);

    // AAA -> AGA: nonsynonymous transition (Lys -> Arg)
    assert_abs_diff_eq!(q[[index("AAA")?, index("AGA")?]], 4.0 * 0.5 * 0.1 * 0.3 * 0.1, epsilon = 1e-15);

    // Two differences
    assert_ulps_eq!(q[[index("AAA")?, index("CCA")?]], 0.0);
    Ok(())
  }

  #[rstest]
  fn rescales_to_three_substitutions_per_codon() -> Result<(), Report> {
    let model = RateMatrixModel::new(ModelKind::CodonHky(CodonHky::new(CodonHkyParams {
      kappa: 2.0,
      omega: 0.3,
      nucleotide_frequencies: vec![0.3, 0.2, 0.2, 0.3],
    })?))?;
    assert_eq!(model.num_states(), NUM_SENSE_CODONS);
    assert_abs_diff_eq!(model.average_rate()?, 3.0, epsilon = 1e-10);
    assert!(model.check_time_reversibility(1e-9)?);

    let pi = model.stationary_frequencies()?;
    assert_abs_diff_eq!(pi.sum(), 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(model.calculate_stationary_frequencies()?, pi, epsilon = 1e-8);
    Ok(())
  }

  #[rstest]
  fn updates_parameters_by_name() -> Result<(), Report> {
    let mut model = CodonHky::new(CodonHkyParams::default())?;
    model.set_parameter(ParameterName::Omega, &0.2.into())?;
    model.set_parameter(ParameterName::Kappa, &3.0.into())?;
    assert!(model.set_parameter(ParameterName::Kappa, &(-1.0).into()).is_err());
    assert!(
      model
        .set_parameter(ParameterName::NucleotideFrequencies, &vec![0.5, 0.5].into())
        .is_err()
    );
    assert!(model.set_parameter(ParameterName::Lambda, &1.0.into()).is_err());
    assert_eq!(
      model.parameters()[..2],
      [
        (ParameterName::Kappa, ParameterValue::Scalar(3.0)),
        (ParameterName::Omega, ParameterValue::Scalar(0.2)),
      ]
    );
    Ok(())
  }
}
