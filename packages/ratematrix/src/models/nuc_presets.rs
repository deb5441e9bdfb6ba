use crate::make_report;
use crate::models::gtr::{Gtr, GtrParams};
use crate::utils::error::RateMatrixError;
use eyre::{Report, WrapErr};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use strum_macros::{Display, EnumIter, EnumString};

#[derive(Copy, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, SmartDefault, Display, EnumIter, EnumString, Serialize, Deserialize)]
pub enum NucModelName {
  #[default]
  JC69,
  K80,
  F81,
  HKY85,
  T92,
}

/// Creates one of the named nucleotide models with default parameters
pub fn get_nuc_model(name: NucModelName) -> Result<Gtr, Report> {
  match name {
    NucModelName::JC69 => jc69(),
    NucModelName::K80 => k80(K80Params::default()),
    NucModelName::F81 => f81(F81Params::default()),
    NucModelName::HKY85 => hky85(HKY85Params::default()),
    NucModelName::T92 => t92(T92Params::default()),
  }
  .wrap_err_with(|| make_report!("When creating nucleotide model '{name}'"))
}

/// Jukes-Cantor 1969 model.
///
/// This model assumes equal concentrations of the nucleotides and equal transition rates
/// between nucleotide states.
///
/// See: Jukes and Cantor (1969). Evolution of Protein Molecules. New York: Academic Press. pp. 21–132
pub fn jc69() -> Result<Gtr, Report> {
  Gtr::new(GtrParams::default())
}

#[derive(Copy, Clone, Debug, SmartDefault, Serialize, Deserialize)]
pub struct K80Params {
  /// Ratio of transition/transversion rates
  #[default = 0.1]
  pub kappa: f64,
}

/// Kimura 1980 model.
///
/// Assumes equal concentrations across nucleotides, but
/// allows different rates between transitions and transversions. The ratio
/// of the transition/transversion rates is given by kappa parameter.
///
/// See: Kimura (1980),  J. Mol. Evol. 16 (2): 111–120. doi:10.1007/BF01731581.
pub fn k80(K80Params { kappa }: K80Params) -> Result<Gtr, Report> {
  Gtr::new(GtrParams {
    exchangeabilities: transition_transversion_exchangeabilities(kappa),
    stationary_frequencies: vec![0.25; 4],
  })
}

#[derive(Clone, Debug, SmartDefault, Serialize, Deserialize)]
pub struct F81Params {
  /// Equilibrium frequencies of A, C, G, T
  #[default(vec![0.25; 4])]
  pub pi: Vec<f64>,
}

/// Felsenstein 1981 model.
///
/// Assumes non-equal concentrations across nucleotides,
/// but the transition rate between all states is assumed to be equal.
///
/// See: Felsenstein (1981), J. Mol. Evol. 17  (6): 368–376. doi:10.1007/BF01734359
pub fn f81(F81Params { pi }: F81Params) -> Result<Gtr, Report> {
  Gtr::new(GtrParams {
    exchangeabilities: vec![1.0; 6],
    stationary_frequencies: pi,
  })
}

#[derive(Clone, Debug, SmartDefault, Serialize, Deserialize)]
pub struct HKY85Params {
  /// Ratio of transition/transversion rates
  #[default = 0.1]
  pub kappa: f64,

  /// Equilibrium frequencies of A, C, G, T
  #[default(vec![0.25; 4])]
  pub pi: Vec<f64>,
}

/// Hasegawa, Kishino and Yano 1985 model.
///
/// Allows different concentrations of the nucleotides (as in F81) and distinguishes between transition/transversion
/// substitutions (similar to K80).
///
/// See: Hasegawa, Kishino, Yano (1985), J. Mol. Evol. 22 (2): 160–174. doi:10.1007/BF02101694
pub fn hky85(HKY85Params { kappa, pi }: HKY85Params) -> Result<Gtr, Report> {
  Gtr::new(GtrParams {
    exchangeabilities: transition_transversion_exchangeabilities(kappa),
    stationary_frequencies: pi,
  })
}

#[derive(Copy, Clone, Debug, SmartDefault, Serialize, Deserialize)]
pub struct T92Params {
  /// Ratio of transition/transversion rates
  #[default = 0.1]
  pub kappa: f64,

  /// Relative GC content
  #[default = 0.5]
  pub pi_GC: f64,
}

/// Tamura 1992 model.
///
/// Extending Kimura (1980) model for the case where a G+C-content bias exists.
///
/// See: Tamura K (1992),  Mol.  Biol. Evol. 9 (4): 678–687.  DOI: 10.1093/oxfordjournals.molbev.a040752
pub fn t92(T92Params { kappa, pi_GC }: T92Params) -> Result<Gtr, Report> {
  if !(0.0..=1.0).contains(&pi_GC) {
    return Err(RateMatrixError::invalid_configuration(format!(
      "The relative GC should be between 0 and 1, but found pi_GC={pi_GC}"
    )));
  }

  Gtr::new(GtrParams {
    exchangeabilities: transition_transversion_exchangeabilities(kappa),
    stationary_frequencies: vec![(1.0 - pi_GC) * 0.5, pi_GC * 0.5, pi_GC * 0.5, (1.0 - pi_GC) * 0.5],
  })
}

/// Exchangeabilities AC, AG, AT, CG, CT, GT with transitions (A<->G and C<->T) set to `kappa`
fn transition_transversion_exchangeabilities(kappa: f64) -> Vec<f64> {
  vec![1.0, kappa, 1.0, 1.0, kappa, 1.0]
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::rate_matrix::model::{ModelKind, RateMatrixModel};
  use crate::utils::error::error_kind;
  use approx::assert_abs_diff_eq;
  use ndarray::array;
  use rstest::rstest;
  use std::str::FromStr;

  #[rstest]
  #[case(NucModelName::JC69)]
  #[case(NucModelName::K80)]
  #[case(NucModelName::F81)]
  #[case(NucModelName::HKY85)]
  #[case(NucModelName::T92)]
  fn creates_reversible_unit_rate_models(#[case] name: NucModelName) -> Result<(), Report> {
    let model = RateMatrixModel::new(ModelKind::Gtr(get_nuc_model(name)?))?;
    assert!(model.check_time_reversibility(1e-9)?);
    assert_abs_diff_eq!(model.average_rate()?, 1.0, epsilon = 1e-12);
    Ok(())
  }

  #[rstest]
  fn k80_sets_transitions_to_kappa() -> Result<(), Report> {
    let model = RateMatrixModel::new(ModelKind::Gtr(k80(K80Params { kappa: 2.0 })?))?;
    // Every row sums to 0.25 * (1 + 2 + 1) = 1, so rescaling leaves the rates as they are
    assert_abs_diff_eq!(model.get_rate(0, 2, 1.0)?, 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(model.get_rate(0, 1, 1.0)?, 0.25, epsilon = 1e-12);
    assert_abs_diff_eq!(model.get_rate(1, 3, 1.0)?, 0.5, epsilon = 1e-12);
    Ok(())
  }

  #[rstest]
  fn t92_uses_gc_content() -> Result<(), Report> {
    let gtr = t92(T92Params { kappa: 1.0, pi_GC: 0.6 })?;
    assert_abs_diff_eq!(gtr.pi(), &array![0.2, 0.3, 0.3, 0.2], epsilon = 1e-15);
    Ok(())
  }

  #[rstest]
  fn t92_rejects_invalid_gc_content() {
    let err = t92(T92Params { kappa: 1.0, pi_GC: 1.5 }).unwrap_err();
    assert!(matches!(error_kind(&err), Some(RateMatrixError::InvalidConfiguration(_))));
  }

  #[rstest]
  fn parses_model_name() -> Result<(), Report> {
    assert_eq!(NucModelName::from_str("HKY85")?, NucModelName::HKY85);
    Ok(())
  }
}
