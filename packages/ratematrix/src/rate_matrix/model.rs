use crate::adapter::parameter::{ParameterName, ParameterValue};
use crate::constants::{DEFAULT_REVERSIBILITY_TOLERANCE, ROW_SUM_TOLERANCE};
use crate::exponentiation::eigen::EigenExponentiator;
use crate::exponentiation::method::ExponentiationMethod;
use crate::exponentiation::scaling_squaring::{adaptive_taylor, scaling_and_squaring};
use crate::exponentiation::uniformization::{StochasticMatrices, uniformization};
use crate::io::json::{JsonPretty, json_write};
use crate::make_internal_error;
use crate::matrix::dense::{MatrixReal, get_element, row_sums, set_diagonal};
use crate::matrix::eigen_system::EigenSystem;
use crate::matrix::lu::stationary_frequencies_from_rates;
use crate::matrix::transition_probability::TransitionProbabilityMatrix;
use crate::models::bdr::Bdr;
use crate::models::binary_mutation_coalescent::BinaryMutationCoalescent;
use crate::models::chromosomes::Chromosomes;
use crate::models::chromosomes_ploidy::ChromosomesPloidy;
use crate::models::codon_hky::CodonHky;
use crate::models::covarion::Covarion;
use crate::models::free_k::FreeK;
use crate::models::gtr::Gtr;
use crate::models::mk1::Mk1;
use crate::models::ordered::Ordered;
use crate::models::pomo::Pomo;
use crate::models::reversible_pomo::ReversiblePomo;
use crate::models::wag::Wag;
use crate::rate_matrix::generator::RateMatrixGenerator;
use crate::utils::error::{RateMatrixError, check_index};
use crate::utils::ndarray::{all_finite, clamp_min_inplace, normalize_rows_inplace};
use eyre::{Report, WrapErr};
use itertools::Itertools;
use log::{debug, trace, warn};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::mem::discriminant;
use strum_macros::Display;

/// All supported rate matrix models, each carrying only its own parameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Display)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ModelKind {
  Gtr(Gtr),
  FreeK(FreeK),
  Mk1(Mk1),
  Ordered(Ordered),
  Bdr(Bdr),
  Chromosomes(Chromosomes),
  ChromosomesPloidy(ChromosomesPloidy),
  BinaryMutationCoalescent(BinaryMutationCoalescent),
  Pomo(Pomo),
  ReversiblePomo(ReversiblePomo),
  Wag(Wag),
  CodonHky(CodonHky),
  Covarion(Covarion),
}

impl ModelKind {
  pub fn generator(&self) -> &dyn RateMatrixGenerator {
    match self {
      Self::Gtr(m) => m,
      Self::FreeK(m) => m,
      Self::Mk1(m) => m,
      Self::Ordered(m) => m,
      Self::Bdr(m) => m,
      Self::Chromosomes(m) => m,
      Self::ChromosomesPloidy(m) => m,
      Self::BinaryMutationCoalescent(m) => m,
      Self::Pomo(m) => m,
      Self::ReversiblePomo(m) => m,
      Self::Wag(m) => m,
      Self::CodonHky(m) => m,
      Self::Covarion(m) => m,
    }
  }

  pub fn generator_mut(&mut self) -> &mut dyn RateMatrixGenerator {
    match self {
      Self::Gtr(m) => m,
      Self::FreeK(m) => m,
      Self::Mk1(m) => m,
      Self::Ordered(m) => m,
      Self::Bdr(m) => m,
      Self::Chromosomes(m) => m,
      Self::ChromosomesPloidy(m) => m,
      Self::BinaryMutationCoalescent(m) => m,
      Self::Pomo(m) => m,
      Self::ReversiblePomo(m) => m,
      Self::Wag(m) => m,
      Self::CodonHky(m) => m,
      Self::Covarion(m) => m,
    }
  }
}

#[derive(Clone, Debug)]
enum ExponentiationCache {
  Empty,
  Eigen(EigenExponentiator),
  Uniformization(StochasticMatrices),
}

/// A continuous-time Markov chain generator `Q` together with the model which builds it.
///
/// Parameter changes only mark the model as dirty. The next [`RateMatrixModel::update`] (or the next transition
/// probability calculation) rebuilds `Q`, enforces vanishing row sums, rescales it if the model asks so and
/// refreshes the exponentiation cache.
///
/// Clones are deep: a clone owns its own `Q`, cache and dirty flag.
#[derive(Clone, Debug)]
pub struct RateMatrixModel {
  kind: ModelKind,
  q: MatrixReal,
  needs_update: bool,
  exponentiation: ExponentiationMethod,
  cache: ExponentiationCache,
}

impl RateMatrixModel {
  pub fn new(kind: ModelKind) -> Result<Self, Report> {
    let generator = kind.generator();
    let num_states = generator.num_states();
    let exponentiation = generator.default_exponentiation();

    let mut this = Self {
      kind,
      q: Array2::zeros((num_states, num_states)),
      needs_update: true,
      exponentiation,
      cache: ExponentiationCache::Empty,
    };

    this
      .update()
      .wrap_err_with(|| format!("When creating rate matrix model '{}'", this.name()))?;

    Ok(this)
  }

  /// Replaces the model's default exponentiation method
  pub fn with_exponentiation(mut self, method: ExponentiationMethod) -> Result<Self, Report> {
    self.set_exponentiation(method);
    self.update()?;
    Ok(self)
  }

  pub fn set_exponentiation(&mut self, method: ExponentiationMethod) {
    self.exponentiation = method;
    self.needs_update = true;
  }

  #[inline]
  pub const fn exponentiation(&self) -> ExponentiationMethod {
    self.exponentiation
  }

  #[inline]
  pub const fn kind(&self) -> &ModelKind {
    &self.kind
  }

  #[inline]
  pub fn name(&self) -> &'static str {
    self.kind.generator().name()
  }

  #[inline]
  pub fn num_states(&self) -> usize {
    self.q.nrows()
  }

  #[inline]
  pub const fn needs_update(&self) -> bool {
    self.needs_update
  }

  /// Current rate matrix. Stale if parameters changed since the last update.
  #[inline]
  pub const fn rate_matrix(&self) -> &MatrixReal {
    &self.q
  }

  pub fn set_parameter(&mut self, name: ParameterName, value: impl Into<ParameterValue>) -> Result<(), Report> {
    let value = value.into();
    self
      .kind
      .generator_mut()
      .set_parameter(name, &value)
      .wrap_err_with(|| format!("When setting parameter '{name}' of model '{}'", self.name()))?;
    self.needs_update = true;
    Ok(())
  }

  pub fn parameters(&self) -> Vec<(ParameterName, ParameterValue)> {
    self.kind.generator().parameters()
  }

  /// Rebuilds the rate matrix if any parameter changed since the last update
  pub fn update(&mut self) -> Result<(), Report> {
    if self.needs_update {
      self
        .rebuild()
        .wrap_err_with(|| format!("When building rate matrix of model '{}'", self.name()))?;
    }
    Ok(())
  }

  /// Rebuilds the rate matrix unconditionally
  pub fn update_matrix(&mut self) -> Result<(), Report> {
    self.needs_update = true;
    self.update()
  }

  fn rebuild(&mut self) -> Result<(), Report> {
    let generator = self.kind.generator();
    debug!(
      "Building rate matrix of model '{}' with {} states",
      generator.name(),
      generator.num_states()
    );

    if generator.num_states() != self.q.nrows() {
      return make_internal_error!(
        "Model '{}' has {} states, but its rate matrix has {} rows",
        generator.name(),
        generator.num_states(),
        self.q.nrows()
      );
    }

    self.q.fill(0.0);
    generator.build_rate_matrix(&mut self.q)?;
    set_diagonal(&mut self.q);

    if let Some(target) = generator.rescale_target() {
      self.scale_to_average_rate(target)?;
    }

    if !all_finite(&self.q) {
      return Err(RateMatrixError::numerical_degeneracy(
        "Rate matrix contains non-finite values",
      ));
    }

    debug_assert!(
      row_sums(&self.q.view()).iter().all(|s| s.abs() < ROW_SUM_TOLERANCE * (1.0 + self.dominating_rate())),
      "Rate matrix rows should sum to zero"
    );

    self.refresh_cache()?;
    self.needs_update = false;
    Ok(())
  }

  fn refresh_cache(&mut self) -> Result<(), Report> {
    self.cache = match self.exponentiation {
      ExponentiationMethod::Eigen => ExponentiationCache::Eigen(EigenExponentiator::new(self.eigen_system()?)),
      ExponentiationMethod::Uniformization { .. } => {
        ExponentiationCache::Uniformization(StochasticMatrices::new(&self.q.view()))
      }
      ExponentiationMethod::ScalingAndSquaring { .. } | ExponentiationMethod::AdaptiveTaylor { .. } => {
        ExponentiationCache::Empty
      }
    };
    Ok(())
  }

  /// Eigendecomposition of the current rate matrix
  pub fn eigen_system(&self) -> Result<EigenSystem, Report> {
    let generator = self.kind.generator();
    if generator.is_time_reversible() {
      if let Some(pi) = generator.stationary_frequencies() {
        return EigenSystem::reversible(&self.q.view(), &pi.view());
      }
    }
    EigenSystem::new(&self.q.view())
  }

  /// Fills `p` with transition probabilities over the time `rate * (start_age - end_age)`.
  ///
  /// Rebuilds the rate matrix first if it is dirty.
  pub fn calculate_transition_probabilities(
    &mut self,
    start_age: f64,
    end_age: f64,
    rate: f64,
    p: &mut TransitionProbabilityMatrix,
  ) -> Result<(), Report> {
    let t = rate * (start_age - end_age);
    if !t.is_finite() || t < 0.0 {
      return Err(RateMatrixError::invalid_configuration(format!(
        "Elapsed time must be a non-negative finite number, but got rate * (start_age - end_age) = {rate} * ({start_age} - {end_age}) = {t}"
      )));
    }
    let n = self.num_states();
    if p.values().dim() != (n, n) {
      return Err(RateMatrixError::invalid_configuration(format!(
        "Transition probability matrix has shape {:?}, but model '{}' has {n} states",
        p.values().dim(),
        self.name(),
      )));
    }

    self.update()?;
    self.exponentiate(t, p)
  }

  /// Transition probabilities over time `t`
  pub fn transition_probabilities(&mut self, t: f64) -> Result<TransitionProbabilityMatrix, Report> {
    let mut p = TransitionProbabilityMatrix::new(self.num_states());
    self.calculate_transition_probabilities(t, 0.0, 1.0, &mut p)?;
    Ok(p)
  }

  fn exponentiate(&mut self, t: f64, p: &mut TransitionProbabilityMatrix) -> Result<(), Report> {
    trace!("Exponentiating rate matrix of model '{}' with {} for t={t}", self.name(), self.exponentiation);

    match (&mut self.cache, self.exponentiation) {
      (ExponentiationCache::Eigen(exponentiator), ExponentiationMethod::Eigen) => {
        exponentiator.transition_probabilities(t, &mut p.values_mut());
      }
      (ExponentiationCache::Uniformization(matrices), ExponentiationMethod::Uniformization { tolerance }) => {
        p.assign(&uniformization(matrices, t, tolerance)?);
      }
      (_, ExponentiationMethod::ScalingAndSquaring { squarings, taylor }) => {
        p.assign(&scaling_and_squaring(&self.q.view(), t, squarings, taylor));
      }
      (_, ExponentiationMethod::AdaptiveTaylor { tolerance }) => {
        p.assign(&adaptive_taylor(&self.q.view(), t, tolerance));
      }
      (_, method) => {
        return make_internal_error!("Exponentiation cache does not match the exponentiation method '{method}'");
      }
    }

    clamp_min_inplace(&mut p.values_mut(), 0.0);
    if self.kind.generator().renormalize_transition_probabilities() {
      normalize_rows_inplace(&mut p.values_mut());
    }
    Ok(())
  }

  /// Rate of moving from `from` to `to`, scaled by `rate`
  pub fn get_rate(&self, from: usize, to: usize, rate: f64) -> Result<f64, Report> {
    let n = self.num_states();
    check_index("'from' state", from, n)?;
    check_index("'to' state", to, n)?;
    Ok(get_element(&self.q.view(), from, to)? * rate)
  }

  /// Rate of moving from `from` to `to` at a given age. Rates of the models here do not depend on age.
  pub fn get_rate_at(&self, from: usize, to: usize, _age: f64, rate: f64) -> Result<f64, Report> {
    self.get_rate(from, to, rate)
  }

  /// Recomputes the diagonal so that every row sums to zero
  pub fn set_diagonal(&mut self) -> Result<(), Report> {
    set_diagonal(&mut self.q);
    self.refresh_cache()
  }

  /// Multiplies all rates so that the average rate becomes `r`
  pub fn rescale_to_average_rate(&mut self, r: f64) -> Result<(), Report> {
    self.scale_to_average_rate(r)?;
    self.refresh_cache()
  }

  fn scale_to_average_rate(&mut self, r: f64) -> Result<(), Report> {
    let current = self.average_rate()?;
    if current <= 0.0 {
      warn!(
        "Unable to rescale rate matrix of model '{}' to average rate {r}: current average rate is {current}",
        self.name()
      );
      return Ok(());
    }
    self.q *= r / current;
    Ok(())
  }

  /// Expected number of events per unit time at stationarity, `sum_i pi_i * (-Q_ii)`
  pub fn average_rate(&self) -> Result<f64, Report> {
    if let Some(fixed) = self.kind.generator().fixed_average_rate() {
      return Ok(fixed);
    }
    let pi = self.stationary_frequencies()?;
    Ok(pi.iter().zip(self.q.diag()).map(|(pi_i, q_ii)| -pi_i * q_ii).sum())
  }

  /// Stationary frequencies: closed form when the model knows it, numerical solution otherwise
  pub fn stationary_frequencies(&self) -> Result<Array1<f64>, Report> {
    match self.kind.generator().stationary_frequencies() {
      Some(pi) => Ok(pi),
      None => self.calculate_stationary_frequencies(),
    }
  }

  /// Stationary frequencies solved from the current rate matrix
  pub fn calculate_stationary_frequencies(&self) -> Result<Array1<f64>, Report> {
    stationary_frequencies_from_rates(&self.q.view())
      .wrap_err_with(|| format!("When computing stationary frequencies of model '{}'", self.name()))
  }

  /// Whether detailed balance holds: `sum_{i<j} |pi_i Q_ij - pi_j Q_ji| < tolerance`
  pub fn check_time_reversibility(&self, tolerance: f64) -> Result<bool, Report> {
    let pi = self.stationary_frequencies()?;
    let n = self.num_states();
    let mut imbalance = 0.0;
    for i in 0..n {
      for j in (i + 1)..n {
        imbalance += (pi[i] * self.q[[i, j]] - pi[j] * self.q[[j, i]]).abs();
      }
    }
    Ok(imbalance < tolerance)
  }

  /// Largest total outflow rate, `max_i -Q_ii`
  pub fn dominating_rate(&self) -> f64 {
    self.q.diag().iter().fold(0.0_f64, |acc, &q_ii| acc.max(-q_ii))
  }

  /// Powers of the uniformized jump chain of the current rate matrix
  pub fn stochastic_matrices(&self) -> StochasticMatrices {
    StochasticMatrices::new(&self.q.view())
  }

  /// Makes this model a deep copy of `other`. Fails if `other` is a different kind of model.
  pub fn assign(&mut self, other: &Self) -> Result<(), Report> {
    if discriminant(&self.kind) != discriminant(&other.kind) {
      return Err(
        RateMatrixError::AssignmentMismatch {
          expected: self.kind.to_string(),
          actual: other.kind.to_string(),
        }
        .into(),
      );
    }
    self.clone_from(other);
    Ok(())
  }

  pub fn summary(&self) -> Result<RateMatrixSummary, Report> {
    Ok(RateMatrixSummary {
      model: self.name().to_owned(),
      num_states: self.num_states(),
      exponentiation: self.exponentiation,
      parameters: self.parameters().into_iter().collect(),
      stationary_frequencies: self.stationary_frequencies()?.to_vec(),
      average_rate: self.average_rate()?,
      time_reversible: self.check_time_reversibility(DEFAULT_REVERSIBILITY_TOLERANCE)?,
      rate_matrix: self.q.rows().into_iter().map(|row| row.to_vec()).collect(),
    })
  }

  /// Writes the summary of the model as JSON
  pub fn write_json<W: Write>(&self, writer: W, pretty: JsonPretty) -> Result<(), Report> {
    json_write(writer, &self.summary()?, pretty)
  }

  pub fn print<W: Write>(&self, w: &mut W) -> Result<(), Report> {
    let n = self.num_states();
    writeln!(w, "Model: {} ({n} states)", self.name())?;
    writeln!(w, "Exponentiation: {}", self.exponentiation)?;
    writeln!(w, "Average rate: {:.6}", self.average_rate()?)?;

    writeln!(w, "\nStationary frequencies (pi_i):")?;
    for (i, p) in self.stationary_frequencies()?.iter().enumerate() {
      writeln!(w, "{i}:\t{p:.4}")?;
    }

    writeln!(w, "\nRates from i->j (Q_ij):")?;
    writeln!(w, "\t{}", (0..n).join("\t"))?;
    for (i, row) in self.q.rows().into_iter().enumerate() {
      writeln!(w, "{i}\t{}", row.iter().map(|q_ij| format!("{q_ij:.4}")).join("\t"))?;
    }
    writeln!(w)?;
    Ok(())
  }
}

impl std::fmt::Display for RateMatrixModel {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let mut buf = vec![];
    self.print(&mut buf).map_err(|_| std::fmt::Error)?;
    write!(f, "{}", String::from_utf8_lossy(&buf))
  }
}

/// Serializable snapshot of a model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateMatrixSummary {
  pub model: String,
  pub num_states: usize,
  pub exponentiation: ExponentiationMethod,
  pub parameters: BTreeMap<ParameterName, ParameterValue>,
  pub stationary_frequencies: Vec<f64>,
  pub average_rate: f64,
  pub time_reversible: bool,
  pub rate_matrix: Vec<Vec<f64>>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::exponentiation::method::ExponentiationMethod;
  use crate::io::json::{json_read_str, json_write_str};
  use crate::models::bdr::BdrParams;
  use crate::models::binary_mutation_coalescent::BinaryMutationCoalescentParams;
  use crate::models::chromosomes::ChromosomesParams;
  use crate::models::chromosomes_ploidy::ChromosomesPloidyParams;
  use crate::models::codon_hky::CodonHkyParams;
  use crate::models::covarion::CovarionParams;
  use crate::models::free_k::FreeKParams;
  use crate::models::gtr::GtrParams;
  use crate::models::mk1::Mk1Params;
  use crate::models::nuc_presets::{NucModelName, get_nuc_model};
  use crate::models::ordered::OrderedParams;
  use crate::models::pomo::PomoParams;
  use crate::models::reversible_pomo::ReversiblePomoParams;
  use crate::models::wag::WagParams;
  use crate::pretty_assert_ulps_eq;
  use crate::utils::error::error_kind;
  use approx::{assert_abs_diff_eq, assert_ulps_eq};
  use lazy_static::lazy_static;
  use ndarray::array;
  use pretty_assertions::assert_eq;
  use rstest::rstest;
  use strum::IntoEnumIterator;

  lazy_static! {
    // Off-diagonal rates of a 3-state chain without detailed balance
    static ref CYCLIC_RATES: Vec<f64> = vec![
      3.0, 0.5,
      0.5, 3.0,
      3.0, 0.5,
    ];
  }

  fn all_models() -> Result<Vec<RateMatrixModel>, Report> {
    let mut kinds = vec![
      ModelKind::FreeK(FreeK::new(FreeKParams {
        rates: CYCLIC_RATES.clone(),
        ..FreeKParams::default()
      })?),
      ModelKind::Mk1(Mk1::new(Mk1Params::default())?),
      ModelKind::Ordered(Ordered::new(OrderedParams {
        max_state: 5,
        ..OrderedParams::default()
      })?),
      ModelKind::Bdr(Bdr::new(BdrParams {
        max_state: 6,
        ..BdrParams::default()
      })?),
      ModelKind::Chromosomes(Chromosomes::new(ChromosomesParams {
        max_chromosomes: 8,
        ..ChromosomesParams::default()
      })?),
      ModelKind::ChromosomesPloidy(ChromosomesPloidy::new(ChromosomesPloidyParams {
        max_chromosomes: 5,
        ..ChromosomesPloidyParams::default()
      })?),
      ModelKind::BinaryMutationCoalescent(BinaryMutationCoalescent::new(BinaryMutationCoalescentParams {
        num_lineages: 3,
        ..BinaryMutationCoalescentParams::default()
      })?),
      ModelKind::Pomo(Pomo::new(PomoParams {
        virtual_population_size: 4,
        ..PomoParams::default()
      })?),
      ModelKind::ReversiblePomo(ReversiblePomo::new(ReversiblePomoParams {
        virtual_population_size: 4,
        ..ReversiblePomoParams::default()
      })?),
      ModelKind::Wag(Wag::new(WagParams::default())?),
      ModelKind::CodonHky(CodonHky::new(CodonHkyParams {
        kappa: 2.0,
        omega: 0.5,
        ..CodonHkyParams::default()
      })?),
      ModelKind::Covarion(Covarion::new(CovarionParams {
        rates: vec![CYCLIC_RATES.clone(), vec![1.0; 6]],
        clock_rates: vec![1.0, 0.2],
        ..CovarionParams::default()
      })?),
    ];
    for name in NucModelName::iter() {
      kinds.push(ModelKind::Gtr(get_nuc_model(name)?));
    }
    kinds.into_iter().map(RateMatrixModel::new).collect()
  }

  #[rstest]
  fn rows_of_rate_matrix_sum_to_zero() -> Result<(), Report> {
    for model in all_models()? {
      let tolerance = ROW_SUM_TOLERANCE * (1.0 + model.dominating_rate());
      for (i, sum) in row_sums(&model.rate_matrix().view()).iter().enumerate() {
        assert!(sum.abs() < tolerance, "Row {i} of model '{}' sums to {sum}", model.name());
      }
    }
    Ok(())
  }

  #[rstest]
  fn stationary_frequencies_form_distribution() -> Result<(), Report> {
    for model in all_models()? {
      let pi = model.stationary_frequencies()?;
      assert_eq!(pi.len(), model.num_states());
      assert_abs_diff_eq!(pi.sum(), 1.0, epsilon = 1e-9);
      assert!(pi.iter().all(|&p| p >= 0.0), "Negative frequency in model '{}'", model.name());
    }
    Ok(())
  }

  #[rstest]
  #[case(0.1)]
  #[case(1.0)]
  #[case(5.0)]
  fn transition_probability_rows_sum_to_one(#[case] t: f64) -> Result<(), Report> {
    for mut model in all_models()? {
      let p = model.transition_probabilities(t)?;
      assert!(
        p.max_row_sum_deviation() < 1e-6,
        "Rows of P({t}) of model '{}' deviate from 1 by {}",
        model.name(),
        p.max_row_sum_deviation()
      );
      assert!(p.values().iter().all(|&p_ij| p_ij >= 0.0));
    }
    Ok(())
  }

  #[rstest]
  fn transition_probabilities_at_zero_are_identity() -> Result<(), Report> {
    for mut model in all_models()? {
      let p = model.transition_probabilities(0.0)?;
      assert_abs_diff_eq!(p.values(), Array2::<f64>::eye(model.num_states()).view(), epsilon = 1e-9);
    }
    Ok(())
  }

  #[rstest]
  fn transition_probabilities_compose() -> Result<(), Report> {
    for model in all_models()? {
      let mut model = model.with_exponentiation(ExponentiationMethod::ADAPTIVE_TAYLOR)?;
      let p_s = model.transition_probabilities(0.3)?;
      let p_t = model.transition_probabilities(0.5)?;
      let p_st = model.transition_probabilities(0.8)?;
      assert_abs_diff_eq!(p_s.values().dot(&p_t.values()), p_st.values(), epsilon = 1e-8);
    }
    Ok(())
  }

  #[rstest]
  fn transition_probabilities_compose_with_default_methods() -> Result<(), Report> {
    // Fixed-step scaling and squaring is only approximately a semigroup
    for mut model in all_models()? {
      let p_s = model.transition_probabilities(0.01)?;
      let p_t = model.transition_probabilities(0.02)?;
      let p_st = model.transition_probabilities(0.03)?;
      let product = p_s.values().dot(&p_t.values());
      let deviation = (&product - &p_st.values()).fold(0.0_f64, |acc, x| acc.max(x.abs()));
      assert!(
        deviation < 1e-4,
        "P(s)P(t) of model '{}' with {} deviates from P(s+t) by {deviation}",
        model.name(),
        model.exponentiation()
      );
    }
    Ok(())
  }

  #[rstest]
  fn exponentiation_methods_agree() -> Result<(), Report> {
    let mut eigen = RateMatrixModel::new(ModelKind::Gtr(get_nuc_model(NucModelName::HKY85)?))?;
    let expected = eigen.transition_probabilities(0.4)?;
    for method in [
      ExponentiationMethod::TAYLOR,
      ExponentiationMethod::TAYLOR_FINE,
      ExponentiationMethod::ADAPTIVE_TAYLOR,
      ExponentiationMethod::UNIFORMIZATION,
    ] {
      let mut model = eigen.clone().with_exponentiation(method)?;
      let actual = model.transition_probabilities(0.4)?;
      assert_abs_diff_eq!(actual.values(), expected.values(), epsilon = 1e-8);
    }
    Ok(())
  }

  #[rstest]
  fn parameter_change_marks_model_dirty() -> Result<(), Report> {
    // Mk with 4 states: P_ij(t) = (1 - exp(-4 lambda t)) / 4 for i != j
    let mut model = RateMatrixModel::new(ModelKind::Mk1(Mk1::new(Mk1Params::default())?))?;
    assert!(!model.needs_update());

    let mut p = TransitionProbabilityMatrix::new(4);
    model.calculate_transition_probabilities(1.0, 0.0, 1.0, &mut p)?;
    let p_before = p[[0, 1]];
    assert_abs_diff_eq!(p_before, (1.0 - (-4.0_f64).exp()) / 4.0, epsilon = 1e-4);

    model.set_parameter(ParameterName::Lambda, 2.0)?;
    assert!(model.needs_update());
    assert_ulps_eq!(model.get_rate(0, 1, 1.0)?, 1.0);

    model.calculate_transition_probabilities(1.0, 0.0, 1.0, &mut p)?;
    assert!(!model.needs_update());
    assert_ulps_eq!(model.get_rate(0, 1, 1.0)?, 2.0);
    assert_abs_diff_eq!(p[[0, 1]], (1.0 - (-8.0_f64).exp()) / 4.0, epsilon = 1e-4);
    assert!(p[[0, 1]] > p_before + 1e-3);
    assert!(p[[0, 0]] < 0.26);
    Ok(())
  }

  #[rstest]
  fn failed_parameter_change_keeps_model_clean() -> Result<(), Report> {
    let mut model = RateMatrixModel::new(ModelKind::Mk1(Mk1::new(Mk1Params::default())?))?;
    let err = model.set_parameter(ParameterName::Lambda, -1.0).unwrap_err();
    assert!(matches!(error_kind(&err), Some(RateMatrixError::InvalidConfiguration(_))));
    assert!(!model.needs_update());
    Ok(())
  }

  #[rstest]
  fn clones_are_independent() -> Result<(), Report> {
    let original = RateMatrixModel::new(ModelKind::Mk1(Mk1::new(Mk1Params::default())?))?;
    let mut clone = original.clone();
    clone.set_parameter(ParameterName::Lambda, 5.0)?;
    clone.update()?;

    assert_ulps_eq!(original.get_rate(0, 1, 1.0)?, 1.0);
    assert_ulps_eq!(clone.get_rate(0, 1, 1.0)?, 5.0);
    assert!(!original.needs_update());
    Ok(())
  }

  #[rstest]
  fn assigns_model_of_same_kind() -> Result<(), Report> {
    let mut target = RateMatrixModel::new(ModelKind::Mk1(Mk1::new(Mk1Params::default())?))?;
    let source = RateMatrixModel::new(ModelKind::Mk1(Mk1::new(Mk1Params {
      num_states: 3,
      lambda: 0.5,
    })?))?;
    target.assign(&source)?;
    assert_eq!(target.num_states(), 3);
    pretty_assert_ulps_eq!(*target.rate_matrix(), *source.rate_matrix());
    Ok(())
  }

  #[rstest]
  fn state_space_follows_assigned_model() -> Result<(), Report> {
    let mut target = RateMatrixModel::new(ModelKind::Mk1(Mk1::new(Mk1Params::default())?))?;
    let source = RateMatrixModel::new(ModelKind::Mk1(Mk1::new(Mk1Params {
      num_states: 6,
      lambda: 0.5,
    })?))?;
    target.assign(&source)?;
    target.set_parameter(ParameterName::Lambda, 0.25)?;

    let p = target.transition_probabilities(0.5)?;
    assert_eq!(p.num_states(), 6);
    assert!(p.max_row_sum_deviation() < 1e-9);
    assert_ulps_eq!(target.get_rate(5, 0, 1.0)?, 0.25);
    Ok(())
  }

  #[rstest]
  fn parameter_change_keeps_number_of_states() -> Result<(), Report> {
    let mut model = RateMatrixModel::new(ModelKind::FreeK(FreeK::new(FreeKParams {
      rates: CYCLIC_RATES.clone(),
      ..FreeKParams::default()
    })?))?;
    let err = model.set_parameter(ParameterName::Rates, vec![1.0; 12]).unwrap_err();
    assert!(matches!(error_kind(&err), Some(RateMatrixError::InvalidConfiguration(_))));
    assert!(!model.needs_update());

    model.update_matrix()?;
    assert_eq!(model.num_states(), 3);
    assert_eq!(model.transition_probabilities(1.0)?.num_states(), 3);
    Ok(())
  }

  #[rstest]
  fn refuses_to_assign_different_kind() -> Result<(), Report> {
    let mut target = RateMatrixModel::new(ModelKind::Mk1(Mk1::new(Mk1Params::default())?))?;
    let source = RateMatrixModel::new(ModelKind::Bdr(Bdr::new(BdrParams::default())?))?;
    let err = target.assign(&source).unwrap_err();
    assert!(matches!(error_kind(&err), Some(RateMatrixError::AssignmentMismatch { .. })));
    assert_eq!(target.num_states(), 4);
    Ok(())
  }

  #[rstest]
  fn detects_missing_detailed_balance() -> Result<(), Report> {
    let model = RateMatrixModel::new(ModelKind::FreeK(FreeK::new(FreeKParams {
      rates: CYCLIC_RATES.clone(),
      ..FreeKParams::default()
    })?))?;
    assert!(!model.check_time_reversibility(DEFAULT_REVERSIBILITY_TOLERANCE)?);

    let model = RateMatrixModel::new(ModelKind::Gtr(get_nuc_model(NucModelName::HKY85)?))?;
    assert!(model.check_time_reversibility(DEFAULT_REVERSIBILITY_TOLERANCE)?);
    Ok(())
  }

  #[rstest]
  fn rescales_equal_rates_to_unit_average() -> Result<(), Report> {
    let gtr = Gtr::new(GtrParams::default())?;
    let mut unscaled = Array2::<f64>::zeros((4, 4));
    gtr.build_rate_matrix(&mut unscaled)?;
    assert_ulps_eq!(unscaled[[0, 1]], 0.25);
    assert_ulps_eq!(unscaled[[3, 2]], 0.25);

    let mut model = RateMatrixModel::new(ModelKind::Gtr(gtr))?;
    assert_abs_diff_eq!(model.average_rate()?, 1.0, epsilon = 1e-12);
    assert_abs_diff_eq!(model.get_rate(0, 1, 1.0)?, 1.0 / 3.0, epsilon = 1e-12);

    model.rescale_to_average_rate(2.0)?;
    assert_abs_diff_eq!(model.average_rate()?, 2.0, epsilon = 1e-12);
    Ok(())
  }

  #[rstest]
  fn checks_state_bounds() -> Result<(), Report> {
    let model = RateMatrixModel::new(ModelKind::Mk1(Mk1::new(Mk1Params::default())?))?;
    assert_ulps_eq!(model.get_rate(3, 0, 2.0)?, 2.0);
    assert_ulps_eq!(model.get_rate_at(3, 0, 10.0, 2.0)?, 2.0);

    for (from, to) in [(4, 0), (0, 4)] {
      let err = model.get_rate(from, to, 1.0).unwrap_err();
      assert!(matches!(error_kind(&err), Some(RateMatrixError::InvalidIndex { size: 4, .. })));
    }
    Ok(())
  }

  #[rstest]
  fn rejects_invalid_elapsed_time() -> Result<(), Report> {
    let mut model = RateMatrixModel::new(ModelKind::Mk1(Mk1::new(Mk1Params::default())?))?;
    let mut p = TransitionProbabilityMatrix::new(4);
    assert!(model.calculate_transition_probabilities(0.0, 1.0, 1.0, &mut p).is_err());
    assert!(model.calculate_transition_probabilities(f64::INFINITY, 0.0, 1.0, &mut p).is_err());

    let mut wrong_size = TransitionProbabilityMatrix::new(3);
    let err = model
      .calculate_transition_probabilities(1.0, 0.0, 1.0, &mut wrong_size)
      .unwrap_err();
    assert!(matches!(error_kind(&err), Some(RateMatrixError::InvalidConfiguration(_))));
    assert_ulps_eq!(wrong_size.values().sum(), 0.0);
    Ok(())
  }

  #[rstest]
  fn scales_elapsed_time_by_rate() -> Result<(), Report> {
    let mut model = RateMatrixModel::new(ModelKind::Gtr(get_nuc_model(NucModelName::F81)?))?;
    let mut p = TransitionProbabilityMatrix::new(4);
    model.calculate_transition_probabilities(3.0, 1.0, 0.25, &mut p)?;
    let expected = model.transition_probabilities(0.5)?;
    assert_abs_diff_eq!(p.values(), expected.values(), epsilon = 1e-14);
    Ok(())
  }

  #[rstest]
  fn computes_jump_chain_of_current_matrix() -> Result<(), Report> {
    let model = RateMatrixModel::new(ModelKind::Mk1(Mk1::new(Mk1Params {
      num_states: 2,
      lambda: 2.0,
    })?))?;
    assert_ulps_eq!(model.dominating_rate(), 2.0);
    let mut matrices = model.stochastic_matrices();
    assert_ulps_eq!(*matrices.power(1), array![[0.0, 1.0], [1.0, 0.0]]);
    Ok(())
  }

  #[rstest]
  fn writes_summary_as_json() -> Result<(), Report> {
    let model = RateMatrixModel::new(ModelKind::Mk1(Mk1::new(Mk1Params {
      num_states: 2,
      lambda: 0.5,
    })?))?;
    let summary = model.summary()?;
    assert_eq!(summary.model, "Mk1");
    assert_eq!(summary.rate_matrix, vec![vec![-0.5, 0.5], vec![0.5, -0.5]]);

    assert!(summary.time_reversible);

    let json = json_write_str(&summary, JsonPretty(true))?;
    let restored: RateMatrixSummary = json_read_str(&json)?;
    assert_eq!(restored, summary);

    let mut buf = vec![];
    model.write_json(&mut buf, JsonPretty(false))?;
    let restored: RateMatrixSummary = json_read_str(String::from_utf8(buf)?)?;
    assert_eq!(restored, summary);
    Ok(())
  }

  #[rstest]
  fn reads_model_from_json() -> Result<(), Report> {
    let kind: ModelKind = json_read_str(r#"{ "model": "mk1", "num_states": 3, "lambda": 0.2 }"#)?;
    let model = RateMatrixModel::new(kind)?;
    assert_eq!(model.num_states(), 3);
    assert_ulps_eq!(model.get_rate(2, 1, 1.0)?, 0.2);

    let kind: ModelKind = json_read_str(r#"{ "model": "wag" }"#)?;
    assert_eq!(kind.generator().num_states(), 20);
    Ok(())
  }

  #[rstest]
  #[case(r#"{ "model": "mk1", "num_states": 3, "lambda": -1.0 }"#)]
  #[case(r#"{ "model": "mk1", "num_states": 1 }"#)]
  #[case(r#"{ "model": "pomo", "virtual_population_size": 0 }"#)]
  #[case(r#"{ "model": "reversible_pomo", "virtual_population_size": 1 }"#)]
  #[case(r#"{ "model": "gtr", "exchangeabilities": [1.0, 1.0], "stationary_frequencies": [0.25, 0.25, 0.25, 0.25] }"#)]
  #[case(r#"{ "model": "codon_hky", "nucleotide_frequencies": [0.5, 0.5, 0.5, 0.5] }"#)]
  #[case(r#"{ "model": "covarion", "rates": [[1.0, 1.0]], "switch_rates": [1.0] }"#)]
  fn refuses_to_read_invalid_model_from_json(#[case] json: &str) {
    let err = json_read_str::<ModelKind>(json).unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("Invalid configuration"), "{message}");
  }

  #[rstest]
  fn writes_and_reads_models_as_json() -> Result<(), Report> {
    for model in all_models()? {
      let json = json_write_str(model.kind(), JsonPretty(false))?;
      let restored: ModelKind = json_read_str(&json)?;
      assert_eq!(&restored, model.kind());
    }
    Ok(())
  }

  #[rstest]
  fn prints_rate_table() -> Result<(), Report> {
    let model = RateMatrixModel::new(ModelKind::Mk1(Mk1::new(Mk1Params {
      num_states: 2,
      lambda: 1.0,
    })?))?;
    let output = model.to_string();
    assert!(output.starts_with("Model: Mk1 (2 states)"));
    assert!(output.contains("0\t-1.0000\t1.0000"));
    assert!(output.contains("Average rate: 1.000000"));
    Ok(())
  }
}
