use crate::adapter::parameter::{ParameterName, ParameterValue, check_rates};
use crate::exponentiation::method::ExponentiationMethod;
use crate::matrix::dense::MatrixReal;
use crate::models::free_k::num_states_from_rates;
use crate::rate_matrix::generator::{RateMatrixGenerator, unknown_parameter, validate_on_deserialize};
use crate::utils::error::RateMatrixError;
use eyre::Report;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct CovarionParams {
  /// Off-diagonal rates of every rate class, each laid out like the free model: row by row, skipping the diagonal.
  /// All classes must have the same number of states.
  #[default(vec![vec![1.0; 2]; 2])]
  pub rates: Vec<Vec<f64>>,

  /// Rates of switching between classes, row by row, skipping the diagonal. There must be `k * (k - 1)` of them
  /// for `k` classes.
  #[default(vec![1.0; 2])]
  pub switch_rates: Vec<f64>,

  /// Multiplier of the rates of each class
  #[default(vec![1.0; 2])]
  pub clock_rates: Vec<f64>,

  /// Rescale the matrix to one expected event per unit time
  #[default = true]
  pub rescale: bool,
}

/// Covarion model: a character evolves under one of `k` rate classes and switches between them.
///
/// The state space is `k` blocks of the `n` character states, block `c` holding class `c`. Within a block, rates
/// are those of the class times its clock rate. A switch from class `a` to `b` keeps the character state and happens
/// at the same rate for every state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CovarionParams", into = "CovarionParams")]
pub struct Covarion {
  num_character_states: usize,
  rates: Vec<Vec<f64>>,
  switch_rates: Vec<f64>,
  clock_rates: Vec<f64>,
  rescale: bool,
}

impl Covarion {
  pub fn new(
    CovarionParams {
      rates,
      switch_rates,
      clock_rates,
      rescale,
    }: CovarionParams,
  ) -> Result<Self, Report> {
    let num_classes = rates.len();
    if num_classes == 0 {
      return Err(RateMatrixError::invalid_configuration(
        "Covarion model requires at least one rate class",
      ));
    }
    let num_character_states = num_states_from_rates(rates[0].len()).ok_or_else(|| {
      RateMatrixError::invalid_configuration(format!(
        "Number of rates of a covarion class must be n * (n - 1) for some number of states n >= 2, but got {}",
        rates[0].len()
      ))
    })?;

    let mut this = Self {
      num_character_states,
      rates: vec![vec![]; num_classes],
      switch_rates: vec![0.0; num_classes * (num_classes - 1)],
      clock_rates: vec![0.0; num_classes],
      rescale,
    };
    this.set_rates(&rates.concat())?;
    this.set_switch_rates(&switch_rates)?;
    this.set_clock_rates(&clock_rates)?;
    Ok(this)
  }

  #[inline]
  pub fn num_classes(&self) -> usize {
    self.rates.len()
  }

  #[inline]
  pub const fn num_character_states(&self) -> usize {
    self.num_character_states
  }

  /// Sets the rates of all classes at once, concatenated class by class
  pub fn set_rates(&mut self, rates: &[f64]) -> Result<(), Report> {
    let n = self.num_character_states;
    let per_class = n * (n - 1);
    let value = ParameterValue::Vector(rates.to_vec());
    let rates = value.as_vector_of_len(ParameterName::Rates, per_class * self.num_classes())?;
    let rates = check_rates(ParameterName::Rates, rates)?;
    self.rates = rates.chunks(per_class).map(<[f64]>::to_vec).collect();
    Ok(())
  }

  pub fn set_switch_rates(&mut self, switch_rates: &[f64]) -> Result<(), Report> {
    let value = ParameterValue::Vector(switch_rates.to_vec());
    let switch_rates = value.as_vector_of_len(ParameterName::SwitchRates, self.switch_rates.len())?;
    self.switch_rates = check_rates(ParameterName::SwitchRates, switch_rates)?;
    Ok(())
  }

  pub fn set_clock_rates(&mut self, clock_rates: &[f64]) -> Result<(), Report> {
    let value = ParameterValue::Vector(clock_rates.to_vec());
    let clock_rates = value.as_vector_of_len(ParameterName::ClockRates, self.num_classes())?;
    self.clock_rates = check_rates(ParameterName::ClockRates, clock_rates)?;
    Ok(())
  }
}

validate_on_deserialize!(Covarion, CovarionParams);

impl From<Covarion> for CovarionParams {
  fn from(model: Covarion) -> Self {
    Self {
      rates: model.rates,
      switch_rates: model.switch_rates,
      clock_rates: model.clock_rates,
      rescale: model.rescale,
    }
  }
}

impl RateMatrixGenerator for Covarion {
  fn name(&self) -> &'static str {
    "Covarion"
  }

  fn num_states(&self) -> usize {
    self.num_character_states * self.num_classes()
  }

  fn build_rate_matrix(&self, q: &mut MatrixReal) -> Result<(), Report> {
    let n = self.num_character_states;
    let k = self.num_classes();

    for (class, (rates, &clock)) in self.rates.iter().zip(&self.clock_rates).enumerate() {
      let offset = class * n;
      let mut rates = rates.iter();
      for i in 0..n {
        for j in 0..n {
          if i != j {
            if let Some(&rate) = rates.next() {
              q[[offset + i, offset + j]] = rate * clock;
            }
          }
        }
      }
    }

    let mut switch_rates = self.switch_rates.iter();
    for a in 0..k {
      for b in 0..k {
        if a != b {
          if let Some(&rate) = switch_rates.next() {
            for i in 0..n {
              q[[a * n + i, b * n + i]] = rate;
            }
          }
        }
      }
    }
    Ok(())
  }

  fn rescale_target(&self) -> Option<f64> {
    self.rescale.then_some(1.0)
  }

  fn default_exponentiation(&self) -> ExponentiationMethod {
    ExponentiationMethod::TAYLOR
  }

  fn set_parameter(&mut self, name: ParameterName, value: &ParameterValue) -> Result<(), Report> {
    match name {
      ParameterName::Rates => self.set_rates(value.as_vector(name)?),
      ParameterName::SwitchRates => self.set_switch_rates(value.as_vector(name)?),
      ParameterName::ClockRates => self.set_clock_rates(value.as_vector(name)?),
      _ => Err(unknown_parameter(self.name(), name)),
    }
  }

  fn parameters(&self) -> Vec<(ParameterName, ParameterValue)> {
    vec![
      (ParameterName::Rates, ParameterValue::Vector(self.rates.concat())),
      (ParameterName::SwitchRates, ParameterValue::Vector(self.switch_rates.clone())),
      (ParameterName::ClockRates, ParameterValue::Vector(self.clock_rates.clone())),
    ]
  }
}
