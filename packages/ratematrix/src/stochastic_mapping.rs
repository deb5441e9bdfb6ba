use crate::constants::MAX_MAPPING_JUMPS;
use crate::exponentiation::uniformization::{StochasticMatrices, truncation_point};
use crate::rate_matrix::model::RateMatrixModel;
use crate::utils::error::{RateMatrixError, check_index};
use eyre::Report;
use itertools::Itertools;
use log::trace;
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use statrs::distribution::{Discrete, Poisson};

/// Piecewise-constant history along a branch: `(state, duration)` from the older end to the younger end
pub type StateHistory = Vec<(usize, f64)>;

/// Samples a history of state changes along a branch, conditioned on the states at both ends.
///
/// Uses uniformization: the number of jumps of the uniformized chain is drawn from its Poisson distribution
/// conditioned on reaching `end_state`, intermediate states are drawn from the jump chain conditioned on the
/// remaining jumps, and jump times are uniform on the branch. Virtual jumps (to the same state) are dropped.
pub fn simulate_stochastic_mapping(
  model: &mut RateMatrixModel,
  start_age: f64,
  end_age: f64,
  rate: f64,
  start_state: usize,
  end_state: usize,
  rng: &mut impl Rng,
) -> Result<StateHistory, Report> {
  let n = model.num_states();
  check_index("start state", start_state, n)?;
  check_index("end state", end_state, n)?;

  let t = rate * (start_age - end_age);
  if !t.is_finite() || t < 0.0 {
    return Err(RateMatrixError::invalid_configuration(format!(
      "Elapsed time must be a non-negative finite number, but got {t}"
    )));
  }

  model.update()?;
  let mut matrices = model.stochastic_matrices();
  let lambda_t = matrices.dominating_rate() * t;

  if lambda_t <= 0.0 {
    if start_state == end_state {
      return Ok(vec![(start_state, t)]);
    }
    return Err(unreachable_end_state(start_state, end_state, t));
  }

  // Number of jumps, conditioned on the end state
  let weights = jump_count_weights(&mut matrices, lambda_t, start_state, end_state)?;
  if weights.iter().sum::<f64>() <= 0.0 {
    return Err(unreachable_end_state(start_state, end_state, t));
  }
  let num_jumps = WeightedIndex::new(&weights)
    .map_err(|err| {
      RateMatrixError::numerical_degeneracy(format!(
        "Unable to sample the number of jumps from {start_state} to {end_state} over time {t}: {err}"
      ))
    })?
    .sample(rng);
  trace!("Stochastic mapping from {start_state} to {end_state} over time {t} with {num_jumps} jumps");

  // States after each jump, the last one being the end state
  let jump_chain = matrices.power(1).clone();
  let mut states = Vec::with_capacity(num_jumps + 1);
  states.push(start_state);
  for jump in 1..num_jumps {
    let prev = states[jump - 1];
    let remaining_jumps = matrices.power(num_jumps - jump);
    let weights = (0..n).map(|j| jump_chain[[prev, j]] * remaining_jumps[[j, end_state]]);
    let next = WeightedIndex::new(weights).map_err(|err| {
      RateMatrixError::numerical_degeneracy(format!(
        "Unable to sample an intermediate state after state {prev} of a stochastic mapping: {err}"
      ))
    })?;
    states.push(next.sample(rng));
  }
  if num_jumps > 0 {
    states.push(end_state);
  }

  let times = (0..num_jumps)
    .map(|_| rng.gen_range(0.0..=t))
    .sorted_by(f64::total_cmp)
    .collect_vec();

  let mut history = StateHistory::new();
  let mut current = start_state;
  let mut since = 0.0;
  for (&state, &time) in states.iter().skip(1).zip(&times) {
    if state != current {
      history.push((current, time - since));
      current = state;
      since = time;
    }
  }
  history.push((current, t - since));
  Ok(history)
}

/// Joint probabilities `Pois(k; lambda t) * R^k[from, to]` of making exactly `k` jumps of the uniformized chain and
/// ending in `to`, for `k` up to the truncation point. They sum to `P(t)[from, to]` up to the truncated tail.
pub fn jump_count_weights(
  matrices: &mut StochasticMatrices,
  lambda_t: f64,
  from: usize,
  to: usize,
) -> Result<Vec<f64>, Report> {
  let n = matrices.num_states();
  check_index("start state", from, n)?;
  check_index("end state", to, n)?;

  let poisson = Poisson::new(lambda_t)
    .map_err(|err| RateMatrixError::numerical_degeneracy(format!("Invalid uniformization rate {lambda_t}: {err}")))?;
  let max_jumps = truncation_point(lambda_t).min(MAX_MAPPING_JUMPS);
  Ok(
    (0..=max_jumps)
      .map(|k| poisson.pmf(k as u64) * matrices.power(k)[[from, to]])
      .collect(),
  )
}

fn unreachable_end_state(start_state: usize, end_state: usize, t: f64) -> Report {
  RateMatrixError::numerical_degeneracy(format!(
    "State {end_state} cannot be reached from state {start_state} over time {t}"
  ))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::exponentiation::uniformization::uniformization;
  use crate::models::bdr::{Bdr, BdrParams};
  use crate::models::mk1::{Mk1, Mk1Params};
  use crate::models::ordered::{Ordered, OrderedParams};
  use crate::rate_matrix::model::ModelKind;
  use crate::utils::error::error_kind;
  use crate::utils::random::get_random_number_generator;
  use approx::assert_abs_diff_eq;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  fn mk1() -> Result<RateMatrixModel, Report> {
    RateMatrixModel::new(ModelKind::Mk1(Mk1::new(Mk1Params::default())?))
  }

  #[rstest]
  #[case(0, 0)]
  #[case(0, 3)]
  #[case(2, 1)]
  fn connects_end_states(#[case] start: usize, #[case] end: usize) -> Result<(), Report> {
    let mut model = mk1()?;
    let mut rng = get_random_number_generator(Some(42));

    for _ in 0..50 {
      let history = simulate_stochastic_mapping(&mut model, 1.5, 0.5, 2.0, start, end, &mut rng)?;
      assert_eq!(history.first().map(|(state, _)| *state), Some(start));
      assert_eq!(history.last().map(|(state, _)| *state), Some(end));
      assert_abs_diff_eq!(history.iter().map(|(_, duration)| duration).sum::<f64>(), 2.0, epsilon = 1e-12);
      assert!(history.iter().all(|(_, duration)| *duration >= 0.0));
      assert!(history.iter().tuple_windows().all(|((a, _), (b, _))| a != b));
    }
    Ok(())
  }

  #[rstest]
  fn jump_count_weights_sum_to_transition_probability() -> Result<(), Report> {
    let model = RateMatrixModel::new(ModelKind::Bdr(Bdr::new(BdrParams {
      max_state: 5,
      ..BdrParams::default()
    })?))?;
    let t = 0.7;
    let mut matrices = model.stochastic_matrices();
    let lambda_t = matrices.dominating_rate() * t;
    let p = uniformization(&mut matrices, t, 1e-14)?;

    for (from, to) in [(1, 1), (2, 4), (0, 3), (5, 0)] {
      let weights = jump_count_weights(&mut matrices, lambda_t, from, to)?;
      assert_abs_diff_eq!(weights.iter().sum::<f64>(), p[[from, to]], epsilon = 1e-9);
      // Fewer jumps than the distance between counts cannot reach the end state
      let distance = from.abs_diff(to);
      assert!(weights[..distance].iter().all(|&w| w == 0.0));
    }
    Ok(())
  }

  #[rstest]
  fn samples_number_of_jumps_without_bias() -> Result<(), Report> {
    // Mk with 4 states: the uniformized chain never stays put, so every jump shows up in the history.
    // Given `k` jumps, it moves from state 0 to state 1 with probability `(1 - (-1/3)^k) / 4`.
    let mut model = mk1()?;
    let t = 2.0;
    let lambda_t = 3.0 * t;
    let poisson = Poisson::new(lambda_t)?;
    let (mut mass, mut moment) = (0.0, 0.0);
    for k in 0..100 {
      let w = poisson.pmf(k) * (1.0 - (-1.0_f64 / 3.0).powi(k as i32)) / 4.0;
      mass += w;
      moment += k as f64 * w;
    }
    let expected_jumps = moment / mass;

    let mut rng = get_random_number_generator(Some(11));
    let num_samples = 4000;
    let total_jumps: usize = (0..num_samples)
      .map(|_| simulate_stochastic_mapping(&mut model, t, 0.0, 1.0, 0, 1, &mut rng).map(|history| history.len() - 1))
      .sum::<Result<usize, Report>>()?;
    let mean_jumps = total_jumps as f64 / num_samples as f64;

    assert_abs_diff_eq!(mean_jumps, expected_jumps, epsilon = 0.15);
    Ok(())
  }

  #[rstest]
  fn follows_only_allowed_transitions() -> Result<(), Report> {
    let mut model = RateMatrixModel::new(ModelKind::Bdr(Bdr::new(BdrParams {
      max_state: 6,
      ..BdrParams::default()
    })?))?;
    let mut rng = get_random_number_generator(Some(7));

    for _ in 0..50 {
      let history = simulate_stochastic_mapping(&mut model, 1.0, 0.0, 1.0, 2, 4, &mut rng)?;
      for ((from, _), (to, _)) in history.iter().tuple_windows() {
        assert!(model.get_rate(*from, *to, 1.0)? > 0.0);
      }
    }
    Ok(())
  }

  #[rstest]
  fn is_reproducible_with_seed() -> Result<(), Report> {
    let mut model = mk1()?;
    let first = simulate_stochastic_mapping(&mut model, 3.0, 0.0, 1.0, 0, 1, &mut get_random_number_generator(Some(1)))?;
    let second = simulate_stochastic_mapping(&mut model, 3.0, 0.0, 1.0, 0, 1, &mut get_random_number_generator(Some(1)))?;
    assert_eq!(first, second);
    Ok(())
  }

  #[rstest]
  fn stays_put_on_zero_length_branch() -> Result<(), Report> {
    let mut model = mk1()?;
    let mut rng = get_random_number_generator(Some(3));
    assert_eq!(
      simulate_stochastic_mapping(&mut model, 1.0, 1.0, 1.0, 2, 2, &mut rng)?,
      vec![(2, 0.0)]
    );
    assert!(simulate_stochastic_mapping(&mut model, 1.0, 1.0, 1.0, 2, 3, &mut rng).is_err());
    Ok(())
  }

  #[rstest]
  fn rejects_unreachable_end_state() -> Result<(), Report> {
    // Nothing leaves the absorbing zero state
    let mut model = RateMatrixModel::new(ModelKind::Ordered(Ordered::new(OrderedParams {
      max_state: 4,
      ..OrderedParams::default()
    })?))?;
    let mut rng = get_random_number_generator(Some(3));
    let err = simulate_stochastic_mapping(&mut model, 1.0, 0.0, 1.0, 0, 2, &mut rng).unwrap_err();
    assert!(matches!(error_kind(&err), Some(RateMatrixError::NumericalDegeneracy(_))));

    let err = simulate_stochastic_mapping(&mut model, 1.0, 0.0, 1.0, 0, 9, &mut rng).unwrap_err();
    assert!(matches!(error_kind(&err), Some(RateMatrixError::InvalidIndex { .. })));
    Ok(())
  }
}
