use crate::constants::{NUM_NUCLEOTIDE_PAIRS, NUM_NUCLEOTIDES};
use crate::utils::error::{RateMatrixError, check_index};
use eyre::Report;
use serde::{Deserialize, Serialize};

/// Unordered nucleotide pairs in the order of the polymorphic blocks: AC, AG, AT, CG, CT, GT
pub const NUCLEOTIDE_PAIRS: [(usize, usize); NUM_NUCLEOTIDE_PAIRS] = [(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)];

/// Population state of a PoMo model.
///
/// Monomorphic states have `count == N` copies of `nt1` and no `nt2`. Polymorphic states have `count` copies of `nt1`
/// and `N - count` copies of `nt2`, with `nt1 < nt2`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PomoState {
  pub count: usize,
  pub nt1: usize,
  pub nt2: Option<usize>,
}

/// Number of states with virtual population size `n`: 4 monomorphic states and 6 blocks of `n - 1` polymorphic ones
#[inline]
pub const fn num_pomo_states(n: usize) -> usize {
  NUM_NUCLEOTIDES + NUM_NUCLEOTIDE_PAIRS * (n - 1)
}

/// Fails unless the virtual population size allows polymorphic states
pub fn check_population_size(n: usize) -> Result<usize, Report> {
  if n < 2 {
    return Err(RateMatrixError::invalid_configuration(format!(
      "PoMo virtual population size must be at least 2, but got {n}"
    )));
  }
  Ok(n)
}

/// Block of the unordered pair of two distinct nucleotides
pub fn pair_index(a: usize, b: usize) -> Result<usize, Report> {
  check_index("nucleotide", a, NUM_NUCLEOTIDES)?;
  check_index("nucleotide", b, NUM_NUCLEOTIDES)?;
  let key = (a.min(b), a.max(b));
  NUCLEOTIDE_PAIRS.iter().position(|&pair| pair == key).ok_or_else(|| {
    RateMatrixError::invalid_configuration(format!("Nucleotides {a} and {b} do not form a polymorphic pair"))
  })
}

/// State index of `count` copies of the first nucleotide of pair `pair`, for `count` in `1..n`
#[inline]
pub const fn polymorphic_index(pair: usize, count: usize, n: usize) -> usize {
  NUM_NUCLEOTIDES - 1 + count + pair * (n - 1)
}

/// Splits a state index into the allele count and the nucleotides involved
pub fn decompose_state(state: usize, n: usize) -> Result<PomoState, Report> {
  check_population_size(n)?;
  check_index("PoMo state", state, num_pomo_states(n))?;
  if state < NUM_NUCLEOTIDES {
    return Ok(PomoState {
      count: n,
      nt1: state,
      nt2: None,
    });
  }
  let block = (state - NUM_NUCLEOTIDES) / (n - 1);
  let (nt1, nt2) = NUCLEOTIDE_PAIRS[block];
  Ok(PomoState {
    count: state + 1 - NUM_NUCLEOTIDES - block * (n - 1),
    nt1,
    nt2: Some(nt2),
  })
}
