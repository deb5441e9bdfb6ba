use crate::constants::NUM_NUCLEOTIDES;
use crate::utils::error::{RateMatrixError, check_index};
use eyre::Report;
use std::fmt::{Display, Formatter};

pub const NUCLEOTIDE_LETTERS: [char; NUM_NUCLEOTIDES] = ['A', 'C', 'G', 'T'];

/// Amino acids of the standard genetic code, `*` for stop. Codons are enumerated with each position in `TCAG` order.
const STANDARD_CODE_TCAG: &[u8; 64] = b"FFLLSSSSYY**CC*WLLLLPPPPHHQQRRRRIIIMTTTTNNKKSSRRVVVVAAAADDEEGGGG";

/// Position of a nucleotide (`ACGT` index) in `TCAG` order
const TCAG_POSITION: [usize; NUM_NUCLEOTIDES] = [2, 1, 3, 0];

/// Triplet of nucleotides, each an index into `ACGT`
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Codon([usize; 3]);

impl Codon {
  /// Codon number `index` of all 64 codons enumerated in `ACGT` order
  pub fn from_index(index: usize) -> Result<Self, Report> {
    check_index("codon", index, 64)?;
    Ok(Self([index / 16, (index / 4) % 4, index % 4]))
  }

  #[inline]
  pub const fn nucleotides(&self) -> [usize; 3] {
    self.0
  }

  pub fn parse(s: &str) -> Result<Self, Report> {
    let nucleotides: Vec<usize> = s
      .chars()
      .map(|c| {
        NUCLEOTIDE_LETTERS
          .iter()
          .position(|&n| n == c.to_ascii_uppercase())
          .ok_or_else(|| RateMatrixError::invalid_configuration(format!("Unknown nucleotide '{c}' in codon '{s}'")))
      })
      .collect::<Result<_, _>>()?;
    match nucleotides.as_slice() {
      &[a, b, c] => Ok(Self([a, b, c])),
      _ => Err(RateMatrixError::invalid_configuration(format!(
        "Codon must have 3 nucleotides, but got '{s}'"
      ))),
    }
  }

  /// One-letter amino acid under the standard genetic code, `*` for stop codons
  pub fn amino_acid(&self) -> char {
    let [a, b, c] = self.0.map(|n| TCAG_POSITION[n]);
    char::from(STANDARD_CODE_TCAG[16 * a + 4 * b + c])
  }

  #[inline]
  pub fn is_stop(&self) -> bool {
    self.amino_acid() == '*'
  }

  /// Position and nucleotides `(from, to)` of the only difference to `other`. None if they differ at 0 or 2+ sites.
  pub fn single_difference(&self, other: &Self) -> Option<(usize, usize, usize)> {
    let mut differences = (0..3).filter(|&p| self.0[p] != other.0[p]);
    match (differences.next(), differences.next()) {
      (Some(p), None) => Some((p, self.0[p], other.0[p])),
      _ => None,
    }
  }
}

impl Display for Codon {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    for n in self.0 {
      write!(f, "{}", NUCLEOTIDE_LETTERS[n])?;
    }
    Ok(())
  }
}

/// The 61 sense codons of the standard genetic code, in `ACGT` order
pub fn sense_codons() -> Vec<Codon> {
  (0..64)
    .filter_map(|i| Codon::from_index(i).ok())
    .filter(|codon| !codon.is_stop())
    .collect()
}

/// State index of a codon in the sense codon state space. None for stop codons.
pub fn sense_codon_index(codon: &Codon) -> Option<usize> {
  sense_codons().iter().position(|c| c == codon)
}

/// Purine-purine (A-G) or pyrimidine-pyrimidine (C-T) substitution
#[inline]
pub const fn is_transition(from: usize, to: usize) -> bool {
  matches!((from, to), (0, 2) | (2, 0) | (1, 3) | (3, 1))
}
