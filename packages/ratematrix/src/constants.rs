/// Relative magnitude below which an elimination pivot is treated as zero
pub const PIVOT_TOLERANCE: f64 = 1e-12;

/// Imaginary parts of eigenvalues below this (relative to the spectral radius) are considered round-off
pub const COMPLEX_EIGENVALUE_TOLERANCE: f64 = 1e-10;

/// Tolerance used when verifying that a freshly built matrix has vanishing row sums
pub const ROW_SUM_TOLERANCE: f64 = 1e-9;

pub const DEFAULT_REVERSIBILITY_TOLERANCE: f64 = 1e-6;

/// Number of nucleotides in the PoMo state spaces
pub const NUM_NUCLEOTIDES: usize = 4;

/// Number of unordered nucleotide pairs: AC, AG, AT, CG, CT, GT
pub const NUM_NUCLEOTIDE_PAIRS: usize = 6;

pub const NUM_AMINO_ACIDS: usize = 20;

/// Sense codons of the standard genetic code
pub const NUM_SENSE_CODONS: usize = 61;

/// Upper bound on Taylor terms in adaptive exponentiation
pub const MAX_TAYLOR_TERMS: usize = 64;

/// Largest number of uniformized jumps stochastic mapping considers on a branch
pub const MAX_MAPPING_JUMPS: usize = 10_000;
