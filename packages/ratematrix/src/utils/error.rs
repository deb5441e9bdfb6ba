#![allow(clippy::pub_use)]

use eyre::Report;
use thiserror::Error;

/// Classes of failure a rate matrix computation can end with.
///
/// Errors travel as `eyre::Report`; callers which need to tell the classes apart can
/// `report.downcast_ref::<RateMatrixError>()`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RateMatrixError {
  #[error("Index out of bounds: {what} index {index} is not in 0..{size}")]
  InvalidIndex { what: &'static str, index: usize, size: usize },

  #[error("Invalid configuration: {0}")]
  InvalidConfiguration(String),

  #[error("Numerical degeneracy: {0}")]
  NumericalDegeneracy(String),

  #[error("Could not assign rate matrix: expected '{expected}', but got '{actual}'")]
  AssignmentMismatch { expected: String, actual: String },
}

impl RateMatrixError {
  pub fn invalid_configuration(msg: impl Into<String>) -> Report {
    Self::InvalidConfiguration(msg.into()).into()
  }

  pub fn numerical_degeneracy(msg: impl Into<String>) -> Report {
    Self::NumericalDegeneracy(msg.into()).into()
  }
}

/// Fails with `InvalidIndex` unless `index < size`
#[inline]
pub fn check_index(what: &'static str, index: usize, size: usize) -> Result<(), Report> {
  if index >= size {
    return Err(RateMatrixError::InvalidIndex { what, index, size }.into());
  }
  Ok(())
}

/// Finds the rate matrix error class anywhere in the chain of a report
pub fn error_kind(report: &Report) -> Option<&RateMatrixError> {
  report.chain().find_map(|e| e.downcast_ref::<RateMatrixError>())
}

#[macro_export(local_inner_macros)]
macro_rules! make_report {
  ($($arg:tt)*) => {
    {
      eyre::eyre!($($arg)*)
    }
  };
}

pub use make_report;

#[macro_export(local_inner_macros)]
macro_rules! make_internal_error {
  ($($arg:tt)*) => {
    {
      let msg_external = std::format!($($arg)*);
      let msg = std::format!("{msg_external}. This is an internal error. Please report it to developers.");
      Err(eyre::eyre!(msg))
    }
  };
}

pub use make_internal_error;
