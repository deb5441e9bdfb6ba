use crate::adapter::parameter::{ParameterName, ParameterSource};
use crate::rate_matrix::model::RateMatrixModel;
use eyre::{Report, WrapErr};
use log::trace;

/// Keeps a rate matrix model in sync with parameters owned elsewhere.
///
/// Each binding maps one model parameter to a source. [`RateMatrixFunction::update`] pulls every source, pushes the
/// values into the model and rebuilds the matrix.
pub struct RateMatrixFunction {
  model: RateMatrixModel,
  bindings: Vec<(ParameterName, Box<dyn ParameterSource>)>,
}

impl RateMatrixFunction {
  pub fn new(model: RateMatrixModel) -> Self {
    Self { model, bindings: vec![] }
  }

  /// Binds a model parameter to a source. Binding the same parameter again replaces the previous source.
  #[must_use]
  pub fn bind(mut self, name: ParameterName, source: impl ParameterSource + 'static) -> Self {
    self.bindings.retain(|(bound, _)| *bound != name);
    self.bindings.push((name, Box::new(source)));
    self
  }

  pub fn bound_parameters(&self) -> impl Iterator<Item = ParameterName> + '_ {
    self.bindings.iter().map(|(name, _)| *name)
  }

  /// Applies the current value of every bound parameter and rebuilds the rate matrix.
  ///
  /// All or nothing: if any value is rejected or the rebuild fails, the model keeps its previous parameters and matrix.
  pub fn update(&mut self) -> Result<(), Report> {
    let mut model = self.model.clone();
    for (name, source) in &self.bindings {
      let value = source.value();
      trace!("Setting parameter '{name}' of model '{}' to {value:?}", model.name());
      model.set_parameter(*name, value)?;
    }
    model
      .update_matrix()
      .wrap_err_with(|| format!("When updating rate matrix function of model '{}'", model.name()))?;
    self.model = model;
    Ok(())
  }

  #[inline]
  pub const fn model(&self) -> &RateMatrixModel {
    &self.model
  }

  #[inline]
  pub fn model_mut(&mut self) -> &mut RateMatrixModel {
    &mut self.model
  }

  pub fn into_model(self) -> RateMatrixModel {
    self.model
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::adapter::parameter::{ConstantParameter, ParameterValue, SharedParameter};
  use crate::models::bdr::{Bdr, BdrParams};
  use crate::models::gtr::{Gtr, GtrParams};
  use crate::rate_matrix::model::ModelKind;
  use crate::utils::error::{RateMatrixError, error_kind};
  use approx::{assert_abs_diff_eq, assert_ulps_eq};
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  #[rstest]
  fn pushes_shared_parameters_into_model() -> Result<(), Report> {
    let lambda = SharedParameter::new(1.0);
    let model = RateMatrixModel::new(ModelKind::Bdr(Bdr::new(BdrParams::default())?))?;
    let mut function = RateMatrixFunction::new(model)
      .bind(ParameterName::Lambda, lambda.clone())
      .bind(ParameterName::Rho, ConstantParameter(ParameterValue::Scalar(0.25)));

    lambda.set(3.0);
    function.update()?;

    assert!(!function.model().needs_update());
    assert_ulps_eq!(function.model().get_rate(2, 3, 1.0)?, 6.0);
    assert_ulps_eq!(function.model().get_rate(0, 1, 1.0)?, 0.25);
    Ok(())
  }

  #[rstest]
  fn rebinding_replaces_source() -> Result<(), Report> {
    let model = RateMatrixModel::new(ModelKind::Bdr(Bdr::new(BdrParams::default())?))?;
    let function = RateMatrixFunction::new(model)
      .bind(ParameterName::Mu, ConstantParameter(ParameterValue::Scalar(1.0)))
      .bind(ParameterName::Mu, ConstantParameter(ParameterValue::Scalar(2.0)));
    assert_eq!(function.bound_parameters().collect::<Vec<_>>(), vec![ParameterName::Mu]);
    Ok(())
  }

  #[rstest]
  fn propagates_vector_parameters() -> Result<(), Report> {
    let pi = SharedParameter::new(vec![0.25; 4]);
    let model = RateMatrixModel::new(ModelKind::Gtr(Gtr::new(GtrParams::default())?))?;
    let mut function = RateMatrixFunction::new(model).bind(ParameterName::StationaryFrequencies, pi.clone());

    pi.set(vec![0.1, 0.2, 0.3, 0.4]);
    function.update()?;

    let frequencies = function.model().stationary_frequencies()?;
    assert_abs_diff_eq!(frequencies[3], 0.4, epsilon = 1e-12);
    assert_abs_diff_eq!(function.model().average_rate()?, 1.0, epsilon = 1e-12);
    Ok(())
  }

  #[rstest]
  fn rejected_value_leaves_model_untouched() -> Result<(), Report> {
    let lambda = SharedParameter::new(2.0);
    let mu = SharedParameter::new(0.5);
    let model = RateMatrixModel::new(ModelKind::Bdr(Bdr::new(BdrParams::default())?))?;
    let mut function = RateMatrixFunction::new(model)
      .bind(ParameterName::Lambda, lambda.clone())
      .bind(ParameterName::Mu, mu.clone());
    function.update()?;
    let before = function.model().parameters();

    lambda.set(4.0);
    mu.set(-1.0);
    let err = function.update().unwrap_err();
    assert!(matches!(error_kind(&err), Some(RateMatrixError::InvalidConfiguration(_))));

    assert_eq!(function.model().parameters(), before);
    assert!(!function.model().needs_update());
    assert_ulps_eq!(function.model().get_rate(2, 3, 1.0)?, 4.0);
    Ok(())
  }

  #[rstest]
  fn fails_on_unknown_binding() -> Result<(), Report> {
    let model = RateMatrixModel::new(ModelKind::Bdr(Bdr::new(BdrParams::default())?))?;
    let mut function = RateMatrixFunction::new(model).bind(ParameterName::Beta, ConstantParameter(0.5.into()));
    assert!(function.update().is_err());
    Ok(())
  }
}
