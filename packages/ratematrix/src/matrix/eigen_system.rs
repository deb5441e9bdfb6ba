use crate::constants::COMPLEX_EIGENVALUE_TOLERANCE;
use crate::matrix::dense::{MatrixComplex, MatrixReal};
use crate::utils::error::RateMatrixError;
use crate::utils::ndarray::all_finite;
use eyre::Report;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use ndarray_linalg::UPLO::Lower;
use ndarray_linalg::{Eig, Eigh, Inverse, c64};

/// Eigenvalues, eigenvectors and inverse eigenvectors of a rate matrix, `Q = V diag(lambda) V^-1`.
///
/// Real generators can have complex-conjugate eigenvalue pairs. In that case the complex
/// counterparts hold the exact decomposition and the real accessors hold the real parts.
#[derive(Clone, Debug)]
pub struct EigenSystem {
  real_eigenvalues: Array1<f64>,
  imag_eigenvalues: Array1<f64>,
  eigenvectors: MatrixReal,
  inverse_eigenvectors: MatrixReal,
  complex_eigenvalues: Array1<c64>,
  complex_eigenvectors: MatrixComplex,
  complex_inverse_eigenvectors: MatrixComplex,
  is_complex: bool,
}

impl EigenSystem {
  /// Decomposes an arbitrary square real matrix
  pub fn new(q: &ArrayView2<f64>) -> Result<Self, Report> {
    let (eigenvalues, eigenvectors) = q
      .eig()
      .map_err(|err| RateMatrixError::numerical_degeneracy(format!("Eigendecomposition failed: {err}")))?;

    let inverse_eigenvectors = eigenvectors.inv().map_err(|err| {
      RateMatrixError::numerical_degeneracy(format!("Eigenvector matrix is not invertible: {err}"))
    })?;

    Self::from_complex_parts(eigenvalues, eigenvectors, inverse_eigenvectors)
  }

  /// Decomposes a matrix which is reversible with respect to `pi`.
  ///
  /// The similarity transform `S = diag(sqrt(pi)) Q diag(1/sqrt(pi))` is symmetric, so a symmetric solver gives
  /// real eigenvalues and orthonormal eigenvectors `U`. Then `V = diag(1/sqrt(pi)) U` and `V^-1 = U^T diag(sqrt(pi))`.
  /// Falls back to the general solver when some frequency is zero.
  pub fn reversible(q: &ArrayView2<f64>, pi: &ArrayView1<f64>) -> Result<Self, Report> {
    if pi.iter().any(|&p| p <= 0.0) {
      return Self::new(q);
    }

    let sqrt_pi: Array1<f64> = pi.mapv(f64::sqrt);
    let n = q.nrows();
    let sym_q = Array2::from_shape_fn((n, n), |(i, j)| {
      if i == j {
        q[[i, i]]
      } else {
        // Averaging both triangles removes round-off asymmetry
        0.5 * (sqrt_pi[i] * q[[i, j]] / sqrt_pi[j] + sqrt_pi[j] * q[[j, i]] / sqrt_pi[i])
      }
    });

    let (eigenvalues, u) = sym_q
      .eigh(Lower)
      .map_err(|err| RateMatrixError::numerical_degeneracy(format!("Symmetric eigendecomposition failed: {err}")))?;

    let eigenvectors: Array2<f64> = &u / &sqrt_pi.view().insert_axis(Axis(1));
    let inverse_eigenvectors: Array2<f64> = u.t().to_owned() * &sqrt_pi.view().insert_axis(Axis(0));

    let this = Self {
      imag_eigenvalues: Array1::zeros(n),
      complex_eigenvalues: eigenvalues.mapv(|x| c64::new(x, 0.0)),
      complex_eigenvectors: eigenvectors.mapv(|x| c64::new(x, 0.0)),
      complex_inverse_eigenvectors: inverse_eigenvectors.mapv(|x| c64::new(x, 0.0)),
      real_eigenvalues: eigenvalues,
      eigenvectors,
      inverse_eigenvectors,
      is_complex: false,
    };
    this.validate()?;
    Ok(this)
  }

  fn from_complex_parts(
    complex_eigenvalues: Array1<c64>,
    complex_eigenvectors: MatrixComplex,
    complex_inverse_eigenvectors: MatrixComplex,
  ) -> Result<Self, Report> {
    let spectral_radius = complex_eigenvalues.iter().fold(1.0_f64, |acc, z| acc.max(z.norm()));
    let is_complex = complex_eigenvalues
      .iter()
      .any(|z| z.im.abs() > COMPLEX_EIGENVALUE_TOLERANCE * spectral_radius);

    let this = Self {
      real_eigenvalues: complex_eigenvalues.mapv(|z| z.re),
      imag_eigenvalues: complex_eigenvalues.mapv(|z| z.im),
      eigenvectors: complex_eigenvectors.mapv(|z| z.re),
      inverse_eigenvectors: complex_inverse_eigenvectors.mapv(|z| z.re),
      complex_eigenvalues,
      complex_eigenvectors,
      complex_inverse_eigenvectors,
      is_complex,
    };
    this.validate()?;
    Ok(this)
  }

  fn validate(&self) -> Result<(), Report> {
    let finite = all_finite(&self.real_eigenvalues)
      && all_finite(&self.imag_eigenvalues)
      && all_finite(&self.eigenvectors)
      && all_finite(&self.inverse_eigenvectors);
    if !finite {
      return Err(RateMatrixError::numerical_degeneracy(
        "Eigensystem contains non-finite values",
      ));
    }
    Ok(())
  }

  /// Recomputes the decomposition for a changed matrix
  pub fn update(&mut self, q: &ArrayView2<f64>) -> Result<(), Report> {
    *self = Self::new(q)?;
    Ok(())
  }

  #[inline]
  pub const fn is_complex(&self) -> bool {
    self.is_complex
  }

  #[inline]
  pub fn num_states(&self) -> usize {
    self.real_eigenvalues.len()
  }

  #[inline]
  pub fn get_real_eigenvalues(&self) -> &Array1<f64> {
    &self.real_eigenvalues
  }

  #[inline]
  pub fn get_imag_eigenvalues(&self) -> &Array1<f64> {
    &self.imag_eigenvalues
  }

  #[inline]
  pub fn get_eigenvectors(&self) -> &MatrixReal {
    &self.eigenvectors
  }

  #[inline]
  pub fn get_inverse_eigenvectors(&self) -> &MatrixReal {
    &self.inverse_eigenvectors
  }

  #[inline]
  pub fn get_complex_eigenvalues(&self) -> &Array1<c64> {
    &self.complex_eigenvalues
  }

  #[inline]
  pub fn get_complex_eigenvectors(&self) -> &MatrixComplex {
    &self.complex_eigenvectors
  }

  #[inline]
  pub fn get_complex_inverse_eigenvectors(&self) -> &MatrixComplex {
    &self.complex_inverse_eigenvectors
  }
}
