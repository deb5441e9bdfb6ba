use crate::matrix::eigen_system::EigenSystem;
use ndarray::{Array1, Array3, ArrayViewMut2, Zip};
use ndarray_linalg::c64;

/// Products of eigenvector and inverse eigenvector entries, `C[i, j, k] = V[i, k] * V^-1[k, j]`
#[derive(Clone, Debug)]
pub enum Cijk {
  Real(Array3<f64>),
  Complex(Array3<c64>),
}

/// Eigendecomposition of a rate matrix together with its precomputed `Cijk` tensor.
///
/// Then `P(t)[i, j] = sum_k C[i, j, k] exp(lambda_k t)`, which costs `O(n^3)` per call without any matrix products.
#[derive(Clone, Debug)]
pub struct EigenExponentiator {
  eigen: EigenSystem,
  cijk: Cijk,
}

impl EigenExponentiator {
  pub fn new(eigen: EigenSystem) -> Self {
    let cijk = calculate_cijk(&eigen);
    Self { eigen, cijk }
  }

  #[inline]
  pub const fn eigen_system(&self) -> &EigenSystem {
    &self.eigen
  }

  #[inline]
  pub const fn cijk(&self) -> &Cijk {
    &self.cijk
  }

  /// Fills `p` with `exp(Q t)`. Negative round-off is clamped to zero.
  pub fn transition_probabilities(&self, t: f64, p: &mut ArrayViewMut2<f64>) {
    match &self.cijk {
      Cijk::Real(cijk) => {
        let exp_lambda_t: Array1<f64> = self.eigen.get_real_eigenvalues().mapv(|lambda| (lambda * t).exp());
        Zip::indexed(p).for_each(|(i, j), p_ij| {
          let sum = cijk.slice(ndarray::s![i, j, ..]).dot(&exp_lambda_t);
          *p_ij = sum.max(0.0);
        });
      }
      Cijk::Complex(cijk) => {
        let exp_lambda_t: Array1<c64> = self.eigen.get_complex_eigenvalues().mapv(|lambda| (lambda * t).exp());
        Zip::indexed(p).for_each(|(i, j), p_ij| {
          let sum: c64 = cijk.slice(ndarray::s![i, j, ..]).dot(&exp_lambda_t);
          *p_ij = sum.re.max(0.0);
        });
      }
    }
  }
}

fn calculate_cijk(eigen: &EigenSystem) -> Cijk {
  let n = eigen.num_states();
  if eigen.is_complex() {
    let ev = eigen.get_complex_eigenvectors();
    let iev = eigen.get_complex_inverse_eigenvectors();
    Cijk::Complex(Array3::from_shape_fn((n, n, n), |(i, j, k)| ev[[i, k]] * iev[[k, j]]))
  } else {
    let ev = eigen.get_eigenvectors();
    let iev = eigen.get_inverse_eigenvectors();
    Cijk::Real(Array3::from_shape_fn((n, n, n), |(i, j, k)| ev[[i, k]] * iev[[k, j]]))
  }
}
