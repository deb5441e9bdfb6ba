use ndarray::{Array, ArrayBase, ArrayView2, DataMut, Dimension, Ix2};

/// Clamp each element to be at least `lower`, in place
pub fn clamp_min_inplace<T: Copy + PartialOrd, S: DataMut<Elem = T>, D: Dimension>(a: &mut ArrayBase<S, D>, lower: T) {
  a.mapv_inplace(|x| num_traits::clamp_min(x, lower));
}

/// Divides every row by its sum. Rows summing to zero are left as they are.
pub fn normalize_rows_inplace<S: DataMut<Elem = f64>>(a: &mut ArrayBase<S, Ix2>) {
  for mut row in a.rows_mut() {
    let sum = row.sum();
    if sum > 0.0 {
      row /= sum;
    }
  }
}

/// Largest absolute value on the main diagonal
#[inline]
pub fn max_abs_diag(a: &ArrayView2<f64>) -> f64 {
  a.diag().iter().fold(0.0_f64, |acc, &x| acc.max(x.abs()))
}

/// Largest absolute value of all elements
#[inline]
pub fn max_abs<D: Dimension>(a: &Array<f64, D>) -> f64 {
  a.iter().fold(0.0_f64, |acc, &x| acc.max(x.abs()))
}

/// Checks that all elements are finite numbers
#[inline]
pub fn all_finite<D: Dimension>(a: &Array<f64, D>) -> bool {
  a.iter().all(|x| x.is_finite())
}
