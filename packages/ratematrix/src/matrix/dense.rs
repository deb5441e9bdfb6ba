use crate::utils::error::check_index;
use eyre::Report;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, ArrayView2, ArrayViewMut1, Axis, Data, Ix2};
use ndarray_linalg::c64;

/// Dense real matrix. Used for rate matrices and transition probabilities.
pub type MatrixReal = Array2<f64>;

/// Dense complex matrix. Used for eigenvectors of non-symmetric generators.
pub type MatrixComplex = Array2<c64>;

#[inline]
pub fn identity(n: usize) -> MatrixReal {
  Array2::eye(n)
}

/// Bounds-checked element access
#[inline]
pub fn get_element(m: &ArrayView2<f64>, row: usize, col: usize) -> Result<f64, Report> {
  check_index("row", row, m.nrows())?;
  check_index("column", col, m.ncols())?;
  Ok(m[[row, col]])
}

/// Bounds-checked row access
#[inline]
pub fn get_row<S: Data<Elem = f64>>(m: &ArrayBase<S, Ix2>, row: usize) -> Result<ArrayView1<'_, f64>, Report> {
  check_index("row", row, m.nrows())?;
  Ok(m.row(row))
}

/// Bounds-checked mutable row access
#[inline]
pub fn get_row_mut(m: &mut MatrixReal, row: usize) -> Result<ArrayViewMut1<'_, f64>, Report> {
  check_index("row", row, m.nrows())?;
  Ok(m.row_mut(row))
}

/// Sets every diagonal element to the negated sum of the off-diagonal elements of its row
pub fn set_diagonal(q: &mut MatrixReal) {
  for (i, mut row) in q.axis_iter_mut(Axis(0)).enumerate() {
    row[i] = 0.0;
    let off_diagonal_sum = row.sum();
    row[i] = -off_diagonal_sum;
  }
}

/// Squares the matrix in place `times` times, i.e. raises it to the power `2^times`
pub fn square_inplace(m: &mut MatrixReal, times: u32) {
  for _ in 0..times {
    let squared = m.dot(&*m);
    *m = squared;
  }
}

/// Row sums of a matrix
#[inline]
pub fn row_sums(m: &ArrayView2<f64>) -> Array1<f64> {
  m.sum_axis(Axis(1))
}
