pub mod parameter;
pub mod rate_matrix_function;
