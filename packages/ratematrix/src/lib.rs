pub mod adapter;
pub mod constants;
pub mod exponentiation;
pub mod io;
pub mod matrix;
pub mod models;
pub mod rate_matrix;
pub mod stochastic_mapping;
pub mod utils;
