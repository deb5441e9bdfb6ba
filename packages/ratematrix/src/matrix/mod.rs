pub mod dense;
pub mod eigen_system;
pub mod lu;
pub mod transition_probability;
