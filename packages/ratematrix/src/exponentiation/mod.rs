pub mod eigen;
pub mod method;
pub mod scaling_squaring;
pub mod uniformization;
