use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use strum_macros::Display;

/// Algorithm turning a rate matrix `Q` and a time `t` into `P(t) = exp(Q t)`
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize, SmartDefault, Display)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum ExponentiationMethod {
  /// Closed form from the eigendecomposition of `Q`, cached between rebuilds
  #[default]
  Eigen,

  /// Scale `Q t` by `2^-squarings`, approximate the exponential of the scaled matrix
  /// (order-4 Taylor polynomial or just `I + X`), then square `squarings` times
  ScalingAndSquaring { squarings: u32, taylor: bool },

  /// Scaling-and-squaring with a Taylor series extended until terms fall below `tolerance`
  AdaptiveTaylor { tolerance: f64 },

  /// Poisson-weighted sum of powers of the uniformized jump chain
  Uniformization { tolerance: f64 },
}

impl ExponentiationMethod {
  /// Order-4 Taylor approximant squared 6 times
  pub const TAYLOR: Self = Self::ScalingAndSquaring {
    squarings: 6,
    taylor: true,
  };

  /// Order-4 Taylor approximant squared 8 times
  pub const TAYLOR_FINE: Self = Self::ScalingAndSquaring {
    squarings: 8,
    taylor: true,
  };

  /// `(I + Q t / 1024)^1024`
  pub const REPEATED_SQUARING: Self = Self::ScalingAndSquaring {
    squarings: 10,
    taylor: false,
  };

  pub const ADAPTIVE_TAYLOR: Self = Self::AdaptiveTaylor { tolerance: 1e-12 };

  pub const UNIFORMIZATION: Self = Self::Uniformization { tolerance: 1e-12 };
}
