//! Backend-independent intermediate representation of calibration bundles.

mod types;

pub use types::{
    Bound, FactorKind, FixedMask, ParamBlock, ParamId, ProblemIR, ResidualBlock, RobustLoss,
};
