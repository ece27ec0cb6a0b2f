//! Residual models evaluated by the backends.

pub mod reprojection;
