//! Numerical fitting core shared by the sky and PSF fitters.

pub mod linear_solver;
pub mod lm_optimizer;

pub use lm_optimizer::{
    LmConfig, LmFit, LmModel, RetriedFit, optimize, optimize_with_retry, parameter_errors,
};
