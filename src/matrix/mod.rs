//! Named matrices and covariances.

pub mod cov;
pub mod named;

pub use cov::{Cov, PriorCovarianceConfig};
pub use named::NamedMatrix;
