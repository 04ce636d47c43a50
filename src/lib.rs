//! # pestlin-rs
//!
//! `pestlin-rs` reads, edits and writes PEST control files and performs
//! first-order (Schur-complement) uncertainty analysis over a Jacobian.
//!
//! The library provides:
//! - A typed model of the control file with a count-checked parser and a
//!   fixed-width writer
//! - Objective-function bookkeeping and observation reweighting from residual
//!   and run record files
//! - Named matrices and covariances for linear uncertainty propagation
//! - Posterior parameter and forecast variances, plus parameter contribution
//!   and observation importance analyses
//!
//! ## Basic Usage
//!
//! ```no_run
//! use pestlin_rs::{ControlFile, NamedMatrix, Schur};
//!
//! let pst = ControlFile::load("model.pst")?;
//! let jco = NamedMatrix::load_json("model.jco.json")?;
//! let schur = Schur::from_control_file(jco, pst)?.with_forecast_names(&["h_forecast"])?;
//! for row in schur.get_forecast_summary()? {
//!     println!("{}: {:.1}% reduction", row.name, row.percent_reduction);
//! }
//! # Ok::<(), pestlin_rs::PestError>(())
//! ```

// Public modules
pub mod error;
pub mod matrix;
pub mod pst;
pub mod schur;

mod utils;

// Re-exports for convenience
pub use error::{PestError, Result};
pub use matrix::{Cov, NamedMatrix, PriorCovarianceConfig};
pub use pst::ControlFile;
pub use schur::Schur;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
