//! # PEST Control Files
//!
//! Reading, editing and writing PEST control files (`.pst`) together with
//! their companion residual, parameter value and run record files.

pub mod control_data;
pub mod control_file;
pub mod files;
pub mod format;
pub mod prior;
pub mod records;
pub mod regularization;
pub mod residuals;
pub mod weights;

mod reader;
mod writer;

pub use control_data::{ControlScalars, ControlValue, PestMode, SectionCounts};
pub use control_file::{ControlFile, WeightSummary};
pub use files::{ParValue, IterationPhi};
pub use prior::{EquationError, PriorEquation, PriorTerm};
pub use records::{
    FilePair, ObservationRecord, ParameterGroupRecord, ParameterRecord, PriorInformationRecord,
    ResidualRecord, Transform,
};
pub use regularization::RegularizationConfig;
pub use weights::{GroupMatcher, ProportionalWeights, WeightTarget};
