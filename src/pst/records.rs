//! Typed rows of the control-file tables.
//!
//! All names are stored in canonical lower-case form; constructors normalize
//! whatever they are given.

use crate::utils::normalize_name;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Parameter transformation (`PARTRANS`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    None,
    Log,
    Fixed,
    Tied,
}

impl Transform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transform::None => "none",
            Transform::Log => "log",
            Transform::Fixed => "fixed",
            Transform::Tied => "tied",
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Transform::None),
            "log" => Ok(Transform::Log),
            "fixed" => Ok(Transform::Fixed),
            "tied" => Ok(Transform::Tied),
            other => Err(format!(
                "unknown parameter transform '{}', expected none, log, fixed or tied",
                other
            )),
        }
    }
}

/// One row of the `* parameter groups` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterGroupRecord {
    pub name: String,
    pub inctyp: String,
    pub derinc: f64,
    pub derinclb: f64,
    pub forcen: String,
    pub derincmul: f64,
    pub dermthd: String,
    pub splitthresh: Option<f64>,
    pub splitreldiff: Option<f64>,
    pub splitaction: Option<String>,
}

impl ParameterGroupRecord {
    /// A group with PEST's customary derivative settings.
    pub fn new(name: &str) -> Self {
        Self {
            name: normalize_name(name),
            inctyp: "relative".to_string(),
            derinc: 0.01,
            derinclb: 0.0,
            forcen: "switch".to_string(),
            derincmul: 2.0,
            dermthd: "parabolic".to_string(),
            splitthresh: None,
            splitreldiff: None,
            splitaction: None,
        }
    }
}

/// One row of the `* parameter data` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub name: String,
    pub transform: Transform,
    /// `PARCHGLIM`: relative, factor or absolute(N)
    pub change_limit: String,
    pub value: f64,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub group: String,
    pub scale: f64,
    pub offset: f64,
    /// Index of the model command used for this parameter's derivatives
    pub dercom: i64,
}

impl ParameterRecord {
    /// A log-transformed, factor-limited parameter with unit scale and no offset.
    pub fn new(name: &str, value: f64, lower_bound: f64, upper_bound: f64, group: &str) -> Self {
        Self {
            name: normalize_name(name),
            transform: Transform::Log,
            change_limit: "factor".to_string(),
            value,
            lower_bound,
            upper_bound,
            group: normalize_name(group),
            scale: 1.0,
            offset: 0.0,
            dercom: 1,
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Neither fixed nor tied.
    pub fn is_adjustable(&self) -> bool {
        !matches!(self.transform, Transform::Fixed | Transform::Tied)
    }
}

/// One row of the `* observation data` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub name: String,
    pub value: f64,
    /// Zero means the observation does not contribute to the objective function
    pub weight: f64,
    pub group: String,
}

impl ObservationRecord {
    pub fn new(name: &str, value: f64, weight: f64, group: &str) -> Self {
        Self {
            name: normalize_name(name),
            value,
            weight,
            group: normalize_name(group),
        }
    }
}

/// One prior-information equation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorInformationRecord {
    pub label: String,
    /// Equation text, e.g. `1.0 * log(k1) = 1.0E+00`
    pub equation: String,
    pub weight: f64,
    pub group: String,
}

impl PriorInformationRecord {
    pub fn new(label: &str, equation: &str, weight: f64, group: &str) -> Self {
        Self {
            label: normalize_name(label),
            equation: equation.trim().to_string(),
            weight,
            group: normalize_name(group),
        }
    }
}

/// One row of a residual (`.res` / `.rei`) file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidualRecord {
    pub name: String,
    pub group: String,
    pub measured: f64,
    pub modelled: f64,
    /// modelled - measured, as written by the solver
    pub residual: f64,
    pub weight: Option<f64>,
}

/// A template/input or instruction/output file pair from `* model input/output`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePair {
    /// Template or instruction file
    pub pest_file: String,
    /// Model input or output file
    pub model_file: String,
}
