//! The `* control data` block.
//!
//! The block is positional: each line carries a fixed sequence of named
//! fields, some of which are optional at the end of the line. Every field is
//! kept by name so it can be queried or changed, and unknown trailing tokens
//! are carried through unchanged.

use crate::pst::format::{parse_float, parse_int, short_float};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Processing mode (`PESTMODE`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PestMode {
    Estimation,
    Prediction,
    Regularisation,
    Pareto,
}

impl fmt::Display for PestMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PestMode::Estimation => "estimation",
            PestMode::Prediction => "prediction",
            PestMode::Regularisation => "regularisation",
            PestMode::Pareto => "pareto",
        };
        f.write_str(s)
    }
}

impl FromStr for PestMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s.starts_with("estim") {
            Ok(PestMode::Estimation)
        } else if s.starts_with("pred") {
            Ok(PestMode::Prediction)
        } else if s.starts_with("regul") {
            Ok(PestMode::Regularisation)
        } else if s.starts_with("pareto") {
            Ok(PestMode::Pareto)
        } else {
            Err(format!("unknown PESTMODE '{}'", s))
        }
    }
}

/// A control-data value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ControlValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ControlValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ControlValue::Int(i) => Some(*i as f64),
            ControlValue::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ControlValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ControlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlValue::Int(i) => write!(f, "{}", i),
            ControlValue::Float(x) => f.write_str(&short_float(*x)),
            ControlValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Int,
    Float,
    Text,
}

/// Field layout of each control-data line: (name, kind), plus the number of
/// leading fields that must be present.
const LAYOUT: &[(&[(&str, Kind)], usize)] = &[
    (&[("rstfle", Kind::Text), ("pestmode", Kind::Text)], 2),
    (
        &[
            ("npar", Kind::Int),
            ("nobs", Kind::Int),
            ("npargp", Kind::Int),
            ("nprior", Kind::Int),
            ("nobsgp", Kind::Int),
            ("maxcompdim", Kind::Int),
            ("derzerolim", Kind::Float),
        ],
        5,
    ),
    (
        &[
            ("ntplfle", Kind::Int),
            ("ninsfle", Kind::Int),
            ("precis", Kind::Text),
            ("dpoint", Kind::Text),
            ("numcom", Kind::Int),
            ("jacfile", Kind::Int),
            ("messfile", Kind::Int),
            ("obsreref", Kind::Text),
        ],
        4,
    ),
    (
        &[
            ("rlambda1", Kind::Float),
            ("rlamfac", Kind::Float),
            ("phiratsuf", Kind::Float),
            ("phiredlam", Kind::Float),
            ("numlam", Kind::Int),
            ("jacupdate", Kind::Int),
            ("lamforgive", Kind::Text),
            ("derforgive", Kind::Text),
        ],
        5,
    ),
    (
        &[
            ("relparmax", Kind::Float),
            ("facparmax", Kind::Float),
            ("facorig", Kind::Float),
            ("iboundstick", Kind::Int),
            ("upvecbend", Kind::Int),
            ("absparmax", Kind::Float),
        ],
        3,
    ),
    (
        &[
            ("phiredswh", Kind::Float),
            ("noptswitch", Kind::Int),
            ("splitswh", Kind::Float),
            ("doaui", Kind::Text),
            ("dosenreuse", Kind::Text),
            ("boundscale", Kind::Text),
        ],
        1,
    ),
    (
        &[
            ("noptmax", Kind::Int),
            ("phiredstp", Kind::Float),
            ("nphistp", Kind::Int),
            ("nphinored", Kind::Int),
            ("relparstp", Kind::Float),
            ("nrelpar", Kind::Int),
            ("phistopthresh", Kind::Float),
            ("lastrun", Kind::Int),
            ("phiabandon", Kind::Text),
        ],
        6,
    ),
    (
        &[
            ("icov", Kind::Int),
            ("icor", Kind::Int),
            ("ieig", Kind::Int),
            ("ires", Kind::Int),
            ("jcosave", Kind::Text),
            ("verboserec", Kind::Text),
            ("jcosaveitn", Kind::Text),
            ("reisaveitn", Kind::Text),
            ("parsaveitn", Kind::Text),
            ("parsaverun", Kind::Text),
        ],
        3,
    ),
];

/// One named control-data field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlField {
    pub name: String,
    pub value: ControlValue,
}

/// Parsed `* control data` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlScalars {
    lines: Vec<Vec<ControlField>>,
}

impl Default for ControlScalars {
    fn default() -> Self {
        let text = [
            "norestart estimation",
            "0 0 0 0 0",
            "0 0 single point 1 0 0",
            "10.0 -3.0 0.3 0.03 -10",
            "10.0 10.0 0.001",
            "0.1",
            "30 0.005 4 4 0.005 4",
            "1 1 1",
        ];
        let lines = text.iter().map(|l| l.to_string()).collect::<Vec<_>>();
        // The literal above always satisfies the layout.
        Self::parse_lines(&lines).unwrap_or(Self { lines: Vec::new() })
    }
}

impl ControlScalars {
    /// Parse the lines between the `* control data` header and the next header.
    ///
    /// Errors carry the zero-based index of the offending line within the block.
    pub fn parse_lines<S: AsRef<str>>(lines: &[S]) -> Result<Self, (usize, String)> {
        let mut parsed = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            let tokens: Vec<&str> = line.as_ref().split_whitespace().collect();
            let (layout, required): (&[(&str, Kind)], usize) =
                LAYOUT.get(i).copied().unwrap_or((&[], 0));

            if tokens.len() < required {
                return Err((
                    i,
                    format!(
                        "expected at least {} values, found {}",
                        required,
                        tokens.len()
                    ),
                ));
            }

            let mut fields = Vec::with_capacity(tokens.len());
            for (j, token) in tokens.iter().enumerate() {
                let (name, kind) = match layout.get(j) {
                    Some((name, kind)) => (name.to_string(), *kind),
                    None => (format!("line{}_field{}", i + 1, j + 1), Kind::Text),
                };
                let value = match kind {
                    Kind::Int => ControlValue::Int(parse_int(token).ok_or_else(|| {
                        (i, format!("'{}' is not a valid integer for {}", token, name))
                    })?),
                    Kind::Float => ControlValue::Float(parse_float(token).ok_or_else(|| {
                        (i, format!("'{}' is not a valid number for {}", token, name))
                    })?),
                    Kind::Text => ControlValue::Text(token.to_lowercase()),
                };
                fields.push(ControlField { name, value });
            }
            parsed.push(fields);
        }

        if parsed.len() < 3 {
            return Err((
                parsed.len(),
                format!("control data needs at least 3 lines, found {}", parsed.len()),
            ));
        }

        let scalars = Self { lines: parsed };
        if let Some(mode) = scalars.get("pestmode").and_then(ControlValue::as_text) {
            mode.parse::<PestMode>().map_err(|e| (0, e))?;
        }
        Ok(scalars)
    }

    /// Look up a field by name.
    pub fn get(&self, name: &str) -> Option<&ControlValue> {
        let name = name.to_lowercase();
        self.lines
            .iter()
            .flatten()
            .find(|f| f.name == name)
            .map(|f| &f.value)
    }

    /// Set an existing field. Returns `false` if no field carries this name.
    pub fn set(&mut self, name: &str, value: ControlValue) -> bool {
        let name = name.to_lowercase();
        match self.lines.iter_mut().flatten().find(|f| f.name == name) {
            Some(field) => {
                field.value = value;
                true
            }
            None => false,
        }
    }

    fn count(&self, name: &str) -> usize {
        self.get(name)
            .and_then(ControlValue::as_int)
            .map(|i| i.max(0) as usize)
            .unwrap_or(0)
    }

    fn set_count(&mut self, name: &str, value: usize) {
        if !self.set(name, ControlValue::Int(value as i64)) {
            log::warn!("control data has no '{}' field to update", name);
        }
    }

    pub fn pestmode(&self) -> PestMode {
        self.get("pestmode")
            .and_then(ControlValue::as_text)
            .and_then(|s| s.parse().ok())
            .unwrap_or(PestMode::Estimation)
    }

    pub fn set_pestmode(&mut self, mode: PestMode) {
        self.set("pestmode", ControlValue::Text(mode.to_string()));
    }

    pub fn npar(&self) -> usize {
        self.count("npar")
    }

    pub fn nobs(&self) -> usize {
        self.count("nobs")
    }

    pub fn npargp(&self) -> usize {
        self.count("npargp")
    }

    pub fn nprior(&self) -> usize {
        self.count("nprior")
    }

    pub fn nobsgp(&self) -> usize {
        self.count("nobsgp")
    }

    pub fn ntplfle(&self) -> usize {
        self.count("ntplfle")
    }

    pub fn ninsfle(&self) -> usize {
        self.count("ninsfle")
    }

    /// Number of model command lines; 1 when the optional field is absent.
    pub fn numcom(&self) -> usize {
        match self.get("numcom").and_then(ControlValue::as_int) {
            Some(n) => n.max(0) as usize,
            None => 1,
        }
    }

    /// Overwrite the table counts with the sizes actually held in memory.
    pub fn set_counts(&mut self, counts: &SectionCounts) {
        self.set_count("npar", counts.npar);
        self.set_count("nobs", counts.nobs);
        self.set_count("npargp", counts.npargp);
        self.set_count("nprior", counts.nprior);
        self.set_count("nobsgp", counts.nobsgp);
        self.set_count("ntplfle", counts.ntplfle);
        self.set_count("ninsfle", counts.ninsfle);
        if self.get("numcom").is_some() {
            self.set_count("numcom", counts.numcom);
        } else if counts.numcom != 1 {
            // absent NUMCOM reads as 1; the fields before it are all required
            if let Some(line) = self.lines.get_mut(2) {
                line.push(ControlField {
                    name: "numcom".to_string(),
                    value: ControlValue::Int(counts.numcom as i64),
                });
            }
        }
    }

    /// Lines as written to a control file.
    pub fn to_lines(&self) -> Vec<String> {
        self.lines
            .iter()
            .map(|fields| {
                fields
                    .iter()
                    .map(|f| f.value.to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect()
    }
}

/// Table sizes reconciled into the control data before writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SectionCounts {
    pub npar: usize,
    pub nobs: usize,
    pub npargp: usize,
    pub nprior: usize,
    pub nobsgp: usize,
    pub ntplfle: usize,
    pub ninsfle: usize,
    pub numcom: usize,
}
