//! Companion files: parameter value files (`.par`) and run records (`.rec`).

use crate::error::{PestError, Result};
use crate::pst::format::parse_float;
use crate::utils::normalize_name;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// One row of a `.par` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParValue {
    pub name: String,
    pub value: f64,
    pub scale: f64,
    pub offset: f64,
}

/// Phi contribution per observation group, keyed by iteration number (from 1).
pub type IterationPhi = BTreeMap<usize, BTreeMap<String, f64>>;

fn read_existing(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(PestError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    Ok(fs::read_to_string(path)?)
}

/// Read a parameter value file.
///
/// The first line (`single point` / `double point` header) is skipped; each
/// following line holds name, value, scale and offset.
pub fn read_parfile<P: AsRef<Path>>(path: P) -> Result<Vec<ParValue>> {
    let path = path.as_ref();
    let text = read_existing(path)?;
    parse_parfile(&text, &path.display().to_string())
}

/// Parse the text of a parameter value file.
pub fn parse_parfile(text: &str, source_name: &str) -> Result<Vec<ParValue>> {
    let mut values = Vec::new();
    for (i, line) in text.lines().enumerate().skip(1) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        let format_error = |message: String| PestError::Format {
            source_name: source_name.to_string(),
            section: "parameter values".to_string(),
            line: i + 1,
            message,
        };
        if tokens.len() != 4 {
            return Err(format_error(format!(
                "expected name, value, scale and offset, found {} tokens",
                tokens.len()
            )));
        }
        let number = |token: &str| {
            parse_float(token)
                .ok_or_else(|| format_error(format!("'{}' is not a valid number", token)))
        };
        values.push(ParValue {
            name: normalize_name(tokens[0]),
            value: number(tokens[1])?,
            scale: number(tokens[2])?,
            offset: number(tokens[3])?,
        });
    }
    Ok(values)
}

/// Read the per-group phi contributions recorded for each iteration of a run.
pub fn phi_components_from_recfile<P: AsRef<Path>>(path: P) -> Result<IterationPhi> {
    let text = read_existing(path.as_ref())?;
    Ok(parse_recfile(&text))
}

/// Scan run-record text for phi contribution blocks.
///
/// A block starts after a line containing `starting phi for this iteration`
/// and collects the following `contribution to phi` lines. The group name is
/// the third token from the end with quotes removed and the value is the last
/// token. A block is only recorded once a non-matching line closes it.
pub fn parse_recfile(text: &str) -> IterationPhi {
    let mut iterations = IterationPhi::new();
    let mut lines = text.lines();
    let mut iteration = 1;

    while let Some(line) = lines.next() {
        if !line.to_lowercase().contains("starting phi for this iteration") {
            continue;
        }
        let mut contributions = BTreeMap::new();
        for line in lines.by_ref() {
            if !line.to_lowercase().contains("contribution to phi") {
                iterations.insert(iteration, contributions);
                iteration += 1;
                break;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 3 {
                continue;
            }
            let value = match parse_float(tokens[tokens.len() - 1]) {
                Some(v) => v,
                None => {
                    log::warn!("skipping unreadable phi contribution line '{}'", line.trim());
                    continue;
                }
            };
            let group = normalize_name(&tokens[tokens.len() - 3].replace('"', ""));
            contributions.insert(group, value);
        }
    }

    log::debug!("found {} phi component blocks in run record", iterations.len());
    iterations
}
