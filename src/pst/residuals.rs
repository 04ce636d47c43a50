//! Residual (`.res` / `.rei`) file reader.
//!
//! Both files are whitespace-delimited tables preceded by free-form preamble
//! lines. The table header is the first line containing the token `name`.

use crate::error::{PestError, Result};
use crate::pst::format::parse_float;
use crate::pst::records::ResidualRecord;
use crate::utils::normalize_name;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Load residuals from a file.
///
/// # Errors
///
/// * `PestError::MissingFile` if `path` does not exist
/// * `PestError::Format` if the header or any row is malformed
pub fn load_residuals<P: AsRef<Path>>(path: P) -> Result<Vec<ResidualRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(PestError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    let text = fs::read_to_string(path)?;
    parse_residuals(&text, &path.display().to_string())
}

/// Parse residual file text. `source_name` is used in error messages.
pub fn parse_residuals(text: &str, source_name: &str) -> Result<Vec<ResidualRecord>> {
    let format_error = |line: usize, message: String| PestError::Format {
        source_name: source_name.to_string(),
        section: "residuals".to_string(),
        line,
        message,
    };

    let mut lines = text.lines().enumerate();
    let (header_line, columns) = loop {
        match lines.next() {
            Some((i, line)) => {
                let tokens: Vec<String> = line.split_whitespace().map(normalize_name).collect();
                if tokens.iter().any(|t| t == "name") {
                    break (i + 1, tokens);
                }
            }
            None => {
                return Err(format_error(
                    0,
                    "no header line containing 'name' was found".to_string(),
                ))
            }
        }
    };

    let column = |name: &str| columns.iter().position(|c| c == name);
    let required = |name: &str| {
        column(name).ok_or_else(|| {
            format_error(header_line, format!("required column '{}' is missing", name))
        })
    };
    let name_col = required("name")?;
    let group_col = required("group")?;
    let residual_col = required("residual")?;
    let measured_col = column("measured");
    let modelled_col = column("modelled");
    let weight_col = column("weight");

    let mut records = Vec::new();
    let mut seen = HashSet::new();
    for (i, line) in lines {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.is_empty() {
            continue;
        }
        if tokens.len() < columns.len() {
            return Err(format_error(
                i + 1,
                format!(
                    "expected {} columns, found {}",
                    columns.len(),
                    tokens.len()
                ),
            ));
        }

        let number = |col: usize| {
            let token = tokens[col];
            if token.eq_ignore_ascii_case("na") {
                return Ok(f64::NAN);
            }
            parse_float(token).ok_or_else(|| {
                format_error(
                    i + 1,
                    format!("'{}' is not a valid number for column '{}'", token, columns[col]),
                )
            })
        };
        let optional = |col: Option<usize>| col.map(&number).transpose();

        let name = normalize_name(tokens[name_col]);
        if !seen.insert(name.clone()) {
            return Err(format_error(
                i + 1,
                format!("duplicate residual entry '{}'", name),
            ));
        }

        records.push(ResidualRecord {
            name,
            group: normalize_name(tokens[group_col]),
            measured: optional(measured_col)?.unwrap_or(f64::NAN),
            modelled: optional(modelled_col)?.unwrap_or(f64::NAN),
            residual: number(residual_col)?,
            weight: optional(weight_col)?,
        });
    }

    log::debug!("read {} residuals from {}", records.len(), source_name);
    Ok(records)
}
