//! Prior-information equations.
//!
//! An equation is a sum of `coefficient * parameter` terms, where a parameter
//! may be wrapped in `log(...)`, followed by `= value`:
//!
//! ```text
//! 1.0 * log(hk1) - 0.5 * log(hk2) + 2.0 * rch = 1.300000E+00
//! ```

use crate::pst::format::sci;
use nom::{
    bytes::complete::tag_no_case,
    character::complete::{char, multispace0},
    number::complete::double,
    IResult, Parser,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Error that can occur when parsing or evaluating a prior-information equation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EquationError {
    #[error("Failed to parse equation '{equation}': {message}")]
    ParseError { equation: String, message: String },

    #[error("Undefined parameter '{name}' in equation")]
    UndefinedParameter { name: String },

    #[error("Cannot take log of non-positive value {value} for parameter '{name}'")]
    InvalidLog { name: String, value: f64 },
}

/// One `coefficient * [log(]parameter[)]` term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorTerm {
    pub coefficient: f64,
    pub parameter: String,
    /// Term applies to the base-10 logarithm of the parameter
    pub log: bool,
}

/// A parsed prior-information equation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorEquation {
    pub terms: Vec<PriorTerm>,
    pub rhs: f64,
}

impl PriorEquation {
    /// Preferred-value equation for a single parameter: `1.0 * p = value`.
    pub fn preferred_value(parameter: &str, value: f64, log: bool) -> Self {
        Self {
            terms: vec![PriorTerm {
                coefficient: 1.0,
                parameter: parameter.to_lowercase(),
                log,
            }],
            rhs: value,
        }
    }

    /// Parse equation text.
    pub fn parse(input: &str) -> Result<Self, EquationError> {
        match equation_parser(input.trim()) {
            Ok((remainder, eq)) => {
                if remainder.trim().is_empty() {
                    Ok(eq)
                } else {
                    Err(EquationError::ParseError {
                        equation: input.to_string(),
                        message: format!("unexpected trailing text '{}'", remainder.trim()),
                    })
                }
            }
            Err(e) => Err(EquationError::ParseError {
                equation: input.to_string(),
                message: format!("{:?}", e),
            }),
        }
    }

    /// Names of the parameters referenced, in order of first appearance.
    pub fn parameter_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::with_capacity(self.terms.len());
        for term in &self.terms {
            if !names.contains(&term.parameter) {
                names.push(term.parameter.clone());
            }
        }
        names
    }

    /// Left-hand side minus right-hand side for the given parameter values.
    pub fn residual(&self, values: &HashMap<String, f64>) -> Result<f64, EquationError> {
        let mut lhs = 0.0;
        for term in &self.terms {
            let value = values
                .get(&term.parameter)
                .copied()
                .ok_or_else(|| EquationError::UndefinedParameter {
                    name: term.parameter.clone(),
                })?;
            let value = if term.log {
                if value <= 0.0 {
                    return Err(EquationError::InvalidLog {
                        name: term.parameter.clone(),
                        value,
                    });
                }
                value.log10()
            } else {
                value
            };
            lhs += term.coefficient * value;
        }
        Ok(lhs - self.rhs)
    }
}

impl fmt::Display for PriorEquation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            let coefficient = if i == 0 {
                term.coefficient
            } else {
                let op = if term.coefficient < 0.0 { "-" } else { "+" };
                write!(f, " {} ", op)?;
                term.coefficient.abs()
            };
            write!(f, "{} * ", format_coefficient(coefficient))?;
            if term.log {
                write!(f, "log({})", term.parameter)?;
            } else {
                write!(f, "{}", term.parameter)?;
            }
        }
        write!(f, " = {}", sci(self.rhs, 6))
    }
}

fn format_coefficient(c: f64) -> String {
    if c.fract() == 0.0 && c.abs() < 1e15 {
        format!("{:.1}", c)
    } else {
        format!("{}", c)
    }
}

// Parser functions using nom

/// Parse a parameter name: any run of characters that cannot start an operator
/// or bracket. A `-` stays inside the name unless a full term follows it, so
/// `k-1` is one name while `k1-2.0*k2` is two terms.
fn parameter_name(input: &str) -> IResult<&str, String> {
    let mut end = 0;
    for (i, c) in input.char_indices() {
        if c.is_whitespace() || "()*=+".contains(c) {
            break;
        }
        if c == '-' && i > 0 && term(&input[i + 1..]).is_ok() {
            break;
        }
        end = i + c.len_utf8();
    }
    if end == 0 {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::TakeWhile1,
        )));
    }
    Ok((&input[end..], input[..end].to_lowercase()))
}

/// Parse `log(name)`
fn log_parameter(input: &str) -> IResult<&str, String> {
    let (input, _) = tag_no_case("log").parse(input)?;
    let (input, _) = multispace0.parse(input)?;
    let (input, _) = char::<_, nom::error::Error<_>>('(').parse(input)?;
    let (input, _) = multispace0.parse(input)?;
    let (input, name) = parameter_name(input)?;
    let (input, _) = multispace0.parse(input)?;
    let (input, _) = char::<_, nom::error::Error<_>>(')').parse(input)?;
    Ok((input, name))
}

/// Parse `coefficient * parameter` or `coefficient * log(parameter)`
fn term(input: &str) -> IResult<&str, PriorTerm> {
    let (input, _) = multispace0.parse(input)?;
    let (input, coefficient) = double(input)?;
    let (input, _) = multispace0.parse(input)?;
    let (input, _) = char::<_, nom::error::Error<_>>('*').parse(input)?;
    let (input, _) = multispace0.parse(input)?;

    if let Ok((input, parameter)) = log_parameter(input) {
        return Ok((
            input,
            PriorTerm {
                coefficient,
                parameter,
                log: true,
            },
        ));
    }

    let (input, parameter) = parameter_name(input)?;
    Ok((
        input,
        PriorTerm {
            coefficient,
            parameter,
            log: false,
        },
    ))
}

/// Parse the whole equation
fn equation_parser(input: &str) -> IResult<&str, PriorEquation> {
    let (mut input, first) = term(input)?;
    let mut terms = vec![first];

    loop {
        let (after_space, _) = multispace0.parse(input)?;
        let mut plus = char::<_, nom::error::Error<_>>('+');
        let mut minus = char::<_, nom::error::Error<_>>('-');
        let sign = if let Ok((rest, _)) = plus.parse(after_space) {
            Some((rest, 1.0))
        } else if let Ok((rest, _)) = minus.parse(after_space) {
            Some((rest, -1.0))
        } else {
            None
        };

        match sign {
            Some((rest, s)) => {
                let (rest, mut t) = term(rest)?;
                t.coefficient *= s;
                terms.push(t);
                input = rest;
            }
            None => {
                input = after_space;
                break;
            }
        }
    }

    let (input, _) = char::<_, nom::error::Error<_>>('=').parse(input)?;
    let (input, _) = multispace0.parse(input)?;
    let (input, rhs) = double(input)?;
    Ok((input, PriorEquation { terms, rhs }))
}
