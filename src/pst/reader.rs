//! Control-file reader.
//!
//! Sections are read strictly in order. Each counted section consumes exactly
//! the number of rows declared in the control data; a header appearing early,
//! or a row left over before the next header, is a format error.

use crate::error::{PestError, Result};
use crate::pst::control_data::ControlScalars;
use crate::pst::format::{parse_float, parse_int};
use crate::pst::prior::PriorEquation;
use crate::pst::records::{
    FilePair, ObservationRecord, ParameterGroupRecord, ParameterRecord, PriorInformationRecord,
    Transform,
};
use crate::pst::regularization::RegularizationConfig;
use crate::utils::normalize_name;
use std::collections::HashSet;

/// Everything read from a control file, section by section.
#[derive(Debug, Clone)]
pub(crate) struct PstSections {
    pub control_data: ControlScalars,
    pub other_lines: Vec<String>,
    pub parameter_groups: Vec<ParameterGroupRecord>,
    pub parameter_data: Vec<ParameterRecord>,
    pub tied_lines: Vec<String>,
    pub observation_data: Vec<ObservationRecord>,
    pub model_command: Vec<String>,
    pub templates: Vec<FilePair>,
    pub instructions: Vec<FilePair>,
    pub prior_information: Vec<PriorInformationRecord>,
    pub regularization: Option<RegularizationConfig>,
}

/// Line cursor that knows which section it is in, for error reporting.
struct LineCursor<'a> {
    lines: Vec<&'a str>,
    pos: usize,
    source_name: &'a str,
    section: &'static str,
}

impl<'a> LineCursor<'a> {
    fn new(text: &'a str, source_name: &'a str) -> Self {
        Self {
            lines: text.lines().collect(),
            pos: 0,
            source_name,
            section: "header",
        }
    }

    /// Format error at a 1-based line number.
    fn error_at(&self, line: usize, message: impl Into<String>) -> PestError {
        PestError::Format {
            source_name: self.source_name.to_string(),
            section: self.section.to_string(),
            line,
            message: message.into(),
        }
    }

    /// Format error at the most recently consumed line.
    fn error(&self, message: impl Into<String>) -> PestError {
        self.error_at(self.pos.max(1), message)
    }

    fn next_line(&mut self) -> Option<&'a str> {
        let line = self.lines.get(self.pos).copied();
        if line.is_some() {
            self.pos += 1;
        }
        line
    }

    fn peek(&self) -> Option<&'a str> {
        self.lines.get(self.pos).copied()
    }

    fn expect_line(&mut self) -> Result<&'a str> {
        match self.next_line() {
            Some(line) => Ok(line),
            None => Err(self.error_at(self.pos + 1, "unexpected end of input")),
        }
    }

    /// Consume the next non-blank line, which must be a header naming `name`.
    fn expect_header(&mut self, name: &'static str) -> Result<()> {
        self.section = name;
        loop {
            let line = self.expect_line()?;
            if line.trim().is_empty() {
                continue;
            }
            if is_header(line, name) {
                log::debug!("{}: reading '{}' at line {}", self.source_name, name, self.pos);
                return Ok(());
            }
            return Err(self.error(format!(
                "expected header '* {}', found '{}'",
                name,
                line.trim()
            )));
        }
    }

    /// Skip blank lines and return the next line without consuming it.
    fn peek_nonblank(&mut self) -> Option<&'a str> {
        while let Some(line) = self.peek() {
            if !line.trim().is_empty() {
                return Some(line);
            }
            self.pos += 1;
        }
        None
    }

    /// After `count` declared rows, the section must end: only a header or
    /// the end of input may follow.
    fn expect_section_end(&mut self, count: usize) -> Result<()> {
        match self.peek_nonblank() {
            Some(line) if !line.trim_start().starts_with('*') => {
                self.pos += 1;
                Err(self.error(format!(
                    "found row '{}' after the {} declared rows",
                    line.trim(),
                    count
                )))
            }
            _ => Ok(()),
        }
    }

    /// Exactly `count` non-blank data rows with their 1-based line numbers.
    fn data_rows(&mut self, count: usize) -> Result<Vec<(usize, &'a str)>> {
        let mut rows = Vec::with_capacity(count);
        while rows.len() < count {
            let line = match self.next_line() {
                Some(line) => line,
                None => {
                    return Err(self.error_at(
                        self.pos + 1,
                        format!(
                            "end of input after {} of {} declared rows",
                            rows.len(),
                            count
                        ),
                    ))
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            if line.trim_start().starts_with('*') {
                return Err(self.error(format!(
                    "found header '{}' after {} of {} declared rows",
                    line.trim(),
                    rows.len(),
                    count
                )));
            }
            rows.push((self.pos, line));
        }
        Ok(rows)
    }

    /// Exactly `count` lines kept verbatim.
    fn raw_lines(&mut self, count: usize) -> Result<Vec<String>> {
        let mut lines = Vec::with_capacity(count);
        for _ in 0..count {
            let line = self.expect_line()?;
            if line.trim_start().starts_with('*') {
                return Err(self.error(format!(
                    "found header '{}' after {} of {} expected lines",
                    line.trim(),
                    lines.len(),
                    count
                )));
            }
            lines.push(line.trim_end().to_string());
        }
        Ok(lines)
    }
}

fn is_header(line: &str, name: &str) -> bool {
    let line = line.trim_start();
    line.starts_with('*') && line.to_lowercase().contains(name)
}

/// Tokens of one data row, with typed accessors that report the row's line.
struct Row<'c, 'a> {
    cursor: &'c LineCursor<'a>,
    line: usize,
    tokens: Vec<&'a str>,
}

impl<'c, 'a> Row<'c, 'a> {
    fn new(cursor: &'c LineCursor<'a>, line: usize, text: &'a str) -> Self {
        Self {
            cursor,
            line,
            tokens: text.split_whitespace().collect(),
        }
    }

    fn error(&self, message: impl Into<String>) -> PestError {
        self.cursor.error_at(self.line, message)
    }

    fn expect_len(&self, min: usize, max: usize) -> Result<()> {
        let n = self.tokens.len();
        if n < min || n > max {
            let expected = if min == max {
                format!("{}", min)
            } else {
                format!("{} to {}", min, max)
            };
            return Err(self.error(format!("expected {} values, found {}", expected, n)));
        }
        Ok(())
    }

    fn text(&self, i: usize) -> String {
        self.tokens.get(i).map(|t| normalize_name(t)).unwrap_or_default()
    }

    fn float(&self, i: usize, field: &str) -> Result<f64> {
        let token = self.tokens.get(i).copied().unwrap_or("");
        parse_float(token)
            .ok_or_else(|| self.error(format!("'{}' is not a valid number for {}", token, field)))
    }

    fn int(&self, i: usize, field: &str) -> Result<i64> {
        let token = self.tokens.get(i).copied().unwrap_or("");
        parse_int(token)
            .ok_or_else(|| self.error(format!("'{}' is not a valid integer for {}", token, field)))
    }

    fn optional_float(&self, i: usize, field: &str) -> Result<Option<f64>> {
        if i < self.tokens.len() {
            self.float(i, field).map(Some)
        } else {
            Ok(None)
        }
    }
}

fn check_unique(
    cursor: &LineCursor<'_>,
    seen: &mut HashSet<String>,
    name: &str,
    line: usize,
    kind: &str,
) -> Result<()> {
    if !seen.insert(name.to_string()) {
        return Err(cursor.error_at(line, format!("duplicate {} '{}'", kind, name)));
    }
    Ok(())
}

/// Parse control-file text. `source_name` is used in error messages.
pub(crate) fn read_pst(text: &str, source_name: &str) -> Result<PstSections> {
    let mut cursor = LineCursor::new(text, source_name);

    let first = cursor.expect_line()?;
    if !first.trim().to_lowercase().starts_with("pcf") {
        return Err(cursor.error(format!("expected 'pcf' on the first line, found '{}'", first.trim())));
    }

    // control data: every line up to the next header
    cursor.expect_header("control data")?;
    let control_start = cursor.pos + 1;
    let mut control_lines = Vec::new();
    let mut next_header = None;
    while let Some(line) = cursor.next_line() {
        if line.trim_start().starts_with('*') {
            next_header = Some(line);
            break;
        }
        if !line.trim().is_empty() {
            control_lines.push(line);
        }
    }
    let control_data = ControlScalars::parse_lines(&control_lines)
        .map_err(|(i, message)| cursor.error_at(control_start + i, message))?;
    let header = next_header.ok_or_else(|| cursor.error("end of input in control data"))?;

    // pass-through lines up to the parameter groups header
    cursor.section = "parameter groups";
    let mut other_lines = Vec::new();
    let mut line = header;
    while !is_header(line, "parameter groups") {
        other_lines.push(line.trim_end().to_string());
        line = cursor
            .next_line()
            .ok_or_else(|| cursor.error("end of input before '* parameter groups' section"))?;
    }
    if !other_lines.is_empty() {
        log::debug!("{}: keeping {} pass-through lines", source_name, other_lines.len());
    }

    let parameter_groups = read_parameter_groups(&mut cursor, control_data.npargp())?;

    cursor.expect_header("parameter data")?;
    let parameter_data = read_parameter_data(&mut cursor, control_data.npar())?;

    let declared: HashSet<&str> = parameter_groups.iter().map(|g| g.name.as_str()).collect();
    for par in &parameter_data {
        if !declared.contains(par.group.as_str()) {
            log::warn!(
                "{}: parameter '{}' uses undeclared group '{}'",
                source_name,
                par.name,
                par.group
            );
        }
    }

    let ntied = parameter_data
        .iter()
        .filter(|p| p.transform == Transform::Tied)
        .count();
    let tied_lines = cursor.raw_lines(ntied)?;

    cursor.expect_header("observation groups")?;
    cursor.data_rows(control_data.nobsgp())?;

    cursor.expect_header("observation data")?;
    let observation_data = read_observation_data(&mut cursor, control_data.nobs())?;

    cursor.expect_header("model command line")?;
    let model_command = cursor
        .data_rows(control_data.numcom())?
        .into_iter()
        .map(|(_, line)| line.trim().to_string())
        .collect();

    cursor.expect_header("model input/output")?;
    let templates = read_file_pairs(&mut cursor, control_data.ntplfle())?;
    let instructions = read_file_pairs(&mut cursor, control_data.ninsfle())?;
    cursor.expect_section_end(templates.len() + instructions.len())?;

    let nprior = control_data.nprior();
    let prior_information = if nprior > 0 {
        cursor.expect_header("prior information")?;
        let prior = read_prior_information(&mut cursor, nprior)?;
        cursor.expect_section_end(nprior)?;
        prior
    } else {
        // an empty section may still be present
        if cursor.peek_nonblank().is_some_and(|l| is_header(l, "prior information")) {
            cursor.expect_header("prior information")?;
            cursor.expect_section_end(0)?;
        }
        Vec::new()
    };

    let regularization = read_regularization(&mut cursor)?;

    log::debug!(
        "{}: {} parameters, {} observations, {} prior equations",
        source_name,
        parameter_data.len(),
        observation_data.len(),
        prior_information.len()
    );

    Ok(PstSections {
        control_data,
        other_lines,
        parameter_groups,
        parameter_data,
        tied_lines,
        observation_data,
        model_command,
        templates,
        instructions,
        prior_information,
        regularization,
    })
}

fn read_parameter_groups(
    cursor: &mut LineCursor<'_>,
    count: usize,
) -> Result<Vec<ParameterGroupRecord>> {
    let rows = cursor.data_rows(count)?;
    let mut seen = HashSet::new();
    let mut groups = Vec::with_capacity(count);
    for (line, text) in rows {
        let row = Row::new(cursor, line, text);
        row.expect_len(7, 10)?;
        let name = row.text(0);
        check_unique(cursor, &mut seen, &name, line, "parameter group")?;
        groups.push(ParameterGroupRecord {
            name,
            inctyp: row.text(1),
            derinc: row.float(2, "derinc")?,
            derinclb: row.float(3, "derinclb")?,
            forcen: row.text(4),
            derincmul: row.float(5, "derincmul")?,
            dermthd: row.text(6),
            splitthresh: row.optional_float(7, "splitthresh")?,
            splitreldiff: row.optional_float(8, "splitreldiff")?,
            splitaction: row.tokens.get(9).map(|t| normalize_name(t)),
        });
    }
    Ok(groups)
}

fn read_parameter_data(cursor: &mut LineCursor<'_>, count: usize) -> Result<Vec<ParameterRecord>> {
    let rows = cursor.data_rows(count)?;
    let mut seen = HashSet::new();
    let mut parameters = Vec::with_capacity(count);
    for (line, text) in rows {
        let row = Row::new(cursor, line, text);
        row.expect_len(9, 10)?;
        let name = row.text(0);
        check_unique(cursor, &mut seen, &name, line, "parameter")?;
        let transform = row
            .text(1)
            .parse::<Transform>()
            .map_err(|e| row.error(e))?;
        let dercom = if row.tokens.len() > 9 {
            row.int(9, "dercom")?
        } else {
            1
        };
        parameters.push(ParameterRecord {
            name,
            transform,
            change_limit: row.text(2),
            value: row.float(3, "parval1")?,
            lower_bound: row.float(4, "parlbnd")?,
            upper_bound: row.float(5, "parubnd")?,
            group: row.text(6),
            scale: row.float(7, "scale")?,
            offset: row.float(8, "offset")?,
            dercom,
        });
    }
    Ok(parameters)
}

fn read_observation_data(
    cursor: &mut LineCursor<'_>,
    count: usize,
) -> Result<Vec<ObservationRecord>> {
    let rows = cursor.data_rows(count)?;
    let mut seen = HashSet::new();
    let mut observations = Vec::with_capacity(count);
    for (line, text) in rows {
        let row = Row::new(cursor, line, text);
        row.expect_len(4, 4)?;
        let name = row.text(0);
        check_unique(cursor, &mut seen, &name, line, "observation")?;
        let weight = row.float(2, "weight")?;
        if weight < 0.0 {
            return Err(row.error(format!("observation '{}' has negative weight", name)));
        }
        observations.push(ObservationRecord {
            name,
            value: row.float(1, "obsval")?,
            weight,
            group: row.text(3),
        });
    }
    Ok(observations)
}

fn read_file_pairs(cursor: &mut LineCursor<'_>, count: usize) -> Result<Vec<FilePair>> {
    let rows = cursor.data_rows(count)?;
    let mut pairs = Vec::with_capacity(count);
    for (line, text) in rows {
        let row = Row::new(cursor, line, text);
        row.expect_len(2, 2)?;
        pairs.push(FilePair {
            pest_file: row.tokens[0].to_string(),
            model_file: row.tokens[1].to_string(),
        });
    }
    Ok(pairs)
}

fn read_prior_information(
    cursor: &mut LineCursor<'_>,
    count: usize,
) -> Result<Vec<PriorInformationRecord>> {
    let rows = cursor.data_rows(count)?;
    let mut seen = HashSet::new();
    let mut prior = Vec::with_capacity(count);
    for (line, text) in rows {
        let row = Row::new(cursor, line, text);
        let n = row.tokens.len();
        if n < 4 {
            return Err(row.error(format!(
                "expected label, equation, weight and group, found {} values",
                n
            )));
        }
        let label = row.text(0);
        check_unique(cursor, &mut seen, &label, line, "prior information label")?;
        let equation = row.tokens[1..n - 2].join(" ");
        if let Err(e) = PriorEquation::parse(&equation) {
            log::warn!("prior information '{}': {}", label, e);
        }
        prior.push(PriorInformationRecord {
            label,
            equation,
            weight: row.float(n - 2, "weight")?,
            group: row.text(n - 1),
        });
    }
    Ok(prior)
}

fn read_regularization(cursor: &mut LineCursor<'_>) -> Result<Option<RegularizationConfig>> {
    while let Some(line) = cursor.peek() {
        if is_header(line, "regul") {
            break;
        }
        cursor.next_line();
    }
    if cursor.next_line().is_none() {
        return Ok(None);
    }
    cursor.section = "regularisation";
    let start = cursor.pos + 1;
    let rows = cursor.data_rows(3)?;
    let lines: Vec<&str> = rows.iter().map(|(_, l)| *l).collect();
    RegularizationConfig::parse_lines(&lines)
        .map(Some)
        .map_err(|(i, message)| {
            let line = rows.get(i).map(|(l, _)| *l).unwrap_or(start);
            cursor.error_at(line, message)
        })
}
