//! The `* regularisation` block.

use crate::pst::format::{parse_float, parse_int, sci, short_float};
use serde::{Deserialize, Serialize};

/// Regularisation-mode settings.
///
/// `phimlim` and `phimaccept` are informational once loaded: the writer
/// replaces them with the non-zero weighted observation count and 1.15 times
/// that count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegularizationConfig {
    pub phimlim: f64,
    pub phimaccept: f64,
    /// Initial regularisation weight factor. Default: 1.0
    pub wfinit: f64,
    /// Default: 1e-10
    pub wfmin: f64,
    /// Default: 1e10
    pub wfmax: f64,
    /// Prior information is linear in the parameters. Default: true
    pub linreg: bool,
    /// Keep going once the measurement objective target is met. Default: true
    pub regcontinue: bool,
    /// Default: 1.3
    pub wffac: f64,
    /// Default: 1e-2
    pub wftol: f64,
    /// Default: 1
    pub iregadj: i64,
    /// Optional trailing tokens of the first and third lines (FRACPHIM,
    /// MEMSAVE, NOPTREGADJ and so on), named `lineN_fieldM` and written back
    /// unchanged.
    #[serde(default)]
    pub extra_fields: Vec<(String, String)>,
}

impl Default for RegularizationConfig {
    fn default() -> Self {
        Self {
            phimlim: 0.0,
            phimaccept: 0.0,
            wfinit: 1.0,
            wfmin: 1e-10,
            wfmax: 1e10,
            linreg: true,
            regcontinue: true,
            wffac: 1.3,
            wftol: 1e-2,
            iregadj: 1,
            extra_fields: Vec::new(),
        }
    }
}

impl RegularizationConfig {
    /// Parse the lines following the `* regularisation` header.
    ///
    /// Errors carry the zero-based index of the offending line within the block.
    pub fn parse_lines<S: AsRef<str>>(lines: &[S]) -> Result<Self, (usize, String)> {
        if lines.len() < 3 {
            return Err((
                lines.len(),
                format!("regularisation needs 3 lines, found {}", lines.len()),
            ));
        }
        let tokens: Vec<Vec<&str>> = lines
            .iter()
            .take(3)
            .map(|l| l.as_ref().split_whitespace().collect())
            .collect();

        let float = |line: usize, pos: usize, name: &str| -> Result<f64, (usize, String)> {
            let token = tokens[line]
                .get(pos)
                .ok_or_else(|| (line, format!("missing value for {}", name)))?;
            parse_float(token)
                .ok_or_else(|| (line, format!("'{}' is not a valid number for {}", token, name)))
        };

        let mut config = Self {
            phimlim: float(0, 0, "phimlim")?,
            phimaccept: float(0, 1, "phimaccept")?,
            wfinit: float(1, 0, "wfinit")?,
            wfmin: float(1, 1, "wfmin")?,
            wfmax: float(1, 2, "wfmax")?,
            wffac: float(2, 0, "wffac")?,
            wftol: float(2, 1, "wftol")?,
            ..Self::default()
        };

        for token in tokens[1].iter().skip(3) {
            match token.to_lowercase().as_str() {
                "linreg" => config.linreg = true,
                "nonlinreg" => config.linreg = false,
                "continue" => config.regcontinue = true,
                "nocontinue" => config.regcontinue = false,
                other => return Err((1, format!("unknown regularisation flag '{}'", other))),
            }
        }

        if let Some(token) = tokens[2].get(2) {
            config.iregadj = parse_int(token)
                .ok_or_else(|| (2, format!("'{}' is not a valid integer for iregadj", token)))?;
        }

        for (line, known) in [(0, 2), (2, 3)] {
            for (j, token) in tokens[line].iter().enumerate().skip(known) {
                config
                    .extra_fields
                    .push((format!("line{}_field{}", line + 1, j + 1), token.to_string()));
            }
        }
        Ok(config)
    }

    fn extra_tokens(&self, line: usize) -> String {
        let prefix = format!("line{}_", line);
        self.extra_fields
            .iter()
            .filter(|(name, _)| name.starts_with(&prefix))
            .map(|(_, value)| format!(" {}", value))
            .collect()
    }

    /// Section lines, header included, with the objective target set to `nnz_obs`.
    pub fn to_lines(&self, nnz_obs: usize) -> Vec<String> {
        let phimlim = nnz_obs as f64;
        vec![
            "* regularisation".to_string(),
            format!(
                "{:>15} {:>15}{}",
                sci(phimlim, 6),
                sci(phimlim * 1.15, 6),
                self.extra_tokens(1)
            ),
            format!(
                "{} {} {} {} {}",
                short_float(self.wfinit),
                short_float(self.wfmin),
                short_float(self.wfmax),
                if self.linreg { "linreg" } else { "nonlinreg" },
                if self.regcontinue { "continue" } else { "nocontinue" }
            ),
            format!(
                "{} {} {}{}",
                short_float(self.wffac),
                short_float(self.wftol),
                self.iregadj,
                self.extra_tokens(3)
            ),
        ]
    }
}
