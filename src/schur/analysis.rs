//! What-if analyses built on reduced Schur problems.
//!
//! * Contribution: parameters become perfectly known. The prior is
//!   conditioned on them and they are removed from the Jacobian and the
//!   forecasts.
//! * Importance: observations are never collected. Their Jacobian rows and
//!   noise entries are removed; the prior and forecasts are untouched.

use super::{ForecastVariances, Schur, UncertaintySummary};
use crate::error::{PestError, Result};
use crate::pst::ControlFile;
use crate::utils::normalize_name;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Case name of the unreduced problem in analysis tables.
pub const BASE_CASE: &str = "base";

/// Forecast uncertainty with one set of parameters treated as known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionCase {
    pub case: String,
    pub forecasts: Vec<UncertaintySummary>,
}

/// Forecast posterior variance with one set of observations removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceCase {
    pub case: String,
    pub posterior: ForecastVariances,
}

/// Lower-case, de-duplicated names in first-seen order, each of which must
/// appear in `available`.
fn resolve_names<S: AsRef<str>>(names: &[S], available: &[String], kind: &str) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut resolved = Vec::new();
    for name in names {
        let name = normalize_name(name.as_ref());
        if !available.contains(&name) {
            return Err(PestError::referential(format!(
                "{} '{}' not found in jacobian",
                kind, name
            )));
        }
        if seen.insert(name.clone()) {
            resolved.push(name);
        }
    }
    Ok(resolved)
}

fn summarize(prior: &ForecastVariances, post: &ForecastVariances) -> Vec<UncertaintySummary> {
    prior
        .iter()
        .zip(post.iter())
        .map(|((name, pr), (_, pt))| UncertaintySummary::new(name, pr, pt))
        .collect()
}

impl Schur {
    fn require_predictions(&self, analysis: &str) -> Result<()> {
        if self.predictions.is_empty() {
            return Err(PestError::structural(format!(
                "{} requires at least one prediction",
                analysis
            )));
        }
        Ok(())
    }

    fn require_pst(&self) -> Result<&ControlFile> {
        self.pst.as_ref().ok_or_else(|| {
            PestError::structural("group analysis requires an attached control file")
        })
    }

    /// Prior and posterior forecast variances when `par_names` are known exactly.
    ///
    /// # Errors
    ///
    /// * `PestError::Referential` if a name is not a Jacobian column
    /// * `PestError::Structural` if no predictions are set or every parameter is named
    pub fn contribution_from_parameters<S: AsRef<str>>(
        &self,
        par_names: &[S],
    ) -> Result<(ForecastVariances, ForecastVariances)> {
        self.require_predictions("contribution analysis")?;
        let known = resolve_names(par_names, self.jco.col_names(), "parameter")?;
        let known_set: HashSet<&String> = known.iter().collect();
        let keep: Vec<String> = self
            .jco
            .col_names()
            .iter()
            .filter(|n| !known_set.contains(n))
            .cloned()
            .collect();
        if keep.is_empty() {
            return Err(PestError::structural(
                "cannot condition on every parameter in the jacobian",
            ));
        }

        log::debug!("conditioning on {} parameters", known.len());
        let parcov = self.parcov.condition_on(&known)?;
        let jco = self.jco.get_cols(&keep)?;
        let predictions = self
            .predictions
            .iter()
            .map(|p| p.get_rows(&keep))
            .collect::<Result<Vec<_>>>()?;

        let reduced = Schur::new(jco, parcov, self.obscov.clone())?.with_predictions(predictions)?;
        Ok((
            reduced.prior_prediction()?.clone(),
            reduced.posterior_prediction()?.clone(),
        ))
    }

    /// Forecast uncertainty table for each case of known parameters.
    ///
    /// The first row is the [`BASE_CASE`], followed by `cases` in order.
    pub fn get_contribution_dataframe<S: AsRef<str>>(
        &self,
        cases: &[(String, Vec<S>)],
    ) -> Result<Vec<ContributionCase>> {
        self.require_predictions("contribution analysis")?;
        let mut rows = Vec::with_capacity(cases.len() + 1);
        rows.push(ContributionCase {
            case: BASE_CASE.to_string(),
            forecasts: self.get_forecast_summary()?,
        });
        for (case, names) in cases {
            let (prior, post) = self.contribution_from_parameters(names.as_slice())?;
            rows.push(ContributionCase {
                case: case.clone(),
                forecasts: summarize(&prior, &post),
            });
        }
        Ok(rows)
    }

    /// Contribution table with one case per parameter group of the attached
    /// control file, in group-name order.
    pub fn get_contribution_dataframe_groups(&self) -> Result<Vec<ContributionCase>> {
        let pst = self.require_pst()?;
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for par in &pst.parameter_data {
            if self.jco.col_index(&par.name).is_some() {
                groups.entry(par.group.clone()).or_default().push(par.name.clone());
            }
        }
        let cases: Vec<(String, Vec<String>)> = groups.into_iter().collect();
        self.get_contribution_dataframe(cases.as_slice())
    }

    /// Posterior forecast variances when `obs_names` are removed from the data.
    ///
    /// # Errors
    ///
    /// * `PestError::Referential` if a name is not a Jacobian row
    /// * `PestError::Structural` if no predictions are set or every observation is named
    pub fn importance_of_observations<S: AsRef<str>>(&self, obs_names: &[S]) -> Result<ForecastVariances> {
        self.require_predictions("importance analysis")?;
        let dropped = resolve_names(obs_names, self.jco.row_names(), "observation")?;
        let dropped_set: HashSet<&String> = dropped.iter().collect();
        let keep: Vec<String> = self
            .jco
            .row_names()
            .iter()
            .filter(|n| !dropped_set.contains(n))
            .cloned()
            .collect();
        if keep.is_empty() {
            return Err(PestError::structural(
                "cannot remove every observation in the jacobian",
            ));
        }

        log::debug!("removing {} observations", dropped.len());
        let jco = self.jco.get_rows(&keep)?;
        let obscov = self.obscov.get(&keep)?;
        let reduced = Schur::new(jco, self.parcov.clone(), obscov)?
            .with_predictions(self.predictions.clone())?;
        Ok(reduced.posterior_prediction()?.clone())
    }

    /// Posterior forecast table for each case of removed observations.
    ///
    /// Without explicit cases, each non-zero-weight observation is removed on
    /// its own. Weights come from the attached control file when present and
    /// otherwise from the finite, positive entries of the noise covariance.
    pub fn get_importance_dataframe(
        &self,
        cases: Option<&[(String, Vec<String>)]>,
    ) -> Result<Vec<ImportanceCase>> {
        self.require_predictions("importance analysis")?;
        let default_cases;
        let cases = match cases {
            Some(cases) => cases,
            None => {
                default_cases = self
                    .informative_observations()
                    .into_iter()
                    .map(|name| (name.clone(), vec![name]))
                    .collect::<Vec<_>>();
                &default_cases[..]
            }
        };

        let mut rows = Vec::with_capacity(cases.len() + 1);
        rows.push(ImportanceCase {
            case: BASE_CASE.to_string(),
            posterior: self.posterior_prediction()?.clone(),
        });
        for (case, names) in cases {
            rows.push(ImportanceCase {
                case: case.clone(),
                posterior: self.importance_of_observations(names.as_slice())?,
            });
        }
        Ok(rows)
    }

    /// Importance table with one case per observation group of the attached
    /// control file, in group-name order.
    pub fn get_importance_dataframe_groups(&self) -> Result<Vec<ImportanceCase>> {
        let pst = self.require_pst()?;
        let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for obs in &pst.observation_data {
            if self.jco.row_index(&obs.name).is_some() {
                groups.entry(obs.group.clone()).or_default().push(obs.name.clone());
            }
        }
        let cases: Vec<(String, Vec<String>)> = groups.into_iter().collect();
        self.get_importance_dataframe(Some(cases.as_slice()))
    }

    fn informative_observations(&self) -> Vec<String> {
        match &self.pst {
            Some(pst) => pst
                .observation_data
                .iter()
                .filter(|o| o.weight > 0.0 && self.jco.row_index(&o.name).is_some())
                .map(|o| o.name.clone())
                .collect(),
            None => self
                .obscov
                .names()
                .iter()
                .zip(self.obscov.diagonal().iter())
                .filter(|(_, v)| v.is_finite() && **v > 0.0)
                .map(|(n, _)| n.clone())
                .collect(),
        }
    }
}
