//! # Observation Weight Adjustment
//!
//! Pure functions over observation tables. Each takes the current table and
//! returns a new one; the owning [`ControlFile`](crate::pst::ControlFile)
//! decides when to swap it in.

use crate::error::{PestError, Result};
use crate::pst::prior::PriorEquation;
use crate::pst::records::{
    ObservationRecord, ParameterRecord, PriorInformationRecord, ResidualRecord, Transform,
};
use crate::utils::normalize_name;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Configuration for inversely proportional observation weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProportionalWeights {
    /// Fraction of the observed value treated as its standard deviation. Default: 1.0
    pub fraction_stdev: f64,
    /// Upper limit on any weight. Default: 100.0
    pub wmax: f64,
    /// Leave zero weights at zero. Default: true
    pub leave_zero: bool,
}

impl Default for ProportionalWeights {
    fn default() -> Self {
        Self {
            fraction_stdev: 1.0,
            wmax: 100.0,
            leave_zero: true,
        }
    }
}

/// Which observations a [`WeightTarget`] applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupMatcher {
    ObservationName(String),
    Group(String),
    GroupSuffix(String),
    GroupPrefix(String),
    GroupPhrase(String),
}

impl GroupMatcher {
    pub fn matches(&self, observation: &ObservationRecord) -> bool {
        match self {
            GroupMatcher::ObservationName(name) => observation.name == normalize_name(name),
            GroupMatcher::Group(group) => observation.group == normalize_name(group),
            GroupMatcher::GroupSuffix(suffix) => {
                observation.group.ends_with(&normalize_name(suffix))
            }
            GroupMatcher::GroupPrefix(prefix) => {
                observation.group.starts_with(&normalize_name(prefix))
            }
            GroupMatcher::GroupPhrase(phrase) => {
                observation.group.contains(&normalize_name(phrase))
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            GroupMatcher::ObservationName(s) => format!("observation '{}'", s),
            GroupMatcher::Group(s) => format!("group '{}'", s),
            GroupMatcher::GroupSuffix(s) => format!("group suffix '{}'", s),
            GroupMatcher::GroupPrefix(s) => format!("group prefix '{}'", s),
            GroupMatcher::GroupPhrase(s) => format!("group phrase '{}'", s),
        }
    }
}

/// A requested phi contribution for the observations selected by `matcher`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightTarget {
    pub matcher: GroupMatcher,
    pub phi: f64,
}

impl WeightTarget {
    pub fn new(matcher: GroupMatcher, phi: f64) -> Self {
        Self { matcher, phi }
    }
}

/// Residuals aligned to observations by name.
///
/// Every observation must have a residual entry in the same group. Residual
/// files also list prior-information rows, so entries without a matching
/// observation are ignored and only reported at debug level.
fn aligned_residuals<'a>(
    observations: &[ObservationRecord],
    residuals: &'a [ResidualRecord],
) -> Result<Vec<&'a ResidualRecord>> {
    let by_name: HashMap<&str, &ResidualRecord> =
        residuals.iter().map(|r| (r.name.as_str(), r)).collect();

    if residuals.len() > observations.len() && log::log_enabled!(log::Level::Debug) {
        let known: HashSet<&str> = observations.iter().map(|o| o.name.as_str()).collect();
        let ignored: Vec<&str> = residuals
            .iter()
            .map(|r| r.name.as_str())
            .filter(|n| !known.contains(n))
            .collect();
        log::debug!("ignoring residual entries without an observation: {:?}", ignored);
    }

    observations
        .iter()
        .map(|obs| {
            let res = by_name.get(obs.name.as_str()).copied().ok_or_else(|| {
                PestError::referential(format!(
                    "observation '{}' has no residual entry",
                    obs.name
                ))
            })?;
            if res.group != obs.group {
                return Err(PestError::referential(format!(
                    "observation '{}' is in group '{}' but its residual is in group '{}'",
                    obs.name, obs.group, res.group
                )));
            }
            Ok(res)
        })
        .collect()
}

/// Weighted squared residual sum for each observation group.
///
/// # Errors
///
/// * `PestError::Referential` if any observation is missing from the
///   residuals or sits in a different group there
pub fn group_phi_components(
    observations: &[ObservationRecord],
    residuals: &[ResidualRecord],
) -> Result<BTreeMap<String, f64>> {
    let aligned = aligned_residuals(observations, residuals)?;
    let mut components = BTreeMap::new();
    for (obs, res) in observations.iter().zip(aligned) {
        let contribution = (res.residual * obs.weight).powi(2);
        *components.entry(obs.group.clone()).or_insert(0.0) += contribution;
    }
    Ok(components)
}

/// Number of non-zero weighted observations in each group, as a phi target.
pub fn nnz_targets(observations: &[ObservationRecord]) -> BTreeMap<String, f64> {
    let mut targets = BTreeMap::new();
    for obs in observations {
        let count = targets.entry(obs.group.clone()).or_insert(0.0);
        if obs.weight > 0.0 {
            *count += 1.0;
        }
    }
    targets
}

/// Rescale group weights by `sqrt(target / current)` so each listed group
/// contributes its target.
///
/// `current` holds the phi contribution each group has with the present
/// weights. Groups absent from `targets` are untouched, and so are groups
/// whose current contribution is zero (a warning is logged).
///
/// # Errors
///
/// * `PestError::Referential` if a target names a group with no observations,
///   or if `current` has no entry for a targeted group
/// * `PestError::Structural` if a group has a positive target but no
///   non-zero weighted observation
pub fn rescale_groups(
    observations: &[ObservationRecord],
    current: &BTreeMap<String, f64>,
    targets: &BTreeMap<String, f64>,
) -> Result<Vec<ObservationRecord>> {
    let mut factors: HashMap<&str, f64> = HashMap::new();
    for (group, &target) in targets {
        if target < 0.0 || !target.is_finite() {
            return Err(PestError::structural(format!(
                "invalid phi target {} for group '{}'",
                target, group
            )));
        }
        let members: Vec<&ObservationRecord> =
            observations.iter().filter(|o| &o.group == group).collect();
        if members.is_empty() {
            return Err(PestError::referential(format!(
                "observation group '{}' not found",
                group
            )));
        }
        let nnz = members.iter().filter(|o| o.weight > 0.0).count();
        if nnz == 0 {
            if target > 0.0 {
                return Err(PestError::structural(format!(
                    "group '{}' has no non-zero weighted observations but a phi target of {}",
                    group, target
                )));
            }
            continue;
        }
        let phi = current.get(group).copied().ok_or_else(|| {
            PestError::referential(format!("no phi contribution for group '{}'", group))
        })?;
        if phi <= 0.0 {
            log::warn!(
                "group '{}' contributes zero phi, leaving its weights unchanged instead of targeting {}",
                group,
                target
            );
            continue;
        }
        factors.insert(group.as_str(), (target / phi).sqrt());
    }

    Ok(observations
        .iter()
        .map(|obs| {
            let mut obs = obs.clone();
            if let Some(f) = factors.get(obs.group.as_str()) {
                obs.weight *= f;
            }
            obs
        })
        .collect())
}

/// Rescale the observations selected by each target so the selection
/// contributes the target phi.
///
/// Targets are applied in order; a later target sees the weights produced by
/// earlier ones.
pub fn reweight_to_targets(
    observations: &[ObservationRecord],
    residuals: &[ResidualRecord],
    targets: &[WeightTarget],
) -> Result<Vec<ObservationRecord>> {
    let aligned = aligned_residuals(observations, residuals)?;
    let mut updated = observations.to_vec();

    for target in targets {
        let selected: Vec<usize> = updated
            .iter()
            .enumerate()
            .filter(|(_, o)| target.matcher.matches(o))
            .map(|(i, _)| i)
            .collect();
        if selected.is_empty() {
            return Err(PestError::referential(format!(
                "{} matches no observations",
                target.matcher.describe()
            )));
        }
        let actual: f64 = selected
            .iter()
            .map(|&i| (aligned[i].residual * updated[i].weight).powi(2))
            .sum();
        if actual <= 0.0 {
            return Err(PestError::structural(format!(
                "{} contributes zero phi and cannot be rescaled to {}",
                target.matcher.describe(),
                target.phi
            )));
        }
        let factor = (target.phi / actual).sqrt();
        for i in selected {
            updated[i].weight *= factor;
        }
    }
    Ok(updated)
}

/// Weights inversely proportional to the observed values.
pub fn proportional_weights(
    observations: &[ObservationRecord],
    config: &ProportionalWeights,
) -> Vec<ObservationRecord> {
    observations
        .iter()
        .map(|obs| {
            let mut obs = obs.clone();
            obs.weight = if config.leave_zero && obs.weight == 0.0 {
                0.0
            } else if obs.value == 0.0 {
                config.wmax
            } else {
                config
                    .wmax
                    .min(1.0 / (obs.value.abs() * config.fraction_stdev))
            };
            obs
        })
        .collect()
}

/// One preferred-value equation per adjustable parameter, weight 1.0.
///
/// Log-transformed parameters are regularised on their base-10 logarithm.
pub fn zero_order_tikhonov(
    parameters: &[ParameterRecord],
    group: &str,
) -> Result<Vec<PriorInformationRecord>> {
    let mut prior = Vec::new();
    for par in parameters.iter().filter(|p| p.is_adjustable()) {
        let log = par.transform == Transform::Log;
        let value = if log {
            if par.value <= 0.0 {
                return Err(PestError::structural(format!(
                    "log-transformed parameter '{}' has non-positive value {}",
                    par.name, par.value
                )));
            }
            par.value.log10()
        } else {
            par.value
        };
        let equation = PriorEquation::preferred_value(&par.name, value, log);
        prior.push(PriorInformationRecord::new(
            &par.name,
            &equation.to_string(),
            1.0,
            group,
        ));
    }
    Ok(prior)
}

/// Set each preferred-value weight to the inverse of its parameter's bound
/// range (log10 range for log-transformed parameters).
///
/// Labels that do not name a parameter keep their weight.
pub fn regweights_from_bounds(
    prior: &[PriorInformationRecord],
    parameters: &[ParameterRecord],
) -> Vec<PriorInformationRecord> {
    let by_name: HashMap<&str, &ParameterRecord> =
        parameters.iter().map(|p| (p.name.as_str(), p)).collect();

    prior
        .iter()
        .map(|pi| {
            let mut pi = pi.clone();
            match by_name.get(pi.label.as_str()) {
                Some(par) => {
                    let range = if par.transform == Transform::Log {
                        par.upper_bound.log10() - par.lower_bound.log10()
                    } else {
                        par.upper_bound - par.lower_bound
                    };
                    if range > 0.0 && range.is_finite() {
                        pi.weight = 1.0 / range;
                    } else {
                        log::warn!(
                            "parameter '{}' has a degenerate bound range, keeping weight {}",
                            par.name,
                            pi.weight
                        );
                    }
                }
                None => log::warn!(
                    "prior information '{}' does not correspond to a parameter",
                    pi.label
                ),
            }
            pi
        })
        .collect()
}
