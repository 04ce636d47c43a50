//! # Covariance Matrices
//!
//! A symmetric covariance over one ordered set of names, stored either as a
//! diagonal (independent entries) or as a dense matrix. Diagonal storage is
//! kept through sub-setting, inversion and conditioning so large independent
//! priors never have to be densified.

use crate::error::{PestError, Result};
use crate::matrix::named::NamedMatrix;
use crate::pst::records::{ObservationRecord, ParameterRecord, Transform};
use crate::utils::{invert, normalize_name};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Settings for deriving a parameter prior covariance from parameter bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriorCovarianceConfig {
    /// Number of standard deviations spanned by the bound range. Default: 4.0
    pub sigma_range: f64,
}

impl Default for PriorCovarianceConfig {
    fn default() -> Self {
        Self { sigma_range: 4.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum CovValues {
    Diagonal(Array1<f64>),
    Dense(Array2<f64>),
}

/// A covariance matrix bound to an ordered set of names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cov {
    names: Vec<String>,
    values: CovValues,
}

impl Cov {
    /// Identity covariance over `names`.
    pub fn identity<S: AsRef<str>>(names: &[S]) -> Result<Self> {
        Self::from_diagonal(names, Array1::ones(names.len()))
    }

    /// Diagonal covariance from per-name variances.
    pub fn from_diagonal<S: AsRef<str>>(names: &[S], variances: Array1<f64>) -> Result<Self> {
        let names = checked_names(names)?;
        if variances.len() != names.len() {
            return Err(PestError::DimensionMismatch(format!(
                "{} variances given for {} names",
                variances.len(),
                names.len()
            )));
        }
        Ok(Self {
            names,
            values: CovValues::Diagonal(variances),
        })
    }

    /// Dense covariance. The matrix must be square and match `names`.
    pub fn from_dense<S: AsRef<str>>(names: &[S], x: Array2<f64>) -> Result<Self> {
        let names = checked_names(names)?;
        if x.nrows() != names.len() || x.ncols() != names.len() {
            return Err(PestError::DimensionMismatch(format!(
                "covariance of shape {}x{} given {} names",
                x.nrows(),
                x.ncols(),
                names.len()
            )));
        }
        Ok(Self {
            names,
            values: CovValues::Dense(x),
        })
    }

    /// Dense covariance from a named matrix whose rows and columns carry the same names.
    pub fn from_matrix(matrix: &NamedMatrix) -> Result<Self> {
        if matrix.row_names() != matrix.col_names() {
            return Err(PestError::DimensionMismatch(
                "covariance rows and columns must carry the same names in the same order"
                    .to_string(),
            ));
        }
        Self::from_dense(matrix.row_names(), matrix.x().clone())
    }

    /// Observation noise covariance from observation weights.
    ///
    /// Each variance is `1 / weight^2`. A zero weight yields an infinite
    /// variance, which inverts to exactly zero precision.
    pub fn from_observation_weights(observations: &[ObservationRecord]) -> Result<Self> {
        let mut names = Vec::with_capacity(observations.len());
        let mut variances = Array1::zeros(observations.len());
        for (i, obs) in observations.iter().enumerate() {
            if obs.weight < 0.0 || !obs.weight.is_finite() {
                return Err(PestError::structural(format!(
                    "observation '{}' has invalid weight {}",
                    obs.name, obs.weight
                )));
            }
            variances[i] = if obs.weight == 0.0 {
                f64::INFINITY
            } else {
                1.0 / (obs.weight * obs.weight)
            };
            names.push(obs.name.clone());
        }
        Self::from_diagonal(&names, variances)
    }

    /// Parameter prior covariance from parameter bounds.
    ///
    /// Only adjustable parameters are included. The standard deviation is the
    /// bound range divided by `sigma_range`, in log10 space for log-transformed
    /// parameters.
    pub fn from_parameter_bounds(
        parameters: &[ParameterRecord],
        config: &PriorCovarianceConfig,
    ) -> Result<Self> {
        let mut names = Vec::new();
        let mut variances = Vec::new();
        for par in parameters.iter().filter(|p| p.is_adjustable()) {
            let range = match par.transform {
                Transform::Log => {
                    if par.lower_bound <= 0.0 || par.upper_bound <= 0.0 {
                        return Err(PestError::structural(format!(
                            "log-transformed parameter '{}' has a non-positive bound",
                            par.name
                        )));
                    }
                    par.upper_bound.log10() - par.lower_bound.log10()
                }
                _ => par.upper_bound - par.lower_bound,
            };
            let sd = range / config.sigma_range;
            names.push(par.name.clone());
            variances.push(sd * sd);
        }
        Self::from_diagonal(&names, Array1::from_vec(variances))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn is_diagonal(&self) -> bool {
        matches!(self.values, CovValues::Diagonal(_))
    }

    /// The variances, in name order.
    pub fn diagonal(&self) -> Array1<f64> {
        match &self.values {
            CovValues::Diagonal(d) => d.clone(),
            CovValues::Dense(x) => x.diag().to_owned(),
        }
    }

    /// Dense representation as a named matrix.
    pub fn to_matrix(&self) -> NamedMatrix {
        let x = match &self.values {
            CovValues::Diagonal(d) => Array2::from_diag(d),
            CovValues::Dense(x) => x.clone(),
        };
        NamedMatrix::from_parts(x, self.names.clone(), self.names.clone())
    }

    /// Sub-covariance over `names`, in the order given.
    pub fn get<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let idx = self.indices(names)?;
        let new_names: Vec<String> = idx.iter().map(|&i| self.names[i].clone()).collect();
        let values = match &self.values {
            CovValues::Diagonal(d) => CovValues::Diagonal(d.select(Axis(0), &idx)),
            CovValues::Dense(x) => {
                CovValues::Dense(x.select(Axis(0), &idx).select(Axis(1), &idx))
            }
        };
        Ok(Self {
            names: new_names,
            values,
        })
    }

    /// Inverse (precision) matrix.
    ///
    /// Diagonal entries are inverted elementwise; infinite variances become
    /// zero precision.
    pub fn inv(&self) -> Result<Self> {
        let values = match &self.values {
            CovValues::Diagonal(d) => {
                let mut inv = Array1::zeros(d.len());
                for (i, &v) in d.iter().enumerate() {
                    if v == 0.0 {
                        return Err(PestError::LinearAlgebra(format!(
                            "zero variance for '{}' cannot be inverted",
                            self.names[i]
                        )));
                    }
                    inv[i] = if v.is_infinite() { 0.0 } else { 1.0 / v };
                }
                CovValues::Diagonal(inv)
            }
            CovValues::Dense(x) => CovValues::Dense(invert(x, "covariance")?),
        };
        Ok(Self {
            names: self.names.clone(),
            values,
        })
    }

    /// Covariance of the remaining entries given that `names` are known exactly.
    ///
    /// For dense storage this is the Schur complement
    /// `C11 - C12 * inv(C22) * C21`; for diagonal storage the named entries are
    /// simply removed.
    pub fn condition_on<S: AsRef<str>>(&self, names: &[S]) -> Result<Self> {
        let cond_idx = self.indices(names)?;
        let cond: HashSet<usize> = cond_idx.iter().copied().collect();
        let keep_idx: Vec<usize> = (0..self.names.len()).filter(|i| !cond.contains(i)).collect();
        let keep_names: Vec<String> = keep_idx.iter().map(|&i| self.names[i].clone()).collect();

        match &self.values {
            CovValues::Diagonal(_) => self.get(&keep_names),
            CovValues::Dense(x) => {
                let c11 = x.select(Axis(0), &keep_idx).select(Axis(1), &keep_idx);
                let c12 = x.select(Axis(0), &keep_idx).select(Axis(1), &cond_idx);
                let c22 = x.select(Axis(0), &cond_idx).select(Axis(1), &cond_idx);
                let c22_inv = invert(&c22, "conditioning block")?;
                let conditioned = &c11 - &c12.dot(&c22_inv).dot(&c12.t());
                Ok(Self {
                    names: keep_names,
                    values: CovValues::Dense(conditioned),
                })
            }
        }
    }

    /// Left-multiply a named matrix: `self * other`, aligning the rows of
    /// `other` to this covariance's names.
    pub fn dot(&self, other: &NamedMatrix) -> Result<NamedMatrix> {
        let aligned = other.get_rows(&self.names)?;
        let x = match &self.values {
            CovValues::Diagonal(d) => {
                let mut scaled = aligned.x().clone();
                for (mut row, &v) in scaled.axis_iter_mut(Axis(0)).zip(d.iter()) {
                    row.mapv_inplace(|a| a * v);
                }
                scaled
            }
            CovValues::Dense(x) => x.dot(aligned.x()),
        };
        Ok(NamedMatrix::from_parts(
            x,
            self.names.clone(),
            aligned.col_names().to_vec(),
        ))
    }

    /// Quadratic form `v^T * C * v` for a single-column vector indexed by a
    /// subset of this covariance's names.
    pub fn quadratic_form(&self, vector: &NamedMatrix) -> Result<f64> {
        if vector.shape().1 != 1 {
            return Err(PestError::DimensionMismatch(format!(
                "quadratic form requires a single-column vector, found {} columns",
                vector.shape().1
            )));
        }
        let sub = self.get(vector.row_names())?;
        let v = vector.x().column(0);
        let value = match &sub.values {
            CovValues::Diagonal(d) => v.iter().zip(d.iter()).map(|(a, c)| a * a * c).sum(),
            CovValues::Dense(x) => v.dot(&x.dot(&v)),
        };
        Ok(value)
    }

    fn indices<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<usize>> {
        let index: HashMap<&str, usize> = self
            .names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();
        names
            .iter()
            .map(|n| {
                let n = normalize_name(n.as_ref());
                index.get(n.as_str()).copied().ok_or_else(|| {
                    PestError::referential(format!("name '{}' not found in covariance", n))
                })
            })
            .collect()
    }
}

fn checked_names<S: AsRef<str>>(names: &[S]) -> Result<Vec<String>> {
    let mut seen = HashSet::with_capacity(names.len());
    let mut out = Vec::with_capacity(names.len());
    for name in names {
        let name = normalize_name(name.as_ref());
        if !seen.insert(name.clone()) {
            return Err(PestError::referential(format!(
                "duplicate covariance name '{}'",
                name
            )));
        }
        out.push(name);
    }
    Ok(out)
}
