//! # Schur-Complement Uncertainty Analysis
//!
//! First-order (linear) Bayesian uncertainty propagation. Given a Jacobian
//! `J` (observations x parameters), a parameter prior covariance `C_p` and an
//! observation noise covariance `C_o`, the posterior parameter covariance is
//!
//! ```text
//!   C_post = (J^T * C_o^-1 * J + C_p^-1)^-1
//! ```
//!
//! and the variance of a linear forecast `y` (a parameter-indexed vector) is
//! `y^T * C * y` for the prior or posterior `C`.
//!
//! Derived quantities are computed on first use and cached for the lifetime
//! of the [`Schur`] instance, which never changes after construction.
//!
//! ## Example
//!
//! ```
//! use ndarray::array;
//! use pestlin_rs::matrix::{Cov, NamedMatrix};
//! use pestlin_rs::schur::Schur;
//!
//! let jco = NamedMatrix::new(
//!     array![[1.0, 0.5], [0.2, 1.0], [0.3, 0.3]],
//!     &["o1", "o2", "o3"],
//!     &["p1", "p2"],
//! )?;
//! let schur = Schur::new(jco, Cov::identity(&["p1", "p2"])?, Cov::identity(&["o1", "o2", "o3"])?)?
//!     .with_forecast_names(&["o3"])?;
//!
//! for row in schur.get_forecast_summary()? {
//!     assert!(row.post_var <= row.prior_var);
//! }
//! # Ok::<(), pestlin_rs::PestError>(())
//! ```

mod analysis;

pub use analysis::{ContributionCase, ImportanceCase, BASE_CASE};

use crate::error::{PestError, Result};
use crate::matrix::{Cov, NamedMatrix, PriorCovarianceConfig};
use crate::pst::ControlFile;
use crate::utils::normalize_name;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::collections::HashSet;

/// Forecast variances in forecast order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastVariances(Vec<(String, f64)>);

impl ForecastVariances {
    pub fn get(&self, name: &str) -> Option<f64> {
        let name = normalize_name(name);
        self.0.iter().find(|(n, _)| *n == name).map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn names(&self) -> Vec<String> {
        self.0.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Prior and posterior variance of one parameter or forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertaintySummary {
    pub name: String,
    pub prior_var: f64,
    pub post_var: f64,
    /// `100 * (1 - post_var / prior_var)`, or 0 when the prior variance is
    /// zero and there is nothing to reduce
    pub percent_reduction: f64,
}

impl UncertaintySummary {
    fn new(name: &str, prior_var: f64, post_var: f64) -> Self {
        let percent_reduction = if prior_var > 0.0 {
            100.0 * (1.0 - post_var / prior_var)
        } else {
            0.0
        };
        Self {
            name: name.to_string(),
            prior_var,
            post_var,
            percent_reduction,
        }
    }
}

/// Schur-complement uncertainty engine.
#[derive(Debug, Clone)]
pub struct Schur {
    jco: NamedMatrix,
    parcov: Cov,
    obscov: Cov,
    predictions: Vec<NamedMatrix>,
    pst: Option<ControlFile>,
    posterior_parameter: OnceCell<Cov>,
    prior_prediction: OnceCell<ForecastVariances>,
    posterior_prediction: OnceCell<ForecastVariances>,
}

impl Schur {
    /// Create an engine over a Jacobian and the two covariances.
    ///
    /// The covariances are reduced to the Jacobian's parameter and
    /// observation names, in Jacobian order.
    ///
    /// # Arguments
    ///
    /// * `jco` - Jacobian with observation rows and parameter columns
    /// * `parcov` - Prior parameter covariance covering every Jacobian column
    /// * `obscov` - Observation noise covariance covering every Jacobian row
    ///
    /// # Errors
    ///
    /// * `PestError::Referential` if a Jacobian name is missing from a covariance
    pub fn new(jco: NamedMatrix, parcov: Cov, obscov: Cov) -> Result<Self> {
        let parcov = parcov.get(jco.col_names())?;
        let obscov = obscov.get(jco.row_names())?;
        log::debug!(
            "schur: jacobian {} obs x {} pars",
            jco.shape().0,
            jco.shape().1
        );
        Ok(Self {
            jco,
            parcov,
            obscov,
            predictions: Vec::new(),
            pst: None,
            posterior_parameter: OnceCell::new(),
            prior_prediction: OnceCell::new(),
            posterior_prediction: OnceCell::new(),
        })
    }

    /// Build both covariances from a control file: the parameter prior from
    /// the parameter bounds, the observation noise from the weights.
    pub fn from_control_file(jco: NamedMatrix, pst: ControlFile) -> Result<Self> {
        let parcov = Cov::from_parameter_bounds(&pst.parameter_data, &PriorCovarianceConfig::default())?;
        let obscov = Cov::from_observation_weights(&pst.observation_data)?;
        Ok(Self::new(jco, parcov, obscov)?.with_control_file(pst))
    }

    /// Attach the control file used for group-based analyses.
    pub fn with_control_file(mut self, pst: ControlFile) -> Self {
        self.pst = Some(pst);
        self
    }

    /// Set the forecast vectors.
    ///
    /// Each prediction is a single-column matrix whose rows cover the
    /// Jacobian's parameters and whose column name is the forecast name.
    pub fn with_predictions(mut self, predictions: Vec<NamedMatrix>) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut aligned = Vec::with_capacity(predictions.len());
        for pred in predictions {
            if pred.shape().1 != 1 {
                return Err(PestError::DimensionMismatch(format!(
                    "prediction vectors must have one column, found {}",
                    pred.shape().1
                )));
            }
            let name = pred.col_names()[0].clone();
            if !seen.insert(name.clone()) {
                return Err(PestError::referential(format!(
                    "duplicate forecast '{}'",
                    name
                )));
            }
            aligned.push(pred.get_rows(self.jco.col_names())?);
        }
        self.predictions = aligned;
        self.reset_cache();
        Ok(self)
    }

    /// Use Jacobian rows as forecast vectors.
    pub fn with_forecast_names<S: AsRef<str>>(self, names: &[S]) -> Result<Self> {
        let rows = self.jco.get_rows(names)?;
        let predictions = rows
            .row_names()
            .iter()
            .map(|name| {
                let single = rows.get_rows(&[name])?;
                Ok(single.transpose())
            })
            .collect::<Result<Vec<_>>>()?;
        self.with_predictions(predictions)
    }

    fn reset_cache(&mut self) {
        self.posterior_parameter = OnceCell::new();
        self.prior_prediction = OnceCell::new();
        self.posterior_prediction = OnceCell::new();
    }

    pub fn jco(&self) -> &NamedMatrix {
        &self.jco
    }

    pub fn parcov(&self) -> &Cov {
        &self.parcov
    }

    pub fn obscov(&self) -> &Cov {
        &self.obscov
    }

    pub fn predictions(&self) -> &[NamedMatrix] {
        &self.predictions
    }

    pub fn pst(&self) -> Option<&ControlFile> {
        self.pst.as_ref()
    }

    pub fn forecast_names(&self) -> Vec<String> {
        self.predictions
            .iter()
            .map(|p| p.col_names()[0].clone())
            .collect()
    }

    /// Posterior parameter covariance `(J^T * C_o^-1 * J + C_p^-1)^-1`.
    ///
    /// # Errors
    ///
    /// * `PestError::LinearAlgebra` if a covariance or the combined
    ///   information matrix is singular
    pub fn posterior_parameter(&self) -> Result<&Cov> {
        if let Some(post) = self.posterior_parameter.get() {
            return Ok(post);
        }

        log::info!(
            "computing Schur complement over {} parameters and {} observations",
            self.jco.shape().1,
            self.jco.shape().0
        );
        let weighted = self.obscov.inv()?.dot(&self.jco)?;
        let information = self.jco.transpose().dot(&weighted)?;
        let prior_information = self.parcov.inv()?.to_matrix();
        let posterior = information.add(&prior_information)?.inv()?;
        let posterior = Cov::from_matrix(&posterior)?;

        Ok(self.posterior_parameter.get_or_init(|| posterior))
    }

    fn propagate(&self, cov: &Cov) -> Result<ForecastVariances> {
        let mut variances = Vec::with_capacity(self.predictions.len());
        for pred in &self.predictions {
            variances.push((pred.col_names()[0].clone(), cov.quadratic_form(pred)?));
        }
        Ok(ForecastVariances(variances))
    }

    /// Prior forecast variances `y^T * C_p * y`. Empty without predictions.
    pub fn prior_prediction(&self) -> Result<&ForecastVariances> {
        if let Some(prior) = self.prior_prediction.get() {
            return Ok(prior);
        }
        let prior = self.propagate(&self.parcov)?;
        Ok(self.prior_prediction.get_or_init(|| prior))
    }

    /// Posterior forecast variances `y^T * C_post * y`. Empty without predictions.
    pub fn posterior_prediction(&self) -> Result<&ForecastVariances> {
        if let Some(post) = self.posterior_prediction.get() {
            return Ok(post);
        }
        if self.predictions.is_empty() {
            return Ok(self.posterior_prediction.get_or_init(ForecastVariances::default));
        }
        log::info!("propagating posterior to {} forecasts", self.predictions.len());
        let post = self.propagate(self.posterior_parameter()?)?;
        Ok(self.posterior_prediction.get_or_init(|| post))
    }

    /// Alias of [`prior_prediction`](Self::prior_prediction).
    pub fn prior_forecast(&self) -> Result<&ForecastVariances> {
        self.prior_prediction()
    }

    /// Alias of [`posterior_prediction`](Self::posterior_prediction).
    pub fn posterior_forecast(&self) -> Result<&ForecastVariances> {
        self.posterior_prediction()
    }

    /// Prior and posterior variance of every parameter, in Jacobian column order.
    pub fn get_parameter_summary(&self) -> Result<Vec<UncertaintySummary>> {
        let post = self.posterior_parameter()?;
        let prior_var = self.parcov.get(post.names())?.diagonal();
        let post_var = post.diagonal();

        Ok(post
            .names()
            .iter()
            .zip(prior_var.iter().zip(post_var.iter()))
            .map(|(name, (&pr, &pt))| UncertaintySummary::new(name, pr, pt))
            .collect())
    }

    /// Prior and posterior variance of every forecast, in forecast order.
    pub fn get_forecast_summary(&self) -> Result<Vec<UncertaintySummary>> {
        let prior = self.prior_prediction()?;
        let post = self.posterior_prediction()?;
        Ok(prior
            .iter()
            .zip(post.iter())
            .map(|((name, pr), (_, pt))| UncertaintySummary::new(name, pr, pt))
            .collect())
    }
}
