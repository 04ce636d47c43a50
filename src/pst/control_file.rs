//! # Control File
//!
//! [`ControlFile`] owns the typed tables of one PEST control file and the
//! lazily loaded residuals that go with it.
//!
//! ## Example
//!
//! ```no_run
//! use pestlin_rs::pst::{ControlFile, ProportionalWeights};
//!
//! let mut pst = ControlFile::load("model.pst")?;
//! println!("phi = {}", pst.phi()?);
//!
//! pst.proportional_weights(&ProportionalWeights::default());
//! pst.write("model_reweighted.pst")?;
//! # Ok::<(), pestlin_rs::PestError>(())
//! ```

use crate::error::{PestError, Result};
use crate::pst::control_data::{ControlScalars, PestMode, SectionCounts};
use crate::pst::files::{phi_components_from_recfile, read_parfile};
use crate::pst::prior::PriorEquation;
use crate::pst::reader::read_pst;
use crate::pst::records::{
    FilePair, ObservationRecord, ParameterGroupRecord, ParameterRecord, PriorInformationRecord,
    ResidualRecord, Transform,
};
use crate::pst::regularization::RegularizationConfig;
use crate::pst::residuals::load_residuals;
use crate::pst::weights::{self, ProportionalWeights, WeightTarget};
use crate::pst::writer::{write_pst, written_observation_groups};
use crate::utils::normalize_name;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Summary statistics of the non-zero observation weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightSummary {
    /// Number of observations with a non-zero weight
    pub nnz: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// A PEST control file held as typed tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ControlFile {
    filename: Option<PathBuf>,
    pub control_data: ControlScalars,
    /// Lines between the control data and parameter groups, kept verbatim
    pub other_lines: Vec<String>,
    pub parameter_groups: Vec<ParameterGroupRecord>,
    pub parameter_data: Vec<ParameterRecord>,
    /// One line per tied parameter, kept verbatim
    pub tied_lines: Vec<String>,
    pub observation_data: Vec<ObservationRecord>,
    pub model_command: Vec<String>,
    pub templates: Vec<FilePair>,
    pub instructions: Vec<FilePair>,
    pub prior_information: Vec<PriorInformationRecord>,
    pub regularization: Option<RegularizationConfig>,
    resfile: Option<PathBuf>,
    #[serde(skip)]
    residuals: OnceCell<Vec<ResidualRecord>>,
}

impl ControlFile {
    /// Load a control file from disk.
    ///
    /// # Errors
    ///
    /// * `PestError::MissingFile` if `path` does not exist
    /// * `PestError::Format` if the text does not follow the control-file layout
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PestError::MissingFile {
                path: path.to_path_buf(),
            });
        }
        let text = fs::read_to_string(path)?;
        let mut pst = Self::parse(&text, &path.display().to_string())?;
        pst.filename = Some(path.to_path_buf());
        log::info!(
            "loaded {}: {} parameters ({} adjustable), {} observations ({} non-zero weight)",
            path.display(),
            pst.npar(),
            pst.npar_adj(),
            pst.nobs(),
            pst.nnz_obs()
        );
        Ok(pst)
    }

    /// Parse control-file text. `source_name` is used in error messages.
    pub fn parse(text: &str, source_name: &str) -> Result<Self> {
        let sections = read_pst(text, source_name)?;
        Ok(Self {
            filename: None,
            control_data: sections.control_data,
            other_lines: sections.other_lines,
            parameter_groups: sections.parameter_groups,
            parameter_data: sections.parameter_data,
            tied_lines: sections.tied_lines,
            observation_data: sections.observation_data,
            model_command: sections.model_command,
            templates: sections.templates,
            instructions: sections.instructions,
            prior_information: sections.prior_information,
            regularization: sections.regularization,
            resfile: None,
            residuals: OnceCell::new(),
        })
    }

    /// The file this instance was loaded from, if any.
    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    pub fn set_filename<P: AsRef<Path>>(&mut self, path: P) {
        self.filename = Some(path.as_ref().to_path_buf());
    }

    /// Render as control-file text.
    pub fn to_pst_string(&self) -> String {
        write_pst(self)
    }

    /// Write to `path`. The counts in the control data are recomputed first.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path.as_ref(), self.to_pst_string())?;
        log::debug!("wrote control file {}", path.as_ref().display());
        Ok(())
    }

    /// Bring the control-data counts in line with the tables.
    pub fn update_control_section(&mut self) {
        let counts = self.counts();
        self.control_data.set_counts(&counts);
    }

    /// Table sizes as they would be written.
    pub fn counts(&self) -> SectionCounts {
        SectionCounts {
            npar: self.parameter_data.len(),
            nobs: self.observation_data.len(),
            npargp: self.parameter_groups.len(),
            nprior: self.prior_information.len(),
            nobsgp: written_observation_groups(self).len(),
            ntplfle: self.templates.len(),
            ninsfle: self.instructions.len(),
            numcom: self.model_command.len(),
        }
    }

    pub fn pestmode(&self) -> PestMode {
        self.control_data.pestmode()
    }

    pub fn npar(&self) -> usize {
        self.parameter_data.len()
    }

    pub fn nobs(&self) -> usize {
        self.observation_data.len()
    }

    pub fn nprior(&self) -> usize {
        self.prior_information.len()
    }

    /// Parameters that are neither fixed nor tied.
    pub fn npar_adj(&self) -> usize {
        self.parameter_data.iter().filter(|p| p.is_adjustable()).count()
    }

    /// Observations with a non-zero weight.
    pub fn nnz_obs(&self) -> usize {
        self.observation_data.iter().filter(|o| o.weight > 0.0).count()
    }

    pub fn par_names(&self) -> Vec<String> {
        self.parameter_data.iter().map(|p| p.name.clone()).collect()
    }

    pub fn adj_par_names(&self) -> Vec<String> {
        self.parameter_data
            .iter()
            .filter(|p| p.is_adjustable())
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn obs_names(&self) -> Vec<String> {
        self.observation_data.iter().map(|o| o.name.clone()).collect()
    }

    pub fn nnz_obs_names(&self) -> Vec<String> {
        self.observation_data
            .iter()
            .filter(|o| o.weight > 0.0)
            .map(|o| o.name.clone())
            .collect()
    }

    pub fn prior_names(&self) -> Vec<String> {
        self.prior_information
            .iter()
            .map(|p| p.label.clone())
            .collect()
    }

    /// Distinct parameter groups referenced by parameter data, sorted.
    pub fn par_groups(&self) -> Vec<String> {
        distinct(self.parameter_data.iter().map(|p| &p.group))
    }

    /// Distinct observation groups, sorted.
    pub fn obs_groups(&self) -> Vec<String> {
        distinct(self.observation_data.iter().map(|o| &o.group))
    }

    /// Distinct prior-information groups, sorted.
    pub fn prior_groups(&self) -> Vec<String> {
        distinct(self.prior_information.iter().map(|p| &p.group))
    }

    /// Parameter groups used in parameter data but missing from the
    /// parameter groups table.
    pub fn undeclared_par_groups(&self) -> Vec<String> {
        let declared: HashSet<&str> = self
            .parameter_groups
            .iter()
            .map(|g| g.name.as_str())
            .collect();
        self.par_groups()
            .into_iter()
            .filter(|g| !declared.contains(g.as_str()))
            .collect()
    }

    /// Parameters referenced by the prior-information equations, in order of
    /// first appearance.
    pub fn prior_parameter_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut seen = HashSet::new();
        for pi in &self.prior_information {
            let eq = PriorEquation::parse(&pi.equation)?;
            for name in eq.parameter_names() {
                if seen.insert(name.clone()) {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    /// Statistics of the non-zero observation weights, `None` when all are zero.
    pub fn weight_summary(&self) -> Option<WeightSummary> {
        let nz: Vec<f64> = self
            .observation_data
            .iter()
            .map(|o| o.weight)
            .filter(|&w| w > 0.0)
            .collect();
        if nz.is_empty() {
            return None;
        }
        Some(WeightSummary {
            nnz: nz.len(),
            min: nz.iter().copied().fold(f64::INFINITY, f64::min),
            max: nz.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            mean: nz.iter().sum::<f64>() / nz.len() as f64,
        })
    }

    fn case_file(&self, extension: &str) -> Result<PathBuf> {
        self.filename
            .as_ref()
            .map(|f| f.with_extension(extension))
            .ok_or_else(|| {
                PestError::structural(format!(
                    "no .{} file given and the control file has no filename",
                    extension
                ))
            })
    }

    fn resolve_resfile(&self) -> Result<PathBuf> {
        if let Some(path) = &self.resfile {
            return Ok(path.clone());
        }
        let res = self.case_file("res")?;
        if res.exists() {
            return Ok(res);
        }
        let rei = res.with_extension("rei");
        if rei.exists() {
            return Ok(rei);
        }
        Err(PestError::MissingFile { path: rei })
    }

    /// Residuals, loaded on first access and cached.
    ///
    /// Without an explicit residual file, `<case>.res` is tried before
    /// `<case>.rei`. The cache is not refreshed when the file changes; call
    /// [`invalidate_residuals`](Self::invalidate_residuals) to force a reload.
    pub fn residuals(&self) -> Result<&[ResidualRecord]> {
        if let Some(res) = self.residuals.get() {
            return Ok(res.as_slice());
        }
        let path = self.resolve_resfile()?;
        let loaded = load_residuals(&path)?;
        log::info!("loaded {} residuals from {}", loaded.len(), path.display());
        Ok(self.residuals.get_or_init(|| loaded).as_slice())
    }

    /// Use `path` for residuals from now on, dropping any cached residuals.
    pub fn set_residual_file<P: AsRef<Path>>(&mut self, path: P) {
        self.resfile = Some(path.as_ref().to_path_buf());
        self.invalidate_residuals();
    }

    pub fn resfile(&self) -> Option<&Path> {
        self.resfile.as_deref()
    }

    /// Drop cached residuals so the next access reloads them.
    pub fn invalidate_residuals(&mut self) {
        self.residuals = OnceCell::new();
    }

    /// Replace cached residuals with an in-memory table.
    pub fn set_residuals(&mut self, residuals: Vec<ResidualRecord>) {
        self.residuals = OnceCell::from(residuals);
    }

    /// Phi contribution of each observation group.
    ///
    /// # Errors
    ///
    /// * `PestError::Referential` if an observation has no residual or its
    ///   residual sits in a different group
    pub fn phi_components(&self) -> Result<BTreeMap<String, f64>> {
        weights::group_phi_components(&self.observation_data, self.residuals()?)
    }

    /// Total phi: the sum of the group components.
    pub fn phi(&self) -> Result<f64> {
        Ok(self.phi_components()?.values().sum())
    }

    fn skip_regul_groups(&self, targets: &mut BTreeMap<String, f64>) {
        if self.pestmode() == PestMode::Regularisation {
            targets.retain(|group, _| !group.contains("regul"));
        }
    }

    /// Rescale each listed group's weights so it contributes its target phi,
    /// measured against the current residuals.
    ///
    /// In regularisation mode, groups whose name contains `regul` are left alone.
    pub fn adjust_weights_by_phi_components(
        &mut self,
        targets: &BTreeMap<String, f64>,
    ) -> Result<()> {
        let mut targets: BTreeMap<String, f64> = targets
            .iter()
            .map(|(g, &phi)| (normalize_name(g), phi))
            .collect();
        self.skip_regul_groups(&mut targets);
        let current = self.phi_components()?;
        self.observation_data =
            weights::rescale_groups(&self.observation_data, &current, &targets)?;
        Ok(())
    }

    /// Rescale every group to contribute its non-zero weighted observation
    /// count, using phi components from the residual file.
    pub fn adjust_weights_resfile<P: AsRef<Path>>(&mut self, resfile: Option<P>) -> Result<()> {
        if let Some(path) = resfile {
            self.set_residual_file(path);
        }
        let mut targets = weights::nnz_targets(&self.observation_data);
        self.skip_regul_groups(&mut targets);
        let current = self.phi_components()?;
        self.observation_data =
            weights::rescale_groups(&self.observation_data, &current, &targets)?;
        Ok(())
    }

    /// Rescale every group to contribute its non-zero weighted observation
    /// count, using the phi components of the last iteration in a run record
    /// that lists every observation group.
    ///
    /// Defaults to `<case>.rec`.
    pub fn adjust_weights_recfile<P: AsRef<Path>>(&mut self, recfile: Option<P>) -> Result<()> {
        let path = match recfile {
            Some(p) => p.as_ref().to_path_buf(),
            None => self.case_file("rec")?,
        };
        let iterations = phi_components_from_recfile(&path)?;

        let mut targets = weights::nnz_targets(&self.observation_data);
        self.skip_regul_groups(&mut targets);

        let (iteration, current) = iterations
            .iter()
            .rev()
            .find(|(_, comps)| targets.keys().all(|g| comps.contains_key(g)))
            .ok_or_else(|| {
                PestError::structural(format!(
                    "no complete phi component record found in {}",
                    path.display()
                ))
            })?;
        log::info!(
            "reweighting from iteration {} of {}",
            iteration,
            path.display()
        );
        self.observation_data = weights::rescale_groups(&self.observation_data, current, &targets)?;
        Ok(())
    }

    /// Rescale observation selections to the given phi targets.
    pub fn adjust_weights_by_group(&mut self, targets: &[WeightTarget]) -> Result<()> {
        let updated =
            weights::reweight_to_targets(&self.observation_data, self.residuals()?, targets)?;
        self.observation_data = updated;
        Ok(())
    }

    /// Replace observation weights with inversely proportional weights.
    pub fn proportional_weights(&mut self, config: &ProportionalWeights) {
        self.observation_data = weights::proportional_weights(&self.observation_data, config);
    }

    /// Replace prior information with one preferred-value equation per
    /// adjustable parameter in group `regul`, optionally weighted by the
    /// inverse bound range.
    pub fn zero_order_tikhonov(&mut self, parbounds: bool) -> Result<()> {
        self.prior_information = weights::zero_order_tikhonov(&self.parameter_data, "regul")?;
        if parbounds {
            self.regweight_from_parbound();
        }
        log::info!(
            "added {} preferred-value equations",
            self.prior_information.len()
        );
        Ok(())
    }

    /// Weight each preferred-value equation by its parameter's inverse bound range.
    pub fn regweight_from_parbound(&mut self) {
        self.prior_information =
            weights::regweights_from_bounds(&self.prior_information, &self.parameter_data);
    }

    /// Overwrite parameter values from a `.par` file (default `<case>.par`).
    ///
    /// # Errors
    ///
    /// * `PestError::MissingFile` if the file does not exist
    /// * `PestError::Referential` if the file names an unknown parameter
    pub fn parrep<P: AsRef<Path>>(&mut self, parfile: Option<P>) -> Result<()> {
        let path = match parfile {
            Some(p) => p.as_ref().to_path_buf(),
            None => self.case_file("par")?,
        };
        let values = read_parfile(&path)?;

        let index: HashMap<String, usize> = self
            .parameter_data
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name.clone(), i))
            .collect();
        let mut updated = vec![false; self.parameter_data.len()];
        for pv in &values {
            let i = *index.get(&pv.name).ok_or_else(|| {
                PestError::referential(format!(
                    "parameter '{}' in {} is not in the control file",
                    pv.name,
                    path.display()
                ))
            })?;
            self.parameter_data[i].value = pv.value;
            updated[i] = true;
        }
        for (par, done) in self.parameter_data.iter().zip(&updated) {
            if !done {
                log::warn!("parameter '{}' not found in {}", par.name, path.display());
            }
        }
        Ok(())
    }

    /// Independent copy restricted to the named parameters and observations.
    ///
    /// `None` keeps every entry of that kind. Prior information is dropped;
    /// parameter groups and tied lines are trimmed to what the kept
    /// parameters use, and a tied parameter whose parent is gone becomes
    /// fixed. Loaded residuals are carried over for the kept observations.
    ///
    /// # Errors
    ///
    /// * `PestError::Referential` if a name is not in the control file
    pub fn subset(&self, par_names: Option<&[&str]>, obs_names: Option<&[&str]>) -> Result<Self> {
        let mut parameter_data = match par_names {
            Some(names) => select_by_name(&self.parameter_data, names, "parameter", |p| &p.name)?,
            None => self.parameter_data.clone(),
        };
        let observation_data = match obs_names {
            Some(names) => {
                select_by_name(&self.observation_data, names, "observation", |o| &o.name)?
            }
            None => self.observation_data.clone(),
        };

        let kept: HashSet<String> = parameter_data.iter().map(|p| p.name.clone()).collect();
        let tied_lines: Vec<String> = self
            .tied_lines
            .iter()
            .filter(|line| {
                let tokens: Vec<String> = line.split_whitespace().map(normalize_name).collect();
                tokens.len() >= 2 && kept.contains(&tokens[0]) && kept.contains(&tokens[1])
            })
            .cloned()
            .collect();
        let tied_children: HashSet<String> = tied_lines
            .iter()
            .filter_map(|l| l.split_whitespace().next().map(normalize_name))
            .collect();
        for par in parameter_data.iter_mut() {
            if par.transform == Transform::Tied && !tied_children.contains(&par.name) {
                log::warn!(
                    "tied parameter '{}' lost its parent in subset, fixing it",
                    par.name
                );
                par.transform = Transform::Fixed;
            }
        }

        let used_groups: HashSet<&str> = parameter_data.iter().map(|p| p.group.as_str()).collect();
        let parameter_groups = self
            .parameter_groups
            .iter()
            .filter(|g| used_groups.contains(g.name.as_str()))
            .cloned()
            .collect();

        let residuals = match self.residuals.get() {
            Some(res) => {
                let obs: HashSet<&str> = observation_data.iter().map(|o| o.name.as_str()).collect();
                let res: Vec<ResidualRecord> = res
                    .iter()
                    .filter(|r| obs.contains(r.name.as_str()))
                    .cloned()
                    .collect();
                OnceCell::from(res)
            }
            None => OnceCell::new(),
        };

        if !self.prior_information.is_empty() {
            log::debug!(
                "subset drops {} prior information equations",
                self.prior_information.len()
            );
        }

        let mut subset = Self {
            filename: self.filename.clone(),
            control_data: self.control_data.clone(),
            other_lines: self.other_lines.clone(),
            parameter_groups,
            parameter_data,
            tied_lines,
            observation_data,
            model_command: self.model_command.clone(),
            templates: self.templates.clone(),
            instructions: self.instructions.clone(),
            prior_information: Vec::new(),
            regularization: self.regularization.clone(),
            resfile: self.resfile.clone(),
            residuals,
        };
        subset.update_control_section();
        Ok(subset)
    }

    /// Serialize the tables to a pretty-printed JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PestError::MissingFile {
                path: path.to_path_buf(),
            });
        }
        let mut contents = String::new();
        File::open(path)?.read_to_string(&mut contents)?;
        Self::from_json(&contents)
    }
}

fn distinct<'a, I: Iterator<Item = &'a String>>(names: I) -> Vec<String> {
    names.cloned().collect::<BTreeSet<_>>().into_iter().collect()
}

fn select_by_name<T: Clone>(
    rows: &[T],
    names: &[&str],
    kind: &str,
    name_of: impl Fn(&T) -> &String,
) -> Result<Vec<T>> {
    let index: HashMap<&str, usize> = rows
        .iter()
        .enumerate()
        .map(|(i, r)| (name_of(r).as_str(), i))
        .collect();
    names
        .iter()
        .map(|n| {
            let n = normalize_name(n);
            index
                .get(n.as_str())
                .map(|&i| rows[i].clone())
                .ok_or_else(|| PestError::referential(format!("{} '{}' not found", kind, n)))
        })
        .collect()
}
