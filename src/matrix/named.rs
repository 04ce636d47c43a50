//! # Named Matrices
//!
//! A dense matrix whose rows and columns are bound to ordered, unique names
//! (parameter or observation names). Products, sums and sub-setting are all
//! resolved by name, so callers never have to track index positions.

use crate::error::{PestError, Result};
use crate::utils::{invert, normalize_name};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// A matrix indexed by row names and column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedMatrix {
    x: Array2<f64>,
    row_names: Vec<String>,
    col_names: Vec<String>,
}

impl NamedMatrix {
    /// Create a new named matrix.
    ///
    /// Names are normalized to lower case.
    ///
    /// # Errors
    ///
    /// * `PestError::DimensionMismatch` if the name counts do not match the shape
    /// * `PestError::Referential` if a row or column name is repeated
    pub fn new<R: AsRef<str>, C: AsRef<str>>(
        x: Array2<f64>,
        row_names: &[R],
        col_names: &[C],
    ) -> Result<Self> {
        let row_names = normalize_names(row_names, "row")?;
        let col_names = normalize_names(col_names, "column")?;

        if x.nrows() != row_names.len() || x.ncols() != col_names.len() {
            return Err(PestError::DimensionMismatch(format!(
                "matrix of shape {}x{} given {} row names and {} column names",
                x.nrows(),
                x.ncols(),
                row_names.len(),
                col_names.len()
            )));
        }

        Ok(Self {
            x,
            row_names,
            col_names,
        })
    }

    /// Assemble from names that are already normalized, unique and sized to `x`.
    pub(crate) fn from_parts(x: Array2<f64>, row_names: Vec<String>, col_names: Vec<String>) -> Self {
        debug_assert_eq!(x.dim(), (row_names.len(), col_names.len()));
        Self {
            x,
            row_names,
            col_names,
        }
    }

    /// Create a single-column matrix, e.g. a prediction vector.
    pub fn column<R: AsRef<str>>(values: Array1<f64>, row_names: &[R], col_name: &str) -> Result<Self> {
        let n = values.len();
        let x = values
            .into_shape((n, 1))
            .map_err(|e| PestError::DimensionMismatch(e.to_string()))?;
        Self::new(x, row_names, &[col_name])
    }

    /// The underlying values.
    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    pub fn row_names(&self) -> &[String] {
        &self.row_names
    }

    pub fn col_names(&self) -> &[String] {
        &self.col_names
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        self.x.dim()
    }

    pub fn row_index(&self, name: &str) -> Option<usize> {
        let name = normalize_name(name);
        self.row_names.iter().position(|n| *n == name)
    }

    pub fn col_index(&self, name: &str) -> Option<usize> {
        let name = normalize_name(name);
        self.col_names.iter().position(|n| *n == name)
    }

    /// Look up a single entry by row and column name.
    pub fn value(&self, row: &str, col: &str) -> Result<f64> {
        let i = self
            .row_index(row)
            .ok_or_else(|| PestError::referential(format!("row '{}' not found in matrix", row)))?;
        let j = self
            .col_index(col)
            .ok_or_else(|| PestError::referential(format!("column '{}' not found in matrix", col)))?;
        Ok(self.x[[i, j]])
    }

    /// The single value of a 1x1 matrix.
    pub fn as_scalar(&self) -> Result<f64> {
        if self.shape() != (1, 1) {
            return Err(PestError::DimensionMismatch(format!(
                "expected a 1x1 matrix, found {}x{}",
                self.x.nrows(),
                self.x.ncols()
            )));
        }
        Ok(self.x[[0, 0]])
    }

    pub fn transpose(&self) -> Self {
        Self {
            x: self.x.t().to_owned(),
            row_names: self.col_names.clone(),
            col_names: self.row_names.clone(),
        }
    }

    /// Extract a sub-matrix in the order of the requested names.
    ///
    /// # Errors
    ///
    /// * `PestError::Referential` if any requested name is missing
    pub fn get<R: AsRef<str>, C: AsRef<str>>(&self, row_names: &[R], col_names: &[C]) -> Result<Self> {
        let rows = lookup(&self.row_names, row_names, "row")?;
        let cols = lookup(&self.col_names, col_names, "column")?;

        let x = self.x.select(Axis(0), &rows).select(Axis(1), &cols);
        Ok(Self {
            x,
            row_names: rows.iter().map(|&i| self.row_names[i].clone()).collect(),
            col_names: cols.iter().map(|&j| self.col_names[j].clone()).collect(),
        })
    }

    /// Keep only the named rows, in the given order.
    pub fn get_rows<R: AsRef<str>>(&self, row_names: &[R]) -> Result<Self> {
        self.get(row_names, &self.col_names)
    }

    /// Keep only the named columns, in the given order.
    pub fn get_cols<C: AsRef<str>>(&self, col_names: &[C]) -> Result<Self> {
        self.get(&self.row_names, col_names)
    }

    /// Remove the named rows, keeping the remaining order.
    pub fn drop_rows<R: AsRef<str>>(&self, row_names: &[R]) -> Result<Self> {
        let keep = complement(&self.row_names, row_names, "row")?;
        self.get_rows(&keep)
    }

    /// Remove the named columns, keeping the remaining order.
    pub fn drop_cols<C: AsRef<str>>(&self, col_names: &[C]) -> Result<Self> {
        let keep = complement(&self.col_names, col_names, "column")?;
        self.get_cols(&keep)
    }

    /// Matrix product `self * other`.
    ///
    /// The rows of `other` are aligned by name to the columns of `self`; the two
    /// name sets must be identical.
    pub fn dot(&self, other: &NamedMatrix) -> Result<Self> {
        if !same_name_set(&self.col_names, &other.row_names) {
            return Err(PestError::DimensionMismatch(format!(
                "cannot multiply: {} column names do not match {} row names",
                self.col_names.len(),
                other.row_names.len()
            )));
        }

        let x = if self.col_names == other.row_names {
            self.x.dot(&other.x)
        } else {
            let aligned = other.get_rows(&self.col_names)?;
            self.x.dot(&aligned.x)
        };

        Ok(Self {
            x,
            row_names: self.row_names.clone(),
            col_names: other.col_names.clone(),
        })
    }

    /// Elementwise sum, aligning `other` to the name order of `self`.
    pub fn add(&self, other: &NamedMatrix) -> Result<Self> {
        if !same_name_set(&self.row_names, &other.row_names)
            || !same_name_set(&self.col_names, &other.col_names)
        {
            return Err(PestError::DimensionMismatch(
                "cannot add matrices with different row or column names".to_string(),
            ));
        }

        let aligned = other.get(&self.row_names, &self.col_names)?;
        Ok(Self {
            x: &self.x + &aligned.x,
            row_names: self.row_names.clone(),
            col_names: self.col_names.clone(),
        })
    }

    /// Inverse of a square matrix. Row and column names swap roles.
    pub fn inv(&self) -> Result<Self> {
        let x = invert(&self.x, "named matrix")?;
        Ok(Self {
            x,
            row_names: self.col_names.clone(),
            col_names: self.row_names.clone(),
        })
    }

    /// Diagonal of a square matrix.
    pub fn diagonal(&self) -> Result<Array1<f64>> {
        if self.x.nrows() != self.x.ncols() {
            return Err(PestError::DimensionMismatch(format!(
                "diagonal requires a square matrix, found {}x{}",
                self.x.nrows(),
                self.x.ncols()
            )));
        }
        Ok(self.x.diag().to_owned())
    }

    /// Serialize to a pretty-printed JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON, re-validating names and shape.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: NamedMatrix = serde_json::from_str(json)?;
        Self::new(raw.x, &raw.row_names, &raw.col_names)
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

fn normalize_names<S: AsRef<str>>(names: &[S], kind: &str) -> Result<Vec<String>> {
    let mut seen = HashSet::with_capacity(names.len());
    let mut normalized = Vec::with_capacity(names.len());
    for name in names {
        let name = normalize_name(name.as_ref());
        if !seen.insert(name.clone()) {
            return Err(PestError::referential(format!(
                "duplicate {} name '{}'",
                kind, name
            )));
        }
        normalized.push(name);
    }
    Ok(normalized)
}

fn lookup<S: AsRef<str>>(names: &[String], wanted: &[S], kind: &str) -> Result<Vec<usize>> {
    let index: HashMap<&str, usize> = names
        .iter()
        .enumerate()
        .map(|(i, n)| (n.as_str(), i))
        .collect();

    wanted
        .iter()
        .map(|w| {
            let w = normalize_name(w.as_ref());
            index.get(w.as_str()).copied().ok_or_else(|| {
                PestError::referential(format!("{} name '{}' not found in matrix", kind, w))
            })
        })
        .collect()
}

fn complement<S: AsRef<str>>(names: &[String], drop: &[S], kind: &str) -> Result<Vec<String>> {
    let drop: HashSet<String> = drop.iter().map(|d| normalize_name(d.as_ref())).collect();
    for d in &drop {
        if !names.contains(d) {
            return Err(PestError::referential(format!(
                "{} name '{}' not found in matrix",
                kind, d
            )));
        }
    }
    Ok(names.iter().filter(|n| !drop.contains(*n)).cloned().collect())
}

fn same_name_set(a: &[String], b: &[String]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let a: HashSet<&String> = a.iter().collect();
    b.iter().all(|n| a.contains(n))
}
