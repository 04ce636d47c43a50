//! Tests for name-aligned matrix operations

use approx::assert_relative_eq;
use ndarray::array;
use pestlin_rs::{NamedMatrix, PestError};

use crate::test_helpers::scratch_dir;

#[test]
fn test_dot_aligns_by_name() {
    let a = NamedMatrix::new(array![[1.0, 2.0], [3.0, 4.0]], &["r1", "r2"], &["x", "y"]).unwrap();
    // rows given in the opposite order to a's columns
    let b = NamedMatrix::new(array![[10.0], [1.0]], &["y", "x"], &["c"]).unwrap();

    let c = a.dot(&b).unwrap();
    assert_eq!(c.row_names(), &["r1".to_string(), "r2".to_string()]);
    assert_eq!(c.col_names(), &["c".to_string()]);
    assert_relative_eq!(c.value("r1", "c").unwrap(), 1.0 + 20.0);
    assert_relative_eq!(c.value("r2", "c").unwrap(), 3.0 + 40.0);
}

#[test]
fn test_dot_rejects_different_names() {
    let a = NamedMatrix::new(array![[1.0, 2.0]], &["r1"], &["x", "y"]).unwrap();
    let b = NamedMatrix::new(array![[1.0], [1.0]], &["x", "z"], &["c"]).unwrap();
    assert!(matches!(a.dot(&b), Err(PestError::DimensionMismatch(_))));
}

#[test]
fn test_subsetting_and_names_are_case_folded() {
    let m = NamedMatrix::new(
        array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]],
        &["OBS1", "Obs2"],
        &["P1", "p2", "p3"],
    )
    .unwrap();
    assert_eq!(m.row_names(), &["obs1".to_string(), "obs2".to_string()]);

    let sub = m.get(&["obs2"], &["P3", "p1"]).unwrap();
    assert_eq!(sub.x(), &array![[6.0, 4.0]]);

    let dropped = m.drop_cols(&["p2"]).unwrap();
    assert_eq!(dropped.col_names(), &["p1".to_string(), "p3".to_string()]);

    assert!(matches!(m.get_rows(&["obs9"]), Err(PestError::Referential(_))));
    assert!(NamedMatrix::new(array![[1.0, 2.0]], &["a"], &["x", "X"]).is_err());
}

#[test]
fn test_inverse_and_transpose() {
    let m = NamedMatrix::new(array![[4.0, 1.0], [1.0, 3.0]], &["a", "b"], &["a", "b"]).unwrap();
    let inv = m.inv().unwrap();
    let ident = m.dot(&inv).unwrap();
    assert_relative_eq!(ident.value("a", "a").unwrap(), 1.0, epsilon = 1e-12);
    assert_relative_eq!(ident.value("a", "b").unwrap(), 0.0, epsilon = 1e-12);

    let t = NamedMatrix::new(array![[1.0, 2.0]], &["r"], &["x", "y"]).unwrap().transpose();
    assert_eq!(t.shape(), (2, 1));
    assert_relative_eq!(t.value("y", "r").unwrap(), 2.0);

    let singular = NamedMatrix::new(array![[1.0, 2.0], [2.0, 4.0]], &["a", "b"], &["a", "b"]).unwrap();
    assert!(matches!(singular.inv(), Err(PestError::LinearAlgebra(_))));
}

#[test]
fn test_json_file_roundtrip() {
    let m = NamedMatrix::new(array![[1.5, -2.0]], &["o1"], &["p1", "p2"]).unwrap();
    let path = scratch_dir("named-json").join("jco.json");
    m.save_json(&path).unwrap();
    let loaded = NamedMatrix::load_json(&path).unwrap();
    assert_eq!(loaded, m);

    let missing = NamedMatrix::load_json(path.with_file_name("nope.json"));
    assert!(matches!(missing, Err(PestError::MissingFile { .. })));
}
