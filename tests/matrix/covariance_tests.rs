//! Tests for covariance construction, inversion and conditioning

use approx::assert_relative_eq;
use ndarray::{array, Array1};
use pestlin_rs::pst::{ObservationRecord, ParameterRecord, Transform};
use pestlin_rs::{Cov, NamedMatrix, PestError, PriorCovarianceConfig};

#[test]
fn test_observation_weights_to_noise() {
    let obs = vec![
        ObservationRecord::new("h1", 1.0, 2.0, "heads"),
        ObservationRecord::new("h2", 1.0, 0.0, "heads"),
    ];
    let cov = Cov::from_observation_weights(&obs).unwrap();
    assert!(cov.is_diagonal());
    let var = cov.diagonal();
    assert_relative_eq!(var[0], 0.25);
    assert!(var[1].is_infinite());

    let precision = cov.inv().unwrap().diagonal();
    assert_relative_eq!(precision[0], 4.0);
    assert_eq!(precision[1], 0.0);
}

#[test]
fn test_parameter_bounds_to_prior() {
    let pars = vec![
        ParameterRecord::new("k1", 1.0, 0.01, 100.0, "hk"),
        ParameterRecord::new("r1", 0.5, 0.0, 2.0, "rch").with_transform(Transform::None),
        ParameterRecord::new("k2", 1.0, 0.1, 10.0, "hk").with_transform(Transform::Fixed),
    ];
    let cov = Cov::from_parameter_bounds(&pars, &PriorCovarianceConfig::default()).unwrap();
    assert_eq!(cov.names(), &["k1".to_string(), "r1".to_string()]);
    let var = cov.diagonal();
    // four log10 cycles over four standard deviations
    assert_relative_eq!(var[0], 1.0, epsilon = 1e-12);
    assert_relative_eq!(var[1], 0.25, epsilon = 1e-12);
}

#[test]
fn test_conditioning_dense_matches_schur_complement() {
    let cov = Cov::from_dense(
        &["a", "b"],
        array![[2.0, 1.0], [1.0, 2.0]],
    )
    .unwrap();
    let cond = cov.condition_on(&["b"]).unwrap();
    assert_eq!(cond.names(), &["a".to_string()]);
    assert_relative_eq!(cond.diagonal()[0], 2.0 - 1.0 / 2.0, epsilon = 1e-12);

    let diag = Cov::from_diagonal(&["a", "b"], Array1::from_vec(vec![2.0, 3.0])).unwrap();
    let cond = diag.condition_on(&["a"]).unwrap();
    assert!(cond.is_diagonal());
    assert_relative_eq!(cond.diagonal()[0], 3.0);

    assert!(matches!(diag.condition_on(&["zz"]), Err(PestError::Referential(_))));
}

#[test]
fn test_quadratic_form_on_subset() {
    let cov = Cov::from_diagonal(&["a", "b", "c"], Array1::from_vec(vec![1.0, 2.0, 3.0])).unwrap();
    let v = NamedMatrix::column(Array1::from_vec(vec![1.0, 1.0]), &["c", "a"], "fc").unwrap();
    assert_relative_eq!(cov.quadratic_form(&v).unwrap(), 4.0);

    let dense = Cov::from_matrix(&cov.to_matrix()).unwrap();
    assert!(!dense.is_diagonal());
    assert_relative_eq!(dense.quadratic_form(&v).unwrap(), 4.0);
}

#[test]
fn test_zero_variance_cannot_be_inverted() {
    let cov = Cov::from_diagonal(&["a"], Array1::from_vec(vec![0.0])).unwrap();
    assert!(matches!(cov.inv(), Err(PestError::LinearAlgebra(_))));
}
