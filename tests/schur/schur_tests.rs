//! Tests for posterior parameter and forecast variances

use approx::assert_relative_eq;
use ndarray::{array, Array2};
use pestlin_rs::{ControlFile, Cov, NamedMatrix, PestError, Schur};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::test_helpers::{data_path, names, random_matrix, random_spd};

/// Three parameters, four observations, identity covariances.
pub fn scenario() -> Schur {
    let jco = NamedMatrix::new(
        array![
            [1.0, 0.5, 0.0],
            [0.2, 1.0, 0.4],
            [0.0, 0.3, 1.0],
            [0.6, 0.0, 0.8]
        ],
        &["o1", "o2", "o3", "o4"],
        &["p1", "p2", "p3"],
    )
    .unwrap();
    Schur::new(
        jco,
        Cov::identity(&["p1", "p2", "p3"]).unwrap(),
        Cov::identity(&["o1", "o2", "o3", "o4"]).unwrap(),
    )
    .unwrap()
    .with_forecast_names(&["o2"])
    .unwrap()
}

#[test]
fn test_scenario_summaries() {
    let schur = scenario();

    let pars = schur.get_parameter_summary().unwrap();
    assert_eq!(pars.len(), 3);
    for row in &pars {
        assert!(row.percent_reduction >= 0.0, "{:?}", row);
        assert!(row.percent_reduction <= 100.0, "{:?}", row);
    }

    let forecasts = schur.get_forecast_summary().unwrap();
    assert_eq!(forecasts.len(), 1);
    assert_eq!(forecasts[0].name, "o2");
    assert_relative_eq!(forecasts[0].prior_var, 0.04 + 1.0 + 0.16, epsilon = 1e-12);
    assert!(forecasts[0].post_var <= forecasts[0].prior_var);
}

#[test]
fn test_explicit_prediction_vectors() {
    let base = scenario();
    let pred = NamedMatrix::column(array![0.4, 1.0, 0.2], &["p3", "p2", "p1"], "fc").unwrap();
    let schur = Schur::new(base.jco().clone(), base.parcov().clone(), base.obscov().clone())
        .unwrap()
        .with_predictions(vec![pred])
        .unwrap();

    // same vector as o2's jacobian row, given in a different order
    let a = schur.posterior_prediction().unwrap().get("fc").unwrap();
    let b = base.posterior_prediction().unwrap().get("o2").unwrap();
    assert_relative_eq!(a, b, epsilon = 1e-12);
    assert_eq!(schur.forecast_names(), vec!["fc"]);

    let dup = vec![
        NamedMatrix::column(array![1.0, 0.0, 0.0], &["p1", "p2", "p3"], "fc").unwrap(),
        NamedMatrix::column(array![0.0, 1.0, 0.0], &["p1", "p2", "p3"], "FC").unwrap(),
    ];
    assert!(matches!(
        Schur::new(base.jco().clone(), base.parcov().clone(), base.obscov().clone())
            .unwrap()
            .with_predictions(dup),
        Err(PestError::Referential(_))
    ));
}

#[test]
fn test_posterior_never_exceeds_prior() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let pars = names("p", 3);
    let obs = names("o", 4);

    for _ in 0..25 {
        let jco = NamedMatrix::new(random_matrix(&mut rng, 4, 3), &obs, &pars).unwrap();
        let parcov = Cov::from_dense(&pars, random_spd(&mut rng, 3)).unwrap();
        let obscov = Cov::from_dense(&obs, random_spd(&mut rng, 4)).unwrap();
        let schur = Schur::new(jco, parcov, obscov).unwrap();

        for row in schur.get_parameter_summary().unwrap() {
            assert!(
                row.post_var <= row.prior_var * (1.0 + 1e-10),
                "{}: {} > {}",
                row.name,
                row.post_var,
                row.prior_var
            );
            assert!(row.post_var > 0.0);
        }
    }
}

#[test]
fn test_diagonal_and_dense_priors_agree() {
    let base = scenario();
    let dense = Schur::new(
        base.jco().clone(),
        Cov::from_dense(&["p1", "p2", "p3"], Array2::eye(3)).unwrap(),
        base.obscov().clone(),
    )
    .unwrap();
    for (a, b) in base
        .get_parameter_summary()
        .unwrap()
        .iter()
        .zip(dense.get_parameter_summary().unwrap().iter())
    {
        assert_eq!(a.name, b.name);
        assert_eq!(a.prior_var, b.prior_var);
        assert_relative_eq!(a.post_var, b.post_var, epsilon = 1e-12);
    }
}

#[test]
fn test_from_control_file() {
    let pst = ControlFile::load(data_path("pest.pst")).unwrap();
    let obs = pst.obs_names();
    let pars = pst.adj_par_names();
    let jco = NamedMatrix::new(
        Array2::from_shape_fn((obs.len(), pars.len()), |(i, j)| 1.0 / (1.0 + i as f64 + j as f64)),
        &obs,
        &pars,
    )
    .unwrap();

    let schur = Schur::from_control_file(jco, pst).unwrap();
    assert!(schur.pst().is_some());
    assert_eq!(schur.parcov().names(), pars.as_slice());
    // hk1 spans two log10 cycles over four standard deviations
    assert_relative_eq!(schur.parcov().diagonal()[0], 0.25, epsilon = 1e-12);
    assert!(schur.obscov().diagonal()[2].is_infinite());

    for row in schur.get_parameter_summary().unwrap() {
        assert!(row.post_var <= row.prior_var * (1.0 + 1e-10));
    }
}
