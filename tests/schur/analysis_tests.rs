//! Tests for parameter contribution and observation importance

use approx::assert_relative_eq;
use ndarray::array;
use pestlin_rs::pst::{ObservationRecord, ParameterRecord};
use pestlin_rs::schur::BASE_CASE;
use pestlin_rs::{ControlFile, Cov, NamedMatrix, PestError, Schur};

use super::schur_tests::scenario;

#[test]
fn test_contribution_cases() {
    let schur = scenario();
    let cases = vec![("group1".to_string(), vec!["p1".to_string(), "p3".to_string()])];
    let rows = schur.get_contribution_dataframe(&cases).unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].case, BASE_CASE);
    assert_eq!(rows[1].case, "group1");

    let base = &rows[0].forecasts[0];
    let known = &rows[1].forecasts[0];
    assert_eq!(known.name, "o2");
    // only p2 is left, with unit sensitivity
    assert_relative_eq!(known.prior_var, 1.0, epsilon = 1e-12);
    assert!(known.prior_var <= base.prior_var);
    assert!(known.post_var <= base.post_var + 1e-12);
}

#[test]
fn test_contribution_of_nearly_all_parameters() {
    let schur = scenario();
    let (_, post) = schur.contribution_from_parameters(&["p1", "p3"]).unwrap();
    let single = post.get("o2").unwrap();

    // with p1 and p3 known, o2 depends on p2 alone: 1 / (1 + sum of p2 sensitivities squared)
    let info = 0.5 * 0.5 + 1.0 + 0.3 * 0.3;
    assert_relative_eq!(single, 1.0 / (1.0 + info), epsilon = 1e-12);

    assert!(matches!(
        schur.contribution_from_parameters(&["p1", "p2", "p3"]),
        Err(PestError::Structural(_))
    ));
}

#[test]
fn test_importance_cases() {
    let schur = scenario();
    let cases = vec![("group1".to_string(), vec!["o1".to_string(), "o3".to_string()])];
    let rows = schur.get_importance_dataframe(Some(cases.as_slice())).unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].case, BASE_CASE);
    let base = rows[0].posterior.get("o2").unwrap();
    let reduced = rows[1].posterior.get("o2").unwrap();
    assert!(reduced >= base - 1e-12);

    // default cases: one per non-zero weight observation
    let rows = schur.get_importance_dataframe(None).unwrap();
    let names: Vec<&str> = rows.iter().map(|r| r.case.as_str()).collect();
    assert_eq!(names, vec!["base", "o1", "o2", "o3", "o4"]);
}

#[test]
fn test_zero_weight_observation_is_unimportant() {
    let mut pst = ControlFile::default();
    for name in ["p1", "p2", "p3"] {
        pst.parameter_data
            .push(ParameterRecord::new(name, 1.0, 0.1, 10.0, "hk"));
    }
    for (name, weight) in [("o1", 1.0), ("o2", 1.0), ("o3", 0.0), ("o4", 2.0)] {
        pst.observation_data
            .push(ObservationRecord::new(name, 1.0, weight, "heads"));
    }
    let base = scenario();
    let schur = Schur::new(
        base.jco().clone(),
        Cov::identity(&["p1", "p2", "p3"]).unwrap(),
        Cov::from_observation_weights(&pst.observation_data).unwrap(),
    )
    .unwrap()
    .with_forecast_names(&["o2"])
    .unwrap()
    .with_control_file(pst);

    let full = schur.posterior_prediction().unwrap().get("o2").unwrap();
    let without = schur.importance_of_observations(&["o3"]).unwrap();
    assert_relative_eq!(without.get("o2").unwrap(), full, epsilon = 1e-12);

    // the attached weights decide the default cases
    let rows = schur.get_importance_dataframe(None).unwrap();
    let names: Vec<&str> = rows.iter().map(|r| r.case.as_str()).collect();
    assert_eq!(names, vec!["base", "o1", "o2", "o4"]);
}

#[test]
fn test_group_variants() {
    let mut pst = ControlFile::default();
    for (name, group) in [("p1", "hk"), ("p2", "rch"), ("p3", "hk")] {
        pst.parameter_data
            .push(ParameterRecord::new(name, 1.0, 0.1, 10.0, group));
    }
    for (name, group) in [("o1", "heads"), ("o2", "flux"), ("o3", "heads"), ("o4", "flux")] {
        pst.observation_data
            .push(ObservationRecord::new(name, 1.0, 1.0, group));
    }
    let schur = scenario().with_control_file(pst);

    let rows = schur.get_contribution_dataframe_groups().unwrap();
    let cases: Vec<&str> = rows.iter().map(|r| r.case.as_str()).collect();
    assert_eq!(cases, vec!["base", "hk", "rch"]);
    let explicit = schur
        .contribution_from_parameters(&["p1", "p3"])
        .unwrap()
        .1
        .get("o2")
        .unwrap();
    assert_relative_eq!(rows[1].forecasts[0].post_var, explicit, epsilon = 1e-12);

    let rows = schur.get_importance_dataframe_groups().unwrap();
    let cases: Vec<&str> = rows.iter().map(|r| r.case.as_str()).collect();
    assert_eq!(cases, vec!["base", "flux", "heads"]);
}

#[test]
fn test_analyses_need_predictions() {
    let base = scenario();
    let bare = Schur::new(base.jco().clone(), base.parcov().clone(), base.obscov().clone()).unwrap();
    assert!(bare.posterior_prediction().unwrap().is_empty());
    assert!(matches!(
        bare.importance_of_observations(&["o1"]),
        Err(PestError::Structural(_))
    ));
    assert!(matches!(
        bare.get_importance_dataframe(None),
        Err(PestError::Structural(_))
    ));

    let unknown = NamedMatrix::new(array![[1.0]], &["o1"], &["p1"]).unwrap();
    assert!(Schur::new(unknown, Cov::identity(&["p1"]).unwrap(), Cov::identity(&["o2"]).unwrap()).is_err());
}
