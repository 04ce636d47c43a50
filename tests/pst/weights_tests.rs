//! Tests for the objective function and observation reweighting
//!
//! Residuals for the fixture give phi contributions of 1.5 for `heads`
//! and 0.05 for `flux`.

use approx::assert_relative_eq;
use pestlin_rs::pst::{GroupMatcher, ProportionalWeights, ResidualRecord, WeightTarget};
use pestlin_rs::{ControlFile, PestError};
use std::collections::BTreeMap;

use crate::test_helpers::{data_path, scratch_dir};

fn load_fixture() -> ControlFile {
    ControlFile::load(data_path("pest.pst")).unwrap()
}

#[test]
fn test_phi_components_from_residual_file() {
    let pst = load_fixture();
    let comps = pst.phi_components().unwrap();
    assert_eq!(comps.keys().collect::<Vec<_>>(), vec!["flux", "heads"]);
    assert_relative_eq!(comps["heads"], 1.5, epsilon = 1e-12);
    assert_relative_eq!(comps["flux"], 0.05, epsilon = 1e-12);

    let total: f64 = comps.values().sum();
    assert_eq!(pst.phi().unwrap(), total);
}

#[test]
fn test_missing_residual_file() {
    let mut pst = load_fixture();
    pst.set_residual_file(data_path("nothing_here.rei"));
    assert!(matches!(pst.phi(), Err(PestError::MissingFile { .. })));
}

#[test]
fn test_residual_group_mismatch_is_referential() {
    let mut pst = load_fixture();
    let mut residuals: Vec<ResidualRecord> = pst.residuals().unwrap().to_vec();
    residuals[0].group = "flux".to_string();
    pst.set_residuals(residuals);
    assert!(matches!(pst.phi_components(), Err(PestError::Referential(_))));

    pst.invalidate_residuals();
    assert!(pst.phi_components().is_ok());
}

#[test]
fn test_rebalance_hits_targets() {
    let mut pst = load_fixture();
    let mut targets = BTreeMap::new();
    targets.insert("HEADS".to_string(), 10.0);
    targets.insert("flux".to_string(), 2.5);
    pst.adjust_weights_by_phi_components(&targets).unwrap();

    let comps = pst.phi_components().unwrap();
    assert_relative_eq!(comps["heads"], 10.0, epsilon = 1e-10);
    assert_relative_eq!(comps["flux"], 2.5, epsilon = 1e-10);
    // zero weights stay zero
    assert_eq!(pst.observation_data[2].weight, 0.0);
}

#[test]
fn test_rebalance_without_informative_observations() {
    let mut pst = load_fixture();
    for obs in pst.observation_data.iter_mut().filter(|o| o.group == "flux") {
        obs.weight = 0.0;
    }
    let mut targets = BTreeMap::new();
    targets.insert("flux".to_string(), 1.0);
    assert!(matches!(
        pst.adjust_weights_by_phi_components(&targets),
        Err(PestError::Structural(_))
    ));
}

#[test]
fn test_adjust_weights_resfile_targets_nnz_counts() {
    let mut pst = load_fixture();
    pst.adjust_weights_resfile(None::<&str>).unwrap();
    let comps = pst.phi_components().unwrap();
    assert_relative_eq!(comps["heads"], 3.0, epsilon = 1e-10);
    assert_relative_eq!(comps["flux"], 2.0, epsilon = 1e-10);
}

#[test]
fn test_adjust_weights_resfile_leaves_exact_group() {
    let mut pst = load_fixture();
    let mut residuals: Vec<ResidualRecord> = pst.residuals().unwrap().to_vec();
    for res in residuals.iter_mut().filter(|r| r.group == "flux") {
        res.modelled = res.measured;
        res.residual = 0.0;
    }
    pst.set_residuals(residuals);
    let flux_before: Vec<f64> = pst.observation_data[4..].iter().map(|o| o.weight).collect();

    pst.adjust_weights_resfile(None::<&str>).unwrap();
    let comps = pst.phi_components().unwrap();
    assert_relative_eq!(comps["heads"], 3.0, epsilon = 1e-10);
    assert_eq!(comps["flux"], 0.0);
    let flux_after: Vec<f64> = pst.observation_data[4..].iter().map(|o| o.weight).collect();
    assert_eq!(flux_after, flux_before);
}

#[test]
fn test_adjust_weights_recfile_uses_last_complete_iteration() {
    let mut pst = load_fixture();
    pst.adjust_weights_recfile(None::<&str>).unwrap();

    // iteration 2: heads 1.0 -> 3, flux 0.2 -> 2
    assert_relative_eq!(pst.observation_data[0].weight, 3.0_f64.sqrt(), epsilon = 1e-12);
    assert_relative_eq!(pst.observation_data[3].weight, 2.0 * 3.0_f64.sqrt(), epsilon = 1e-12);
    assert_relative_eq!(pst.observation_data[4].weight, 0.01 * 10.0_f64.sqrt(), epsilon = 1e-12);
}

#[test]
fn test_adjust_weights_recfile_without_complete_record() {
    let mut pst = load_fixture();
    let rec = scratch_dir("recfile").join("partial.rec");
    std::fs::write(
        &rec,
        "    Starting phi for this iteration   Total : 1.0\n    Contribution to phi from observation group \"heads\"  : 1.0\n\n",
    )
    .unwrap();
    assert!(matches!(
        pst.adjust_weights_recfile(Some(&rec)),
        Err(PestError::Structural(_))
    ));
}

#[test]
fn test_adjust_weights_by_group_matchers() {
    let mut pst = load_fixture();
    let targets = vec![
        WeightTarget::new(GroupMatcher::GroupPrefix("hea".to_string()), 6.0),
        WeightTarget::new(GroupMatcher::ObservationName("f1".to_string()), 1.0),
    ];
    pst.adjust_weights_by_group(&targets).unwrap();

    let comps = pst.phi_components().unwrap();
    assert_relative_eq!(comps["heads"], 6.0, epsilon = 1e-10);
    // f1 alone now contributes 1.0, f2 keeps its 0.01
    assert_relative_eq!(comps["flux"], 1.0 + 0.01, epsilon = 1e-10);
}

#[test]
fn test_proportional_weights() {
    let mut pst = load_fixture();
    pst.proportional_weights(&ProportionalWeights::default());
    let w: Vec<f64> = pst.observation_data.iter().map(|o| o.weight).collect();
    assert_relative_eq!(w[0], 1.0 / 10.5);
    assert_eq!(w[2], 0.0);
    assert_relative_eq!(w[4], 1.0 / 200.0);
    assert_relative_eq!(w[5], 100.0);
}

#[test]
fn test_zero_order_tikhonov_with_bound_weights() {
    let mut pst = load_fixture();
    pst.zero_order_tikhonov(true).unwrap();
    assert_eq!(pst.prior_names(), vec!["hk1", "hk2", "rch1"]);
    assert_eq!(pst.prior_groups(), vec!["regul"]);

    let hk1 = &pst.prior_information[0];
    assert!(hk1.equation.contains("log(hk1)"));
    assert_relative_eq!(hk1.weight, 0.5, epsilon = 1e-12);
    let rch1 = &pst.prior_information[2];
    assert_relative_eq!(rch1.weight, 1.0 / (0.01 - 0.0001), epsilon = 1e-9);

    // the equations survive a write/parse cycle
    let again = ControlFile::parse(&pst.to_pst_string(), "tikhonov.pst").unwrap();
    assert_eq!(again.nprior(), 3);
    assert_eq!(again.prior_parameter_names().unwrap(), vec!["hk1", "hk2", "rch1"]);
}
