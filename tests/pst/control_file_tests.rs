//! Tests for reading, writing and editing control files
//!
//! The fixture in `tests/data/pest.pst` carries a tied parameter, a
//! pass-through singular value decomposition block, prior information and a
//! regularisation section.

use approx::assert_relative_eq;
use pestlin_rs::pst::{PestMode, Transform};
use pestlin_rs::{ControlFile, PestError};

use crate::test_helpers::{data_path, scratch_dir};

fn load_fixture() -> ControlFile {
    ControlFile::load(data_path("pest.pst")).unwrap()
}

#[test]
fn test_load_counts_match_tables() {
    let pst = load_fixture();
    assert_eq!(pst.npar(), 5);
    assert_eq!(pst.parameter_data.len(), pst.control_data.npar());
    assert_eq!(pst.nobs(), 6);
    assert_eq!(pst.observation_data.len(), pst.control_data.nobs());
    assert_eq!(pst.parameter_groups.len(), pst.control_data.npargp());
    assert_eq!(pst.nprior(), 2);
    assert_eq!(pst.pestmode(), PestMode::Regularisation);

    assert_eq!(pst.npar_adj(), 3);
    assert_eq!(pst.adj_par_names(), vec!["hk1", "hk2", "rch1"]);
    assert_eq!(pst.nnz_obs(), 5);
    assert_eq!(pst.par_groups(), vec!["hk", "rch"]);
    assert_eq!(pst.obs_groups(), vec!["flux", "heads"]);
    assert_eq!(pst.prior_groups(), vec!["regul_hk"]);
    assert_eq!(pst.templates.len(), 1);
    assert_eq!(pst.instructions[0].model_file, "model.out");
    assert_eq!(pst.model_command, vec!["model.bat"]);

    let reg = pst.regularization.as_ref().unwrap();
    assert_relative_eq!(reg.phimlim, 24.0);
    assert!(reg.linreg);
}

#[test]
fn test_write_then_parse_roundtrip() {
    let pst = load_fixture();
    let text = pst.to_pst_string();
    let again = ControlFile::parse(&text, "roundtrip.pst").unwrap();

    assert_eq!(again.other_lines, pst.other_lines);
    assert_eq!(again.parameter_groups.len(), pst.parameter_groups.len());
    for (a, b) in again.parameter_groups.iter().zip(&pst.parameter_groups) {
        assert_eq!(a.name, b.name);
        assert_relative_eq!(a.derinc, b.derinc, max_relative = 1e-6);
    }
    for (a, b) in again.parameter_data.iter().zip(&pst.parameter_data) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.transform, b.transform);
        assert_eq!(a.group, b.group);
        assert_relative_eq!(a.value, b.value, max_relative = 1e-6);
        assert_relative_eq!(a.lower_bound, b.lower_bound, max_relative = 1e-6);
        assert_relative_eq!(a.upper_bound, b.upper_bound, max_relative = 1e-6);
    }
    for (a, b) in again.observation_data.iter().zip(&pst.observation_data) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.group, b.group);
        assert_relative_eq!(a.value, b.value, max_relative = 1e-6);
        assert_relative_eq!(a.weight, b.weight, max_relative = 1e-6);
    }
    assert_eq!(again.prior_names(), pst.prior_names());
    for (a, b) in again.prior_information.iter().zip(&pst.prior_information) {
        assert_eq!(a.equation, b.equation);
        assert_eq!(a.group, b.group);
    }
    assert_eq!(again.templates, pst.templates);
    assert_eq!(again.instructions, pst.instructions);

    // the written regularisation target is the non-zero observation count
    let reg = again.regularization.as_ref().unwrap();
    assert_relative_eq!(reg.phimlim, 5.0);
    assert_relative_eq!(reg.phimaccept, 5.75, max_relative = 1e-6);
}

#[test]
fn test_tied_lines_pass_through() {
    let pst = load_fixture();
    assert_eq!(pst.tied_lines, vec!["hk3  hk1"]);

    let text = pst.to_pst_string();
    let lines: Vec<&str> = text.lines().collect();
    let pos = lines
        .iter()
        .position(|l| l.trim() == "* parameter data")
        .unwrap();
    // five parameter rows, then the tied line verbatim
    assert_eq!(lines[pos + 6], "hk3  hk1");
    assert_eq!(lines[pos + 7], "* observation groups");
}

#[test]
fn test_counts_follow_edits() {
    let mut pst = load_fixture();
    pst.observation_data.truncate(4);
    pst.prior_information.clear();
    let text = pst.to_pst_string();

    let again = ControlFile::parse(&text, "edited.pst").unwrap();
    assert_eq!(again.nobs(), 4);
    assert_eq!(again.control_data.nobs(), 4);
    assert_eq!(again.control_data.nobsgp(), 1);
    assert_eq!(again.nprior(), 0);
    assert!(!text.contains("* prior information"));
}

#[test]
fn test_declared_count_mismatch_is_format_error() {
    let text = std::fs::read_to_string(data_path("pest.pst"))
        .unwrap()
        .replace("5 6 2 2 3", "5 7 2 2 3");
    match ControlFile::parse(&text, "short.pst") {
        Err(PestError::Format {
            source_name,
            section,
            message,
            ..
        }) => {
            assert_eq!(source_name, "short.pst");
            assert_eq!(section, "observation data");
            assert!(message.contains("6 of 7"), "{}", message);
        }
        other => panic!("expected a format error, got {:?}", other),
    }
}

#[test]
fn test_extra_rows_after_counted_sections() {
    let base = std::fs::read_to_string(data_path("pest.pst")).unwrap();

    let text = base.replace(
        "model.ins model.out\n",
        "model.ins model.out\nmore.ins more.out\n",
    );
    match ControlFile::parse(&text, "io.pst") {
        Err(PestError::Format { section, message, .. }) => {
            assert_eq!(section, "model input/output");
            assert!(message.contains("more.ins"), "{}", message);
        }
        other => panic!("expected a format error, got {:?}", other),
    }

    let text = base.replace(
        "regul_hk\n* regularisation",
        "regul_hk\npi3 1.0 * log(hk2) = 0.69897 1.0 regul_hk\n* regularisation",
    );
    match ControlFile::parse(&text, "prior.pst") {
        Err(PestError::Format { section, message, .. }) => {
            assert_eq!(section, "prior information");
            assert!(message.contains("pi3"), "{}", message);
        }
        other => panic!("expected a format error, got {:?}", other),
    }
}

#[test]
fn test_roundtrip_with_several_model_commands() {
    let text = std::fs::read_to_string(data_path("pest.pst"))
        .unwrap()
        .replace("1 1 single point 1 0 0", "1 1 single point");
    let mut pst = ControlFile::parse(&text, "commands.pst").unwrap();
    assert_eq!(pst.control_data.numcom(), 1);

    pst.model_command.push("second.bat".to_string());
    let again = ControlFile::parse(&pst.to_pst_string(), "commands.pst").unwrap();
    assert_eq!(again.model_command, vec!["model.bat", "second.bat"]);
    assert_eq!(again.control_data.numcom(), 2);
    assert_eq!(again.templates, pst.templates);
}

#[test]
fn test_header_mismatch_names_expected_header() {
    let text = std::fs::read_to_string(data_path("pest.pst"))
        .unwrap()
        .replace("* model command line", "* model commands");
    let err = ControlFile::parse(&text, "bad.pst").unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("bad.pst"));
    assert!(msg.contains("model command line"));
}

#[test]
fn test_missing_file() {
    let err = ControlFile::load(data_path("does_not_exist.pst")).unwrap_err();
    assert!(matches!(err, PestError::MissingFile { .. }));
}

#[test]
fn test_write_and_reload_from_disk() {
    let pst = load_fixture();
    let path = scratch_dir("write-reload").join("copy.pst");
    pst.write(&path).unwrap();

    let reloaded = ControlFile::load(&path).unwrap();
    assert_eq!(reloaded.par_names(), pst.par_names());
    assert_eq!(reloaded.obs_names(), pst.obs_names());
    assert_eq!(reloaded.filename(), Some(path.as_path()));
}

#[test]
fn test_parrep_overwrites_values() {
    let mut pst = load_fixture();
    pst.parrep(None::<&str>).unwrap();
    assert_relative_eq!(pst.parameter_data[0].value, 7.5);
    assert_relative_eq!(pst.parameter_data[1].value, 2.5);
    assert_relative_eq!(pst.parameter_data[3].value, 0.002);
    // bounds are untouched
    assert_relative_eq!(pst.parameter_data[0].upper_bound, 50.0);

    let bad = scratch_dir("parrep").join("bad.par");
    std::fs::write(&bad, "single point\nnope 1.0 1.0 0.0\n").unwrap();
    assert!(matches!(pst.parrep(Some(&bad)), Err(PestError::Referential(_))));
}

#[test]
fn test_subset_is_independent_copy() {
    let pst = load_fixture();
    let mut sub = pst
        .subset(Some(&["hk1", "hk3", "rch1"][..]), Some(&["h1", "f1"][..]))
        .unwrap();

    assert_eq!(sub.par_names(), vec!["hk1", "hk3", "rch1"]);
    assert_eq!(sub.obs_names(), vec!["h1", "f1"]);
    assert!(sub.prior_information.is_empty());
    assert_eq!(sub.tied_lines, vec!["hk3  hk1"]);
    assert_eq!(sub.control_data.npar(), 3);
    assert_eq!(sub.control_data.nobs(), 2);

    sub.observation_data[0].weight = 99.0;
    assert_relative_eq!(pst.observation_data[0].weight, 1.0);

    // dropping the parent fixes the tied parameter
    let orphan = pst.subset(Some(&["hk3", "rch1"][..]), None).unwrap();
    assert_eq!(orphan.parameter_data[0].transform, Transform::Fixed);
    assert!(orphan.tied_lines.is_empty());
    assert_eq!(orphan.par_groups(), vec!["hk", "rch"]);

    assert!(matches!(
        pst.subset(Some(&["zz"][..]), None),
        Err(PestError::Referential(_))
    ));
}

#[test]
fn test_json_roundtrip() {
    let pst = load_fixture();
    let json = pst.to_json().unwrap();
    let back = ControlFile::from_json(&json).unwrap();
    assert_eq!(back.parameter_data, pst.parameter_data);
    assert_eq!(back.observation_data, pst.observation_data);
    assert_eq!(back.tied_lines, pst.tied_lines);
}

#[test]
fn test_weight_summary() {
    let pst = load_fixture();
    let summary = pst.weight_summary().unwrap();
    assert_eq!(summary.nnz, 5);
    assert_relative_eq!(summary.min, 0.01);
    assert_relative_eq!(summary.max, 2.0);
}
