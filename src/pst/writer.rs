//! Control-file writer.
//!
//! Tables are written from their in-memory state in fixed-width columns, with
//! the control-data counts recomputed from the current table sizes.

use crate::pst::control_data::PestMode;
use crate::pst::control_file::ControlFile;
use crate::pst::format::{ffmt, ifmt, sfmt, sfmt_long};
use crate::pst::records::{
    FilePair, ObservationRecord, ParameterGroupRecord, ParameterRecord, PriorInformationRecord,
};
use std::fmt::Write;

fn parameter_group_row(g: &ParameterGroupRecord) -> String {
    let mut fields = vec![
        sfmt(&g.name),
        sfmt(&g.inctyp),
        ffmt(g.derinc),
        ffmt(g.derinclb),
        sfmt(&g.forcen),
        ffmt(g.derincmul),
        sfmt(&g.dermthd),
    ];
    // split settings are positional, so stop at the first one missing
    if let Some(thresh) = g.splitthresh {
        fields.push(ffmt(thresh));
        if let Some(reldiff) = g.splitreldiff {
            fields.push(ffmt(reldiff));
            if let Some(action) = &g.splitaction {
                fields.push(sfmt(action));
            }
        }
    }
    fields.join(" ")
}

fn parameter_row(p: &ParameterRecord) -> String {
    [
        sfmt(&p.name),
        sfmt(p.transform.as_str()),
        sfmt(&p.change_limit),
        ffmt(p.value),
        ffmt(p.lower_bound),
        ffmt(p.upper_bound),
        sfmt(&p.group),
        ffmt(p.scale),
        ffmt(p.offset),
        ifmt(p.dercom),
    ]
    .join(" ")
}

fn observation_row(o: &ObservationRecord) -> String {
    [sfmt(&o.name), ffmt(o.value), ffmt(o.weight), sfmt(&o.group)].join(" ")
}

fn prior_row(pi: &PriorInformationRecord) -> String {
    [
        sfmt(&pi.label),
        sfmt_long(&pi.equation),
        ffmt(pi.weight),
        sfmt(&pi.group),
    ]
    .join(" ")
}

fn pair_row(pair: &FilePair) -> String {
    format!("{} {}", pair.pest_file, pair.model_file)
}

/// Observation groups as written: observation data groups, then any prior
/// information groups not already listed.
pub(crate) fn written_observation_groups(pst: &ControlFile) -> Vec<String> {
    let mut groups = pst.obs_groups();
    for group in pst.prior_groups() {
        if !groups.contains(&group) {
            groups.push(group);
        }
    }
    groups
}

/// Render a control file.
pub(crate) fn write_pst(pst: &ControlFile) -> String {
    let mut control_data = pst.control_data.clone();
    control_data.set_counts(&pst.counts());

    let mut lines: Vec<String> = vec!["pcf".to_string(), "* control data".to_string()];
    lines.extend(control_data.to_lines());
    lines.extend(pst.other_lines.iter().cloned());

    lines.push("* parameter groups".to_string());
    lines.extend(pst.parameter_groups.iter().map(parameter_group_row));

    lines.push("* parameter data".to_string());
    lines.extend(pst.parameter_data.iter().map(parameter_row));
    lines.extend(pst.tied_lines.iter().cloned());

    lines.push("* observation groups".to_string());
    lines.extend(written_observation_groups(pst));

    lines.push("* observation data".to_string());
    lines.extend(pst.observation_data.iter().map(observation_row));

    lines.push("* model command line".to_string());
    lines.extend(pst.model_command.iter().cloned());

    lines.push("* model input/output".to_string());
    lines.extend(pst.templates.iter().map(pair_row));
    lines.extend(pst.instructions.iter().map(pair_row));

    if !pst.prior_information.is_empty() {
        lines.push("* prior information".to_string());
        lines.extend(pst.prior_information.iter().map(prior_row));
    }

    if control_data.pestmode() == PestMode::Regularisation {
        let regularization = pst.regularization.clone().unwrap_or_default();
        lines.extend(regularization.to_lines(pst.nnz_obs()));
    }

    let mut out = String::new();
    for line in lines {
        // writing to a String cannot fail
        let _ = writeln!(out, "{}", line);
    }
    out
}
