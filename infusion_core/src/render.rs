//! Presentation view-model.
//!
//! `recalc` turns the session into every string the result panel, range note
//! and preparation guide show. Nothing here mutates the session.

use crate::conversion::Conversion;
use crate::prep::{total_options, TotalOption};
use crate::{ConfigRegistry, DrugRecord, Language, Mode, RangeStatus, Result, Session};
use serde::Serialize;

/// Shown in place of a value that cannot be computed
pub const PLACEHOLDER: &str = "—";

struct Strings {
    below: &'static str,
    within: &'static str,
    above: &'static str,
    unknown: &'static str,
    mode_forward: &'static str,
    mode_reverse: &'static str,
    prep_title: &'static str,
}

static EN: Strings = Strings {
    below: "Below min",
    within: "Within range",
    above: "Above max",
    unknown: "Not calculated",
    mode_forward: "mcg/kg/min → mL/hr (Tap to change mode)",
    mode_reverse: "mL/hr → mcg/kg/min (Tap to change mode)",
    prep_title: "Preparation guide",
};

static TH: Strings = Strings {
    below: "ต่ำกว่าเกณฑ์",
    within: "อยู่ในเกณฑ์",
    above: "สูงกว่าเกณฑ์",
    unknown: "ยังคำนวณไม่ได้",
    mode_forward: "mcg/kg/min → mL/hr (กดเพื่อเปลี่ยนโหมด)",
    mode_reverse: "mL/hr → mcg/kg/min (กดเพื่อเปลี่ยนโหมด)",
    prep_title: "วิธีการเตรียมยา",
};

fn strings(language: Language) -> &'static Strings {
    match language {
        Language::En => &EN,
        Language::Th => &TH,
    }
}

fn range_sentence(language: Language, min: &str, max: &str, drug: &str) -> String {
    match language {
        Language::En => format!("Range: {} to {} mcg/kg/min for {}.", min, max, drug),
        Language::Th => format!("ขนาดที่กำหนด: {} ถึง {} mcg/kg/min สำหรับ {}.", min, max, drug),
    }
}

fn limits_sentence(
    language: Language,
    weight: &str,
    concentration: &str,
    dose_max: &str,
    max_rate: &str,
) -> String {
    match language {
        Language::En => format!(
            "For weight {} kg and concentration {}, max dose is {} mcg/kg/min → max infusion {} mL/hr.",
            weight, concentration, dose_max, max_rate
        ),
        Language::Th => format!(
            "สำหรับน้ำหนัก {} kg และความเข้มข้น {}, Dose สูงสุดคือ {} mcg/kg/min → Infusion rate สูงสุด {} mL/hr.",
            weight, concentration, dose_max, max_rate
        ),
    }
}

fn no_max_sentence(language: Language, drug: &str) -> String {
    match language {
        Language::En => format!("No specified maximum dose in table for {}.", drug),
        Language::Th => format!("ไม่มีการระบุขนาดยาสูงสุดในตารางสำหรับ {}.", drug),
    }
}

fn fixed(value: f64, places: usize) -> String {
    format!("{:.*}", places, value)
}

/// One ampule choice
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct AmpuleOption {
    pub label: String,
    pub active: bool,
}

/// The preparation guide panel
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct PrepView {
    pub title: String,
    pub ampules: Vec<AmpuleOption>,
    pub totals: Vec<TotalOption>,
    /// Drug volume to 1 dp, empty when undetermined
    pub drug_volume: String,
    /// Solvent volume to 1 dp, empty when undetermined
    pub solvent_volume: String,
    pub infeasible: bool,
    pub note: Option<String>,
    pub critical: bool,
}

/// Everything the presentation layer shows after a recalculation
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Recalc {
    pub drug_id: String,
    pub drug_name: String,
    pub color_tag: String,
    pub mode: Mode,
    pub mode_label: String,
    pub title: String,
    pub value: String,
    /// Q to 3 dp, empty when weight is missing
    pub factor: String,
    pub status: RangeStatus,
    pub status_label: String,
    pub severity: String,
    pub range_text: String,
    pub limits_text: String,
    pub prep: PrepView,
}

/// Build the view for the current session
///
/// Lazy preparation defaults are resolved on a copy so rendering stays
/// side-effect free.
pub fn recalc(session: &Session, registry: &ConfigRegistry) -> Result<Recalc> {
    let drug = session.drug(registry)?;
    let text = strings(session.language);
    let conversion = Conversion::for_session(session, drug);

    let (title, value) = match session.mode {
        Mode::Forward => (
            "Infusion rate (mL/hr)",
            conversion
                .output
                .map(|rate| format!("{} mL/hr", fixed(rate, 2))),
        ),
        Mode::Reverse => (
            "Required Dose (mcg/kg/min)",
            conversion
                .output
                .map(|p| format!("{} mcg/kg/min", fixed(p, 2))),
        ),
    };

    let status_label = match conversion.status {
        RangeStatus::Low => text.below,
        RangeStatus::Ok => text.within,
        RangeStatus::High => text.above,
        RangeStatus::Unknown => text.unknown,
    };

    let max_text = drug
        .dose_max
        .map(|max| fixed(max, 2))
        .unwrap_or_else(|| "no max".to_string());
    let range_text = range_sentence(
        session.language,
        &fixed(drug.dose_min, 2),
        &max_text,
        &drug.display_name,
    );

    let limits_text = match (drug.dose_max, conversion.max_rate) {
        (Some(max), Some(max_rate)) => limits_sentence(
            session.language,
            &session
                .weight_kg
                .map(|b| fixed(b, 1))
                .unwrap_or_else(|| PLACEHOLDER.to_string()),
            session.selected_concentration.as_str(),
            &fixed(max, 2),
            &fixed(max_rate, 2),
        ),
        _ => no_max_sentence(session.language, &drug.display_name),
    };

    Ok(Recalc {
        drug_id: drug.id.clone(),
        drug_name: drug.display_name.clone(),
        color_tag: drug.color_tag.clone(),
        mode: session.mode,
        mode_label: match session.mode {
            Mode::Forward => text.mode_forward,
            Mode::Reverse => text.mode_reverse,
        }
        .to_string(),
        title: title.to_string(),
        value: value.unwrap_or_else(|| PLACEHOLDER.to_string()),
        factor: conversion.q.map(|q| fixed(q, 3)).unwrap_or_default(),
        status: conversion.status,
        status_label: status_label.to_string(),
        severity: conversion.status.severity_class().to_string(),
        range_text,
        limits_text,
        prep: prep_view(session, drug),
    })
}

fn prep_view(session: &Session, drug: &DrugRecord) -> PrepView {
    let concentration = &session.selected_concentration;
    let mut selection = session.prep.clone();
    selection.resolve(drug, concentration);

    let ampules = drug
        .ampules
        .iter()
        .enumerate()
        .map(|(ix, ampule)| AmpuleOption {
            label: ampule.label.clone(),
            active: selection.ampule_index == Some(ix),
        })
        .collect();

    let outputs = selection.outputs(drug, concentration);
    let note = drug.preparation_note.as_ref();

    PrepView {
        title: strings(session.language).prep_title.to_string(),
        ampules,
        totals: total_options(drug, concentration, selection.total_volume_ml),
        drug_volume: outputs
            .map(|o| fixed(o.drug_volume_ml, 1))
            .unwrap_or_default(),
        solvent_volume: outputs
            .map(|o| fixed(o.solvent_volume_ml, 1))
            .unwrap_or_default(),
        infeasible: outputs.map(|o| o.is_infeasible()).unwrap_or(false),
        note: note.map(|n| n.text(session.language).to_string()),
        critical: note.map(|n| n.critical).unwrap_or(false),
    }
}
