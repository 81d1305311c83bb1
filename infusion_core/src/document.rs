//! Drug configuration documents.
//!
//! A document is JSON shaped as
//! `{ "schemaVersion": any, "dataVersion": "<ISO-8601>"?, "drugs": [...] }`.
//! Parsing happens in two stages: the top-level shape is checked first
//! (`Error::Schema`), then each drug entry is decoded loosely and validated.
//! Strict [`DrugRecord`]s are only produced when every entry passes, so a
//! document is either accepted whole or rejected whole.

use crate::{Ampule, DrugRecord, Error, PrepNote, Ratio, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Loosely typed drug entry as it appears on the wire
///
/// Field names follow the camelCase schema; the short names used by older
/// documents (`pMin`, `conc`, `prepVolumesByConc`, ...) are accepted as aliases.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDrug {
    #[serde(default)]
    pub id: String,
    #[serde(default, alias = "name")]
    pub display_name: String,
    #[serde(default, alias = "color")]
    pub color_tag: String,
    #[serde(default, alias = "pMin")]
    pub dose_min: Option<f64>,
    #[serde(default, alias = "pMax")]
    pub dose_max: Option<f64>,
    #[serde(default, alias = "conc")]
    pub concentrations: Vec<String>,
    #[serde(default, alias = "defaultP")]
    pub default_dose: Option<f64>,
    #[serde(default, alias = "defaultConc")]
    pub default_concentration: Option<String>,
    #[serde(default, alias = "defaultTotal")]
    pub default_total_volume: Option<f64>,
    #[serde(default)]
    pub synonyms: Vec<String>,
    #[serde(default)]
    pub ampules: Vec<RawAmpule>,
    #[serde(default, alias = "prepVolumesByConc")]
    pub prep_volumes_by_concentration: BTreeMap<String, Vec<f64>>,
    #[serde(default, alias = "prepNote")]
    pub preparation_note: Option<RawPrepNote>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawAmpule {
    #[serde(default, alias = "name")]
    pub label: String,
    #[serde(alias = "sizeMl")]
    pub volume_ml: f64,
    #[serde(alias = "concMgPerMl")]
    pub concentration_mg_per_ml: f64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RawPrepNote {
    #[serde(default)]
    pub en: String,
    #[serde(default)]
    pub th: String,
    #[serde(default, alias = "isCritical")]
    pub critical: bool,
}

/// A parsed but not yet validated configuration document
#[derive(Clone, Debug)]
pub struct DrugDocument {
    pub schema_version: Option<Value>,
    pub data_version: Option<DateTime<Utc>>,
    entries: Vec<std::result::Result<RawDrug, String>>,
    problems: Vec<String>,
}

impl DrugDocument {
    /// Check the top-level shape and decode each drug entry
    ///
    /// Only a body that is not JSON, not an object, or lacks a `drugs`
    /// sequence fails here. Entry-level problems are collected for
    /// [`DrugDocument::validate`].
    pub fn parse(body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body)
            .map_err(|e| Error::Schema(format!("document is not valid JSON: {}", e)))?;

        let object = value
            .as_object()
            .ok_or_else(|| Error::Schema("top level is not an object".into()))?;

        let drugs = object
            .get("drugs")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::Schema("document has no `drugs` sequence".into()))?;

        let mut problems = Vec::new();

        let data_version = match object.get("dataVersion") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => match parse_timestamp(s) {
                Some(ts) => Some(ts),
                None => {
                    problems.push(format!("dataVersion '{}' is not an ISO-8601 timestamp", s));
                    None
                }
            },
            Some(other) => {
                problems.push(format!("dataVersion must be a string, got {}", other));
                None
            }
        };

        let entries = drugs
            .iter()
            .map(|entry| RawDrug::deserialize(entry).map_err(|e| e.to_string()))
            .collect();

        Ok(Self {
            schema_version: object.get("schemaVersion").cloned(),
            data_version,
            entries,
            problems,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Validate every entry
    ///
    /// Returns a list of problems, or empty Vec if the document can be swapped in.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = self.problems.clone();

        if self.entries.is_empty() {
            problems.push("document contains no drugs".to_string());
        }

        let mut seen_ids = HashSet::new();
        for (index, entry) in self.entries.iter().enumerate() {
            match entry {
                Ok(raw) => validate_drug(index, raw, &mut seen_ids, &mut problems),
                Err(e) => problems.push(format!("drugs[{}]: {}", index, e)),
            }
        }

        problems
    }

    /// Validate and convert into strict records
    pub fn into_records(self) -> Result<Vec<DrugRecord>> {
        let problems = self.validate();
        if !problems.is_empty() {
            return Err(Error::Validation(problems));
        }

        let mut records = Vec::with_capacity(self.entries.len());
        for (index, entry) in self.entries.into_iter().enumerate() {
            let record = entry.ok().and_then(into_record).ok_or_else(|| {
                Error::Validation(vec![format!("drugs[{}]: could not be converted", index)])
            })?;
            records.push(record);
        }
        Ok(records)
    }
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Accept only whole positive numbers that fit a bag volume
fn positive_integer(value: f64) -> Option<u32> {
    if value.is_finite() && value > 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Some(value as u32)
    } else {
        None
    }
}

fn validate_drug(
    index: usize,
    raw: &RawDrug,
    seen_ids: &mut HashSet<String>,
    problems: &mut Vec<String>,
) {
    let id = raw.id.trim();
    let who = if id.is_empty() {
        format!("drugs[{}]", index)
    } else {
        format!("drug '{}'", id)
    };

    if id.is_empty() {
        problems.push(format!("{}: empty id", who));
    } else if !seen_ids.insert(id.to_lowercase()) {
        problems.push(format!("{}: duplicate id", who));
    }

    match raw.dose_min {
        None => problems.push(format!("{}: missing doseMin", who)),
        Some(min) if !min.is_finite() || min < 0.0 => {
            problems.push(format!("{}: doseMin {} is not a non-negative number", who, min))
        }
        Some(_) => {}
    }

    match raw.dose_max {
        Some(max) if max == 0.0 => problems.push(format!(
            "{}: doseMax is 0 (omit doseMax for no ceiling)",
            who
        )),
        Some(max) if !max.is_finite() || max < 0.0 => {
            problems.push(format!("{}: doseMax {} is not a positive number", who, max))
        }
        Some(max) => {
            if let Some(min) = raw.dose_min.filter(|m| m.is_finite()) {
                if max < min {
                    problems.push(format!("{}: doseMax {} is below doseMin {}", who, max, min));
                }
            }
        }
        None => {}
    }

    if let Some(dose) = raw.default_dose {
        if !dose.is_finite() || dose < 0.0 {
            problems.push(format!("{}: defaultDose {} is not a non-negative number", who, dose));
        }
    }

    if raw.concentrations.is_empty() {
        problems.push(format!("{}: no concentrations", who));
    }
    let mut offered = HashSet::new();
    for conc in &raw.concentrations {
        match Ratio::parse(conc) {
            Some(ratio) => {
                offered.insert(ratio);
            }
            None => problems.push(format!("{}: malformed concentration '{}'", who, conc)),
        }
    }

    if let Some(default) = &raw.default_concentration {
        match Ratio::parse(default) {
            Some(ratio) if !offered.contains(&ratio) => problems.push(format!(
                "{}: default concentration '{}' is not offered",
                who, default
            )),
            Some(_) => {}
            None => problems.push(format!(
                "{}: malformed default concentration '{}'",
                who, default
            )),
        }
    }

    if let Some(total) = raw.default_total_volume {
        if positive_integer(total).is_none() {
            problems.push(format!(
                "{}: defaultTotalVolume {} is not a positive integer",
                who, total
            ));
        }
    }

    for (key, totals) in &raw.prep_volumes_by_concentration {
        match Ratio::parse(key) {
            Some(ratio) if !offered.contains(&ratio) => problems.push(format!(
                "{}: prep-volume key '{}' is not an offered concentration",
                who, key
            )),
            Some(_) => {}
            None => problems.push(format!("{}: malformed prep-volume key '{}'", who, key)),
        }
        for total in totals {
            if positive_integer(*total).is_none() {
                problems.push(format!(
                    "{}: prep-volume total {} for '{}' is not a positive integer",
                    who, total, key
                ));
            }
        }
    }

    let has_prep = raw
        .prep_volumes_by_concentration
        .values()
        .any(|totals| !totals.is_empty());
    if has_prep && raw.ampules.is_empty() {
        problems.push(format!("{}: has preparation volumes but no ampules", who));
    }

    for (ix, ampule) in raw.ampules.iter().enumerate() {
        if !ampule.concentration_mg_per_ml.is_finite() || ampule.concentration_mg_per_ml <= 0.0 {
            problems.push(format!(
                "{}: ampule {} concentration {} is not positive",
                who, ix, ampule.concentration_mg_per_ml
            ));
        }
        if !ampule.volume_ml.is_finite() || ampule.volume_ml <= 0.0 {
            problems.push(format!(
                "{}: ampule {} volume {} is not positive",
                who, ix, ampule.volume_ml
            ));
        }
    }
}

fn into_record(raw: RawDrug) -> Option<DrugRecord> {
    let concentrations = raw
        .concentrations
        .iter()
        .map(|c| Ratio::parse(c))
        .collect::<Option<Vec<_>>>()?;

    let default_concentration = match &raw.default_concentration {
        Some(s) => Ratio::parse(s)?,
        None => concentrations.first()?.clone(),
    };

    let mut prep_volumes_by_concentration = BTreeMap::new();
    for (key, totals) in &raw.prep_volumes_by_concentration {
        let totals = totals
            .iter()
            .map(|t| positive_integer(*t))
            .collect::<Option<Vec<_>>>()?;
        prep_volumes_by_concentration.insert(Ratio::parse(key)?, totals);
    }

    let dose_min = raw.dose_min?;
    let mut synonyms: Vec<String> = Vec::new();
    for synonym in &raw.synonyms {
        let lower = synonym.trim().to_lowercase();
        if !lower.is_empty() && !synonyms.contains(&lower) {
            synonyms.push(lower);
        }
    }

    let id = raw.id.trim().to_string();
    Some(DrugRecord {
        display_name: if raw.display_name.is_empty() {
            id.clone()
        } else {
            raw.display_name
        },
        id,
        color_tag: raw.color_tag,
        dose_min,
        dose_max: raw.dose_max,
        concentrations,
        default_dose: raw.default_dose.unwrap_or(dose_min),
        default_concentration,
        default_total_volume: match raw.default_total_volume {
            Some(t) => Some(positive_integer(t)?),
            None => None,
        },
        synonyms,
        ampules: raw
            .ampules
            .into_iter()
            .map(|a| Ampule {
                label: a.label,
                volume_ml: a.volume_ml,
                concentration_mg_per_ml: a.concentration_mg_per_ml,
            })
            .collect(),
        prep_volumes_by_concentration,
        preparation_note: raw.preparation_note.map(|n| PrepNote {
            en: n.en,
            th: n.th,
            critical: n.critical,
        }),
    })
}
