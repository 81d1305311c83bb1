//! Core domain types for the infusion calculator.
//!
//! This module defines the fundamental types used throughout the system:
//! - Concentration ratios and ampules
//! - Drug records and the registry that holds them
//! - The interactive session and its preparation selection
//! - Range classification results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

// ============================================================================
// Concentration Ratio
// ============================================================================

/// A validated `mg:mL` concentration such as `4:100`.
///
/// Both parts are finite and strictly positive. The whitespace-stripped label
/// is kept verbatim because it is what selectors and URLs carry; equality,
/// ordering and hashing all go through the label.
#[derive(Clone, Debug)]
pub struct Ratio {
    mg: f64,
    ml: f64,
    label: String,
}

impl Ratio {
    /// Parse a ratio string, returning `None` for anything malformed.
    pub fn parse(s: &str) -> Option<Self> {
        let label: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let (mg, ml) = label.split_once(':')?;
        let mg = parse_positive(mg)?;
        let ml = parse_positive(ml)?;
        Some(Self { mg, ml, label })
    }

    pub fn mg(&self) -> f64 {
        self.mg
    }

    pub fn ml(&self) -> f64 {
        self.ml
    }

    /// Concentration `A` in mg per mL
    pub fn mg_per_ml(&self) -> f64 {
        self.mg / self.ml
    }

    pub fn as_str(&self) -> &str {
        &self.label
    }
}

fn parse_positive(s: &str) -> Option<f64> {
    s.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}

impl PartialEq for Ratio {
    fn eq(&self, other: &Self) -> bool {
        self.label == other.label
    }
}

impl Eq for Ratio {}

impl Hash for Ratio {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.label.hash(state);
    }
}

impl PartialOrd for Ratio {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ratio {
    fn cmp(&self, other: &Self) -> Ordering {
        self.label.cmp(&other.label)
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

impl FromStr for Ratio {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ratio::parse(s).ok_or_else(|| crate::Error::Other(format!("invalid ratio '{}'", s)))
    }
}

impl Serialize for Ratio {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.label)
    }
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ratio::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid ratio '{}'", raw)))
    }
}

// ============================================================================
// Drug Records
// ============================================================================

/// A commercially supplied drug unit used as the draw-down source
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Ampule {
    pub label: String,
    pub volume_ml: f64,
    pub concentration_mg_per_ml: f64,
}

/// UI language
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Th,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Th => "th",
        }
    }
}

/// Localized preparation note
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PrepNote {
    pub en: String,
    pub th: String,
    pub critical: bool,
}

impl PrepNote {
    pub fn text(&self, language: Language) -> &str {
        match language {
            Language::En => &self.en,
            Language::Th => &self.th,
        }
    }
}

/// Identity and dosing metadata for one agent
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DrugRecord {
    pub id: String,
    pub display_name: String,
    pub color_tag: String,
    /// Minimum dose-rate (mcg/kg/min), inclusive
    pub dose_min: f64,
    /// Maximum dose-rate, inclusive; `None` means no ceiling
    pub dose_max: Option<f64>,
    pub concentrations: Vec<Ratio>,
    pub default_dose: f64,
    pub default_concentration: Ratio,
    pub default_total_volume: Option<u32>,
    pub synonyms: Vec<String>,
    pub ampules: Vec<Ampule>,
    pub prep_volumes_by_concentration: BTreeMap<Ratio, Vec<u32>>,
    pub preparation_note: Option<PrepNote>,
}

impl DrugRecord {
    pub fn has_concentration(&self, concentration: &Ratio) -> bool {
        self.concentrations.contains(concentration)
    }

    /// Bag volumes registered for a concentration (empty if none)
    pub fn allowed_totals(&self, concentration: &Ratio) -> &[u32] {
        self.prep_volumes_by_concentration
            .get(concentration)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Pick the requested concentration if offered, else the declared default,
    /// else the first offered one.
    pub fn resolve_concentration(&self, requested: Option<&str>) -> Ratio {
        if let Some(ratio) = requested.and_then(Ratio::parse) {
            if self.has_concentration(&ratio) {
                return ratio;
            }
        }
        if self.has_concentration(&self.default_concentration) {
            return self.default_concentration.clone();
        }
        self.concentrations
            .first()
            .cloned()
            .unwrap_or_else(|| self.default_concentration.clone())
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Where the active drug table came from
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RegistryOrigin {
    Builtin,
    Remote,
}

/// The active list of drug records plus derived lookup indices
///
/// `drugs` order is display order. The indices are rebuilt on every replace
/// and never edited independently.
#[derive(Clone, Debug)]
pub struct ConfigRegistry {
    pub(crate) drugs: Vec<DrugRecord>,
    pub(crate) by_id: HashMap<String, usize>,
    pub(crate) by_synonym: HashMap<String, String>,
    pub(crate) origin: RegistryOrigin,
    pub(crate) data_version: Option<DateTime<Utc>>,
}

// ============================================================================
// Session Types
// ============================================================================

/// Conversion direction
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// mcg/kg/min → mL/hr
    #[default]
    Forward,
    /// mL/hr → mcg/kg/min
    Reverse,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Forward => "forward",
            Mode::Reverse => "reverse",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Mode::Forward => Mode::Reverse,
            Mode::Reverse => Mode::Forward,
        }
    }
}

/// Ampule and bag-volume choice for the preparation guide
///
/// `None` fields are lazily defaulted against the current drug.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrepSelection {
    pub ampule_index: Option<usize>,
    pub total_volume_ml: Option<u32>,
}

/// The single active calculator session
#[derive(Clone, Debug, PartialEq)]
pub struct Session {
    pub selected_drug_id: String,
    pub mode: Mode,
    pub selected_concentration: Ratio,
    pub weight_kg: Option<f64>,
    /// Forward-mode input (mcg/kg/min)
    pub dose_rate: Option<f64>,
    /// Reverse-mode input (mL/hr)
    pub infusion_rate: Option<f64>,
    pub language: Language,
    pub prep: PrepSelection,
}

// ============================================================================
// Classification
// ============================================================================

/// Where a dose-rate falls relative to a drug's limits
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RangeStatus {
    Low,
    Ok,
    High,
    /// Dose-rate missing or not a finite number
    Unknown,
}

impl RangeStatus {
    /// Severity class consumed by the presentation layer
    pub fn severity_class(&self) -> &'static str {
        match self {
            RangeStatus::Low => "warn",
            RangeStatus::Ok => "ok",
            RangeStatus::High => "bad",
            RangeStatus::Unknown => "muted",
        }
    }
}
