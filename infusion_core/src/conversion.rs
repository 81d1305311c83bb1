//! Dose-rate ↔ infusion-rate conversion.
//!
//! With weight `B` (kg) and concentration `A` (mg/mL):
//! - `Q = 0.06 × B / A` is the mL/hr delivered per 1 mcg/kg/min
//! - forward: `rate = P × Q`
//! - reverse: `P = rate / Q`
//!
//! The 0.06 factor turns mcg/kg/min into mg/kg/hr.

use crate::{DrugRecord, Mode, RangeStatus, Ratio, Session};

/// mcg/min → mg/hr
pub const DOSE_FACTOR: f64 = 0.06;

/// mL/hr delivered per unit dose-rate
pub fn compute_q(weight_kg: f64, mg_per_ml: f64) -> f64 {
    (DOSE_FACTOR * weight_kg) / mg_per_ml
}

/// Infusion rate (mL/hr) for a dose-rate
pub fn compute_rate(dose_rate: f64, q: f64) -> f64 {
    dose_rate * q
}

/// Dose-rate (mcg/kg/min) for an infusion rate
pub fn compute_p(rate: f64, q: f64) -> f64 {
    rate / q
}

/// Classify a dose-rate against a drug's limits
///
/// Both bounds are inclusive. A drug without `dose_max` is never `High`.
/// Missing or non-finite input is `Unknown`.
pub fn classify(dose_rate: Option<f64>, drug: &DrugRecord) -> RangeStatus {
    let p = match dose_rate {
        Some(p) if p.is_finite() => p,
        _ => return RangeStatus::Unknown,
    };

    if p < drug.dose_min {
        return RangeStatus::Low;
    }
    match drug.dose_max {
        Some(max) if p > max => RangeStatus::High,
        _ => RangeStatus::Ok,
    }
}

fn finite(value: f64) -> Option<f64> {
    Some(value).filter(|v| v.is_finite())
}

/// Result of one recalculation
#[derive(Clone, Debug, PartialEq)]
pub struct Conversion {
    pub mode: Mode,
    /// `None` when weight is missing or not positive
    pub q: Option<f64>,
    /// Infusion rate in forward mode, dose-rate in reverse mode
    pub output: Option<f64>,
    /// The dose-rate that was classified
    pub dose_rate: Option<f64>,
    pub status: RangeStatus,
    /// Infusion rate at `dose_max`, if the drug has a ceiling
    pub max_rate: Option<f64>,
}

impl Conversion {
    /// Evaluate the active mode from explicit inputs
    pub fn evaluate(
        drug: &DrugRecord,
        concentration: &Ratio,
        mode: Mode,
        weight_kg: Option<f64>,
        dose_rate: Option<f64>,
        infusion_rate: Option<f64>,
    ) -> Self {
        let q = weight_kg
            .filter(|b| b.is_finite() && *b > 0.0)
            .and_then(|b| finite(compute_q(b, concentration.mg_per_ml())));

        let (output, dose_rate) = match mode {
            Mode::Forward => {
                let rate = q.zip(dose_rate).and_then(|(q, p)| finite(compute_rate(p, q)));
                (rate, dose_rate)
            }
            Mode::Reverse => {
                let p = q
                    .zip(infusion_rate)
                    .and_then(|(q, rate)| finite(compute_p(rate, q)));
                (p, p)
            }
        };

        let max_rate = q
            .zip(drug.dose_max)
            .and_then(|(q, max)| finite(compute_rate(max, q)));

        Self {
            mode,
            q,
            output,
            dose_rate,
            status: classify(dose_rate, drug),
            max_rate,
        }
    }

    /// Evaluate a session against its selected drug
    pub fn for_session(session: &Session, drug: &DrugRecord) -> Self {
        Self::evaluate(
            drug,
            &session.selected_concentration,
            session.mode,
            session.weight_kg,
            session.dose_rate,
            session.infusion_rate,
        )
    }
}
