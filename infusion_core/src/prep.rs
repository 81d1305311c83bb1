//! Preparation guide: how much drug and solvent make up a bag.
//!
//! Selection rules:
//! - picking an ampule keeps the current total if it is still allowed
//! - picking a concentration revalidates the total against the new set
//! - picking a drug clears both, to be defaulted lazily on next render

use crate::{Ampule, DrugRecord, PrepSelection, Ratio};
use serde::Serialize;

/// Bag volumes always offered by the selector, in ascending order
pub const CANONICAL_TOTALS: [u32; 4] = [50, 100, 250, 500];

/// Computed drug and solvent volumes
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PrepOutputs {
    pub required_mg: f64,
    pub drug_volume_ml: f64,
    /// Negative when the drug alone exceeds the bag volume
    pub solvent_volume_ml: f64,
}

impl PrepOutputs {
    /// The drug volume does not fit in the chosen total
    pub fn is_infeasible(&self) -> bool {
        self.solvent_volume_ml < 0.0
    }
}

/// Derive drug/solvent volumes, or `None` when undetermined
pub fn compute_outputs(
    ampule: Option<&Ampule>,
    concentration: Option<&Ratio>,
    total_volume_ml: Option<f64>,
) -> Option<PrepOutputs> {
    let ampule = ampule?;
    let total = total_volume_ml.filter(|t| t.is_finite())?;
    let mg_per_ml = concentration.map(Ratio::mg_per_ml).filter(|a| a.is_finite())?;
    if !ampule.concentration_mg_per_ml.is_finite() {
        return None;
    }

    let required_mg = mg_per_ml * total;
    let drug_volume_ml = required_mg / ampule.concentration_mg_per_ml;
    let solvent_volume_ml = total - drug_volume_ml;

    if !drug_volume_ml.is_finite() || !solvent_volume_ml.is_finite() {
        return None;
    }

    Some(PrepOutputs {
        required_mg,
        drug_volume_ml,
        solvent_volume_ml,
    })
}

/// Pick the default bag volume for a drug at a concentration
///
/// The drug's own default wins if allowed, then the first allowed canonical
/// total. `None` means nothing is available at this concentration.
pub fn choose_default_total(drug: &DrugRecord, concentration: &Ratio) -> Option<u32> {
    let allowed = drug.allowed_totals(concentration);

    if let Some(default) = drug.default_total_volume {
        if allowed.contains(&default) {
            return Some(default);
        }
    }

    CANONICAL_TOTALS
        .iter()
        .copied()
        .find(|t| allowed.contains(t))
}

/// One bag-volume choice as shown to the user
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
pub struct TotalOption {
    pub volume_ml: u32,
    pub enabled: bool,
    /// Never set on a disabled option
    pub active: bool,
}

/// The full canonical ladder, disabled where not allowed
pub fn total_options(
    drug: &DrugRecord,
    concentration: &Ratio,
    selected: Option<u32>,
) -> Vec<TotalOption> {
    let allowed = drug.allowed_totals(concentration);
    CANONICAL_TOTALS
        .iter()
        .map(|&volume_ml| {
            let enabled = allowed.contains(&volume_ml);
            TotalOption {
                volume_ml,
                enabled,
                active: enabled && selected == Some(volume_ml),
            }
        })
        .collect()
}

impl PrepSelection {
    /// Forget both choices (drug changed)
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Fill in lazy defaults against the current drug and concentration
    pub fn resolve(&mut self, drug: &DrugRecord, concentration: &Ratio) {
        let ampule_valid = self
            .ampule_index
            .map(|ix| ix < drug.ampules.len())
            .unwrap_or(false);
        if !ampule_valid {
            self.ampule_index = if drug.ampules.is_empty() { None } else { Some(0) };
        }
        self.revalidate_total(drug, concentration);
    }

    /// Choose an ampule; out-of-range indices are ignored
    pub fn select_ampule(&mut self, index: usize, drug: &DrugRecord, concentration: &Ratio) {
        if index >= drug.ampules.len() {
            tracing::debug!("Ignoring ampule {} for '{}'", index, drug.id);
            return;
        }
        self.ampule_index = Some(index);
        self.revalidate_total(drug, concentration);
    }

    /// Choose a bag volume; volumes not allowed at this concentration are ignored
    pub fn select_total(&mut self, volume_ml: u32, drug: &DrugRecord, concentration: &Ratio) {
        if drug.allowed_totals(concentration).contains(&volume_ml) {
            self.total_volume_ml = Some(volume_ml);
        } else {
            tracing::debug!(
                "Ignoring total {} mL for '{}' at {}",
                volume_ml,
                drug.id,
                concentration
            );
        }
    }

    /// Concentration changed: keep the total only if still allowed
    pub fn on_concentration_change(&mut self, drug: &DrugRecord, concentration: &Ratio) {
        self.revalidate_total(drug, concentration);
    }

    fn revalidate_total(&mut self, drug: &DrugRecord, concentration: &Ratio) {
        let allowed = drug.allowed_totals(concentration);
        let still_allowed = self
            .total_volume_ml
            .map(|t| allowed.contains(&t))
            .unwrap_or(false);
        if !still_allowed {
            self.total_volume_ml = choose_default_total(drug, concentration);
        }
    }

    pub fn ampule<'a>(&self, drug: &'a DrugRecord) -> Option<&'a Ampule> {
        self.ampule_index.and_then(|ix| drug.ampules.get(ix))
    }

    /// Outputs for the current selection
    pub fn outputs(&self, drug: &DrugRecord, concentration: &Ratio) -> Option<PrepOutputs> {
        compute_outputs(
            self.ampule(drug),
            Some(concentration),
            self.total_volume_ml.map(f64::from),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_default_registry;

    fn ratio(s: &str) -> Ratio {
        Ratio::parse(s).unwrap()
    }

    fn ampule(conc: f64) -> Ampule {
        Ampule {
            label: "test".into(),
            volume_ml: 10.0,
            concentration_mg_per_ml: conc,
        }
    }

    fn drug(id: &str) -> DrugRecord {
        build_default_registry().get(id).unwrap().clone()
    }

    #[test]
    fn test_compute_outputs() {
        let out = compute_outputs(Some(&ampule(25.0)), Ratio::parse("2:1").as_ref(), Some(100.0))
            .unwrap();
        assert!((out.required_mg - 200.0).abs() < 1e-9);
        assert!((out.drug_volume_ml - 8.0).abs() < 1e-9);
        assert!((out.solvent_volume_ml - 92.0).abs() < 1e-9);
        assert!(!out.is_infeasible());
    }

    #[test]
    fn test_compute_outputs_undetermined() {
        let amp = ampule(25.0);
        assert!(compute_outputs(None, Some(&ratio("2:1")), Some(100.0)).is_none());
        assert!(compute_outputs(Some(&amp), Ratio::parse("2:0").as_ref(), Some(100.0)).is_none());
        assert!(compute_outputs(Some(&amp), Ratio::parse("21").as_ref(), Some(100.0)).is_none());
        assert!(compute_outputs(Some(&amp), Some(&ratio("2:1")), None).is_none());
        assert!(compute_outputs(Some(&amp), Some(&ratio("2:1")), Some(f64::NAN)).is_none());
        assert!(compute_outputs(Some(&ampule(f64::NAN)), Some(&ratio("2:1")), Some(100.0)).is_none());
    }

    #[test]
    fn test_negative_solvent_is_surfaced() {
        // 8 mg/mL from a 1 mg/mL ampule cannot fit
        let out = compute_outputs(Some(&ampule(1.0)), Some(&ratio("8:1")), Some(100.0)).unwrap();
        assert!((out.drug_volume_ml - 800.0).abs() < 1e-9);
        assert!((out.solvent_volume_ml + 700.0).abs() < 1e-9);
        assert!(out.is_infeasible());
    }

    #[test]
    fn test_default_total_prefers_drug_default() {
        let levophed = drug("levophed");
        assert_eq!(choose_default_total(&levophed, &ratio("4:100")), Some(100));
    }

    #[test]
    fn test_default_total_falls_back_to_ladder() {
        let levophed = drug("levophed");
        assert_eq!(choose_default_total(&levophed, &ratio("4:250")), Some(250));
    }

    #[test]
    fn test_default_total_none_available() {
        let ntg = drug("ntg");
        assert_eq!(choose_default_total(&ntg, &ratio("2:1")), None);
        let options = total_options(&ntg, &ratio("2:1"), None);
        assert_eq!(options.len(), 4);
        assert!(options.iter().all(|o| !o.enabled && !o.active));
    }

    #[test]
    fn test_total_options_mark_allowed_and_active() {
        let primacor = drug("primacor");
        let options = total_options(&primacor, &ratio("1:5"), Some(50));
        assert_eq!(
            options,
            vec![
                TotalOption { volume_ml: 50, enabled: true, active: true },
                TotalOption { volume_ml: 100, enabled: true, active: false },
                TotalOption { volume_ml: 250, enabled: false, active: false },
                TotalOption { volume_ml: 500, enabled: false, active: false },
            ]
        );
    }

    #[test]
    fn test_resolve_fills_lazy_defaults() {
        let levophed = drug("levophed");
        let mut sel = PrepSelection::default();
        sel.resolve(&levophed, &ratio("4:250"));
        assert_eq!(sel.ampule_index, Some(0));
        assert_eq!(sel.total_volume_ml, Some(250));
    }

    #[test]
    fn test_concentration_change_revalidates_total() {
        let levophed = drug("levophed");
        let mut sel = PrepSelection::default();
        sel.resolve(&levophed, &ratio("4:250"));
        sel.select_total(500, &levophed, &ratio("4:250"));
        assert_eq!(sel.total_volume_ml, Some(500));

        sel.on_concentration_change(&levophed, &ratio("4:100"));
        assert_eq!(sel.total_volume_ml, Some(100));

        // 100 remains valid for 8:100
        sel.on_concentration_change(&levophed, &ratio("8:100"));
        assert_eq!(sel.total_volume_ml, Some(100));
    }

    #[test]
    fn test_select_ampule_keeps_allowed_total() {
        let dopamine = drug("dopamine");
        let mut sel = PrepSelection::default();
        sel.resolve(&dopamine, &ratio("2:1"));
        sel.select_total(500, &dopamine, &ratio("2:1"));
        sel.select_ampule(0, &dopamine, &ratio("2:1"));
        assert_eq!(sel.total_volume_ml, Some(500));

        sel.select_ampule(7, &dopamine, &ratio("2:1"));
        assert_eq!(sel.ampule_index, Some(0));
    }

    #[test]
    fn test_select_disallowed_total_ignored() {
        let levophed = drug("levophed");
        let mut sel = PrepSelection::default();
        sel.resolve(&levophed, &ratio("4:100"));
        sel.select_total(500, &levophed, &ratio("4:100"));
        assert_eq!(sel.total_volume_ml, Some(100));
    }

    #[test]
    fn test_selection_outputs() {
        let dopamine = drug("dopamine");
        let mut sel = PrepSelection::default();
        sel.resolve(&dopamine, &ratio("2:1"));
        let out = sel.outputs(&dopamine, &ratio("2:1")).unwrap();
        assert!((out.drug_volume_ml - 8.0).abs() < 1e-9);
        assert!((out.solvent_volume_ml - 92.0).abs() < 1e-9);
    }
}
