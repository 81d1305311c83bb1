//! Session state transitions.
//!
//! Every user interaction maps to one method here. The presentation layer
//! only forwards events; nothing else mutates a [`Session`].

use crate::{ConfigRegistry, DrugRecord, Error, Language, Mode, Ratio, Result, Session};

/// What a config swap did to the session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reconciled {
    Unchanged,
    /// Selected concentration vanished; the drug default was taken
    ConcentrationReset,
    /// Selected drug vanished; the first drug was taken
    DrugReset,
}

impl Session {
    /// Fresh session on a drug's defaults
    pub fn for_drug(drug: &DrugRecord, language: Language) -> Self {
        Self {
            selected_drug_id: drug.id.clone(),
            mode: Mode::Forward,
            selected_concentration: drug.resolve_concentration(None),
            weight_kg: None,
            dose_rate: Some(drug.default_dose),
            infusion_rate: None,
            language,
            prep: Default::default(),
        }
    }

    /// Fresh session on the registry's first drug
    pub fn initial(registry: &ConfigRegistry, language: Language) -> Result<Self> {
        registry
            .first()
            .map(|drug| Self::for_drug(drug, language))
            .ok_or_else(|| Error::State("registry has no drugs".into()))
    }

    /// The selected drug's record
    pub fn drug<'a>(&self, registry: &'a ConfigRegistry) -> Result<&'a DrugRecord> {
        registry.get(&self.selected_drug_id).ok_or_else(|| {
            Error::State(format!(
                "selected drug '{}' is not in the registry",
                self.selected_drug_id
            ))
        })
    }

    /// Switch drug by id or synonym
    ///
    /// Takes the new drug's default concentration and dose and clears the
    /// preparation selection. Weight, infusion rate, mode and language stay.
    /// Unknown slugs leave the session untouched and return `false`.
    pub fn on_drug_change(&mut self, registry: &ConfigRegistry, slug: &str) -> bool {
        let drug = match registry.resolve(slug) {
            Some(drug) => drug,
            None => {
                tracing::debug!("Ignoring unknown drug '{}'", slug);
                return false;
            }
        };

        self.selected_drug_id = drug.id.clone();
        self.selected_concentration = drug.resolve_concentration(None);
        self.dose_rate = Some(drug.default_dose);
        self.prep.reset();
        true
    }

    /// Switch concentration; values the drug does not offer are ignored
    pub fn on_concentration_change(&mut self, registry: &ConfigRegistry, concentration: &str) -> bool {
        let Ok(drug) = self.drug(registry) else {
            return false;
        };
        let ratio = match Ratio::parse(concentration) {
            Some(r) if drug.has_concentration(&r) => r,
            _ => {
                tracing::debug!(
                    "Ignoring concentration '{}' for '{}'",
                    concentration,
                    drug.id
                );
                return false;
            }
        };

        self.prep.on_concentration_change(drug, &ratio);
        self.selected_concentration = ratio;
        true
    }

    pub fn on_mode_toggle(&mut self) {
        self.mode = self.mode.toggled();
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    pub fn set_weight(&mut self, weight_kg: Option<f64>) {
        self.weight_kg = weight_kg.filter(|w| w.is_finite());
    }

    pub fn set_dose_rate(&mut self, dose_rate: Option<f64>) {
        self.dose_rate = dose_rate.filter(|p| p.is_finite());
    }

    pub fn set_infusion_rate(&mut self, infusion_rate: Option<f64>) {
        self.infusion_rate = infusion_rate.filter(|r| r.is_finite());
    }

    pub fn select_ampule(&mut self, registry: &ConfigRegistry, index: usize) -> Result<()> {
        let drug = self.drug(registry)?;
        self.prep
            .select_ampule(index, drug, &self.selected_concentration);
        Ok(())
    }

    pub fn select_total(&mut self, registry: &ConfigRegistry, volume_ml: u32) -> Result<()> {
        let drug = self.drug(registry)?;
        self.prep
            .select_total(volume_ml, drug, &self.selected_concentration);
        Ok(())
    }

    /// Apply lazy preparation defaults for the current drug
    pub fn resolve_prep(&mut self, registry: &ConfigRegistry) -> Result<()> {
        let drug = self.drug(registry)?;
        self.prep.resolve(drug, &self.selected_concentration);
        Ok(())
    }

    /// Re-point drug and concentration at a freshly swapped registry
    ///
    /// Weight, dose, rate, mode and language are never touched.
    pub fn reconcile(&mut self, registry: &ConfigRegistry) -> Reconciled {
        if let Some(drug) = registry.get(&self.selected_drug_id) {
            let outcome = if drug.has_concentration(&self.selected_concentration) {
                Reconciled::Unchanged
            } else {
                tracing::info!(
                    "Concentration {} no longer offered for '{}', using default",
                    self.selected_concentration,
                    drug.id
                );
                self.selected_concentration = drug.resolve_concentration(None);
                Reconciled::ConcentrationReset
            };

            // Indices into the old ampule list may now point past the end.
            if self
                .prep
                .ampule_index
                .map(|ix| ix >= drug.ampules.len())
                .unwrap_or(false)
            {
                self.prep.ampule_index = None;
            }
            if self.prep.total_volume_ml.is_some() {
                self.prep
                    .on_concentration_change(drug, &self.selected_concentration);
            }
            return outcome;
        }

        match registry.first() {
            Some(first) => {
                tracing::info!(
                    "Drug '{}' no longer available, falling back to '{}'",
                    self.selected_drug_id,
                    first.id
                );
                self.selected_drug_id = first.id.clone();
                self.selected_concentration = first.resolve_concentration(None);
                self.prep.reset();
                Reconciled::DrugReset
            }
            None => Reconciled::Unchanged,
        }
    }
}
