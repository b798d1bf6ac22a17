//! Object selection and cleaning.
//!
//! Operators here filter the working collections of the event context in
//! place. Everything placed after them in the pipeline sees the filtered
//! collections, so insertion order matters.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config_accessors;
use crate::error::{Result, SelectError};
use crate::event::{delta_r, invariant_mass, Candidate, Collection, EventContext, Jet, Kinematic, Lepton, Photon};
use crate::operator::{parse_config, to_json, Operator, OperatorBase};
use crate::operator_common;
use crate::registry::OperatorKind;
use crate::weights::WeightSourceCache;

// =============================================================================
// PhotonSelection
// =============================================================================

/// Single photon identification requirement with fixed thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhotonCut {
    HOverE,
    Sieie,
    NHIso,
    PhIso,
    CHIso,
    CHIsoMax,
    EVeto,
    CSafeVeto,
    MIP49,
    Time,
    SieieNonzero,
    SipipNonzero,
    NoisyRegion,
    Sieie15,
    Sieie12,
    Sieie08,
    Sipip08,
    CHIso11,
    CHIsoMax11,
    NHIsoLoose,
    PhIsoLoose,
}

impl PhotonCut {
    pub const ALL: [PhotonCut; 21] = [
        PhotonCut::HOverE,
        PhotonCut::Sieie,
        PhotonCut::NHIso,
        PhotonCut::PhIso,
        PhotonCut::CHIso,
        PhotonCut::CHIsoMax,
        PhotonCut::EVeto,
        PhotonCut::CSafeVeto,
        PhotonCut::MIP49,
        PhotonCut::Time,
        PhotonCut::SieieNonzero,
        PhotonCut::SipipNonzero,
        PhotonCut::NoisyRegion,
        PhotonCut::Sieie15,
        PhotonCut::Sieie12,
        PhotonCut::Sieie08,
        PhotonCut::Sipip08,
        PhotonCut::CHIso11,
        PhotonCut::CHIsoMax11,
        PhotonCut::NHIsoLoose,
        PhotonCut::PhIsoLoose,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PhotonCut::HOverE => "HOverE",
            PhotonCut::Sieie => "Sieie",
            PhotonCut::NHIso => "NHIso",
            PhotonCut::PhIso => "PhIso",
            PhotonCut::CHIso => "CHIso",
            PhotonCut::CHIsoMax => "CHIsoMax",
            PhotonCut::EVeto => "EVeto",
            PhotonCut::CSafeVeto => "CSafeVeto",
            PhotonCut::MIP49 => "MIP49",
            PhotonCut::Time => "Time",
            PhotonCut::SieieNonzero => "SieieNonzero",
            PhotonCut::SipipNonzero => "SipipNonzero",
            PhotonCut::NoisyRegion => "NoisyRegion",
            PhotonCut::Sieie15 => "Sieie15",
            PhotonCut::Sieie12 => "Sieie12",
            PhotonCut::Sieie08 => "Sieie08",
            PhotonCut::Sipip08 => "Sipip08",
            PhotonCut::CHIso11 => "CHIso11",
            PhotonCut::CHIsoMax11 => "CHIsoMax11",
            PhotonCut::NHIsoLoose => "NHIsoLoose",
            PhotonCut::PhIsoLoose => "PhIsoLoose",
        }
    }

    /// Barrel thresholds; isolation cuts scale with photon pt.
    pub fn passes(&self, p: &Photon) -> bool {
        let pt = p.pt;
        match self {
            PhotonCut::HOverE => p.h_over_e < 0.0396,
            PhotonCut::Sieie => p.sieie < 0.01022,
            PhotonCut::NHIso => p.nh_iso < 1.06 + 0.014 * pt + 0.000019 * pt * pt,
            PhotonCut::PhIso => p.ph_iso < 0.28 + 0.0053 * pt,
            PhotonCut::CHIso => p.ch_iso < 0.441,
            PhotonCut::CHIsoMax => p.ch_iso_max < 0.441,
            PhotonCut::EVeto => p.pixel_veto,
            PhotonCut::CSafeVeto => p.csafe_veto,
            PhotonCut::MIP49 => p.mip_energy < 4.9,
            PhotonCut::Time => p.time.abs() < 3.0,
            PhotonCut::SieieNonzero => p.sieie > 0.001,
            PhotonCut::SipipNonzero => p.sipip > 0.001,
            PhotonCut::NoisyRegion => !(p.eta > 0.0 && p.eta < 0.15 && p.phi > 0.527 && p.phi < 0.531),
            PhotonCut::Sieie15 => p.sieie < 0.015,
            PhotonCut::Sieie12 => p.sieie < 0.012,
            PhotonCut::Sieie08 => p.sieie < 0.008,
            PhotonCut::Sipip08 => p.sipip < 0.008,
            PhotonCut::CHIso11 => p.ch_iso < 11.0,
            PhotonCut::CHIsoMax11 => p.ch_iso_max < 11.0,
            PhotonCut::NHIsoLoose => p.nh_iso < 10.910 + 0.0148 * pt + 0.000017 * pt * pt,
            PhotonCut::PhIsoLoose => p.ph_iso < 3.630 + 0.0047 * pt,
        }
    }
}

impl FromStr for PhotonCut {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        PhotonCut::ALL
            .iter()
            .find(|c| c.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown photon cut {}", s))
    }
}

/// A conjunction of cuts and the outcome it must have. With `require = false`
/// the term passes when at least one of its cuts fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SelectionTerm {
    pub require: bool,
    pub cuts: Vec<PhotonCut>,
}

impl SelectionTerm {
    pub fn require(cuts: &[PhotonCut]) -> Self {
        Self {
            require: true,
            cuts: cuts.to_vec(),
        }
    }

    pub fn invert(cuts: &[PhotonCut]) -> Self {
        Self {
            require: false,
            cuts: cuts.to_vec(),
        }
    }

    pub fn passes(&self, p: &Photon) -> bool {
        self.cuts.iter().all(|c| c.passes(p)) == self.require
    }
}

/// Apply `-Cut` (remove), `+Cut` (append) and `!Cut` (replace with its
/// inversion) edits to a base selection list and build the terms.
pub fn apply_selection_changes(operator: &str, base: &[String], changes: &[String]) -> Result<Vec<SelectionTerm>> {
    let mut sels: Vec<String> = base.to_vec();
    for change in changes {
        if let Some(cut) = change.strip_prefix('-') {
            let pos = sels
                .iter()
                .position(|s| s == cut)
                .ok_or_else(|| SelectError::invalid(operator, "selection", format!("cannot remove {}: not selected", cut)))?;
            sels.remove(pos);
        } else if let Some(cut) = change.strip_prefix('+') {
            sels.push(cut.to_string());
        } else if let Some(cut) = change.strip_prefix('!') {
            sels.retain(|s| s != cut);
            sels.push(change.clone());
        } else {
            return Err(SelectError::invalid(
                operator,
                "selection",
                format!("change {} must start with -, + or !", change),
            ));
        }
    }

    sels.iter()
        .map(|s| {
            let (require, name) = match s.strip_prefix('!') {
                Some(rest) => (false, rest),
                None => (true, s.as_str()),
            };
            let cut = PhotonCut::from_str(name).map_err(|e| SelectError::invalid(operator, "selection", e))?;
            Ok(SelectionTerm {
                require,
                cuts: vec![cut],
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PhotonSelectionConfig {
    pub min_pt: f64,
    pub max_eta: f64,
    pub selection: Vec<SelectionTerm>,
    /// When non-empty, any photon in acceptance passing all veto terms rejects
    /// the event.
    pub veto: Vec<SelectionTerm>,
}

impl Default for PhotonSelectionConfig {
    fn default() -> Self {
        Self {
            min_pt: 175.0,
            max_eta: 1.4442,
            selection: Vec::new(),
            veto: Vec::new(),
        }
    }
}

pub struct PhotonSelection {
    base: OperatorBase,
    config: PhotonSelectionConfig,
}

impl PhotonSelection {
    pub fn new(name: &str) -> Self {
        Self {
            base: OperatorBase::new(name),
            config: PhotonSelectionConfig::default(),
        }
    }

    fn in_acceptance(&self, p: &Photon) -> bool {
        p.pt >= self.config.min_pt && p.eta.abs() < self.config.max_eta
    }
}

config_accessors!(PhotonSelection, PhotonSelectionConfig);

impl Operator for PhotonSelection {
    operator_common!(OperatorKind::PhotonSelection);

    fn configure(&mut self, params: &Value, _tables: &WeightSourceCache) -> Result<()> {
        self.config = parse_config(self.name(), params)?;
        Ok(())
    }

    fn config_json(&self) -> Value {
        to_json(&self.config)
    }

    fn evaluate(&mut self, ctx: &mut EventContext<'_>) -> Result<bool> {
        let vetoed = !self.config.veto.is_empty()
            && ctx
                .photons
                .iter()
                .any(|p| self.in_acceptance(p) && self.config.veto.iter().all(|t| t.passes(p)));

        let selection = &self.config.selection;
        let (min_pt, max_eta) = (self.config.min_pt, self.config.max_eta);
        ctx.photons
            .retain(|p| p.pt >= min_pt && p.eta.abs() < max_eta && selection.iter().all(|t| t.passes(p)));

        ctx.set_branch(format!("{}.size", self.name()), ctx.photons.len() as f64);
        Ok(!vetoed && !ctx.photons.is_empty())
    }
}

// =============================================================================
// LeptonSelection
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LeptonSelectionConfig {
    pub n_electrons: usize,
    pub n_muons: usize,
    pub require_medium: bool,
    pub require_tight: bool,
    pub min_pt: f64,
    pub max_eta: f64,
    /// Leptons closer than this to a selected photon are dropped.
    pub photon_dr: f64,
}

impl Default for LeptonSelectionConfig {
    fn default() -> Self {
        Self {
            n_electrons: 0,
            n_muons: 0,
            require_medium: true,
            require_tight: true,
            min_pt: 10.0,
            max_eta: 2.5,
            photon_dr: 0.5,
        }
    }
}

/// Filters electrons and muons to the configured working point and requires
/// exact counts of each.
pub struct LeptonSelection {
    base: OperatorBase,
    config: LeptonSelectionConfig,
}

impl LeptonSelection {
    pub fn new(name: &str) -> Self {
        Self {
            base: OperatorBase::new(name),
            config: LeptonSelectionConfig::default(),
        }
    }

    pub fn set_n(&mut self, n_electrons: usize, n_muons: usize) {
        self.config.n_electrons = n_electrons;
        self.config.n_muons = n_muons;
    }

    fn keep(&self, l: &Lepton, photons: &[Photon]) -> bool {
        let c = &self.config;
        let id = if c.require_tight {
            l.tight
        } else if c.require_medium {
            l.medium
        } else {
            l.loose
        };
        id && l.pt >= c.min_pt && l.eta.abs() < c.max_eta && photons.iter().all(|p| delta_r(l, p) >= c.photon_dr)
    }
}

config_accessors!(LeptonSelection, LeptonSelectionConfig);

impl Operator for LeptonSelection {
    operator_common!(OperatorKind::LeptonSelection);

    fn configure(&mut self, params: &Value, _tables: &WeightSourceCache) -> Result<()> {
        self.config = parse_config(self.name(), params)?;
        Ok(())
    }

    fn config_json(&self) -> Value {
        to_json(&self.config)
    }

    fn evaluate(&mut self, ctx: &mut EventContext<'_>) -> Result<bool> {
        let photons = std::mem::take(&mut ctx.photons);
        ctx.electrons.retain(|l| self.keep(l, &photons));
        ctx.muons.retain(|l| self.keep(l, &photons));
        ctx.photons = photons;

        Ok(ctx.electrons.len() == self.config.n_electrons && ctx.muons.len() == self.config.n_muons)
    }
}

// =============================================================================
// TauVeto
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TauVetoConfig {
    pub min_pt: f64,
    pub max_eta: f64,
    pub clean_dr: f64,
}

impl Default for TauVetoConfig {
    fn default() -> Self {
        Self {
            min_pt: 18.0,
            max_eta: 2.3,
            clean_dr: 0.4,
        }
    }
}

/// Drops taus overlapping selected photons and leptons, then vetoes any
/// remaining tau.
pub struct TauVeto {
    base: OperatorBase,
    config: TauVetoConfig,
}

impl TauVeto {
    pub fn new(name: &str) -> Self {
        Self {
            base: OperatorBase::new(name),
            config: TauVetoConfig::default(),
        }
    }
}

config_accessors!(TauVeto, TauVetoConfig);

impl Operator for TauVeto {
    operator_common!(OperatorKind::TauVeto);

    fn configure(&mut self, params: &Value, _tables: &WeightSourceCache) -> Result<()> {
        self.config = parse_config(self.name(), params)?;
        Ok(())
    }

    fn config_json(&self) -> Value {
        to_json(&self.config)
    }

    fn evaluate(&mut self, ctx: &mut EventContext<'_>) -> Result<bool> {
        let mut others = ctx.candidates(Collection::Photons, usize::MAX);
        others.extend(ctx.candidates(Collection::Electrons, usize::MAX));
        others.extend(ctx.candidates(Collection::Muons, usize::MAX));

        let c = &self.config;
        ctx.taus.retain(|t| {
            t.decay_mode
                && t.pt >= c.min_pt
                && t.eta.abs() < c.max_eta
                && others.iter().all(|o| delta_r(t, o) >= c.clean_dr)
        });
        Ok(ctx.taus.is_empty())
    }
}

// =============================================================================
// JetCleaning
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct JetCleaningConfig {
    pub min_pt: f64,
    pub max_eta: f64,
    pub clean_dr: f64,
    pub clean_against: Vec<Collection>,
}

impl Default for JetCleaningConfig {
    fn default() -> Self {
        Self {
            min_pt: 30.0,
            max_eta: 4.7,
            clean_dr: 0.4,
            clean_against: vec![Collection::Photons, Collection::Electrons, Collection::Muons, Collection::Taus],
        }
    }
}

/// Removes jets overlapping objects of the configured collections. Never
/// rejects an event.
pub struct JetCleaning {
    base: OperatorBase,
    config: JetCleaningConfig,
}

impl JetCleaning {
    pub fn new(name: &str) -> Self {
        Self {
            base: OperatorBase::new(name),
            config: JetCleaningConfig::default(),
        }
    }

    pub fn set_clean_against(&mut self, collection: Collection, clean: bool) {
        self.config.clean_against.retain(|c| *c != collection);
        if clean {
            self.config.clean_against.push(collection);
        }
    }
}

config_accessors!(JetCleaning, JetCleaningConfig);

impl Operator for JetCleaning {
    operator_common!(OperatorKind::JetCleaning);

    fn configure(&mut self, params: &Value, _tables: &WeightSourceCache) -> Result<()> {
        self.config = parse_config(self.name(), params)?;
        self.validate()
    }

    fn config_json(&self) -> Value {
        to_json(&self.config)
    }

    fn validate(&self) -> Result<()> {
        if self.config.clean_against.contains(&Collection::Jets) {
            return Err(SelectError::invalid(self.name(), "clean_against", "jets cannot clean against jets"));
        }
        Ok(())
    }

    fn evaluate(&mut self, ctx: &mut EventContext<'_>) -> Result<bool> {
        let others: Vec<Candidate> = self
            .config
            .clean_against
            .iter()
            .flat_map(|c| ctx.candidates(*c, usize::MAX))
            .collect();

        let c = &self.config;
        ctx.jets.retain(|j: &Jet| {
            j.pt >= c.min_pt && j.eta.abs() < c.max_eta && others.iter().all(|o| delta_r(j, o) >= c.clean_dr)
        });
        ctx.set_branch(format!("{}.size", self.name()), ctx.jets.len() as f64);
        Ok(true)
    }
}

// =============================================================================
// BjetVeto
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BjetVetoConfig {
    pub min_pt: f64,
    pub max_eta: f64,
    pub csv_threshold: f64,
}

impl Default for BjetVetoConfig {
    fn default() -> Self {
        Self {
            min_pt: 20.0,
            max_eta: 2.4,
            csv_threshold: 0.8484,
        }
    }
}

pub struct BjetVeto {
    base: OperatorBase,
    config: BjetVetoConfig,
}

impl BjetVeto {
    pub fn new(name: &str) -> Self {
        Self {
            base: OperatorBase::new(name),
            config: BjetVetoConfig::default(),
        }
    }
}

config_accessors!(BjetVeto, BjetVetoConfig);

impl Operator for BjetVeto {
    operator_common!(OperatorKind::BjetVeto);

    fn configure(&mut self, params: &Value, _tables: &WeightSourceCache) -> Result<()> {
        self.config = parse_config(self.name(), params)?;
        Ok(())
    }

    fn config_json(&self) -> Value {
        to_json(&self.config)
    }

    fn evaluate(&mut self, ctx: &mut EventContext<'_>) -> Result<bool> {
        let c = &self.config;
        let nb = ctx
            .jets
            .iter()
            .filter(|j| j.pt >= c.min_pt && j.eta.abs() < c.max_eta && j.csv > c.csv_threshold)
            .count();
        ctx.set_branch(format!("{}.size", self.name()), nb as f64);
        Ok(nb == 0)
    }
}

// =============================================================================
// HighPtJetSelection
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct HighPtJetSelectionConfig {
    pub min_pt: f64,
    pub n_min: usize,
    pub n_max: Option<usize>,
}

impl Default for HighPtJetSelectionConfig {
    fn default() -> Self {
        Self {
            min_pt: 100.0,
            n_min: 1,
            n_max: None,
        }
    }
}

pub struct HighPtJetSelection {
    base: OperatorBase,
    config: HighPtJetSelectionConfig,
}

impl HighPtJetSelection {
    pub fn new(name: &str) -> Self {
        Self {
            base: OperatorBase::new(name),
            config: HighPtJetSelectionConfig::default(),
        }
    }
}

config_accessors!(HighPtJetSelection, HighPtJetSelectionConfig);

impl Operator for HighPtJetSelection {
    operator_common!(OperatorKind::HighPtJetSelection);

    fn configure(&mut self, params: &Value, _tables: &WeightSourceCache) -> Result<()> {
        let config: HighPtJetSelectionConfig = parse_config(self.name(), params)?;
        if config.n_max.map_or(false, |m| m < config.n_min) {
            return Err(SelectError::invalid(self.name(), "n_max", "must be at least n_min"));
        }
        self.config = config;
        Ok(())
    }

    fn config_json(&self) -> Value {
        to_json(&self.config)
    }

    fn evaluate(&mut self, ctx: &mut EventContext<'_>) -> Result<bool> {
        let n = ctx.jets.iter().filter(|j| j.pt >= self.config.min_pt).count();
        Ok(n >= self.config.n_min && self.config.n_max.map_or(true, |m| n <= m))
    }
}

// =============================================================================
// DijetSelection
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DijetSelectionConfig {
    pub min_pt: f64,
    pub min_deta: f64,
    pub min_mjj: f64,
}

impl Default for DijetSelectionConfig {
    fn default() -> Self {
        Self {
            min_pt: 50.0,
            min_deta: 3.0,
            min_mjj: 500.0,
        }
    }
}

/// Requires a jet pair separated in η with a large invariant mass.
pub struct DijetSelection {
    base: OperatorBase,
    config: DijetSelectionConfig,
}

impl DijetSelection {
    pub fn new(name: &str) -> Self {
        Self {
            base: OperatorBase::new(name),
            config: DijetSelectionConfig::default(),
        }
    }
}

config_accessors!(DijetSelection, DijetSelectionConfig);

impl Operator for DijetSelection {
    operator_common!(OperatorKind::DijetSelection);

    fn configure(&mut self, params: &Value, _tables: &WeightSourceCache) -> Result<()> {
        self.config = parse_config(self.name(), params)?;
        Ok(())
    }

    fn config_json(&self) -> Value {
        to_json(&self.config)
    }

    fn evaluate(&mut self, ctx: &mut EventContext<'_>) -> Result<bool> {
        let c = &self.config;
        let jets: Vec<&Jet> = ctx.jets.iter().filter(|j| j.pt >= c.min_pt).collect();
        let mut n_pairs = 0usize;
        for (i, a) in jets.iter().enumerate() {
            for b in &jets[i + 1..] {
                if (a.eta() - b.eta()).abs() >= c.min_deta && invariant_mass(*a, *b) >= c.min_mjj {
                    n_pairs += 1;
                }
            }
        }
        ctx.set_branch(format!("{}.pairs", self.name()), n_pairs as f64);
        Ok(n_pairs > 0)
    }
}
