use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{config_accessors, in_window};
use crate::error::{Result, SelectError};
use crate::event::{delta_r, EventContext, GenParticle};
use crate::operator::{parse_config, to_json, Operator, OperatorBase};
use crate::operator_common;
use crate::registry::OperatorKind;
use crate::weights::WeightSourceCache;

// =============================================================================
// HltFilter
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HltFilterConfig {
    pub path: String,
}

/// Requires a trigger path to have fired.
pub struct HltFilter {
    base: OperatorBase,
    config: HltFilterConfig,
}

impl HltFilter {
    pub fn new(name: &str) -> Self {
        Self {
            base: OperatorBase::new(name),
            config: HltFilterConfig::default(),
        }
    }

    pub fn with_path(name: &str, path: &str) -> Self {
        let mut op = Self::new(name);
        op.config.path = path.to_string();
        op
    }
}

config_accessors!(HltFilter, HltFilterConfig);

impl Operator for HltFilter {
    operator_common!(OperatorKind::HltFilter);

    fn configure(&mut self, params: &Value, _tables: &WeightSourceCache) -> Result<()> {
        self.config = parse_config(self.name(), params)?;
        Ok(())
    }

    fn config_json(&self) -> Value {
        to_json(&self.config)
    }

    fn validate(&self) -> Result<()> {
        if self.config.path.is_empty() {
            return Err(SelectError::MissingParameter {
                operator: self.name().to_string(),
                param: "path".to_string(),
            });
        }
        Ok(())
    }

    fn evaluate(&mut self, ctx: &mut EventContext<'_>) -> Result<bool> {
        Ok(ctx.event.triggers.iter().any(|t| t == &self.config.path))
    }
}

// =============================================================================
// MetFilters
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HaloMode {
    #[default]
    Require,
    Ignore,
    /// Select events the halo filter rejected (halo control samples).
    Invert,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MetFiltersConfig {
    pub halo: HaloMode,
}

pub struct MetFilters {
    base: OperatorBase,
    config: MetFiltersConfig,
}

impl MetFilters {
    pub fn new(name: &str) -> Self {
        Self {
            base: OperatorBase::new(name),
            config: MetFiltersConfig::default(),
        }
    }
}

config_accessors!(MetFilters, MetFiltersConfig);

impl Operator for MetFilters {
    operator_common!(OperatorKind::MetFilters);

    fn configure(&mut self, params: &Value, _tables: &WeightSourceCache) -> Result<()> {
        self.config = parse_config(self.name(), params)?;
        Ok(())
    }

    fn config_json(&self) -> Value {
        to_json(&self.config)
    }

    fn evaluate(&mut self, ctx: &mut EventContext<'_>) -> Result<bool> {
        let flags = &ctx.event.met_filters;
        let halo = match self.config.halo {
            HaloMode::Require => flags.halo,
            HaloMode::Ignore => true,
            HaloMode::Invert => !flags.halo,
        };
        Ok(halo && flags.hbhe && flags.ecal_dead_cell && flags.bad_track)
    }
}

// =============================================================================
// GenParticleSelection
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenParticleSelectionConfig {
    /// Matched against |pdg id|.
    pub pdg_id: i32,
    #[serde(default)]
    pub min_pt: f64,
    #[serde(default = "default_gen_max_eta")]
    pub max_eta: f64,
    /// Only hard-process particles count.
    #[serde(default)]
    pub hard_process: bool,
    /// Matching particles must be this far in ΔR from every hard-process parton.
    #[serde(default)]
    pub min_parton_dr: Option<f64>,
    /// Reject events that have a matching particle instead of requiring one.
    #[serde(default)]
    pub veto: bool,
}

fn default_gen_max_eta() -> f64 {
    10.0
}

impl Default for GenParticleSelectionConfig {
    fn default() -> Self {
        Self {
            pdg_id: 0,
            min_pt: 0.0,
            max_eta: default_gen_max_eta(),
            hard_process: false,
            min_parton_dr: None,
            veto: false,
        }
    }
}

/// Requires (or, with `veto`, forbids) a generator particle of a given
/// species inside the acceptance.
pub struct GenParticleSelection {
    base: OperatorBase,
    config: GenParticleSelectionConfig,
}

impl GenParticleSelection {
    pub fn new(name: &str) -> Self {
        Self {
            base: OperatorBase::new(name),
            config: GenParticleSelectionConfig::default(),
        }
    }

    /// Hard-process particle of species `pdg_id`, required or vetoed.
    pub fn hard_process(name: &str, pdg_id: i32, veto: bool) -> Self {
        let mut op = Self::new(name);
        op.config.pdg_id = pdg_id;
        op.config.hard_process = true;
        op.config.veto = veto;
        op
    }

    fn matches(&self, p: &GenParticle, gen: &[GenParticle]) -> bool {
        let c = &self.config;
        if p.pdg_id.abs() != c.pdg_id.abs() || p.pt < c.min_pt || p.eta.abs() > c.max_eta {
            return false;
        }
        if c.hard_process && !p.hard_process {
            return false;
        }
        match c.min_parton_dr {
            Some(min_dr) => gen
                .iter()
                .filter(|q| q.hard_process && is_parton(q))
                .all(|q| delta_r(p, q) >= min_dr),
            None => true,
        }
    }
}

config_accessors!(GenParticleSelection, GenParticleSelectionConfig);

impl Operator for GenParticleSelection {
    operator_common!(OperatorKind::GenParticleSelection);

    fn configure(&mut self, params: &Value, _tables: &WeightSourceCache) -> Result<()> {
        let config: GenParticleSelectionConfig = parse_config(self.name(), params)?;
        if config.max_eta <= 0.0 {
            return Err(SelectError::invalid(self.name(), "max_eta", "must be positive"));
        }
        if config.min_parton_dr.map_or(false, |dr| !(dr >= 0.0)) {
            return Err(SelectError::invalid(self.name(), "min_parton_dr", "must not be negative"));
        }
        self.config = config;
        Ok(())
    }

    fn config_json(&self) -> Value {
        to_json(&self.config)
    }

    fn validate(&self) -> Result<()> {
        if self.config.pdg_id == 0 {
            return Err(SelectError::MissingParameter {
                operator: self.name().to_string(),
                param: "pdg_id".to_string(),
            });
        }
        Ok(())
    }

    fn evaluate(&mut self, ctx: &mut EventContext<'_>) -> Result<bool> {
        let gen = &ctx.event.gen;
        let found = gen.iter().any(|p| self.matches(p, gen));
        Ok(found != self.config.veto)
    }
}

// =============================================================================
// Truncator
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TruncationVariable {
    /// Leading hard-process photon pt.
    #[default]
    PhotonPt,
    /// Scalar sum of hard-process quark and gluon pt.
    Ht,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TruncatorConfig {
    #[serde(default)]
    pub variable: TruncationVariable,
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub max: Option<f64>,
}

/// Generator-level window used to stitch samples binned in photon pt or HT.
pub struct Truncator {
    base: OperatorBase,
    config: TruncatorConfig,
}

fn is_parton(p: &GenParticle) -> bool {
    let id = p.pdg_id.abs();
    (1..=5).contains(&id) || id == 21
}

impl Truncator {
    pub fn new(name: &str) -> Self {
        Self {
            base: OperatorBase::new(name),
            config: TruncatorConfig::default(),
        }
    }

    pub fn with_window(name: &str, variable: TruncationVariable, min: f64, max: Option<f64>) -> Self {
        let mut op = Self::new(name);
        op.config = TruncatorConfig { variable, min, max };
        op
    }

    fn value(&self, gen: &[GenParticle]) -> f64 {
        match self.config.variable {
            TruncationVariable::PhotonPt => gen
                .iter()
                .filter(|p| p.pdg_id == 22 && p.hard_process)
                .map(|p| p.pt)
                .fold(0.0, f64::max),
            TruncationVariable::Ht => gen.iter().filter(|p| p.hard_process && is_parton(p)).map(|p| p.pt).sum(),
        }
    }
}

config_accessors!(Truncator, TruncatorConfig);

impl Operator for Truncator {
    operator_common!(OperatorKind::Truncator);

    fn configure(&mut self, params: &Value, _tables: &WeightSourceCache) -> Result<()> {
        let config: TruncatorConfig = parse_config(self.name(), params)?;
        if let Some(max) = config.max {
            if max <= config.min {
                return Err(SelectError::invalid(self.name(), "max", "must exceed min"));
            }
        }
        self.config = config;
        Ok(())
    }

    fn config_json(&self) -> Value {
        to_json(&self.config)
    }

    fn evaluate(&mut self, ctx: &mut EventContext<'_>) -> Result<bool> {
        let v = self.value(&ctx.event.gen);
        ctx.set_branch(format!("{}.value", self.name()), v);
        Ok(in_window(v, self.config.min, self.config.max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, MetFilterFlags};
    use crate::weights::{JsonTableProvider, WeightSourceCache};
    use serde_json::json;

    fn cache() -> WeightSourceCache {
        WeightSourceCache::new(Box::new(JsonTableProvider::new(None)))
    }

    #[test]
    fn test_hlt_filter() {
        let ev = Event {
            triggers: vec!["HLT_Photon165_HE10".to_string()],
            ..Default::default()
        };
        let mut op = HltFilter::with_path("HLTPhoton165_HE10", "HLT_Photon165_HE10");
        assert!(op.evaluate(&mut EventContext::new(&ev)).unwrap());
        op.config_mut().path = "HLT_Other".to_string();
        assert!(!op.evaluate(&mut EventContext::new(&ev)).unwrap());
    }

    #[test]
    fn test_hlt_filter_requires_path() {
        let op = HltFilter::new("HLTFilter");
        assert!(matches!(op.validate(), Err(SelectError::MissingParameter { .. })));
        let mut op = HltFilter::new("HLTFilter");
        let err = op.configure(&json!({}), &cache()).unwrap_err();
        assert!(matches!(err, SelectError::MissingParameter { ref param, .. } if param == "path"));
    }

    #[test]
    fn test_met_filters_halo_modes() {
        let ev = Event {
            met_filters: MetFilterFlags {
                halo: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut op = MetFilters::new("MetFilters");
        assert!(!op.evaluate(&mut EventContext::new(&ev)).unwrap());
        op.configure(&json!({"halo": "invert"}), &cache()).unwrap();
        assert!(op.evaluate(&mut EventContext::new(&ev)).unwrap());
        op.configure(&json!({"halo": "ignore"}), &cache()).unwrap();
        assert!(op.evaluate(&mut EventContext::new(&ev)).unwrap());
    }

    #[test]
    fn test_truncator_photon_pt_window() {
        let ev = Event {
            gen: vec![GenParticle {
                pdg_id: 22,
                pt: 180.0,
                hard_process: true,
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut op = Truncator::with_window("PhotonPtTruncator", TruncationVariable::PhotonPt, 0.0, Some(500.0));
        let mut ctx = EventContext::new(&ev);
        assert!(op.evaluate(&mut ctx).unwrap());
        assert_eq!(ctx.branch("PhotonPtTruncator.value"), Some(180.0));
        op.config_mut().max = Some(150.0);
        assert!(!op.evaluate(&mut EventContext::new(&ev)).unwrap());
    }

    #[test]
    fn test_truncator_rejects_inverted_window() {
        let mut op = Truncator::new("HtTruncator");
        let err = op
            .configure(&json!({"variable": "ht", "min": 200.0, "max": 100.0}), &cache())
            .unwrap_err();
        assert!(matches!(err, SelectError::InvalidParameter { .. }));
    }

    #[test]
    fn test_gen_particle_selection() {
        let ev = Event {
            gen: vec![GenParticle {
                pdg_id: 22,
                pt: 150.0,
                eta: 1.0,
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut op = GenParticleSelection::new("GenPhotonSelection");
        op.configure(&json!({"pdg_id": 22, "min_pt": 140.0, "max_eta": 1.7}), &cache())
            .unwrap();
        assert!(op.validate().is_ok());
        assert!(op.evaluate(&mut EventContext::new(&ev)).unwrap());
        op.config_mut().max_eta = 0.5;
        assert!(!op.evaluate(&mut EventContext::new(&ev)).unwrap());
    }

    fn w_decay(lepton: i32) -> Event {
        Event {
            gen: vec![
                GenParticle {
                    pdg_id: -24,
                    pt: 90.0,
                    hard_process: true,
                    ..Default::default()
                },
                GenParticle {
                    pdg_id: lepton,
                    pt: 40.0,
                    hard_process: true,
                    ..Default::default()
                },
                GenParticle {
                    pdg_id: 11,
                    pt: 5.0,
                    status: 1,
                    ..Default::default()
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_hard_process_electron_veto() {
        let mut op = GenParticleSelection::hard_process("WlnuFilter", 11, true);
        // the soft non-hard-process electron does not count
        assert!(op.evaluate(&mut EventContext::new(&w_decay(13))).unwrap());
        assert!(!op.evaluate(&mut EventContext::new(&w_decay(-11))).unwrap());

        let mut op = GenParticleSelection::hard_process("WenuFilter", 11, false);
        assert!(!op.evaluate(&mut EventContext::new(&w_decay(13))).unwrap());
        assert!(op.evaluate(&mut EventContext::new(&w_decay(-11))).unwrap());
    }

    #[test]
    fn test_photon_isolated_from_partons() {
        let photon = GenParticle {
            pdg_id: 22,
            pt: 200.0,
            eta: 0.0,
            phi: 0.0,
            hard_process: true,
            ..Default::default()
        };
        let quark = |phi: f64| GenParticle {
            pdg_id: 2,
            pt: 100.0,
            eta: 0.0,
            phi,
            hard_process: true,
            ..Default::default()
        };
        let mut op = GenParticleSelection::new("GenPhotonVeto");
        op.configure(
            &json!({"pdg_id": 22, "min_pt": 130.0, "hard_process": true, "min_parton_dr": 0.5, "veto": true}),
            &cache(),
        )
        .unwrap();

        let near = Event {
            gen: vec![photon.clone(), quark(0.3)],
            ..Default::default()
        };
        assert!(op.evaluate(&mut EventContext::new(&near)).unwrap());
        let far = Event {
            gen: vec![photon, quark(2.0)],
            ..Default::default()
        };
        assert!(!op.evaluate(&mut EventContext::new(&far)).unwrap());

        let err = op
            .configure(&json!({"pdg_id": 22, "min_parton_dr": -1.0}), &cache())
            .unwrap_err();
        assert!(matches!(err, SelectError::InvalidParameter { .. }));
    }
}
