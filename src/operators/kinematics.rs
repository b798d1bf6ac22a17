//! Cuts on MET and on combinations of already-selected objects.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{config_accessors, in_window};
use crate::error::{Result, SelectError};
use crate::event::{
    delta_phi, invariant_mass, transverse_mass, Candidate, Collection, EventContext, Flavor, Met as MetVector,
    MetSource,
};
use crate::operator::{parse_config, to_json, Operator, OperatorBase};
use crate::operator_common;
use crate::registry::OperatorKind;
use crate::weights::WeightSourceCache;

fn missing(operator: &str, param: &str) -> SelectError {
    SelectError::MissingParameter {
        operator: operator.to_string(),
        param: param.to_string(),
    }
}

fn check_window(operator: &str, min: f64, max: Option<f64>) -> Result<()> {
    match max {
        Some(m) if m <= min => Err(SelectError::invalid(operator, "max", "must exceed min")),
        _ => Ok(()),
    }
}

/// Leading object of each collection, or the two leading objects when both
/// collections are the same.
fn leading_pair(ctx: &EventContext<'_>, c1: Collection, c2: Collection) -> Option<(Candidate, Candidate)> {
    if c1 == c2 {
        let objs = ctx.candidates(c1, 2);
        match objs.as_slice() {
            [a, b] => Some((*a, *b)),
            _ => None,
        }
    } else {
        let a = ctx.candidates(c1, 1).first().copied()?;
        let b = ctx.candidates(c2, 1).first().copied()?;
        Some((a, b))
    }
}

// =============================================================================
// LeptonRecoil
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeptonRecoilConfig {
    #[serde(default)]
    pub flavor: Option<Flavor>,
}

/// Adds the selected leptons of one flavor to the corrected MET, emulating
/// the recoil of an invisible boson.
pub struct LeptonRecoil {
    base: OperatorBase,
    config: LeptonRecoilConfig,
}

impl LeptonRecoil {
    pub fn new(name: &str) -> Self {
        Self {
            base: OperatorBase::new(name),
            config: LeptonRecoilConfig::default(),
        }
    }
}

config_accessors!(LeptonRecoil, LeptonRecoilConfig);

impl Operator for LeptonRecoil {
    operator_common!(OperatorKind::LeptonRecoil);

    fn configure(&mut self, params: &Value, _tables: &WeightSourceCache) -> Result<()> {
        self.config = parse_config(self.name(), params)?;
        self.validate()
    }

    fn config_json(&self) -> Value {
        to_json(&self.config)
    }

    fn validate(&self) -> Result<()> {
        match self.config.flavor {
            Some(_) => Ok(()),
            None => Err(missing(self.name(), "flavor")),
        }
    }

    fn evaluate(&mut self, ctx: &mut EventContext<'_>) -> Result<bool> {
        let flavor = self.config.flavor.ok_or_else(|| missing(self.name(), "flavor"))?;
        let (mut mx, mut my) = (ctx.met.pt * ctx.met.phi.cos(), ctx.met.pt * ctx.met.phi.sin());
        for l in ctx.candidates(flavor.collection(), usize::MAX) {
            mx += l.pt * l.phi.cos();
            my += l.pt * l.phi.sin();
        }
        ctx.met = MetVector {
            pt: mx.hypot(my),
            phi: my.atan2(mx),
        };
        ctx.set_branch(format!("{}.pt", self.name()), ctx.met.pt);
        Ok(true)
    }
}

// =============================================================================
// Met
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct MetConfig {
    pub min: f64,
    pub max: Option<f64>,
    pub source: MetSource,
}

impl Default for MetConfig {
    fn default() -> Self {
        Self {
            min: 170.0,
            max: None,
            source: MetSource::Corrected,
        }
    }
}

pub struct Met {
    base: OperatorBase,
    config: MetConfig,
}

impl Met {
    pub fn new(name: &str) -> Self {
        Self {
            base: OperatorBase::new(name),
            config: MetConfig::default(),
        }
    }
}

config_accessors!(Met, MetConfig);

impl Operator for Met {
    operator_common!(OperatorKind::Met);

    fn configure(&mut self, params: &Value, _tables: &WeightSourceCache) -> Result<()> {
        self.config = parse_config(self.name(), params)?;
        self.validate()
    }

    fn config_json(&self) -> Value {
        to_json(&self.config)
    }

    fn validate(&self) -> Result<()> {
        check_window(self.name(), self.config.min, self.config.max)
    }

    fn evaluate(&mut self, ctx: &mut EventContext<'_>) -> Result<bool> {
        let met = ctx.met_for(self.config.source);
        Ok(in_window(met.pt, self.config.min, self.config.max))
    }
}

// =============================================================================
// PhotonMetDPhi
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PhotonMetDPhiConfig {
    pub min: f64,
    pub source: MetSource,
}

impl Default for PhotonMetDPhiConfig {
    fn default() -> Self {
        Self {
            min: 0.5,
            source: MetSource::Corrected,
        }
    }
}

pub struct PhotonMetDPhi {
    base: OperatorBase,
    config: PhotonMetDPhiConfig,
}

impl PhotonMetDPhi {
    pub fn new(name: &str) -> Self {
        Self {
            base: OperatorBase::new(name),
            config: PhotonMetDPhiConfig::default(),
        }
    }
}

config_accessors!(PhotonMetDPhi, PhotonMetDPhiConfig);

impl Operator for PhotonMetDPhi {
    operator_common!(OperatorKind::PhotonMetDPhi);

    fn configure(&mut self, params: &Value, _tables: &WeightSourceCache) -> Result<()> {
        self.config = parse_config(self.name(), params)?;
        Ok(())
    }

    fn config_json(&self) -> Value {
        to_json(&self.config)
    }

    fn evaluate(&mut self, ctx: &mut EventContext<'_>) -> Result<bool> {
        let Some(photon) = ctx.photons.first() else {
            return Ok(false);
        };
        let dphi = delta_phi(photon.phi, ctx.met_for(self.config.source).phi);
        ctx.set_branch(format!("{}.dPhi", self.name()), dphi);
        Ok(dphi >= self.config.min)
    }
}

// =============================================================================
// JetMetDPhi
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct JetMetDPhiConfig {
    pub min: f64,
    /// Number of leading jets considered.
    pub n_jets: usize,
    pub min_jet_pt: f64,
    pub source: MetSource,
}

impl Default for JetMetDPhiConfig {
    fn default() -> Self {
        Self {
            min: 0.5,
            n_jets: 4,
            min_jet_pt: 30.0,
            source: MetSource::Corrected,
        }
    }
}

/// Minimum Δφ between MET and the leading jets; events without jets pass.
pub struct JetMetDPhi {
    base: OperatorBase,
    config: JetMetDPhiConfig,
}

impl JetMetDPhi {
    pub fn new(name: &str) -> Self {
        Self {
            base: OperatorBase::new(name),
            config: JetMetDPhiConfig::default(),
        }
    }
}

config_accessors!(JetMetDPhi, JetMetDPhiConfig);

impl Operator for JetMetDPhi {
    operator_common!(OperatorKind::JetMetDPhi);

    fn configure(&mut self, params: &Value, _tables: &WeightSourceCache) -> Result<()> {
        self.config = parse_config(self.name(), params)?;
        Ok(())
    }

    fn config_json(&self) -> Value {
        to_json(&self.config)
    }

    fn evaluate(&mut self, ctx: &mut EventContext<'_>) -> Result<bool> {
        let met_phi = ctx.met_for(self.config.source).phi;
        let min_dphi = ctx
            .jets
            .iter()
            .filter(|j| j.pt >= self.config.min_jet_pt)
            .take(self.config.n_jets)
            .map(|j| delta_phi(j.phi, met_phi))
            .fold(f64::INFINITY, f64::min);
        if min_dphi.is_finite() {
            ctx.set_branch(format!("{}.minDPhi", self.name()), min_dphi);
        }
        Ok(min_dphi >= self.config.min)
    }
}

// =============================================================================
// PhotonMt / LeptonMt
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PhotonMtConfig {
    pub min: f64,
    pub max: Option<f64>,
    pub source: MetSource,
}

pub struct PhotonMt {
    base: OperatorBase,
    config: PhotonMtConfig,
}

impl PhotonMt {
    pub fn new(name: &str) -> Self {
        Self {
            base: OperatorBase::new(name),
            config: PhotonMtConfig::default(),
        }
    }
}

config_accessors!(PhotonMt, PhotonMtConfig);

impl Operator for PhotonMt {
    operator_common!(OperatorKind::PhotonMt);

    fn configure(&mut self, params: &Value, _tables: &WeightSourceCache) -> Result<()> {
        self.config = parse_config(self.name(), params)?;
        self.validate()
    }

    fn config_json(&self) -> Value {
        to_json(&self.config)
    }

    fn validate(&self) -> Result<()> {
        check_window(self.name(), self.config.min, self.config.max)
    }

    fn evaluate(&mut self, ctx: &mut EventContext<'_>) -> Result<bool> {
        let Some(photon) = ctx.photons.first() else {
            return Ok(false);
        };
        let met = ctx.met_for(self.config.source);
        let mt = transverse_mass(photon.pt, photon.phi, met.pt, met.phi);
        ctx.set_branch(format!("{}.mt", self.name()), mt);
        Ok(in_window(mt, self.config.min, self.config.max))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LeptonMtConfig {
    #[serde(default)]
    pub flavor: Option<Flavor>,
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub source: MetSource,
}

/// Transverse mass of the leading lepton of one flavor and MET.
pub struct LeptonMt {
    base: OperatorBase,
    config: LeptonMtConfig,
}

impl LeptonMt {
    pub fn new(name: &str) -> Self {
        Self {
            base: OperatorBase::new(name),
            config: LeptonMtConfig::default(),
        }
    }
}

config_accessors!(LeptonMt, LeptonMtConfig);

impl Operator for LeptonMt {
    operator_common!(OperatorKind::LeptonMt);

    fn configure(&mut self, params: &Value, _tables: &WeightSourceCache) -> Result<()> {
        self.config = parse_config(self.name(), params)?;
        self.validate()
    }

    fn config_json(&self) -> Value {
        to_json(&self.config)
    }

    fn validate(&self) -> Result<()> {
        if self.config.flavor.is_none() {
            return Err(missing(self.name(), "flavor"));
        }
        check_window(self.name(), self.config.min, self.config.max)
    }

    fn evaluate(&mut self, ctx: &mut EventContext<'_>) -> Result<bool> {
        let flavor = self.config.flavor.ok_or_else(|| missing(self.name(), "flavor"))?;
        let Some(lepton) = ctx.candidates(flavor.collection(), 1).first().copied() else {
            return Ok(false);
        };
        let met = ctx.met_for(self.config.source);
        let mt = transverse_mass(lepton.pt, lepton.phi, met.pt, met.phi);
        ctx.set_branch(format!("{}.mt", self.name()), mt);
        Ok(in_window(mt, self.config.min, self.config.max))
    }
}

// =============================================================================
// Mass / OppositeSign
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MassConfig {
    pub collection1: Collection,
    pub collection2: Collection,
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub max: Option<f64>,
}

/// Invariant mass window of the leading objects of two collections.
pub struct Mass {
    base: OperatorBase,
    config: MassConfig,
}

impl Mass {
    pub fn new(name: &str) -> Self {
        Self {
            base: OperatorBase::new(name),
            config: MassConfig::default(),
        }
    }

    pub fn with_window(name: &str, collection: Collection, min: f64, max: f64) -> Self {
        let mut op = Self::new(name);
        op.config = MassConfig {
            collection1: collection,
            collection2: collection,
            min,
            max: Some(max),
        };
        op
    }
}

config_accessors!(Mass, MassConfig);

impl Operator for Mass {
    operator_common!(OperatorKind::Mass);

    fn configure(&mut self, params: &Value, _tables: &WeightSourceCache) -> Result<()> {
        self.config = parse_config(self.name(), params)?;
        self.validate()
    }

    fn config_json(&self) -> Value {
        to_json(&self.config)
    }

    fn validate(&self) -> Result<()> {
        check_window(self.name(), self.config.min, self.config.max)
    }

    fn evaluate(&mut self, ctx: &mut EventContext<'_>) -> Result<bool> {
        let Some((a, b)) = leading_pair(ctx, self.config.collection1, self.config.collection2) else {
            return Ok(false);
        };
        let mass = invariant_mass(&a, &b);
        ctx.set_branch(format!("{}.mass", self.name()), mass);
        Ok(in_window(mass, self.config.min, self.config.max))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OppositeSignConfig {
    pub collection1: Collection,
    pub collection2: Collection,
}

pub struct OppositeSign {
    base: OperatorBase,
    config: OppositeSignConfig,
}

impl OppositeSign {
    pub fn new(name: &str) -> Self {
        Self {
            base: OperatorBase::new(name),
            config: OppositeSignConfig::default(),
        }
    }

    pub fn with_collections(name: &str, collection1: Collection, collection2: Collection) -> Self {
        let mut op = Self::new(name);
        op.config = OppositeSignConfig {
            collection1,
            collection2,
        };
        op
    }
}

config_accessors!(OppositeSign, OppositeSignConfig);

impl Operator for OppositeSign {
    operator_common!(OperatorKind::OppositeSign);

    fn configure(&mut self, params: &Value, _tables: &WeightSourceCache) -> Result<()> {
        self.config = parse_config(self.name(), params)?;
        Ok(())
    }

    fn config_json(&self) -> Value {
        to_json(&self.config)
    }

    fn evaluate(&mut self, ctx: &mut EventContext<'_>) -> Result<bool> {
        let Some((a, b)) = leading_pair(ctx, self.config.collection1, self.config.collection2) else {
            return Ok(false);
        };
        let opposite = a.charge * b.charge < 0;
        ctx.set_branch(format!("{}.oppSign", self.name()), if opposite { 1.0 } else { 0.0 });
        Ok(opposite)
    }
}
