//! Closed table of operator kinds.
//!
//! Operators are built from string keys validated against [`OperatorKind::ALL`];
//! unknown keys are rejected before anything is constructed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SelectError};
use crate::operator::Operator;
use crate::operators::*;
use crate::variation::VariationSource;
use crate::weights::WeightSourceCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    HltFilter,
    MetFilters,
    PhotonSelection,
    LeptonSelection,
    TauVeto,
    JetCleaning,
    BjetVeto,
    HighPtJetSelection,
    DijetSelection,
    LeptonRecoil,
    Met,
    PhotonMetDPhi,
    JetMetDPhi,
    PhotonMt,
    LeptonMt,
    Mass,
    OppositeSign,
    GenParticleSelection,
    Truncator,
    ConstantWeight,
    PuWeight,
    IdSfWeight,
    PhotonPtWeight,
}

impl OperatorKind {
    pub const ALL: [OperatorKind; 23] = [
        OperatorKind::HltFilter,
        OperatorKind::MetFilters,
        OperatorKind::PhotonSelection,
        OperatorKind::LeptonSelection,
        OperatorKind::TauVeto,
        OperatorKind::JetCleaning,
        OperatorKind::BjetVeto,
        OperatorKind::HighPtJetSelection,
        OperatorKind::DijetSelection,
        OperatorKind::LeptonRecoil,
        OperatorKind::Met,
        OperatorKind::PhotonMetDPhi,
        OperatorKind::JetMetDPhi,
        OperatorKind::PhotonMt,
        OperatorKind::LeptonMt,
        OperatorKind::Mass,
        OperatorKind::OppositeSign,
        OperatorKind::GenParticleSelection,
        OperatorKind::Truncator,
        OperatorKind::ConstantWeight,
        OperatorKind::PuWeight,
        OperatorKind::IdSfWeight,
        OperatorKind::PhotonPtWeight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperatorKind::HltFilter => "HltFilter",
            OperatorKind::MetFilters => "MetFilters",
            OperatorKind::PhotonSelection => "PhotonSelection",
            OperatorKind::LeptonSelection => "LeptonSelection",
            OperatorKind::TauVeto => "TauVeto",
            OperatorKind::JetCleaning => "JetCleaning",
            OperatorKind::BjetVeto => "BjetVeto",
            OperatorKind::HighPtJetSelection => "HighPtJetSelection",
            OperatorKind::DijetSelection => "DijetSelection",
            OperatorKind::LeptonRecoil => "LeptonRecoil",
            OperatorKind::Met => "Met",
            OperatorKind::PhotonMetDPhi => "PhotonMetDPhi",
            OperatorKind::JetMetDPhi => "JetMetDPhi",
            OperatorKind::PhotonMt => "PhotonMt",
            OperatorKind::LeptonMt => "LeptonMt",
            OperatorKind::Mass => "Mass",
            OperatorKind::OppositeSign => "OppositeSign",
            OperatorKind::GenParticleSelection => "GenParticleSelection",
            OperatorKind::Truncator => "Truncator",
            OperatorKind::ConstantWeight => "ConstantWeight",
            OperatorKind::PuWeight => "PuWeight",
            OperatorKind::IdSfWeight => "IdSfWeight",
            OperatorKind::PhotonPtWeight => "PhotonPtWeight",
        }
    }

    /// Unconfigured instance with default settings.
    pub fn construct(self, name: &str) -> Box<dyn Operator> {
        match self {
            OperatorKind::HltFilter => Box::new(HltFilter::new(name)),
            OperatorKind::MetFilters => Box::new(MetFilters::new(name)),
            OperatorKind::PhotonSelection => Box::new(PhotonSelection::new(name)),
            OperatorKind::LeptonSelection => Box::new(LeptonSelection::new(name)),
            OperatorKind::TauVeto => Box::new(TauVeto::new(name)),
            OperatorKind::JetCleaning => Box::new(JetCleaning::new(name)),
            OperatorKind::BjetVeto => Box::new(BjetVeto::new(name)),
            OperatorKind::HighPtJetSelection => Box::new(HighPtJetSelection::new(name)),
            OperatorKind::DijetSelection => Box::new(DijetSelection::new(name)),
            OperatorKind::LeptonRecoil => Box::new(LeptonRecoil::new(name)),
            OperatorKind::Met => Box::new(Met::new(name)),
            OperatorKind::PhotonMetDPhi => Box::new(PhotonMetDPhi::new(name)),
            OperatorKind::JetMetDPhi => Box::new(JetMetDPhi::new(name)),
            OperatorKind::PhotonMt => Box::new(PhotonMt::new(name)),
            OperatorKind::LeptonMt => Box::new(LeptonMt::new(name)),
            OperatorKind::Mass => Box::new(Mass::new(name)),
            OperatorKind::OppositeSign => Box::new(OppositeSign::new(name)),
            OperatorKind::GenParticleSelection => Box::new(GenParticleSelection::new(name)),
            OperatorKind::Truncator => Box::new(Truncator::new(name)),
            OperatorKind::ConstantWeight => Box::new(ConstantWeight::new(name)),
            OperatorKind::PuWeight => Box::new(PuWeight::new(name)),
            OperatorKind::IdSfWeight => Box::new(IdSfWeight::new(name)),
            OperatorKind::PhotonPtWeight => Box::new(PhotonPtWeight::new(name)),
        }
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperatorKind {
    type Err = SelectError;

    fn from_str(s: &str) -> Result<Self> {
        OperatorKind::ALL
            .iter()
            .find(|k| k.as_str() == s)
            .copied()
            .ok_or_else(|| SelectError::UnknownOperatorKind(s.to_string()))
    }
}

/// Build an operator from a kind key; the instance is named after its kind.
pub fn create(kind: &str) -> Result<Box<dyn Operator>> {
    let kind = OperatorKind::from_str(kind)?;
    Ok(kind.construct(kind.as_str()))
}

/// Variation attached through a JSON description. Exactly one source field is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariationSpec {
    pub name: String,
    #[serde(default)]
    pub factor: Option<f64>,
    #[serde(default)]
    pub table: Option<TableRef>,
    #[serde(default)]
    pub sigma: Option<f64>,
}

impl VariationSpec {
    fn source(&self, operator: &str, tables: &WeightSourceCache) -> Result<VariationSource> {
        match (self.factor, &self.table, self.sigma) {
            (Some(f), None, None) => Ok(VariationSource::Factor(f)),
            (None, Some(t), None) => Ok(VariationSource::Table(tables.get(&t.path, &t.name)?)),
            (None, None, Some(sigma)) => Ok(VariationSource::BinError { sigma }),
            _ => Err(SelectError::invalid(
                operator,
                "variations",
                format!("variation {} needs exactly one of factor, table, sigma", self.name),
            )),
        }
    }
}

/// JSON description of one operator:
/// `{"kind": "Met", "name": "RealMetCut", "ignore_decision": true, "params": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperatorSpec {
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub ignore_decision: bool,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub variations: Vec<VariationSpec>,
}

impl OperatorSpec {
    pub fn build(&self, tables: &WeightSourceCache) -> Result<Box<dyn Operator>> {
        let kind = OperatorKind::from_str(&self.kind)?;
        let name = self.name.as_deref().unwrap_or(kind.as_str());
        let mut op = kind.construct(name);
        if let Some(params) = &self.params {
            op.configure(params, tables)?;
        }
        op.set_ignore_decision(self.ignore_decision);
        for v in &self.variations {
            let source = v.source(name, tables)?;
            op.register_variation(&v.name, source)?;
        }
        Ok(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::JsonTableProvider;
    use serde_json::json;

    fn cache() -> WeightSourceCache {
        WeightSourceCache::new(Box::new(JsonTableProvider::new(None)))
    }

    #[test]
    fn test_every_kind_round_trips_its_key() {
        for kind in OperatorKind::ALL {
            assert_eq!(OperatorKind::from_str(kind.as_str()).unwrap(), kind);
            let op = kind.construct("x");
            assert_eq!(op.kind(), kind);
            assert_eq!(op.name(), "x");
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = create("PhotonRecoil").err().unwrap();
        assert!(matches!(err, SelectError::UnknownOperatorKind(ref k) if k == "PhotonRecoil"));
    }

    #[test]
    fn test_create_uses_kind_name() {
        let op = create("TauVeto").unwrap();
        assert_eq!(op.name(), "TauVeto");
        assert!(!op.ignore_decision());
    }

    #[test]
    fn test_operator_spec_build() {
        let spec: OperatorSpec = serde_json::from_value(json!({
            "kind": "Met",
            "name": "RealMetCut",
            "ignore_decision": true,
            "params": {"min": 50.0, "source": "raw"},
            "variations": [{"name": "metUp", "factor": 1.0}]
        }))
        .unwrap();
        let op = spec.build(&cache()).unwrap();
        assert_eq!(op.name(), "RealMetCut");
        assert!(op.ignore_decision());
        assert_eq!(op.config_json()["min"], json!(50.0));
        assert!(op.variations().contains("metUp"));
    }

    #[test]
    fn test_spec_variation_needs_one_source() {
        let spec: OperatorSpec = serde_json::from_value(json!({
            "kind": "ConstantWeight",
            "params": {"weight": 2.0},
            "variations": [{"name": "up", "factor": 1.1, "sigma": 1.0}]
        }))
        .unwrap();
        assert!(matches!(spec.build(&cache()), Err(SelectError::InvalidParameter { .. })));
    }
}
