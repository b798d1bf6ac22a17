//! Weight operators.
//!
//! Table-backed operators remember the lookup coordinates of the last
//! evaluated event so that variations can be computed without re-running the
//! selection. Bin-error variations need the nominal table to be configured
//! before they are registered.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config_accessors;
use crate::error::{Result, SelectError};
use crate::event::{Collection, EventContext, GenParticle};
use crate::operator::{parse_config, to_json, Operator, OperatorBase};
use crate::operator_common;
use crate::registry::OperatorKind;
use crate::variation::VariationSource;
use crate::weights::{WeightSourceCache, WeightTable};

/// Address of a table in a weight source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableRef {
    pub path: String,
    pub name: String,
}

fn missing(operator: &str, param: &str) -> SelectError {
    SelectError::MissingParameter {
        operator: operator.to_string(),
        param: param.to_string(),
    }
}

fn resolve(operator: &str, table: &Option<TableRef>, tables: &WeightSourceCache) -> Result<Arc<WeightTable>> {
    let r = table.as_ref().ok_or_else(|| missing(operator, "table"))?;
    tables.get(&r.path, &r.name)
}

fn accepts_table_source(table: Option<&Arc<WeightTable>>, source: &VariationSource) -> bool {
    match source {
        VariationSource::Factor(_) => true,
        VariationSource::Table(alt) => table.map_or(false, |t| t.dimension() == alt.dimension()),
        VariationSource::BinError { .. } => table.map_or(false, |t| t.has_errors()),
    }
}

/// Per-object factor under an optional table-style variation.
fn lookup_with(nominal: &WeightTable, source: Option<&VariationSource>, x: f64, y: f64) -> f64 {
    match source {
        None => nominal.lookup(x, y).value,
        Some(VariationSource::Table(alt)) => alt.lookup(x, y).value,
        Some(VariationSource::BinError { sigma }) => {
            let v = nominal.lookup(x, y);
            v.value + sigma * v.error
        }
        Some(VariationSource::Factor(f)) => *f,
    }
}

/// Shared variation path for table-backed operators.
fn table_variation(
    op: &dyn Operator,
    table: Option<&Arc<WeightTable>>,
    coords: &[(f64, f64)],
    name: &str,
) -> Result<f64> {
    let source = match op.variations().get(name) {
        None => return Ok(op.nominal_weight()),
        Some(VariationSource::Factor(f)) => return Ok(*f),
        Some(s) => s,
    };
    let table = table.ok_or_else(|| missing(op.name(), "table"))?;
    Ok(coords.iter().map(|(x, y)| lookup_with(table, Some(source), *x, *y)).product())
}

// =============================================================================
// ConstantWeight
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConstantWeightConfig {
    pub weight: f64,
}

impl Default for ConstantWeightConfig {
    fn default() -> Self {
        Self { weight: 1.0 }
    }
}

/// Fixed factor, e.g. cross section over sum of generator weights.
pub struct ConstantWeight {
    base: OperatorBase,
    config: ConstantWeightConfig,
}

impl ConstantWeight {
    pub fn new(name: &str) -> Self {
        Self {
            base: OperatorBase::new(name),
            config: ConstantWeightConfig::default(),
        }
    }

    pub fn with_weight(name: &str, weight: f64) -> Self {
        let mut op = Self::new(name);
        op.config.weight = weight;
        op
    }
}

config_accessors!(ConstantWeight, ConstantWeightConfig);

impl Operator for ConstantWeight {
    operator_common!(OperatorKind::ConstantWeight);

    fn configure(&mut self, params: &Value, _tables: &WeightSourceCache) -> Result<()> {
        self.config = parse_config(self.name(), params)?;
        self.validate()
    }

    fn config_json(&self) -> Value {
        to_json(&self.config)
    }

    fn validate(&self) -> Result<()> {
        if !self.config.weight.is_finite() {
            return Err(SelectError::invalid(self.name(), "weight", "must be finite"));
        }
        Ok(())
    }

    fn evaluate(&mut self, _ctx: &mut EventContext<'_>) -> Result<bool> {
        Ok(true)
    }

    fn nominal_weight(&self) -> f64 {
        self.config.weight
    }
}

// =============================================================================
// PuWeight
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PuWeightConfig {
    pub table: Option<TableRef>,
}

/// Pileup reweighting in the number of true interactions.
pub struct PuWeight {
    base: OperatorBase,
    config: PuWeightConfig,
    table: Option<Arc<WeightTable>>,
    coords: Vec<(f64, f64)>,
    nominal: f64,
}

impl PuWeight {
    pub fn new(name: &str) -> Self {
        Self {
            base: OperatorBase::new(name),
            config: PuWeightConfig::default(),
            table: None,
            coords: Vec::new(),
            nominal: 1.0,
        }
    }

    pub fn from_table(name: &str, table: Arc<WeightTable>) -> Self {
        let mut op = Self::new(name);
        op.table = Some(table);
        op
    }
}

impl Operator for PuWeight {
    operator_common!(OperatorKind::PuWeight);

    fn configure(&mut self, params: &Value, tables: &WeightSourceCache) -> Result<()> {
        let config: PuWeightConfig = parse_config(self.name(), params)?;
        let table = resolve(self.name(), &config.table, tables)?;
        if table.dimension() != 1 {
            return Err(SelectError::invalid(self.name(), "table", "pileup weights need a 1-D table"));
        }
        self.config = config;
        self.table = Some(table);
        Ok(())
    }

    fn config_json(&self) -> Value {
        to_json(&self.config)
    }

    fn validate(&self) -> Result<()> {
        match self.table {
            Some(_) => Ok(()),
            None => Err(missing(self.name(), "table")),
        }
    }

    fn evaluate(&mut self, ctx: &mut EventContext<'_>) -> Result<bool> {
        let table = self.table.as_ref().ok_or_else(|| missing(self.name(), "table"))?;
        let x = ctx.event.n_true_interactions;
        self.coords = vec![(x, 0.0)];
        self.nominal = table.lookup(x, 0.0).value;
        Ok(true)
    }

    fn nominal_weight(&self) -> f64 {
        self.nominal
    }

    fn accepts_variation(&self, source: &VariationSource) -> bool {
        accepts_table_source(self.table.as_ref(), source)
    }

    fn variation_weight(&self, name: &str, _ctx: &EventContext<'_>) -> Result<f64> {
        table_variation(self, self.table.as_ref(), &self.coords, name)
    }
}

// =============================================================================
// IdSfWeight
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SfVariable {
    Pt,
    #[default]
    Eta,
    AbsEta,
    /// Number of reconstructed primary vertices of the event.
    Npv,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdSfWeightConfig {
    pub collection: Collection,
    pub table: Option<TableRef>,
    #[serde(default = "default_n_particles")]
    pub n_particles: usize,
    #[serde(default)]
    pub x: SfVariable,
    #[serde(default)]
    pub y: Option<SfVariable>,
}

fn default_n_particles() -> usize {
    1
}

/// Product of per-object scale factors over the leading objects of a
/// collection. Events with fewer objects use the ones present.
pub struct IdSfWeight {
    base: OperatorBase,
    config: IdSfWeightConfig,
    table: Option<Arc<WeightTable>>,
    coords: Vec<(f64, f64)>,
    nominal: f64,
}

impl IdSfWeight {
    pub fn new(name: &str) -> Self {
        Self {
            base: OperatorBase::new(name),
            config: IdSfWeightConfig {
                n_particles: 1,
                ..Default::default()
            },
            table: None,
            coords: Vec::new(),
            nominal: 1.0,
        }
    }

    pub fn from_table(name: &str, table: Arc<WeightTable>, config: IdSfWeightConfig) -> Result<Self> {
        let mut op = Self::new(name);
        op.config = config;
        op.table = Some(table);
        op.validate()?;
        Ok(op)
    }

    fn check_shape(&self, table: &WeightTable) -> Result<()> {
        match (table.dimension(), self.config.y) {
            (2, None) => Err(SelectError::invalid(self.name(), "y", "2-D table needs a y variable")),
            (1, Some(_)) => Err(SelectError::invalid(self.name(), "y", "1-D table takes no y variable")),
            _ => Ok(()),
        }
    }
}

fn sf_value(var: SfVariable, pt: f64, eta: f64, npv: u32) -> f64 {
    match var {
        SfVariable::Pt => pt,
        SfVariable::Eta => eta,
        SfVariable::AbsEta => eta.abs(),
        SfVariable::Npv => f64::from(npv),
    }
}

impl Operator for IdSfWeight {
    operator_common!(OperatorKind::IdSfWeight);

    fn configure(&mut self, params: &Value, tables: &WeightSourceCache) -> Result<()> {
        let config: IdSfWeightConfig = parse_config(self.name(), params)?;
        let table = resolve(self.name(), &config.table, tables)?;
        self.config = config;
        self.table = Some(table);
        self.validate()
    }

    fn config_json(&self) -> Value {
        to_json(&self.config)
    }

    fn validate(&self) -> Result<()> {
        let table = self.table.as_ref().ok_or_else(|| missing(self.name(), "table"))?;
        if self.config.n_particles == 0 {
            return Err(SelectError::invalid(self.name(), "n_particles", "must be positive"));
        }
        self.check_shape(table)
    }

    fn evaluate(&mut self, ctx: &mut EventContext<'_>) -> Result<bool> {
        let table = self.table.as_ref().ok_or_else(|| missing(self.name(), "table"))?;
        let npv = ctx.event.npv;
        let (xv, yv) = (self.config.x, self.config.y);
        self.coords = ctx
            .candidates(self.config.collection, self.config.n_particles)
            .iter()
            .map(|c| {
                let x = sf_value(xv, c.pt, c.eta, npv);
                let y = yv.map_or(0.0, |v| sf_value(v, c.pt, c.eta, npv));
                (x, y)
            })
            .collect();
        self.nominal = self.coords.iter().map(|(x, y)| table.lookup(*x, *y).value).product();
        Ok(true)
    }

    fn nominal_weight(&self) -> f64 {
        self.nominal
    }

    fn accepts_variation(&self, source: &VariationSource) -> bool {
        accepts_table_source(self.table.as_ref(), source)
    }

    fn variation_weight(&self, name: &str, _ctx: &EventContext<'_>) -> Result<f64> {
        table_variation(self, self.table.as_ref(), &self.coords, name)
    }
}

// =============================================================================
// PhotonPtWeight
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotonType {
    /// Leading selected photon.
    #[default]
    Reco,
    /// Leading hard-process generator photon.
    Parton,
    /// Leading final-state generator photon.
    PostShower,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PhotonPtWeightConfig {
    pub table: Option<TableRef>,
    #[serde(default)]
    pub photon_type: PhotonType,
    /// Register `<name>Up` / `<name>Down` variations from the per-bin errors.
    #[serde(default)]
    pub use_errors: bool,
}

/// Factor looked up in photon pt: k-factors, fake rates, transfer factors.
/// Events without a photon of the requested type get factor 1.
pub struct PhotonPtWeight {
    base: OperatorBase,
    config: PhotonPtWeightConfig,
    table: Option<Arc<WeightTable>>,
    coords: Vec<(f64, f64)>,
    nominal: f64,
}

fn leading_gen_photon(gen: &[GenParticle], photon_type: PhotonType) -> Option<f64> {
    gen.iter()
        .filter(|p| {
            p.pdg_id == 22
                && match photon_type {
                    PhotonType::Parton => p.hard_process,
                    _ => p.status == 1,
                }
        })
        .map(|p| p.pt)
        .reduce(f64::max)
}

impl PhotonPtWeight {
    pub fn new(name: &str) -> Self {
        Self {
            base: OperatorBase::new(name),
            config: PhotonPtWeightConfig::default(),
            table: None,
            coords: Vec::new(),
            nominal: 1.0,
        }
    }

    pub fn from_table(name: &str, table: Arc<WeightTable>, photon_type: PhotonType, use_errors: bool) -> Result<Self> {
        let mut op = Self::new(name);
        op.config.photon_type = photon_type;
        op.config.use_errors = use_errors;
        op.table = Some(table);
        op.register_error_variations()?;
        Ok(op)
    }

    pub fn photon_type(&self) -> PhotonType {
        self.config.photon_type
    }

    pub fn set_photon_type(&mut self, photon_type: PhotonType) {
        self.config.photon_type = photon_type;
    }

    fn register_error_variations(&mut self) -> Result<()> {
        if !self.config.use_errors {
            return Ok(());
        }
        if !self.table.as_ref().map_or(false, |t| t.has_errors()) {
            return Err(SelectError::invalid(self.name(), "use_errors", "table has no per-bin errors"));
        }
        for (suffix, sigma) in [("Up", 1.0), ("Down", -1.0)] {
            let name = format!("{}{}", self.name(), suffix);
            if !self.variations().contains(&name) {
                self.register_variation(&name, VariationSource::BinError { sigma })?;
            }
        }
        Ok(())
    }
}

impl Operator for PhotonPtWeight {
    operator_common!(OperatorKind::PhotonPtWeight);

    fn configure(&mut self, params: &Value, tables: &WeightSourceCache) -> Result<()> {
        let config: PhotonPtWeightConfig = parse_config(self.name(), params)?;
        let table = resolve(self.name(), &config.table, tables)?;
        if table.dimension() != 1 {
            return Err(SelectError::invalid(self.name(), "table", "photon pt weights need a 1-D table"));
        }
        self.config = config;
        self.table = Some(table);
        self.base_mut().clear_bin_error_variations();
        self.register_error_variations()
    }

    fn config_json(&self) -> Value {
        to_json(&self.config)
    }

    fn validate(&self) -> Result<()> {
        match self.table {
            Some(_) => Ok(()),
            None => Err(missing(self.name(), "table")),
        }
    }

    fn evaluate(&mut self, ctx: &mut EventContext<'_>) -> Result<bool> {
        let table = self.table.as_ref().ok_or_else(|| missing(self.name(), "table"))?;
        let pt = match self.config.photon_type {
            PhotonType::Reco => ctx.photons.first().map(|p| p.pt),
            t => leading_gen_photon(&ctx.event.gen, t),
        };
        self.coords = pt.map(|x| vec![(x, 0.0)]).unwrap_or_default();
        self.nominal = self.coords.iter().map(|(x, y)| table.lookup(*x, *y).value).product();
        Ok(true)
    }

    fn nominal_weight(&self) -> f64 {
        self.nominal
    }

    fn accepts_variation(&self, source: &VariationSource) -> bool {
        accepts_table_source(self.table.as_ref(), source)
    }

    fn variation_weight(&self, name: &str, _ctx: &EventContext<'_>) -> Result<f64> {
        table_variation(self, self.table.as_ref(), &self.coords, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, Lepton, Photon};
    use crate::weights::{Hist1D, Hist2D, JsonTableProvider};
    use serde_json::json;

    fn cache() -> WeightSourceCache {
        WeightSourceCache::new(Box::new(JsonTableProvider::new(None)))
    }

    fn pt_table(errors: bool) -> Arc<WeightTable> {
        Arc::new(WeightTable::Hist1d(Hist1D {
            edges: vec![0.0, 200.0, 400.0, 1000.0],
            values: vec![1.5, 1.3, 1.1],
            errors: errors.then(|| vec![0.1, 0.2, 0.3]),
        }))
    }

    fn photon_event(pt: f64) -> Event {
        Event {
            photons: vec![Photon { pt, ..Default::default() }],
            ..Default::default()
        }
    }

    #[test]
    fn test_constant_weight_requires_weight() {
        let mut op = ConstantWeight::new("crosssection");
        let err = op.configure(&json!({}), &cache()).unwrap_err();
        assert!(matches!(err, SelectError::MissingParameter { ref param, .. } if param == "weight"));
        op.configure(&json!({"weight": 0.25}), &cache()).unwrap();
        assert_eq!(op.nominal_weight(), 0.25);
    }

    #[test]
    fn test_constant_weight_factor_variation() {
        let mut op = ConstantWeight::with_weight("W", 1.0);
        op.register_variation("up", VariationSource::Factor(1.1)).unwrap();
        let ev = Event::default();
        let ctx = EventContext::new(&ev);
        assert_eq!(op.variation_weight("up", &ctx).unwrap(), 1.1);
        assert_eq!(op.variation_weight("other", &ctx).unwrap(), 1.0);
        let err = op
            .register_variation("alt", VariationSource::Table(pt_table(false)))
            .unwrap_err();
        assert!(matches!(err, SelectError::UnsupportedVariation { .. }));
    }

    #[test]
    fn test_pu_weight_lookup() {
        let table = Arc::new(WeightTable::Hist1d(Hist1D {
            edges: vec![0.0, 10.0, 20.0, 50.0],
            values: vec![0.8, 1.0, 1.4],
            errors: None,
        }));
        let mut op = PuWeight::from_table("PUWeight", table);
        let ev = Event {
            n_true_interactions: 25.0,
            ..Default::default()
        };
        op.evaluate(&mut EventContext::new(&ev)).unwrap();
        assert_eq!(op.nominal_weight(), 1.4);
        assert!(!op.accepts_variation(&VariationSource::BinError { sigma: 1.0 }));
    }

    #[test]
    fn test_pu_weight_without_table_fails_validation() {
        let op = PuWeight::new("PUWeight");
        assert!(matches!(op.validate(), Err(SelectError::MissingParameter { .. })));
        let mut op = PuWeight::new("PUWeight");
        assert!(matches!(
            op.configure(&json!({}), &cache()),
            Err(SelectError::MissingParameter { .. })
        ));
    }

    #[test]
    fn test_photon_pt_weight_error_variations() {
        let mut op = PhotonPtWeight::from_table("egfakerate", pt_table(true), PhotonType::Reco, true).unwrap();
        let names: Vec<&str> = op.variations().names().collect();
        assert_eq!(names, vec!["egfakerateUp", "egfakerateDown"]);

        let ev = photon_event(250.0);
        let ctx = EventContext::new(&ev);
        op.evaluate(&mut EventContext::new(&ev)).unwrap();
        assert!((op.nominal_weight() - 1.3).abs() < 1e-12);
        assert!((op.variation_weight("egfakerateUp", &ctx).unwrap() - 1.5).abs() < 1e-12);
        assert!((op.variation_weight("egfakerateDown", &ctx).unwrap() - 1.1).abs() < 1e-12);
    }

    #[test]
    fn test_photon_pt_weight_table_variation() {
        let mut op = PhotonPtWeight::from_table("QCDCorrection", pt_table(false), PhotonType::Reco, false).unwrap();
        let alt = Arc::new(WeightTable::Hist1d(Hist1D {
            edges: vec![0.0, 1000.0],
            values: vec![2.0],
            errors: None,
        }));
        op.register_variation("qcdscaleUp", VariationSource::Table(alt)).unwrap();
        let ev = photon_event(100.0);
        let ctx = EventContext::new(&ev);
        op.evaluate(&mut EventContext::new(&ev)).unwrap();
        assert_eq!(op.nominal_weight(), 1.5);
        assert_eq!(op.variation_weight("qcdscaleUp", &ctx).unwrap(), 2.0);

        // no photon: factor 1 for nominal and table variations
        let empty = Event::default();
        op.evaluate(&mut EventContext::new(&empty)).unwrap();
        assert_eq!(op.nominal_weight(), 1.0);
        assert_eq!(op.variation_weight("qcdscaleUp", &EventContext::new(&empty)).unwrap(), 1.0);
    }

    #[test]
    fn test_table_variation_must_match_dimension() {
        let mut op = PhotonPtWeight::from_table("QCDCorrection", pt_table(false), PhotonType::Reco, false).unwrap();
        let alt = Arc::new(WeightTable::Hist2d(Hist2D {
            x_edges: vec![0.0, 1000.0],
            y_edges: vec![0.0, 1.0, 2.0],
            values: vec![vec![1.3, 2.0]],
            errors: None,
        }));
        let err = op.register_variation("kfUp", VariationSource::Table(alt)).unwrap_err();
        assert!(matches!(err, SelectError::UnsupportedVariation { .. }));
        assert!(op.variations().is_empty());

        let mut unconfigured = PhotonPtWeight::new("late");
        assert!(unconfigured
            .register_variation("up", VariationSource::Table(pt_table(false)))
            .is_err());
    }

    #[test]
    fn test_reconfigure_drops_bin_error_variations() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("kf.json"),
            serde_json::to_string(&json!({
                "plain": {"type": "hist1d", "edges": [0.0, 1000.0], "values": [1.4]}
            }))
            .unwrap(),
        )
        .unwrap();
        let tables = WeightSourceCache::new(Box::new(JsonTableProvider::new(Some(dir.path().to_path_buf()))));

        let mut op = PhotonPtWeight::from_table("egfakerate", pt_table(true), PhotonType::Reco, true).unwrap();
        op.register_variation("flat", VariationSource::Factor(1.2)).unwrap();
        op.configure(
            &json!({"table": {"path": "kf.json", "name": "plain"}, "use_errors": false}),
            &tables,
        )
        .unwrap();
        let names: Vec<&str> = op.variations().names().collect();
        assert_eq!(names, vec!["flat"]);
    }

    #[test]
    fn test_photon_pt_weight_use_errors_needs_errors() {
        assert!(PhotonPtWeight::from_table("w", pt_table(false), PhotonType::Reco, true).is_err());
    }

    #[test]
    fn test_parton_photon_type() {
        let mut op = PhotonPtWeight::from_table("EWKNLOCorrection", pt_table(false), PhotonType::Parton, false).unwrap();
        let ev = Event {
            gen: vec![
                GenParticle { pdg_id: 22, pt: 450.0, hard_process: true, ..Default::default() },
                GenParticle { pdg_id: 22, pt: 100.0, status: 1, ..Default::default() },
            ],
            ..Default::default()
        };
        op.evaluate(&mut EventContext::new(&ev)).unwrap();
        assert_eq!(op.nominal_weight(), 1.1);
        op.set_photon_type(PhotonType::PostShower);
        op.evaluate(&mut EventContext::new(&ev)).unwrap();
        assert_eq!(op.nominal_weight(), 1.5);
    }

    #[test]
    fn test_id_sf_product_over_leading_objects() {
        let table = Arc::new(WeightTable::Hist2d(Hist2D {
            x_edges: vec![0.0, 1.2, 2.4],
            y_edges: vec![0.0, 50.0, 1000.0],
            values: vec![vec![0.9, 0.95], vec![0.8, 0.85]],
            errors: Some(vec![vec![0.01, 0.01], vec![0.02, 0.02]]),
        }));
        let config = IdSfWeightConfig {
            collection: Collection::Muons,
            table: None,
            n_particles: 2,
            x: SfVariable::AbsEta,
            y: Some(SfVariable::Pt),
        };
        let mut op = IdSfWeight::from_table("MuonSF", table, config).unwrap();
        op.register_variation("MuonSFUp", VariationSource::BinError { sigma: 1.0 }).unwrap();
        let mu = |pt: f64, eta: f64| Lepton { pt, eta, tight: true, ..Default::default() };
        let ev = Event {
            muons: vec![mu(60.0, -0.5), mu(30.0, 1.5), mu(20.0, 0.1)],
            ..Default::default()
        };
        let ctx = EventContext::new(&ev);
        op.evaluate(&mut EventContext::new(&ev)).unwrap();
        assert!((op.nominal_weight() - 0.95 * 0.8).abs() < 1e-12);
        assert!((op.variation_weight("MuonSFUp", &ctx).unwrap() - 0.96 * 0.82).abs() < 1e-12);
    }

    #[test]
    fn test_id_sf_shape_mismatch() {
        let config = IdSfWeightConfig {
            collection: Collection::Photons,
            table: None,
            n_particles: 1,
            x: SfVariable::Eta,
            y: None,
        };
        let table = Arc::new(WeightTable::Hist2d(Hist2D {
            x_edges: vec![0.0, 1.0],
            y_edges: vec![0.0, 1.0],
            values: vec![vec![1.0]],
            errors: None,
        }));
        assert!(matches!(
            IdSfWeight::from_table("photonSF", table, config),
            Err(SelectError::InvalidParameter { .. })
        ));
    }
}
