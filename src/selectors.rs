//! Analysis regions.
//!
//! A region is a factory that assembles a [`Pipeline`] for one sample. Regions
//! share a few base chains (photon + MET, lepton + photon) and differ in the
//! photon identification, extra cuts and weights they add on top. Modifiers are
//! applied after the factory, in registration order.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{Result, SelectError};
use crate::event::{Collection, Flavor, MetSource};
use crate::logging::{log, obj, v_str, Domain, Level, ProfileScope};
use crate::operator::Operator;
use crate::operators::*;
use crate::pipeline::Pipeline;
use crate::registry::OperatorKind;
use crate::variation::VariationSource;
use crate::weights::WeightSourceCache;

// =============================================================================
// Inputs
// =============================================================================

fn default_sumw() -> f64 {
    1.0
}

/// Minimal dataset descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub name: String,
    /// Full dataset name; pileup profiles are matched against it.
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub is_data: bool,
    #[serde(default)]
    pub crosssection: f64,
    #[serde(default = "default_sumw")]
    pub sumw: f64,
}

impl Sample {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let sample: Sample = serde_json::from_str(&raw)?;
        if !sample.is_data && !(sample.sumw > 0.0) {
            return Err(SelectError::invalid("sample", "sumw", "must be positive for simulation"));
        }
        Ok(sample)
    }

    pub fn data(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fullname: name.to_string(),
            is_data: true,
            crosssection: 0.0,
            sumw: 1.0,
        }
    }

    pub fn mc(name: &str, fullname: &str, crosssection: f64, sumw: f64) -> Self {
        Self {
            name: name.to_string(),
            fullname: fullname.to_string(),
            is_data: false,
            crosssection,
            sumw,
        }
    }
}

/// Analysis-wide selection settings and weight source locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionSetting {
    pub photon_full_selection: Vec<String>,
    /// File holding `puweight_<profile>` tables.
    pub puweight_source: String,
    /// File holding `tfact*<suffix>` tables, and the suffix.
    pub hadron_tfactor_source: (String, String),
    pub hadron_proxy_def: Vec<String>,
    pub photon_id_sf: TableRef,
    pub efake_rate: TableRef,
    pub kfactor_source: String,
    pub ewk_source: String,
    pub electron_tight_sf: TableRef,
    pub electron_loose_sf: TableRef,
    pub electron_track_sf: TableRef,
    pub muon_tight_sf: TableRef,
    pub muon_loose_sf: TableRef,
    pub muon_track_sf: TableRef,
}

fn table_ref(path: &str, name: &str) -> TableRef {
    TableRef {
        path: path.to_string(),
        name: name.to_string(),
    }
}

impl SelectionSetting {
    pub fn monophoton() -> Self {
        Self {
            photon_full_selection: [
                "HOverE",
                "Sieie",
                "NHIso",
                "PhIso",
                "CHIsoMax",
                "EVeto",
                "MIP49",
                "Time",
                "SieieNonzero",
                "SipipNonzero",
                "NoisyRegion",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            puweight_source: "pileup.json".to_string(),
            hadron_tfactor_source: ("hadronTFactor.json".to_string(), "_gjetscwiso".to_string()),
            hadron_proxy_def: vec!["!CHIsoMax".to_string(), "+CHIsoMax11".to_string()],
            photon_id_sf: table_ref("photon_id_sf16.json", "EGamma_SF2D"),
            efake_rate: table_ref("efake_data_ptalt.json", "frate"),
            kfactor_source: "kfactor.json".to_string(),
            ewk_source: "ewk_corr.json".to_string(),
            electron_tight_sf: table_ref("egamma_electron_tight_SF_ichep.json", "EGamma_SF2D"),
            electron_loose_sf: table_ref("egamma_electron_loose_SF_ichep.json", "EGamma_SF2D"),
            electron_track_sf: table_ref("egamma_gsf_tracking_SF_ichep.json", "EGamma_SF2D"),
            muon_tight_sf: table_ref("scaleFactor_muon_tightid_12p9.json", "scaleFactor_muon_tightid_RooCMSShape"),
            muon_loose_sf: table_ref("scaleFactor_muon_looseid_12p9.json", "scaleFactor_muon_looseid_RooCMSShape"),
            muon_track_sf: table_ref("muonpog_muon_tracking_SF_ichep.json", "htrack2"),
        }
    }
}

impl Default for SelectionSetting {
    fn default() -> Self {
        Self::monophoton()
    }
}

/// Everything a region factory may read besides the sample.
pub struct SetupEnv<'a> {
    pub tables: &'a WeightSourceCache,
    pub setting: SelectionSetting,
}

impl<'a> SetupEnv<'a> {
    pub fn new(tables: &'a WeightSourceCache) -> Self {
        Self {
            tables,
            setting: SelectionSetting::default(),
        }
    }
}

pub type RegionFactory = fn(&Sample, &str, &SetupEnv<'_>) -> Result<Pipeline>;
pub type Modifier = Box<dyn Fn(&Sample, &mut Pipeline, &SetupEnv<'_>) -> Result<()> + Send + Sync>;

// =============================================================================
// Registry
// =============================================================================

struct Region {
    name: String,
    factory: RegionFactory,
    modifiers: Vec<Modifier>,
}

/// Region name → factory (+ modifiers).
#[derive(Default)]
pub struct SelectorRegistry {
    regions: Vec<Region>,
}

impl SelectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All regions shipped with the crate.
    pub fn with_defaults() -> Self {
        let mut reg = Self::new();
        let defaults: [(&str, RegionFactory); 22] = [
            ("monoph", monoph),
            ("signalRaw", signal_raw),
            ("efake", efake),
            ("hfake", hfake),
            ("hfakeUp", hfake_up),
            ("hfakeDown", hfake_down),
            ("purity", purity),
            ("purityUp", purity_up),
            ("purityDown", purity_down),
            ("lowmt", lowmt),
            ("lowmtEfake", lowmt_efake),
            ("gjets", gjets),
            ("emjet", emjet),
            ("dimu", dimu),
            ("diel", diel),
            ("monomu", monomu),
            ("monomuHfake", monomu_hfake),
            ("monoel", monoel),
            ("monoelHfake", monoel_hfake),
            ("elmu", elmu),
            ("zmumu", zmumu),
            ("wenu", wenu),
        ];
        for (name, factory) in defaults {
            reg.register(name, factory);
        }
        reg
    }

    /// Add or replace a region.
    pub fn register(&mut self, name: &str, factory: RegionFactory) {
        self.register_with(name, factory, Vec::new());
    }

    pub fn register_with(&mut self, name: &str, factory: RegionFactory, modifiers: Vec<Modifier>) {
        self.regions.retain(|r| r.name != name);
        self.regions.push(Region {
            name: name.to_string(),
            factory,
            modifiers,
        });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.regions.iter().any(|r| r.name == name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.regions.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn build(&self, sample: &Sample, region: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
        self.build_as(sample, region, region, &[], env)
    }

    /// Build `region` under the pipeline name `name`, applying `extra`
    /// modifiers after the registered ones.
    pub fn build_as(
        &self,
        sample: &Sample,
        region: &str,
        name: &str,
        extra: &[Modifier],
        env: &SetupEnv<'_>,
    ) -> Result<Pipeline> {
        let r = self
            .regions
            .iter()
            .find(|r| r.name == region)
            .ok_or_else(|| SelectError::UnknownRegion(region.to_string()))?;
        let _scope = ProfileScope::with_context("region_build", &[("region", v_str(region)), ("name", v_str(name))]);
        let mut pipeline = (r.factory)(sample, name, env)?;
        for modifier in r.modifiers.iter().chain(extra) {
            modifier(sample, &mut pipeline, env)?;
        }
        Ok(pipeline)
    }

    pub fn build_request(&self, sample: &Sample, request: &RegionRequest, env: &SetupEnv<'_>) -> Result<Pipeline> {
        self.build_as(sample, &request.region, &request.name, &request.modifiers, env)
    }
}

// =============================================================================
// Sample → regions
// =============================================================================

/// One pipeline to run on a sample: a registered region, the output name and
/// the sample-specific modifiers.
pub struct RegionRequest {
    pub name: String,
    pub region: String,
    pub modifiers: Vec<Modifier>,
}

impl RegionRequest {
    pub fn plain(region: &str) -> Self {
        Self {
            name: region.to_string(),
            region: region.to_string(),
            modifiers: Vec::new(),
        }
    }

    pub fn modified(name: &str, region: &str, modifiers: Vec<Modifier>) -> Self {
        Self {
            name: name.to_string(),
            region: region.to_string(),
            modifiers,
        }
    }
}

impl std::fmt::Debug for RegionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionRequest")
            .field("name", &self.name)
            .field("region", &self.region)
            .field("modifiers", &self.modifiers.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegionGroup {
    /// Candidate region.
    Cand,
    /// Candidate region with k-factors.
    VgCand,
    Lep,
    VgLep,
    Dilep,
    /// Fake-photon and purity regions for QCD-like samples.
    Qcd,
    /// Photon+jets: raw and corrected candidate plus purity, with k-factors.
    Gj,
    /// Non-electron W decays in the candidate region, plus `wenu`.
    Wlnu,
    LowMt,
    VgLowMt,
    /// Default for signal models.
    Sig,
}

const DATA_SPH: &[&str] = &[
    "monoph", "efake", "hfake", "hfakeUp", "hfakeDown", "purity", "purityUp", "purityDown", "lowmt", "lowmtEfake",
    "gjets",
];
const DATA_SMU: &[&str] = &["dimu", "monomu", "monomuHfake", "elmu"];
const DATA_SEL: &[&str] = &["diel", "monoel", "monoelHfake"];
const QCD: &[&str] = &["hfake", "hfakeUp", "hfakeDown", "purity", "purityUp", "purityDown", "gjets"];

fn mc_groups(name: &str) -> &'static [RegionGroup] {
    use RegionGroup::*;
    let prefix = name.split('-').next().unwrap_or(name);
    match prefix {
        "znng" => &[VgCand, VgLowMt],
        "wnlg" => &[VgCand, VgLep, VgLowMt],
        "wglo" => &[Cand, Lep, LowMt],
        "zg" | "ttg" | "wwg" | "ww" | "wz" | "zz" => &[Cand, Lep, Dilep, LowMt],
        "tg" => &[Cand, Lep],
        "tt" | "dy" => &[Cand, Lep, Dilep],
        "gj" | "gj04" => &[Gj, Qcd, LowMt],
        "gg" => &[Cand, Qcd, LowMt],
        "qcd" => &[Cand, Qcd],
        "wlnu" => &[Wlnu, Lep],
        _ => &[Sig],
    }
}

fn expand(group: RegionGroup, out: &mut Vec<RegionRequest>) {
    let plain = |names: &[&str], out: &mut Vec<RegionRequest>| {
        out.extend(names.iter().map(|n| RegionRequest::plain(n)));
    };
    let corrected = |names: &[&str], out: &mut Vec<RegionRequest>| {
        out.extend(names.iter().map(|n| RegionRequest::modified(n, n, vec![kfactor()])));
    };
    match group {
        RegionGroup::Cand => plain(&["monoph"], out),
        RegionGroup::VgCand => corrected(&["monoph"], out),
        RegionGroup::Lep => plain(&["monomu", "monoel"], out),
        RegionGroup::VgLep => corrected(&["monomu", "monoel"], out),
        RegionGroup::Dilep => plain(&["dimu", "diel", "elmu"], out),
        RegionGroup::Qcd => plain(QCD, out),
        RegionGroup::Gj => {
            out.push(RegionRequest::modified("raw", "monoph", vec![kfactor()]));
            corrected(&["monoph", "purity"], out);
        }
        RegionGroup::Wlnu => {
            out.push(RegionRequest::modified("monoph", "monoph", vec![wlnu()]));
            plain(&["wenu"], out);
        }
        RegionGroup::LowMt => plain(&["lowmt"], out),
        RegionGroup::VgLowMt => corrected(&["lowmt"], out),
        RegionGroup::Sig => plain(&["monoph", "signalRaw"], out),
    }
}

/// Default pipelines for a sample, chosen from its name. Data streams select
/// by primary dataset (`sph`, `smu`, `sel`); 2015 data has none. When two
/// groups produce the same pipeline name the first one wins.
pub fn sample_regions(sample: &Sample) -> Vec<RegionRequest> {
    let mut out = Vec::new();
    if sample.is_data {
        let name = sample.name.as_str();
        if name.contains("-15") || name.ends_with("-d3") || name.ends_with("-d4") {
            return out;
        }
        let regions: &[&str] = if name.starts_with("sph-") {
            DATA_SPH
        } else if name.starts_with("smu-") {
            DATA_SMU
        } else if name.starts_with("sel-") {
            DATA_SEL
        } else {
            &[]
        };
        out.extend(regions.iter().map(|r| RegionRequest::plain(r)));
        return out;
    }

    for group in mc_groups(&sample.name) {
        let mut requests = Vec::new();
        expand(*group, &mut requests);
        for request in requests {
            if !out.iter().any(|r: &RegionRequest| r.name == request.name) {
                out.push(request);
            }
        }
    }
    out
}

// =============================================================================
// Helpers
// =============================================================================

fn setup_info(event: &str, sample: &Sample, detail: &str) {
    log(
        Level::Info,
        Domain::Setup,
        event,
        obj(&[("sample", v_str(&sample.name)), ("detail", v_str(detail))]),
    );
}

/// Rebuild the photon selection (or veto) terms from the analysis list.
pub fn setup_photon_selection(pipeline: &mut Pipeline, env: &SetupEnv<'_>, veto: bool, changes: &[&str]) -> Result<()> {
    let changes: Vec<String> = changes.iter().map(|c| c.to_string()).collect();
    let terms = apply_selection_changes("PhotonSelection", &env.setting.photon_full_selection, &changes)?;
    let sel = pipeline.find_operator_as::<PhotonSelection>("PhotonSelection")?;
    if veto {
        sel.config_mut().veto = terms;
    } else {
        sel.config_mut().selection = terms;
    }
    Ok(())
}

fn push_all(pipeline: &mut Pipeline, kinds: &[OperatorKindName]) -> Result<()> {
    for (kind, name) in kinds {
        pipeline.push_operator(kind.construct(name))?;
    }
    Ok(())
}

type OperatorKindName = (OperatorKind, &'static str);

fn ignore(pipeline: &mut Pipeline, names: &[&str]) -> Result<()> {
    for name in names {
        pipeline.find_operator(name)?.set_ignore_decision(true);
    }
    Ok(())
}

fn add_crosssection(sample: &Sample, pipeline: &mut Pipeline) -> Result<()> {
    pipeline.push_operator(Box::new(ConstantWeight::with_weight(
        "crosssection",
        sample.crosssection / sample.sumw,
    )))
}

fn weight_op(kind: OperatorKind, name: &str, params: serde_json::Value, env: &SetupEnv<'_>) -> Result<Box<dyn Operator>> {
    let mut op = kind.construct(name);
    op.configure(&params, env.tables)?;
    Ok(op)
}

/// Pileup weight whose profile name is contained in the sample's full name.
pub fn add_pu_weight(sample: &Sample, pipeline: &mut Pipeline, env: &SetupEnv<'_>) -> Result<()> {
    let path = &env.setting.puweight_source;
    let mut names = env.tables.names(path)?;
    names.sort();
    let chosen = names.into_iter().find(|n| {
        n.strip_prefix("puweight_")
            .map_or(false, |profile| !profile.is_empty() && sample.fullname.contains(profile))
    });
    let Some(table) = chosen else {
        return Err(SelectError::weight_source(
            path,
            "puweight_*",
            format!("pileup profile for {} not defined", sample.name),
        ));
    };
    setup_info("pu_weight_selected", sample, &table);
    let op = weight_op(
        OperatorKind::PuWeight,
        "PUWeight",
        json!({"table": {"path": path, "name": table}}),
        env,
    )?;
    pipeline.push_operator(op)
}

/// Photon ID scale factor plus the flat extra factor.
pub fn add_id_sf_weight(sample: &Sample, pipeline: &mut Pipeline, env: &SetupEnv<'_>) -> Result<()> {
    setup_info("photon_id_sf", sample, &env.setting.photon_id_sf.name);
    let op = weight_op(
        OperatorKind::IdSfWeight,
        "photonSF",
        json!({"collection": "photons", "table": env.setting.photon_id_sf, "x": "eta", "y": "pt"}),
        env,
    )?;
    pipeline.push_operator(op)?;
    pipeline.push_operator(Box::new(ConstantWeight::with_weight("extraSF", 0.991)))
}

fn lepton_sf_ops(flavor: Flavor, env: &SetupEnv<'_>, loose: bool, n: usize) -> Result<Vec<Box<dyn Operator>>> {
    let s = &env.setting;
    let (id_name, track_name, collection, id_table, track_table, x, track_vars) = match flavor {
        Flavor::Electron => (
            "ElectronSF",
            "GsfTrackSF",
            "electrons",
            if loose { &s.electron_loose_sf } else { &s.electron_tight_sf },
            &s.electron_track_sf,
            "eta",
            json!({"x": "eta", "y": "npv"}),
        ),
        Flavor::Muon => (
            "MuonSF",
            "MuonTrackSF",
            "muons",
            if loose { &s.muon_loose_sf } else { &s.muon_tight_sf },
            &s.muon_track_sf,
            "abs_eta",
            json!({"x": "npv"}),
        ),
    };

    let id = weight_op(
        OperatorKind::IdSfWeight,
        id_name,
        json!({"collection": collection, "table": id_table, "n_particles": n, "x": x, "y": "pt"}),
        env,
    )?;

    let mut track_params = json!({"collection": collection, "table": track_table, "n_particles": n});
    if let (Some(dst), Some(src)) = (track_params.as_object_mut(), track_vars.as_object()) {
        for (k, v) in src {
            dst.insert(k.clone(), v.clone());
        }
    }
    let track = weight_op(OperatorKind::IdSfWeight, track_name, track_params, env)?;
    Ok(vec![id, track])
}

pub fn add_lepton_id_sf_weight(flavor: Flavor, pipeline: &mut Pipeline, env: &SetupEnv<'_>) -> Result<()> {
    for op in lepton_sf_ops(flavor, env, false, 1)? {
        pipeline.push_operator(op)?;
    }
    Ok(())
}

/// Swap the lepton scale factors to the loose working point for `n` leptons.
fn use_loose_lepton_sf(flavor: Flavor, pipeline: &mut Pipeline, env: &SetupEnv<'_>, n: usize) -> Result<()> {
    for op in lepton_sf_ops(flavor, env, true, n)? {
        let name = op.name().to_string();
        let config = op.config_json();
        pipeline.find_operator(&name)?.configure(&config, env.tables)?;
    }
    Ok(())
}

/// Hadron → photon proxy weight and the proxy photon definition.
pub fn mod_hfake(pipeline: &mut Pipeline, env: &SetupEnv<'_>) -> Result<()> {
    let (path, suffix) = &env.setting.hadron_tfactor_source;
    let op = weight_op(
        OperatorKind::PhotonPtWeight,
        "hadProxyWeight",
        json!({"table": {"path": path, "name": format!("tfactNom{}", suffix)}, "photon_type": "reco"}),
        env,
    )?;
    pipeline.push_operator(op)?;

    let proxy: Vec<&str> = env.setting.hadron_proxy_def.iter().map(String::as_str).collect();
    setup_photon_selection(pipeline, env, false, &proxy)?;
    setup_photon_selection(pipeline, env, true, &[])
}

/// Electron → photon fake-rate weight with its error variations, and the
/// inverted pixel veto.
pub fn mod_efake(pipeline: &mut Pipeline, env: &SetupEnv<'_>, selections: &[&str]) -> Result<()> {
    let op = weight_op(
        OperatorKind::PhotonPtWeight,
        "egfakerate",
        json!({"table": env.setting.efake_rate, "use_errors": true}),
        env,
    )?;
    pipeline.push_operator(op)?;

    let mut changes: Vec<&str> = selections.to_vec();
    changes.extend(["-EVeto", "!CSafeVeto"]);
    setup_photon_selection(pipeline, env, false, &changes)?;
    setup_photon_selection(pipeline, env, true, &[])
}

// =============================================================================
// Modifiers
// =============================================================================

fn truncator(variable: TruncationVariable, name: &'static str, min: f64, max: Option<f64>) -> Modifier {
    Box::new(move |_sample, pipeline, _env| {
        let op = Truncator::with_window(name, variable, min, max);
        pipeline.add_operator(Box::new(op), 0)
    })
}

/// Generator photon pt window, inserted at the front of the chain.
pub fn pt_truncator(min: f64, max: Option<f64>) -> Modifier {
    truncator(TruncationVariable::PhotonPt, "PhotonPtTruncator", min, max)
}

/// Generator HT window, inserted at the front of the chain.
pub fn ht_truncator(min: f64, max: Option<f64>) -> Modifier {
    truncator(TruncationVariable::Ht, "HtTruncator", min, max)
}

/// Keep only W decays without a hard-process electron. The electron channel
/// is covered by `wenu`.
pub fn wlnu() -> Modifier {
    Box::new(|_sample, pipeline, _env| {
        let op = GenParticleSelection::hard_process("WlnuFilter", 11, true);
        pipeline.add_operator(Box::new(op), 0)
    })
}

/// Veto events with an isolated hard-process photon above 130 GeV, for
/// inclusive samples that overlap with a dedicated photon sample.
pub fn gen_photon_veto() -> Modifier {
    Box::new(|_sample, pipeline, _env| {
        let mut op = GenParticleSelection::hard_process("GenPhotonVeto", 22, true);
        op.config_mut().min_pt = 130.0;
        op.config_mut().min_parton_dr = Some(0.5);
        pipeline.add_operator(Box::new(op), 0)
    })
}

/// QCD (with scale variations) and electroweak photon-pt corrections looked up
/// by sample name.
pub fn kfactor() -> Modifier {
    Box::new(|sample, pipeline, env| add_kfactor(sample, pipeline, env))
}

pub fn add_kfactor(sample: &Sample, pipeline: &mut Pipeline, env: &SetupEnv<'_>) -> Result<()> {
    let sname = sample.name.replace("gj04", "gj");
    let tables = env.tables;

    let qcd_table = tables.get(&env.setting.kfactor_source, &sname)?;
    let photon_type = if sname.contains("gj-") {
        PhotonType::PostShower
    } else {
        PhotonType::Parton
    };
    let mut qcd = PhotonPtWeight::from_table("QCDCorrection", qcd_table, photon_type, false)?;
    for variation in ["renUp", "renDown", "facUp", "facDown", "scaleUp", "scaleDown"] {
        if let Some(alt) = tables.get_optional(&env.setting.kfactor_source, &format!("{}_{}", sname, variation))? {
            setup_info("qcd_variation", sample, variation);
            qcd.register_variation(&format!("qcd{}", variation), VariationSource::Table(alt))?;
        }
    }
    pipeline.push_operator(Box::new(qcd))?;

    if let Some(ewk_table) = tables.get_optional(&env.setting.ewk_source, &sname)? {
        setup_info("ewk_correction", sample, &sname);
        let mut ewk = PhotonPtWeight::from_table("EWKNLOCorrection", ewk_table, PhotonType::Parton, false)?;
        for variation in ["Up", "Down"] {
            if let Some(alt) = tables.get_optional(&env.setting.ewk_source, &format!("{}_{}", sname, variation))? {
                ewk.register_variation(&format!("ewk{}", variation), VariationSource::Table(alt))?;
            }
        }
        pipeline.push_operator(Box::new(ewk))?;
    }
    Ok(())
}

// =============================================================================
// Base chains
// =============================================================================

/// High-pt photon, lepton veto, Δφ(photon, MET), Δφ(jet, MET), MET.
fn monophoton_base(sample: &Sample, rname: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
    let mut p = Pipeline::new(rname);
    if sample.is_data {
        p.push_operator(Box::new(HltFilter::with_path("HLTFilter", "HLT_Photon165_HE10")))?;
    }
    push_all(
        &mut p,
        &[
            (OperatorKind::MetFilters, "MetFilters"),
            (OperatorKind::PhotonSelection, "PhotonSelection"),
            (OperatorKind::LeptonSelection, "LeptonSelection"),
            (OperatorKind::TauVeto, "TauVeto"),
            (OperatorKind::JetCleaning, "JetCleaning"),
            (OperatorKind::BjetVeto, "BjetVeto"),
            (OperatorKind::PhotonMetDPhi, "PhotonMetDPhi"),
            (OperatorKind::JetMetDPhi, "JetMetDPhi"),
            (OperatorKind::Met, "Met"),
            (OperatorKind::PhotonMt, "PhotonMt"),
        ],
    )?;

    p.find_operator_as::<PhotonSelection>("PhotonSelection")?.config_mut().min_pt = 175.0;

    let leptons = p.find_operator_as::<LeptonSelection>("LeptonSelection")?;
    leptons.set_n(0, 0);
    leptons.config_mut().require_medium = false;
    leptons.config_mut().require_tight = false;

    if !sample.is_data {
        add_crosssection(sample, &mut p)?;
        add_pu_weight(sample, &mut p, env)?;
    }

    ignore(&mut p, &["TauVeto", "BjetVeto", "PhotonMetDPhi", "JetMetDPhi", "Met"])?;
    p.find_operator_as::<JetCleaning>("JetCleaning")?
        .set_clean_against(Collection::Taus, false);
    p.set_skim_boundary(Some("PhotonSelection"))?;
    Ok(p)
}

/// Photon purity / transfer factor measurement base: low MET, a hard jet.
fn emjet_base(sample: &Sample, rname: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
    let mut p = monophoton_base(sample, rname, env)?;
    p.remove_operator("PhotonMt")?;

    let met = p.find_operator_as::<Met>("Met")?;
    met.config_mut().min = 0.0;
    met.config_mut().max = Some(170.0);
    met.set_ignore_decision(false);

    p.push_operator(Box::new(HighPtJetSelection::new("HighPtJetSelection")))?;

    let mut dijet = DijetSelection::new("DijetSelection");
    dijet.set_ignore_decision(true);
    p.push_operator(Box::new(dijet))?;

    if !sample.is_data {
        let mut gen = GenParticleSelection::new("GenPhotonSelection");
        let c = gen.config_mut();
        c.pdg_id = 22;
        c.min_pt = 140.0;
        c.max_eta = 1.7;
        p.add_operator(Box::new(gen), 1)?;
    }
    Ok(p)
}

/// n-lepton + photon base. The leptons are added to MET as recoil.
fn lepton_base(sample: &Sample, rname: &str, flavor: Flavor, env: &SetupEnv<'_>) -> Result<Pipeline> {
    let mut p = Pipeline::new(rname);
    if sample.is_data {
        p.push_operator(Box::new(HltFilter::with_path("HLTFilter", "HLT_Photon165_HE10")))?;
    }
    push_all(
        &mut p,
        &[
            (OperatorKind::MetFilters, "MetFilters"),
            (OperatorKind::PhotonSelection, "PhotonSelection"),
            (OperatorKind::LeptonSelection, "LeptonSelection"),
            (OperatorKind::TauVeto, "TauVeto"),
            (OperatorKind::JetCleaning, "JetCleaning"),
            (OperatorKind::BjetVeto, "BjetVeto"),
            (OperatorKind::LeptonRecoil, "LeptonRecoil"),
            (OperatorKind::PhotonMetDPhi, "PhotonMetDPhi"),
            (OperatorKind::JetMetDPhi, "JetMetDPhi"),
            (OperatorKind::Met, "Met"),
        ],
    )?;

    p.find_operator_as::<JetMetDPhi>("JetMetDPhi")?.config_mut().source = MetSource::Raw;
    p.find_operator_as::<LeptonSelection>("LeptonSelection")?
        .config_mut()
        .require_medium = false;
    setup_photon_selection(&mut p, env, false, &[])?;
    p.find_operator_as::<LeptonRecoil>("LeptonRecoil")?.config_mut().flavor = Some(flavor);

    if !sample.is_data {
        add_crosssection(sample, &mut p)?;
        add_pu_weight(sample, &mut p, env)?;
        add_id_sf_weight(sample, &mut p, env)?;
        add_lepton_id_sf_weight(flavor, &mut p, env)?;
    }

    ignore(&mut p, &["TauVeto", "BjetVeto", "PhotonMetDPhi", "JetMetDPhi", "Met"])?;
    p.find_operator_as::<JetCleaning>("JetCleaning")?
        .set_clean_against(Collection::Taus, false);
    p.set_skim_boundary(Some("PhotonSelection"))?;
    Ok(p)
}

fn mass_cut(name: &str, collection: Collection) -> Box<dyn Operator> {
    let mut op = Mass::with_window(name, collection, 60.0, 120.0);
    op.set_ignore_decision(true);
    Box::new(op)
}

fn sign_cut(name: &str, collection: Collection) -> Box<dyn Operator> {
    let mut op = OppositeSign::with_collections(name, collection, collection);
    op.set_ignore_decision(true);
    Box::new(op)
}

fn lepton_mt_cut(flavor: Flavor) -> Box<dyn Operator> {
    let mut op = LeptonMt::new("LeptonMt");
    op.config_mut().flavor = Some(flavor);
    op.config_mut().max = Some(160.0);
    op.set_ignore_decision(true);
    Box::new(op)
}

// =============================================================================
// Regions
// =============================================================================

/// Full monophoton selection.
pub fn monoph(sample: &Sample, rname: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
    let mut p = monophoton_base(sample, rname, env)?;
    setup_photon_selection(&mut p, env, false, &[])?;
    if !sample.is_data {
        add_id_sf_weight(sample, &mut p, env)?;
    }
    Ok(p)
}

/// Every cut recorded but ignored, for shape comparisons.
pub fn signal_raw(sample: &Sample, rname: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
    let mut p = monoph(sample, rname, env)?;
    ignore(
        &mut p,
        &["MetFilters", "PhotonSelection", "LeptonSelection", "TauVeto", "PhotonMetDPhi", "JetMetDPhi", "Met"],
    )?;
    p.find_operator_as::<PhotonSelection>("PhotonSelection")?.config_mut().min_pt = 30.0;
    p.find_operator_as::<LeptonSelection>("LeptonSelection")?.set_n(0, 0);
    p.push_operator(mass_cut("dimuMass", Collection::Muons))?;
    p.push_operator(mass_cut("dielMass", Collection::Electrons))?;
    Ok(p)
}

/// Candidate-like with the inverted electron veto.
pub fn efake(sample: &Sample, rname: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
    let mut p = monophoton_base(sample, rname, env)?;
    mod_efake(&mut p, env, &[])?;
    Ok(p)
}

/// Candidate-like with inverted charged isolation, weighted by the hadron
/// transfer factor.
pub fn hfake(sample: &Sample, rname: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
    let mut p = monophoton_base(sample, rname, env)?;
    mod_hfake(&mut p, env)?;

    let (path, suffix) = &env.setting.hadron_tfactor_source;
    let weight = p.find_operator("hadProxyWeight")?;
    for (variation, table) in [
        ("proxyDefUp", "tfactTight"),
        ("proxyDefDown", "tfactLoose"),
        ("purityUp", "tfactNomPurityUp"),
        ("purityDown", "tfactNomPurityDown"),
    ] {
        let alt = env.tables.get(path, &format!("{}{}", table, suffix))?;
        weight.register_variation(variation, VariationSource::Table(alt))?;
    }

    // looser than nominal so the proxy definition variations stay inside
    setup_photon_selection(
        &mut p,
        env,
        false,
        &["!CHIsoMax", "+CHIsoMax11", "-NHIso", "+NHIsoLoose", "-PhIso", "+PhIsoLoose"],
    )?;
    setup_photon_selection(&mut p, env, true, &[])?;
    Ok(p)
}

/// Hadron proxy with the transfer factor and proxy definition shifted to one
/// side. `isolation` replaces the loose neutral and photon isolation of the
/// nominal proxy.
fn hfake_shifted(
    sample: &Sample,
    rname: &str,
    env: &SetupEnv<'_>,
    table: &str,
    isolation: &[&str],
) -> Result<Pipeline> {
    let mut p = monophoton_base(sample, rname, env)?;
    mod_hfake(&mut p, env)?;

    let (path, suffix) = &env.setting.hadron_tfactor_source;
    let params = json!({"table": {"path": path, "name": format!("{}{}", table, suffix)}, "photon_type": "reco"});
    p.find_operator("hadProxyWeight")?.configure(&params, env.tables)?;

    let mut changes = vec!["!CHIsoMax", "+CHIsoMax11"];
    changes.extend_from_slice(isolation);
    setup_photon_selection(&mut p, env, false, &changes)?;
    setup_photon_selection(&mut p, env, true, &[])?;
    Ok(p)
}

pub fn hfake_up(sample: &Sample, rname: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
    hfake_shifted(sample, rname, env, "tfactTight", &[])
}

pub fn hfake_down(sample: &Sample, rname: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
    hfake_shifted(sample, rname, env, "tfactLoose", &["-NHIso", "+NHIsoLoose", "-PhIso", "+PhIsoLoose"])
}

/// Photon+jet sample for the purity fit: σiηiη sideband open, no charged
/// isolation.
pub fn purity(sample: &Sample, rname: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
    purity_with(sample, rname, env, &[])
}

/// Purity with loose neutral and photon isolation.
pub fn purity_up(sample: &Sample, rname: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
    purity_with(sample, rname, env, &["-NHIso", "+NHIsoLoose", "-PhIso", "+PhIsoLoose"])
}

/// Purity with a narrower σiηiη sideband.
pub fn purity_down(sample: &Sample, rname: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
    purity_with(sample, rname, env, &["-Sieie15", "+Sieie12"])
}

fn purity_with(sample: &Sample, rname: &str, env: &SetupEnv<'_>, extra: &[&str]) -> Result<Pipeline> {
    let mut p = emjet_base(sample, rname, env)?;
    let mut changes = vec!["-Sieie", "+Sieie15", "-CHIsoMax"];
    changes.extend_from_slice(extra);
    setup_photon_selection(&mut p, env, false, &changes)?;
    Ok(p)
}

/// Photon+jets study region: loose σiηiη and charged isolation, with the
/// candidate photon selection as veto.
pub fn gjets(sample: &Sample, rname: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
    let mut p = emjet_base(sample, rname, env)?;
    setup_photon_selection(&mut p, env, false, &["-Sieie", "-CHIsoMax", "+Sieie15", "+CHIsoMax11"])?;
    setup_photon_selection(&mut p, env, true, &[])?;
    Ok(p)
}

fn low_mt_window(p: &mut Pipeline) -> Result<()> {
    let mt = p.find_operator_as::<PhotonMt>("PhotonMt")?;
    mt.config_mut().min = 40.0;
    mt.config_mut().max = Some(150.0);

    let met = p.find_operator_as::<Met>("Met")?;
    met.config_mut().min = 0.0;
    met.config_mut().max = Some(170.0);
    Ok(())
}

/// Candidate photon with low photon-MET transverse mass.
pub fn lowmt(sample: &Sample, rname: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
    let mut p = monoph(sample, rname, env)?;
    low_mt_window(&mut p)?;
    Ok(p)
}

pub fn lowmt_efake(sample: &Sample, rname: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
    let mut p = monophoton_base(sample, rname, env)?;
    low_mt_window(&mut p)?;
    mod_efake(&mut p, env, &[])?;
    Ok(p)
}

/// Candidate-like W → eν with a generator electron and no electron veto on
/// the photon.
pub fn wenu(sample: &Sample, rname: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
    let mut p = monophoton_base(sample, rname, env)?;
    if !sample.is_data {
        p.add_operator(Box::new(GenParticleSelection::hard_process("WenuFilter", 11, false)), 0)?;
    }
    p.find_operator_as::<PhotonSelection>("PhotonSelection")?.config_mut().min_pt = 15.0;
    setup_photon_selection(&mut p, env, false, &["-EVeto"])?;
    Ok(p)
}

/// EM object with loosened ID, recoiling against a hard jet.
pub fn emjet(sample: &Sample, rname: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
    let mut p = emjet_base(sample, rname, env)?;
    setup_photon_selection(
        &mut p,
        env,
        false,
        &["-Sieie", "+Sieie15", "-CHIsoMax", "-NHIso", "+NHIsoLoose", "-PhIso", "+PhIsoLoose", "-EVeto"],
    )?;
    Ok(p)
}

pub fn dimu(sample: &Sample, rname: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
    let mut p = lepton_base(sample, rname, Flavor::Muon, env)?;
    p.find_operator_as::<LeptonSelection>("LeptonSelection")?.set_n(0, 2);
    p.push_operator(mass_cut("dimuMass", Collection::Muons))?;
    p.push_operator(sign_cut("dimuSign", Collection::Muons))?;
    if !sample.is_data {
        use_loose_lepton_sf(Flavor::Muon, &mut p, env, 2)?;
    }
    Ok(p)
}

pub fn diel(sample: &Sample, rname: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
    let mut p = lepton_base(sample, rname, Flavor::Electron, env)?;
    p.find_operator_as::<LeptonSelection>("LeptonSelection")?.set_n(2, 0);
    p.push_operator(mass_cut("dielMass", Collection::Electrons))?;
    p.push_operator(sign_cut("dielSign", Collection::Electrons))?;
    if !sample.is_data {
        use_loose_lepton_sf(Flavor::Electron, &mut p, env, 2)?;
    }
    Ok(p)
}

pub fn monomu(sample: &Sample, rname: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
    let mut p = lepton_base(sample, rname, Flavor::Muon, env)?;
    p.find_operator_as::<LeptonSelection>("LeptonSelection")?.set_n(0, 1);
    p.push_operator(lepton_mt_cut(Flavor::Muon))?;
    Ok(p)
}

pub fn monoel(sample: &Sample, rname: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
    let mut p = lepton_base(sample, rname, Flavor::Electron, env)?;
    p.find_operator_as::<LeptonSelection>("LeptonSelection")?.set_n(1, 0);
    p.push_operator(lepton_mt_cut(Flavor::Electron))?;

    let mut real_met = Met::new("RealMetCut");
    real_met.config_mut().source = MetSource::Raw;
    real_met.config_mut().min = 50.0;
    real_met.set_ignore_decision(true);
    p.push_operator(Box::new(real_met))?;
    Ok(p)
}

pub fn monomu_hfake(sample: &Sample, rname: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
    let mut p = monomu(sample, rname, env)?;
    mod_hfake(&mut p, env)?;
    Ok(p)
}

pub fn monoel_hfake(sample: &Sample, rname: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
    let mut p = monoel(sample, rname, env)?;
    mod_hfake(&mut p, env)?;
    Ok(p)
}

pub fn elmu(sample: &Sample, rname: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
    let mut p = lepton_base(sample, rname, Flavor::Muon, env)?;
    p.find_operator_as::<LeptonSelection>("LeptonSelection")?.set_n(1, 1);
    if !sample.is_data {
        add_lepton_id_sf_weight(Flavor::Electron, &mut p, env)?;
    }
    Ok(p)
}

/// Dimuon only; the skim decision covers the whole chain.
pub fn zmumu(sample: &Sample, rname: &str, env: &SetupEnv<'_>) -> Result<Pipeline> {
    let mut p = Pipeline::new(rname);
    p.push_operator(Box::new(MetFilters::new("MetFilters")))?;

    let mut leptons = LeptonSelection::new("LeptonSelection");
    leptons.set_n(0, 2);
    leptons.config_mut().require_tight = false;
    p.push_operator(Box::new(leptons))?;

    p.push_operator(Box::new(Mass::with_window("dimuMass", Collection::Muons, 60.0, 120.0)))?;

    if !sample.is_data {
        add_crosssection(sample, &mut p)?;
        add_pu_weight(sample, &mut p, env)?;
    }
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::{Hist1D, TableProvider, WeightTable};

    /// Serves flat tables for any name; pileup profiles are fixed.
    struct FlatProvider;

    impl TableProvider for FlatProvider {
        fn load(&self, _path: &str, name: &str) -> Result<WeightTable> {
            if name.starts_with("EGamma") || name.starts_with("scaleFactor") {
                return Ok(WeightTable::Hist2d(crate::weights::Hist2D {
                    x_edges: vec![-2.5, 2.5],
                    y_edges: vec![0.0, 1000.0],
                    values: vec![vec![1.0]],
                    errors: None,
                }));
            }
            Ok(WeightTable::Hist1d(Hist1D {
                edges: vec![0.0, 1000.0],
                values: vec![1.0],
                errors: Some(vec![0.1]),
            }))
        }

        fn names(&self, _path: &str) -> Result<Vec<String>> {
            Ok(vec!["puweight_RunIISummer16".to_string(), "other".to_string()])
        }
    }

    fn cache() -> WeightSourceCache {
        WeightSourceCache::new(Box::new(FlatProvider))
    }

    fn mc() -> Sample {
        Sample::mc("znng-130", "/ZNuNuGJets/RunIISummer16MiniAODv2/MINIAODSIM", 2.0, 100.0)
    }

    #[test]
    fn test_every_default_region_builds() {
        let tables = cache();
        let env = SetupEnv::new(&tables);
        let reg = SelectorRegistry::with_defaults();
        assert_eq!(reg.names().len(), 22);
        for region in reg.names() {
            reg.build(&mc(), region, &env).unwrap();
            reg.build(&Sample::data("sph-16b"), region, &env).unwrap();
        }
    }

    #[test]
    fn test_unknown_region() {
        let tables = cache();
        let env = SetupEnv::new(&tables);
        let err = SelectorRegistry::with_defaults()
            .build(&mc(), "nope", &env)
            .err()
            .unwrap();
        assert!(matches!(err, SelectError::UnknownRegion(_)));
    }

    #[test]
    fn test_monoph_layout() {
        let tables = cache();
        let env = SetupEnv::new(&tables);
        let p = monoph(&mc(), "monoph", &env).unwrap();
        assert!(p.operator("HLTFilter").is_err());
        assert!(p.operator("Met").unwrap().ignore_decision());
        assert!(!p.operator("PhotonSelection").unwrap().ignore_decision());
        assert!(p.index("PUWeight").unwrap() > p.index("crosssection").unwrap());
        assert_eq!(p.operator("crosssection").unwrap().nominal_weight(), 0.02);

        let data = monoph(&Sample::data("sph-16b"), "monoph", &env).unwrap();
        assert_eq!(data.index("HLTFilter").unwrap(), 0);
        assert!(data.operator("PUWeight").is_err());
    }

    #[test]
    fn test_pileup_profile_must_match() {
        let tables = cache();
        let env = SetupEnv::new(&tables);
        let sample = Sample::mc("odd", "/Odd/Fall15/AODSIM", 1.0, 1.0);
        let err = monoph(&sample, "monoph", &env).err().unwrap();
        assert!(matches!(err, SelectError::WeightSource { .. }));
    }

    #[test]
    fn test_hfake_and_efake_variations() {
        let tables = cache();
        let env = SetupEnv::new(&tables);
        let p = hfake(&mc(), "hfake", &env).unwrap();
        let names: Vec<&str> = p.operator("hadProxyWeight").unwrap().variations().names().collect();
        assert_eq!(names, vec!["proxyDefUp", "proxyDefDown", "purityUp", "purityDown"]);

        let p = efake(&mc(), "efake", &env).unwrap();
        assert!(p.operator("egfakerate").unwrap().variations().contains("egfakerateUp"));
    }

    #[test]
    fn test_emjet_gen_photon_inserted_second() {
        let tables = cache();
        let env = SetupEnv::new(&tables);
        let p = emjet(&mc(), "emjet", &env).unwrap();
        assert_eq!(p.index("GenPhotonSelection").unwrap(), 1);
        assert!(p.operator("PhotonMt").is_err());
        assert!(!p.operator("Met").unwrap().ignore_decision());
    }

    #[test]
    fn test_modifiers_insert_at_front() {
        let tables = cache();
        let env = SetupEnv::new(&tables);
        let mut reg = SelectorRegistry::with_defaults();
        reg.register_with("monophPt", monoph, vec![pt_truncator(0.0, Some(500.0)), kfactor()]);
        let p = reg.build(&mc(), "monophPt", &env).unwrap();
        assert_eq!(p.index("PhotonPtTruncator").unwrap(), 0);
        assert!(p.operator("QCDCorrection").is_ok());
        assert_eq!(p.name(), "monophPt");
    }

    fn request_names(requests: &[RegionRequest]) -> Vec<&str> {
        requests.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn test_sample_regions_by_name() {
        let sph = sample_regions(&Sample::data("sph-16b2"));
        assert_eq!(request_names(&sph), DATA_SPH.to_vec());
        assert!(sample_regions(&Sample::data("sph-15d")).is_empty());
        assert_eq!(request_names(&sample_regions(&Sample::data("smu-16c2"))), DATA_SMU.to_vec());

        let znng = sample_regions(&mc());
        assert_eq!(request_names(&znng), vec!["monoph", "lowmt"]);
        assert!(znng.iter().all(|r| r.modifiers.len() == 1));

        // purity comes from the photon+jets group with k-factors, not again from the QCD group
        let gj = sample_regions(&Sample::mc("gj04-200", "/GJets_HT-200To400/RunIISummer16/MINIAODSIM", 1.0, 1.0));
        let names = request_names(&gj);
        assert_eq!(&names[..3], &["raw", "monoph", "purity"]);
        assert_eq!(names.iter().filter(|n| **n == "purity").count(), 1);
        assert_eq!(gj[2].modifiers.len(), 1);
        assert_eq!(gj[0].region, "monoph");

        let dm = sample_regions(&Sample::mc("dmv-500-1", "/DarkMatter/RunIISummer16/MINIAODSIM", 1.0, 1.0));
        assert_eq!(request_names(&dm), vec!["monoph", "signalRaw"]);
    }

    #[test]
    fn test_wlnu_sample_filters_electron_decays() {
        let tables = cache();
        let env = SetupEnv::new(&tables);
        let sample = Sample::mc("wlnu-200", "/WJetsToLNu_HT-200To400/RunIISummer16MiniAODv2/MINIAODSIM", 1.0, 1.0);
        let requests = sample_regions(&sample);
        assert_eq!(request_names(&requests), vec!["monoph", "wenu", "monomu", "monoel"]);

        let reg = SelectorRegistry::with_defaults();
        let monoph = reg.build_request(&sample, &requests[0], &env).unwrap();
        assert_eq!(monoph.index("WlnuFilter").unwrap(), 0);
        assert_eq!(monoph.name(), "monoph");
        let cfg = monoph.operator("WlnuFilter").unwrap().config_json();
        assert_eq!(cfg["veto"], json!(true));
        assert_eq!(cfg["pdg_id"], json!(11));

        let wenu = reg.build_request(&sample, &requests[1], &env).unwrap();
        assert_eq!(wenu.index("WenuFilter").unwrap(), 0);
        assert_eq!(wenu.operator("WenuFilter").unwrap().config_json()["veto"], json!(false));
    }

    #[test]
    fn test_build_as_renames_and_applies_extra_modifiers() {
        let tables = cache();
        let env = SetupEnv::new(&tables);
        let reg = SelectorRegistry::with_defaults();
        let p = reg
            .build_as(&mc(), "monoph", "raw", &[gen_photon_veto(), kfactor()], &env)
            .unwrap();
        assert_eq!(p.name(), "raw");
        assert_eq!(p.index("GenPhotonVeto").unwrap(), 0);
        assert_eq!(p.operator("GenPhotonVeto").unwrap().config_json()["min_parton_dr"], json!(0.5));
        assert!(p.operator("QCDCorrection").is_ok());
    }

    #[test]
    fn test_shifted_hadron_proxies() {
        let tables = cache();
        let env = SetupEnv::new(&tables);
        let up = hfake_up(&mc(), "hfakeUp", &env).unwrap();
        let cfg = up.operator("hadProxyWeight").unwrap().config_json();
        assert_eq!(cfg["table"]["name"], json!("tfactTight_gjetscwiso"));
        assert!(up.operator("hadProxyWeight").unwrap().variations().is_empty());

        let down = hfake_down(&mc(), "hfakeDown", &env).unwrap();
        let cfg = down.operator("hadProxyWeight").unwrap().config_json();
        assert_eq!(cfg["table"]["name"], json!("tfactLoose_gjetscwiso"));

        let mu = monomu_hfake(&mc(), "monomuHfake", &env).unwrap();
        assert!(mu.index("hadProxyWeight").unwrap() > mu.index("LeptonMt").unwrap());
    }

    #[test]
    fn test_lowmt_and_purity_layout() {
        let tables = cache();
        let env = SetupEnv::new(&tables);
        let p = lowmt(&mc(), "lowmt", &env).unwrap();
        let mt = p.operator("PhotonMt").unwrap().config_json();
        assert_eq!(mt["max"], json!(150.0));
        assert!(!p.operator("PhotonMt").unwrap().ignore_decision());

        let e = lowmt_efake(&mc(), "lowmtEfake", &env).unwrap();
        assert!(e.operator("egfakerate").is_ok());
        assert!(e.operator("photonSF").is_err());

        let down = purity_down(&mc(), "purityDown", &env).unwrap();
        let sel = down.operator("PhotonSelection").unwrap().config_json();
        let names: Vec<String> = sel["selection"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t.to_string())
            .collect();
        assert!(names.iter().any(|n| n.contains("Sieie12")));
        assert!(!names.iter().any(|n| n.contains("Sieie15")));
    }

    #[test]
    fn test_dimu_uses_loose_sf_for_two_muons() {
        let tables = cache();
        let env = SetupEnv::new(&tables);
        let p = dimu(&mc(), "dimu", &env).unwrap();
        let cfg = p.operator("MuonSF").unwrap().config_json();
        assert_eq!(cfg["n_particles"], json!(2));
        assert_eq!(cfg["table"]["name"], json!("scaleFactor_muon_looseid_RooCMSShape"));
    }
}
