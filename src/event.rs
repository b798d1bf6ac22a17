//! Decoded event records + the per-pipeline working context.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_one() -> f64 {
    1.0
}

/// Common kinematic view of every reconstructed or generated object.
pub trait Kinematic {
    fn pt(&self) -> f64;
    fn eta(&self) -> f64;
    fn phi(&self) -> f64;
    fn mass(&self) -> f64 {
        0.0
    }
}

macro_rules! impl_kinematic {
    ($t:ty) => {
        impl Kinematic for $t {
            fn pt(&self) -> f64 {
                self.pt
            }
            fn eta(&self) -> f64 {
                self.eta
            }
            fn phi(&self) -> f64 {
                self.phi
            }
        }
    };
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Photon {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    pub h_over_e: f64,
    pub sieie: f64,
    pub sipip: f64,
    pub ch_iso: f64,
    /// Charged isolation maximised over all vertices.
    pub ch_iso_max: f64,
    pub nh_iso: f64,
    pub ph_iso: f64,
    pub pixel_veto: bool,
    pub csafe_veto: bool,
    pub mip_energy: f64,
    pub time: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Lepton {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    pub charge: i32,
    pub loose: bool,
    pub medium: bool,
    pub tight: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Tau {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    pub decay_mode: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Jet {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    pub mass: f64,
    /// b-tag discriminator.
    pub csv: f64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Met {
    pub pt: f64,
    pub phi: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenParticle {
    pub pdg_id: i32,
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    pub mass: f64,
    pub status: i32,
    pub hard_process: bool,
}

impl_kinematic!(Photon);
impl_kinematic!(Lepton);
impl_kinematic!(Tau);

impl Kinematic for Jet {
    fn pt(&self) -> f64 {
        self.pt
    }
    fn eta(&self) -> f64 {
        self.eta
    }
    fn phi(&self) -> f64 {
        self.phi
    }
    fn mass(&self) -> f64 {
        self.mass
    }
}

impl Kinematic for GenParticle {
    fn pt(&self) -> f64 {
        self.pt
    }
    fn eta(&self) -> f64 {
        self.eta
    }
    fn phi(&self) -> f64 {
        self.phi
    }
    fn mass(&self) -> f64 {
        self.mass
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetFilterFlags {
    #[serde(default = "default_true")]
    pub halo: bool,
    #[serde(default = "default_true")]
    pub hbhe: bool,
    #[serde(default = "default_true")]
    pub ecal_dead_cell: bool,
    #[serde(default = "default_true")]
    pub bad_track: bool,
}

impl Default for MetFilterFlags {
    fn default() -> Self {
        Self {
            halo: true,
            hbhe: true,
            ecal_dead_cell: true,
            bad_track: true,
        }
    }
}

/// One decoded input event. Never mutated by the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Event {
    #[serde(default)]
    pub run: u32,
    #[serde(default)]
    pub lumi: u32,
    #[serde(default)]
    pub event: u64,
    #[serde(default)]
    pub is_data: bool,
    #[serde(default)]
    pub npv: u32,
    #[serde(default)]
    pub n_true_interactions: f64,
    #[serde(default)]
    pub triggers: Vec<String>,
    #[serde(default)]
    pub met_filters: MetFilterFlags,
    #[serde(default)]
    pub photons: Vec<Photon>,
    #[serde(default)]
    pub electrons: Vec<Lepton>,
    #[serde(default)]
    pub muons: Vec<Lepton>,
    #[serde(default)]
    pub taus: Vec<Tau>,
    #[serde(default)]
    pub jets: Vec<Jet>,
    #[serde(default)]
    pub met: Met,
    #[serde(default)]
    pub gen: Vec<GenParticle>,
    #[serde(default = "default_one")]
    pub gen_weight: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    #[default]
    Photons,
    Electrons,
    Muons,
    Taus,
    Jets,
}

impl Collection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Photons => "photons",
            Collection::Electrons => "electrons",
            Collection::Muons => "muons",
            Collection::Taus => "taus",
            Collection::Jets => "jets",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Flavor {
    Electron,
    Muon,
}

impl Flavor {
    pub fn collection(&self) -> Collection {
        match self {
            Flavor::Electron => Collection::Electrons,
            Flavor::Muon => Collection::Muons,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetSource {
    /// MET after recoil corrections applied by upstream operators.
    #[default]
    Corrected,
    /// MET as read from the input.
    Raw,
}

/// Flattened view of one object, used by operators that combine collections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub pt: f64,
    pub eta: f64,
    pub phi: f64,
    pub mass: f64,
    pub charge: i32,
}

impl Candidate {
    fn from_kinematic<K: Kinematic>(k: &K, charge: i32) -> Self {
        Self {
            pt: k.pt(),
            eta: k.eta(),
            phi: k.phi(),
            mass: k.mass(),
            charge,
        }
    }
}

impl Kinematic for Candidate {
    fn pt(&self) -> f64 {
        self.pt
    }
    fn eta(&self) -> f64 {
        self.eta
    }
    fn phi(&self) -> f64 {
        self.phi
    }
    fn mass(&self) -> f64 {
        self.mass
    }
}

/// Working state for one pipeline's traversal of one event.
///
/// Collections start as copies of the input event. Operators filter and modify
/// them in place; downstream operators see the modified collections. A new
/// context is built for every (pipeline, event) pair, so nothing carries over.
#[derive(Debug, Clone)]
pub struct EventContext<'a> {
    pub event: &'a Event,
    pub photons: Vec<Photon>,
    pub electrons: Vec<Lepton>,
    pub muons: Vec<Lepton>,
    pub taus: Vec<Tau>,
    pub jets: Vec<Jet>,
    pub met: Met,
    branches: BTreeMap<String, f64>,
}

impl<'a> EventContext<'a> {
    pub fn new(event: &'a Event) -> Self {
        Self {
            event,
            photons: event.photons.clone(),
            electrons: event.electrons.clone(),
            muons: event.muons.clone(),
            taus: event.taus.clone(),
            jets: event.jets.clone(),
            met: event.met,
            branches: BTreeMap::new(),
        }
    }

    pub fn met_for(&self, source: MetSource) -> Met {
        match source {
            MetSource::Corrected => self.met,
            MetSource::Raw => self.event.met,
        }
    }

    pub fn len_of(&self, collection: Collection) -> usize {
        match collection {
            Collection::Photons => self.photons.len(),
            Collection::Electrons => self.electrons.len(),
            Collection::Muons => self.muons.len(),
            Collection::Taus => self.taus.len(),
            Collection::Jets => self.jets.len(),
        }
    }

    /// Up to `n` objects of a collection in stored order.
    pub fn candidates(&self, collection: Collection, n: usize) -> Vec<Candidate> {
        match collection {
            Collection::Photons => self.photons.iter().take(n).map(|p| Candidate::from_kinematic(p, 0)).collect(),
            Collection::Electrons => self.electrons.iter().take(n).map(|l| Candidate::from_kinematic(l, l.charge)).collect(),
            Collection::Muons => self.muons.iter().take(n).map(|l| Candidate::from_kinematic(l, l.charge)).collect(),
            Collection::Taus => self.taus.iter().take(n).map(|t| Candidate::from_kinematic(t, 0)).collect(),
            Collection::Jets => self.jets.iter().take(n).map(|j| Candidate::from_kinematic(j, 0)).collect(),
        }
    }

    /// Record a diagnostic output value.
    pub fn set_branch(&mut self, key: impl Into<String>, value: f64) {
        self.branches.insert(key.into(), value);
    }

    pub fn branch(&self, key: &str) -> Option<f64> {
        self.branches.get(key).copied()
    }

    pub fn into_branches(self) -> BTreeMap<String, f64> {
        self.branches
    }
}

// =============================================================================
// Kinematic helpers
// =============================================================================

/// |Δφ| folded into [0, π].
pub fn delta_phi(a: f64, b: f64) -> f64 {
    let mut d = (a - b).abs() % (2.0 * std::f64::consts::PI);
    if d > std::f64::consts::PI {
        d = 2.0 * std::f64::consts::PI - d;
    }
    d
}

pub fn delta_r<A: Kinematic, B: Kinematic>(a: &A, b: &B) -> f64 {
    let deta = a.eta() - b.eta();
    let dphi = delta_phi(a.phi(), b.phi());
    (deta * deta + dphi * dphi).sqrt()
}

pub fn transverse_mass(pt1: f64, phi1: f64, pt2: f64, phi2: f64) -> f64 {
    (2.0 * pt1 * pt2 * (1.0 - (phi1 - phi2).cos())).max(0.0).sqrt()
}

pub fn invariant_mass<A: Kinematic, B: Kinematic>(a: &A, b: &B) -> f64 {
    let (e1, px1, py1, pz1) = cartesian(a);
    let (e2, px2, py2, pz2) = cartesian(b);
    let e = e1 + e2;
    let px = px1 + px2;
    let py = py1 + py2;
    let pz = pz1 + pz2;
    (e * e - px * px - py * py - pz * pz).max(0.0).sqrt()
}

fn cartesian<K: Kinematic>(k: &K) -> (f64, f64, f64, f64) {
    let px = k.pt() * k.phi().cos();
    let py = k.pt() * k.phi().sin();
    let pz = k.pt() * k.eta().sinh();
    let p2 = px * px + py * py + pz * pz;
    let e = (p2 + k.mass() * k.mass()).sqrt();
    (e, px, py, pz)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_phi_wraps() {
        let d = delta_phi(3.0, -3.0);
        assert!((d - (2.0 * std::f64::consts::PI - 6.0)).abs() < 1e-12);
        assert!(delta_phi(0.5, 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_back_to_back_mass() {
        let a = Candidate { pt: 45.0, eta: 0.0, phi: 0.0, mass: 0.0, charge: 1 };
        let b = Candidate { pt: 45.0, eta: 0.0, phi: std::f64::consts::PI, mass: 0.0, charge: -1 };
        assert!((invariant_mass(&a, &b) - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_transverse_mass_back_to_back() {
        let mt = transverse_mass(100.0, 0.0, 100.0, std::f64::consts::PI);
        assert!((mt - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_event_defaults_from_sparse_json() {
        let ev: Event = serde_json::from_str(r#"{"run": 1, "event": 7, "met": {"pt": 120.0}}"#).unwrap();
        assert_eq!(ev.gen_weight, 1.0);
        assert!(ev.met_filters.halo);
        assert!(ev.photons.is_empty());
        assert_eq!(ev.met.pt, 120.0);
    }

    #[test]
    fn test_context_starts_from_event_copy() {
        let ev = Event {
            jets: vec![Jet { pt: 50.0, ..Default::default() }],
            ..Default::default()
        };
        let mut ctx = EventContext::new(&ev);
        ctx.jets.clear();
        assert_eq!(ev.jets.len(), 1);
        let fresh = EventContext::new(&ev);
        assert_eq!(fresh.jets.len(), 1);
    }
}
