//! Built-in operators.
//!
//! - `filters`: event-level gates (trigger, noise filters, generator truncation)
//! - `objects`: object selection and cleaning; these filter collections in place
//! - `kinematics`: cuts on MET and on combinations of selected objects
//! - `weights`: operators whose main job is a weight factor

pub mod filters;
pub mod kinematics;
pub mod objects;
pub mod weights;

pub use filters::{
    GenParticleSelection, GenParticleSelectionConfig, HaloMode, HltFilter, HltFilterConfig, MetFilters,
    MetFiltersConfig, TruncationVariable, Truncator, TruncatorConfig,
};
pub use kinematics::{
    JetMetDPhi, JetMetDPhiConfig, LeptonMt, LeptonMtConfig, LeptonRecoil, LeptonRecoilConfig, Mass, MassConfig, Met,
    MetConfig, OppositeSign, OppositeSignConfig, PhotonMetDPhi, PhotonMetDPhiConfig, PhotonMt, PhotonMtConfig,
};
pub use objects::{
    apply_selection_changes, BjetVeto, BjetVetoConfig, DijetSelection, DijetSelectionConfig, HighPtJetSelection,
    HighPtJetSelectionConfig, JetCleaning, JetCleaningConfig, LeptonSelection, LeptonSelectionConfig, PhotonCut,
    PhotonSelection, PhotonSelectionConfig, SelectionTerm, TauVeto, TauVetoConfig,
};
pub use weights::{
    ConstantWeight, ConstantWeightConfig, IdSfWeight, IdSfWeightConfig, PhotonPtWeight, PhotonPtWeightConfig,
    PhotonType, PuWeight, PuWeightConfig, SfVariable, TableRef,
};

/// Typed access to an operator's configuration struct.
macro_rules! config_accessors {
    ($op:ty, $cfg:ty) => {
        impl $op {
            pub fn config(&self) -> &$cfg {
                &self.config
            }

            /// Only reachable while the owning pipeline is still configuring.
            pub fn config_mut(&mut self) -> &mut $cfg {
                &mut self.config
            }
        }
    };
}

pub(crate) use config_accessors;

/// Window check shared by the mass / mt / MET style cuts. `max` is exclusive.
pub(crate) fn in_window(value: f64, min: f64, max: Option<f64>) -> bool {
    value >= min && max.map_or(true, |m| value < m)
}
