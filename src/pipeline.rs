//! Ordered operator chains and the per-event reduction.
//!
//! A [`Pipeline`] keeps its operators in a `Vec` together with a
//! `name → position` index; both are updated in the same call. The chain can
//! only change while the pipeline is `Configuring`. The first `evaluate` (or an
//! explicit `start`) validates every operator and switches to `Running`.
//!
//! Per event:
//! - every operator runs, in order, on a context freshly derived from the event
//! - decision = AND over operators whose decision is not ignored
//! - skim = the same AND, stopping at the skim boundary operator
//! - weight = product of all nominal factors, ignored operators included
//! - each variation = product of (variation factor if registered, else nominal)

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use serde::Serialize;
use serde_json::{json, Value};

use crate::error::{Result, SelectError};
use crate::event::{Event, EventContext, Jet, Lepton, Met, Photon, Tau};
use crate::logging::{log_operator_added, log_operator_removed, log_pipeline_started, params_hash};
use crate::operator::{check_finite, Operator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Configuring,
    Running,
}

/// Per-operator cut flow counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CutFlowEntry {
    pub operator: String,
    pub kind: String,
    pub ignore_decision: bool,
    pub evaluated: u64,
    pub passed: u64,
    /// Events passing every non-ignored operator up to and including this one.
    pub surviving: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_ns: Option<u64>,
}

/// Object collections as left by the operator chain.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedObjects {
    pub photons: Vec<Photon>,
    pub electrons: Vec<Lepton>,
    pub muons: Vec<Lepton>,
    pub taus: Vec<Tau>,
    pub jets: Vec<Jet>,
    pub met: Met,
}

impl SelectedObjects {
    fn from_context(ctx: &EventContext<'_>) -> Self {
        Self {
            photons: ctx.photons.clone(),
            electrons: ctx.electrons.clone(),
            muons: ctx.muons.clone(),
            taus: ctx.taus.clone(),
            jets: ctx.jets.clone(),
            met: ctx.met,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EventResult {
    pub decision: bool,
    pub skim: bool,
    /// Decision was forced to false by partial blinding.
    pub blinded: bool,
    pub weight: f64,
    /// One entry per variation, in pipeline order.
    pub variations: Vec<(String, f64)>,
    pub branches: BTreeMap<String, f64>,
    /// Present when the skim decision is true.
    pub objects: Option<SelectedObjects>,
}

impl EventResult {
    pub fn variation(&self, name: &str) -> Option<f64> {
        self.variations.iter().find(|(n, _)| n == name).map(|(_, w)| *w)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Blinding {
    prescale: u64,
    min_run: u32,
}

pub struct Pipeline {
    name: String,
    operators: Vec<Box<dyn Operator>>,
    index: HashMap<String, usize>,
    state: PipelineState,
    skim_boundary: Option<String>,
    blinding: Option<Blinding>,
    use_timers: bool,
    variation_names: Vec<String>,
    cutflow: Vec<CutFlowEntry>,
    evaluated: u64,
    selected: u64,
}

fn event_label(event: &Event) -> String {
    format!("run {} lumi {} event {}", event.run, event.lumi, event.event)
}

impl Pipeline {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            operators: Vec::new(),
            index: HashMap::new(),
            state: PipelineState::Configuring,
            skim_boundary: None,
            blinding: None,
            use_timers: false,
            variation_names: Vec::new(),
            cutflow: Vec::new(),
            evaluated: 0,
            selected: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    pub fn operator_names(&self) -> Vec<String> {
        self.operators.iter().map(|op| op.name().to_string()).collect()
    }

    fn ensure_configuring(&self) -> Result<()> {
        match self.state {
            PipelineState::Configuring => Ok(()),
            PipelineState::Running => Err(SelectError::PipelineRunning(self.name.clone())),
        }
    }

    fn not_found(&self, name: &str) -> SelectError {
        SelectError::OperatorNotFound {
            pipeline: self.name.clone(),
            name: name.to_string(),
        }
    }

    fn reindex(&mut self) {
        self.index = self
            .operators
            .iter()
            .enumerate()
            .map(|(i, op)| (op.name().to_string(), i))
            .collect();
    }

    // -------------------------------------------------------------------------
    // Chain mutation
    // -------------------------------------------------------------------------

    /// Insert at `index`; positions past the end append.
    pub fn add_operator(&mut self, op: Box<dyn Operator>, index: usize) -> Result<()> {
        self.ensure_configuring()?;
        if self.index.contains_key(op.name()) {
            return Err(SelectError::DuplicateOperator {
                pipeline: self.name.clone(),
                name: op.name().to_string(),
            });
        }
        let pos = index.min(self.operators.len());
        log_operator_added(&self.name, op.name(), op.kind().as_str(), pos);
        self.operators.insert(pos, op);
        self.reindex();
        Ok(())
    }

    pub fn push_operator(&mut self, op: Box<dyn Operator>) -> Result<()> {
        self.add_operator(op, usize::MAX)
    }

    pub fn remove_operator(&mut self, name: &str) -> Result<Box<dyn Operator>> {
        self.ensure_configuring()?;
        let pos = self.index(name)?;
        let op = self.operators.remove(pos);
        self.reindex();
        log_operator_removed(&self.name, name);
        Ok(op)
    }

    /// Mutable lookup for configuration.
    pub fn find_operator(&mut self, name: &str) -> Result<&mut dyn Operator> {
        self.ensure_configuring()?;
        let pos = self.index(name)?;
        Ok(self.operators[pos].as_mut())
    }

    /// Mutable lookup downcast to the concrete operator type.
    pub fn find_operator_as<T: Operator>(&mut self, name: &str) -> Result<&mut T> {
        let op = self.find_operator(name)?;
        let actual = op.kind().as_str().to_string();
        op.as_any_mut()
            .downcast_mut::<T>()
            .ok_or_else(|| SelectError::OperatorKindMismatch {
                name: name.to_string(),
                actual,
            })
    }

    pub fn operator(&self, name: &str) -> Result<&dyn Operator> {
        let pos = self.index(name)?;
        Ok(self.operators[pos].as_ref())
    }

    pub fn index(&self, name: &str) -> Result<usize> {
        self.index.get(name).copied().ok_or_else(|| self.not_found(name))
    }

    // -------------------------------------------------------------------------
    // Pipeline-level settings
    // -------------------------------------------------------------------------

    /// Operators after `name` do not take part in the skim decision.
    pub fn set_skim_boundary(&mut self, name: Option<&str>) -> Result<()> {
        self.ensure_configuring()?;
        if let Some(n) = name {
            self.index(n)?;
        }
        self.skim_boundary = name.map(str::to_string);
        Ok(())
    }

    /// Data events with `run >= min_run` and an event number not divisible by
    /// `prescale` are rejected.
    pub fn set_partial_blinding(&mut self, prescale: u64, min_run: u32) -> Result<()> {
        self.ensure_configuring()?;
        if prescale == 0 {
            return Err(SelectError::invalid(&self.name, "prescale", "must be positive"));
        }
        self.blinding = Some(Blinding { prescale, min_run });
        Ok(())
    }

    pub fn set_use_timers(&mut self, use_timers: bool) {
        self.use_timers = use_timers;
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Fingerprint of the chain: kinds, names, flags, configurations and
    /// variation names, in order.
    pub fn config_hash(&self) -> String {
        let chain: Vec<Value> = self
            .operators
            .iter()
            .map(|op| {
                json!({
                    "kind": op.kind().as_str(),
                    "name": op.name(),
                    "ignore_decision": op.ignore_decision(),
                    "config": op.config_json(),
                    "variations": op.variations().names().collect::<Vec<_>>(),
                })
            })
            .collect();
        let doc = json!({
            "pipeline": self.name,
            "skim_boundary": self.skim_boundary,
            "operators": chain,
        });
        params_hash(&doc.to_string())
    }

    /// Validate every operator and freeze the chain. Idempotent.
    pub fn start(&mut self) -> Result<()> {
        if self.state == PipelineState::Running {
            return Ok(());
        }
        for op in &self.operators {
            op.validate()?;
        }
        if let Some(b) = &self.skim_boundary {
            self.index(b)?;
        }

        let mut names: Vec<String> = Vec::new();
        for op in &self.operators {
            for v in op.variations().names() {
                if !names.iter().any(|n| n == v) {
                    names.push(v.to_string());
                }
            }
        }
        self.variation_names = names;

        let use_timers = self.use_timers;
        self.cutflow = self
            .operators
            .iter()
            .map(|op| CutFlowEntry {
                operator: op.name().to_string(),
                kind: op.kind().as_str().to_string(),
                ignore_decision: op.ignore_decision(),
                time_ns: use_timers.then_some(0),
                ..Default::default()
            })
            .collect();

        log_pipeline_started(&self.name, &self.operator_names(), &self.variation_names, &self.config_hash());
        self.state = PipelineState::Running;
        Ok(())
    }

    pub fn variation_names(&self) -> &[String] {
        &self.variation_names
    }

    pub fn cutflow(&self) -> &[CutFlowEntry] {
        &self.cutflow
    }

    /// (events evaluated, events with a true decision)
    pub fn counts(&self) -> (u64, u64) {
        (self.evaluated, self.selected)
    }

    // -------------------------------------------------------------------------
    // Evaluation
    // -------------------------------------------------------------------------

    pub fn evaluate(&mut self, event: &Event) -> Result<EventResult> {
        self.start()?;

        let mut ctx = EventContext::new(event);
        let boundary = self.skim_boundary.as_ref().and_then(|b| self.index.get(b)).copied();

        let mut decision = true;
        let mut skim = true;
        let mut weight = 1.0;

        for (i, op) in self.operators.iter_mut().enumerate() {
            let started = self.use_timers.then(Instant::now);
            let pass = op.evaluate(&mut ctx)?;

            let entry = &mut self.cutflow[i];
            if let (Some(t0), Some(total)) = (started, entry.time_ns.as_mut()) {
                *total += t0.elapsed().as_nanos() as u64;
            }
            entry.evaluated += 1;
            if pass {
                entry.passed += 1;
            }
            if !op.ignore_decision() {
                decision &= pass;
                if boundary.map_or(true, |b| i <= b) {
                    skim &= pass;
                }
            }
            if decision {
                entry.surviving += 1;
            }

            weight *= check_finite(op.name(), op.nominal_weight(), || event_label(event))?;
        }

        let mut blinded = false;
        if let Some(b) = self.blinding {
            if event.is_data && event.run >= b.min_run && event.event % b.prescale != 0 {
                blinded = decision;
                decision = false;
            }
        }

        let mut variations = Vec::with_capacity(self.variation_names.len());
        for name in &self.variation_names {
            let mut w = 1.0;
            for op in &self.operators {
                let factor = if op.variations().contains(name) {
                    op.variation_weight(name, &ctx)?
                } else {
                    op.nominal_weight()
                };
                w *= check_finite(op.name(), factor, || format!("{} variation {}", event_label(event), name))?;
            }
            variations.push((name.clone(), w));
        }

        self.evaluated += 1;
        if decision {
            self.selected += 1;
        }

        let objects = skim.then(|| SelectedObjects::from_context(&ctx));
        Ok(EventResult {
            decision,
            skim,
            blinded,
            weight,
            variations,
            branches: ctx.into_branches(),
            objects,
        })
    }
}
