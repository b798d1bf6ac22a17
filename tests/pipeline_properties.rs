//! Pipeline reduction properties: decision AND, weight product, variations,
//! chain ordering and the configure/run split.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use evskim::event::{Event, EventContext, Photon};
use evskim::operator::{Operator, OperatorBase};
use evskim::operator_common;
use evskim::operators::{ConstantWeight, Mass, Met, PhotonSelection};
use evskim::pipeline::{Pipeline, PipelineState};
use evskim::registry::OperatorKind;
use evskim::variation::VariationSource;
use evskim::weights::{Hist1D, JsonTableProvider, WeightSourceCache, WeightTable};
use evskim::SelectError;

/// Fixed decision and weight; records its name and the photon count it saw.
struct Fixed {
    base: OperatorBase,
    decision: bool,
    weight: f64,
    drop_photons: bool,
    trace: Arc<Mutex<Vec<(String, usize)>>>,
}

impl Fixed {
    fn new(name: &str, decision: bool, weight: f64) -> Self {
        Self {
            base: OperatorBase::new(name),
            decision,
            weight,
            drop_photons: false,
            trace: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn ignored(mut self) -> Self {
        self.set_ignore_decision(true);
        self
    }

    fn traced(mut self, trace: &Arc<Mutex<Vec<(String, usize)>>>) -> Self {
        self.trace = Arc::clone(trace);
        self
    }
}

impl Operator for Fixed {
    operator_common!(OperatorKind::ConstantWeight);

    fn configure(&mut self, _params: &Value, _tables: &WeightSourceCache) -> evskim::Result<()> {
        Ok(())
    }

    fn config_json(&self) -> Value {
        json!({"decision": self.decision, "weight": self.weight})
    }

    fn evaluate(&mut self, ctx: &mut EventContext<'_>) -> evskim::Result<bool> {
        self.trace
            .lock()
            .unwrap()
            .push((self.name().to_string(), ctx.photons.len()));
        if self.drop_photons {
            ctx.photons.clear();
        }
        Ok(self.decision)
    }

    fn nominal_weight(&self) -> f64 {
        self.weight
    }
}

fn tables() -> WeightSourceCache {
    WeightSourceCache::new(Box::new(JsonTableProvider::new(None)))
}

fn photon_event() -> Event {
    Event {
        run: 1,
        event: 42,
        photons: vec![
            Photon {
                pt: 220.0,
                eta: 0.3,
                ..Default::default()
            },
            Photon {
                pt: 40.0,
                eta: 1.1,
                ..Default::default()
            },
        ],
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn ignored_operator_scales_weight_but_not_decision() {
    let mut p = Pipeline::new("A");
    p.push_operator(Box::new(Fixed::new("A", true, 2.0))).unwrap();
    p.push_operator(Box::new(Fixed::new("B", false, 3.0).ignored())).unwrap();

    let r = p.evaluate(&Event::default()).unwrap();
    assert!(r.decision);
    assert_eq!(r.weight, 6.0);

    let cutflow = p.cutflow();
    assert_eq!(cutflow[1].evaluated, 1);
    assert_eq!(cutflow[1].passed, 0);
    assert!(cutflow[1].ignore_decision);
}

#[test]
fn failing_operator_rejects_event() {
    let mut p = Pipeline::new("B");
    p.push_operator(Box::new(Fixed::new("A", false, 1.0))).unwrap();
    assert!(!p.evaluate(&Event::default()).unwrap().decision);
}

#[test]
fn factor_variation_replaces_nominal() {
    let mut p = Pipeline::new("C");
    let mut w = ConstantWeight::with_weight("W", 1.0);
    w.register_variation("up", VariationSource::Factor(1.1)).unwrap();
    p.push_operator(Box::new(w)).unwrap();

    let r = p.evaluate(&Event::default()).unwrap();
    assert_eq!(r.weight, 1.0);
    assert_eq!(r.variation("up"), Some(1.1));
    assert_eq!(p.variation_names(), ["up".to_string()]);
}

#[test]
fn operator_inserted_at_front_runs_first() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut p = Pipeline::new("D");
    p.push_operator(Box::new(Fixed::new("later", true, 1.0).traced(&trace))).unwrap();

    let mut front = Fixed::new("front", true, 1.0).traced(&trace);
    front.drop_photons = true;
    p.add_operator(Box::new(front), 0).unwrap();
    assert_eq!(p.operator_names(), vec!["front", "later"]);

    p.evaluate(&photon_event()).unwrap();
    let seen = trace.lock().unwrap().clone();
    assert_eq!(seen, vec![("front".to_string(), 2), ("later".to_string(), 0)]);
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

#[test]
fn find_returns_the_added_instance() {
    let mut p = Pipeline::new("find");
    let op: Box<dyn Operator> = Box::new(Fixed::new("A", true, 1.0));
    let addr = &*op as *const dyn Operator as *const ();
    p.push_operator(op).unwrap();

    let found = p.find_operator("A").unwrap() as *const dyn Operator as *const ();
    assert_eq!(addr, found);

    p.remove_operator("A").unwrap();
    assert!(p.find_operator("A").err().unwrap().is_not_found());
}

#[test]
fn duplicate_names_rejected() {
    let mut p = Pipeline::new("dup");
    p.push_operator(Box::new(Fixed::new("A", true, 1.0))).unwrap();
    let err = p.push_operator(Box::new(Fixed::new("A", true, 1.0))).unwrap_err();
    assert!(matches!(err, SelectError::DuplicateOperator { .. }));
    assert_eq!(p.len(), 1);
}

#[test]
fn weight_is_exact_product_without_variations() {
    let mut p = Pipeline::new("product");
    for (name, w) in [("a", 0.5), ("b", 3.0), ("c", 1.25)] {
        p.push_operator(Box::new(ConstantWeight::with_weight(name, w))).unwrap();
    }
    let r = p.evaluate(&Event::default()).unwrap();
    assert_eq!(r.weight, 0.5 * 3.0 * 1.25);
    assert!(r.variations.is_empty());
}

#[test]
fn repeated_evaluation_is_deterministic() {
    let mut p = Pipeline::new("det");
    let mut sel = PhotonSelection::new("PhotonSelection");
    sel.config_mut().min_pt = 100.0;
    p.push_operator(Box::new(sel)).unwrap();
    p.push_operator(Box::new(ConstantWeight::with_weight("w", 0.7))).unwrap();

    let event = photon_event();
    let first = p.evaluate(&event).unwrap();
    let second = p.evaluate(&event).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.branches.get("PhotonSelection.size"), Some(&1.0));
    assert_eq!(first.objects.as_ref().map(|o| o.photons.len()), Some(1));
}

#[test]
fn skim_can_pass_while_decision_fails() {
    let mut p = Pipeline::new("skim");
    p.push_operator(Box::new(Fixed::new("pre", true, 1.0))).unwrap();
    p.push_operator(Box::new(Met::new("Met"))).unwrap();
    p.set_skim_boundary(Some("pre")).unwrap();

    let r = p.evaluate(&Event::default()).unwrap();
    assert!(r.skim);
    assert!(!r.decision);
    assert!(r.objects.is_some());
}

#[test]
fn blinding_only_touches_data() {
    let mut p = Pipeline::new("blind");
    p.push_operator(Box::new(Fixed::new("pass", true, 1.0))).unwrap();
    p.set_partial_blinding(5, 100).unwrap();

    let mut data = Event {
        run: 200,
        event: 3,
        is_data: true,
        ..Default::default()
    };
    let r = p.evaluate(&data).unwrap();
    assert!(!r.decision && r.blinded);

    data.event = 10;
    assert!(p.evaluate(&data).unwrap().decision);

    let mc = Event {
        run: 200,
        event: 3,
        ..Default::default()
    };
    assert!(p.evaluate(&mc).unwrap().decision);
}

#[test]
fn running_pipeline_is_frozen() {
    let mut p = Pipeline::new("frozen");
    p.push_operator(Box::new(Fixed::new("A", true, 1.0))).unwrap();
    p.start().unwrap();
    assert_eq!(p.state(), PipelineState::Running);

    let err = p.push_operator(Box::new(Fixed::new("B", true, 1.0))).unwrap_err();
    assert!(matches!(err, SelectError::PipelineRunning(_)));
    assert!(matches!(p.remove_operator("A"), Err(SelectError::PipelineRunning(_))));
    assert!(p.operator("A").is_ok());
}

#[test]
fn missing_required_parameter() {
    let mut mass = Mass::new("dimuMass");
    let err = mass
        .configure(&json!({"collection1": "muons", "min": 60.0}), &tables())
        .unwrap_err();
    match err {
        SelectError::MissingParameter { operator, param } => {
            assert_eq!(operator, "dimuMass");
            assert_eq!(param, "collection2");
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn table_variation_on_cut_operator_rejected() {
    let table = Arc::new(WeightTable::Hist1d(Hist1D {
        edges: vec![0.0, 1.0],
        values: vec![1.0],
        errors: None,
    }));
    let mut met = Met::new("Met");
    let err = met
        .register_variation("metUp", VariationSource::Table(table))
        .unwrap_err();
    assert!(matches!(err, SelectError::UnsupportedVariation { .. }));
    assert!(met.variations().is_empty());
}

#[test]
fn variation_union_keeps_first_registration_order() {
    let mut p = Pipeline::new("union");
    let mut a = ConstantWeight::with_weight("a", 2.0);
    a.register_variation("zUp", VariationSource::Factor(2.2)).unwrap();
    a.register_variation("aUp", VariationSource::Factor(2.4)).unwrap();
    let mut b = ConstantWeight::with_weight("b", 0.5);
    b.register_variation("aUp", VariationSource::Factor(0.6)).unwrap();
    p.push_operator(Box::new(a)).unwrap();
    p.push_operator(Box::new(b)).unwrap();

    let r = p.evaluate(&Event::default()).unwrap();
    assert_eq!(p.variation_names(), ["zUp".to_string(), "aUp".to_string()]);
    assert_eq!(r.variation("zUp"), Some(2.2 * 0.5));
    assert_eq!(r.variation("aUp"), Some(2.4 * 0.6));
}
