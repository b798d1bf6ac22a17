//! Operator contract shared by every pipeline element.
//!
//! An operator is evaluated once per event, in pipeline order. It may filter or
//! modify the working collections of the [`EventContext`]; operators placed
//! later in the chain see those modifications. Each operator reports a
//! decision and a multiplicative weight factor for the current event.

use std::any::Any;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Result, SelectError};
use crate::event::EventContext;
use crate::registry::OperatorKind;
use crate::variation::{VariationRegistry, VariationSource};
use crate::weights::WeightSourceCache;

/// State common to all operators: identity, the ignore flag and variations.
#[derive(Debug, Clone)]
pub struct OperatorBase {
    name: String,
    ignore_decision: bool,
    variations: VariationRegistry,
}

impl OperatorBase {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ignore_decision: false,
            variations: VariationRegistry::new(),
        }
    }

    /// Drop the variations read from per-bin errors of a replaced table.
    pub fn clear_bin_error_variations(&mut self) {
        self.variations
            .retain(|_, source| !matches!(source, VariationSource::BinError { .. }));
    }
}

pub trait Operator: Any {
    fn base(&self) -> &OperatorBase;
    fn base_mut(&mut self) -> &mut OperatorBase;
    fn kind(&self) -> OperatorKind;

    /// Replace the whole configuration from a JSON object. Tables referenced
    /// by the configuration are resolved through `tables`.
    fn configure(&mut self, params: &Value, tables: &WeightSourceCache) -> Result<()>;

    /// Current configuration, used for fingerprints and diagnostics.
    fn config_json(&self) -> Value;

    /// Completeness check run before the first event.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn evaluate(&mut self, ctx: &mut EventContext<'_>) -> Result<bool>;

    /// Factor for the event last passed to `evaluate`.
    fn nominal_weight(&self) -> f64 {
        1.0
    }

    fn accepts_variation(&self, source: &VariationSource) -> bool {
        matches!(source, VariationSource::Factor(_))
    }

    /// Factor under the named variation for the event last passed to
    /// `evaluate`. Unknown names fall back to the nominal factor.
    fn variation_weight(&self, name: &str, _ctx: &EventContext<'_>) -> Result<f64> {
        match self.base().variations.get(name) {
            None => Ok(self.nominal_weight()),
            Some(VariationSource::Factor(f)) => Ok(*f),
            Some(_) => Err(SelectError::UnsupportedVariation {
                operator: self.name().to_string(),
                variation: name.to_string(),
            }),
        }
    }

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn name(&self) -> &str {
        &self.base().name
    }

    fn ignore_decision(&self) -> bool {
        self.base().ignore_decision
    }

    fn set_ignore_decision(&mut self, ignore: bool) {
        self.base_mut().ignore_decision = ignore;
    }

    fn variations(&self) -> &VariationRegistry {
        &self.base().variations
    }

    fn register_variation(&mut self, name: &str, source: VariationSource) -> Result<()> {
        if !self.accepts_variation(&source) {
            return Err(SelectError::UnsupportedVariation {
                operator: self.name().to_string(),
                variation: name.to_string(),
            });
        }
        let operator = self.name().to_string();
        self.base_mut().variations.add(&operator, name, source)
    }
}

/// Accessors every concrete operator implements identically.
#[macro_export]
macro_rules! operator_common {
    ($kind:expr) => {
        fn base(&self) -> &$crate::operator::OperatorBase {
            &self.base
        }
        fn base_mut(&mut self) -> &mut $crate::operator::OperatorBase {
            &mut self.base
        }
        fn kind(&self) -> $crate::registry::OperatorKind {
            $kind
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    };
}

/// Deserialize an operator configuration, mapping serde failures onto the
/// setup error variants.
pub fn parse_config<C: DeserializeOwned>(operator: &str, params: &Value) -> Result<C> {
    serde_json::from_value(params.clone()).map_err(|e| {
        let msg = e.to_string();
        match msg.strip_prefix("missing field `").and_then(|rest| rest.split('`').next()) {
            Some(field) => SelectError::MissingParameter {
                operator: operator.to_string(),
                param: field.to_string(),
            },
            None => SelectError::invalid(operator, "params", msg),
        }
    })
}

pub fn to_json<C: serde::Serialize>(config: &C) -> Value {
    serde_json::to_value(config).unwrap_or(Value::Null)
}

/// Reject non-finite factors.
pub fn check_finite(operator: &str, value: f64, context: impl FnOnce() -> String) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SelectError::NonFiniteWeight {
            operator: operator.to_string(),
            value,
            context: context(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Window {
        min: f64,
        #[serde(default)]
        max: Option<f64>,
    }

    #[test]
    fn test_parse_config_missing_field() {
        let err = parse_config::<Window>("Mass", &json!({"max": 120.0})).unwrap_err();
        match err {
            SelectError::MissingParameter { operator, param } => {
                assert_eq!(operator, "Mass");
                assert_eq!(param, "min");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_parse_config_unknown_field() {
        let err = parse_config::<Window>("Mass", &json!({"min": 60.0, "mx": 1.0})).unwrap_err();
        assert!(matches!(err, SelectError::InvalidParameter { .. }));
    }

    #[test]
    fn test_check_finite() {
        assert_eq!(check_finite("w", 1.5, || String::new()).unwrap(), 1.5);
        assert!(check_finite("w", f64::INFINITY, || "pt=10".into()).is_err());
    }
}
