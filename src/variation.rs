//! Per-operator systematic alternatives to the nominal weight factor.

use std::sync::Arc;

use crate::error::{Result, SelectError};
use crate::weights::WeightTable;

#[derive(Debug, Clone, PartialEq)]
pub enum VariationSource {
    /// Constant replacement factor.
    Factor(f64),
    /// Same lookup as the nominal factor, in an alternate table.
    Table(Arc<WeightTable>),
    /// Nominal table value shifted by `sigma` times its per-bin error.
    BinError { sigma: f64 },
}

/// Ordered `variation name → source` map. Names are unique per operator.
#[derive(Debug, Clone, Default)]
pub struct VariationRegistry {
    entries: Vec<(String, VariationSource)>,
}

impl VariationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, operator: &str, name: &str, source: VariationSource) -> Result<()> {
        if self.contains(name) {
            return Err(SelectError::DuplicateVariation {
                operator: operator.to_string(),
                variation: name.to_string(),
            });
        }
        self.entries.push((name.to_string(), source));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&VariationSource> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    /// Names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Keep only the entries for which `keep` holds, preserving order.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &VariationSource) -> bool) {
        self.entries.retain(|(n, s)| keep(n, s));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
