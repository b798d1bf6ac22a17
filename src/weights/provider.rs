use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{Result, SelectError};
use crate::logging::log_weight_load;
use crate::weights::table::WeightTable;

/// Source of weight tables, addressed by (path, object name).
pub trait TableProvider {
    fn load(&self, path: &str, name: &str) -> Result<WeightTable>;

    /// Names of all objects stored at `path`.
    fn names(&self, path: &str) -> Result<Vec<String>>;
}

/// Reads tables from JSON files laid out as `{"<name>": <table>, ...}`.
///
/// Relative paths resolve against `root` when one is set.
#[derive(Debug, Clone, Default)]
pub struct JsonTableProvider {
    root: Option<PathBuf>,
}

impl JsonTableProvider {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var("DATA_DIR").ok().map(PathBuf::from))
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        match &self.root {
            Some(root) if p.is_relative() => root.join(p),
            _ => p.to_path_buf(),
        }
    }

    fn read_objects(&self, path: &str, name: &str) -> Result<(Map<String, Value>, String)> {
        let full = self.resolve(path);
        let bytes = std::fs::read(&full)
            .map_err(|e| SelectError::weight_source(path, name, format!("cannot read {}: {}", full.display(), e)))?;
        let sha = hex::encode(Sha256::digest(&bytes));
        let value: Value = serde_json::from_slice(&bytes)
            .map_err(|e| SelectError::weight_source(path, name, format!("not valid JSON: {}", e)))?;
        match value {
            Value::Object(map) => Ok((map, sha)),
            _ => Err(SelectError::weight_source(path, name, "top level must be an object")),
        }
    }
}

impl TableProvider for JsonTableProvider {
    fn load(&self, path: &str, name: &str) -> Result<WeightTable> {
        let (mut objects, sha) = self.read_objects(path, name)?;
        let raw = objects
            .remove(name)
            .ok_or_else(|| SelectError::weight_source(path, name, "object not found"))?;
        let table: WeightTable = serde_json::from_value(raw)
            .map_err(|e| SelectError::weight_source(path, name, format!("malformed table: {}", e)))?;
        table
            .validate()
            .map_err(|reason| SelectError::weight_source(path, name, reason))?;
        log_weight_load(path, name, &sha);
        Ok(table)
    }

    fn names(&self, path: &str) -> Result<Vec<String>> {
        let (objects, _) = self.read_objects(path, "*")?;
        Ok(objects.keys().cloned().collect())
    }
}
