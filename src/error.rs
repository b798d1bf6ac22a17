//! Error types for pipeline setup and evaluation.
//!
//! Every variant is fatal for the run: the engine never degrades to a partial
//! result, because a silently wrong weight corrupts everything downstream.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SelectError {
    #[error("operator {name} already exists in pipeline {pipeline}")]
    DuplicateOperator { pipeline: String, name: String },

    #[error("operator {name} not found in pipeline {pipeline}")]
    OperatorNotFound { pipeline: String, name: String },

    #[error("operator {name} is a {actual}, not the requested kind")]
    OperatorKindMismatch { name: String, actual: String },

    #[error("unknown operator kind: {0}")]
    UnknownOperatorKind(String),

    #[error("operator {operator}: missing required parameter {param}")]
    MissingParameter { operator: String, param: String },

    #[error("operator {operator}: invalid parameter {param}: {reason}")]
    InvalidParameter {
        operator: String,
        param: String,
        reason: String,
    },

    #[error("operator {operator}: variation {variation} already registered")]
    DuplicateVariation { operator: String, variation: String },

    #[error("operator {operator}: variation {variation} uses a source this operator cannot evaluate")]
    UnsupportedVariation { operator: String, variation: String },

    #[error("pipeline {0} is running; its operator chain can no longer change")]
    PipelineRunning(String),

    #[error("operator {operator}: non-finite weight {value} ({context})")]
    NonFiniteWeight {
        operator: String,
        value: f64,
        context: String,
    },

    #[error("weight source {path}:{name}: {reason}")]
    WeightSource {
        path: String,
        name: String,
        reason: String,
    },

    #[error("unknown region: {0}")]
    UnknownRegion(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, SelectError>;

impl SelectError {
    pub fn invalid(operator: &str, param: &str, reason: impl Into<String>) -> Self {
        SelectError::InvalidParameter {
            operator: operator.to_string(),
            param: param.to_string(),
            reason: reason.into(),
        }
    }

    pub fn weight_source(path: &str, name: &str, reason: impl Into<String>) -> Self {
        SelectError::WeightSource {
            path: path.to_string(),
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// True for lookups of a name that is not in the pipeline.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SelectError::OperatorNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_carries_key() {
        let err = SelectError::weight_source("data/pileup.json", "puweight_2016", "object missing");
        let msg = err.to_string();
        assert!(msg.contains("data/pileup.json"));
        assert!(msg.contains("puweight_2016"));
    }

    #[test]
    fn test_not_found_predicate() {
        let err = SelectError::OperatorNotFound {
            pipeline: "monoph".into(),
            name: "Met".into(),
        };
        assert!(err.is_not_found());
        assert!(!SelectError::UnknownRegion("x".into()).is_not_found());
    }
}
