//! evskim: operator-chain event selection and weighting for skims.
//!
//! Events flow through named [`pipeline::Pipeline`]s of [`operator::Operator`]s.
//! Each pipeline yields a decision, a skim decision, a nominal weight and one
//! weight per registered variation.

pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod logging;
pub mod operator;
pub mod operators;
pub mod output;
pub mod pipeline;
pub mod registry;
pub mod selectors;
pub mod variation;
pub mod weights;

pub use error::{Result, SelectError};
pub use operator::Operator;
pub use pipeline::{EventResult, Pipeline};
