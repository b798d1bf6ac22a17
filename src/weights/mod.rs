//! External weight tables and their process-wide cache.

pub mod cache;
pub mod provider;
pub mod table;

pub use cache::{SourceKey, WeightSourceCache};
pub use provider::{JsonTableProvider, TableProvider};
pub use table::{Function, Hist1D, Hist2D, ParametricForm, TableValue, WeightTable};
