//! Weight tables: binned histograms and parametric functions.
//!
//! Out-of-range coordinates clamp to the first/last bin (or to the function's
//! validity range). Non-finite coordinates produce a non-finite value, which
//! the calling operator reports as an error.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableValue {
    pub value: f64,
    /// Per-bin uncertainty; 0 when the table stores none.
    pub error: f64,
}

impl TableValue {
    fn nan() -> Self {
        Self { value: f64::NAN, error: 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hist1D {
    pub edges: Vec<f64>,
    pub values: Vec<f64>,
    #[serde(default)]
    pub errors: Option<Vec<f64>>,
}

/// `values[ix][iy]`, x bins outermost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hist2D {
    pub x_edges: Vec<f64>,
    pub y_edges: Vec<f64>,
    pub values: Vec<Vec<f64>>,
    #[serde(default)]
    pub errors: Option<Vec<Vec<f64>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParametricForm {
    /// p0 + p1 x + p2 x² + ...
    Polynomial,
    /// p0 + p1 / (x - p2)
    InverseOffset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Function {
    pub form: ParametricForm,
    pub params: Vec<f64>,
    pub range: [f64; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WeightTable {
    Hist1d(Hist1D),
    Hist2d(Hist2D),
    Function(Function),
}

fn check_edges(edges: &[f64], what: &str) -> Result<(), String> {
    if edges.len() < 2 {
        return Err(format!("{} needs at least two edges", what));
    }
    if edges.windows(2).any(|w| !(w[0] < w[1])) {
        return Err(format!("{} must be strictly increasing", what));
    }
    Ok(())
}

/// Index of the bin containing `x`, clamped to the valid bins.
fn find_bin(edges: &[f64], x: f64) -> usize {
    let n = edges.len() - 1;
    // number of edges <= x, minus one
    let idx = edges.partition_point(|e| *e <= x);
    idx.saturating_sub(1).min(n - 1)
}

impl WeightTable {
    /// Structural checks run once at load time.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            WeightTable::Hist1d(h) => {
                check_edges(&h.edges, "edges")?;
                let n = h.edges.len() - 1;
                if h.values.len() != n {
                    return Err(format!("expected {} values, got {}", n, h.values.len()));
                }
                if let Some(errors) = &h.errors {
                    if errors.len() != n {
                        return Err(format!("expected {} errors, got {}", n, errors.len()));
                    }
                }
            }
            WeightTable::Hist2d(h) => {
                check_edges(&h.x_edges, "x_edges")?;
                check_edges(&h.y_edges, "y_edges")?;
                let (nx, ny) = (h.x_edges.len() - 1, h.y_edges.len() - 1);
                let shape_ok = |rows: &Vec<Vec<f64>>| rows.len() == nx && rows.iter().all(|r| r.len() == ny);
                if !shape_ok(&h.values) {
                    return Err(format!("values must be {}x{}", nx, ny));
                }
                if let Some(errors) = &h.errors {
                    if !shape_ok(errors) {
                        return Err(format!("errors must be {}x{}", nx, ny));
                    }
                }
            }
            WeightTable::Function(f) => {
                if !(f.range[0] < f.range[1]) {
                    return Err("range must be increasing".to_string());
                }
                let needed = match f.form {
                    ParametricForm::Polynomial => 1,
                    ParametricForm::InverseOffset => 3,
                };
                if f.params.len() < needed {
                    return Err(format!("{:?} needs {} parameters", f.form, needed));
                }
            }
        }
        Ok(())
    }

    pub fn dimension(&self) -> usize {
        match self {
            WeightTable::Hist2d(_) => 2,
            _ => 1,
        }
    }

    pub fn has_errors(&self) -> bool {
        match self {
            WeightTable::Hist1d(h) => h.errors.is_some(),
            WeightTable::Hist2d(h) => h.errors.is_some(),
            WeightTable::Function(_) => false,
        }
    }

    /// Evaluate at (x, y). `y` is ignored by one-dimensional tables.
    pub fn lookup(&self, x: f64, y: f64) -> TableValue {
        if x.is_nan() || (self.dimension() == 2 && y.is_nan()) {
            return TableValue::nan();
        }
        match self {
            WeightTable::Hist1d(h) => {
                let i = find_bin(&h.edges, x);
                TableValue {
                    value: h.values[i],
                    error: h.errors.as_ref().map(|e| e[i]).unwrap_or(0.0),
                }
            }
            WeightTable::Hist2d(h) => {
                let ix = find_bin(&h.x_edges, x);
                let iy = find_bin(&h.y_edges, y);
                TableValue {
                    value: h.values[ix][iy],
                    error: h.errors.as_ref().map(|e| e[ix][iy]).unwrap_or(0.0),
                }
            }
            WeightTable::Function(f) => {
                let x = x.clamp(f.range[0], f.range[1]);
                let value = match f.form {
                    ParametricForm::Polynomial => f.params.iter().rev().fold(0.0, |acc, c| acc * x + c),
                    ParametricForm::InverseOffset => f.params[0] + f.params[1] / (x - f.params[2]),
                };
                TableValue { value, error: 0.0 }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hist() -> WeightTable {
        WeightTable::Hist1d(Hist1D {
            edges: vec![0.0, 10.0, 20.0, 40.0],
            values: vec![0.5, 1.0, 2.0],
            errors: Some(vec![0.05, 0.1, 0.2]),
        })
    }

    #[test]
    fn test_hist1d_lookup_and_clamp() {
        let h = hist();
        assert!(h.validate().is_ok());
        assert_eq!(h.lookup(5.0, 0.0).value, 0.5);
        assert_eq!(h.lookup(10.0, 0.0).value, 1.0);
        assert_eq!(h.lookup(39.9, 0.0).error, 0.2);
        // out of range clamps to edge bins
        assert_eq!(h.lookup(-3.0, 0.0).value, 0.5);
        assert_eq!(h.lookup(1000.0, 0.0).value, 2.0);
        assert!(h.lookup(f64::NAN, 0.0).value.is_nan());
    }

    #[test]
    fn test_hist2d_lookup() {
        let h = WeightTable::Hist2d(Hist2D {
            x_edges: vec![-2.5, 0.0, 2.5],
            y_edges: vec![0.0, 50.0, 500.0],
            values: vec![vec![0.9, 0.95], vec![0.97, 0.99]],
            errors: None,
        });
        assert!(h.validate().is_ok());
        assert_eq!(h.lookup(-1.0, 100.0).value, 0.95);
        assert_eq!(h.lookup(1.0, 10.0).value, 0.97);
        assert_eq!(h.lookup(1.0, 10.0).error, 0.0);
    }

    #[test]
    fn test_function_forms() {
        let f = WeightTable::Function(Function {
            form: ParametricForm::InverseOffset,
            params: vec![0.0292, 0.131, 12.8],
            range: [0.0, 6500.0],
        });
        let v = f.lookup(112.8, 0.0).value;
        assert!((v - (0.0292 + 0.131 / 100.0)).abs() < 1e-12);

        let p = WeightTable::Function(Function {
            form: ParametricForm::Polynomial,
            params: vec![1.0, 0.5, 0.25],
            range: [0.0, 10.0],
        });
        assert!((p.lookup(2.0, 0.0).value - 3.0).abs() < 1e-12);
        // clamped to range
        assert!((p.lookup(20.0, 0.0).value - 31.0).abs() < 1e-12);
    }

    #[test]
    fn test_validate_rejects_malformed() {
        let bad = WeightTable::Hist1d(Hist1D { edges: vec![0.0, 1.0], values: vec![1.0, 2.0], errors: None });
        assert!(bad.validate().is_err());
        let unordered = WeightTable::Hist1d(Hist1D { edges: vec![1.0, 0.0], values: vec![1.0], errors: None });
        assert!(unordered.validate().is_err());
    }

    #[test]
    fn test_parses_tagged_json() {
        let t: WeightTable = serde_json::from_str(
            r#"{"type": "hist1d", "edges": [0, 1, 2], "values": [1.0, 1.1]}"#,
        )
        .unwrap();
        assert_eq!(t.dimension(), 1);
        assert!(!t.has_errors());
    }
}
