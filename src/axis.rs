// src/axis.rs
//
// Value axes: the two kinds of single-parameter exploration an experiment
// can declare.
// - SteppedValues: an arithmetic sequence, validated and materialized at
//   construction so callers can index by position.
// - EnumeratedValues: an explicit, ordered value list.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Errors from axis construction.
#[derive(Debug, Clone)]
pub enum AxisError {
    /// step and (last - first) disagree in direction, or step is zero while
    /// first != last.
    BadDirection {
        variable: String,
        first: f64,
        step: f64,
        last: f64,
    },
}

impl std::fmt::Display for AxisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AxisError::BadDirection {
                variable,
                first,
                step,
                last,
            } => write!(
                f,
                "stepped values for '{}' cannot reach {} from {} with step {}",
                variable, last, first, step
            ),
        }
    }
}

impl std::error::Error for AxisError {}

/// A stepped exploration: first, first+step, ... up to (and including) last
/// when the step divides the interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SteppedValues {
    pub variable: String,
    pub first: f64,
    pub step: f64,
    pub last: f64,
    values: Vec<f64>,
}

// Tolerance for deciding whether one more step still lands inside the
// interval; keeps 0..1 by 0.5 at three values despite binary rounding.
const STEP_EPSILON: f64 = 1e-9;

impl SteppedValues {
    pub fn new(variable: &str, first: f64, step: f64, last: f64) -> Result<Self, AxisError> {
        let span = last - first;
        let bad = if step == 0.0 {
            span != 0.0
        } else {
            span != 0.0 && span.signum() != step.signum()
        };
        if bad {
            return Err(AxisError::BadDirection {
                variable: variable.to_string(),
                first,
                step,
                last,
            });
        }

        let count = if step == 0.0 {
            1
        } else {
            (span / step + STEP_EPSILON).floor() as usize + 1
        };
        let values = (0..count).map(|i| first + step * i as f64).collect();

        Ok(Self {
            variable: variable.to_string(),
            first,
            step,
            last,
            values,
        })
    }

    pub fn cardinality(&self) -> usize {
        self.values.len()
    }

    pub fn value_at(&self, i: usize) -> f64 {
        self.values[i]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// An enumerated exploration: the values are used exactly as given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumeratedValues {
    pub variable: String,
    pub values: Vec<Value>,
}

impl EnumeratedValues {
    pub fn new(variable: &str, values: Vec<Value>) -> Self {
        Self {
            variable: variable.to_string(),
            values,
        }
    }

    /// Convenience for the common single-value case produced by expansion.
    pub fn single(variable: &str, value: Value) -> Self {
        Self::new(variable, vec![value])
    }

    pub fn cardinality(&self) -> usize {
        self.values.len()
    }

    pub fn value_at(&self, i: usize) -> &Value {
        &self.values[i]
    }
}
