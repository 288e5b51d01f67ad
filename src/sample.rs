// src/sample.rs
//
// Monte-Carlo sampling rules for model parameters.
//
// A Sample is one parameter's sampling rule: a literal setting plus minimum
// and maximum bounds that are literals, "NA" (unconstrained), or references
// to other parameters' samples. Samples live in a SampleSet, a flat
// collection keyed by parameter name; bound references resolve against
// sibling samples through the set, with an in-resolution flag guarding
// against reference cycles.
//
// Draws are cached on the sample for the remainder of the current pass so
// that dependent samples see one consistent value; new_sample() starts the
// next pass.
//
// The module also reads and writes the editable parameter table
// (parameter,type,setting,minimum,maximum), the usual way sampling rules
// reach this tool.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::Path;

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::model::{Constraint, Parameter};
use crate::value::{Datatype, Value};

/// Errors from sample construction and resolution.
#[derive(Debug)]
pub enum SampleError {
    Io {
        path: String,
        source: std::io::Error,
    },
    Parse {
        file: String,
        line: usize,
        message: String,
    },
    /// A bound references a parameter with no sample.
    UnknownParameter { parameter: String, referent: String },
    /// Bound references form a cycle.
    CircularReference { parameter: String, referent: String },
}

impl fmt::Display for SampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleError::Io { path, source } => {
                write!(f, "error opening file {}: {}", path, source)
            }
            SampleError::Parse {
                file,
                line,
                message,
            } => write!(f, "{}:{}: {}", file, line, message),
            SampleError::UnknownParameter {
                parameter,
                referent,
            } => write!(
                f,
                "bound of '{}' references '{}', which has no sample",
                parameter, referent
            ),
            SampleError::CircularReference {
                parameter,
                referent,
            } => write!(
                f,
                "circular bound reference between '{}' and '{}'",
                parameter, referent
            ),
        }
    }
}

impl std::error::Error for SampleError {}

/// One bound of a sample's range.
#[derive(Debug, Clone, PartialEq)]
pub enum Bound {
    /// "NA": no constraint; the literal setting is used instead of a draw.
    Unconstrained,
    Literal(Value),
    /// The bound is another parameter's sampled value.
    Ref(String),
}

impl Bound {
    fn parse(cell: &str) -> Bound {
        let cell = cell.trim();
        if cell == "NA" {
            return Bound::Unconstrained;
        }
        match Value::parse_literal(cell) {
            Value::Str(_) => Bound::Ref(cell.to_string()),
            v => Bound::Literal(v),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum BoundKind {
    Min,
    Max,
}

/// Outcome of resolving one bound.
#[derive(Debug, Clone, PartialEq)]
enum Resolved {
    Unconstrained,
    Value(Value),
}

/// One parameter's sampling rule.
#[derive(Debug, Clone)]
pub struct Sample {
    pub parameter: String,
    pub datatype: Datatype,
    pub setting: Value,
    pub min_bound: Bound,
    pub max_bound: Bound,
    /// Explicit `one-of` option list from the table, if any. Takes priority
    /// over the bounds, including the min == max fixed-value shortcut.
    pub options: Option<Vec<String>>,
    /// Categorical mapping table carried over from the model's choices.
    choices: Vec<String>,
    sampled: Option<Value>,
    in_resolution: bool,
}

impl Sample {
    pub fn new(
        parameter: &str,
        datatype: Datatype,
        setting: Value,
        min_bound: Bound,
        max_bound: Bound,
    ) -> Self {
        Self {
            parameter: parameter.to_string(),
            datatype,
            setting,
            min_bound,
            max_bound,
            options: None,
            choices: Vec::new(),
            sampled: None,
            in_resolution: false,
        }
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.min_bound = Bound::Literal(Value::Int(0));
        self.max_bound = Bound::Literal(Value::Int(options.len() as i64 - 1));
        self.options = Some(options);
        self
    }

    pub fn with_choices(mut self, choices: Vec<String>) -> Self {
        self.choices = choices;
        self
    }

    /// The value most recently drawn in the current pass, if any.
    pub fn sampled(&self) -> Option<&Value> {
        self.sampled.as_ref()
    }

    /// Map an index through the categorical table; out-of-range indices
    /// fall back to the literal setting.
    fn choice_value(&self, i: i64) -> Value {
        let table = self.options.as_deref().unwrap_or(&self.choices);
        if i >= 0 && (i as usize) < table.len() {
            Value::parse_literal(&table[i as usize])
        } else {
            self.setting.clone()
        }
    }

    /// The literal setting, mapped through the categorical table when the
    /// datatype calls for it.
    fn setting_value(&self) -> Value {
        match self.datatype {
            Datatype::Categorical => match self.setting.as_int() {
                Some(i) => self.choice_value(i),
                None => self.setting.clone(),
            },
            _ => self.setting.clone(),
        }
    }
}

/// A flat, name-keyed collection of samples. Bound references resolve
/// against siblings in the same set.
#[derive(Debug, Clone, Default)]
pub struct SampleSet {
    samples: Vec<Sample>,
    index: BTreeMap<String, usize>,
}

impl SampleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: Sample) {
        self.index.insert(sample.parameter.clone(), self.samples.len());
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, parameter: &str) -> Option<&Sample> {
        self.index.get(parameter).map(|&i| &self.samples[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    /// Check every bound reference points at a sample in the set.
    pub fn validate(&self) -> Result<(), SampleError> {
        for s in &self.samples {
            for bound in [&s.min_bound, &s.max_bound] {
                if let Bound::Ref(name) = bound {
                    if !self.index.contains_key(name) {
                        return Err(SampleError::UnknownParameter {
                            parameter: s.parameter.clone(),
                            referent: name.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Start the next sampling pass: every cached draw is invalidated so
    /// cross-references re-resolve against fresh values.
    pub fn new_sample(&mut self) {
        for s in &mut self.samples {
            s.sampled = None;
            s.in_resolution = false;
        }
    }

    /// Resolve one bound of the sample at `idx`. References use the
    /// referenced sample's cached draw when it has one, otherwise its own
    /// matching bound; cycles fail rather than recurse.
    fn resolve(&mut self, idx: usize, which: BoundKind) -> Result<Resolved, SampleError> {
        let bound = match which {
            BoundKind::Min => self.samples[idx].min_bound.clone(),
            BoundKind::Max => self.samples[idx].max_bound.clone(),
        };
        match bound {
            Bound::Unconstrained => Ok(Resolved::Unconstrained),
            Bound::Literal(v) => Ok(Resolved::Value(v)),
            Bound::Ref(name) => {
                let j = match self.index.get(&name) {
                    Some(&j) => j,
                    None => {
                        return Err(SampleError::UnknownParameter {
                            parameter: self.samples[idx].parameter.clone(),
                            referent: name,
                        })
                    }
                };
                self.samples[idx].in_resolution = true;
                if self.samples[j].in_resolution {
                    self.samples[idx].in_resolution = false;
                    return Err(SampleError::CircularReference {
                        parameter: self.samples[idx].parameter.clone(),
                        referent: name,
                    });
                }
                let result = match self.samples[j].sampled.clone() {
                    Some(v) => Ok(Resolved::Value(v)),
                    None => self.resolve(j, which),
                };
                self.samples[idx].in_resolution = false;
                result
            }
        }
    }

    /// Draw a value for `parameter` in the current pass. Repeated calls
    /// within one pass return the cached draw.
    pub fn sample(
        &mut self,
        parameter: &str,
        rng: &mut ChaCha8Rng,
    ) -> Result<Value, SampleError> {
        let idx = *self.index.get(parameter).ok_or_else(|| {
            SampleError::UnknownParameter {
                parameter: parameter.to_string(),
                referent: parameter.to_string(),
            }
        })?;
        self.sample_at(idx, rng)
    }

    fn sample_at(&mut self, idx: usize, rng: &mut ChaCha8Rng) -> Result<Value, SampleError> {
        if let Some(v) = self.samples[idx].sampled.clone() {
            return Ok(v);
        }

        let min = self.resolve(idx, BoundKind::Min)?;
        let max = self.resolve(idx, BoundKind::Max)?;
        let s = &self.samples[idx];

        let value = if min == Resolved::Unconstrained || max == Resolved::Unconstrained {
            s.setting_value()
        } else if let Some(options) = &s.options {
            let i = rng.gen_range(0..options.len());
            Value::parse_literal(&options[i])
        } else {
            let (min, max) = match (min, max) {
                (Resolved::Value(a), Resolved::Value(b)) => (a, b),
                _ => unreachable!(),
            };
            if min == max {
                match s.datatype {
                    Datatype::Categorical => match min.as_int() {
                        Some(i) => s.choice_value(i),
                        None => s.setting_value(),
                    },
                    _ => min,
                }
            } else {
                draw(s, &min, &max, rng)
            }
        };

        self.samples[idx].sampled = Some(value.clone());
        Ok(value)
    }

    /// Deterministic positional value for systematic sweeps: the value at
    /// `step_index` steps of `step_size` above the resolved minimum,
    /// clamped to the resolved maximum.
    pub fn regular_sample(
        &mut self,
        parameter: &str,
        step_index: usize,
        step_size: f64,
    ) -> Result<Value, SampleError> {
        let idx = *self.index.get(parameter).ok_or_else(|| {
            SampleError::UnknownParameter {
                parameter: parameter.to_string(),
                referent: parameter.to_string(),
            }
        })?;

        let min = self.resolve(idx, BoundKind::Min)?;
        let max = self.resolve(idx, BoundKind::Max)?;
        let s = &self.samples[idx];

        let value = match (&min, &max) {
            (Resolved::Unconstrained, _) | (_, Resolved::Unconstrained) => s.setting_value(),
            (Resolved::Value(lo), Resolved::Value(hi)) => {
                if let Some(options) = &s.options {
                    Value::parse_literal(&options[step_index % options.len()])
                } else {
                    match s.datatype {
                        Datatype::Boolean => Value::Bool(step_index % 2 == 1),
                        Datatype::Categorical => {
                            let top = hi.as_int().unwrap_or(0);
                            let i = (lo.as_int().unwrap_or(0) + step_index as i64).min(top);
                            s.choice_value(i)
                        }
                        Datatype::Integer => {
                            let lo = lo.as_number().unwrap_or(0.0);
                            let hi = hi.as_number().unwrap_or(lo);
                            let v = (lo + step_index as f64 * step_size).min(hi);
                            Value::Int(v.round() as i64)
                        }
                        Datatype::Numeric => {
                            let lo = lo.as_number().unwrap_or(0.0);
                            let hi = hi.as_number().unwrap_or(lo);
                            Value::Number((lo + step_index as f64 * step_size).min(hi))
                        }
                        Datatype::String => s.setting_value(),
                    }
                }
            }
        };

        self.samples[idx].sampled = Some(value.clone());
        Ok(value)
    }

    /// Draw every sample once, in table order, returning (parameter, value)
    /// pairs for the current pass.
    pub fn draw_all(
        &mut self,
        rng: &mut ChaCha8Rng,
    ) -> Result<Vec<(String, Value)>, SampleError> {
        let mut out = Vec::with_capacity(self.samples.len());
        for idx in 0..self.samples.len() {
            let value = self.sample_at(idx, rng)?;
            out.push((self.samples[idx].parameter.clone(), value));
        }
        Ok(out)
    }

    /// Read samples from a parameter table file. Rows naming parameters the
    /// model does not declare are reported and skipped.
    pub fn read_table<P: AsRef<Path>>(
        path: P,
        params: &BTreeMap<String, Parameter>,
    ) -> Result<Self, SampleError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| SampleError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse_table(&text, &path.display().to_string(), params)
    }

    /// Parse parameter-table text. `file_name` is used in reports only.
    pub fn parse_table(
        text: &str,
        file_name: &str,
        params: &BTreeMap<String, Parameter>,
    ) -> Result<Self, SampleError> {
        let mut set = SampleSet::new();
        for (lineno, line) in text.lines().enumerate() {
            if lineno == 0 || line.trim().is_empty() {
                continue;
            }
            let cells: Vec<&str> = line.split(',').collect();
            if cells.len() < 5 {
                return Err(SampleError::Parse {
                    file: file_name.to_string(),
                    line: lineno + 1,
                    message: format!("expected 5 columns, found {}", cells.len()),
                });
            }
            let name = cells[0].trim();
            let param = match params.get(name) {
                Some(p) => p,
                None => {
                    eprintln!("Warning: parameter {} ignored", name);
                    continue;
                }
            };
            let datatype: Datatype =
                cells[1].trim().parse().map_err(|e| SampleError::Parse {
                    file: file_name.to_string(),
                    line: lineno + 1,
                    message: e,
                })?;
            let setting = Value::parse_literal(cells[2]);

            let mut sample = Sample::new(
                name,
                datatype,
                setting,
                Bound::parse(cells[3]),
                Bound::parse(cells[4]),
            );
            if let Constraint::FiniteSet(choices) = &param.constraint {
                sample = sample.with_choices(choices.clone());
            }
            if cells[3].trim() == "one-of" {
                let options: Vec<String> = cells[4]
                    .trim()
                    .split('|')
                    .map(|c| c.trim().to_string())
                    .filter(|c| !c.is_empty())
                    .collect();
                if options.is_empty() {
                    return Err(SampleError::Parse {
                        file: file_name.to_string(),
                        line: lineno + 1,
                        message: format!("empty one-of option list for '{}'", name),
                    });
                }
                sample = sample.with_options(options);
            }
            set.push(sample);
        }
        set.validate()?;
        Ok(set)
    }
}

fn draw(s: &Sample, min: &Value, max: &Value, rng: &mut ChaCha8Rng) -> Value {
    match s.datatype {
        Datatype::Integer => match (int_floor(min, true), int_floor(max, false)) {
            (Some(lo), Some(hi)) if lo < hi => Value::Int(rng.gen_range(lo..=hi)),
            (Some(lo), _) => Value::Int(lo),
            _ => s.setting_value(),
        },
        Datatype::Numeric => match (min.as_number(), max.as_number()) {
            (Some(lo), Some(hi)) if lo < hi => Value::Number(rng.gen_range(lo..=hi)),
            (Some(lo), _) => Value::Number(lo),
            _ => s.setting_value(),
        },
        Datatype::Boolean => Value::Bool(rng.gen::<f64>() < 0.5),
        Datatype::Categorical => match (min.as_int(), max.as_int()) {
            (Some(lo), Some(hi)) if lo < hi => s.choice_value(rng.gen_range(lo..=hi)),
            (Some(lo), _) => s.choice_value(lo),
            _ => s.setting_value(),
        },
        Datatype::String => s.setting_value(),
    }
}

fn int_floor(v: &Value, round_up: bool) -> Option<i64> {
    v.as_number()
        .map(|x| if round_up { x.ceil() } else { x.floor() } as i64)
}

/// Render the editable parameter table for a model's parameters: one row
/// per parameter, sorted by name.
pub fn render_parameter_table(params: &BTreeMap<String, Parameter>) -> String {
    let mut out = String::from("parameter,type,setting,minimum,maximum\n");
    for (name, p) in params {
        out.push_str(name);
        out.push(',');
        out.push_str(p.datatype.as_str());
        out.push(',');
        out.push_str(&p.setting.to_string());
        match (&p.datatype, &p.constraint) {
            (Datatype::Categorical, Constraint::FiniteSet(choices)) => {
                out.push_str(",one-of,");
                out.push_str(&choices.join("|"));
            }
            (Datatype::Boolean, _) => out.push_str(",true,false"),
            (Datatype::Numeric | Datatype::Integer, Constraint::Range(min, max)) => {
                out.push(',');
                out.push_str(&min.cell());
                out.push(',');
                out.push_str(&max.cell());
            }
            (Datatype::Numeric | Datatype::Integer, _) => {
                let cell = p.setting.to_string();
                out.push(',');
                out.push_str(&cell);
                out.push(',');
                out.push_str(&cell);
            }
            _ => out.push_str(",NA,NA"),
        }
        out.push('\n');
    }
    out
}

/// Write the parameter table to a file.
pub fn write_parameter_table<P: AsRef<Path>>(
    params: &BTreeMap<String, Parameter>,
    path: P,
) -> Result<(), SampleError> {
    let path = path.as_ref();
    let mut file = fs::File::create(path).map_err(|e| SampleError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    file.write_all(render_parameter_table(params).as_bytes())
        .map_err(|e| SampleError::Io {
            path: path.display().to_string(),
            source: e,
        })
}
