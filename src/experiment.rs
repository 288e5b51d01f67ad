// src/experiment.rs
//
// A BehaviorSpace experiment: entry-point code fragments, metrics, value
// axes and a repetition count, describing a set of runs.
//
// Experiments are values: every expansion operation returns new child
// experiments rather than mutating shared state. The only in-place
// operation is the idempotent final-save instrumentation, which is guarded
// by an explicit state flag.

use rand_chacha::ChaCha8Rng;

use crate::axis::{EnumeratedValues, SteppedValues};
use crate::batch::digits;
use crate::model::NetlogoModel;
use crate::sample::{SampleError, SampleSet};
use crate::value::Value;

/// How an experiment ends: after a fixed tick count or when a reporter
/// becomes true.
#[derive(Debug, Clone)]
pub enum StopCondition {
    Ticks(u64),
    Condition(String),
}

/// Whether a code-injection concern has already been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instrumentation {
    NotInstrumented,
    Instrumented,
}

/// One BehaviorSpace experiment.
#[derive(Debug, Clone)]
pub struct Experiment {
    pub name: String,
    pub setup: String,
    pub go: String,
    pub final_code: String,
    pub time_limit: Option<f64>,
    pub exit_condition: Option<String>,
    /// Metric reporters, paired index-for-index with `metric_labels`.
    pub metrics: Vec<String>,
    pub metric_labels: Vec<String>,
    pub stepped: Vec<SteppedValues>,
    pub enumerated: Vec<EnumeratedValues>,
    pub repetitions: u32,
    pub sequential_run_order: bool,
    pub run_metrics_every_step: bool,
    /// Directory the instrumented final-save code writes into.
    pub results_dir: Option<String>,
    final_save: Instrumentation,
}

impl Experiment {
    pub fn new(name: &str, stop: StopCondition) -> Self {
        let mut e = Self::named(name);
        match stop {
            StopCondition::Ticks(t) => e.time_limit = Some(t as f64),
            StopCondition::Condition(c) => e.exit_condition = Some(c),
        }
        e
    }

    /// An empty experiment with neither stop condition set; the
    /// interchange reader fills the fields it finds.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            setup: String::new(),
            go: String::new(),
            final_code: String::new(),
            time_limit: None,
            exit_condition: None,
            metrics: Vec::new(),
            metric_labels: Vec::new(),
            stepped: Vec::new(),
            enumerated: Vec::new(),
            repetitions: 1,
            sequential_run_order: true,
            run_metrics_every_step: true,
            results_dir: None,
            final_save: Instrumentation::NotInstrumented,
        }
    }

    /// Build an experiment from a model's interface: setup/go buttons
    /// provide the entry points, output widgets the metrics, and current
    /// parameter settings become single-valued enumerated axes.
    pub fn from_model(model: &NetlogoModel, name: &str, stop: StopCondition) -> Self {
        let mut expt = Experiment::new(name, stop);
        for widget in &model.widgets {
            if let crate::model::Widget::Button(b) = widget {
                if b.display == "setup" || b.code == "setup" {
                    expt.setup = b.code.clone();
                } else if b.display == "go" || b.code == "go" {
                    expt.go = b.code.clone();
                }
            }
        }
        for (source, label) in model.metrics() {
            expt.add_metric(&source, Some(&label));
        }
        let settings: Vec<(String, Value)> = model
            .parameters()
            .into_iter()
            .map(|(name, p)| (name, p.setting))
            .collect();
        expt.with_parameter_settings(&settings)
    }

    /// Add a metric reporter with an optional label. Without a label, a
    /// CSV-safe form of the reporter is used, keeping the metrics and
    /// labels lists aligned.
    pub fn add_metric(&mut self, source: &str, label: Option<&str>) {
        let label = match label {
            Some(l) => l.replace(',', "."),
            None => source.replace(',', "."),
        };
        self.metrics.push(source.to_string());
        self.metric_labels.push(label);
    }

    pub fn rename(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// Total runs this experiment describes: repetitions times the product
    /// of every axis's cardinality.
    pub fn run_count(&self) -> u64 {
        let axes: u64 = self
            .stepped
            .iter()
            .map(|s| s.cardinality() as u64)
            .chain(self.enumerated.iter().map(|e| e.cardinality() as u64))
            .product();
        self.repetitions as u64 * axes
    }

    /// A copy of this experiment whose axes are replaced by the given
    /// single-valued settings. Stepped axes do not survive: the result
    /// describes exactly one parameterization per repetition.
    pub fn with_parameter_settings(&self, settings: &[(String, Value)]) -> Experiment {
        let mut child = self.clone();
        child.stepped = Vec::new();
        child.enumerated = settings
            .iter()
            .map(|(name, value)| EnumeratedValues::single(name, value.clone()))
            .collect();
        child
    }

    /// One Monte-Carlo child: a fresh draw for every sample in the set,
    /// within the caller's current pass.
    pub fn with_samples(
        &self,
        samples: &mut SampleSet,
        rng: &mut ChaCha8Rng,
    ) -> Result<Experiment, SampleError> {
        let settings = samples.draw_all(rng)?;
        Ok(self.with_parameter_settings(&settings))
    }

    /// N independently sampled children. Each iteration starts a new pass,
    /// so cross-referencing bounds re-resolve against that iteration's
    /// draws. Children are renamed `{name}-{i}` with a zero-padded 1-based
    /// index, and optionally instrumented to save their parameters and
    /// metrics to a per-run results file.
    pub fn with_n_samples(
        &self,
        samples: &mut SampleSet,
        n: usize,
        rng: &mut ChaCha8Rng,
        final_save: bool,
    ) -> Result<Vec<Experiment>, SampleError> {
        let mut children = Vec::with_capacity(n);
        for i in 1..=n {
            samples.new_sample();
            let mut child = self.with_samples(samples, rng)?;
            child.rename(&numbered_name(&self.name, i, n));
            if final_save {
                child.instrument_final_save();
            }
            children.push(child);
        }
        Ok(children)
    }

    /// Expand every combination of axis values into child experiments.
    ///
    /// Axes named in `already_set` are pinned: they are carried into each
    /// child untouched (reserved for caller-injected values) and do not
    /// participate in the enumeration. The remaining axes are enumerated by
    /// mixed-radix counting; a stepped axis's current value becomes a
    /// single-valued enumerated axis in the child, so children carry no
    /// stepped axes. With `split_repetitions`, each combination yields one
    /// child per repetition, each with a repetition count of one.
    pub fn unique_settings(
        &self,
        already_set: &[&str],
        split_repetitions: bool,
    ) -> Vec<Experiment> {
        let mut free: Vec<(String, Vec<Value>)> = Vec::new();
        let mut pinned: Vec<EnumeratedValues> = Vec::new();

        for s in &self.stepped {
            let values: Vec<Value> = s.values().iter().map(|&x| Value::Number(x)).collect();
            if already_set.contains(&s.variable.as_str()) {
                pinned.push(EnumeratedValues::new(&s.variable, values));
            } else {
                free.push((s.variable.clone(), values));
            }
        }
        for e in &self.enumerated {
            if already_set.contains(&e.variable.as_str()) {
                pinned.push(e.clone());
            } else {
                free.push((e.variable.clone(), e.values.clone()));
            }
        }

        let combos: u64 = free.iter().map(|(_, vs)| vs.len() as u64).product();
        let reps_out = if split_repetitions {
            self.repetitions.max(1) as u64
        } else {
            1
        };
        let total = (combos * reps_out) as usize;

        let mut children = Vec::with_capacity(total);
        let mut counters = vec![0usize; free.len()];
        let mut emitted = 0usize;

        loop {
            for _ in 0..reps_out {
                emitted += 1;
                let mut enumerated: Vec<EnumeratedValues> = free
                    .iter()
                    .zip(&counters)
                    .map(|((var, vs), &c)| EnumeratedValues::single(var, vs[c].clone()))
                    .collect();
                enumerated.extend(pinned.iter().cloned());

                let mut child = self.clone();
                child.name = numbered_name(&self.name, emitted, total);
                child.stepped = Vec::new();
                child.enumerated = enumerated;
                if split_repetitions {
                    child.repetitions = 1;
                }
                children.push(child);
            }

            // Odometer increment: carry until a counter sticks; a full
            // rollover means every combination has been emitted.
            let mut i = 0;
            loop {
                if i == counters.len() {
                    return children;
                }
                counters[i] += 1;
                if counters[i] < free[i].1.len() {
                    break;
                }
                counters[i] = 0;
                i += 1;
            }
        }
    }

    pub fn is_instrumented(&self) -> bool {
        self.final_save == Instrumentation::Instrumented
    }

    /// Inject final-save code: at the end of a run, append one CSV row of
    /// parameter settings and metric values to this experiment's results
    /// file (created with a header on first use). Idempotent; a second call
    /// leaves the experiment unchanged.
    pub fn instrument_final_save(&mut self) {
        if self.final_save == Instrumentation::Instrumented {
            return;
        }

        let file = match &self.results_dir {
            Some(dir) => format!("{}/{}.csv", dir.trim_end_matches('/'), self.name),
            None => format!("{}.csv", self.name),
        };

        let mut header: Vec<String> = Vec::new();
        let mut row: Vec<String> = Vec::new();
        for s in &self.stepped {
            header.push(s.variable.clone());
            row.push(s.variable.clone());
        }
        for e in &self.enumerated {
            header.push(e.variable.clone());
            row.push(e.variable.clone());
        }
        for (metric, label) in self.metrics.iter().zip(&self.metric_labels) {
            header.push(label.clone());
            row.push(format!("({})", metric));
        }

        self.final_code = format!(
            "ifelse file-exists? \"{file}\" [\n  file-open \"{file}\"\n] [\n  file-open \"{file}\"\n  file-print \"{header}\"\n]\nfile-print (word {row})\nfile-close",
            file = file,
            header = header.join(","),
            row = row.join(" \",\" ")
        );
        self.final_save = Instrumentation::Instrumented;
    }
}

/// `{base}-{i}` with `i` zero-padded to the digit count of `total`, the
/// naming every expansion shares so batch decomposition can rely on it.
pub fn numbered_name(base: &str, i: usize, total: usize) -> String {
    format!("{}-{:0width$}", base, i, width = digits(total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::axis::SteppedValues;
    use crate::sample::{Bound, Sample};
    use crate::value::Datatype;
    use rand::SeedableRng;

    fn base_experiment() -> Experiment {
        let mut e = Experiment::new("x", StopCondition::Ticks(100));
        e.setup = "setup".to_string();
        e.go = "go".to_string();
        e
    }

    #[test]
    fn test_run_count() {
        let mut e = base_experiment();
        e.repetitions = 2;
        e.stepped
            .push(SteppedValues::new("a", 0.0, 0.5, 1.0).unwrap());
        e.enumerated.push(EnumeratedValues::new(
            "b",
            vec![Value::Bool(true), Value::Bool(false)],
        ));
        assert_eq!(e.run_count(), 2 * 3 * 2);
    }

    #[test]
    fn test_unique_settings_cartesian() {
        let mut e = base_experiment();
        e.stepped
            .push(SteppedValues::new("a", 0.0, 0.5, 1.0).unwrap());
        e.enumerated.push(EnumeratedValues::new(
            "b",
            vec![Value::Bool(true), Value::Bool(false)],
        ));

        let children = e.unique_settings(&[], false);
        assert_eq!(children.len(), 6);

        // Names are sequential, 1-based, padded to the total's digits.
        let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["x-1", "x-2", "x-3", "x-4", "x-5", "x-6"]);

        // Every child is fully enumerated with singleton axes.
        for child in &children {
            assert!(child.stepped.is_empty());
            assert_eq!(child.enumerated.len(), 2);
            assert!(child.enumerated.iter().all(|e| e.cardinality() == 1));
        }

        // All six combinations appear exactly once.
        let mut combos: Vec<(String, String)> = children
            .iter()
            .map(|c| {
                (
                    c.enumerated[0].value_at(0).to_string(),
                    c.enumerated[1].value_at(0).to_string(),
                )
            })
            .collect();
        combos.sort();
        combos.dedup();
        assert_eq!(combos.len(), 6);
    }

    #[test]
    fn test_unique_settings_split_repetitions() {
        let mut e = base_experiment();
        e.repetitions = 3;
        e.enumerated.push(EnumeratedValues::new(
            "b",
            vec![Value::Int(1), Value::Int(2)],
        ));

        let split = e.unique_settings(&[], true);
        assert_eq!(split.len(), 6);
        assert!(split.iter().all(|c| c.repetitions == 1));

        let aggregated = e.unique_settings(&[], false);
        assert_eq!(aggregated.len(), 2);
        assert!(aggregated.iter().all(|c| c.repetitions == 3));
    }

    #[test]
    fn test_unique_settings_pinned_axis() {
        let mut e = base_experiment();
        e.enumerated.push(EnumeratedValues::new(
            "run-id",
            vec![Value::Int(0)],
        ));
        e.enumerated.push(EnumeratedValues::new(
            "b",
            vec![Value::Int(1), Value::Int(2), Value::Int(3)],
        ));

        let children = e.unique_settings(&["run-id"], false);
        assert_eq!(children.len(), 3);
        for child in &children {
            let pinned = child
                .enumerated
                .iter()
                .find(|a| a.variable == "run-id")
                .expect("pinned axis present");
            assert_eq!(pinned.values, vec![Value::Int(0)]);
        }
    }

    #[test]
    fn test_unique_settings_no_axes() {
        let e = base_experiment();
        let children = e.unique_settings(&[], false);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "x-1");
    }

    #[test]
    fn test_with_n_samples_names_and_axes() {
        let mut samples = SampleSet::new();
        samples.push(Sample::new(
            "rate",
            Datatype::Numeric,
            Value::Number(0.5),
            Bound::Literal(Value::Number(0.0)),
            Bound::Literal(Value::Number(1.0)),
        ));

        let e = base_experiment();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let children = e.with_n_samples(&mut samples, 12, &mut rng, false).unwrap();

        assert_eq!(children.len(), 12);
        assert_eq!(children[0].name, "x-01");
        assert_eq!(children[11].name, "x-12");
        for child in &children {
            assert!(child.stepped.is_empty());
            assert_eq!(child.enumerated.len(), 1);
            assert_eq!(child.enumerated[0].variable, "rate");
        }
    }

    #[test]
    fn test_final_save_idempotent() {
        let mut e = base_experiment();
        e.enumerated
            .push(EnumeratedValues::single("rate", Value::Number(0.5)));
        e.add_metric("count turtles", None);

        assert!(!e.is_instrumented());
        e.instrument_final_save();
        assert!(e.is_instrumented());
        let first = e.final_code.clone();
        assert!(first.contains("file-exists? \"x.csv\""));
        assert!(first.contains("rate,count turtles"));
        assert!(first.contains("(word rate \",\" (count turtles))"));

        e.instrument_final_save();
        assert_eq!(e.final_code, first);
    }

    #[test]
    fn test_final_save_results_dir() {
        let mut e = base_experiment();
        e.results_dir = Some("results/".to_string());
        e.instrument_final_save();
        assert!(e.final_code.contains("\"results/x.csv\""));
    }

    #[test]
    fn test_metric_labels_stay_aligned() {
        let mut e = base_experiment();
        e.add_metric("count sheep", Some("sheep"));
        e.add_metric("mean [energy, kJ] of turtles", None);
        assert_eq!(e.metrics.len(), e.metric_labels.len());
        assert_eq!(e.metric_labels[1], "mean [energy. kJ] of turtles");
    }

    #[test]
    fn test_numbered_name_widths() {
        assert_eq!(numbered_name("x", 1, 6), "x-1");
        assert_eq!(numbered_name("x", 3, 12), "x-03");
        assert_eq!(numbered_name("x", 7, 1000), "x-0007");
    }
}
