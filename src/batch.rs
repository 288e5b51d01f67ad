// src/batch.rs
//
// Batch decomposition: given a concrete, sequentially named experiment
// list, work out how the run set splits into size-bounded XML documents
// and a scheduler-legal job array, and the zero-padded digit widths every
// generated name uses so lexicographic order matches run order.
//
// Construction validates the naming invariant the expansion operations
// guarantee: names are `{prefix}{1-based zero-padded index}` with no gaps
// or duplicates. A violation means the expansion step is broken, so it is
// reported as an internal fault rather than a user error.

use std::fmt;
use std::ops::RangeInclusive;
use std::path::Path;

use crate::experiment::Experiment;

/// Number of base-10 digits in `n` (1 for 0).
pub fn digits(n: usize) -> usize {
    let mut d = 1;
    let mut m = n;
    while m >= 10 {
        m /= 10;
        d += 1;
    }
    d
}

/// Errors from batch construction.
#[derive(Debug, Clone)]
pub enum BatchError {
    /// No experiments to decompose.
    Empty,
    /// The experiment list's names are not a gapless, duplicate-free,
    /// zero-padded 1-based sequence over a common prefix.
    NameInvariant { detail: String },
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchError::Empty => write!(f, "internal error: empty experiment list"),
            BatchError::NameInvariant { detail } => {
                write!(
                    f,
                    "internal error: experiment names violate the batch naming invariant: {}",
                    detail
                )
            }
        }
    }
}

impl std::error::Error for BatchError {}

/// The decomposition of a run set into documents and a job array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    total_runs: usize,
    name_prefix: String,
    doc_count: usize,
    doc_size: usize,
    run_digits: usize,
    doc_digits: usize,
}

impl Batch {
    /// Validate the experiment list's names and size its documents: one
    /// document when the run count fits under `max_doc_entries`, otherwise
    /// groups of `doc_group_size`.
    pub fn new(
        experiments: &[Experiment],
        max_doc_entries: usize,
        doc_group_size: usize,
    ) -> Result<Self, BatchError> {
        let total_runs = experiments.len();
        if total_runs == 0 {
            return Err(BatchError::Empty);
        }

        let run_digits = digits(total_runs);
        let first = &experiments[0].name;
        if first.len() < run_digits {
            return Err(BatchError::NameInvariant {
                detail: format!(
                    "name '{}' is too short for a {}-digit run index",
                    first, run_digits
                ),
            });
        }
        let name_prefix = first[..first.len() - run_digits].to_string();

        for (i, e) in experiments.iter().enumerate() {
            let expected = format!(
                "{}{:0width$}",
                name_prefix,
                i + 1,
                width = run_digits
            );
            if e.name != expected {
                return Err(BatchError::NameInvariant {
                    detail: format!(
                        "expected '{}' at position {}, found '{}'",
                        expected,
                        i + 1,
                        e.name
                    ),
                });
            }
        }

        let group = doc_group_size.max(1);
        let (doc_count, doc_size) = if total_runs <= max_doc_entries {
            (1, total_runs)
        } else {
            (total_runs.div_ceil(group), group)
        };

        Ok(Batch {
            total_runs,
            name_prefix,
            doc_count,
            doc_size,
            run_digits,
            doc_digits: digits(doc_count),
        })
    }

    pub fn total_runs(&self) -> usize {
        self.total_runs
    }

    pub fn name_prefix(&self) -> &str {
        &self.name_prefix
    }

    pub fn doc_count(&self) -> usize {
        self.doc_count
    }

    pub fn doc_size(&self) -> usize {
        self.doc_size
    }

    pub fn run_digits(&self) -> usize {
        self.run_digits
    }

    pub fn doc_digits(&self) -> usize {
        self.doc_digits
    }

    /// Name of the 1-based run index, zero-padded to the run width.
    pub fn run_name(&self, run: usize) -> String {
        format!(
            "{}{:0width$}",
            self.name_prefix,
            run,
            width = self.run_digits
        )
    }

    /// 1-based document index holding the given run.
    pub fn doc_of_run(&self, run: usize) -> usize {
        (run - 1) / self.doc_size + 1
    }

    /// 1-based run indices the given document holds; the final document
    /// may be short.
    pub fn doc_runs(&self, doc: usize) -> RangeInclusive<usize> {
        let start = (doc - 1) * self.doc_size + 1;
        let end = (doc * self.doc_size).min(self.total_runs);
        start..=end
    }

    /// Document file name: the base path itself for a single document, or
    /// the base with a zero-padded `-{doc}` before its extension.
    pub fn doc_file_name(&self, base: &Path, doc: usize) -> String {
        if self.doc_count == 1 {
            return base.display().to_string();
        }
        let stem = base
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let suffix = base
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let numbered = format!(
            "{}-{:0width$}{}",
            stem,
            doc,
            suffix,
            width = self.doc_digits
        );
        match base.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                dir.join(numbered).display().to_string()
            }
            _ => numbered,
        }
    }

    /// Job-array size under a scheduler's task limit.
    pub fn array_size(&self, task_limit: usize) -> usize {
        self.total_runs.min(task_limit)
    }

    /// Whether the task limit forces sleeper-driven waves.
    pub fn needs_sleeper(&self, task_limit: usize) -> bool {
        task_limit < self.total_runs
    }

    /// Number of waves the sleeper submits.
    pub fn wave_count(&self, task_limit: usize) -> usize {
        self.total_runs.div_ceil(task_limit.max(1))
    }
}
