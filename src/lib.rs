//! nlbatch core library.
//!
//! This crate turns a NetLogo model's declared parameters into structured
//! experiment descriptions, expands those into concrete, deterministically
//! named run sets, and decomposes the run sets into size-bounded experiment
//! documents and scheduler-legal job arrays. The binary (`src/main.rs`) is
//! a thin CLI over these components.
//!
//! # Architecture
//!
//! The pipeline runs left to right, every stage a pure computation over
//! in-memory values:
//!
//! - **model**: reads the sectioned NetLogo file format into typed widgets,
//!   exposing parameters (name, datatype, constraint) and metric sources.
//! - **sample**: one sampling rule per parameter, with bounds that may
//!   reference sibling parameters; resolution is cycle-guarded and draws
//!   are cached per pass so correlated bounds stay consistent.
//! - **axis** / **experiment**: value axes and the experiment aggregate,
//!   with Cartesian (`unique_settings`) and Monte-Carlo (`with_n_samples`)
//!   expansion into sequentially named children.
//! - **batch**: validates the naming invariant and sizes the run set into
//!   document groups and a task-limited job array.
//! - **bsxml** / **script**: render the experiment documents and the
//!   SGE/SLURM submission scripts (plus the wave-driving sleeper when the
//!   task limit binds).
//! - **launch** / **summary**: the YAML-loaded cluster settings and the
//!   JSON record of what an expansion produced.

pub mod axis;
pub mod batch;
pub mod bsxml;
pub mod experiment;
pub mod launch;
pub mod model;
pub mod sample;
pub mod script;
pub mod summary;
pub mod value;

// --- Re-exports for ergonomic external use ---------------------------------

pub use axis::{AxisError, EnumeratedValues, SteppedValues};
pub use batch::{digits, Batch, BatchError};
pub use bsxml::{
    parse_experiments, read_experiments, render_experiments, write_documents,
    write_experiments, XmlError,
};
pub use experiment::{numbered_name, Experiment, Instrumentation, StopCondition};
pub use launch::{LaunchError, LaunchSettings, Scheduler};
pub use model::{Constraint, ModelError, NetlogoModel, Parameter, RangeBound, Widget};
pub use sample::{
    render_parameter_table, write_parameter_table, Bound, Sample, SampleError, SampleSet,
};
pub use script::{
    render_sleeper_script, render_submission_script, write_scripts, ScriptError, ScriptSet,
};
pub use summary::{ExpansionSummary, SUMMARY_SCHEMA_VERSION};
pub use value::{Datatype, Value};
