// src/launch.rs
//
// Launch settings: everything the generated submission scripts are
// parameterized by. Loaded from a YAML file with per-field defaults, then
// overridden by environment variables for the NetLogo installation paths,
// and validated before use.

use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Supported cluster schedulers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheduler {
    Sge,
    Slurm,
}

impl Scheduler {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheduler::Sge => "sge",
            Scheduler::Slurm => "slurm",
        }
    }

    /// The command that submits the job script.
    pub fn submit_command(&self) -> &'static str {
        match self {
            Scheduler::Sge => "qsub",
            Scheduler::Slurm => "sbatch",
        }
    }
}

impl fmt::Display for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheduler {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sge" => Ok(Scheduler::Sge),
            "slurm" => Ok(Scheduler::Slurm),
            other => Err(format!("unknown scheduler '{}'", other)),
        }
    }
}

/// Errors from loading launch settings.
#[derive(Debug)]
pub enum LaunchError {
    Io {
        path: String,
        source: std::io::Error,
    },
    Parse { source: String },
    Validation { field: String, message: String },
}

impl fmt::Display for LaunchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaunchError::Io { path, source } => {
                write!(f, "failed to read launch settings '{}': {}", path, source)
            }
            LaunchError::Parse { source } => {
                write!(f, "failed to parse launch settings YAML: {}", source)
            }
            LaunchError::Validation { field, message } => {
                write!(f, "launch settings validation error in '{}': {}", field, message)
            }
        }
    }
}

impl std::error::Error for LaunchError {}

/// Cluster-side settings consumed by script rendering and batch sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchSettings {
    /// Scheduler dialect to render scripts for.
    #[serde(default = "default_scheduler")]
    pub scheduler: Scheduler,
    /// Per-task memory limit in gigabytes.
    #[serde(default = "default_memory_gb")]
    pub memory_gb: u32,
    /// Per-task wall-time limit in hours.
    #[serde(default = "default_wall_time_hours")]
    pub wall_time_hours: u32,
    /// Threads each NetLogo run may use.
    #[serde(default = "default_threads")]
    pub threads: u32,
    /// Cap on concurrently running array tasks; absent means the
    /// scheduler's own default.
    #[serde(default)]
    pub concurrent_tasks: Option<u32>,
    /// Project / accounting tag for the submission.
    #[serde(default)]
    pub project: Option<String>,
    /// Upper bound on the random start delay each task sleeps, in seconds;
    /// zero disables the jitter.
    #[serde(default = "default_start_jitter_secs")]
    pub start_jitter_secs: u32,
    /// How long the sleeper waits after submitting a wave before it first
    /// polls the queue.
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u32,
    /// Seconds between sleeper queue polls.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u32,
    /// Hard scheduler limit on job-array size.
    #[serde(default = "default_task_array_limit")]
    pub task_array_limit: usize,
    /// Largest run count a single experiment document may hold.
    #[serde(default = "default_max_doc_entries")]
    pub max_doc_entries: usize,
    /// Preferred runs per document once the run set splits.
    #[serde(default = "default_doc_group_size")]
    pub doc_group_size: usize,
    /// NetLogo installation directory.
    #[serde(default = "default_netlogo_home")]
    pub netlogo_home: String,
    /// Headless launcher the tasks invoke.
    #[serde(default = "default_netlogo_invoke")]
    pub netlogo_invoke: String,
    /// JAVA_HOME exported to each task.
    #[serde(default = "default_java_home")]
    pub java_home: String,
}

fn default_scheduler() -> Scheduler {
    Scheduler::Sge
}
fn default_memory_gb() -> u32 {
    4
}
fn default_wall_time_hours() -> u32 {
    48
}
fn default_threads() -> u32 {
    2
}
fn default_start_jitter_secs() -> u32 {
    0
}
fn default_settle_delay_secs() -> u32 {
    60
}
fn default_poll_interval_secs() -> u32 {
    300
}
fn default_task_array_limit() -> usize {
    10_000
}
fn default_max_doc_entries() -> usize {
    10_000
}
fn default_doc_group_size() -> usize {
    5_000
}
fn default_netlogo_home() -> String {
    "/opt/netlogo".to_string()
}
fn default_netlogo_invoke() -> String {
    "/opt/netlogo/netlogo-headless.sh".to_string()
}
fn default_java_home() -> String {
    "/usr/lib/jvm/default".to_string()
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            scheduler: default_scheduler(),
            memory_gb: default_memory_gb(),
            wall_time_hours: default_wall_time_hours(),
            threads: default_threads(),
            concurrent_tasks: None,
            project: None,
            start_jitter_secs: default_start_jitter_secs(),
            settle_delay_secs: default_settle_delay_secs(),
            poll_interval_secs: default_poll_interval_secs(),
            task_array_limit: default_task_array_limit(),
            max_doc_entries: default_max_doc_entries(),
            doc_group_size: default_doc_group_size(),
            netlogo_home: default_netlogo_home(),
            netlogo_invoke: default_netlogo_invoke(),
            java_home: default_java_home(),
        }
    }
}

impl LaunchSettings {
    /// Load settings from a YAML file, apply environment overrides and
    /// validate.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, LaunchError> {
        let contents = fs::read_to_string(path.as_ref()).map_err(|e| LaunchError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Self::from_yaml_str(&contents)
    }

    /// Parse settings from YAML text, apply environment overrides and
    /// validate.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, LaunchError> {
        let mut settings: LaunchSettings =
            serde_yaml::from_str(yaml).map_err(|e| LaunchError::Parse {
                source: e.to_string(),
            })?;
        settings.apply_env(&env::vars().collect());
        settings.validate()?;
        Ok(settings)
    }

    /// Default settings with environment overrides applied.
    pub fn from_env() -> Result<Self, LaunchError> {
        let mut settings = LaunchSettings::default();
        settings.apply_env(&env::vars().collect());
        settings.validate()?;
        Ok(settings)
    }

    /// Layer installation-path overrides from the environment; the
    /// environment wins over the file, the file over the defaults.
    pub fn apply_env(&mut self, vars: &BTreeMap<String, String>) {
        if let Some(home) = vars.get("NETLOGO_HOME") {
            self.netlogo_home = home.clone();
        }
        if let Some(invoke) = vars.get("NETLOGO_INVOKE") {
            self.netlogo_invoke = invoke.clone();
        }
        if let Some(java) = vars.get("JAVA_HOME") {
            self.java_home = java.clone();
        }
    }

    pub fn validate(&self) -> Result<(), LaunchError> {
        let positive: [(&str, usize); 6] = [
            ("memory_gb", self.memory_gb as usize),
            ("wall_time_hours", self.wall_time_hours as usize),
            ("threads", self.threads as usize),
            ("task_array_limit", self.task_array_limit),
            ("max_doc_entries", self.max_doc_entries),
            ("doc_group_size", self.doc_group_size),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(LaunchError::Validation {
                    field: field.to_string(),
                    message: "must be >= 1".to_string(),
                });
            }
        }
        if self.concurrent_tasks == Some(0) {
            return Err(LaunchError::Validation {
                field: "concurrent_tasks".to_string(),
                message: "must be >= 1 when set".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = LaunchSettings::default();
        assert_eq!(s.scheduler, Scheduler::Sge);
        assert_eq!(s.memory_gb, 4);
        assert_eq!(s.task_array_limit, 10_000);
        assert_eq!(s.doc_group_size, 5_000);
        assert!(s.concurrent_tasks.is_none());
        s.validate().unwrap();
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = "\
scheduler: slurm
memory_gb: 8
wall_time_hours: 12
concurrent_tasks: 200
project: eco_models
task_array_limit: 1000
";
        let s: LaunchSettings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(s.scheduler, Scheduler::Slurm);
        assert_eq!(s.memory_gb, 8);
        assert_eq!(s.concurrent_tasks, Some(200));
        assert_eq!(s.project.as_deref(), Some("eco_models"));
        assert_eq!(s.task_array_limit, 1000);
        // untouched fields keep their defaults
        assert_eq!(s.threads, 2);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut s: LaunchSettings =
            serde_yaml::from_str("netlogo_home: /from/file").unwrap();
        assert_eq!(s.netlogo_home, "/from/file");

        let mut vars = BTreeMap::new();
        vars.insert("NETLOGO_HOME".to_string(), "/from/env".to_string());
        s.apply_env(&vars);
        assert_eq!(s.netlogo_home, "/from/env");
        // unrelated fields untouched
        assert_eq!(s.netlogo_invoke, default_netlogo_invoke());
    }

    #[test]
    fn test_validation_rejects_zero() {
        let s: LaunchSettings = serde_yaml::from_str("doc_group_size: 0").unwrap();
        assert!(matches!(
            s.validate(),
            Err(LaunchError::Validation { .. })
        ));

        let s: LaunchSettings = serde_yaml::from_str("concurrent_tasks: 0").unwrap();
        assert!(matches!(
            s.validate(),
            Err(LaunchError::Validation { .. })
        ));
    }

    #[test]
    fn test_scheduler_from_str() {
        assert_eq!("sge".parse::<Scheduler>().unwrap(), Scheduler::Sge);
        assert_eq!("SLURM".parse::<Scheduler>().unwrap(), Scheduler::Slurm);
        assert!("pbs".parse::<Scheduler>().is_err());
    }
}
