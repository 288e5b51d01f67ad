// src/script.rs
//
// Submission-script rendering.
//
// One scheduler dialect (SGE or SLURM) is rendered against a batch's
// layout: the job array covers min(total runs, task limit) tasks, and each
// task recomputes its global run index, document and output directory from
// the batch's padding widths, so parallel tasks never collide and a result
// can be traced back to its run by filename alone.
//
// When the task limit is smaller than the run count, a companion sleeper
// script drives the job in waves: submit one wave at an offset, wait for
// the queue to drain, move the offset up. A task whose computed run index
// exceeds the total exits at once, which keeps the final short wave
// harmless.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::batch::Batch;
use crate::launch::{LaunchSettings, Scheduler};

/// Errors from script writing.
#[derive(Debug)]
pub enum ScriptError {
    Io {
        path: String,
        source: std::io::Error,
    },
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::Io { path, source } => {
                write!(f, "error creating file {}: {}", path, source)
            }
        }
    }
}

impl std::error::Error for ScriptError {}

/// The files one script-rendering pass produced.
#[derive(Debug, Clone)]
pub struct ScriptSet {
    pub submission: PathBuf,
    pub sleeper: Option<PathBuf>,
}

/// A job name a scheduler will accept, derived from the experiment prefix.
fn job_name(batch: &Batch) -> String {
    let name = batch.name_prefix().trim_end_matches('-');
    if name.is_empty() {
        "nlbatch".to_string()
    } else {
        name.to_string()
    }
}

/// Render the submission script for the settings' scheduler dialect.
/// `model_file` and `xml_base` are the paths the tasks resolve against
/// their working directory.
pub fn render_submission_script(
    batch: &Batch,
    settings: &LaunchSettings,
    model_file: &str,
    xml_base: &str,
) -> String {
    let job = job_name(batch);
    let array = batch.array_size(settings.task_array_limit);
    let mut out = String::from("#!/bin/bash\n");

    match settings.scheduler {
        Scheduler::Sge => {
            out.push_str("#$ -cwd\n");
            out.push_str(&format!("#$ -N {}\n", job));
            out.push_str(&format!("#$ -t 1-{}\n", array));
            if let Some(cap) = settings.concurrent_tasks {
                out.push_str(&format!("#$ -tc {}\n", cap));
            }
            out.push_str(&format!("#$ -pe smp {}\n", settings.threads));
            out.push_str(&format!("#$ -l h_vmem={}G\n", settings.memory_gb));
            out.push_str(&format!("#$ -l h_rt={}:00:00\n", settings.wall_time_hours));
            if let Some(project) = &settings.project {
                out.push_str(&format!("#$ -P {}\n", project));
            }
            out.push_str(&format!("#$ -o {}-$TASK_ID.out\n", job));
            out.push_str(&format!("#$ -e {}-$TASK_ID.err\n", job));
            out.push('\n');
            out.push_str("OFFSET=${1:-0}\n");
            out.push_str("RUN=$(($SGE_TASK_ID + $OFFSET))\n");
        }
        Scheduler::Slurm => {
            out.push_str(&format!("#SBATCH --job-name={}\n", job));
            match settings.concurrent_tasks {
                Some(cap) => out.push_str(&format!("#SBATCH --array=1-{}%{}\n", array, cap)),
                None => out.push_str(&format!("#SBATCH --array=1-{}\n", array)),
            }
            out.push_str(&format!("#SBATCH --cpus-per-task={}\n", settings.threads));
            out.push_str(&format!("#SBATCH --mem={}G\n", settings.memory_gb));
            out.push_str(&format!("#SBATCH --time={}:00:00\n", settings.wall_time_hours));
            if let Some(project) = &settings.project {
                out.push_str(&format!("#SBATCH --account={}\n", project));
            }
            out.push_str(&format!("#SBATCH --output={}-%a.out\n", job));
            out.push_str(&format!("#SBATCH --error={}-%a.err\n", job));
            out.push('\n');
            out.push_str("OFFSET=${1:-0}\n");
            out.push_str("RUN=$(($SLURM_ARRAY_TASK_ID + $OFFSET))\n");
        }
    }

    // Guard against an over-sized final wave.
    out.push_str(&format!(
        "if [ $RUN -gt {} ]; then\n    exit 0\nfi\n",
        batch.total_runs()
    ));
    if settings.start_jitter_secs > 0 {
        out.push_str(&format!(
            "sleep $(($RANDOM % {}))\n",
            settings.start_jitter_secs
        ));
    }
    out.push_str(&format!(
        "printf -v RUN_ID \"%0{}d\" $RUN\n",
        batch.run_digits()
    ));

    let xml_path = if batch.doc_count() > 1 {
        out.push_str(&format!(
            "DOC=$((($RUN - 1) / {} + 1))\n",
            batch.doc_size()
        ));
        out.push_str(&format!(
            "printf -v DOC_ID \"%0{}d\" $DOC\n",
            batch.doc_digits()
        ));
        numbered_doc_reference(xml_base)
    } else {
        xml_base.to_string()
    };

    out.push_str(&format!("export JAVA_HOME=\"{}\"\n", settings.java_home));
    out.push_str("wd=`pwd`\n");
    out.push_str(&format!("cd \"{}\"\n", settings.netlogo_home));
    out.push_str(&format!("xml=\"$wd/{}\"\n", xml_path));
    let prefix = batch.name_prefix();
    out.push_str(&format!("xpt=\"{}$RUN_ID\"\n", prefix));
    out.push_str(&format!("dir=\"$wd/{}$RUN_ID\"\n", prefix));
    out.push_str("mkdir -p \"$dir\"\n");
    out.push_str(&format!("out=\"$dir/{}$RUN_ID.out\"\n", prefix));
    out.push_str(&format!("csv=\"$dir/{}$RUN_ID-table.csv\"\n", prefix));
    out.push_str(&format!(
        "\"{}\" --model \"$wd/{}\" --setup-file \"$xml\" --experiment \"$xpt\" --threads {} --table \"$csv\" > \"$out\" 2>&1\n",
        settings.netlogo_invoke, model_file, settings.threads
    ));

    out
}

/// Rewrite `runs/out.xml` as `runs/out-$DOC_ID.xml` for use inside the
/// generated script.
fn numbered_doc_reference(xml_base: &str) -> String {
    let path = Path::new(xml_base);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let name = format!("{}-$DOC_ID{}", stem, suffix);
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(name).display().to_string(),
        _ => name,
    }
}

/// Render the sleeper: a background driver that submits wave after wave
/// of the submission script, each offset one task-limit further into the
/// run set, waiting between waves until the queue holds no more of this
/// job's tasks.
pub fn render_sleeper_script(
    batch: &Batch,
    settings: &LaunchSettings,
    submission_file: &str,
) -> String {
    let job = job_name(batch);
    let wave = batch.array_size(settings.task_array_limit);
    let poll = match settings.scheduler {
        Scheduler::Sge => format!("qstat -u $USER | grep {}", job),
        Scheduler::Slurm => format!("squeue -h -u $USER -n {}", job),
    };

    let mut out = String::from("#!/bin/bash\n");
    out.push_str("# Submits the job array in waves sized to the scheduler's\n");
    out.push_str("# task limit, waiting for each wave to clear the queue.\n");
    out.push_str(&format!("TOTAL={}\n", batch.total_runs()));
    out.push_str(&format!("WAVE={}\n", wave));
    out.push_str("OFFSET=0\n");
    out.push_str("while [ $OFFSET -lt $TOTAL ]; do\n");
    out.push_str(&format!(
        "    {} {} $OFFSET\n",
        settings.scheduler.submit_command(),
        submission_file
    ));
    out.push_str(&format!("    sleep {}\n", settings.settle_delay_secs));
    out.push_str(&format!("    while [ -n \"$({})\" ]; do\n", poll));
    out.push_str(&format!("        sleep {}\n", settings.poll_interval_secs));
    out.push_str("    done\n");
    out.push_str("    OFFSET=$(($OFFSET + $WAVE))\n");
    out.push_str("done\n");
    out
}

/// Write the submission script, and the sleeper beside it when the task
/// limit is binding. Both are marked executable.
pub fn write_scripts(
    path: &Path,
    batch: &Batch,
    settings: &LaunchSettings,
    model_file: &str,
    xml_base: &str,
) -> Result<ScriptSet, ScriptError> {
    let submission = render_submission_script(batch, settings, model_file, xml_base);
    write_executable(path, &submission)?;

    let sleeper = if batch.needs_sleeper(settings.task_array_limit) {
        let sleeper_path = sleeper_file_name(path);
        let submission_ref = path
            .file_name()
            .map(|f| format!("./{}", f.to_string_lossy()))
            .unwrap_or_else(|| path.display().to_string());
        let text = render_sleeper_script(batch, settings, &submission_ref);
        write_executable(&sleeper_path, &text)?;
        Some(sleeper_path)
    } else {
        None
    };

    Ok(ScriptSet {
        submission: path.to_path_buf(),
        sleeper,
    })
}

/// `runs/job.sh` -> `runs/job-sleeper.sh`.
fn sleeper_file_name(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let name = format!("{}-sleeper{}", stem, suffix);
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.join(name),
        _ => PathBuf::from(name),
    }
}

fn write_executable(path: &Path, text: &str) -> Result<(), ScriptError> {
    let io_err = |e: std::io::Error| ScriptError::Io {
        path: path.display().to_string(),
        source: e,
    };
    let mut file = fs::File::create(path).map_err(io_err)?;
    file.write_all(text.as_bytes()).map_err(io_err)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(io_err)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::{numbered_name, Experiment, StopCondition};

    fn batch(n: usize, max_doc: usize, group: usize) -> Batch {
        let expts: Vec<Experiment> = (1..=n)
            .map(|i| Experiment::new(&numbered_name("x", i, n), StopCondition::Ticks(5)))
            .collect();
        Batch::new(&expts, max_doc, group).unwrap()
    }

    fn settings(scheduler: Scheduler) -> LaunchSettings {
        let mut s = LaunchSettings::default();
        s.scheduler = scheduler;
        s
    }

    #[test]
    fn test_sge_script_covers_all_runs() {
        let b = batch(12, 100, 5);
        let script = render_submission_script(&b, &settings(Scheduler::Sge), "m.nlogo", "out.xml");
        assert!(script.contains("#$ -t 1-12\n"));
        assert!(script.contains("RUN=$(($SGE_TASK_ID + $OFFSET))"));
        assert!(script.contains("if [ $RUN -gt 12 ]"));
        assert!(script.contains("printf -v RUN_ID \"%02d\" $RUN"));
        assert!(script.contains("--experiment \"$xpt\""));
        assert!(script.contains("xpt=\"x-$RUN_ID\""));
        assert!(!b.needs_sleeper(100));
    }

    #[test]
    fn test_sge_script_capped_array() {
        let mut s = settings(Scheduler::Sge);
        s.task_array_limit = 5;
        let b = batch(12, 100, 5);
        let script = render_submission_script(&b, &s, "m.nlogo", "out.xml");
        assert!(script.contains("#$ -t 1-5\n"));
        assert!(b.needs_sleeper(5));
    }

    #[test]
    fn test_slurm_dialect() {
        let mut s = settings(Scheduler::Slurm);
        s.concurrent_tasks = Some(50);
        s.project = Some("eco".to_string());
        let b = batch(12, 100, 5);
        let script = render_submission_script(&b, &s, "m.nlogo", "out.xml");
        assert!(script.contains("#SBATCH --array=1-12%50\n"));
        assert!(script.contains("#SBATCH --account=eco\n"));
        assert!(script.contains("RUN=$(($SLURM_ARRAY_TASK_ID + $OFFSET))"));
        assert!(!script.contains("SGE_TASK_ID"));
    }

    #[test]
    fn test_multi_document_selection() {
        let b = batch(12, 10, 5);
        assert_eq!(b.doc_count(), 3);
        let script =
            render_submission_script(&b, &settings(Scheduler::Sge), "m.nlogo", "runs/out.xml");
        assert!(script.contains("DOC=$((($RUN - 1) / 5 + 1))"));
        assert!(script.contains("printf -v DOC_ID \"%01d\" $DOC"));
        assert!(script.contains("xml=\"$wd/runs/out-$DOC_ID.xml\""));
    }

    #[test]
    fn test_jitter_line() {
        let mut s = settings(Scheduler::Sge);
        s.start_jitter_secs = 30;
        let b = batch(3, 100, 5);
        let script = render_submission_script(&b, &s, "m.nlogo", "out.xml");
        assert!(script.contains("sleep $(($RANDOM % 30))"));
    }

    #[test]
    fn test_sleeper_waves() {
        let mut s = settings(Scheduler::Sge);
        s.task_array_limit = 5;
        let b = batch(12, 100, 5);
        let sleeper = render_sleeper_script(&b, &s, "./job.sh");
        assert!(sleeper.contains("TOTAL=12"));
        assert!(sleeper.contains("WAVE=5"));
        assert!(sleeper.contains("qsub ./job.sh $OFFSET"));
        assert!(sleeper.contains("qstat -u $USER | grep x"));
        assert!(sleeper.contains("sleep 60"));
        assert!(sleeper.contains("OFFSET=$(($OFFSET + $WAVE))"));
    }

    #[test]
    fn test_sleeper_slurm_poll() {
        let mut s = settings(Scheduler::Slurm);
        s.task_array_limit = 5;
        let b = batch(12, 100, 5);
        let sleeper = render_sleeper_script(&b, &s, "./job.sh");
        assert!(sleeper.contains("sbatch ./job.sh $OFFSET"));
        assert!(sleeper.contains("squeue -h -u $USER -n x"));
    }

    #[test]
    fn test_write_scripts_with_sleeper() {
        let dir = tempfile::tempdir().unwrap();
        let mut s = settings(Scheduler::Sge);
        s.task_array_limit = 5;
        let b = batch(12, 100, 5);
        let path = dir.path().join("job.sh");
        let set = write_scripts(&path, &b, &s, "m.nlogo", "out.xml").unwrap();

        assert!(set.submission.exists());
        let sleeper = set.sleeper.expect("sleeper required");
        assert!(sleeper.ends_with("job-sleeper.sh"));
        assert!(sleeper.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&set.submission).unwrap().permissions().mode();
            assert_eq!(mode & 0o111, 0o111);
        }
    }

    #[test]
    fn test_write_scripts_without_sleeper() {
        let dir = tempfile::tempdir().unwrap();
        let b = batch(3, 100, 5);
        let path = dir.path().join("job.sh");
        let set = write_scripts(&path, &b, &settings(Scheduler::Sge), "m.nlogo", "out.xml")
            .unwrap();
        assert!(set.sleeper.is_none());
    }
}
