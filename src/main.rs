// src/main.rs
//
// CLI entrypoint for nlbatch. All of the real logic lives in the lib
// crate; this file parses arguments, wires the pipeline stages together
// and reports what was written.
//
// Workflow:
//   nlbatch model.nlogo param params.csv      # extract editable table
//   (edit params.csv: bounds, references, one-of lists)
//   nlbatch model.nlogo montq params.csv 1000 5000 runs/out.xml runs/job.sh
//   qsub runs/job.sh                          # or ./runs/job-sleeper.sh

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use nlbatch::batch::Batch;
use nlbatch::bsxml;
use nlbatch::experiment::{Experiment, StopCondition};
use nlbatch::launch::{LaunchSettings, Scheduler};
use nlbatch::model::NetlogoModel;
use nlbatch::sample::{self, SampleSet};
use nlbatch::script::{self, ScriptSet};
use nlbatch::summary::ExpansionSummary;

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SchedulerArg {
    Sge,
    Slurm,
}

impl From<SchedulerArg> for Scheduler {
    fn from(arg: SchedulerArg) -> Self {
        match arg {
            SchedulerArg::Sge => Scheduler::Sge,
            SchedulerArg::Slurm => Scheduler::Slurm,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "nlbatch",
    about = "NetLogo experiment expansion and cluster batch preparation",
    version
)]
struct Cli {
    /// NetLogo model file.
    model: PathBuf,

    #[command(subcommand)]
    command: Command,

    /// Deterministic sampling seed.
    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Launch settings YAML (defaults plus NETLOGO_HOME/NETLOGO_INVOKE/
    /// JAVA_HOME environment overrides when omitted).
    #[arg(long)]
    launch: Option<PathBuf>,

    /// Override the launch settings' scheduler dialect.
    #[arg(long, value_enum)]
    scheduler: Option<SchedulerArg>,

    /// Suppress per-artifact lines; only print the final summary.
    #[arg(long)]
    quiet: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Extract the model's parameters into an editable CSV table.
    Param {
        /// File to save the parameter table to.
        out: PathBuf,
    },
    /// List the model's BehaviorSpace experiments.
    Expts,
    /// Prepare a Monte-Carlo sample of parameter space as experiment
    /// document(s).
    Monte {
        /// Edited parameter table.
        params: PathBuf,
        /// Tick number to stop each run at.
        ticks: u64,
        /// Number of samples to draw.
        samples: usize,
        /// Experiment XML file (split into numbered documents when large).
        out_xml: PathBuf,
        /// Experiment name prefix.
        #[arg(long, default_value = "x")]
        name: String,
        /// Skip injecting per-run parameter/metric CSV saving code.
        #[arg(long)]
        no_final_save: bool,
    },
    /// As monte, plus a cluster submission script (and sleeper when the
    /// task-array limit is binding).
    Montq {
        params: PathBuf,
        ticks: u64,
        samples: usize,
        out_xml: PathBuf,
        /// File to save the submission script to.
        out_script: PathBuf,
        #[arg(long, default_value = "x")]
        name: String,
        #[arg(long)]
        no_final_save: bool,
    },
    /// Expand a named BehaviorSpace experiment into one experiment per
    /// unique setting, with documents and a submission script.
    Split {
        /// Name of the experiment to expand.
        experiment: String,
        out_xml: PathBuf,
        out_script: PathBuf,
        /// Give every repetition its own experiment.
        #[arg(long)]
        split_reps: bool,
    },
}

fn main() {
    if let Err(e) = run(Cli::parse()) {
        eprintln!("nlbatch: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut settings = match &cli.launch {
        Some(path) => LaunchSettings::from_yaml_file(path)
            .with_context(|| format!("loading launch settings {}", path.display()))?,
        None => LaunchSettings::from_env().context("loading launch settings")?,
    };
    if let Some(arg) = cli.scheduler {
        settings.scheduler = arg.into();
    }

    let model = NetlogoModel::read(&cli.model)
        .with_context(|| format!("reading model {}", cli.model.display()))?;

    println!(
        "nlbatch v{} | model={} | scheduler={} | seed={}",
        env!("CARGO_PKG_VERSION"),
        cli.model.display(),
        settings.scheduler,
        cli.seed
    );

    match &cli.command {
        Command::Param { out } => {
            sample::write_parameter_table(&model.parameters(), out)
                .context("writing parameter table")?;
            println!("Wrote: {}", out.display());
        }

        Command::Expts => {
            if model.experiments.is_empty() {
                println!("There are no experiments");
            } else {
                println!("Experiments:");
                for e in &model.experiments {
                    println!("  {} ({} runs)", e.name, e.run_count());
                }
            }
        }

        Command::Monte {
            params,
            ticks,
            samples,
            out_xml,
            name,
            no_final_save,
        } => {
            let children = monte_expand(
                &cli, &model, params, *ticks, *samples, name, *no_final_save,
            )?;
            let batch = size_batch(&children, &settings)?;
            let documents = write_documents(&cli, &batch, &children, out_xml)?;

            let mut summary = base_summary(&cli, &batch);
            summary.seed = Some(cli.seed);
            summary.documents = documents;
            finish(&cli, &settings, &batch, summary, out_xml, None)?;
        }

        Command::Montq {
            params,
            ticks,
            samples,
            out_xml,
            out_script,
            name,
            no_final_save,
        } => {
            let children = monte_expand(
                &cli, &model, params, *ticks, *samples, name, *no_final_save,
            )?;
            let batch = size_batch(&children, &settings)?;
            let documents = write_documents(&cli, &batch, &children, out_xml)?;
            let scripts = write_scripts(&cli, &settings, &batch, out_xml, out_script)?;

            let mut summary = base_summary(&cli, &batch);
            summary.seed = Some(cli.seed);
            summary.scheduler = Some(settings.scheduler.to_string());
            summary.documents = documents;
            summary.submission_script = Some(scripts.submission.display().to_string());
            summary.sleeper_script = scripts.sleeper.as_ref().map(|p| p.display().to_string());
            finish(&cli, &settings, &batch, summary, out_xml, Some(&scripts))?;
        }

        Command::Split {
            experiment,
            out_xml,
            out_script,
            split_reps,
        } => {
            let base = match model.experiment(experiment) {
                Some(e) => e,
                None => bail!(
                    "model {} has no experiment named '{}'",
                    cli.model.display(),
                    experiment
                ),
            };
            let children = base.unique_settings(&[], *split_reps);
            if !cli.quiet {
                println!(
                    "Expanded '{}' into {} unique-setting experiments",
                    experiment,
                    children.len()
                );
            }
            let batch = size_batch(&children, &settings)?;
            let documents = write_documents(&cli, &batch, &children, out_xml)?;
            let scripts = write_scripts(&cli, &settings, &batch, out_xml, out_script)?;

            let mut summary = base_summary(&cli, &batch);
            summary.scheduler = Some(settings.scheduler.to_string());
            summary.documents = documents;
            summary.submission_script = Some(scripts.submission.display().to_string());
            summary.sleeper_script = scripts.sleeper.as_ref().map(|p| p.display().to_string());
            finish(&cli, &settings, &batch, summary, out_xml, Some(&scripts))?;
        }
    }

    Ok(())
}

/// Read the parameter table and draw N sampled children of a fresh
/// experiment built from the model's interface.
fn monte_expand(
    cli: &Cli,
    model: &NetlogoModel,
    params: &Path,
    ticks: u64,
    samples: usize,
    name: &str,
    no_final_save: bool,
) -> Result<Vec<Experiment>> {
    if samples == 0 {
        bail!("number of samples must be >= 1");
    }
    let declared = model.parameters();
    let mut set = SampleSet::read_table(params, &declared)
        .with_context(|| format!("reading parameter table {}", params.display()))?;
    if set.is_empty() {
        bail!(
            "parameter table {} matched no model parameters",
            params.display()
        );
    }

    let base = Experiment::from_model(model, name, StopCondition::Ticks(ticks));
    let mut rng = ChaCha8Rng::seed_from_u64(cli.seed);
    let children = base
        .with_n_samples(&mut set, samples, &mut rng, !no_final_save)
        .context("sampling parameter space")?;
    if !cli.quiet {
        println!(
            "Sampled {} runs over {} parameters",
            children.len(),
            set.len()
        );
    }
    Ok(children)
}

fn size_batch(children: &[Experiment], settings: &LaunchSettings) -> Result<Batch> {
    Batch::new(children, settings.max_doc_entries, settings.doc_group_size)
        .context("sizing batch")
}

fn write_documents(
    cli: &Cli,
    batch: &Batch,
    children: &[Experiment],
    out_xml: &Path,
) -> Result<Vec<String>> {
    let documents =
        bsxml::write_documents(out_xml, batch, children).context("writing experiment documents")?;
    if !cli.quiet {
        for doc in &documents {
            println!("Wrote: {}", doc);
        }
    }
    Ok(documents)
}

fn write_scripts(
    cli: &Cli,
    settings: &LaunchSettings,
    batch: &Batch,
    out_xml: &Path,
    out_script: &Path,
) -> Result<ScriptSet> {
    let scripts = script::write_scripts(
        out_script,
        batch,
        settings,
        &cli.model.display().to_string(),
        &out_xml.display().to_string(),
    )
    .context("writing submission script")?;
    if !cli.quiet {
        println!("Wrote: {}", scripts.submission.display());
        if let Some(sleeper) = &scripts.sleeper {
            println!("Wrote: {}", sleeper.display());
        }
    }
    Ok(scripts)
}

fn base_summary(cli: &Cli, batch: &Batch) -> ExpansionSummary {
    ExpansionSummary::new(
        &cli.model.display().to_string(),
        batch.name_prefix(),
        batch.total_runs(),
    )
}

fn finish(
    cli: &Cli,
    settings: &LaunchSettings,
    batch: &Batch,
    summary: ExpansionSummary,
    out_xml: &Path,
    scripts: Option<&ScriptSet>,
) -> Result<()> {
    let summary_path = out_xml
        .parent()
        .filter(|d| !d.as_os_str().is_empty())
        .map(|d| d.join("expansion_summary.json"))
        .unwrap_or_else(|| PathBuf::from("expansion_summary.json"));
    summary
        .write_to_file(&summary_path)
        .with_context(|| format!("writing {}", summary_path.display()))?;
    if !cli.quiet {
        println!("Wrote: {}", summary_path.display());
    }

    println!(
        "{} runs in {} document(s), array of {}",
        batch.total_runs(),
        batch.doc_count(),
        batch.array_size(settings.task_array_limit)
    );
    if let Some(ScriptSet {
        submission,
        sleeper: Some(sleeper),
    }) = scripts
    {
        println!(
            "Task limit is binding: run ./{} instead of submitting {} directly",
            sleeper.display(),
            submission.display()
        );
    }
    Ok(())
}
