//! LCDB command line
//!
//! Usage:
//!   lcdb [--log-level LEVEL] <COMMAND>
//!
//! Examples:
//!   # Inspect the hyperparameters of a workflow
//!   lcdb space --workflow softmax_regression
//!
//!   # Create experiment rows from a campaign file
//!   lcdb create --config campaign.toml
//!
//!   # Run every pending row on all cores
//!   lcdb run --config campaign.toml --parallel

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use lcdb::config::LcdbConfig;
use lcdb::experiment::{create_experiments, ExperimentRecord, ExperimentStore};
use lcdb::runner::{record_outcomes, Runner};
use lcdb::storage::{load_dataset_parquet, CurveStore};
use lcdb::workflow::WorkflowRegistry;

#[derive(Parser)]
#[command(name = "lcdb")]
#[command(about = "Learning-curve database: benchmark workflows across training-set sizes")]
#[command(version)]
struct Cli {
    /// Default log level (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the configuration space of a workflow as JSON
    Space {
        /// Registry name of the workflow
        #[arg(short = 'w', long)]
        workflow: String,
    },
    /// Sample configurations and store experiment rows
    Create(CampaignArgs),
    /// Run the pending rows of an experiment
    Run(CampaignArgs),
}

/// Campaign settings: a TOML file and/or flags overriding it
#[derive(Args)]
struct CampaignArgs {
    /// Campaign configuration file
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Parquet dataset file
    #[arg(short = 'd', long)]
    dataset: Option<PathBuf>,

    /// Target column of the dataset
    #[arg(short = 't', long)]
    target: Option<String>,

    /// Registry name of the workflow
    #[arg(short = 'w', long)]
    workflow: Option<String>,

    /// Number of configurations, the default one included
    #[arg(short = 'n', long)]
    num_configs: Option<usize>,

    /// Fit budget in seconds
    #[arg(long)]
    timeout_on_fit: Option<f64>,

    /// Output directory
    #[arg(short = 'o', long)]
    output_dir: Option<PathBuf>,

    /// Run rows in parallel
    #[arg(long)]
    parallel: bool,
}

impl CampaignArgs {
    fn resolve(&self) -> anyhow::Result<LcdbConfig> {
        let mut config = match &self.config {
            Some(path) => LcdbConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => {
                let dataset = self
                    .dataset
                    .clone()
                    .context("--dataset is required without --config")?;
                let workflow = self
                    .workflow
                    .clone()
                    .context("--workflow is required without --config")?;
                LcdbConfig::new(dataset, workflow)
            }
        };

        if let Some(dataset) = &self.dataset {
            config.dataset.clone_from(dataset);
        }
        if let Some(target) = &self.target {
            config.target.clone_from(target);
        }
        if let Some(workflow) = &self.workflow {
            config.workflow.clone_from(workflow);
        }
        if let Some(num_configs) = self.num_configs {
            config.num_configs = num_configs;
        }
        if let Some(timeout) = self.timeout_on_fit {
            config.timeout_on_fit = Some(timeout);
        }
        if let Some(output_dir) = &self.output_dir {
            config.output_dir.clone_from(output_dir);
        }
        config.parallel |= self.parallel;

        config.validate()?;
        Ok(config)
    }
}

fn space(registry: &WorkflowRegistry, workflow: &str) -> anyhow::Result<()> {
    let space = registry.config_space(workflow)?;
    println!("{}", serde_json::to_string_pretty(&space)?);
    Ok(())
}

fn create(registry: &WorkflowRegistry, config: &LcdbConfig) -> anyhow::Result<()> {
    let dataset = load_dataset_parquet(&config.dataset, &config.target)
        .with_context(|| format!("failed to load dataset {}", config.dataset.display()))?;
    let plan = config.plan(dataset.num_instances());
    let rows = create_experiments(registry, &plan)?;

    std::fs::create_dir_all(&config.output_dir)?;
    let store_path = config.store_path();
    let mut store = ExperimentStore::open(&store_path)?;
    let total = rows.len();
    store.add_experiment(ExperimentRecord::new(plan.clone(), total));
    let added = store.add_rows(rows);
    store.save_json(&store_path)?;

    info!(
        experiment = %plan.experiment_id,
        added,
        skipped = total - added,
        store = %store_path.display(),
        "experiment rows created"
    );
    Ok(())
}

fn run(registry: &WorkflowRegistry, config: &LcdbConfig) -> anyhow::Result<()> {
    let store_path = config.store_path();
    let mut store = ExperimentStore::load_json(&store_path)
        .with_context(|| format!("no experiment store at {}, run `create` first", store_path.display()))?;

    let experiment_id = config.experiment_id();
    let pending: Vec<_> = store
        .pending_rows()
        .into_iter()
        .filter(|row| row.experiment_id == experiment_id)
        .cloned()
        .collect();
    if pending.is_empty() {
        info!(experiment = %experiment_id, "no pending rows");
        return Ok(());
    }

    let dataset = load_dataset_parquet(&config.dataset, &config.target)
        .with_context(|| format!("failed to load dataset {}", config.dataset.display()))?;
    info!(
        experiment = %experiment_id,
        rows = pending.len(),
        parallel = config.parallel,
        "running rows"
    );

    let runner = Runner::new(registry, &dataset).with_reports_dir(config.reports_dir());
    let outcomes = runner.run_rows(&pending, config.parallel);
    let points = record_outcomes(&mut store, outcomes);
    store.save_json(&store_path)?;

    let curves_path = config.curves_path();
    let mut curves = if curves_path.exists() {
        CurveStore::load_parquet(&curves_path)?
    } else {
        CurveStore::new()
    };
    curves.append_points(&points)?;
    curves.write_parquet(&curves_path)?;

    info!(
        points = points.len(),
        curves = %curves_path.display(),
        "curves written"
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let registry = WorkflowRegistry::with_builtins();
    match cli.command {
        Command::Space { workflow } => space(&registry, &workflow),
        Command::Create(args) => create(&registry, &args.resolve()?),
        Command::Run(args) => run(&registry, &args.resolve()?),
    }
}
