//! CLI command definitions for domain-forge.
//!
//! Local runs (`run`, `parse`, `aggregate`) work on a single machine. The
//! cluster commands (`dispatch`, `worker`, `workers`, `inventory`, `webhook`)
//! drive the Redis queue and the node control plane.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing::{debug, info, warn};

use crate::alerts::{AlertDispatcher, ClusterActions};
use crate::cluster::{
    inventory::host_vars_response, local_node_name, ClusterConfig, ClusterNodes, DynamicInventory,
    Inventory, RedisWorkerRegistry, WorkerAction, WorkerRegistry,
};
use crate::pipeline::{BatchRunner, PipelineConfig, StructureRunner};
use crate::results::{parse_to_summary, run_aggregation, Organism, MEANS_FILE_NAME};
use crate::scheduler::{dispatch, JobQueue, WorkerPool, WorkerPoolConfig};

/// Protein domain search pipeline and cluster control.
#[derive(Parser)]
#[command(name = "domain-forge")]
#[command(about = "Run protein domain searches over PDB structures and manage the worker cluster")]
#[command(version)]
#[command(
    long_about = "domain-forge runs the domain-search tool over PDB structures, parses its hits into per-structure CATH summaries, and aggregates them per organism.\n\nExample usage:\n  domain-forge run ./structures ./results human\n  domain-forge dispatch ./structures /mnt/results/human\n  domain-forge worker --workers 4"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the pipeline over a structure or directory, then aggregate.
    Run(RunArgs),

    /// Parse one search result file into a `.parsed` summary.
    Parse(ParseArgs),

    /// Aggregate `.parsed` summaries for an organism.
    #[command(alias = "agg")]
    Aggregate(AggregateArgs),

    /// Enqueue one job per structure for the worker pool.
    Dispatch(DispatchArgs),

    /// Run a worker pool consuming the job queue.
    Worker(WorkerArgs),

    /// Disable or enable a worker node.
    Workers(WorkersArgs),

    /// Generate the Ansible inventory from Terraform outputs or explicit IPs.
    Inventory(InventoryArgs),

    /// Serve the Alertmanager webhook.
    Webhook(WebhookArgs),
}

/// Arguments for `domain-forge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// A `.pdb` file or a directory of `.pdb` files.
    pub input: PathBuf,

    /// Directory receiving search outputs, summaries, and aggregates.
    pub output_dir: PathBuf,

    /// Organism label for the aggregate files (e.g. human, ecoli).
    pub organism: String,

    /// Shared per-organism means file [default: <OUTPUT_DIR>/plDDT_means.csv].
    #[arg(long)]
    pub means_file: Option<PathBuf>,

    /// Keep per-structure scratch directories.
    #[arg(long)]
    pub keep_tmp: bool,

    /// Worker threads passed to the search tool.
    #[arg(short = 't', long)]
    pub threads: Option<u32>,
}

/// Arguments for `domain-forge parse`.
#[derive(Parser, Debug)]
pub struct ParseArgs {
    /// Directory receiving the `.parsed` file.
    pub output_dir: PathBuf,

    /// `<id>_search.tsv` file to parse.
    pub search_file: PathBuf,
}

/// Arguments for `domain-forge aggregate`.
#[derive(Parser, Debug)]
pub struct AggregateArgs {
    /// Directory holding `.parsed` files.
    pub output_dir: PathBuf,

    /// Organism label for the aggregate files.
    pub organism: String,

    /// Shared per-organism means file [default: <OUTPUT_DIR>/plDDT_means.csv].
    #[arg(long)]
    pub means_file: Option<PathBuf>,
}

/// Redis connection options shared by the cluster commands.
#[derive(clap::Args, Debug)]
pub struct RedisArgs {
    /// Redis connection URL.
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Job queue name.
    #[arg(long, env = "QUEUE_NAME")]
    pub queue: Option<String>,
}

/// Arguments for `domain-forge dispatch`.
#[derive(Parser, Debug)]
pub struct DispatchArgs {
    /// A `.pdb` file or a directory of `.pdb` files, on shared storage.
    pub input: PathBuf,

    /// Directory workers write results into, on shared storage.
    pub results_dir: PathBuf,

    #[command(flatten)]
    pub redis: RedisArgs,
}

/// Arguments for `domain-forge worker`.
#[derive(Parser, Debug)]
pub struct WorkerArgs {
    /// Number of concurrent workers on this node.
    #[arg(short = 'w', long, default_value = "1")]
    pub workers: usize,

    /// Name of this node in the disabled-worker set [default: host name].
    ///
    /// Alerts disable workers by their inventory name (`worker1`, `worker2`,
    /// ...), so set this to the node's inventory name unless the host names
    /// already match.
    #[arg(long, env = "NODE_NAME")]
    pub node_name: Option<String>,

    /// Maximum time for one structure, in seconds.
    #[arg(long, default_value = "3600")]
    pub job_timeout: u64,

    #[command(flatten)]
    pub redis: RedisArgs,
}

/// Arguments for `domain-forge workers`.
#[derive(Parser, Debug)]
pub struct WorkersArgs {
    /// Worker node name (e.g. worker1).
    pub name: String,

    /// `disable` or `enable`.
    pub action: String,

    /// Redis connection URL.
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,
}

/// Inventory output shape.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InventoryFormat {
    /// Static inventory grouped into mgmtnode, workers, and storagegroup.
    #[default]
    Grouped,
    /// Ansible dynamic inventory JSON.
    Dynamic,
}

/// Arguments for `domain-forge inventory`.
#[derive(Parser, Debug)]
pub struct InventoryArgs {
    /// Print the dynamic inventory (Ansible `--list` protocol).
    #[arg(long, conflicts_with = "host")]
    pub list: bool,

    /// Print variables for one host (Ansible `--host` protocol).
    #[arg(long)]
    pub host: Option<String>,

    /// Output shape when neither --list nor --host is given.
    #[arg(long, value_enum, default_value_t = InventoryFormat::Grouped)]
    pub format: InventoryFormat,

    /// Directory to run `terraform output -json` in.
    #[arg(long)]
    pub terraform_dir: Option<PathBuf>,

    /// Management node IP; skips Terraform when given.
    #[arg(long)]
    pub mgmt: Option<String>,

    /// Worker node IP (repeatable).
    #[arg(long = "worker")]
    pub workers: Vec<String>,

    /// Storage node IP (repeatable).
    #[arg(long = "storage")]
    pub storage: Vec<String>,

    /// File the grouped inventory is written to.
    #[arg(short = 'o', long, env = "INVENTORY_PATH")]
    pub output: Option<PathBuf>,
}

/// Arguments for `domain-forge webhook`.
#[derive(Parser, Debug)]
pub struct WebhookArgs {
    /// Address to listen on.
    #[arg(long, env = "WEBHOOK_BIND")]
    pub bind: Option<SocketAddr>,

    /// Inventory used to run playbooks and resolve worker names.
    #[arg(long, env = "INVENTORY_PATH")]
    pub inventory: Option<PathBuf>,

    /// Disk cleanup playbook.
    #[arg(long, env = "CLEANUP_PLAYBOOK")]
    pub playbook: Option<PathBuf>,

    /// Lock file serializing alert processing.
    #[arg(long, env = "WEBHOOK_LOCK_FILE")]
    pub lock_file: Option<PathBuf>,

    /// Redis connection URL.
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,
}

/// Parse CLI arguments and return the Cli struct.
///
/// Useful when you need to access CLI options (like log_level) before running.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_pipeline_command(args).await,
        Commands::Parse(args) => run_parse_command(args),
        Commands::Aggregate(args) => run_aggregate_command(args),
        Commands::Dispatch(args) => run_dispatch_command(args).await,
        Commands::Worker(args) => run_worker_command(args).await,
        Commands::Workers(args) => run_workers_command(args).await,
        Commands::Inventory(args) => run_inventory_command(args).await,
        Commands::Webhook(args) => run_webhook_command(args).await,
    }
}

fn means_path(output_dir: &Path, means_file: Option<PathBuf>) -> PathBuf {
    means_file.unwrap_or_else(|| output_dir.join(MEANS_FILE_NAME))
}

/// Loads cluster settings from the environment and applies Redis overrides.
fn cluster_config(redis_url: Option<String>, queue: Option<String>) -> anyhow::Result<ClusterConfig> {
    let mut config = ClusterConfig::from_env().context("Invalid cluster configuration")?;
    if let Some(url) = redis_url {
        config.redis_url = url;
    }
    if let Some(queue) = queue {
        config.queue_name = queue;
    }
    config.validate()?;
    Ok(config)
}

// ============================================================================
// Local pipeline
// ============================================================================

async fn run_pipeline_command(args: RunArgs) -> anyhow::Result<()> {
    let organism: Organism = args.organism.parse()?;
    let mut config = PipelineConfig::from_env()
        .context("Invalid pipeline configuration")?
        .with_keep_tmp(args.keep_tmp);
    if let Some(threads) = args.threads {
        config = config.with_threads(threads);
    }
    config.validate()?;

    let means = means_path(&args.output_dir, args.means_file);
    let batch = BatchRunner::new(StructureRunner::new(config));
    let report = batch
        .run(&args.input, &args.output_dir, &organism, &means)
        .await?;

    println!("✓ Pipeline completed in {:.1}s", report.duration.as_secs_f64());
    println!("  Structures:  {}", report.total());
    println!("  Parsed:      {}", report.parsed);
    println!("  Empty:       {}", report.empty);
    println!("  No results:  {}", report.no_results);
    println!("  Failed:      {}", report.failed.len());
    for (path, reason) in &report.failed {
        println!("    {}: {}", path.display(), reason);
    }
    println!("  Summary:     {}", report.aggregate.summary_path.display());
    println!(
        "  Mean plDDT:  {:.4} (std {:.4}, n={})",
        report.aggregate.stats.mean, report.aggregate.stats.std_dev, report.aggregate.stats.count
    );
    Ok(())
}

fn run_parse_command(args: ParseArgs) -> anyhow::Result<()> {
    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Failed to create {}", args.output_dir.display()))?;
    let report = parse_to_summary(&args.search_file, &args.output_dir)?;

    match &report.parsed_path {
        Some(path) => println!(
            "✓ {} rows parsed into {} ({} skipped)",
            report.rows_valid,
            path.display(),
            report.rows_skipped
        ),
        None => println!(
            "No valid rows in {} ({} skipped); no summary written",
            args.search_file.display(),
            report.rows_skipped
        ),
    }
    Ok(())
}

fn run_aggregate_command(args: AggregateArgs) -> anyhow::Result<()> {
    let organism: Organism = args.organism.parse()?;
    let means = means_path(&args.output_dir, args.means_file);
    let report = run_aggregation(&args.output_dir, &organism, &means)?;

    println!("✓ Aggregated {} summaries for {}", report.files_read, organism.display_name());
    if report.files_skipped > 0 {
        println!("  Skipped:     {}", report.files_skipped);
    }
    println!("  Categories:  {}", report.categories);
    println!("  Summary:     {}", report.summary_path.display());
    println!("  Means:       {}", report.means_path.display());
    Ok(())
}

// ============================================================================
// Cluster commands
// ============================================================================

async fn run_dispatch_command(args: DispatchArgs) -> anyhow::Result<()> {
    let config = cluster_config(args.redis.redis_url, args.redis.queue)?;
    let queue = JobQueue::connect(&config.redis_url, &config.queue_name).await?;

    let jobs = dispatch(&queue, &args.input, &args.results_dir).await?;
    for job in &jobs {
        println!("{} {}", job.id, job.task.pdb_path.display());
    }
    println!("✓ {} jobs dispatched to '{}'", jobs.len(), config.queue_name);
    Ok(())
}

async fn run_worker_command(args: WorkerArgs) -> anyhow::Result<()> {
    let config = cluster_config(args.redis.redis_url, args.redis.queue)?;
    let pipeline = PipelineConfig::from_env().context("Invalid pipeline configuration")?;
    let node_name = args.node_name.unwrap_or_else(local_node_name);
    match Inventory::load(&config.inventory_path) {
        Ok(inventory) if !inventory.has_worker(&node_name) => warn!(
            node = %node_name,
            inventory = %config.inventory_path.display(),
            "Node name is not a worker in the inventory; alerts will not pause this node, set --node-name"
        ),
        Ok(_) => {}
        Err(e) => debug!(error = %e, "Inventory unavailable, node name not checked"),
    }

    let registry: Arc<dyn WorkerRegistry> = Arc::new(
        RedisWorkerRegistry::connect(&config.redis_url, &config.disabled_workers_key).await?,
    );
    let runner = Arc::new(StructureRunner::new(pipeline));

    let pool_config = WorkerPoolConfig::new(args.workers)
        .with_redis_url(&config.redis_url)
        .with_queue_name(&config.queue_name)
        .with_node_name(node_name)
        .with_job_timeout(Duration::from_secs(args.job_timeout));

    let mut pool = WorkerPool::new(pool_config, runner, registry).await?;
    pool.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Shutdown signal received");

    pool.shutdown().await?;
    let stats = pool.stats();
    println!(
        "✓ Worker pool stopped: {} completed, {} failed",
        stats.jobs_completed, stats.jobs_failed
    );
    Ok(())
}

async fn run_workers_command(args: WorkersArgs) -> anyhow::Result<()> {
    let action: WorkerAction = args.action.parse()?;
    let config = cluster_config(args.redis_url, None)?;

    let registry =
        RedisWorkerRegistry::connect(&config.redis_url, &config.disabled_workers_key).await?;
    registry.apply(&args.name, action).await?;

    println!("✓ Worker {} {}d", args.name, action);
    let disabled = registry.disabled().await?;
    if disabled.is_empty() {
        println!("  No workers disabled");
    } else {
        println!("  Disabled: {}", disabled.join(", "));
    }
    Ok(())
}

async fn run_inventory_command(args: InventoryArgs) -> anyhow::Result<()> {
    if args.host.is_some() {
        println!("{}", host_vars_response());
        return Ok(());
    }

    let nodes = if args.mgmt.is_some() || !args.workers.is_empty() {
        ClusterNodes::new(args.mgmt, args.workers, args.storage)?
    } else {
        ClusterNodes::from_terraform(args.terraform_dir.as_deref()).await?
    };

    if args.list || args.format == InventoryFormat::Dynamic {
        println!("{}", DynamicInventory::from_nodes(&nodes).to_pretty_json()?);
        return Ok(());
    }

    let output = match args.output {
        Some(path) => path,
        None => ClusterConfig::from_env()?.inventory_path,
    };
    let inventory = Inventory::grouped(&nodes)?;
    inventory.save(&output)?;

    println!("{}", inventory.to_pretty_json()?);
    Ok(())
}

async fn run_webhook_command(args: WebhookArgs) -> anyhow::Result<()> {
    let mut config = cluster_config(args.redis_url, None)?;
    if let Some(bind) = args.bind {
        config.webhook_bind = bind;
    }
    if let Some(path) = args.inventory {
        config.inventory_path = path;
    }
    if let Some(path) = args.playbook {
        config.cleanup_playbook = path;
    }
    if let Some(path) = args.lock_file {
        config.lock_file = path;
    }

    let registry: Arc<dyn WorkerRegistry> = Arc::new(
        RedisWorkerRegistry::connect(&config.redis_url, &config.disabled_workers_key).await?,
    );
    if !config.cleanup_playbook.exists() {
        warn!(playbook = %config.cleanup_playbook.display(), "Cleanup playbook not found");
    }

    let actions = Arc::new(ClusterActions::new(
        &config.inventory_path,
        &config.cleanup_playbook,
        registry,
    ));
    let dispatcher = AlertDispatcher::new(actions)
        .with_inventory_file(&config.inventory_path)
        .with_lock_file(&config.lock_file);

    crate::alerts::serve(config.webhook_bind, Arc::new(dispatcher)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_command_defaults() {
        let cli = Cli::try_parse_from(["domain-forge", "run", "./in", "./out", "human"])
            .expect("should parse");

        assert_eq!(cli.log_level, "info");
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.input, PathBuf::from("./in"));
                assert_eq!(args.output_dir, PathBuf::from("./out"));
                assert_eq!(args.organism, "human");
                assert!(args.means_file.is_none());
                assert!(!args.keep_tmp);
                assert!(args.threads.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_command_requires_organism() {
        assert!(Cli::try_parse_from(["domain-forge", "run", "./in", "./out"]).is_err());
    }

    #[test]
    fn test_global_log_level() {
        let cli = Cli::try_parse_from([
            "domain-forge",
            "aggregate",
            "./out",
            "ecoli",
            "--log-level",
            "debug",
            "--means-file",
            "/shared/plDDT_means.csv",
        ])
        .expect("should parse");

        assert_eq!(cli.log_level, "debug");
        match cli.command {
            Commands::Aggregate(args) => {
                assert_eq!(args.organism, "ecoli");
                assert_eq!(args.means_file, Some(PathBuf::from("/shared/plDDT_means.csv")));
            }
            _ => panic!("Expected Aggregate command"),
        }
    }

    #[test]
    fn test_parse_command_argument_order() {
        let cli = Cli::try_parse_from(["domain-forge", "parse", "./out", "./out/x_search.tsv"])
            .expect("should parse");

        match cli.command {
            Commands::Parse(args) => {
                assert_eq!(args.output_dir, PathBuf::from("./out"));
                assert_eq!(args.search_file, PathBuf::from("./out/x_search.tsv"));
            }
            _ => panic!("Expected Parse command"),
        }
    }

    #[test]
    fn test_worker_command() {
        let cli = Cli::try_parse_from([
            "domain-forge",
            "worker",
            "--workers",
            "4",
            "--node-name",
            "worker2",
        ])
        .expect("should parse");

        match cli.command {
            Commands::Worker(args) => {
                assert_eq!(args.workers, 4);
                assert_eq!(args.node_name.as_deref(), Some("worker2"));
                assert_eq!(args.job_timeout, 3600);
            }
            _ => panic!("Expected Worker command"),
        }
    }

    #[test]
    fn test_workers_command_takes_raw_action() {
        let cli = Cli::try_parse_from(["domain-forge", "workers", "worker1", "restart"])
            .expect("action is validated when the command runs");

        match cli.command {
            Commands::Workers(args) => {
                assert_eq!(args.name, "worker1");
                assert!(args.action.parse::<WorkerAction>().is_err());
            }
            _ => panic!("Expected Workers command"),
        }
    }

    #[test]
    fn test_inventory_command_explicit_nodes() {
        let cli = Cli::try_parse_from([
            "domain-forge",
            "inventory",
            "--mgmt",
            "10.0.0.1",
            "--worker",
            "10.0.0.2",
            "--worker",
            "10.0.0.3",
            "--storage",
            "10.0.0.4",
            "--format",
            "dynamic",
        ])
        .expect("should parse");

        match cli.command {
            Commands::Inventory(args) => {
                assert_eq!(args.mgmt.as_deref(), Some("10.0.0.1"));
                assert_eq!(args.workers, vec!["10.0.0.2", "10.0.0.3"]);
                assert_eq!(args.storage, vec!["10.0.0.4"]);
                assert_eq!(args.format, InventoryFormat::Dynamic);
                assert!(!args.list);
            }
            _ => panic!("Expected Inventory command"),
        }
    }

    #[test]
    fn test_inventory_list_conflicts_with_host() {
        let result =
            Cli::try_parse_from(["domain-forge", "inventory", "--list", "--host", "worker1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_webhook_bind() {
        let cli = Cli::try_parse_from(["domain-forge", "webhook", "--bind", "127.0.0.1:9000"])
            .expect("should parse");

        match cli.command {
            Commands::Webhook(args) => {
                assert_eq!(args.bind, Some("127.0.0.1:9000".parse().unwrap()));
            }
            _ => panic!("Expected Webhook command"),
        }
    }

    #[test]
    fn test_means_path_default() {
        assert_eq!(
            means_path(Path::new("/out"), None),
            PathBuf::from("/out/plDDT_means.csv")
        );
        assert_eq!(
            means_path(Path::new("/out"), Some(PathBuf::from("/m.csv"))),
            PathBuf::from("/m.csv")
        );
    }

    #[tokio::test]
    async fn test_inventory_command_writes_grouped_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let output = temp.path().join("inventory.json");
        let cli = Cli::try_parse_from([
            "domain-forge",
            "inventory",
            "--mgmt",
            "10.0.0.1",
            "--worker",
            "10.0.0.2",
            "--storage",
            "10.0.0.4",
            "--output",
            output.to_str().unwrap(),
        ])
        .expect("should parse");

        run_with_cli(cli).await.unwrap();

        let inventory = Inventory::load(&output).unwrap();
        assert_eq!(inventory.worker_name_for("10.0.0.2"), Some("worker1"));
    }
}
