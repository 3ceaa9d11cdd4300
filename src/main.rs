/// Version injected at compile time via CLOUD_REAPER_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("CLOUD_REAPER_VERSION") {
    Some(v) => v,
    None => "dev",
};

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use cloud_reaper::aws::credentials::{token_from_env, TOKEN_ENV};
use cloud_reaper::aws::{format_api_error, gateway_factory, ClientRegistry};
use cloud_reaper::config::{parse_resources, Config};
use cloud_reaper::error::{ReaperError, ValidationError};
use cloud_reaper::pool::{ShutdownOutcome, WorkerPool};
use cloud_reaper::reconcile::Orchestrator;
use cloud_reaper::resource::{ResourceFactory, UsageEvaluator};
use cloud_reaper::terminate::{
    build_interceptors, DetailLevel, SenderSettings, TerminationPipeline,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Reconcile and retire cloud resources, dry-run by default
#[derive(Parser, Debug)]
#[command(name = "cloud-reaper", version = VERSION, about, long_about = None)]
struct Args {
    /// Named config file, layered over the default one
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Region to operate in
    #[arg(short, long, global = true)]
    region: Option<String>,

    /// Role to assume for every call
    #[arg(long, global = true)]
    assume_role_arn: Option<String>,

    /// Gateway endpoint, `{region}` is substituted per client
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Worker pool size
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Log to stderr instead of the log file
    #[arg(long, global = true)]
    log_stderr: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Delete unused resources (dry run unless --apply)
    Terminate(TerminateArgs),
    /// Compare resources of one kind between two regions or accounts
    Reconcile(ReconcileArgs),
    /// List every resource name of a kind
    ///
    /// An aborted listing exits with code 1: unlike terminate and reconcile
    /// there is no partial result to report.
    List(KindArgs),
    /// Show usage signals for named resources
    Usage(UsageArgs),
}

#[derive(ClapArgs, Debug)]
struct KindArgs {
    /// Resource kind (queue, topic, function, table, alarm, role, policy, stream)
    #[arg(short, long)]
    kind: Option<String>,
}

#[derive(ClapArgs, Debug)]
struct TerminateArgs {
    #[command(flatten)]
    kind: KindArgs,

    /// `;`-separated names, `+` for a space inside a name
    #[arg(long)]
    resources: Option<String>,

    /// Ticket or reason recorded with the run
    #[arg(short, long)]
    description: Option<String>,

    /// Actually delete
    #[arg(long)]
    apply: bool,

    /// Delete even when recently used
    #[arg(long)]
    force: bool,

    /// Usage window in days
    #[arg(long)]
    window_days: Option<u32>,

    /// Append JSON-lines audit entries to this file
    #[arg(long)]
    audit_log: Option<PathBuf>,

    /// Detail of the log sender
    #[arg(long, default_value = "detailed")]
    detail: String,
}

#[derive(ClapArgs, Debug)]
struct ReconcileArgs {
    #[command(flatten)]
    kind: KindArgs,

    #[arg(long)]
    source_region: Option<String>,

    #[arg(long)]
    target_region: Option<String>,

    #[arg(long)]
    source_role_arn: Option<String>,

    #[arg(long)]
    target_role_arn: Option<String>,

    /// Comparison fields to keep, comma-separated
    #[arg(long, value_delimiter = ',')]
    compare_fields: Option<Vec<String>>,

    #[arg(long)]
    poll_interval_ms: Option<u64>,
}

#[derive(ClapArgs, Debug)]
struct UsageArgs {
    #[command(flatten)]
    kind: KindArgs,

    #[arg(long)]
    resources: Option<String>,

    #[arg(long)]
    window_days: Option<u32>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(
    level: LogLevel,
    to_stderr: bool,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    let log_path = get_log_path();
    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = if to_stderr {
        None
    } else {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .ok()
    };

    let (non_blocking, guard) = match file {
        Some(file) => tracing_appender::non_blocking(file),
        None => tracing_appender::non_blocking(std::io::stderr()),
    };

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("cloud-reaper {} started with log level: {:?}", VERSION, level);
    if !to_stderr {
        tracing::info!("Log file: {:?}", log_path);
    }

    Some(guard)
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("cloud-reaper").join("cloud-reaper.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".cloud-reaper").join("cloud-reaper.log");
    }
    PathBuf::from("cloud-reaper.log")
}

impl Args {
    /// Command-line layer of the configuration
    fn config_layer(&self) -> Config {
        let mut layer = Config {
            region: self.region.clone(),
            assume_role_arn: self.assume_role_arn.clone(),
            endpoint: self.endpoint.clone(),
            workers: self.workers,
            ..Config::default()
        };
        match &self.command {
            Command::Terminate(args) => {
                layer.kind = args.kind.kind.clone();
                layer.resources = args.resources.clone();
                layer.description = args.description.clone();
                layer.apply = args.apply.then_some(true);
                layer.force = args.force.then_some(true);
                layer.last_usage_window_days = args.window_days;
                layer.audit_log = args.audit_log.clone();
            }
            Command::Reconcile(args) => {
                layer.kind = args.kind.kind.clone();
                layer.source_region = args.source_region.clone();
                layer.target_region = args.target_region.clone();
                layer.source_role_arn = args.source_role_arn.clone();
                layer.target_role_arn = args.target_role_arn.clone();
                layer.compare_fields = args.compare_fields.clone();
                layer.poll_interval_ms = args.poll_interval_ms;
            }
            Command::List(args) => {
                layer.kind = args.kind.clone();
            }
            Command::Usage(args) => {
                layer.kind = args.kind.kind.clone();
                layer.resources = args.resources.clone();
                layer.last_usage_window_days = args.window_days;
            }
        }
        layer
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let _log_guard = setup_logging(args.log_level, args.log_stderr);

    match run(&args).await {
        Ok(code) => code,
        Err(err) => {
            match err.downcast_ref::<ReaperError>() {
                Some(ReaperError::Api(api)) => eprintln!("Error: {}", format_api_error(api)),
                _ => eprintln!("Error: {err:#}"),
            }
            tracing::error!("{:#}", err);
            ExitCode::from(if is_fatal(&err) { 2 } else { 1 })
        }
    }
}

fn is_fatal(err: &anyhow::Error) -> bool {
    err.downcast_ref::<ReaperError>()
        .is_some_and(ReaperError::is_fatal)
}

async fn run(args: &Args) -> Result<ExitCode> {
    let config = args
        .config_layer()
        .merge(Config::load(args.config.as_deref())?);
    tracing::debug!("Effective config: {:?}", config);

    match &args.command {
        Command::Terminate(cmd) => {
            // Validate before any client is built
            let request = config.termination_request()?;
            let factory = build_factory(&config)?;
            let interceptors = build_interceptors(&SenderSettings {
                log_detail: DetailLevel::from_str(&cmd.detail),
                audit_log: config.audit_log.clone(),
                summary: true,
            });
            let pipeline = TerminationPipeline::new(factory, Arc::new(interceptors));
            pipeline.run(&request).await?;
        }
        Command::Reconcile(_) => {
            let request = config.reconcile_request()?;
            let factory = build_factory(&config)?;
            let pool = Arc::new(WorkerPool::new(config.workers(), config.queue_capacity()));
            let orchestrator = Orchestrator::new(factory, Arc::clone(&pool));

            let result = orchestrator.run(&request).await;
            if pool.shutdown(config.shutdown_grace()).await == ShutdownOutcome::Forced {
                eprintln!("Warning: some comparisons were cancelled");
            }

            let report = result?;
            println!("{}", report.summary());
            for line in report.lines() {
                println!("  {line}");
            }
        }
        Command::List(_) => {
            let kind = config.resource_kind()?;
            let ctx = config.fetch_context().map_err(ReaperError::from)?;
            let handler = build_factory(&config)?.get(kind)?;
            let names = handler
                .list_names(&ctx)
                .await
                .map_err(ReaperError::from)
                .with_context(|| format!("Listing {kind} in {ctx} failed"))?;
            for name in names {
                println!("{name}");
            }
        }
        Command::Usage(_) => {
            let kind = config.resource_kind()?;
            let ctx = config.fetch_context().map_err(ReaperError::from)?;
            let names = parse_resources(config.resources.as_deref().unwrap_or_default());
            if names.is_empty() {
                return Err(ReaperError::from(ValidationError::Missing("resources")).into());
            }
            let window_days = config.window_days().map_err(ReaperError::from)?;
            let evaluator = UsageEvaluator::new(window_days);
            let handler = build_factory(&config)?.get(kind)?;

            for name in names {
                match handler.usage(&ctx, &name, window_days).await {
                    Ok(usage) => {
                        let state = if evaluator.was_used(&usage) { "in use" } else { "idle" };
                        println!("{name}: {usage} ({state})");
                    }
                    Err(e) => println!("{name}: {}", format_api_error(&e)),
                }
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn build_factory(config: &Config) -> Result<ResourceFactory> {
    let endpoint = config.endpoint().map_err(ReaperError::from)?;
    let token = token_from_env().ok_or(ReaperError::Validation(ValidationError::Missing(TOKEN_ENV)))?;
    let clients = ClientRegistry::new(endpoint, &token).map_err(ReaperError::from)?;
    Ok(gateway_factory(Arc::new(clients)))
}
