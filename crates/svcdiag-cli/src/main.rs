mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;

use svcdiag_core::app::{BundleBuilder, CassandraBundle, KafkaChecks, TechBundle};
use svcdiag_core::config::{BundleConfig, ClusterConfig, KafkaConfig};
use svcdiag_core::impls::{CliCommandRunner, CliTaskDirectory, HttpAgentFiles, LocalBundleStore};
use svcdiag_core::ports::{Clock, CommandRunner, SystemClock};

use crate::logging::{LoggerConfig, LoggerFormat, logger_init};

/// Collect diagnostics bundles from cluster services and run service checks.
#[derive(Debug, Parser)]
#[command(name = "svcdiag", version)]
struct Cli {
    /// Cluster CLI binary.
    #[arg(long = "cli", env = "SVCDIAG_CLI", default_value = "dcos", global = true)]
    cli_program: String,

    /// Cluster base URL, used for agent file downloads.
    #[arg(long, env = "SVCDIAG_CLUSTER_URL", global = true)]
    cluster_url: Option<String>,

    #[arg(long, env = "SVCDIAG_AUTH_TOKEN", hide_env_values = true, global = true)]
    auth_token: Option<String>,

    #[arg(long, default_value_t = 120, global = true)]
    command_timeout_secs: u64,

    #[arg(long, default_value = "text", global = true)]
    log_format: LoggerFormat,

    /// Filter directives, e.g. `info` or `svcdiag_core=debug`.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a diagnostics bundle for one service.
    Bundle(BundleArgs),
    /// Kafka service checks.
    Kafka(KafkaArgs),
}

#[derive(Debug, Args)]
struct BundleArgs {
    #[arg(long)]
    package: String,
    #[arg(long)]
    service: String,
    /// Bundle directory; created if missing.
    #[arg(long)]
    output: PathBuf,
    /// Assume the package CLI subcommand is already installed.
    #[arg(long)]
    skip_cli_install: bool,
    /// Technology bundles to add.
    #[arg(long = "tech", value_enum)]
    tech: Vec<Tech>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Tech {
    Cassandra,
}

impl Tech {
    fn bundle(self) -> Box<dyn TechBundle> {
        match self {
            Tech::Cassandra => Box::new(CassandraBundle),
        }
    }
}

#[derive(Debug, Args)]
struct KafkaArgs {
    #[arg(long)]
    package: String,
    #[arg(long)]
    service: String,
    #[arg(long, default_value_t = 3)]
    broker_count: usize,
    #[arg(long, default_value = "kafka")]
    pod_type: String,
    #[command(subcommand)]
    check: KafkaCheck,
}

#[derive(Debug, Subcommand)]
enum KafkaCheck {
    /// Wait until `broker list` reports the expected number of brokers.
    BrokerCount {
        #[arg(long)]
        expected: usize,
    },
    /// Restart every broker pod in turn.
    RestartBrokers,
    /// Replace the first broker pod.
    ReplaceBroker,
    /// Wait until a topic can be described.
    WaitTopic {
        #[arg(long)]
        topic: String,
    },
}

impl Cli {
    fn cluster_config(&self) -> ClusterConfig {
        ClusterConfig {
            cli_program: self.cli_program.clone(),
            cluster_url: self.cluster_url.clone(),
            auth_token: self.auth_token.clone(),
            command_timeout: Duration::from_secs(self.command_timeout_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logger_init(&LoggerConfig {
        format: cli.log_format,
        level: cli.log_level.clone(),
        ..LoggerConfig::default()
    })?;

    let cluster = cli.cluster_config();
    let runner: Arc<dyn CommandRunner> = Arc::new(CliCommandRunner::new(
        &cluster.cli_program,
        cluster.command_timeout,
    ));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match cli.command {
        Command::Bundle(args) => run_bundle(&cluster, runner, clock, args).await,
        Command::Kafka(args) => run_kafka(runner, clock, args).await,
    }
}

async fn run_bundle(
    cluster: &ClusterConfig,
    runner: Arc<dyn CommandRunner>,
    clock: Arc<dyn Clock>,
    args: BundleArgs,
) -> anyhow::Result<()> {
    let Some(cluster_url) = cluster.cluster_url.as_deref() else {
        bail!("--cluster-url (or SVCDIAG_CLUSTER_URL) is required to download task logs");
    };
    let agents =
        HttpAgentFiles::new(cluster_url, cluster.auth_token.clone(), cluster.command_timeout)
            .context("agent file client")?;

    let mut config = BundleConfig::new(&args.package, &args.service);
    config.install_cli = !args.skip_cli_install;

    let mut builder = BundleBuilder::new(config)
        .runner(runner.clone())
        .task_directory(Arc::new(CliTaskDirectory::new(runner)))
        .agent_files(Arc::new(agents))
        .store(Arc::new(LocalBundleStore::new(&args.output)))
        .clock(clock);
    for tech in &args.tech {
        builder = builder.tech(tech.bundle());
    }
    let bundle = builder.build()?;

    let report = bundle.create().await;
    info!(output = %args.output.display(), "bundle written");
    println!(
        "bundle {} for {}/{}: {} written, {} with problems -> {}",
        report.run_id,
        report.package_name,
        report.service_name,
        report.written_count(),
        report.problem_count(),
        args.output.display()
    );
    Ok(())
}

async fn run_kafka(
    runner: Arc<dyn CommandRunner>,
    clock: Arc<dyn Clock>,
    args: KafkaArgs,
) -> anyhow::Result<()> {
    let config = KafkaConfig {
        broker_count: args.broker_count,
        pod_type: args.pod_type.clone(),
        ..KafkaConfig::new(&args.package, &args.service)
    };
    let directory = Arc::new(CliTaskDirectory::new(runner.clone()));
    let checks = KafkaChecks::new(config, runner, directory, clock)?;

    match args.check {
        KafkaCheck::BrokerCount { expected } => {
            checks.broker_count_check(expected).await?;
            println!("{expected} brokers reported");
        }
        KafkaCheck::RestartBrokers => {
            checks.restart_broker_pods().await?;
            println!("restarted {} broker pods", args.broker_count);
        }
        KafkaCheck::ReplaceBroker => {
            checks.replace_broker_pod().await?;
            println!("replaced {}-0", args.pod_type);
        }
        KafkaCheck::WaitTopic { topic } => {
            checks.wait_for_topic(&topic).await?;
            println!("topic {topic} is available");
        }
    }
    Ok(())
}
