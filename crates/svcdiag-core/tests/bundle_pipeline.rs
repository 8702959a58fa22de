//! End-to-end bundle runs against in-memory adapters.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use svcdiag_core::app::{BundleBuilder, CassandraBundle, KafkaChecks, REPORT_FILE, ServiceBundle};
use svcdiag_core::config::{BundleConfig, KafkaConfig};
use svcdiag_core::domain::{
    AgentId, BundleReport, CommandOutput, CommandTarget, FrameworkId, OutcomeKind, ServiceRecord,
    Task, TaskId, TaskState,
};
use svcdiag_core::impls::{
    InMemoryAgentFiles, LocalBundleStore, MemoryBundleStore, ScriptedCommandRunner,
    StaticTaskDirectory,
};
use svcdiag_core::ports::{BundleStore, FixedClock};
use svcdiag_core::DiagError;

const FRAMEWORK: &str = "fw-1";

/// Formatted log output, shared with the subscriber under test.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn lines(&self) -> Vec<String> {
        let buf = self.0.lock().unwrap();
        String::from_utf8_lossy(&buf).lines().map(str::to_string).collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn service_target() -> CommandTarget {
    CommandTarget::service("kafka", "kafka")
}

fn pod_task(id: &str, name: &str, agent: &str) -> Task {
    Task {
        id: TaskId::parse(id).unwrap(),
        name: name.to_string(),
        agent_id: AgentId::parse(agent).unwrap(),
        state: TaskState::Running,
        framework_id: Some(FrameworkId::parse(FRAMEWORK).unwrap()),
        executor_id: format!("{name}__executor"),
    }
}

fn run_dir(agent: &str, executor: &str) -> String {
    format!(
        "/var/lib/mesos/slave/slaves/{agent}/frameworks/{FRAMEWORK}/executors/{executor}/runs/latest"
    )
}

fn healthy_runner() -> ScriptedCommandRunner {
    let runner = ScriptedCommandRunner::new();
    runner.respond(
        &CommandTarget::Cluster,
        "package install kafka --cli --yes",
        CommandOutput::ok("installed"),
    );
    runner.respond(
        &service_target(),
        "describe",
        CommandOutput::ok(r#"{"brokers": {"count": 3}}"#),
    );
    runner.respond(
        &service_target(),
        "pod status --json",
        CommandOutput::ok(r#"{"name": "kafka"}"#),
    );
    runner.respond(&service_target(), "plan list", CommandOutput::ok(r#"["deploy", "recovery"]"#));
    runner.respond(
        &service_target(),
        "plan status deploy --json",
        CommandOutput::ok(r#"{"status": "COMPLETE"}"#),
    );
    runner.respond(
        &service_target(),
        "plan status recovery --json",
        CommandOutput::ok(r#"{"status": "COMPLETE"}"#),
    );
    runner
}

/// T1 and T2 on host A, T3 on host B; host A only has T1's sandbox.
fn three_task_cluster() -> (StaticTaskDirectory, Arc<InMemoryAgentFiles>) {
    let t1 = pod_task("T1", "kafka-0-broker", "A");
    let t2 = pod_task("T2", "kafka-1-broker", "A");
    let t3 = pod_task("T3", "kafka-2-broker", "B");

    let agents = Arc::new(InMemoryAgentFiles::new());
    let a = AgentId::parse("A").unwrap();
    let b = AgentId::parse("B").unwrap();
    let t1_sandbox = format!("{}/tasks/T1", run_dir("A", "kafka-0-broker__executor"));
    let t3_sandbox = format!("{}/tasks/T3", run_dir("B", "kafka-2-broker__executor"));
    agents.add_executor_path(&a, &run_dir("A", "kafka-0-broker__executor"));
    agents.add_executor_path(&b, &run_dir("B", "kafka-2-broker__executor"));
    agents.add_file(&a, &format!("{t1_sandbox}/stdout"), b"t1 out".to_vec());
    agents.add_file(&a, &format!("{t1_sandbox}/stderr"), b"t1 err".to_vec());
    agents.add_file(&a, &format!("{t1_sandbox}/config.yaml"), b"ignored".to_vec());
    agents.add_file(&b, &format!("{t3_sandbox}/stdout.1"), b"t3 rotated".to_vec());

    let record = ServiceRecord {
        id: FrameworkId::parse(FRAMEWORK).unwrap(),
        name: "kafka".into(),
        active: true,
        tasks: vec![t1.clone(), t2, t3],
        completed_tasks: vec![],
    };
    let scheduler = Task {
        framework_id: None,
        executor_id: String::new(),
        ..pod_task("kafka.sched", "kafka", "A")
    };
    let directory =
        StaticTaskDirectory::sequence(vec![record]).with_scheduler_tasks(vec![scheduler, t1]);
    (directory, agents)
}

fn bundle(
    config: BundleConfig,
    runner: ScriptedCommandRunner,
    directory: StaticTaskDirectory,
    agents: Arc<InMemoryAgentFiles>,
    store: Arc<dyn BundleStore>,
) -> ServiceBundle {
    BundleBuilder::new(config)
        .runner(Arc::new(runner))
        .task_directory(Arc::new(directory))
        .agent_files(agents)
        .store(store)
        .clock(Arc::new(FixedClock::default()))
        .build()
        .unwrap()
}

#[tokio::test]
async fn tasks_without_a_sandbox_are_omitted_and_reported() {
    let (directory, agents) = three_task_cluster();
    let store = Arc::new(MemoryBundleStore::new());
    let bundle = bundle(
        BundleConfig::new("kafka", "kafka"),
        healthy_runner(),
        directory,
        agents.clone(),
        store.clone(),
    );

    let report = bundle.create().await;

    let task_files: Vec<String> = store
        .paths()
        .into_iter()
        .filter(|p| p.starts_with("tasks/"))
        .collect();
    assert_eq!(
        task_files,
        vec!["tasks/T1/stderr", "tasks/T1/stdout", "tasks/T3/stdout.1"]
    );
    assert_eq!(store.contents("tasks/T3/stdout.1").unwrap(), b"t3 rotated");

    let t2 = report.task("T2").unwrap();
    assert_eq!(t2.agent_id.as_str(), "A");
    assert!(t2.sandbox.is_none());

    // scheduler task and the duplicate T1 each appear once
    assert_eq!(report.tasks.len(), 4);
    assert_eq!(agents.path_queries(&AgentId::parse("A").unwrap()), 1);
    assert_eq!(agents.path_queries(&AgentId::parse("B").unwrap()), 1);
}

#[tokio::test]
async fn missing_sandbox_is_logged_as_a_warning() {
    let logs = CapturedLogs::default();
    let sink = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || sink.clone())
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .without_time()
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let (directory, agents) = three_task_cluster();
    let bundle = bundle(
        BundleConfig::new("kafka", "kafka"),
        healthy_runner(),
        directory,
        agents,
        Arc::new(MemoryBundleStore::new()),
    );
    bundle.create().await;

    let warnings: Vec<String> = logs
        .lines()
        .into_iter()
        .filter(|l| l.contains("WARN"))
        .collect();
    assert!(
        warnings
            .iter()
            .any(|l| l.contains("agent_id=A") && l.contains("task_id=T2")),
        "{warnings:?}"
    );
    assert!(warnings.iter().all(|l| !l.contains("task_id=T1")));
}

#[tokio::test]
async fn unavailable_agent_still_yields_its_task_logs() {
    let (directory, agents) = three_task_cluster();
    agents.unavailable_for(&AgentId::parse("A").unwrap(), 1);
    let store = Arc::new(MemoryBundleStore::new());
    let bundle = bundle(
        BundleConfig::new("kafka", "kafka"),
        healthy_runner(),
        directory,
        agents.clone(),
        store.clone(),
    );

    let report = bundle.create().await;

    assert_eq!(agents.path_queries(&AgentId::parse("A").unwrap()), 2);
    assert_eq!(store.contents("tasks/T1/stdout").unwrap(), b"t1 out");
    assert!(report.task("T1").unwrap().errors.is_empty());
}

#[tokio::test]
async fn snapshots_and_report_are_written() {
    let (directory, agents) = three_task_cluster();
    let store = Arc::new(MemoryBundleStore::new());
    let bundle = bundle(
        BundleConfig::new("kafka", "kafka"),
        healthy_runner(),
        directory,
        agents,
        store.clone(),
    );

    let report = bundle.create().await;

    let snapshots: Vec<String> = store
        .paths()
        .into_iter()
        .filter(|p| !p.starts_with("tasks/"))
        .collect();
    assert_eq!(
        snapshots,
        vec![
            REPORT_FILE,
            "service_configuration.json",
            "service_plan_status_deploy.json",
            "service_plan_status_recovery.json",
            "service_pod_status.json",
        ]
    );

    let stored: BundleReport =
        serde_json::from_slice(&store.contents(REPORT_FILE).unwrap()).unwrap();
    assert_eq!(stored.run_id, report.run_id);
    assert!(stored.finished_at.is_some());
    assert_eq!(
        stored.artifact("service_pod_status.json").map(|a| a.kind),
        Some(OutcomeKind::Written)
    );
}

#[tokio::test]
async fn malformed_plan_list_keeps_the_other_snapshots() {
    let runner = ScriptedCommandRunner::new();
    runner.respond(&service_target(), "describe", CommandOutput::ok("{}"));
    runner.respond(&service_target(), "pod status --json", CommandOutput::ok("[]"));
    runner.respond(&service_target(), "plan list", CommandOutput::ok("not json"));
    let mut config = BundleConfig::new("kafka", "kafka");
    config.install_cli = false;
    let store = Arc::new(MemoryBundleStore::new());
    let bundle = bundle(
        config,
        runner,
        StaticTaskDirectory::empty("kafka"),
        Arc::new(InMemoryAgentFiles::new()),
        store.clone(),
    );

    bundle.create().await;

    assert!(store.contents("service_configuration.json").is_some());
    assert!(store.contents("service_pod_status.json").is_some());
    assert!(
        store
            .paths()
            .iter()
            .all(|p| !p.starts_with("service_plan_status_"))
    );
}

#[tokio::test]
async fn repeated_runs_write_identical_snapshots() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();

    for dir in [&first, &second] {
        let (directory, agents) = three_task_cluster();
        let bundle = bundle(
            BundleConfig::new("kafka", "kafka"),
            healthy_runner(),
            directory,
            agents,
            Arc::new(LocalBundleStore::new(dir.path())),
        );
        bundle.create().await;
    }

    for name in [
        "service_configuration.json",
        "service_pod_status.json",
        "service_plan_status_deploy.json",
        "service_plan_status_recovery.json",
        "tasks/T1/stdout",
        "tasks/T3/stdout.1",
    ] {
        let a = std::fs::read(first.path().join(name)).unwrap();
        let b = std::fs::read(second.path().join(name)).unwrap();
        assert_eq!(a, b, "{name}");
    }
    assert!(!first.path().join("tasks/T2").exists());
}

#[tokio::test]
async fn cassandra_bundle_runs_after_the_generic_bundle() {
    let runner = ScriptedCommandRunner::new();
    let record = ServiceRecord {
        id: FrameworkId::parse(FRAMEWORK).unwrap(),
        name: "cassandra".into(),
        active: true,
        tasks: vec![pod_task("node-0-server__1", "node-0-server", "A")],
        completed_tasks: vec![],
    };
    let node = CommandTarget::Task {
        task_id: TaskId::parse("node-0-server__1").unwrap(),
    };
    for subcommand in ["status", "tpstats"] {
        let script = format!(
            "export JAVA_HOME=$(ls -d ${{MESOS_SANDBOX}}/jdk*/jre/) && \
             export TASK_IP=$(${{MESOS_SANDBOX}}/bootstrap --get-task-ip) && \
             CASSANDRA_DIRECTORY=$(ls -d ${{MESOS_SANDBOX}}/apache-cassandra-*/) && \
             ${{CASSANDRA_DIRECTORY}}/bin/nodetool {subcommand}"
        );
        let command_line = shell_words::join(["bash", "-c", script.as_str()]);
        runner.respond(&node, &command_line, CommandOutput::ok(format!("{subcommand} ok")));
    }
    let mut config = BundleConfig::new("cassandra", "cassandra");
    config.install_cli = false;
    let store = Arc::new(MemoryBundleStore::new());
    let bundle = BundleBuilder::new(config)
        .runner(Arc::new(runner))
        .task_directory(Arc::new(StaticTaskDirectory::sequence(vec![record])))
        .agent_files(Arc::new(InMemoryAgentFiles::new()))
        .store(store.clone())
        .clock(Arc::new(FixedClock::default()))
        .tech(Box::new(CassandraBundle))
        .build()
        .unwrap();

    bundle.create().await;

    assert_eq!(
        store.contents("cassandra_nodetool_status_node-0-server__1.txt").unwrap(),
        b"status ok"
    );
    assert_eq!(
        store.contents("cassandra_nodetool_tpstats_node-0-server__1.txt").unwrap(),
        b"tpstats ok"
    );
}

#[tokio::test]
async fn broker_count_gives_up_after_two_minutes() {
    let runner = ScriptedCommandRunner::new();
    runner.respond(&service_target(), "broker list", CommandOutput::ok("[0]"));
    let clock = Arc::new(FixedClock::default());
    let checks = KafkaChecks::new(
        KafkaConfig::new("kafka", "kafka"),
        Arc::new(runner),
        Arc::new(StaticTaskDirectory::empty("kafka")),
        clock.clone(),
    )
    .unwrap();

    let err = checks.broker_count_check(3).await.unwrap_err();

    assert!(matches!(err, DiagError::Retry(_)));
    assert!(clock.elapsed() >= Duration::from_secs(120));
    assert!(clock.elapsed() <= Duration::from_secs(121));
}
