use std::future::Future;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use converge_await::{AwaitRegistry, AwaitSettings, CreateContext, DeleteContext, UpdateContext};
use converge_core::{AwaitResult, ClientFactory, KindKey, ObservedState};
use converge_kubehub::KubeFactory;

mod manifest;

use manifest::read_manifest;

#[derive(Parser, Debug)]
#[command(name = "convergectl", version, about = "Wait for cluster resources to converge")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Kubernetes namespace (default: manifest, then current context)
    #[arg(long = "ns", global = true)]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output {
    Human,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List kinds with registered waits
    Kinds,
    /// Block until an already-submitted change converges
    Wait {
        #[command(subcommand)]
        op: WaitOp,
    },
}

#[derive(Subcommand, Debug)]
enum WaitOp {
    /// Wait for a created object to become ready
    Create {
        /// Manifest of the object, as submitted
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
    },
    /// Wait for an updated object to settle
    Update {
        /// Manifest of the object, as submitted
        #[arg(short = 'f', long = "file")]
        file: PathBuf,
        /// Manifest of the previous revision
        #[arg(long = "previous")]
        previous: PathBuf,
    },
    /// Wait for an object to be gone
    Delete {
        /// GVK key, e.g. "v1/Pod" or "apps/v1/Deployment"
        gvk: String,
        name: String,
    },
}

fn init_tracing() {
    let env = std::env::var("CONVERGE_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("CONVERGE_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid CONVERGE_METRICS_ADDR; expected host:port");
        }
    }
}

#[derive(Serialize, Debug)]
struct WaitReport {
    op: &'static str,
    kind: String,
    name: String,
    namespace: Option<String>,
    outcome: &'static str,
    took_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_observed: Option<ObservedState>,
}

impl WaitReport {
    fn new(op: &'static str, kind: &KindKey, name: &str, namespace: Option<&str>, res: &AwaitResult, took: Duration) -> Self {
        let (outcome, error, last_observed) = match res {
            Ok(()) => ("ok", None, None),
            Err(e) => (e.outcome(), Some(e.to_string()), e.last_observed().cloned()),
        };
        Self {
            op,
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
            outcome,
            took_ms: took.as_millis(),
            error,
            last_observed,
        }
    }

    fn print(&self, output: Output) -> Result<()> {
        match output {
            Output::Json => println!("{}", serde_json::to_string_pretty(self)?),
            Output::Human => {
                let target = match &self.namespace {
                    Some(ns) => format!("{} {}/{}", self.kind, ns, self.name),
                    None => format!("{} {}", self.kind, self.name),
                };
                match &self.error {
                    None => println!("{} {}: converged in {} ms", self.op, target, self.took_ms),
                    Some(e) => eprintln!("{} {}: {}: {}", self.op, target, self.outcome, e),
                }
            }
        }
        Ok(())
    }
}

/// Run `fut` on its own task; Ctrl-C cancels it through `cancel`.
async fn run_cancellable<F>(cancel: CancellationToken, fut: F) -> Result<AwaitResult>
where
    F: Future<Output = AwaitResult> + Send + 'static,
{
    let mut task = tokio::spawn(fut);
    tokio::select! {
        res = &mut task => Ok(res.context("await task panicked")?),
        _ = signal::ctrl_c() => {
            warn!("interrupt received; cancelling wait");
            cancel.cancel();
            Ok(task.await.context("await task panicked")?)
        }
    }
}

async fn wait_create(registry: Arc<AwaitRegistry>, factory: Arc<KubeFactory>, file: PathBuf, ns: Option<&str>) -> Result<WaitReport> {
    let m = read_manifest(&file, ns)?;
    let resource = factory.resource(&m.kind, m.namespace.as_deref()).await?;
    let cancel = CancellationToken::new();
    let ctx = CreateContext::new(factory, resource, m.object).with_cancel(cancel.clone());
    info!(kind = %m.kind, name = %m.name, ns = ?m.namespace, "wait create");
    let t0 = Instant::now();
    let kind = m.kind.clone();
    let res = run_cancellable(cancel, async move { registry.await_create(&kind, &ctx).await }).await?;
    Ok(WaitReport::new("create", &m.kind, &m.name, m.namespace.as_deref(), &res, t0.elapsed()))
}

async fn wait_update(
    registry: Arc<AwaitRegistry>,
    factory: Arc<KubeFactory>,
    file: PathBuf,
    previous: PathBuf,
    ns: Option<&str>,
) -> Result<WaitReport> {
    let m = read_manifest(&file, ns)?;
    let prev = read_manifest(&previous, ns)?;
    let resource = factory.resource(&m.kind, m.namespace.as_deref()).await?;
    let live = resource
        .get(&m.name)
        .await
        .with_context(|| format!("fetching live {} '{}'", m.kind, m.name))?
        .unwrap_or_else(|| serde_json::json!({}));
    let cancel = CancellationToken::new();
    let current = CreateContext::new(factory, resource, m.object).with_cancel(cancel.clone());
    let ctx = UpdateContext::new(current, prev.object, live);
    info!(kind = %m.kind, name = %m.name, ns = ?m.namespace, "wait update");
    let t0 = Instant::now();
    let kind = m.kind.clone();
    let res = run_cancellable(cancel, async move { registry.await_update(&kind, &ctx).await }).await?;
    Ok(WaitReport::new("update", &m.kind, &m.name, m.namespace.as_deref(), &res, t0.elapsed()))
}

async fn wait_delete(registry: Arc<AwaitRegistry>, factory: Arc<KubeFactory>, gvk: &str, name: &str, ns: Option<&str>) -> Result<WaitReport> {
    let kind = KindKey::parse(gvk)?;
    let resource = factory.resource(&kind, ns).await?;
    let cancel = CancellationToken::new();
    let ctx = DeleteContext::new(resource, name).with_cancel(cancel.clone());
    info!(kind = %kind, name = %name, ns = ?ns, "wait delete");
    let t0 = Instant::now();
    let key = kind.clone();
    let res = run_cancellable(cancel, async move { registry.await_delete(&key, &ctx).await }).await?;
    Ok(WaitReport::new("delete", &kind, name, ns, &res, t0.elapsed()))
}

fn print_kinds(registry: &AwaitRegistry, output: Output) -> Result<()> {
    let kinds = registry.kinds();
    match output {
        Output::Json => {
            let rows: Vec<_> = kinds
                .iter()
                .map(|(k, caps)| serde_json::json!({"kind": k.to_string(), "capabilities": caps}))
                .collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Output::Human => {
            for (k, caps) in kinds {
                let slots: Vec<&str> = [("create", caps.create), ("update", caps.update), ("delete", caps.delete)]
                    .into_iter()
                    .filter_map(|(n, on)| on.then_some(n))
                    .collect();
                let slots = if slots.is_empty() { "-".to_string() } else { slots.join(",") };
                println!("{} • {}", k, slots);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let settings = AwaitSettings::from_env();
    let registry = Arc::new(AwaitRegistry::new(&settings));
    let ns = cli.namespace.as_deref();

    let op = match cli.command {
        Commands::Kinds => return print_kinds(&registry, cli.output),
        Commands::Wait { op } => op,
    };
    let factory = Arc::new(KubeFactory::try_default().await?);
    let report = match op {
        WaitOp::Create { file } => wait_create(registry, factory, file, ns).await?,
        WaitOp::Update { file, previous } => wait_update(registry, factory, file, previous, ns).await?,
        WaitOp::Delete { gvk, name } => wait_delete(registry, factory, &gvk, &name, ns).await?,
    };
    report.print(cli.output)?;
    if report.error.is_some() {
        std::process::exit(1);
    }
    Ok(())
}
