use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::warn;

use klogs_k8s::KubeConnection;
use klogs_stream::{Coordinator, StdoutSink};
use klogs_types::{FilterSpec, LogOptions};

/// klogs - Tail colorized logs from every matching pod
#[derive(Parser, Debug)]
#[command(name = "klogs")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Only log pods whose name contains this text (case-insensitive)
    #[arg(value_name = "POD")]
    pod: Option<String>,

    /// Only log pods with a label key or value equal to LABEL; repeat to require several
    #[arg(short = 'l', long = "labels", value_name = "LABEL", value_delimiter = ',')]
    labels: Vec<String>,

    /// Watch every namespace instead of the context's default one
    #[arg(short = 'A', long, alias = "allNamespaces")]
    all_namespaces: bool,

    /// Watch every context in the kubeconfig instead of the current one
    #[arg(short = 'C', long, alias = "allContexts")]
    all_contexts: bool,

    /// Container to stream (defaults to the first running container)
    #[arg(short = 'c', long)]
    container: Option<String>,

    /// Number of historical log lines to fetch per pod
    #[arg(long, value_name = "LINES")]
    tail: Option<i64>,

    /// Only fetch log lines newer than this many seconds
    #[arg(long, value_name = "SECONDS")]
    since: Option<i64>,

    /// Include API server timestamps on each line
    #[arg(long)]
    timestamps: bool,
}

impl Args {
    fn filter_spec(&self) -> FilterSpec {
        FilterSpec::new(self.pod.clone(), self.labels.clone())
            .all_namespaces(self.all_namespaces)
            .all_contexts(self.all_contexts)
    }

    fn log_options(&self) -> LogOptions {
        LogOptions {
            container: self.container.clone(),
            tail_lines: self.tail,
            since_seconds: self.since,
            timestamps: self.timestamps,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Diagnostics go to stderr so they never mix with pod output
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run_app(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

async fn run_app(args: Args) -> Result<()> {
    let connection = KubeConnection::new()?;

    let coordinator = Coordinator::new(
        Arc::new(connection),
        args.filter_spec(),
        args.log_options(),
        Arc::new(StdoutSink),
    )?;

    coordinator.run(shutdown_signal()).await
}

/// Resolves on Ctrl-C
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C, stop with a kill signal instead");
        std::future::pending::<()>().await;
    }
}
