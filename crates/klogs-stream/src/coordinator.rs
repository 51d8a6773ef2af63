use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use klogs_k8s::ClusterConnection;
use klogs_types::{FilterSpec, LogOptions};

use crate::watcher::Selection;
use crate::{DiscoveryWatcher, OutputSink, StreamRegistry};

/// Runs one discovery watcher per scope over a shared stream registry
pub struct Coordinator {
    connection: Arc<dyn ClusterConnection>,
    spec: FilterSpec,
    selection: Arc<Selection>,
    sink: Arc<dyn OutputSink>,
    registry: StreamRegistry,
    cancel: CancellationToken,
}

impl Coordinator {
    pub fn new(
        connection: Arc<dyn ClusterConnection>,
        spec: FilterSpec,
        options: LogOptions,
        sink: Arc<dyn OutputSink>,
    ) -> Result<Self> {
        let selection = Selection::new(&spec, options).context("Invalid pod name filter")?;
        let cancel = CancellationToken::new();

        Ok(Self {
            connection,
            spec,
            selection: Arc::new(selection),
            sink,
            registry: StreamRegistry::new(cancel.child_token()),
            cancel,
        })
    }

    /// Discover and stream until `shutdown` resolves, then stop every watcher
    /// and stream and wait for their stop markers.
    ///
    /// Failing to resolve scopes is fatal; a scope whose watch fails is
    /// reported and the others carry on.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        self.sink.write_line(&self.spec.to_string());

        let scopes = self
            .connection
            .list_scopes(self.spec.all_contexts)
            .await
            .context("Failed to connect to cluster")?;

        if scopes.is_empty() {
            anyhow::bail!("No contexts found in kubeconfig");
        }

        let mut watchers = JoinSet::new();
        for scope in scopes {
            let mut watcher = DiscoveryWatcher::new(
                Arc::clone(&self.connection),
                scope,
                Arc::clone(&self.selection),
                self.registry.clone(),
                Arc::clone(&self.sink),
            );
            let cancel = self.cancel.clone();

            watchers.spawn(async move {
                if let Err(e) = watcher.run(cancel).await {
                    error!(scope = %watcher.scope(), error = %e, "pod watch failed");
                }
            });
        }

        shutdown.await;
        info!(streams = self.registry.len(), "shutting down");

        self.cancel.cancel();
        while watchers.join_next().await.is_some() {}
        self.registry.shutdown().await;

        Ok(())
    }
}
