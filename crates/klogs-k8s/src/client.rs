use std::collections::HashMap;

use async_trait::async_trait;
use futures::{AsyncBufReadExt, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube::api::LogParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::{WatchStreamExt, watcher};
use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use klogs_types::{LogOptions, PodIdentity, Scope};

use crate::convert::pod_event;
use crate::{ClusterConnection, ClusterError, LogLineStream, PodEventStream};

/// Namespace used when a context does not set one
const DEFAULT_NAMESPACE: &str = "default";

/// Lines buffered between a pod's HTTP stream and its reader
const LOG_CHANNEL_CAPACITY: usize = 256;

/// Cluster connection backed by the local kubeconfig
pub struct KubeConnection {
    kubeconfig: Kubeconfig,
    current_context: Option<String>,

    /// One connected client per resolved context
    clients: RwLock<HashMap<String, kube::Client>>,
}

impl KubeConnection {
    /// Create a new connection by loading the kubeconfig
    pub fn new() -> Result<Self, ClusterError> {
        let kubeconfig = Kubeconfig::read()?;
        Ok(Self::from_kubeconfig(kubeconfig))
    }

    pub fn from_kubeconfig(kubeconfig: Kubeconfig) -> Self {
        let current_context = kubeconfig.current_context.clone();
        Self {
            kubeconfig,
            current_context,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Context names to watch
    pub fn context_names(&self, all_contexts: bool) -> Result<Vec<String>, ClusterError> {
        if all_contexts {
            return Ok(self
                .kubeconfig
                .contexts
                .iter()
                .map(|ctx| ctx.name.clone())
                .collect());
        }

        self.current_context
            .clone()
            .map(|name| vec![name])
            .ok_or(ClusterError::NoCurrentContext)
    }

    /// The namespace a context points at, or `default`
    pub fn default_namespace(&self, context_name: &str) -> Result<String, ClusterError> {
        let context = self
            .kubeconfig
            .contexts
            .iter()
            .find(|ctx| ctx.name == context_name)
            .ok_or_else(|| ClusterError::ContextNotFound(context_name.to_string()))?;

        Ok(context
            .context
            .as_ref()
            .and_then(|c| c.namespace.clone())
            .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()))
    }

    /// Create a kube::Client for a specific context and check that the API
    /// server answers with it
    async fn client_for_context(&self, context_name: &str) -> Result<kube::Client, ClusterError> {
        let config = kube::Config::from_custom_kubeconfig(
            self.kubeconfig.clone(),
            &KubeConfigOptions {
                context: Some(context_name.to_string()),
                ..Default::default()
            },
        )
        .await?;

        let connect_err = |source| ClusterError::Connect {
            context: context_name.to_string(),
            source,
        };
        let client = kube::Client::try_from(config).map_err(connect_err)?;
        let version = client.apiserver_version().await.map_err(connect_err)?;
        info!(
            context = context_name,
            version = %version.git_version,
            "connected to cluster"
        );

        Ok(client)
    }

    fn client(&self, context_name: &str) -> Result<kube::Client, ClusterError> {
        self.clients
            .read()
            .get(context_name)
            .cloned()
            .ok_or_else(|| ClusterError::NotConnected(context_name.to_string()))
    }
}

fn log_params(options: &LogOptions) -> LogParams {
    LogParams {
        follow: true,
        container: options.container.clone(),
        // since_seconds wins over tail_lines, like kubectl
        tail_lines: if options.since_seconds.is_some() {
            None
        } else {
            options.tail_lines
        },
        since_seconds: options.since_seconds,
        timestamps: options.timestamps,
        ..Default::default()
    }
}

#[async_trait]
impl ClusterConnection for KubeConnection {
    async fn list_scopes(&self, all_contexts: bool) -> Result<Vec<Scope>, ClusterError> {
        let mut scopes = Vec::new();

        for context_name in self.context_names(all_contexts)? {
            let namespace = self.default_namespace(&context_name)?;
            let client = self.client_for_context(&context_name).await?;
            self.clients.write().insert(context_name.clone(), client);
            scopes.push(Scope::new(context_name, namespace));
        }

        Ok(scopes)
    }

    async fn watch_pods(
        &self,
        scope: &Scope,
        all_namespaces: bool,
    ) -> Result<PodEventStream, ClusterError> {
        let client = self.client(&scope.context)?;
        let pods: Api<Pod> = if all_namespaces {
            Api::all(client)
        } else {
            Api::namespaced(client, &scope.namespace)
        };
        debug!(scope = %scope, all_namespaces, "starting pod watch");

        let context = scope.context.clone();
        let stream = watcher(pods, watcher::Config::default())
            .default_backoff()
            .filter_map(move |result| {
                let event = match result {
                    Ok(event) => pod_event(event, &context).map(Ok),
                    Err(e) => Some(Err(ClusterError::from(e))),
                };
                futures::future::ready(event)
            })
            .boxed();

        Ok(stream)
    }

    async fn open_log_stream(
        &self,
        pod: &PodIdentity,
        options: &LogOptions,
    ) -> Result<LogLineStream, ClusterError> {
        let api: Api<Pod> = Api::namespaced(self.client(&pod.context)?, &pod.namespace);
        let params = log_params(options);
        let name = pod.name.clone();

        // The HTTP body is read on its own task so the returned stream owns
        // nothing borrowed from the Api
        let (line_tx, mut line_rx) = mpsc::channel(LOG_CHANNEL_CAPACITY);
        let (open_tx, open_rx) = oneshot::channel();

        tokio::spawn(async move {
            let reader = match api.log_stream(&name, &params).await {
                Ok(reader) => {
                    let _ = open_tx.send(Ok(()));
                    reader
                }
                Err(e) => {
                    let _ = open_tx.send(Err(ClusterError::from(e)));
                    return;
                }
            };

            let mut lines = reader.lines();
            loop {
                tokio::select! {
                    _ = line_tx.closed() => break,

                    next = lines.try_next() => {
                        let item = match next {
                            Ok(Some(line)) => Ok(line),
                            Ok(None) => break,
                            Err(e) => Err(ClusterError::from(e)),
                        };
                        let failed = item.is_err();
                        if line_tx.send(item).await.is_err() || failed {
                            break;
                        }
                    }
                }
            }
        });

        match open_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(ClusterError::Io(std::io::Error::other(
                    "log stream task ended before opening",
                )));
            }
        }

        let stream = futures::stream::poll_fn(move |cx| line_rx.poll_recv(cx)).boxed();
        Ok(stream)
    }
}
