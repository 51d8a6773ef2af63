use async_trait::async_trait;
use futures::stream::BoxStream;

use klogs_types::{LogOptions, PodEvent, PodIdentity, Scope};

use crate::ClusterError;

/// Discovery events for one scope, in delivery order
pub type PodEventStream = BoxStream<'static, Result<PodEvent, ClusterError>>;

/// Lines of one pod's log, in arrival order
pub type LogLineStream = BoxStream<'static, Result<String, ClusterError>>;

/// Everything the streaming core needs from a cluster
#[async_trait]
pub trait ClusterConnection: Send + Sync + 'static {
    /// Resolve the scopes to watch: the current context, or every context
    /// when `all_contexts` is set. Connection failures here are fatal.
    async fn list_scopes(&self, all_contexts: bool) -> Result<Vec<Scope>, ClusterError>;

    /// Subscribe to pod lifecycle events in `scope`, across every namespace
    /// of the scope's context when `all_namespaces` is set
    async fn watch_pods(
        &self,
        scope: &Scope,
        all_namespaces: bool,
    ) -> Result<PodEventStream, ClusterError>;

    /// Open a follow-mode log stream for `pod`
    async fn open_log_stream(
        &self,
        pod: &PodIdentity,
        options: &LogOptions,
    ) -> Result<LogLineStream, ClusterError>;
}
