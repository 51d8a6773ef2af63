use kube::config::KubeconfigError;
use thiserror::Error;

/// Errors raised while talking to a cluster
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("failed to load kubeconfig. Is kubectl configured?")]
    Kubeconfig(#[from] KubeconfigError),

    #[error("context '{0}' not found in kubeconfig")]
    ContextNotFound(String),

    #[error("no current context set in kubeconfig")]
    NoCurrentContext,

    #[error("no client connected for context '{0}'")]
    NotConnected(String),

    #[error("failed to connect to context '{context}'")]
    Connect {
        context: String,
        #[source]
        source: kube::Error,
    },

    #[error(transparent)]
    Api(#[from] kube::Error),

    #[error(transparent)]
    Watch(#[from] kube::runtime::watcher::Error),

    #[error("log stream read failed")]
    Io(#[from] std::io::Error),
}
