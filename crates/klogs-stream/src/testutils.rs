//! In-memory cluster and sink for tests

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use klogs_k8s::{ClusterConnection, ClusterError, LogLineStream, PodEventStream};
use klogs_types::{
    LifecycleState, LogOptions, PodEvent, PodIdentity, PodObservation, Scope, WatchAction,
};

use crate::OutputSink;

/// Sink that records every line
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn count_starting_with(&self, prefix: &str) -> usize {
        self.lines.lock().iter().filter(|l| l.starts_with(prefix)).count()
    }
}

impl OutputSink for MemorySink {
    fn write_line(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}

type LineSender = mpsc::UnboundedSender<Result<String, ClusterError>>;
type EventSender = mpsc::UnboundedSender<Result<PodEvent, ClusterError>>;

/// Scripted cluster: tests push watch events and log lines through channels
#[derive(Default)]
pub struct FakeCluster {
    scopes: Vec<Scope>,
    fail_scopes: bool,
    failing_watches: Vec<String>,
    watches: Mutex<HashMap<String, EventSender>>,
    logs: Mutex<HashMap<String, LineSender>>,
    log_opens: AtomicUsize,
    last_options: Mutex<Option<LogOptions>>,
}

impl FakeCluster {
    pub fn new(scopes: Vec<Scope>) -> Self {
        Self {
            scopes,
            ..Default::default()
        }
    }

    /// `list_scopes` fails, as with broken credentials
    pub fn unreachable() -> Self {
        Self {
            fail_scopes: true,
            ..Default::default()
        }
    }

    /// `watch_pods` fails for scopes in this context
    pub fn failing_watch(mut self, context: &str) -> Self {
        self.failing_watches.push(context.to_string());
        self
    }

    /// Deliver an event to the watch on `context`
    pub fn push_event(&self, context: &str, event: Result<PodEvent, ClusterError>) -> bool {
        match self.watches.lock().get(context) {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// End the watch on `context`
    pub fn close_watch(&self, context: &str) {
        self.watches.lock().remove(context);
    }

    /// Deliver a log line to the open stream for `uid`
    pub fn push_line(&self, uid: &str, line: Result<String, ClusterError>) -> bool {
        match self.logs.lock().get(uid) {
            Some(tx) => tx.send(line).is_ok(),
            None => false,
        }
    }

    /// End the log stream for `uid`, as when the pod goes away
    pub fn close_log(&self, uid: &str) {
        self.logs.lock().remove(uid);
    }

    pub fn log_opens(&self) -> usize {
        self.log_opens.load(Ordering::SeqCst)
    }

    pub fn is_watching(&self, context: &str) -> bool {
        self.watches.lock().contains_key(context)
    }

    pub fn is_streaming(&self, uid: &str) -> bool {
        self.logs.lock().contains_key(uid)
    }

    pub fn last_options(&self) -> Option<LogOptions> {
        self.last_options.lock().clone()
    }
}

#[async_trait]
impl ClusterConnection for FakeCluster {
    async fn list_scopes(&self, _all_contexts: bool) -> Result<Vec<Scope>, ClusterError> {
        if self.fail_scopes {
            return Err(ClusterError::NoCurrentContext);
        }
        Ok(self.scopes.clone())
    }

    async fn watch_pods(
        &self,
        scope: &Scope,
        _all_namespaces: bool,
    ) -> Result<PodEventStream, ClusterError> {
        if self.failing_watches.contains(&scope.context) {
            return Err(ClusterError::NotConnected(scope.context.clone()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.watches.lock().insert(scope.context.clone(), tx);
        Ok(unbounded_stream(rx))
    }

    async fn open_log_stream(
        &self,
        pod: &PodIdentity,
        options: &LogOptions,
    ) -> Result<LogLineStream, ClusterError> {
        self.log_opens.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock() = Some(options.clone());
        let (tx, rx) = mpsc::unbounded_channel();
        self.logs.lock().insert(pod.uid.clone(), tx);
        Ok(unbounded_stream(rx))
    }
}

fn unbounded_stream<T: Send + 'static>(
    mut rx: mpsc::UnboundedReceiver<T>,
) -> futures::stream::BoxStream<'static, T> {
    futures::stream::poll_fn(move |cx| rx.poll_recv(cx)).boxed()
}

pub fn identity(uid: &str, name: &str, namespace: &str, context: &str) -> PodIdentity {
    PodIdentity::new(
        uid.to_string(),
        name.to_string(),
        namespace.to_string(),
        context.to_string(),
    )
}

pub fn running_pod(identity: PodIdentity) -> PodObservation {
    PodObservation::new(identity, LifecycleState::Running).with_running_container("app")
}

pub fn event(action: WatchAction, observation: PodObservation) -> Result<PodEvent, ClusterError> {
    Ok(PodEvent::new(action, observation))
}

pub fn read_error() -> ClusterError {
    ClusterError::Io(std::io::Error::other("connection reset"))
}

/// Poll `check` until it holds, failing the test after two seconds
pub async fn eventually(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
