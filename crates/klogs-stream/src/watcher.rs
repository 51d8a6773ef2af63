use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use klogs_k8s::{ClusterConnection, ClusterError};
use klogs_types::{FilterSpec, LogOptions, PodEvent, Scope};

use crate::streamer::{PodLogStreamer, PrefixMode};
use crate::{OutputSink, PodFilter, StreamRegistry};

/// Everything a watcher needs to decide what to stream and how
#[derive(Debug)]
pub struct Selection {
    pub filter: PodFilter,
    pub all_namespaces: bool,
    pub mode: PrefixMode,
    pub options: LogOptions,
}

impl Selection {
    pub fn new(spec: &FilterSpec, options: LogOptions) -> Result<Self, regex::Error> {
        Ok(Self {
            filter: PodFilter::new(spec)?,
            all_namespaces: spec.all_namespaces,
            mode: PrefixMode::from_spec(spec),
            options,
        })
    }
}

/// Lifecycle of a scope's pod subscription
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatcherState {
    Subscribing,
    Active,
    Closed,
}

/// Watches pods in one scope and starts a stream for every loggable match
pub struct DiscoveryWatcher {
    connection: Arc<dyn ClusterConnection>,
    scope: Scope,
    selection: Arc<Selection>,
    registry: StreamRegistry,
    sink: Arc<dyn OutputSink>,
    state: WatcherState,
}

impl DiscoveryWatcher {
    pub fn new(
        connection: Arc<dyn ClusterConnection>,
        scope: Scope,
        selection: Arc<Selection>,
        registry: StreamRegistry,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        Self {
            connection,
            scope,
            selection,
            registry,
            sink,
            state: WatcherState::Subscribing,
        }
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    /// Run the subscription until it closes or `cancel` fires.
    ///
    /// Returns an error if the subscription could not be established, or if
    /// it ended right after reporting a failure.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<(), ClusterError> {
        self.state = WatcherState::Subscribing;

        let subscribed = tokio::select! {
            _ = cancel.cancelled() => {
                self.state = WatcherState::Closed;
                return Ok(());
            }
            subscribed = self
                .connection
                .watch_pods(&self.scope, self.selection.all_namespaces) => subscribed,
        };

        let mut events = match subscribed {
            Ok(events) => events,
            Err(e) => {
                self.state = WatcherState::Closed;
                return Err(e);
            }
        };

        self.state = WatcherState::Active;
        info!(scope = %self.scope, "watching pods");

        let mut last_error = None;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                next = events.next() => match next {
                    Some(Ok(event)) => {
                        last_error = None;
                        self.handle_event(&event);
                    }
                    Some(Err(e)) => {
                        warn!(scope = %self.scope, error = %e, "pod watch error");
                        last_error = Some(e);
                    }
                    None => {
                        debug!(scope = %self.scope, "pod watch closed");
                        self.state = WatcherState::Closed;
                        return last_error.map_or(Ok(()), Err);
                    }
                },
            }
        }

        self.state = WatcherState::Closed;
        Ok(())
    }

    /// Start a stream for the event's pod if it qualifies.
    ///
    /// The action is not consulted: deleted or stopped pods fail the filter,
    /// and their open streams end when the API server closes them.
    pub fn handle_event(&self, event: &PodEvent) -> bool {
        let observation = &event.observation;
        if !self.selection.filter.matches(observation) {
            trace!(pod = %observation.identity, action = ?event.action, "skipping pod");
            return false;
        }

        let connection = Arc::clone(&self.connection);
        let selection = Arc::clone(&self.selection);
        let sink = Arc::clone(&self.sink);
        let pod = observation.clone();

        self.registry
            .start_if_absent(&observation.identity, move |cancel| async move {
                PodLogStreamer::new(connection, &pod, &selection.options, selection.mode, sink)
                    .run(cancel)
                    .await;
            })
    }
}
