use std::sync::Arc;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use klogs_k8s::ClusterConnection;
use klogs_types::{DisplayColor, FilterSpec, LogOptions, PodIdentity, PodObservation};

use crate::OutputSink;
use crate::colors::color_for;

/// Separator between prefix segments and between prefix and log line
pub const SEGMENT_DELIMITER: &str = " | ";

/// Which scope labels go in front of the pod name
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PrefixMode {
    pub context: bool,
    pub namespace: bool,
}

impl PrefixMode {
    /// Labels are only needed when more than one context or namespace is shown
    pub fn from_spec(spec: &FilterSpec) -> Self {
        Self {
            context: spec.all_contexts,
            namespace: spec.all_namespaces,
        }
    }
}

/// Build the colorized `context | namespace | pod` prefix for a pod
pub fn build_prefix(pod: &PodIdentity, mode: PrefixMode, color: DisplayColor) -> String {
    let mut segments = Vec::with_capacity(3);
    if mode.context {
        segments.push(color.paint(&pod.context));
    }
    if mode.namespace {
        segments.push(color.paint(&pod.namespace));
    }
    segments.push(color.paint(&pod.name));
    segments.join(SEGMENT_DELIMITER)
}

/// Why a pod's stream ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamEnd {
    /// The remote side closed the stream
    Closed,
    /// Opening or reading the stream failed
    Failed,
    /// The stream was cancelled locally
    Cancelled,
}

/// Streams one pod's log to the output sink
pub struct PodLogStreamer {
    connection: Arc<dyn ClusterConnection>,
    pod: PodIdentity,
    options: LogOptions,
    prefix: String,
    sink: Arc<dyn OutputSink>,
}

impl PodLogStreamer {
    /// Prepare a streamer for `observation`. The prefix is built once here.
    ///
    /// Without an explicit container, the pod's first running container is
    /// streamed.
    pub fn new(
        connection: Arc<dyn ClusterConnection>,
        observation: &PodObservation,
        options: &LogOptions,
        mode: PrefixMode,
        sink: Arc<dyn OutputSink>,
    ) -> Self {
        let pod = observation.identity.clone();
        let prefix = build_prefix(&pod, mode, color_for(&pod.uid));

        let mut options = options.clone();
        if options.container.is_none() {
            options.container = observation.running_containers.first().cloned();
        }

        Self {
            connection,
            pod,
            options,
            prefix,
            sink,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Stream until the remote side closes, a read fails, or `cancel` fires.
    ///
    /// The start marker is always paired with a stop marker.
    pub async fn run(self, cancel: CancellationToken) -> StreamEnd {
        self.sink.write_line(&format!("+ {}", self.prefix));

        let end = self.pump(&cancel).await;
        debug!(uid = %self.pod.uid, pod = %self.pod, ?end, "log stream ended");

        self.sink.write_line(&format!("- {}", self.prefix));
        end
    }

    async fn pump(&self, cancel: &CancellationToken) -> StreamEnd {
        let opened = tokio::select! {
            _ = cancel.cancelled() => return StreamEnd::Cancelled,
            opened = self.connection.open_log_stream(&self.pod, &self.options) => opened,
        };

        let mut lines = match opened {
            Ok(lines) => lines,
            Err(e) => {
                warn!(pod = %self.pod, error = %e, "failed to open log stream");
                return StreamEnd::Failed;
            }
        };

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return StreamEnd::Cancelled,

                next = lines.next() => match next {
                    Some(Ok(line)) => {
                        self.sink
                            .write_line(&format!("{}{}{}", self.prefix, SEGMENT_DELIMITER, line));
                    }
                    Some(Err(e)) => {
                        warn!(pod = %self.pod, error = %e, "log stream failed");
                        return StreamEnd::Failed;
                    }
                    None => return StreamEnd::Closed,
                },
            }
        }
    }
}
