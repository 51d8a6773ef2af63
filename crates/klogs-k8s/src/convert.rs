//! Conversion from k8s-openapi pods to klogs observations

use k8s_openapi::api::core::v1::Pod;
use kube::runtime::watcher::Event;

use klogs_types::{LifecycleState, PodEvent, PodIdentity, PodObservation, WatchAction};

/// Snapshot a pod seen in `context`.
///
/// Returns `None` for pods without a uid, since they cannot be keyed.
pub fn observe_pod(pod: &Pod, context: &str) -> Option<PodObservation> {
    let uid = pod.metadata.uid.clone()?;
    let identity = PodIdentity::new(
        uid,
        pod.metadata.name.clone().unwrap_or_default(),
        pod.metadata.namespace.clone().unwrap_or_default(),
        context.to_string(),
    );

    let status = pod.status.as_ref();
    let state = status
        .and_then(|s| s.phase.as_deref())
        .map(LifecycleState::from)
        .unwrap_or(LifecycleState::Unknown);

    let mut observation = PodObservation::new(identity, state);

    if let Some(labels) = &pod.metadata.labels {
        observation.labels = labels.clone();
    }

    if let Some(container_statuses) = status.and_then(|s| s.container_statuses.as_ref()) {
        observation.running_containers = container_statuses
            .iter()
            .filter(|cs| cs.state.as_ref().is_some_and(|st| st.running.is_some()))
            .map(|cs| cs.name.clone())
            .collect();
    }

    Some(observation)
}

/// Map a watcher event to a discovery event.
///
/// The initial list is reported as `Added`, later applies as `Modified`.
/// Bookkeeping events without a pod yield `None`.
pub fn pod_event(event: Event<Pod>, context: &str) -> Option<PodEvent> {
    let (action, pod) = match event {
        Event::InitApply(pod) => (WatchAction::Added, pod),
        Event::Apply(pod) => (WatchAction::Modified, pod),
        Event::Delete(pod) => (WatchAction::Deleted, pod),
        Event::Init | Event::InitDone => return None,
    };

    observe_pod(&pod, context).map(|observation| PodEvent::new(action, observation))
}
