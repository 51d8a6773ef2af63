use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

use klogs_types::PodIdentity;

/// Table of live log streams, at most one per pod uid.
///
/// Cloning is cheap and every clone shares the same table.
#[derive(Clone)]
pub struct StreamRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    /// Live streams keyed by pod uid
    streams: Mutex<HashMap<String, StreamHandle>>,

    /// Tracks every spawned stream task so shutdown can wait for them
    tracker: TaskTracker,

    /// Parent of every stream's cancellation token
    cancel: CancellationToken,
}

/// Registry entry for one running stream
struct StreamHandle {
    identity: PodIdentity,
    cancel: CancellationToken,
}

impl StreamRegistry {
    /// Create a registry whose streams all stop when `cancel` fires
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                streams: Mutex::new(HashMap::new()),
                tracker: TaskTracker::new(),
                cancel,
            }),
        }
    }

    /// Start a stream for `identity` unless one is already live.
    ///
    /// The entry is claimed before this returns, so concurrent callers for the
    /// same uid see it. `factory` then runs on its own task with a
    /// cancellation token for this stream; the entry is released when that
    /// task ends, however it ends. Returns whether a task was started.
    pub fn start_if_absent<F, Fut>(&self, identity: &PodIdentity, factory: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.inner.cancel.is_cancelled() {
            return false;
        }

        let cancel = {
            let mut streams = self.inner.streams.lock();
            match streams.entry(identity.uid.clone()) {
                Entry::Occupied(_) => return false,
                Entry::Vacant(slot) => {
                    let cancel = self.inner.cancel.child_token();
                    slot.insert(StreamHandle {
                        identity: identity.clone(),
                        cancel: cancel.clone(),
                    });
                    cancel
                }
            }
        };

        debug!(uid = %identity.uid, pod = %identity, "stream slot claimed");
        let slot = StreamSlot {
            inner: Arc::clone(&self.inner),
            uid: identity.uid.clone(),
        };
        self.inner.tracker.spawn(async move {
            // Dropped on completion, panic or abort alike
            let _slot = slot;
            factory(cancel).await;
        });

        true
    }

    /// Check whether a stream is live for `uid`
    pub fn contains(&self, uid: &str) -> bool {
        self.inner.streams.lock().contains_key(uid)
    }

    /// Number of live streams
    pub fn len(&self) -> usize {
        self.inner.streams.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pods with a live stream, in no particular order
    pub fn active(&self) -> Vec<PodIdentity> {
        self.inner
            .streams
            .lock()
            .values()
            .map(|handle| handle.identity.clone())
            .collect()
    }

    /// Ask the stream for `uid` to stop. Its entry goes away once the task
    /// has finished. Returns whether a live stream was found.
    pub fn stop(&self, uid: &str) -> bool {
        match self.inner.streams.lock().get(uid) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every stream and wait for all of their tasks to finish
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }
}

impl std::fmt::Debug for StreamRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamRegistry")
            .field("streams", &self.len())
            .field("cancelled", &self.inner.cancel.is_cancelled())
            .finish()
    }
}

/// Releases a registry entry when the owning task ends
struct StreamSlot {
    inner: Arc<RegistryInner>,
    uid: String,
}

impl Drop for StreamSlot {
    fn drop(&mut self) {
        self.inner.streams.lock().remove(&self.uid);
        debug!(uid = %self.uid, "stream slot released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::{eventually, identity};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_start_runs_one_task() {
        let registry = StreamRegistry::new(CancellationToken::new());
        let pod = identity("abc123", "p1", "default", "dev");
        let runs = Arc::new(AtomicUsize::new(0));

        let mut callers = Vec::new();
        for _ in 0..16 {
            let registry = registry.clone();
            let pod = pod.clone();
            let runs = Arc::clone(&runs);
            callers.push(tokio::spawn(async move {
                registry.start_if_absent(&pod, move |cancel| async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    cancel.cancelled().await;
                })
            }));
        }

        let mut started = 0;
        for caller in callers {
            if caller.await.unwrap() {
                started += 1;
            }
        }
        assert_eq!(started, 1);

        eventually(|| runs.load(Ordering::SeqCst) == 1).await;
        assert_eq!(registry.len(), 1);

        registry.shutdown().await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_entry_released_after_task_ends() {
        let registry = StreamRegistry::new(CancellationToken::new());
        let pod = identity("abc123", "p1", "default", "dev");

        assert!(registry.start_if_absent(&pod, |_| async {}));
        eventually(|| !registry.contains("abc123")).await;

        let (tx, rx) = tokio::sync::oneshot::channel();
        assert!(registry.start_if_absent(&pod, move |_| async move {
            let _ = tx.send(());
        }));
        rx.await.unwrap();
        eventually(|| registry.is_empty()).await;
    }

    #[tokio::test]
    async fn test_entry_released_after_panic() {
        let registry = StreamRegistry::new(CancellationToken::new());
        let pod = identity("abc123", "p1", "default", "dev");

        assert!(registry.start_if_absent(&pod, |_| async {
            let failure: Option<()> = None;
            failure.expect("stream blew up")
        }));
        eventually(|| registry.is_empty()).await;
        assert!(registry.start_if_absent(&pod, |_| async {}));
    }

    #[tokio::test]
    async fn test_duplicate_start_is_noop() {
        let registry = StreamRegistry::new(CancellationToken::new());
        let pod = identity("abc123", "p1", "default", "dev");

        assert!(registry.start_if_absent(&pod, |cancel| async move { cancel.cancelled().await }));
        assert!(!registry.start_if_absent(&pod, |_| async {}));

        // Same display name elsewhere is a different pod
        let twin = identity("def456", "p1", "other", "dev");
        assert!(registry.start_if_absent(&twin, |cancel| async move { cancel.cancelled().await }));
        assert_eq!(registry.len(), 2);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_cancels_one_stream() {
        let registry = StreamRegistry::new(CancellationToken::new());
        let a = identity("a", "pod-a", "default", "dev");
        let b = identity("b", "pod-b", "default", "dev");

        for pod in [&a, &b] {
            registry.start_if_absent(pod, |cancel| async move { cancel.cancelled().await });
        }
        assert!(registry.stop("a"));
        assert!(!registry.stop("missing"));

        eventually(|| !registry.contains("a")).await;
        assert!(registry.contains("b"));
        assert_eq!(registry.active(), vec![b]);

        registry.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_starts_after_shutdown() {
        let registry = StreamRegistry::new(CancellationToken::new());
        registry.shutdown().await;

        let pod = identity("abc123", "p1", "default", "dev");
        assert!(!registry.start_if_absent(&pod, |_| async {}));
        assert!(registry.is_empty());
    }
}
