//! Shared types for klogs
//!
//! This crate contains data structures used across multiple klogs crates.

use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Kubernetes Resource Types
// ============================================================================

/// Stable identity of a pod.
///
/// `uid` is the key everything else hangs off; `name` repeats across
/// namespaces and contexts and is only used for display.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PodIdentity {
    pub uid: String,
    pub name: String,
    pub namespace: String,
    pub context: String,
}

impl PodIdentity {
    pub fn new(uid: String, name: String, namespace: String, context: String) -> Self {
        Self {
            uid,
            name,
            namespace,
            context,
        }
    }
}

impl fmt::Display for PodIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.context, self.namespace, self.name)
    }
}

/// Coarse pod lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LifecycleState {
    Pending,
    Running,
    Terminated,
    #[default]
    Unknown,
}

impl From<&str> for LifecycleState {
    fn from(phase: &str) -> Self {
        match phase {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" | "Failed" => Self::Terminated,
            _ => Self::Unknown,
        }
    }
}

/// Snapshot of a pod as seen by one discovery event
#[derive(Clone, Debug)]
pub struct PodObservation {
    pub identity: PodIdentity,
    pub labels: BTreeMap<String, String>,
    pub state: LifecycleState,

    /// Names of containers whose state is currently `running`
    pub running_containers: Vec<String>,
}

impl PodObservation {
    pub fn new(identity: PodIdentity, state: LifecycleState) -> Self {
        Self {
            identity,
            labels: BTreeMap::new(),
            state,
            running_containers: Vec::new(),
        }
    }

    pub fn with_label(mut self, key: &str, value: &str) -> Self {
        self.labels.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_running_container(mut self, name: &str) -> Self {
        self.running_containers.push(name.to_string());
        self
    }

    /// A pod is loggable when it is Running with at least one running container
    pub fn is_loggable(&self) -> bool {
        self.state == LifecycleState::Running && !self.running_containers.is_empty()
    }
}

/// Kind of discovery event
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchAction {
    Added,
    Modified,
    Deleted,
}

/// A discovery event for one pod
#[derive(Clone, Debug)]
pub struct PodEvent {
    pub action: WatchAction,
    pub observation: PodObservation,
}

impl PodEvent {
    pub fn new(action: WatchAction, observation: PodObservation) -> Self {
        Self {
            action,
            observation,
        }
    }
}

/// A (context, default namespace) pair that discovery is watched over
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Scope {
    pub context: String,
    pub namespace: String,
}

impl Scope {
    pub fn new(context: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.context, self.namespace)
    }
}

// ============================================================================
// Selection & Options
// ============================================================================

/// User-supplied pod selection, built once at startup
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterSpec {
    /// Case-insensitive substring the pod name must contain
    pub name_substring: Option<String>,

    /// Every token must equal some label key or label value of the pod
    pub label_tokens: Vec<String>,

    pub all_namespaces: bool,
    pub all_contexts: bool,
}

impl FilterSpec {
    pub fn new(name_substring: Option<String>, label_tokens: Vec<String>) -> Self {
        Self {
            name_substring,
            label_tokens,
            all_namespaces: false,
            all_contexts: false,
        }
    }

    pub fn all_namespaces(mut self, enabled: bool) -> Self {
        self.all_namespaces = enabled;
        self
    }

    pub fn all_contexts(mut self, enabled: bool) -> Self {
        self.all_contexts = enabled;
        self
    }
}

/// Human description of the selection, printed once at startup
impl fmt::Display for FilterSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels = self.label_tokens.join(", ");
        match (&self.name_substring, self.label_tokens.is_empty()) {
            (None, true) => write!(f, "Logging all pods")?,
            (Some(name), true) => write!(f, "Logging pods with name containing '{name}'")?,
            (None, false) => write!(f, "Logging pods with labels [{labels}]")?,
            (Some(name), false) => write!(
                f,
                "Logging pods with name containing '{name}' and labels [{labels}]"
            )?,
        }
        if self.all_namespaces {
            write!(f, " in all namespaces")?;
        }
        if self.all_contexts {
            write!(f, " in all contexts")?;
        }
        Ok(())
    }
}

/// Options applied to every opened log stream
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Container to stream; defaults to the pod's first running container
    pub container: Option<String>,

    /// Number of historical lines to fetch before following
    pub tail_lines: Option<i64>,

    /// Only return lines newer than this many seconds
    pub since_seconds: Option<i64>,

    /// Ask the API server to prefix each line with its timestamp
    pub timestamps: bool,
}

// ============================================================================
// Display Types
// ============================================================================

/// A 24-bit terminal foreground color
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DisplayColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl DisplayColor {
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Wrap `text` in the truecolor escape sequence for this color
    pub fn paint(&self, text: &str) -> String {
        format!(
            "\u{1b}[38;2;{};{};{}m{}\u{1b}[0m",
            self.red, self.green, self.blue, text
        )
    }
}
