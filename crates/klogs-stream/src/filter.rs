use regex::Regex;

use klogs_types::{FilterSpec, PodObservation};

/// Compiled pod selection
#[derive(Clone)]
pub struct PodFilter {
    /// Case-insensitive literal match on the pod name (if any)
    name: Option<Regex>,

    /// Label tokens, all of which must be present as a key or a value
    label_tokens: Vec<String>,
}

impl PodFilter {
    /// Compile a filter from the user's selection
    pub fn new(spec: &FilterSpec) -> Result<Self, regex::Error> {
        let name = spec
            .name_substring
            .as_deref()
            .map(|needle| Regex::new(&format!("(?i){}", regex::escape(needle))))
            .transpose()?;

        Ok(Self {
            name,
            label_tokens: spec.label_tokens.clone(),
        })
    }

    /// Check whether a discovered pod should be logged
    pub fn matches(&self, pod: &PodObservation) -> bool {
        // Pods mid-creation or terminating have nothing to stream
        if !pod.is_loggable() {
            return false;
        }

        let name_ok = self
            .name
            .as_ref()
            .is_none_or(|name| name.is_match(&pod.identity.name));
        if !name_ok {
            return false;
        }

        self.matches_labels(pod)
    }

    fn matches_labels(&self, pod: &PodObservation) -> bool {
        self.label_tokens.iter().all(|token| {
            pod.labels
                .iter()
                .any(|(key, value)| key == token || value == token)
        })
    }
}

impl std::fmt::Debug for PodFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PodFilter")
            .field("name", &self.name.as_ref().map(Regex::as_str))
            .field("label_tokens", &self.label_tokens)
            .finish()
    }
}
