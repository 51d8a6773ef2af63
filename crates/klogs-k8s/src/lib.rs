//! Kubernetes client for klogs
//!
//! This crate defines the [`ClusterConnection`] seam the streaming core talks
//! to, and its kube-rs implementation: kubeconfig contexts, pod watches and
//! follow-mode log streams.

mod client;
mod connection;
mod convert;
mod error;

pub use client::KubeConnection;
pub use connection::{ClusterConnection, LogLineStream, PodEventStream};
pub use convert::{observe_pod, pod_event};
pub use error::ClusterError;

// Re-export types that are used in our public API
pub use klogs_types::{LogOptions, PodEvent, PodIdentity, PodObservation, Scope};
