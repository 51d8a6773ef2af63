//! Pod discovery and log streaming for klogs
//!
//! Discovery events flow through [`DiscoveryWatcher`] and [`PodFilter`] into
//! the [`StreamRegistry`], which keeps exactly one [`PodLogStreamer`] running
//! per pod. The [`Coordinator`] wires one watcher per scope.

mod colors;
mod coordinator;
mod filter;
mod registry;
mod sink;
mod streamer;
mod watcher;

#[cfg(test)]
mod testutils;

pub use colors::color_for;
pub use coordinator::Coordinator;
pub use filter::PodFilter;
pub use registry::StreamRegistry;
pub use sink::{OutputSink, StdoutSink};
pub use streamer::{PodLogStreamer, PrefixMode, StreamEnd, build_prefix};
pub use watcher::{DiscoveryWatcher, Selection, WatcherState};

// Re-export types used in our public API
pub use klogs_types::{DisplayColor, FilterSpec, LogOptions, PodIdentity, PodObservation, Scope};
