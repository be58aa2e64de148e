//! Room timeline mirroring and post-processing.
//!
//! A remote timeline engine describes its item list as batches of diff ops.
//! This crate mirrors that list, maps the engine's items into a closed model,
//! runs a fixed chain of post-processing stages over it and publishes
//! immutable snapshots ready for rendering.

/// Snapshot, signal and command channel primitives.
pub mod channel;
/// Time source used by timestamped markers.
pub mod clock;
/// Environment-backed pipeline configuration.
pub mod config;
/// Diff application against the authoritative list.
pub mod diff;
/// Stable error types and categories.
pub mod error;
/// Remote item mapping and detail fetches.
pub mod mapper;
/// Per-direction pagination flags.
pub mod pagination;
/// Per-timeline worker and its handle.
pub mod pipeline;
/// Post-processing chain stages.
pub mod postprocess;
/// Timeline item model, remote items and diff ops.
pub mod types;

pub use channel::{SignalStream, SnapshotStream, TimelineSignal, TimelineSnapshot, TimelineStatus};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, PipelineConfig};
pub use diff::{DiffOutcome, DiffProcessor};
pub use error::{TimelineError, TimelineErrorCategory};
pub use mapper::{DetailFuture, DetailResolver, ItemMapper};
pub use pagination::{PaginationState, PaginationStatus};
pub use pipeline::{PipelineInput, TimelineDeps, TimelineHandle, spawn_timeline};
pub use postprocess::{AnchorState, ProcessContext, run_chain};
pub use types::{
    EventContent, EventItem, EventOrigin, InReplyTo, MembershipChange, MessageType,
    PaginationDirection, RemoteEvent, RemoteItem, RemotePayload, RemoteVirtual, ReplyState,
    RoomContext, StateKind, TimelineDiff, TimelineItem, TimelineMode, UniqueId, VirtualItem,
    MARKER_ID_PREFIX, latest_event_id,
};
