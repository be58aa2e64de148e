use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::PaginationDirection;

/// Broad error category used for logging and recovery decisions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimelineErrorCategory {
    /// A remote item could not be mapped; recovered as `Other`.
    Mapping,
    /// Local mirror and remote engine disagree; a full reset is required.
    Desync,
    /// A collaborator (detail resolver) failed; recovered locally.
    Collaborator,
    /// The request is not valid in the current pipeline state.
    State,
}

/// Errors produced by the timeline pipeline.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TimelineError {
    /// A remote item was malformed or of an unknown kind.
    #[error("cannot map remote item '{unique_id}': {reason}")]
    Mapping { unique_id: String, reason: String },
    /// A diff op referenced an index outside the current list.
    #[error("diff op '{op}' at index {index} is out of range for list of length {len}")]
    IndexOutOfRange {
        op: &'static str,
        index: usize,
        len: usize,
    },
    /// Resolving details of an event failed.
    #[error("failed to fetch details for event '{event_id}': {message}")]
    DetailFetch { event_id: String, message: String },
    /// Pagination was requested while it is not allowed.
    #[error("cannot paginate {0:?} right now")]
    CannotPaginate(PaginationDirection),
    /// The pipeline worker is gone.
    #[error("timeline pipeline is closed")]
    Closed,
}

impl TimelineError {
    pub fn category(&self) -> TimelineErrorCategory {
        match self {
            Self::Mapping { .. } => TimelineErrorCategory::Mapping,
            Self::IndexOutOfRange { .. } => TimelineErrorCategory::Desync,
            Self::DetailFetch { .. } => TimelineErrorCategory::Collaborator,
            Self::CannotPaginate(_) | Self::Closed => TimelineErrorCategory::State,
        }
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Mapping { .. } => "mapping_failed",
            Self::IndexOutOfRange { .. } => "index_out_of_range",
            Self::DetailFetch { .. } => "detail_fetch_failed",
            Self::CannotPaginate(_) => "cannot_paginate",
            Self::Closed => "pipeline_closed",
        }
    }

    /// Whether the pipeline keeps working without a full resync.
    pub fn is_recoverable(&self) -> bool {
        self.category() != TimelineErrorCategory::Desync
    }

    pub fn mapping(unique_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Mapping {
            unique_id: unique_id.into(),
            reason: reason.into(),
        }
    }
}
