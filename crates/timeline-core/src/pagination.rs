use serde::{Deserialize, Serialize};

use crate::types::{PaginationDirection, TimelineMode};

/// Pagination state of one direction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaginationStatus {
    /// A request is currently running.
    pub is_paginating: bool,
    /// The engine reports more items in this direction.
    pub has_more_to_load: bool,
}

impl PaginationStatus {
    pub fn new(is_paginating: bool, has_more_to_load: bool) -> Self {
        Self {
            is_paginating,
            has_more_to_load,
        }
    }

    pub fn can_paginate(&self) -> bool {
        !self.is_paginating && self.has_more_to_load
    }
}

/// Pagination state of both directions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaginationState {
    pub backward: PaginationStatus,
    pub forward: PaginationStatus,
}

impl PaginationState {
    /// Starting state for a timeline in `mode`.
    ///
    /// Every timeline may have older history; only non-live timelines can
    /// have newer events that are not loaded yet.
    pub fn for_mode(mode: TimelineMode) -> Self {
        Self {
            backward: PaginationStatus::new(false, true),
            forward: PaginationStatus::new(false, mode != TimelineMode::Live),
        }
    }

    pub fn get(&self, direction: PaginationDirection) -> PaginationStatus {
        match direction {
            PaginationDirection::Backwards => self.backward,
            PaginationDirection::Forwards => self.forward,
        }
    }

    /// Replace the status of `direction`, returning whether `has_more_to_load`
    /// changed.
    pub fn set(&mut self, direction: PaginationDirection, status: PaginationStatus) -> bool {
        let slot = match direction {
            PaginationDirection::Backwards => &mut self.backward,
            PaginationDirection::Forwards => &mut self.forward,
        };
        let more_changed = slot.has_more_to_load != status.has_more_to_load;
        *slot = status;
        more_changed
    }
}
