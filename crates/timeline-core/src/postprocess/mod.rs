//! Post-processing stages that turn the mirrored list into a renderable one.
//!
//! Stages always run in the order of [`run_chain`]; each one relies on the
//! shape produced by the stages before it.

use std::collections::HashSet;

use crate::{
    clock::Clock,
    types::{RoomContext, TimelineItem, TimelineMode, UniqueId},
};

pub mod encrypted_history;
pub mod hidden_state;
pub mod last_forward;
pub mod latest_known;
pub mod loading_indicators;
pub mod room_beginning;
pub mod typing;

/// Auxiliary state shared by every stage of one chain run.
pub struct ProcessContext<'a> {
    pub mode: TimelineMode,
    pub room: &'a RoomContext,
    pub has_more_to_load_backward: bool,
    pub has_more_to_load_forward: bool,
    /// The pipeline has posted its first batch.
    pub is_initialized: bool,
    pub clock: &'a dyn Clock,
}

/// Identifiers carried across chain runs by the stateful stages.
///
/// Owned by one pipeline instance; never shared between timelines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnchorState {
    pub last_forward_ids: HashSet<UniqueId>,
    pub latest_event_ids: HashSet<UniqueId>,
}

/// Run every stage over `items` and return the renderable list.
pub fn run_chain(
    items: &[TimelineItem],
    ctx: &ProcessContext<'_>,
    anchors: &mut AnchorState,
) -> Vec<TimelineItem> {
    let items = hidden_state::process(items.to_vec());
    let items = room_beginning::process(items, ctx);
    let items = encrypted_history::process(items, ctx.room);
    let items = loading_indicators::process(items, ctx);
    let items = typing::process(items, ctx.mode);
    let items = last_forward::process(items, ctx.mode, &mut anchors.last_forward_ids);
    latest_known::process(items, ctx.mode, &mut anchors.latest_event_ids)
}
