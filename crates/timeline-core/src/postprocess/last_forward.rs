use std::collections::HashSet;

use crate::types::{TimelineItem, TimelineMode, UniqueId, VirtualItem, latest_event_id};

fn indicator(anchor: &UniqueId) -> TimelineItem {
    TimelineItem::marker(
        &format!("last_forward_indicator_{anchor}"),
        VirtualItem::LastForwardIndicator,
    )
}

/// Keep a marker after every event that was once the newest loaded one.
///
/// Only used when focused on an event. Frontiers left behind by forward
/// pagination stay marked; the current one is marked at the end of the list.
pub fn process(
    items: Vec<TimelineItem>,
    mode: TimelineMode,
    anchors: &mut HashSet<UniqueId>,
) -> Vec<TimelineItem> {
    if mode != TimelineMode::FocusedOnEvent {
        return items;
    }
    let Some(latest) = latest_event_id(&items).cloned() else {
        return items;
    };

    anchors.remove(&latest);

    let mut out = Vec::with_capacity(items.len() + anchors.len() + 1);
    for item in items {
        let marker = match &item {
            TimelineItem::Event { unique_id, .. } if anchors.contains(unique_id) => {
                Some(indicator(unique_id))
            }
            _ => None,
        };
        out.push(item);
        out.extend(marker);
    }

    out.push(indicator(&latest));
    anchors.insert(latest);
    out
}
