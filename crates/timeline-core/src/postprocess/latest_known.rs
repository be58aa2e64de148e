use std::collections::HashSet;

use crate::types::{TimelineItem, TimelineMode, UniqueId, VirtualItem, latest_event_id};

fn indicator(anchor: &UniqueId) -> TimelineItem {
    TimelineItem::marker(
        &format!("latest_known_event_indicator_{anchor}"),
        VirtualItem::LatestKnownEventIndicator,
    )
}

/// Mark every event that has been the newest known one in a non-live timeline.
///
/// Each marker sits directly after its event, so re-running on the same list
/// produces the same output.
pub fn process(
    items: Vec<TimelineItem>,
    mode: TimelineMode,
    anchors: &mut HashSet<UniqueId>,
) -> Vec<TimelineItem> {
    if mode == TimelineMode::Live {
        return items;
    }
    if let Some(latest) = latest_event_id(&items) {
        anchors.insert(latest.clone());
    }

    let mut out = Vec::with_capacity(items.len() + anchors.len());
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
    out
}
