use crate::types::{TimelineItem, TimelineMode, VirtualItem};

pub const TYPING_ID: &str = "TypingNotification";

/// Append the typing notification at the very end in `Live` mode.
pub fn process(mut items: Vec<TimelineItem>, mode: TimelineMode) -> Vec<TimelineItem> {
    if mode == TimelineMode::Live {
        items.push(TimelineItem::marker(TYPING_ID, VirtualItem::TypingNotification));
    }
    items
}
