use crate::types::{RoomContext, TimelineItem, VirtualItem};

pub const BANNER_ID: &str = "EncryptedHistoryBanner";

/// Hide history sent before the last login behind a single banner.
///
/// Without key backup those events cannot be decrypted on this session, so
/// everything up to the last event at or before the login time is replaced by
/// an `EncryptedHistoryBanner`.
pub fn process(items: Vec<TimelineItem>, room: &RoomContext) -> Vec<TimelineItem> {
    if !room.is_encrypted || room.is_key_backup_enabled {
        return items;
    }
    let Some(last_login_ms) = room.last_login_timestamp_ms else {
        return items;
    };

    let cut = items.iter().rposition(|item| match item {
        TimelineItem::Event { event, .. } => event.timestamp_ms <= last_login_ms,
        TimelineItem::Virtual {
            kind: VirtualItem::EncryptedHistoryBanner,
            ..
        } => true,
        _ => false,
    });
    let Some(cut) = cut else {
        return items;
    };

    let mut out = Vec::with_capacity(items.len() - cut);
    out.push(TimelineItem::marker(BANNER_ID, VirtualItem::EncryptedHistoryBanner));
    out.extend(items.into_iter().skip(cut + 1));
    out
}
