use crate::types::TimelineItem;

/// Drop state events that are bookkeeping rather than conversation.
pub fn process(mut items: Vec<TimelineItem>) -> Vec<TimelineItem> {
    items.retain(|item| {
        !item
            .as_event()
            .is_some_and(|event| event.content.is_hidden_state())
    });
    items
}
