use crate::{
    postprocess::ProcessContext,
    types::{PaginationDirection, TimelineItem, VirtualItem},
};

pub const BACKWARD_ID: &str = "BackwardLoadingIndicator";
pub const FORWARD_ID: &str = "ForwardLoadingIndicator";

/// Add spinners at the ends that can still be paginated.
///
/// Both indicators carry the clock reading of the current run.
pub fn process(items: Vec<TimelineItem>, ctx: &ProcessContext<'_>) -> Vec<TimelineItem> {
    if !ctx.is_initialized {
        return items;
    }

    let now_ms = ctx.clock.epoch_millis();
    let add_forward = ctx.has_more_to_load_forward && !items.is_empty();

    let mut out = Vec::with_capacity(items.len() + 2);
    if ctx.has_more_to_load_backward {
        out.push(indicator(PaginationDirection::Backwards, now_ms));
    }
    out.extend(items);
    if add_forward {
        out.push(indicator(PaginationDirection::Forwards, now_ms));
    }
    out
}

fn indicator(direction: PaginationDirection, timestamp_ms: u64) -> TimelineItem {
    let unique_id = match direction {
        PaginationDirection::Backwards => BACKWARD_ID,
        PaginationDirection::Forwards => FORWARD_ID,
    };
    TimelineItem::marker(
        unique_id,
        VirtualItem::LoadingIndicator {
            direction,
            timestamp_ms,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::FixedClock,
        postprocess::fixtures::{ids, message},
        types::{RoomContext, TimelineMode},
    };

    fn run(
        items: Vec<TimelineItem>,
        clock: &FixedClock,
        backward: bool,
        forward: bool,
        is_initialized: bool,
    ) -> Vec<TimelineItem> {
        let room = RoomContext::default();
        let ctx = ProcessContext {
            mode: TimelineMode::FocusedOnEvent,
            room: &room,
            has_more_to_load_backward: backward,
            has_more_to_load_forward: forward,
            is_initialized,
            clock,
        };
        process(items, &ctx)
    }

    #[test]
    fn prepends_backward_indicator_only() {
        let clock = FixedClock::new(1_000);
        let out = run(vec![message("e1", 1)], &clock, true, false, true);
        assert_eq!(ids(&out), vec![BACKWARD_ID, "e1"]);
        assert_eq!(
            out[0].as_virtual(),
            Some(&VirtualItem::LoadingIndicator {
                direction: PaginationDirection::Backwards,
                timestamp_ms: 1_000,
            })
        );
    }

    #[test]
    fn adds_both_indicators_when_both_ends_are_open() {
        let clock = FixedClock::new(5);
        let out = run(vec![message("e1", 1)], &clock, true, true, true);
        assert_eq!(ids(&out), vec![BACKWARD_ID, "e1", FORWARD_ID]);
    }

    #[test]
    fn forward_indicator_needs_items() {
        let clock = FixedClock::new(5);
        assert!(run(Vec::new(), &clock, false, true, true).is_empty());
        assert_eq!(
            ids(&run(Vec::new(), &clock, true, true, true)),
            vec![BACKWARD_ID]
        );
    }

    #[test]
    fn waits_for_initialization() {
        let clock = FixedClock::new(5);
        let items = vec![message("e1", 1)];
        assert_eq!(run(items.clone(), &clock, true, true, false), items);
    }

    #[test]
    fn refreshes_timestamp_on_every_run() {
        let clock = FixedClock::new(5);
        let first = run(vec![message("e1", 1)], &clock, true, false, true);
        clock.advance(10);
        let second = run(vec![message("e1", 1)], &clock, true, false, true);

        assert_eq!(first.len(), second.len());
        assert_ne!(first[0], second[0]);
    }
}
