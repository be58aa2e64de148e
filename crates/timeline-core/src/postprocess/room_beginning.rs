use crate::{
    postprocess::ProcessContext,
    types::{EventItem, TimelineItem, TimelineMode},
};

/// Hide the creation boilerplate at the very start of a DM.
///
/// Only acts once the start of the room is loaded. For regular rooms the
/// engine already provides a `RoomBeginning` marker, which is left alone.
pub fn process(mut items: Vec<TimelineItem>, ctx: &ProcessContext<'_>) -> Vec<TimelineItem> {
    if ctx.mode == TimelineMode::PinnedEvents || ctx.has_more_to_load_backward || !ctx.room.is_dm
    {
        return items;
    }

    let create_index = items
        .iter()
        .position(|item| item.as_event().is_some_and(EventItem::is_room_create));

    let creator = ctx.room.room_creator.clone().or_else(|| {
        create_index
            .and_then(|index| items.get(index))
            .and_then(TimelineItem::as_event)
            .map(|event| event.sender.clone())
    });

    let join_index = creator.and_then(|creator| {
        items
            .iter()
            .position(|item| item.as_event().is_some_and(|event| event.is_join_of(&creator)))
    });

    let mut removals: Vec<usize> = [create_index, join_index].into_iter().flatten().collect();
    removals.sort_unstable();
    for index in removals.into_iter().rev() {
        items.remove(index);
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::FixedClock,
        postprocess::fixtures::{ids, join, message, room_create},
        types::{RoomContext, VirtualItem},
    };

    const CREATOR: &str = "@alice:example.org";

    fn run(
        items: Vec<TimelineItem>,
        room: &RoomContext,
        mode: TimelineMode,
        has_more_to_load_backward: bool,
    ) -> Vec<TimelineItem> {
        let clock = FixedClock::new(0);
        let ctx = ProcessContext {
            mode,
            room,
            has_more_to_load_backward,
            has_more_to_load_forward: false,
            is_initialized: true,
            clock: &clock,
        };
        process(items, &ctx)
    }

    fn dm() -> RoomContext {
        RoomContext {
            is_dm: true,
            ..RoomContext::default()
        }
    }

    fn dm_items() -> Vec<TimelineItem> {
        vec![
            room_create("create", CREATOR),
            message("e1", 2),
            join("join", CREATOR),
            message("e2", 3),
        ]
    }

    #[test]
    fn removes_create_and_creator_join_at_start_of_dm() {
        let out = run(dm_items(), &dm(), TimelineMode::Live, false);
        assert_eq!(ids(&out), vec!["e1", "e2"]);
    }

    #[test]
    fn keeps_everything_while_more_history_is_available() {
        let out = run(dm_items(), &dm(), TimelineMode::Live, true);
        assert_eq!(out, dm_items());
    }

    #[test]
    fn explicit_creator_wins_over_create_sender() {
        let room = RoomContext {
            room_creator: Some("@bob:example.org".into()),
            ..dm()
        };
        let items = vec![
            room_create("create", CREATOR),
            join("alice_join", CREATOR),
            join("bob_join", "@bob:example.org"),
        ];
        let out = run(items, &room, TimelineMode::Live, false);
        assert_eq!(ids(&out), vec!["alice_join"]);
    }

    #[test]
    fn removes_join_even_without_create_event_when_creator_is_known() {
        let room = RoomContext {
            room_creator: Some(CREATOR.into()),
            ..dm()
        };
        let out = run(
            vec![join("join", CREATOR), message("e1", 2)],
            &room,
            TimelineMode::Live,
            false,
        );
        assert_eq!(ids(&out), vec!["e1"]);
    }

    #[test]
    fn leaves_regular_rooms_and_pinned_timelines_alone() {
        let mut items = dm_items();
        items.insert(
            0,
            TimelineItem::virtual_item("start", VirtualItem::RoomBeginning),
        );

        let room = RoomContext::default();
        assert_eq!(run(items.clone(), &room, TimelineMode::Live, false), items);
        assert_eq!(
            run(dm_items(), &dm(), TimelineMode::PinnedEvents, false),
            dm_items()
        );
    }

    #[test]
    fn empty_list_and_unknown_creator_are_no_ops() {
        assert!(run(Vec::new(), &dm(), TimelineMode::Live, false).is_empty());

        let items = vec![join("join", CREATOR), message("e1", 2)];
        assert_eq!(run(items.clone(), &dm(), TimelineMode::Live, false), items);
    }
}
