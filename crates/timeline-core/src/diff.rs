use tracing::{debug, warn};

use crate::{
    error::TimelineError,
    mapper::{ItemMapper, detail_request},
    types::{EventOrigin, RemoteItem, TimelineDiff, TimelineItem},
};

/// What a successfully applied batch changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffOutcome {
    /// Whether the authoritative list was touched at all.
    pub changed: bool,
    /// A newly mapped item is a room membership event.
    pub membership_changed: bool,
    /// A newly mapped item arrived through the sync loop.
    pub has_synced_event: bool,
    /// Detail fetches held back until the batch is committed.
    detail_requests: Vec<String>,
}

impl DiffOutcome {
    fn observe(&mut self, item: &TimelineItem) {
        if let Some(event) = item.as_event() {
            self.membership_changed |= event.is_membership_change();
            self.has_synced_event |= event.origin == EventOrigin::Sync;
        }
        if let Some(event_id) = detail_request(item) {
            self.detail_requests.push(event_id.to_owned());
        }
    }
}

/// Authoritative item list mirrored from the remote engine.
///
/// Batches are applied to a working copy and only committed when every op
/// succeeds, so a desynchronized batch never leaves a half-applied list.
#[derive(Debug)]
pub struct DiffProcessor {
    items: Vec<TimelineItem>,
    mapper: ItemMapper,
    needs_resync: bool,
}

impl DiffProcessor {
    pub fn new(mapper: ItemMapper) -> Self {
        Self {
            items: Vec::new(),
            mapper,
            needs_resync: false,
        }
    }

    /// Current items, oldest first.
    pub fn items(&self) -> &[TimelineItem] {
        &self.items
    }

    /// Whether a previous batch desynchronized and a `Reset` is awaited.
    pub fn needs_resync(&self) -> bool {
        self.needs_resync
    }

    pub fn mapper(&self) -> &ItemMapper {
        &self.mapper
    }

    /// Prepend a chunk of remote items, keeping their order.
    pub fn post_items(&mut self, remote: &[RemoteItem]) -> DiffOutcome {
        let mut outcome = DiffOutcome {
            changed: !remote.is_empty(),
            ..DiffOutcome::default()
        };
        let mapped = self.map_all(remote, &mut outcome);
        self.items.splice(0..0, mapped);
        self.request_details(&mut outcome);
        outcome
    }

    /// Apply a batch of ops in order.
    ///
    /// On an out-of-range index the whole batch is dropped, the list keeps its
    /// previous state and every later op is ignored until a `Reset` arrives.
    pub fn apply(&mut self, batch: &[TimelineDiff]) -> Result<DiffOutcome, TimelineError> {
        let start = if self.needs_resync {
            match batch
                .iter()
                .position(|op| matches!(op, TimelineDiff::Reset { .. }))
            {
                Some(index) => index,
                None => {
                    debug!(ops = batch.len(), "awaiting reset; skipping diff batch");
                    return Ok(DiffOutcome::default());
                }
            }
        } else {
            0
        };

        let mut working = self.items.clone();
        let mut outcome = DiffOutcome::default();
        for op in &batch[start..] {
            if let Err(err) = self.apply_op(&mut working, op, &mut outcome) {
                warn!(
                    op = op.name(),
                    error = %err,
                    list_len = working.len(),
                    batch_len = batch.len(),
                    "timeline desynchronized; dropping batch until reset"
                );
                self.needs_resync = true;
                return Err(err);
            }
        }

        outcome.changed = start < batch.len();
        self.items = working;
        self.needs_resync = false;
        self.request_details(&mut outcome);
        Ok(outcome)
    }

    /// Drop the list and any pending resync, as a `Reset` to nothing would.
    pub fn reset(&mut self) {
        self.items.clear();
        self.needs_resync = false;
    }

    fn apply_op(
        &self,
        items: &mut Vec<TimelineItem>,
        op: &TimelineDiff,
        outcome: &mut DiffOutcome,
    ) -> Result<(), TimelineError> {
        let len = items.len();
        let out_of_range = |index: usize| TimelineError::IndexOutOfRange {
            op: op.name(),
            index,
            len,
        };

        match op {
            TimelineDiff::Append { items: remote } => {
                let mapped = self.map_all(remote, outcome);
                items.extend(mapped);
            }
            TimelineDiff::PushBack { item } => items.push(self.map_one(item, outcome)),
            TimelineDiff::PushFront { item } => items.insert(0, self.map_one(item, outcome)),
            TimelineDiff::Set { index, item } => {
                let slot = items.get_mut(*index).ok_or_else(|| out_of_range(*index))?;
                *slot = self.map_one(item, outcome);
            }
            TimelineDiff::Insert { index, item } => {
                if *index > len {
                    return Err(out_of_range(*index));
                }
                items.insert(*index, self.map_one(item, outcome));
            }
            TimelineDiff::Remove { index } => {
                if *index >= len {
                    return Err(out_of_range(*index));
                }
                items.remove(*index);
            }
            TimelineDiff::PopBack => {
                items.pop();
            }
            TimelineDiff::PopFront => {
                if !items.is_empty() {
                    items.remove(0);
                }
            }
            TimelineDiff::Clear => items.clear(),
            TimelineDiff::Truncate { length } => items.truncate(*length),
            TimelineDiff::Reset { items: remote } => {
                let mapped = self.map_all(remote, outcome);
                *items = mapped;
            }
        }
        Ok(())
    }

    fn request_details(&self, outcome: &mut DiffOutcome) {
        for event_id in outcome.detail_requests.drain(..) {
            self.mapper.fetch_details(&event_id);
        }
    }

    fn map_one(&self, remote: &RemoteItem, outcome: &mut DiffOutcome) -> TimelineItem {
        let item = self.mapper.map_detached(remote);
        outcome.observe(&item);
        item
    }

    fn map_all(&self, remote: &[RemoteItem], outcome: &mut DiffOutcome) -> Vec<TimelineItem> {
        remote
            .iter()
            .map(|item| self.map_one(item, outcome))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use serde_json::json;
    use tokio::time::timeout;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::{
        mapper::{DetailFuture, DetailResolver},
        types::{EventContent, InReplyTo, RemoteEvent, RemotePayload, ReplyState, UniqueId},
    };

    fn remote(unique_id: &str) -> RemoteItem {
        RemoteItem {
            unique_id: unique_id.to_owned(),
            payload: RemotePayload::Event(RemoteEvent {
                event_id: Some(format!("${unique_id}")),
                sender: "@alice:example.org".to_owned(),
                timestamp_ms: 1_731_000_000,
                origin: EventOrigin::Cache,
                event_type: "m.room.message".to_owned(),
                state_key: None,
                content: json!({"msgtype": "m.text", "body": unique_id}),
                in_reply_to: None,
            }),
        }
    }

    fn unknown() -> RemoteItem {
        RemoteItem {
            unique_id: "unknown".to_owned(),
            payload: RemotePayload::Unknown,
        }
    }

    fn ids(processor: &DiffProcessor) -> Vec<Option<&str>> {
        processor
            .items()
            .iter()
            .map(|item| item.unique_id().map(UniqueId::as_str))
            .collect()
    }

    fn processor_with(unique_ids: &[&str]) -> DiffProcessor {
        let mut processor = DiffProcessor::new(ItemMapper::new());
        let items = unique_ids.iter().map(|id| remote(id)).collect();
        processor
            .apply(&[TimelineDiff::Reset { items }])
            .expect("reset should work");
        processor
    }

    #[test]
    fn runs_append_push_front_remove_clear_scenario() {
        let mut processor = processor_with(&["e1"]);

        processor
            .apply(&[TimelineDiff::Append {
                items: vec![unknown()],
            }])
            .expect("append should work");
        assert_eq!(processor.items()[1], TimelineItem::Other);
        assert_eq!(ids(&processor), vec![Some("e1"), None]);

        processor
            .apply(&[TimelineDiff::PushFront { item: unknown() }])
            .expect("push front should work");
        assert_eq!(ids(&processor), vec![None, Some("e1"), None]);

        processor
            .apply(&[TimelineDiff::Remove { index: 1 }])
            .expect("remove should work");
        assert_eq!(processor.items(), &[TimelineItem::Other, TimelineItem::Other]);

        processor
            .apply(&[TimelineDiff::Clear])
            .expect("clear should work");
        assert!(processor.items().is_empty());
    }

    #[test]
    fn set_replaces_instead_of_inserting() {
        let mut processor = processor_with(&["e1", "e2"]);
        processor
            .apply(&[TimelineDiff::Set {
                index: 1,
                item: unknown(),
            }])
            .expect("set should work");
        assert_eq!(ids(&processor), vec![Some("e1"), None]);
    }

    #[test]
    fn insert_shifts_following_items() {
        let mut processor = processor_with(&["e1", "e2"]);
        processor
            .apply(&[
                TimelineDiff::Insert {
                    index: 1,
                    item: remote("e3"),
                },
                TimelineDiff::Insert {
                    index: 3,
                    item: remote("e4"),
                },
            ])
            .expect("insert should work");
        assert_eq!(
            ids(&processor),
            vec![Some("e1"), Some("e3"), Some("e2"), Some("e4")]
        );
    }

    #[test]
    fn pops_and_truncates() {
        let mut processor = processor_with(&["e1", "e2", "e3", "e4"]);
        processor
            .apply(&[TimelineDiff::PopBack, TimelineDiff::PopFront])
            .expect("pops should work");
        assert_eq!(ids(&processor), vec![Some("e2"), Some("e3")]);

        processor
            .apply(&[TimelineDiff::Truncate { length: 1 }])
            .expect("truncate should work");
        assert_eq!(ids(&processor), vec![Some("e2")]);

        processor
            .apply(&[
                TimelineDiff::Truncate { length: 10 },
                TimelineDiff::PopFront,
                TimelineDiff::PopFront,
            ])
            .expect("truncate past end and pops on empty list are no-ops");
        assert!(processor.items().is_empty());
    }

    #[test]
    fn reset_discards_prior_state() {
        let mut processor = processor_with(&["e1", "e2", "e3"]);
        processor
            .apply(&[TimelineDiff::Reset {
                items: vec![remote("e9"), unknown()],
            }])
            .expect("reset should work");
        assert_eq!(ids(&processor), vec![Some("e9"), None]);
    }

    #[test]
    fn ops_within_a_batch_see_previous_ops() {
        let mut processor = processor_with(&["e1"]);
        let before = processor.items().len();
        processor
            .apply(&[
                TimelineDiff::PushBack { item: remote("e2") },
                TimelineDiff::Append {
                    items: vec![remote("e3"), remote("e4")],
                },
                TimelineDiff::Remove { index: 3 },
                TimelineDiff::Set {
                    index: 2,
                    item: remote("e5"),
                },
            ])
            .expect("batch should work");

        // +1 +2 -1
        assert_eq!(processor.items().len(), before + 2);
        assert_eq!(ids(&processor), vec![Some("e1"), Some("e2"), Some("e5")]);
    }

    #[test]
    fn out_of_range_keeps_last_good_list_until_reset() {
        let mut processor = processor_with(&["e1", "e2"]);

        let err = processor
            .apply(&[
                TimelineDiff::PushBack { item: remote("e3") },
                TimelineDiff::Remove { index: 7 },
                TimelineDiff::PushBack { item: remote("e4") },
            ])
            .expect_err("remove past the end should fail");
        assert_eq!(
            err,
            TimelineError::IndexOutOfRange {
                op: "remove",
                index: 7,
                len: 3,
            }
        );
        assert!(processor.needs_resync());
        assert_eq!(ids(&processor), vec![Some("e1"), Some("e2")]);

        let skipped = processor
            .apply(&[TimelineDiff::PushBack { item: remote("e5") }])
            .expect("batches are skipped while awaiting reset");
        assert!(!skipped.changed);
        assert_eq!(processor.items().len(), 2);

        processor
            .apply(&[
                TimelineDiff::PushBack { item: remote("ignored") },
                TimelineDiff::Reset {
                    items: vec![remote("r1")],
                },
                TimelineDiff::PushBack { item: remote("r2") },
            ])
            .expect("reset should resynchronize");
        assert!(!processor.needs_resync());
        assert_eq!(ids(&processor), vec![Some("r1"), Some("r2")]);
    }

    #[test]
    fn rejects_set_and_insert_past_the_end() {
        let mut processor = processor_with(&["e1"]);
        let set_err = processor
            .apply(&[TimelineDiff::Set {
                index: 1,
                item: remote("e2"),
            }])
            .expect_err("set at len should fail");
        assert!(matches!(
            set_err,
            TimelineError::IndexOutOfRange { op: "set", .. }
        ));

        let mut processor = processor_with(&["e1"]);
        let insert_err = processor
            .apply(&[TimelineDiff::Insert {
                index: 2,
                item: remote("e2"),
            }])
            .expect_err("insert past len should fail");
        assert!(matches!(
            insert_err,
            TimelineError::IndexOutOfRange { op: "insert", .. }
        ));
    }

    #[test]
    fn post_items_prepends_chunk_in_order() {
        let mut processor = processor_with(&["e3"]);
        processor.post_items(&[remote("e1"), remote("e2")]);
        assert_eq!(ids(&processor), vec![Some("e1"), Some("e2"), Some("e3")]);
    }

    #[test]
    fn reports_membership_and_sync_origin() {
        let mut processor = DiffProcessor::new(ItemMapper::new());
        let mut member = remote("m1");
        if let RemotePayload::Event(event) = &mut member.payload {
            event.event_type = "m.room.member".into();
            event.state_key = Some("@bob:example.org".into());
            event.content = json!({"membership": "join"});
            event.origin = EventOrigin::Sync;
        }

        let quiet = processor
            .apply(&[TimelineDiff::PushBack { item: remote("e1") }])
            .expect("push should work");
        assert!(!quiet.membership_changed);
        assert!(!quiet.has_synced_event);

        let outcome = processor
            .apply(&[TimelineDiff::PushBack { item: member }])
            .expect("push should work");
        assert!(outcome.membership_changed);
        assert!(outcome.has_synced_event);
        assert!(matches!(
            processor.items()[1].as_event().map(|event| &event.content),
            Some(EventContent::RoomMembership { .. })
        ));
    }

    struct CountingResolver(Arc<AtomicUsize>);

    impl DetailResolver for CountingResolver {
        fn fetch_details(&self, _event_id: String) -> DetailFuture {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
    }

    #[tokio::test]
    async fn detail_fetches_wait_for_the_batch_to_commit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mapper = ItemMapper::with_resolver(
            Arc::new(CountingResolver(Arc::clone(&calls))),
            CancellationToken::new(),
        );
        let mut processor = DiffProcessor::new(mapper);
        let mut reply = remote("r1");
        if let RemotePayload::Event(event) = &mut reply.payload {
            event.in_reply_to = Some(InReplyTo {
                event_id: "$parent".into(),
                state: ReplyState::Unavailable,
            });
        }

        processor
            .apply(&[
                TimelineDiff::PushBack {
                    item: reply.clone(),
                },
                TimelineDiff::Remove { index: 5 },
            ])
            .expect_err("remove past len should fail");
        assert_eq!(processor.mapper().pending_fetches(), 0);

        processor
            .apply(&[TimelineDiff::Reset { items: vec![reply] }])
            .expect("reset should work");
        assert_eq!(processor.mapper().pending_fetches(), 1);

        timeout(Duration::from_secs(2), async {
            while calls.load(Ordering::SeqCst) == 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("fetch should run after commit");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
