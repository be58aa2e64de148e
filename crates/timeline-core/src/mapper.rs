//! Conversion of remote item handles into the local item model.

use std::{
    collections::HashSet,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex},
};

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{
    error::TimelineError,
    types::{
        EventContent, EventItem, MembershipChange, MessageType, RemoteEvent, RemoteItem,
        RemotePayload, RemoteVirtual, StateKind, TimelineItem, UniqueId, VirtualItem,
    },
};

/// Future returned by [`DetailResolver::fetch_details`].
pub type DetailFuture = Pin<Box<dyn Future<Output = Result<(), TimelineError>> + Send + 'static>>;

/// Collaborator that resolves extra event details (for example reply previews).
///
/// Completion is only observed through a later `Set` diff for the same item.
pub trait DetailResolver: Send + Sync + 'static {
    fn fetch_details(&self, event_id: String) -> DetailFuture;
}

/// Maps remote items and schedules detail fetches on the pipeline's lifetime.
#[derive(Clone)]
pub struct ItemMapper {
    resolver: Option<Arc<dyn DetailResolver>>,
    stop: CancellationToken,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl std::fmt::Debug for ItemMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemMapper")
            .field("has_resolver", &self.resolver.is_some())
            .field("stopped", &self.stop.is_cancelled())
            .finish()
    }
}

impl ItemMapper {
    /// Mapper that never fetches details.
    pub fn new() -> Self {
        Self {
            resolver: None,
            stop: CancellationToken::new(),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Mapper that resolves missing reply details through `resolver`.
    ///
    /// Fetches are spawned on the ambient tokio runtime and stop when `stop`
    /// is cancelled.
    pub fn with_resolver(resolver: Arc<dyn DetailResolver>, stop: CancellationToken) -> Self {
        Self {
            resolver: Some(resolver),
            stop,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Cancel every in-flight detail fetch.
    pub fn shutdown(&self) {
        self.stop.cancel();
    }

    /// Number of detail fetches that have not completed yet.
    pub fn pending_fetches(&self) -> usize {
        self.in_flight.lock().map(|set| set.len()).unwrap_or_default()
    }

    /// Map `remote` and schedule a detail fetch if its reply is unloaded.
    pub fn map(&self, remote: &RemoteItem) -> TimelineItem {
        let item = self.map_detached(remote);
        if let Some(event_id) = detail_request(&item) {
            self.fetch_details(event_id);
        }
        item
    }

    /// Map `remote` without scheduling any background work.
    pub(crate) fn map_detached(&self, remote: &RemoteItem) -> TimelineItem {
        match self.try_map(remote) {
            Ok(item) => item,
            Err(err) => {
                debug!(error = %err, "mapping remote item to Other");
                TimelineItem::Other
            }
        }
    }

    fn try_map(&self, remote: &RemoteItem) -> Result<TimelineItem, TimelineError> {
        if remote.unique_id.is_empty() {
            return Err(TimelineError::mapping("", "empty unique id"));
        }
        let unique_id = UniqueId::new(remote.unique_id.clone());
        if unique_id.is_marker() {
            return Err(TimelineError::mapping(
                &remote.unique_id,
                "id is reserved for local markers",
            ));
        }

        match &remote.payload {
            RemotePayload::Event(raw) => {
                let event = map_event(&remote.unique_id, raw)?;
                Ok(TimelineItem::Event { unique_id, event })
            }
            RemotePayload::Virtual(raw) => {
                let kind = map_virtual(&remote.unique_id, raw)?;
                Ok(TimelineItem::Virtual { unique_id, kind })
            }
            RemotePayload::Unknown => Err(TimelineError::mapping(
                &remote.unique_id,
                "item is neither an event nor a virtual item",
            )),
        }
    }

    pub(crate) fn fetch_details(&self, event_id: &str) {
        let Some(resolver) = self.resolver.clone() else {
            return;
        };
        if self.stop.is_cancelled() {
            return;
        }
        {
            let Ok(mut in_flight) = self.in_flight.lock() else {
                return;
            };
            if !in_flight.insert(event_id.to_owned()) {
                return;
            }
        }

        let event_id = event_id.to_owned();
        let stop = self.stop.child_token();
        let in_flight = Arc::clone(&self.in_flight);
        tokio::spawn(async move {
            tokio::select! {
                _ = stop.cancelled() => {
                    debug!(%event_id, "detail fetch cancelled");
                }
                result = resolver.fetch_details(event_id.clone()) => {
                    if let Err(err) = result {
                        warn!(%event_id, error = %err, "detail fetch failed");
                    }
                }
            }
            if let Ok(mut in_flight) = in_flight.lock() {
                in_flight.remove(&event_id);
            }
        });
    }
}

impl Default for ItemMapper {
    fn default() -> Self {
        Self::new()
    }
}

/// Event id whose reply details still have to be fetched.
pub(crate) fn detail_request(item: &TimelineItem) -> Option<&str> {
    item.as_event()
        .filter(|event| event.has_unloaded_reply())
        .and_then(|event| event.event_id.as_deref())
}

fn map_event(unique_id: &str, raw: &RemoteEvent) -> Result<EventItem, TimelineError> {
    if raw.sender.trim().is_empty() {
        return Err(TimelineError::mapping(unique_id, "event has no sender"));
    }

    Ok(EventItem {
        event_id: raw.event_id.clone(),
        sender: raw.sender.clone(),
        timestamp_ms: raw.timestamp_ms,
        origin: raw.origin,
        content: map_content(raw),
        in_reply_to: raw.in_reply_to.clone(),
    })
}

fn map_virtual(unique_id: &str, raw: &RemoteVirtual) -> Result<VirtualItem, TimelineError> {
    match raw {
        RemoteVirtual::DayDivider { timestamp_ms } => Ok(VirtualItem::DayDivider {
            timestamp_ms: *timestamp_ms,
        }),
        RemoteVirtual::ReadMarker => Ok(VirtualItem::ReadMarker),
        RemoteVirtual::TimelineStart => Ok(VirtualItem::RoomBeginning),
        RemoteVirtual::Unsupported => Err(TimelineError::mapping(
            unique_id,
            "unsupported virtual item",
        )),
    }
}

fn map_content(raw: &RemoteEvent) -> EventContent {
    let content = &raw.content;
    if !matches!(raw.event_type.as_str(), "m.room.member" | "m.room.create")
        && is_redacted(content)
    {
        return EventContent::Redacted;
    }

    let parsed = match (raw.event_type.as_str(), raw.state_key.as_deref()) {
        ("m.room.message", None) => map_message(content),
        ("m.room.encrypted", None) => Some(EventContent::UnableToDecrypt),
        ("m.room.member", Some(state_key)) => map_membership(state_key, content),
        (event_type, Some(state_key)) => Some(EventContent::State {
            state_key: state_key.to_owned(),
            kind: map_state_kind(event_type, content),
        }),
        _ => return EventContent::Unknown,
    };

    parsed.unwrap_or_else(|| EventContent::FailedToParse {
        event_type: raw.event_type.clone(),
        state_key: raw.state_key.clone(),
        error: "missing or invalid content fields".to_owned(),
    })
}

fn is_redacted(content: &Value) -> bool {
    content.as_object().is_some_and(|fields| fields.is_empty())
}

fn map_message(content: &Value) -> Option<EventContent> {
    let body = content.get("body")?.as_str()?.to_owned();
    let msgtype = match content.get("msgtype")?.as_str()? {
        "m.text" => MessageType::Text,
        "m.notice" => MessageType::Notice,
        "m.emote" => MessageType::Emote,
        "m.image" => MessageType::Image,
        "m.file" => MessageType::File,
        other => MessageType::Other(other.to_owned()),
    };
    Some(EventContent::Message { body, msgtype })
}

fn map_membership(state_key: &str, content: &Value) -> Option<EventContent> {
    let membership = content.get("membership")?.as_str()?;
    let prev_membership = content
        .get("prev_membership")
        .and_then(Value::as_str)
        .unwrap_or("leave");

    let displayname = content.get("displayname").and_then(Value::as_str);
    let prev_displayname = content.get("prev_displayname").and_then(Value::as_str);
    if membership == "join" && prev_membership == "join" {
        return Some(EventContent::ProfileChange {
            display_name: displayname.map(str::to_owned),
            prev_display_name: prev_displayname.map(str::to_owned),
        });
    }

    let change = match (prev_membership, membership) {
        ("invite", "join") => Some(MembershipChange::InvitationAccepted),
        ("invite", "leave") => Some(MembershipChange::InvitationRejected),
        ("ban", "leave") => Some(MembershipChange::Unbanned),
        ("join", "leave") if content.get("kicked_by").is_some() => Some(MembershipChange::Kicked),
        (_, "join") => Some(MembershipChange::Joined),
        (_, "leave") => Some(MembershipChange::Left),
        (_, "ban") => Some(MembershipChange::Banned),
        (_, "invite") => Some(MembershipChange::Invited),
        (_, "knock") => Some(MembershipChange::Knocked),
        _ => Some(MembershipChange::NotImplemented),
    };

    Some(EventContent::RoomMembership {
        user_id: state_key.to_owned(),
        change,
    })
}

fn map_state_kind(event_type: &str, content: &Value) -> StateKind {
    let text_field = |key: &str| content.get(key).and_then(Value::as_str).map(str::to_owned);
    match event_type {
        "m.policy.rule.room" => StateKind::PolicyRuleRoom,
        "m.policy.rule.server" => StateKind::PolicyRuleServer,
        "m.policy.rule.user" => StateKind::PolicyRuleUser,
        "m.room.aliases" => StateKind::RoomAliases,
        "m.room.avatar" => StateKind::RoomAvatar {
            url: text_field("url"),
        },
        "m.room.canonical_alias" => StateKind::RoomCanonicalAlias,
        "m.room.create" => StateKind::RoomCreate,
        "m.room.encryption" => StateKind::RoomEncryption,
        "m.room.guest_access" => StateKind::RoomGuestAccess,
        "m.room.history_visibility" => StateKind::RoomHistoryVisibility,
        "m.room.join_rules" => StateKind::RoomJoinRules,
        "m.room.name" => StateKind::RoomName {
            name: text_field("name"),
        },
        "m.room.pinned_events" => StateKind::RoomPinnedEvents,
        "m.room.power_levels" => StateKind::RoomPowerLevels,
        "m.room.server_acl" => StateKind::RoomServerAcl,
        "m.room.third_party_invite" => StateKind::RoomThirdPartyInvite,
        "m.room.tombstone" => StateKind::RoomTombstone,
        "m.room.topic" => StateKind::RoomTopic {
            topic: text_field("topic"),
        },
        "m.space.child" => StateKind::SpaceChild,
        "m.space.parent" => StateKind::SpaceParent,
        other => StateKind::Custom {
            event_type: other.to_owned(),
        },
    }
}
