use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix of ids minted locally for markers; remote items may not use it.
pub const MARKER_ID_PREFIX: &str = "~marker:";

/// Stable, list-scoped identifier of a timeline item.
///
/// The same underlying event keeps the same id across snapshots, which is what
/// lets stateful post-processors and UI diffing recognize it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniqueId(String);

impl UniqueId {
    /// Wrap an engine-provided id as is.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Id of a locally inserted marker, kept apart from engine ids by
    /// [`MARKER_ID_PREFIX`].
    pub fn marker(name: &str) -> Self {
        Self(format!("{MARKER_ID_PREFIX}{name}"))
    }

    /// Whether the id lies in the namespace reserved for local markers.
    pub fn is_marker(&self) -> bool {
        self.0.starts_with(MARKER_ID_PREFIX)
    }

    /// Borrow the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UniqueId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for UniqueId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Which slice of the room a timeline instance is tracking.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TimelineMode {
    /// Follows the current tip of the room.
    #[default]
    Live,
    /// Historical view opened around a specific event.
    FocusedOnEvent,
    /// Only the room's pinned events.
    PinnedEvents,
}

/// Direction of a pagination request or loading indicator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaginationDirection {
    /// Towards older events.
    Backwards,
    /// Towards newer events.
    Forwards,
}

/// Where an event entered the timeline from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventOrigin {
    /// Echo of a locally sent event.
    Local,
    /// Received through the sync loop.
    Sync,
    /// Loaded by a pagination request.
    Pagination,
    /// Restored from the local store.
    #[default]
    Cache,
}

/// Matrix message type of a room message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// `m.text`
    Text,
    /// `m.notice`
    Notice,
    /// `m.emote`
    Emote,
    /// `m.image`
    Image,
    /// `m.file`
    File,
    /// Any other `msgtype`, kept verbatim.
    Other(String),
}

/// Membership transition carried by an `m.room.member` event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MembershipChange {
    Joined,
    Left,
    Banned,
    Unbanned,
    Kicked,
    Invited,
    InvitationAccepted,
    InvitationRejected,
    Knocked,
    NotImplemented,
}

/// State event kinds other than membership.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateKind {
    PolicyRuleRoom,
    PolicyRuleServer,
    PolicyRuleUser,
    RoomAliases,
    RoomAvatar { url: Option<String> },
    RoomCanonicalAlias,
    RoomCreate,
    RoomEncryption,
    RoomGuestAccess,
    RoomHistoryVisibility,
    RoomJoinRules,
    RoomName { name: Option<String> },
    RoomPinnedEvents,
    RoomPowerLevels,
    RoomServerAcl,
    RoomThirdPartyInvite,
    RoomTombstone,
    RoomTopic { topic: Option<String> },
    SpaceChild,
    SpaceParent,
    Custom { event_type: String },
}

impl StateKind {
    /// Whether the state change is meant to be rendered in the timeline.
    ///
    /// Policy rules, server ACLs, alias lists, space hierarchy links and
    /// custom state are bookkeeping and stay hidden.
    pub fn is_user_visible(&self) -> bool {
        !matches!(
            self,
            Self::PolicyRuleRoom
                | Self::PolicyRuleServer
                | Self::PolicyRuleUser
                | Self::RoomAliases
                | Self::RoomServerAcl
                | Self::SpaceChild
                | Self::SpaceParent
                | Self::Custom { .. }
        )
    }
}

/// Resolution state of the event a message replies to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ReplyState {
    /// Details were never requested.
    Unavailable,
    /// A fetch is in progress upstream.
    Pending,
    /// Details are known.
    Ready { sender: String, body: String },
    /// The last fetch failed.
    Error { message: String },
}

/// Reply relation of an event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InReplyTo {
    /// Event being replied to.
    pub event_id: String,
    /// How much we know about it.
    pub state: ReplyState,
}

/// Mapped content of a timeline event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventContent {
    Message {
        body: String,
        msgtype: MessageType,
    },
    RoomMembership {
        user_id: String,
        change: Option<MembershipChange>,
    },
    ProfileChange {
        display_name: Option<String>,
        prev_display_name: Option<String>,
    },
    State {
        state_key: String,
        kind: StateKind,
    },
    Redacted,
    UnableToDecrypt,
    /// A known event type whose content could not be parsed.
    FailedToParse {
        event_type: String,
        state_key: Option<String>,
        error: String,
    },
    Unknown,
}

impl EventContent {
    /// Whether this content must never be shown to the user.
    pub fn is_hidden_state(&self) -> bool {
        match self {
            Self::State { kind, .. } => !kind.is_user_visible(),
            Self::FailedToParse { state_key, .. } => state_key.is_some(),
            _ => false,
        }
    }
}

/// A chat event after mapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventItem {
    /// Event ID, absent for local echoes that have not been sent yet.
    pub event_id: Option<String>,
    /// Sender user ID.
    pub sender: String,
    /// Origin server timestamp in milliseconds since Unix epoch.
    pub timestamp_ms: u64,
    /// Where the event came from.
    pub origin: EventOrigin,
    /// Mapped event content.
    pub content: EventContent,
    /// Reply relation, if any.
    pub in_reply_to: Option<InReplyTo>,
}

impl EventItem {
    pub fn is_membership_change(&self) -> bool {
        matches!(self.content, EventContent::RoomMembership { .. })
    }

    pub fn is_room_create(&self) -> bool {
        matches!(
            self.content,
            EventContent::State {
                kind: StateKind::RoomCreate,
                ..
            }
        )
    }

    /// Whether `user_id` joining is what this event records.
    pub fn is_join_of(&self, user_id: &str) -> bool {
        matches!(
            &self.content,
            EventContent::RoomMembership {
                user_id: member,
                change: Some(MembershipChange::Joined),
            } if member == user_id
        )
    }

    /// Reply details that have never been requested.
    pub fn has_unloaded_reply(&self) -> bool {
        matches!(
            self.in_reply_to,
            Some(InReplyTo {
                state: ReplyState::Unavailable,
                ..
            })
        )
    }
}

/// Synthetic, UI-only timeline entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VirtualItem {
    LoadingIndicator {
        direction: PaginationDirection,
        timestamp_ms: u64,
    },
    TypingNotification,
    RoomBeginning,
    EncryptedHistoryBanner,
    LastForwardIndicator,
    LatestKnownEventIndicator,
    DayDivider {
        timestamp_ms: u64,
    },
    ReadMarker,
}

/// One entry of the timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum TimelineItem {
    Event {
        unique_id: UniqueId,
        event: EventItem,
    },
    Virtual {
        unique_id: UniqueId,
        kind: VirtualItem,
    },
    /// Placeholder for an item that could not be mapped.
    Other,
}

impl TimelineItem {
    /// Virtual item with a locally minted marker id.
    pub fn marker(name: &str, kind: VirtualItem) -> Self {
        Self::Virtual {
            unique_id: UniqueId::marker(name),
            kind,
        }
    }

    /// Virtual item with an explicit id.
    pub fn virtual_item(unique_id: impl Into<UniqueId>, kind: VirtualItem) -> Self {
        Self::Virtual {
            unique_id: unique_id.into(),
            kind,
        }
    }

    /// Id of the item; `Other` has none.
    pub fn unique_id(&self) -> Option<&UniqueId> {
        match self {
            Self::Event { unique_id, .. } | Self::Virtual { unique_id, .. } => Some(unique_id),
            Self::Other => None,
        }
    }

    pub fn as_event(&self) -> Option<&EventItem> {
        match self {
            Self::Event { event, .. } => Some(event),
            _ => None,
        }
    }

    pub fn as_virtual(&self) -> Option<&VirtualItem> {
        match self {
            Self::Virtual { kind, .. } => Some(kind),
            _ => None,
        }
    }

    pub fn is_event(&self) -> bool {
        matches!(self, Self::Event { .. })
    }
}

/// Identifier of the newest `Event` item in a list.
pub fn latest_event_id(items: &[TimelineItem]) -> Option<&UniqueId> {
    items.iter().rev().find_map(|item| match item {
        TimelineItem::Event { unique_id, .. } => Some(unique_id),
        _ => None,
    })
}

/// Opaque item handle as delivered by the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteItem {
    /// Engine-assigned stable identifier.
    pub unique_id: String,
    /// What the engine knows about the item.
    pub payload: RemotePayload,
}

/// Classification of a remote item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemotePayload {
    Event(RemoteEvent),
    Virtual(RemoteVirtual),
    /// Anything the engine could not classify itself.
    #[serde(other)]
    Unknown,
}

/// Raw event as delivered by the sync engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteEvent {
    pub event_id: Option<String>,
    pub sender: String,
    pub timestamp_ms: u64,
    #[serde(default)]
    pub origin: EventOrigin,
    /// Matrix event type, for example `m.room.message`.
    pub event_type: String,
    /// Present for state events.
    #[serde(default)]
    pub state_key: Option<String>,
    /// Raw event content.
    #[serde(default)]
    pub content: serde_json::Value,
    #[serde(default)]
    pub in_reply_to: Option<InReplyTo>,
}

/// Engine-produced virtual item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "marker", rename_all = "snake_case")]
pub enum RemoteVirtual {
    DayDivider {
        timestamp_ms: u64,
    },
    ReadMarker,
    /// Start of the room's history.
    TimelineStart,
    #[serde(other)]
    Unsupported,
}

/// One structural operation of a diff batch.
///
/// Each op is defined against the list as left by the previous op of the
/// same batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TimelineDiff<T = RemoteItem> {
    Append { items: Vec<T> },
    PushBack { item: T },
    PushFront { item: T },
    Set { index: usize, item: T },
    Insert { index: usize, item: T },
    Remove { index: usize },
    PopBack,
    PopFront,
    Clear,
    Truncate { length: usize },
    Reset { items: Vec<T> },
}

impl<T> TimelineDiff<T> {
    /// Stable op name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Append { .. } => "append",
            Self::PushBack { .. } => "push_back",
            Self::PushFront { .. } => "push_front",
            Self::Set { .. } => "set",
            Self::Insert { .. } => "insert",
            Self::Remove { .. } => "remove",
            Self::PopBack => "pop_back",
            Self::PopFront => "pop_front",
            Self::Clear => "clear",
            Self::Truncate { .. } => "truncate",
            Self::Reset { .. } => "reset",
        }
    }

    /// Items newly introduced by this op.
    pub fn items(&self) -> &[T] {
        match self {
            Self::Append { items } | Self::Reset { items } => items,
            Self::PushBack { item }
            | Self::PushFront { item }
            | Self::Set { item, .. }
            | Self::Insert { item, .. } => std::slice::from_ref(item),
            _ => &[],
        }
    }
}

/// Room metadata the post-processors depend on.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomContext {
    /// Whether the room is a direct message room.
    #[serde(default)]
    pub is_dm: bool,
    /// Explicit room creator, when known.
    #[serde(default)]
    pub room_creator: Option<String>,
    /// Whether the room is end-to-end encrypted.
    #[serde(default)]
    pub is_encrypted: bool,
    /// Whether server-side key backup is enabled for this session.
    #[serde(default)]
    pub is_key_backup_enabled: bool,
    /// Last login time in milliseconds since Unix epoch.
    #[serde(default)]
    pub last_login_timestamp_ms: Option<u64>,
}
