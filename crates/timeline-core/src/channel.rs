use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot, watch};

use crate::{
    error::TimelineError,
    pagination::PaginationState,
    pipeline::PipelineInput,
    types::{PaginationDirection, TimelineItem},
};

/// Immutable, fully post-processed list published to observers.
pub type TimelineSnapshot = Arc<[TimelineItem]>;

/// Replaying snapshot stream; a new subscriber sees the latest snapshot.
pub type SnapshotStream = watch::Receiver<TimelineSnapshot>;

/// Broadcast stream of side-band notifications.
pub type SignalStream = broadcast::Receiver<TimelineSignal>;

/// Side-band notifications raised while applying diffs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TimelineSignal {
    /// A room membership event was added or replaced.
    MembershipChanged,
    /// A batch contained an event received through sync.
    NewSyncedEvent,
    /// The mirror desynchronized; the engine must send a `Reset`.
    ResyncRequired,
}

/// Pipeline state visible to pagination control.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimelineStatus {
    /// The first batch has been posted.
    pub initialized: bool,
    /// A `Reset` is awaited after a desynchronized batch.
    pub needs_resync: bool,
    pub pagination: PaginationState,
}

/// Work items processed in order by the timeline worker.
#[derive(Debug)]
pub(crate) enum Command {
    Input(PipelineInput),
    BeginPagination {
        direction: PaginationDirection,
        reply: oneshot::Sender<Result<(), TimelineError>>,
    },
    Flush {
        reply: oneshot::Sender<()>,
    },
}

/// Handle-side ends of the worker channels.
#[derive(Clone, Debug)]
pub(crate) struct TimelineChannels {
    command_tx: mpsc::Sender<Command>,
    snapshot_rx: watch::Receiver<TimelineSnapshot>,
    status_rx: watch::Receiver<TimelineStatus>,
    signal_tx: broadcast::Sender<TimelineSignal>,
}

/// Worker-side ends of the channels.
#[derive(Debug)]
pub(crate) struct WorkerChannels {
    pub command_rx: mpsc::Receiver<Command>,
    pub snapshot_tx: watch::Sender<TimelineSnapshot>,
    pub status_tx: watch::Sender<TimelineStatus>,
    pub signal_tx: broadcast::Sender<TimelineSignal>,
}

impl TimelineChannels {
    pub(crate) fn new(
        command_buffer: usize,
        signal_buffer: usize,
        status: TimelineStatus,
    ) -> (Self, WorkerChannels) {
        let (command_tx, command_rx) = mpsc::channel(command_buffer.max(1));
        let (snapshot_tx, snapshot_rx) = watch::channel(TimelineSnapshot::from(Vec::new()));
        let (status_tx, status_rx) = watch::channel(status);
        let (signal_tx, _) = broadcast::channel(signal_buffer.max(1));

        (
            Self {
                command_tx,
                snapshot_rx,
                status_rx,
                signal_tx: signal_tx.clone(),
            },
            WorkerChannels {
                command_rx,
                snapshot_tx,
                status_tx,
                signal_tx,
            },
        )
    }

    /// Enqueue a command, failing once the worker is gone.
    pub(crate) async fn send(&self, command: Command) -> Result<(), TimelineError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| TimelineError::Closed)
    }

    /// Clone the snapshot receiver.
    pub(crate) fn snapshots(&self) -> SnapshotStream {
        self.snapshot_rx.clone()
    }

    /// Latest published snapshot.
    pub(crate) fn snapshot(&self) -> TimelineSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Latest published status.
    pub(crate) fn status(&self) -> TimelineStatus {
        *self.status_rx.borrow()
    }

    /// Clone the status receiver.
    pub(crate) fn status_updates(&self) -> watch::Receiver<TimelineStatus> {
        self.status_rx.clone()
    }

    /// Subscribe to signals emitted from now on.
    pub(crate) fn signals(&self) -> SignalStream {
        self.signal_tx.subscribe()
    }
}

impl WorkerChannels {
    /// Replace the published snapshot, even without subscribers.
    pub(crate) fn publish(&self, snapshot: Vec<TimelineItem>) {
        self.snapshot_tx.send_replace(TimelineSnapshot::from(snapshot));
    }

    /// Publish `status`, waking receivers only when it changed.
    pub(crate) fn publish_status(&self, status: TimelineStatus) {
        self.status_tx.send_if_modified(|current| {
            let modified = *current != status;
            *current = status;
            modified
        });
    }

    /// Emission is best-effort; lagged or absent subscribers are fine.
    pub(crate) fn emit(&self, signal: TimelineSignal) {
        let _ = self.signal_tx.send(signal);
    }
}
