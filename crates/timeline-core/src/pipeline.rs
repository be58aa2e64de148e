//! Per-timeline worker owning the authoritative list.
//!
//! One task per timeline drains a bounded command queue in order, so a diff
//! batch is always applied, post-processed and published before the next
//! input is looked at.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    channel::{
        Command, SignalStream, SnapshotStream, TimelineChannels, TimelineSignal, TimelineSnapshot,
        TimelineStatus, WorkerChannels,
    },
    clock::{Clock, SystemClock},
    config::PipelineConfig,
    diff::{DiffOutcome, DiffProcessor},
    error::TimelineError,
    mapper::{DetailResolver, ItemMapper},
    pagination::{PaginationState, PaginationStatus},
    postprocess::{AnchorState, ProcessContext, run_chain},
    types::{PaginationDirection, RemoteItem, RoomContext, TimelineDiff},
};

/// Inputs accepted by a timeline pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineInput {
    /// Cached items known before the first diff, oldest first.
    Initial { items: Vec<RemoteItem> },
    /// One batch of diff ops from the remote engine.
    Diffs { ops: Vec<TimelineDiff> },
    /// Pagination progress reported by the remote engine.
    Pagination {
        direction: PaginationDirection,
        status: PaginationStatus,
    },
    /// Updated room metadata.
    Room { context: RoomContext },
}

/// Collaborators of one pipeline.
pub struct TimelineDeps {
    pub room: RoomContext,
    pub clock: Arc<dyn Clock>,
    pub resolver: Option<Arc<dyn DetailResolver>>,
}

impl Default for TimelineDeps {
    fn default() -> Self {
        Self {
            room: RoomContext::default(),
            clock: Arc::new(SystemClock),
            resolver: None,
        }
    }
}

/// Cloneable front end of a running pipeline.
#[derive(Clone, Debug)]
pub struct TimelineHandle {
    channels: TimelineChannels,
    stop: CancellationToken,
}

impl TimelineHandle {
    /// Queue an input; waits while the queue is full.
    pub async fn send(&self, input: PipelineInput) -> Result<(), TimelineError> {
        if self.stop.is_cancelled() {
            return Err(TimelineError::Closed);
        }
        self.channels.send(Command::Input(input)).await
    }

    /// Snapshot stream; yields the latest snapshot immediately.
    pub fn subscribe(&self) -> SnapshotStream {
        self.channels.snapshots()
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> TimelineSnapshot {
        self.channels.snapshot()
    }

    /// Subscribe to signals emitted from now on.
    pub fn signals(&self) -> SignalStream {
        self.channels.signals()
    }

    /// Latest published initialization, resync and pagination state.
    pub fn status(&self) -> TimelineStatus {
        self.channels.status()
    }

    /// Status stream; yields the latest status immediately.
    pub fn status_updates(&self) -> watch::Receiver<TimelineStatus> {
        self.channels.status_updates()
    }

    /// Latest published pagination status of `direction`.
    pub fn pagination_status(&self, direction: PaginationDirection) -> PaginationStatus {
        self.status().pagination.get(direction)
    }

    /// Whether a pagination request in `direction` would currently be accepted.
    pub fn can_paginate(&self, direction: PaginationDirection) -> bool {
        let status = self.status();
        status.initialized && status.pagination.get(direction).can_paginate()
    }

    /// Mark `direction` as paginating.
    ///
    /// Fails with [`TimelineError::CannotPaginate`] before the first batch,
    /// while a request is running or when nothing more can be loaded.
    pub async fn begin_pagination(&self, direction: PaginationDirection) -> Result<(), TimelineError> {
        if self.stop.is_cancelled() {
            return Err(TimelineError::Closed);
        }
        let (reply, response) = oneshot::channel();
        self.channels
            .send(Command::BeginPagination { direction, reply })
            .await?;
        response.await.map_err(|_| TimelineError::Closed)?
    }

    /// Wait until every input queued before this call has been published.
    pub async fn flush(&self) -> Result<(), TimelineError> {
        let (reply, done) = oneshot::channel();
        self.channels.send(Command::Flush { reply }).await?;
        done.await.map_err(|_| TimelineError::Closed)
    }

    /// Tear the pipeline down and cancel its detail fetches.
    pub fn close(&self) {
        self.stop.cancel();
    }

    /// Whether [`close`](Self::close) was called or the worker exited.
    pub fn is_closed(&self) -> bool {
        self.stop.is_cancelled()
    }
}

/// Start a pipeline on the ambient tokio runtime.
pub fn spawn_timeline(config: PipelineConfig, deps: TimelineDeps) -> TimelineHandle {
    let pagination = PaginationState::for_mode(config.mode);
    let (channels, worker_channels) = TimelineChannels::new(
        config.input_buffer,
        config.signal_buffer,
        TimelineStatus {
            initialized: false,
            needs_resync: false,
            pagination,
        },
    );
    let stop = CancellationToken::new();
    let mapper = match deps.resolver {
        Some(resolver) => ItemMapper::with_resolver(resolver, stop.child_token()),
        None => ItemMapper::new(),
    };

    let worker = TimelineWorker {
        config,
        channels: worker_channels,
        processor: DiffProcessor::new(mapper),
        anchors: AnchorState::default(),
        pagination,
        room: deps.room,
        clock: deps.clock,
        initialized: false,
        stop: stop.clone(),
    };
    tokio::spawn(async move {
        worker.run().await;
    });

    TimelineHandle { channels, stop }
}

struct TimelineWorker {
    config: PipelineConfig,
    channels: WorkerChannels,
    processor: DiffProcessor,
    anchors: AnchorState,
    pagination: PaginationState,
    room: RoomContext,
    clock: Arc<dyn Clock>,
    initialized: bool,
    stop: CancellationToken,
}

impl TimelineWorker {
    async fn run(mut self) {
        debug!(mode = ?self.config.mode, "timeline worker started");
        self.publish();
        loop {
            let command = tokio::select! {
                _ = self.stop.cancelled() => break,
                command = self.channels.command_rx.recv() => command,
            };
            let Some(command) = command else {
                break;
            };
            self.handle_command(command);
        }

        self.stop.cancel();
        self.processor.mapper().shutdown();
        self.processor.reset();
        debug!("timeline worker stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Input(input) => self.handle_input(input),
            Command::BeginPagination { direction, reply } => {
                let result = self.begin_pagination(direction);
                let _ = reply.send(result);
            }
            Command::Flush { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn handle_input(&mut self, input: PipelineInput) {
        match input {
            PipelineInput::Initial { items } => self.post_initial(&items),
            PipelineInput::Diffs { ops } => self.apply_diffs(&ops),
            PipelineInput::Pagination { direction, status } => {
                if self.pagination.set(direction, status) {
                    self.publish();
                }
                self.publish_status();
            }
            PipelineInput::Room { context } => {
                if self.room != context {
                    self.room = context;
                    self.publish();
                }
            }
        }
    }

    fn post_initial(&mut self, items: &[RemoteItem]) {
        let chunk_size = self.config.initial_chunk_size.max(1);
        let chunk_count = items.len().div_ceil(chunk_size);
        info!(
            items = items.len(),
            chunks = chunk_count,
            "posting initial timeline items"
        );

        self.processor.reset();
        if chunk_count == 0 {
            self.initialized = true;
            self.publish();
        }
        for (posted, chunk) in items.chunks(chunk_size).rev().enumerate() {
            self.processor.post_items(chunk);
            if posted + 1 == chunk_count {
                self.initialized = true;
            }
            self.publish();
        }
        self.publish_status();
    }

    fn apply_diffs(&mut self, ops: &[TimelineDiff]) {
        let first_batch = !self.initialized;
        match self.processor.apply(ops) {
            Ok(outcome) => {
                self.initialized = true;
                if outcome.changed || first_batch {
                    self.publish();
                }
                self.publish_status();
                self.emit_outcome(outcome);
            }
            Err(err) => {
                debug!(code = err.code(), "requesting timeline resync");
                self.publish_status();
                self.channels.emit(TimelineSignal::ResyncRequired);
            }
        }
    }

    fn begin_pagination(&mut self, direction: PaginationDirection) -> Result<(), TimelineError> {
        let status = self.pagination.get(direction);
        if !self.initialized || !status.can_paginate() {
            debug!(
                ?direction,
                initialized = self.initialized,
                ?status,
                "rejecting pagination request"
            );
            return Err(TimelineError::CannotPaginate(direction));
        }
        self.pagination.set(
            direction,
            PaginationStatus::new(true, status.has_more_to_load),
        );
        self.publish_status();
        Ok(())
    }

    fn emit_outcome(&self, outcome: DiffOutcome) {
        if outcome.membership_changed {
            self.channels.emit(TimelineSignal::MembershipChanged);
        }
        if outcome.has_synced_event {
            self.channels.emit(TimelineSignal::NewSyncedEvent);
        }
    }

    fn publish(&mut self) {
        let ctx = ProcessContext {
            mode: self.config.mode,
            room: &self.room,
            has_more_to_load_backward: self.pagination.backward.has_more_to_load,
            has_more_to_load_forward: self.pagination.forward.has_more_to_load,
            is_initialized: self.initialized,
            clock: self.clock.as_ref(),
        };
        let snapshot = run_chain(self.processor.items(), &ctx, &mut self.anchors);
        debug!(
            items = self.processor.items().len(),
            visible = snapshot.len(),
            "publishing timeline snapshot"
        );
        self.channels.publish(snapshot);
    }

    fn publish_status(&self) {
        self.channels.publish_status(TimelineStatus {
            initialized: self.initialized,
            needs_resync: self.processor.needs_resync(),
            pagination: self.pagination,
        });
    }
}
