//! Marathon queue actions issued by the control plane.
//!
//! The queue itself is edited here and pushed to the agent with a
//! `marathon_sync` command. Whether a marathon is running, and where its
//! cursor is, belongs to the agent: `start`, `next` and `stop` only queue
//! intents, and the result arrives with later heartbeats. `clear` is the one
//! action applied eagerly so it works while the agent is unreachable.

use std::sync::Arc;

use anipilot_core::Clock;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{info, instrument};

use crate::storage::{ItemId, MediaItem, RelayDatabase, StatePatch, SyncState};
use crate::sync::{SyncError, SyncService};

/// Command tags understood by the agent.
pub mod tags {
    pub const SYNC: &str = "marathon_sync";
    pub const START: &str = "marathon_start";
    pub const NEXT: &str = "marathon_next";
    pub const STOP: &str = "marathon_stop";
    pub const CLEAR: &str = "marathon_clear";
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarathonAction {
    Add(MediaItem),
    Remove(ItemId),
    Reorder(Vec<MediaItem>),
    Start,
    Next,
    Stop,
    Clear,
}

#[derive(Debug, Default, Deserialize)]
struct RemovePayload {
    id: Option<ItemId>,
}

#[derive(Debug, Default, Deserialize)]
struct ReorderPayload {
    #[serde(default)]
    queue: Vec<MediaItem>,
}

fn payload_as<T: serde::de::DeserializeOwned>(payload: Option<Value>) -> Result<T, SyncError> {
    serde_json::from_value(payload.unwrap_or_else(|| json!({})))
        .map_err(|e| SyncError::Validation(format!("Invalid payload: {e}")))
}

impl MarathonAction {
    /// Parse the control plane's `{action, payload}` pair.
    pub fn parse(action: &str, payload: Option<Value>) -> Result<Self, SyncError> {
        match action {
            "add" => {
                let item: MediaItem = payload_as(payload)?;
                if item.id.is_none() {
                    return Err(SyncError::Validation("Item id is required".into()));
                }
                Ok(Self::Add(item))
            }
            "remove" => payload_as::<RemovePayload>(payload)?
                .id
                .map(Self::Remove)
                .ok_or_else(|| SyncError::Validation("Item id is required".into())),
            "reorder" => Ok(Self::Reorder(payload_as::<ReorderPayload>(payload)?.queue)),
            "start" => Ok(Self::Start),
            "next" => Ok(Self::Next),
            "stop" => Ok(Self::Stop),
            "clear" => Ok(Self::Clear),
            other => Err(SyncError::Validation(format!("Unknown action: {other}"))),
        }
    }
}

/// Result of an applied action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarathonOutcome {
    Applied,
    /// `add` of an item already queued; nothing changed.
    Exists,
}

pub struct MarathonService {
    db: RelayDatabase,
    sync: Arc<SyncService>,
    clock: Arc<dyn Clock>,
}

impl MarathonService {
    pub fn new(db: RelayDatabase, sync: Arc<SyncService>, clock: Arc<dyn Clock>) -> Self {
        Self { db, sync, clock }
    }

    #[instrument(skip(self, action))]
    pub async fn apply(
        &self,
        user_id: &str,
        action: MarathonAction,
    ) -> Result<MarathonOutcome, SyncError> {
        let state = self
            .sync
            .state(user_id)
            .await?
            .unwrap_or_else(|| SyncState::empty(user_id));

        match action {
            MarathonAction::Add(item) => {
                if state
                    .marathon_queue
                    .iter()
                    .any(|queued| queued.id.is_some() && queued.id == item.id)
                {
                    return Ok(MarathonOutcome::Exists);
                }
                let mut queue = state.marathon_queue.clone();
                queue.push(item);
                self.replace_queue(&state, queue).await?;
            }
            MarathonAction::Remove(id) => {
                let queue = state
                    .marathon_queue
                    .iter()
                    .filter(|queued| queued.id.as_ref() != Some(&id))
                    .cloned()
                    .collect();
                self.replace_queue(&state, queue).await?;
            }
            MarathonAction::Reorder(queue) => {
                self.replace_queue(&state, queue).await?;
            }
            MarathonAction::Start => {
                self.sync.enqueue(user_id, tags::START, &json!({})).await?;
            }
            MarathonAction::Next => {
                self.sync.enqueue(user_id, tags::NEXT, &json!({})).await?;
            }
            MarathonAction::Stop => {
                self.sync.enqueue(user_id, tags::STOP, &json!({})).await?;
            }
            MarathonAction::Clear => {
                let patch = StatePatch {
                    marathon_queue: Some(Vec::new()),
                    marathon_on: Some(false),
                    marathon_idx: Some(0),
                    ..StatePatch::default()
                };
                self.write(user_id, &patch).await?;
                self.sync.enqueue(user_id, tags::CLEAR, &json!({})).await?;
                info!(user_id = %user_id, "Marathon cleared");
            }
        }
        Ok(MarathonOutcome::Applied)
    }

    /// Store a new queue and push it to the agent.
    ///
    /// A running cursor that would fall off the end is pulled back onto the
    /// last item; an emptied queue stops the marathon.
    async fn replace_queue(
        &self,
        state: &SyncState,
        queue: Vec<MediaItem>,
    ) -> Result<(), SyncError> {
        let mut next = state.clone();
        next.marathon_queue = queue;
        let mut patch = StatePatch::default();
        if next.clamp_marathon_cursor() {
            patch.marathon_on = Some(next.marathon_on);
            patch.marathon_idx = Some(next.marathon_idx);
        }

        let payload = json!({ "queue": &next.marathon_queue });
        patch.marathon_queue = Some(next.marathon_queue);
        self.write(&state.user_id, &patch).await?;
        self.sync.enqueue(&state.user_id, tags::SYNC, &payload).await?;

        info!(
            user_id = %state.user_id,
            len = patch.marathon_queue.as_ref().map_or(0, Vec::len),
            "Marathon queue updated"
        );
        Ok(())
    }

    async fn write(&self, user_id: &str, patch: &StatePatch) -> Result<(), SyncError> {
        self.db
            .upsert_state(user_id, patch, self.clock.now_ms())
            .await?;
        Ok(())
    }
}
