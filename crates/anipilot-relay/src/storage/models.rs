//! Data models for `AniPilot` relay storage.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    /// External chat handle notifications are delivered to.
    pub chat_id: i64,
    pub username: String,
    /// The one credential currently accepted for this user's agent.
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub notify_crash: bool,
    pub notify_marathon: bool,
    pub notify_offline: bool,
    pub notify_digest: bool,
    #[serde(skip_serializing)]
    pub connect_code: Option<String>,
    #[serde(skip_serializing)]
    pub code_expires: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Identity of a playable item. Numbers and strings never compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    Num(i64),
    Text(String),
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Playback descriptor: an item in the marathon queue or the current title.
///
/// Only `id` and `title` are interpreted here; everything else the agent
/// sends is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MediaItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ItemId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub(crate) struct SyncStateRow {
    pub user_id: String,
    pub is_online: bool,
    pub last_heartbeat: i64,
    pub notified_offline: bool,
    pub current_url: Option<String>,
    pub current_anime: Option<Json<MediaItem>>,
    pub current_season: Option<i64>,
    pub current_episode: Option<i64>,
    pub video_time: f64,
    pub video_duration: f64,
    pub is_playing: bool,
    pub marathon_on: bool,
    pub marathon_idx: i64,
    pub marathon_queue: Json<Vec<MediaItem>>,
    pub history: Json<Vec<Value>>,
    pub binge_today: i64,
    pub binge_date: Option<String>,
    pub watch_minutes: i64,
    pub updated_at: i64,
}

/// Per-user sync record. One row per user, reset but never destroyed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncState {
    pub user_id: String,
    pub online: bool,
    pub last_heartbeat: i64,
    pub notified_offline: bool,
    pub current_url: Option<String>,
    pub current_anime: Option<MediaItem>,
    pub current_season: Option<i64>,
    pub current_episode: Option<i64>,
    pub video_time: f64,
    pub video_duration: f64,
    pub playing: bool,
    pub marathon_on: bool,
    pub marathon_idx: i64,
    pub marathon_queue: Vec<MediaItem>,
    pub history: Vec<Value>,
    pub binge_today: i64,
    pub binge_date: Option<String>,
    pub watch_minutes: i64,
    pub updated_at: i64,
}

impl From<SyncStateRow> for SyncState {
    fn from(row: SyncStateRow) -> Self {
        Self {
            user_id: row.user_id,
            online: row.is_online,
            last_heartbeat: row.last_heartbeat,
            notified_offline: row.notified_offline,
            current_url: row.current_url,
            current_anime: row.current_anime.map(|j| j.0),
            current_season: row.current_season,
            current_episode: row.current_episode,
            video_time: row.video_time,
            video_duration: row.video_duration,
            playing: row.is_playing,
            marathon_on: row.marathon_on,
            marathon_idx: row.marathon_idx,
            marathon_queue: row.marathon_queue.0,
            history: row.history.0,
            binge_today: row.binge_today,
            binge_date: row.binge_date,
            watch_minutes: row.watch_minutes,
            updated_at: row.updated_at,
        }
    }
}

impl SyncState {
    /// A fresh record for a user that has never reported anything.
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            online: false,
            last_heartbeat: 0,
            notified_offline: false,
            current_url: None,
            current_anime: None,
            current_season: None,
            current_episode: None,
            video_time: 0.0,
            video_duration: 0.0,
            playing: false,
            marathon_on: false,
            marathon_idx: 0,
            marathon_queue: Vec::new(),
            history: Vec::new(),
            binge_today: 0,
            binge_date: None,
            watch_minutes: 0,
            updated_at: 0,
        }
    }

    /// Whether the agent can be expected to pick up a command soon.
    ///
    /// The raw `online` flag alone is never enough: an agent that crashed
    /// without saying goodbye stays flagged online until the liveness sweep.
    pub const fn is_reachable(&self, now_ms: i64, window_ms: i64) -> bool {
        self.online && now_ms.saturating_sub(self.last_heartbeat) < window_ms
    }

    /// Title of whatever the agent last reported playing.
    pub fn current_title(&self) -> Option<&str> {
        self.current_anime.as_ref().and_then(|a| a.title.as_deref())
    }

    /// Apply a patch in memory, exactly as the store would merge it.
    pub fn merged(&self, patch: &StatePatch) -> Self {
        let mut next = self.clone();
        if let Some(v) = patch.online {
            next.online = v;
        }
        if let Some(v) = patch.last_heartbeat {
            next.last_heartbeat = v;
        }
        if let Some(v) = patch.notified_offline {
            next.notified_offline = v;
        }
        if let Some(v) = &patch.url {
            next.current_url = Some(v.clone());
        }
        if let Some(v) = &patch.anime {
            next.current_anime = Some(v.clone());
        }
        if let Some(v) = patch.season {
            next.current_season = Some(v);
        }
        if let Some(v) = patch.episode {
            next.current_episode = Some(v);
        }
        if let Some(v) = patch.video_time {
            next.video_time = v;
        }
        if let Some(v) = patch.video_duration {
            next.video_duration = v;
        }
        if let Some(v) = patch.playing {
            next.playing = v;
        }
        if let Some(v) = patch.marathon_on {
            next.marathon_on = v;
        }
        if let Some(v) = patch.marathon_idx {
            next.marathon_idx = v;
        }
        if let Some(v) = &patch.marathon_queue {
            next.marathon_queue = v.clone();
        }
        if let Some(v) = &patch.history {
            next.history = v.clone();
        }
        if let Some(v) = patch.binge {
            next.binge_today = v;
        }
        if let Some(v) = &patch.binge_date {
            next.binge_date = Some(v.clone());
        }
        if let Some(v) = patch.watch_minutes {
            next.watch_minutes = v;
        }
        next
    }

    /// `0 <= marathon_idx < len(queue)` whenever a marathon is running.
    pub fn marathon_cursor_valid(&self) -> bool {
        !self.marathon_on
            || usize::try_from(self.marathon_idx).is_ok_and(|i| i < self.marathon_queue.len())
    }

    /// Pull a running cursor back into the queue. An empty queue stops the
    /// marathon. Returns `true` if anything changed.
    pub fn clamp_marathon_cursor(&mut self) -> bool {
        if self.marathon_cursor_valid() {
            return false;
        }
        let len = i64::try_from(self.marathon_queue.len()).unwrap_or(i64::MAX);
        if len == 0 {
            self.marathon_on = false;
            self.marathon_idx = 0;
        } else {
            self.marathon_idx = self.marathon_idx.clamp(0, len - 1);
        }
        true
    }
}

/// Partial update of a [`SyncState`]. Absent fields are left untouched.
///
/// Deserializes from the agent's heartbeat `state` object (camelCase keys,
/// `null` treated as absent). The liveness fields can only be set by the
/// relay itself.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatePatch {
    #[serde(skip)]
    pub online: Option<bool>,
    #[serde(skip)]
    pub last_heartbeat: Option<i64>,
    #[serde(skip)]
    pub notified_offline: Option<bool>,
    pub url: Option<String>,
    pub anime: Option<MediaItem>,
    pub season: Option<i64>,
    pub episode: Option<i64>,
    pub video_time: Option<f64>,
    pub video_duration: Option<f64>,
    pub playing: Option<bool>,
    pub marathon_on: Option<bool>,
    pub marathon_idx: Option<i64>,
    pub marathon_queue: Option<Vec<MediaItem>>,
    pub history: Option<Vec<Value>>,
    pub binge: Option<i64>,
    pub binge_date: Option<String>,
    pub watch_minutes: Option<i64>,
}

impl StatePatch {
    /// Whether the patch touches any of the marathon fields.
    pub const fn touches_marathon(&self) -> bool {
        self.marathon_on.is_some() || self.marathon_idx.is_some() || self.marathon_queue.is_some()
    }
}

/// A queued instruction for the agent. Deleted, not marked, on acknowledgment.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Command {
    pub id: i64,
    pub user_id: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub command_type: String,
    pub payload: Json<Value>,
    pub created_at: i64,
}

/// Partial update of a user's notification opt-ins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsPatch {
    pub notify_crash: Option<bool>,
    pub notify_marathon: Option<bool>,
    pub notify_offline: Option<bool>,
    pub notify_digest: Option<bool>,
}

impl SettingsPatch {
    pub const fn is_empty(&self) -> bool {
        self.notify_crash.is_none()
            && self.notify_marathon.is_none()
            && self.notify_offline.is_none()
            && self.notify_digest.is_none()
    }
}
