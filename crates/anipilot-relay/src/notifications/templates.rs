//! Fixed message templates, one per [`NotificationKind`].
//!
//! Each template is a pure mapping from payload to text and buttons. Missing
//! or empty payload fields render as `?`.

use serde_json::Value;

use super::NotificationKind;

const UNKNOWN: &str = "?";
const DEFAULT_TITLE: &str = "Anime";

/// A labelled button. `callback` is `<verb>:<user_id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub label: String,
    pub callback: String,
}

/// Markdown text plus rows of actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub text: String,
    pub actions: Vec<Vec<Action>>,
}

impl RenderedMessage {
    /// A message with no buttons.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            actions: Vec::new(),
        }
    }
}

/// Confirmation sent to the chat when an agent redeems a pairing code.
pub fn agent_linked() -> RenderedMessage {
    RenderedMessage::plain("✅ *Agent linked!*\nAniPilot is connected to this chat.")
}

pub fn render(kind: NotificationKind, payload: &Value, user_id: &str) -> RenderedMessage {
    let action = |label: &str, verb: &str| Action {
        label: label.to_string(),
        callback: format!("{verb}:{user_id}"),
    };

    match kind {
        NotificationKind::VideoCrash => {
            let mut text = format!(
                "⚠️ *Playback interrupted*\n{} S{}E{}",
                field(payload, "title").unwrap_or_else(|| DEFAULT_TITLE.into()),
                or_unknown(field(payload, "season")),
                or_unknown(field(payload, "episode")),
            );
            if let Some(time) = payload
                .get("time")
                .and_then(Value::as_f64)
                .filter(|t| *t > 0.0)
            {
                text.push_str("\n⏱ at ");
                text.push_str(&fmt_time(time));
            }
            RenderedMessage {
                text,
                actions: vec![
                    vec![action("▶ Resume", "resume")],
                    vec![action("🔍 Find another", "search")],
                ],
            }
        }
        NotificationKind::ConnectionLost => {
            let mut text = String::from("📡 *Connection lost*");
            if let Some(title) = field(payload, "title") {
                text.push_str("\nLast: ");
                text.push_str(&title);
            }
            RenderedMessage {
                text,
                actions: vec![vec![action("▶ Resume", "resume")]],
            }
        }
        NotificationKind::MarathonCrash => RenderedMessage {
            text: format!(
                "💥 *Marathon interrupted*\n{} ({}/{})",
                or_unknown(field(payload, "title")),
                or_unknown(field(payload, "idx")),
                or_unknown(field(payload, "total")),
            ),
            actions: vec![vec![
                action("▶ Continue", "mcont"),
                action("⏹ Stop", "mstop"),
            ]],
        },
        NotificationKind::MarathonComplete => {
            let mut text = format!(
                "🎉 *Marathon complete!*\n{} titles",
                or_unknown(field(payload, "total"))
            );
            if let Some(time) = field(payload, "time") {
                text.push_str(", ");
                text.push_str(&time);
            }
            RenderedMessage {
                text,
                actions: vec![vec![
                    action("🔄 New marathon", "mnew"),
                    action("📊 Stats", "stats"),
                ]],
            }
        }
        NotificationKind::ScriptOffline => {
            let mut text = String::from("🔌 *AniPilot disconnected*\nNot responding for 10+ min");
            if let Some(title) = field(payload, "title") {
                text.push_str("\nLast: ");
                text.push_str(&title);
            }
            RenderedMessage {
                text,
                actions: vec![vec![action("🔄 Check", "check")]],
            }
        }
    }
}

/// A payload field as display text; empty strings and zero count as missing.
fn field(payload: &Value, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        _ => None,
    }
}

fn or_unknown(value: Option<String>) -> String {
    value.unwrap_or_else(|| UNKNOWN.into())
}

/// Seconds as `m:ss`.
#[allow(clippy::cast_possible_truncation)]
fn fmt_time(secs: f64) -> String {
    let total = secs.floor() as i64;
    format!("{}:{:02}", total / 60, total % 60)
}
