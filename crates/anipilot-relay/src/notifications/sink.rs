//! Delivery of rendered messages to a chat.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use super::{NotificationError, RenderedMessage};

/// Default chat platform API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Where rendered notifications go.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, chat_id: i64, message: &RenderedMessage)
    -> Result<(), NotificationError>;
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboard<'a>>,
}

#[derive(Debug, Serialize)]
struct InlineKeyboard<'a> {
    inline_keyboard: Vec<Vec<InlineButton<'a>>>,
}

#[derive(Debug, Serialize)]
struct InlineButton<'a> {
    text: &'a str,
    callback_data: &'a str,
}

impl<'a> SendMessage<'a> {
    fn new(chat_id: i64, message: &'a RenderedMessage) -> Self {
        let reply_markup = (!message.actions.is_empty()).then(|| InlineKeyboard {
            inline_keyboard: message
                .actions
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|a| InlineButton {
                            text: &a.label,
                            callback_data: &a.callback,
                        })
                        .collect()
                })
                .collect(),
        });
        Self {
            chat_id,
            text: &message.text,
            parse_mode: "Markdown",
            reply_markup,
        }
    }
}

/// Sends messages through the chat bot HTTP API.
#[derive(Debug)]
pub struct TelegramSink {
    http: reqwest::Client,
    send_url: String,
}

impl TelegramSink {
    /// Build a sink for `bot_token`. Every request is bounded by `timeout`.
    pub fn new(
        api_base: &str,
        bot_token: &str,
        timeout: Duration,
    ) -> Result<Self, NotificationError> {
        // reqwest is built with rustls-no-provider; Err means already installed.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotificationError::Request(e.to_string()))?;

        let send_url = format!(
            "{}/bot{bot_token}/sendMessage",
            api_base.trim_end_matches('/')
        );
        Ok(Self { http, send_url })
    }
}

#[async_trait]
impl NotificationSink for TelegramSink {
    async fn deliver(
        &self,
        chat_id: i64,
        message: &RenderedMessage,
    ) -> Result<(), NotificationError> {
        let response = self
            .http
            .post(&self.send_url)
            .json(&SendMessage::new(chat_id, message))
            .send()
            .await
            .map_err(|e| NotificationError::Request(e.without_url().to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(chat_id, "Chat message sent");
            Ok(())
        } else {
            let status_code = status.as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            warn!(status = status_code, body = %body, "Chat API returned error");
            Err(NotificationError::ApiError {
                status: status_code,
                body,
            })
        }
    }
}

/// Records every delivery instead of sending it.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    sent: std::sync::Mutex<Vec<(i64, RenderedMessage)>>,
    fail: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
impl RecordingSink {
    pub(crate) fn sent(&self) -> Vec<(i64, RenderedMessage)> {
        self.sent.lock().unwrap().clone()
    }

    /// Make every subsequent delivery fail.
    pub(crate) fn set_failing(&self, fail: bool) {
        self.fail.store(fail, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(
        &self,
        chat_id: i64,
        message: &RenderedMessage,
    ) -> Result<(), NotificationError> {
        if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(NotificationError::ApiError {
                status: 502,
                body: "unavailable".into(),
            });
        }
        self.sent.lock().unwrap().push((chat_id, message.clone()));
        Ok(())
    }
}
