//! Telegram Bot API message delivery.
//!
//! Posts to `sendMessage` with HTML formatting. The notifier is optional:
//! without a bot token the service runs with notifications disabled.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::TelegramConfig;
use crate::error::NotifyError;
use crate::notify::Notifier;

/// Telegram sendMessage client
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    api_base: String,
    bot_token: String,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

impl TelegramNotifier {
    /// Build a notifier when a bot token is configured.
    pub fn from_config(config: &TelegramConfig) -> Option<Arc<Self>> {
        config.bot_token.as_ref().map(|token| {
            info!("Telegram notifications enabled");
            Arc::new(Self {
                client: Client::new(),
                api_base: config.api_base.trim_end_matches('/').to_string(),
                bot_token: token.clone(),
            })
        })
    }

    fn send_message_url(&self) -> String {
        format!("{}/bot{}/sendMessage", self.api_base, self.bot_token)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), NotifyError> {
        let message = SendMessage {
            chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let resp = self
            .client
            .post(self.send_message_url())
            .json(&message)
            .send()
            .await
            .map_err(|e| NotifyError::Request(e.to_string()))?;

        if resp.status().is_success() {
            debug!(%chat_id, "Telegram message sent");
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(NotifyError::Rejected { status, body })
        }
    }
}
