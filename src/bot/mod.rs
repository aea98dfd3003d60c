//! Telegram webhook bot: update parsing, commands, and reply formatting.
//!
//! The webhook handler feeds raw updates in here; each command maps onto a
//! dispatcher or store operation and produces one HTML reply. Unknown input
//! that looks like a ticker is treated as a symbol check.

use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{EvalError, Result};
use crate::notify::Notifier;
use crate::scanner::{ScanDispatcher, StartScanOutcome};
use crate::store::SessionStore;
use crate::universe::popular_symbols;

mod format;

pub use format::{format_check, format_quick_scan, format_results, format_status};

/// How many popular symbols the quick `/scan` covers.
const QUICK_SCAN_COUNT: usize = 10;

/// Incoming webhook payload. Only text messages matter; everything else is
/// acknowledged and dropped.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    pub chat: IncomingChat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IncomingChat {
    pub id: i64,
}

/// Parsed bot command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Stop,
    Help,
    Status,
    /// Show the most recent completed scan's passing symbols.
    List,
    /// Immediate scan of the popular-symbol shortlist.
    QuickScan,
    /// Force-start a full scan.
    ScanAll,
    Check(String),
    Unknown(String),
}

impl BotCommand {
    /// Parse one message. Bare ticker-looking text becomes a check.
    pub fn parse(text: &str) -> Self {
        let mut parts = text.trim().split_whitespace();
        let head = parts.next().unwrap_or_default();
        // Strip the @botname suffix used in group chats.
        let head = head.split('@').next().unwrap_or(head);
        let arg = parts.next();

        match head.to_ascii_lowercase().as_str() {
            "/start" => Self::Start,
            "/stop" => Self::Stop,
            "/help" => Self::Help,
            "/status" => Self::Status,
            "/list" => Self::List,
            "/scan" => Self::QuickScan,
            "/scanall" => Self::ScanAll,
            "/check" => match arg {
                Some(symbol) => Self::Check(symbol.to_uppercase()),
                None => Self::Unknown("/check".to_string()),
            },
            other if !other.starts_with('/') && arg.is_none() && looks_like_symbol(other) => {
                Self::Check(other.to_uppercase())
            }
            other => Self::Unknown(other.to_string()),
        }
    }
}

fn looks_like_symbol(text: &str) -> bool {
    !text.is_empty()
        && text.len() <= 20
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '&' | '-'))
}

/// Handles parsed commands and sends replies.
pub struct BotHandler {
    dispatcher: Arc<ScanDispatcher>,
    store: Arc<dyn SessionStore>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl BotHandler {
    pub fn new(
        dispatcher: Arc<ScanDispatcher>,
        store: Arc<dyn SessionStore>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> Self {
        Self {
            dispatcher,
            store,
            notifier,
        }
    }

    /// Process one webhook update end to end. Always succeeds from the
    /// webhook's point of view; reply delivery failures are only logged.
    pub async fn handle_update(&self, update: TelegramUpdate) {
        let Some(message) = update.message else {
            debug!(update_id = update.update_id, "Ignoring non-message update");
            return;
        };
        let Some(text) = message.text else {
            return;
        };
        let chat_id = message.chat.id.to_string();

        let reply = match self.respond(&chat_id, &text).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(%chat_id, %err, "Command failed");
                "Something went wrong handling that command. Try again shortly.".to_string()
            }
        };

        if let Some(notifier) = &self.notifier {
            if let Err(err) = notifier.send(&chat_id, &reply).await {
                warn!(%chat_id, %err, "Reply delivery failed");
            }
        }
    }

    /// Execute one command and build the reply text.
    pub async fn respond(&self, chat_id: &str, text: &str) -> Result<String> {
        match BotCommand::parse(text) {
            // /start and /help both register the chat; /help keeps quiet
            // about it.
            BotCommand::Help => {
                self.store.add_subscriber(chat_id).await?;
                Ok(help_text())
            }
            BotCommand::Start => {
                let added = self.store.add_subscriber(chat_id).await?;
                info!(%chat_id, added, "Subscriber registered");
                let greeting = if added {
                    "You are subscribed to scan completion alerts.\n\n"
                } else {
                    "You are already subscribed.\n\n"
                };
                Ok(format!("{greeting}{}", help_text()))
            }
            BotCommand::Stop => {
                let removed = self.store.remove_subscriber(chat_id).await?;
                info!(%chat_id, removed, "Subscriber removed");
                Ok(if removed {
                    "Unsubscribed. Send /start to resume alerts.".to_string()
                } else {
                    "You were not subscribed.".to_string()
                })
            }
            BotCommand::Status => {
                let report = self.dispatcher.status().await?;
                Ok(format_status(&report))
            }
            BotCommand::List => {
                let results = self.dispatcher.results().await?;
                Ok(format_results(results.as_ref()))
            }
            BotCommand::QuickScan => {
                let results = self
                    .dispatcher
                    .quick_scan(popular_symbols(QUICK_SCAN_COUNT))
                    .await;
                Ok(format_quick_scan(&results))
            }
            BotCommand::ScanAll => self.start_full_scan().await,
            BotCommand::Check(symbol) => Ok(self.check_symbol(&symbol).await),
            BotCommand::Unknown(input) => Ok(format!(
                "Unrecognized command <code>{input}</code>.\n\n{}",
                help_text()
            )),
        }
    }

    async fn start_full_scan(&self) -> Result<String> {
        match self.dispatcher.start_scan(true).await? {
            StartScanOutcome::Started { total, .. } => Ok(format!(
                "🔍 Full scan started over {total} symbols. Use /status to follow progress."
            )),
            StartScanOutcome::AlreadyRunning => {
                let report = self.dispatcher.status().await?;
                Ok(format!(
                    "A scan is already running.\n\n{}",
                    format_status(&report)
                ))
            }
            // Forced starts bypass the cooldown, so this arm is unreachable
            // today; keep the reply in case the bot ever exposes unforced
            // starts.
            StartScanOutcome::CoolingDown { until } => Ok(format!(
                "Last scan finished recently. Next scan allowed after {}.",
                until.format("%H:%M UTC")
            )),
        }
    }

    async fn check_symbol(&self, symbol: &str) -> String {
        match self.dispatcher.check(symbol).await {
            Ok(report) => format_check(&report),
            Err(EvalError::NoData) => {
                format!("No data found for <b>{symbol}</b>. Is the ticker correct?")
            }
            Err(EvalError::InsufficientHistory { days, min_days }) => format!(
                "<b>{symbol}</b> has only {days} days of history; at least {min_days} are needed."
            ),
            Err(err) => format!("Could not evaluate <b>{symbol}</b>: {err}"),
        }
    }
}

fn help_text() -> String {
    "<b>Commands</b>\n\
     /check SYMBOL — evaluate one symbol against the trend template\n\
     /scan — quick scan of the popular large caps\n\
     /scanall — start a full universe scan\n\
     /status — progress of the current scan\n\
     /list — passing symbols from the last completed scan\n\
     /stop — unsubscribe from completion alerts\n\
     /help — this message\n\n\
     You can also just send a ticker, e.g. <code>RELIANCE</code>."
        .to_string()
}
