use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::bot::BotHandler;
use crate::scanner::ScanDispatcher;
use crate::store::SessionStore;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<ScanDispatcher>,

    /// Store handle for health probes; all scan mutations go through the
    /// dispatcher.
    pub store: Arc<dyn SessionStore>,

    /// Webhook command handler; absent when no bot token is configured.
    pub bot: Option<Arc<BotHandler>>,

    /// Application start time
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        dispatcher: Arc<ScanDispatcher>,
        store: Arc<dyn SessionStore>,
        bot: Option<Arc<BotHandler>>,
    ) -> Self {
        Self {
            dispatcher,
            store,
            bot,
            start_time: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds()
    }
}
