//! Completion notifications.
//!
//! Delivery is strictly post-commit: a lost notification never blocks or
//! rolls back scan state. Per-subscriber failures are logged and skipped.

mod telegram;

pub use telegram::TelegramNotifier;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::domain::CompletedScan;
use crate::error::NotifyError;
use crate::store::SessionStore;

/// Chat message delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), NotifyError>;
}

/// How many passing symbols the completion message lists inline.
const SUMMARY_LIMIT: usize = 15;

/// Fans a completion summary out to every registered subscriber.
pub struct CompletionNotifier {
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn SessionStore>,
}

impl CompletionNotifier {
    pub fn new(notifier: Arc<dyn Notifier>, store: Arc<dyn SessionStore>) -> Self {
        Self { notifier, store }
    }

    /// Send the summary to all subscribers, returning the delivered count.
    pub async fn announce(&self, scan: &CompletedScan) -> usize {
        let subscribers = match self.store.subscribers().await {
            Ok(subscribers) => subscribers,
            Err(err) => {
                error!(%err, "Cannot load subscribers; skipping completion notification");
                return 0;
            }
        };
        if subscribers.is_empty() {
            info!("Scan completed with no subscribers to notify");
            return 0;
        }

        let text = completion_message(scan);
        let mut delivered = 0;
        for chat_id in &subscribers {
            match self.notifier.send(chat_id, &text).await {
                Ok(()) => delivered += 1,
                Err(err) => warn!(%chat_id, %err, "Completion notification failed"),
            }
        }
        info!(
            delivered,
            subscribers = subscribers.len(),
            "Completion notifications sent"
        );
        delivered
    }
}

/// HTML summary of a completed scan: counts plus the first passing symbols.
pub fn completion_message(scan: &CompletedScan) -> String {
    let mut text = format!(
        "✅ <b>Scan complete</b>\nScanned {} symbols, {} passed the trend template.",
        scan.total_scanned,
        scan.passing.len()
    );
    if scan.passing.is_empty() {
        text.push_str("\n\nNo symbols met all nine criteria today.");
        return text;
    }
    text.push('\n');
    for report in scan.passing.iter().take(SUMMARY_LIMIT) {
        text.push_str(&format!("\n• <b>{}</b> — {:.2}", report.symbol, report.price));
    }
    let rest = scan.passing.len().saturating_sub(SUMMARY_LIMIT);
    if rest > 0 {
        text.push_str(&format!("\n\n…and {rest} more. Use /list to see all."));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SymbolReport;
    use crate::store::MemorySessionStore;
    use chrono::Utc;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use uuid::Uuid;

    fn passing_report(symbol: &str) -> SymbolReport {
        SymbolReport {
            symbol: symbol.to_string(),
            price: 123.45,
            score: 9,
            passes: true,
            sma_50: Some(120.0),
            sma_150: Some(110.0),
            sma_200: Some(100.0),
            high_52w: 130.0,
            low_52w: 80.0,
            pct_above_low: 54.3,
            pct_from_high: 5.0,
            criteria: BTreeMap::new(),
        }
    }

    fn completed(passing: usize) -> CompletedScan {
        CompletedScan {
            session_id: Uuid::new_v4(),
            total_scanned: 500,
            completed_at: Utc::now(),
            passing: (0..passing).map(|i| passing_report(&format!("SYM{i}"))).collect(),
        }
    }

    #[test]
    fn empty_result_says_so() {
        let text = completion_message(&completed(0));
        assert!(text.contains("Scanned 500 symbols, 0 passed"));
        assert!(text.contains("No symbols met all nine criteria"));
    }

    #[test]
    fn short_list_is_inlined_without_overflow_note() {
        let text = completion_message(&completed(3));
        assert!(text.contains("SYM0"));
        assert!(text.contains("SYM2"));
        assert!(!text.contains("more. Use /list"));
    }

    #[test]
    fn long_list_is_truncated_with_overflow_note() {
        let text = completion_message(&completed(20));
        assert!(text.contains("SYM14"));
        assert!(!text.contains("SYM15"));
        assert!(text.contains("…and 5 more. Use /list"));
    }

    /// Notifier stub that rejects one chat id and records every attempt.
    struct FlakyNotifier {
        reject: String,
        attempted: Mutex<Vec<String>>,
    }

    #[async_trait::async_trait]
    impl Notifier for FlakyNotifier {
        async fn send(&self, chat_id: &str, _text: &str) -> Result<(), NotifyError> {
            self.attempted
                .lock()
                .unwrap()
                .push(chat_id.to_string());
            if chat_id == self.reject {
                return Err(NotifyError::Rejected {
                    status: 403,
                    body: "bot was blocked by the user".to_string(),
                });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn one_failed_delivery_does_not_block_the_rest() {
        let store = Arc::new(MemorySessionStore::new());
        for chat_id in ["100", "200", "300"] {
            store.add_subscriber(chat_id).await.unwrap();
        }

        let flaky = Arc::new(FlakyNotifier {
            reject: "200".to_string(),
            attempted: Mutex::new(Vec::new()),
        });
        let notifier = CompletionNotifier::new(flaky.clone(), store);

        let delivered = notifier.announce(&completed(2)).await;
        assert_eq!(delivered, 2);

        // Every subscriber was attempted, including the ones after the
        // rejection.
        let attempted = flaky.attempted.lock().unwrap().clone();
        assert_eq!(attempted, vec!["100", "200", "300"]);
    }
}
