//! Scan universe provider.
//!
//! Loads the ordered symbol list from a configured file (one symbol per
//! line, `#` comments) and falls back to a built-in NSE large-cap list.

use std::path::PathBuf;
use tracing::{info, warn};

use crate::error::{Result, ScanError};

/// Built-in fallback universe (NSE large caps).
const DEFAULT_UNIVERSE: &[&str] = &[
    "RELIANCE", "TCS", "HDFCBANK", "INFY", "ICICIBANK", "HINDUNILVR", "ITC", "SBIN", "BHARTIARTL",
    "KOTAKBANK", "LT", "AXISBANK", "ASIANPAINT", "MARUTI", "TITAN", "SUNPHARMA", "ULTRACEMCO",
    "BAJFINANCE", "WIPRO", "HCLTECH", "NESTLEIND", "POWERGRID", "NTPC", "TATAMOTORS", "M&M",
    "ADANIENT", "ADANIPORTS", "BAJAJFINSV", "TATASTEEL", "ONGC", "JSWSTEEL", "COALINDIA",
    "HINDALCO", "GRASIM", "INDUSINDBK", "TECHM", "DRREDDY", "CIPLA", "DIVISLAB", "EICHERMOT",
    "BPCL", "HEROMOTOCO", "BRITANNIA", "APOLLOHOSP", "SHREECEM", "TATACONSUM", "SBILIFE",
    "HDFCLIFE", "UPL", "BAJAJ-AUTO",
];

/// Ordered, de-duplicated universe loader.
pub struct UniverseProvider {
    file: Option<PathBuf>,
}

impl UniverseProvider {
    pub fn new(file: Option<PathBuf>) -> Self {
        Self { file }
    }

    /// Load the universe, preserving order and dropping duplicates.
    pub fn load(&self) -> Result<Vec<String>> {
        if let Some(path) = &self.file {
            let contents = std::fs::read_to_string(path).map_err(|e| {
                ScanError::Universe(format!("cannot read {}: {e}", path.display()))
            })?;
            let symbols = dedup_ordered(
                contents
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(|l| l.to_uppercase()),
            );
            if symbols.is_empty() {
                return Err(ScanError::Universe(format!(
                    "{} contains no symbols",
                    path.display()
                )));
            }
            info!(count = symbols.len(), file = %path.display(), "Loaded universe");
            return Ok(symbols);
        }

        warn!(
            count = DEFAULT_UNIVERSE.len(),
            "No universe file configured; using built-in large-cap list"
        );
        Ok(DEFAULT_UNIVERSE.iter().map(|s| s.to_string()).collect())
    }
}

/// Head of the built-in list, used by the bot's quick `/scan`.
pub fn popular_symbols(limit: usize) -> Vec<String> {
    DEFAULT_UNIVERSE
        .iter()
        .take(limit)
        .map(|s| s.to_string())
        .collect()
}

fn dedup_ordered(symbols: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    symbols.filter(|s| seen.insert(s.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn fallback_universe_is_ordered_and_unique() {
        let symbols = UniverseProvider::new(None).load().unwrap();
        assert_eq!(symbols.len(), DEFAULT_UNIVERSE.len());
        assert_eq!(symbols[0], "RELIANCE");
        let unique: std::collections::HashSet<_> = symbols.iter().collect();
        assert_eq!(unique.len(), symbols.len());
    }

    #[test]
    fn file_universe_skips_comments_and_duplicates() {
        let mut file = tempfile_path();
        writeln!(file.1, "# NSE watchlist\nreliance\nTCS\n\nRELIANCE\ninfy").unwrap();
        let symbols = UniverseProvider::new(Some(file.0.clone())).load().unwrap();
        assert_eq!(symbols, vec!["RELIANCE", "TCS", "INFY"]);
        std::fs::remove_file(file.0).ok();
    }

    #[test]
    fn popular_shortlist_is_a_prefix_of_the_default_universe() {
        let shortlist = popular_symbols(10);
        assert_eq!(shortlist.len(), 10);
        assert_eq!(shortlist[0], "RELIANCE");
        assert_eq!(shortlist, &DEFAULT_UNIVERSE[..10]);
    }

    #[test]
    fn missing_file_is_an_error() {
        let provider = UniverseProvider::new(Some(PathBuf::from("/nonexistent/universe.txt")));
        assert!(matches!(provider.load(), Err(ScanError::Universe(_))));
    }

    fn tempfile_path() -> (PathBuf, std::fs::File) {
        let path = std::env::temp_dir().join(format!("universe-{}.txt", uuid::Uuid::new_v4()));
        let file = std::fs::File::create(&path).unwrap();
        (path, file)
    }
}
