// src/config.rs
// =============================================================================
// Runtime configuration, grouped by component.
//
// Every section has a Default matching the behaviour of a plain
// `paste-sentinel` invocation; cli.rs overrides fields from flags.
// =============================================================================

use std::path::PathBuf;
use std::time::Duration;

/// Default onion address of the paste site
pub const DEFAULT_BASE_URL: &str = "http://nzxj65x32vh2fkhk.onion/";

/// Fields kept from each paste unless overridden
pub const DEFAULT_FIELDS: [&str; 4] = ["timestamp", "title", "author", "data"];

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub transport: TransportConfig,
    pub crawl: CrawlConfig,
    pub store: StoreConfig,
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Explicit tor binary; TOR_CMD and PATH are consulted when unset
    pub tor_cmd: Option<PathBuf>,
    pub socks_port: u16,
    pub control_port: u16,
    pub control_password: Option<String>,
    pub request_timeout: Duration,
    pub launch_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tor_cmd: None,
            socks_port: 9050,
            control_port: 9051,
            control_password: None,
            request_timeout: Duration::from_secs(60),
            launch_timeout: Duration::from_secs(90),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub base_url: String,
    /// API format name as given by the operator ("json" is the only one accepted)
    pub api_format: String,
    pub fields: Vec<String>,
    /// Upper bound on listing pages per cycle; None walks until the watermark
    pub max_pages: Option<u32>,
    /// Starting watermark in epoch seconds; None means "now"
    pub since: Option<i64>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_format: "json".to_string(),
            fields: DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect(),
            max_pages: None,
            since: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    /// "UTC", "Z" or a fixed offset such as "+02:00"
    pub timezone: String,
    pub strip: bool,
    /// Extra author names to treat as "no author"
    pub unknown_authors: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            timezone: "UTC".to_string(),
            strip: true,
            unknown_authors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub interval: Duration,
    pub run_once: bool,
    /// Log a failed cycle and wait for the next one instead of exiting
    pub keep_going: bool,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(4 * 3600),
            run_once: false,
            keep_going: false,
        }
    }
}

/// `db.json` in the user's home directory
pub fn default_db_path() -> PathBuf {
    let home_var = if cfg!(windows) { "USERPROFILE" } else { "HOME" };
    let home = std::env::var_os(home_var).map(PathBuf::from).unwrap_or_default();
    home.join("db.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.transport.socks_port, 9050);
        assert_eq!(config.transport.control_port, 9051);
        assert_eq!(config.crawl.fields, vec!["timestamp", "title", "author", "data"]);
        assert_eq!(config.schedule.interval, Duration::from_secs(14_400));
        assert!(config.store.strip);
    }

    #[test]
    fn test_default_db_path_file_name() {
        assert_eq!(default_db_path().file_name().unwrap(), "db.json");
    }
}
