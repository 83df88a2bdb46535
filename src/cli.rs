// src/cli.rs
// =============================================================================
// This file defines our command-line interface using the `clap` crate.
//
// There are no subcommands: the crawler does one thing. Flags tune the
// schedule, the Tor connection, the crawl and the store, and are folded into
// a Config by `Cli::into_config`.
//
// Rust concepts:
// - Derive macros: #[derive(Parser)] generates the argument parser
// - Option<T>: flags that may be absent
// - ArgAction::Count: repeated flags like -vv become a number
// =============================================================================

use crate::config::{Config, DEFAULT_BASE_URL};
use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "paste-sentinel",
    version,
    about = "Collects new pastes from an onion paste site over Tor",
    long_about = "paste-sentinel periodically walks the paste site's listing API through Tor, \
                  collects every paste published since the previous run, and appends a \
                  normalized copy of each one to a local JSON database."
)]
pub struct Cli {
    /// Hours to wait between crawl cycles
    #[arg(long, default_value = "4", value_parser = parse_hours)]
    pub sample_wait: Duration,

    /// Collect pastes published after this epoch timestamp (default: now)
    ///
    /// Useful for backfills and reproducible test runs.
    #[arg(long)]
    pub since: Option<i64>,

    /// Path of the JSON database (default: ~/db.json)
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Log failed cycles and keep the schedule going instead of exiting
    #[arg(long)]
    pub keep_going: bool,

    /// Also write logs to this file (rotated at 1 MiB)
    #[arg(long)]
    pub log_path: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Less log output (-q warnings, -qq errors)
    #[arg(short, long, action = ArgAction::Count)]
    pub quiet: u8,

    /// tor binary to launch when tor is not running (default: $TOR_CMD, then PATH)
    #[arg(long)]
    pub tor_cmd: Option<PathBuf>,

    /// Local SOCKS port of the tor process
    #[arg(long, default_value_t = 9050)]
    pub socks_port: u16,

    /// Local control port of the tor process
    #[arg(long, default_value_t = 9051)]
    pub control_port: u16,

    /// Password for the tor control port
    #[arg(long)]
    pub control_password: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 60)]
    pub request_timeout: u64,

    /// Base URL of the paste site
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// API format; only json is supported
    #[arg(long, default_value = "json")]
    pub api_format: String,

    /// Comma separated paste fields to keep
    #[arg(long, value_delimiter = ',', default_values = ["timestamp", "title", "author", "data"])]
    pub fields: Vec<String>,

    /// Stop after this many listing pages per cycle
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Timezone for stored timestamps: UTC or an offset like +02:00
    #[arg(long, default_value = "UTC")]
    pub timezone: String,

    /// Keep surrounding whitespace and CRLF line endings
    #[arg(long)]
    pub no_strip: bool,

    /// Extra author name to store as "Unknown" (repeatable)
    #[arg(long = "unknown-author")]
    pub unknown_authors: Vec<String>,
}

impl Cli {
    pub fn into_config(self) -> Config {
        let mut config = Config::default();

        config.schedule.interval = self.sample_wait;
        config.schedule.run_once = self.once;
        config.schedule.keep_going = self.keep_going;

        config.transport.tor_cmd = self.tor_cmd;
        config.transport.socks_port = self.socks_port;
        config.transport.control_port = self.control_port;
        config.transport.control_password = self.control_password;
        config.transport.request_timeout = Duration::from_secs(self.request_timeout);

        config.crawl.base_url = self.base_url;
        config.crawl.api_format = self.api_format;
        config.crawl.fields = self.fields;
        config.crawl.max_pages = self.max_pages;
        config.crawl.since = self.since;

        if let Some(db_path) = self.db_path {
            config.store.db_path = db_path;
        }
        config.store.timezone = self.timezone;
        config.store.strip = !self.no_strip;
        config.store.unknown_authors = self.unknown_authors;

        config
    }
}

// Hours as a float, e.g. "0.5". Negative, NaN, infinite and absurdly large
// values are rejected here instead of panicking in Duration.
fn parse_hours(raw: &str) -> Result<Duration, String> {
    let hours: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number of hours", raw))?;
    if !hours.is_finite() || hours < 0.0 {
        return Err(format!("'{}' must be a finite, non-negative number of hours", raw));
    }
    Duration::try_from_secs_f64(hours * 3600.0).map_err(|_| format!("'{}' hours is too long", raw))
}
