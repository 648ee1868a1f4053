use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Daemon settings, read from `HUDDLE_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// Journal appends between compactions.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
    pub effect_queue: usize,
    pub effect_timeout: Duration,
    pub reminders: ReminderConfig,
    /// JSON array of rooms to create when the journal is empty.
    pub seed_rooms: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReminderConfig {
    pub enabled: bool,
    /// How long before the start a reminder goes out.
    pub lead: Duration,
    /// Half-width of the window around `lead`.
    pub tolerance: Duration,
    pub interval: Duration,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            lead: Duration::from_secs(60 * 60),
            tolerance: Duration::from_secs(5 * 60),
            interval: Duration::from_secs(60),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(60),
            effect_queue: 1024,
            effect_timeout: Duration::from_secs(10),
            reminders: ReminderConfig::default(),
            seed_rooms: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let secs = |key: &str, default: Duration| parsed(key).map_or(default, Duration::from_secs);

        Self {
            data_dir: lookup("HUDDLE_DATA_DIR").map_or(d.data_dir, PathBuf::from),
            metrics_port: parse(&lookup, "HUDDLE_METRICS_PORT"),
            compact_threshold: parsed("HUDDLE_COMPACT_THRESHOLD").unwrap_or(d.compact_threshold),
            compact_interval: secs("HUDDLE_COMPACT_INTERVAL_SECS", d.compact_interval),
            effect_queue: parse(&lookup, "HUDDLE_EFFECT_QUEUE").unwrap_or(d.effect_queue),
            effect_timeout: parsed("HUDDLE_EFFECT_TIMEOUT_MS").map_or(d.effect_timeout, Duration::from_millis),
            reminders: ReminderConfig {
                enabled: parse(&lookup, "HUDDLE_REMINDERS").unwrap_or(d.reminders.enabled),
                lead: secs("HUDDLE_REMINDER_LEAD_SECS", d.reminders.lead),
                tolerance: secs("HUDDLE_REMINDER_TOLERANCE_SECS", d.reminders.tolerance),
                interval: secs("HUDDLE_REMINDER_INTERVAL_SECS", d.reminders.interval),
            },
            seed_rooms: lookup("HUDDLE_SEED_ROOMS").map(PathBuf::from),
        }
    }

    pub fn journal_path(&self) -> PathBuf {
        self.data_dir.join("huddle.journal")
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}
