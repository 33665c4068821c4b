use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled, prefixed env var: tries `{PROFILE}_{PREFIX}_{KEY}` first,
/// falls back to `{PREFIX}_{KEY}`.
fn profiled_env_opt(profile: &str, prefix: &str, key: &str) -> Option<String> {
    let scoped = format!("{}_{}", prefix, key);
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, scoped);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(&scoped)
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, prefix: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, prefix, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse a comma-separated list such as `"1000,5000,10000"`. Entries that
/// fail to parse are skipped.
fn profiled_env_list(profile: &str, prefix: &str, key: &str, default: Vec<usize>) -> Vec<usize> {
    match profiled_env_opt(profile, prefix, key) {
        Some(raw) => raw
            .split(',')
            .filter_map(|part| part.trim().parse().ok())
            .collect(),
        None => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

/// Per-shard scheduler configuration for both task streams.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub transfer: QueueConfig,
    pub timer: QueueConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `SHARDQ_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("SHARDQ_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            transfer: QueueConfig::from_env_profiled(p, "TRANSFER"),
            timer: QueueConfig::from_env_profiled(p, "TIMER"),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  transfer:    batch_size={}, poll_interval_ms={}, max_in_flight={}",
            self.transfer.batch_size,
            self.transfer.poll_interval_ms,
            self.transfer.max_in_flight_tasks
        );
        tracing::info!(
            "  timer:       batch_size={}, poll_interval_ms={}, max_in_flight={}",
            self.timer.batch_size,
            self.timer.poll_interval_ms,
            self.timer.max_in_flight_tasks
        );
    }

    /// Return a JSON view for diagnostics endpoints.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "transfer": self.transfer,
            "timer": self.timer,
        })
    }
}

// ── Queue processor ───────────────────────────────────────────

/// Knobs for one queue processor (transfer or timer). Static for the
/// lifetime of the processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Max tasks read from the store per poll. Values below 1 are read as 1.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Delay between polls of a level that has caught up.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Delay between redispatch drains.
    #[serde(default = "default_redispatch_interval_ms")]
    pub redispatch_interval_ms: u64,
    /// Delay between split passes.
    #[serde(default = "default_split_interval_ms")]
    pub split_interval_ms: u64,
    /// Delay between ack-level passes.
    #[serde(default = "default_update_ack_interval_ms")]
    pub update_ack_interval_ms: u64,
    /// Highest level a split policy may move work to.
    #[serde(default = "default_split_max_level")]
    pub split_max_level: usize,
    /// Pending tasks per domain, indexed by level, above which the domain
    /// is split out to the next level.
    #[serde(default = "default_pending_task_split_thresholds")]
    pub pending_task_split_thresholds: Vec<usize>,
    /// Attempt count, indexed by level, above which a task counts as stuck.
    #[serde(default = "default_stuck_task_split_thresholds")]
    pub stuck_task_split_thresholds: Vec<usize>,
    /// Chance (0.0 - 1.0) that a queue is split randomly in a split pass.
    #[serde(default)]
    pub random_split_probability: f64,
    /// Total pending tasks above which the ack pass logs a warning.
    #[serde(default = "default_pending_tasks_warn_threshold")]
    pub pending_tasks_warn_threshold: usize,
    /// Executor capacity; submissions beyond it are rejected.
    #[serde(default = "default_max_in_flight_tasks")]
    pub max_in_flight_tasks: usize,
    /// Executor worker threads. 0 = available parallelism.
    #[serde(default)]
    pub worker_threads: usize,
}

fn default_batch_size() -> usize { 100 }
fn default_poll_interval_ms() -> u64 { 1_000 }
fn default_redispatch_interval_ms() -> u64 { 5_000 }
fn default_split_interval_ms() -> u64 { 60_000 }
fn default_update_ack_interval_ms() -> u64 { 30_000 }
fn default_split_max_level() -> usize { 2 }
fn default_pending_task_split_thresholds() -> Vec<usize> { vec![1_000, 10_000] }
fn default_stuck_task_split_thresholds() -> Vec<usize> { vec![100, 10_000] }
fn default_pending_tasks_warn_threshold() -> usize { 2_000 }
fn default_max_in_flight_tasks() -> usize { 1_024 }

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            poll_interval_ms: default_poll_interval_ms(),
            redispatch_interval_ms: default_redispatch_interval_ms(),
            split_interval_ms: default_split_interval_ms(),
            update_ack_interval_ms: default_update_ack_interval_ms(),
            split_max_level: default_split_max_level(),
            pending_task_split_thresholds: default_pending_task_split_thresholds(),
            stuck_task_split_thresholds: default_stuck_task_split_thresholds(),
            random_split_probability: 0.0,
            pending_tasks_warn_threshold: default_pending_tasks_warn_threshold(),
            max_in_flight_tasks: default_max_in_flight_tasks(),
            worker_threads: 0,
        }
    }
}

impl QueueConfig {
    /// Build from `{PROFILE}_{PREFIX}_{KEY}` / `{PREFIX}_{KEY}` env vars,
    /// e.g. `TRANSFER_BATCH_SIZE`. Missing or malformed values use defaults;
    /// a zero batch size is raised to 1.
    pub fn from_env_profiled(p: &str, prefix: &str) -> Self {
        let d = Self::default();
        let batch_size = profiled_env_parse(p, prefix, "BATCH_SIZE", d.batch_size);
        if batch_size == 0 {
            tracing::warn!("{}_BATCH_SIZE is 0, using 1", prefix);
        }
        Self {
            batch_size: batch_size.max(1),
            poll_interval_ms: profiled_env_parse(p, prefix, "POLL_INTERVAL_MS", d.poll_interval_ms),
            redispatch_interval_ms: profiled_env_parse(
                p,
                prefix,
                "REDISPATCH_INTERVAL_MS",
                d.redispatch_interval_ms,
            ),
            split_interval_ms: profiled_env_parse(p, prefix, "SPLIT_INTERVAL_MS", d.split_interval_ms),
            update_ack_interval_ms: profiled_env_parse(
                p,
                prefix,
                "UPDATE_ACK_INTERVAL_MS",
                d.update_ack_interval_ms,
            ),
            split_max_level: profiled_env_parse(p, prefix, "SPLIT_MAX_LEVEL", d.split_max_level),
            pending_task_split_thresholds: profiled_env_list(
                p,
                prefix,
                "PENDING_TASK_SPLIT_THRESHOLDS",
                d.pending_task_split_thresholds,
            ),
            stuck_task_split_thresholds: profiled_env_list(
                p,
                prefix,
                "STUCK_TASK_SPLIT_THRESHOLDS",
                d.stuck_task_split_thresholds,
            ),
            random_split_probability: profiled_env_parse(
                p,
                prefix,
                "RANDOM_SPLIT_PROBABILITY",
                d.random_split_probability,
            ),
            pending_tasks_warn_threshold: profiled_env_parse(
                p,
                prefix,
                "PENDING_TASKS_WARN_THRESHOLD",
                d.pending_tasks_warn_threshold,
            ),
            max_in_flight_tasks: profiled_env_parse(p, prefix, "MAX_IN_FLIGHT_TASKS", d.max_in_flight_tasks),
            worker_threads: profiled_env_parse(p, prefix, "WORKER_THREADS", d.worker_threads),
        }
    }

    /// Batch size used for store reads; never 0.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn redispatch_interval(&self) -> Duration {
        Duration::from_millis(self.redispatch_interval_ms)
    }

    pub fn split_interval(&self) -> Duration {
        Duration::from_millis(self.split_interval_ms)
    }

    pub fn update_ack_interval(&self) -> Duration {
        Duration::from_millis(self.update_ack_interval_ms)
    }

    /// Resolve worker thread count (0 means use available parallelism).
    pub fn resolved_worker_threads(&self) -> usize {
        if self.worker_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.worker_threads
        }
    }
}
