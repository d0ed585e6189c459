use busbar_domain::wire::RecordFormat;

use crate::domain::types::ClusterConfig;

/// Recovery service configuration loaded from environment variables.
#[derive(Debug)]
pub struct RecoveryConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// TCP port to listen on (default 3115). Env var: `RECOVERY_PORT`.
    pub port: u16,
    /// Name this instance stamps into replay markers and task texts
    /// (default "recovery"). Env var: `SERVICE_NAME`.
    pub service_name: String,
    /// Base URL of the message-bus gateway (e.g. "http://bus-gateway:8080").
    pub bus_gateway_url: String,
    /// Base URL of the task system (e.g. "http://tasks:8080").
    pub task_system_url: String,
    /// Configured clusters as "name=FORMAT" pairs, comma separated
    /// (e.g. "main=CONFLUENT,legacy=GLUE"). Env var: `BUS_CLUSTERS`.
    pub clusters: Vec<ClusterConfig>,
    /// Replay destination for messages without a recorded origin cluster.
    /// Env var: `BUS_DEFAULT_CLUSTER`.
    pub default_cluster: Option<String>,
    /// Cluster hosting the report and dead-letter topics (default "main").
    /// Env var: `REPORT_CLUSTER`.
    pub report_cluster: String,
    /// Topic failure reports arrive on (default "failure-reports").
    pub report_topic: String,
    /// Dead-letter topic for undecodable or hopeless reports
    /// (default "failure-reports-dlt").
    pub dead_letter_topic: String,
    /// Consumer group for the report topic (default "recovery").
    pub consumer_group: String,
    /// Seconds to wait for a bus send acknowledgement (default 60).
    pub replay_ack_timeout_secs: u64,
    /// Seconds between listener retries on recoverable faults (default 5).
    pub listener_retry_interval_secs: u64,
    /// Seconds between due-retry polls (default 10).
    pub retry_poll_interval_secs: u64,
    /// Jobs fetched per retry batch (default 50).
    pub retry_batch_size: u64,
    /// Batches drained per retry poll (default 20).
    pub retry_max_batches: u32,
    /// Seconds between task synchronization passes (default 300).
    pub sync_interval_secs: u64,
    /// Records fetched per synchronization chunk (default 100).
    pub sync_chunk_size: u64,
    /// Chunks per state and pass (default 10).
    pub sync_max_chunks: u32,
    /// First retry delay in seconds (default 30).
    pub backoff_initial_delay_secs: u64,
    /// Backoff multiplier per prior failure (default 2.0).
    pub backoff_multiplier: f64,
    /// Longest retry delay in seconds (default 86400).
    pub backoff_max_delay_secs: u64,
    /// Failures per causing message before giving up on retries
    /// (default 15).
    pub backoff_max_attempts: u32,
    /// Whether permanently classified failures are grouped by signature
    /// (default true). Env var: `GROUPING_ENABLED`.
    pub grouping_enabled: bool,
}

impl RecoveryConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").expect("DATABASE_URL"),
            port: std::env::var("RECOVERY_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3115),
            service_name: std::env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "recovery".to_owned()),
            bus_gateway_url: std::env::var("BUS_GATEWAY_URL").expect("BUS_GATEWAY_URL"),
            task_system_url: std::env::var("TASK_SYSTEM_URL").expect("TASK_SYSTEM_URL"),
            clusters: parse_clusters(
                &std::env::var("BUS_CLUSTERS").expect("BUS_CLUSTERS"),
            ),
            default_cluster: std::env::var("BUS_DEFAULT_CLUSTER").ok(),
            report_cluster: std::env::var("REPORT_CLUSTER")
                .unwrap_or_else(|_| "main".to_owned()),
            report_topic: std::env::var("REPORT_TOPIC")
                .unwrap_or_else(|_| "failure-reports".to_owned()),
            dead_letter_topic: std::env::var("DEAD_LETTER_TOPIC")
                .unwrap_or_else(|_| "failure-reports-dlt".to_owned()),
            consumer_group: std::env::var("CONSUMER_GROUP")
                .unwrap_or_else(|_| "recovery".to_owned()),
            replay_ack_timeout_secs: env_or("REPLAY_ACK_TIMEOUT_SECS", 60),
            listener_retry_interval_secs: env_or("LISTENER_RETRY_INTERVAL_SECS", 5),
            retry_poll_interval_secs: env_or("RETRY_POLL_INTERVAL_SECS", 10),
            retry_batch_size: env_or("RETRY_BATCH_SIZE", 50),
            retry_max_batches: env_or("RETRY_MAX_BATCHES", 20),
            sync_interval_secs: env_or("SYNC_INTERVAL_SECS", 300),
            sync_chunk_size: env_or("SYNC_CHUNK_SIZE", 100),
            sync_max_chunks: env_or("SYNC_MAX_CHUNKS", 10),
            backoff_initial_delay_secs: env_or("BACKOFF_INITIAL_DELAY_SECS", 30),
            backoff_multiplier: env_or("BACKOFF_MULTIPLIER", 2.0),
            backoff_max_delay_secs: env_or("BACKOFF_MAX_DELAY_SECS", 86400),
            backoff_max_attempts: env_or("BACKOFF_MAX_ATTEMPTS", 15),
            grouping_enabled: env_or("GROUPING_ENABLED", true),
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse "name=FORMAT" pairs, comma separated. Panics on malformed input;
/// a typo here must not boot a service that routes replays wrong.
fn parse_clusters(raw: &str) -> Vec<ClusterConfig> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (name, format) = entry
                .split_once('=')
                .unwrap_or_else(|| panic!("malformed cluster entry {entry:?}, want name=FORMAT"));
            let format: RecordFormat = format
                .trim()
                .parse()
                .unwrap_or_else(|_| panic!("unknown record format in cluster entry {entry:?}"));
            ClusterConfig {
                name: name.trim().to_owned(),
                format,
            }
        })
        .collect()
}
