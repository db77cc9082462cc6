use serde::Deserialize;

/// Main configuration structure for Jira-Harvest
///
/// Every section and key has a default, so an empty file (or no file at all) yields a
/// configuration that harvests the Apache Jira instance.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub harvest: HarvestConfig,
    pub state: StateConfig,
    pub output: OutputConfig,
}

/// Remote endpoint and retry behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the REST API, e.g. `https://issues.apache.org/jira/rest/api/2/`
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Per-request timeout (seconds)
    #[serde(rename = "timeout-secs")]
    pub timeout_secs: u64,

    /// Maximum attempts per logical request, including the first one
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,

    /// Base delay for exponential backoff on transient failures (milliseconds)
    #[serde(rename = "base-delay-ms")]
    pub base_delay_ms: u64,

    /// Upper bound for a single backoff delay (milliseconds)
    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    /// Wait used on HTTP 429 when the server sends no Retry-After (milliseconds)
    #[serde(rename = "rate-limit-delay-ms")]
    pub rate_limit_delay_ms: u64,

    /// Fixed pause before every new logical request (milliseconds)
    #[serde(rename = "request-delay-ms")]
    pub request_delay_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "https://issues.apache.org/jira/rest/api/2/".to_string(),
            timeout_secs: 30,
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            rate_limit_delay_ms: 1000,
            request_delay_ms: 1000,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the client
    #[serde(rename = "client-name")]
    pub client_name: String,

    /// Version of the client
    #[serde(rename = "client-version")]
    pub client_version: String,

    /// URL with information about the harvester
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for harvester-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            client_name: "Jira-Harvest".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://github.com/jira-harvest/jira-harvest".to_string(),
            contact_email: "harvest@example.com".to_string(),
        }
    }
}

/// Pagination, batching and escalation settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Project keys to harvest, in order
    pub projects: Vec<String>,

    /// Items requested per list page
    #[serde(rename = "page-size")]
    pub page_size: u32,

    /// Records buffered before a flush and checkpoint
    #[serde(rename = "batch-size")]
    pub batch_size: usize,

    /// Consecutive per-item failures that abort a collection
    #[serde(rename = "failure-threshold")]
    pub failure_threshold: u32,

    /// Search query template; `{project}` is replaced by the project key
    pub jql: String,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            projects: vec!["SPARK".to_string(), "HADOOP".to_string(), "FLINK".to_string()],
            page_size: 50,
            batch_size: 10,
            failure_threshold: 5,
            jql: "project = {project} ORDER BY created ASC".to_string(),
        }
    }
}

/// Which durable format the progress snapshot uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackendKind {
    #[default]
    Json,
    Sqlite,
}

/// Progress state location
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Path to the snapshot file (JSON) or database (SQLite)
    pub path: String,

    /// Snapshot backend
    pub backend: StateBackendKind,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: "state/scrape_state.json".to_string(),
            backend: StateBackendKind::Json,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path to the JSONL dataset file
    pub path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: "jira_dataset.jsonl".to_string(),
        }
    }
}
