//! The normalized output record written as one JSONL line per issue

use serde::{Deserialize, Serialize};

/// Value of `metadata.source` on every record
pub const RECORD_SOURCE: &str = "apache-jira";

/// A normalized issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub issue_key: String,
    pub project: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub issue_type: String,
    pub priority: String,
    pub reporter: String,
    pub assignee: String,
    pub created: Option<String>,
    pub updated: Option<String>,
    pub resolved: Option<String>,
    pub labels: Vec<String>,
    pub components: Vec<String>,
    pub comments: Vec<OutputComment>,
    pub comment_count: usize,
    pub metadata: RecordMetadata,
    pub derived_tasks: DerivedTasks,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputComment {
    pub author: String,
    pub body: String,
    pub created: Option<String>,
    pub updated: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub raw_issue_key: String,
    /// Collection the issue was listed under
    pub collection: String,
    /// RFC 3339 time of transformation
    pub scraped_at: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedTasks {
    pub summarization: SummarizationTask,
    pub classification: ClassificationTask,
    pub qa_generation: QaTask,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummarizationTask {
    pub instruction: String,
    pub input: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationTask {
    pub instruction: String,
    pub input: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaTask {
    pub question: String,
    pub context: String,
    pub answer: String,
}
