//! Transform module turning raw issues into output records
//!
//! # Components
//!
//! - `Transformer`: maps a fetched issue and its comments to an [`OutputRecord`]
//! - `text`: field-to-text extraction, HTML stripping, timestamp formatting
//! - `tasks`: derived summarization, classification and Q&A tasks

mod record;
mod tasks;
pub mod text;

pub use record::{
    ClassificationTask, DerivedTasks, OutputComment, OutputRecord, QaTask, RecordMetadata,
    SummarizationTask, RECORD_SOURCE,
};

use crate::remote::{ItemDetail, SubResource};
use crate::state::{CollectionKey, ItemId};
use chrono::Utc;
use serde_json::{Map, Value};
use tasks::{derive_tasks, TaskInput};
use text::{extract_text, format_timestamp, html_to_text};
use thiserror::Error;

/// Errors produced while transforming an issue
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("Malformed input for {item}: {reason}")]
    MalformedInput { item: ItemId, reason: String },
}

/// Everything fetched for one item
#[derive(Debug, Clone)]
pub struct FetchedItem {
    pub collection: CollectionKey,
    pub detail: ItemDetail,
    pub sub_resources: Vec<SubResource>,
}

/// Maps fetched issues to output records
#[derive(Debug, Clone, Default)]
pub struct Transformer;

impl Transformer {
    pub fn new() -> Self {
        Self
    }

    /// Transforms one item
    ///
    /// # Errors
    ///
    /// [`TransformError::MalformedInput`] if the issue has no key or no `fields` object.
    /// Missing optional fields produce empty values.
    pub fn transform(&self, item: &FetchedItem) -> Result<OutputRecord, TransformError> {
        let raw = &item.detail.raw;
        let malformed = |reason: &str| TransformError::MalformedInput {
            item: item.detail.id.clone(),
            reason: reason.to_string(),
        };

        let issue_key = raw
            .get("key")
            .and_then(Value::as_str)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| malformed("issue has no key"))?
            .to_string();
        let fields = raw
            .get("fields")
            .and_then(Value::as_object)
            .ok_or_else(|| malformed("issue has no fields object"))?;

        let title = extract_text(field(fields, "summary"));
        let mut description = extract_text(field(fields, "description"));
        if description.is_empty() {
            if let Some(rendered) = raw
                .get("renderedFields")
                .and_then(|r| r.get("description"))
                .and_then(Value::as_str)
            {
                description = html_to_text(rendered);
            }
        }

        let status = extract_text(field(fields, "status"));
        let issue_type = extract_text(field(fields, "issuetype"));
        let mut project = extract_text(field(fields, "project"));
        if project.is_empty() {
            project = item.collection.to_string();
        }

        let comments = collect_comments(&item.sub_resources, fields);

        let derived_tasks = derive_tasks(&TaskInput {
            issue_key: &issue_key,
            title: &title,
            description: &description,
            status: &status,
            issue_type: &issue_type,
            comments: &comments,
        });

        Ok(OutputRecord {
            project,
            title,
            description,
            status,
            issue_type,
            priority: extract_text(field(fields, "priority")),
            reporter: extract_text(field(fields, "reporter")),
            assignee: extract_text(field(fields, "assignee")),
            created: format_timestamp(field(fields, "created").as_str()),
            updated: format_timestamp(field(fields, "updated").as_str()),
            resolved: format_timestamp(field(fields, "resolutiondate").as_str()),
            labels: labels(fields),
            components: components(fields),
            comment_count: comments.len(),
            comments,
            metadata: RecordMetadata {
                raw_issue_key: issue_key.clone(),
                collection: item.collection.to_string(),
                scraped_at: Utc::now().to_rfc3339(),
                source: RECORD_SOURCE.to_string(),
            },
            derived_tasks,
            issue_key,
        })
    }
}

static NULL: Value = Value::Null;

fn field<'a>(fields: &'a Map<String, Value>, name: &str) -> &'a Value {
    fields.get(name).unwrap_or(&NULL)
}

fn labels(fields: &Map<String, Value>) -> Vec<String> {
    fields
        .get("labels")
        .and_then(Value::as_array)
        .map(|labels| {
            labels
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn components(fields: &Map<String, Value>) -> Vec<String> {
    fields
        .get("components")
        .and_then(Value::as_array)
        .map(|components| {
            components
                .iter()
                .filter(|c| c.is_object())
                .map(|c| c.get("name").map(extract_text).unwrap_or_default())
                .collect()
        })
        .unwrap_or_default()
}

fn to_comment(resource: &SubResource) -> OutputComment {
    OutputComment {
        author: extract_text(&resource.author),
        body: extract_text(&resource.body),
        created: format_timestamp(resource.created.as_deref()),
        updated: format_timestamp(resource.updated.as_deref()),
    }
}

/// Comments from the comment endpoint, then embedded comments with a new body
fn collect_comments(fetched: &[SubResource], fields: &Map<String, Value>) -> Vec<OutputComment> {
    let mut comments: Vec<OutputComment> = fetched.iter().map(to_comment).collect();

    let embedded = fields
        .get("comment")
        .and_then(|c| c.get("comments"))
        .and_then(Value::as_array);

    for value in embedded.into_iter().flatten() {
        let Ok(resource) = serde_json::from_value::<SubResource>(value.clone()) else {
            continue;
        };
        let comment = to_comment(&resource);
        if !comments.iter().any(|c| c.body == comment.body) {
            comments.push(comment);
        }
    }

    comments
}
