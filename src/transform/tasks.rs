//! Derived training tasks
//!
//! Each record carries three instruction-style tasks built from its own fields.

use crate::transform::record::{
    ClassificationTask, DerivedTasks, OutputComment, QaTask, SummarizationTask,
};
use crate::transform::text::truncate_chars;

/// Characters of description used as classification input
const CLASSIFICATION_DESCRIPTION_CHARS: usize = 500;

/// Characters of full text used as Q&A context
const QA_CONTEXT_CHARS: usize = 1000;

/// Characters of description used in the Q&A answer
const QA_ANSWER_DESCRIPTION_CHARS: usize = 200;

/// Fields the derived tasks are built from
pub struct TaskInput<'a> {
    pub issue_key: &'a str,
    pub title: &'a str,
    pub description: &'a str,
    pub status: &'a str,
    pub issue_type: &'a str,
    pub comments: &'a [OutputComment],
}

/// Title, description and comments as one text block
pub fn full_text(input: &TaskInput<'_>) -> String {
    let mut text = format!("{}\n\n{}", input.title, input.description);
    if !input.comments.is_empty() {
        text.push_str("\n\nComments:\n");
        for comment in input.comments {
            let author = if comment.author.is_empty() {
                "Unknown"
            } else {
                &comment.author
            };
            text.push_str(&format!("- {}: {}\n", author, comment.body));
        }
    }
    text
}

pub fn derive_tasks(input: &TaskInput<'_>) -> DerivedTasks {
    let status = or_unknown(input.status);
    let issue_type = or_unknown(input.issue_type);
    let text = full_text(input);

    let answer = if input.description.is_empty() {
        input.title.to_string()
    } else {
        format!(
            "{} - {}",
            input.title,
            truncate_chars(input.description, QA_ANSWER_DESCRIPTION_CHARS)
        )
    };

    DerivedTasks {
        summarization: SummarizationTask {
            instruction: "Summarize the following Jira issue:".to_string(),
            input: text.clone(),
            output: format!(
                "Issue {}: {} (Status: {}, Type: {})",
                input.issue_key, input.title, status, issue_type
            ),
        },
        classification: ClassificationTask {
            instruction: "Classify the following Jira issue by type and status:".to_string(),
            input: format!(
                "{}\n\n{}",
                input.title,
                truncate_chars(input.description, CLASSIFICATION_DESCRIPTION_CHARS)
            ),
            output: format!("Type: {}, Status: {}", issue_type, status),
        },
        qa_generation: QaTask {
            question: format!("What is the issue {} about?", input.issue_key),
            context: truncate_chars(&text, QA_CONTEXT_CHARS).to_string(),
            answer,
        },
    }
}

fn or_unknown(value: &str) -> &str {
    if value.is_empty() {
        "Unknown"
    } else {
        value
    }
}
