//! Jira REST client
//!
//! This module implements [`IssueSource`] against the Jira REST API v2:
//! - Building HTTP clients with a proper user agent string
//! - Endpoint construction from the configured base URL
//! - The retry loop shared by every request
//! - Decoding of search, issue, comment and project responses

use crate::config::{Config, UserAgentConfig};
use crate::remote::retry::{
    classify_status, classify_transport, Outcome, RetryDecision, RetryPolicy, RetryState,
};
use crate::remote::traits::{IssueSource, RemoteError, RemoteResult};
use crate::remote::types::{
    CollectionInfo, CommentPage, ItemDetail, ItemSummary, ListPage, ProjectResponse,
    SearchResponse, SubResource,
};
use crate::state::{CollectionKey, Cursor, ItemId};
use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use url::Url;

/// Builds an HTTP client with proper configuration
///
/// The user agent has the form `ClientName/Version (+ContactURL; ContactEmail)`.
pub fn build_http_client(config: &UserAgentConfig, timeout: Duration) -> Result<Client, reqwest::Error> {
    let user_agent = format!(
        "{}/{} (+{}; {})",
        config.client_name, config.client_version, config.contact_url, config.contact_email
    );

    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Result of one attempt that did not succeed
struct FailedAttempt {
    outcome: Outcome,
    status: Option<u16>,
    message: String,
}

/// [`IssueSource`] backed by a Jira server
pub struct JiraClient {
    http: Client,
    base_url: Url,
    jql_template: String,
    policy: RetryPolicy,
    request_delay: Duration,
}

impl JiraClient {
    /// Creates a client
    ///
    /// # Errors
    ///
    /// [`RemoteError::Url`] if `base_url` does not parse or cannot carry a path.
    pub fn new(
        http: Client,
        base_url: &str,
        jql_template: impl Into<String>,
        policy: RetryPolicy,
        request_delay: Duration,
    ) -> RemoteResult<Self> {
        let mut base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase.into());
        }
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            http,
            base_url,
            jql_template: jql_template.into(),
            policy,
            request_delay,
        })
    }

    /// Creates a client from the `[remote]`, `[user-agent]` and `[harvest]` sections
    pub fn from_config(config: &Config) -> RemoteResult<Self> {
        let http = build_http_client(
            &config.user_agent,
            Duration::from_secs(config.remote.timeout_secs),
        )?;

        Self::new(
            http,
            &config.remote.base_url,
            config.harvest.jql.clone(),
            RetryPolicy::from_config(&config.remote),
            Duration::from_millis(config.remote.request_delay_ms),
        )
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The search query for a collection
    pub fn jql_for(&self, collection: &CollectionKey) -> String {
        self.jql_template.replace("{project}", collection.as_str())
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // cannot-be-a-base URLs are rejected in `new`
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Performs one logical GET request, retrying per the policy
    async fn execute(&self, url: Url) -> RemoteResult<String> {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        let mut state = RetryState::new();
        loop {
            let attempt = state.begin_attempt();
            tracing::debug!("GET {} (attempt {})", url, attempt);

            let failed = match self.http.get(url.clone()).send().await {
                Ok(response) => {
                    let status = response.status();
                    let retry_after = response
                        .headers()
                        .get(RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_owned);

                    match classify_status(status, retry_after.as_deref()) {
                        Outcome::Success => match response.text().await {
                            Ok(body) => return Ok(body),
                            Err(e) => FailedAttempt {
                                outcome: classify_transport(&e),
                                status: Some(status.as_u16()),
                                message: format!("failed to read body: {}", e),
                            },
                        },
                        outcome => FailedAttempt {
                            outcome,
                            status: Some(status.as_u16()),
                            message: format!("HTTP {}", status),
                        },
                    }
                }
                Err(e) => FailedAttempt {
                    outcome: classify_transport(&e),
                    status: None,
                    message: e.to_string(),
                },
            };

            match self.policy.decide(&mut state, &failed.outcome) {
                RetryDecision::Retry(delay) => {
                    tracing::warn!(
                        "Request to {} failed ({}), retrying in {:?} (attempt {}/{})",
                        url,
                        failed.message,
                        delay,
                        attempt,
                        self.policy.max_attempts()
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    return Err(RemoteError::Unavailable {
                        url: url.to_string(),
                        attempts: state.attempts(),
                        last_error: failed.message,
                    });
                }
                RetryDecision::Stop => {
                    return Err(RemoteError::Rejected {
                        url: url.to_string(),
                        status: failed.status,
                        message: failed.message,
                    });
                }
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> RemoteResult<T> {
        let body = self.execute(url.clone()).await?;
        serde_json::from_str(&body).map_err(|e| RemoteError::Malformed {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl IssueSource for JiraClient {
    async fn describe_collection(&self, collection: &CollectionKey) -> RemoteResult<CollectionInfo> {
        let url = self.endpoint(&["project", collection.as_str()]);
        let response: ProjectResponse = self.get_json(url).await?;

        Ok(CollectionInfo {
            key: collection.clone(),
            name: response.name,
        })
    }

    async fn list_page(
        &self,
        collection: &CollectionKey,
        cursor: Cursor,
        page_size: u32,
    ) -> RemoteResult<ListPage> {
        let page_size = page_size.max(1);
        let mut url = self.endpoint(&["search"]);
        url.query_pairs_mut()
            .append_pair("jql", &self.jql_for(collection))
            .append_pair("startAt", &cursor.offset().to_string())
            .append_pair("maxResults", &page_size.to_string())
            .append_pair("fields", "key");

        let response: SearchResponse = self.get_json(url).await?;

        if let Some(start_at) = response.start_at {
            if start_at != cursor.offset() {
                tracing::warn!(
                    "Search for {} returned startAt {} (requested {})",
                    collection,
                    start_at,
                    cursor.offset()
                );
            }
        }

        let items: Vec<ItemSummary> = response
            .issues
            .into_iter()
            .map(|issue| ItemSummary {
                id: ItemId::new(issue.key),
            })
            .collect();
        let has_more = response
            .total
            .map(|total| cursor.advanced_by(items.len()).offset() < total);

        tracing::debug!(
            "Listed {} items of {} at offset {} (total {:?})",
            items.len(),
            collection,
            cursor,
            response.total
        );

        Ok(ListPage {
            items,
            has_more,
            total: response.total,
        })
    }

    async fn fetch_detail(&self, item: &ItemId) -> RemoteResult<ItemDetail> {
        let mut url = self.endpoint(&["issue", item.as_str()]);
        url.query_pairs_mut().append_pair("expand", "renderedFields");

        let raw: serde_json::Value = self.get_json(url.clone()).await?;
        if !raw.get("key").map(|k| k.is_string()).unwrap_or(false) {
            return Err(RemoteError::Malformed {
                url: url.to_string(),
                message: "issue response has no key".to_string(),
            });
        }

        Ok(ItemDetail {
            id: item.clone(),
            raw,
        })
    }

    async fn fetch_sub_resources(&self, item: &ItemId) -> RemoteResult<Vec<SubResource>> {
        let url = self.endpoint(&["issue", item.as_str(), "comment"]);
        let page: CommentPage = self.get_json(url).await?;
        Ok(page.comments.unwrap_or_default())
    }
}
