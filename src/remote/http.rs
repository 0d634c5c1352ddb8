// src/remote/http.rs

//! HTTP session against a VK-style JSON method API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::remote::{RawCommentPage, RawTopic};
use crate::models::{Account, DetailParams, ListParams, RemoteConfig, TopicDetailPage, TopicList};
use crate::remote::BoardApi;

/// Response envelope: either `response` or `error` is set.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    response: Option<T>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error_code: i64,
    #[serde(default)]
    error_msg: String,
}

/// One authenticated connection to the remote service.
pub struct HttpSession {
    name: String,
    client: reqwest::Client,
    api_base: Url,
    api_version: String,
    access_token: String,
    request_delay: Duration,
}

impl HttpSession {
    /// Create a session for one account.
    pub fn new(config: &RemoteConfig, account: &Account) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let mut base = config.api_base.clone();
        if !base.ends_with('/') {
            base.push('/');
        }

        Ok(Self {
            name: account.name.clone(),
            client,
            api_base: Url::parse(&base)?,
            api_version: config.api_version.clone(),
            access_token: account.access_token.clone(),
            request_delay: Duration::from_millis(config.request_delay_ms),
        })
    }

    /// Account label.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Call a remote method and decode its `response` payload.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        let url = self.api_base.join(method)?;
        let text = self
            .client
            .get(url)
            .query(params)
            .query(&[
                ("access_token", self.access_token.as_str()),
                ("v", self.api_version.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        decode_envelope(method, &text)
    }
}

/// Decode a method response body.
fn decode_envelope<T: DeserializeOwned>(method: &str, body: &str) -> Result<T> {
    let envelope: Envelope<T> = serde_json::from_str(body)
        .map_err(|e| AppError::decode(format!("{method}: {e}")))?;

    match (envelope.response, envelope.error) {
        (_, Some(error)) => Err(AppError::remote(
            method,
            format!("code {}: {}", error.error_code, error.error_msg),
        )),
        (Some(response), None) => Ok(response),
        (None, None) => Err(AppError::decode(format!("{method}: empty response"))),
    }
}

#[async_trait]
impl BoardApi for HttpSession {
    async fn list_topics(
        &self,
        group_id: i64,
        page_size: usize,
        params: ListParams,
    ) -> Result<TopicList> {
        self.call(
            "board.getTopics",
            &[
                ("group_id", group_id.to_string()),
                ("count", page_size.to_string()),
                ("offset", params.offset.to_string()),
                ("order", params.order.as_param().to_string()),
            ],
        )
        .await
    }

    async fn fetch_topic_detail(
        &self,
        group_id: i64,
        topic_id: i64,
        params: DetailParams,
    ) -> Result<TopicDetailPage> {
        let topic = if params.offset == 0 {
            let listing: TopicList = self
                .call(
                    "board.getTopics",
                    &[
                        ("group_id", group_id.to_string()),
                        ("topic_ids", topic_id.to_string()),
                    ],
                )
                .await?;
            let topic: RawTopic = listing
                .items
                .into_iter()
                .find(|t| t.id == topic_id)
                .ok_or_else(|| AppError::remote(format!("topic {topic_id}"), "not found"))?;
            Some(topic)
        } else {
            None
        };

        let page: RawCommentPage = self
            .call(
                "board.getComments",
                &[
                    ("group_id", group_id.to_string()),
                    ("topic_id", topic_id.to_string()),
                    ("offset", params.offset.to_string()),
                    ("count", params.count.to_string()),
                    ("extended", u8::from(params.extended).to_string()),
                    ("need_likes", "1".to_string()),
                ],
            )
            .await?;

        Ok(page.with_topic(topic))
    }
}
