use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Default REST API address, overridable with `REST_API_ADDRESS`
pub const DEFAULT_API_ADDRESS: &str = "https://www.googleapis.com";

/// Largest page `commentThreads.list` will return
pub const MAX_PAGE_SIZE: u32 = 100;

/// Error reasons Google reports when the project's quota or rate limit is spent
const QUOTA_REASONS: &[&str] = &[
    "quotaExceeded",
    "dailyLimitExceeded",
    "rateLimitExceeded",
    "userRateLimitExceeded",
];
const QUOTA_DOMAINS: &[&str] = &["youtube.quota", "usageLimits"];

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{message}")]
    Api {
        status: u16,
        reason: Option<String>,
        domain: Option<String>,
        message: String,
    },

    #[error("Failed to parse response: {0}")]
    Decode(String),
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(default)]
    errors: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    reason: Option<String>,
    domain: Option<String>,
}

impl ApiError {
    /// Build an error from a non-success response body
    ///
    /// Google wraps failures as `{"error": {"code", "message", "errors": [...]}}`;
    /// anything else is kept verbatim as the message.
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => {
                let detail = envelope.error.errors.into_iter().next();
                let (reason, domain) = detail
                    .map(|d| (d.reason, d.domain))
                    .unwrap_or((None, None));
                ApiError::Api {
                    status,
                    reason,
                    domain,
                    message: envelope.error.message,
                }
            }
            Err(_) => ApiError::Api {
                status,
                reason: None,
                domain: None,
                message: format!("Request failed (status {}): {}", status, body),
            },
        }
    }

    /// Whether the failure means quota or rate limits are exhausted
    ///
    /// The structured reason wins when Google provides one. Only errors without
    /// it fall back to looking for "quota" in the message.
    pub fn is_quota_exceeded(&self) -> bool {
        match self {
            ApiError::Api {
                reason: Some(reason),
                domain,
                ..
            } => {
                QUOTA_REASONS.contains(&reason.as_str())
                    || domain
                        .as_deref()
                        .is_some_and(|d| QUOTA_DOMAINS.contains(&d))
            }
            other => other.to_string().to_lowercase().contains("quota"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VideoListResponse {
    #[serde(default)]
    pub items: Vec<Video>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Video {
    pub id: String,
    pub snippet: Option<VideoSnippet>,
    pub statistics: Option<VideoStatistics>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSnippet {
    pub channel_id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatistics {
    /// The API encodes counters as decimal strings
    pub comment_count: Option<String>,
}

impl Video {
    /// Channel that uploaded the video
    pub fn channel_id(&self) -> Option<&str> {
        self.snippet.as_ref().map(|s| s.channel_id.as_str())
    }

    /// Declared comment count, 0 when hidden or unparseable
    pub fn comment_count(&self) -> u64 {
        self.statistics
            .as_ref()
            .and_then(|s| s.comment_count.as_deref())
            .and_then(|c| c.parse().ok())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentThreadPage {
    #[serde(default)]
    pub items: Vec<CommentThread>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommentThread {
    pub id: String,
    pub snippet: CommentThreadSnippet,
    pub replies: Option<CommentReplies>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentThreadSnippet {
    pub top_level_comment: Comment,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CommentReplies {
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Comment {
    pub id: String,
    pub snippet: CommentSnippet,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentSnippet {
    #[serde(default)]
    pub text_display: String,
    #[serde(default)]
    pub author_display_name: String,
    pub author_channel_id: Option<AuthorChannelId>,
    #[serde(default)]
    pub like_count: u64,
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AuthorChannelId {
    pub value: String,
}

impl CommentSnippet {
    pub fn author_channel(&self) -> Option<&str> {
        self.author_channel_id.as_ref().map(|a| a.value.as_str())
    }
}

/// The slice of the YouTube Data API this application talks to
#[async_trait]
pub trait YouTubeApi: Send + Sync {
    /// `videos.list` for a single id; `None` when no such video exists
    async fn video(&self, access_token: &str, video_id: &str) -> Result<Option<Video>, ApiError>;

    /// One page of `commentThreads.list` including replies
    async fn comment_threads(
        &self,
        access_token: &str,
        video_id: &str,
        page_token: Option<&str>,
    ) -> Result<CommentThreadPage, ApiError>;

    /// `comments.insert` as a reply under `parent_id`
    async fn insert_reply(
        &self,
        access_token: &str,
        parent_id: &str,
        text: &str,
    ) -> Result<(), ApiError>;
}

/// reqwest backed client for the YouTube Data API v3
#[derive(Debug, Clone)]
pub struct YouTubeClient {
    http: reqwest::Client,
    base_url: String,
}

impl YouTubeClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Client pointed at `REST_API_ADDRESS`, or the public endpoint when unset
    pub fn from_env(http: reqwest::Client) -> Self {
        let base_url = std::env::var("REST_API_ADDRESS")
            .unwrap_or_else(|_| DEFAULT_API_ADDRESS.to_string());
        Self::new(http, base_url)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, resource: &str) -> String {
        format!("{}/youtube/v3/{}", self.base_url, resource)
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(ApiError::from_response(status.as_u16(), &body));
    }

    serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))
}

#[async_trait]
impl YouTubeApi for YouTubeClient {
    async fn video(&self, access_token: &str, video_id: &str) -> Result<Option<Video>, ApiError> {
        tracing::debug!(video_id, "Looking up video");

        let response = self
            .http
            .get(self.endpoint("videos"))
            .bearer_auth(access_token)
            .query(&[("part", "statistics,snippet"), ("id", video_id)])
            .send()
            .await?;

        let list: VideoListResponse = read_json(response).await?;
        Ok(list.items.into_iter().next())
    }

    async fn comment_threads(
        &self,
        access_token: &str,
        video_id: &str,
        page_token: Option<&str>,
    ) -> Result<CommentThreadPage, ApiError> {
        let max_results = MAX_PAGE_SIZE.to_string();
        let mut query = vec![
            ("part", "snippet,replies"),
            ("videoId", video_id),
            ("maxResults", max_results.as_str()),
            ("textFormat", "plainText"),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        tracing::debug!(video_id, page_token, "Fetching comment threads");

        let response = self
            .http
            .get(self.endpoint("commentThreads"))
            .bearer_auth(access_token)
            .query(&query)
            .send()
            .await?;

        read_json(response).await
    }

    async fn insert_reply(
        &self,
        access_token: &str,
        parent_id: &str,
        text: &str,
    ) -> Result<(), ApiError> {
        tracing::debug!(parent_id, "Posting reply");

        let body = serde_json::json!({
            "snippet": {
                "parentId": parent_id,
                "textOriginal": text,
            }
        });

        let response = self
            .http
            .post(self.endpoint("comments"))
            .bearer_auth(access_token)
            .query(&[("part", "snippet")])
            .json(&body)
            .send()
            .await?;

        let _: serde_json::Value = read_json(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_quota_reason_is_detected() {
        let body = r#"{
            "error": {
                "code": 403,
                "message": "The request cannot be completed because you have exceeded your <a href=\"/youtube/v3/getting-started#quota\">quota</a>.",
                "errors": [{"message": "...", "domain": "youtube.quota", "reason": "quotaExceeded"}]
            }
        }"#;
        let err = ApiError::from_response(403, body);
        assert!(err.is_quota_exceeded());
        assert!(matches!(err, ApiError::Api { status: 403, .. }));
    }

    #[test]
    fn structured_reason_overrides_message_text() {
        let body = r#"{
            "error": {
                "code": 403,
                "message": "Comments are disabled, so no quota was used",
                "errors": [{"domain": "youtube.commentThread", "reason": "commentsDisabled"}]
            }
        }"#;
        assert!(!ApiError::from_response(403, body).is_quota_exceeded());
    }

    #[test]
    fn rate_limits_count_as_quota() {
        for reason in ["rateLimitExceeded", "userRateLimitExceeded"] {
            let body = format!(
                r#"{{"error": {{"code": 403, "message": "Rate Limit Exceeded",
                    "errors": [{{"domain": "usageLimits", "reason": "{}"}}]}}}}"#,
                reason
            );
            assert!(ApiError::from_response(403, &body).is_quota_exceeded(), "{}", reason);
        }

        let body = r#"{"error": {"code": 403, "message": "Slow down",
            "errors": [{"domain": "usageLimits", "reason": "somethingNew"}]}}"#;
        assert!(ApiError::from_response(403, body).is_quota_exceeded());
    }

    #[test]
    fn unstructured_body_falls_back_to_message() {
        let err = ApiError::from_response(429, "Quota Exceeded for this project");
        assert!(err.is_quota_exceeded());
        assert!(err.to_string().contains("status 429"));

        let err = ApiError::from_response(500, "backend error");
        assert!(!err.is_quota_exceeded());
    }

    #[test]
    fn comment_thread_page_parses() {
        let body = r#"{
            "kind": "youtube#commentThreadListResponse",
            "nextPageToken": "NEXT",
            "items": [{
                "id": "thread-1",
                "snippet": {
                    "videoId": "vid",
                    "topLevelComment": {
                        "id": "thread-1",
                        "snippet": {
                            "textDisplay": "great video",
                            "authorDisplayName": "@viewer",
                            "authorChannelId": {"value": "UC-viewer"},
                            "likeCount": 4,
                            "publishedAt": "2024-03-01T12:00:00Z"
                        }
                    },
                    "totalReplyCount": 1
                },
                "replies": {
                    "comments": [{
                        "id": "thread-1.reply",
                        "snippet": {
                            "textDisplay": "thanks!",
                            "authorDisplayName": "@owner",
                            "authorChannelId": {"value": "UC-owner"},
                            "likeCount": 0,
                            "publishedAt": "2024-03-01T13:00:00Z"
                        }
                    }]
                }
            }]
        }"#;
        let page: CommentThreadPage = serde_json::from_str(body).unwrap();

        assert_eq!(page.next_page_token.as_deref(), Some("NEXT"));
        let thread = &page.items[0];
        let top = &thread.snippet.top_level_comment.snippet;
        assert_eq!(top.text_display, "great video");
        assert_eq!(top.like_count, 4);
        assert_eq!(top.author_channel(), Some("UC-viewer"));
        let replies = &thread.replies.as_ref().unwrap().comments;
        assert_eq!(replies[0].snippet.author_channel(), Some("UC-owner"));
    }

    #[test]
    fn video_comment_count_defaults_to_zero() {
        let body = r#"{"items": [
            {"id": "a", "snippet": {"channelId": "UC1", "title": "t"}, "statistics": {"commentCount": "17"}},
            {"id": "b", "snippet": {"channelId": "UC2"}, "statistics": {}},
            {"id": "c", "snippet": {"channelId": "UC3"}}
        ]}"#;
        let list: VideoListResponse = serde_json::from_str(body).unwrap();

        assert_eq!(list.items[0].comment_count(), 17);
        assert_eq!(list.items[0].channel_id(), Some("UC1"));
        assert_eq!(list.items[1].comment_count(), 0);
        assert_eq!(list.items[2].comment_count(), 0);
    }

    #[test]
    fn empty_video_list_has_no_items() {
        let list: VideoListResponse =
            serde_json::from_str(r#"{"kind": "youtube#videoListResponse", "pageInfo": {}}"#).unwrap();
        assert!(list.items.is_empty());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = YouTubeClient::new(reqwest::Client::new(), "http://localhost:9000/");
        assert_eq!(
            client.endpoint("videos"),
            "http://localhost:9000/youtube/v3/videos"
        );
    }

    /// Local stand-in for the Data API: one known video, replies over quota
    async fn spawn_api() -> String {
        use axum::extract::Query;
        use axum::http::StatusCode;
        use axum::routing::get;
        use axum::{Json, Router};
        use std::collections::HashMap;

        let app = Router::new()
            .route(
                "/youtube/v3/videos",
                get(|Query(params): Query<HashMap<String, String>>| async move {
                    let items = match params.get("id").map(String::as_str) {
                        Some("known") => serde_json::json!([{
                            "id": "known",
                            "snippet": {"channelId": "UC-owner", "title": "t"},
                            "statistics": {"commentCount": "2"}
                        }]),
                        _ => serde_json::json!([]),
                    };
                    Json(serde_json::json!({ "items": items }))
                }),
            )
            .route(
                "/youtube/v3/comments",
                axum::routing::post(|| async {
                    (
                        StatusCode::FORBIDDEN,
                        r#"{"error": {"code": 403, "message": "Quota spent",
                            "errors": [{"domain": "youtube.quota", "reason": "quotaExceeded"}]}}"#,
                    )
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn client_talks_to_rest_endpoint() {
        let client = YouTubeClient::new(reqwest::Client::new(), spawn_api().await);

        let video = client.video("token", "known").await.unwrap().unwrap();
        assert_eq!(video.channel_id(), Some("UC-owner"));
        assert_eq!(video.comment_count(), 2);
        assert!(client.video("token", "missing").await.unwrap().is_none());

        let err = client.insert_reply("token", "c1", "Thanks!").await.unwrap_err();
        assert!(err.is_quota_exceeded());
        assert_eq!(err.to_string(), "Quota spent");
    }
}
