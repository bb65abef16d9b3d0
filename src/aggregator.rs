//! Walks a video's comment threads into flat [`CommentRecord`]s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use yt_data_client::{ApiError, CommentThread, YouTubeApi};

/// Hard cap on records returned for one video
pub const MAX_COMMENTS: usize = 1000;

/// A top-level comment as shown to the channel owner
///
/// Only `id` is needed when a record comes back for replying.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRecord {
    /// Thread id, also the parent id for replies
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub like_count: u64,
    /// The video's channel already replied somewhere in this thread
    #[serde(default)]
    pub has_reply: bool,
    #[serde(default)]
    pub published_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentBatch {
    pub comments: Vec<CommentRecord>,
    /// Count declared by the video's statistics, may exceed what was fetched
    pub total_count: u64,
    pub fetched_count: usize,
    pub already_replied_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fetched(CommentBatch),
    NotFound,
    QuotaExceeded,
    Failed(String),
}

/// Fetch up to [`MAX_COMMENTS`] comments for `video_id`
///
/// API failures come back as outcomes rather than errors so callers can tell
/// a missing video from a spent quota from anything else.
pub async fn aggregate(api: &dyn YouTubeApi, access_token: &str, video_id: &str) -> FetchOutcome {
    match collect(api, access_token, video_id).await {
        Ok(Some(batch)) => {
            info!(
                video_id,
                fetched = batch.fetched_count,
                total = batch.total_count,
                already_replied = batch.already_replied_count,
                "Fetched comments"
            );
            FetchOutcome::Fetched(batch)
        }
        Ok(None) => {
            info!(video_id, "Video not found");
            FetchOutcome::NotFound
        }
        Err(e) if e.is_quota_exceeded() => {
            warn!(video_id, error = %e, "Quota exceeded while fetching comments");
            FetchOutcome::QuotaExceeded
        }
        Err(e) => {
            warn!(video_id, error = %e, "Failed to fetch comments");
            FetchOutcome::Failed(e.to_string())
        }
    }
}

async fn collect(
    api: &dyn YouTubeApi,
    access_token: &str,
    video_id: &str,
) -> Result<Option<CommentBatch>, ApiError> {
    let Some(video) = api.video(access_token, video_id).await? else {
        return Ok(None);
    };
    let owner = video.channel_id();
    let total_count = video.comment_count();

    let mut comments = Vec::new();
    let mut page_token: Option<String> = None;

    while comments.len() < MAX_COMMENTS {
        let page = api
            .comment_threads(access_token, video_id, page_token.as_deref())
            .await?;
        debug!(video_id, items = page.items.len(), "Received comment thread page");

        let room = MAX_COMMENTS - comments.len();
        comments.extend(
            page.items
                .iter()
                .take(room)
                .map(|thread| to_record(thread, owner)),
        );

        match page.next_page_token {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => break,
        }
    }

    let already_replied_count = comments.iter().filter(|c| c.has_reply).count();

    Ok(Some(CommentBatch {
        fetched_count: comments.len(),
        comments,
        total_count,
        already_replied_count,
    }))
}

fn to_record(thread: &CommentThread, owner: Option<&str>) -> CommentRecord {
    let top = &thread.snippet.top_level_comment.snippet;

    CommentRecord {
        id: thread.id.clone(),
        text: top.text_display.clone(),
        author: top.author_display_name.clone(),
        like_count: top.like_count,
        has_reply: owner_replied(thread, owner),
        published_at: top.published_at,
    }
}

fn owner_replied(thread: &CommentThread, owner: Option<&str>) -> bool {
    let Some(owner) = owner else {
        return false;
    };

    thread.replies.as_ref().is_some_and(|replies| {
        replies
            .comments
            .iter()
            .any(|reply| reply.snippet.author_channel() == Some(owner))
    })
}
