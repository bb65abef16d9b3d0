//! Posts a randomly chosen preset reply under each selected comment.
//!
//! Replies are sent one at a time in input order. Every successful call
//! publishes a real reply, so running the same batch twice replies twice.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use yt_data_client::YouTubeApi;

use crate::aggregator::CommentRecord;

pub const QUOTA_EXCEEDED_MESSAGE: &str = "Quota exceeded";
pub const EMPTY_REPLY_MESSAGE: &str = "Reply text is empty";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyError {
    pub comment_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    /// Number of comments submitted, attempted or not
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<ReplyError>,
}

impl DispatchResult {
    fn fail(&mut self, comment_id: &str, error: impl Into<String>) {
        self.failed += 1;
        self.errors.push(ReplyError {
            comment_id: comment_id.to_string(),
            error: error.into(),
        });
    }
}

/// Uniform pick, drawn independently for every comment
pub fn pick_preset<'a, R: Rng + ?Sized>(presets: &'a [String], rng: &mut R) -> Option<&'a str> {
    presets.choose(rng).map(String::as_str)
}

/// Reply to every comment, stopping at the first quota failure
pub async fn dispatch<R: Rng + ?Sized>(
    api: &dyn YouTubeApi,
    access_token: &str,
    comments: &[CommentRecord],
    presets: &[String],
    rng: &mut R,
) -> DispatchResult {
    let mut result = DispatchResult {
        total: comments.len(),
        ..Default::default()
    };

    for comment in comments {
        let text = pick_preset(presets, rng).unwrap_or_default();
        if text.trim().is_empty() {
            result.fail(&comment.id, EMPTY_REPLY_MESSAGE);
            continue;
        }

        match api.insert_reply(access_token, &comment.id, text).await {
            Ok(()) => {
                debug!(comment_id = %comment.id, "Reply posted");
                result.successful += 1;
            }
            Err(e) if e.is_quota_exceeded() => {
                warn!(comment_id = %comment.id, error = %e, "Quota exceeded, stopping replies");
                result.fail(&comment.id, QUOTA_EXCEEDED_MESSAGE);
                break;
            }
            Err(e) => {
                warn!(comment_id = %comment.id, error = %e, "Reply failed");
                result.fail(&comment.id, e.to_string());
            }
        }
    }

    info!(
        total = result.total,
        successful = result.successful,
        failed = result.failed,
        "Reply batch finished"
    );

    result
}
