//! YouTube Data API quota arithmetic for a fetch-then-reply session.

use serde::Serialize;

/// Default daily quota granted to a Google Cloud project
pub const DAILY_QUOTA_LIMIT: u64 = 10_000;

/// `videos.list`
pub const VIDEO_LOOKUP_COST: u64 = 1;
/// `comments.insert`
pub const REPLY_COST: u64 = 50;
/// Threads returned per `commentThreads.list` call (1 unit each)
pub const COMMENTS_PER_PAGE: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaBreakdown {
    pub video_stats: u64,
    pub fetch_comments: u64,
    pub post_replies: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaEstimate {
    pub breakdown: QuotaBreakdown,
    pub total: u64,
    pub daily_limit: u64,
    /// Share of the daily limit, rounded to one decimal place
    pub percentage: f64,
}

/// Units needed to fetch and reply to `num_comments` comments
pub fn estimate(num_comments: u64) -> QuotaEstimate {
    let breakdown = QuotaBreakdown {
        video_stats: VIDEO_LOOKUP_COST,
        fetch_comments: (num_comments / COMMENTS_PER_PAGE).max(1),
        post_replies: num_comments.saturating_mul(REPLY_COST),
    };
    let total = breakdown
        .video_stats
        .saturating_add(breakdown.fetch_comments)
        .saturating_add(breakdown.post_replies);
    let percentage = (total as f64 / DAILY_QUOTA_LIMIT as f64 * 100.0 * 10.0).round() / 10.0;

    QuotaEstimate {
        breakdown,
        total,
        daily_limit: DAILY_QUOTA_LIMIT,
        percentage,
    }
}
