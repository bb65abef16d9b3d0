//! # yt-comment-replier
//!
//! Lets a channel owner sign in with Google, pull up to 1000 top-level
//! comments for one of their videos, see which ones they already answered,
//! and post randomly chosen preset replies to a selection of them.
//!
//! - [`aggregator`] flattens comment threads and spots existing owner replies
//! - [`dispatcher`] posts replies one by one and stops when quota runs out
//! - [`quota`] estimates the API units a session will cost
//! - [`gateway`] and [`store`] handle OAuth login and per-user tokens
//! - [`server`] exposes all of it as a small JSON API

pub mod aggregator;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod quota;
pub mod server;
pub mod store;
