//! wikiscroll: a personalized, infinitely scrolling encyclopedia feed.
//!
//! The crate is rendering-agnostic. A front end drives a [`feed::Feed`]
//! with scroll, gesture and visibility signals and consumes the
//! [`feed::RenderInstruction`]s it emits.
//!
//! - [`content`] talks to the article provider.
//! - [`storage`] persists history and learned preferences.
//! - [`feed`] holds the prefetch buffer, viewport recycler, preference
//!   model and the orchestrator tying them together.

pub mod config;
pub mod content;
pub mod feed;
pub mod storage;
pub mod util;
