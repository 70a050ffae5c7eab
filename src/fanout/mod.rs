//! Live delivery of new posts to connected sessions.
//!
//! Ingestion hands a [`Published`] post to the [`Publisher`]; a single
//! dispatcher task drains those in order and asks the [`Hub`] to push the
//! serialized post onto the private queue of every entitled session.
mod hub;
mod publisher;

pub use hub::{Hub, Registration};
pub use publisher::{spawn_dispatcher, Publisher};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::db::models::PostView;

/// Which live stream a session subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Timeline {
    /// The author's own posts and posts by accounts they follow
    Home,
    /// Every post
    Public,
}

impl Timeline {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeline::Home => "home",
            Timeline::Public => "public",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "home" => Some(Timeline::Home),
            "public" => Some(Timeline::Public),
            _ => None,
        }
    }
}

/// A post ready for delivery, with the author's followers as of publication.
#[derive(Debug, Clone)]
pub struct Published {
    pub view: PostView,
    pub followers: HashSet<String>,
}

impl Published {
    pub fn new(view: PostView, followers: impl IntoIterator<Item = String>) -> Self {
        Self {
            view,
            followers: followers.into_iter().collect(),
        }
    }

    /// Whether a session for `user_id` on `timeline` should receive this post.
    pub fn entitles(&self, user_id: &str, timeline: Timeline) -> bool {
        match timeline {
            Timeline::Public => true,
            Timeline::Home => self.view.author.id == user_id || self.followers.contains(user_id),
        }
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    event: &'static str,
    stream: Timeline,
    payload: &'a PostView,
}

/// The wire frame for one post on one stream.
pub fn envelope(timeline: Timeline, view: &PostView) -> serde_json::Result<Arc<str>> {
    let frame = serde_json::to_string(&Envelope {
        event: "update",
        stream: timeline,
        payload: view,
    })?;
    Ok(Arc::from(frame))
}
